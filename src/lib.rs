pub mod types;
pub mod error;
pub mod op;
pub mod trigger;
pub mod counter;
pub mod config;
pub mod shm;
pub mod probe;
pub mod info;
pub mod resolver;

pub use error::{Error, Result};

#[cfg(test)]
mod proptests;
