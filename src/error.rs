// src/error.rs

use std::fmt;
use std::io;

/// Errors surfaced by counters, the capability probe and the info resolver.
#[derive(Debug)]
pub enum Error {
    /// An attribute passed at open time is not supported.
    InvalidArgument(&'static str),
    /// The object is not configured for the requested operation.
    BadState,
    /// A bounded wait elapsed before its condition held.
    Timeout,
    /// The control command or operation is not implemented.
    NoSystemCall,
    /// The capability probe could not set up its shared segment or helper.
    ProbeUnavailable {
        step: &'static str,
        source: io::Error,
    },
    /// Allocation failed while creating an object.
    OutOfMemory,
    /// The transport discovery collaborator failed.
    Discovery(String),
}

impl Error {
    /// Negative errno-style code for callers bridging to C-style APIs.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => -libc::EINVAL,
            Self::BadState => -libc::EBADF,
            Self::Timeout => -libc::ETIMEDOUT,
            Self::NoSystemCall => -libc::ENOSYS,
            Self::ProbeUnavailable { .. } => -libc::EINVAL,
            Self::OutOfMemory => -libc::ENOMEM,
            Self::Discovery(_) => -libc::ENODATA,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
            Self::BadState => write!(f, "bad state"),
            Self::Timeout => write!(f, "timed out"),
            Self::NoSystemCall => write!(f, "operation not supported"),
            Self::ProbeUnavailable { step, source } => {
                write!(f, "capability probe unavailable ({step}): {source}")
            }
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::Discovery(msg) => write!(f, "transport discovery failed: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ProbeUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
