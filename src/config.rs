// src/config.rs

use std::str::FromStr;
use std::time::Duration;

use crate::counter::{CntrEvents, WaitObj};
use crate::error::Error;

/// Largest message the shm transport delivers inline, without a direct copy.
pub const SMR_INJECT_SIZE: usize = 4096;

/// Delay the probe child waits for the parent to publish its buffer address.
pub const DEFAULT_PROBE_SETTLE: Duration = Duration::from_micros(1000);

fn env_positive(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
}

pub fn inject_size() -> usize {
    env_positive("FABRIC_SHM_INJECT_SIZE")
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(SMR_INJECT_SIZE)
}

pub fn probe_settle() -> Duration {
    env_positive("FABRIC_SHM_PROBE_SETTLE_US")
        .map(Duration::from_micros)
        .unwrap_or(DEFAULT_PROBE_SETTLE)
}

/// Tunables for transport discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Value `max_msg_size` is clamped to when the direct-copy probe reports support.
    pub inject_size: usize,
    pub probe_settle: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            inject_size: SMR_INJECT_SIZE,
            probe_settle: DEFAULT_PROBE_SETTLE,
        }
    }
}

impl ResolverConfig {
    /// Defaults, overridden by `FABRIC_SHM_INJECT_SIZE` and `FABRIC_SHM_PROBE_SETTLE_US`.
    pub fn from_env() -> Self {
        Self {
            inject_size: inject_size(),
            probe_settle: probe_settle(),
        }
    }
}

impl FromStr for CntrEvents {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completion" => Ok(Self::Completion),
            "bytes" => Ok(Self::Bytes),
            _ => Err(Error::InvalidArgument("events")),
        }
    }
}

impl FromStr for WaitObj {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "unspec" => Ok(Self::Unspec),
            "set" => Ok(Self::Set),
            "fd" => Ok(Self::Fd),
            "mutex+condition" => Ok(Self::MutexCond),
            "yield" => Ok(Self::Yield),
            _ => Err(Error::InvalidArgument("wait_obj")),
        }
    }
}
