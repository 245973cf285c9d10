// src/probe.rs

//! Detection of cross-memory attach (CMA) support.
//!
//! CMA lets one process read another's address space directly with
//! `process_vm_readv`. Whether that works depends on kernel support, ptrace
//! policy (Yama) and container seccomp profiles, so the only reliable check is
//! to try it: fork a child, have it read 8 bytes from the parent, and report
//! back through a small shared segment.
//!
//! ```text
//! parent                         child
//! ------                         -----
//! create + map /cma_check_<pid>
//! fork ───────────────────────▶  sleep(settle)
//! publish &buf in segment        read &buf from segment
//! waitpid                        process_vm_readv(ppid, &buf)
//!                                write status, _exit
//! read status
//! unmap + unlink
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use crate::config;
use crate::error::Result;

/// One-shot check for direct cross-process memory copy.
pub trait CapabilityProbe: Send + Sync {
    /// `Ok(true)` if a direct read of another process's memory succeeded.
    ///
    /// Errors mean the check itself could not be set up.
    fn probe(&self) -> Result<bool>;
}

/// A probe with a predetermined answer, for platforms without `fork` or for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedProbe(pub bool);

impl CapabilityProbe for FixedProbe {
    fn probe(&self) -> Result<bool> {
        Ok(self.0)
    }
}

/// Runs the inner probe until it first succeeds, then reuses that answer.
#[derive(Debug, Default)]
pub struct CachedProbe<P> {
    inner: P,
    result: OnceLock<bool>,
}

impl<P: CapabilityProbe> CachedProbe<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            result: OnceLock::new(),
        }
    }
}

impl<P: CapabilityProbe> CapabilityProbe for CachedProbe<P> {
    fn probe(&self) -> Result<bool> {
        if let Some(supported) = self.result.get() {
            return Ok(*supported);
        }
        let supported = self.inner.probe()?;
        Ok(*self.result.get_or_init(|| supported))
    }
}

/// Fork-based CMA probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmaProbe {
    settle: Duration,
}

impl Default for CmaProbe {
    fn default() -> Self {
        Self::new(config::probe_settle())
    }
}

impl CmaProbe {
    /// `settle` is how long the child waits before looking for the parent's address.
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }
}

#[cfg(target_os = "linux")]
mod cma {
    use std::io;
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

    use super::CmaProbe;
    use crate::error::{Error, Result};
    use crate::shm::SharedMemory;

    const PROBE_LEN: usize = 8;
    const STATUS_PENDING: i64 = i64::MIN;
    const ADDR_RETRIES: u32 = 1000;

    /// Layout of the exchange segment.
    #[repr(C)]
    struct ProbeCell {
        /// Address of the parent's probe buffer; 0 until published.
        addr: AtomicU64,
        /// 0 on success, errno on failure, `STATUS_PENDING` until the child reports.
        status: AtomicI64,
    }

    impl CmaProbe {
        pub(super) fn run(&self) -> Result<bool> {
            static SEQ: AtomicU64 = AtomicU64::new(0);
            let name = format!(
                "/cma_check_{}_{}",
                std::process::id(),
                SEQ.fetch_add(1, Ordering::Relaxed)
            );
            self.run_in(&name)
        }

        /// Run the check through a fresh segment called `name`.
        pub(super) fn run_in(&self, name: &str) -> Result<bool> {
            let shm = SharedMemory::create(name, std::mem::size_of::<ProbeCell>()).map_err(
                |source| {
                    tracing::warn!("error creating shm file {} for CMA check: {}", name, source);
                    Error::ProbeUnavailable {
                        step: "segment",
                        source,
                    }
                },
            )?;

            // Safety: the segment is sized for ProbeCell, page aligned, and
            // only touched through atomics.
            let cell: &ProbeCell = unsafe { shm.as_ref() };
            cell.addr.store(0, Ordering::Release);
            cell.status.store(STATUS_PENDING, Ordering::Release);

            let settle_us = self.settle.as_micros().min(u32::MAX as u128) as libc::useconds_t;

            let pid = unsafe { libc::fork() };
            if pid < 0 {
                let err = io::Error::last_os_error();
                tracing::warn!("fork for CMA check failed: {}", err);
                return Err(Error::ProbeUnavailable {
                    step: "fork",
                    source: err,
                });
            }
            if pid == 0 {
                child(cell, settle_us);
            }

            let buf = [b'A'; PROBE_LEN];
            cell.addr.store(buf.as_ptr() as u64, Ordering::Release);

            let mut wstatus = 0;
            loop {
                let ret = unsafe { libc::waitpid(pid, &mut wstatus, 0) };
                if ret == pid {
                    break;
                }
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    tracing::warn!("waitpid for CMA check child failed: {}", err);
                    return Err(Error::ProbeUnavailable {
                        step: "waitpid",
                        source: err,
                    });
                }
            }
            std::hint::black_box(&buf);

            match cell.status.load(Ordering::Acquire) {
                0 => Ok(true),
                STATUS_PENDING => {
                    tracing::warn!(wstatus, "CMA check child exited without reporting");
                    Ok(false)
                }
                errno => {
                    tracing::warn!(
                        "child process_vm_readv on its parent failed: {}",
                        io::Error::from_raw_os_error(errno as i32)
                    );
                    Ok(false)
                }
            }
        }
    }

    /// Child side of the probe. Only async-signal-safe calls from here on.
    fn child(cell: &ProbeCell, settle_us: libc::useconds_t) -> ! {
        unsafe { libc::usleep(settle_us) };

        let mut addr = cell.addr.load(Ordering::Acquire);
        let mut retries = 0;
        while addr == 0 && retries < ADDR_RETRIES {
            unsafe { libc::usleep(settle_us.max(1)) };
            addr = cell.addr.load(Ordering::Acquire);
            retries += 1;
        }

        let mut buf = [0u8; PROBE_LEN];
        let local = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut libc::c_void,
            iov_len: PROBE_LEN,
        };
        let remote = libc::iovec {
            iov_base: addr as usize as *mut libc::c_void,
            iov_len: PROBE_LEN,
        };

        let nread = unsafe { libc::process_vm_readv(libc::getppid(), &local, 1, &remote, 1, 0) };
        let status = if nread < 0 {
            io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(libc::EIO) as i64
        } else if nread as usize != PROBE_LEN || buf != [b'A'; PROBE_LEN] {
            libc::EIO as i64
        } else {
            0
        };
        cell.status.store(status, Ordering::Release);

        unsafe { libc::_exit(0) }
    }
}

impl CapabilityProbe for CmaProbe {
    #[cfg(target_os = "linux")]
    fn probe(&self) -> Result<bool> {
        self.run()
    }

    #[cfg(not(target_os = "linux"))]
    fn probe(&self) -> Result<bool> {
        tracing::debug!("process_vm_readv unavailable on this platform");
        Ok(false)
    }
}
