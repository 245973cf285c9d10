// src/shm.rs

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;

/// A named POSIX shared memory segment, mapped read/write.
///
/// The segment is created exclusively and is unmapped and unlinked when the
/// value is dropped. A failure part-way through [`SharedMemory::create`]
/// unlinks whatever was already created.
pub struct SharedMemory {
    ptr: NonNull<u8>,
    len: usize,
    // Held open for the lifetime of the mapping.
    _fd: OwnedFd,
    name: Unlink,
}

// Safety: SharedMemory is a memory-mapped region that can be shared
unsafe impl Send for SharedMemory {}
unsafe impl Sync for SharedMemory {}

/// Unlinks a shm name on drop.
struct Unlink(CString);

impl Drop for Unlink {
    fn drop(&mut self) {
        let ret = unsafe { libc::shm_unlink(self.0.as_ptr()) };
        if ret < 0 {
            tracing::warn!(
                "shm_unlink({:?}) failed: {}",
                self.0,
                io::Error::last_os_error()
            );
        }
    }
}

impl SharedMemory {
    /// Create and map a new segment of `size` bytes under `name`.
    ///
    /// Fails with `AlreadyExists` if the name is taken.
    pub fn create(name: &str, size: usize) -> io::Result<Self> {
        let c_name = CString::new(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid name"))?;

        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                (libc::S_IRWXU | libc::S_IRWXG) as libc::c_uint,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        let name = Unlink(c_name);

        let result = unsafe { libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let ptr = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;

        Ok(SharedMemory {
            ptr,
            len: size,
            _fd: fd,
            name,
        })
    }

    /// Get a pointer to the start of the shared memory.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn name(&self) -> &str {
        self.name.0.to_str().unwrap_or_default()
    }

    /// View the start of the segment as a `T`.
    ///
    /// # Safety
    /// `T` must fit in the segment, be valid for any bit pattern, and only
    /// be accessed through atomics while another process maps the segment.
    pub unsafe fn as_ref<T>(&self) -> &T {
        debug_assert!(std::mem::size_of::<T>() <= self.len);
        debug_assert_eq!(self.ptr.as_ptr() as usize % std::mem::align_of::<T>(), 0);
        &*(self.ptr.as_ptr() as *const T)
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}
