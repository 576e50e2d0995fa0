//! Named POSIX semaphore guarding a shared memory segment
//!
//! Every participant derives the same name from the segment's kernel
//! record, so no extra coordination is needed to find the guard. The
//! semaphore is created at 0 (locked); the process that created the
//! segment posts once to make it available.

use crate::error::{Result, SemShmError};
use crate::shm;
use rustix::fs::Mode;
use std::ffi::CString;
use std::io;
use std::ptr::NonNull;

/// Result of an attempt to take the guard
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The lock was taken and the operation ran
    Done,
    /// Non-blocking mode and another holder has the lock; nothing happened
    WouldBlock,
}

impl Outcome {
    #[inline]
    pub fn is_done(self) -> bool {
        self == Outcome::Done
    }

    #[inline]
    pub fn would_block(self) -> bool {
        self == Outcome::WouldBlock
    }
}

/// Handle to a named counting semaphore
pub struct GuardSemaphore {
    sem: NonNull<libc::sem_t>,
    name: String,
}

// SAFETY: sem_* operations are thread-safe on a process-shared semaphore
unsafe impl Send for GuardSemaphore {}
unsafe impl Sync for GuardSemaphore {}

impl GuardSemaphore {
    /// Semaphore name for the segment with id `shm_id`
    pub fn name_for(shm_id: i32) -> Result<String> {
        let key = shm::kernel_key(shm_id).map_err(|source| SemShmError::SemName { shm_id, source })?;
        Ok(format!("/{}", key))
    }

    /// Open the guard for a segment, creating it (locked) if needed
    pub fn open_or_create(shm_id: i32) -> Result<Self> {
        let name = Self::name_for(shm_id)?;
        Self::open_named(&name)
    }

    /// Open or create a semaphore under an explicit name
    pub fn open_named(name: &str) -> Result<Self> {
        let c_name = CString::new(name).map_err(|e| SemShmError::SemOpen {
            name: name.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?;

        let mode = Mode::RUSR | Mode::WUSR | Mode::ROTH | Mode::WOTH;
        let raw = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT,
                mode.bits() as libc::c_uint,
                0 as libc::c_uint,
            )
        };
        if raw == libc::SEM_FAILED {
            return Err(SemShmError::SemOpen {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        let sem = NonNull::new(raw).ok_or_else(|| SemShmError::SemOpen {
            name: name.to_string(),
            source: io::Error::new(io::ErrorKind::Other, "sem_open returned null"),
        })?;

        let guard = Self {
            sem,
            name: name.to_string(),
        };
        tracing::debug!(name, value = ?guard.peek().ok(), "Opened guard semaphore");
        Ok(guard)
    }

    /// Name in the system semaphore namespace
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the lock
    ///
    /// Blocking mode waits until the count is positive; waiters are woken
    /// in whatever order the kernel chooses. Non-blocking mode returns
    /// [`Outcome::WouldBlock`] at once when the count is zero.
    pub fn acquire(&self, blocking: bool) -> Result<Outcome> {
        loop {
            let rc = unsafe {
                if blocking {
                    libc::sem_wait(self.sem.as_ptr())
                } else {
                    libc::sem_trywait(self.sem.as_ptr())
                }
            };
            if rc == 0 {
                tracing::trace!(name = %self.name, "Acquired guard");
                return Ok(Outcome::Done);
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EAGAIN) if !blocking => return Ok(Outcome::WouldBlock),
                _ => return Err(SemShmError::SemWait(err)),
            }
        }
    }

    /// Increment the count, waking at most one waiter
    pub fn release(&self) {
        if unsafe { libc::sem_post(self.sem.as_ptr()) } == -1 {
            tracing::warn!(
                name = %self.name,
                error = %io::Error::last_os_error(),
                "sem_post failed"
            );
            return;
        }
        tracing::trace!(name = %self.name, "Released guard");
    }

    /// Current count, for diagnostics only
    pub fn peek(&self) -> Result<i32> {
        let mut value: libc::c_int = 0;
        if unsafe { libc::sem_getvalue(self.sem.as_ptr(), &mut value) } == -1 {
            return Err(SemShmError::SemValue(io::Error::last_os_error()));
        }
        Ok(value)
    }

    /// Remove this semaphore's name; open handles stay usable
    pub fn unlink(&self) -> Result<()> {
        unlink_name(&self.name)
    }

    /// Remove the name of the guard belonging to segment `shm_id`
    pub fn unlink_for(shm_id: i32) -> Result<()> {
        let name = Self::name_for(shm_id)?;
        unlink_name(&name)
    }
}

impl Drop for GuardSemaphore {
    fn drop(&mut self) {
        if unsafe { libc::sem_close(self.sem.as_ptr()) } == -1 {
            tracing::warn!(
                name = %self.name,
                error = %io::Error::last_os_error(),
                "sem_close failed"
            );
        }
    }
}

fn unlink_name(name: &str) -> Result<()> {
    let c_name = CString::new(name).map_err(|e| SemShmError::SemUnlink {
        name: name.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, e),
    })?;
    if unsafe { libc::sem_unlink(c_name.as_ptr()) } == -1 {
        return Err(SemShmError::SemUnlink {
            name: name.to_string(),
            source: io::Error::last_os_error(),
        });
    }
    tracing::debug!(name, "Unlinked guard semaphore");
    Ok(())
}
