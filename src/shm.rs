//! Low-level System V shared memory operations
//!
//! A segment is identified by an application-chosen key. The first process
//! to open a key creates the segment; everyone after that attaches to it.
//! Destruction is collective: whichever process detaches last and then
//! finds the attachment count at zero removes the segment together with
//! its guard semaphore name.

use crate::error::{Result, SemShmError};
use crate::semaphore::GuardSemaphore;
use rustix::fs::Mode;
use std::io;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

/// Permission bits for newly created segments (0666)
fn segment_mode() -> libc::c_int {
    let mode = Mode::RUSR | Mode::WUSR | Mode::RGRP | Mode::WGRP | Mode::ROTH | Mode::WOTH;
    mode.bits() as libc::c_int
}

/// Result of an `IPC_STAT` query on a segment id
pub(crate) fn stat_segment(shm_id: i32) -> io::Result<libc::shmid_ds> {
    // SAFETY: shmid_ds is plain old data, all-zero is a valid bit pattern
    let mut info: libc::shmid_ds = unsafe { std::mem::zeroed() };
    if unsafe { libc::shmctl(shm_id, libc::IPC_STAT, &mut info) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(info)
}

/// Key the kernel recorded for a segment id
pub(crate) fn kernel_key(shm_id: i32) -> io::Result<libc::key_t> {
    stat_segment(shm_id).map(|info| info.shm_perm.__key)
}

/// What a teardown left behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// This process detached; others are still attached
    Detached { remaining: u64 },
    /// Nobody was attached any more, the segment and its semaphore are gone
    Destroyed,
}

/// Handle to a System V shared memory segment mapped into this process
pub struct ShmSegment {
    key: i32,
    id: i32,
    addr: NonNull<u8>,
    size: usize,
    created: bool,
}

// SAFETY: the mapping stays valid until detach/drop; concurrent access to
// the bytes is serialized by the guard semaphore, not by this type
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Create the segment for `key`, or attach to it if it already exists
    ///
    /// `size` is only authoritative for the creator. An attacher asking for
    /// a size no larger than the existing segment succeeds without the
    /// sizes being compared, so every participant must agree on the
    /// capacity out of band.
    pub fn open(key: i32, size: usize) -> Result<Self> {
        let flags = libc::IPC_CREAT | libc::IPC_EXCL | segment_mode();

        // Try to create exclusively first, fall back to lookup if it exists
        let (id, created) = match unsafe { libc::shmget(key, size, flags) } {
            -1 => {
                tracing::debug!(key, "Segment exists, attaching as client");
                match unsafe { libc::shmget(key, size, 0) } {
                    -1 => {
                        return Err(SemShmError::ShmCreate {
                            key,
                            source: io::Error::last_os_error(),
                        })
                    }
                    id => (id, false),
                }
            }
            id => (id, true),
        };

        // Map into our address space
        let raw = unsafe { libc::shmat(id, ptr::null(), 0) };
        if raw == !0usize as *mut libc::c_void {
            return Err(SemShmError::ShmAttach {
                shm_id: id,
                source: io::Error::last_os_error(),
            });
        }
        let addr = NonNull::new(raw.cast::<u8>()).ok_or_else(|| SemShmError::ShmAttach {
            shm_id: id,
            source: io::Error::new(io::ErrorKind::Other, "shmat returned null"),
        })?;

        tracing::debug!(key, shm_id = id, size, created, "Attached shared memory segment");

        Ok(Self {
            key,
            id,
            addr,
            size,
            created,
        })
    }

    /// Get raw pointer to the mapped bytes
    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr()
    }

    /// Capacity requested at open time
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Application key
    #[inline(always)]
    pub fn key(&self) -> i32 {
        self.key
    }

    /// Kernel-assigned segment id
    #[inline(always)]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Check if this handle's open call created the segment
    #[inline(always)]
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Number of attachments the kernel currently reports
    pub fn attach_count(&self) -> Result<u64> {
        attach_count(self.id)
    }

    /// Unmap the segment from this process without destroying it
    pub fn detach(self) -> Result<DetachedSegment> {
        let this = ManuallyDrop::new(self);
        if unsafe { libc::shmdt(this.addr.as_ptr() as *const libc::c_void) } == -1 {
            return Err(SemShmError::ShmDetach {
                shm_id: this.id,
                source: io::Error::last_os_error(),
            });
        }
        tracing::debug!(key = this.key, shm_id = this.id, "Detached shared memory segment");
        Ok(DetachedSegment {
            key: this.key,
            id: this.id,
        })
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        // Unmap only; destruction is left to remove_if_unreferenced
        if unsafe { libc::shmdt(self.addr.as_ptr() as *const libc::c_void) } == -1 {
            tracing::warn!(
                shm_id = self.id,
                error = %io::Error::last_os_error(),
                "Failed to detach shared memory segment on drop"
            );
        }
    }
}

/// A segment this process no longer maps
#[derive(Debug, Clone, Copy)]
pub struct DetachedSegment {
    key: i32,
    id: i32,
}

impl DetachedSegment {
    pub fn key(&self) -> i32 {
        self.key
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Destroy the segment if no process is attached any more
    ///
    /// The attachment count is a point-in-time read. A process attaching
    /// between that read and `IPC_RMID` loses the race: its mapping stays
    /// valid but the key no longer resolves to the same segment.
    pub fn remove_if_unreferenced(&self) -> Result<Teardown> {
        let remaining = attach_count(self.id)?;
        tracing::debug!(shm_id = self.id, nattch = remaining, "Processes still attached");
        if remaining > 0 {
            return Ok(Teardown::Detached { remaining });
        }

        // Name resolution needs the segment, so unlink before IPC_RMID
        if let Err(e) = GuardSemaphore::unlink_for(self.id) {
            tracing::warn!(shm_id = self.id, error = %e, "Failed to unlink guard semaphore");
        }

        if unsafe { libc::shmctl(self.id, libc::IPC_RMID, ptr::null_mut()) } == -1 {
            return Err(SemShmError::ShmDestroy {
                shm_id: self.id,
                source: io::Error::last_os_error(),
            });
        }

        tracing::info!(key = self.key, shm_id = self.id, "Removed shared memory segment");
        Ok(Teardown::Destroyed)
    }
}

fn attach_count(shm_id: i32) -> Result<u64> {
    stat_segment(shm_id)
        .map(|info| info.shm_nattch as u64)
        .map_err(|source| SemShmError::ShmStat { shm_id, source })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    static NEXT_KEY: AtomicI32 = AtomicI32::new(1);

    /// A key unlikely to collide with other test runs or other tests
    ///
    /// Bits 11..29 carry the pid folded below 2^19, which keeps the key
    /// positive. Bits 9 and 10 tell unit tests (neither), integration tests
    /// (bit 10) and benches (both) apart; the rest is a per-process counter.
    pub(crate) fn unique_key() -> i32 {
        let pid = (std::process::id() % 0x7FFFF) as i32;
        (pid << 11) | (NEXT_KEY.fetch_add(1, Ordering::Relaxed) & 0x1FF)
    }

    #[test]
    fn test_unique_key_keeps_pid_bits() {
        let a = unique_key();
        let b = unique_key();
        assert!(a > 0 && b > 0);
        assert_ne!(a, b);
        assert_eq!(a >> 11, (std::process::id() % 0x7FFFF) as i32);
        assert_eq!(a & 0x600, 0);
    }

    #[test]
    fn test_create_then_attach() {
        let key = unique_key();

        let seg1 = ShmSegment::open(key, 64).unwrap();
        assert!(seg1.is_created());
        assert_eq!(seg1.size(), 64);

        // Write through the first mapping
        unsafe {
            std::ptr::write(seg1.as_ptr(), 42u8);
        }

        let seg2 = ShmSegment::open(key, 64).unwrap();
        assert!(!seg2.is_created());
        assert_eq!(seg2.id(), seg1.id());
        assert_eq!(seg1.attach_count().unwrap(), 2);

        let val = unsafe { std::ptr::read(seg2.as_ptr()) };
        assert_eq!(val, 42u8);

        let detached = seg2.detach().unwrap();
        assert_eq!(
            detached.remove_if_unreferenced().unwrap(),
            Teardown::Detached { remaining: 1 }
        );

        let detached = seg1.detach().unwrap();
        assert_eq!(detached.remove_if_unreferenced().unwrap(), Teardown::Destroyed);
    }

    #[test]
    fn test_key_reused_after_destroy() {
        let key = unique_key();

        let seg = ShmSegment::open(key, 32).unwrap();
        assert!(seg.is_created());
        let detached = seg.detach().unwrap();
        assert_eq!(detached.remove_if_unreferenced().unwrap(), Teardown::Destroyed);

        let seg = ShmSegment::open(key, 32).unwrap();
        assert!(seg.is_created());
        seg.detach().unwrap().remove_if_unreferenced().unwrap();
    }

    #[test]
    fn test_drop_detaches_without_destroying() {
        let key = unique_key();

        let seg1 = ShmSegment::open(key, 16).unwrap();
        let seg2 = ShmSegment::open(key, 16).unwrap();
        drop(seg2);
        assert_eq!(seg1.attach_count().unwrap(), 1);

        let detached = seg1.detach().unwrap();
        assert_eq!(detached.remove_if_unreferenced().unwrap(), Teardown::Destroyed);
    }

    #[test]
    fn test_kernel_key_matches() {
        let key = unique_key();
        let seg = ShmSegment::open(key, 16).unwrap();
        assert_eq!(kernel_key(seg.id()).unwrap(), key);
        seg.detach().unwrap().remove_if_unreferenced().unwrap();
    }

    #[test]
    fn test_stat_after_destroy_fails() {
        let key = unique_key();
        let detached = ShmSegment::open(key, 16).unwrap().detach().unwrap();
        detached.remove_if_unreferenced().unwrap();

        let err = detached.remove_if_unreferenced().unwrap_err();
        assert!(matches!(err, SemShmError::ShmStat { .. }));
    }
}
