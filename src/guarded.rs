//! Semaphore-guarded access to a shared memory segment
//!
//! All transfers start at offset 0 of the segment. Lengths are checked
//! against the capacity before the guard is touched.

use crate::error::{Result, SemShmError};
use crate::semaphore::{GuardSemaphore, Outcome};
use crate::shm::{ShmSegment, Teardown};

/// Releases the guard when dropped, so a panicking transform cannot
/// leave the lock held
struct Held<'a>(&'a GuardSemaphore);

impl Drop for Held<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// A segment paired with its guard semaphore
pub struct GuardedChannel {
    segment: ShmSegment,
    semaphore: GuardSemaphore,
}

impl GuardedChannel {
    /// Create or attach the segment for `key`, then open its guard
    ///
    /// The creator posts the guard once so that it starts out free.
    /// Attachers that race ahead of that post simply wait on a locked
    /// semaphore until it happens.
    pub fn open(key: i32, size: usize) -> Result<Self> {
        let segment = ShmSegment::open(key, size)?;
        let semaphore = GuardSemaphore::open_or_create(segment.id())?;
        if segment.is_created() {
            semaphore.release();
        }
        Ok(Self::new(segment, semaphore))
    }

    /// Pair an already opened segment with its guard
    pub fn new(segment: ShmSegment, semaphore: GuardSemaphore) -> Self {
        Self { segment, semaphore }
    }

    pub fn segment(&self) -> &ShmSegment {
        &self.segment
    }

    pub fn semaphore(&self) -> &GuardSemaphore {
        &self.semaphore
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.segment.size()
    }

    #[inline]
    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.capacity() {
            return Err(SemShmError::BufferOverflow {
                max: self.capacity(),
                got: len,
            });
        }
        Ok(())
    }

    /// Copy `data` into the segment
    ///
    /// With `take_lock` the guard is acquired first. The guard is released
    /// after the copy either way, so `take_lock = false` closes a critical
    /// section the caller opened earlier (typically with a non-releasing
    /// [`read`](Self::read)).
    pub fn write(&self, data: &[u8], blocking: bool, take_lock: bool) -> Result<Outcome> {
        self.check_len(data.len())?;

        if take_lock && self.semaphore.acquire(blocking)?.would_block() {
            return Ok(Outcome::WouldBlock);
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.segment.as_ptr(), data.len());
        }

        self.semaphore.release();
        Ok(Outcome::Done)
    }

    /// Copy the first `buf.len()` bytes of the segment into `buf`
    ///
    /// The guard is always acquired. Without `release_after` it stays held
    /// when this returns and the caller must end the critical section with
    /// [`release`](Self::release) or a `take_lock = false` write. Forgetting
    /// to do so starves every other participant.
    pub fn read(&self, buf: &mut [u8], blocking: bool, release_after: bool) -> Result<Outcome> {
        self.check_len(buf.len())?;

        if self.semaphore.acquire(blocking)?.would_block() {
            return Ok(Outcome::WouldBlock);
        }

        unsafe {
            std::ptr::copy_nonoverlapping(self.segment.as_ptr(), buf.as_mut_ptr(), buf.len());
        }

        if release_after {
            self.semaphore.release();
        }
        Ok(Outcome::Done)
    }

    /// Read into `buf`, run `transform` on it and write it back, all under
    /// one acquisition of the guard
    ///
    /// `transform` runs exactly once with the lock held and must not call
    /// back into this channel's guarded operations.
    pub fn read_modify_write<F>(&self, buf: &mut [u8], blocking: bool, transform: F) -> Result<Outcome>
    where
        F: FnOnce(&mut [u8]),
    {
        self.check_len(buf.len())?;

        if self.semaphore.acquire(blocking)?.would_block() {
            return Ok(Outcome::WouldBlock);
        }
        let _held = Held(&self.semaphore);

        let base = self.segment.as_ptr();
        unsafe {
            std::ptr::copy_nonoverlapping(base, buf.as_mut_ptr(), buf.len());
        }
        transform(buf);
        unsafe {
            std::ptr::copy_nonoverlapping(buf.as_ptr(), base, buf.len());
        }

        Ok(Outcome::Done)
    }

    /// Take the guard without touching the bytes
    pub fn acquire(&self, blocking: bool) -> Result<Outcome> {
        self.semaphore.acquire(blocking)
    }

    /// End a caller-composed critical section
    pub fn release(&self) {
        self.semaphore.release();
    }

    /// Current guard count, for diagnostics only
    pub fn peek(&self) -> Result<i32> {
        self.semaphore.peek()
    }

    /// Detach, then destroy segment and guard if nobody else is attached
    pub fn remove(self) -> Result<Teardown> {
        let Self { segment, semaphore } = self;
        drop(semaphore);
        segment.detach()?.remove_if_unreferenced()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::tests::unique_key;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_creator_initializes_guard() {
        let key = unique_key();
        let a = GuardedChannel::open(key, 64).unwrap();
        assert!(a.segment().is_created());
        assert_eq!(a.peek().unwrap(), 1);

        let b = GuardedChannel::open(key, 64).unwrap();
        assert!(!b.segment().is_created());
        assert_eq!(b.peek().unwrap(), 1);

        assert_eq!(b.remove().unwrap(), Teardown::Detached { remaining: 1 });
        assert_eq!(a.remove().unwrap(), Teardown::Destroyed);
    }

    #[test]
    fn test_write_read_round_trip() {
        let key = unique_key();
        let chan = GuardedChannel::open(key, 64).unwrap();

        for len in [0usize, 1, 13, 64] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7 + len) as u8).collect();
            assert!(chan.write(&payload, true, true).unwrap().is_done());

            let mut buf = vec![0u8; len];
            assert!(chan.read(&mut buf, true, true).unwrap().is_done());
            assert_eq!(buf, payload);
        }
        assert_eq!(chan.peek().unwrap(), 1);

        chan.remove().unwrap();
    }

    #[test]
    fn test_oversized_operations_rejected() {
        let key = unique_key();
        let chan = GuardedChannel::open(key, 8).unwrap();

        let err = chan.write(&[0u8; 9], true, true).unwrap_err();
        assert!(matches!(err, SemShmError::BufferOverflow { max: 8, got: 9 }));

        let mut buf = [0u8; 16];
        assert!(chan.read(&mut buf, true, true).is_err());
        assert!(chan.read_modify_write(&mut buf, true, |_| {}).is_err());

        // Guard untouched
        assert_eq!(chan.peek().unwrap(), 1);
        chan.remove().unwrap();
    }

    #[test]
    fn test_non_releasing_read_holds_guard() {
        let key = unique_key();
        let holder = GuardedChannel::open(key, 16).unwrap();
        let other = GuardedChannel::open(key, 16).unwrap();

        assert!(holder.write(b"committed", true, true).unwrap().is_done());

        let mut buf = [0u8; 9];
        assert!(holder.read(&mut buf, false, false).unwrap().is_done());
        assert_eq!(holder.peek().unwrap(), 0);

        // Contention leaves the bytes alone
        assert_eq!(other.write(b"clobbered", false, true).unwrap(), Outcome::WouldBlock);
        let mut seen = [0u8; 9];
        assert_eq!(other.read(&mut seen, false, true).unwrap(), Outcome::WouldBlock);

        // Finish the composed critical section with an unlocked write
        assert!(holder.write(b"updated!!", true, false).unwrap().is_done());
        assert_eq!(holder.peek().unwrap(), 1);

        assert!(other.read(&mut seen, true, true).unwrap().is_done());
        assert_eq!(&seen, b"updated!!");

        other.remove().unwrap();
        holder.remove().unwrap();
    }

    #[test]
    fn test_read_modify_write_releases_on_panic() {
        let key = unique_key();
        let chan = GuardedChannel::open(key, 4).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut buf = [0u8; 4];
            let _ = chan.read_modify_write(&mut buf, true, |_| panic!("transform failed"));
        }));
        assert!(result.is_err());
        assert_eq!(chan.peek().unwrap(), 1);

        chan.remove().unwrap();
    }

    #[test]
    fn test_concurrent_increments() {
        const THREADS: usize = 4;
        const ROUNDS: u32 = 250;

        let key = unique_key();
        let owner = GuardedChannel::open(key, 8).unwrap();
        assert!(owner.write(&7u32.to_le_bytes(), true, true).unwrap().is_done());

        let barrier = Barrier::new(THREADS);
        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    let chan = GuardedChannel::open(key, 8).unwrap();
                    barrier.wait();
                    for _ in 0..ROUNDS {
                        let mut buf = [0u8; 4];
                        let outcome = chan
                            .read_modify_write(&mut buf, true, |b| {
                                let n = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                                b.copy_from_slice(&(n + 1).to_le_bytes());
                            })
                            .unwrap();
                        assert!(outcome.is_done());
                    }
                    chan.remove().unwrap();
                });
            }
        });

        let mut buf = [0u8; 4];
        assert!(owner.read(&mut buf, true, true).unwrap().is_done());
        assert_eq!(u32::from_le_bytes(buf), 7 + THREADS as u32 * ROUNDS);
        assert_eq!(owner.remove().unwrap(), Teardown::Destroyed);
    }

    #[test]
    fn test_writes_never_tear() {
        const LEN: usize = 256;
        let key = unique_key();
        let owner = GuardedChannel::open(key, LEN).unwrap();
        assert!(owner.write(&[0u8; LEN], true, true).unwrap().is_done());

        thread::scope(|s| {
            for fill in 1..=3u8 {
                s.spawn(move || {
                    let chan = GuardedChannel::open(key, LEN).unwrap();
                    for _ in 0..200 {
                        assert!(chan.write(&[fill; LEN], true, true).unwrap().is_done());
                    }
                    chan.remove().unwrap();
                });
            }
            s.spawn(|| {
                let chan = GuardedChannel::open(key, LEN).unwrap();
                let mut buf = [0u8; LEN];
                for _ in 0..500 {
                    assert!(chan.read(&mut buf, true, true).unwrap().is_done());
                    assert!(buf.iter().all(|&b| b == buf[0]), "torn read: {:?}", &buf[..8]);
                }
                chan.remove().unwrap();
            });
        });

        owner.remove().unwrap();
    }
}
