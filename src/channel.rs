//! High-level Channel API for SemShm
//!
//! A [`Channel`] is the one object a process holds for a shared memory
//! channel: the guarded segment plus the default locking behaviour of
//! its reads and writes.

use crate::error::Result;
use crate::guarded::GuardedChannel;
use crate::record::Record;
use crate::semaphore::Outcome;
use crate::shm::Teardown;

/// Per-handle locking policy
///
/// The defaults make writes self-contained (block, lock, unlock) while a
/// read is the opening step of a caller-composed critical section: it
/// does not wait and keeps the guard held afterwards. Close such a section
/// with [`Channel::release`] or a write with `write_takes_lock = false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Wait for the guard on write (and read-modify-write)
    pub write_blocking: bool,
    /// Acquire the guard before writing
    pub write_takes_lock: bool,
    /// Wait for the guard on read
    pub read_blocking: bool,
    /// Release the guard once a read has copied the bytes
    pub read_releases_lock: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            write_blocking: true,
            write_takes_lock: true,
            read_blocking: false,
            read_releases_lock: false,
        }
    }
}

impl ChannelConfig {
    /// Policy where every read and write is a complete, blocking critical section
    pub fn exclusive() -> Self {
        Self {
            write_blocking: true,
            write_takes_lock: true,
            read_blocking: true,
            read_releases_lock: true,
        }
    }
}

/// A process's handle on a named shared memory channel
///
/// Many processes hold a `Channel` for the same key; they are tied
/// together only by agreeing on key and capacity. The handle is closed by
/// [`remove`](Self::remove), which consumes it. Dropping it without
/// calling `remove` detaches but never destroys the segment.
pub struct Channel {
    inner: GuardedChannel,
    config: ChannelConfig,
}

impl Channel {
    /// Create or attach the channel for `key` with the default policy
    pub fn open(key: i32, capacity: usize) -> Result<Self> {
        Self::open_with(key, capacity, ChannelConfig::default())
    }

    /// Create or attach the channel for `key` with an explicit policy
    pub fn open_with(key: i32, capacity: usize, config: ChannelConfig) -> Result<Self> {
        let inner = GuardedChannel::open(key, capacity)?;
        tracing::debug!(
            key,
            capacity,
            created = inner.segment().is_created(),
            "Opened channel"
        );
        Ok(Self { inner, config })
    }

    /// Whether this handle's open created the segment
    #[inline]
    pub fn is_creator(&self) -> bool {
        self.inner.segment().is_created()
    }

    #[inline]
    pub fn key(&self) -> i32 {
        self.inner.segment().key()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn config(&self) -> ChannelConfig {
        self.config
    }

    pub fn set_config(&mut self, config: ChannelConfig) {
        self.config = config;
    }

    /// Lower layer, for operations with explicit flags
    pub fn guarded(&self) -> &GuardedChannel {
        &self.inner
    }

    /// Write `data` at offset 0 according to the handle's policy
    pub fn write(&self, data: &[u8]) -> Result<Outcome> {
        self.inner
            .write(data, self.config.write_blocking, self.config.write_takes_lock)
    }

    /// Read `buf.len()` bytes from offset 0 according to the handle's policy
    pub fn read(&self, buf: &mut [u8]) -> Result<Outcome> {
        self.inner
            .read(buf, self.config.read_blocking, self.config.read_releases_lock)
    }

    /// Atomically update the first `buf.len()` bytes with `transform`
    ///
    /// Waits for the guard when `write_blocking` is set.
    pub fn read_modify_write<F>(&self, buf: &mut [u8], transform: F) -> Result<Outcome>
    where
        F: FnOnce(&mut [u8]),
    {
        self.inner
            .read_modify_write(buf, self.config.write_blocking, transform)
    }

    /// Write one record
    pub fn write_record<R: Record>(&self, record: &R) -> Result<Outcome> {
        let mut buf = vec![0u8; R::LEN];
        record.encode(&mut buf);
        self.write(&buf)
    }

    /// Read one record; `None` when the guard was busy in non-blocking mode
    pub fn read_record<R: Record>(&self) -> Result<Option<R>> {
        let mut buf = vec![0u8; R::LEN];
        match self.read(&mut buf)? {
            Outcome::Done => Ok(Some(R::decode(&buf))),
            Outcome::WouldBlock => Ok(None),
        }
    }

    /// End a critical section opened by a non-releasing read
    pub fn release(&self) {
        self.inner.release();
    }

    /// Current guard count, for diagnostics only
    pub fn peek(&self) -> Result<i32> {
        self.inner.peek()
    }

    /// Close the handle: detach, and destroy the channel if this was the
    /// last attachment
    ///
    /// Plain synchronous call, suitable for a termination handler. A failed
    /// teardown can leave the segment in the IPC namespace (`ipcs -m`).
    pub fn remove(self) -> Result<Teardown> {
        let key = self.key();
        let teardown = self.inner.remove()?;
        tracing::debug!(key, ?teardown, "Removed channel");
        Ok(teardown)
    }
}
