//! SemShm - Semaphore-guarded shared memory channels
//!
//! Processes on one host exchange fixed-size binary payloads through a
//! System V shared memory segment identified by an application-chosen
//! key. A named POSIX semaphore derived from that key serializes access.
//!
//! # Architecture
//!
//! - **Segment** ([`ShmSegment`]): created by the first opener, attached by
//!   everyone else, destroyed by whoever detaches last
//! - **Guard** ([`GuardSemaphore`]): blocking and non-blocking acquire,
//!   release, peek
//! - **Guarded channel** ([`GuardedChannel`]): read / write /
//!   read-modify-write with explicit locking flags
//! - **Channel** ([`Channel`]): the handle a process holds, carrying its
//!   default locking policy
//!
//! ```no_run
//! use semshm::{Channel, ChannelConfig};
//!
//! let chan = Channel::open_with(0x12, 64, ChannelConfig::exclusive())?;
//! chan.write(b"hello")?;
//! let mut buf = [0u8; 5];
//! chan.read(&mut buf)?;
//! chan.remove()?;
//! # Ok::<(), semshm::SemShmError>(())
//! ```

pub mod error;
pub mod shm;
pub mod semaphore;
pub mod guarded;
pub mod channel;
pub mod record;
pub mod config;
pub mod bindings;

pub use error::{SemShmError, Result};
pub use shm::{DetachedSegment, ShmSegment, Teardown};
pub use semaphore::{GuardSemaphore, Outcome};
pub use guarded::GuardedChannel;
pub use channel::{Channel, ChannelConfig};
pub use record::Record;
pub use config::MulticastConfig;
