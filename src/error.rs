//! Error types for SemShm

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for SemShm operations
pub type Result<T> = std::result::Result<T, SemShmError>;

/// Errors that can occur in SemShm operations
///
/// Lock contention is not represented here: a non-blocking acquisition
/// that finds the guard taken reports [`Outcome::WouldBlock`](crate::Outcome).
#[derive(Debug, Error)]
pub enum SemShmError {
    /// Neither exclusive creation nor lookup of the segment succeeded
    #[error("Failed to create or open shared memory segment for key {key}: {source}")]
    ShmCreate {
        key: i32,
        #[source]
        source: io::Error,
    },

    /// Failed to map the segment into this process
    #[error("Failed to attach shared memory segment {shm_id}: {source}")]
    ShmAttach {
        shm_id: i32,
        #[source]
        source: io::Error,
    },

    /// Failed to unmap the segment from this process
    #[error("Failed to detach shared memory segment {shm_id}: {source}")]
    ShmDetach {
        shm_id: i32,
        #[source]
        source: io::Error,
    },

    /// `IPC_STAT` on the segment failed
    #[error("Failed to stat shared memory segment {shm_id}: {source}")]
    ShmStat {
        shm_id: i32,
        #[source]
        source: io::Error,
    },

    /// `IPC_RMID` on the segment failed
    #[error("Failed to destroy shared memory segment {shm_id}: {source}")]
    ShmDestroy {
        shm_id: i32,
        #[source]
        source: io::Error,
    },

    /// The semaphore name could not be derived from the segment
    #[error("Failed to resolve semaphore name for segment {shm_id}: {source}")]
    SemName {
        shm_id: i32,
        #[source]
        source: io::Error,
    },

    /// Failed to open or create the named semaphore
    #[error("Failed to open semaphore '{name}': {source}")]
    SemOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Waiting on the semaphore failed
    #[error("Failed to lock semaphore: {0}")]
    SemWait(#[source] io::Error),

    /// Reading the semaphore value failed
    #[error("Failed to read semaphore value: {0}")]
    SemValue(#[source] io::Error),

    /// Removing the semaphore name failed
    #[error("Failed to unlink semaphore '{name}': {source}")]
    SemUnlink {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Operation length exceeds the segment capacity
    #[error("Buffer overflow: max {max} bytes, got {got} bytes")]
    BufferOverflow { max: usize, got: usize },

    /// Failed to read a configuration file
    #[error("Failed to read config '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not a valid mapping of known value types
    #[error("Invalid config: {message}")]
    ConfigParse {
        line: Option<usize>,
        message: String,
    },

    /// A required configuration key is absent
    #[error("Missing config key '{0}'")]
    ConfigMissing(&'static str),
}

impl SemShmError {
    /// Whether this error came from tearing down a channel
    ///
    /// Teardown failures are non-fatal to the caller but may leave the
    /// segment behind in the IPC namespace (see `ipcs -m` / `ipcrm`).
    pub fn is_cleanup(&self) -> bool {
        matches!(
            self,
            SemShmError::ShmDetach { .. }
                | SemShmError::ShmDestroy { .. }
                | SemShmError::SemUnlink { .. }
        )
    }
}
