//! C Bindings for SemShm
//!
//! Provides a raw C API over [`Channel`]. Status codes: `0` success,
//! `-1` error, `-2` the guard was busy in non-blocking mode.

use crate::channel::{Channel, ChannelConfig};
use crate::error::Result;
use crate::semaphore::Outcome;
use std::os::raw::{c_int, c_void};
use std::ptr;
use std::slice;

pub const SEMSHM_OK: c_int = 0;
pub const SEMSHM_ERROR: c_int = -1;
pub const SEMSHM_WOULD_BLOCK: c_int = -2;

/// Transform run on the copied bytes while the guard is held
pub type SemShmTransform = unsafe extern "C" fn(buf: *mut u8, len: usize, ctx: *mut c_void);

// Opaque handle
pub struct SemShmHandle(Channel);

/// Locking policy, mirrors [`ChannelConfig`]
#[repr(C)]
pub struct SemShmFlags {
    pub write_blocking: bool,
    pub write_takes_lock: bool,
    pub read_blocking: bool,
    pub read_releases_lock: bool,
}

impl From<SemShmFlags> for ChannelConfig {
    fn from(flags: SemShmFlags) -> Self {
        Self {
            write_blocking: flags.write_blocking,
            write_takes_lock: flags.write_takes_lock,
            read_blocking: flags.read_blocking,
            read_releases_lock: flags.read_releases_lock,
        }
    }
}

fn status(result: Result<Outcome>) -> c_int {
    match result {
        Ok(Outcome::Done) => SEMSHM_OK,
        Ok(Outcome::WouldBlock) => SEMSHM_WOULD_BLOCK,
        Err(e) => {
            tracing::warn!(error = %e, "semshm call failed");
            SEMSHM_ERROR
        }
    }
}

/// Open (create or attach) the channel for `key`
///
/// Writes 1 to `out_created` if this call created the segment, 0 otherwise.
/// Returns null on failure.
///
/// # Safety
/// `out_created` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn semshm_open(key: c_int, size: usize, out_created: *mut c_int) -> *mut SemShmHandle {
    match Channel::open(key, size) {
        Ok(channel) => {
            if !out_created.is_null() {
                *out_created = channel.is_creator() as c_int;
            }
            Box::into_raw(Box::new(SemShmHandle(channel)))
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "semshm_open failed");
            ptr::null_mut()
        }
    }
}

/// Replace the handle's locking policy
///
/// # Safety
/// `handle` must come from `semshm_open` and not yet be removed
#[no_mangle]
pub unsafe extern "C" fn semshm_set_flags(handle: *mut SemShmHandle, flags: SemShmFlags) {
    if let Some(handle) = handle.as_mut() {
        handle.0.set_config(flags.into());
    }
}

/// Write `len` bytes from `data` to the segment
///
/// # Safety
/// `handle` must be live, `data` valid for `len` bytes
#[no_mangle]
pub unsafe extern "C" fn semshm_write(handle: *mut SemShmHandle, data: *const u8, len: usize) -> c_int {
    let Some(handle) = handle.as_ref() else {
        return SEMSHM_ERROR;
    };
    if data.is_null() {
        return SEMSHM_ERROR;
    }
    let slice = slice::from_raw_parts(data, len);
    status(handle.0.write(slice))
}

/// Read `len` bytes from the segment into `buf`
///
/// # Safety
/// `handle` must be live, `buf` valid for `len` bytes
#[no_mangle]
pub unsafe extern "C" fn semshm_read(handle: *mut SemShmHandle, buf: *mut u8, len: usize) -> c_int {
    let Some(handle) = handle.as_ref() else {
        return SEMSHM_ERROR;
    };
    if buf.is_null() {
        return SEMSHM_ERROR;
    }
    let slice = slice::from_raw_parts_mut(buf, len);
    status(handle.0.read(slice))
}

/// Read `len` bytes into `buf`, call `cb(buf, len, ctx)` and write the
/// bytes back, all under one acquisition of the guard
///
/// Waits for the guard according to the handle's write-blocking flag.
/// A null callback is an error.
///
/// # Safety
/// `handle` must be live, `buf` valid for `len` bytes. `cb` must not call
/// back into this handle.
#[no_mangle]
pub unsafe extern "C" fn semshm_read_modify_write(
    handle: *mut SemShmHandle,
    buf: *mut u8,
    len: usize,
    cb: Option<SemShmTransform>,
    ctx: *mut c_void,
) -> c_int {
    let Some(handle) = handle.as_ref() else {
        return SEMSHM_ERROR;
    };
    let Some(cb) = cb else {
        return SEMSHM_ERROR;
    };
    if buf.is_null() {
        return SEMSHM_ERROR;
    }
    let slice = slice::from_raw_parts_mut(buf, len);
    status(
        handle
            .0
            .read_modify_write(slice, |bytes| cb(bytes.as_mut_ptr(), bytes.len(), ctx)),
    )
}

/// Release the guard held after a non-releasing read
///
/// # Safety
/// `handle` must be live
#[no_mangle]
pub unsafe extern "C" fn semshm_release(handle: *mut SemShmHandle) {
    if let Some(handle) = handle.as_ref() {
        handle.0.release();
    }
}

/// Current guard count, or -1 on error
///
/// # Safety
/// `handle` must be live
#[no_mangle]
pub unsafe extern "C" fn semshm_peek(handle: *mut SemShmHandle) -> c_int {
    match handle.as_ref().map(|h| h.0.peek()) {
        Some(Ok(value)) => value,
        _ => SEMSHM_ERROR,
    }
}

/// Detach and, if last, destroy the channel. Frees the handle.
///
/// # Safety
/// `handle` must come from `semshm_open`; it is invalid afterwards
#[no_mangle]
pub unsafe extern "C" fn semshm_remove(handle: *mut SemShmHandle) -> c_int {
    if handle.is_null() {
        return SEMSHM_ERROR;
    }
    let handle = Box::from_raw(handle);
    match handle.0.remove() {
        Ok(_) => SEMSHM_OK,
        Err(e) => {
            tracing::warn!(error = %e, "semshm_remove failed");
            SEMSHM_ERROR
        }
    }
}
