//! Caller-supplied output buffers
//!
//! Every string handed back across the boundary is written as UTF-8 followed by
//! a NUL terminator. If the buffer cannot hold all of it, nothing is written and
//! the required size is reported instead.

use crate::error::{BridgeError, Result};

/// Bytes needed to hold `text` plus its terminator.
pub fn required_len(text: &str) -> usize {
    text.len() + 1
}

/// Copy `text` and a trailing NUL into `out`, returning the bytes written.
pub fn write_terminated(text: &str, out: &mut [u8]) -> Result<usize> {
    let required = required_len(text);
    if out.len() < required {
        return Err(BridgeError::BufferTooSmall { required });
    }

    out[..text.len()].copy_from_slice(text.as_bytes());
    out[text.len()] = 0;
    Ok(required)
}
