//! C ABI
//!
//! Conventions shared by every function:
//!
//! * status returns are `int32_t`: `0` on success, a stable negative code on
//!   error (see [`BridgeError::status_code`]);
//! * handles are `uint64_t` and `0` is never valid; creating functions write
//!   the new handle through an out pointer and only on success;
//! * string outputs go to a caller buffer `(out, capacity, out_required)`. The
//!   return value is the number of bytes written including the NUL terminator.
//!   On `BufferTooSmall` nothing is written and `*out_required` (if non-null)
//!   receives the size to retry with;
//! * text inputs are NUL-terminated UTF-8;
//! * panics never cross the boundary; they surface as the runtime error code.

use once_cell::sync::OnceCell;
use std::ffi::{c_char, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use tracing::{error, warn};

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::{status_message, BridgeError, Result, STATUS_OK};
use crate::logging;
use crate::registry::Handle;

static BRIDGE: OnceCell<Bridge> = OnceCell::new();

fn bridge() -> Result<&'static Bridge> {
    BRIDGE.get_or_try_init(|| {
        let config = BridgeConfig::load(None)?;
        logging::init(&config.logging);
        Bridge::new(config)
    })
}

fn guard(f: impl FnOnce() -> Result<i32>) -> i32 {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => {
            if !matches!(e, BridgeError::BufferTooSmall { .. }) {
                warn!("Boundary call failed: {}", e);
            }
            e.status_code()
        }
        Err(_) => {
            error!("Panic caught at the C boundary");
            BridgeError::Runtime("panic".to_string()).status_code()
        }
    }
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn read_text<'a>(ptr: *const c_char) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(BridgeError::InvalidInput("null text pointer".to_string()));
    }
    Ok(CStr::from_ptr(ptr).to_str()?)
}

/// # Safety
/// `out` must be null or valid for writing one `u64`.
unsafe fn write_handle(out: *mut u64, handle: Handle) -> Result<i32> {
    *out = handle.into_raw();
    Ok(STATUS_OK)
}

fn require_out(out: *mut u64) -> Result<()> {
    if out.is_null() {
        return Err(BridgeError::InvalidInput("null handle out pointer".to_string()));
    }
    Ok(())
}

/// # Safety
/// When `capacity > 0`, `out` must be valid for writing `capacity` bytes.
/// `out_required` must be null or valid for writing one `usize`.
unsafe fn export(
    out: *mut c_char,
    capacity: usize,
    out_required: *mut usize,
    write: impl FnOnce(&mut [u8]) -> Result<usize>,
) -> Result<i32> {
    let buffer: &mut [u8] = if capacity == 0 {
        &mut []
    } else if out.is_null() {
        return Err(BridgeError::InvalidInput("null output buffer".to_string()));
    } else {
        std::slice::from_raw_parts_mut(out.cast::<u8>(), capacity)
    };

    let result = write(buffer);
    let required = match &result {
        Ok(written) => Some(*written),
        Err(BridgeError::BufferTooSmall { required }) => Some(*required),
        Err(_) => None,
    };
    if let (Some(required), false) = (required, out_required.is_null()) {
        *out_required = required;
    }

    let written = result?;
    i32::try_from(written).map_err(|_| {
        BridgeError::InvalidInput(format!("{} bytes exceed the status range", written))
    })
}

/// Load configuration from `config_path` (or defaults and environment when
/// null) and install logging. Calls after the first successful one are no-ops.
///
/// # Safety
/// `config_path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn nostr_bridge_init(config_path: *const c_char) -> i32 {
    guard(|| {
        let path = if config_path.is_null() {
            None
        } else {
            Some(Path::new(read_text(config_path)?))
        };
        let config = BridgeConfig::load(path)?;
        logging::init(&config.logging);

        let mut created = false;
        BRIDGE.get_or_try_init(|| {
            created = true;
            Bridge::new(config)
        })?;
        if !created {
            warn!("nostr_bridge_init called after initialization; configuration ignored");
        }
        Ok(STATUS_OK)
    })
}

/// Static NUL-terminated description of a status code. Never freed.
#[no_mangle]
pub extern "C" fn nostr_status_message(code: i32) -> *const c_char {
    status_message(code).as_ptr().cast()
}

// Key management

/// # Safety
/// `out_keys` must be valid for writing one `u64`.
#[no_mangle]
pub unsafe extern "C" fn nostr_keys_generate(out_keys: *mut u64) -> i32 {
    guard(|| {
        require_out(out_keys)?;
        write_handle(out_keys, bridge()?.generate_keys()?)
    })
}

/// Import an `nsec1…` or hex secret key.
///
/// # Safety
/// `nsec` must be a valid NUL-terminated string; `out_keys` must be valid for
/// writing one `u64`.
#[no_mangle]
pub unsafe extern "C" fn nostr_keys_from_nsec(nsec: *const c_char, out_keys: *mut u64) -> i32 {
    guard(|| {
        require_out(out_keys)?;
        let nsec = read_text(nsec)?;
        write_handle(out_keys, bridge()?.import_keys(nsec)?)
    })
}

/// Hex public key.
///
/// # Safety
/// See the module-level buffer conventions.
#[no_mangle]
pub unsafe extern "C" fn nostr_keys_public_key(
    keys: u64,
    out: *mut c_char,
    capacity: usize,
    out_required: *mut usize,
) -> i32 {
    guard(|| {
        let bridge = bridge()?;
        export(out, capacity, out_required, |buf| {
            bridge.export_public_key(Handle::from_raw(keys), buf)
        })
    })
}

/// Hex secret key. Callers should zero the buffer after use.
///
/// # Safety
/// See the module-level buffer conventions.
#[no_mangle]
pub unsafe extern "C" fn nostr_keys_secret_key(
    keys: u64,
    out: *mut c_char,
    capacity: usize,
    out_required: *mut usize,
) -> i32 {
    guard(|| {
        let bridge = bridge()?;
        export(out, capacity, out_required, |buf| {
            bridge.export_secret_key(Handle::from_raw(keys), buf)
        })
    })
}

/// Bech32 `npub1…` public key.
///
/// # Safety
/// See the module-level buffer conventions.
#[no_mangle]
pub unsafe extern "C" fn nostr_keys_npub(
    keys: u64,
    out: *mut c_char,
    capacity: usize,
    out_required: *mut usize,
) -> i32 {
    guard(|| {
        let bridge = bridge()?;
        export(out, capacity, out_required, |buf| {
            bridge.export_npub(Handle::from_raw(keys), buf)
        })
    })
}

/// Bech32 `nsec1…` secret key. Callers should zero the buffer after use.
///
/// # Safety
/// See the module-level buffer conventions.
#[no_mangle]
pub unsafe extern "C" fn nostr_keys_nsec(
    keys: u64,
    out: *mut c_char,
    capacity: usize,
    out_required: *mut usize,
) -> i32 {
    guard(|| {
        let bridge = bridge()?;
        export(out, capacity, out_required, |buf| {
            bridge.export_nsec(Handle::from_raw(keys), buf)
        })
    })
}

#[no_mangle]
pub extern "C" fn nostr_keys_free(keys: u64) -> i32 {
    guard(|| {
        bridge()?.release_keys(Handle::from_raw(keys))?;
        Ok(STATUS_OK)
    })
}

// Event management

/// Build and sign a kind 1 note. The key handle is only borrowed.
///
/// # Safety
/// `content` must be a valid NUL-terminated string; `out_event` must be valid
/// for writing one `u64`.
#[no_mangle]
pub unsafe extern "C" fn nostr_event_builder_text_note(
    content: *const c_char,
    keys: u64,
    out_event: *mut u64,
) -> i32 {
    guard(|| {
        require_out(out_event)?;
        let content = read_text(content)?;
        write_handle(
            out_event,
            bridge()?.build_text_note(content, Handle::from_raw(keys))?,
        )
    })
}

/// Full event JSON.
///
/// # Safety
/// See the module-level buffer conventions.
#[no_mangle]
pub unsafe extern "C" fn nostr_event_as_json(
    event: u64,
    out: *mut c_char,
    capacity: usize,
    out_required: *mut usize,
) -> i32 {
    guard(|| {
        let bridge = bridge()?;
        export(out, capacity, out_required, |buf| {
            bridge.serialize_event(Handle::from_raw(event), buf)
        })
    })
}

/// Hex event id.
///
/// # Safety
/// See the module-level buffer conventions.
#[no_mangle]
pub unsafe extern "C" fn nostr_event_id(
    event: u64,
    out: *mut c_char,
    capacity: usize,
    out_required: *mut usize,
) -> i32 {
    guard(|| {
        let bridge = bridge()?;
        export(out, capacity, out_required, |buf| {
            bridge.export_event_id(Handle::from_raw(event), buf)
        })
    })
}

#[no_mangle]
pub extern "C" fn nostr_event_free(event: u64) -> i32 {
    guard(|| {
        bridge()?.release_event(Handle::from_raw(event))?;
        Ok(STATUS_OK)
    })
}

// Client management

/// # Safety
/// `out_client` must be valid for writing one `u64`.
#[no_mangle]
pub unsafe extern "C" fn nostr_client_new(out_client: *mut u64) -> i32 {
    guard(|| {
        require_out(out_client)?;
        write_handle(out_client, bridge()?.new_client())
    })
}

/// # Safety
/// `url` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn nostr_client_add_relay(client: u64, url: *const c_char) -> i32 {
    guard(|| {
        let url = read_text(url)?;
        bridge()?.add_relay(Handle::from_raw(client), url)?;
        Ok(STATUS_OK)
    })
}

/// Returns `1` if the relay was removed, `0` if it was not present.
///
/// # Safety
/// `url` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn nostr_client_remove_relay(client: u64, url: *const c_char) -> i32 {
    guard(|| {
        let url = read_text(url)?;
        let removed = bridge()?.remove_relay(Handle::from_raw(client), url)?;
        Ok(i32::from(removed))
    })
}

#[no_mangle]
pub extern "C" fn nostr_client_connect(client: u64) -> i32 {
    guard(|| {
        bridge()?.connect(Handle::from_raw(client))?;
        Ok(STATUS_OK)
    })
}

#[no_mangle]
pub extern "C" fn nostr_client_disconnect(client: u64) -> i32 {
    guard(|| {
        bridge()?.disconnect(Handle::from_raw(client))?;
        Ok(STATUS_OK)
    })
}

/// Publish to every connected relay. Success means the event was transmitted
/// to at least one relay (or accepted by one, with `relay.require_ack`).
#[no_mangle]
pub extern "C" fn nostr_client_send_event(client: u64, event: u64) -> i32 {
    guard(|| {
        bridge()?.send_event(Handle::from_raw(client), Handle::from_raw(event))?;
        Ok(STATUS_OK)
    })
}

/// Number of relays in the session, or a negative status.
#[no_mangle]
pub extern "C" fn nostr_client_relay_count(client: u64) -> i32 {
    guard(|| {
        let count = bridge()?.relay_status(Handle::from_raw(client))?.len();
        i32::try_from(count).map_err(|_| BridgeError::InvalidInput("too many relays".to_string()))
    })
}

/// Number of relays currently connected, or a negative status.
#[no_mangle]
pub extern "C" fn nostr_client_connected_count(client: u64) -> i32 {
    guard(|| {
        let count = bridge()?
            .relay_status(Handle::from_raw(client))?
            .iter()
            .filter(|status| status.state == crate::relay::RelayState::Connected)
            .count();
        i32::try_from(count).map_err(|_| BridgeError::InvalidInput("too many relays".to_string()))
    })
}

/// Close every relay connection, then free the client.
#[no_mangle]
pub extern "C" fn nostr_client_free(client: u64) -> i32 {
    guard(|| {
        bridge()?.release_client(Handle::from_raw(client))?;
        Ok(STATUS_OK)
    })
}
