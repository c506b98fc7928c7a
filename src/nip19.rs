//! NIP-19 bech32 encodings for 32-byte keys (`nsec`, `npub`).

use bech32::{Bech32, Hrp};
use zeroize::Zeroizing;

use crate::error::{BridgeError, Result};

pub const NSEC_HRP: &str = "nsec";
pub const NPUB_HRP: &str = "npub";

/// Encode 32 bytes under the given human-readable part.
pub fn encode(hrp: &str, data: &[u8; 32]) -> Result<String> {
    let hrp = Hrp::parse(hrp).map_err(|e| BridgeError::InvalidInput(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, data).map_err(|e| BridgeError::InvalidInput(e.to_string()))
}

/// Decode a bech32 string, requiring the given human-readable part and a 32-byte payload.
pub fn decode(expected_hrp: &str, encoded: &str) -> Result<Zeroizing<[u8; 32]>> {
    let (hrp, data) = bech32::decode(encoded)
        .map_err(|e| BridgeError::MalformedKey(format!("Invalid bech32: {}", e)))?;
    let data = Zeroizing::new(data);

    if hrp.as_str() != expected_hrp {
        return Err(BridgeError::MalformedKey(format!(
            "Expected {} prefix, got {}",
            expected_hrp, hrp
        )));
    }
    if data.len() != 32 {
        return Err(BridgeError::MalformedKey(format!(
            "Expected 32 bytes, got {}",
            data.len()
        )));
    }

    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&data);
    Ok(out)
}
