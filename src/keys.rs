//! Key identities
//!
//! A [`KeyIdentity`] always carries its secret key. The public key is derived
//! once at creation through the signing capability and cached.

use std::fmt;
use tracing::info;
use zeroize::Zeroizing;

use crate::crypto::{SecretBytes, Signer};
use crate::error::{BridgeError, Result};
use crate::nip19;

pub struct KeyIdentity {
    secret_key: SecretBytes,
    public_key: [u8; 32],
}

impl KeyIdentity {
    /// Generate a fresh random identity.
    pub fn generate(signer: &dyn Signer) -> Result<Self> {
        let secret_key = signer.generate_secret()?;
        let identity = Self::from_secret(signer, secret_key)?;
        info!("Generated new key identity {}", identity.public_key_hex());
        Ok(identity)
    }

    /// Import an `nsec1…` bech32 or 64-character hex secret key.
    pub fn import(signer: &dyn Signer, encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        let secret_key = if encoded.starts_with(nip19::NSEC_HRP) {
            nip19::decode(nip19::NSEC_HRP, encoded)?
        } else {
            decode_hex_secret(encoded)?
        };
        Self::from_secret(signer, secret_key)
    }

    fn from_secret(signer: &dyn Signer, secret_key: SecretBytes) -> Result<Self> {
        let public_key = signer.derive_public(&secret_key).map_err(|e| match e {
            BridgeError::CryptoUnavailable(_) => e,
            other => BridgeError::MalformedKey(other.to_string()),
        })?;
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    #[cfg(test)]
    pub(crate) fn secret_key(&self) -> &[u8; 32] {
        &self.secret_key
    }

    /// Lowercase hex x-only public key.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// Lowercase hex secret key.
    pub fn secret_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.secret_key[..]))
    }

    pub fn npub(&self) -> Result<String> {
        nip19::encode(nip19::NPUB_HRP, &self.public_key)
    }

    pub fn nsec(&self) -> Result<Zeroizing<String>> {
        nip19::encode(nip19::NSEC_HRP, &self.secret_key).map(Zeroizing::new)
    }

    /// Sign a 32-byte digest with this identity's secret key.
    pub fn sign(&self, signer: &dyn Signer, digest: &[u8; 32]) -> Result<[u8; 64]> {
        signer.sign(&self.secret_key, digest)
    }
}

impl fmt::Debug for KeyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyIdentity")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Hex public key for an encoded secret key, without keeping the identity around.
pub fn public_key_from_secret(signer: &dyn Signer, encoded: &str) -> Result<String> {
    Ok(KeyIdentity::import(signer, encoded)?.public_key_hex())
}

fn decode_hex_secret(encoded: &str) -> Result<SecretBytes> {
    if encoded.len() != 64 {
        return Err(BridgeError::MalformedKey(format!(
            "Expected nsec or 64 hex characters, got {} characters",
            encoded.len()
        )));
    }
    let mut secret = Zeroizing::new([0u8; 32]);
    hex::decode_to_slice(encoded, &mut secret[..])
        .map_err(|e| BridgeError::MalformedKey(format!("Invalid hex: {}", e)))?;
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SchnorrSigner;

    const NSEC: &str = "nsec1vl029mgpspedva04g90vltkh6fvh240zqtv9k0t9af8935ke9laqsnlfe5";
    const SECRET_HEX: &str = "67dea2ed018072d675f5415ecfaed7d2597555e202d85b3d65ea4e58d2d92ffa";

    #[test]
    fn test_generate_derives_public_key() {
        let signer = SchnorrSigner::new();
        let identity = KeyIdentity::generate(&signer).unwrap();
        assert_eq!(
            signer.derive_public(identity.secret_key()).unwrap(),
            *identity.public_key()
        );
        assert_eq!(identity.public_key_hex().len(), 64);
    }

    #[test]
    fn test_nsec_and_hex_import_agree() {
        let signer = SchnorrSigner::new();
        let from_nsec = KeyIdentity::import(&signer, NSEC).unwrap();
        let from_hex = KeyIdentity::import(&signer, SECRET_HEX).unwrap();
        assert_eq!(from_nsec.public_key(), from_hex.public_key());
        assert_eq!(from_nsec.secret_key_hex().as_str(), SECRET_HEX);
        assert_eq!(from_nsec.nsec().unwrap().as_str(), NSEC);
    }

    #[test]
    fn test_malformed_keys_rejected() {
        let signer = SchnorrSigner::new();
        let non_hex = "zz".repeat(32);
        let zero = "00".repeat(32);
        for input in ["", "invalid_key", "nsec1qqqq", non_hex.as_str(), zero.as_str()] {
            assert!(
                matches!(KeyIdentity::import(&signer, input), Err(BridgeError::MalformedKey(_))),
                "accepted {:?}",
                input
            );
        }
    }

    #[test]
    fn test_scalar_above_curve_order_rejected() {
        let signer = SchnorrSigner::new();
        let result = KeyIdentity::import(&signer, &"ff".repeat(32));
        assert!(matches!(result, Err(BridgeError::MalformedKey(_))));
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = SchnorrSigner::new();
        let identity = KeyIdentity::import(&signer, SECRET_HEX).unwrap();
        assert!(!format!("{:?}", identity).contains(SECRET_HEX));
    }
}
