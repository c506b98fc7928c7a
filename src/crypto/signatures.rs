use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{schnorr, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{BridgeError, Result};

/// 32 secret bytes that are scrubbed when dropped.
pub type SecretBytes = Zeroizing<[u8; 32]>;

/// Signing capability used by keys and events.
///
/// Production code uses [`SchnorrSigner`]; tests substitute deterministic or
/// failing implementations.
pub trait Signer: Send + Sync {
    /// Produce a fresh, valid secret key.
    fn generate_secret(&self) -> Result<SecretBytes>;

    /// Derive the x-only public key for a secret key.
    fn derive_public(&self, secret: &[u8; 32]) -> Result<[u8; 32]>;

    /// Sign a 32-byte digest.
    fn sign(&self, secret: &[u8; 32], digest: &[u8; 32]) -> Result<[u8; 64]>;

    /// Check a signature over a 32-byte digest.
    fn verify(&self, public_key: &[u8; 32], digest: &[u8; 32], signature: &[u8; 64]) -> bool;
}

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// BIP-340 Schnorr signatures over secp256k1 with OS entropy.
pub struct SchnorrSigner {
    secp: Secp256k1<secp256k1::All>,
}

impl SchnorrSigner {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    fn keypair(&self, secret: &[u8; 32]) -> Result<Keypair> {
        let secret_key = SecretKey::from_slice(secret)
            .map_err(|e| BridgeError::MalformedKey(format!("Invalid secret scalar: {}", e)))?;
        Ok(Keypair::from_secret_key(&self.secp, &secret_key))
    }

    fn fill_random(buf: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| BridgeError::CryptoUnavailable(format!("Entropy source failed: {}", e)))
    }
}

impl Default for SchnorrSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl Signer for SchnorrSigner {
    fn generate_secret(&self) -> Result<SecretBytes> {
        let mut secret = Zeroizing::new([0u8; 32]);
        // Roughly one in 2^128 draws falls outside the curve order.
        loop {
            Self::fill_random(&mut secret[..])?;
            if SecretKey::from_slice(&secret[..]).is_ok() {
                return Ok(secret);
            }
        }
    }

    fn derive_public(&self, secret: &[u8; 32]) -> Result<[u8; 32]> {
        let (xonly, _parity) = self.keypair(secret)?.x_only_public_key();
        Ok(xonly.serialize())
    }

    fn sign(&self, secret: &[u8; 32], digest: &[u8; 32]) -> Result<[u8; 64]> {
        let keypair = self.keypair(secret)?;
        let message = Message::from_digest_slice(digest)
            .map_err(|e| BridgeError::CryptoUnavailable(format!("Invalid message digest: {}", e)))?;

        let mut aux_rand = Zeroizing::new([0u8; 32]);
        Self::fill_random(&mut aux_rand[..])?;

        let signature = self
            .secp
            .sign_schnorr_with_aux_rand(&message, &keypair, &aux_rand);
        let bytes: &[u8; 64] = signature.as_ref();
        Ok(*bytes)
    }

    fn verify(&self, public_key: &[u8; 32], digest: &[u8; 32], signature: &[u8; 64]) -> bool {
        let Ok(public_key) = XOnlyPublicKey::from_slice(public_key) else {
            return false;
        };
        let Ok(signature) = schnorr::Signature::from_slice(signature) else {
            return false;
        };
        let Ok(message) = Message::from_digest_slice(digest) else {
            return false;
        };

        self.secp
            .verify_schnorr(&signature, &message, &public_key)
            .is_ok()
    }
}
