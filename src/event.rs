//! Signed Nostr events (NIP-01)
//!
//! An event's id is the SHA-256 of the canonical array
//! `[0, pubkey, created_at, kind, tags, content]` serialized as compact JSON,
//! and its signature is a Schnorr signature over that id. Both are computed in
//! [`EventBuilder::sign`]; a [`SignedEvent`] is immutable once built.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer;
use crate::crypto::{sha256, Signer};
use crate::error::{BridgeError, Result};
use crate::keys::KeyIdentity;

pub const KIND_METADATA: u16 = 0;
pub const KIND_TEXT_NOTE: u16 = 1;

/// Profile fields for a kind 0 metadata event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nip05: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lud16: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Unsigned event contents; the pubkey and timestamp are filled in when signing.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    kind: u16,
    tags: Vec<Vec<String>>,
    content: String,
}

impl EventBuilder {
    pub fn new(kind: u16, content: impl Into<String>) -> Self {
        Self {
            kind,
            tags: Vec::new(),
            content: content.into(),
        }
    }

    /// Kind 1 short text note without tags.
    pub fn text_note(content: impl Into<String>) -> Self {
        Self::new(KIND_TEXT_NOTE, content)
    }

    /// Kind 1 text note with hashtag (`t`), event (`e`) and pubkey (`p`) tags.
    pub fn text_note_with_tags(
        content: impl Into<String>,
        tags: Vec<Vec<String>>,
    ) -> Result<Self> {
        for tag in &tags {
            validate_tag(tag)?;
        }
        Ok(Self {
            kind: KIND_TEXT_NOTE,
            tags,
            content: content.into(),
        })
    }

    /// Kind 0 profile metadata.
    pub fn metadata(metadata: &Metadata) -> Result<Self> {
        Ok(Self::new(KIND_METADATA, serde_json::to_string(metadata)?))
    }

    /// Sign with the current wall-clock time.
    pub fn sign(self, identity: &KeyIdentity, signer: &dyn Signer) -> Result<SignedEvent> {
        let created_at = Utc::now().timestamp().max(0) as u64;
        self.sign_at(identity, signer, created_at)
    }

    /// Sign with an explicit timestamp.
    pub fn sign_at(
        self,
        identity: &KeyIdentity,
        signer: &dyn Signer,
        created_at: u64,
    ) -> Result<SignedEvent> {
        let pubkey = identity.public_key_hex();
        let preimage =
            canonical_preimage(&pubkey, created_at, self.kind, &self.tags, &self.content)?;
        let id = sha256(preimage.as_bytes());
        let sig = identity.sign(signer, &id)?;

        let event = SignedEvent {
            id: hex::encode(id),
            pubkey,
            created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig: hex::encode(sig),
        };
        debug!("Signed event {} (kind {})", event.id, event.kind);
        Ok(event)
    }
}

/// A complete, signed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEvent {
    id: String,
    pubkey: String,
    created_at: u64,
    kind: u16,
    tags: Vec<Vec<String>>,
    content: String,
    sig: String,
}

impl SignedEvent {
    /// Build and sign a kind 1 note.
    pub fn text_note(content: &str, identity: &KeyIdentity, signer: &dyn Signer) -> Result<Self> {
        EventBuilder::text_note(content).sign(identity, signer)
    }

    /// Parse a serialized event and check its id and signature.
    pub fn from_json(json: &str, signer: &dyn Signer) -> Result<Self> {
        let event: SignedEvent = serde_json::from_str(json)?;
        if !event.verify(signer)? {
            return Err(BridgeError::InvalidInput(format!(
                "Event {} failed verification",
                event.id
            )));
        }
        Ok(event)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pubkey(&self) -> &str {
        &self.pubkey
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn kind(&self) -> u16 {
        self.kind
    }

    pub fn tags(&self) -> &[Vec<String>] {
        &self.tags
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sig(&self) -> &str {
        &self.sig
    }

    /// Full JSON representation including id and sig.
    pub fn as_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Write the JSON representation into a caller buffer.
    pub fn write_json(&self, out: &mut [u8]) -> Result<usize> {
        buffer::write_terminated(&self.as_json()?, out)
    }

    /// Recompute the id from the canonical fields and check the signature.
    pub fn verify(&self, signer: &dyn Signer) -> Result<bool> {
        let preimage = canonical_preimage(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )?;
        let id = sha256(preimage.as_bytes());
        if hex::encode(id) != self.id {
            return Ok(false);
        }

        let (Some(pubkey), Some(sig)) = (
            decode_fixed::<32>(&self.pubkey),
            decode_fixed::<64>(&self.sig),
        ) else {
            return Ok(false);
        };
        Ok(signer.verify(&pubkey, &id, &sig))
    }
}

/// Compact JSON of `[0, pubkey, created_at, kind, tags, content]`.
pub fn canonical_preimage(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> Result<String> {
    Ok(serde_json::to_string(&(0, pubkey, created_at, kind, tags, content))?)
}

fn validate_tag(tag: &[String]) -> Result<()> {
    let (name, value) = match tag {
        [name, value, ..] => (name.as_str(), value.as_str()),
        _ => {
            return Err(BridgeError::InvalidInput(format!(
                "Tag needs a name and a value: {:?}",
                tag
            )))
        }
    };

    match name {
        "t" if !value.is_empty() => Ok(()),
        "e" | "p" if is_lower_hex_64(value) => Ok(()),
        "t" | "e" | "p" => Err(BridgeError::InvalidInput(format!(
            "Malformed {} tag value: {}",
            name, value
        ))),
        other => Err(BridgeError::InvalidInput(format!("Unsupported tag: {}", other))),
    }
}

fn is_lower_hex_64(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn decode_fixed<const N: usize>(value: &str) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(value, &mut out).ok()?;
    Some(out)
}
