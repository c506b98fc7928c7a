pub mod signatures;

pub use signatures::{sha256, SchnorrSigner, SecretBytes, Signer};
