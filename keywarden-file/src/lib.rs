//! File-backed keyring for keywarden.
//!
//! One JSON document holds the caller grants, the public keys in the clear
//! and every private key sealed under a passphrase-derived key
//! (PBKDF2-HMAC-SHA256, then AES-256-CBC with an HMAC-SHA256 tag).

pub mod crypto;
pub mod store;
pub mod types;

pub use crypto::{CryptoError, SealingKeys};
pub use store::{FileKeyring, seal_private_key};
pub use types::{KdfParams, KeyEntry, KeyringFile, SealedKey};
