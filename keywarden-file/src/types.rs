use std::collections::HashMap;

use base64::prelude::{BASE64_STANDARD, Engine};
use keywarden_core::{CallerId, KeyId};
use rand::RngCore;
use serde::{Deserialize, Serialize};

pub const FILE_FORMAT_VERSION: u32 = 1;
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 200_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    pub salt: String,
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        let mut salt = [0u8; 32];
        rand::rng().fill_bytes(&mut salt);
        Self {
            salt: BASE64_STANDARD.encode(salt),
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

/// A private key sealed with [`SealingKeys`](crate::crypto::SealingKeys):
/// `data` is base64 of `IV || ciphertext`, `hmac` the tag over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedKey {
    pub data: String,
    pub hmac: String,
}

impl SealedKey {
    pub fn new(encrypted: &[u8], hmac: &[u8]) -> Self {
        Self {
            data: BASE64_STANDARD.encode(encrypted),
            hmac: BASE64_STANDARD.encode(hmac),
        }
    }

    pub fn data_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.data)
    }

    pub fn hmac_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.hmac)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEntry {
    /// OpenSSH `authorized_keys` line.
    pub public_key: String,
    pub private_key: SealedKey,
}

/// On-disk keyring document.
///
/// `grants` lists, per caller, the keys that caller may sign with.  The list
/// order is the order keys are tried in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyringFile {
    pub version: u32,
    pub kdf: KdfParams,
    #[serde(default)]
    pub grants: HashMap<CallerId, Vec<KeyId>>,
    #[serde(default)]
    pub keys: HashMap<KeyId, KeyEntry>,
}

impl KeyringFile {
    pub fn new(kdf: KdfParams) -> Self {
        Self {
            version: FILE_FORMAT_VERSION,
            kdf,
            grants: HashMap::new(),
            keys: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let file: KeyringFile = serde_json::from_str(
            r#"{ "version": 1, "kdf": { "salt": "AAAA", "iterations": 10 } }"#,
        )
        .unwrap();
        assert_eq!(file.version, FILE_FORMAT_VERSION);
        assert!(file.grants.is_empty());
        assert!(file.keys.is_empty());
    }

    #[test]
    fn grants_keep_list_order() {
        let file: KeyringFile = serde_json::from_str(
            r#"{
                "version": 1,
                "kdf": { "salt": "AAAA", "iterations": 10 },
                "grants": { "alice": ["ssh/z", "ssh/a", "ssh/m"] }
            }"#,
        )
        .unwrap();
        let keys: Vec<&str> = file.grants[&CallerId::new("alice")]
            .iter()
            .map(KeyId::as_str)
            .collect();
        assert_eq!(keys, ["ssh/z", "ssh/a", "ssh/m"]);
    }

    #[test]
    fn default_kdf_has_fresh_salt() {
        let a = KdfParams::default();
        let b = KdfParams::default();
        assert_ne!(a.salt, b.salt);
        assert_eq!(a.iterations, DEFAULT_PBKDF2_ITERATIONS);
        assert_eq!(BASE64_STANDARD.decode(&a.salt).unwrap().len(), 32);
    }

    #[test]
    fn sealed_key_rejects_bad_base64() {
        let sealed = SealedKey {
            data: "!!".into(),
            hmac: "AAAA".into(),
        };
        assert!(sealed.data_bytes().is_err());
        assert!(sealed.hmac_bytes().is_ok());
    }
}
