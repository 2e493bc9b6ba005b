use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub mod config;

/// Canonical SSH wire encoding of a public key (`string algorithm || fields`).
///
/// Compared by exact byte equality only.  The bytes are never interpreted by
/// the matching logic.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKeyBlob(Vec<u8>);

impl PublicKeyBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PublicKeyBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyBlob({} bytes)", self.0.len())
    }
}

/// Opaque reference to one stored key pair (e.g. a keyring entry name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Stable identifier of the principal asking for a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the caller from a transport principal such as
    /// `AROAEXAMPLEID:session-name`.
    ///
    /// Only the part before the first `:` identifies the caller; the session
    /// suffix changes per invocation and must not affect authorization.
    pub fn from_principal(principal: &str) -> Self {
        let caller = principal.split(':').next().unwrap_or_default();
        Self(caller.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored public half of a key pair, as an OpenSSH `authorized_keys` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshPublicKeyMaterial {
    pub openssh: String,
}

/// Raw private key material retrieved from a key backend.
///
/// Contains PEM-encoded private key text (OpenSSH or PKCS#1/PKCS#8).  The
/// caller parses it and drops it as soon as the signature is produced.
pub struct SshPrivateKeyMaterial {
    pub pem: Zeroizing<String>,
}

impl SshPrivateKeyMaterial {
    pub fn new(pem: Zeroizing<String>) -> Self {
        Self { pem }
    }
}

impl fmt::Debug for SshPrivateKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshPrivateKeyMaterial")
            .field("pem", &"[redacted]")
            .finish()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("caller is not authorized")]
    NotAuthorized,
    #[error("key not found")]
    NotFound,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("key material could not be decrypted")]
    DecryptionFailed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What to do when one stored private key value parses into several keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiKeyPolicy {
    /// Refuse to sign with an ambiguous stored value.
    #[default]
    Reject,
    /// Use the first parsed key and ignore the rest.
    First,
}

/// The secret store and authorization directory seen by the signer.
///
/// Implementations must not cache across calls in a way that outlives a
/// single request: revoking a grant or replacing a key must take effect on the
/// next request.
#[async_trait::async_trait]
pub trait KeyBackend: Send + Sync {
    /// Short identifier used in logs (e.g. `"file"`).
    fn id(&self) -> &str;

    /// Ordered list of keys `caller` may sign with.
    ///
    /// The order is the search order: the first key whose public half matches
    /// a request is the one used for signing.
    ///
    /// Returns [`BackendError::NotAuthorized`] if the caller has no grant at
    /// all, or [`BackendError::Unavailable`] if the directory cannot be read.
    async fn list_authorized_keys(&self, caller: &CallerId) -> Result<Vec<KeyId>, BackendError>;

    /// Public half of `key`.
    ///
    /// Returns [`BackendError::NotFound`] if the key does not exist.
    async fn get_public_key(&self, key: &KeyId) -> Result<SshPublicKeyMaterial, BackendError>;

    /// Private half of `key`, decrypted.
    ///
    /// Only called after the public half matched a request.  Returns
    /// [`BackendError::DecryptionFailed`] if the stored value cannot be
    /// unsealed.
    async fn get_private_key(&self, key: &KeyId) -> Result<SshPrivateKeyMaterial, BackendError>;
}
