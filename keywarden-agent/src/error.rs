use std::fmt;

use keywarden_core::BackendError;
use serde::Serialize;

/// Why a signing request did not produce a signature.
///
/// Kinds are safe to hand back to a caller: none of them carries key
/// material or storage identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotAuthorized,
    KeyNotFound,
    StorageUnavailable,
    MalformedKeyMaterial,
    KeyDecryptionFailed,
    UnsupportedKeyType,
    SigningPrimitiveFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAuthorized => "not_authorized",
            Self::KeyNotFound => "key_not_found",
            Self::StorageUnavailable => "storage_unavailable",
            Self::MalformedKeyMaterial => "malformed_key_material",
            Self::KeyDecryptionFailed => "key_decryption_failed",
            Self::UnsupportedKeyType => "unsupported_key_type",
            Self::SigningPrimitiveFailure => "signing_primitive_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Internal signing error.
///
/// The `Display` text is meant for operator logs; callers only ever see the
/// [`ErrorKind`].
#[derive(thiserror::Error, Debug)]
pub enum SignError {
    #[error("caller is not authorized")]
    NotAuthorized,
    #[error("no authorized key matches the requested public key")]
    KeyNotFound,
    #[error("key storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("malformed key material: {0}")]
    MalformedKeyMaterial(String),
    #[error("stored key could not be decrypted")]
    KeyDecryptionFailed,
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),
    #[error("signing failed: {0}")]
    SigningPrimitiveFailure(String),
}

impl SignError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAuthorized => ErrorKind::NotAuthorized,
            Self::KeyNotFound => ErrorKind::KeyNotFound,
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Self::MalformedKeyMaterial(_) => ErrorKind::MalformedKeyMaterial,
            Self::KeyDecryptionFailed => ErrorKind::KeyDecryptionFailed,
            Self::UnsupportedKeyType(_) => ErrorKind::UnsupportedKeyType,
            Self::SigningPrimitiveFailure(_) => ErrorKind::SigningPrimitiveFailure,
        }
    }

    /// Map a failure of the private-key fetch for an already matched key.
    ///
    /// The match is committed at that point, so a missing key means the store
    /// changed underneath us and is reported as a storage problem rather than
    /// as "not found".
    pub(crate) fn from_private_fetch(err: BackendError) -> Self {
        match err {
            BackendError::DecryptionFailed => Self::KeyDecryptionFailed,
            BackendError::NotAuthorized => Self::NotAuthorized,
            BackendError::NotFound => {
                Self::StorageUnavailable("matched key vanished before its private half was read".into())
            }
            BackendError::Unavailable(msg) => Self::StorageUnavailable(msg),
            BackendError::Other(e) => Self::StorageUnavailable(format!("{e:#}")),
        }
    }

    /// Map a failure of the authorization directory lookup.
    pub(crate) fn from_directory(err: BackendError) -> Self {
        match err {
            BackendError::NotAuthorized | BackendError::NotFound => Self::NotAuthorized,
            BackendError::Unavailable(msg) => Self::StorageUnavailable(msg),
            BackendError::DecryptionFailed => {
                Self::StorageUnavailable("authorization directory could not be decrypted".into())
            }
            BackendError::Other(e) => Self::StorageUnavailable(format!("{e:#}")),
        }
    }
}
