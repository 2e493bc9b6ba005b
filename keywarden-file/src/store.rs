use std::path::{Path, PathBuf};

use keywarden_core::{
    BackendError, CallerId, KeyBackend, KeyId, SshPrivateKeyMaterial, SshPublicKeyMaterial,
};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::{CryptoError, SealingKeys};
use crate::types::{FILE_FORMAT_VERSION, KdfParams, KeyringFile, SealedKey};

/// Key backend reading a JSON keyring file.
///
/// The file is re-read on every call, so edits (a revoked grant, a replaced
/// key) apply to the next request without a restart.
pub struct FileKeyring {
    path: PathBuf,
    passphrase: Zeroizing<String>,
}

impl FileKeyring {
    pub fn new(path: impl Into<PathBuf>, passphrase: Zeroizing<String>) -> Self {
        Self {
            path: path.into(),
            passphrase,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<KeyringFile, BackendError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            BackendError::Unavailable(format!("read keyring {}: {e}", self.path.display()))
        })?;
        let file: KeyringFile = serde_json::from_str(&content).map_err(|e| {
            BackendError::Unavailable(format!("parse keyring {}: {e}", self.path.display()))
        })?;
        if file.version != FILE_FORMAT_VERSION {
            return Err(BackendError::Unavailable(format!(
                "keyring {} has unsupported version {}",
                self.path.display(),
                file.version
            )));
        }
        Ok(file)
    }
}

impl std::fmt::Debug for FileKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKeyring")
            .field("path", &self.path)
            .field("passphrase", &"[redacted]")
            .finish()
    }
}

/// Seal `pem` for storage in a keyring whose KDF parameters are `kdf`.
pub fn seal_private_key(
    passphrase: &str,
    kdf: &KdfParams,
    pem: &str,
) -> Result<SealedKey, CryptoError> {
    SealingKeys::derive(passphrase.as_bytes(), kdf)?.seal(pem.as_bytes())
}

fn open_private_key(
    passphrase: &str,
    kdf: &KdfParams,
    sealed: &SealedKey,
) -> Result<Zeroizing<String>, BackendError> {
    let keys = SealingKeys::derive(passphrase.as_bytes(), kdf).map_err(|e| match e {
        CryptoError::Salt(_) => BackendError::Unavailable(format!("keyring KDF parameters: {e}")),
        other => BackendError::Other(other.into()),
    })?;
    let plaintext = keys.open(sealed).map_err(|e| {
        debug!(error = %e, "private key could not be unsealed");
        BackendError::DecryptionFailed
    })?;
    let pem = std::str::from_utf8(&plaintext).map_err(|_| BackendError::DecryptionFailed)?;
    Ok(Zeroizing::new(pem.to_string()))
}

#[async_trait::async_trait]
impl KeyBackend for FileKeyring {
    fn id(&self) -> &str {
        "file"
    }

    async fn list_authorized_keys(&self, caller: &CallerId) -> Result<Vec<KeyId>, BackendError> {
        let mut file = self.read().await?;
        file.grants
            .remove(caller)
            .ok_or(BackendError::NotAuthorized)
    }

    async fn get_public_key(&self, key: &KeyId) -> Result<SshPublicKeyMaterial, BackendError> {
        let mut file = self.read().await?;
        file.keys
            .remove(key)
            .map(|entry| SshPublicKeyMaterial {
                openssh: entry.public_key,
            })
            .ok_or(BackendError::NotFound)
    }

    async fn get_private_key(&self, key: &KeyId) -> Result<SshPrivateKeyMaterial, BackendError> {
        let mut file = self.read().await?;
        let entry = file.keys.remove(key).ok_or(BackendError::NotFound)?;
        let kdf = file.kdf;
        let passphrase = self.passphrase.clone();

        // PBKDF2 blocks for a noticeable time; run it off the async workers.
        let pem = tokio::task::spawn_blocking(move || {
            open_private_key(&passphrase, &kdf, &entry.private_key)
        })
        .await
        .map_err(|e| {
            warn!("key unsealing task failed: {e}");
            BackendError::Other(e.into())
        })??;

        Ok(SshPrivateKeyMaterial::new(pem))
    }
}
