//! Shared test fixtures and an in-memory [`KeyBackend`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use keywarden_core::{
    BackendError, CallerId, KeyBackend, KeyId, SshPrivateKeyMaterial, SshPublicKeyMaterial,
};
use zeroize::Zeroizing;

pub mod fixtures {
    pub const RSA: &str = include_str!("../testdata/rsa_openssh");
    pub const RSA_PUB: &str = include_str!("../testdata/rsa_openssh.pub");
    pub const ED25519: &str = include_str!("../testdata/ed25519");
    pub const ED25519_PUB: &str = include_str!("../testdata/ed25519.pub");
    pub const ECDSA: &str = include_str!("../testdata/ecdsa");
    pub const ECDSA_PUB: &str = include_str!("../testdata/ecdsa.pub");
    pub const OTHER: &str = include_str!("../testdata/other");
    pub const OTHER_PUB: &str = include_str!("../testdata/other.pub");
    pub const DSA: &str = include_str!("../testdata/dsa");
    pub const DSA_PUB: &str = include_str!("../testdata/dsa.pub");
    pub const RSA_PKCS1: &str = include_str!("../testdata/rsa_pkcs1.pem");
    pub const RSA_PKCS1_PUB: &str = include_str!("../testdata/rsa_pkcs1.pub");

    /// PKCS#1 v1.5 signatures of 32 zero bytes with [`RSA`], base64.
    pub const RSA_ZEROS_SHA1: &str = include_str!("../testdata/rsa-zeros-sha1.sig.b64");
    pub const RSA_ZEROS_SHA256: &str = include_str!("../testdata/rsa-zeros-sha256.sig.b64");
    pub const RSA_ZEROS_SHA512: &str = include_str!("../testdata/rsa-zeros-sha512.sig.b64");

    /// Wire blob of an OpenSSH public key line.
    pub fn blob(openssh: &str) -> keywarden_core::PublicKeyBlob {
        let key = ssh_key::PublicKey::from_openssh(openssh.trim()).unwrap();
        keywarden_core::PublicKeyBlob::new(key.to_bytes().unwrap())
    }
}

type Failure = fn() -> BackendError;

/// Key backend held entirely in memory, with per-call failure injection and
/// lookup counters.
#[derive(Default)]
pub struct MemoryBackend {
    grants: HashMap<CallerId, Vec<KeyId>>,
    public: HashMap<KeyId, String>,
    private: HashMap<KeyId, String>,
    directory_failure: Option<Failure>,
    public_failures: HashMap<KeyId, Failure>,
    private_failures: HashMap<KeyId, Failure>,
    public_lookups: Mutex<Vec<KeyId>>,
    private_lookups: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, id: &str, public: &str, private: &str) -> Self {
        self.public.insert(KeyId::from(id), public.to_string());
        self.private.insert(KeyId::from(id), private.to_string());
        self
    }

    pub fn grant(mut self, caller: &str, keys: &[&str]) -> Self {
        self.grants.insert(
            CallerId::new(caller),
            keys.iter().map(|k| KeyId::from(*k)).collect(),
        );
        self
    }

    pub fn fail_directory(mut self, failure: Failure) -> Self {
        self.directory_failure = Some(failure);
        self
    }

    pub fn fail_public(mut self, id: &str, failure: Failure) -> Self {
        self.public_failures.insert(KeyId::from(id), failure);
        self
    }

    pub fn fail_private(mut self, id: &str, failure: Failure) -> Self {
        self.private_failures.insert(KeyId::from(id), failure);
        self
    }

    /// Keys whose public half was looked up, in call order.
    pub fn public_lookups(&self) -> Vec<KeyId> {
        self.public_lookups.lock().unwrap().clone()
    }

    pub fn private_lookups(&self) -> usize {
        self.private_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl KeyBackend for MemoryBackend {
    fn id(&self) -> &str {
        "memory"
    }

    async fn list_authorized_keys(&self, caller: &CallerId) -> Result<Vec<KeyId>, BackendError> {
        if let Some(failure) = self.directory_failure {
            return Err(failure());
        }
        self.grants
            .get(caller)
            .cloned()
            .ok_or(BackendError::NotAuthorized)
    }

    async fn get_public_key(&self, key: &KeyId) -> Result<SshPublicKeyMaterial, BackendError> {
        self.public_lookups.lock().unwrap().push(key.clone());
        if let Some(failure) = self.public_failures.get(key) {
            return Err(failure());
        }
        self.public
            .get(key)
            .map(|openssh| SshPublicKeyMaterial {
                openssh: openssh.clone(),
            })
            .ok_or(BackendError::NotFound)
    }

    async fn get_private_key(&self, key: &KeyId) -> Result<SshPrivateKeyMaterial, BackendError> {
        self.private_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.private_failures.get(key) {
            return Err(failure());
        }
        self.private
            .get(key)
            .map(|pem| SshPrivateKeyMaterial::new(Zeroizing::new(pem.clone())))
            .ok_or(BackendError::NotFound)
    }
}
