//! Sign-request orchestration.

use std::fmt;
use std::sync::Arc;

use keywarden_core::{CallerId, KeyBackend, KeyId, MultiKeyPolicy, PublicKeyBlob};
use ssh_key::PublicKey;
use tracing::{debug, info, warn};

use crate::algorithm::{self, SignFlags};
use crate::blob::SignatureBlob;
use crate::error::{ErrorKind, SignError};
use crate::key::SigningKey;
use crate::{matcher, parse};

/// One sign request as received from a caller.
#[derive(Clone)]
pub struct SignRequest {
    pub caller: CallerId,
    pub public_key: PublicKeyBlob,
    pub data: Vec<u8>,
    pub flags: SignFlags,
}

impl fmt::Debug for SignRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignRequest")
            .field("caller", &self.caller)
            .field("public_key", &self.public_key)
            .field("data_len", &self.data.len())
            .field("flags", &self.flags)
            .finish()
    }
}

/// Terminal state of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningOutcome {
    Found(SignatureBlob),
    /// No key the caller may use matches the requested public key.
    NotFound,
    Failed(ErrorKind),
}

/// Resolves a caller's keys, finds the requested one and signs with it.
///
/// Holds no per-request state; one handler serves any number of concurrent
/// requests.
#[derive(Clone)]
pub struct SigningRequestHandler {
    backend: Arc<dyn KeyBackend>,
    multi_key_policy: MultiKeyPolicy,
}

impl SigningRequestHandler {
    pub fn new(backend: Arc<dyn KeyBackend>, multi_key_policy: MultiKeyPolicy) -> Self {
        Self {
            backend,
            multi_key_policy,
        }
    }

    pub async fn handle(&self, request: &SignRequest) -> SigningOutcome {
        match self.sign(request).await {
            Ok(blob) => SigningOutcome::Found(blob),
            Err(SignError::KeyNotFound) => {
                info!(caller = %request.caller, "no authorized key matches request");
                SigningOutcome::NotFound
            }
            Err(e) => {
                warn!(caller = %request.caller, error = %e, "sign request failed");
                SigningOutcome::Failed(e.kind())
            }
        }
    }

    /// Public keys `caller` may sign with, in authorization order.
    ///
    /// Entries whose public key is missing or unparseable are left out.
    pub async fn list_identities(&self, caller: &CallerId) -> Result<Vec<PublicKey>, SignError> {
        let candidates = self
            .backend
            .list_authorized_keys(caller)
            .await
            .map_err(SignError::from_directory)?;

        let mut identities = Vec::with_capacity(candidates.len());
        for key_id in &candidates {
            let Some(material) =
                matcher::lookup_public_key(self.backend.as_ref(), key_id).await?
            else {
                continue;
            };
            match parse::parse_public_key(&material) {
                Ok(key) => identities.push(key),
                Err(e) => debug!(key = %key_id, error = %e, "identity skipped"),
            }
        }

        debug!(caller = %caller, count = identities.len(), "list identities");
        Ok(identities)
    }

    async fn sign(&self, request: &SignRequest) -> Result<SignatureBlob, SignError> {
        let candidates = self
            .backend
            .list_authorized_keys(&request.caller)
            .await
            .map_err(SignError::from_directory)?;
        debug!(
            caller = %request.caller,
            backend = self.backend.id(),
            keys = candidates.len(),
            "authorized keys resolved"
        );

        let Some(key_id) =
            matcher::find_key(self.backend.as_ref(), &request.public_key, &candidates).await?
        else {
            return Err(SignError::KeyNotFound);
        };

        let signing_key = self.load_signing_key(&key_id, &request.public_key).await?;
        let algorithm = algorithm::select(signing_key.key_type(), request.flags);
        let raw = signing_key.sign(&algorithm, &request.data)?;
        drop(signing_key);

        let blob = SignatureBlob::build(algorithm.name(), &raw)?;
        info!(
            caller = %request.caller,
            algorithm = %algorithm,
            data_len = request.data.len(),
            "signed"
        );
        Ok(blob)
    }

    // The match is committed once this runs: failures here never fall back to
    // a later candidate.
    async fn load_signing_key(
        &self,
        key_id: &KeyId,
        expected: &PublicKeyBlob,
    ) -> Result<SigningKey, SignError> {
        let material = self
            .backend
            .get_private_key(key_id)
            .await
            .map_err(SignError::from_private_fetch)?;
        let keys = parse::extract_keys(&material.pem);
        drop(material);

        let private = parse::select_private_key(keys, self.multi_key_policy)?;
        let signing_key = SigningKey::from_private_key(&private)?;

        if signing_key.public_key_blob()? != *expected {
            return Err(SignError::MalformedKeyMaterial(
                "stored private key does not belong to the matched public key".into(),
            ));
        }
        Ok(signing_key)
    }
}

impl fmt::Debug for SigningRequestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningRequestHandler")
            .field("backend", &self.backend.id())
            .field("multi_key_policy", &self.multi_key_policy)
            .finish()
    }
}
