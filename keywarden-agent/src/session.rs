//! Local SSH agent socket backed by the signing handler.

use std::io;
use std::os::unix::fs::PermissionsExt as _;
use std::path::PathBuf;

use anyhow::Context as _;
use keywarden_core::CallerId;
use ssh_agent_lib::agent::{Session, listen};
use ssh_agent_lib::error::AgentError;
use ssh_agent_lib::proto::{Identity, SignRequest as AgentSignRequest};
use ssh_key::Signature;
use tracing::debug;

use crate::algorithm::SignFlags;
use crate::blob::SignatureBlob;
use crate::handler::{SignRequest, SigningOutcome, SigningRequestHandler};
use crate::key::key_data_blob;

/// SSH agent serving the keys of one configured caller.  Cloned per incoming
/// connection by `ssh_agent_lib`.
#[derive(Clone, Debug)]
pub struct SshAgent {
    handler: SigningRequestHandler,
    caller: CallerId,
    socket_path: PathBuf,
}

impl SshAgent {
    pub fn new(handler: SigningRequestHandler, caller: CallerId, socket_path: PathBuf) -> Self {
        Self {
            handler,
            caller,
            socket_path,
        }
    }

    /// Bind the Unix socket and start accepting connections.
    pub async fn listen(self) -> anyhow::Result<()> {
        let listener = tokio::net::UnixListener::bind(&self.socket_path)
            .with_context(|| format!("bind SSH agent socket {:?}", self.socket_path))?;

        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("chmod 0600 {:?}", self.socket_path))?;

        listen(listener, self).await.context("SSH agent listener")
    }
}

fn other_err(msg: impl Into<String>) -> AgentError {
    AgentError::other(io::Error::other(msg.into()))
}

/// Convert a handler blob into the typed signature the agent protocol layer
/// re-encodes.  Legacy `ssh-rsa` (SHA-1) has no typed form in `ssh-key` and
/// is refused here.
fn agent_signature(blob: &SignatureBlob) -> Result<Signature, AgentError> {
    Signature::try_from(blob.as_bytes())
        .map_err(|e| other_err(format!("signature not representable over agent socket: {e}")))
}

#[ssh_agent_lib::async_trait]
impl Session for SshAgent {
    async fn request_identities(&mut self) -> Result<Vec<Identity>, AgentError> {
        let keys = self
            .handler
            .list_identities(&self.caller)
            .await
            .map_err(|e| other_err(e.kind().to_string()))?;

        let identities: Vec<Identity> = keys
            .into_iter()
            .map(|key| Identity {
                comment: key.comment().to_string(),
                pubkey: key.key_data().clone(),
            })
            .collect();

        debug!(count = identities.len(), "request_identities");
        Ok(identities)
    }

    async fn sign(&mut self, request: AgentSignRequest) -> Result<Signature, AgentError> {
        let public_key =
            key_data_blob(&request.pubkey).map_err(|e| other_err(e.kind().to_string()))?;

        debug!(
            caller = %self.caller,
            flags = request.flags,
            data_len = request.data.len(),
            "sign"
        );

        let outcome = self
            .handler
            .handle(&SignRequest {
                caller: self.caller.clone(),
                public_key,
                data: request.data,
                flags: SignFlags::new(request.flags),
            })
            .await;

        match outcome {
            SigningOutcome::Found(blob) => agent_signature(&blob),
            SigningOutcome::NotFound => Err(other_err("key not found")),
            SigningOutcome::Failed(kind) => Err(other_err(kind.to_string())),
        }
    }
}
