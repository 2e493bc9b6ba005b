//! Request/response envelope for invocation through an HTTP gateway.
//!
//! Events arrive in the API Gateway proxy shape: the caller principal sits in
//! `requestContext.identity.caller` and the payload is a JSON document
//! carried as a *string* in `body`.  Responses use the same convention.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use keywarden_core::{CallerId, PublicKeyBlob};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::algorithm::SignFlags;
use crate::error::ErrorKind;
use crate::handler::{SignRequest, SigningOutcome, SigningRequestHandler};

pub const NOT_FOUND_MESSAGE: &str = "key blob not found in list of keys caller has access to";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    pub request_context: RequestContext,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequestContext {
    pub identity: RequestIdentity,
}

#[derive(Debug, Deserialize)]
pub struct RequestIdentity {
    /// Principal such as `AROAEXAMPLEID:session-name`.
    pub caller: String,
}

#[derive(Deserialize)]
struct SignBody {
    #[serde(deserialize_with = "deser_base64")]
    pubkey: Vec<u8>,
    #[serde(deserialize_with = "deser_base64")]
    data: Vec<u8>,
    /// Any JSON number or `null`; see [`sign_flags`].
    #[serde(default)]
    flags: Option<serde_json::Number>,
}

/// Values that are not a `u32` (negative, fractional, too large, `null`)
/// carry no recognized flag and select the default.
fn sign_flags(flags: Option<&serde_json::Number>) -> SignFlags {
    flags
        .and_then(serde_json::Number::as_u64)
        .and_then(|bits| u32::try_from(bits).ok())
        .map(SignFlags::new)
        .unwrap_or_default()
}

fn deser_base64<'de, D>(de: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(de)?;
    B64.decode(s.trim()).map_err(serde::de::Error::custom)
}

/// Gateway response; `body` is a serialized JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status_code: u16,
    pub body: String,
}

impl ApiResponse {
    fn new(status_code: u16, body: serde_json::Value) -> Self {
        Self {
            status_code,
            body: body.to_string(),
        }
    }

    fn bad_request(err: &TransportError) -> Self {
        Self::new(400, json!({ "message": err.to_string() }))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("invalid event: {0}")]
    Event(#[source] serde_json::Error),
    #[error("event has no body")]
    MissingBody,
    #[error("invalid request body: {0}")]
    Body(#[source] serde_json::Error),
    #[error("caller identity is empty")]
    EmptyCaller,
}

/// Which handler entry point an event is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    Sign,
    ListIdentities,
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sign" => Ok(Self::Sign),
            "identities" | "list-identities" => Ok(Self::ListIdentities),
            other => Err(format!("unknown operation '{other}' (expected: sign, identities)")),
        }
    }
}

fn parse_event(event_json: &str) -> Result<(InvocationEvent, CallerId), TransportError> {
    let event: InvocationEvent = serde_json::from_str(event_json).map_err(TransportError::Event)?;
    let caller = CallerId::from_principal(&event.request_context.identity.caller);
    if caller.is_empty() {
        return Err(TransportError::EmptyCaller);
    }
    Ok((event, caller))
}

/// Decode a sign event into a [`SignRequest`].
pub fn parse_sign_request(event_json: &str) -> Result<SignRequest, TransportError> {
    let (event, caller) = parse_event(event_json)?;
    let body = event.body.ok_or(TransportError::MissingBody)?;
    let body: SignBody = serde_json::from_str(&body).map_err(TransportError::Body)?;

    Ok(SignRequest {
        caller,
        public_key: PublicKeyBlob::new(body.pubkey),
        data: body.data,
        flags: sign_flags(body.flags.as_ref()),
    })
}

/// Map a handler outcome to its gateway response.
pub fn respond(outcome: &SigningOutcome) -> ApiResponse {
    match outcome {
        SigningOutcome::Found(blob) => {
            ApiResponse::new(200, json!({ "signature": B64.encode(blob.as_bytes()) }))
        }
        SigningOutcome::NotFound => not_found(),
        SigningOutcome::Failed(kind) => failure(*kind),
    }
}

fn not_found() -> ApiResponse {
    ApiResponse::new(404, json!({ "message": NOT_FOUND_MESSAGE }))
}

fn failure(kind: ErrorKind) -> ApiResponse {
    let (status, message) = match kind {
        ErrorKind::KeyNotFound => return not_found(),
        ErrorKind::NotAuthorized => (403, "caller is not authorized to use any keys"),
        ErrorKind::StorageUnavailable => (503, "key storage is unavailable"),
        ErrorKind::MalformedKeyMaterial => (500, "stored key material is malformed"),
        ErrorKind::KeyDecryptionFailed => (500, "stored key could not be decrypted"),
        ErrorKind::UnsupportedKeyType => (500, "key type is not supported for signing"),
        ErrorKind::SigningPrimitiveFailure => (500, "signing failed"),
    };
    ApiResponse::new(status, json!({ "message": message, "error": kind }))
}

/// Handle one serialized gateway event end to end.
pub async fn invoke(
    handler: &SigningRequestHandler,
    operation: Operation,
    event_json: &str,
) -> ApiResponse {
    match operation {
        Operation::Sign => sign(handler, event_json).await,
        Operation::ListIdentities => list_identities(handler, event_json).await,
    }
}

async fn sign(handler: &SigningRequestHandler, event_json: &str) -> ApiResponse {
    let request = match parse_sign_request(event_json) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "rejecting sign event");
            return ApiResponse::bad_request(&e);
        }
    };
    debug!(caller = %request.caller, flags = request.flags.bits(), "sign event");
    respond(&handler.handle(&request).await)
}

async fn list_identities(handler: &SigningRequestHandler, event_json: &str) -> ApiResponse {
    let caller = match parse_event(event_json) {
        Ok((_, caller)) => caller,
        Err(e) => {
            warn!(error = %e, "rejecting identities event");
            return ApiResponse::bad_request(&e);
        }
    };

    match handler.list_identities(&caller).await {
        Ok(keys) => {
            let identities: Vec<String> = keys
                .iter()
                .filter_map(|key| key.to_openssh().ok())
                .collect();
            ApiResponse::new(200, json!({ "identities": identities }))
        }
        Err(e) => {
            warn!(caller = %caller, error = %e, "list identities failed");
            failure(e.kind())
        }
    }
}
