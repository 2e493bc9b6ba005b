//! Signing core of the keywarden remote SSH agent.
//!
//! Given a caller, a requested public key blob and the data to sign, finds
//! the first key the caller is authorized to use whose public half is
//! byte-identical to the request, and returns an SSH signature blob.
//!
//! # Architecture
//!
//! ```text
//!  transport::invoke ──┐
//!                      ├──► SigningRequestHandler ──► KeyBackend (list / public / private)
//!  session::SshAgent ──┘            │
//!                                   ├─ matcher::find_key
//!                                   ├─ parse::{parse_public_key, extract_keys}
//!                                   ├─ algorithm::select
//!                                   ├─ SigningKey::sign
//!                                   └─ SignatureBlob::build
//! ```
//!
//! The private half of a key is fetched only after its public half matched,
//! and is dropped as soon as the signature exists.  Nothing in this crate
//! keeps state between requests.

pub mod algorithm;
pub mod blob;
pub mod error;
pub mod handler;
pub mod key;
pub mod matcher;
pub mod parse;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use algorithm::{HashAlgorithm, SignFlags, SignatureAlgorithm};
pub use blob::SignatureBlob;
pub use error::{ErrorKind, SignError};
pub use handler::{SignRequest, SigningOutcome, SigningRequestHandler};
pub use key::{KeyType, SigningKey};
pub use session::SshAgent;
