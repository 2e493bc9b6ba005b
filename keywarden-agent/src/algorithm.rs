//! Signature algorithm selection.
//!
//! Only RSA keys have a caller-selectable hash (RFC 8332 SHA-2 variants,
//! requested through the agent protocol's sign flags).  Every other key type
//! signs with its one fixed scheme and ignores the flags.

use std::fmt;

use crate::key::KeyType;

/// Agent sign-request flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignFlags(u32);

impl SignFlags {
    /// `SSH_AGENT_RSA_SHA2_256`
    pub const RSA_SHA2_256: Self = Self(2);
    /// `SSH_AGENT_RSA_SHA2_512`
    pub const RSA_SHA2_512: Self = Self(4);

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// Hash the signing primitive is asked to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha512,
    /// Determined by the key's own scheme (Ed25519, ECDSA curve hash).
    KeyNative,
}

/// Outcome of algorithm selection: how to sign and what to call it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureAlgorithm {
    hash: HashAlgorithm,
    name: &'static str,
}

impl SignatureAlgorithm {
    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    /// SSH algorithm name placed in the signature blob.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Pick the hash and SSH algorithm name for `key_type`.
///
/// RSA flags are compared for equality, not as a bit set: `2` and `4` select
/// the SHA-2 variants and every other value, including `6`, keeps the legacy
/// `ssh-rsa` SHA-1 scheme.
pub fn select(key_type: KeyType, flags: SignFlags) -> SignatureAlgorithm {
    match key_type {
        KeyType::Rsa if flags == SignFlags::RSA_SHA2_256 => SignatureAlgorithm {
            hash: HashAlgorithm::Sha256,
            name: "rsa-sha2-256",
        },
        KeyType::Rsa if flags == SignFlags::RSA_SHA2_512 => SignatureAlgorithm {
            hash: HashAlgorithm::Sha512,
            name: "rsa-sha2-512",
        },
        KeyType::Rsa => SignatureAlgorithm {
            hash: HashAlgorithm::Sha1,
            name: "ssh-rsa",
        },
        other => SignatureAlgorithm {
            hash: HashAlgorithm::KeyNative,
            name: other.ssh_name(),
        },
    }
}
