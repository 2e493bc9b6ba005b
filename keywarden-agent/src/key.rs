//! Private key handles that can produce raw signatures.

use std::fmt;

use keywarden_core::PublicKeyBlob;
use rsa::pkcs1v15;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use signature::{SignatureEncoding as _, Signer as _};
use ssh_encoding::Encode as _;
use ssh_key::private::{EcdsaKeypair, Ed25519Keypair, KeypairData, RsaKeypair};
use ssh_key::public::{EcdsaPublicKey, Ed25519PublicKey, KeyData, RsaPublicKey};
use ssh_key::{EcdsaCurve, Mpint, PrivateKey};

use crate::algorithm::{HashAlgorithm, SignatureAlgorithm};
use crate::error::SignError;

/// Key types this agent can sign with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    Ed25519,
    Ecdsa(EcdsaCurve),
}

impl KeyType {
    /// Canonical SSH name of the key type.
    pub fn ssh_name(self) -> &'static str {
        match self {
            Self::Rsa => "ssh-rsa",
            Self::Ed25519 => "ssh-ed25519",
            Self::Ecdsa(EcdsaCurve::NistP256) => "ecdsa-sha2-nistp256",
            Self::Ecdsa(EcdsaCurve::NistP384) => "ecdsa-sha2-nistp384",
            Self::Ecdsa(EcdsaCurve::NistP521) => "ecdsa-sha2-nistp521",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ssh_name())
    }
}

/// A decrypted private key, restricted to the types with a signing rule.
///
/// Building one is where unsupported key types (DSA, FIDO security keys,
/// opaque keys) are rejected, so nothing downstream can hand such a key to a
/// signing primitive.  All variants zeroize their secret parts on drop.
pub enum SigningKey {
    Rsa(Box<RsaKeypair>),
    Ed25519(Ed25519Keypair),
    Ecdsa(EcdsaKeypair),
}

impl SigningKey {
    pub fn from_private_key(key: &PrivateKey) -> Result<Self, SignError> {
        if key.is_encrypted() {
            return Err(SignError::MalformedKeyMaterial(
                "private key is protected by an OpenSSH passphrase".into(),
            ));
        }

        match key.key_data() {
            KeypairData::Rsa(keypair) => Ok(Self::Rsa(Box::new(keypair.clone()))),
            KeypairData::Ed25519(keypair) => Ok(Self::Ed25519(keypair.clone())),
            KeypairData::Ecdsa(keypair) => Ok(Self::Ecdsa(keypair.clone())),
            other => Err(SignError::UnsupportedKeyType(
                other
                    .algorithm()
                    .map(|alg| alg.to_string())
                    .unwrap_or_else(|_| "unknown".to_string()),
            )),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Rsa(_) => KeyType::Rsa,
            Self::Ed25519(_) => KeyType::Ed25519,
            Self::Ecdsa(keypair) => KeyType::Ecdsa(keypair.curve()),
        }
    }

    pub fn public_key_data(&self) -> KeyData {
        match self {
            Self::Rsa(keypair) => RsaPublicKey::from(&**keypair).into(),
            Self::Ed25519(keypair) => Ed25519PublicKey::from(keypair).into(),
            Self::Ecdsa(keypair) => EcdsaPublicKey::from(keypair).into(),
        }
    }

    /// Wire encoding of the public half, comparable with a request blob.
    pub fn public_key_blob(&self) -> Result<PublicKeyBlob, SignError> {
        key_data_blob(&self.public_key_data())
    }

    /// Produce the raw signature over `data`.
    ///
    /// RSA honours the selected hash.  Ed25519 and ECDSA always use their own
    /// scheme and only accept [`HashAlgorithm::KeyNative`].
    pub fn sign(&self, algorithm: &SignatureAlgorithm, data: &[u8]) -> Result<Vec<u8>, SignError> {
        match (self, algorithm.hash()) {
            (Self::Rsa(keypair), hash) => sign_rsa(keypair, hash, data),
            (Self::Ed25519(keypair), HashAlgorithm::KeyNative) => keypair
                .try_sign(data)
                .map(|sig| sig.as_bytes().to_vec())
                .map_err(|e| SignError::SigningPrimitiveFailure(format!("ed25519: {e}"))),
            (Self::Ecdsa(keypair), HashAlgorithm::KeyNative) => keypair
                .try_sign(data)
                .map(|sig| sig.as_bytes().to_vec())
                .map_err(|e| SignError::SigningPrimitiveFailure(format!("ecdsa: {e}"))),
            (key, hash) => Err(SignError::UnsupportedKeyType(format!(
                "{} cannot sign with {hash:?}",
                key.key_type()
            ))),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("type", &self.key_type())
            .finish_non_exhaustive()
    }
}

/// SSH wire encoding of a public key.
pub fn key_data_blob(key_data: &KeyData) -> Result<PublicKeyBlob, SignError> {
    let mut out = Vec::new();
    key_data
        .encode(&mut out)
        .map_err(|e| SignError::MalformedKeyMaterial(format!("public key encoding: {e}")))?;
    Ok(PublicKeyBlob::new(out))
}

fn sign_rsa(keypair: &RsaKeypair, hash: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>, SignError> {
    let private = rsa_private_key(keypair)?;
    let signature = match hash {
        HashAlgorithm::Sha1 => pkcs1v15::SigningKey::<Sha1>::new(private).try_sign(data),
        HashAlgorithm::Sha256 => pkcs1v15::SigningKey::<Sha256>::new(private).try_sign(data),
        HashAlgorithm::Sha512 => pkcs1v15::SigningKey::<Sha512>::new(private).try_sign(data),
        HashAlgorithm::KeyNative => {
            return Err(SignError::SigningPrimitiveFailure(
                "RSA signing needs an explicit hash".into(),
            ));
        }
    }
    .map_err(|e| SignError::SigningPrimitiveFailure(format!("rsa: {e}")))?;
    Ok(signature.to_vec())
}

// Built from n, e, d and both primes; the key is validated by `rsa` so a
// corrupted keypair fails here instead of producing a bad signature.
fn rsa_private_key(keypair: &RsaKeypair) -> Result<rsa::RsaPrivateKey, SignError> {
    fn uint(component: &Mpint) -> Result<rsa::BigUint, SignError> {
        component
            .as_positive_bytes()
            .map(rsa::BigUint::from_bytes_be)
            .ok_or_else(|| {
                SignError::MalformedKeyMaterial("RSA component is not a positive integer".into())
            })
    }

    rsa::RsaPrivateKey::from_components(
        uint(&keypair.public.n)?,
        uint(&keypair.public.e)?,
        uint(&keypair.private.d)?,
        vec![uint(&keypair.private.p)?, uint(&keypair.private.q)?],
    )
    .map_err(|e| SignError::MalformedKeyMaterial(format!("RSA key: {e}")))
}
