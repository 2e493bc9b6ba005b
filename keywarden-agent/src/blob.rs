//! SSH signature blob framing: `string algorithm-name || string signature`.

use std::fmt;

use ssh_encoding::{Decode, Encode, Reader};

use crate::error::SignError;

/// A complete SSH signature blob as returned to agent clients.
#[derive(Clone, PartialEq, Eq)]
pub struct SignatureBlob(Vec<u8>);

impl SignatureBlob {
    /// Frame `signature` under `algorithm`.
    ///
    /// Both fields are written with the SSH `string` encoding (32-bit
    /// big-endian length followed by the bytes).  `algorithm` is a `&str`, so
    /// the name is always valid UTF-8.
    pub fn build(algorithm: &str, signature: &[u8]) -> Result<Self, SignError> {
        let mut out = Vec::new();
        algorithm
            .encode(&mut out)
            .and_then(|()| signature.encode(&mut out))
            .map_err(|e| SignError::SigningPrimitiveFailure(format!("blob encoding: {e}")))?;
        Ok(Self(out))
    }

    /// Split a blob back into algorithm name and raw signature bytes.
    ///
    /// Trailing bytes after the signature field are rejected.
    pub fn decode(mut bytes: &[u8]) -> Result<(String, Vec<u8>), ssh_encoding::Error> {
        let algorithm = String::decode(&mut bytes)?;
        let signature = Vec::<u8>::decode(&mut bytes)?;
        bytes.finish((algorithm, signature))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

// Signature bytes stay out of logs even at trace level.
impl fmt::Debug for SignatureBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBlob({} bytes)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_name_then_signature() {
        let blob = SignatureBlob::build("ssh-ed25519", &[0xde, 0xad]).unwrap();
        let mut expected = vec![0, 0, 0, 11];
        expected.extend_from_slice(b"ssh-ed25519");
        expected.extend_from_slice(&[0, 0, 0, 2, 0xde, 0xad]);
        assert_eq!(blob.as_bytes(), expected.as_slice());
    }

    #[test]
    fn decode_recovers_fields() {
        let signature: Vec<u8> = (0..=255).collect();
        let blob = SignatureBlob::build("rsa-sha2-512", &signature).unwrap();
        let (name, raw) = SignatureBlob::decode(blob.as_bytes()).unwrap();
        assert_eq!(name, "rsa-sha2-512");
        assert_eq!(raw, signature);
    }

    #[test]
    fn empty_signature_is_framed_with_zero_length() {
        let blob = SignatureBlob::build("ssh-rsa", &[]).unwrap();
        assert_eq!(&blob.as_bytes()[blob.as_bytes().len() - 4..], &[0, 0, 0, 0]);
        let (name, raw) = SignatureBlob::decode(blob.as_bytes()).unwrap();
        assert_eq!(name, "ssh-rsa");
        assert!(raw.is_empty());
    }

    #[test]
    fn non_ascii_name_keeps_utf8_bytes() {
        let blob = SignatureBlob::build("schlüssel", b"sig").unwrap();
        assert_eq!(&blob.as_bytes()[..4], &[0, 0, 0, 10]);
        let (name, _) = SignatureBlob::decode(blob.as_bytes()).unwrap();
        assert_eq!(name, "schlüssel");
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = SignatureBlob::build("ssh-rsa", b"sig").unwrap().into_bytes();
        bytes.push(0);
        assert!(SignatureBlob::decode(&bytes).is_err());
    }

    #[test]
    fn decode_rejects_truncated_blob() {
        let bytes = SignatureBlob::build("ssh-rsa", b"signature").unwrap().into_bytes();
        assert!(SignatureBlob::decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn decode_rejects_invalid_utf8_name() {
        let bytes = [0, 0, 0, 2, 0xff, 0xfe, 0, 0, 0, 0];
        assert!(SignatureBlob::decode(&bytes).is_err());
    }

    #[test]
    fn debug_hides_bytes() {
        let blob = SignatureBlob::build("ssh-ed25519", b"secret-ish").unwrap();
        assert_eq!(format!("{blob:?}"), "SignatureBlob(29 bytes)");
    }
}
