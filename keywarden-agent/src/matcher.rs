//! First-match search of an authorization list by public key blob.

use keywarden_core::{BackendError, KeyBackend, KeyId, PublicKeyBlob, SshPublicKeyMaterial};
use tracing::debug;

use crate::error::SignError;
use crate::parse;

/// Return the first candidate whose stored public key encodes to exactly
/// `requested`.
///
/// Candidates are looked up one at a time in list order, so a match at
/// position `i` costs `i + 1` lookups.  A candidate that is missing, not
/// readable by this caller, or holds an unparseable public key is skipped.
/// A storage outage aborts the search with
/// [`SignError::StorageUnavailable`].
pub async fn find_key(
    backend: &dyn KeyBackend,
    requested: &PublicKeyBlob,
    candidates: &[KeyId],
) -> Result<Option<KeyId>, SignError> {
    for candidate in candidates {
        let Some(material) = lookup_public_key(backend, candidate).await? else {
            continue;
        };

        match parse::public_key_blob(&material) {
            Ok(blob) if blob == *requested => {
                debug!(key = %candidate, "match");
                return Ok(Some(candidate.clone()));
            }
            Ok(_) => debug!(key = %candidate, "skip"),
            Err(e) => debug!(key = %candidate, error = %e, "skip: unparseable public key"),
        }
    }

    Ok(None)
}

/// Fetch one candidate's public key.
///
/// `Ok(None)` means the candidate is skipped (missing, not readable by this
/// caller, undecryptable).  An outage is returned as
/// [`SignError::StorageUnavailable`].
pub(crate) async fn lookup_public_key(
    backend: &dyn KeyBackend,
    key: &KeyId,
) -> Result<Option<SshPublicKeyMaterial>, SignError> {
    match backend.get_public_key(key).await {
        Ok(material) => Ok(Some(material)),
        Err(BackendError::Unavailable(msg)) => Err(SignError::StorageUnavailable(msg)),
        // Unclassified failures may be outages too; never report them as a miss.
        Err(BackendError::Other(e)) => Err(SignError::StorageUnavailable(format!("{e:#}"))),
        Err(e) => {
            debug!(key = %key, error = %e, "skip: public key lookup failed");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryBackend, fixtures};

    fn ids(names: &[&str]) -> Vec<KeyId> {
        names.iter().map(|n| KeyId::from(*n)).collect()
    }

    fn backend() -> MemoryBackend {
        MemoryBackend::new()
            .with_key("a", fixtures::ED25519_PUB, fixtures::ED25519)
            .with_key("b", fixtures::RSA_PUB, fixtures::RSA)
            .with_key("c", fixtures::ECDSA_PUB, fixtures::ECDSA)
    }

    #[tokio::test]
    async fn match_at_position_i_takes_i_plus_one_lookups() {
        for (i, (name, public)) in [
            ("a", fixtures::ED25519_PUB),
            ("b", fixtures::RSA_PUB),
            ("c", fixtures::ECDSA_PUB),
        ]
        .into_iter()
        .enumerate()
        {
            let backend = backend();
            let found = find_key(&backend, &fixtures::blob(public), &ids(&["a", "b", "c"]))
                .await
                .unwrap();
            assert_eq!(found, Some(KeyId::from(name)));
            assert_eq!(backend.public_lookups().len(), i + 1);
        }
    }

    #[tokio::test]
    async fn no_match_scans_whole_list() {
        let backend = backend();
        let found = find_key(&backend, &fixtures::blob(fixtures::OTHER_PUB), &ids(&["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(found, None);
        assert_eq!(backend.public_lookups(), ids(&["a", "b", "c"]));
        assert_eq!(backend.private_lookups(), 0);
    }

    #[tokio::test]
    async fn empty_list_is_not_found() {
        let backend = backend();
        let found = find_key(&backend, &fixtures::blob(fixtures::RSA_PUB), &[])
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn first_duplicate_wins() {
        let backend = backend().with_key("b2", fixtures::RSA_PUB, fixtures::RSA);
        let found = find_key(&backend, &fixtures::blob(fixtures::RSA_PUB), &ids(&["b2", "b"]))
            .await
            .unwrap();
        assert_eq!(found, Some(KeyId::from("b2")));
    }

    #[tokio::test]
    async fn comment_does_not_affect_match() {
        let recommented = fixtures::RSA_PUB.replace("deploy@keywarden", "someone-else");
        let backend = MemoryBackend::new().with_key("b", &recommented, fixtures::RSA);
        let found = find_key(&backend, &fixtures::blob(fixtures::RSA_PUB), &ids(&["b"]))
            .await
            .unwrap();
        assert_eq!(found, Some(KeyId::from("b")));
    }

    #[tokio::test]
    async fn skips_missing_and_unparseable_candidates() {
        let backend = backend()
            .with_key("broken", "ssh-ed25519 %%%", "")
            .fail_public("denied", || BackendError::NotAuthorized);
        let found = find_key(
            &backend,
            &fixtures::blob(fixtures::RSA_PUB),
            &ids(&["missing", "broken", "denied", "b"]),
        )
        .await
        .unwrap();
        assert_eq!(found, Some(KeyId::from("b")));
        assert_eq!(backend.public_lookups().len(), 4);
    }

    #[tokio::test]
    async fn storage_outage_aborts_search() {
        let backend = backend().fail_public("a", || BackendError::Unavailable("throttled".into()));
        let err = find_key(&backend, &fixtures::blob(fixtures::RSA_PUB), &ids(&["a", "b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SignError::StorageUnavailable(ref msg) if msg == "throttled"));
        assert_eq!(backend.public_lookups(), ids(&["a"]));
    }

    #[tokio::test]
    async fn unclassified_error_aborts_search() {
        let backend = backend().fail_public("a", || BackendError::Other(anyhow::anyhow!("socket closed")));
        let err = find_key(&backend, &fixtures::blob(fixtures::RSA_PUB), &ids(&["a", "b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SignError::StorageUnavailable(_)));
    }
}
