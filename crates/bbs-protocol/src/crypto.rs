use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};

use crate::types::{ContentBody, ContentHash, PubKey, SecretKey};

/// Generate a fresh Ed25519 keypair for a board or user.
pub fn generate_keypair() -> (PubKey, SecretKey) {
    let mut rng = rand::thread_rng();
    let signing_key = SigningKey::generate(&mut rng);
    (
        PubKey(signing_key.verifying_key().to_bytes()),
        SecretKey(signing_key.to_bytes()),
    )
}

/// Public key belonging to `secret`.
pub fn public_key_of(secret: &SecretKey) -> PubKey {
    PubKey(SigningKey::from_bytes(secret.as_bytes()).verifying_key().to_bytes())
}

/// Compute SHA-256 hash of data.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let hash = Sha256::digest(data);
    let mut result = [0u8; 32];
    result.copy_from_slice(&hash);
    result
}

/// Hash of a content body: SHA-256 over its canonical JSON encoding.
pub fn content_hash(body: &ContentBody) -> ContentHash {
    let canonical = serde_json::to_vec(body).unwrap_or_default();
    ContentHash(sha256(&canonical))
}

/// Hash identifying one version of a board tree.
///
/// Covers the board key, the sequence number and every content hash in
/// scan order, so reordering or sequence changes alter the root.
pub fn root_hash<'a>(
    pub_key: &PubKey,
    seq: u64,
    contents: impl IntoIterator<Item = &'a ContentHash>,
) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(pub_key.as_bytes());
    hasher.update(seq.to_le_bytes());
    for hash in contents {
        hasher.update(hash.as_bytes());
    }
    ContentHash(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoardBody;

    fn board(name: &str) -> ContentBody {
        ContentBody::Board(BoardBody {
            name: name.into(),
            body: String::new(),
            created: 0,
            submission_addresses: Vec::new(),
        })
    }

    #[test]
    fn test_keypair_distinct() {
        let (pk1, _) = generate_keypair();
        let (pk2, _) = generate_keypair();
        assert_ne!(pk1, pk2);
    }

    #[test]
    fn test_public_key_of_matches_generated() {
        let (pk, sk) = generate_keypair();
        assert_eq!(public_key_of(&sk), pk);
    }

    #[test]
    fn test_content_hash_is_pure() {
        assert_eq!(content_hash(&board("a")), content_hash(&board("a")));
        assert_ne!(content_hash(&board("a")), content_hash(&board("b")));
    }

    #[test]
    fn test_root_hash_covers_seq_and_order() {
        let pk = PubKey([1; 32]);
        let a = ContentHash([2; 32]);
        let b = ContentHash([3; 32]);
        assert_ne!(root_hash(&pk, 1, [&a, &b]), root_hash(&pk, 2, [&a, &b]));
        assert_ne!(root_hash(&pk, 1, [&a, &b]), root_hash(&pk, 1, [&b, &a]));
    }
}
