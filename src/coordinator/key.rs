//! Routing key derivation
//!
//! A routing key identifies one logical request: the destination prefix plus
//! the exact request body bytes. It names both the coordinator instance and
//! the archived result.

use sha2::{Digest, Sha256};

/// Opaque identifier for a (destination, body) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutingKey([u8; 32]);

impl RoutingKey {
    /// Derive a key from a prefix and a body delivered as any number of chunks
    pub fn derive<I, C>(prefix: &[u8], chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let mut deriver = KeyDeriver::new(prefix);
        for chunk in chunks {
            deriver.update(chunk.as_ref());
        }
        deriver.finish()
    }

    /// Build a key from raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Incremental routing key hasher
///
/// Body chunks can be fed as they come off the wire; the resulting key only
/// depends on the concatenated bytes, never on where the chunk boundaries
/// fell.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    hasher: Sha256,
    body_len: u64,
}

impl KeyDeriver {
    /// Start a new key for the given destination prefix
    pub fn new(prefix: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        // Length prefix keeps ("ab", "c") and ("a", "bc") apart.
        hasher.update((prefix.len() as u64).to_le_bytes());
        hasher.update(prefix);

        Self {
            hasher,
            body_len: 0,
        }
    }

    /// Feed the next body chunk
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.body_len += chunk.len() as u64;
    }

    /// Number of body bytes hashed so far
    pub fn body_len(&self) -> u64 {
        self.body_len
    }

    /// Finish hashing and produce the key
    pub fn finish(self) -> RoutingKey {
        RoutingKey(self.hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"model":"m","messages":[{"role":"user","content":"hi"}],"stream":true}"#;

    #[test]
    fn test_chunking_does_not_change_key() {
        let whole = RoutingKey::derive(b"openai", [BODY]);

        let (a, rest) = BODY.split_at(7);
        let (b, c) = rest.split_at(30);
        let split = RoutingKey::derive(b"openai", [a, b, c]);

        let bytewise = RoutingKey::derive(b"openai", BODY.chunks(1));

        assert_eq!(whole, split);
        assert_eq!(whole, bytewise);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut deriver = KeyDeriver::new(b"openai");
        deriver.update(&BODY[..10]);
        deriver.update(&[]);
        deriver.update(&BODY[10..]);

        assert_eq!(deriver.body_len(), BODY.len() as u64);
        assert_eq!(deriver.finish(), RoutingKey::derive(b"openai", [BODY]));
    }

    #[test]
    fn test_destination_changes_key() {
        let a = RoutingKey::derive(b"openai", [BODY]);
        let b = RoutingKey::derive(b"anthropic", [BODY]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_prefix_body_boundary() {
        let a = RoutingKey::derive(b"ab", [b"c"]);
        let b = RoutingKey::derive(b"a", [b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_body_changes_key() {
        let a = RoutingKey::derive(b"openai", [b"{\"a\":1}"]);
        let b = RoutingKey::derive(b"openai", [b"{\"a\":2}"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_is_hex() {
        let key = RoutingKey::derive(b"", Vec::<&[u8]>::new());
        let shown = key.to_string();

        assert_eq!(shown.len(), 64);
        assert!(shown.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(RoutingKey::from_bytes(*key.as_bytes()), key);
    }
}
