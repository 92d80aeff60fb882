use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hash whatever `f` feeds into a fresh hasher.
pub fn stable_hash_with(f: impl FnOnce(&mut DefaultHasher)) -> u64 {
    let mut hasher = DefaultHasher::new();
    f(&mut hasher);
    hasher.finish()
}

/// Checksum of an encoded artifact payload.
pub fn stable_hash_bytes(bytes: &[u8]) -> u64 {
    stable_hash_with(|hasher| {
        bytes.len().hash(hasher);
        bytes.hash(hasher);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_hash_is_repeatable_and_content_sensitive() {
        assert_eq!(stable_hash_bytes(b"abc"), stable_hash_bytes(b"abc"));
        assert_ne!(stable_hash_bytes(b"abc"), stable_hash_bytes(b"abd"));
        assert_ne!(stable_hash_bytes(b""), stable_hash_bytes(b"\0"));
    }
}
