//! Deterministic content-hash IDs for idempotent re-extraction.

use sha2::{Digest, Sha256};

fn hash16(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)[..16].to_string()
}

pub fn entity_id(repo: &str, file_path: &str, name: &str, signature: &str) -> String {
    hash16(&format!("{repo}:{file_path}:{name}:{signature}"))
}

pub fn edge_id(from_id: &str, to_id: &str, edge_type: &str) -> String {
    hash16(&format!("{from_id}-{edge_type}->{to_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_is_deterministic() {
        let a = entity_id("repo", "a.py", "foo", "def foo()");
        let b = entity_id("repo", "a.py", "foo", "def foo()");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn entity_id_varies_with_signature() {
        let a = entity_id("repo", "a.py", "foo", "def foo()");
        let b = entity_id("repo", "a.py", "foo", "def foo(x)");
        assert_ne!(a, b);
    }

    #[test]
    fn edge_id_is_deterministic() {
        let a = edge_id("aaaa", "bbbb", "CALLS");
        let b = edge_id("aaaa", "bbbb", "CALLS");
        assert_eq!(a, b);
    }
}
