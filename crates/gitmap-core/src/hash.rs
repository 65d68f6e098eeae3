use crate::canon::canonical_json;
use crate::document::Document;
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 of a commit's content.
pub const COMMIT_ID_LEN: usize = 12;

/// Compute SHA-256 hash of bytes, returning lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Content-addressed commit id over `(message, map_data, parent)`.
///
/// Author, timestamp and the second merge parent do not take part.
pub fn commit_id(message: &str, map_data: &Document, parent: Option<&str>) -> String {
    let content = serde_json::json!({
        "message": message,
        "map_data": map_data,
        "parent": parent,
    });
    let full = sha256_hex(canonical_json(&content).as_bytes());
    full[..COMMIT_ID_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn sha256_empty() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn commit_id_is_deterministic() {
        let d = doc(json!({"operationalLayers": [{"id": "l1", "title": "Roads"}]}));
        let a = commit_id("add roads", &d, Some("abc123abc123"));
        let b = commit_id("add roads", &d, Some("abc123abc123"));
        assert_eq!(a, b);
        assert_eq!(a.len(), COMMIT_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn commit_id_changes_with_each_input() {
        let d = doc(json!({"operationalLayers": [{"id": "l1", "title": "Roads"}]}));
        let other = doc(json!({"operationalLayers": [{"id": "l1", "title": "Rivers"}]}));
        let base = commit_id("msg", &d, None);
        assert_ne!(base, commit_id("msg2", &d, None));
        assert_ne!(base, commit_id("msg", &other, None));
        assert_ne!(base, commit_id("msg", &d, Some("0123456789ab")));
    }

    #[test]
    fn commit_id_ignores_key_order() {
        let a = doc(json!({"version": "2.0", "baseMap": {"title": "Topo"}}));
        let mut b = Document::new();
        b.insert("baseMap".into(), json!({"title": "Topo"}));
        b.insert("version".into(), json!("2.0"));
        assert_eq!(commit_id("m", &a, None), commit_id("m", &b, None));
    }
}
