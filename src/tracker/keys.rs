use sha2::{Digest, Sha256};

/// Number of characters of normalized content that feed the fingerprint.
const FINGERPRINT_PREFIX_CHARS: usize = 50;

/// Hex characters kept from the SHA-256 digest.
const FINGERPRINT_HEX_LEN: usize = 16;

/// Key scoping a message id to the instance that delivered it.
pub fn scoped_key(instance_name: &str, message_id: &str) -> String {
    format!("{}:{}", instance_name, message_id)
}

/// Collapses whitespace, lowercases, and keeps the leading characters so that
/// near-identical retries hash alike.
pub fn normalize_content(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .take(FINGERPRINT_PREFIX_CHARS)
        .collect()
}

/// Short SHA-256 fingerprint of normalized message content.
pub fn content_fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_content(content).as_bytes());
    let hash = hasher.finalize();
    let mut hash_hex = hex::encode(hash);
    hash_hex.truncate(FINGERPRINT_HEX_LEN);
    hash_hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_key() {
        assert_eq!(scoped_key("sales-bot", "msg-1"), "sales-bot:msg-1");
    }

    #[test]
    fn test_normalize_content() {
        assert_eq!(normalize_content("  Hello   WORLD \n again "), "hello world again");
    }

    #[test]
    fn test_normalize_truncates() {
        let long = "a".repeat(80);
        assert_eq!(normalize_content(&long).len(), 50);
    }

    #[test]
    fn test_fingerprint_ignores_case_and_spacing() {
        let a = content_fingerprint("Olá, tudo bem?");
        let b = content_fingerprint("  olá,   TUDO bem?  ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_fingerprint_differs_for_different_content() {
        assert_ne!(content_fingerprint("order shipped"), content_fingerprint("order cancelled"));
    }

    #[test]
    fn test_fingerprint_only_uses_prefix() {
        let base = "x".repeat(50);
        let a = content_fingerprint(&format!("{}tail one", base));
        let b = content_fingerprint(&format!("{}tail two", base));
        assert_eq!(a, b);
    }
}
