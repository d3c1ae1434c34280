//! Content fingerprinting: newline-normalised hashing used by the fingerprint cache.
//!
//! See spec.md §3 (Fingerprint/DocumentSymbols Cache) and §8 (Hash stability law).

/// Normalise line endings to `\n`: both `\r\n` and lone `\r` map to `\n`.
pub fn normalize_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            other => out.push(other),
        }
    }
    out
}

/// Stable content fingerprint: blake3 over the newline-normalised UTF-8 bytes.
///
/// Idempotent: `fingerprint(normalize(x)) == fingerprint(normalize(normalize(x)))`,
/// since `normalize` is itself idempotent once line endings are all `\n`.
pub fn fingerprint(text: &str) -> String {
    let normalized = normalize_newlines(text);
    blake3::hash(normalized.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_and_lf_hash_identically() {
        let lf = "a\nb\nc";
        let crlf = "a\r\nb\r\nc";
        let cr = "a\rb\rc";
        let h = fingerprint(lf);
        assert_eq!(h, fingerprint(crlf));
        assert_eq!(h, fingerprint(cr));
    }

    #[test]
    fn normalize_is_idempotent() {
        let text = "a\r\nb\rc\nd";
        let once = normalize_newlines(text);
        let twice = normalize_newlines(&once);
        assert_eq!(once, twice);
        assert_eq!(fingerprint(text), fingerprint(&once));
    }

    #[test]
    fn different_content_hashes_differ() {
        assert_ne!(fingerprint("a"), fingerprint("b"));
    }
}
