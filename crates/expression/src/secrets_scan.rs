//! Finds `secrets.<name>` references in template or script source
//! without fully parsing it.
//!
//! The execution context uses this before building an
//! [`crate::EvaluationContext`]: rather than materializing every secret
//! an account owns for every node, it resolves only the keys a node's
//! params and scripts actually name, which is what lets the vault's
//! lazy-decrypt-and-cache contract (§4.D invariant 3) mean something —
//! a node that never touches `secrets` never triggers a decrypt.

use std::collections::HashSet;

const NEEDLE: &str = "secrets.";

/// All distinct secret keys referenced via `secrets.<name>` in `source`.
#[must_use]
pub fn scan_secret_references(source: &str) -> HashSet<String> {
    let bytes = source.as_bytes();
    let mut refs = HashSet::new();
    let mut i = 0;
    while let Some(offset) = find_from(bytes, i) {
        let preceded_by_ident = offset > 0 && is_ident_byte(bytes[offset - 1]);
        let start = offset + NEEDLE.len();
        let mut end = start;
        while end < bytes.len() && is_ident_byte(bytes[end]) {
            end += 1;
        }
        if !preceded_by_ident && end > start {
            refs.insert(source[start..end].to_string());
        }
        i = end.max(offset + 1);
    }
    refs
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn find_from(bytes: &[u8], from: usize) -> Option<usize> {
    let needle = NEEDLE.as_bytes();
    if from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_a_single_reference() {
        let refs = scan_secret_references("${ secrets.api_key }");
        assert_eq!(refs, HashSet::from(["api_key".to_string()]));
    }

    #[test]
    fn finds_multiple_distinct_references() {
        let refs = scan_secret_references("secrets.a + secrets.b + secrets.a");
        assert_eq!(refs, HashSet::from(["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn ignores_identifiers_merely_ending_in_secrets() {
        let refs = scan_secret_references("my_secrets.leaked");
        assert!(refs.is_empty());
    }

    #[test]
    fn no_references_in_plain_source() {
        assert!(scan_secret_references("input.name + shared.count").is_empty());
    }
}
