// Copyright (c) Microsoft Corporation.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Derives the logical cache key for a request.
///
/// The key is the resource address plus the query parameters sorted by name,
/// so equivalent requests whose parameters were supplied in different orders
/// collide to the same key.
#[must_use]
pub fn generate_key(address: &str, params: &BTreeMap<String, String>) -> String {
    let mut key = address.to_owned();
    let mut sep = '?';
    for (name, value) in params {
        let _ = write!(key, "{sep}{name}={value}");
        sep = '&';
    }
    key
}

/// Hashes a logical key down to a short, fixed-width physical key for the
/// durable tier, whose backing stores have key-length practicalities.
///
/// The hash is a signed 32-bit rolling accumulator over the key's UTF-16
/// code units (overflow wrapped), encoded base-36. It is one-way: lookups
/// re-derive the logical key and re-hash it.
#[must_use]
pub fn hash_key(key: &str) -> String {
    let mut hash: i32 = 0;
    for unit in key.encode_utf16() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(i32::from(unit));
    }
    to_base36(i64::from(hash).unsigned_abs())
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if n == 0 {
        return "0".to_owned();
    }

    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[usize::try_from(n % 36).unwrap_or(0)]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn key_without_params_is_the_address() {
        assert_eq!(
            generate_key("https://example.com/feed", &BTreeMap::new()),
            "https://example.com/feed"
        );
    }

    #[test]
    fn params_are_sorted_by_name() {
        let key = generate_key("https://example.com/feed", &params(&[("b", "2"), ("a", "1")]));
        assert_eq!(key, "https://example.com/feed?a=1&b=2");
    }

    #[test]
    fn equivalent_requests_collide_to_the_same_key() {
        let first = generate_key("u", &params(&[("x", "1"), ("y", "2")]));
        let second = generate_key("u", &params(&[("y", "2"), ("x", "1")]));
        assert_eq!(first, second);
    }

    #[test]
    fn hash_is_deterministic_and_short() {
        let long_key = "https://example.com/feed?".repeat(40);
        let hash = hash_key(&long_key);

        assert_eq!(hash, hash_key(&long_key));
        // abs(i32) in base-36 never exceeds 7 digits
        assert!(hash.len() <= 7);
        assert!(!hash.is_empty());
    }

    #[test]
    fn distinct_keys_usually_hash_differently() {
        assert_ne!(hash_key("https://a.example/one"), hash_key("https://a.example/two"));
    }

    #[test]
    fn empty_key_hashes_to_zero() {
        assert_eq!(hash_key(""), "0");
    }
}
