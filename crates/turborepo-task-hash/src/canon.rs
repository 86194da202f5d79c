//! The canonical encoding every hashed structure in this crate goes
//! through before `H` (SHA-256, truncated to its first 16 hex digits,
//! matching the length of the fingerprints real build caches key on) is
//! applied: map keys sorted, strings length-prefixed so concatenation can
//! never produce an ambiguous byte stream, and enum tags spelled out as
//! fixed strings rather than relying on discriminant order.

use sha2::{Digest, Sha256};

/// A byte buffer fed one canonical value at a time, then hashed as a unit.
#[derive(Default)]
pub struct Canon(Vec<u8>);

impl Canon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn str(&mut self, s: &str) -> &mut Self {
        self.0.extend_from_slice(&(s.len() as u64).to_le_bytes());
        self.0.extend_from_slice(s.as_bytes());
        self
    }

    pub fn bool(&mut self, b: bool) -> &mut Self {
        self.0.push(b as u8);
        self
    }

    pub fn tag(&mut self, tag: &'static str) -> &mut Self {
        self.str(tag)
    }

    /// Encodes an already-sorted list of strings.
    pub fn strs<'a>(&mut self, items: impl IntoIterator<Item = &'a str>) -> &mut Self {
        let items: Vec<&str> = items.into_iter().collect();
        self.0.extend_from_slice(&(items.len() as u64).to_le_bytes());
        for item in items {
            self.str(item);
        }
        self
    }

    /// Encodes an already key-sorted `(key, value)` sequence.
    pub fn map<'a>(&mut self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> &mut Self {
        let pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
        self.0.extend_from_slice(&(pairs.len() as u64).to_le_bytes());
        for (k, v) in pairs {
            self.str(k);
            self.str(v);
        }
        self
    }

    pub fn finish(&self) -> String {
        let digest = Sha256::digest(&self.0);
        hex::encode(&digest[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_hash() {
        let mut a = Canon::new();
        a.str("build").bool(true);
        let mut b = Canon::new();
        b.str("build").bool(true);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn length_prefixing_avoids_concatenation_ambiguity() {
        let mut a = Canon::new();
        a.str("ab").str("c");
        let mut b = Canon::new();
        b.str("a").str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn hash_is_sixteen_hex_chars() {
        let mut c = Canon::new();
        c.str("x");
        assert_eq!(c.finish().len(), 16);
    }
}
