use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32HEX_NOPAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::HashError;

/// Length of a content hash in bytes.
pub const HASH_LEN: usize = 20;

/// Length of the sortable prefix in bytes.
pub const PREFIX_LEN: usize = 8;

/// Length of the suffix in bytes.
pub const SUFFIX_LEN: usize = HASH_LEN - PREFIX_LEN;

/// Length of the external base32 form.
pub const HASH_STRING_LEN: usize = 32;

/// Content hash identifying a chunk.
///
/// A `Hash` is the first 20 bytes of the BLAKE3 digest of a chunk's bytes.
/// Externally it is written as 32 characters of base32 using the alphabet
/// `0-9a-v`. Internally it splits into an 8-byte prefix, read as a
/// big-endian `u64` and used as the sort and search key, and a 12-byte
/// suffix that disambiguates prefix collisions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; HASH_LEN]);

/// The 12 trailing bytes of a [`Hash`].
pub type Suffix = [u8; SUFFIX_LEN];

impl Hash {
    /// Hash raw bytes.
    pub fn of(data: &[u8]) -> Self {
        let digest = blake3::hash(data);
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(&digest.as_bytes()[..HASH_LEN]);
        Self(bytes)
    }

    /// Wrap a pre-computed digest.
    pub const fn from_raw(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// The empty hash (all zeros). Names "no chunk", e.g. an unset root.
    pub const fn empty() -> Self {
        Self([0u8; HASH_LEN])
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// Build from a prefix and suffix.
    pub fn from_parts(prefix: u64, suffix: Suffix) -> Self {
        let mut bytes = [0u8; HASH_LEN];
        bytes[..PREFIX_LEN].copy_from_slice(&prefix.to_be_bytes());
        bytes[PREFIX_LEN..].copy_from_slice(&suffix);
        Self(bytes)
    }

    /// Parse from a byte slice of exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        let arr: [u8; HASH_LEN] = bytes.try_into().map_err(|_| HashError::InvalidLength {
            expected: HASH_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// First 8 bytes as a big-endian integer.
    pub fn prefix(&self) -> u64 {
        let mut buf = [0u8; PREFIX_LEN];
        buf.copy_from_slice(&self.0[..PREFIX_LEN]);
        u64::from_be_bytes(buf)
    }

    /// Last 12 bytes.
    pub fn suffix(&self) -> Suffix {
        let mut buf = [0u8; SUFFIX_LEN];
        buf.copy_from_slice(&self.0[PREFIX_LEN..]);
        buf
    }

    /// Hex form of the prefix (16 characters).
    pub fn prefix_hex(&self) -> String {
        hex::encode(&self.0[..PREFIX_LEN])
    }

    /// Hex form of the suffix (24 characters).
    pub fn suffix_hex(&self) -> String {
        hex::encode(&self.0[PREFIX_LEN..])
    }

    /// Short base32 form (first 8 characters) for log lines.
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(8);
        s
    }

    /// Parse the external 32-character base32 form.
    ///
    /// Anything other than exactly 32 characters from `0-9a-v` is rejected
    /// before decoding.
    pub fn parse(s: &str) -> Result<Self, HashError> {
        if s.len() != HASH_STRING_LEN
            || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'v').contains(&b))
        {
            return Err(HashError::InvalidFormat(s.to_string()));
        }
        let decoded = BASE32HEX_NOPAD
            .decode(s.to_ascii_uppercase().as_bytes())
            .map_err(|_| HashError::InvalidFormat(s.to_string()))?;
        Self::from_slice(&decoded).map_err(|_| HashError::InvalidFormat(s.to_string()))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE32HEX_NOPAD.encode(&self.0).to_ascii_lowercase())
    }
}

impl FromStr for Hash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; HASH_LEN] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn of_is_deterministic() {
        assert_eq!(Hash::of(b"hello"), Hash::of(b"hello"));
        assert_ne!(Hash::of(b"hello"), Hash::of(b"world"));
    }

    #[test]
    fn of_truncates_blake3() {
        let h = Hash::of(b"chunk");
        assert_eq!(&h.as_bytes()[..], &blake3::hash(b"chunk").as_bytes()[..HASH_LEN]);
    }

    #[test]
    fn display_is_32_lowercase_chars() {
        let s = Hash::of(b"display").to_string();
        assert_eq!(s.len(), HASH_STRING_LEN);
        assert!(s.chars().all(|c| c.is_ascii_digit() || ('a'..='v').contains(&c)));
    }

    #[test]
    fn empty_hash_renders_as_zeros() {
        assert_eq!(Hash::empty().to_string(), "0".repeat(32));
        assert!(Hash::empty().is_empty());
    }

    #[test]
    fn parse_accepts_all_a() {
        let h = Hash::parse("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        assert_eq!(h.to_string(), "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for bad in [
            "invalid",
            "",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "wwwwwwwwwwwwwwwwwwwwwwwwwwwwwwww",
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            "aaaaaaaaaaaaaaaa aaaaaaaaaaaaaaa",
        ] {
            assert!(
                matches!(Hash::parse(bad), Err(HashError::InvalidFormat(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn prefix_is_big_endian() {
        let mut raw = [0u8; HASH_LEN];
        raw[7] = 1;
        assert_eq!(Hash::from_raw(raw).prefix(), 1);
        raw[0] = 0x80;
        assert_eq!(Hash::from_raw(raw).prefix(), (1u64 << 63) | 1);
    }

    #[test]
    fn hex_parts_have_expected_widths() {
        let h = Hash::of(b"hex");
        assert_eq!(h.prefix_hex().len(), 16);
        assert_eq!(h.suffix_hex().len(), 24);
        assert_eq!(format!("{}{}", h.prefix_hex(), h.suffix_hex()), hex::encode(h.as_bytes()));
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(Hash::from_slice(&[0u8; 19]).is_err());
        assert!(Hash::from_slice(&[0u8; 20]).is_ok());
    }

    #[test]
    fn serde_uses_base32_string() {
        let h = Hash::of(b"serde");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{h}\""));
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn ordering_matches_prefix_order() {
        let a = Hash::from_parts(1, [0xff; SUFFIX_LEN]);
        let b = Hash::from_parts(2, [0x00; SUFFIX_LEN]);
        assert!(a < b);
    }

    proptest! {
        #[test]
        fn split_then_join_is_identity(raw in proptest::array::uniform20(any::<u8>())) {
            let h = Hash::from_raw(raw);
            let joined = Hash::from_parts(h.prefix(), h.suffix());
            prop_assert_eq!(joined, h);
            let mut concat = h.prefix().to_be_bytes().to_vec();
            concat.extend_from_slice(&h.suffix());
            prop_assert_eq!(concat.as_slice(), &raw[..]);
        }

        #[test]
        fn string_form_roundtrips(raw in proptest::array::uniform20(any::<u8>())) {
            let h = Hash::from_raw(raw);
            prop_assert_eq!(Hash::parse(&h.to_string()).unwrap(), h);
        }
    }
}
