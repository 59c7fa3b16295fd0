use chrono::{DateTime, SecondsFormat, Utc};
use coffer_types::ContentHash;
use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes.
pub fn sha256(data: &[u8]) -> ContentHash {
    ContentHash::digest(data)
}

/// The value half of a hashed field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashValue<'a> {
    /// Raw bytes, hashed as-is.
    Bytes(&'a [u8]),
    /// A string, hashed as its own UTF-8 bytes.
    Str(&'a str),
    /// A timestamp, hashed as ISO-8601 UTC with millisecond precision.
    Timestamp(DateTime<Utc>),
    /// An integer, hashed as its base-10 ASCII text.
    Number(i128),
}

/// One `{key, value}` field of a hash input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashPart<'a> {
    pub key: &'a str,
    pub value: HashValue<'a>,
}

impl<'a> HashPart<'a> {
    pub fn bytes(key: &'a str, value: &'a [u8]) -> Self {
        Self {
            key,
            value: HashValue::Bytes(value),
        }
    }

    pub fn str(key: &'a str, value: &'a str) -> Self {
        Self {
            key,
            value: HashValue::Str(value),
        }
    }

    pub fn timestamp(key: &'a str, value: DateTime<Utc>) -> Self {
        Self {
            key,
            value: HashValue::Timestamp(value),
        }
    }

    pub fn number(key: &'a str, value: impl Into<i128>) -> Self {
        Self {
            key,
            value: HashValue::Number(value.into()),
        }
    }
}

/// Digest of an ordered list of fields.
///
/// The digest is SHA-256 over the concatenation, in input order, of each
/// field's key bytes followed by the canonical encoding of its value. There
/// are no separators or length prefixes; the field keys chosen by callers
/// must keep inputs unambiguous.
pub fn hash_parts(parts: &[HashPart<'_>]) -> ContentHash {
    let mut hasher = FieldHasher::new();
    for part in parts {
        hasher.field(part);
    }
    hasher.finish()
}

/// Streaming form of [`hash_parts`].
///
/// Feeding the same fields in the same order produces the same digest as
/// `hash_parts`, without materialising the field list.
#[derive(Clone, Default)]
pub struct FieldHasher {
    inner: Sha256,
}

impl FieldHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a `v` field naming the domain, so digests of different
    /// object kinds never collide even when their fields do.
    pub fn with_domain(domain: &str) -> Self {
        let mut hasher = Self::new();
        hasher.str("v", domain);
        hasher
    }

    pub fn field(&mut self, part: &HashPart<'_>) -> &mut Self {
        self.inner.update(part.key.as_bytes());
        match part.value {
            HashValue::Bytes(bytes) => self.inner.update(bytes),
            HashValue::Str(s) => self.inner.update(s.as_bytes()),
            HashValue::Timestamp(ts) => self
                .inner
                .update(ts.to_rfc3339_opts(SecondsFormat::Millis, true).as_bytes()),
            HashValue::Number(n) => self.inner.update(n.to_string().as_bytes()),
        }
        self
    }

    pub fn bytes(&mut self, key: &str, value: &[u8]) -> &mut Self {
        self.field(&HashPart::bytes(key, value))
    }

    pub fn str(&mut self, key: &str, value: &str) -> &mut Self {
        self.field(&HashPart::str(key, value))
    }

    pub fn timestamp(&mut self, key: &str, value: DateTime<Utc>) -> &mut Self {
        self.field(&HashPart::timestamp(key, value))
    }

    pub fn number(&mut self, key: &str, value: impl Into<i128>) -> &mut Self {
        self.field(&HashPart::number(key, value))
    }

    pub fn finish(self) -> ContentHash {
        ContentHash::from_hash(self.inner.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn hash_is_concatenation_of_keys_and_values() {
        let ts = Utc.with_ymd_and_hms(2024, 8, 17, 10, 30, 0).unwrap();
        let parts = [
            HashPart::bytes("t", b"\x01\x02"),
            HashPart::timestamp("ts", ts),
            HashPart::number("s", 42u64),
            HashPart::str("n", "file.txt"),
        ];
        let mut expected = Vec::new();
        expected.extend_from_slice(b"t\x01\x02");
        expected.extend_from_slice(b"ts2024-08-17T10:30:00.000Z");
        expected.extend_from_slice(b"s42");
        expected.extend_from_slice(b"nfile.txt");
        assert_eq!(hash_parts(&parts), sha256(&expected));
    }

    #[test]
    fn string_values_contribute_their_own_bytes() {
        let a = hash_parts(&[HashPart::str("n", "alpha")]);
        let b = hash_parts(&[HashPart::str("n", "beta")]);
        assert_ne!(a, b);
        // The key must not stand in for the value.
        assert_ne!(a, sha256(b"nn"));
    }

    #[test]
    fn negative_numbers_use_sign() {
        assert_eq!(hash_parts(&[HashPart::number("x", -5i64)]), sha256(b"x-5"));
    }

    #[test]
    fn order_matters() {
        let a = hash_parts(&[HashPart::str("a", "1"), HashPart::str("b", "2")]);
        let b = hash_parts(&[HashPart::str("b", "2"), HashPart::str("a", "1")]);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_field_list_is_digest_of_nothing() {
        assert_eq!(hash_parts(&[]), sha256(b""));
    }

    #[test]
    fn domain_prefix_separates_digests() {
        let mut plain = FieldHasher::new();
        plain.bytes("h", b"same");
        let mut tagged = FieldHasher::with_domain("coffer-test-v1");
        tagged.bytes("h", b"same");
        assert_ne!(plain.finish(), tagged.finish());
    }

    #[test]
    fn sub_millisecond_precision_is_dropped() {
        let base = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let later = base + chrono::Duration::microseconds(400);
        assert_eq!(
            hash_parts(&[HashPart::timestamp("ts", base)]),
            hash_parts(&[HashPart::timestamp("ts", later)])
        );
    }

    proptest! {
        #[test]
        fn streaming_matches_list(key in "[a-z]{1,3}", value in proptest::collection::vec(any::<u8>(), 0..64), n in any::<i64>()) {
            let list = hash_parts(&[HashPart::bytes(&key, &value), HashPart::number("n", n)]);
            let mut streaming = FieldHasher::new();
            streaming.bytes(&key, &value).number("n", n);
            prop_assert_eq!(list, streaming.finish());
        }
    }
}
