//! Bencode value model

use std::collections::BTreeMap;

/// Dictionary payload: byte-string keys in sorted order
pub type Dictionary = BTreeMap<Vec<u8>, BencodeValue>;

/// A parsed bencode value.
///
/// Lists and dictionaries own their children. Dictionaries are ordered maps,
/// so two dictionaries compare equal regardless of the order their entries
/// appeared in on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Integer(i64),
    ByteString(Vec<u8>),
    List(Vec<BencodeValue>),
    Dictionary(Dictionary),
}

impl BencodeValue {
    /// Human-readable name of the variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            BencodeValue::Integer(_) => "integer",
            BencodeValue::ByteString(_) => "byte string",
            BencodeValue::List(_) => "list",
            BencodeValue::Dictionary(_) => "dictionary",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::ByteString(b) => Some(b),
            _ => None,
        }
    }

    /// Byte string contents, if they are valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            BencodeValue::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Look up `key` if this value is a dictionary
    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Build a dictionary from `(key, value)` pairs
    pub fn dict<K, I>(entries: I) -> Self
    where
        K: Into<Vec<u8>>,
        I: IntoIterator<Item = (K, BencodeValue)>,
    {
        BencodeValue::Dictionary(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<i64> for BencodeValue {
    fn from(value: i64) -> Self {
        BencodeValue::Integer(value)
    }
}

impl From<&str> for BencodeValue {
    fn from(value: &str) -> Self {
        BencodeValue::ByteString(value.as_bytes().to_vec())
    }
}

impl From<&[u8]> for BencodeValue {
    fn from(value: &[u8]) -> Self {
        BencodeValue::ByteString(value.to_vec())
    }
}

impl From<Vec<u8>> for BencodeValue {
    fn from(value: Vec<u8>) -> Self {
        BencodeValue::ByteString(value)
    }
}

impl From<Vec<BencodeValue>> for BencodeValue {
    fn from(value: Vec<BencodeValue>) -> Self {
        BencodeValue::List(value)
    }
}

impl From<Dictionary> for BencodeValue {
    fn from(value: Dictionary) -> Self {
        BencodeValue::Dictionary(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(BencodeValue::from(7i64).as_integer(), Some(7));
        assert_eq!(BencodeValue::from("spam").as_str(), Some("spam"));
        assert_eq!(BencodeValue::from(vec![0xffu8, 0xfe]).as_str(), None);
        assert!(BencodeValue::from(7i64).as_bytes().is_none());
        assert_eq!(BencodeValue::List(vec![]).as_list().map(|l| l.len()), Some(0));
    }

    #[test]
    fn test_dict_lookup() {
        let value = BencodeValue::dict([("cow", BencodeValue::from("moo"))]);
        assert_eq!(value.get(b"cow").and_then(|v| v.as_str()), Some("moo"));
        assert!(value.get(b"spam").is_none());
        assert!(BencodeValue::from(1i64).get(b"cow").is_none());
    }

    #[test]
    fn test_dictionary_equality_ignores_insertion_order() {
        let a = BencodeValue::dict([("a", BencodeValue::from(1i64)), ("b", BencodeValue::from(2i64))]);
        let b = BencodeValue::dict([("b", BencodeValue::from(2i64)), ("a", BencodeValue::from(1i64))]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_kind_name() {
        assert_eq!(BencodeValue::from(1i64).kind_name(), "integer");
        assert_eq!(BencodeValue::from("x").kind_name(), "byte string");
        assert_eq!(BencodeValue::List(vec![]).kind_name(), "list");
        assert_eq!(BencodeValue::Dictionary(Dictionary::new()).kind_name(), "dictionary");
    }
}
