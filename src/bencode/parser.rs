//! Bencode parser
//!
//! Recursive descent with one byte of lookahead. Besides the value tree the
//! parser reports the exact byte span of the top-level `"info"` entry, since
//! the info hash has to be computed over the original bytes rather than a
//! re-encoding.

use std::ops::Range;

use tracing::{debug, trace};

use super::error::BencodeError;
use super::value::{BencodeValue, Dictionary};

/// Maximum nesting depth accepted by the parser
pub const MAX_DEPTH: usize = 64;

/// Knobs for the parser
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Reject integers with leading zeros and `-0`
    pub strict_integers: bool,
    /// Maximum list/dictionary nesting
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict_integers: false,
            max_depth: MAX_DEPTH,
        }
    }
}

/// Result of parsing a buffer
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    /// The top-level value
    pub value: BencodeValue,
    /// Number of bytes consumed by the top-level value
    pub consumed: usize,
    /// Byte range of the value stored under the top-level `"info"` key
    pub info_span: Option<Range<usize>>,
}

impl ParsedDocument {
    /// Slice the raw `"info"` bytes out of the buffer this document came from
    pub fn info_bytes<'a>(&self, source: &'a [u8]) -> Option<&'a [u8]> {
        self.info_span.clone().and_then(|span| source.get(span))
    }
}

/// Parse a buffer with default options
pub fn parse(data: &[u8]) -> Result<ParsedDocument, BencodeError> {
    parse_with(data, ParseOptions::default())
}

/// Parse a buffer and return only the value tree
pub fn decode(data: &[u8]) -> Result<BencodeValue, BencodeError> {
    parse(data).map(|doc| doc.value)
}

/// Parse a buffer with explicit options
pub fn parse_with(data: &[u8], options: ParseOptions) -> Result<ParsedDocument, BencodeError> {
    trace!("Parsing {} bytes of bencode", data.len());
    let mut parser = Parser {
        data,
        pos: 0,
        options,
        info_span: None,
    };
    let value = parser.parse_value(0)?;

    if parser.pos != data.len() {
        debug!("Ignoring {} trailing bytes after bencode value", data.len() - parser.pos);
    }

    Ok(ParsedDocument {
        value,
        consumed: parser.pos,
        info_span: parser.info_span,
    })
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
    options: ParseOptions,
    info_span: Option<Range<usize>>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn expect(&mut self, c: u8) -> Result<(), BencodeError> {
        match self.peek() {
            None => Err(BencodeError::UnexpectedEof { offset: self.pos }),
            Some(b) if b == c => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(BencodeError::UnexpectedCharacter { byte: b, offset: self.pos }),
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<BencodeValue, BencodeError> {
        if depth > self.options.max_depth {
            return Err(BencodeError::NestingTooDeep {
                max: self.options.max_depth,
                offset: self.pos,
            });
        }

        match self.peek() {
            None => Err(BencodeError::UnexpectedEof { offset: self.pos }),
            Some(b'i') => self.parse_integer(),
            Some(b'l') => self.parse_list(depth),
            Some(b'd') => self.parse_dictionary(depth),
            Some(b'0'..=b'9') => self.parse_byte_string().map(BencodeValue::ByteString),
            Some(byte) => Err(BencodeError::UnexpectedCharacter { byte, offset: self.pos }),
        }
    }

    /// Scan a run of ASCII digits starting at the cursor
    fn scan_digits(&mut self) -> Range<usize> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        start..self.pos
    }

    fn parse_integer(&mut self) -> Result<BencodeValue, BencodeError> {
        let start = self.pos;
        self.expect(b'i')?;

        let negative = self.peek() == Some(b'-');
        if negative {
            self.pos += 1;
        }

        let digits = self.scan_digits();
        if digits.is_empty() {
            // "i" / "i-" ran out of input; "ie" / "i-e" / "ix" are malformed
            return match self.peek() {
                None => Err(BencodeError::UnexpectedEof { offset: self.pos }),
                Some(_) => Err(BencodeError::MalformedInteger { offset: start }),
            };
        }

        let digit_bytes = &self.data[digits.clone()];
        if self.options.strict_integers {
            let leading_zero = digit_bytes.len() > 1 && digit_bytes[0] == b'0';
            let negative_zero = negative && digit_bytes == b"0";
            if leading_zero || negative_zero {
                return Err(BencodeError::NonCanonicalInteger { offset: start });
            }
        }

        let text_start = if negative { digits.start - 1 } else { digits.start };
        let value = std::str::from_utf8(&self.data[text_start..digits.end])
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(BencodeError::MalformedInteger { offset: start })?;

        self.expect(b'e')?;
        trace!("Parsed integer {} at byte {}", value, start);
        Ok(BencodeValue::Integer(value))
    }

    fn parse_byte_string(&mut self) -> Result<Vec<u8>, BencodeError> {
        let start = self.pos;
        let digits = self.scan_digits();
        self.expect(b':')?;

        let length = std::str::from_utf8(&self.data[digits])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or(BencodeError::InvalidStringLength { offset: start })?;

        let remaining = self.data.len() - self.pos;
        if length > remaining {
            return Err(BencodeError::InvalidStringLength { offset: start });
        }

        let bytes = self.data[self.pos..self.pos + length].to_vec();
        self.pos += length;
        Ok(bytes)
    }

    fn parse_list(&mut self, depth: usize) -> Result<BencodeValue, BencodeError> {
        self.expect(b'l')?;
        let mut items = Vec::new();

        loop {
            match self.peek() {
                None => return Err(BencodeError::UnexpectedEof { offset: self.pos }),
                Some(b'e') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => items.push(self.parse_value(depth + 1)?),
            }
        }

        Ok(BencodeValue::List(items))
    }

    fn parse_dictionary(&mut self, depth: usize) -> Result<BencodeValue, BencodeError> {
        self.expect(b'd')?;
        let mut dict = Dictionary::new();

        loop {
            match self.peek() {
                None => return Err(BencodeError::UnexpectedEof { offset: self.pos }),
                Some(b'e') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {}
            }

            let key_offset = self.pos;
            let key = match self.parse_value(depth + 1)? {
                BencodeValue::ByteString(key) => key,
                _ => return Err(BencodeError::DictKeyNotString { offset: key_offset }),
            };

            let value_start = self.pos;
            let value = self.parse_value(depth + 1)?;

            if depth == 0 && key == b"info" {
                self.info_span = Some(value_start..self.pos);
            }

            if dict.insert(key, value).is_some() {
                debug!("Duplicate dictionary key at byte {}, keeping the last value", key_offset);
            }
        }

        Ok(BencodeValue::Dictionary(dict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::encode;

    fn strict() -> ParseOptions {
        ParseOptions {
            strict_integers: true,
            ..ParseOptions::default()
        }
    }

    #[test]
    fn test_parse_byte_string() {
        assert_eq!(decode(b"4:spam").unwrap(), BencodeValue::from("spam"));
    }

    #[test]
    fn test_parse_binary_byte_string() {
        let value = decode(b"3:\x00\xff\x10").unwrap();
        assert_eq!(value.as_bytes(), Some(&[0x00, 0xff, 0x10][..]));
    }

    #[test]
    fn test_parse_empty_byte_string() {
        assert_eq!(decode(b"0:").unwrap(), BencodeValue::ByteString(vec![]));
    }

    #[test]
    fn test_parse_negative_integer() {
        assert_eq!(decode(b"i-42e").unwrap(), BencodeValue::Integer(-42));
    }

    #[test]
    fn test_parse_integer_extremes() {
        assert_eq!(decode(b"i9223372036854775807e").unwrap(), BencodeValue::Integer(i64::MAX));
        assert_eq!(decode(b"i-9223372036854775808e").unwrap(), BencodeValue::Integer(i64::MIN));
        assert!(matches!(
            decode(b"i9223372036854775808e"),
            Err(BencodeError::MalformedInteger { offset: 0 })
        ));
    }

    #[test]
    fn test_parse_list() {
        let value = decode(b"l4:spam4:eggse").unwrap();
        assert_eq!(
            value,
            BencodeValue::List(vec![BencodeValue::from("spam"), BencodeValue::from("eggs")])
        );
    }

    #[test]
    fn test_parse_dictionary() {
        let value = decode(b"d3:cow3:moo4:spam4:eggse").unwrap();
        let expected = BencodeValue::dict([
            ("cow", BencodeValue::from("moo")),
            ("spam", BencodeValue::from("eggs")),
        ]);
        assert_eq!(value, expected);
    }

    #[test]
    fn test_parse_nested() {
        let value = decode(b"d4:listli1ei2ee4:dictd1:ai-1eee").unwrap();
        assert_eq!(value.get(b"list").and_then(|v| v.as_list()).map(|l| l.len()), Some(2));
        assert_eq!(value.get(b"dict").and_then(|d| d.get(b"a")).and_then(|v| v.as_integer()), Some(-1));
    }

    #[test]
    fn test_unterminated_integer_is_eof() {
        assert!(matches!(decode(b"i5"), Err(BencodeError::UnexpectedEof { offset: 2 })));
    }

    #[test]
    fn test_string_longer_than_buffer() {
        assert!(matches!(decode(b"3:ab"), Err(BencodeError::InvalidStringLength { offset: 0 })));
    }

    #[test]
    fn test_string_missing_colon() {
        assert!(matches!(decode(b"3"), Err(BencodeError::UnexpectedEof { offset: 1 })));
        assert!(matches!(
            decode(b"3xab"),
            Err(BencodeError::UnexpectedCharacter { byte: b'x', offset: 1 })
        ));
    }

    #[test]
    fn test_malformed_integers() {
        assert!(matches!(decode(b"ie"), Err(BencodeError::MalformedInteger { .. })));
        assert!(matches!(decode(b"i-e"), Err(BencodeError::MalformedInteger { .. })));
        assert!(matches!(decode(b"i-"), Err(BencodeError::UnexpectedEof { .. })));
        assert!(matches!(
            decode(b"i12x"),
            Err(BencodeError::UnexpectedCharacter { byte: b'x', offset: 3 })
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(decode(b""), Err(BencodeError::UnexpectedEof { offset: 0 })));
    }

    #[test]
    fn test_unexpected_leading_character() {
        assert!(matches!(
            decode(b"x"),
            Err(BencodeError::UnexpectedCharacter { byte: b'x', offset: 0 })
        ));
    }

    #[test]
    fn test_unterminated_containers() {
        assert!(matches!(decode(b"l4:spam"), Err(BencodeError::UnexpectedEof { .. })));
        assert!(matches!(decode(b"d3:cow3:moo"), Err(BencodeError::UnexpectedEof { .. })));
        assert!(matches!(decode(b"d3:cow"), Err(BencodeError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_dictionary_key_must_be_string() {
        assert!(matches!(
            decode(b"di1e3:fooe"),
            Err(BencodeError::DictKeyNotString { offset: 1 })
        ));
        assert!(matches!(
            decode(b"dle3:fooe"),
            Err(BencodeError::DictKeyNotString { offset: 1 })
        ));
    }

    #[test]
    fn test_duplicate_keys_keep_last_value() {
        let value = decode(b"d1:ai1e1:ai2ee").unwrap();
        assert_eq!(value.get(b"a").and_then(|v| v.as_integer()), Some(2));
    }

    #[test]
    fn test_nesting_limit() {
        let mut data = vec![b'l'; MAX_DEPTH + 2];
        data.extend(vec![b'e'; MAX_DEPTH + 2]);
        assert!(matches!(decode(&data), Err(BencodeError::NestingTooDeep { .. })));

        let mut ok = vec![b'l'; MAX_DEPTH];
        ok.extend(vec![b'e'; MAX_DEPTH]);
        assert!(decode(&ok).is_ok());
    }

    #[test]
    fn test_lenient_integers_accept_leading_zero_and_negative_zero() {
        assert_eq!(decode(b"i03e").unwrap(), BencodeValue::Integer(3));
        assert_eq!(decode(b"i-0e").unwrap(), BencodeValue::Integer(0));
        assert_eq!(decode(b"i0e").unwrap(), BencodeValue::Integer(0));
    }

    #[test]
    fn test_strict_integers_reject_leading_zero_and_negative_zero() {
        assert!(matches!(
            parse_with(b"i03e", strict()),
            Err(BencodeError::NonCanonicalInteger { offset: 0 })
        ));
        assert!(matches!(
            parse_with(b"i-0e", strict()),
            Err(BencodeError::NonCanonicalInteger { offset: 0 })
        ));
        assert_eq!(parse_with(b"i0e", strict()).unwrap().value, BencodeValue::Integer(0));
        assert_eq!(parse_with(b"i-10e", strict()).unwrap().value, BencodeValue::Integer(-10));
    }

    #[test]
    fn test_trailing_bytes_are_reported() {
        let doc = parse(b"i1egarbage").unwrap();
        assert_eq!(doc.value, BencodeValue::Integer(1));
        assert_eq!(doc.consumed, 3);
    }

    #[test]
    fn test_info_span_covers_raw_bytes() {
        let data = b"d8:announce3:url4:infod6:lengthi10eee";
        let doc = parse(data).unwrap();
        assert_eq!(doc.info_bytes(data), Some(&b"d6:lengthi10ee"[..]));
    }

    #[test]
    fn test_info_span_ignores_nested_info_keys() {
        let data = b"d5:outerd4:infoi1eee";
        let doc = parse(data).unwrap();
        assert!(doc.info_span.is_none());
    }

    #[test]
    fn test_info_span_preserves_non_canonical_bytes() {
        // Key order and the leading zero would both change on re-encoding
        let data = b"d4:infod1:bi1e1:ai01eee";
        let doc = parse(data).unwrap();
        let raw = doc.info_bytes(data).unwrap();
        assert_eq!(raw, b"d1:bi1e1:ai01ee");
        let reencoded = encode(doc.value.get(b"info").unwrap());
        assert_ne!(raw, reencoded.as_slice());
    }

    #[test]
    fn test_round_trip_hand_built_value() {
        let value = BencodeValue::dict([
            ("announce", BencodeValue::from("http://tracker.example.com/announce")),
            ("count", BencodeValue::from(-17i64)),
            (
                "nested",
                BencodeValue::List(vec![
                    BencodeValue::from(vec![0u8, 1, 2, 255]),
                    BencodeValue::dict([("z", BencodeValue::from(0i64)), ("a", BencodeValue::List(vec![]))]),
                ]),
            ),
        ]);
        let bytes = encode(&value);
        assert_eq!(decode(&bytes).unwrap(), value);
    }
}
