//! Canonical bencode encoder

use bytes::BufMut;

use super::value::BencodeValue;

/// Encode a value; dictionary keys come out in sorted order
pub fn encode(value: &BencodeValue) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(value, &mut buf);
    buf
}

/// Append the encoding of `value` to `buf`
pub fn encode_into(value: &BencodeValue, buf: &mut Vec<u8>) {
    match value {
        BencodeValue::Integer(i) => {
            buf.put_u8(b'i');
            buf.put_slice(i.to_string().as_bytes());
            buf.put_u8(b'e');
        }
        BencodeValue::ByteString(bytes) => put_byte_string(buf, bytes),
        BencodeValue::List(items) => {
            buf.put_u8(b'l');
            for item in items {
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
        BencodeValue::Dictionary(dict) => {
            buf.put_u8(b'd');
            for (key, value) in dict {
                put_byte_string(buf, key);
                encode_into(value, buf);
            }
            buf.put_u8(b'e');
        }
    }
}

fn put_byte_string(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.put_slice(bytes.len().to_string().as_bytes());
    buf.put_u8(b':');
    buf.put_slice(bytes);
}

impl BencodeValue {
    /// Encode this value to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        encode(self)
    }
}
