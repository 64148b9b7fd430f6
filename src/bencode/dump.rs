//! Human-readable rendering of a bencode tree

use std::fmt::Write;

use super::value::BencodeValue;

/// Render `value` as an indented, JSON-like tree.
///
/// Printable ASCII is shown as-is; every other byte is escaped as `\u00XX`,
/// which keeps piece tables readable enough to eyeball.
pub fn dump(value: &BencodeValue) -> String {
    let mut out = String::new();
    dump_value(value, &mut out, 0);
    out
}

fn indent(out: &mut String, width: usize) {
    out.extend(std::iter::repeat(' ').take(width));
}

fn dump_bytes(bytes: &[u8], out: &mut String) {
    out.push('"');
    for &b in bytes {
        if (32..127).contains(&b) && b != b'"' && b != b'\\' {
            out.push(b as char);
        } else {
            let _ = write!(out, "\\u{:04x}", b);
        }
    }
    out.push('"');
}

fn dump_value(value: &BencodeValue, out: &mut String, depth: usize) {
    match value {
        BencodeValue::Integer(i) => {
            let _ = write!(out, "{}", i);
        }
        BencodeValue::ByteString(bytes) => dump_bytes(bytes, out),
        BencodeValue::List(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push_str("[\n");
            for (i, item) in items.iter().enumerate() {
                indent(out, depth + 2);
                dump_value(item, out, depth + 2);
                if i + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(out, depth);
            out.push(']');
        }
        BencodeValue::Dictionary(dict) => {
            if dict.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{\n");
            for (i, (key, item)) in dict.iter().enumerate() {
                indent(out, depth + 2);
                dump_bytes(key, out);
                out.push_str(": ");
                dump_value(item, out, depth + 2);
                if i + 1 < dict.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(out, depth);
            out.push('}');
        }
    }
}
