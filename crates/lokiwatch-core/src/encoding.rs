//! Percent-encoding for URI query values and path segments.

use std::fmt::Write as _;

/// Percent-encode `s`, keeping only RFC 3986 unreserved characters.
///
/// Safe for both query values and single path segments.
pub fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}
