//! Helpers for flat key/value blobs.
//!
//! Request metadata and HTTP query strings arrive as NUL-separated runs:
//! `key\0value\0key\0value\0`. Keys may repeat.
//!
//! # Example
//!
//! ```
//! use cloudi_api::key_value;
//!
//! let info = b"accept\0text/html\0accept\0text/plain\0host\0example\0";
//! let parsed = key_value::info_key_value_parse(info);
//!
//! assert_eq!(parsed["accept"], ["text/html", "text/plain"]);
//! assert_eq!(parsed["host"], ["example"]);
//! ```

use std::collections::HashMap;

/// Split `blob` at NUL bytes.
///
/// A single trailing NUL terminates the last run rather than starting an
/// empty one.
pub fn parse(blob: &[u8]) -> Vec<&[u8]> {
    if blob.is_empty() {
        return Vec::new();
    }
    let blob = blob.strip_suffix(&[0]).unwrap_or(blob);
    blob.split(|&byte| byte == 0).collect()
}

/// Pair up alternating keys and values; a key without a value gets `b""`.
pub fn pairs(blob: &[u8]) -> Vec<(&[u8], &[u8])> {
    parse(blob)
        .chunks(2)
        .map(|pair| (pair[0], pair.get(1).copied().unwrap_or(&[])))
        .collect()
}

/// Group values by key, keeping their order of appearance.
pub fn to_map(blob: &[u8]) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in pairs(blob) {
        map.entry(String::from_utf8_lossy(key).into_owned())
            .or_default()
            .push(String::from_utf8_lossy(value).into_owned());
    }
    map
}

/// Parse an HTTP query string delivered as a request body.
pub fn request_http_qs_parse(request: &[u8]) -> HashMap<String, Vec<String>> {
    to_map(request)
}

/// Parse request or response metadata.
pub fn info_key_value_parse(info: &[u8]) -> HashMap<String, Vec<String>> {
    to_map(info)
}
