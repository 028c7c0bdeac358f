use serde_json::{Map, Value};
use url::form_urlencoded;

/// Skip count for the page following `offset`.
///
/// Returns `None` when `limit` is zero.
pub fn skip_for(offset: u64, limit: u64) -> Option<u64> {
    let page = offset.checked_div(limit)? + 1;
    Some(page * limit)
}

/// Escape double quotes for use inside a URL.
pub fn quote(input: &str) -> String {
    input.replace('"', "%22")
}

/// Look up `key`, falling back to `default` when absent.
pub fn value_or(key: &str, map: &Map<String, Value>, default: Value) -> Value {
    map.get(key).cloned().unwrap_or(default)
}

/// Form-style URL encoding (space becomes `+`).
pub fn url_encode(input: &str) -> String {
    form_urlencoded::byte_serialize(input.as_bytes()).collect()
}

/// Percent-encode a single path segment (space becomes `%20`).
pub fn encode_path_segment(input: &str) -> String {
    // byte_serialize escapes a literal `+` as %2B, so every `+` left is a space
    url_encode(input).replace('+', "%20")
}

/// Wrap a validator in literal double quotes, as ETag-style headers expect.
pub fn quoted(value: &str) -> String {
    format!("\"{}\"", value)
}
