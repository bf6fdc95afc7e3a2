//! Dot-separated path lookup over a parsed JSON tree.
//!
//! Only object key indexing is supported. A missing key, a non-object
//! node on the way, or an unparsable document all read as "not found".

use serde_json::Value;

/// Walk `path` through `root`. A leading `$` segment is ignored.
pub fn select<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    if segments.peek() == Some(&"$") {
        segments.next();
    }

    for segment in segments {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }

    Some(current)
}

/// Textual form of a node: strings raw, null empty, everything else as compact JSON.
pub fn node_text(node: &Value) -> String {
    match node {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse `body` and extract the node at `path`, empty on any failure.
pub fn extract(body: &str, path: &str) -> String {
    let Ok(root) = serde_json::from_str::<Value>(body) else {
        return String::new();
    };
    select(&root, path).map(node_text).unwrap_or_default()
}
