//! Record Attribute Extraction
//!
//! Configuration records arrive as loosely-typed attribute maps. These
//! helpers pull typed values out of them, falling back to a default when the
//! attribute is absent or has the wrong shape.

use crate::model::Record;
use crate::util::stringify_value;

/// Extracts a typed attribute from a record.
///
/// Missing attributes and attributes that cannot be deserialised into `T`
/// both yield `default`.
///
/// ```rust
/// use floorwatch::config::extract_attr;
/// use floorwatch::model::Record;
/// use serde_json::json;
///
/// let mut record = Record::new();
/// record.insert("generation".to_string(), json!(7));
///
/// assert_eq!(extract_attr(&record, "generation", 0_u64), 7);
/// assert_eq!(extract_attr(&record, "missing", 3_u64), 3);
/// assert_eq!(extract_attr(&record, "generation", String::from("x")), "x");
/// ```
pub fn extract_attr<T>(record: &Record, key: &str, default: T) -> T
where
    T: serde::de::DeserializeOwned + Clone,
{
    record
        .get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or(default)
}

/// Extracts an attribute as text, stringifying scalars. Null and missing
/// attributes become the empty string.
pub fn extract_text(record: &Record, key: &str) -> String {
    match record.get(key) {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(value) => stringify_value(value),
    }
}

/// Extracts an attribute as trimmed text, or `None` when it is blank.
pub fn extract_optional_text(record: &Record, key: &str) -> Option<String> {
    let text = extract_text(record, key);
    let trimmed = text.trim();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
