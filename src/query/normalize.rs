//! Result normalization for assertions
//!
//! Strips system attributes (`_key`, `_id`, `_rev`, ...) and orders object
//! keys so rows can be compared independent of storage metadata.

use serde_json::{Map, Value};

/// Normalize one row. Objects lose their `_`-prefixed attributes and get
/// sorted keys; arrays are normalized element-wise only when `recursive`.
pub fn normalize_row(row: &Value, recursive: bool) -> Value {
    match row {
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().filter(|k| !k.starts_with('_')).collect();
            keys.sort();
            let out: Map<String, Value> = keys
                .into_iter()
                .map(|k| (k.clone(), fields[k].clone()))
                .collect();
            Value::Object(out)
        }
        Value::Array(items) if recursive => {
            Value::Array(items.iter().map(|v| normalize_row(v, false)).collect())
        }
        other => other.clone(),
    }
}

/// Normalize every row of a result.
pub fn normalize_rows(rows: &[Value], recursive: bool) -> Vec<Value> {
    rows.iter().map(|r| normalize_row(r, recursive)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strips_system_attributes() {
        let row = json!({ "_key": "ant", "_id": "animals/ant", "_rev": "_1", "legs": 6 });
        assert_eq!(normalize_row(&row, false), json!({ "legs": 6 }));
    }

    #[test]
    fn test_keys_sorted() {
        let row = json!({ "b": 1, "a": 2 });
        let normalized = normalize_row(&row, false);
        let keys: Vec<&String> = normalized.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_arrays_only_when_recursive() {
        let row = json!([{ "_key": "x", "v": 1 }]);
        assert_eq!(normalize_row(&row, false), row);
        assert_eq!(normalize_row(&row, true), json!([{ "v": 1 }]));
    }

    #[test]
    fn test_scalars_unchanged() {
        assert_eq!(normalize_rows(&[json!(1), json!("a")], true), vec![json!(1), json!("a")]);
    }
}
