//! Script backend glue — turns evaluator results into result lists.

use serde_json::Value;

/// Maps a script result onto the list shape the executor works in. Arrays
/// become one item per element, null becomes the empty list, and anything
/// else is a single item. Strings stay raw; other scalars and containers
/// use their JSON text.
pub fn value_to_strings(value: Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items.into_iter().map(item_to_string).collect(),
        other => vec![other.to_string()],
    }
}

fn item_to_string(item: Value) -> String {
    match item {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_empty() {
        assert!(value_to_strings(Value::Null).is_empty());
    }

    #[test]
    fn test_string_is_single_item() {
        assert_eq!(value_to_strings(json!("hello")), vec!["hello"]);
    }

    #[test]
    fn test_array_splits_per_element() {
        assert_eq!(
            value_to_strings(json!(["a", 2, true])),
            vec!["a", "2", "true"]
        );
    }

    #[test]
    fn test_object_is_compact_json() {
        let out = value_to_strings(json!({"k": 1}));
        assert_eq!(out, vec!["{\"k\":1}"]);
    }
}
