//! Alias-tolerant lookups into loosely shaped webhook JSON.
//!
//! Teamwork mixes camelCase (`projectId`) and dashed (`project-id`) keys and
//! sends ids either as numbers or numeric strings. Every helper here tries the
//! given keys in order and returns `None` instead of failing.

use serde_json::Value;

/// First present, non-null value among `keys`.
pub fn field<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| !value.is_null())
}

/// First value among `keys` that is a JSON object.
pub fn object<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| value.is_object())
}

/// First value among `keys` that reads as an integer id.
pub fn int_field(obj: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find_map(as_int)
}

/// First non-empty string among `keys`. Numbers are rendered as text.
pub fn str_field(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Read a bare JSON value as an integer id.
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(float_to_int)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

// Whole floats only; anything outside the i64 range is not an id.
fn float_to_int(f: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    (f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primary_key_wins_over_alias() {
        let obj = json!({"projectId": 7, "project-id": 9});
        assert_eq!(int_field(&obj, &["projectId", "project-id"]), Some(7));
    }

    #[test]
    fn alias_used_when_primary_missing_or_null() {
        let obj = json!({"projectId": null, "project-id": "42"});
        assert_eq!(int_field(&obj, &["projectId", "project-id"]), Some(42));

        let obj = json!({"raw-body": "hola"});
        assert_eq!(
            str_field(&obj, &["body", "raw-body"]).as_deref(),
            Some("hola")
        );
    }

    #[test]
    fn missing_everywhere_is_none() {
        let obj = json!({"other": 1});
        assert_eq!(int_field(&obj, &["id"]), None);
        assert_eq!(str_field(&obj, &["body"]), None);
        assert!(field(&obj, &["body"]).is_none());
    }

    #[test]
    fn non_numeric_ids_fall_through() {
        let obj = json!({"id": "abc", "postId": 5});
        assert_eq!(int_field(&obj, &["id", "postId"]), Some(5));
    }

    #[test]
    fn whole_floats_in_range_are_ids() {
        assert_eq!(as_int(&json!(42.0)), Some(42));
        assert_eq!(as_int(&json!(-7.0)), Some(-7));
        assert_eq!(as_int(&json!(4.5)), None);
    }

    #[test]
    fn out_of_range_floats_are_not_ids() {
        assert_eq!(as_int(&json!(1e19)), None);
        assert_eq!(as_int(&json!(-1e19)), None);
        assert_eq!(as_int(&json!(9_223_372_036_854_775_808.0)), None);
    }

    #[test]
    fn empty_strings_are_skipped() {
        let obj = json!({"body": "  ", "raw-body": "texto"});
        assert_eq!(
            str_field(&obj, &["body", "raw-body"]).as_deref(),
            Some("texto")
        );
    }

    #[test]
    fn object_skips_scalars() {
        let obj = json!({"task": 3, "file": {"id": 1}});
        assert!(object(&obj, &["task", "file"]).is_some_and(|v| v["id"] == 1));
    }
}
