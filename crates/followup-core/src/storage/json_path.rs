//! Dot-path access into serde-serializable settings.
//!
//! Shared by the TOML config and the per-user preference rows so that
//! `get`/`set` by key behave the same for both.

use crate::error::ConfigError;

pub(crate) fn get_by_path<'a>(root: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    if key.is_empty() {
        return None;
    }

    let mut current = root;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Render a value for display: strings bare, everything else as JSON.
pub(crate) fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Overwrite an existing leaf, parsing `value` according to the type of the
/// value already there. Unknown keys are rejected.
pub(crate) fn set_by_path(root: &mut serde_json::Value, key: &str, value: &str) -> Result<(), ConfigError> {
    let unknown = || ConfigError::UnknownKey(key.to_string());
    let invalid = |message: String| ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    };

    let mut parts = key.split('.').peekable();
    if key.is_empty() {
        return Err(unknown());
    }

    let mut current = root;
    while let Some(part) = parts.next() {
        if parts.peek().is_some() {
            current = current.get_mut(part).ok_or_else(unknown)?;
            continue;
        }

        let obj = current.as_object_mut().ok_or_else(unknown)?;
        let existing = obj.get(part).ok_or_else(unknown)?;

        let new_value = match existing {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                value
                    .parse::<bool>()
                    .map_err(|e| invalid(e.to_string()))?,
            ),
            serde_json::Value::Number(_) => {
                if let Ok(n) = value.parse::<i64>() {
                    serde_json::Value::Number(n.into())
                } else if let Ok(n) = value.parse::<f64>() {
                    serde_json::Number::from_f64(n)
                        .map(serde_json::Value::Number)
                        .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                } else {
                    return Err(invalid(format!("cannot parse '{value}' as number")));
                }
            }
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
            }
            // Optional fields are stored as null; accept JSON first, then a bare string.
            serde_json::Value::Null => match value {
                "null" | "" => serde_json::Value::Null,
                _ => serde_json::from_str(value)
                    .unwrap_or_else(|_| serde_json::Value::String(value.to_string())),
            },
            serde_json::Value::String(_) => serde_json::Value::String(value.to_string()),
        };

        obj.insert(part.to_string(), new_value);
        return Ok(());
    }

    Err(unknown())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sets_nested_values_by_type() {
        let mut v = json!({"a": {"flag": true, "n": 3, "s": "x", "opt": null, "list": []}});
        set_by_path(&mut v, "a.flag", "false").unwrap();
        set_by_path(&mut v, "a.n", "42").unwrap();
        set_by_path(&mut v, "a.s", "hello").unwrap();
        set_by_path(&mut v, "a.opt", "22:00:00").unwrap();
        set_by_path(&mut v, "a.list", r#"["Mon","Tue"]"#).unwrap();
        assert_eq!(v, json!({"a": {"flag": false, "n": 42, "s": "hello", "opt": "22:00:00", "list": ["Mon", "Tue"]}}));
    }

    #[test]
    fn rejects_unknown_and_mistyped() {
        let mut v = json!({"a": {"flag": true}});
        assert!(matches!(set_by_path(&mut v, "a.nope", "1"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(set_by_path(&mut v, "", "1"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(
            set_by_path(&mut v, "a.flag", "maybe"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn get_and_display() {
        let v = json!({"a": {"s": "x", "n": 2}});
        assert_eq!(display_value(get_by_path(&v, "a.s").unwrap()), "x");
        assert_eq!(display_value(get_by_path(&v, "a.n").unwrap()), "2");
        assert!(get_by_path(&v, "a.missing").is_none());
    }
}
