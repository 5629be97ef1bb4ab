//! Checks tool arguments against the JSON-schema subset the operations declare:
//! `required`, per-property `type` and string `enum`.

use hono_core::ActionError;
use serde_json::Value;

pub fn validate_args(schema: &Value, params: &Value) -> Result<(), ActionError> {
    let args = match params {
        Value::Object(map) => map,
        Value::Null => return check_required(schema, &serde_json::Map::new()),
        _ => return Err(ActionError::invalid("arguments must be a JSON object")),
    };
    check_required(schema, args)?;

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Ok(());
    };
    for (key, value) in args {
        if value.is_null() {
            continue;
        }
        let Some(spec) = properties.get(key) else {
            continue;
        };
        if let Some(expected) = spec.get("type").and_then(|t| t.as_str()) {
            if !type_matches(expected, value) {
                return Err(ActionError::invalid(format!("argument '{}' must be {}", key, expected)));
            }
        }
        if let (Some(allowed), Some(s)) = (spec.get("enum").and_then(|e| e.as_array()), value.as_str()) {
            if !allowed.iter().any(|a| a.as_str() == Some(s)) {
                return Err(ActionError::invalid(format!("argument '{}' has unsupported value '{}'", key, s)));
            }
        }
    }
    Ok(())
}

fn check_required(schema: &Value, args: &serde_json::Map<String, Value>) -> Result<(), ActionError> {
    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|k| k.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    let missing: Vec<&str> = required
        .into_iter()
        .filter(|key| match args.get(*key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ActionError::invalid(format!("missing required argument(s): {}", missing.join(", "))))
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        // Quoted integers are accepted; see `arg_i64`.
        "integer" => {
            value.is_i64()
                || value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
                || value.as_str().map(|s| s.trim().parse::<i64>().is_ok()).unwrap_or(false)
        }
        "number" => value.is_number() || value.as_str().map(|s| s.trim().parse::<f64>().is_ok()).unwrap_or(false),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hono_core::ErrorKind;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "group_link": {"type": "string"},
                "limit": {"type": "integer"},
                "category": {"type": "string", "enum": ["fact", "interest"]}
            },
            "required": ["group_link"]
        })
    }

    #[test]
    fn test_missing_required() {
        let err = validate_args(&schema(), &json!({})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArguments);
        assert!(err.message.contains("group_link"));
        assert!(validate_args(&schema(), &json!({"group_link": "  "})).is_err());
        assert!(validate_args(&schema(), &Value::Null).is_err());
    }

    #[test]
    fn test_types_and_enum() {
        assert!(validate_args(&schema(), &json!({"group_link": "x", "limit": 5})).is_ok());
        assert!(validate_args(&schema(), &json!({"group_link": "x", "limit": "5"})).is_ok());
        assert!(validate_args(&schema(), &json!({"group_link": "x", "limit": "five"})).is_err());
        assert!(validate_args(&schema(), &json!({"group_link": 5})).is_err());
        assert!(validate_args(&schema(), &json!({"group_link": "x", "category": "gossip"})).is_err());
        assert!(validate_args(&schema(), &json!({"group_link": "x", "category": "fact"})).is_ok());
    }

    #[test]
    fn test_unknown_properties_ignored() {
        assert!(validate_args(&schema(), &json!({"group_link": "x", "extra": [1]})).is_ok());
    }
}
