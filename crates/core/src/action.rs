use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Fixed failure taxonomy returned past the dispatcher boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    UnknownOperation,
    InvalidArguments,
    Forbidden,
    NotWritable,
    RateLimited,
    PermissionDenied,
    StaleReference,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::UnknownOperation => "unknown_operation",
            ErrorKind::InvalidArguments => "invalid_arguments",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotWritable => "not_writable",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::StaleReference => "stale_reference",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure raised inside an operation; converted to an [`ActionResult`] by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArguments, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_writable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotWritable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            message: message.into(),
            retry_after,
        }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ActionError {}

impl From<crate::Error> for ActionError {
    fn from(e: crate::Error) -> Self {
        match e {
            crate::Error::NotFound(m) => ActionError::not_found(m),
            crate::Error::Validation(m) => ActionError::invalid(m),
            other => ActionError::internal(other.to_string()),
        }
    }
}

/// Outcome of exactly one dispatched operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub payload: Map<String, Value>,
    pub error_kind: Option<ErrorKind>,
    pub retry_after: Option<Duration>,
}

impl ActionResult {
    pub fn ok(payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Self {
            success: true,
            payload,
            error_kind: None,
            retry_after: None,
        }
    }

    pub fn failure(error: ActionError) -> Self {
        let mut payload = Map::new();
        payload.insert("error".to_string(), Value::String(error.message));
        if let Some(wait) = error.retry_after {
            payload.insert("retry_after_secs".to_string(), Value::from(wait.as_secs()));
        }
        Self {
            success: false,
            payload,
            error_kind: Some(error.kind),
            retry_after: error.retry_after,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.error_kind == Some(ErrorKind::RateLimited)
    }

    /// Flat JSON object fed back to the model as the tool result. The status keys always win
    /// over payload keys of the same name.
    pub fn to_value(&self) -> Value {
        let mut out = self.payload.clone();
        out.insert("success".to_string(), Value::Bool(self.success));
        match self.error_kind {
            Some(kind) => {
                out.insert("error_kind".to_string(), Value::String(kind.as_str().to_string()));
            }
            None => {
                out.remove("error_kind");
            }
        }
        Value::Object(out)
    }
}

impl From<Result<Value, ActionError>> for ActionResult {
    fn from(r: Result<Value, ActionError>) -> Self {
        match r {
            Ok(v) => ActionResult::ok(v),
            Err(e) => ActionResult::failure(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_result_flattens_payload() {
        let r = ActionResult::ok(json!({"group_id": 555, "already_member": true}));
        let v = r.to_value();
        assert_eq!(v["success"], true);
        assert_eq!(v["group_id"], 555);
        assert!(v.get("error_kind").is_none());
    }

    #[test]
    fn test_payload_cannot_override_status() {
        let v = ActionResult::ok(json!({"success": false, "error_kind": "forbidden", "n": 1})).to_value();
        assert_eq!(v["success"], true);
        assert!(v.get("error_kind").is_none());
        assert_eq!(v["n"], 1);

        let mut r = ActionResult::failure(ActionError::invalid("bad"));
        r.payload.insert("success".to_string(), json!(true));
        let v = r.to_value();
        assert_eq!(v["success"], false);
        assert_eq!(v["error_kind"], "invalid_arguments");
    }

    #[test]
    fn test_failure_carries_kind_and_retry() {
        let r = ActionResult::failure(ActionError::rate_limited(
            "slow down",
            Some(Duration::from_secs(12)),
        ));
        assert!(!r.success);
        assert!(r.is_rate_limited());
        let v = r.to_value();
        assert_eq!(v["error_kind"], "rate_limited");
        assert_eq!(v["retry_after_secs"], 12);
        assert_eq!(v["error"], "slow down");
    }

    #[test]
    fn test_core_error_maps_to_kind() {
        let e: ActionError = crate::Error::Storage("disk".to_string()).into();
        assert_eq!(e.kind, ErrorKind::InternalError);
        let e: ActionError = crate::Error::NotFound("x".to_string()).into();
        assert_eq!(e.kind, ErrorKind::NotFound);
    }
}
