use crate::calc::CalcError;
use serde::Serialize;
use serde_json::json;

/// The `error` object of a failed response.
#[derive(Debug, Serialize)]
pub struct HandlerErr {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn into_response(self, id: &str) -> serde_json::Value {
        json!({ "id": id, "ok": false, "error": self })
    }
}

impl From<CalcError> for HandlerErr {
    fn from(e: CalcError) -> Self {
        Self {
            code: e.code,
            message: e.message,
            details: e.details,
        }
    }
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(result) => json!({ "id": id, "ok": true, "result": result }),
        Err(e) => e.into_response(id),
    }
}
