use serde_json::Value;
use thiserror::Error;

/// Uniform error shape for everything that crosses the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("{message} (HTTP {status})")]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Rejected(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 4xx answers are final; everything else may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Http { status, .. } => !(400..500).contains(status),
            ApiError::Network(_) | ApiError::Timeout => true,
            _ => false,
        }
    }

    /// Builds an `Http` error from a status and whatever body the backend sent.
    pub fn from_response_body(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let (message, code) = match parsed {
            Some(json) => (extract_message(&json), extract_code(&json)),
            None => (None, None),
        };
        let message = message.unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() || trimmed.len() > 200 {
                default_message(status).to_string()
            } else {
                trimmed.to_string()
            }
        });
        ApiError::Http {
            status,
            code,
            message,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::Http {
                status: status.as_u16(),
                code: None,
                message: e.to_string(),
            }
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

impl From<url::ParseError> for ApiError {
    fn from(e: url::ParseError) -> Self {
        ApiError::InvalidUrl(e.to_string())
    }
}

fn extract_message(json: &Value) -> Option<String> {
    match json.get("detail") {
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Array(items)) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(|item| {
                    let msg = item.get("msg").and_then(|v| v.as_str())?;
                    let loc = item
                        .get("loc")
                        .and_then(|v| v.as_array())
                        .and_then(|l| l.last())
                        .and_then(|v| v.as_str());
                    Some(match loc {
                        Some(field) => format!("{field}: {msg}"),
                        None => msg.to_string(),
                    })
                })
                .collect();
            if !msgs.is_empty() {
                return Some(msgs.join("; "));
            }
        }
        Some(Value::Object(obj)) => {
            if let Some(s) = obj.get("message").and_then(|v| v.as_str()) {
                return Some(s.to_string());
            }
        }
        _ => {}
    }
    json.get("message")
        .or_else(|| json.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn extract_code(json: &Value) -> Option<String> {
    json.get("code")
        .or_else(|| json.get("error_code"))
        .or_else(|| json.get("detail").and_then(|d| d.get("code")))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn default_message(status: u16) -> &'static str {
    match status {
        400 => "Bad request",
        401 => "Not authenticated",
        403 => "Not allowed",
        404 => "Not found",
        409 => "Conflict",
        422 => "Invalid data",
        500..=599 => "Server error",
        _ => "Request failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_plain_detail() {
        let err = ApiError::from_response_body(404, r#"{"detail":"Batch not found"}"#);
        match err {
            ApiError::Http { status, message, code } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Batch not found");
                assert!(code.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn normalizes_validation_detail_list() {
        let body = r#"{"detail":[{"loc":["body","account_id"],"msg":"field required"}]}"#;
        let err = ApiError::from_response_body(422, body);
        assert_eq!(err.to_string(), "account_id: field required (HTTP 422)");
    }

    #[test]
    fn keeps_message_and_code() {
        let body = r#"{"message":"Insufficient credits","code":"NO_CREDITS"}"#;
        match ApiError::from_response_body(402, body) {
            ApiError::Http { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("NO_CREDITS"));
                assert_eq!(message, "Insufficient credits");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_status_text() {
        let err = ApiError::from_response_body(503, "");
        assert_eq!(err.to_string(), "Server error (HTTP 503)");
        assert!(err.is_retryable());
        assert!(!ApiError::from_response_body(400, "nope").is_retryable());
    }
}
