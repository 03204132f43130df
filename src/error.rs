//! Error types for stores and the API transport.

use serde_json::Value;

/// Everything a store operation can fail with.
///
/// `Clone` because coalesced callers all receive the same failure.
/// A cache miss is not an error and never shows up here.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("request failed{}: {message}", fmt_status(.status))]
    Network { status: Option<u16>, message: String },
    #[error("{0}")]
    Api(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("request was cancelled")]
    Cancelled,
    #[error("an update for {0} is already in progress")]
    Busy(String),
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },
    #[error("cannot {action} a report that is {from}")]
    InvalidTransition { from: String, action: &'static str },
    #[error("failed to persist state: {0}")]
    Persist(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl StoreError {
    pub fn network(message: impl Into<String>) -> Self {
        StoreError::Network {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StoreError::Cancelled)
    }

    /// Text suitable for an inline banner or toast.
    pub fn user_message(&self) -> String {
        match self {
            StoreError::Network { message, .. } | StoreError::Api(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest_middleware::Error> for StoreError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => e.into(),
            reqwest_middleware::Error::Middleware(e) => StoreError::network(format!("{e:#}")),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_owned()
        } else if err.is_connect() {
            "could not reach the server".to_owned()
        } else {
            err.to_string()
        };
        StoreError::Network {
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }
}

/// Pull a human-readable message out of an error response body.
///
/// Understands both envelope families (`error` and `message` fields) and
/// falls back to a short description of the status code.
pub fn extract_message(body: &str, status: u16) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => {
            let message = ["error", "message"]
                .iter()
                .filter_map(|field| json.get(field).and_then(Value::as_str))
                .find(|m| !m.trim().is_empty());
            if let Some(message) = message {
                return message.to_owned();
            }
        }
        Err(_) => {
            let trimmed = body.trim();
            if !trimmed.is_empty() && trimmed.len() <= 200 && !trimmed.starts_with('<') {
                return trimmed.to_owned();
            }
        }
    }
    match status {
        401 => "not signed in".to_owned(),
        403 => "not allowed".to_owned(),
        404 => "not found".to_owned(),
        408 | 504 => "request timed out".to_owned(),
        422 => "validation failed".to_owned(),
        500..=599 => "server error".to_owned(),
        _ => format!("unexpected status {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_error_field() {
        assert_eq!(extract_message(r#"{"error":"Tour not found"}"#, 404), "Tour not found");
    }

    #[test]
    fn extracts_message_field() {
        let body = r#"{"success":false,"message":"Employee already suspended"}"#;
        assert_eq!(extract_message(body, 409), "Employee already suspended");
    }

    #[test]
    fn falls_back_to_short_plain_body() {
        assert_eq!(extract_message("Bad Gateway", 502), "Bad Gateway");
    }

    #[test]
    fn falls_back_to_status_for_html_or_empty() {
        assert_eq!(extract_message("<html>oops</html>", 500), "server error");
        assert_eq!(extract_message("", 403), "not allowed");
        assert_eq!(extract_message(r#"{"error":""}"#, 418), "unexpected status 418");
    }

    #[test]
    fn display_includes_status() {
        let err = StoreError::Network {
            status: Some(503),
            message: "server error".to_owned(),
        };
        assert_eq!(err.to_string(), "request failed (503): server error");
        assert_eq!(err.user_message(), "server error");
        assert_eq!(StoreError::network("down").to_string(), "request failed: down");
    }
}
