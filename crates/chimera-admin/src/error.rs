use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the administration client.
///
/// Only `Http` carries a status code; every other variant is a transport or
/// decoding failure that never reached a complete HTTP response.
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Invalid JSON response: {0}")]
    Decode(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl AdminError {
    /// Numeric HTTP status, when the daemon answered with a non-success code.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AdminError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the daemon reported the resource as absent (404).
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(StatusCode::NOT_FOUND.as_u16())
    }

    /// Build an `Http` error from a failed response.
    ///
    /// The daemon answers errors with `{"error": ..., "message": ...}`; the
    /// most specific of those is used, falling back to the raw body and
    /// finally to the canonical reason phrase.
    pub(crate) fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                value
                    .get("message")
                    .or_else(|| value.get("error"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string());

        AdminError::Http {
            status: status.as_u16(),
            message: detail,
        }
    }
}

impl From<reqwest::Error> for AdminError {
    fn from(err: reqwest::Error) -> Self {
        let message = describe(&err);

        if err.is_timeout() {
            AdminError::Timeout(message)
        } else if err.is_connect() {
            AdminError::ConnectionFailed(message)
        } else if err.is_decode() {
            AdminError::Decode(message)
        } else if let Some(status) = err.status() {
            AdminError::Http {
                status: status.as_u16(),
                message,
            }
        } else {
            AdminError::Request(message)
        }
    }
}

/// Flatten an error and its sources into one line.
fn describe(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Result type for administration client operations
pub type AdminResult<T> = Result<T, AdminError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_only_for_http_errors() {
        let http = AdminError::Http {
            status: 404,
            message: "Not Found".to_string(),
        };
        assert_eq!(http.status_code(), Some(404));
        assert!(http.is_not_found());

        assert_eq!(AdminError::ConnectionFailed("refused".into()).status_code(), None);
        assert_eq!(AdminError::Timeout("slow".into()).status_code(), None);
        assert_eq!(AdminError::Decode("garbage".into()).status_code(), None);
    }

    #[test]
    fn test_from_status_prefers_daemon_message() {
        let err = AdminError::from_status(
            StatusCode::NOT_FOUND,
            r#"{"error":"Not Found","message":"User does not exist"}"#,
        );
        match err {
            AdminError::Http { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "User does not exist");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_status_falls_back_to_error_field_then_reason() {
        let err = AdminError::from_status(
            StatusCode::METHOD_NOT_ALLOWED,
            r#"{"error":"Method Not Allowed"}"#,
        );
        assert_eq!(err.to_string(), "HTTP error 405: Method Not Allowed");

        let err = AdminError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(err.to_string(), "HTTP error 500: Internal Server Error");

        let err = AdminError::from_status(StatusCode::BAD_GATEWAY, "upstream went away\n");
        assert_eq!(err.to_string(), "HTTP error 502: upstream went away");
    }
}
