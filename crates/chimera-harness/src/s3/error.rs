use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum S3Error {
    #[error("S3 transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("S3 request failed with status {status}: {code} {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Malformed S3 response: {0}")]
    Xml(String),

    #[error("Invalid S3 endpoint: {0}")]
    Endpoint(String),

    #[error("Request signing failed: {0}")]
    Signing(String),
}

pub type S3Result<T> = Result<T, S3Error>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl S3Error {
    /// Build a status error from a non-2xx response and its (possibly empty) XML body.
    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: ErrorBody = quick_xml::de::from_str(body).unwrap_or_default();
        let code = parsed
            .code
            .unwrap_or_else(|| status.as_u16().to_string());
        let message = parsed
            .message
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_default();

        S3Error::Status {
            status: status.as_u16(),
            code,
            message,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            S3Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            S3Error::Status { status, code, .. } => {
                *status == 404 || code == "NoSuchKey" || code == "NotFound"
            }
            _ => false,
        }
    }
}
