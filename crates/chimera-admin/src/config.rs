//! Connection settings for the administration client.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default REST API port of the daemon
pub const DEFAULT_PORT: u16 = 8080;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// URL scheme used to reach the REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// Where and how to reach the daemon's REST API.
///
/// A client copies its configuration at construction time; changing a
/// `ConnectionConfig` afterwards never affects an existing client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Hostname or IP address of the daemon
    pub host: String,
    /// REST API port
    pub port: u16,
    /// Upper bound for a single request, connect included
    pub timeout: Duration,
    /// Reject invalid or self-signed certificates when using HTTPS
    pub verify_tls: bool,
    /// Plain HTTP or HTTPS
    pub scheme: Scheme,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_tls_verification(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Switch to HTTPS
    pub fn with_https(self) -> Self {
        self.with_scheme(Scheme::Https)
    }

    /// `scheme://host:port`, the address every request path is joined onto.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            verify_tls: true,
            scheme: Scheme::Http,
        }
    }
}
