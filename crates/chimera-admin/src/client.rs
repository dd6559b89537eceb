//! HTTP transport for the Chimera REST API.

use log::debug;
use reqwest::blocking::{Client, Response};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ConnectionConfig;
use crate::error::{AdminError, AdminResult};
use crate::resource::{Buckets, Exports, ResourceClient, Shares, Users};

/// Response of `GET /version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
}

/// Blocking client for the daemon's administration API.
///
/// Holds a pooled HTTP client; calls never retry and every failure is
/// returned as an [`AdminError`]. No internal locking is done, so sharing
/// one instance between threads is up to the caller.
pub struct AdminClient {
    config: ConnectionConfig,
    base_url: Url,
    http: Client,
}

impl AdminClient {
    pub fn new(config: ConnectionConfig) -> AdminResult<Self> {
        let base_url = Url::parse(&config.base_url()).map_err(|e| {
            AdminError::Request(format!("Invalid base address {}: {}", config.base_url(), e))
        })?;

        let http = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;

        debug!(
            "AdminClient::new: base_url={}, timeout={:?}, verify_tls={}",
            base_url, config.timeout, config.verify_tls
        );

        Ok(Self {
            config,
            base_url,
            http,
        })
    }

    /// Client for `http://host:port` with default settings.
    pub fn connect(host: impl Into<String>, port: u16) -> AdminResult<Self> {
        Self::new(ConnectionConfig::new(host, port))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Issue a request and decode the JSON response body.
    pub fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> AdminResult<T> {
        let response = self.send(method, path, body)?;
        let bytes = response.bytes()?;
        serde_json::from_slice(&bytes).map_err(|e| AdminError::Decode(e.to_string()))
    }

    /// Issue a request whose success carries no body (e.g. 204 on delete).
    pub fn request_no_content(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> AdminResult<()> {
        let response = self.send(method, path, body)?;
        // Drain so the pooled connection can be reused
        response.bytes()?;
        Ok(())
    }

    fn send(&self, method: Method, path: &str, body: Option<&Value>) -> AdminResult<Response> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| AdminError::Request(format!("Invalid path {}: {}", path, e)))?;

        debug!("AdminClient: {} {}", method, url);

        let mut builder = self.http.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send()?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            debug!("AdminClient: {} {} -> {}", status.as_u16(), path, text.trim());
            return Err(AdminError::from_status(status, &text));
        }

        Ok(response)
    }

    pub fn get_version(&self) -> AdminResult<VersionInfo> {
        self.request(Method::GET, "/version", None)
    }

    /// The daemon's OpenAPI document.
    pub fn get_openapi(&self) -> AdminResult<Value> {
        self.request(Method::GET, "/api/openapi.json", None)
    }

    /// Builtin users
    pub fn users(&self) -> ResourceClient<'_, Users> {
        ResourceClient::new(self)
    }

    /// NFS exports
    pub fn exports(&self) -> ResourceClient<'_, Exports> {
        ResourceClient::new(self)
    }

    /// SMB shares
    pub fn shares(&self) -> ResourceClient<'_, Shares> {
        ResourceClient::new(self)
    }

    /// S3 buckets
    pub fn buckets(&self) -> ResourceClient<'_, Buckets> {
        ResourceClient::new(self)
    }
}
