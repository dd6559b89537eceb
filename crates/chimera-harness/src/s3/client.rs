use chrono::Utc;
use log::debug;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderName, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, DATE, ETAG};
use reqwest::{Method, Url};
use std::time::Duration;

use super::error::{S3Error, S3Result};
use super::list::{parse_list_objects, ListObjectsOutput};
use super::signing::{
    canonical_query, encode_path, sha256_hex, sign_v2, sign_v4, string_to_sign_v2,
    CanonicalRequest, Credentials, SignatureVersion, AMZ_DATE_FORMAT, HTTP_DATE_FORMAT,
};

pub const DEFAULT_REGION: &str = "us-east-1";

/// Generous enough for a multi-megabyte body on a debug build
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Path-style S3 endpoint plus credentials.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// e.g. `http://127.0.0.1:5000`
    pub endpoint: String,
    pub credentials: Credentials,
    pub region: String,
    pub signature: SignatureVersion,
    pub timeout: Duration,
}

impl S3Config {
    pub fn new(endpoint: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials,
            region: DEFAULT_REGION.to_string(),
            signature: SignatureVersion::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_signature(mut self, signature: SignatureVersion) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_length: u64,
    pub etag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GetObjectOutput {
    pub body: Vec<u8>,
    pub content_range: Option<String>,
}

/// Blocking S3 client for the object operations the scenarios use.
pub struct S3Client {
    config: S3Config,
    base: String,
    host: String,
    http: Client,
}

impl S3Client {
    pub fn new(config: S3Config) -> S3Result<Self> {
        let url = Url::parse(&config.endpoint)
            .map_err(|e| S3Error::Endpoint(format!("{}: {}", config.endpoint, e)))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(S3Error::Endpoint(format!("{}: no host", config.endpoint))),
        };
        let base = config.endpoint.trim_end_matches('/').to_string();
        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            config,
            base,
            host,
            http,
        })
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    pub fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> S3Result<()> {
        debug!("PUT {}/{} ({} bytes)", bucket, key, body.len());
        self.send(Method::PUT, bucket, Some(key), &[], Vec::new(), body)?;
        Ok(())
    }

    /// Whole object, or the inclusive byte range `first..=last`.
    pub fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<(u64, u64)>,
    ) -> S3Result<GetObjectOutput> {
        let headers = match range {
            Some((first, last)) => vec![("range", format!("bytes={}-{}", first, last))],
            None => Vec::new(),
        };
        let response = self.send(Method::GET, bucket, Some(key), &[], headers, Vec::new())?;
        let content_range = header_string(&response, CONTENT_RANGE);
        let body = response.bytes()?.to_vec();
        debug!("GET {}/{} -> {} bytes", bucket, key, body.len());

        Ok(GetObjectOutput {
            body,
            content_range,
        })
    }

    pub fn head_object(&self, bucket: &str, key: &str) -> S3Result<ObjectMeta> {
        let response = self.send(Method::HEAD, bucket, Some(key), &[], Vec::new(), Vec::new())?;
        let content_length = header_string(&response, CONTENT_LENGTH)
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| S3Error::Xml("HEAD response without Content-Length".to_string()))?;

        Ok(ObjectMeta {
            content_length,
            etag: header_string(&response, ETAG),
        })
    }

    pub fn delete_object(&self, bucket: &str, key: &str) -> S3Result<()> {
        debug!("DELETE {}/{}", bucket, key);
        self.send(Method::DELETE, bucket, Some(key), &[], Vec::new(), Vec::new())?;
        Ok(())
    }

    pub fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> S3Result<ListObjectsOutput> {
        let mut query = vec![("list-type", "2")];
        if let Some(prefix) = prefix {
            query.push(("prefix", prefix));
        }
        if let Some(delimiter) = delimiter {
            query.push(("delimiter", delimiter));
        }

        let response = self.send(Method::GET, bucket, None, &query, Vec::new(), Vec::new())?;
        let body = response.text()?;
        parse_list_objects(&body)
    }

    /// Sign and send one request; any non-2xx status becomes `S3Error::Status`.
    fn send(
        &self,
        method: Method,
        bucket: &str,
        key: Option<&str>,
        query: &[(&str, &str)],
        headers: Vec<(&str, String)>,
        body: Vec<u8>,
    ) -> S3Result<Response> {
        let raw_path = match key {
            Some(key) => format!("/{}/{}", bucket, key),
            None => format!("/{}", bucket),
        };
        let path = encode_path(&raw_path);
        let query = canonical_query(query);
        let url = if query.is_empty() {
            format!("{}{}", self.base, path)
        } else {
            format!("{}{}?{}", self.base, path, query)
        };

        let now = Utc::now();
        let mut request = self.http.request(method.clone(), &url);

        match self.config.signature {
            SignatureVersion::V4 => {
                let payload_hash = sha256_hex(&body);
                let amz_date = now.format(AMZ_DATE_FORMAT).to_string();
                let mut signed: Vec<(String, String)> = headers
                    .into_iter()
                    .map(|(name, value)| (name.to_ascii_lowercase(), value))
                    .collect();
                signed.push(("host".to_string(), self.host.clone()));
                signed.push(("x-amz-content-sha256".to_string(), payload_hash.clone()));
                signed.push(("x-amz-date".to_string(), amz_date.clone()));
                signed.sort();

                let canonical = CanonicalRequest {
                    method: method.as_str(),
                    path: &path,
                    query: &query,
                    headers: &signed,
                    payload_hash: &payload_hash,
                };
                let authorization = sign_v4(
                    &self.config.credentials,
                    &self.config.region,
                    &canonical,
                    &amz_date,
                )?;

                for (name, value) in signed.iter().filter(|(name, _)| name != "host") {
                    request = request.header(name.as_str(), value.as_str());
                }
                request = request.header(AUTHORIZATION, authorization);
            }
            SignatureVersion::V2 => {
                let date = now.format(HTTP_DATE_FORMAT).to_string();
                // Bucket-level resources are signed with a trailing slash
                let resource = if key.is_some() {
                    path.clone()
                } else {
                    format!("{}/", path)
                };
                let string_to_sign =
                    string_to_sign_v2(method.as_str(), "", "", &date, &[], &resource);
                let authorization = sign_v2(&self.config.credentials, &string_to_sign)?;

                for (name, value) in headers {
                    request = request.header(name, value);
                }
                request = request.header(DATE, date).header(AUTHORIZATION, authorization);
            }
        }

        if !body.is_empty() || method == Method::PUT {
            request = request.body(body);
        }

        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let text = response.text().unwrap_or_default();
            debug!("{} {} failed with {}: {}", method, url, status, text);
            Err(S3Error::from_response(status, &text))
        }
    }
}

fn header_string(response: &Response, name: HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
