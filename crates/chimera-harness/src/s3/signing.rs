//! Client-side AWS request signing, Signature Version 2 and 4.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::ValueEnum;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;

use super::error::{S3Error, S3Result};

const V4_ALGORITHM: &str = "AWS4-HMAC-SHA256";
const V4_TERMINATOR: &str = "aws4_request";
const SERVICE: &str = "s3";

/// `x-amz-date` timestamp format
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// `Date` header format used by Signature V2
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SignatureVersion {
    /// HMAC-SHA1 over a fixed header set
    V2,
    /// HMAC-SHA256 with a derived, scoped signing key
    #[default]
    V4,
}

impl fmt::Display for SignatureVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureVersion::V2 => write!(f, "v2"),
            SignatureVersion::V4 => write!(f, "v4"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

/// The parts of a request covered by a V4 signature.
///
/// `path` and `query` must already be in canonical (encoded, sorted) form
/// and must be exactly what goes on the wire. `headers` are lowercase and
/// sorted by name.
#[derive(Debug, Clone)]
pub struct CanonicalRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub headers: &'a [(String, String)],
    pub payload_hash: &'a str,
}

impl CanonicalRequest<'_> {
    pub fn signed_headers(&self) -> String {
        self.headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn to_canonical_string(&self) -> String {
        let mut canonical = format!("{}\n{}\n{}\n", self.method, self.path, self.query);
        for (name, value) in self.headers {
            canonical.push_str(name);
            canonical.push(':');
            canonical.push_str(value.trim());
            canonical.push('\n');
        }
        canonical.push('\n');
        canonical.push_str(&self.signed_headers());
        canonical.push('\n');
        canonical.push_str(self.payload_hash);
        canonical
    }
}

/// Value of the `Authorization` header for a V4-signed request.
///
/// `amz_date` must match the request's `x-amz-date` header.
pub fn sign_v4(
    credentials: &Credentials,
    region: &str,
    request: &CanonicalRequest<'_>,
    amz_date: &str,
) -> S3Result<String> {
    let date = amz_date.get(..8).ok_or_else(|| {
        S3Error::Signing(format!("Malformed x-amz-date '{}'", amz_date))
    })?;
    let scope = format!("{}/{}/{}/{}", date, region, SERVICE, V4_TERMINATOR);

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        V4_ALGORITHM,
        amz_date,
        scope,
        sha256_hex(request.to_canonical_string().as_bytes())
    );

    let key = signing_key_v4(&credentials.secret_key, date, region)?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        V4_ALGORITHM,
        credentials.access_key,
        scope,
        request.signed_headers(),
        signature
    ))
}

/// `kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), "s3"), "aws4_request")`
pub fn signing_key_v4(secret_key: &str, date: &str, region: &str) -> S3Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
    hmac_sha256(&k_service, V4_TERMINATOR.as_bytes())
}

/// V2 string to sign. `amz_headers` are lowercase, sorted `x-amz-*` pairs.
pub fn string_to_sign_v2(
    method: &str,
    content_md5: &str,
    content_type: &str,
    date: &str,
    amz_headers: &[(String, String)],
    resource: &str,
) -> String {
    let mut string_to_sign = format!("{}\n{}\n{}\n{}\n", method, content_md5, content_type, date);
    for (name, value) in amz_headers {
        string_to_sign.push_str(&format!("{}:{}\n", name, value.trim()));
    }
    string_to_sign.push_str(resource);
    string_to_sign
}

/// Value of the `Authorization` header for a V2-signed request.
pub fn sign_v2(credentials: &Credentials, string_to_sign: &str) -> S3Result<String> {
    let mut mac = HmacSha1::new_from_slice(credentials.secret_key.as_bytes())
        .map_err(|e| S3Error::Signing(e.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());
    Ok(format!("AWS {}:{}", credentials.access_key, signature))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> S3Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| S3Error::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Percent-encode each `/`-separated segment of a request path.
///
/// Only `A-Za-z0-9-_.~` pass through, which is the set AWS canonicalization expects.
pub fn encode_path(raw: &str) -> String {
    raw.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// Encoded `k=v` pairs sorted by key, joined with `&`.
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| {
            (
                urlencoding::encode(key).into_owned(),
                urlencoding::encode(value).into_owned(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}
