//! `ListObjectsV2` response decoding.

use serde::Deserialize;

use super::error::{S3Error, S3Result};

/// What a listing returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsOutput {
    /// `KeyCount` as reported, or the number of entries when absent
    pub key_count: usize,
    pub keys: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    key_count: Option<usize>,
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    contents: Vec<Contents>,
    #[serde(default)]
    common_prefixes: Vec<CommonPrefix>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Contents {
    key: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommonPrefix {
    prefix: String,
}

pub fn parse_list_objects(xml: &str) -> S3Result<ListObjectsOutput> {
    let result: ListBucketResult =
        quick_xml::de::from_str(xml).map_err(|e| S3Error::Xml(e.to_string()))?;

    let keys: Vec<ObjectSummary> = result
        .contents
        .into_iter()
        .map(|c| ObjectSummary {
            key: c.key,
            size: c.size,
        })
        .collect();
    let common_prefixes: Vec<String> = result
        .common_prefixes
        .into_iter()
        .map(|p| p.prefix)
        .collect();
    let key_count = result
        .key_count
        .unwrap_or(keys.len() + common_prefixes.len());

    Ok(ListObjectsOutput {
        key_count,
        keys,
        common_prefixes,
        is_truncated: result.is_truncated,
    })
}
