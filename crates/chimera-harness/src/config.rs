//! The JSON document handed to the daemon with `-c`.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::HarnessResult;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DaemonConfig {
    pub server: ServerSection,
    pub mounts: BTreeMap<String, MountEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub s3_access_keys: Vec<AccessKey>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub buckets: BTreeMap<String, BucketEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerSection {
    pub threads: u32,
    pub delegation_threads: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_http_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_https_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_ssl_cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_ssl_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_port: Option<u16>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub vfs: BTreeMap<String, VfsModule>,
}

/// Per-module VFS settings. `path` is always written, as `null` when unset.
#[derive(Debug, Clone, Serialize)]
pub struct VfsModule {
    pub path: Option<String>,
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountEntry {
    pub module: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessKey {
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketEntry {
    pub path: String,
}

impl DaemonConfig {
    pub fn new(threads: u32, delegation_threads: u32) -> Self {
        Self {
            server: ServerSection {
                threads,
                delegation_threads,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn add_mount(
        &mut self,
        name: impl Into<String>,
        module: impl Into<String>,
        path: impl Into<String>,
    ) {
        self.mounts.insert(
            name.into(),
            MountEntry {
                module: module.into(),
                path: path.into(),
            },
        );
    }

    pub fn add_vfs_module(&mut self, module: impl Into<String>, config: Value) {
        self.server
            .vfs
            .insert(module.into(), VfsModule { path: None, config });
    }

    pub fn to_json(&self) -> HarnessResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the document to `path`, replacing any existing file.
    pub fn write_to(&self, path: &Path) -> HarnessResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}
