//! Storage modules a mount can be backed by, and what each needs on disk.

use clap::ValueEnum;
use log::debug;
use serde_json::json;
use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;

use crate::config::DaemonConfig;
use crate::error::HarnessResult;

/// Number of backing device files created for demofs
pub const DEMOFS_DEVICES: usize = 10;

/// Size of each demofs device file, in GiB
pub const DEMOFS_DEVICE_GIB: u64 = 1;

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Backend {
    /// In-memory filesystem
    Memfs,
    /// Native filesystem passthrough
    Linux,
    /// Native filesystem passthrough over io_uring
    #[value(name = "io_uring")]
    IoUring,
    /// Block-device engine over preallocated device files
    Demofs,
    /// Key-value engine initialised in the working directory
    Cairn,
}

impl Backend {
    /// VFS module name understood by the daemon.
    pub fn module(self) -> &'static str {
        match self {
            Backend::Memfs => "memfs",
            Backend::Linux => "linux",
            Backend::IoUring => "io_uring",
            Backend::Demofs => "demofs",
            Backend::Cairn => "cairn",
        }
    }

    /// Whether the working directory must live on a filesystem with file handle support.
    pub fn needs_handle_fs(self) -> bool {
        !matches!(self, Backend::Memfs)
    }

    /// Add a mount named `mount` backed by this module, preparing any files it needs in `work_dir`.
    pub fn configure(
        self,
        config: &mut DaemonConfig,
        mount: &str,
        work_dir: &Path,
    ) -> HarnessResult<()> {
        let work_path = work_dir.display().to_string();

        match self {
            Backend::Memfs => {
                config.add_mount(mount, self.module(), "/");
            }
            Backend::Linux | Backend::IoUring => {
                config.add_mount(mount, self.module(), work_path);
            }
            Backend::Demofs => {
                let mut devices = Vec::with_capacity(DEMOFS_DEVICES);
                for index in 0..DEMOFS_DEVICES {
                    let device = work_dir.join(format!("device-{}.img", index));
                    create_sparse_file(&device, DEMOFS_DEVICE_GIB * GIB)?;
                    devices.push(json!({
                        "type": "io_uring",
                        "size": DEMOFS_DEVICE_GIB,
                        "path": device.display().to_string(),
                    }));
                }
                config.add_vfs_module(self.module(), json!({ "devices": devices }));
                config.add_mount(mount, self.module(), "/");
            }
            Backend::Cairn => {
                config.add_vfs_module(
                    self.module(),
                    json!({ "initialize": true, "path": work_path }),
                );
                config.add_mount(mount, self.module(), "/");
            }
        }

        Ok(())
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.module())
    }
}

fn create_sparse_file(path: &Path, size: u64) -> HarnessResult<()> {
    debug!("Creating {} byte device file {}", size, path.display());
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.set_len(size)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_module_names_match_cli_values() {
        for backend in Backend::value_variants() {
            let value = backend.to_possible_value().unwrap();
            assert_eq!(value.get_name(), backend.module());
        }
    }

    #[test]
    fn test_memfs_mounts_root() {
        let dir = tempdir().unwrap();
        let mut config = DaemonConfig::new(2, 4);
        Backend::Memfs
            .configure(&mut config, "share", dir.path())
            .unwrap();

        assert_eq!(config.mounts["share"].module, "memfs");
        assert_eq!(config.mounts["share"].path, "/");
        assert!(config.server.vfs.is_empty());
        assert!(!Backend::Memfs.needs_handle_fs());
    }

    #[test]
    fn test_passthrough_mounts_work_dir() {
        let dir = tempdir().unwrap();
        for backend in [Backend::Linux, Backend::IoUring] {
            let mut config = DaemonConfig::new(2, 4);
            backend.configure(&mut config, "share", dir.path()).unwrap();
            assert_eq!(config.mounts["share"].path, dir.path().display().to_string());
            assert!(backend.needs_handle_fs());
        }
    }

    #[test]
    fn test_demofs_preallocates_sparse_devices() {
        let dir = tempdir().unwrap();
        let mut config = DaemonConfig::new(2, 4);
        Backend::Demofs
            .configure(&mut config, "share", dir.path())
            .unwrap();

        let devices = config.server.vfs["demofs"].config["devices"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(devices.len(), DEMOFS_DEVICES);
        assert_eq!(devices[0]["type"], "io_uring");
        assert_eq!(devices[0]["size"], 1);

        let last = dir.path().join("device-9.img");
        assert_eq!(devices[9]["path"], last.display().to_string());
        assert_eq!(std::fs::metadata(&last).unwrap().len(), GIB);
        assert!(config.server.vfs["demofs"].path.is_none());
    }

    #[test]
    fn test_cairn_initialises_in_work_dir() {
        let dir = tempdir().unwrap();
        let mut config = DaemonConfig::new(2, 4);
        Backend::Cairn
            .configure(&mut config, "share", dir.path())
            .unwrap();

        let cairn = &config.server.vfs["cairn"].config;
        assert_eq!(cairn["initialize"], true);
        assert_eq!(cairn["path"], dir.path().display().to_string());
        assert_eq!(config.mounts["share"].module, "cairn");
    }
}
