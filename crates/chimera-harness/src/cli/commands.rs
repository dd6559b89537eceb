use clap::Parser;
use std::path::PathBuf;

use crate::backend::Backend;
use crate::s3::SignatureVersion;

/// Chimera S3 test suite
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Test(s) to run: put, get, head, delete, list or all (repeatable)
    #[arg(long = "test", short = 't', value_name = "NAME")]
    pub tests: Vec<String>,

    /// VFS backend to test
    #[arg(long, short, value_enum, default_value_t = Backend::Memfs)]
    pub backend: Backend,

    /// AWS signature version to use
    #[arg(long, short, value_enum, default_value_t = SignatureVersion::V4)]
    pub sigver: SignatureVersion,

    /// Path to chimera daemon executable
    #[arg(long, short = 'c', value_name = "PATH")]
    pub chimera: Option<PathBuf>,

    /// Enable debug output from chimera
    #[arg(long, short)]
    pub debug: bool,

    /// Optional log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}
