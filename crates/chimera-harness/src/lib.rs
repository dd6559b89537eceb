//! Test harness for the Chimera daemon.
//!
//! [`ServerBuilder`] boots a daemon with a generated configuration and
//! tears it down again; [`scenario`] drives the object-storage battery
//! against one.

pub mod backend;
pub mod binary;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod readiness;
pub mod s3;
pub mod scenario;
pub mod server;

pub use backend::Backend;
pub use config::DaemonConfig;
pub use error::{HarnessError, HarnessResult};
pub use scenario::{run_scenarios, ScenarioError, ScenarioOptions, ScenarioResult, ScenarioTest};
pub use server::{ChimeraServer, S3Settings, ServerBuilder, ServerState};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
