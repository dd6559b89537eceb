use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while supervising a daemon instance
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write daemon configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Could not find chimera binary. Searched: {}", format_paths(.searched))]
    BinaryNotFound { searched: Vec<PathBuf> },

    #[error(
        "REST API did not become available within {timeout:?} ({endpoint}).\nstdout: {stdout}\nstderr: {stderr}"
    )]
    StartupTimeout {
        timeout: Duration,
        endpoint: String,
        stdout: String,
        stderr: String,
    },

    #[error("Daemon exited during startup with {status}.\nstdout: {stdout}\nstderr: {stderr}")]
    ExitedEarly {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to signal daemon process: {0}")]
    Signal(#[from] nix::Error),

    #[error("Server is {0}, expected it to be not started")]
    InvalidState(crate::server::ServerState),

    #[error("Admin client error: {0}")]
    Admin(#[from] chimera_admin::AdminError),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_not_found_lists_every_candidate() {
        let err = HarnessError::BinaryNotFound {
            searched: vec![
                PathBuf::from("/build/Debug/src/daemon/chimera"),
                PathBuf::from("/build/Release/src/daemon/chimera"),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("/build/Debug/src/daemon/chimera"));
        assert!(message.contains("/build/Release/src/daemon/chimera"));
    }

    #[test]
    fn test_startup_timeout_includes_output() {
        let err = HarnessError::StartupTimeout {
            timeout: Duration::from_secs(30),
            endpoint: "http://127.0.0.1:18080/version".to_string(),
            stdout: "booting".to_string(),
            stderr: "bind failed".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("stdout: booting"));
        assert!(message.contains("stderr: bind failed"));
    }
}
