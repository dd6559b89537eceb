//! Polling the daemon's REST API until it answers.

use chimera_admin::{AdminClient, ConnectionConfig, Scheme};
use log::{debug, trace};
use reqwest::Method;
use std::process::ExitStatus;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::HarnessResult;

/// Delay between readiness probes
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Overall deadline for the daemon to become reachable
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout of a single probe request
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Endpoint that answers once the REST server is up
pub const READINESS_PATH: &str = "/version";

/// Result of one observation of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Ready,
    Pending,
    Exited(ExitStatus),
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready(Duration),
    TimedOut,
    Exited(ExitStatus),
}

/// A `GET /version` probe against one listener.
///
/// Certificates are never verified; test daemons use self-signed ones.
pub struct ReadinessProbe {
    client: AdminClient,
}

impl ReadinessProbe {
    pub fn new(scheme: Scheme, host: &str, port: u16) -> HarnessResult<Self> {
        let config = ConnectionConfig::new(host, port)
            .with_scheme(scheme)
            .with_timeout(PROBE_TIMEOUT)
            .with_tls_verification(false);
        Ok(Self {
            client: AdminClient::new(config)?,
        })
    }

    /// Full URL being polled, for diagnostics.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.client.config().base_url(), READINESS_PATH)
    }

    /// One probe; any failure just means "not yet".
    pub fn is_ready(&self) -> bool {
        match self
            .client
            .request_no_content(Method::GET, READINESS_PATH, None)
        {
            Ok(()) => true,
            Err(e) => {
                trace!("{} not ready: {}", self.endpoint(), e);
                false
            }
        }
    }
}

/// Call `probe` every `interval` until it reports ready or exited, or `timeout` elapses.
///
/// The deadline is absolute: a probe that started before it is allowed to
/// finish, but no new probe is issued after it.
pub fn wait_until_ready<F>(timeout: Duration, interval: Duration, mut probe: F) -> WaitOutcome
where
    F: FnMut() -> Probe,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match probe() {
            Probe::Ready => {
                let elapsed = start.elapsed();
                debug!("Ready after {} probes ({:?})", attempts, elapsed);
                return WaitOutcome::Ready(elapsed);
            }
            Probe::Exited(status) => return WaitOutcome::Exited(status),
            Probe::Pending => {}
        }

        let now = Instant::now();
        if now >= deadline {
            debug!("Gave up after {} probes", attempts);
            return WaitOutcome::TimedOut;
        }
        thread::sleep(interval.min(deadline - now));
    }
}
