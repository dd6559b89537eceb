//! Supervised chimera daemon instances.
//!
//! [`ServerBuilder::start`] writes a configuration into a private working
//! directory, spawns the daemon, and blocks until its REST API answers.
//! The returned [`ChimeraServer`] owns the child process and the working
//! directory; both are released by [`ChimeraServer::stop`] or on drop.
//!
//! ```no_run
//! use chimera_harness::{Backend, ServerBuilder};
//!
//! let server = ServerBuilder::new()
//!     .mount("testshare", Backend::Memfs)
//!     .start()?;
//! let client = server.admin_client()?;
//! println!("daemon {}", client.get_version()?.version);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use chimera_admin::{AdminClient, ConnectionConfig, Scheme};
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::backend::Backend;
use crate::binary::{find_daemon_binary, library_dirs, library_search_path};
use crate::config::{AccessKey, BucketEntry, DaemonConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::output::OutputCapture;
use crate::readiness::{
    wait_until_ready, Probe, ReadinessProbe, WaitOutcome, POLL_INTERVAL, STARTUP_TIMEOUT,
};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_THREADS: u32 = 2;
pub const DEFAULT_DELEGATION_THREADS: u32 = 4;

/// How long a daemon gets to exit after SIGTERM before it is killed
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Base directory for working directories that need file handle support
pub const HANDLE_FS_BASE: &str = "/build/test";

/// Overrides [`HANDLE_FS_BASE`]
pub const TEST_DIR_ENV: &str = "CHIMERA_TEST_DIR";

pub const CONFIG_FILE_NAME: &str = "config.json";

const WORK_DIR_PREFIX: &str = "chimera_test_";
const REAP_INTERVAL: Duration = Duration::from_millis(50);
const OUTPUT_WAIT: Duration = Duration::from_millis(500);

/// Lifecycle of a supervised daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Starting,
    Ready,
    Stopping,
    Terminated,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::NotStarted => "not started",
            ServerState::Starting => "starting",
            ServerState::Ready => "ready",
            ServerState::Stopping => "stopping",
            ServerState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Object-storage settings for a session.
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Listener port; allocated from the OS when unset
    pub port: Option<u16>,
    pub access_keys: Vec<AccessKey>,
    pub buckets: BTreeMap<String, BucketEntry>,
}

impl S3Settings {
    pub fn new() -> Self {
        Self {
            port: None,
            access_keys: Vec::new(),
            buckets: BTreeMap::new(),
        }
    }

    pub fn access_key(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_keys.push(AccessKey {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        });
        self
    }

    pub fn bucket(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.buckets
            .insert(name.into(), BucketEntry { path: path.into() });
        self
    }
}

impl Default for S3Settings {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything needed to start one daemon.
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    host: String,
    binary: Option<PathBuf>,
    threads: u32,
    delegation_threads: u32,
    http_port: Option<u16>,
    https: bool,
    https_port: Option<u16>,
    tls_files: Option<(PathBuf, PathBuf)>,
    mounts: Vec<(String, Backend)>,
    s3: Option<S3Settings>,
    debug_flag: bool,
    inherit_output: bool,
    envs: Vec<(OsString, OsString)>,
    startup_timeout: Duration,
    poll_interval: Duration,
    grace_period: Duration,
    work_dir_base: Option<PathBuf>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            binary: None,
            threads: DEFAULT_THREADS,
            delegation_threads: DEFAULT_DELEGATION_THREADS,
            http_port: None,
            https: false,
            https_port: None,
            tls_files: None,
            mounts: Vec::new(),
            s3: None,
            debug_flag: true,
            inherit_output: false,
            envs: Vec::new(),
            startup_timeout: STARTUP_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            grace_period: GRACE_PERIOD,
            work_dir_base: None,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Use this executable instead of searching for one.
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(path.into());
        self
    }

    pub fn threads(mut self, threads: u32, delegation_threads: u32) -> Self {
        self.threads = threads;
        self.delegation_threads = delegation_threads;
        self
    }

    /// Pin the plain REST port instead of asking the OS for one.
    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = Some(port);
        self
    }

    /// Enable the HTTPS listener. The daemon generates a self-signed certificate.
    pub fn https(mut self) -> Self {
        self.https = true;
        self
    }

    pub fn https_port(mut self, port: u16) -> Self {
        self.https = true;
        self.https_port = Some(port);
        self
    }

    /// Serve HTTPS with this certificate and key instead of a generated pair.
    pub fn tls_files(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.https = true;
        self.tls_files = Some((cert.into(), key.into()));
        self
    }

    pub fn mount(mut self, name: impl Into<String>, backend: Backend) -> Self {
        self.mounts.push((name.into(), backend));
        self
    }

    pub fn s3(mut self, settings: S3Settings) -> Self {
        self.s3 = Some(settings);
        self
    }

    /// Whether `-d` is passed to the daemon. On by default.
    pub fn debug_flag(mut self, enabled: bool) -> Self {
        self.debug_flag = enabled;
        self
    }

    /// Let the daemon write straight to this process's stdout/stderr.
    ///
    /// Nothing is captured, so startup errors carry empty output.
    pub fn inherit_output(mut self, inherit: bool) -> Self {
        self.inherit_output = inherit;
        self
    }

    /// Extra environment variable for the daemon only.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Parent directory for the working directory.
    ///
    /// Defaults to the system temp dir, or `CHIMERA_TEST_DIR` / `/build/test`
    /// when a mount's backend needs file handle support.
    pub fn work_dir_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.work_dir_base = Some(base.into());
        self
    }

    /// Command line passed to the daemon.
    pub(crate) fn daemon_args(&self, config_path: &Path) -> Vec<OsString> {
        let mut args = vec![OsString::from("-c"), config_path.as_os_str().to_owned()];
        if self.debug_flag {
            args.push(OsString::from("-d"));
        }
        args
    }

    fn resolved_work_dir_base(&self) -> Option<PathBuf> {
        if let Some(base) = &self.work_dir_base {
            return Some(base.clone());
        }
        if self.mounts.iter().any(|(_, backend)| backend.needs_handle_fs()) {
            let base = env::var_os(TEST_DIR_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(HANDLE_FS_BASE));
            return Some(base);
        }
        None
    }

    /// Spawn the daemon and wait until it is reachable.
    ///
    /// On any failure, everything created so far is torn down before the
    /// error is returned.
    pub fn start(self) -> HarnessResult<ChimeraServer> {
        let mut server = ChimeraServer::unstarted(&self)?;
        match server.launch(&self) {
            Ok(()) => Ok(server),
            Err(e) => {
                warn!("Chimera failed to start: {}", e);
                if let Err(cleanup) = server.stop() {
                    warn!("Cleanup after failed start also failed: {}", cleanup);
                }
                Err(e)
            }
        }
    }
}

/// Ask the OS for a port nobody is listening on.
pub fn free_port() -> io::Result<u16> {
    PortReservation::new().reserve()
}

/// OS-assigned ports held open until the reservation is dropped, so ports
/// taken from one reservation are always distinct.
#[derive(Debug, Default)]
pub struct PortReservation {
    listeners: Vec<TcpListener>,
}

impl PortReservation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self) -> io::Result<u16> {
        let listener = TcpListener::bind((DEFAULT_HOST, 0))?;
        let port = listener.local_addr()?.port();
        self.listeners.push(listener);
        Ok(port)
    }
}

/// A daemon process owned by the test session.
pub struct ChimeraServer {
    state: ServerState,
    host: String,
    http_port: u16,
    https_port: Option<u16>,
    s3_port: Option<u16>,
    grace_period: Duration,
    binary: Option<PathBuf>,
    work_dir: Option<TempDir>,
    work_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    child: Option<Child>,
    stdout: Option<OutputCapture>,
    stderr: Option<OutputCapture>,
}

impl ChimeraServer {
    pub(crate) fn unstarted(builder: &ServerBuilder) -> HarnessResult<Self> {
        let mut ports = PortReservation::new();
        let http_port = match builder.http_port {
            Some(port) => port,
            None => ports.reserve()?,
        };
        let https_port = match (builder.https, builder.https_port) {
            (true, Some(port)) => Some(port),
            (true, None) => Some(ports.reserve()?),
            (false, _) => None,
        };
        let s3_port = match &builder.s3 {
            Some(s3) => Some(match s3.port {
                Some(port) => port,
                None => ports.reserve()?,
            }),
            None => None,
        };
        // Released only now, so the daemon can bind them
        drop(ports);

        Ok(Self {
            state: ServerState::NotStarted,
            host: builder.host.clone(),
            http_port,
            https_port,
            s3_port,
            grace_period: builder.grace_period,
            binary: None,
            work_dir: None,
            work_path: None,
            config_path: None,
            child: None,
            stdout: None,
            stderr: None,
        })
    }

    fn launch(&mut self, builder: &ServerBuilder) -> HarnessResult<()> {
        if self.state != ServerState::NotStarted {
            return Err(HarnessError::InvalidState(self.state));
        }
        self.state = ServerState::Starting;

        let work_dir = match builder.resolved_work_dir_base() {
            Some(base) => {
                fs::create_dir_all(&base)?;
                tempfile::Builder::new()
                    .prefix(WORK_DIR_PREFIX)
                    .tempdir_in(base)?
            }
            None => tempfile::Builder::new().prefix(WORK_DIR_PREFIX).tempdir()?,
        };
        let work_path = work_dir.path().to_path_buf();
        self.work_path = Some(work_path.clone());
        self.work_dir = Some(work_dir);
        debug!("Working directory {}", work_path.display());

        let config = self.render_config(builder, &work_path)?;
        let config_path = work_path.join(CONFIG_FILE_NAME);
        config.write_to(&config_path)?;
        self.config_path = Some(config_path.clone());

        let binary = find_daemon_binary(builder.binary.as_deref())?;
        self.binary = Some(binary.clone());

        let library_path = library_search_path(
            &library_dirs(&binary),
            env::var_os("LD_LIBRARY_PATH").as_deref(),
        )?;

        let mut command = Command::new(&binary);
        command.args(builder.daemon_args(&config_path));
        command.env("LD_LIBRARY_PATH", &library_path);
        command.envs(builder.envs.iter().map(|(k, v)| (k, v)));
        command.stdin(Stdio::null());
        if builder.inherit_output {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        info!(
            "Starting chimera {} with config {}",
            binary.display(),
            config_path.display()
        );
        let mut child = command.spawn()?;
        self.stdout = child
            .stdout
            .take()
            .map(|pipe| OutputCapture::spawn("stdout", pipe));
        self.stderr = child
            .stderr
            .take()
            .map(|pipe| OutputCapture::spawn("stderr", pipe));
        debug!("Chimera running as pid {}", child.id());
        self.child = Some(child);

        self.wait_for_listeners(builder)?;

        self.state = ServerState::Ready;
        info!(
            "Chimera ready on {}:{} (https: {:?}, s3: {:?})",
            self.host, self.http_port, self.https_port, self.s3_port
        );
        Ok(())
    }

    pub(crate) fn render_config(
        &self,
        builder: &ServerBuilder,
        work_dir: &Path,
    ) -> HarnessResult<DaemonConfig> {
        let mut config = DaemonConfig::new(builder.threads, builder.delegation_threads);
        config.server.rest_http_port = Some(self.http_port);
        config.server.rest_https_port = self.https_port;
        if let Some((cert, key)) = &builder.tls_files {
            config.server.rest_ssl_cert = Some(cert.display().to_string());
            config.server.rest_ssl_key = Some(key.display().to_string());
        }

        for (name, backend) in &builder.mounts {
            backend.configure(&mut config, name, work_dir)?;
        }

        if let Some(s3) = &builder.s3 {
            config.server.s3_port = self.s3_port;
            config.s3_access_keys = s3.access_keys.clone();
            config.buckets = s3.buckets.clone();
        }

        Ok(config)
    }

    /// Poll HTTP, then HTTPS if enabled, against one shared deadline.
    fn wait_for_listeners(&mut self, builder: &ServerBuilder) -> HarnessResult<()> {
        let mut endpoints = vec![(Scheme::Http, self.http_port)];
        if let Some(port) = self.https_port {
            endpoints.push((Scheme::Https, port));
        }

        let deadline = Instant::now() + builder.startup_timeout;
        for (scheme, port) in endpoints {
            let probe = ReadinessProbe::new(scheme, &self.host, port)?;
            let remaining = deadline.saturating_duration_since(Instant::now());

            let outcome = match self.child.as_mut() {
                Some(child) => wait_until_ready(remaining, builder.poll_interval, || {
                    match child.try_wait() {
                        Ok(Some(status)) => return Probe::Exited(status),
                        Ok(None) => {}
                        Err(e) => warn!("Could not poll chimera process: {}", e),
                    }
                    if probe.is_ready() {
                        Probe::Ready
                    } else {
                        Probe::Pending
                    }
                }),
                None => return Err(HarnessError::InvalidState(self.state)),
            };

            match outcome {
                WaitOutcome::Ready(elapsed) => {
                    debug!("{} answered after {:?}", probe.endpoint(), elapsed);
                }
                WaitOutcome::TimedOut => {
                    let (stdout, stderr) = self.captured_output();
                    return Err(HarnessError::StartupTimeout {
                        timeout: builder.startup_timeout,
                        endpoint: probe.endpoint(),
                        stdout,
                        stderr,
                    });
                }
                WaitOutcome::Exited(status) => {
                    let (stdout, stderr) = self.captured_output();
                    return Err(HarnessError::ExitedEarly {
                        status,
                        stdout,
                        stderr,
                    });
                }
            }
        }

        Ok(())
    }

    /// Output captured so far, waiting briefly for the pipes to drain.
    pub fn captured_output(&self) -> (String, String) {
        let read = |capture: &Option<OutputCapture>| {
            capture
                .as_ref()
                .map(|c| c.snapshot(OUTPUT_WAIT))
                .unwrap_or_default()
        };
        (read(&self.stdout), read(&self.stderr))
    }

    /// Terminate the daemon and remove its files.
    ///
    /// Safe to call more than once; later calls are no-ops. Missing files
    /// are not an error.
    pub fn stop(&mut self) -> HarnessResult<()> {
        if self.state == ServerState::Terminated {
            return Ok(());
        }
        self.state = ServerState::Stopping;

        let mut result = Ok(());
        if let Some(mut child) = self.child.take() {
            match terminate(&mut child, self.grace_period) {
                Ok(status) => info!("Chimera exited with {}", status),
                Err(e) => {
                    warn!("Failed to stop chimera cleanly: {}", e);
                    result = Err(e);
                }
            }
        }

        self.remove_files();
        self.state = ServerState::Terminated;
        result
    }

    fn remove_files(&mut self) {
        if let Some(path) = self.config_path.take() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        if let Some(dir) = self.work_dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn https_port(&self) -> Option<u16> {
        self.https_port
    }

    pub fn s3_port(&self) -> Option<u16> {
        self.s3_port
    }

    /// PID of the daemon while it is running.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }

    /// Working directory, even after it has been removed.
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_path.as_deref()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Client for the plain REST listener.
    pub fn admin_client(&self) -> HarnessResult<AdminClient> {
        Ok(AdminClient::new(ConnectionConfig::new(
            &self.host,
            self.http_port,
        ))?)
    }

    /// Client for the HTTPS listener, accepting the daemon's self-signed certificate.
    pub fn https_admin_client(&self) -> HarnessResult<Option<AdminClient>> {
        let Some(port) = self.https_port else {
            return Ok(None);
        };
        let config = ConnectionConfig::new(&self.host, port)
            .with_https()
            .with_tls_verification(false);
        Ok(Some(AdminClient::new(config)?))
    }
}

impl Drop for ChimeraServer {
    fn drop(&mut self) {
        if self.state != ServerState::Terminated {
            debug!("Dropping chimera server in state {}", self.state);
            if let Err(e) = self.stop() {
                warn!("Error stopping chimera on drop: {}", e);
            }
        }
    }
}

/// The parts of a child process `terminate` needs.
trait Reapable {
    fn id(&self) -> u32;
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;
    fn kill(&mut self) -> io::Result<()>;
    fn wait(&mut self) -> io::Result<ExitStatus>;
}

impl Reapable for Child {
    fn id(&self) -> u32 {
        Child::id(self)
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Child::try_wait(self)
    }

    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        Child::wait(self)
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL. Always reaps the child.
///
/// A failed status poll is treated as "still running", so the child is
/// killed rather than leaked.
fn terminate<C: Reapable>(child: &mut C, grace: Duration) -> HarnessResult<ExitStatus> {
    match child.try_wait() {
        Ok(Some(status)) => return Ok(status),
        Ok(None) => {}
        Err(e) => warn!("Could not poll chimera before SIGTERM: {}", e),
    }

    let pid = Pid::from_raw(child.id() as i32);
    match signal::kill(pid, Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline {
                match child.try_wait() {
                    Ok(Some(status)) => return Ok(status),
                    Ok(None) => thread::sleep(REAP_INTERVAL),
                    Err(e) => {
                        warn!("Could not poll chimera after SIGTERM: {}", e);
                        break;
                    }
                }
            }
            warn!("Chimera did not exit within {:?}, killing it", grace);
        }
        Err(e) => warn!("SIGTERM to pid {} failed ({}), killing it", pid, e),
    }

    if let Err(e) = child.kill() {
        warn!("SIGKILL to pid {} failed: {}", pid, e);
    }
    Ok(child.wait()?)
}
