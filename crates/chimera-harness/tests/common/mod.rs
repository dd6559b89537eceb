//! Shared fixtures: fake daemon executables and a mock REST listener.
#![allow(dead_code)]

use mockito::{Mock, Server, ServerGuard};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// Write an executable shell script standing in for the daemon.
///
/// It is placed at `<root>/build/src/daemon/chimera` so library directories
/// resolve under `<root>/build`.
pub fn fake_daemon(root: &Path, body: &str) -> PathBuf {
    let path = root.join("build/src/daemon/chimera");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A port with nothing listening on it.
pub fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn pid_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

pub fn read_pid(path: &Path) -> u32 {
    fs::read_to_string(path).unwrap().trim().parse().unwrap()
}

pub fn dir_is_empty(path: &Path) -> bool {
    fs::read_dir(path).unwrap().next().is_none()
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn assert_eventually<F>(condition: F, timeout: Duration, message: &str)
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("Condition not met within {:?}: {}", timeout, message);
}

/// Mock REST listener answering `GET /version` with 503 for the first
/// `fail_first` requests, then 200.
pub struct VersionApi {
    pub server: ServerGuard,
    pub unavailable: Option<Mock>,
    pub ready: Mock,
}

impl VersionApi {
    pub fn start(fail_first: usize) -> Self {
        let mut server = Server::new();
        let unavailable = (fail_first > 0).then(|| {
            server
                .mock("GET", "/version")
                .with_status(503)
                .with_body(r#"{"error":"Service Unavailable"}"#)
                .expect(fail_first)
                .create()
        });
        let ready = server
            .mock("GET", "/version")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"version":"test"}"#)
            .expect_at_least(1)
            .create();

        Self {
            server,
            unavailable,
            ready,
        }
    }

    pub fn port(&self) -> u16 {
        self.server.socket_address().port()
    }

    /// Every 503 was served and at least one 200 followed.
    pub fn assert_became_ready(&self) {
        if let Some(unavailable) = &self.unavailable {
            unavailable.assert();
        }
        self.ready.assert();
    }
}
