//! Shared helpers for the client tests.
//!
//! Each test gets its own mock daemon so tests can run in parallel.

#![allow(dead_code)]

use chimera_admin::{AdminClient, ConnectionConfig};
use mockito::ServerGuard;
use std::net::SocketAddr;
use std::time::Duration;

/// A mock REST server plus a client pointed at it.
pub struct MockDaemon {
    pub server: ServerGuard,
    pub client: AdminClient,
}

impl MockDaemon {
    pub fn new() -> Self {
        let server = mockito::Server::new();
        let addr: SocketAddr = server
            .host_with_port()
            .parse()
            .expect("mock server address");
        let config = ConnectionConfig::new(addr.ip().to_string(), addr.port())
            .with_timeout(Duration::from_secs(5));
        let client = AdminClient::new(config).expect("client");
        Self { server, client }
    }
}

/// Port with nothing listening on it.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}
