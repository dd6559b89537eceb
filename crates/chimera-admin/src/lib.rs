//! Client for the Chimera REST administration API.
//!
//! [`AdminClient`] wraps a blocking HTTP client bound to one daemon and
//! exposes the users, exports, shares and buckets collections through the
//! generic [`ResourceClient`].

pub mod client;
pub mod config;
pub mod error;
pub mod resource;

pub use client::{AdminClient, VersionInfo};
pub use config::{ConnectionConfig, Scheme};
pub use error::{AdminError, AdminResult};
pub use resource::{
    Buckets, Exports, NamedPath, NewUser, Record, ResourceClient, ResourceKind, Shares, Users,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
