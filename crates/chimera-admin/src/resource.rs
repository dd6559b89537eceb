//! Typed list/get/create/delete operations over the managed resource kinds.
//!
//! Users, NFS exports, SMB shares and S3 buckets all follow the same REST
//! shape, so a single [`ResourceClient`] is parametrized by a
//! [`ResourceKind`] that supplies the collection path and creation body.
//!
//! ```no_run
//! use chimera_admin::{AdminClient, NamedPath, NewUser};
//!
//! let client = AdminClient::connect("127.0.0.1", 8080)?;
//! client.users().create(&NewUser::new("alice", 1000, 1000).with_password("secret"))?;
//! client.exports().create(&NamedPath::new("data", "/share"))?;
//! let shares = client.shares().list()?;
//! # Ok::<(), chimera_admin::AdminError>(())
//! ```

use log::debug;
use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;

use crate::client::AdminClient;
use crate::error::{AdminError, AdminResult};

/// A resource as returned by the daemon; the daemon owns the schema.
pub type Record = Map<String, Value>;

/// One kind of administrable resource.
pub trait ResourceKind {
    /// Collection path, e.g. `/api/v1/users`
    const COLLECTION: &'static str;
    /// Singular name used in log messages
    const NAME: &'static str;
    /// Body posted to the collection to create a resource
    type Create: Serialize;
}

/// Builtin users
#[derive(Debug, Clone, Copy)]
pub struct Users;

/// NFS exports
#[derive(Debug, Clone, Copy)]
pub struct Exports;

/// SMB shares
#[derive(Debug, Clone, Copy)]
pub struct Shares;

/// S3 buckets
#[derive(Debug, Clone, Copy)]
pub struct Buckets;

impl ResourceKind for Users {
    const COLLECTION: &'static str = "/api/v1/users";
    const NAME: &'static str = "user";
    type Create = NewUser;
}

impl ResourceKind for Exports {
    const COLLECTION: &'static str = "/api/v1/exports";
    const NAME: &'static str = "export";
    type Create = NamedPath;
}

impl ResourceKind for Shares {
    const COLLECTION: &'static str = "/api/v1/shares";
    const NAME: &'static str = "share";
    type Create = NamedPath;
}

impl ResourceKind for Buckets {
    const COLLECTION: &'static str = "/api/v1/buckets";
    const NAME: &'static str = "bucket";
    type Create = NamedPath;
}

/// Creation body for a builtin user.
///
/// `password` and `gids` are only sent when supplied and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUser {
    pub username: String,
    pub uid: u32,
    pub gid: u32,
    #[serde(skip_serializing_if = "password_unset")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "gids_unset")]
    pub gids: Option<Vec<u32>>,
}

fn password_unset(password: &Option<String>) -> bool {
    password.as_deref().map_or(true, str::is_empty)
}

fn gids_unset(gids: &Option<Vec<u32>>) -> bool {
    gids.as_ref().map_or(true, Vec::is_empty)
}

impl NewUser {
    pub fn new(username: impl Into<String>, uid: u32, gid: u32) -> Self {
        Self {
            username: username.into(),
            uid,
            gid,
            password: None,
            gids: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Supplementary group IDs
    pub fn with_gids(mut self, gids: impl IntoIterator<Item = u32>) -> Self {
        self.gids = Some(gids.into_iter().collect());
        self
    }
}

/// Creation body shared by exports, shares and buckets: a name bound to a VFS path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedPath {
    pub name: String,
    pub path: String,
}

impl NamedPath {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// list/get/create/delete for one resource kind.
pub struct ResourceClient<'a, K: ResourceKind> {
    client: &'a AdminClient,
    _kind: PhantomData<K>,
}

impl<'a, K: ResourceKind> ResourceClient<'a, K> {
    pub fn new(client: &'a AdminClient) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    /// Everything the daemon reports for this collection, unfiltered.
    pub fn list(&self) -> AdminResult<Vec<Record>> {
        self.client.request(Method::GET, K::COLLECTION, None)
    }

    /// Fetch one resource. A missing resource is `AdminError::Http { status: 404, .. }`.
    pub fn get(&self, id: &str) -> AdminResult<Record> {
        self.client.request(Method::GET, &item_path::<K>(id)?, None)
    }

    pub fn create(&self, body: &K::Create) -> AdminResult<Record> {
        let body = creation_body(body)?;
        debug!("Creating {}: {}", K::NAME, body);
        self.client.request(Method::POST, K::COLLECTION, Some(&body))
    }

    pub fn delete(&self, id: &str) -> AdminResult<()> {
        debug!("Deleting {} {}", K::NAME, id);
        self.client
            .request_no_content(Method::DELETE, &item_path::<K>(id)?, None)
    }
}

/// `collection/<id>` with `id` encoded as exactly one path segment.
///
/// Empty, `.` and `..` identifiers cannot name a single segment and are rejected.
fn item_path<K: ResourceKind>(id: &str) -> AdminResult<String> {
    if matches!(id, "" | "." | "..") {
        return Err(AdminError::Request(format!(
            "Invalid {} identifier '{}'",
            K::NAME,
            id
        )));
    }
    Ok(format!("{}/{}", K::COLLECTION, urlencoding::encode(id)))
}

/// Serialize a creation body into the JSON object that is posted.
pub fn creation_body<T: Serialize>(body: &T) -> AdminResult<Value> {
    serde_json::to_value(body)
        .map_err(|e| AdminError::Request(format!("Failed to encode request body: {}", e)))
}
