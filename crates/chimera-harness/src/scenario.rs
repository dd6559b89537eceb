//! Object-storage verification battery run against a supervised daemon.

use log::info;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::backend::Backend;
use crate::error::HarnessError;
use crate::s3::{Credentials, S3Client, S3Config, S3Error, SignatureVersion};
use crate::server::{S3Settings, ServerBuilder};

pub const BUCKET: &str = "mybucket";
pub const BUCKET_PATH: &str = "/share";
pub const MOUNT: &str = "share";
pub const ACCESS_KEY: &str = "myaccessid";
pub const SECRET_KEY: &str = "mysecretkey";

pub const SMALL_OBJECT_SIZE: usize = 4096;
pub const LARGE_OBJECT_SIZE: usize = 35_000_000;

/// Inclusive byte range read back by the `get` test
pub const RANGE: (u64, u64) = (1000, 1599);

const KEY1: &str = "mydir1/mydir2/mydir3/mykey1";
const KEY2: &str = "mydir1/mydir2/mydir3/mykey2";
const KEY3: &str = "mydir1/mydir2/mydir3/mykey3";
const KEY4: &str = "mydir1/mydir2/mydir3/mykey4";

const LIST_KEYS: [&str; 6] = [
    KEY1,
    KEY2,
    "mydir1/mydir2/mydir4/mykey3",
    "mydir1/mydir2/mydir4/mykey4",
    "mydir1/mydir3/mydir5/mykey5",
    "mydir1/mydir3/mydir5/mykey6",
];

/// Name accepted on the command line for the whole battery
pub const ALL_TESTS: &str = "all";

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("{0}")]
    AssertionFailed(String),

    #[error(transparent)]
    S3(#[from] S3Error),

    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error("Unknown test: {0}")]
    UnknownTest(String),

    #[error("{test} - {source}")]
    TestFailed {
        test: ScenarioTest,
        source: Box<ScenarioError>,
    },
}

pub type ScenarioResult<T> = Result<T, ScenarioError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioTest {
    Put,
    Get,
    Head,
    Delete,
    List,
}

impl ScenarioTest {
    /// The full battery, in run order.
    pub const ALL: [ScenarioTest; 5] = [
        ScenarioTest::Put,
        ScenarioTest::Get,
        ScenarioTest::Head,
        ScenarioTest::Delete,
        ScenarioTest::List,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScenarioTest::Put => "put",
            ScenarioTest::Get => "get",
            ScenarioTest::Head => "head",
            ScenarioTest::Delete => "delete",
            ScenarioTest::List => "list",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|test| test.name() == name)
    }

    pub fn run(self, client: &S3Client, bucket: &str) -> ScenarioResult<()> {
        match self {
            ScenarioTest::Put => run_put(client, bucket),
            ScenarioTest::Get => run_get(client, bucket),
            ScenarioTest::Head => run_head(client, bucket),
            ScenarioTest::Delete => run_delete(client, bucket),
            ScenarioTest::List => run_list(client, bucket),
        }
    }
}

impl fmt::Display for ScenarioTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Expand test names into the tests to run, in order.
///
/// No names, or `all`, selects the whole battery. Any unknown name fails
/// the whole selection.
pub fn resolve_tests<S: AsRef<str>>(names: &[S]) -> ScenarioResult<Vec<ScenarioTest>> {
    if names.is_empty() {
        return Ok(ScenarioTest::ALL.to_vec());
    }

    let mut tests = Vec::new();
    for name in names {
        let name = name.as_ref();
        if name == ALL_TESTS {
            tests.extend(ScenarioTest::ALL);
        } else {
            let test = ScenarioTest::from_name(name)
                .ok_or_else(|| ScenarioError::UnknownTest(name.to_string()))?;
            tests.push(test);
        }
    }
    Ok(tests)
}

/// How to run one battery.
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub tests: Vec<ScenarioTest>,
    pub backend: Backend,
    pub signature: SignatureVersion,
    pub binary: Option<PathBuf>,
    /// Pass `-d` to the daemon and let it write to the terminal
    pub debug: bool,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            tests: ScenarioTest::ALL.to_vec(),
            backend: Backend::Memfs,
            signature: SignatureVersion::V4,
            binary: None,
            debug: false,
        }
    }
}

/// Daemon session for the battery: one bucket on the `share` mount.
pub fn s3_session(options: &ScenarioOptions) -> ServerBuilder {
    let mut builder = ServerBuilder::new()
        .mount(MOUNT, options.backend)
        .s3(S3Settings::new()
            .access_key(ACCESS_KEY, SECRET_KEY)
            .bucket(BUCKET, BUCKET_PATH))
        .debug_flag(options.debug)
        .inherit_output(options.debug);
    if let Some(binary) = &options.binary {
        builder = builder.binary(binary);
    }
    builder
}

pub fn s3_client(host: &str, port: u16, signature: SignatureVersion) -> ScenarioResult<S3Client> {
    let config = S3Config::new(
        format!("http://{}:{}", host, port),
        Credentials::new(ACCESS_KEY, SECRET_KEY),
    )
    .with_signature(signature);
    Ok(S3Client::new(config)?)
}

/// Start a daemon, run the selected tests in order, and stop at the first failure.
pub fn run_scenarios(options: &ScenarioOptions) -> ScenarioResult<()> {
    info!(
        "Using AWS Signature {}",
        options.signature.to_string().to_uppercase()
    );
    info!("Backend: {}", options.backend);

    let server = s3_session(options).start()?;
    let port = server
        .s3_port()
        .ok_or_else(|| ScenarioError::AssertionFailed("S3 listener not configured".to_string()))?;
    let client = s3_client(server.host(), port, options.signature)?;

    for test in &options.tests {
        info!("Testing {} operations...", test.name().to_uppercase());
        test.run(&client, BUCKET)
            .map_err(|source| ScenarioError::TestFailed {
                test: *test,
                source: Box::new(source),
            })?;
        info!("{} tests passed", test.name().to_uppercase());
    }

    Ok(())
}

fn ensure_len(what: &str, actual: usize, expected: usize) -> ScenarioResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(ScenarioError::AssertionFailed(format!(
            "{}: expected {} bytes, got {}",
            what, expected, actual
        )))
    }
}

fn small_object() -> Vec<u8> {
    vec![b'x'; SMALL_OBJECT_SIZE]
}

fn large_object() -> Vec<u8> {
    vec![b'y'; LARGE_OBJECT_SIZE]
}

fn run_put(client: &S3Client, bucket: &str) -> ScenarioResult<()> {
    client.put_object(bucket, KEY1, small_object())?;
    info!("  PUT mykey1 (4KB) - OK");

    client.put_object(bucket, KEY2, small_object())?;
    info!("  PUT mykey2 (4KB) - OK");

    client.put_object(bucket, KEY3, Vec::new())?;
    info!("  PUT mykey3 (0B) - OK");

    client.put_object(bucket, KEY4, large_object())?;
    info!("  PUT mykey4 (35MB) - OK");

    Ok(())
}

fn run_get(client: &S3Client, bucket: &str) -> ScenarioResult<()> {
    let data = small_object();
    client.put_object(bucket, KEY1, data.clone())?;

    let full = client.get_object(bucket, KEY1, None)?;
    ensure_len("GET mykey1", full.body.len(), SMALL_OBJECT_SIZE)?;
    if full.body != data {
        return Err(ScenarioError::AssertionFailed(
            "GET mykey1: content differs from what was written".to_string(),
        ));
    }
    info!("  GET mykey1 (full) - OK");

    let partial = client.get_object(bucket, KEY1, Some(RANGE))?;
    let expected = (RANGE.1 - RANGE.0 + 1) as usize;
    ensure_len("GET mykey1 range", partial.body.len(), expected)?;
    info!("  GET mykey1 (range {}-{}) - OK", RANGE.0, RANGE.1);

    client.put_object(bucket, KEY4, large_object())?;
    let large = client.get_object(bucket, KEY4, None)?;
    ensure_len("GET mykey4", large.body.len(), LARGE_OBJECT_SIZE)?;
    info!("  GET mykey4 (35MB) - OK");

    Ok(())
}

fn run_head(client: &S3Client, bucket: &str) -> ScenarioResult<()> {
    client.put_object(bucket, KEY1, small_object())?;

    let meta = client.head_object(bucket, KEY1)?;
    ensure_len("HEAD mykey1", meta.content_length as usize, SMALL_OBJECT_SIZE)?;
    info!("  HEAD mykey1 - OK");

    Ok(())
}

fn run_delete(client: &S3Client, bucket: &str) -> ScenarioResult<()> {
    client.put_object(bucket, KEY1, small_object())?;
    client.put_object(bucket, KEY2, small_object())?;

    client.delete_object(bucket, KEY1)?;
    info!("  DELETE mykey1 - OK");

    match client.head_object(bucket, KEY1) {
        Ok(_) => {
            return Err(ScenarioError::AssertionFailed(
                "mykey1 still exists after DELETE".to_string(),
            ))
        }
        Err(e) if e.is_not_found() => info!("  Verified mykey1 deleted - OK"),
        Err(e) => return Err(e.into()),
    }

    let sibling = client.head_object(bucket, KEY2)?;
    ensure_len("HEAD mykey2", sibling.content_length as usize, SMALL_OBJECT_SIZE)?;
    info!("  Verified mykey2 still exists - OK");

    Ok(())
}

/// Listing results depend on the backend, so only success is checked.
fn run_list(client: &S3Client, bucket: &str) -> ScenarioResult<()> {
    for key in LIST_KEYS {
        client.put_object(bucket, key, small_object())?;
    }

    let root = client.list_objects_v2(bucket, None, Some("/"))?;
    info!(
        "  LIST / - {} keys, {} prefixes - OK",
        root.key_count,
        root.common_prefixes.len()
    );

    let top = client.list_objects_v2(bucket, Some("mydir1/"), Some("/"))?;
    info!(
        "  LIST mydir1/ - {} keys, {} prefixes - OK",
        top.key_count,
        top.common_prefixes.len()
    );

    let leaf = client.list_objects_v2(bucket, Some("mydir1/mydir2/mydir3/"), Some("/"))?;
    info!("  LIST mydir1/mydir2/mydir3/ - {} keys - OK", leaf.key_count);

    Ok(())
}
