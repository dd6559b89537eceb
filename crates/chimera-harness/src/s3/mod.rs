//! Minimal path-style S3 client used by the object-storage scenarios.

pub mod client;
pub mod error;
pub mod list;
pub mod signing;

pub use client::{GetObjectOutput, ObjectMeta, S3Client, S3Config, DEFAULT_REGION};
pub use error::{S3Error, S3Result};
pub use list::{ListObjectsOutput, ObjectSummary};
pub use signing::{Credentials, SignatureVersion};
