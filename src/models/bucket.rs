//! S3 buckets and the rules for naming and exposing them.

use crate::errors::{AppError, AppResult};
use crate::prompt::Prompter;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const RESERVED_PREFIXES: [&str; 3] = ["xn--", "sthree-", "amzn-s3-demo-"];
const RESERVED_SUFFIXES: [&str; 4] = ["-s3alias", "--ol-s3", ".mrap", "--x-s3"];

/// A bucket as listed by ListBuckets.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Bucket {
    pub name: String,

    pub created_at: Option<DateTime<Utc>>,

    /// Whether the bucket carries this tool's `CreatedBy` tag.
    pub managed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BucketAccess {
    Private,
    Public,
}

/// Proof that the user explicitly agreed to make a bucket public.
///
/// The field is private so the only way to obtain one is [`PublicApproval::request`].
#[derive(Debug)]
pub struct PublicApproval {
    bucket: String,
}

impl PublicApproval {
    /// Ask the user to confirm public exposure of `bucket`. `None` when declined.
    pub fn request(prompter: &dyn Prompter, bucket: &str) -> AppResult<Option<Self>> {
        println!(
            "A public bucket lets anyone on the internet read every object in `{bucket}`."
        );
        if prompter.confirm(&format!("Make bucket `{bucket}` public?"))? {
            Ok(Some(Self {
                bucket: bucket.to_string(),
            }))
        } else {
            Ok(None)
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Access the bucket is created with.
#[derive(Debug)]
pub enum Access {
    Private,
    Public(PublicApproval),
}

/// Result of a successful upload.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct UploadedObject {
    pub bucket: String,
    pub key: String,
    pub size_bytes: u64,
    pub etag: Option<String>,
}

/// One stored object version or delete marker. Unversioned buckets report
/// every object once, with no version id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: Option<String>,
}

impl ObjectVersion {
    pub fn new(key: impl Into<String>, version_id: Option<&str>) -> Self {
        Self {
            key: key.into(),
            version_id: version_id.map(str::to_string),
        }
    }
}

/// Outcome of probing a name with HeadBucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameProbe {
    Available,
    OwnedByYou,
    Taken,
}

/// Validate bucket name format.
///
/// Enforces S3 naming rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
/// - cannot use a prefix or suffix AWS reserves
pub fn validate_bucket_name(name: &str) -> AppResult<()> {
    let invalid = |reason: &str| AppError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.into(),
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }

    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid(
            "cannot contain consecutive dots or dot-hyphen combinations",
        ));
    }

    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }

    if let Some(prefix) = RESERVED_PREFIXES.iter().find(|p| name.starts_with(*p)) {
        return Err(invalid(&format!("prefix `{prefix}` is reserved by AWS")));
    }

    if let Some(suffix) = RESERVED_SUFFIXES.iter().find(|s| name.ends_with(*s)) {
        return Err(invalid(&format!("suffix `{suffix}` is reserved by AWS")));
    }

    Ok(())
}

/// Policy granting anonymous read on every object of `bucket`.
pub fn public_read_policy(bucket: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "PublicReadGetObject",
            "Effect": "Allow",
            "Principal": "*",
            "Action": "s3:GetObject",
            "Resource": format!("arn:aws:s3:::{bucket}/*"),
        }]
    })
    .to_string()
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
