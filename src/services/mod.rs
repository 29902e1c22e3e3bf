//! AWS-facing services.
//!
//! Each service pairs a backend trait, the narrow set of AWS calls it needs,
//! with the rules this tool applies on top: ownership tags, the running
//! instance limit, name validation and so on. `Aws*Backend` types implement
//! the traits with the AWS SDK; tests plug in in-memory fakes.

pub mod dns_service;
pub mod ec2_service;
pub mod identity_service;
pub mod s3_service;

use aws_sdk_ec2::primitives::DateTime;
use chrono::Utc;

/// Concurrent tag lookups when listing buckets or zones.
pub(crate) const TAG_LOOKUP_CONCURRENCY: usize = 8;

/// Convert an SDK timestamp to chrono.
pub(crate) fn to_utc(value: &DateTime) -> Option<chrono::DateTime<Utc>> {
    chrono::DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}
