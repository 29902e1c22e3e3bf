//! Views of the AWS resources this tool manages.
//!
//! The tool keeps no state of its own: these types are built from AWS API
//! responses and serialize naturally as JSON via `serde` for `--json` output.

pub mod bucket;
pub mod dns;
pub mod instance;

/// Tag key marking resources created by this tool.
pub const CREATED_BY_TAG: &str = "CreatedBy";

/// True when `tags` carries `CreatedBy=<owner>`.
pub fn is_owned_by<'a, I>(tags: I, owner: &str) -> bool
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    tags.into_iter()
        .any(|(key, value)| key == CREATED_BY_TAG && value == owner)
}
