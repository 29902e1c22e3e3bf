//! src/services/s3_service.rs
//!
//! S3Service — bucket operations for buckets this tool creates. Writes are
//! only allowed on buckets tagged `CreatedBy=<owner>`, and a bucket only
//! becomes public when the caller hands over a [`PublicApproval`].

use crate::{
    errors::{AppError, AppResult, aws_error, build_error},
    models::{
        CREATED_BY_TAG,
        bucket::{
            Access, Bucket, NameProbe, ObjectVersion, UploadedObject, public_read_policy,
            validate_bucket_name,
        },
        is_owned_by,
    },
    services::{TAG_LOOKUP_CONCURRENCY, to_utc},
};
use async_trait::async_trait;
use aws_sdk_s3::{
    error::{ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::{
        BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier,
        PublicAccessBlockConfiguration, Tag, Tagging,
    },
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use md5::Context;
use std::{io, path::Path, sync::Arc};
use tokio::{fs::File, io::AsyncReadExt};
use tracing::{debug, info, warn};

/// DeleteObjects accepts at most this many keys per call.
const DELETE_BATCH: usize = 1000;
const HASH_BUFFER: usize = 64 * 1024;

#[async_trait]
pub trait S3Backend: Send + Sync {
    async fn list_buckets(&self) -> AppResult<Vec<(String, Option<DateTime<Utc>>)>>;

    /// Bucket tags; a bucket without a tag set yields an empty list.
    async fn bucket_tags(&self, bucket: &str) -> AppResult<Vec<(String, String)>>;

    async fn probe_bucket(&self, bucket: &str) -> AppResult<NameProbe>;

    /// Create in `region`, or in us-east-1 when `None`.
    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> AppResult<()>;

    async fn put_bucket_tags(&self, bucket: &str, tags: &[(String, String)]) -> AppResult<()>;

    /// Lift every switch of the bucket's public access block.
    async fn allow_public_policies(&self, bucket: &str) -> AppResult<()>;

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> AppResult<()>;

    /// Every object version and delete marker in the bucket.
    async fn list_object_versions(&self, bucket: &str) -> AppResult<Vec<ObjectVersion>>;

    /// True when the bucket holds no object, version or delete marker.
    async fn bucket_is_empty(&self, bucket: &str) -> AppResult<bool>;

    /// Delete up to [`DELETE_BATCH`] object versions.
    async fn delete_objects(&self, bucket: &str, objects: &[ObjectVersion]) -> AppResult<()>;

    /// Upload a file; returns the ETag reported by S3.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_md5: &str,
    ) -> AppResult<Option<String>>;

    async fn delete_bucket(&self, bucket: &str) -> AppResult<()>;
}

pub struct AwsS3Backend {
    client: aws_sdk_s3::Client,
}

impl AwsS3Backend {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

/// Map S3 errors, turning a missing bucket into [`AppError::NotFound`].
fn s3_error<E>(operation: &str, bucket: &str, err: E) -> AppError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    match err.code() {
        Some("NoSuchBucket") => AppError::NotFound(format!("bucket `{bucket}`")),
        Some("BucketAlreadyExists") | Some("BucketAlreadyOwnedByYou") => {
            AppError::AlreadyExists(format!("bucket `{bucket}`"))
        }
        _ => aws_error(operation, err),
    }
}

#[async_trait]
impl S3Backend for AwsS3Backend {
    async fn list_buckets(&self) -> AppResult<Vec<(String, Option<DateTime<Utc>>)>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|err| aws_error("s3:ListBuckets", err))?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| Some((b.name()?.to_string(), b.creation_date().and_then(to_utc))))
            .collect())
    }

    async fn bucket_tags(&self, bucket: &str) -> AppResult<Vec<(String, String)>> {
        match self.client.get_bucket_tagging().bucket(bucket).send().await {
            Ok(output) => Ok(output
                .tag_set()
                .iter()
                .map(|tag| (tag.key().to_string(), tag.value().to_string()))
                .collect()),
            Err(err) if err.code() == Some("NoSuchTagSet") => Ok(Vec::new()),
            Err(err) => Err(s3_error("s3:GetBucketTagging", bucket, err)),
        }
    }

    async fn probe_bucket(&self, bucket: &str) -> AppResult<NameProbe> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(NameProbe::OwnedByYou),
            Err(SdkError::ServiceError(service)) if service.err().is_not_found() => {
                Ok(NameProbe::Available)
            }
            // 403: owned by another account, 301: exists in another region.
            Err(SdkError::ServiceError(service))
                if matches!(service.raw().status().as_u16(), 301 | 403) =>
            {
                Ok(NameProbe::Taken)
            }
            Err(err) => Err(aws_error("s3:HeadBucket", err)),
        }
    }

    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> AppResult<()> {
        let mut call = self.client.create_bucket().bucket(bucket);
        if let Some(region) = region.filter(|r| *r != "us-east-1") {
            call = call.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        call.send()
            .await
            .map_err(|err| s3_error("s3:CreateBucket", bucket, err))?;
        Ok(())
    }

    async fn put_bucket_tags(&self, bucket: &str, tags: &[(String, String)]) -> AppResult<()> {
        let tag_set = tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| build_error("s3:PutBucketTagging", err))?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|err| build_error("s3:PutBucketTagging", err))?;
        self.client
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(tagging)
            .send()
            .await
            .map_err(|err| s3_error("s3:PutBucketTagging", bucket, err))?;
        Ok(())
    }

    async fn allow_public_policies(&self, bucket: &str) -> AppResult<()> {
        self.client
            .put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(
                PublicAccessBlockConfiguration::builder()
                    .block_public_acls(false)
                    .ignore_public_acls(false)
                    .block_public_policy(false)
                    .restrict_public_buckets(false)
                    .build(),
            )
            .send()
            .await
            .map_err(|err| s3_error("s3:PutPublicAccessBlock", bucket, err))?;
        Ok(())
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> AppResult<()> {
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map_err(|err| s3_error("s3:PutBucketPolicy", bucket, err))?;
        Ok(())
    }

    async fn list_object_versions(&self, bucket: &str) -> AppResult<Vec<ObjectVersion>> {
        // ListObjectVersions pages on two markers, so the SDK has no paginator for it.
        let mut found = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;
        loop {
            let page = self
                .client
                .list_object_versions()
                .bucket(bucket)
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_marker.take())
                .send()
                .await
                .map_err(|err| s3_error("s3:ListObjectVersions", bucket, err))?;

            found.extend(
                page.versions()
                    .iter()
                    .filter_map(|v| Some(ObjectVersion::new(v.key()?, v.version_id()))),
            );
            found.extend(
                page.delete_markers()
                    .iter()
                    .filter_map(|m| Some(ObjectVersion::new(m.key()?, m.version_id()))),
            );

            if page.is_truncated() != Some(true) {
                break;
            }
            key_marker = page.next_key_marker().map(str::to_string);
            version_marker = page.next_version_id_marker().map(str::to_string);
            if key_marker.is_none() && version_marker.is_none() {
                break;
            }
        }
        Ok(found)
    }

    async fn bucket_is_empty(&self, bucket: &str) -> AppResult<bool> {
        let page = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|err| s3_error("s3:ListObjectVersions", bucket, err))?;
        Ok(page.versions().is_empty() && page.delete_markers().is_empty())
    }

    async fn delete_objects(&self, bucket: &str, objects: &[ObjectVersion]) -> AppResult<()> {
        let objects = objects
            .iter()
            .map(|object| {
                ObjectIdentifier::builder()
                    .key(&object.key)
                    .set_version_id(object.version_id.clone())
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| build_error("s3:DeleteObjects", err))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|err| build_error("s3:DeleteObjects", err))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|err| s3_error("s3:DeleteObjects", bucket, err))?;

        if let Some(failed) = output.errors().first() {
            return Err(AppError::Aws {
                operation: "s3:DeleteObjects".into(),
                code: failed.code().map(str::to_string),
                message: format!(
                    "{} object(s) could not be deleted, first `{}`: {}",
                    output.errors().len(),
                    failed.key().unwrap_or_default(),
                    failed.message().unwrap_or("unknown error")
                ),
            });
        }
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_md5: &str,
    ) -> AppResult<Option<String>> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|err| AppError::Io(io::Error::other(err)))?;
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_md5(content_md5)
            .body(body)
            .send()
            .await
            .map_err(|err| s3_error("s3:PutObject", bucket, err))?;
        Ok(output.e_tag().map(str::to_string))
    }

    async fn delete_bucket(&self, bucket: &str) -> AppResult<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| s3_error("s3:DeleteBucket", bucket, err))?;
        Ok(())
    }
}

/// S3Service provides the bucket operations of the CLI:
/// - Create a bucket (validated name, ownership tag, optional public policy)
/// - Upload a file (Content-MD5 computed locally)
/// - List buckets (with a managed marker)
/// - Empty and delete a bucket
#[derive(Clone)]
pub struct S3Service {
    backend: Arc<dyn S3Backend>,
    owner: String,
    region: Option<String>,
}

impl S3Service {
    pub fn new(backend: Arc<dyn S3Backend>, owner: impl Into<String>, region: Option<String>) -> Self {
        Self {
            backend,
            owner: owner.into(),
            region,
        }
    }

    /// Whether `bucket` carries this tool's tag. Lookup failures count as "no".
    pub async fn is_managed(&self, bucket: &str) -> bool {
        match self.backend.bucket_tags(bucket).await {
            Ok(tags) => is_owned_by(tags.iter().map(|(k, v)| (k.as_str(), v.as_str())), &self.owner),
            Err(err) => {
                debug!("tag lookup for bucket {} failed: {}", bucket, err);
                false
            }
        }
    }

    /// Fail unless `bucket` exists and was created by this tool.
    pub async fn ensure_managed(&self, bucket: &str) -> AppResult<()> {
        let tags = self.backend.bucket_tags(bucket).await?;
        if is_owned_by(tags.iter().map(|(k, v)| (k.as_str(), v.as_str())), &self.owner) {
            Ok(())
        } else {
            Err(AppError::NotManaged(format!("bucket `{bucket}`")))
        }
    }

    /// Every bucket of the account, flagged with ownership.
    pub async fn list_buckets(&self) -> AppResult<Vec<Bucket>> {
        let listed = self.backend.list_buckets().await?;
        let buckets = stream::iter(listed)
            .map(|(name, created_at)| async move {
                let managed = self.is_managed(&name).await;
                Bucket {
                    name,
                    created_at,
                    managed,
                }
            })
            .buffered(TAG_LOOKUP_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;
        Ok(buckets)
    }

    pub async fn managed_buckets(&self) -> AppResult<Vec<Bucket>> {
        let mut buckets = self.list_buckets().await?;
        buckets.retain(|b| b.managed);
        Ok(buckets)
    }

    /// Validate the name and make sure nobody owns it yet.
    pub async fn check_name_available(&self, bucket: &str) -> AppResult<()> {
        validate_bucket_name(bucket)?;
        match self.backend.probe_bucket(bucket).await? {
            NameProbe::Available => Ok(()),
            NameProbe::OwnedByYou => Err(AppError::AlreadyExists(format!(
                "bucket `{bucket}` (in your account)"
            ))),
            NameProbe::Taken => Err(AppError::AlreadyExists(format!(
                "bucket `{bucket}` (owned by another account)"
            ))),
        }
    }

    /// Create and tag a bucket; a public bucket also gets a public-read policy.
    pub async fn create_bucket(&self, bucket: &str, access: Access) -> AppResult<()> {
        if let Access::Public(approval) = &access {
            if approval.bucket() != bucket {
                return Err(AppError::invalid(format!(
                    "public access was approved for `{}`, not `{bucket}`",
                    approval.bucket()
                )));
            }
        }
        self.check_name_available(bucket).await?;

        self.backend
            .create_bucket(bucket, self.region.as_deref())
            .await?;
        info!(bucket, region = ?self.region, "created bucket");

        let tags = [(CREATED_BY_TAG.to_string(), self.owner.clone())];
        if let Err(err) = self.backend.put_bucket_tags(bucket, &tags).await {
            // An untagged bucket could never be changed or removed by this tool.
            warn!(bucket, error = %err, "tagging failed, removing the new bucket");
            if let Err(cleanup) = self.backend.delete_bucket(bucket).await {
                warn!(bucket, error = %cleanup, "could not remove the untagged bucket");
            }
            return Err(err);
        }

        if let Access::Public(_) = access {
            self.backend.allow_public_policies(bucket).await?;
            self.backend
                .put_bucket_policy(bucket, &public_read_policy(bucket))
                .await?;
            info!(bucket, "bucket policy allows public reads");
        }
        Ok(())
    }

    /// Upload `path` to a managed bucket; the key defaults to the file name.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &Path,
        key: Option<&str>,
    ) -> AppResult<UploadedObject> {
        let metadata = tokio::fs::metadata(path).await.map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => AppError::NotFound(format!("file `{}`", path.display())),
            _ => AppError::Io(err),
        })?;
        if !metadata.is_file() {
            return Err(AppError::invalid(format!("`{}` is not a file", path.display())));
        }

        let key = match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => key.to_string(),
            None => default_key(path)?,
        };

        self.ensure_managed(bucket).await?;

        let (digest, size_bytes) = file_md5(path).await?;
        let content_md5 = general_purpose::STANDARD.encode(digest.0);
        let etag = self
            .backend
            .put_object(bucket, &key, path, &content_md5)
            .await?;

        let expected = format!("{:x}", digest);
        match etag.as_deref().map(|e| e.trim_matches('"')) {
            Some(reported) if reported != expected => {
                // SSE-KMS buckets report an ETag that is not the MD5 of the body.
                warn!(bucket, key = %key, reported, expected = %expected, "ETag differs from local MD5");
            }
            _ => {}
        }

        Ok(UploadedObject {
            bucket: bucket.to_string(),
            key,
            size_bytes,
            etag,
        })
    }

    /// Object versions and delete markers of a bucket; a plain object counts once.
    pub async fn stored_objects(&self, bucket: &str) -> AppResult<Vec<ObjectVersion>> {
        self.backend.list_object_versions(bucket).await
    }

    /// Delete every object version of a managed bucket; returns how many were removed.
    pub async fn empty_bucket(&self, bucket: &str) -> AppResult<usize> {
        self.ensure_managed(bucket).await?;
        let objects = self.backend.list_object_versions(bucket).await?;
        for batch in objects.chunks(DELETE_BATCH) {
            self.backend.delete_objects(bucket, batch).await?;
            debug!("deleted {} object version(s) from {}", batch.len(), bucket);
        }
        Ok(objects.len())
    }

    /// Delete an empty, managed bucket.
    pub async fn delete_bucket(&self, bucket: &str) -> AppResult<()> {
        self.ensure_managed(bucket).await?;
        if !self.backend.bucket_is_empty(bucket).await? {
            return Err(AppError::BucketNotEmpty {
                bucket: bucket.to_string(),
            });
        }
        self.backend.delete_bucket(bucket).await?;
        info!(bucket, "deleted bucket");
        Ok(())
    }
}

fn default_key(path: &Path) -> AppResult<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| AppError::invalid(format!("cannot derive a key from `{}`", path.display())))
}

/// MD5 digest and size of a file, read in chunks.
async fn file_md5(path: &Path) -> AppResult<(md5::Digest, u64)> {
    let mut file = File::open(path).await?;
    let mut digest = Context::new();
    let mut buffer = vec![0u8; HASH_BUFFER];
    let mut size = 0u64;
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        digest.consume(&buffer[..read]);
        size += read as u64;
    }
    Ok((digest.compute(), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::bucket::PublicApproval;
    use crate::prompt::scripted::{Answer, ScriptedPrompter};
    use crate::testing::{FakeS3, S3Call};
    use std::io::Write;

    fn service(fake: &Arc<FakeS3>) -> S3Service {
        S3Service::new(fake.clone(), "tester", Some("eu-west-1".into()))
    }

    #[tokio::test]
    async fn private_bucket_is_created_and_tagged_only() {
        let fake = Arc::new(FakeS3::default());
        service(&fake).create_bucket("team-logs", Access::Private).await.unwrap();

        let calls = fake.calls();
        assert!(calls.contains(&S3Call::CreateBucket("team-logs".into(), Some("eu-west-1".into()))));
        assert!(calls.contains(&S3Call::PutTags("team-logs".into())));
        assert!(!calls.iter().any(|c| matches!(c, S3Call::PutPolicy(..) | S3Call::AllowPublic(..))));
        assert!(service(&fake).is_managed("team-logs").await);
    }

    #[tokio::test]
    async fn public_bucket_gets_policy_after_approval() {
        let fake = Arc::new(FakeS3::default());
        let prompter = ScriptedPrompter::new([Answer::Confirm(true)]);
        let approval = PublicApproval::request(&prompter, "site-assets").unwrap().unwrap();
        service(&fake)
            .create_bucket("site-assets", Access::Public(approval))
            .await
            .unwrap();

        let calls = fake.calls();
        assert!(calls.contains(&S3Call::AllowPublic("site-assets".into())));
        let policy = fake.policy("site-assets").unwrap();
        assert!(policy.contains("arn:aws:s3:::site-assets/*"));
    }

    #[tokio::test]
    async fn approval_for_another_bucket_is_rejected() {
        let fake = Arc::new(FakeS3::default());
        let prompter = ScriptedPrompter::new([Answer::Confirm(true)]);
        let approval = PublicApproval::request(&prompter, "one").unwrap().unwrap();
        let err = service(&fake)
            .create_bucket("two", Access::Public(approval))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn taken_or_invalid_names_never_reach_create() {
        let fake = Arc::new(FakeS3::default());
        fake.add_taken_name("someone-elses");
        let svc = service(&fake);

        let err = svc.create_bucket("someone-elses", Access::Private).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
        let err = svc.create_bucket("Bad_Name", Access::Private).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidBucketName { .. }));
        assert!(!fake.calls().iter().any(|c| matches!(c, S3Call::CreateBucket(..))));
    }

    #[tokio::test]
    async fn unmanaged_buckets_are_read_only() {
        let fake = Arc::new(FakeS3::default());
        fake.add_foreign_bucket("shared-data");
        let svc = service(&fake);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hello").unwrap();

        let err = svc.upload("shared-data", file.path(), None).await.unwrap_err();
        assert!(matches!(err, AppError::NotManaged(_)));
        let err = svc.delete_bucket("shared-data").await.unwrap_err();
        assert!(matches!(err, AppError::NotManaged(_)));
        assert!(fake.bucket_exists("shared-data"));
    }

    #[tokio::test]
    async fn upload_sends_md5_and_defaults_key_to_file_name() {
        let fake = Arc::new(FakeS3::default());
        let svc = service(&fake);
        svc.create_bucket("uploads-1", Access::Private).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, b"a,b\n1,2\n").unwrap();

        let uploaded = svc.upload("uploads-1", &path, None).await.unwrap();
        assert_eq!(uploaded.key, "report.csv");
        assert_eq!(uploaded.size_bytes, 8);
        let expected = general_purpose::STANDARD.encode(md5::compute(b"a,b\n1,2\n").0);
        assert_eq!(fake.object_md5("uploads-1", "report.csv").as_deref(), Some(expected.as_str()));

        let renamed = svc.upload("uploads-1", &path, Some("data/q1.csv")).await.unwrap();
        assert_eq!(renamed.key, "data/q1.csv");

        let err = svc
            .upload("uploads-1", &dir.path().join("missing.txt"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_requires_empty_bucket() {
        let fake = Arc::new(FakeS3::default());
        let svc = service(&fake);
        svc.create_bucket("scratch-1", Access::Private).await.unwrap();
        fake.put_keys("scratch-1", (0..1500).map(|i| format!("obj-{i}")));

        let err = svc.delete_bucket("scratch-1").await.unwrap_err();
        assert!(matches!(err, AppError::BucketNotEmpty { .. }));

        assert_eq!(svc.empty_bucket("scratch-1").await.unwrap(), 1500);
        let batches: Vec<usize> = fake
            .calls()
            .iter()
            .filter_map(|c| match c {
                S3Call::DeleteObjects(_, n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(batches, vec![1000, 500]);

        svc.delete_bucket("scratch-1").await.unwrap();
        assert!(!fake.bucket_exists("scratch-1"));
    }

    #[tokio::test]
    async fn versioned_bucket_is_emptied_version_by_version() {
        let fake = Arc::new(FakeS3::default());
        let svc = service(&fake);
        svc.create_bucket("history-1", Access::Private).await.unwrap();
        fake.put_keys("history-1", ["notes.txt".to_string()]);
        fake.put_old_version("history-1", "notes.txt", "v1");
        fake.put_old_version("history-1", "gone.txt", "v7");

        assert_eq!(svc.stored_objects("history-1").await.unwrap().len(), 3);
        assert_eq!(svc.empty_bucket("history-1").await.unwrap(), 3);
        svc.delete_bucket("history-1").await.unwrap();
        assert!(!fake.bucket_exists("history-1"));
    }

    #[tokio::test]
    async fn only_old_versions_still_block_deletion() {
        let fake = Arc::new(FakeS3::default());
        let svc = service(&fake);
        svc.create_bucket("history-2", Access::Private).await.unwrap();
        fake.put_old_version("history-2", "old.txt", "v1");

        let err = svc.delete_bucket("history-2").await.unwrap_err();
        assert!(matches!(err, AppError::BucketNotEmpty { .. }));
        assert!(!fake.calls().contains(&S3Call::DeleteBucket("history-2".into())));
    }

    #[tokio::test]
    async fn bucket_is_removed_when_tagging_is_denied() {
        let fake = Arc::new(FakeS3::default());
        fake.deny("s3:PutBucketTagging");

        let err = service(&fake)
            .create_bucket("team-logs", Access::Private)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied { ref operation, .. } if operation == "s3:PutBucketTagging"));
        assert!(!fake.bucket_exists("team-logs"));
        assert_eq!(fake.calls().last(), Some(&S3Call::DeleteBucket("team-logs".into())));
    }

    #[tokio::test]
    async fn tagging_error_is_kept_when_cleanup_also_fails() {
        let fake = Arc::new(FakeS3::default());
        fake.deny("s3:PutBucketTagging");
        fake.deny("s3:DeleteBucket");

        let err = service(&fake)
            .create_bucket("team-logs", Access::Private)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied { ref operation, .. } if operation == "s3:PutBucketTagging"));
    }

    #[tokio::test]
    async fn listing_marks_managed_buckets() {
        let fake = Arc::new(FakeS3::default());
        fake.add_foreign_bucket("legacy");
        let svc = service(&fake);
        svc.create_bucket("fresh-1", Access::Private).await.unwrap();

        let buckets = svc.list_buckets().await.unwrap();
        let managed: Vec<(&str, bool)> = buckets.iter().map(|b| (b.name.as_str(), b.managed)).collect();
        assert!(managed.contains(&("legacy", false)));
        assert!(managed.contains(&("fresh-1", true)));
        assert_eq!(svc.managed_buckets().await.unwrap().len(), 1);
    }
}
