//! In-memory AWS backends and a context builder for tests.

use crate::{
    config::{AppConfig, GlobalArgs},
    context::AppContext,
    errors::{AppError, AppResult},
    models::{
        CREATED_BY_TAG,
        bucket::{NameProbe, ObjectVersion},
        dns::{ChangeAction, DnsRecord, HostedZone, RecordChange, RecordType},
        instance::{Instance, InstanceState, LaunchRequest},
    },
    prompt::scripted::{Answer, ScriptedPrompter},
    services::{
        dns_service::{DnsService, NewZone, Route53Backend},
        ec2_service::{Ec2Backend, Ec2Service, InstanceFilter},
        identity_service::{CallerIdentity, IdentityBackend},
        s3_service::{S3Backend, S3Service},
    },
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
    sync::{Arc, Mutex},
};

pub const OWNER: &str = "tester";

fn denied(operation: &str) -> AppError {
    AppError::from_aws_code(operation, Some("AccessDenied"), "Access Denied")
}

/// Instance fixture carrying `Name` and `CreatedBy` tags.
pub fn instance(id: &str, name: &str, state: InstanceState, owner: &str) -> Instance {
    Instance {
        id: id.into(),
        name: Some(name.into()),
        state,
        instance_type: "t3.nano".into(),
        public_ip: None,
        private_ip: Some("10.0.0.10".into()),
        launch_time: None,
        created_by: Some(owner.into()),
    }
}

// ---------------------------------------------------------------- EC2

#[derive(Default)]
pub struct FakeEc2 {
    instances: Mutex<Vec<Instance>>,
    launched: Mutex<Vec<LaunchRequest>>,
    terminated: Mutex<Vec<String>>,
}

impl FakeEc2 {
    pub fn with(instances: impl IntoIterator<Item = Instance>) -> Self {
        Self {
            instances: Mutex::new(instances.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn launched(&self) -> Vec<LaunchRequest> {
        self.launched.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }

    pub fn get(&self, id: &str) -> Option<Instance> {
        self.instances.lock().unwrap().iter().find(|i| i.id == id).cloned()
    }

    fn set_state(&self, id: &str, state: InstanceState) -> AppResult<()> {
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| AppError::from_aws_code("ec2", Some("InvalidInstanceID.NotFound"), id))?;
        instance.state = state;
        Ok(())
    }
}

fn matches_filter(instance: &Instance, filter: &InstanceFilter) -> bool {
    match filter {
        InstanceFilter::States(states) => states.contains(&instance.state),
        InstanceFilter::Ids(ids) => ids.contains(&instance.id),
        InstanceFilter::Tag { key, value } => {
            let tag = match key.as_str() {
                "Name" => instance.name.as_deref(),
                CREATED_BY_TAG => instance.created_by.as_deref(),
                _ => None,
            };
            tag == Some(value.as_str())
        }
    }
}

#[async_trait]
impl Ec2Backend for FakeEc2 {
    async fn describe_instances(&self, filters: &[InstanceFilter]) -> AppResult<Vec<Instance>> {
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter(|i| filters.iter().all(|f| matches_filter(i, f)))
            .cloned()
            .collect())
    }

    async fn run_instance(&self, request: &LaunchRequest) -> AppResult<String> {
        let mut instances = self.instances.lock().unwrap();
        let id = format!("i-{:08x}", instances.len() + 1);
        let tag = |key: &str| {
            request
                .tags
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        instances.push(Instance {
            id: id.clone(),
            name: tag("Name"),
            state: InstanceState::Pending,
            instance_type: request.instance_type.clone(),
            public_ip: None,
            private_ip: None,
            launch_time: Some(Utc::now()),
            created_by: tag(CREATED_BY_TAG),
        });
        self.launched.lock().unwrap().push(request.clone());
        Ok(id)
    }

    async fn start_instance(&self, id: &str) -> AppResult<()> {
        self.set_state(id, InstanceState::Running)
    }

    async fn stop_instance(&self, id: &str) -> AppResult<()> {
        self.set_state(id, InstanceState::Stopped)
    }

    async fn terminate_instance(&self, id: &str) -> AppResult<()> {
        self.set_state(id, InstanceState::ShuttingDown)?;
        self.terminated.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------- S3

/// Calls that change S3 state, in the order they were made.
#[derive(Clone, Debug, PartialEq)]
pub enum S3Call {
    CreateBucket(String, Option<String>),
    PutTags(String),
    AllowPublic(String),
    PutPolicy(String),
    PutObject(String, String),
    DeleteObjects(String, usize),
    DeleteBucket(String),
}

#[derive(Default, Clone)]
struct FakeBucket {
    tags: Vec<(String, String)>,
    policy: Option<String>,
    /// key -> Content-MD5 sent with the upload
    objects: BTreeMap<String, String>,
    /// Noncurrent versions and delete markers.
    old_versions: Vec<ObjectVersion>,
}

#[derive(Default)]
pub struct FakeS3 {
    buckets: Mutex<BTreeMap<String, FakeBucket>>,
    /// Names owned by other accounts.
    taken: Mutex<HashSet<String>>,
    calls: Mutex<Vec<S3Call>>,
    denied: Mutex<HashSet<String>>,
}

impl FakeS3 {
    pub fn calls(&self) -> Vec<S3Call> {
        self.calls.lock().unwrap().clone()
    }

    /// A bucket in the account that this tool did not create.
    pub fn add_foreign_bucket(&self, name: &str) {
        self.buckets
            .lock()
            .unwrap()
            .insert(name.to_string(), FakeBucket::default());
    }

    /// A name owned by some other account.
    pub fn add_taken_name(&self, name: &str) {
        self.taken.lock().unwrap().insert(name.to_string());
    }

    /// Make `operation` (e.g. `s3:CreateBucket`) fail with AccessDenied.
    pub fn deny(&self, operation: &str) {
        self.denied.lock().unwrap().insert(operation.to_string());
    }

    pub fn bucket_exists(&self, name: &str) -> bool {
        self.buckets.lock().unwrap().contains_key(name)
    }

    pub fn policy(&self, bucket: &str) -> Option<String> {
        self.buckets.lock().unwrap().get(bucket)?.policy.clone()
    }

    pub fn object_md5(&self, bucket: &str, key: &str) -> Option<String> {
        self.buckets.lock().unwrap().get(bucket)?.objects.get(key).cloned()
    }

    pub fn put_keys(&self, bucket: &str, keys: impl IntoIterator<Item = String>) {
        let mut buckets = self.buckets.lock().unwrap();
        let objects = &mut buckets.entry(bucket.to_string()).or_default().objects;
        for key in keys {
            objects.insert(key, String::new());
        }
    }

    /// A noncurrent version, as left behind in a versioned bucket.
    pub fn put_old_version(&self, bucket: &str, key: &str, version_id: &str) {
        let mut buckets = self.buckets.lock().unwrap();
        buckets
            .entry(bucket.to_string())
            .or_default()
            .old_versions
            .push(ObjectVersion::new(key, Some(version_id)));
    }

    fn check(&self, operation: &str) -> AppResult<()> {
        if self.denied.lock().unwrap().contains(operation) {
            return Err(denied(operation));
        }
        Ok(())
    }

    fn record(&self, call: S3Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn with_bucket<T>(&self, bucket: &str, f: impl FnOnce(&mut FakeBucket) -> T) -> AppResult<T> {
        let mut buckets = self.buckets.lock().unwrap();
        buckets
            .get_mut(bucket)
            .map(f)
            .ok_or_else(|| AppError::NotFound(format!("bucket `{bucket}`")))
    }
}

#[async_trait]
impl S3Backend for FakeS3 {
    async fn list_buckets(&self) -> AppResult<Vec<(String, Option<DateTime<Utc>>)>> {
        self.check("s3:ListBuckets")?;
        Ok(self
            .buckets
            .lock()
            .unwrap()
            .keys()
            .map(|name| (name.clone(), None))
            .collect())
    }

    async fn bucket_tags(&self, bucket: &str) -> AppResult<Vec<(String, String)>> {
        self.with_bucket(bucket, |b| b.tags.clone())
    }

    async fn probe_bucket(&self, bucket: &str) -> AppResult<NameProbe> {
        if self.taken.lock().unwrap().contains(bucket) {
            Ok(NameProbe::Taken)
        } else if self.bucket_exists(bucket) {
            Ok(NameProbe::OwnedByYou)
        } else {
            Ok(NameProbe::Available)
        }
    }

    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> AppResult<()> {
        self.check("s3:CreateBucket")?;
        self.record(S3Call::CreateBucket(bucket.into(), region.map(str::to_string)));
        self.buckets
            .lock()
            .unwrap()
            .insert(bucket.to_string(), FakeBucket::default());
        Ok(())
    }

    async fn put_bucket_tags(&self, bucket: &str, tags: &[(String, String)]) -> AppResult<()> {
        self.check("s3:PutBucketTagging")?;
        self.record(S3Call::PutTags(bucket.into()));
        self.with_bucket(bucket, |b| b.tags = tags.to_vec())
    }

    async fn allow_public_policies(&self, bucket: &str) -> AppResult<()> {
        self.check("s3:PutPublicAccessBlock")?;
        self.record(S3Call::AllowPublic(bucket.into()));
        Ok(())
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> AppResult<()> {
        self.check("s3:PutBucketPolicy")?;
        self.record(S3Call::PutPolicy(bucket.into()));
        self.with_bucket(bucket, |b| b.policy = Some(policy.to_string()))
    }

    async fn list_object_versions(&self, bucket: &str) -> AppResult<Vec<ObjectVersion>> {
        self.with_bucket(bucket, |b| {
            b.objects
                .keys()
                .map(|key| ObjectVersion::new(key.as_str(), None))
                .chain(b.old_versions.iter().cloned())
                .collect()
        })
    }

    async fn bucket_is_empty(&self, bucket: &str) -> AppResult<bool> {
        self.with_bucket(bucket, |b| b.objects.is_empty() && b.old_versions.is_empty())
    }

    async fn delete_objects(&self, bucket: &str, objects: &[ObjectVersion]) -> AppResult<()> {
        assert!(objects.len() <= 1000, "DeleteObjects accepts at most 1000 keys");
        self.check("s3:DeleteObjects")?;
        self.record(S3Call::DeleteObjects(bucket.into(), objects.len()));
        self.with_bucket(bucket, |b| {
            for object in objects {
                match &object.version_id {
                    None => {
                        b.objects.remove(&object.key);
                    }
                    Some(_) => b.old_versions.retain(|v| v != object),
                }
            }
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        _path: &Path,
        content_md5: &str,
    ) -> AppResult<Option<String>> {
        self.check("s3:PutObject")?;
        self.record(S3Call::PutObject(bucket.into(), key.into()));
        self.with_bucket(bucket, |b| {
            b.objects.insert(key.to_string(), content_md5.to_string())
        })?;
        let digest = general_purpose::STANDARD
            .decode(content_md5)
            .map_err(|err| AppError::invalid(err.to_string()))?;
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        Ok(Some(format!("\"{hex}\"")))
    }

    async fn delete_bucket(&self, bucket: &str) -> AppResult<()> {
        self.check("s3:DeleteBucket")?;
        self.record(S3Call::DeleteBucket(bucket.into()));
        let mut buckets = self.buckets.lock().unwrap();
        if buckets
            .get(bucket)
            .is_some_and(|b| !b.objects.is_empty() || !b.old_versions.is_empty())
        {
            return Err(AppError::from_aws_code(
                "s3:DeleteBucket",
                Some("BucketNotEmpty"),
                "The bucket you tried to delete is not empty",
            ));
        }
        buckets.remove(bucket);
        Ok(())
    }
}

// ---------------------------------------------------------------- Route 53

struct FakeZone {
    zone: HostedZone,
    tags: Vec<(String, String)>,
    records: Vec<DnsRecord>,
}

#[derive(Default)]
pub struct FakeRoute53 {
    zones: Mutex<Vec<FakeZone>>,
    changes: Mutex<Vec<(String, Vec<RecordChange>)>>,
    deny_tagging: Mutex<bool>,
}

impl FakeRoute53 {
    fn insert_zone(&self, domain: &str, tags: Vec<(String, String)>) -> HostedZone {
        let mut zones = self.zones.lock().unwrap();
        let name = format!("{}.", domain.trim_end_matches('.'));
        let zone = HostedZone {
            id: format!("Z{:08}", zones.len() + 1),
            name: name.clone(),
            record_count: Some(2),
            private_zone: false,
            managed: false,
        };
        let defaults = vec![
            DnsRecord::simple(
                name.clone(),
                RecordType::Ns,
                Some(172800),
                vec!["ns-1.awsdns-01.org.".into(), "ns-2.awsdns-02.net.".into()],
            ),
            DnsRecord::simple(
                name,
                RecordType::Soa,
                Some(900),
                vec!["ns-1.awsdns-01.org. awsdns-hostmaster.amazon.com. 1 7200 900 1209600 86400".into()],
            ),
        ];
        zones.push(FakeZone {
            zone: zone.clone(),
            tags,
            records: defaults,
        });
        zone
    }

    /// A zone this tool did not create; returns its id.
    pub fn add_foreign_zone(&self, domain: &str) -> String {
        self.insert_zone(domain, Vec::new()).id
    }

    /// Make ChangeTagsForResource fail with AccessDenied.
    pub fn deny_tagging(&self) {
        *self.deny_tagging.lock().unwrap() = true;
    }

    /// Put a record set straight into a zone, bypassing the change log.
    pub fn add_record(&self, zone_id: &str, record: DnsRecord) {
        let mut zones = self.zones.lock().unwrap();
        if let Some(zone) = zones.iter_mut().find(|z| z.zone.id == zone_id) {
            zone.records.push(record);
        }
    }

    pub fn zone_ids(&self) -> Vec<String> {
        self.zones.lock().unwrap().iter().map(|z| z.zone.id.clone()).collect()
    }

    pub fn zone_exists(&self, zone_id: &str) -> bool {
        self.zones.lock().unwrap().iter().any(|z| z.zone.id == zone_id)
    }

    /// Number of ChangeResourceRecordSets calls.
    pub fn change_count(&self) -> usize {
        self.changes.lock().unwrap().len()
    }

    pub fn last_action(&self, zone_id: &str) -> Option<ChangeAction> {
        self.changes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| id == zone_id)
            .and_then(|(_, changes)| changes.last())
            .map(|c| c.action)
    }

    fn with_zone<T>(&self, zone_id: &str, f: impl FnOnce(&mut FakeZone) -> AppResult<T>) -> AppResult<T> {
        let mut zones = self.zones.lock().unwrap();
        let zone = zones
            .iter_mut()
            .find(|z| z.zone.id == zone_id)
            .ok_or_else(|| AppError::NotFound(format!("hosted zone `{zone_id}`")))?;
        f(zone)
    }
}

fn invalid_batch(message: String) -> AppError {
    AppError::from_aws_code("route53:ChangeResourceRecordSets", Some("InvalidChangeBatch"), message)
}

#[async_trait]
impl Route53Backend for FakeRoute53 {
    async fn list_zones(&self) -> AppResult<Vec<HostedZone>> {
        Ok(self
            .zones
            .lock()
            .unwrap()
            .iter()
            .map(|z| HostedZone {
                record_count: Some(z.records.len() as i64),
                ..z.zone.clone()
            })
            .collect())
    }

    async fn zone_tags(&self, zone_id: &str) -> AppResult<Vec<(String, String)>> {
        self.with_zone(zone_id, |z| Ok(z.tags.clone()))
    }

    async fn create_zone(&self, domain: &str, caller_reference: &str, _comment: &str) -> AppResult<NewZone> {
        assert!(!caller_reference.is_empty());
        let zone = self.insert_zone(domain, Vec::new());
        Ok(NewZone {
            zone,
            name_servers: vec!["ns-1.awsdns-01.org".into(), "ns-2.awsdns-02.net".into()],
        })
    }

    async fn tag_zone(&self, zone_id: &str, tags: &[(String, String)]) -> AppResult<()> {
        if *self.deny_tagging.lock().unwrap() {
            return Err(denied("route53:ChangeTagsForResource"));
        }
        self.with_zone(zone_id, |z| {
            z.tags.extend(tags.iter().cloned());
            Ok(())
        })
    }

    async fn delete_zone(&self, zone_id: &str) -> AppResult<()> {
        let mut zones = self.zones.lock().unwrap();
        let index = zones
            .iter()
            .position(|z| z.zone.id == zone_id)
            .ok_or_else(|| AppError::NotFound(format!("hosted zone `{zone_id}`")))?;
        let zone = &zones[index];
        if zone.records.iter().any(|r| !r.is_zone_default(&zone.zone.name)) {
            return Err(AppError::from_aws_code(
                "route53:DeleteHostedZone",
                Some("HostedZoneNotEmpty"),
                "The hosted zone contains resource record sets",
            ));
        }
        zones.remove(index);
        Ok(())
    }

    async fn list_records(&self, zone_id: &str) -> AppResult<Vec<DnsRecord>> {
        self.with_zone(zone_id, |z| Ok(z.records.clone()))
    }

    async fn change_records(&self, zone_id: &str, changes: &[RecordChange]) -> AppResult<()> {
        self.with_zone(zone_id, |zone| {
            // Validate the whole batch first; Route 53 applies all or nothing.
            let mut records = zone.records.clone();
            for change in changes {
                let record = &change.record;
                let position = records.iter().position(|r| r.same_set(record));
                match (change.action, position) {
                    (ChangeAction::Create, Some(_)) => {
                        return Err(invalid_batch(format!("{} already exists", record.name)));
                    }
                    (ChangeAction::Create, None) | (ChangeAction::Upsert, None) => {
                        records.push(record.clone())
                    }
                    (ChangeAction::Upsert, Some(i)) => records[i] = record.clone(),
                    (ChangeAction::Delete, Some(i)) if records[i] == *record => {
                        records.remove(i);
                    }
                    (ChangeAction::Delete, _) => {
                        return Err(invalid_batch(format!("{} does not match", record.name)));
                    }
                }
            }
            zone.records = records;
            Ok(())
        })?;
        self.changes
            .lock()
            .unwrap()
            .push((zone_id.to_string(), changes.to_vec()));
        Ok(())
    }
}

// ---------------------------------------------------------------- STS

pub struct FakeIdentity {
    pub result: Result<CallerIdentity, String>,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self {
            result: Ok(CallerIdentity {
                account: "123456789012".into(),
                arn: "arn:aws:iam::123456789012:user/tester".into(),
                user_id: "AIDATESTER".into(),
            }),
        }
    }
}

#[async_trait]
impl IdentityBackend for FakeIdentity {
    async fn caller_identity(&self) -> AppResult<CallerIdentity> {
        self.result.clone().map_err(|code| {
            AppError::from_aws_code("sts:GetCallerIdentity", Some(code.as_str()), "request rejected")
        })
    }
}

// ---------------------------------------------------------------- context

/// An [`AppContext`] wired to fakes, with handles to inspect them.
pub struct TestContext {
    pub ctx: AppContext,
    pub ec2: Arc<FakeEc2>,
    pub s3: Arc<FakeS3>,
    pub route53: Arc<FakeRoute53>,
    pub prompter: Arc<ScriptedPrompter>,
}

impl TestContext {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self::with_ec2(FakeEc2::default(), answers)
    }

    pub fn with_ec2(ec2: FakeEc2, answers: impl IntoIterator<Item = Answer>) -> Self {
        let mut config = AppConfig::from_lookup(&GlobalArgs::default(), |_| None)
            .unwrap_or_else(|err| panic!("default config: {err}"));
        config.owner = OWNER.into();
        config.region = Some("eu-west-1".into());

        let ec2 = Arc::new(ec2);
        let s3 = Arc::new(FakeS3::default());
        let route53 = Arc::new(FakeRoute53::default());
        let prompter = Arc::new(ScriptedPrompter::new(answers));

        let ctx = AppContext {
            region: config.region.clone(),
            ec2: Ec2Service::new(ec2.clone(), OWNER, config.max_running_instances),
            s3: S3Service::new(s3.clone(), OWNER, config.region.clone()),
            dns: DnsService::new(route53.clone(), OWNER, config.default_ttl),
            identity: Arc::new(FakeIdentity::default()),
            prompter: prompter.clone(),
            config,
        };
        Self {
            ctx,
            ec2,
            s3,
            route53,
            prompter,
        }
    }

    /// Replace the scripted answers, keeping the fakes and their state.
    pub fn answers(&mut self, answers: impl IntoIterator<Item = Answer>) {
        let prompter = Arc::new(ScriptedPrompter::new(answers));
        self.ctx.prompter = prompter.clone();
        self.prompter = prompter;
    }

    /// Create a managed bucket straight through the service.
    pub async fn managed_bucket(&self, name: &str) {
        self.ctx
            .s3
            .create_bucket(name, crate::models::bucket::Access::Private)
            .await
            .unwrap();
    }
}
