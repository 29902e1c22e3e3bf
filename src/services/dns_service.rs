//! src/services/dns_service.rs
//!
//! DnsService — Route 53 hosted zones and record sets. Zones and records can
//! only be changed in zones tagged `CreatedBy=<owner>`.

use crate::{
    errors::{AppError, AppResult, aws_error, build_error},
    models::{
        CREATED_BY_TAG,
        dns::{
            AliasTarget, ChangeAction, CidrLocation, DnsRecord, GeoLocation, GeoProximity,
            HostedZone, RecordChange, RecordRouting, RecordType, bare_zone_id, normalize_domain,
            normalize_record_name, normalize_value, same_name,
        },
        is_owned_by,
    },
    services::TAG_LOOKUP_CONCURRENCY,
};
use async_trait::async_trait;
use aws_sdk_route53::{
    error::ProvideErrorMetadata,
    types::{
        self as r53, Change, ChangeBatch, CidrRoutingConfig, Coordinates, GeoProximityLocation,
        HostedZoneConfig, ResourceRecord, ResourceRecordSet, ResourceRecordSetFailover,
        ResourceRecordSetRegion, RrType, Tag, TagResourceType,
    },
};
use futures::{StreamExt, stream};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const ZONE_COMMENT: &str = "Created by aws-manager";

/// A zone returned by CreateHostedZone together with its delegation set.
#[derive(Clone, Debug, PartialEq)]
pub struct NewZone {
    pub zone: HostedZone,
    pub name_servers: Vec<String>,
}

#[async_trait]
pub trait Route53Backend: Send + Sync {
    /// Every hosted zone of the account; `managed` is left false.
    async fn list_zones(&self) -> AppResult<Vec<HostedZone>>;

    async fn zone_tags(&self, zone_id: &str) -> AppResult<Vec<(String, String)>>;

    async fn create_zone(&self, domain: &str, caller_reference: &str, comment: &str) -> AppResult<NewZone>;

    async fn tag_zone(&self, zone_id: &str, tags: &[(String, String)]) -> AppResult<()>;

    async fn delete_zone(&self, zone_id: &str) -> AppResult<()>;

    async fn list_records(&self, zone_id: &str) -> AppResult<Vec<DnsRecord>>;

    /// Apply all changes in one atomic batch.
    async fn change_records(&self, zone_id: &str, changes: &[RecordChange]) -> AppResult<()>;
}

pub struct AwsRoute53Backend {
    client: aws_sdk_route53::Client,
}

impl AwsRoute53Backend {
    pub fn new(client: aws_sdk_route53::Client) -> Self {
        Self { client }
    }
}

fn route53_error<E>(operation: &str, zone_id: &str, err: E) -> AppError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    match err.code() {
        Some("NoSuchHostedZone") => AppError::NotFound(format!("hosted zone `{zone_id}`")),
        Some("HostedZoneAlreadyExists") => AppError::AlreadyExists(format!("hosted zone `{zone_id}`")),
        _ => aws_error(operation, err),
    }
}

fn zone_from_sdk(zone: &r53::HostedZone) -> HostedZone {
    HostedZone {
        id: bare_zone_id(zone.id()).to_string(),
        name: zone.name().to_string(),
        record_count: zone.resource_record_set_count(),
        private_zone: zone.config().is_some_and(|c| c.private_zone()),
        managed: false,
    }
}

fn routing_from_sdk(set: &ResourceRecordSet) -> RecordRouting {
    RecordRouting {
        weight: set.weight(),
        region: set.region().map(|r| r.as_str().to_string()),
        failover: set.failover().map(|f| f.as_str().to_string()),
        geo_location: set.geo_location().map(|geo| GeoLocation {
            continent_code: geo.continent_code().map(str::to_string),
            country_code: geo.country_code().map(str::to_string),
            subdivision_code: geo.subdivision_code().map(str::to_string),
        }),
        geo_proximity: set.geo_proximity_location().map(|geo| GeoProximity {
            aws_region: geo.aws_region().map(str::to_string),
            local_zone_group: geo.local_zone_group().map(str::to_string),
            coordinates: geo
                .coordinates()
                .map(|c| (c.latitude().to_string(), c.longitude().to_string())),
            bias: geo.bias(),
        }),
        cidr_location: set.cidr_routing_config().map(|cidr| CidrLocation {
            collection_id: cidr.collection_id().to_string(),
            location_name: cidr.location_name().to_string(),
        }),
        multi_value_answer: set.multi_value_answer(),
        health_check_id: set.health_check_id().map(str::to_string),
        traffic_policy_instance_id: set.traffic_policy_instance_id().map(str::to_string),
    }
}

fn record_from_sdk(set: &ResourceRecordSet) -> Option<DnsRecord> {
    let record_type = match RecordType::parse(set.r#type().as_str()) {
        Ok(record_type) => record_type,
        Err(_) => {
            debug!("skipping record {} of unknown type {}", set.name(), set.r#type().as_str());
            return None;
        }
    };
    Some(DnsRecord {
        name: set.name().to_string(),
        record_type,
        set_identifier: set.set_identifier().map(str::to_string),
        ttl: set.ttl(),
        values: set
            .resource_records()
            .iter()
            .map(|r| r.value().to_string())
            .collect(),
        alias: set.alias_target().map(|alias| AliasTarget {
            dns_name: alias.dns_name().to_string(),
            hosted_zone_id: alias.hosted_zone_id().to_string(),
            evaluate_target_health: alias.evaluate_target_health(),
        }),
        routing: routing_from_sdk(set),
    })
}

fn record_to_sdk(record: &DnsRecord) -> AppResult<ResourceRecordSet> {
    const OP: &str = "route53:ChangeResourceRecordSets";
    let routing = &record.routing;
    let mut builder = ResourceRecordSet::builder()
        .name(&record.name)
        .r#type(RrType::from(record.record_type.as_str()))
        .set_set_identifier(record.set_identifier.clone())
        .set_weight(routing.weight)
        .set_region(routing.region.as_deref().map(ResourceRecordSetRegion::from))
        .set_failover(routing.failover.as_deref().map(ResourceRecordSetFailover::from))
        .set_multi_value_answer(routing.multi_value_answer)
        .set_health_check_id(routing.health_check_id.clone())
        .set_traffic_policy_instance_id(routing.traffic_policy_instance_id.clone());

    if let Some(geo) = &routing.geo_location {
        builder = builder.geo_location(
            r53::GeoLocation::builder()
                .set_continent_code(geo.continent_code.clone())
                .set_country_code(geo.country_code.clone())
                .set_subdivision_code(geo.subdivision_code.clone())
                .build(),
        );
    }
    if let Some(geo) = &routing.geo_proximity {
        let coordinates = geo
            .coordinates
            .as_ref()
            .map(|(latitude, longitude)| {
                Coordinates::builder()
                    .latitude(latitude)
                    .longitude(longitude)
                    .build()
                    .map_err(|err| build_error(OP, err))
            })
            .transpose()?;
        builder = builder.geo_proximity_location(
            GeoProximityLocation::builder()
                .set_aws_region(geo.aws_region.clone())
                .set_local_zone_group(geo.local_zone_group.clone())
                .set_coordinates(coordinates)
                .set_bias(geo.bias)
                .build(),
        );
    }
    if let Some(cidr) = &routing.cidr_location {
        builder = builder.cidr_routing_config(
            CidrRoutingConfig::builder()
                .collection_id(&cidr.collection_id)
                .location_name(&cidr.location_name)
                .build()
                .map_err(|err| build_error(OP, err))?,
        );
    }

    match &record.alias {
        Some(alias) => {
            builder = builder.alias_target(
                r53::AliasTarget::builder()
                    .dns_name(&alias.dns_name)
                    .hosted_zone_id(&alias.hosted_zone_id)
                    .evaluate_target_health(alias.evaluate_target_health)
                    .build()
                    .map_err(|err| build_error(OP, err))?,
            );
        }
        None => {
            let values = record
                .values
                .iter()
                .map(|value| ResourceRecord::builder().value(value).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| build_error(OP, err))?;
            // Traffic-policy sets may carry no records of their own.
            if !values.is_empty() {
                builder = builder.set_resource_records(Some(values));
            }
            builder = builder.set_ttl(record.ttl);
        }
    }
    builder.build().map_err(|err| build_error(OP, err))
}

fn change_to_sdk(change: &RecordChange) -> AppResult<Change> {
    let action = match change.action {
        ChangeAction::Create => r53::ChangeAction::Create,
        ChangeAction::Upsert => r53::ChangeAction::Upsert,
        ChangeAction::Delete => r53::ChangeAction::Delete,
    };
    Change::builder()
        .action(action)
        .resource_record_set(record_to_sdk(&change.record)?)
        .build()
        .map_err(|err| build_error("route53:ChangeResourceRecordSets", err))
}

#[async_trait]
impl Route53Backend for AwsRoute53Backend {
    async fn list_zones(&self) -> AppResult<Vec<HostedZone>> {
        let mut pages = self.client.list_hosted_zones().into_paginator().send();
        let mut zones = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| aws_error("route53:ListHostedZones", err))?;
            zones.extend(page.hosted_zones().iter().map(zone_from_sdk));
        }
        Ok(zones)
    }

    async fn zone_tags(&self, zone_id: &str) -> AppResult<Vec<(String, String)>> {
        let output = self
            .client
            .list_tags_for_resource()
            .resource_type(TagResourceType::Hostedzone)
            .resource_id(zone_id)
            .send()
            .await
            .map_err(|err| route53_error("route53:ListTagsForResource", zone_id, err))?;
        Ok(output
            .resource_tag_set()
            .map(|set| {
                set.tags()
                    .iter()
                    .filter_map(|tag| Some((tag.key()?.to_string(), tag.value()?.to_string())))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_zone(&self, domain: &str, caller_reference: &str, comment: &str) -> AppResult<NewZone> {
        let output = self
            .client
            .create_hosted_zone()
            .name(domain)
            .caller_reference(caller_reference)
            .hosted_zone_config(
                HostedZoneConfig::builder()
                    .comment(comment)
                    .private_zone(false)
                    .build(),
            )
            .send()
            .await
            .map_err(|err| route53_error("route53:CreateHostedZone", domain, err))?;

        let zone = output.hosted_zone().map(zone_from_sdk).ok_or_else(|| AppError::Aws {
            operation: "route53:CreateHostedZone".into(),
            code: None,
            message: "response did not include the hosted zone".into(),
        })?;
        let name_servers = output
            .delegation_set()
            .map(|set| set.name_servers().to_vec())
            .unwrap_or_default();
        Ok(NewZone { zone, name_servers })
    }

    async fn tag_zone(&self, zone_id: &str, tags: &[(String, String)]) -> AppResult<()> {
        let tags = tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect();
        self.client
            .change_tags_for_resource()
            .resource_type(TagResourceType::Hostedzone)
            .resource_id(zone_id)
            .set_add_tags(Some(tags))
            .send()
            .await
            .map_err(|err| route53_error("route53:ChangeTagsForResource", zone_id, err))?;
        Ok(())
    }

    async fn delete_zone(&self, zone_id: &str) -> AppResult<()> {
        self.client
            .delete_hosted_zone()
            .id(zone_id)
            .send()
            .await
            .map_err(|err| route53_error("route53:DeleteHostedZone", zone_id, err))?;
        Ok(())
    }

    async fn list_records(&self, zone_id: &str) -> AppResult<Vec<DnsRecord>> {
        let mut records = Vec::new();
        let mut start: Option<(String, RrType)> = None;
        loop {
            let mut call = self.client.list_resource_record_sets().hosted_zone_id(zone_id);
            if let Some((name, record_type)) = start.take() {
                call = call.start_record_name(name).start_record_type(record_type);
            }
            let page = call
                .send()
                .await
                .map_err(|err| route53_error("route53:ListResourceRecordSets", zone_id, err))?;
            records.extend(page.resource_record_sets().iter().filter_map(record_from_sdk));

            if !page.is_truncated() {
                break;
            }
            match (page.next_record_name(), page.next_record_type()) {
                (Some(name), Some(record_type)) => {
                    start = Some((name.to_string(), record_type.clone()));
                }
                _ => break,
            }
        }
        Ok(records)
    }

    async fn change_records(&self, zone_id: &str, changes: &[RecordChange]) -> AppResult<()> {
        let changes = changes.iter().map(change_to_sdk).collect::<AppResult<Vec<_>>>()?;
        let batch = ChangeBatch::builder()
            .set_changes(Some(changes))
            .build()
            .map_err(|err| build_error("route53:ChangeResourceRecordSets", err))?;
        let output = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|err| route53_error("route53:ChangeResourceRecordSets", zone_id, err))?;
        if let Some(info) = output.change_info() {
            debug!("change {} is {}", info.id(), info.status().as_str());
        }
        Ok(())
    }
}

/// DnsService provides the Route 53 operations of the CLI:
/// - Create, list and delete hosted zones
/// - Create, update, list and delete record sets
#[derive(Clone)]
pub struct DnsService {
    backend: Arc<dyn Route53Backend>,
    owner: String,
    default_ttl: i64,
}

impl DnsService {
    pub fn new(backend: Arc<dyn Route53Backend>, owner: impl Into<String>, default_ttl: i64) -> Self {
        Self {
            backend,
            owner: owner.into(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> i64 {
        self.default_ttl
    }

    async fn is_managed(&self, zone_id: &str) -> bool {
        match self.backend.zone_tags(zone_id).await {
            Ok(tags) => is_owned_by(tags.iter().map(|(k, v)| (k.as_str(), v.as_str())), &self.owner),
            Err(err) => {
                debug!("tag lookup for zone {} failed: {}", zone_id, err);
                false
            }
        }
    }

    /// Every hosted zone, flagged with ownership.
    pub async fn list_zones(&self) -> AppResult<Vec<HostedZone>> {
        let zones = self.backend.list_zones().await?;
        let zones = stream::iter(zones)
            .map(|mut zone| async move {
                zone.managed = self.is_managed(&zone.id).await;
                zone
            })
            .buffered(TAG_LOOKUP_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;
        Ok(zones)
    }

    pub async fn managed_zones(&self) -> AppResult<Vec<HostedZone>> {
        let mut zones = self.list_zones().await?;
        zones.retain(|z| z.managed);
        Ok(zones)
    }

    /// Look up one zone by id (with or without the `/hostedzone/` prefix).
    pub async fn zone(&self, zone_id: &str) -> AppResult<HostedZone> {
        let zone_id = bare_zone_id(zone_id.trim());
        let mut zone = self
            .backend
            .list_zones()
            .await?
            .into_iter()
            .find(|z| z.id == zone_id)
            .ok_or_else(|| AppError::NotFound(format!("hosted zone `{zone_id}`")))?;
        zone.managed = self.is_managed(&zone.id).await;
        Ok(zone)
    }

    /// Like [`DnsService::zone`] but fails for zones this tool did not create.
    pub async fn managed_zone(&self, zone_id: &str) -> AppResult<HostedZone> {
        let zone = self.zone(zone_id).await?;
        if !zone.managed {
            return Err(AppError::NotManaged(format!("hosted zone `{}` ({})", zone.domain(), zone.id)));
        }
        Ok(zone)
    }

    /// Create a public hosted zone and tag it.
    pub async fn create_zone(&self, domain: &str) -> AppResult<NewZone> {
        let domain = normalize_domain(domain)?;
        let existing = self.backend.list_zones().await?;
        if existing.iter().any(|z| same_name(&z.name, &domain)) {
            return Err(AppError::AlreadyExists(format!("hosted zone `{domain}`")));
        }

        let caller_reference = Uuid::new_v4().to_string();
        let mut created = self
            .backend
            .create_zone(&domain, &caller_reference, ZONE_COMMENT)
            .await?;
        let tags = [(CREATED_BY_TAG.to_string(), self.owner.clone())];
        if let Err(err) = self.backend.tag_zone(&created.zone.id, &tags).await {
            // An untagged zone could never be changed or removed by this tool.
            warn!(zone_id = %created.zone.id, error = %err, "tagging failed, removing the new zone");
            if let Err(cleanup) = self.backend.delete_zone(&created.zone.id).await {
                warn!(zone_id = %created.zone.id, error = %cleanup, "could not remove the untagged zone");
            }
            return Err(err);
        }
        created.zone.managed = true;
        info!(zone_id = %created.zone.id, domain = %domain, "created hosted zone");
        Ok(created)
    }

    /// Records of a zone, in the order Route 53 returns them.
    pub async fn records(&self, zone_id: &str) -> AppResult<Vec<DnsRecord>> {
        self.backend.list_records(bare_zone_id(zone_id.trim())).await
    }

    /// Records that must go before the zone can be deleted.
    pub async fn zone_blockers(&self, zone: &HostedZone) -> AppResult<Vec<DnsRecord>> {
        let mut records = self.records(&zone.id).await?;
        records.retain(|r| !r.is_zone_default(&zone.name));
        Ok(records)
    }

    /// Delete a managed zone. With `purge`, its non-default records are
    /// removed first in one batch; otherwise they make the call fail.
    pub async fn delete_zone(&self, zone_id: &str, purge: bool) -> AppResult<()> {
        let zone = self.managed_zone(zone_id).await?;
        let blockers = self.zone_blockers(&zone).await?;
        if !blockers.is_empty() {
            if !purge {
                return Err(AppError::ZoneNotEmpty {
                    zone: zone.domain().to_string(),
                    records: blockers.len(),
                });
            }
            let changes: Vec<RecordChange> = blockers
                .into_iter()
                .map(|record| RecordChange {
                    action: ChangeAction::Delete,
                    record,
                })
                .collect();
            self.backend.change_records(&zone.id, &changes).await?;
            info!(zone_id = %zone.id, "deleted {} record(s)", changes.len());
        }
        self.backend.delete_zone(&zone.id).await?;
        info!(zone_id = %zone.id, "deleted hosted zone");
        Ok(())
    }

    /// Every record set with this name and type; more than one when they
    /// differ by set identifier.
    pub async fn find_records(
        &self,
        zone: &HostedZone,
        name: &str,
        record_type: RecordType,
    ) -> AppResult<Vec<DnsRecord>> {
        let name = normalize_record_name(name, &zone.name)?;
        let mut records = self.records(&zone.id).await?;
        records.retain(|r| r.record_type == record_type && same_name(&r.name, &name));
        Ok(records)
    }

    fn check_ttl(ttl: i64) -> AppResult<i64> {
        if !(0..=2_147_483_647).contains(&ttl) {
            return Err(AppError::invalid(format!("TTL {ttl} is out of range")));
        }
        Ok(ttl)
    }

    /// Create a record in a managed zone.
    pub async fn create_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
        value: &str,
        ttl: Option<i64>,
    ) -> AppResult<DnsRecord> {
        let zone = self.managed_zone(zone_id).await?;
        let value = normalize_value(record_type, value)?;
        let ttl = Self::check_ttl(ttl.unwrap_or(self.default_ttl))?;
        if let Some(existing) = self.find_records(&zone, name, record_type).await?.first() {
            return Err(AppError::AlreadyExists(format!(
                "{} record `{}`",
                record_type, existing.name
            )));
        }

        let record = DnsRecord::simple(
            normalize_record_name(name, &zone.name)?,
            record_type,
            Some(ttl),
            vec![value],
        );
        self.backend
            .change_records(
                &zone.id,
                &[RecordChange {
                    action: ChangeAction::Create,
                    record: record.clone(),
                }],
            )
            .await?;
        info!(zone_id = %zone.id, name = %record.name, "created {} record", record_type);
        Ok(record)
    }

    /// Replace the values and/or TTL of an existing record set in a managed
    /// zone. Name, set identifier and routing stay as they are.
    pub async fn update_record(
        &self,
        zone_id: &str,
        target: &DnsRecord,
        values: Option<&[String]>,
        ttl: Option<i64>,
    ) -> AppResult<DnsRecord> {
        let zone = self.managed_zone(zone_id).await?;
        let current = self
            .records(&zone.id)
            .await?
            .into_iter()
            .find(|r| r.same_set(target))
            .ok_or_else(|| AppError::NotFound(format!("{} record `{}`", target.record_type, target.name)))?;
        if current.alias.is_some() {
            return Err(AppError::invalid(format!(
                "`{}` is an alias record; change it in the Route 53 console",
                current.name
            )));
        }
        if current.is_zone_default(&zone.name) {
            return Err(AppError::invalid(format!(
                "the {} record at the zone apex belongs to the zone and cannot be changed",
                current.record_type
            )));
        }

        let values = match values {
            Some([]) => return Err(AppError::invalid("record value cannot be empty")),
            Some(values) => values
                .iter()
                .map(|value| normalize_value(current.record_type, value))
                .collect::<AppResult<Vec<_>>>()?,
            None => current.values.clone(),
        };
        let ttl = match ttl {
            Some(ttl) => Some(Self::check_ttl(ttl)?),
            None => current.ttl,
        };
        let record = DnsRecord {
            values,
            ttl,
            ..current
        };
        self.backend
            .change_records(
                &zone.id,
                &[RecordChange {
                    action: ChangeAction::Upsert,
                    record: record.clone(),
                }],
            )
            .await?;
        info!(zone_id = %zone.id, name = %record.name, "updated {} record", record.record_type);
        Ok(record)
    }

    /// Delete exactly this record set from a managed zone.
    pub async fn delete_record(&self, zone_id: &str, record: &DnsRecord) -> AppResult<()> {
        let zone = self.managed_zone(zone_id).await?;
        if record.is_zone_default(&zone.name) {
            return Err(AppError::invalid(format!(
                "the {} record at the zone apex belongs to the zone and cannot be deleted",
                record.record_type
            )));
        }
        self.backend
            .change_records(
                &zone.id,
                &[RecordChange {
                    action: ChangeAction::Delete,
                    record: record.clone(),
                }],
            )
            .await?;
        info!(zone_id = %zone.id, name = %record.name, "deleted {} record", record.record_type);
        Ok(())
    }
}
