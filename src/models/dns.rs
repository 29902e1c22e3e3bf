//! Route 53 hosted zones and record sets.

use crate::errors::{AppError, AppResult};
use serde::Serialize;
use std::fmt;

/// Top-level domains offered when a bare name is typed interactively.
pub const SUGGESTED_TLDS: [&str; 8] = [
    ".com", ".net", ".org", ".info", ".io", ".co", ".tech", ".ai",
];

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct HostedZone {
    /// Bare zone id, without the `/hostedzone/` prefix.
    pub id: String,

    /// Fully qualified name with the trailing dot, as Route 53 returns it.
    pub name: String,

    pub record_count: Option<i64>,

    pub private_zone: bool,

    /// Whether the zone carries this tool's `CreatedBy` tag.
    pub managed: bool,
}

impl HostedZone {
    /// Zone name without the trailing dot.
    pub fn domain(&self) -> &str {
        self.name.trim_end_matches('.')
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Caa,
    Cname,
    Ds,
    Https,
    Mx,
    Naptr,
    Ns,
    Ptr,
    Soa,
    Spf,
    Srv,
    Sshfp,
    Svcb,
    Tlsa,
    Txt,
}

impl RecordType {
    pub const ALL: [RecordType; 17] = [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Caa,
        RecordType::Cname,
        RecordType::Ds,
        RecordType::Https,
        RecordType::Mx,
        RecordType::Naptr,
        RecordType::Ns,
        RecordType::Ptr,
        RecordType::Soa,
        RecordType::Spf,
        RecordType::Srv,
        RecordType::Sshfp,
        RecordType::Svcb,
        RecordType::Tlsa,
        RecordType::Txt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Caa => "CAA",
            RecordType::Cname => "CNAME",
            RecordType::Ds => "DS",
            RecordType::Https => "HTTPS",
            RecordType::Mx => "MX",
            RecordType::Naptr => "NAPTR",
            RecordType::Ns => "NS",
            RecordType::Ptr => "PTR",
            RecordType::Soa => "SOA",
            RecordType::Spf => "SPF",
            RecordType::Srv => "SRV",
            RecordType::Sshfp => "SSHFP",
            RecordType::Svcb => "SVCB",
            RecordType::Tlsa => "TLSA",
            RecordType::Txt => "TXT",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        let upper = value.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| {
                AppError::invalid(format!(
                    "unsupported record type `{value}`; supported: {}",
                    Self::ALL.map(RecordType::as_str).join(", ")
                ))
            })
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct AliasTarget {
    pub dns_name: String,
    pub hosted_zone_id: String,
    pub evaluate_target_health: bool,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct GeoLocation {
    pub continent_code: Option<String>,
    pub country_code: Option<String>,
    pub subdivision_code: Option<String>,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct GeoProximity {
    pub aws_region: Option<String>,
    pub local_zone_group: Option<String>,
    /// (latitude, longitude) as Route 53 writes them.
    pub coordinates: Option<(String, String)>,
    pub bias: Option<i32>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CidrLocation {
    pub collection_id: String,
    pub location_name: String,
}

/// Routing settings of weighted, latency, failover, geo and multivalue sets.
///
/// A DELETE must repeat them exactly, so they are kept as Route 53 returned them.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct RecordRouting {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<GeoLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_proximity: Option<GeoProximity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_location: Option<CidrLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_value_answer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_policy_instance_id: Option<String>,
}

impl RecordRouting {
    pub fn is_simple(&self) -> bool {
        *self == RecordRouting::default()
    }
}

/// One resource record set. Route 53 returns names fully qualified with a trailing dot.
///
/// Several sets can share a name and type when they carry different
/// `set_identifier`s (weighted, latency and similar routing).
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: RecordType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_identifier: Option<String>,
    pub ttl: Option<i64>,
    pub values: Vec<String>,
    pub alias: Option<AliasTarget>,
    #[serde(skip_serializing_if = "RecordRouting::is_simple")]
    pub routing: RecordRouting,
}

impl DnsRecord {
    /// A plain record set with simple routing.
    pub fn simple(name: impl Into<String>, record_type: RecordType, ttl: Option<i64>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            record_type,
            set_identifier: None,
            ttl,
            values,
            alias: None,
            routing: RecordRouting::default(),
        }
    }

    /// Whether both describe the same record set: name, type and set identifier.
    pub fn same_set(&self, other: &DnsRecord) -> bool {
        self.record_type == other.record_type
            && same_name(&self.name, &other.name)
            && self.set_identifier == other.set_identifier
    }

    /// The NS and SOA sets at the zone apex belong to the zone and cannot be deleted.
    pub fn is_zone_default(&self, zone_name: &str) -> bool {
        matches!(self.record_type, RecordType::Ns | RecordType::Soa)
            && same_name(&self.name, zone_name)
    }

    /// Values joined for display, or the alias target.
    pub fn value_summary(&self) -> String {
        match &self.alias {
            Some(alias) => format!("ALIAS {}", alias.dns_name),
            None => self.values.join(", "),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Upsert,
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordChange {
    pub action: ChangeAction,
    pub record: DnsRecord,
}

/// Strip the `/hostedzone/` prefix Route 53 puts on zone ids.
pub fn bare_zone_id(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

/// Compare DNS names ignoring case and the trailing dot.
pub fn same_name(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}

/// Validate a domain name for a new hosted zone and return it lowercased,
/// without a trailing dot.
pub fn normalize_domain(input: &str) -> AppResult<String> {
    let domain = input.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return Err(AppError::invalid("domain name cannot be empty"));
    }
    if domain.len() > 253 {
        return Err(AppError::invalid("domain name is longer than 253 characters"));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(AppError::invalid(format!(
            "`{domain}` needs a top-level domain, e.g. {domain}.com"
        )));
    }
    for label in &labels {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(AppError::invalid(format!(
                "`{label}` is not a valid label in `{domain}`"
            )));
        }
    }
    Ok(domain)
}

/// Resolve a user-typed record name against the zone.
///
/// Empty or `@` means the zone apex, a name without dots is a subdomain of
/// the zone, and a qualified name must end with the zone name.
pub fn normalize_record_name(input: &str, zone_name: &str) -> AppResult<String> {
    let zone = zone_name.trim_end_matches('.').to_ascii_lowercase();
    let name = input.trim().trim_end_matches('.').to_ascii_lowercase();

    if name.is_empty() || name == "@" {
        return Ok(format!("{zone}."));
    }
    if name == zone || name.ends_with(&format!(".{zone}")) {
        return Ok(format!("{name}."));
    }
    if !name.contains('.') {
        return Ok(format!("{name}.{zone}."));
    }
    Err(AppError::invalid(format!(
        "record name `{input}` must be within `{zone}`"
    )))
}

/// Split a comma-separated list of record values. Commas inside double
/// quotes belong to the value.
pub fn split_values(input: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in input.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => values.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    values.push(current);
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Prepare a record value; TXT values are wrapped in double quotes when needed.
pub fn normalize_value(record_type: RecordType, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::invalid("record value cannot be empty"));
    }
    let quoted = value.len() >= 2 && value.starts_with('"') && value.ends_with('"');
    if record_type == RecordType::Txt && !quoted {
        return Ok(format!("\"{value}\""));
    }
    Ok(value.to_string())
}
