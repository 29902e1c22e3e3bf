//! Route 53 commands: hosted zones and the records inside them.

use crate::{
    context::AppContext,
    errors::{AppError, AppResult},
    handlers::{cancelled, flag_or_prompt, pick, tables},
    models::dns::{DnsRecord, HostedZone, RecordType, SUGGESTED_TLDS, split_values},
    prompt::required_input,
};
use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum Route53Command {
    /// Create a hosted zone (--domain-name) or a record in a zone (--zone-id)
    Create(RecordArgs),
    /// Change the value or TTL of a record
    Update(RecordArgs),
    /// Delete a record, or the whole zone when no record is given
    Delete(RecordArgs),
    /// List hosted zones, or the records of one zone
    List(ListArgs),
}

#[derive(Args, Debug, Default)]
pub struct RecordArgs {
    /// Domain of a new hosted zone, e.g. example.com
    #[arg(long)]
    pub domain_name: Option<String>,

    /// Hosted zone id, with or without the /hostedzone/ prefix
    #[arg(long)]
    pub zone_id: Option<String>,

    /// Record name; `@` or empty for the zone apex, a bare label for a subdomain
    #[arg(long)]
    pub record_name: Option<String>,

    /// A, AAAA, CNAME, MX, TXT, ...
    #[arg(long)]
    pub record_type: Option<String>,

    #[arg(long)]
    pub record_value: Option<String>,

    /// TTL in seconds
    #[arg(long)]
    pub ttl: Option<i64>,
}

impl RecordArgs {
    fn names_record(&self) -> bool {
        self.record_name.is_some() || self.record_type.is_some() || self.record_value.is_some()
    }
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// List the records of this zone instead of the zones
    #[arg(long)]
    pub zone_id: Option<String>,
}

pub async fn run(ctx: &AppContext, command: Route53Command) -> AppResult<()> {
    match command {
        Route53Command::Create(args) => create(ctx, args).await,
        Route53Command::Update(args) => update(ctx, args).await,
        Route53Command::Delete(args) => delete(ctx, args).await,
        Route53Command::List(args) => list(ctx, args).await,
    }
}

fn zone_label(zone: &HostedZone) -> String {
    format!("{} (ID: {})", zone.domain(), zone.id)
}

fn record_label(record: &DnsRecord) -> String {
    let set = match &record.set_identifier {
        Some(id) => format!(" [{id}]"),
        None => String::new(),
    };
    format!(
        "{} ({}){} - {} - TTL {}",
        record.name,
        record.record_type,
        set,
        record.value_summary(),
        record.ttl.map(|t| t.to_string()).unwrap_or_else(|| "-".into())
    )
}

/// Zone from the flag, or picked among the zones this tool created.
async fn choose_zone(ctx: &AppContext, flag: Option<String>) -> AppResult<Option<HostedZone>> {
    if let Some(zone_id) = flag.map(|z| z.trim().to_string()).filter(|z| !z.is_empty()) {
        return ctx.dns.managed_zone(&zone_id).await.map(Some);
    }
    let zones = ctx.dns.managed_zones().await?;
    if zones.is_empty() {
        println!("No hosted zones created by this tool were found.");
        return Ok(None);
    }
    Ok(pick(ctx.prompter(), "Hosted zone", &zones, zone_label)?.cloned())
}

fn choose_type(ctx: &AppContext, flag: Option<String>) -> AppResult<Option<RecordType>> {
    match flag {
        Some(value) => RecordType::parse(&value).map(Some),
        None => Ok(pick(ctx.prompter(), "Record type", &RecordType::ALL, |t| t.to_string())?.copied()),
    }
}

fn parse_ttl(value: &str) -> AppResult<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| AppError::invalid(format!("`{value}` is not a TTL in seconds")))
}

/// Ask for a domain; a bare name gets a TLD picked from a short list.
fn prompt_domain(ctx: &AppContext) -> AppResult<Option<String>> {
    let prompter = ctx.prompter();
    let Some(name) = required_input(prompter, "Domain name (without TLD is fine)")? else {
        return Ok(None);
    };
    if name.contains('.') {
        return Ok(Some(name));
    }
    let Some(tld) = pick(prompter, "Top-level domain", &SUGGESTED_TLDS, |t| t.to_string())? else {
        return Ok(None);
    };
    let domain = format!("{name}{tld}");
    println!("Selected domain: {domain}");
    Ok(Some(domain))
}

async fn create(ctx: &AppContext, args: RecordArgs) -> AppResult<()> {
    let wants_zone = match (&args.domain_name, &args.zone_id) {
        (_, Some(_)) => false,
        (Some(_), None) => !args.names_record(),
        (None, None) if args.names_record() => false,
        (None, None) => {
            let options = ["Hosted zone".to_string(), "Record in an existing zone".to_string()];
            match ctx.prompter().select("Create", &options)? {
                Some(choice) => choice == 0,
                None => return Ok(()),
            }
        }
    };
    if wants_zone {
        create_zone(ctx, args.domain_name).await
    } else {
        create_record(ctx, args).await
    }
}

pub(crate) async fn create_zone(ctx: &AppContext, domain: Option<String>) -> AppResult<()> {
    let domain = match domain {
        Some(domain) => domain,
        None => match prompt_domain(ctx)? {
            Some(domain) => domain,
            None => {
                cancelled("Zone creation");
                return Ok(());
            }
        },
    };

    let created = ctx.dns.create_zone(&domain).await?;
    println!(
        "Hosted zone '{}' created with ID {}.",
        created.zone.domain(),
        created.zone.id
    );
    if !created.name_servers.is_empty() {
        println!("Point the domain's registrar at these name servers:");
        for ns in &created.name_servers {
            println!("  {ns}");
        }
    }
    Ok(())
}

pub(crate) async fn create_record(ctx: &AppContext, args: RecordArgs) -> AppResult<()> {
    let prompter = ctx.prompter();
    let Some(zone) = choose_zone(ctx, args.zone_id).await? else {
        return Ok(());
    };
    let interactive = args.record_value.is_none();

    let name = match args.record_name {
        Some(name) => name,
        None => prompter.input(
            &format!("Record name (subdomain of {}, empty for the apex)", zone.domain()),
            None,
        )?,
    };
    let Some(record_type) = choose_type(ctx, args.record_type)? else {
        cancelled("Record creation");
        return Ok(());
    };
    let Some(value) = flag_or_prompt(prompter, args.record_value, "Record value")? else {
        cancelled("Record creation");
        return Ok(());
    };
    let ttl = match args.ttl {
        Some(ttl) => Some(ttl),
        None if interactive => {
            let default = ctx.dns.default_ttl().to_string();
            Some(parse_ttl(&prompter.input("TTL in seconds", Some(&default))?)?)
        }
        None => None,
    };

    let record = ctx
        .dns
        .create_record(&zone.id, &name, record_type, &value, ttl)
        .await?;
    println!(
        "Record '{}' ({}) created in zone {}.",
        record.name,
        record.record_type,
        zone.domain()
    );
    Ok(())
}

/// Record named by the flags, or picked from the zone's records.
async fn choose_record(
    ctx: &AppContext,
    zone: &HostedZone,
    name: Option<String>,
    record_type: Option<String>,
    editable: impl Fn(&DnsRecord) -> bool,
) -> AppResult<Option<DnsRecord>> {
    if name.is_some() || record_type.is_some() {
        let name = name.unwrap_or_default();
        let Some(record_type) = choose_type(ctx, record_type)? else {
            return Ok(None);
        };
        let mut sets = ctx.dns.find_records(zone, &name, record_type).await?;
        sets.retain(|r| editable(r));
        return match sets.len() {
            0 => Err(AppError::NotFound(format!(
                "{record_type} record `{}` in {}",
                if name.is_empty() { "@" } else { name.as_str() },
                zone.domain()
            ))),
            1 => Ok(sets.pop()),
            n => {
                println!("{n} record sets share that name and type.");
                Ok(pick(ctx.prompter(), "Record set", &sets, record_label)?.cloned())
            }
        };
    }

    let mut records = ctx.dns.records(&zone.id).await?;
    records.retain(|r| editable(r));
    if records.is_empty() {
        println!("No records to choose from in {}.", zone.domain());
        return Ok(None);
    }
    Ok(pick(ctx.prompter(), "Record", &records, record_label)?.cloned())
}

async fn update(ctx: &AppContext, args: RecordArgs) -> AppResult<()> {
    let prompter = ctx.prompter();
    let Some(zone) = choose_zone(ctx, args.zone_id).await? else {
        return Ok(());
    };
    let zone_name = zone.name.clone();
    let Some(record) = choose_record(ctx, &zone, args.record_name, args.record_type, |r| {
        r.alias.is_none() && !r.is_zone_default(&zone_name)
    })
    .await?
    else {
        cancelled("Record update");
        return Ok(());
    };

    let (values, ttl) = if args.record_value.is_none() && args.ttl.is_none() {
        let current = record.values.join(", ");
        let answer = prompter.input("New value(s), comma separated (q to cancel)", Some(&current))?;
        if answer.eq_ignore_ascii_case("q") {
            cancelled("Record update");
            return Ok(());
        }
        let answered = split_values(&answer);
        let values = (answered != record.values).then_some(answered);

        let current_ttl = record.ttl.unwrap_or(ctx.dns.default_ttl()).to_string();
        let answer = prompter.input("TTL in seconds (q to cancel)", Some(&current_ttl))?;
        if answer.eq_ignore_ascii_case("q") {
            cancelled("Record update");
            return Ok(());
        }
        let ttl = (answer.trim() != current_ttl).then(|| parse_ttl(&answer)).transpose()?;
        (values, ttl)
    } else {
        (args.record_value.map(|v| vec![v]), args.ttl)
    };
    if values.is_none() && ttl.is_none() {
        println!("Nothing to change.");
        return Ok(());
    }

    let updated = ctx
        .dns
        .update_record(&zone.id, &record, values.as_deref(), ttl)
        .await?;
    println!(
        "Record '{}' ({}) updated: {} (TTL {}).",
        updated.name,
        updated.record_type,
        updated.value_summary(),
        updated.ttl.map(|t| t.to_string()).unwrap_or_else(|| "-".into())
    );
    Ok(())
}

async fn delete(ctx: &AppContext, args: RecordArgs) -> AppResult<()> {
    let prompter = ctx.prompter();
    let delete_record = if args.record_name.is_some() || args.record_type.is_some() {
        true
    } else if args.zone_id.is_some() {
        false
    } else {
        let options = ["A record".to_string(), "A whole hosted zone".to_string()];
        match prompter.select("Delete", &options)? {
            Some(choice) => choice == 0,
            None => return Ok(()),
        }
    };

    let Some(zone) = choose_zone(ctx, args.zone_id).await? else {
        return Ok(());
    };

    if delete_record {
        let zone_name = zone.name.clone();
        let Some(record) = choose_record(ctx, &zone, args.record_name, args.record_type, |r| {
            !r.is_zone_default(&zone_name)
        })
        .await?
        else {
            cancelled("Record deletion");
            return Ok(());
        };
        if !prompter.confirm(&format!(
            "Are you sure you want to delete {} record '{}'?",
            record.record_type, record.name
        ))? {
            cancelled("Record deletion");
            return Ok(());
        }
        ctx.dns.delete_record(&zone.id, &record).await?;
        println!("Deleted record: {} ({}).", record.name, record.record_type);
        return Ok(());
    }

    let blockers = ctx.dns.zone_blockers(&zone).await?;
    if !blockers.is_empty() {
        println!(
            "Hosted zone '{}' holds records that must be deleted before the zone:",
            zone.domain()
        );
        for record in &blockers {
            println!("- {}", record_label(record));
        }
        if !prompter.confirm("Delete all of these records?")? {
            println!("Zone deletion cancelled. Delete the records manually before retrying.");
            return Ok(());
        }
    }
    if !prompter.confirm(&format!(
        "Are you sure you want to delete hosted zone '{}'?",
        zone.domain()
    ))? {
        cancelled("Zone deletion");
        return Ok(());
    }

    ctx.dns.delete_zone(&zone.id, !blockers.is_empty()).await?;
    println!("Hosted zone '{}' has been deleted.", zone.domain());
    Ok(())
}

async fn list(ctx: &AppContext, args: ListArgs) -> AppResult<()> {
    let json = ctx.config.json;
    match args.zone_id {
        Some(zone_id) => {
            let zone = ctx.dns.zone(&zone_id).await?;
            let records = ctx.dns.records(&zone.id).await?;
            if !json {
                println!("Records of {} ({}):", zone.domain(), zone.id);
            }
            tables::print_list(json, &records, tables::record_table)
        }
        None => {
            let zones = ctx.dns.list_zones().await?;
            if zones.is_empty() && !json {
                println!("No hosted zones found.");
                return Ok(());
            }
            tables::print_list(json, &zones, tables::zone_table)
        }
    }
}
