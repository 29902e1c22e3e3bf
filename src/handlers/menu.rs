//! Interactive menu, shown when the tool runs without a subcommand.
//!
//! Every entry runs the same handler as the matching flag command with no
//! flags set, so the handler prompts for everything. Errors are printed and
//! the menu keeps going.

use crate::{
    context::AppContext,
    errors::AppResult,
    handlers::{
        doctor_handlers,
        ec2_handlers::{self, Ec2Command},
        route53_handlers::{self, ListArgs, RecordArgs, Route53Command},
        s3_handlers::{self, S3Command},
    },
};
use tracing::debug;

#[derive(Clone, Copy)]
enum Area {
    Ec2,
    S3,
    Route53,
    Doctor,
    Exit,
}

static AREAS: [(&str, Area); 5] = [
    ("Manage EC2 instances", Area::Ec2),
    ("Manage S3 buckets", Area::S3),
    ("Manage Route 53 DNS", Area::Route53),
    ("Check AWS credentials", Area::Doctor),
    ("Exit", Area::Exit),
];

const BACK: &str = "Back";

fn choose<T: Copy>(ctx: &AppContext, prompt: &str, entries: &[(&str, T)]) -> AppResult<Option<T>> {
    let labels: Vec<String> = entries.iter().map(|(label, _)| label.to_string()).collect();
    Ok(ctx
        .prompter()
        .select(prompt, &labels)?
        .and_then(|i| entries.get(i))
        .map(|(_, value)| *value))
}

fn report(result: AppResult<()>) {
    if let Err(err) = result {
        debug!(error = ?err, code = ?err.aws_code(), "menu action failed");
        eprintln!("Error: {err}");
    }
}

pub async fn run(ctx: &AppContext) -> AppResult<()> {
    println!();
    println!("AWS Resource Management CLI");
    loop {
        let result = match choose(ctx, "What do you want to manage?", &AREAS)? {
            Some(Area::Ec2) => ec2_menu(ctx).await,
            Some(Area::S3) => s3_menu(ctx).await,
            Some(Area::Route53) => route53_menu(ctx).await,
            Some(Area::Doctor) => doctor_handlers::run(ctx).await,
            Some(Area::Exit) | None => break,
        };
        report(result);
    }
    println!("Goodbye!");
    Ok(())
}

#[derive(Clone, Copy)]
enum Ec2Entry {
    List,
    Create,
    Start,
    Stop,
    Delete,
    Back,
}

async fn ec2_menu(ctx: &AppContext) -> AppResult<()> {
    let entries = [
        ("List instances created by this tool", Ec2Entry::List),
        ("Create an instance", Ec2Entry::Create),
        ("Start an instance", Ec2Entry::Start),
        ("Stop an instance", Ec2Entry::Stop),
        ("Terminate an instance", Ec2Entry::Delete),
        (BACK, Ec2Entry::Back),
    ];
    loop {
        let command = match choose(ctx, "EC2", &entries)? {
            Some(Ec2Entry::List) => Ec2Command::List,
            Some(Ec2Entry::Create) => Ec2Command::Create(Default::default()),
            Some(Ec2Entry::Start) => Ec2Command::Start(Default::default()),
            Some(Ec2Entry::Stop) => Ec2Command::Stop(Default::default()),
            Some(Ec2Entry::Delete) => Ec2Command::Delete(Default::default()),
            Some(Ec2Entry::Back) | None => return Ok(()),
        };
        report(ec2_handlers::run(ctx, command).await);
    }
}

#[derive(Clone, Copy)]
enum S3Entry {
    List,
    Create,
    Upload,
    Delete,
    Back,
}

async fn s3_menu(ctx: &AppContext) -> AppResult<()> {
    let entries = [
        ("List buckets", S3Entry::List),
        ("Create a bucket", S3Entry::Create),
        ("Upload a file", S3Entry::Upload),
        ("Delete a bucket", S3Entry::Delete),
        (BACK, S3Entry::Back),
    ];
    loop {
        let command = match choose(ctx, "S3", &entries)? {
            Some(S3Entry::List) => S3Command::List,
            Some(S3Entry::Create) => S3Command::Create(Default::default()),
            Some(S3Entry::Upload) => S3Command::Upload(Default::default()),
            Some(S3Entry::Delete) => S3Command::Delete(Default::default()),
            Some(S3Entry::Back) | None => return Ok(()),
        };
        report(s3_handlers::run(ctx, command).await);
    }
}

#[derive(Clone, Copy)]
enum DnsEntry {
    ListZones,
    ListRecords,
    CreateZone,
    CreateRecord,
    UpdateRecord,
    Delete,
    Back,
}

async fn route53_menu(ctx: &AppContext) -> AppResult<()> {
    let entries = [
        ("List hosted zones", DnsEntry::ListZones),
        ("List records of a zone", DnsEntry::ListRecords),
        ("Create a hosted zone", DnsEntry::CreateZone),
        ("Create a record", DnsEntry::CreateRecord),
        ("Update a record", DnsEntry::UpdateRecord),
        ("Delete a record or a zone", DnsEntry::Delete),
        (BACK, DnsEntry::Back),
    ];
    loop {
        let command = match choose(ctx, "Route 53", &entries)? {
            Some(DnsEntry::ListZones) => Route53Command::List(ListArgs::default()),
            Some(DnsEntry::ListRecords) => {
                let zones = ctx.dns.list_zones().await?;
                let labels: Vec<String> = zones
                    .iter()
                    .map(|z| format!("{} (ID: {})", z.domain(), z.id))
                    .collect();
                match ctx.prompter().select("Hosted zone", &labels)? {
                    Some(i) => Route53Command::List(ListArgs {
                        zone_id: zones.get(i).map(|z| z.id.clone()),
                    }),
                    None => continue,
                }
            }
            Some(DnsEntry::CreateZone) => {
                report(route53_handlers::create_zone(ctx, None).await);
                continue;
            }
            Some(DnsEntry::CreateRecord) => {
                report(route53_handlers::create_record(ctx, RecordArgs::default()).await);
                continue;
            }
            Some(DnsEntry::UpdateRecord) => Route53Command::Update(RecordArgs::default()),
            Some(DnsEntry::Delete) => Route53Command::Delete(RecordArgs::default()),
            Some(DnsEntry::Back) | None => return Ok(()),
        };
        report(route53_handlers::run(ctx, command).await);
    }
}
