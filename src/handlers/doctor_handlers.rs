//! `doctor`: show which AWS identity and region the tool is using.

use crate::{
    context::AppContext, errors::AppResult, services::identity_service::CallerIdentity,
};
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Serialize, Debug, PartialEq)]
struct DoctorReport<'a> {
    account: &'a str,
    arn: &'a str,
    user_id: &'a str,
    region: Option<&'a str>,
    profile: Option<&'a str>,
    owner: &'a str,
    max_running_instances: usize,
}

fn build_report<'a>(ctx: &'a AppContext, identity: &'a CallerIdentity) -> DoctorReport<'a> {
    DoctorReport {
        account: &identity.account,
        arn: &identity.arn,
        user_id: &identity.user_id,
        region: ctx.region.as_deref(),
        profile: ctx.config.profile.as_deref(),
        owner: &ctx.config.owner,
        max_running_instances: ctx.config.max_running_instances,
    }
}

fn render_text(report: &DoctorReport<'_>) -> String {
    let mut out = String::from("Credentials OK\n");
    let _ = writeln!(out, "  Account:  {}", report.account);
    let _ = writeln!(out, "  Identity: {}", report.arn);
    let _ = writeln!(
        out,
        "  Region:   {}",
        report.region.unwrap_or("not set (configure one with --region or the AWS profile)")
    );
    let _ = writeln!(out, "  Profile:  {}", report.profile.unwrap_or("default chain"));
    let _ = writeln!(out, "  Owner tag: CreatedBy={}", report.owner);
    match report.max_running_instances {
        0 => out.push_str("  Running-instance limit: none"),
        limit => {
            let _ = write!(out, "  Running-instance limit: {limit}");
        }
    }
    out
}

pub async fn run(ctx: &AppContext) -> AppResult<()> {
    let identity = ctx.identity.caller_identity().await?;
    let report = build_report(ctx, &identity);

    if ctx.config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_text(&report));
    }
    Ok(())
}
