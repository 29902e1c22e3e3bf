//! Listing output: tables for people, JSON with `--json`.

use crate::{
    errors::AppResult,
    models::{
        bucket::Bucket,
        dns::{DnsRecord, HostedZone},
        instance::{Instance, InstanceState},
    },
};
use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde::Serialize;

/// Print `items` as pretty JSON or as the table built by `table`.
pub fn print_list<T: Serialize>(json: bool, items: &[T], table: fn(&[T]) -> Table) -> AppResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
    } else {
        println!("{}", table(items));
    }
    Ok(())
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

fn state_color(state: &InstanceState) -> Color {
    match state {
        InstanceState::Running => Color::Green,
        InstanceState::Pending | InstanceState::Stopping => Color::Yellow,
        InstanceState::Stopped => Color::DarkGrey,
        InstanceState::ShuttingDown | InstanceState::Terminated => Color::Red,
        InstanceState::Other(_) => Color::White,
    }
}

fn managed_cell(managed: bool) -> Cell {
    if managed {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no").fg(Color::DarkGrey)
    }
}

pub fn instance_table(instances: &[Instance]) -> Table {
    let mut table = new_table(&["Instance ID", "Name", "State", "Type", "Public IP", "Private IP", "Launched"]);
    for instance in instances {
        table.add_row(vec![
            Cell::new(&instance.id),
            Cell::new(instance.display_name()),
            Cell::new(instance.state.as_str()).fg(state_color(&instance.state)),
            Cell::new(&instance.instance_type),
            Cell::new(instance.public_ip.as_deref().unwrap_or("N/A")),
            Cell::new(instance.private_ip.as_deref().unwrap_or("N/A")),
            Cell::new(
                instance
                    .launch_time
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default(),
            ),
        ]);
    }
    table
}

pub fn bucket_table(buckets: &[Bucket]) -> Table {
    let mut table = new_table(&["Bucket", "Created", "Managed"]);
    for bucket in buckets {
        table.add_row(vec![
            Cell::new(&bucket.name),
            Cell::new(
                bucket
                    .created_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default(),
            ),
            managed_cell(bucket.managed),
        ]);
    }
    table
}

pub fn zone_table(zones: &[HostedZone]) -> Table {
    let mut table = new_table(&["Zone ID", "Name", "Records", "Private", "Managed"]);
    for zone in zones {
        table.add_row(vec![
            Cell::new(&zone.id),
            Cell::new(zone.domain()),
            Cell::new(zone.record_count.map(|c| c.to_string()).unwrap_or_default()),
            Cell::new(if zone.private_zone { "yes" } else { "no" }),
            managed_cell(zone.managed),
        ]);
    }
    table
}

pub fn record_table(records: &[DnsRecord]) -> Table {
    let mut table = new_table(&["Name", "Type", "Set ID", "TTL", "Value"]);
    for record in records {
        table.add_row(vec![
            Cell::new(&record.name),
            Cell::new(record.record_type.as_str()),
            Cell::new(record.set_identifier.as_deref().unwrap_or("-")),
            Cell::new(record.ttl.map(|t| t.to_string()).unwrap_or_else(|| "-".into())),
            Cell::new(record.value_summary()),
        ]);
    }
    table
}
