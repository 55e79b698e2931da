use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use netmount_core::{MountStatus, ShareView};
use netmount_mount::{BulkReport, ConnectionReport};
use serde::Serialize;

/// Create a styled table for output
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status_cell(status: MountStatus) -> Cell {
    match status {
        MountStatus::Mounted => Cell::new("mounted").fg(Color::Green),
        MountStatus::Unmounted => Cell::new("unmounted"),
    }
}

fn optional(value: Option<impl ToString>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Table of shares, one row each.
pub fn shares_table(shares: &[ShareView]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["ID", "Name", "Type", "Source", "Mount point", "Status"]);
    for share in shares {
        table.add_row(vec![
            Cell::new(&share.id),
            Cell::new(&share.name),
            Cell::new(share.share_type),
            Cell::new(format!("{}:{}", share.server, share.share)),
            Cell::new(share.mount_point.display()),
            status_cell(share.status),
        ]);
    }
    table
}

/// Two-column detail table for a single share.
pub fn share_detail(share: &ShareView) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Field", "Value"]);
    let rows: [(&str, String); 13] = [
        ("id", share.id.clone()),
        ("name", share.name.clone()),
        ("type", share.share_type.to_string()),
        ("server", share.server.clone()),
        ("share", share.share.clone()),
        ("username", optional(share.username.as_deref())),
        ("password", share.password.clone()),
        ("domain", optional(share.domain.as_deref())),
        ("version", optional(share.version)),
        ("uid", optional(share.uid)),
        ("gid", optional(share.gid)),
        ("auto_mount", share.auto_mount.to_string()),
        ("mount_point", share.mount_point.display().to_string()),
    ];
    for (field, value) in rows {
        table.add_row(vec![Cell::new(field), Cell::new(value)]);
    }
    table.add_row(vec![Cell::new("status"), status_cell(share.status)]);
    table
}

/// Summary of a bulk operation.
pub fn print_bulk_report(verb: &str, report: &BulkReport) {
    println!("{verb} {}/{} share(s)", report.succeeded, report.attempted);
    if !report.failures.is_empty() {
        let mut table = create_table();
        table.set_header(vec!["ID", "Name", "Error"]);
        for failure in &report.failures {
            table.add_row(vec![&failure.id, &failure.name, &failure.error]);
        }
        println!("{table}");
    }
}

/// One-line connection test result.
pub fn print_connection_report(report: &ConnectionReport) {
    let mark = if report.success { "ok" } else { "FAILED" };
    println!("{mark}: {}", report.message);
}
