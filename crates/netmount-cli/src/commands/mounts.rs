//! Mount and unmount commands.

use anyhow::Result;
use clap::Args as ClapArgs;
use netmount_mount::{BulkReport, RemoteMountManager};

use super::{OutputMode, PartialFailure};
use crate::output;

#[derive(ClapArgs, Clone)]
pub struct MountArgs {
    /// Share id
    #[arg(required_unless_present = "auto")]
    pub id: Option<String>,

    /// Mount every share marked auto-mount that is not already mounted
    #[arg(long, conflicts_with = "id")]
    pub auto: bool,
}

#[derive(ClapArgs, Clone)]
pub struct UnmountArgs {
    /// Share id
    #[arg(required_unless_present = "all")]
    pub id: Option<String>,

    /// Unmount every mounted share
    #[arg(long, conflicts_with = "id")]
    pub all: bool,
}

pub fn mount(manager: &RemoteMountManager, args: &MountArgs, mode: OutputMode) -> Result<()> {
    match &args.id {
        Some(id) if !args.auto => {
            let share = manager.mount(id)?;
            if mode.json {
                return output::print_json(&share);
            }
            mode.note(&format!(
                "Mounted '{}' at {}",
                share.name,
                share.mount_point.display()
            ));
            Ok(())
        }
        _ => {
            let report = manager.mount_auto()?;
            finish_bulk("Mounted", &report, mode)
        }
    }
}

pub fn unmount(manager: &RemoteMountManager, args: &UnmountArgs, mode: OutputMode) -> Result<()> {
    match &args.id {
        Some(id) if !args.all => {
            let share = manager.unmount(id)?;
            if mode.json {
                return output::print_json(&share);
            }
            mode.note(&format!("Unmounted '{}'", share.name));
            Ok(())
        }
        _ => {
            let report = manager.unmount_all()?;
            finish_bulk("Unmounted", &report, mode)
        }
    }
}

fn finish_bulk(verb: &str, report: &BulkReport, mode: OutputMode) -> Result<()> {
    if mode.json {
        output::print_json(report)?;
    } else if !mode.quiet || !report.is_complete() {
        output::print_bulk_report(verb, report);
    }

    if report.is_complete() {
        Ok(())
    } else {
        Err(PartialFailure {
            failed: report.failures.len(),
            attempted: report.attempted,
        }
        .into())
    }
}
