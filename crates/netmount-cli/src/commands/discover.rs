//! Server discovery and connection tests.

use anyhow::Result;
use clap::Args as ClapArgs;
use netmount_core::NewShare;
use netmount_mount::{ProbeCredentials, RemoteMountManager};
use zeroize::Zeroizing;

use super::{ConnectionFailed, OutputMode};
use crate::auth::PasswordArgs;
use crate::output;

#[derive(ClapArgs, Clone)]
pub struct SharesArgs {
    /// Server IPv4 address or hostname
    pub server: String,

    /// Protocol
    #[arg(long = "type", value_name = "smb|nfs", default_value = "smb")]
    pub share_type: String,

    /// Login name (omit for guest access)
    #[arg(long)]
    pub username: Option<String>,

    #[command(flatten)]
    pub password: PasswordArgs,

    /// SMB domain or workgroup
    #[arg(long)]
    pub domain: Option<String>,
}

#[derive(ClapArgs, Clone)]
pub struct TestArgs {
    /// Test a registered share with its stored credentials
    #[arg(long, conflicts_with_all = ["share_type", "server", "share", "username", "domain"])]
    pub id: Option<String>,

    /// Protocol
    #[arg(long = "type", value_name = "smb|nfs", required_unless_present = "id")]
    pub share_type: Option<String>,

    /// Server IPv4 address or hostname
    #[arg(long, required_unless_present = "id")]
    pub server: Option<String>,

    /// SMB share name or NFS export path
    #[arg(long, required_unless_present = "id")]
    pub share: Option<String>,

    /// Login name
    #[arg(long)]
    pub username: Option<String>,

    #[command(flatten)]
    pub password: PasswordArgs,

    /// SMB domain or workgroup
    #[arg(long)]
    pub domain: Option<String>,
}

pub fn shares(manager: &RemoteMountManager, args: &SharesArgs, mode: OutputMode) -> Result<()> {
    let credentials = ProbeCredentials {
        username: args.username.clone(),
        password: args.password.resolve()?.map(Zeroizing::new),
        domain: args.domain.clone(),
    };

    let shares = manager.list_server_shares(&args.server, &args.share_type, &credentials)?;
    if mode.json {
        return output::print_json(&shares);
    }
    for share in shares {
        println!("{share}");
    }
    Ok(())
}

pub fn test(manager: &RemoteMountManager, args: &TestArgs, mode: OutputMode) -> Result<()> {
    let report = match &args.id {
        Some(id) => manager.test_saved_connection(id)?,
        None => manager.connection_test(&NewShare {
            share_type: args.share_type.clone(),
            server: args.server.clone(),
            share: args.share.clone(),
            username: args.username.clone(),
            password: args.password.resolve()?,
            domain: args.domain.clone(),
            ..NewShare::default()
        })?,
    };

    if mode.json {
        output::print_json(&report)?;
    } else {
        output::print_connection_report(&report);
    }

    if report.success {
        Ok(())
    } else {
        Err(ConnectionFailed(report.message).into())
    }
}
