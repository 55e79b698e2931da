//! Registry commands: list, get, create, update, delete.

use anyhow::Result;
use clap::Args as ClapArgs;
use netmount_core::{NewShare, SharePatch};
use netmount_mount::RemoteMountManager;

use super::OutputMode;
use crate::auth::PasswordArgs;
use crate::output;

#[derive(ClapArgs, Clone)]
pub struct GetArgs {
    /// Share id
    pub id: String,
}

#[derive(ClapArgs, Clone)]
pub struct CreateArgs {
    /// Unique display name
    #[arg(long)]
    pub name: String,

    /// Protocol
    #[arg(long = "type", value_name = "smb|nfs")]
    pub share_type: String,

    /// Server IPv4 address or hostname
    #[arg(long)]
    pub server: String,

    /// SMB share name or NFS export path
    #[arg(long)]
    pub share: String,

    /// Login name (omit for guest access)
    #[arg(long)]
    pub username: Option<String>,

    #[command(flatten)]
    pub password: PasswordArgs,

    /// SMB domain or workgroup
    #[arg(long)]
    pub domain: Option<String>,

    /// SMB protocol version (default 3.0)
    #[arg(long = "smb-version", value_name = "1.0|2.0|3.0")]
    pub smb_version: Option<String>,

    /// Owner uid for mounted files
    #[arg(long, allow_negative_numbers = true)]
    pub uid: Option<i64>,

    /// Owner gid for mounted files
    #[arg(long, allow_negative_numbers = true)]
    pub gid: Option<i64>,

    /// Mount immediately after creating
    #[arg(long)]
    pub auto_mount: bool,
}

#[derive(ClapArgs, Clone)]
pub struct UpdateArgs {
    /// Share id
    pub id: String,

    /// New display name
    #[arg(long)]
    pub name: Option<String>,

    /// New protocol
    #[arg(long = "type", value_name = "smb|nfs")]
    pub share_type: Option<String>,

    /// New server
    #[arg(long)]
    pub server: Option<String>,

    /// New share name or export path
    #[arg(long)]
    pub share: Option<String>,

    /// New login name
    #[arg(long, conflicts_with = "clear_username")]
    pub username: Option<String>,

    /// Remove the login name
    #[arg(long)]
    pub clear_username: bool,

    #[command(flatten)]
    pub password: PasswordArgs,

    /// Remove the stored password (guest access)
    #[arg(long, conflicts_with_all = ["password", "ask_password"])]
    pub clear_password: bool,

    /// New SMB domain
    #[arg(long, conflicts_with = "clear_domain")]
    pub domain: Option<String>,

    /// Remove the SMB domain
    #[arg(long)]
    pub clear_domain: bool,

    /// New SMB protocol version
    #[arg(
        long = "smb-version",
        value_name = "1.0|2.0|3.0",
        conflicts_with = "clear_smb_version"
    )]
    pub smb_version: Option<String>,

    /// Reset the SMB protocol version to the default
    #[arg(long)]
    pub clear_smb_version: bool,

    /// New owner uid
    #[arg(long, allow_negative_numbers = true, conflicts_with = "clear_uid")]
    pub uid: Option<i64>,

    /// Remove the owner uid
    #[arg(long)]
    pub clear_uid: bool,

    /// New owner gid
    #[arg(long, allow_negative_numbers = true, conflicts_with = "clear_gid")]
    pub gid: Option<i64>,

    /// Remove the owner gid
    #[arg(long)]
    pub clear_gid: bool,

    /// Mount automatically
    #[arg(long, value_name = "true|false")]
    pub auto_mount: Option<bool>,
}

/// Tri-state for nullable fields: untouched, cleared, or set.
fn nullable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    match (value, clear) {
        (Some(value), _) => Some(Some(value)),
        (None, true) => Some(None),
        (None, false) => None,
    }
}

impl UpdateArgs {
    fn into_patch(self) -> Result<SharePatch> {
        let password = if self.clear_password {
            Some(String::new())
        } else {
            self.password.resolve()?
        };

        Ok(SharePatch {
            name: self.name,
            share_type: self.share_type,
            server: self.server,
            share: self.share,
            username: nullable(self.username, self.clear_username),
            password,
            domain: nullable(self.domain, self.clear_domain),
            version: nullable(self.smb_version, self.clear_smb_version),
            uid: nullable(self.uid, self.clear_uid),
            gid: nullable(self.gid, self.clear_gid),
            auto_mount: self.auto_mount,
        })
    }
}

pub fn list(manager: &RemoteMountManager, mode: OutputMode) -> Result<()> {
    let shares = manager.list()?;
    if mode.json {
        return output::print_json(&shares);
    }
    if shares.is_empty() {
        mode.note("No remote shares configured");
        return Ok(());
    }
    println!("{}", output::shares_table(&shares));
    Ok(())
}

pub fn get(manager: &RemoteMountManager, args: &GetArgs, mode: OutputMode) -> Result<()> {
    let share = manager.get(&args.id)?;
    if mode.json {
        return output::print_json(&share);
    }
    println!("{}", output::share_detail(&share));
    Ok(())
}

pub fn create(manager: &RemoteMountManager, args: CreateArgs, mode: OutputMode) -> Result<()> {
    let input = NewShare {
        password: args.password.resolve()?,
        name: Some(args.name),
        share_type: Some(args.share_type),
        server: Some(args.server),
        share: Some(args.share),
        username: args.username,
        domain: args.domain,
        version: args.smb_version,
        uid: args.uid,
        gid: args.gid,
        auto_mount: args.auto_mount,
    };

    let share = manager.create(input)?;
    if mode.json {
        return output::print_json(&share);
    }
    mode.note(&format!("Created '{}' ({})", share.name, share.status));
    println!("{}", share.id);
    Ok(())
}

pub fn update(manager: &RemoteMountManager, args: UpdateArgs, mode: OutputMode) -> Result<()> {
    let id = args.id.clone();
    let patch = args.into_patch()?;
    let share = manager.update(&id, &patch)?;
    if mode.json {
        return output::print_json(&share);
    }
    mode.note(&format!("Updated '{}'", share.name));
    Ok(())
}

pub fn delete(manager: &RemoteMountManager, args: &GetArgs, mode: OutputMode) -> Result<()> {
    manager.delete(&args.id)?;
    if mode.json {
        return output::print_json(&serde_json::json!({ "deleted": args.id }));
    }
    mode.note(&format!("Deleted {}", args.id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable_tristate() {
        assert_eq!(nullable(Some(5), false), Some(Some(5)));
        assert_eq!(nullable::<i64>(None, true), Some(None));
        assert_eq!(nullable::<i64>(None, false), None);
    }
}
