use anyhow::{Result, bail};
use clap::Args as ClapArgs;
use rpassword::read_password;
use std::io::{self, Write};

/// Prompt for a share password securely.
/// Input is hidden and not echoed to the terminal.
pub fn prompt_share_password() -> Result<String> {
    eprint!("Share password: ");
    io::stderr().flush()?;

    let password = read_password()?;

    if password.is_empty() {
        bail!("Password cannot be empty (use --clear-password for guest access)");
    }

    Ok(password)
}

/// Ways to supply a share password on the command line.
#[derive(ClapArgs, Clone, Debug, Default)]
pub struct PasswordArgs {
    /// Share password (visible in process listings, prefer --ask-password)
    #[arg(long, conflicts_with = "ask_password")]
    pub password: Option<String>,

    /// Prompt for the share password
    #[arg(long)]
    pub ask_password: bool,
}

impl PasswordArgs {
    /// The supplied password, prompting if asked to.
    pub fn resolve(&self) -> Result<Option<String>> {
        if self.ask_password {
            return prompt_share_password().map(Some);
        }
        Ok(self.password.clone())
    }
}
