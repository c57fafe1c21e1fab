//! `tiops audit [audit-id]`

use anyhow::Result;
use clap::Args;
use tiops_profile::{audit, Profile};

/// Arguments of the audit command.
#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Show this entry's full log instead of the listing.
    pub id: Option<String>,
}

pub fn run(profile: &Profile, args: &AuditArgs) -> Result<()> {
    let dir = profile.audit_dir();
    match &args.id {
        Some(id) => {
            let content = audit::read(&dir, id)?;
            print!("{}", content);
        }
        None => {
            println!("{:<12} {:<26} Command", "ID", "Time");
            for entry in audit::list(&dir)? {
                println!(
                    "{:<12} {:<26} {}",
                    entry.id,
                    entry.time.to_rfc3339(),
                    entry.command
                );
            }
        }
    }
    Ok(())
}
