//! `tiops list`

use anyhow::Result;
use clap::Args;
use tiops_profile::Profile;

/// Arguments of the list command.
#[derive(Args, Debug)]
pub struct ListArgs {}

pub fn run(profile: &Profile, _args: &ListArgs) -> Result<()> {
    println!("{:<24} {:<12} {:<12} Path", "Name", "User", "Version");
    for name in profile.list_clusters()? {
        let meta = profile.load_meta(&name)?;
        println!(
            "{:<24} {:<12} {:<12} {}",
            name,
            meta.user,
            meta.version,
            profile.cluster_dir(&name).display()
        );
    }
    Ok(())
}
