mod helpers;
mod participants;
mod run;

use std::path::Path;

use anyhow::Result;

use crate::config;

pub(crate) use helpers::Overrides;
pub(crate) use participants::cmd_participants;
pub(crate) use run::cmd_run;

pub(crate) fn cmd_init_config(path: &Path, force: bool, json: bool) -> Result<()> {
    config::write_default(path, force)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "created": path.display().to_string() })
        );
    } else {
        println!("Created {} with default settings.", path.display());
        println!("Edit it to point at your data directory and choose a policy.");
    }
    Ok(())
}
