// Directory utilities for run output
use std::fs;
use std::path::Path;

use crate::error::{RelabelError, Result};

/// Refuses to reuse a non-empty run directory unless `force` is set.
pub fn validate_existing_directories(run_dir: &Path, force: bool) -> Result<()> {
    if !run_dir.exists() {
        return Ok(());
    }
    let has_entries = fs::read_dir(run_dir)?.next().is_some();
    if has_entries && !force {
        return Err(RelabelError::Configuration(format!(
            "Directory {} already exists. Use --force to overwrite, or pick another --run-id",
            run_dir.display()
        )));
    }
    if has_entries {
        log::warn!("Reusing existing run directory {}", run_dir.display());
    }
    Ok(())
}

pub fn create_directory_if_not_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}
