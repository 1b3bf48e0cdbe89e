// Reward model checkpoint resolution and loading
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use regex::Regex;
use tch::{CModule, Device};

use super::{RewardModel, RewardModelKind, ScriptedRewardNetwork};
use crate::error::{RelabelError, Result};

/// Resolves a reward model path. Files are used as-is; for a directory the
/// `model_<epoch>` file with the highest epoch is chosen.
pub fn resolve_checkpoint(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if !path.is_dir() {
        return Err(RelabelError::ModelLoad(format!(
            "no reward model at {}",
            path.display()
        )));
    }

    let re = Regex::new(r"^model_(\d+)(?:[._]|$)")
        .map_err(|e| RelabelError::ModelLoad(e.to_string()))?;

    let mut names = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();

    let mut best: Option<(u64, &str)> = None;
    for name in &names {
        let epoch = re
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok());
        if let Some(epoch) = epoch {
            if best.map_or(true, |(top, _)| epoch > top) {
                best = Some((epoch, name));
            }
        }
    }

    match best {
        Some((epoch, name)) => {
            log::debug!("Selected reward model {} (epoch {})", name, epoch);
            Ok(path.join(name))
        }
        None => Err(RelabelError::ModelLoad(format!(
            "no model_<epoch> files in {}",
            path.display()
        ))),
    }
}

pub fn load_reward_model(
    kind: RewardModelKind,
    path: &Path,
    device: Device,
    observation_columns: Range<usize>,
) -> Result<RewardModel> {
    let resolved = resolve_checkpoint(path)?;
    log::info!("Loading {} reward model from {}", kind, resolved.display());

    let module = CModule::load_on_device(&resolved, device).map_err(|e| {
        RelabelError::ModelLoad(format!("{}: {}", resolved.display(), e))
    })?;
    let network = ScriptedRewardNetwork::new(module, device);
    RewardModel::new(kind, Box::new(network), observation_columns)
}
