// Checkpoint management system
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{RelabelError, Result};
use crate::trainers::agent::Checkpointable;

const CHECKPOINT_PREFIX: &str = "checkpoint_";

pub struct CheckpointManager {
    save_dir: PathBuf,
    keep_checkpoints: usize,
    pattern: Regex,
}

impl CheckpointManager {
    /// `keep_checkpoints == 0` disables cleanup.
    pub fn new(save_dir: &Path, keep_checkpoints: usize) -> Result<Self> {
        fs::create_dir_all(save_dir)?;
        let pattern = Regex::new(&format!(r"^{}(\d+)$", CHECKPOINT_PREFIX))
            .map_err(|e| RelabelError::Configuration(e.to_string()))?;

        Ok(Self {
            save_dir: save_dir.to_path_buf(),
            keep_checkpoints,
            pattern,
        })
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub fn checkpoint_dir(&self, step: u64) -> PathBuf {
        self.save_dir.join(format!("{}{}", CHECKPOINT_PREFIX, step))
    }

    /// Writes the agent under `checkpoint_<step>/`, replacing an existing
    /// checkpoint for the same step, then prunes old ones.
    pub fn save_checkpoint<A: Checkpointable>(&self, agent: &A, step: u64) -> Result<PathBuf> {
        let target = self.checkpoint_dir(step);
        let staging = self.save_dir.join(format!(".{}{}.tmp", CHECKPOINT_PREFIX, step));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }

        agent.save_checkpoint(&staging)?;
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&staging, &target)?;

        self.cleanup_old_checkpoints()?;

        log::info!("Checkpoint saved: {}", target.display());
        Ok(target)
    }

    /// All checkpoints in the save directory, oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<(u64, PathBuf)>> {
        let mut checkpoints = Vec::new();
        for entry in fs::read_dir(&self.save_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let step = entry
                .file_name()
                .to_str()
                .and_then(|name| self.pattern.captures(name))
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok());
            if let Some(step) = step {
                checkpoints.push((step, entry.path()));
            }
        }
        checkpoints.sort_by_key(|(step, _)| *step);
        Ok(checkpoints)
    }

    pub fn latest_checkpoint(&self) -> Result<Option<(u64, PathBuf)>> {
        Ok(self.list_checkpoints()?.pop())
    }

    /// Loads the newest checkpoint into `agent`, returning its step.
    pub fn restore_latest<A: Checkpointable>(&self, agent: &mut A) -> Result<Option<u64>> {
        match self.latest_checkpoint()? {
            Some((step, dir)) => {
                agent.load_checkpoint(&dir)?;
                Ok(Some(step))
            }
            None => Ok(None),
        }
    }

    fn cleanup_old_checkpoints(&self) -> Result<()> {
        if self.keep_checkpoints == 0 {
            return Ok(());
        }
        let checkpoints = self.list_checkpoints()?;
        if checkpoints.len() <= self.keep_checkpoints {
            return Ok(());
        }

        let stale = checkpoints.len() - self.keep_checkpoints;
        for (_, old) in &checkpoints[..stale] {
            fs::remove_dir_all(old)?;
            log::debug!("Removed old checkpoint: {}", old.display());
        }
        Ok(())
    }
}
