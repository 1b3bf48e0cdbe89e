// Settings module - run options loaded from YAML and overridden by CLI flags
use std::ops::Range;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tch::Device;

use crate::error::{RelabelError, Result};
use crate::trainers::reward_model::RewardModelKind;
use crate::trainers::sac::SACConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub env_settings: EnvironmentSettings,
    pub training: TrainingSettings,
    pub reward_model: RewardModelSettings,
    pub checkpoint_settings: CheckpointSettings,
    pub torch_settings: TorchSettings,
    pub sac: SACConfig,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    pub env_name: String,
    pub seed: u64,
    pub max_episode_steps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub max_steps: u64,
    /// Buffer population required before the first update.
    pub start_steps: u64,
    pub batch_size: usize,
    pub buffer_size: usize,
    pub log_interval: u64,
    pub eval_interval: u64,
    /// 0 disables checkpointing.
    pub save_interval: u64,
    pub eval_episodes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardModelSettings {
    /// `MLP`, `Categorical`, `MeanVar`, `VAE` or `Latent`.
    pub model_type: String,
    /// TorchScript file or directory of `model_<epoch>` files.
    pub ckpt: Option<PathBuf>,
    /// Observation columns fed to a point-estimate model, `[start, end)`.
    pub obs_columns: [usize; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    pub run_id: String,
    pub results_dir: PathBuf,
    /// Defaults to `<results_dir>/<run_id>/checkpoints`.
    pub save_dir: Option<PathBuf>,
    pub keep_checkpoints: usize,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// CUDA when available, otherwise CPU
    Auto,
    Cpu,
    Cuda,
    Mps,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TorchSettings {
    pub device: DeviceType,
    pub cuda_device: usize,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            env_name: "point_mass".to_string(),
            seed: 42,
            max_episode_steps: 200,
        }
    }
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            start_steps: 10_000,
            batch_size: 256,
            buffer_size: 1_000_000,
            log_interval: 1_000,
            eval_interval: 10_000,
            save_interval: 25_000,
            eval_episodes: 10,
        }
    }
}

impl Default for RewardModelSettings {
    fn default() -> Self {
        Self {
            model_type: "MLP".to_string(),
            ckpt: None,
            obs_columns: [0, 2],
        }
    }
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            run_id: "sac_reward_model".to_string(),
            results_dir: PathBuf::from("results"),
            save_dir: None,
            keep_checkpoints: 1,
            force: false,
        }
    }
}

impl Default for TorchSettings {
    fn default() -> Self {
        Self {
            device: DeviceType::Cpu,
            cuda_device: 0,
        }
    }
}

impl RewardModelSettings {
    pub fn kind(&self) -> Result<RewardModelKind> {
        self.model_type.parse()
    }

    pub fn columns(&self) -> Range<usize> {
        self.obs_columns[0]..self.obs_columns[1]
    }
}

impl CheckpointSettings {
    pub fn run_dir(&self) -> PathBuf {
        self.results_dir.join(&self.run_id)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.save_dir
            .clone()
            .unwrap_or_else(|| self.run_dir().join("checkpoints"))
    }
}

impl TorchSettings {
    pub fn resolve(&self) -> Result<Device> {
        match self.device {
            DeviceType::Auto => {
                if tch::Cuda::is_available() {
                    Ok(Device::Cuda(self.cuda_device))
                } else {
                    Ok(Device::Cpu)
                }
            }
            DeviceType::Cpu => Ok(Device::Cpu),
            DeviceType::Cuda => {
                if !tch::Cuda::is_available() {
                    return Err(RelabelError::Configuration(
                        "CUDA requested but not available".into(),
                    ));
                }
                Ok(Device::Cuda(self.cuda_device))
            }
            DeviceType::Mps => {
                if !tch::utils::has_mps() {
                    return Err(RelabelError::Configuration(
                        "MPS requested but not available".into(),
                    ));
                }
                Ok(Device::Mps)
            }
        }
    }
}

impl RunOptions {
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let options: RunOptions = serde_yaml::from_str(&content)?;
        Ok(options)
    }

    pub fn as_dict(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rejects settings the training loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        let training = &self.training;
        let positive = [
            ("training.batch_size", training.batch_size as u64),
            ("training.buffer_size", training.buffer_size as u64),
            ("training.log_interval", training.log_interval),
            ("training.eval_interval", training.eval_interval),
            ("env_settings.max_episode_steps", self.env_settings.max_episode_steps as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(RelabelError::Configuration(format!(
                    "{} must be positive",
                    name
                )));
            }
        }
        if training.start_steps > training.buffer_size as u64 {
            return Err(RelabelError::Configuration(format!(
                "training.start_steps ({}) exceeds training.buffer_size ({}); no update would ever run",
                training.start_steps, training.buffer_size
            )));
        }
        if self.sac.hidden_layers.iter().any(|&h| h <= 0) {
            return Err(RelabelError::Configuration(format!(
                "sac.hidden_layers must be positive, got {:?}",
                self.sac.hidden_layers
            )));
        }

        let kind = self.reward_model.kind()?;
        if kind == RewardModelKind::PointEstimate && self.reward_model.columns().is_empty() {
            return Err(RelabelError::Configuration(format!(
                "reward_model.obs_columns {:?} is empty",
                self.reward_model.obs_columns
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RunOptions::default();
        assert_eq!(options.training.eval_episodes, 10);
        assert_eq!(options.training.log_interval, 1_000);
        assert_eq!(options.training.eval_interval, 10_000);
        assert_eq!(options.training.save_interval, 25_000);
        assert_eq!(options.training.batch_size, 256);
        assert_eq!(options.training.max_steps, 1_000_000);
        assert_eq!(options.training.start_steps, 10_000);
        assert_eq!(options.training.buffer_size, 1_000_000);
        assert_eq!(options.reward_model.model_type, "MLP");
        assert_eq!(options.reward_model.columns(), 0..2);
        assert_eq!(options.checkpoint_settings.keep_checkpoints, 1);
        options.validate().unwrap();
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
env_settings:
  seed: 7
training:
  batch_size: 64
reward_model:
  model_type: VAE
  ckpt: models/vae
torch_settings:
  device: cpu
"#;
        let options: RunOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.env_settings.seed, 7);
        assert_eq!(options.env_settings.env_name, "point_mass");
        assert_eq!(options.training.batch_size, 64);
        assert_eq!(options.training.eval_episodes, 10);
        assert_eq!(
            options.reward_model.kind().unwrap(),
            RewardModelKind::LatentConditioned
        );
        assert_eq!(options.reward_model.ckpt, Some(PathBuf::from("models/vae")));
        assert_eq!(options.torch_settings.device, DeviceType::Cpu);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut options = RunOptions::default();
        options.reward_model.model_type = "Transformer".into();
        assert!(matches!(
            options.validate(),
            Err(RelabelError::Configuration(_))
        ));

        let mut options = RunOptions::default();
        options.training.batch_size = 0;
        assert!(options.validate().is_err());

        let mut options = RunOptions::default();
        options.training.start_steps = 10;
        options.training.buffer_size = 5;
        assert!(options.validate().is_err());

        let mut options = RunOptions::default();
        options.reward_model.obs_columns = [3, 3];
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_paths() {
        let mut settings = CheckpointSettings::default();
        settings.results_dir = PathBuf::from("out");
        settings.run_id = "run1".into();
        assert_eq!(settings.checkpoint_dir(), PathBuf::from("out/run1/checkpoints"));
        settings.save_dir = Some(PathBuf::from("/tmp/ckpt"));
        assert_eq!(settings.checkpoint_dir(), PathBuf::from("/tmp/ckpt"));
    }

    #[test]
    fn test_cpu_always_resolves() {
        assert_eq!(TorchSettings::default().resolve().unwrap(), Device::Cpu);
    }
}
