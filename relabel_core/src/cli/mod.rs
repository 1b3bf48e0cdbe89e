// Command-Line Interface for sac-reward-model
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::error::{RelabelError, Result};
use crate::trainers::settings::{DeviceType, RunOptions};

#[derive(Parser, Debug, Clone)]
#[command(name = "sac-reward-model")]
#[command(version)]
#[command(about = "Soft Actor-Critic training with reward-model relabeling", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to a run configuration YAML file
    #[arg(short, long, global = true, value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Environment name
    #[arg(long = "env-name", global = true)]
    pub env_name: Option<String>,

    /// Random seed
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Number of environment steps to train for
    #[arg(long = "max-steps", global = true)]
    pub max_steps: Option<u64>,

    /// Buffer population required before the first update
    #[arg(long = "start-steps", global = true)]
    pub start_steps: Option<u64>,

    /// Mini batch size
    #[arg(long = "batch-size", global = true)]
    pub batch_size: Option<usize>,

    /// Replay buffer capacity
    #[arg(long = "buffer-size", global = true)]
    pub buffer_size: Option<usize>,

    /// Logging interval in steps
    #[arg(long = "log-interval", global = true)]
    pub log_interval: Option<u64>,

    /// Evaluation interval in steps
    #[arg(long = "eval-interval", global = true)]
    pub eval_interval: Option<u64>,

    /// Checkpoint interval in steps (0 disables checkpoints)
    #[arg(long = "save-interval", global = true)]
    pub save_interval: Option<u64>,

    /// Number of episodes used for evaluation
    #[arg(long = "eval-episodes", global = true)]
    pub eval_episodes: Option<usize>,

    /// Reward model type: MLP, Categorical, MeanVar, VAE or Latent
    #[arg(long = "model-type", global = true)]
    pub model_type: Option<String>,

    /// Reward model file, or a directory of model_<epoch> files
    #[arg(long, global = true)]
    pub ckpt: Option<PathBuf>,

    /// Observation columns fed to an MLP reward model, as START,END
    #[arg(long = "obs-columns", global = true, value_delimiter = ',')]
    pub obs_columns: Option<Vec<usize>>,

    /// Identifier for the run (results subdirectory)
    #[arg(long = "run-id", global = true)]
    pub run_id: Option<String>,

    /// Results base directory
    #[arg(long = "results-dir", global = true)]
    pub results_dir: Option<PathBuf>,

    /// Checkpoint directory (defaults to <results-dir>/<run-id>/checkpoints)
    #[arg(long = "save-dir", global = true)]
    pub save_dir: Option<PathBuf>,

    /// Number of checkpoints to retain (0 keeps all)
    #[arg(long = "keep-checkpoints", global = true)]
    pub keep_checkpoints: Option<usize>,

    /// Reuse an existing run directory
    #[arg(long, global = true, default_value_t = false)]
    pub force: bool,

    /// Device to use for training
    #[arg(long, global = true, value_enum)]
    pub device: Option<DeviceType>,

    /// CUDA device index (if using CUDA)
    #[arg(long = "cuda-device", global = true)]
    pub cuda_device: Option<usize>,

    /// Enable debug-level logging
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Train a new agent (the default)
    Train,

    /// Restore the latest checkpoint and run evaluation episodes
    Evaluate {
        /// Overrides the configured number of evaluation episodes
        #[arg(long)]
        episodes: Option<usize>,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Train)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(columns) = &self.obs_columns {
            if columns.len() != 2 || columns[0] >= columns[1] {
                return Err(RelabelError::Configuration(format!(
                    "--obs-columns expects START,END with START < END, got {:?}",
                    columns
                )));
            }
        }
        if self.batch_size == Some(0) {
            return Err(RelabelError::Configuration(
                "--batch-size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings from the config file (or defaults) with flags applied on top.
    pub fn run_options(&self) -> Result<RunOptions> {
        self.validate()?;
        let mut options = match &self.config {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                RunOptions::from_yaml(path)?
            }
            None => RunOptions::default(),
        };
        self.apply_overrides(&mut options);
        options.validate()?;
        Ok(options)
    }

    fn apply_overrides(&self, options: &mut RunOptions) {
        let env = &mut options.env_settings;
        if let Some(name) = &self.env_name {
            env.env_name = name.clone();
        }
        if let Some(seed) = self.seed {
            env.seed = seed;
        }

        let training = &mut options.training;
        if let Some(v) = self.max_steps {
            training.max_steps = v;
        }
        if let Some(v) = self.start_steps {
            training.start_steps = v;
        }
        if let Some(v) = self.batch_size {
            training.batch_size = v;
        }
        if let Some(v) = self.buffer_size {
            training.buffer_size = v;
        }
        if let Some(v) = self.log_interval {
            training.log_interval = v;
        }
        if let Some(v) = self.eval_interval {
            training.eval_interval = v;
        }
        if let Some(v) = self.save_interval {
            training.save_interval = v;
        }
        if let Some(v) = self.eval_episodes {
            training.eval_episodes = v;
        }

        let reward_model = &mut options.reward_model;
        if let Some(model_type) = &self.model_type {
            reward_model.model_type = model_type.clone();
        }
        if let Some(ckpt) = &self.ckpt {
            reward_model.ckpt = Some(ckpt.clone());
        }
        if let Some(columns) = &self.obs_columns {
            reward_model.obs_columns = [columns[0], columns[1]];
        }

        let checkpoint = &mut options.checkpoint_settings;
        if let Some(run_id) = &self.run_id {
            checkpoint.run_id = run_id.clone();
        }
        if let Some(dir) = &self.results_dir {
            checkpoint.results_dir = dir.clone();
        }
        if let Some(dir) = &self.save_dir {
            checkpoint.save_dir = Some(dir.clone());
        }
        if let Some(keep) = self.keep_checkpoints {
            checkpoint.keep_checkpoints = keep;
        }
        checkpoint.force |= self.force;

        if let Some(device) = self.device {
            options.torch_settings.device = device;
        }
        if let Some(index) = self.cuda_device {
            options.torch_settings.cuda_device = index;
        }
        options.debug |= self.debug;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_train() {
        let cli = Cli::parse_from(["sac-reward-model"]);
        assert_eq!(cli.command(), Commands::Train);
        let options = cli.run_options().unwrap();
        assert_eq!(options.training.batch_size, 256);
        assert_eq!(options.reward_model.model_type, "MLP");
    }

    #[test]
    fn test_cli_parse_with_flags() {
        let cli = Cli::parse_from([
            "sac-reward-model",
            "train",
            "--run-id",
            "test_run",
            "--seed",
            "3",
            "--model-type",
            "MeanVar",
            "--obs-columns",
            "1,3",
            "--device",
            "cpu",
            "--force",
        ]);
        let options = cli.run_options().unwrap();
        assert_eq!(options.checkpoint_settings.run_id, "test_run");
        assert_eq!(options.env_settings.seed, 3);
        assert_eq!(options.reward_model.model_type, "MeanVar");
        assert_eq!(options.reward_model.columns(), 1..3);
        assert_eq!(options.torch_settings.device, DeviceType::Cpu);
        assert!(options.checkpoint_settings.force);
    }

    #[test]
    fn test_evaluate_command() {
        let cli = Cli::parse_from(["sac-reward-model", "evaluate", "--episodes", "4"]);
        assert_eq!(cli.command(), Commands::Evaluate { episodes: Some(4) });
    }

    #[test]
    fn test_unknown_model_type_is_rejected() {
        let cli = Cli::parse_from(["sac-reward-model", "--model-type", "Transformer"]);
        assert!(matches!(
            cli.run_options(),
            Err(RelabelError::Configuration(_))
        ));
    }

    #[test]
    fn test_bad_obs_columns() {
        let cli = Cli::parse_from(["sac-reward-model", "--obs-columns", "2,1"]);
        assert!(cli.validate().is_err());
        let cli = Cli::parse_from(["sac-reward-model", "--obs-columns", "0,1,2"]);
        assert!(cli.validate().is_err());
    }
}
