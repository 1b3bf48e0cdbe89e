// SAC Configuration
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleType {
    #[serde(rename = "constant")]
    Constant,
    /// Decays linearly to zero over the run's step budget.
    #[serde(rename = "linear")]
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SACConfig {
    // Network architecture
    pub hidden_layers: Vec<i64>,

    // Hyperparameters
    pub actor_lr: f64,
    pub critic_lr: f64,
    pub temp_lr: f64,
    pub discount: f64,
    pub tau: f64,

    // Entropy
    pub init_temperature: f64,
    /// Defaults to `-action_dim / 2`.
    pub target_entropy: Option<f64>,
    /// Subtract the entropy term from the bootstrapped target.
    pub backup_entropy: bool,

    pub learning_rate_schedule: ScheduleType,
}

impl Default for SACConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![256, 256],
            actor_lr: 3e-4,
            critic_lr: 3e-4,
            temp_lr: 3e-4,
            discount: 0.99,
            tau: 0.005,
            init_temperature: 1.0,
            target_entropy: None,
            backup_entropy: true,
            learning_rate_schedule: ScheduleType::Constant,
        }
    }
}

impl SACConfig {
    pub fn target_entropy_for(&self, action_dim: i64) -> f64 {
        self.target_entropy
            .unwrap_or(-(action_dim as f64) / 2.0)
    }

    /// Learning-rate multiplier after `step` of `max_steps` updates.
    pub fn lr_scale(&self, step: i64, max_steps: u64) -> f64 {
        match self.learning_rate_schedule {
            ScheduleType::Constant => 1.0,
            ScheduleType::Linear => {
                if max_steps == 0 {
                    return 1.0;
                }
                (1.0 - step as f64 / max_steps as f64).clamp(0.0, 1.0)
            }
        }
    }
}
