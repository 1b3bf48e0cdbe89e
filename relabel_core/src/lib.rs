// Soft Actor-Critic training with reward-model relabeling

pub mod cli;
pub mod env;
pub mod error;
pub mod logging;
pub mod rng;
pub mod trainers;
pub mod utils;

// Re-export main types
pub use error::{RelabelError, Result};
pub use trainers::{
    run_cli, run_evaluation, run_training, train_with_reward_model, RunOptions, TrainerController,
};

#[cfg(test)]
mod tests {
    #[test]
    fn test_version_string() {
        let version = crate::trainers::learn::get_version_string();
        assert!(version.contains("sac-reward-model"));
    }
}
