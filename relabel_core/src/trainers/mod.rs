// Trainers module: relabeling SAC training loop and its collaborators

pub mod agent;
pub mod checkpoint;
pub mod evaluation;
pub mod learn;
pub mod reward_model;
pub mod settings;
pub mod stats;
pub mod tensorboard;
pub mod trainer_controller;
pub mod trajectory;

// SAC Implementation
pub mod sac;

pub use agent::{Agent, Checkpointable, UpdateInfo};
pub use checkpoint::CheckpointManager;
pub use learn::{run_cli, run_evaluation, run_training, train_with_reward_model};
pub use settings::RunOptions;
pub use tensorboard::CsvWriter;
pub use trainer_controller::TrainerController;
