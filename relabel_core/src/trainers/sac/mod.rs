// SAC (Soft Actor-Critic) Implementation
pub mod config;
pub mod networks;
pub mod replay_buffer;
pub mod trainer;

pub use config::{SACConfig, ScheduleType};
pub use networks::{ActorNetwork, CriticNetwork};
pub use replay_buffer::{Batch, ReplayBuffer, TensorBatch, Transition, TransitionSchema};
pub use trainer::SacAgent;
