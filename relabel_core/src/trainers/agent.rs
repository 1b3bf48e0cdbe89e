// Agent and checkpoint interfaces used by the training loop
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::rng::PrngKey;
use crate::trainers::sac::replay_buffer::Batch;

/// Scalar diagnostics reported by one update.
pub type UpdateInfo = BTreeMap<String, f64>;

pub trait Agent: Sized {
    /// Action for a single observation. `temperature == 0` selects the
    /// deterministic action; the key is consumed by the call.
    fn sample_actions(&self, observation: &[f32], seed: PrngKey, temperature: f64)
        -> Result<Vec<f32>>;

    /// One off-policy update. Takes the current state and returns its
    /// successor; the caller rebinds its handle to the returned agent.
    fn update(self, batch: &Batch) -> Result<(Self, UpdateInfo)>;
}

pub trait Checkpointable {
    fn save_checkpoint(&self, dir: &Path) -> Result<()>;

    fn load_checkpoint(&mut self, dir: &Path) -> Result<()>;
}
