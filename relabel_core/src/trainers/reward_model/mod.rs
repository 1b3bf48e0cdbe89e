// Reward model adapter
//
// Wraps a trained reward network and turns one episode's observations into
// one reward per timestep. The variant is chosen once, from the model-type
// tag, when the model is loaded.
pub mod loader;

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use tch::{CModule, Device, IValue, Kind, Tensor};

use crate::error::{RelabelError, Result};

pub use loader::{load_reward_model, resolve_checkpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardModelKind {
    /// Deterministic reward from a column slice of the observation.
    PointEstimate,
    /// Reward sampled from a learned distribution over the full observation.
    Distributional,
    /// Deterministic reward conditioned on one latent drawn per episode.
    LatentConditioned,
}

impl FromStr for RewardModelKind {
    type Err = RelabelError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "MLP" => Ok(Self::PointEstimate),
            "Categorical" | "MeanVar" => Ok(Self::Distributional),
            "VAE" | "Latent" => Ok(Self::LatentConditioned),
            other => Err(RelabelError::Configuration(format!(
                "unknown reward model type: {} (expected MLP, Categorical, MeanVar, VAE or Latent)",
                other
            ))),
        }
    }
}

impl fmt::Display for RewardModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PointEstimate => "point-estimate",
            Self::Distributional => "distributional",
            Self::LatentConditioned => "latent-conditioned",
        };
        f.write_str(name)
    }
}

/// Inference surface of a trained reward network.
pub trait RewardNetwork {
    fn get_reward(&self, inputs: &Tensor) -> Result<Tensor>;

    fn sample_reward(&self, inputs: &Tensor) -> Result<Tensor>;

    /// Draws `size` latent vectors, shape `[size, latent_dim]`.
    fn sample_prior(&self, size: i64) -> Result<Tensor>;

    fn device(&self) -> Device;
}

/// TorchScript module exporting `get_reward`, `sample_reward` and
/// `sample_prior` methods.
pub struct ScriptedRewardNetwork {
    module: CModule,
    device: Device,
}

impl ScriptedRewardNetwork {
    pub fn new(mut module: CModule, device: Device) -> Self {
        module.set_eval();
        Self { module, device }
    }
}

impl RewardNetwork for ScriptedRewardNetwork {
    fn get_reward(&self, inputs: &Tensor) -> Result<Tensor> {
        Ok(self.module.method_ts("get_reward", &[inputs])?)
    }

    fn sample_reward(&self, inputs: &Tensor) -> Result<Tensor> {
        Ok(self.module.method_ts("sample_reward", &[inputs])?)
    }

    fn sample_prior(&self, size: i64) -> Result<Tensor> {
        match self.module.method_is("sample_prior", &[IValue::Int(size)])? {
            IValue::Tensor(z) => Ok(z),
            other => Err(RelabelError::InvariantViolation(format!(
                "sample_prior returned a non-tensor value: {:?}",
                other
            ))),
        }
    }

    fn device(&self) -> Device {
        self.device
    }
}

pub struct RewardModel {
    kind: RewardModelKind,
    network: Box<dyn RewardNetwork>,
    observation_columns: Range<usize>,
}

impl RewardModel {
    pub fn new(
        kind: RewardModelKind,
        network: Box<dyn RewardNetwork>,
        observation_columns: Range<usize>,
    ) -> Result<Self> {
        if kind == RewardModelKind::PointEstimate && observation_columns.is_empty() {
            return Err(RelabelError::Configuration(format!(
                "empty observation column range {:?}",
                observation_columns
            )));
        }
        Ok(Self {
            kind,
            network,
            observation_columns,
        })
    }

    pub fn kind(&self) -> RewardModelKind {
        self.kind
    }

    /// One reward per observation, computed without gradient tracking.
    pub fn relabel(&self, observations: &[Vec<f32>]) -> Result<Vec<f32>> {
        let steps = observations.len();
        if steps == 0 {
            return Ok(Vec::new());
        }
        let obs_dim = observations[0].len();
        if let Some(row) = observations.iter().position(|o| o.len() != obs_dim) {
            return Err(RelabelError::InvariantViolation(format!(
                "observation {} has length {}, expected {}",
                row,
                observations[row].len(),
                obs_dim
            )));
        }

        let flat: Vec<f32> = observations.iter().flatten().copied().collect();
        let trajectory = Tensor::from_slice(&flat)
            .reshape(&[steps as i64, obs_dim as i64])
            .to_device(self.network.device());

        let rewards = tch::no_grad(|| self.forward(&trajectory, obs_dim))?;
        let rewards = rewards
            .flatten(0, -1)
            .to_kind(Kind::Float)
            .to_device(Device::Cpu);
        let rewards = Vec::<f32>::try_from(&rewards)?;

        if rewards.len() != steps {
            return Err(RelabelError::InvariantViolation(format!(
                "reward model returned {} rewards for {} timesteps",
                rewards.len(),
                steps
            )));
        }
        Ok(rewards)
    }

    fn forward(&self, trajectory: &Tensor, obs_dim: usize) -> Result<Tensor> {
        match self.kind {
            RewardModelKind::PointEstimate => {
                let Range { start, end } = self.observation_columns;
                if end > obs_dim {
                    return Err(RelabelError::InvariantViolation(format!(
                        "reward columns {}..{} exceed observation width {}",
                        start, end, obs_dim
                    )));
                }
                let inputs = trajectory.narrow(1, start as i64, (end - start) as i64);
                self.network.get_reward(&inputs)
            }
            RewardModelKind::Distributional => self.network.sample_reward(trajectory),
            RewardModelKind::LatentConditioned => {
                let steps = trajectory.size()[0];
                let z = self
                    .network
                    .sample_prior(1)?
                    .reshape(&[1, -1])
                    .to_kind(trajectory.kind())
                    .to_device(trajectory.device())
                    .repeat(&[steps, 1]);
                let inputs = Tensor::cat(&[trajectory, &z], -1);
                self.network.get_reward(&inputs)
            }
        }
    }
}
