// Experience Replay Buffer for SAC
//
// Fixed-capacity ring buffer with one pre-allocated column per transition
// field. Sampling is uniform with replacement over the filled slots and uses
// the same indices for every column.
use rand::Rng;
use tch::{Device, Kind, Tensor};

use crate::error::{RelabelError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observations: Vec<f32>,
    pub actions: Vec<f32>,
    pub rewards: f32,
    pub masks: f32,
    pub next_observations: Vec<f32>,
}

/// Per-field lengths fixed when the buffer is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionSchema {
    pub observation_dim: usize,
    pub action_dim: usize,
}

impl TransitionSchema {
    pub fn of(transition: &Transition) -> Self {
        Self {
            observation_dim: transition.observations.len(),
            action_dim: transition.actions.len(),
        }
    }

    pub fn check(&self, transition: &Transition) -> Result<()> {
        let fields = [
            ("observations", transition.observations.len(), self.observation_dim),
            ("actions", transition.actions.len(), self.action_dim),
            (
                "next_observations",
                transition.next_observations.len(),
                self.observation_dim,
            ),
        ];
        for (name, got, expected) in fields {
            if got != expected {
                return Err(RelabelError::InvariantViolation(format!(
                    "field `{}` has length {}, buffer schema expects {}",
                    name, got, expected
                )));
            }
        }
        Ok(())
    }
}

pub struct ReplayBuffer {
    observations: Vec<f32>,
    actions: Vec<f32>,
    rewards: Vec<f32>,
    masks: Vec<f32>,
    next_observations: Vec<f32>,
    schema: TransitionSchema,
    capacity: usize,
    pos: usize,
    size: usize,
}

impl ReplayBuffer {
    /// Allocates `capacity` slots shaped after `example`.
    pub fn create(example: &Transition, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(RelabelError::Configuration(
                "replay buffer capacity must be positive".to_string(),
            ));
        }
        let schema = TransitionSchema::of(example);
        schema.check(example)?;

        Ok(Self {
            observations: vec![0.0; capacity * schema.observation_dim],
            actions: vec![0.0; capacity * schema.action_dim],
            rewards: vec![0.0; capacity],
            masks: vec![0.0; capacity],
            next_observations: vec![0.0; capacity * schema.observation_dim],
            schema,
            capacity,
            pos: 0,
            size: 0,
        })
    }

    pub fn add_transition(&mut self, transition: &Transition) -> Result<()> {
        self.schema.check(transition)?;

        let obs_dim = self.schema.observation_dim;
        let act_dim = self.schema.action_dim;
        let slot = self.pos;

        self.observations[slot * obs_dim..(slot + 1) * obs_dim]
            .copy_from_slice(&transition.observations);
        self.actions[slot * act_dim..(slot + 1) * act_dim].copy_from_slice(&transition.actions);
        self.rewards[slot] = transition.rewards;
        self.masks[slot] = transition.masks;
        self.next_observations[slot * obs_dim..(slot + 1) * obs_dim]
            .copy_from_slice(&transition.next_observations);

        self.pos = (self.pos + 1) % self.capacity;
        self.size = (self.size + 1).min(self.capacity);
        Ok(())
    }

    pub fn sample<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Result<Batch> {
        if self.size == 0 {
            return Err(RelabelError::InsufficientData(
                "cannot sample from an empty replay buffer".to_string(),
            ));
        }
        let indices: Vec<usize> = (0..batch_size).map(|_| rng.gen_range(0..self.size)).collect();
        Ok(self.gather(indices))
    }

    fn gather(&self, indices: Vec<usize>) -> Batch {
        let obs_dim = self.schema.observation_dim;
        let act_dim = self.schema.action_dim;
        let n = indices.len();

        let mut observations = Vec::with_capacity(n * obs_dim);
        let mut actions = Vec::with_capacity(n * act_dim);
        let mut rewards = Vec::with_capacity(n);
        let mut masks = Vec::with_capacity(n);
        let mut next_observations = Vec::with_capacity(n * obs_dim);

        for &i in &indices {
            observations.extend_from_slice(&self.observations[i * obs_dim..(i + 1) * obs_dim]);
            actions.extend_from_slice(&self.actions[i * act_dim..(i + 1) * act_dim]);
            rewards.push(self.rewards[i]);
            masks.push(self.masks[i]);
            next_observations
                .extend_from_slice(&self.next_observations[i * obs_dim..(i + 1) * obs_dim]);
        }

        Batch {
            observations,
            actions,
            rewards,
            masks,
            next_observations,
            indices,
            schema: self.schema,
        }
    }

    /// Transition stored in slot `index`, if that slot has been written.
    pub fn get(&self, index: usize) -> Option<Transition> {
        if index >= self.size {
            return None;
        }
        let obs_dim = self.schema.observation_dim;
        let act_dim = self.schema.action_dim;
        Some(Transition {
            observations: self.observations[index * obs_dim..(index + 1) * obs_dim].to_vec(),
            actions: self.actions[index * act_dim..(index + 1) * act_dim].to_vec(),
            rewards: self.rewards[index],
            masks: self.masks[index],
            next_observations: self.next_observations[index * obs_dim..(index + 1) * obs_dim]
                .to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn schema(&self) -> TransitionSchema {
        self.schema
    }
}

/// Sampled transitions, stacked field by field.
#[derive(Debug, Clone)]
pub struct Batch {
    pub observations: Vec<f32>,
    pub actions: Vec<f32>,
    pub rewards: Vec<f32>,
    pub masks: Vec<f32>,
    pub next_observations: Vec<f32>,
    pub indices: Vec<usize>,
    pub schema: TransitionSchema,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn to_tensors(&self, device: Device) -> TensorBatch {
        let n = self.len() as i64;
        let obs_dim = self.schema.observation_dim as i64;
        let act_dim = self.schema.action_dim as i64;

        TensorBatch {
            observations: shaped(&self.observations, &[n, obs_dim], device),
            actions: shaped(&self.actions, &[n, act_dim], device),
            rewards: shaped(&self.rewards, &[n], device),
            masks: shaped(&self.masks, &[n], device),
            next_observations: shaped(&self.next_observations, &[n, obs_dim], device),
        }
    }
}

fn shaped(data: &[f32], shape: &[i64], device: Device) -> Tensor {
    Tensor::from_slice(data)
        .to_kind(Kind::Float)
        .reshape(shape)
        .to_device(device)
}

pub struct TensorBatch {
    pub observations: Tensor,
    pub actions: Tensor,
    pub rewards: Tensor,
    pub masks: Tensor,
    pub next_observations: Tensor,
}
