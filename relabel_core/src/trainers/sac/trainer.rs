// SAC Agent - twin critics, target critics and learned temperature
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tch::{nn, nn::OptimizerConfig, Device, Kind, Tensor};

use super::networks::gaussian_noise;
use super::{ActorNetwork, Batch, CriticNetwork, SACConfig};
use crate::error::{RelabelError, Result};
use crate::rng::PrngKey;
use crate::trainers::agent::{Agent, Checkpointable, UpdateInfo};

pub const ACTOR_FILE: &str = "actor.pt";
pub const CRITIC_FILE: &str = "critic.pt";
pub const TARGET_CRITIC_FILE: &str = "target_critic.pt";
pub const TEMPERATURE_FILE: &str = "temperature.pt";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AgentMetadata {
    step: i64,
    observation_dim: i64,
    action_dim: i64,
    max_steps: u64,
    config: SACConfig,
}

pub struct SacAgent {
    // Networks
    actor: ActorNetwork,
    critic_1: CriticNetwork,
    critic_2: CriticNetwork,
    target_critic_1: CriticNetwork,
    target_critic_2: CriticNetwork,

    // VarStores
    actor_vs: nn::VarStore,
    critic_vs: nn::VarStore,
    target_critic_vs: nn::VarStore,
    temperature_vs: nn::VarStore,

    // Optimizers
    actor_opt: nn::Optimizer,
    critic_opt: nn::Optimizer,
    temperature_opt: nn::Optimizer,

    log_temperature: Tensor,

    config: SACConfig,
    target_entropy: f64,
    max_steps: u64,

    rng: PrngKey,
    step: i64,

    observation_dim: i64,
    action_dim: i64,
    device: Device,
}

impl SacAgent {
    /// Builds a freshly initialized agent. `max_steps` is the horizon of the
    /// linear learning-rate schedule.
    pub fn create(
        seed: u64,
        observation_dim: i64,
        action_dim: i64,
        max_steps: u64,
        config: SACConfig,
        device: Device,
    ) -> Result<Self> {
        if observation_dim <= 0 || action_dim <= 0 {
            return Err(RelabelError::Configuration(format!(
                "invalid agent dimensions: observation {} action {}",
                observation_dim, action_dim
            )));
        }
        if config.init_temperature <= 0.0 {
            return Err(RelabelError::Configuration(format!(
                "init_temperature must be positive, got {}",
                config.init_temperature
            )));
        }

        let (rng, init_key) = PrngKey::new(seed).split();
        tch::manual_seed(init_key.as_seed() as i64);
        let hidden = config.hidden_layers.clone();

        // Actor
        let actor_vs = nn::VarStore::new(device);
        let actor = ActorNetwork::new(&actor_vs.root(), observation_dim, action_dim, &hidden);
        let actor_opt = nn::Adam::default().build(&actor_vs, config.actor_lr)?;

        // Critics
        let critic_vs = nn::VarStore::new(device);
        let critic_1 = CriticNetwork::new(
            &(&critic_vs.root() / "critic1"),
            observation_dim,
            action_dim,
            &hidden,
        );
        let critic_2 = CriticNetwork::new(
            &(&critic_vs.root() / "critic2"),
            observation_dim,
            action_dim,
            &hidden,
        );
        let critic_opt = nn::Adam::default().build(&critic_vs, config.critic_lr)?;

        // Target critics share the critics' variable names so copy() lines up
        let mut target_critic_vs = nn::VarStore::new(device);
        let target_critic_1 = CriticNetwork::new(
            &(&target_critic_vs.root() / "critic1"),
            observation_dim,
            action_dim,
            &hidden,
        );
        let target_critic_2 = CriticNetwork::new(
            &(&target_critic_vs.root() / "critic2"),
            observation_dim,
            action_dim,
            &hidden,
        );
        target_critic_vs.copy(&critic_vs)?;
        target_critic_vs.freeze();

        // Temperature
        let temperature_vs = nn::VarStore::new(device);
        let log_temperature = temperature_vs.root().var(
            "log_temperature",
            &[1],
            nn::Init::Const(config.init_temperature.ln()),
        );
        let temperature_opt = nn::Adam::default().build(&temperature_vs, config.temp_lr)?;

        let target_entropy = config.target_entropy_for(action_dim);
        log::debug!(
            "Created SAC agent: obs_dim={} action_dim={} hidden={:?} target_entropy={}",
            observation_dim,
            action_dim,
            hidden,
            target_entropy
        );

        Ok(Self {
            actor,
            critic_1,
            critic_2,
            target_critic_1,
            target_critic_2,
            actor_vs,
            critic_vs,
            target_critic_vs,
            temperature_vs,
            actor_opt,
            critic_opt,
            temperature_opt,
            log_temperature,
            config,
            target_entropy,
            max_steps,
            rng,
            step: 0,
            observation_dim,
            action_dim,
            device,
        })
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    pub fn temperature(&self) -> f64 {
        tch::no_grad(|| self.log_temperature.exp().double_value(&[0]))
    }

    pub fn config(&self) -> &SACConfig {
        &self.config
    }

    fn apply_schedule(&mut self) -> (f64, f64) {
        let scale = self.config.lr_scale(self.step, self.max_steps);
        let actor_lr = self.config.actor_lr * scale;
        let critic_lr = self.config.critic_lr * scale;
        self.actor_opt.set_lr(actor_lr);
        self.critic_opt.set_lr(critic_lr);
        (actor_lr, critic_lr)
    }

    fn update_critic(&mut self, batch: &TensorBatchRef<'_>, key: PrngKey, info: &mut UpdateInfo) {
        let temperature = self.log_temperature.exp().detach();

        let target_q = tch::no_grad(|| {
            let noise = gaussian_noise(key, &[batch.len, self.action_dim], self.device);
            let (next_actions, next_log_probs) =
                self.actor.sample(batch.next_observations, &noise);
            let target_q1 = self.target_critic_1.forward(batch.next_observations, &next_actions);
            let target_q2 = self.target_critic_2.forward(batch.next_observations, &next_actions);
            let mut next_q = target_q1.min_other(&target_q2);
            if self.config.backup_entropy {
                next_q = next_q - &temperature * &next_log_probs;
            }
            batch.rewards + self.config.discount * batch.masks * next_q
        });

        let q1 = self.critic_1.forward(batch.observations, batch.actions);
        let q2 = self.critic_2.forward(batch.observations, batch.actions);
        let critic_loss = (&q1 - &target_q).pow_tensor_scalar(2).mean(Kind::Float)
            + (&q2 - &target_q).pow_tensor_scalar(2).mean(Kind::Float);

        self.critic_opt.zero_grad();
        critic_loss.backward();
        self.critic_opt.step();

        info.insert("critic_loss".into(), critic_loss.double_value(&[]));
        info.insert("q1".into(), q1.mean(Kind::Float).double_value(&[]));
        info.insert("q2".into(), q2.mean(Kind::Float).double_value(&[]));
        info.insert("target_q".into(), target_q.mean(Kind::Float).double_value(&[]));
    }

    fn update_actor(&mut self, batch: &TensorBatchRef<'_>, key: PrngKey, info: &mut UpdateInfo) -> f64 {
        let temperature = self.log_temperature.exp().detach();
        let noise = gaussian_noise(key, &[batch.len, self.action_dim], self.device);
        let (actions, log_probs) = self.actor.sample(batch.observations, &noise);

        let q1 = self.critic_1.forward(batch.observations, &actions);
        let q2 = self.critic_2.forward(batch.observations, &actions);
        let q = q1.min_other(&q2);
        let actor_loss = (&temperature * &log_probs - q).mean(Kind::Float);

        self.actor_opt.zero_grad();
        actor_loss.backward();
        self.actor_opt.step();

        let entropy = -log_probs.mean(Kind::Float).double_value(&[]);
        info.insert("actor_loss".into(), actor_loss.double_value(&[]));
        info.insert("entropy".into(), entropy);
        entropy
    }

    fn update_temperature(&mut self, entropy: f64, info: &mut UpdateInfo) {
        let temperature = self.log_temperature.exp();
        let temperature_loss = (&temperature * (entropy - self.target_entropy)).mean(Kind::Float);

        self.temperature_opt.zero_grad();
        temperature_loss.backward();
        self.temperature_opt.step();

        info.insert("temperature".into(), temperature.double_value(&[0]));
        info.insert("temperature_loss".into(), temperature_loss.double_value(&[]));
    }

    fn soft_update_targets(&mut self) {
        // Polyak averaging: target = tau * online + (1 - tau) * target
        tch::no_grad(|| {
            let tau = self.config.tau;
            let sources = self.critic_vs.variables();
            for (name, mut target) in self.target_critic_vs.variables() {
                if let Some(source) = sources.get(&name) {
                    let blended = tau * source + (1.0 - tau) * &target;
                    target.copy_(&blended);
                }
            }
        });
    }

    fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            step: self.step,
            observation_dim: self.observation_dim,
            action_dim: self.action_dim,
            max_steps: self.max_steps,
            config: self.config.clone(),
        }
    }
}

/// Borrowed view of a device batch.
struct TensorBatchRef<'a> {
    len: i64,
    observations: &'a Tensor,
    actions: &'a Tensor,
    rewards: &'a Tensor,
    masks: &'a Tensor,
    next_observations: &'a Tensor,
}

impl Agent for SacAgent {
    fn sample_actions(&self, observation: &[f32], seed: PrngKey, temperature: f64) -> Result<Vec<f32>> {
        if observation.len() as i64 != self.observation_dim {
            return Err(RelabelError::InvariantViolation(format!(
                "observation has length {}, agent expects {}",
                observation.len(),
                self.observation_dim
            )));
        }

        let obs = Tensor::from_slice(observation)
            .reshape(&[1, self.observation_dim])
            .to_device(self.device);
        let action = tch::no_grad(|| {
            let noise = gaussian_noise(seed, &[1, self.action_dim], self.device);
            self.actor.act(&obs, &noise, temperature)
        });
        let action = action
            .flatten(0, -1)
            .to_kind(Kind::Float)
            .to_device(Device::Cpu);
        Ok(Vec::<f32>::try_from(&action)?)
    }

    fn update(mut self, batch: &Batch) -> Result<(Self, UpdateInfo)> {
        if batch.is_empty() {
            return Err(RelabelError::InsufficientData(
                "cannot update on an empty batch".into(),
            ));
        }
        let schema = batch.schema;
        if schema.observation_dim as i64 != self.observation_dim
            || schema.action_dim as i64 != self.action_dim
        {
            return Err(RelabelError::InvariantViolation(format!(
                "batch shaped obs={} act={} for agent obs={} act={}",
                schema.observation_dim, schema.action_dim, self.observation_dim, self.action_dim
            )));
        }

        let tensors = batch.to_tensors(self.device);
        let view = TensorBatchRef {
            len: batch.len() as i64,
            observations: &tensors.observations,
            actions: &tensors.actions,
            rewards: &tensors.rewards,
            masks: &tensors.masks,
            next_observations: &tensors.next_observations,
        };

        let (rng, critic_key) = self.rng.split();
        let (rng, actor_key) = rng.split();
        self.rng = rng;

        let mut info = UpdateInfo::new();
        let (actor_lr, critic_lr) = self.apply_schedule();
        info.insert("actor_lr".into(), actor_lr);
        info.insert("critic_lr".into(), critic_lr);

        self.update_critic(&view, critic_key, &mut info);
        let entropy = self.update_actor(&view, actor_key, &mut info);
        self.update_temperature(entropy, &mut info);
        self.soft_update_targets();

        self.step += 1;
        Ok((self, info))
    }
}

impl Checkpointable for SacAgent {
    fn save_checkpoint(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        self.actor_vs.save(dir.join(ACTOR_FILE))?;
        self.critic_vs.save(dir.join(CRITIC_FILE))?;
        self.target_critic_vs.save(dir.join(TARGET_CRITIC_FILE))?;
        self.temperature_vs.save(dir.join(TEMPERATURE_FILE))?;

        let metadata = serde_json::to_string_pretty(&self.metadata())?;
        fs::write(dir.join(METADATA_FILE), metadata)?;

        log::debug!("Saved agent state (step {}) to {}", self.step, dir.display());
        Ok(())
    }

    fn load_checkpoint(&mut self, dir: &Path) -> Result<()> {
        let metadata: AgentMetadata =
            serde_json::from_str(&fs::read_to_string(dir.join(METADATA_FILE))?)?;
        if metadata.observation_dim != self.observation_dim
            || metadata.action_dim != self.action_dim
            || metadata.config.hidden_layers != self.config.hidden_layers
        {
            return Err(RelabelError::InvariantViolation(format!(
                "checkpoint at {} was written for obs={} act={} hidden={:?}",
                dir.display(),
                metadata.observation_dim,
                metadata.action_dim,
                metadata.config.hidden_layers
            )));
        }

        self.actor_vs.load(dir.join(ACTOR_FILE))?;
        self.critic_vs.load(dir.join(CRITIC_FILE))?;
        self.target_critic_vs.load(dir.join(TARGET_CRITIC_FILE))?;
        self.temperature_vs.load(dir.join(TEMPERATURE_FILE))?;
        self.step = metadata.step;

        log::info!("Restored agent from {} (step {})", dir.display(), self.step);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainers::sac::replay_buffer::{ReplayBuffer, Transition};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn small_config() -> SACConfig {
        SACConfig {
            hidden_layers: vec![16, 16],
            ..SACConfig::default()
        }
    }

    fn filled_buffer() -> ReplayBuffer {
        let example = Transition {
            observations: vec![0.0; 3],
            actions: vec![0.0; 2],
            rewards: 0.0,
            masks: 1.0,
            next_observations: vec![0.0; 3],
        };
        let mut buffer = ReplayBuffer::create(&example, 64).unwrap();
        for i in 0..32 {
            let x = i as f32 / 32.0;
            buffer
                .add_transition(&Transition {
                    observations: vec![x, -x, 0.5],
                    actions: vec![x, 0.0],
                    rewards: x,
                    masks: if i % 8 == 7 { 0.0 } else { 1.0 },
                    next_observations: vec![x + 0.01, -x, 0.5],
                })
                .unwrap();
        }
        buffer
    }

    #[test]
    fn test_sample_actions_in_bounds() {
        let agent = SacAgent::create(0, 3, 2, 100, small_config(), Device::Cpu).unwrap();
        let action = agent
            .sample_actions(&[0.1, 0.2, 0.3], PrngKey::new(1), 1.0)
            .unwrap();
        assert_eq!(action.len(), 2);
        assert!(action.iter().all(|a| a.abs() <= 1.0));
    }

    #[test]
    fn test_deterministic_actions_ignore_key() {
        let agent = SacAgent::create(0, 3, 2, 100, small_config(), Device::Cpu).unwrap();
        let obs = [0.1, 0.2, 0.3];
        let a = agent.sample_actions(&obs, PrngKey::new(1), 0.0).unwrap();
        let b = agent.sample_actions(&obs, PrngKey::new(2), 0.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrong_observation_length() {
        let agent = SacAgent::create(0, 3, 2, 100, small_config(), Device::Cpu).unwrap();
        assert!(agent.sample_actions(&[0.0], PrngKey::new(0), 1.0).is_err());
    }

    #[test]
    fn test_update_returns_successor_with_info() {
        let buffer = filled_buffer();
        let mut rng = StdRng::seed_from_u64(0);
        let mut agent = SacAgent::create(0, 3, 2, 100, small_config(), Device::Cpu).unwrap();

        for _ in 0..3 {
            let batch = buffer.sample(16, &mut rng).unwrap();
            let (next, info) = agent.update(&batch).unwrap();
            agent = next;
            for key in ["critic_loss", "actor_loss", "temperature", "entropy", "q1", "q2"] {
                assert!(info[key].is_finite(), "{} is not finite", key);
            }
        }
        assert_eq!(agent.step(), 3);
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempdir().unwrap();
        let buffer = filled_buffer();
        let mut rng = StdRng::seed_from_u64(1);
        let agent = SacAgent::create(7, 3, 2, 100, small_config(), Device::Cpu).unwrap();
        let (agent, _) = agent.update(&buffer.sample(8, &mut rng).unwrap()).unwrap();
        agent.save_checkpoint(dir.path()).unwrap();

        for file in [ACTOR_FILE, CRITIC_FILE, TARGET_CRITIC_FILE, TEMPERATURE_FILE, METADATA_FILE] {
            assert!(dir.path().join(file).is_file(), "missing {}", file);
        }

        let mut restored = SacAgent::create(99, 3, 2, 100, small_config(), Device::Cpu).unwrap();
        restored.load_checkpoint(dir.path()).unwrap();
        assert_eq!(restored.step(), 1);

        let obs = [0.3, -0.2, 0.5];
        let expected = agent.sample_actions(&obs, PrngKey::new(0), 0.0).unwrap();
        let actual = restored.sample_actions(&obs, PrngKey::new(0), 0.0).unwrap();
        assert_eq!(expected, actual);
        assert!((agent.temperature() - restored.temperature()).abs() < 1e-9);
    }

    #[test]
    fn test_checkpoint_shape_mismatch() {
        let dir = tempdir().unwrap();
        let agent = SacAgent::create(0, 3, 2, 100, small_config(), Device::Cpu).unwrap();
        agent.save_checkpoint(dir.path()).unwrap();
        let mut other = SacAgent::create(0, 4, 2, 100, small_config(), Device::Cpu).unwrap();
        let err = other.load_checkpoint(dir.path()).unwrap_err();
        assert!(matches!(err, RelabelError::InvariantViolation(_)));
    }
}
