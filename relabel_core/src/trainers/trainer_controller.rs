// TrainerController - interleaved rollout, relabeling, update, evaluation and checkpointing
use crate::env::Environment;
use crate::error::Result;
use crate::rng::{PrngKey, SuppliedRng, Xoshiro256StarStar};
use crate::trainers::agent::{Agent, Checkpointable};
use crate::trainers::checkpoint::CheckpointManager;
use crate::trainers::evaluation::evaluate;
use crate::trainers::reward_model::RewardModel;
use crate::trainers::sac::replay_buffer::{ReplayBuffer, Transition};
use crate::trainers::settings::TrainingSettings;
use crate::trainers::stats::{flatten, MetricsAccumulator, StatsReporter};
use crate::trainers::trajectory::{compute_mask, Trajectory};

pub const TRAINING_NAMESPACE: &str = "training";
pub const EXPLORATION_NAMESPACE: &str = "exploration";
pub const EVALUATION_NAMESPACE: &str = "evaluation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutPhase {
    /// Uniform random actions from the action space.
    Exploring,
    PolicyDriven,
}

pub struct TrainerController {
    settings: TrainingSettings,
    env: Box<dyn Environment>,
    eval_env: Box<dyn Environment>,
    reward_model: Option<RewardModel>,
    reporter: StatsReporter,
    checkpoints: Option<CheckpointManager>,

    buffer: ReplayBuffer,
    trajectory: Trajectory,
    training_stats: MetricsAccumulator,
    exploration_stats: MetricsAccumulator,

    rng: Xoshiro256StarStar,
    exploration_rng: SuppliedRng,
    eval_rng: SuppliedRng,

    update_count: u64,
    episodes: u64,
}

impl TrainerController {
    /// Training runs always pass a reward model; `None` keeps environment
    /// rewards and exists for driving the loop on its own.
    pub fn new(
        settings: TrainingSettings,
        env: Box<dyn Environment>,
        eval_env: Box<dyn Environment>,
        reward_model: Option<RewardModel>,
        reporter: StatsReporter,
        checkpoints: Option<CheckpointManager>,
        seed: u64,
    ) -> Result<Self> {
        let example = Transition {
            observations: vec![0.0; env.observation_space().dim()],
            actions: vec![0.0; env.action_space().dim()],
            rewards: 0.0,
            masks: 1.0,
            next_observations: vec![0.0; env.observation_space().dim()],
        };
        let buffer = ReplayBuffer::create(&example, settings.buffer_size)?;

        let (key, sample_key) = PrngKey::new(seed).split();
        let (exploration_key, eval_key) = key.split();

        Ok(Self {
            settings,
            env,
            eval_env,
            reward_model,
            reporter,
            checkpoints,
            buffer,
            trajectory: Trajectory::new(),
            training_stats: MetricsAccumulator::new(),
            exploration_stats: MetricsAccumulator::new(),
            rng: sample_key.into_rng(),
            exploration_rng: SuppliedRng::new(exploration_key),
            eval_rng: SuppliedRng::new(eval_key),
            update_count: 0,
            episodes: 0,
        })
    }

    pub fn phase(&self, step: u64) -> RolloutPhase {
        if step < self.settings.start_steps {
            RolloutPhase::Exploring
        } else {
            RolloutPhase::PolicyDriven
        }
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    /// Runs steps `1..=max_steps` and hands back the final agent.
    pub fn start_learning<A>(&mut self, agent: A) -> Result<A>
    where
        A: Agent + Checkpointable,
    {
        log::info!(
            "Starting training for {} steps ({} warm-up, batch {})",
            self.settings.max_steps,
            self.settings.start_steps,
            self.settings.batch_size
        );
        let mut agent = agent;
        let mut observation = self.env.reset()?;

        for step in 1..=self.settings.max_steps {
            observation = self.rollout_step(&agent, observation, step)?;

            if (self.buffer.len() as u64) < self.settings.start_steps {
                continue;
            }

            let batch = self.buffer.sample(self.settings.batch_size, &mut self.rng)?;
            let (next, info) = agent.update(&batch)?;
            agent = next;
            self.update_count += 1;
            self.training_stats.add_scalars(&info);

            if step % self.settings.log_interval == 0 {
                self.write_summaries(step)?;
            }

            if step % self.settings.eval_interval == 0 {
                let metrics = evaluate(
                    &agent,
                    &mut self.eval_env,
                    self.settings.eval_episodes,
                    &mut self.eval_rng,
                )?;
                self.reporter
                    .write_stats(EVALUATION_NAMESPACE, &metrics, step)?;
            }

            if self.settings.save_interval > 0 && step % self.settings.save_interval == 0 {
                if let Some(checkpoints) = &self.checkpoints {
                    checkpoints.save_checkpoint(&agent, step)?;
                }
            }
        }

        log::info!(
            "Training finished: {} updates over {} episodes",
            self.update_count,
            self.episodes
        );
        Ok(agent)
    }

    fn rollout_step<A: Agent>(&mut self, agent: &A, observation: Vec<f32>, step: u64) -> Result<Vec<f32>> {
        let action = match self.phase(step) {
            RolloutPhase::Exploring => self.env.action_space().sample(&mut self.rng),
            RolloutPhase::PolicyDriven => {
                agent.sample_actions(&observation, self.exploration_rng.next_key(), 1.0)?
            }
        };

        let result = self.env.step(&action)?;
        let mask = compute_mask(result.done, &result.info);
        self.trajectory.push(
            observation,
            action,
            result.reward,
            mask,
            result.observation.clone(),
        );

        if result.done {
            self.finish_episode(&result.info)?;
            return self.env.reset();
        }
        Ok(result.observation)
    }

    fn finish_episode(&mut self, info: &crate::env::Info) -> Result<()> {
        self.exploration_stats.add(&flatten(info, "."));

        if let Some(model) = &self.reward_model {
            let rewards = model.relabel(self.trajectory.observations())?;
            self.trajectory.relabel(rewards)?;
        }
        let steps = self.trajectory.drain_into(&mut self.buffer)?;
        self.episodes += 1;

        log::debug!(
            "Episode {} finished after {} steps (buffer {}/{})",
            self.episodes,
            steps,
            self.buffer.len(),
            self.buffer.capacity()
        );
        Ok(())
    }

    fn write_summaries(&mut self, step: u64) -> Result<()> {
        let training = self.training_stats.means();
        self.reporter
            .write_stats(TRAINING_NAMESPACE, &training, step)?;
        self.training_stats.clear();

        let exploration = self.exploration_stats.means();
        self.reporter
            .write_stats(EXPLORATION_NAMESPACE, &exploration, step)?;
        self.exploration_stats.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{BoxSpace, StepResult};
    use crate::trainers::agent::UpdateInfo;
    use crate::trainers::reward_model::{RewardModelKind, RewardNetwork};
    use crate::trainers::sac::Batch;
    use crate::trainers::stats::{Metrics, StatsWriter};
    use serde_json::json;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;
    use tch::{Device, Kind, Tensor};
    use tempfile::tempdir;

    /// One-dimensional walk that terminates after three steps.
    struct Corridor {
        t: usize,
        observation_space: BoxSpace,
        action_space: BoxSpace,
    }

    impl Corridor {
        fn boxed() -> Box<dyn Environment> {
            Box::new(Self {
                t: 0,
                observation_space: BoxSpace::uniform(1, 0.0, 10.0),
                action_space: BoxSpace::uniform(1, -1.0, 1.0),
            })
        }
    }

    impl Environment for Corridor {
        fn reset(&mut self) -> Result<Vec<f32>> {
            self.t = 0;
            Ok(vec![0.0])
        }

        fn step(&mut self, _action: &[f32]) -> Result<StepResult> {
            self.t += 1;
            let mut info = crate::env::Info::new();
            info.insert("progress".into(), json!(self.t));
            Ok(StepResult {
                observation: vec![self.t as f32],
                reward: -1.0,
                done: self.t == 3,
                info,
            })
        }

        fn observation_space(&self) -> &BoxSpace {
            &self.observation_space
        }

        fn action_space(&self) -> &BoxSpace {
            &self.action_space
        }

        fn seed(&mut self, _seed: u64) {}
    }

    struct CountingAgent {
        updates: usize,
        acted: RefCell<usize>,
    }

    impl CountingAgent {
        fn new() -> Self {
            Self {
                updates: 0,
                acted: RefCell::new(0),
            }
        }
    }

    impl Agent for CountingAgent {
        fn sample_actions(&self, _observation: &[f32], _seed: PrngKey, _temperature: f64) -> Result<Vec<f32>> {
            *self.acted.borrow_mut() += 1;
            Ok(vec![0.5])
        }

        fn update(self, batch: &Batch) -> Result<(Self, UpdateInfo)> {
            let mut info = UpdateInfo::new();
            info.insert("batch".into(), batch.len() as f64);
            Ok((
                Self {
                    updates: self.updates + 1,
                    acted: self.acted,
                },
                info,
            ))
        }
    }

    impl Checkpointable for CountingAgent {
        fn save_checkpoint(&self, dir: &Path) -> Result<()> {
            std::fs::create_dir_all(dir)?;
            std::fs::write(dir.join("updates"), self.updates.to_string())?;
            Ok(())
        }

        fn load_checkpoint(&mut self, _dir: &Path) -> Result<()> {
            Ok(())
        }
    }

    /// Reward model that scores every step 7.
    struct Sevens;

    impl RewardNetwork for Sevens {
        fn get_reward(&self, inputs: &Tensor) -> Result<Tensor> {
            Ok(Tensor::full(&[inputs.size()[0]], 7.0, (Kind::Float, Device::Cpu)))
        }

        fn sample_reward(&self, inputs: &Tensor) -> Result<Tensor> {
            self.get_reward(inputs)
        }

        fn sample_prior(&self, size: i64) -> Result<Tensor> {
            Ok(Tensor::zeros(&[size, 1], (Kind::Float, Device::Cpu)))
        }

        fn device(&self) -> Device {
            Device::Cpu
        }
    }

    struct Recorder(Rc<RefCell<Vec<(u64, Metrics)>>>);

    impl StatsWriter for Recorder {
        fn write(&mut self, metrics: &Metrics, step: u64) -> Result<()> {
            self.0.borrow_mut().push((step, metrics.clone()));
            Ok(())
        }
    }

    fn settings(max_steps: u64) -> TrainingSettings {
        TrainingSettings {
            max_steps,
            start_steps: 6,
            batch_size: 2,
            buffer_size: 100,
            log_interval: 1,
            eval_interval: 5,
            save_interval: 5,
            eval_episodes: 1,
        }
    }

    fn controller(
        max_steps: u64,
        reward_model: Option<RewardModel>,
        checkpoints: Option<CheckpointManager>,
    ) -> (TrainerController, Rc<RefCell<Vec<(u64, Metrics)>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut reporter = StatsReporter::new();
        reporter.add_writer(Box::new(Recorder(seen.clone())));
        let controller = TrainerController::new(
            settings(max_steps),
            Corridor::boxed(),
            Corridor::boxed(),
            reward_model,
            reporter,
            checkpoints,
            0,
        )
        .unwrap();
        (controller, seen)
    }

    #[test]
    fn test_no_update_before_warm_up() {
        let (mut controller, seen) = controller(5, None, None);
        let agent = controller.start_learning(CountingAgent::new()).unwrap();

        assert_eq!(controller.update_count(), 0);
        assert_eq!(agent.updates, 0);
        assert_eq!(controller.buffer().len(), 3);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_updates_once_per_step_after_gate() {
        let (mut controller, _) = controller(10, None, None);
        let agent = controller.start_learning(CountingAgent::new()).unwrap();

        // Episodes end at steps 3, 6 and 9; the gate opens at step 6.
        assert_eq!(controller.episodes(), 3);
        assert_eq!(controller.update_count(), 5);
        assert_eq!(agent.updates, 5);
        assert_eq!(controller.buffer().len(), 9);
    }

    #[test]
    fn test_explores_before_start_steps() {
        let (mut controller, _) = controller(8, None, None);
        assert_eq!(controller.phase(5), RolloutPhase::Exploring);
        assert_eq!(controller.phase(6), RolloutPhase::PolicyDriven);

        let agent = controller.start_learning(CountingAgent::new()).unwrap();
        // Policy acts on steps 6..=8; no evaluation runs before the gate.
        assert_eq!(*agent.acted.borrow(), 3);
    }

    #[test]
    fn test_terminal_masks_and_relabeled_rewards() {
        let model =
            RewardModel::new(RewardModelKind::Distributional, Box::new(Sevens), 0..1).unwrap();
        let (mut controller, _) = controller(3, Some(model), None);
        controller.start_learning(CountingAgent::new()).unwrap();

        let buffer = controller.buffer();
        assert_eq!(buffer.len(), 3);
        let rewards: Vec<f32> = (0..3).map(|i| buffer.get(i).unwrap().rewards).collect();
        let masks: Vec<f32> = (0..3).map(|i| buffer.get(i).unwrap().masks).collect();
        assert_eq!(rewards, vec![7.0, 7.0, 7.0]);
        assert_eq!(masks, vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_environment_rewards_kept_without_model() {
        let (mut controller, _) = controller(3, None, None);
        controller.start_learning(CountingAgent::new()).unwrap();
        assert_eq!(controller.buffer().get(2).unwrap().rewards, -1.0);
    }

    #[test]
    fn test_summaries_evaluation_and_checkpoints() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path(), 0).unwrap();
        let (mut controller, seen) = controller(10, None, Some(manager));
        controller.start_learning(CountingAgent::new()).unwrap();

        let seen = seen.borrow();
        let training_steps: Vec<u64> = seen
            .iter()
            .filter(|(_, m)| m.contains_key("training/batch"))
            .map(|(step, _)| *step)
            .collect();
        assert_eq!(training_steps, vec![6, 7, 8, 9, 10]);

        let evaluation: Vec<&(u64, Metrics)> = seen
            .iter()
            .filter(|(_, m)| m.keys().any(|k| k.starts_with("evaluation/")))
            .collect();
        assert_eq!(evaluation.len(), 1);
        assert_eq!(evaluation[0].0, 10);
        assert_eq!(evaluation[0].1["evaluation/progress"], 2.0);

        assert!(seen
            .iter()
            .any(|(step, m)| *step == 6 && m.contains_key("exploration/progress")));

        // Step 5 is before the gate, so only step 10 is saved.
        assert!(!dir.path().join("checkpoint_5").exists());
        let saved = std::fs::read_to_string(dir.path().join("checkpoint_10").join("updates")).unwrap();
        assert_eq!(saved, "5");
    }
}
