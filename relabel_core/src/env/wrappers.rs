// Environment wrappers: time limits and episode statistics
use std::time::Instant;

use serde_json::{json, Value};

use super::{BoxSpace, Environment, StepResult};
use crate::error::{RelabelError, Result};

/// Info key set when an episode is cut by the time limit rather than ending
/// on its own.
pub const TRUNCATION_KEY: &str = "TimeLimit.truncated";

pub struct TimeLimit<E> {
    env: E,
    max_episode_steps: usize,
    elapsed_steps: usize,
}

impl<E: Environment> TimeLimit<E> {
    pub fn new(env: E, max_episode_steps: usize) -> Result<Self> {
        if max_episode_steps == 0 {
            return Err(RelabelError::Configuration(
                "max_episode_steps must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            env,
            max_episode_steps,
            elapsed_steps: 0,
        })
    }

    pub fn inner(&self) -> &E {
        &self.env
    }
}

impl<E: Environment> Environment for TimeLimit<E> {
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.elapsed_steps = 0;
        self.env.reset()
    }

    fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        let mut result = self.env.step(action)?;
        self.elapsed_steps += 1;
        if self.elapsed_steps >= self.max_episode_steps && !result.done {
            result.done = true;
            result.info.insert(TRUNCATION_KEY.to_string(), Value::Bool(true));
        }
        Ok(result)
    }

    fn observation_space(&self) -> &BoxSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        self.env.action_space()
    }

    fn seed(&mut self, seed: u64) {
        self.env.seed(seed)
    }
}

/// Adds `episode.{return,length,duration,success}` to the terminal step's
/// info and `total.timesteps` to every step's info.
pub struct EpisodeMonitor<E> {
    env: E,
    reward_sum: f64,
    episode_length: usize,
    success: f64,
    start_time: Instant,
    total_timesteps: u64,
}

impl<E: Environment> EpisodeMonitor<E> {
    pub fn new(env: E) -> Self {
        Self {
            env,
            reward_sum: 0.0,
            episode_length: 0,
            success: 0.0,
            start_time: Instant::now(),
            total_timesteps: 0,
        }
    }

    fn reset_stats(&mut self) {
        self.reward_sum = 0.0;
        self.episode_length = 0;
        self.success = 0.0;
        self.start_time = Instant::now();
    }

    pub fn total_timesteps(&self) -> u64 {
        self.total_timesteps
    }
}

fn as_score(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => other.as_f64(),
    }
}

impl<E: Environment> Environment for EpisodeMonitor<E> {
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.reset_stats();
        self.env.reset()
    }

    fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        let mut result = self.env.step(action)?;

        self.reward_sum += result.reward as f64;
        self.episode_length += 1;
        self.total_timesteps += 1;
        if let Some(success) = result.info.get("success").and_then(as_score) {
            self.success = self.success.max(success);
        }

        result
            .info
            .insert("total".to_string(), json!({ "timesteps": self.total_timesteps }));

        if result.done {
            result.info.insert(
                "episode".to_string(),
                json!({
                    "return": self.reward_sum,
                    "length": self.episode_length,
                    "duration": self.start_time.elapsed().as_secs_f64(),
                    "success": self.success,
                }),
            );
        }
        Ok(result)
    }

    fn observation_space(&self) -> &BoxSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        self.env.action_space()
    }

    fn seed(&mut self, seed: u64) {
        self.env.seed(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Info;

    /// Never terminates on its own; reward 1 per step.
    struct Endless {
        space: BoxSpace,
    }

    impl Endless {
        fn new() -> Self {
            Self {
                space: BoxSpace::uniform(1, -1.0, 1.0),
            }
        }
    }

    impl Environment for Endless {
        fn reset(&mut self) -> Result<Vec<f32>> {
            Ok(vec![0.0])
        }

        fn step(&mut self, _action: &[f32]) -> Result<StepResult> {
            Ok(StepResult {
                observation: vec![0.0],
                reward: 1.0,
                done: false,
                info: Info::new(),
            })
        }

        fn observation_space(&self) -> &BoxSpace {
            &self.space
        }

        fn action_space(&self) -> &BoxSpace {
            &self.space
        }

        fn seed(&mut self, _seed: u64) {}
    }

    #[test]
    fn test_time_limit_truncates() {
        let mut env = TimeLimit::new(Endless::new(), 3).unwrap();
        env.reset().unwrap();
        assert!(!env.step(&[0.0]).unwrap().done);
        assert!(!env.step(&[0.0]).unwrap().done);
        let last = env.step(&[0.0]).unwrap();
        assert!(last.done);
        assert_eq!(last.info[TRUNCATION_KEY], Value::Bool(true));
    }

    #[test]
    fn test_time_limit_rejects_zero() {
        assert!(TimeLimit::new(Endless::new(), 0).is_err());
    }

    #[test]
    fn test_monitor_reports_episode_stats() {
        let mut env = EpisodeMonitor::new(TimeLimit::new(Endless::new(), 2).unwrap());
        env.reset().unwrap();
        let first = env.step(&[0.0]).unwrap();
        assert!(first.info.get("episode").is_none());
        assert_eq!(first.info["total"]["timesteps"], json!(1));

        let last = env.step(&[0.0]).unwrap();
        assert!(last.done);
        assert_eq!(last.info["episode"]["return"], json!(2.0));
        assert_eq!(last.info["episode"]["length"], json!(2));

        env.reset().unwrap();
        let next = env.step(&[0.0]).unwrap();
        assert_eq!(next.info["total"]["timesteps"], json!(3));
        assert_eq!(env.total_timesteps(), 3);
    }
}
