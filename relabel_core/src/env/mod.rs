// Environment interface and the built-in environments
pub mod point_mass;
pub mod wrappers;

use rand::Rng;
use serde_json::{Map, Value};

use crate::error::{RelabelError, Result};

pub use point_mass::PointMass;
pub use wrappers::{EpisodeMonitor, TimeLimit, TRUNCATION_KEY};

/// Per-step auxiliary data; nested objects are allowed.
pub type Info = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Vec<f32>,
    pub reward: f32,
    pub done: bool,
    pub info: Info,
}

/// Axis-aligned box of continuous values.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSpace {
    pub low: Vec<f32>,
    pub high: Vec<f32>,
}

impl BoxSpace {
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Result<Self> {
        if low.len() != high.len() {
            return Err(RelabelError::Configuration(format!(
                "box bounds differ in length: {} vs {}",
                low.len(),
                high.len()
            )));
        }
        if low.iter().zip(&high).any(|(l, h)| l > h) {
            return Err(RelabelError::Configuration(
                "box lower bound exceeds upper bound".to_string(),
            ));
        }
        Ok(Self { low, high })
    }

    pub fn uniform(dim: usize, low: f32, high: f32) -> Self {
        Self {
            low: vec![low; dim],
            high: vec![high; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vec<f32> {
        self.low
            .iter()
            .zip(&self.high)
            .map(|(&l, &h)| if l < h { rng.gen_range(l..h) } else { l })
            .collect()
    }

    pub fn contains(&self, x: &[f32]) -> bool {
        x.len() == self.dim()
            && x
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(v, (l, h))| v >= l && v <= h)
    }

    pub fn clip(&self, x: &[f32]) -> Vec<f32> {
        x.iter()
            .zip(self.low.iter().zip(&self.high))
            .map(|(v, (l, h))| v.clamp(*l, *h))
            .collect()
    }
}

pub trait Environment {
    fn reset(&mut self) -> Result<Vec<f32>>;

    fn step(&mut self, action: &[f32]) -> Result<StepResult>;

    fn observation_space(&self) -> &BoxSpace;

    fn action_space(&self) -> &BoxSpace;

    fn seed(&mut self, seed: u64);
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn reset(&mut self) -> Result<Vec<f32>> {
        (**self).reset()
    }

    fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        (**self).step(action)
    }

    fn observation_space(&self) -> &BoxSpace {
        (**self).observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        (**self).action_space()
    }

    fn seed(&mut self, seed: u64) {
        (**self).seed(seed)
    }
}

/// Builds a monitored, time-limited environment by name.
pub fn make(name: &str, max_episode_steps: usize, seed: u64) -> Result<Box<dyn Environment>> {
    let mut env: Box<dyn Environment> = match name {
        "point_mass" | "PointMass-v0" => Box::new(EpisodeMonitor::new(TimeLimit::new(
            PointMass::new(),
            max_episode_steps,
        )?)),
        other => {
            return Err(RelabelError::Configuration(format!(
                "unknown environment: {}",
                other
            )))
        }
    };
    env.seed(seed);
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_box_sample_within_bounds() {
        let space = BoxSpace::new(vec![-1.0, 0.0, 5.0], vec![1.0, 0.5, 5.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let x = space.sample(&mut rng);
            assert!(space.contains(&x));
        }
    }

    #[test]
    fn test_box_rejects_inverted_bounds() {
        assert!(BoxSpace::new(vec![1.0], vec![0.0]).is_err());
        assert!(BoxSpace::new(vec![0.0, 0.0], vec![1.0]).is_err());
    }

    #[test]
    fn test_make_unknown_env() {
        let err = make("HalfCheetah-v2", 100, 0).err().unwrap();
        assert!(matches!(err, RelabelError::Configuration(_)));
    }

    #[test]
    fn test_make_point_mass() {
        let mut env = make("point_mass", 10, 0).unwrap();
        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), env.observation_space().dim());
    }
}
