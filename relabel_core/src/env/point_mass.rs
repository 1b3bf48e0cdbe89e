// 2-D point-mass navigation task.
//
// Observation: [x, y, goal_x, goal_y]. Action: planar displacement in [-1, 1]^2
// scaled by MAX_SPEED. The episode terminates once the point reaches the goal.
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use serde_json::json;

use super::{BoxSpace, Environment, Info, StepResult};
use crate::error::{RelabelError, Result};

const MAX_SPEED: f32 = 0.1;
const GOAL_RADIUS: f32 = 0.05;
const ARENA: f32 = 1.0;

pub struct PointMass {
    position: [f32; 2],
    goal: [f32; 2],
    observation_space: BoxSpace,
    action_space: BoxSpace,
    rng: Xoshiro256StarStar,
    needs_reset: bool,
}

impl PointMass {
    pub fn new() -> Self {
        Self {
            position: [0.0; 2],
            goal: [0.0; 2],
            observation_space: BoxSpace::uniform(4, -ARENA, ARENA),
            action_space: BoxSpace::uniform(2, -1.0, 1.0),
            rng: Xoshiro256StarStar::seed_from_u64(0),
            needs_reset: true,
        }
    }

    fn observation(&self) -> Vec<f32> {
        vec![self.position[0], self.position[1], self.goal[0], self.goal[1]]
    }

    fn distance_to_goal(&self) -> f32 {
        let dx = self.position[0] - self.goal[0];
        let dy = self.position[1] - self.goal[1];
        (dx * dx + dy * dy).sqrt()
    }
}

impl Default for PointMass {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for PointMass {
    fn reset(&mut self) -> Result<Vec<f32>> {
        let start = self.observation_space.sample(&mut self.rng);
        self.position = [start[0], start[1]];
        self.goal = [start[2], start[3]];
        self.needs_reset = false;
        Ok(self.observation())
    }

    fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        if self.needs_reset {
            return Err(RelabelError::Environment(
                "step called before reset".to_string(),
            ));
        }
        if action.len() != self.action_space.dim() {
            return Err(RelabelError::Environment(format!(
                "expected action of length {}, got {}",
                self.action_space.dim(),
                action.len()
            )));
        }

        let action = self.action_space.clip(action);
        for (p, a) in self.position.iter_mut().zip(&action) {
            *p = (*p + MAX_SPEED * a).clamp(-ARENA, ARENA);
        }

        let distance = self.distance_to_goal();
        let success = distance <= GOAL_RADIUS;
        if success {
            self.needs_reset = true;
        }

        let mut info = Info::new();
        info.insert("success".to_string(), json!(success));
        info.insert("distance".to_string(), json!(distance));

        Ok(StepResult {
            observation: self.observation(),
            reward: -distance,
            done: success,
            info,
        })
    }

    fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    fn seed(&mut self, seed: u64) {
        self.rng = Xoshiro256StarStar::seed_from_u64(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_before_reset_fails() {
        let mut env = PointMass::new();
        assert!(env.step(&[0.0, 0.0]).is_err());
    }

    #[test]
    fn test_moves_toward_goal() {
        let mut env = PointMass::new();
        env.seed(11);
        let obs = env.reset().unwrap();
        let (dx, dy) = (obs[2] - obs[0], obs[3] - obs[1]);
        let norm = (dx * dx + dy * dy).sqrt().max(1e-6);
        let before = env.distance_to_goal();
        let step = env.step(&[dx / norm, dy / norm]).unwrap();
        assert!(env.distance_to_goal() < before || step.done);
        assert!(step.reward <= 0.0);
    }

    #[test]
    fn test_reaching_goal_terminates() {
        let mut env = PointMass::new();
        env.reset().unwrap();
        env.position = env.goal;
        let step = env.step(&[0.0, 0.0]).unwrap();
        assert!(step.done);
        assert_eq!(step.info["success"], json!(true));
    }

    #[test]
    fn test_seeded_resets_repeat() {
        let mut a = PointMass::new();
        let mut b = PointMass::new();
        a.seed(5);
        b.seed(5);
        assert_eq!(a.reset().unwrap(), b.reset().unwrap());
    }
}
