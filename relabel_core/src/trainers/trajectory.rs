// Per-episode trajectory accumulated before reward relabeling
use crate::env::{Info, TRUNCATION_KEY};
use crate::error::{RelabelError, Result};
use crate::trainers::sac::replay_buffer::{ReplayBuffer, Transition};

/// 0 when the episode ended for a true terminal reason, 1 otherwise.
/// The presence of the truncation key marks a time-limit end, whatever its value.
pub fn compute_mask(done: bool, info: &Info) -> f32 {
    if done && !info.contains_key(TRUNCATION_KEY) {
        0.0
    } else {
        1.0
    }
}

#[derive(Debug, Default, Clone)]
pub struct Trajectory {
    observations: Vec<Vec<f32>>,
    actions: Vec<Vec<f32>>,
    rewards: Vec<f32>,
    masks: Vec<f32>,
    next_observations: Vec<Vec<f32>>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        observation: Vec<f32>,
        action: Vec<f32>,
        reward: f32,
        mask: f32,
        next_observation: Vec<f32>,
    ) {
        self.observations.push(observation);
        self.actions.push(action);
        self.rewards.push(reward);
        self.masks.push(mask);
        self.next_observations.push(next_observation);
    }

    pub fn observations(&self) -> &[Vec<f32>] {
        &self.observations
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn masks(&self) -> &[f32] {
        &self.masks
    }

    /// Replaces the environment rewards with relabeled ones.
    pub fn relabel(&mut self, rewards: Vec<f32>) -> Result<()> {
        if rewards.len() != self.rewards.len() {
            return Err(RelabelError::InvariantViolation(format!(
                "relabeled {} rewards for a trajectory of length {}",
                rewards.len(),
                self.rewards.len()
            )));
        }
        self.rewards = rewards;
        Ok(())
    }

    /// Pushes every timestep into the buffer in order and leaves the
    /// trajectory empty.
    pub fn drain_into(&mut self, buffer: &mut ReplayBuffer) -> Result<usize> {
        let steps = std::mem::take(self);
        let n = steps.len();
        let rows = steps
            .observations
            .into_iter()
            .zip(steps.actions)
            .zip(steps.rewards)
            .zip(steps.masks)
            .zip(steps.next_observations);
        for ((((observations, actions), rewards), masks), next_observations) in rows {
            buffer.add_transition(&Transition {
                observations,
                actions,
                rewards,
                masks,
                next_observations,
            })?;
        }
        Ok(n)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mask_rules() {
        let mut truncated = Info::new();
        truncated.insert(TRUNCATION_KEY.to_string(), json!(true));
        let plain = Info::new();

        assert_eq!(compute_mask(true, &truncated), 1.0);
        assert_eq!(compute_mask(true, &plain), 0.0);
        assert_eq!(compute_mask(false, &plain), 1.0);
        assert_eq!(compute_mask(false, &truncated), 1.0);
    }

    #[test]
    fn test_truncation_key_presence_keeps_bootstrap() {
        let mut info = Info::new();
        info.insert(TRUNCATION_KEY.to_string(), json!(false));
        assert_eq!(compute_mask(true, &info), 1.0);
    }

    #[test]
    fn test_relabel_length_must_match() {
        let mut trajectory = Trajectory::new();
        trajectory.push(vec![0.0], vec![0.0], 1.0, 1.0, vec![1.0]);
        trajectory.push(vec![1.0], vec![0.0], 1.0, 0.0, vec![2.0]);
        assert!(trajectory.relabel(vec![0.5]).is_err());
        trajectory.relabel(vec![0.5, 0.25]).unwrap();
        assert_eq!(trajectory.rewards(), &[0.5, 0.25]);
    }

    #[test]
    fn test_drain_pushes_in_order_and_clears() {
        let mut trajectory = Trajectory::new();
        for t in 0..3 {
            let t = t as f32;
            trajectory.push(vec![t], vec![-t], 10.0 + t, 1.0, vec![t + 1.0]);
        }
        let example = Transition {
            observations: vec![0.0],
            actions: vec![0.0],
            rewards: 0.0,
            masks: 1.0,
            next_observations: vec![0.0],
        };
        let mut buffer = ReplayBuffer::create(&example, 10).unwrap();
        assert_eq!(trajectory.drain_into(&mut buffer).unwrap(), 3);
        assert!(trajectory.is_empty());
        assert_eq!(buffer.len(), 3);
        let second = buffer.get(1).unwrap();
        assert_eq!(second.observations, vec![1.0]);
        assert_eq!(second.actions, vec![-1.0]);
        assert_eq!(second.rewards, 11.0);
        assert_eq!(second.next_observations, vec![2.0]);
    }
}
