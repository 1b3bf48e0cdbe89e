// Deterministic policy evaluation
use crate::env::Environment;
use crate::error::Result;
use crate::rng::SuppliedRng;
use crate::trainers::agent::Agent;
use crate::trainers::stats::{flatten, Metrics, MetricsAccumulator};

/// Runs `num_episodes` full episodes with the temperature-0 policy and
/// averages the flattened info of every step.
pub fn evaluate<A, E>(
    agent: &A,
    env: &mut E,
    num_episodes: usize,
    rng: &mut SuppliedRng,
) -> Result<Metrics>
where
    A: Agent,
    E: Environment + ?Sized,
{
    let mut stats = MetricsAccumulator::new();

    for episode in 0..num_episodes {
        let mut observation = env.reset()?;
        let mut steps = 0usize;
        loop {
            let action = agent.sample_actions(&observation, rng.next_key(), 0.0)?;
            let result = env.step(&action)?;
            stats.add(&flatten(&result.info, "."));
            steps += 1;
            if result.done {
                break;
            }
            observation = result.observation;
        }
        log::debug!("Evaluation episode {} finished after {} steps", episode, steps);
    }

    Ok(stats.means())
}
