// SAC Networks Module
pub mod actor;
pub mod critic;

pub use actor::ActorNetwork;
pub use critic::CriticNetwork;

use rand_distr::{Distribution, StandardNormal};
use tch::{nn, Device, Tensor};

use crate::rng::PrngKey;

/// Hidden layers `fc1..fcN`; returns them with the width of the last one.
fn mlp_trunk(vs: &nn::Path, input_dim: i64, hidden_layers: &[i64]) -> (Vec<nn::Linear>, i64) {
    let mut layers = Vec::with_capacity(hidden_layers.len());
    let mut width = input_dim;
    for (i, &hidden) in hidden_layers.iter().enumerate() {
        layers.push(nn::linear(
            vs / format!("fc{}", i + 1),
            width,
            hidden,
            Default::default(),
        ));
        width = hidden;
    }
    (layers, width)
}

/// Standard normal noise drawn from `key`, so sampling is reproducible
/// without touching the global torch generator.
pub fn gaussian_noise(key: PrngKey, shape: &[i64], device: Device) -> Tensor {
    let mut rng = key.into_rng();
    let n: i64 = shape.iter().product();
    let values: Vec<f32> = (0..n)
        .map(|_| StandardNormal.sample(&mut rng))
        .collect();
    Tensor::from_slice(&values).reshape(shape).to_device(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_is_keyed() {
        let a = gaussian_noise(PrngKey::new(3), &[4, 2], Device::Cpu);
        let b = gaussian_noise(PrngKey::new(3), &[4, 2], Device::Cpu);
        let c = gaussian_noise(PrngKey::new(4), &[4, 2], Device::Cpu);
        assert_eq!(a.size(), vec![4, 2]);
        assert!(a.equal(&b));
        assert!(!a.equal(&c));
    }
}
