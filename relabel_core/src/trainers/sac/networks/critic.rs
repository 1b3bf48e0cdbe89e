// Critic Network - Q-Value Network
use tch::{nn, nn::Module, Kind, Tensor};

#[derive(Debug)]
pub struct CriticNetwork {
    trunk: Vec<nn::Linear>,
    q_value: nn::Linear,
}

impl CriticNetwork {
    pub fn new(vs: &nn::Path, obs_dim: i64, action_dim: i64, hidden_layers: &[i64]) -> Self {
        let (trunk, last) = super::mlp_trunk(vs, obs_dim + action_dim, hidden_layers);
        let q_value = nn::linear(vs / "q", last, 1, Default::default());

        Self { trunk, q_value }
    }

    /// Q(s, a) with shape `[batch]`.
    pub fn forward(&self, obs: &Tensor, action: &Tensor) -> Tensor {
        let x = Tensor::cat(&[obs.to_kind(Kind::Float), action.to_kind(Kind::Float)], -1);
        let x = self
            .trunk
            .iter()
            .fold(x, |x, layer| layer.forward(&x).relu());
        x.apply(&self.q_value).squeeze_dim(-1)
    }
}
