// Actor Network - Tanh-squashed Gaussian Policy
use tch::{nn, nn::Module, Kind, Tensor};

const LOG_STD_MIN: f64 = -20.0;
const LOG_STD_MAX: f64 = 2.0;

#[derive(Debug)]
pub struct ActorNetwork {
    trunk: Vec<nn::Linear>,
    mean_layer: nn::Linear,
    log_std_layer: nn::Linear,
}

impl ActorNetwork {
    pub fn new(vs: &nn::Path, obs_dim: i64, action_dim: i64, hidden_layers: &[i64]) -> Self {
        let (trunk, last) = super::mlp_trunk(vs, obs_dim, hidden_layers);
        let mean_layer = nn::linear(vs / "mean", last, action_dim, Default::default());
        let log_std_layer = nn::linear(vs / "log_std", last, action_dim, Default::default());

        Self {
            trunk,
            mean_layer,
            log_std_layer,
        }
    }

    pub fn forward(&self, obs: &Tensor) -> (Tensor, Tensor) {
        let x = self
            .trunk
            .iter()
            .fold(obs.to_kind(Kind::Float), |x, layer| layer.forward(&x).relu());

        let mean = x.apply(&self.mean_layer);
        let log_std = x.apply(&self.log_std_layer).clamp(LOG_STD_MIN, LOG_STD_MAX);

        (mean, log_std)
    }

    /// Reparameterized sample. `noise` is standard normal with the shape of
    /// the action batch.
    pub fn sample(&self, obs: &Tensor, noise: &Tensor) -> (Tensor, Tensor) {
        let (mean, log_std) = self.forward(obs);
        let std = log_std.exp();

        let x_t = &mean + &std * noise;
        let action = x_t.tanh();
        let log_prob = Self::log_prob(&mean, &log_std, &x_t, &action);

        (action, log_prob)
    }

    /// Action for acting in the environment. The base distribution's
    /// standard deviation is scaled by `temperature`; zero gives the mode.
    pub fn act(&self, obs: &Tensor, noise: &Tensor, temperature: f64) -> Tensor {
        let (mean, log_std) = self.forward(obs);
        if temperature == 0.0 {
            return mean.tanh();
        }
        (&mean + log_std.exp() * temperature * noise).tanh()
    }

    fn log_prob(mean: &Tensor, log_std: &Tensor, x_t: &Tensor, action: &Tensor) -> Tensor {
        let var = (log_std * 2.0).exp();

        let log_prob: Tensor = -0.5
            * (((x_t - mean).pow_tensor_scalar(2) / &var)
                + (2.0 * std::f64::consts::PI * &var).log());
        let log_prob = log_prob.sum_dim_intlist(&[-1i64][..], false, Kind::Float);

        // Tanh squashing correction
        let tanh_correction = (-action.pow_tensor_scalar(2) + (1.0 + 1e-6))
            .log()
            .sum_dim_intlist(&[-1i64][..], false, Kind::Float);

        log_prob - tanh_correction
    }
}
