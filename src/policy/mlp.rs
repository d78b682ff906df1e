//! Feed-forward actor-critic built from `tch::nn` layers.
//!
//! Architecture, for each of the actor and the critic tower:
//! `obs_dim → hidden → hidden → out` with the chosen activation between
//! layers. The actor emits `num_actions` logits, the critic a single value.

use rand::Rng;
use tch::{nn, nn::Module, Device, Tensor};

use super::{ActorCritic, NetworkSpec};
use crate::error::Result;
use crate::key::PrngKey;

/// Hidden-layer nonlinearity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Tanh,
    Relu,
}

impl Activation {
    fn apply(self, x: &Tensor) -> Tensor {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.relu(),
        }
    }
}

/// Separate actor and critic towers sharing nothing but the input.
pub struct MlpActorCritic {
    vs: nn::VarStore,
    actor: nn::Sequential,
    critic: nn::Sequential,
    obs_dim: usize,
    num_actions: usize,
}

impl std::fmt::Debug for MlpActorCritic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlpActorCritic")
            .field("obs_dim", &self.obs_dim)
            .field("num_actions", &self.num_actions)
            .field("device", &self.vs.device())
            .finish()
    }
}

impl MlpActorCritic {
    /// Two hidden layers of width `hidden` in each tower, double precision.
    pub fn new(
        obs_dim: usize,
        num_actions: usize,
        hidden: usize,
        activation: Activation,
        device: Device,
    ) -> Self {
        let mut vs = nn::VarStore::new(device);
        let (i, h) = (obs_dim as i64, hidden as i64);
        let (actor, critic) = {
            let p = vs.root();
            let tower = |name: &str, out: i64| {
                nn::seq()
                    .add(nn::linear(&p / format!("{}_l1", name), i, h, Default::default()))
                    .add_fn(move |x| activation.apply(x))
                    .add(nn::linear(&p / format!("{}_l2", name), h, h, Default::default()))
                    .add_fn(move |x| activation.apply(x))
                    .add(nn::linear(&p / format!("{}_out", name), h, out, Default::default()))
            };
            (tower("actor", num_actions as i64), tower("critic", 1))
        };
        vs.double();
        Self {
            vs,
            actor,
            critic,
            obs_dim,
            num_actions,
        }
    }

    /// Total number of scalars across all variables.
    pub fn num_params(&self) -> usize {
        self.vs
            .variables()
            .values()
            .map(|v| v.numel())
            .sum()
    }

    /// Re-draws every variable from `key`: scaled Glorot-uniform weights
    /// (gain `sqrt(2)` in hidden layers, 0.01 on the actor head, 1 on the
    /// critic head) and zero biases. One key per variable, in name order.
    pub fn init(&self, key: PrngKey) -> Result<()> {
        let variables = self.vs.variables();
        let mut names: Vec<&String> = variables.keys().collect();
        names.sort();
        let keys = key.split_n(names.len());
        tch::no_grad(|| {
            for (name, k) in names.into_iter().zip(keys) {
                let mut var = variables[name].shallow_clone();
                let size = var.size();
                let values: Vec<f64> = match size[..] {
                    [out, inp] => {
                        let limit = init_gain(name) * (6.0 / (inp + out) as f64).sqrt();
                        let mut rng = k.rng();
                        (0..var.numel())
                            .map(|_| rng.gen_range(-limit..=limit))
                            .collect()
                    }
                    _ => vec![0.0; var.numel()],
                };
                let src = Tensor::from_slice(&values)
                    .reshape(size)
                    .to_device(var.device());
                var.f_copy_(&src)?;
            }
            Ok(())
        })
    }
}

fn init_gain(name: &str) -> f64 {
    if name.starts_with("actor_out") {
        0.01
    } else if name.starts_with("critic_out") {
        1.0
    } else {
        std::f64::consts::SQRT_2
    }
}

impl ActorCritic for MlpActorCritic {
    fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    fn forward(&self, obs: &Tensor) -> (Tensor, Tensor) {
        (
            self.actor.forward(obs),
            self.critic.forward(obs).squeeze_dim(-1),
        )
    }
}

/// Builds [`MlpActorCritic`] networks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlpSpec {
    pub num_actions: usize,
    pub hidden: usize,
    pub activation: Activation,
    pub device: Device,
}

impl MlpSpec {
    /// Tanh towers on the CPU.
    pub fn new(num_actions: usize, hidden: usize) -> Self {
        Self {
            num_actions,
            hidden,
            activation: Activation::Tanh,
            device: Device::Cpu,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }
}

impl NetworkSpec for MlpSpec {
    type Network = MlpActorCritic;

    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn build(&self, obs_dim: usize, key: PrngKey) -> Result<MlpActorCritic> {
        let net = MlpActorCritic::new(
            obs_dim,
            self.num_actions,
            self.hidden,
            self.activation,
            self.device,
        );
        net.init(key)?;
        Ok(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Array2;
    use crate::policy::{to_tensor, to_vec};
    use tch::Kind;

    fn obs_batch() -> Tensor {
        let obs = Array2::from_rows(&[vec![0.5, -0.2, 1.0], vec![0.0, 0.3, -0.7]]).unwrap();
        to_tensor(&obs, Device::Cpu)
    }

    #[test]
    fn output_shapes_and_param_count() {
        let net = MlpSpec::new(4, 8).build(3, PrngKey::new(0)).unwrap();
        // (3*8 + 8) + (8*8 + 8) + (8*4 + 4) + (3*8 + 8) + (8*8 + 8) + (8 + 1)
        assert_eq!(net.num_params(), 32 + 72 + 36 + 32 + 72 + 9);
        assert_eq!(net.flat_params().unwrap().len(), net.num_params());
        let out = net.apply(&obs_batch()).unwrap();
        assert_eq!(out.dist.len(), 2);
        assert_eq!(out.dist.num_actions(), 4);
        assert_eq!(out.values.size(), vec![2]);
    }

    #[test]
    fn init_is_keyed() {
        let spec = MlpSpec::new(2, 4).with_activation(Activation::Relu);
        let a = spec.build(3, PrngKey::new(1)).unwrap().flat_params().unwrap();
        let b = spec.build(3, PrngKey::new(1)).unwrap().flat_params().unwrap();
        let c = spec.build(3, PrngKey::new(2)).unwrap().flat_params().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn biases_start_at_zero() {
        let net = MlpSpec::new(2, 4).build(3, PrngKey::new(4)).unwrap();
        for (name, var) in net.var_store().variables() {
            if name.ends_with("bias") {
                assert!(to_vec(&var).unwrap().iter().all(|b| *b == 0.0), "{}", name);
            }
        }
    }

    #[test]
    fn apply_rejects_wrong_obs_width() {
        let net = MlpSpec::new(2, 4).build(3, PrngKey::new(0)).unwrap();
        let obs = Tensor::zeros([2, 5], (Kind::Double, Device::Cpu));
        assert!(net.apply(&obs).is_err());
    }

    #[test]
    fn small_actor_head_gives_near_uniform_policy() {
        let net = MlpSpec::new(4, 16).build(3, PrngKey::new(7)).unwrap();
        let out = net.apply(&obs_batch()).unwrap();
        for h in to_vec(&out.dist.entropy()).unwrap() {
            assert!((h - (4.0f64).ln()).abs() < 1e-2);
        }
    }

    #[test]
    fn both_towers_receive_gradient() {
        let net = MlpSpec::new(2, 5).build(3, PrngKey::new(3)).unwrap();
        let (logits, values) = net.forward(&obs_batch());
        (logits.sum(Kind::Double) + values.sum(Kind::Double)).backward();
        for (name, var) in net.var_store().variables() {
            let grad = var.grad();
            assert!(grad.defined(), "{} has no gradient", name);
            assert!(to_vec(&grad).unwrap().iter().any(|g| *g != 0.0), "{}", name);
        }
    }
}
