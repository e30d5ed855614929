//! Trainable evaluator network
//!
//! A [`Network`] owns its [`Parameters`] (one weight matrix and one bias
//! vector per layer) and a default [`Workspace`] for single-threaded use.
//! Extra workspaces for parallel workers come from [`Network::workspace`];
//! they read the network's parameters through `&Parameters` and hand their
//! gradients back with [`Network::apply_workspace_gradients`].

use std::sync::Arc;

use log::debug;
use rand::Rng;

use crate::cost::CostFunction;
use crate::error::{NetworkError, Result};
use crate::gradients::{DEFAULT_LEARNING_RATE, Gradients};
use crate::matrix::Matrix;
use crate::topology::Topology;
use crate::workspace::Workspace;

/// One weight layer: `weights` is `output x input`, `biases` is `output x 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub weights: Matrix,
    pub biases: Matrix,
}

impl Layer {
    /// Uniform random init in `[-1/sqrt(fan_in), 1/sqrt(fan_in)]`.
    pub fn random<R: Rng + ?Sized>(input: u32, output: u32, rng: &mut R) -> Self {
        let bound = 1.0 / (input as f32).sqrt();
        Self {
            weights: Matrix::random(output, input, bound, rng),
            biases: Matrix::random(output, 1, bound, rng),
        }
    }

    #[inline]
    pub fn input_width(&self) -> u32 {
        self.weights.cols()
    }

    #[inline]
    pub fn output_width(&self) -> u32 {
        self.weights.rows()
    }
}

/// Weights and biases of every layer, shaped by a shared [`Topology`].
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    topology: Arc<Topology>,
    layers: Vec<Layer>,
}

impl Parameters {
    fn new(topology: Arc<Topology>, layers: Vec<Layer>) -> Result<Self> {
        if layers.len() != topology.layer_count() {
            return Err(NetworkError::InvalidTopology(format!(
                "expected {} layers for {topology}, got {}",
                topology.layer_count(),
                layers.len()
            )));
        }
        for (i, ((input, output), layer)) in topology.layer_shapes().zip(&layers).enumerate() {
            if layer.weights.rows() != output
                || layer.weights.cols() != input
                || layer.biases.rows() != output
                || layer.biases.cols() != 1
            {
                return Err(NetworkError::InvalidTopology(format!(
                    "layer {i}: expected weights {output}x{input} and biases {output}x1, got {}x{} and {}x{}",
                    layer.weights.rows(),
                    layer.weights.cols(),
                    layer.biases.rows(),
                    layer.biases.cols()
                )));
            }
        }
        Ok(Self { topology, layers })
    }

    #[inline]
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Mutable layers. The slice length is fixed; matrix shapes must not change.
    #[inline]
    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    #[inline]
    pub fn layer(&self, i: usize) -> &Layer {
        &self.layers[i]
    }

    #[inline]
    pub fn layer_mut(&mut self, i: usize) -> &mut Layer {
        &mut self.layers[i]
    }
}

#[derive(Debug, Clone)]
pub struct Network {
    id: u32,
    params: Parameters,
    state: Workspace,
    learning_rate: f32,
}

impl Network {
    /// Randomly initialised network with fresh working state.
    pub fn new<R: Rng + ?Sized>(topology: Topology, id: u32, rng: &mut R) -> Self {
        let topology = Arc::new(topology);
        let layers = topology
            .layer_shapes()
            .map(|(input, output)| Layer::random(input, output, rng))
            .collect();
        debug!("created network {id} with topology {topology}");
        Self::assemble(id, topology, layers)
    }

    /// Network from existing parameters; working state starts fresh.
    pub fn from_parts(id: u32, topology: Topology, layers: Vec<Layer>) -> Result<Self> {
        let params = Parameters::new(Arc::new(topology), layers)?;
        let state = Workspace::new(Arc::clone(&params.topology));
        Ok(Self {
            id,
            params,
            state,
            learning_rate: DEFAULT_LEARNING_RATE,
        })
    }

    fn assemble(id: u32, topology: Arc<Topology>, layers: Vec<Layer>) -> Self {
        let state = Workspace::new(Arc::clone(&topology));
        Self {
            id,
            params: Parameters { topology, layers },
            state,
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn topology(&self) -> &Topology {
        &self.params.topology
    }

    #[inline]
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    #[inline]
    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        self.params.layers()
    }

    #[inline]
    pub fn layer_mut(&mut self, i: usize) -> &mut Layer {
        self.params.layer_mut(i)
    }

    /// The network's own working state.
    #[inline]
    pub fn state(&self) -> &Workspace {
        &self.state
    }

    #[inline]
    pub fn activations(&self, layer: usize) -> &Matrix {
        self.state.activations(layer)
    }

    #[inline]
    pub fn errors(&self, layer: usize) -> &Matrix {
        self.state.errors(layer)
    }

    #[inline]
    pub fn weight_gradients(&self, layer: usize) -> &Gradients {
        self.state.weight_gradients(layer)
    }

    #[inline]
    pub fn bias_gradients(&self, layer: usize) -> &Gradients {
        self.state.bias_gradients(layer)
    }

    #[inline]
    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f32) -> Result<()> {
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(NetworkError::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {learning_rate}"
            )));
        }
        self.learning_rate = learning_rate;
        Ok(())
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Result<Self> {
        self.set_learning_rate(learning_rate)?;
        Ok(self)
    }

    /// Independent working state over this network's parameters.
    ///
    /// The workspace shares the parameters (it reads them through
    /// [`Network::parameters`] on every call) but owns its activations,
    /// errors and gradients.
    pub fn workspace(&self) -> Workspace {
        Workspace::new(Arc::clone(&self.params.topology))
    }

    /// Forward pass; see [`Workspace::predict`].
    #[inline]
    pub fn predict(&mut self, input: &[u16]) -> f32 {
        self.state.predict(&self.params, input)
    }

    /// Backward pass; see [`Workspace::find_errors`].
    #[inline]
    pub fn find_errors(&mut self, output_gradient: f32) {
        self.state.find_errors(&self.params, output_gradient);
    }

    #[inline]
    pub fn update_gradients(&mut self, input: &[u16]) {
        self.state.update_gradients(input);
    }

    /// Flush the network's own accumulated gradients into its parameters.
    pub fn apply_gradients(&mut self) {
        self.state.apply_gradients(&mut self.params, self.learning_rate);
    }

    /// Flush a worker's accumulated gradients into this network's parameters.
    ///
    /// Panics if `workspace` was built for a different topology.
    pub fn apply_workspace_gradients(&mut self, workspace: &mut Workspace) {
        workspace.apply_gradients(&mut self.params, self.learning_rate);
    }

    /// One training sample against the network's own state.
    #[inline]
    pub fn train(
        &mut self,
        input: &[u16],
        eval_target: f32,
        wdl_target: f32,
        cost: &CostFunction,
    ) -> f32 {
        self.state.train(&self.params, input, eval_target, wdl_target, cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::sigmoid;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn all_ones(topology: Topology) -> Network {
        let mut rng = ChaCha8Rng::seed_from_u64(30);
        let mut net = Network::new(topology, 30, &mut rng);
        for layer in net.parameters_mut().layers_mut() {
            layer.weights.fill(1.0);
            layer.biases.fill(1.0);
        }
        net
    }

    fn loss(net: &mut Network, input: &[u16], cost: &CostFunction) -> f32 {
        let p = net.predict(input);
        cost.validation_cost(p, 50.0, 1.0) / 2.0
    }

    #[test]
    fn test_predict_all_ones() {
        let mut net = all_ones(Topology::new(4, 1, vec![2]).unwrap());
        assert_eq!(net.predict(&[0, 1, 2, 3]), sigmoid(11.0));
    }

    #[test]
    fn test_predict_without_hidden_layers() {
        let mut net = all_ones(Topology::new(6, 1, vec![]).unwrap());
        // 2 active features + bias
        assert_eq!(net.predict(&[1, 4]), sigmoid(3.0));
    }

    #[test]
    fn test_predict_duplicate_index_counts_twice() {
        let mut net = all_ones(Topology::new(4, 1, vec![]).unwrap());
        assert_eq!(net.predict(&[2, 2]), sigmoid(3.0));
    }

    #[test]
    fn test_init_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let net = Network::new(Topology::new(64, 1, vec![16]).unwrap(), 1, &mut rng);
        let b0 = 1.0 / 64f32.sqrt();
        let b1 = 1.0 / 16f32.sqrt();
        assert!(net.layers()[0].weights.as_slice().iter().all(|w| w.abs() <= b0));
        assert!(net.layers()[1].weights.as_slice().iter().all(|w| w.abs() <= b1));
        assert!(net.state().gradients_clear());
        assert!(net.activations(0).as_slice().iter().all(|&a| a == 0.0));
    }

    #[test]
    fn test_seeded_init_is_deterministic() {
        let top = Topology::new(32, 1, vec![8, 4]).unwrap();
        let a = Network::new(top.clone(), 1, &mut ChaCha8Rng::seed_from_u64(9));
        let b = Network::new(top, 1, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a.parameters(), b.parameters());
    }

    #[test]
    fn test_find_errors_zero_gradient() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut net = Network::new(Topology::new(20, 1, vec![8, 4]).unwrap(), 1, &mut rng);
        net.predict(&[1, 5, 7]);
        net.find_errors(0.0);
        for i in 0..3 {
            assert!(net.errors(i).as_slice().iter().all(|&e| e == 0.0), "layer {i}");
        }
    }

    #[test]
    fn test_find_errors_gates_on_activation() {
        let mut net = all_ones(Topology::new(4, 1, vec![2]).unwrap());
        net.layer_mut(0).biases.set(1, 0, -10.0);
        net.predict(&[0, 1]);
        // hidden 0 = 3 (active), hidden 1 = relu(2 - 10) = 0
        net.find_errors(0.5);
        assert_eq!(net.errors(1).get(0, 0), 0.5);
        assert_eq!(net.errors(0).get(0, 0), 0.5);
        assert_eq!(net.errors(0).get(1, 0), 0.0);
    }

    #[test]
    fn test_apply_twice_is_noop() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut net = Network::new(Topology::new(16, 1, vec![4]).unwrap(), 1, &mut rng);
        let cost = CostFunction::default();
        net.train(&[0, 3, 9], 100.0, 1.0, &cost);
        assert!(!net.state().gradients_clear());

        net.apply_gradients();
        assert!(net.state().gradients_clear());
        let after_first = net.parameters().clone();

        net.apply_gradients();
        assert_eq!(net.parameters(), &after_first);
    }

    #[test]
    fn test_sparse_gradient_columns() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut net = Network::new(Topology::new(10, 1, vec![3]).unwrap(), 1, &mut rng);
        net.predict(&[2, 7]);
        net.find_errors(1.0);
        net.update_gradients(&[2, 7]);

        let wg = net.weight_gradients(0);
        for col in 0..10 {
            for row in 0..3 {
                let expected = if col == 2 || col == 7 { net.errors(0).get(row, 0) } else { 0.0 };
                assert_eq!(wg.get(row, col), expected);
            }
        }
    }

    #[test]
    fn test_backward_matches_numeric_gradients() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut net = Network::new(Topology::new(6, 1, vec![4, 3]).unwrap(), 1, &mut rng);
        let cost = CostFunction::default();
        let input = [0u16, 2, 5];

        net.train(&input, 50.0, 1.0, &cost);

        // train は d(cost)/d(z) = 2*(p - t) * p(1-p) を使うので、loss = cost/2 の勾配は半分
        let eps = 1e-2_f32;
        for layer_idx in 0..3 {
            let len = net.layers()[layer_idx].weights.len();
            for p in 0..len {
                let analytic = net.weight_gradients(layer_idx).as_slice()[p] / 2.0;
                let orig = net.layers()[layer_idx].weights.as_slice()[p];

                net.layer_mut(layer_idx).weights.as_mut_slice()[p] = orig + eps;
                let plus = loss(&mut net, &input, &cost);
                net.layer_mut(layer_idx).weights.as_mut_slice()[p] = orig - eps;
                let minus = loss(&mut net, &input, &cost);
                net.layer_mut(layer_idx).weights.as_mut_slice()[p] = orig;

                let numeric = (plus - minus) / (2.0 * eps);
                let diff = (analytic - numeric).abs();
                assert!(
                    diff <= 1e-3 || diff / analytic.abs().max(numeric.abs()) <= 5e-2,
                    "layer {layer_idx} weight {p}: analytic={analytic} numeric={numeric}"
                );
            }
        }
    }

    #[test]
    fn test_workspace_shares_parameters() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut net = Network::new(Topology::new(8, 1, vec![4]).unwrap(), 1, &mut rng);
        let mut worker = net.workspace();

        let before = worker.predict(net.parameters(), &[1, 2]);
        assert_eq!(before, net.predict(&[1, 2]));

        // ネットワーク側の重み変更はワーカーから見える
        net.layer_mut(1).biases.set(0, 0, 5.0);
        let after = worker.predict(net.parameters(), &[1, 2]);
        assert_ne!(before, after);
        assert_eq!(after, net.predict(&[1, 2]));

        // ワーカーの作業領域は独立
        let snapshot = net.activations(0).clone();
        worker.activations_mut(0).fill(42.0);
        assert_eq!(net.activations(0), &snapshot);
    }

    #[test]
    fn test_apply_workspace_gradients() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut net = Network::new(Topology::new(8, 1, vec![4]).unwrap(), 1, &mut rng);
        let cost = CostFunction::default();

        let mut reference = net.clone();
        reference.train(&[1, 3], -40.0, 0.0, &cost);
        reference.apply_gradients();

        let mut worker = net.workspace();
        worker.train(net.parameters(), &[1, 3], -40.0, 0.0, &cost);
        net.apply_workspace_gradients(&mut worker);

        assert!(worker.gradients_clear());
        assert_eq!(net.parameters(), reference.parameters());
    }

    #[test]
    #[should_panic]
    fn test_predict_requires_single_output() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut net = Network::new(Topology::new(4, 2, vec![]).unwrap(), 1, &mut rng);
        net.predict(&[0]);
    }

    #[test]
    #[should_panic]
    fn test_predict_index_out_of_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut net = Network::new(Topology::new(4, 1, vec![2]).unwrap(), 1, &mut rng);
        net.predict(&[4]);
    }

    #[test]
    #[should_panic]
    fn test_foreign_workspace_panics() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let net = Network::new(Topology::new(4, 1, vec![2]).unwrap(), 1, &mut rng);
        let other = Network::new(Topology::new(4, 1, vec![3]).unwrap(), 2, &mut rng);
        let mut worker = other.workspace();
        worker.predict(net.parameters(), &[0]);
    }

    #[test]
    fn test_from_parts_rejects_shape_mismatch() {
        let top = Topology::new(4, 1, vec![2]).unwrap();
        let layers = vec![
            Layer { weights: Matrix::new(2, 4), biases: Matrix::vector(2) },
            Layer { weights: Matrix::new(1, 3), biases: Matrix::vector(1) },
        ];
        assert!(matches!(
            Network::from_parts(1, top.clone(), layers),
            Err(NetworkError::InvalidTopology(_))
        ));
        assert!(Network::from_parts(1, top, vec![]).is_err());
    }

    #[test]
    fn test_learning_rate_validation() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut net = Network::new(Topology::new(4, 1, vec![]).unwrap(), 1, &mut rng);
        assert_eq!(net.learning_rate(), DEFAULT_LEARNING_RATE);
        assert!(net.set_learning_rate(0.0).is_err());
        assert!(net.set_learning_rate(f32::INFINITY).is_err());
        let net = net.with_learning_rate(0.5).unwrap();
        assert_eq!(net.learning_rate(), 0.5);
    }
}
