//! Per-worker working state: activations, errors and gradient accumulators
//!
//! A [`Workspace`] never owns weights. Every operation takes the parameters
//! by reference, so any number of workspaces can evaluate the same
//! [`Parameters`] at once (`&Parameters` is shared), while folding gradients
//! back needs `&mut Parameters`. That borrow is the barrier between
//! concurrent forward/backward passes and gradient application.

use std::sync::Arc;

use crate::activation::{relu, relu_prime, sigmoid, sigmoid_prime};
use crate::cost::CostFunction;
use crate::gradients::Gradients;
use crate::matrix::Matrix;
use crate::network::Parameters;
use crate::topology::Topology;

#[derive(Debug, Clone)]
pub struct Workspace {
    topology: Arc<Topology>,
    activations: Vec<Matrix>,
    errors: Vec<Matrix>,
    weight_gradients: Vec<Gradients>,
    bias_gradients: Vec<Gradients>,
}

impl Workspace {
    /// Fresh zeroed state for `topology`.
    pub fn new(topology: Arc<Topology>) -> Self {
        let layer_count = topology.layer_count();
        let mut activations = Vec::with_capacity(layer_count);
        let mut errors = Vec::with_capacity(layer_count);
        let mut weight_gradients = Vec::with_capacity(layer_count);
        let mut bias_gradients = Vec::with_capacity(layer_count);

        for (input, output) in topology.layer_shapes() {
            activations.push(Matrix::vector(output));
            errors.push(Matrix::vector(output));
            weight_gradients.push(Gradients::new(output, input));
            bias_gradients.push(Gradients::new(output, 1));
        }

        Self {
            topology,
            activations,
            errors,
            weight_gradients,
            bias_gradients,
        }
    }

    #[inline]
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Post-activation outputs of layer `layer` from the last forward pass.
    #[inline]
    pub fn activations(&self, layer: usize) -> &Matrix {
        &self.activations[layer]
    }

    /// Back-propagated error of layer `layer` from the last backward pass.
    #[inline]
    pub fn errors(&self, layer: usize) -> &Matrix {
        &self.errors[layer]
    }

    #[inline]
    pub fn activations_mut(&mut self, layer: usize) -> &mut Matrix {
        &mut self.activations[layer]
    }

    #[inline]
    pub fn weight_gradients(&self, layer: usize) -> &Gradients {
        &self.weight_gradients[layer]
    }

    #[inline]
    pub fn bias_gradients(&self, layer: usize) -> &Gradients {
        &self.bias_gradients[layer]
    }

    /// Whether no gradient is pending in any layer.
    pub fn gradients_clear(&self) -> bool {
        self.weight_gradients.iter().all(Gradients::is_clear)
            && self.bias_gradients.iter().all(Gradients::is_clear)
    }

    fn check_parameters(&self, params: &Parameters) {
        assert!(
            Arc::ptr_eq(&self.topology, params.topology()) || *self.topology == **params.topology(),
            "workspace topology {} does not match parameters {}",
            self.topology,
            params.topology()
        );
    }

    /// Forward pass over the active feature indices.
    ///
    /// Layer 0 adds one weight column per active index instead of a dense
    /// product, so cost grows with the number of active features only.
    /// Returns the single output activation.
    ///
    /// Panics if the output width is not 1 or an index is `>= inputs`.
    pub fn predict(&mut self, params: &Parameters, input: &[u16]) -> f32 {
        assert_eq!(
            self.topology.outputs(),
            1,
            "predict requires a single output, topology is {}",
            self.topology
        );
        self.check_parameters(params);

        let layers = params.layers();
        let last = layers.len() - 1;

        // 入力層（スパース）
        let first = &layers[0];
        let acc = self.activations[0].as_mut_slice();
        acc.fill(0.0);
        for &idx in input {
            let column = first.weights.column(u32::from(idx));
            for (a, &w) in acc.iter_mut().zip(column) {
                *a += w;
            }
        }
        activate(acc, first.biases.as_slice(), last == 0);

        for i in 1..=last {
            let (prev, rest) = self.activations.split_at_mut(i);
            let input = prev[i - 1].as_slice();
            let out = rest[0].as_mut_slice();
            let layer = &layers[i];

            out.fill(0.0);
            for (k, &a) in input.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                for (o, &w) in out.iter_mut().zip(layer.weights.column(k as u32)) {
                    *o += a * w;
                }
            }
            activate(out, layer.biases.as_slice(), i == last);
        }

        self.activations[last].as_slice()[0]
    }

    /// Back-propagate `output_gradient` (already multiplied by the output
    /// activation's derivative) through every layer, overwriting all errors.
    pub fn find_errors(&mut self, params: &Parameters, output_gradient: f32) {
        self.check_parameters(params);

        let layers = params.layers();
        let last = layers.len() - 1;

        let out = self.errors[last].as_mut_slice();
        out.fill(0.0);
        out[0] = output_gradient;

        for i in (0..last).rev() {
            let (lower, upper) = self.errors.split_at_mut(i + 1);
            let err = lower[i].as_mut_slice();
            let next = upper[0].as_slice();
            let weights = &layers[i + 1].weights;
            let acts = self.activations[i].as_slice();

            for (k, e) in err.iter_mut().enumerate() {
                // column k = weights (j, k) for every neuron j of the next layer
                let sum: f32 = weights
                    .column(k as u32)
                    .iter()
                    .zip(next)
                    .map(|(&w, &n)| w * n)
                    .sum();
                *e = sum * relu_prime(acts[k]);
            }
        }
    }

    /// Accumulate this sample's contribution into the gradient sums.
    ///
    /// Layer 0 only touches the columns of active features.
    pub fn update_gradients(&mut self, input: &[u16]) {
        let err = self.errors[0].as_slice();
        for &idx in input {
            self.weight_gradients[0].update_column(u32::from(idx), err);
        }
        self.bias_gradients[0].update_column(0, err);

        for i in 1..self.errors.len() {
            let err = self.errors[i].as_slice();
            let prev = self.activations[i - 1].as_slice();

            self.bias_gradients[i].update_column(0, err);

            let grads = &mut self.weight_gradients[i];
            for (k, &a) in prev.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                for (j, &e) in err.iter().enumerate() {
                    grads.update(j as u32, k as u32, a * e);
                }
            }
        }
    }

    /// One training sample: forward, cost gradient, backward, accumulate.
    ///
    /// Returns the validation cost of the prediction, which does not feed
    /// back into the gradients.
    pub fn train(
        &mut self,
        params: &Parameters,
        input: &[u16],
        eval_target: f32,
        wdl_target: f32,
        cost: &CostFunction,
    ) -> f32 {
        let prediction = self.predict(params, input);
        let output_gradient =
            cost.gradient(prediction, eval_target, wdl_target) * sigmoid_prime(prediction);
        self.find_errors(params, output_gradient);
        self.update_gradients(input);
        cost.validation_cost(prediction, eval_target, wdl_target)
    }

    /// Flush every layer's accumulators into `params` and clear them.
    pub fn apply_gradients(&mut self, params: &mut Parameters, learning_rate: f32) {
        self.check_parameters(params);
        for (i, layer) in params.layers_mut().iter_mut().enumerate() {
            self.bias_gradients[i].apply(&mut layer.biases, learning_rate);
            self.weight_gradients[i].apply(&mut layer.weights, learning_rate);
        }
    }

    /// Drop pending gradients without applying them.
    pub fn reset_gradients(&mut self) {
        self.weight_gradients.iter_mut().for_each(Gradients::reset);
        self.bias_gradients.iter_mut().for_each(Gradients::reset);
    }
}

/// Add biases and apply ReLU, or sigmoid on the output layer.
#[inline]
fn activate(values: &mut [f32], biases: &[f32], output_layer: bool) {
    debug_assert_eq!(values.len(), biases.len());
    if output_layer {
        for (v, &b) in values.iter_mut().zip(biases) {
            *v = sigmoid(*v + b);
        }
    } else {
        for (v, &b) in values.iter_mut().zip(biases) {
            *v = relu(*v + b);
        }
    }
}
