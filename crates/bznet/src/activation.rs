//! Activation functions

/// Rectified-linear activation used by every hidden layer.
#[inline]
pub fn relu(x: f32) -> f32 {
    x.max(0.0)
}

/// ReLU derivative gated on the post-activation value.
#[inline]
pub fn relu_prime(activation: f32) -> f32 {
    if activation > 0.0 { 1.0 } else { 0.0 }
}

/// Sigmoid used by the output layer.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Sigmoid derivative expressed on the sigmoid's output value.
#[inline]
pub fn sigmoid_prime(output: f32) -> f32 {
    output * (1.0 - output)
}
