//! Layer sizes of a network

use crate::error::{NetworkError, Result};

/// Input width, hidden widths in depth order, and output width.
///
/// `hidden` may be empty, in which case the network is a single
/// `outputs x inputs` layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topology {
    inputs: u32,
    outputs: u32,
    hidden: Vec<u32>,
}

impl Topology {
    pub fn new(inputs: u32, outputs: u32, hidden: Vec<u32>) -> Result<Self> {
        if inputs == 0 {
            return Err(NetworkError::InvalidTopology("input width must be > 0".to_owned()));
        }
        if outputs == 0 {
            return Err(NetworkError::InvalidTopology("output width must be > 0".to_owned()));
        }
        if let Some(i) = hidden.iter().position(|&w| w == 0) {
            return Err(NetworkError::InvalidTopology(format!(
                "hidden layer {i} width must be > 0"
            )));
        }
        Ok(Self {
            inputs,
            outputs,
            hidden,
        })
    }

    #[inline]
    pub fn inputs(&self) -> u32 {
        self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> u32 {
        self.outputs
    }

    #[inline]
    pub fn hidden(&self) -> &[u32] {
        &self.hidden
    }

    /// Number of weight layers (`hidden.len() + 1`).
    #[inline]
    pub fn layer_count(&self) -> usize {
        self.hidden.len() + 1
    }

    /// `(input_width, output_width)` of each weight layer, in order.
    pub fn layer_shapes(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let widths = self.hidden.iter().copied().chain(std::iter::once(self.outputs));
        let mut input = self.inputs;
        widths.map(move |output| {
            let shape = (input, output);
            input = output;
            shape
        })
    }

    /// Output width of layer `layer`.
    #[inline]
    pub fn output_width(&self, layer: usize) -> u32 {
        if layer == self.hidden.len() { self.outputs } else { self.hidden[layer] }
    }

    /// Total weights + biases, or `None` on overflow.
    pub fn parameter_count(&self) -> Option<u64> {
        self.layer_shapes().try_fold(0u64, |acc, (input, output)| {
            let weights = u64::from(input).checked_mul(u64::from(output))?;
            acc.checked_add(weights)?.checked_add(u64::from(output))
        })
    }
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inputs)?;
        for h in &self.hidden {
            write!(f, "->{h}")?;
        }
        write!(f, "->{}", self.outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_shapes() {
        let top = Topology::new(768, 1, vec![256, 32]).unwrap();
        let shapes: Vec<_> = top.layer_shapes().collect();
        assert_eq!(shapes, vec![(768, 256), (256, 32), (32, 1)]);
        assert_eq!(top.layer_count(), 3);
        assert_eq!(top.output_width(1), 32);
        assert_eq!(top.output_width(2), 1);
    }

    #[test]
    fn test_no_hidden_layers() {
        let top = Topology::new(10, 1, vec![]).unwrap();
        assert_eq!(top.layer_shapes().collect::<Vec<_>>(), vec![(10, 1)]);
        assert_eq!(top.parameter_count(), Some(11));
    }

    #[test]
    fn test_parameter_count() {
        let top = Topology::new(4, 1, vec![2]).unwrap();
        // 4*2 + 2 + 2*1 + 1
        assert_eq!(top.parameter_count(), Some(13));
    }

    #[test]
    fn test_zero_width_rejected() {
        assert!(Topology::new(0, 1, vec![]).is_err());
        assert!(Topology::new(4, 0, vec![]).is_err());
        assert!(matches!(
            Topology::new(4, 1, vec![8, 0]),
            Err(NetworkError::InvalidTopology(_))
        ));
    }

    #[test]
    fn test_display() {
        let top = Topology::new(768, 1, vec![256]).unwrap();
        assert_eq!(top.to_string(), "768->256->1");
    }
}
