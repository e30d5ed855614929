//! bznet: sparse-input evaluator network (NNUE style)
//!
//! A small feed-forward network that maps a set of active binary features to
//! one scalar evaluation. The first layer is evaluated by summing one weight
//! column per active feature, so the input width can be very large.
//!
//! # 構成
//! - `matrix` / `gradients`: dense f32 containers and gradient accumulators
//! - `topology`: layer sizes
//! - `network` / `workspace`: parameters, forward/backward passes, training step
//! - `cost`: eval/WDL blended training cost
//! - `codec`: BZ binary file format
//!
//! # Example
//!
//! ```
//! use bznet::{CostFunction, Network, Topology};
//! use rand::SeedableRng;
//!
//! let topology = Topology::new(768, 1, vec![32]).unwrap();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(42);
//! let mut net = Network::new(topology, 1, &mut rng);
//!
//! let cost = CostFunction::default();
//! let _validation = net.train(&[3, 70, 512], 35.0, 1.0, &cost);
//! net.apply_gradients();
//!
//! let eval = net.predict(&[3, 70, 512]);
//! assert!((0.0..=1.0).contains(&eval));
//! ```

pub mod activation;
pub mod codec;
pub mod cost;
pub mod error;
pub mod gradients;
pub mod matrix;
pub mod network;
pub mod topology;
pub mod workspace;

pub use cost::CostFunction;
pub use error::{NetworkError, Result};
pub use gradients::{DEFAULT_LEARNING_RATE, Gradients};
pub use matrix::Matrix;
pub use network::{Layer, Network, Parameters};
pub use topology::Topology;
pub use workspace::Workspace;
