//! Masked Convolution Flow - Rust Implementation
//!
//! Autoregressive masked convolution blocks for invertible (flow) and
//! discriminative image models, built on the Burn deep learning framework.
//!
//! # Features
//!
//! - **Triangular masks**: forward (A) and reverse (B) raster orderings over
//!   (channel, position) pairs, plus a diagonal selector for the learned center
//! - **Two-stage masked blocks**: masked conv, nonlinearity, masked conv and a
//!   sign-gated residual connection
//! - **Log-determinant bookkeeping**: per-block diagonal Jacobian accumulation
//!   for normalizing-flow likelihoods
//! - **Space/depth rearrangement**: reversible resolution/channel reshapes
//!
//! # Example
//!
//! ```no_run
//! use burn::backend::NdArray;
//! use burn::prelude::*;
//! use masked_conv_flow::{FlowNet, NetConfig};
//!
//! let device = Default::default();
//! let config = NetConfig::default();
//! let net = FlowNet::<NdArray>::new(&device, &config).unwrap();
//!
//! let x = Tensor::<NdArray, 4>::random([2, 3, 32, 32], burn::tensor::Distribution::Default, &device);
//! let (z, log_det) = net.forward(x);
//! assert_eq!(z.dims(), [2, 3 * 32 * 32]);
//! assert_eq!(log_det.dims(), [1]);
//! ```

pub mod error;
pub mod masks;
pub mod model;

// Re-export main types for convenience
pub use error::LayerError;
pub use masks::{MaskOrder, MaskSet};
pub use model::{
    ClassifierBlock, ClassifierNet, DepthToSpace, FlowBlock, FlowNet, GroupNorm, NetConfig,
    SpaceToDepth,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default spatial kernel size of the masked convolutions
pub const DEFAULT_KERNEL: usize = 3;

/// Negative slope of the flow blocks' leaky rectifier
pub const LEAKY_SLOPE: f64 = 0.1;

/// Block size of the space/depth rearrangement built by both networks
pub const REARRANGE_BLOCK: usize = 4;
