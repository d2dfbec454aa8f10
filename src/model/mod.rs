//! Masked convolution model implementation
//!
//! Blocks, networks and the supporting layers built on Burn.

mod classifier;
mod classifier_block;
mod config;
mod flow_block;
mod flow_net;
mod jacobian;
mod masked;
mod norm;
pub mod objective;
pub mod ops;
mod rearrange;

pub use classifier::{ClassifierLayer, ClassifierNet};
pub use classifier_block::ClassifierBlock;
pub use config::{NetConfig, NetConfigBuilder};
pub use flow_block::FlowBlock;
pub use flow_net::{FlowLayer, FlowNet};
pub use jacobian::DiagonalJacobian;
pub use masked::{MaskedConv, MaskedKernel};
pub use norm::{GroupNorm, NormState};
pub use rearrange::{DepthToSpace, SpaceToDepth};
