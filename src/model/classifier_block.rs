//! Classification variant of the masked convolution block
//!
//! Same two-stage masked structure as the flow block, but each stage-2 unit
//! convolves only its own stage-1 output with an independent kernel and an
//! independent center. Centers pass through softplus before masking, so the
//! diagonal tap of every effective kernel is strictly positive. No
//! log-determinant is tracked.

use burn::{
    module::{Module, Param},
    nn::Initializer,
    prelude::*,
    tensor::activation::softplus,
};
use tracing::debug;

use super::masked::{init_center, MaskedConv, MaskedKernel};
use super::ops::{as_scalar4, average, elu, residual_gate};
use crate::error::{LayerError, Result};
use crate::masks::MaskOrder;

/// Masked convolution block for the classification network
#[derive(Module, Debug)]
pub struct ClassifierBlock<B: Backend> {
    stage1: Vec<MaskedConv<B>>,
    centers1: Vec<Param<Tensor<B, 4>>>,
    stage2: Vec<MaskedConv<B>>,
    centers2: Vec<Param<Tensor<B, 4>>>,
    res: Param<Tensor<B, 1>>,
    kernel: MaskedKernel<B>,
    latent_dim: usize,
}

impl<B: Backend> ClassifierBlock<B> {
    pub fn new(
        device: &B::Device,
        latent_dim: usize,
        input_dim: usize,
        kernel: usize,
        order: MaskOrder,
    ) -> Result<Self> {
        if latent_dim == 0 {
            return Err(LayerError::InvalidLatentDim(latent_dim));
        }
        let masked = MaskedKernel::new(device, input_dim, kernel, order)?;

        let units = |_: usize| MaskedConv::new(device, input_dim, kernel);
        let centers = |_: usize| init_center(device, input_dim, kernel);

        debug!(
            "Built classifier block {} (latent_dim={}, input_dim={}, kernel={})",
            order.label(),
            latent_dim,
            input_dim,
            kernel
        );

        Ok(Self {
            stage1: (0..latent_dim).map(units).collect(),
            centers1: (0..latent_dim).map(centers).collect(),
            stage2: (0..latent_dim).map(units).collect(),
            centers2: (0..latent_dim).map(centers).collect(),
            res: Initializer::Ones.init([1], device),
            kernel: masked,
            latent_dim,
        })
    }

    /// Forward-ordered block (variant A)
    pub fn forward_ordered(
        device: &B::Device,
        latent_dim: usize,
        input_dim: usize,
        kernel: usize,
    ) -> Result<Self> {
        Self::new(device, latent_dim, input_dim, kernel, MaskOrder::Forward)
    }

    /// Reverse-ordered block (variant B)
    pub fn reverse_ordered(
        device: &B::Device,
        latent_dim: usize,
        input_dim: usize,
        kernel: usize,
    ) -> Result<Self> {
        Self::new(device, latent_dim, input_dim, kernel, MaskOrder::Reverse)
    }

    /// Forward pass, output has the shape of `x`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.kernel.check_input(x.dims());

        let residual = x.clone();

        let latent2: Vec<Tensor<B, 4>> = self
            .stage1
            .iter()
            .zip(self.centers1.iter())
            .zip(self.stage2.iter().zip(self.centers2.iter()))
            .map(|((conv1, center1), (conv2, center2))| {
                let hidden = self.kernel.conv(
                    x.clone(),
                    conv1.weight.val(),
                    softplus(center1.val(), 1.0),
                    conv1.bias.val(),
                );
                self.kernel.conv(
                    elu(hidden),
                    conv2.weight.val(),
                    softplus(center2.val(), 1.0),
                    conv2.bias.val(),
                )
            })
            .collect();

        let gate = residual_gate(self.res.val());
        average(latent2) + as_scalar4(gate) * residual
    }

    pub fn order(&self) -> MaskOrder {
        self.kernel.order()
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    pub fn input_dim(&self) -> usize {
        self.kernel.input_dim()
    }

    /// Current effective residual gate
    pub fn gate(&self) -> Tensor<B, 1> {
        residual_gate(self.res.val())
    }

    /// Replace the residual gate parameter
    pub fn with_residual(mut self, value: f32) -> Self {
        let device = self.res.val().device();
        self.res = Param::from_tensor(Tensor::from_floats([value], &device));
        self
    }

    /// Softplus-transformed diagonal centers of stage 1, `[latent_dim, C]`
    pub fn stage1_diagonals(&self) -> Tensor<B, 2> {
        let c = self.kernel.input_dim();
        let rows = self
            .centers1
            .iter()
            .map(|center| {
                self.kernel
                    .center_diagonal(softplus(center.val(), 1.0))
                    .reshape([1, c])
            })
            .collect();
        Tensor::cat(rows, 0)
    }
}
