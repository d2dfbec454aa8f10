//! Masked convolution building blocks
//!
//! `MaskedKernel` holds the constant mask triple of a block and turns raw
//! weights and centers into effective kernels. `MaskedConv` is one trainable
//! (weight, bias) pair.

use burn::{
    module::{Ignored, Module, Param},
    nn::Initializer,
    prelude::*,
    tensor::{module::conv2d, ops::ConvOptions},
};

use crate::error::Result;
use crate::masks::{MaskOrder, MaskSet};

/// Constant masks of one block plus the geometry needed to apply them
#[derive(Module, Debug)]
pub struct MaskedKernel<B: Backend> {
    /// Zero on the diagonal tap
    mask0: Tensor<B, 4>,
    /// One on the diagonal tap
    mask1: Tensor<B, 4>,
    /// Causal ordering
    mask: Tensor<B, 4>,
    order: Ignored<MaskOrder>,
    input_dim: usize,
    kernel: usize,
}

impl<B: Backend> MaskedKernel<B> {
    pub fn new(
        device: &B::Device,
        input_dim: usize,
        kernel: usize,
        order: MaskOrder,
    ) -> Result<Self> {
        let masks = MaskSet::new(input_dim, kernel, order)?;
        let (mask0, mask1, mask) = masks.to_tensors(device);

        Ok(Self {
            mask0,
            mask1,
            mask,
            order: Ignored(order),
            input_dim,
            kernel,
        })
    }

    pub fn order(&self) -> MaskOrder {
        self.order.0
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn kernel(&self) -> usize {
        self.kernel
    }

    /// Constant mask tensors `(mask0, mask1, mask)`
    pub fn masks(&self) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>) {
        (self.mask0.clone(), self.mask1.clone(), self.mask.clone())
    }

    /// Effective kernel: `(weight * mask0 + center * mask1) * mask`
    ///
    /// `center` must already carry any positivity transform.
    pub fn compose(&self, weight: Tensor<B, 4>, center: Tensor<B, 4>) -> Tensor<B, 4> {
        (weight * self.mask0.clone() + center * self.mask1.clone()) * self.mask.clone()
    }

    /// Same-size convolution with the effective kernel
    pub fn conv(
        &self,
        x: Tensor<B, 4>,
        weight: Tensor<B, 4>,
        center: Tensor<B, 4>,
        bias: Tensor<B, 1>,
    ) -> Tensor<B, 4> {
        let padding = self.kernel / 2;
        let options = ConvOptions::new([1, 1], [padding, padding], [1, 1], 1);
        conv2d(x, self.compose(weight, center), Some(bias), options)
    }

    /// Diagonal center values `center[c, c, mid, mid]` shaped `[1, C, 1, 1]`
    pub fn center_diagonal(&self, center: Tensor<B, 4>) -> Tensor<B, 4> {
        (center * self.mask1.clone())
            .sum_dim(3)
            .sum_dim(2)
            .sum_dim(1)
            .reshape([1, self.input_dim, 1, 1])
    }

    /// Panics unless `dims` is a valid block input
    pub fn check_input(&self, dims: [usize; 4]) {
        let [_batch, channels, height, width] = dims;
        assert_eq!(
            channels, self.input_dim,
            "masked block {} expects {} channels, got input of shape {:?}",
            self.order.0.label(),
            self.input_dim,
            dims
        );
        assert!(
            height >= self.kernel && width >= self.kernel,
            "masked block {} needs spatial size >= kernel {}, got input of shape {:?}",
            self.order.0.label(),
            self.kernel,
            dims
        );
    }
}

/// Trainable weight and bias of one masked convolution
#[derive(Module, Debug)]
pub struct MaskedConv<B: Backend> {
    pub weight: Param<Tensor<B, 4>>,
    pub bias: Param<Tensor<B, 1>>,
}

impl<B: Backend> MaskedConv<B> {
    /// Xavier-normal weight, standard normal bias
    pub fn new(device: &B::Device, input_dim: usize, kernel: usize) -> Self {
        let fan = input_dim * kernel * kernel;
        let weight = Initializer::XavierNormal { gain: 1.0 }.init_with(
            [input_dim, input_dim, kernel, kernel],
            Some(fan),
            Some(fan),
            device,
        );
        let bias = Initializer::Normal {
            mean: 0.0,
            std: 1.0,
        }
        .init([input_dim], device);

        Self { weight, bias }
    }
}

/// Standard normal center parameter of shape `[C, C, k, k]`
pub fn init_center<B: Backend>(
    device: &B::Device,
    input_dim: usize,
    kernel: usize,
) -> Param<Tensor<B, 4>> {
    Initializer::Normal {
        mean: 0.0,
        std: 1.0,
    }
    .init([input_dim, input_dim, kernel, kernel], device)
}
