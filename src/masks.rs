//! Autoregressive Mask Generator
//!
//! Builds the three binary masks shared by every stage of a masked convolution
//! block. All masks have shape `[input_dim, input_dim, kernel, kernel]`
//! (output channel, input channel, kernel row, kernel column):
//!
//! - `mask0`: ones except the diagonal tap `[c, c, mid, mid]`, which removes the
//!   ordinary weight's self-connection
//! - `mask1`: zeros except the diagonal tap, which selects the learned center
//! - `mask`: the causal ordering over (channel, position) pairs
//!
//! The forward order (variant A) lets an output see every row above the
//! center, and on the center row the columns left of center, plus the center
//! column of lower-indexed channels. The reverse order (variant B) is the
//! mirror image. Together they cover every off-diagonal tap exactly once.

use burn::prelude::*;
use ndarray::{s, Array4};

use crate::error::{LayerError, Result};

/// Raster order enforced by a mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskOrder {
    /// Variant A: rows above the center, left part of the center row
    Forward,
    /// Variant B: rows below the center, right part of the center row
    Reverse,
}

impl MaskOrder {
    /// Short label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            MaskOrder::Forward => "A",
            MaskOrder::Reverse => "B",
        }
    }
}

/// The mask triple of one block
#[derive(Debug, Clone, PartialEq)]
pub struct MaskSet {
    /// Zero on the diagonal tap, one elsewhere
    pub mask0: Array4<f32>,
    /// One on the diagonal tap, zero elsewhere
    pub mask1: Array4<f32>,
    /// Causal ordering mask
    pub mask: Array4<f32>,
    order: MaskOrder,
    input_dim: usize,
    kernel: usize,
}

/// Check the kernel/channel preconditions shared by masks and blocks
pub fn validate_geometry(input_dim: usize, kernel: usize) -> Result<()> {
    if kernel == 0 || kernel % 2 == 0 {
        return Err(LayerError::InvalidKernel(kernel));
    }
    if input_dim == 0 {
        return Err(LayerError::InvalidInputDim(input_dim));
    }
    Ok(())
}

impl MaskSet {
    /// Build the masks for `input_dim` channels and an odd `kernel`
    pub fn new(input_dim: usize, kernel: usize, order: MaskOrder) -> Result<Self> {
        validate_geometry(input_dim, kernel)?;

        let shape = (input_dim, input_dim, kernel, kernel);
        let mid = kernel / 2;

        let mut mask0 = Array4::<f32>::ones(shape);
        let mut mask1 = Array4::<f32>::zeros(shape);
        let mut mask = Array4::<f32>::ones(shape);

        for c in 0..input_dim {
            mask0[[c, c, mid, mid]] = 0.0;
            mask1[[c, c, mid, mid]] = 1.0;

            match order {
                MaskOrder::Forward => {
                    mask.slice_mut(s![c, .., mid + 1.., ..]).fill(0.0);
                    // current and earlier channels: up to and including the center
                    mask.slice_mut(s![c, ..=c, mid, mid + 1..]).fill(0.0);
                    // later channels: strictly left of the center
                    mask.slice_mut(s![c, c + 1.., mid, mid..]).fill(0.0);
                }
                MaskOrder::Reverse => {
                    mask.slice_mut(s![c, .., ..mid, ..]).fill(0.0);
                    // current and later channels: from the center onward
                    mask.slice_mut(s![c, c.., mid, ..mid]).fill(0.0);
                    // earlier channels: strictly right of the center
                    mask.slice_mut(s![c, ..c, mid, ..=mid]).fill(0.0);
                }
            }
        }

        Ok(Self {
            mask0,
            mask1,
            mask,
            order,
            input_dim,
            kernel,
        })
    }

    pub fn order(&self) -> MaskOrder {
        self.order
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn kernel(&self) -> usize {
        self.kernel
    }

    /// Index of the kernel center along both spatial axes
    pub fn mid(&self) -> usize {
        self.kernel / 2
    }

    /// Number of taps each mask covers
    pub fn numel(&self) -> usize {
        self.input_dim * self.input_dim * self.kernel * self.kernel
    }

    /// Upload the triple as constant tensors `(mask0, mask1, mask)`
    pub fn to_tensors<B: Backend>(
        &self,
        device: &B::Device,
    ) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>) {
        (
            array_to_tensor(&self.mask0, device),
            array_to_tensor(&self.mask1, device),
            array_to_tensor(&self.mask, device),
        )
    }
}

/// ndarray -> Tensor
fn array_to_tensor<B: Backend>(arr: &Array4<f32>, device: &B::Device) -> Tensor<B, 4> {
    let shape = arr.shape();
    let data: Vec<f32> = arr.iter().copied().collect();
    Tensor::from_data(
        TensorData::new(data, [shape[0], shape[1], shape[2], shape[3]]),
        device,
    )
}
