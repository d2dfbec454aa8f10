//! Diagonal Jacobian accumulation for the flow blocks
//!
//! For each stage-1 unit `i` and channel `c` the block contributes
//!
//! ```text
//! center_i[c, c, mid, mid]^2 * lrelu'(pre_i[:, c, :, :])
//! ```
//!
//! Contributions are independent tensors reduced by summation, then the
//! residual gate is added and `sum(log(diag))` is returned as the block's
//! log-determinant increment.

use burn::prelude::*;

use super::ops::{as_scalar4, leaky_relu_derivative};

/// Per-block collector of diagonal Jacobian terms
#[derive(Debug)]
pub struct DiagonalJacobian<B: Backend> {
    slope: f64,
    terms: Vec<Tensor<B, 4>>,
}

impl<B: Backend> DiagonalJacobian<B> {
    /// Create an empty accumulator for a leaky rectifier with `slope`
    pub fn new(slope: f64) -> Self {
        Self {
            slope,
            terms: Vec::new(),
        }
    }

    /// Add one stage-1 unit
    ///
    /// * `center_diagonal` - diagonal center values shaped `[1, C, 1, 1]`
    /// * `pre_activation` - stage-1 output before the rectifier, `[N, C, H, W]`
    pub fn accumulate(&mut self, center_diagonal: Tensor<B, 4>, pre_activation: Tensor<B, 4>) {
        let derivative = leaky_relu_derivative(pre_activation, self.slope);
        self.terms.push(center_diagonal.powf_scalar(2.0) * derivative);
    }

    /// Number of accumulated units
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Jacobian diagonal: summed unit terms plus the residual gate
    pub fn diagonal(self, gate: Tensor<B, 1>) -> Tensor<B, 4> {
        let gate = as_scalar4(gate);
        match self.terms.into_iter().reduce(|acc, t| acc + t) {
            Some(sum) => sum + gate,
            None => gate,
        }
    }

    /// `sum(log(diagonal))` as a one-element tensor
    pub fn log_det(self, gate: Tensor<B, 1>) -> Tensor<B, 1> {
        self.diagonal(gate).log().sum()
    }
}
