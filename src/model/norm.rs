//! Data-dependent per-sample normalization
//!
//! Computes one shift and one scale for each of the `num_inputs` samples from
//! the first batch it sees, then applies `(x - shift) * scale`. The layer has
//! two explicit states and moves from `Uninitialized` to `Initialized`
//! exactly once through [`GroupNorm::initialize`].

use burn::prelude::*;
use tracing::debug;

use crate::error::{LayerError, Result};

const EPS: f64 = 1e-6;

/// Lifecycle of a [`GroupNorm`]
#[derive(Debug, Clone)]
pub enum NormState<B: Backend> {
    Uninitialized,
    Initialized {
        /// Reciprocal standard deviation per sample, `[num_inputs]`
        scale: Tensor<B, 1>,
        /// Mean per sample, `[num_inputs]`
        shift: Tensor<B, 1>,
    },
}

/// Per-sample normalization initialized from a sample batch
#[derive(Debug, Clone)]
pub struct GroupNorm<B: Backend> {
    num_inputs: usize,
    state: NormState<B>,
}

impl<B: Backend> GroupNorm<B> {
    pub fn new(num_inputs: usize) -> Self {
        Self {
            num_inputs,
            state: NormState::Uninitialized,
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn state(&self) -> &NormState<B> {
        &self.state
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, NormState::Initialized { .. })
    }

    /// Compute shift and scale from `sample`; allowed once
    pub fn initialize(&mut self, sample: Tensor<B, 4>) -> Result<()> {
        if self.is_initialized() {
            return Err(LayerError::AlreadyInitialized);
        }
        let [batch, channels, height, width] = sample.dims();
        if batch != self.num_inputs {
            return Err(LayerError::InvalidConfig(format!(
                "group norm built for {} samples, initialized with {}",
                self.num_inputs, batch
            )));
        }

        let flat: Tensor<B, 2> = sample.reshape([batch, channels * height * width]).detach();
        let (var, mean) = flat.var_mean(1);
        let scale = var.sqrt().add_scalar(EPS).recip().reshape([batch]);
        let shift = mean.reshape([batch]);

        debug!("Initialized group norm over {} samples", batch);
        self.state = NormState::Initialized { scale, shift };
        Ok(())
    }

    /// Normalize `x`, which must have `num_inputs` samples
    pub fn forward(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        match &self.state {
            NormState::Uninitialized => Err(LayerError::NotInitialized),
            NormState::Initialized { scale, shift } => {
                let n = self.num_inputs;
                let shift = shift.clone().reshape([n, 1, 1, 1]);
                let scale = scale.clone().reshape([n, 1, 1, 1]);
                Ok((x - shift) * scale)
            }
        }
    }
}
