//! Training objectives for the two networks
//!
//! Pure tensor functions; the optimization loop lives with the caller.

use burn::prelude::*;
use std::f64::consts::{LN_2, PI};

/// Log-density of `z` under a standard normal, summed per sample: `[batch]`
pub fn standard_normal_log_prob<B: Backend>(z: Tensor<B, 2>) -> Tensor<B, 1> {
    let [batch, dims] = z.dims();
    let log_norm = -0.5 * (2.0 * PI).ln() * dims as f64;
    z.powf_scalar(2.0)
        .mul_scalar(-0.5)
        .sum_dim(1)
        .add_scalar(log_norm)
        .reshape([batch])
}

/// Mean negative log-likelihood per sample, in nats
///
/// `log_det` is the network's log-determinant summed over the whole batch.
pub fn flow_nll<B: Backend>(z: Tensor<B, 2>, log_det: Tensor<B, 1>) -> Tensor<B, 1> {
    let [batch, _] = z.dims();
    let log_prob = standard_normal_log_prob(z).sum() + log_det;
    log_prob.neg().div_scalar(batch as f64)
}

/// Negative log-likelihood in bits per dimension
pub fn bits_per_dim<B: Backend>(z: Tensor<B, 2>, log_det: Tensor<B, 1>) -> Tensor<B, 1> {
    let [_, dims] = z.dims();
    flow_nll(z, log_det).div_scalar(dims as f64 * LN_2)
}

/// Mean negative log-likelihood of the target classes
pub fn nll_loss<B: Backend>(log_probs: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let selected = log_probs.gather(1, labels.unsqueeze_dim(1));
    selected.neg().mean()
}
