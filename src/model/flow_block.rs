//! Flow variant of the masked convolution block
//!
//! Two autoregressive stages with a leaky rectifier in between, a sign-gated
//! residual connection and diagonal Jacobian bookkeeping:
//!
//! 1. `latent_dim` stage-1 masked convolutions of the input, each followed by
//!    a leaky ReLU (slope 0.1)
//! 2. `latent_dim^2` stage-2 masked convolutions, one per ordered pair
//!    `(i, j)`, applied to stage-1 output `j` and reusing stage-1 center `j`
//! 3. mean of the stage-2 outputs plus `gate * input`
//!
//! Centers are used raw here; the Jacobian term squares the diagonal center
//! value, so its sign is irrelevant to the log-determinant. This differs from
//! the classification block, which passes centers through softplus.

use burn::{
    module::{Module, Param},
    nn::Initializer,
    prelude::*,
    tensor::activation::leaky_relu,
};
use tracing::debug;

use super::jacobian::DiagonalJacobian;
use super::masked::{init_center, MaskedConv, MaskedKernel};
use super::ops::{as_scalar4, average, residual_gate};
use crate::error::{LayerError, Result};
use crate::masks::MaskOrder;
use crate::LEAKY_SLOPE;

/// Invertible masked convolution block with log-determinant tracking
#[derive(Module, Debug)]
pub struct FlowBlock<B: Backend> {
    /// Stage-1 weights and biases, one per latent unit
    stage1: Vec<MaskedConv<B>>,
    /// Stage-1 centers, shared with stage 2
    centers: Vec<Param<Tensor<B, 4>>>,
    /// Stage-2 weights and biases, indexed `i * latent_dim + j`
    stage2: Vec<MaskedConv<B>>,
    /// Residual gate
    res: Param<Tensor<B, 1>>,
    /// Constant masks
    kernel: MaskedKernel<B>,
    latent_dim: usize,
}

impl<B: Backend> FlowBlock<B> {
    /// Create a new flow block
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

        let stage1 = (0..latent_dim)
            .map(|_| MaskedConv::new(device, input_dim, kernel))
            .collect();
        let centers = (0..latent_dim)
            .map(|_| init_center(device, input_dim, kernel))
            .collect();
        let stage2 = (0..latent_dim * latent_dim)
            .map(|_| MaskedConv::new(device, input_dim, kernel))
            .collect();
        let res = Initializer::Ones.init([1], device);

        debug!(
            "Built flow block {} (latent_dim={}, input_dim={}, kernel={})",
            order.label(),
            latent_dim,
            input_dim,
            kernel
        );

        Ok(Self {
            stage1,
            centers,
            stage2,
            res,
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

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch, channels, height, width]
    /// * `log_det` - Running log-determinant, shape [1]
    ///
    /// # Returns
    /// * Output of the same shape as `x` and the updated log-determinant
    pub fn forward(&self, x: Tensor<B, 4>, log_det: Tensor<B, 1>) -> (Tensor<B, 4>, Tensor<B, 1>) {
        self.kernel.check_input(x.dims());

        let residual = x.clone();
        let mut jacobian = DiagonalJacobian::new(LEAKY_SLOPE);

        let latent1: Vec<Tensor<B, 4>> = self
            .stage1
            .iter()
            .zip(self.centers.iter())
            .map(|(conv, center)| {
                let pre = self.kernel.conv(
                    x.clone(),
                    conv.weight.val(),
                    center.val(),
                    conv.bias.val(),
                );
                jacobian.accumulate(self.kernel.center_diagonal(center.val()), pre.clone());
                leaky_relu(pre, LEAKY_SLOPE)
            })
            .collect();

        let mut latent2 = Vec::with_capacity(self.stage2.len());
        for i in 0..self.latent_dim {
            for (j, input) in latent1.iter().enumerate() {
                let conv = &self.stage2[i * self.latent_dim + j];
                latent2.push(self.kernel.conv(
                    input.clone(),
                    conv.weight.val(),
                    self.centers[j].val(),
                    conv.bias.val(),
                ));
            }
        }

        let gate = residual_gate(self.res.val());
        let output = average(latent2) + as_scalar4(gate.clone()) * residual;
        let log_det = log_det + jacobian.log_det(gate);

        (output, log_det)
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

    /// Constant masks of this block
    pub fn masks(&self) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>) {
        self.kernel.masks()
    }

    /// Replace the residual gate parameter
    pub fn with_residual(mut self, value: f32) -> Self {
        let device = self.res.val().device();
        self.res = Param::from_tensor(Tensor::from_floats([value], &device));
        self
    }

    /// Number of trainable scalars
    pub fn num_parameters(&self) -> usize {
        let c = self.kernel.input_dim();
        let k = self.kernel.kernel();
        let conv = c * c * k * k + c;
        self.stage1.len() * conv + self.centers.len() * c * c * k * k + self.stage2.len() * conv + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray;

    fn random_input(dims: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::random(dims, burn::tensor::Distribution::Normal(0.0, 1.0), &Default::default())
    }

    fn zero_log_det() -> Tensor<TestBackend, 1> {
        Tensor::zeros([1], &Default::default())
    }

    #[test]
    fn test_block_creation() {
        let device = Default::default();
        let block = FlowBlock::<TestBackend>::forward_ordered(&device, 2, 3, 3).unwrap();
        assert_eq!(block.order(), MaskOrder::Forward);
        assert_eq!(block.latent_dim(), 2);
        assert_eq!(block.stage2.len(), 4);
        assert_eq!(block.num_parameters(), 2 * 84 + 2 * 81 + 4 * 84 + 1);
    }

    #[test]
    fn test_invalid_block() {
        let device = Default::default();
        let err = FlowBlock::<TestBackend>::forward_ordered(&device, 0, 3, 3).unwrap_err();
        assert_eq!(err, LayerError::InvalidLatentDim(0));
        let err = FlowBlock::<TestBackend>::reverse_ordered(&device, 2, 3, 2).unwrap_err();
        assert_eq!(err, LayerError::InvalidKernel(2));
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        for block in [
            FlowBlock::<TestBackend>::forward_ordered(&device, 2, 3, 3).unwrap(),
            FlowBlock::<TestBackend>::reverse_ordered(&device, 3, 3, 5).unwrap(),
        ] {
            let (y, log_det) = block.forward(random_input([2, 3, 8, 8]), zero_log_det());
            assert_eq!(y.dims(), [2, 3, 8, 8]);
            assert_eq!(log_det.dims(), [1]);
        }
    }

    #[test]
    fn test_log_det_accumulates() {
        let device = Default::default();
        let block = FlowBlock::<TestBackend>::forward_ordered(&device, 2, 1, 3).unwrap();
        let x = random_input([1, 1, 4, 4]);

        let (_, from_zero) = block.forward(x.clone(), zero_log_det());
        let (_, from_ten) = block.forward(x, Tensor::from_floats([10.0], &device));

        let from_zero: f32 = from_zero.into_scalar();
        let from_ten: f32 = from_ten.into_scalar();
        assert!(from_zero.is_finite());
        assert!((from_ten - from_zero - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_closed_gate_drops_residual() {
        let device = Default::default();
        let open = FlowBlock::<TestBackend>::forward_ordered(&device, 1, 2, 3).unwrap();
        let closed = open.clone().with_residual(-0.5);
        let x = random_input([1, 2, 5, 5]);

        let (with_res, _) = open.forward(x.clone(), zero_log_det());
        let (without_res, _) = closed.forward(x.clone(), zero_log_det());

        // open gate is 1, so the difference is exactly the input
        let diff: Vec<f32> = (with_res - without_res).into_data().to_vec().unwrap();
        let input: Vec<f32> = x.into_data().to_vec().unwrap();
        for (d, v) in diff.iter().zip(input.iter()) {
            assert!((d - v).abs() < 1e-4);
        }

        let gate: Vec<f32> = closed.gate().into_data().to_vec().unwrap();
        assert_eq!(gate, vec![0.0]);
    }

    #[test]
    fn test_matches_unit_recomputation() {
        let device = Default::default();
        let (channels, k, latent) = (2, 3, 2);
        let gate = 0.7;
        let block = FlowBlock::<TestBackend>::reverse_ordered(&device, latent, channels, k)
            .unwrap()
            .with_residual(gate);
        let x = random_input([2, channels, 5, 5]);
        let (out, log_det) = block.forward(x.clone(), zero_log_det());

        let conv = |input: Tensor<TestBackend, 4>, unit: &MaskedConv<TestBackend>, center: usize| {
            block.kernel.conv(
                input,
                unit.weight.val(),
                block.centers[center].val(),
                unit.bias.val(),
            )
        };

        // stage-2 unit (i, j) reads stage-1 output j with stage-1 center j
        let pre: Vec<Tensor<TestBackend, 4>> = (0..latent)
            .map(|j| conv(x.clone(), &block.stage1[j], j))
            .collect();
        let mut expected = x.mul_scalar(gate);
        for i in 0..latent {
            for (j, p) in pre.iter().enumerate() {
                let hidden = leaky_relu(p.clone(), LEAKY_SLOPE);
                expected = expected
                    + conv(hidden, &block.stage2[i * latent + j], j)
                        .div_scalar((latent * latent) as f64);
            }
        }

        let got: Vec<f32> = out.into_data().to_vec().unwrap();
        let expected: Vec<f32> = expected.into_data().to_vec().unwrap();
        for (a, b) in got.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
        }

        // sum over elements of log(sum_i center_i[c, c, mid, mid]^2 * lrelu'(pre_i) + gate)
        let mid = k / 2;
        let diagonals: Vec<Vec<f32>> = block
            .centers
            .iter()
            .map(|center| {
                let values: Vec<f32> = center.val().into_data().to_vec().unwrap();
                (0..channels)
                    .map(|c| values[((c * channels + c) * k + mid) * k + mid])
                    .collect()
            })
            .collect();
        let pre: Vec<Vec<f32>> = pre
            .into_iter()
            .map(|p| p.into_data().to_vec().unwrap())
            .collect();

        let plane = 5 * 5;
        let mut expected_log_det = 0.0f64;
        for e in 0..pre[0].len() {
            let c = (e / plane) % channels;
            let mut diag = gate as f64;
            for (unit, diagonal) in pre.iter().zip(diagonals.iter()) {
                let slope = if unit[e] > 0.0 { 1.0 } else { LEAKY_SLOPE };
                diag += (diagonal[c] as f64).powi(2) * slope;
            }
            expected_log_det += diag.ln();
        }

        let got: f32 = log_det.into_scalar();
        assert_relative_eq!(got as f64, expected_log_det, max_relative = 1e-4);
    }

    #[test]
    fn test_gradients_reach_centers() {
        type AdBackend = Autodiff<NdArray>;
        let device = Default::default();
        let block = FlowBlock::<AdBackend>::reverse_ordered(&device, 2, 3, 3).unwrap();
        let x = Tensor::<AdBackend, 4>::random(
            [2, 3, 6, 6],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let (_, log_det) = block.forward(x, Tensor::zeros([1], &device));
        let grads = log_det.backward();

        assert!(block.centers[0].val().grad(&grads).is_some());
        assert!(block.res.val().grad(&grads).is_some());
    }
}
