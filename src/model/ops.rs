//! Element-wise pieces shared by the blocks

use burn::prelude::*;

/// Derivative of the leaky rectifier: 1 where `x > 0`, `slope` elsewhere
///
/// The result is detached from the autodiff graph.
pub fn leaky_relu_derivative<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    slope: f64,
) -> Tensor<B, D> {
    x.greater_elem(0.0)
        .float()
        .mul_scalar(1.0 - slope)
        .add_scalar(slope)
        .detach()
}

/// Exponential linear unit with alpha = 1
pub fn elu<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone().clamp_min(0.0) + x.clamp_max(0.0).exp().sub_scalar(1.0)
}

/// Effective residual gate: `res` where `res > 0`, else 0
///
/// The comparison is a constant indicator, gradients flow through `res`.
pub fn residual_gate<B: Backend>(res: Tensor<B, 1>) -> Tensor<B, 1> {
    let active = res.clone().greater_elem(0.0).float();
    res * active
}

/// Broadcast a one-element tensor against a 4D activation
pub fn as_scalar4<B: Backend>(value: Tensor<B, 1>) -> Tensor<B, 4> {
    value.reshape([1, 1, 1, 1])
}

/// Element-wise mean of equally shaped tensors
pub fn average<B: Backend>(tensors: Vec<Tensor<B, 4>>) -> Tensor<B, 4> {
    let count = tensors.len();
    let sum = tensors
        .into_iter()
        .reduce(|acc, t| acc + t)
        .expect("average of an empty set of tensors");
    sum.div_scalar(count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn gate_of(value: f32) -> f32 {
        let device = Default::default();
        let res = Tensor::<TestBackend, 1>::from_floats([value], &device);
        residual_gate(res).into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_residual_gate_boundary() {
        assert_eq!(gate_of(0.0), 0.0);
        assert_eq!(gate_of(-1e-4), 0.0);
        assert_eq!(gate_of(-3.0), 0.0);
        assert_eq!(gate_of(1e-4), 1e-4);
        assert_eq!(gate_of(1.0), 1.0);
        assert_eq!(gate_of(2.5), 2.5);
    }

    #[test]
    fn test_leaky_relu_derivative() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-2.0, -0.0, 0.0, 0.5, 3.0], &device);
        let d: Vec<f32> = leaky_relu_derivative(x, 0.1).into_data().to_vec().unwrap();
        let expected = [0.1, 0.1, 0.1, 1.0, 1.0];
        for (a, b) in d.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_elu() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-1.0, 0.0, 2.0], &device);
        let y: Vec<f32> = elu(x).into_data().to_vec().unwrap();
        assert_abs_diff_eq!(y[0], (-1.0f32).exp() - 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y[1], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y[2], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_average() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 4>::full([1, 1, 2, 2], 1.0, &device);
        let b = Tensor::<TestBackend, 4>::full([1, 1, 2, 2], 2.0, &device);
        let c = Tensor::<TestBackend, 4>::full([1, 1, 2, 2], 6.0, &device);
        let mean: Vec<f32> = average(vec![a, b, c]).into_data().to_vec().unwrap();
        assert_eq!(mean, vec![3.0; 4]);
    }
}
