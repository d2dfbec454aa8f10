//! Space/depth rearrangement
//!
//! `SpaceToDepth` folds each `block x block` spatial patch into the channel
//! axis: `[N, C, H, W] -> [N, C * block^2, H / block, W / block]`, with output
//! channel `(dy * block + dx) * C + c`. `DepthToSpace` is its exact inverse.
//!
//! Both networks construct a `SpaceToDepth(4)` for a multi-resolution path;
//! it is not part of the active forward pass.

use burn::{module::Module, prelude::*};

/// Trade spatial resolution for channel depth
#[derive(Module, Clone, Debug)]
pub struct SpaceToDepth {
    block_size: usize,
}

impl SpaceToDepth {
    pub fn new(block_size: usize) -> Self {
        assert!(block_size >= 1, "block_size must be >= 1");
        Self { block_size }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Output shape for an input of shape `dims`
    pub fn output_dims(&self, dims: [usize; 4]) -> [usize; 4] {
        let [batch, channels, height, width] = dims;
        let bs = self.block_size;
        assert!(
            height % bs == 0 && width % bs == 0,
            "space-to-depth needs height and width divisible by {}, got {:?}",
            bs,
            dims
        );
        [batch, channels * bs * bs, height / bs, width / bs]
    }

    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();
        let out = self.output_dims(x.dims());
        let bs = self.block_size;

        x.reshape([batch, channels, height / bs, bs, width / bs, bs])
            // [N, dy, dx, C, H/bs, W/bs]
            .permute([0, 3, 5, 1, 2, 4])
            .reshape(out)
    }
}

/// Trade channel depth for spatial resolution
#[derive(Module, Clone, Debug)]
pub struct DepthToSpace {
    block_size: usize,
}

impl DepthToSpace {
    pub fn new(block_size: usize) -> Self {
        assert!(block_size >= 1, "block_size must be >= 1");
        Self { block_size }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Output shape for an input of shape `dims`
    pub fn output_dims(&self, dims: [usize; 4]) -> [usize; 4] {
        let [batch, depth, height, width] = dims;
        let bs_sq = self.block_size * self.block_size;
        assert!(
            depth % bs_sq == 0,
            "depth-to-space needs channels divisible by {}, got {:?}",
            bs_sq,
            dims
        );
        [
            batch,
            depth / bs_sq,
            height * self.block_size,
            width * self.block_size,
        ]
    }

    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, _depth, height, width] = x.dims();
        let out = self.output_dims(x.dims());
        let bs = self.block_size;

        x.reshape([batch, bs, bs, out[1], height, width])
            // [N, C, H/bs, dy, W/bs, dx]
            .permute([0, 3, 4, 1, 5, 2])
            .reshape(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn arange(dims: [usize; 4]) -> Tensor<TestBackend, 4> {
        let n: usize = dims.iter().product();
        let data: Vec<f32> = (0..n).map(|v| v as f32).collect();
        Tensor::from_data(TensorData::new(data, dims), &Default::default())
    }

    #[test]
    fn test_round_trip() {
        let x = arange([2, 3, 32, 32]);
        let s2d = SpaceToDepth::new(4);
        let d2s = DepthToSpace::new(4);

        let deep = s2d.forward(x.clone());
        assert_eq!(deep.dims(), [2, 48, 8, 8]);

        let back = d2s.forward(deep);
        assert_eq!(back.dims(), [2, 3, 32, 32]);

        let original: Vec<f32> = x.into_data().to_vec().unwrap();
        let restored: Vec<f32> = back.into_data().to_vec().unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_channel_ordering() {
        // One 2x2 image with two channels: channel c holds 10 * c + (2 * row + col)
        let data = vec![0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0];
        let x = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(data, [1, 2, 2, 2]),
            &Default::default(),
        );
        let deep: Vec<f32> = SpaceToDepth::new(2)
            .forward(x)
            .into_data()
            .to_vec()
            .unwrap();

        // channel (dy * 2 + dx) * C + c
        assert_eq!(deep, vec![0.0, 10.0, 1.0, 11.0, 2.0, 12.0, 3.0, 13.0]);
    }

    #[test]
    fn test_block_size_one_is_identity() {
        let x = arange([1, 2, 3, 5]);
        let y = SpaceToDepth::new(1).forward(x.clone());
        let a: Vec<f32> = x.into_data().to_vec().unwrap();
        let b: Vec<f32> = y.into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    #[should_panic(expected = "divisible by 4")]
    fn test_indivisible_input() {
        SpaceToDepth::new(4).forward(arange([1, 1, 6, 8]));
    }

    #[test]
    #[should_panic(expected = "channels divisible by 4")]
    fn test_indivisible_depth() {
        DepthToSpace::new(2).forward(arange([1, 6, 2, 2]));
    }
}
