//! Flow network
//!
//! Stacks layers of (A, B) flow block pairs and threads the running
//! log-determinant through every block.

use burn::{module::Module, prelude::*};
use tracing::{debug, info};

use super::config::NetConfig;
use super::flow_block::FlowBlock;
use super::rearrange::SpaceToDepth;
use crate::error::Result;
use crate::REARRANGE_BLOCK;

/// `block_num` repetitions of a forward-ordered and a reverse-ordered block
#[derive(Module, Debug)]
pub struct FlowLayer<B: Backend> {
    blocks: Vec<FlowBlock<B>>,
}

impl<B: Backend> FlowLayer<B> {
    pub fn new(
        device: &B::Device,
        block_num: usize,
        latent_dim: usize,
        input_dim: usize,
        kernel: usize,
    ) -> Result<Self> {
        let mut blocks = Vec::with_capacity(2 * block_num);
        for _ in 0..block_num {
            blocks.push(FlowBlock::forward_ordered(device, latent_dim, input_dim, kernel)?);
            blocks.push(FlowBlock::reverse_ordered(device, latent_dim, input_dim, kernel)?);
        }
        Ok(Self { blocks })
    }

    pub fn forward(&self, x: Tensor<B, 4>, log_det: Tensor<B, 1>) -> (Tensor<B, 4>, Tensor<B, 1>) {
        self.blocks
            .iter()
            .fold((x, log_det), |(x, log_det), block| block.forward(x, log_det))
    }

    pub fn blocks(&self) -> &[FlowBlock<B>] {
        &self.blocks
    }
}

/// Normalizing flow built from masked convolution blocks
#[derive(Module, Debug)]
pub struct FlowNet<B: Backend> {
    layers: Vec<FlowLayer<B>>,
    /// Multi-resolution hook, not used by `forward`
    increase_dim: SpaceToDepth,
    channels: usize,
}

impl<B: Backend> FlowNet<B> {
    /// Create a new flow network from configuration
    pub fn new(device: &B::Device, config: &NetConfig) -> Result<Self> {
        config.validate()?;
        B::seed(config.seed);

        let layers = config
            .layer_size
            .iter()
            .zip(config.latent_size.iter())
            .map(|(&block_num, &latent_dim)| {
                FlowLayer::new(device, block_num, latent_dim, config.channels, config.kernel)
            })
            .collect::<Result<Vec<_>>>()?;

        let net = Self {
            layers,
            increase_dim: SpaceToDepth::new(REARRANGE_BLOCK),
            channels: config.channels,
        };
        info!(
            "Built flow network: {} layers, {} blocks",
            net.layers.len(),
            net.num_blocks()
        );
        Ok(net)
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Images of shape [batch, channels, height, width]
    ///
    /// # Returns
    /// * Flattened latents [batch, channels * height * width] and the
    ///   log-determinant of the whole transform, shape [1]
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 1>) {
        let [batch, channels, height, width] = x.dims();
        debug!("Flow forward on [{}, {}, {}, {}]", batch, channels, height, width);

        let log_det = Tensor::zeros([1], &x.device());
        let (x, log_det) = self
            .layers
            .iter()
            .fold((x, log_det), |(x, log_det), layer| layer.forward(x, log_det));

        (x.reshape([batch, channels * height * width]), log_det)
    }

    pub fn layers(&self) -> &[FlowLayer<B>] {
        &self.layers
    }

    /// Total number of blocks across layers
    pub fn num_blocks(&self) -> usize {
        self.layers.iter().map(|l| l.blocks.len()).sum()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Space-to-depth rearrangement reserved for a multi-resolution path
    pub fn increase_dim(&self) -> &SpaceToDepth {
        &self.increase_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masks::MaskOrder;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> NetConfig {
        NetConfig::builder()
            .layer_size(vec![1, 2])
            .latent_size(vec![2, 1])
            .channels(3)
            .image_size(8)
            .build()
            .unwrap()
    }

    #[test]
    fn test_layer_layout() {
        let device = Default::default();
        let net = FlowNet::<TestBackend>::new(&device, &small_config()).unwrap();

        assert_eq!(net.layers().len(), 2);
        assert_eq!(net.num_blocks(), 6);

        let orders: Vec<MaskOrder> = net.layers()[1].blocks().iter().map(|b| b.order()).collect();
        assert_eq!(
            orders,
            vec![
                MaskOrder::Forward,
                MaskOrder::Reverse,
                MaskOrder::Forward,
                MaskOrder::Reverse
            ]
        );
        assert_eq!(net.layers()[1].blocks()[0].latent_dim(), 1);
        assert_eq!(net.increase_dim().block_size(), 4);
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let net = FlowNet::<TestBackend>::new(&device, &small_config()).unwrap();
        let x = Tensor::<TestBackend, 4>::random(
            [2, 3, 8, 8],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let (z, log_det) = net.forward(x);
        assert_eq!(z.dims(), [2, 192]);
        assert_eq!(log_det.dims(), [1]);
    }

    #[test]
    fn test_invalid_config() {
        let device = Default::default();
        let config = NetConfig {
            kernel: 2,
            ..small_config()
        };
        assert!(FlowNet::<TestBackend>::new(&device, &config).is_err());
    }
}
