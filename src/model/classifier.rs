//! Classification network
//!
//! Layers of (A, B) classifier block pairs followed by a flatten, a linear
//! projection and log-softmax over classes.

use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::log_softmax,
};
use tracing::info;

use super::classifier_block::ClassifierBlock;
use super::config::NetConfig;
use super::rearrange::SpaceToDepth;
use crate::error::Result;
use crate::REARRANGE_BLOCK;

/// `block_num` repetitions of a forward-ordered and a reverse-ordered block
#[derive(Module, Debug)]
pub struct ClassifierLayer<B: Backend> {
    blocks: Vec<ClassifierBlock<B>>,
}

impl<B: Backend> ClassifierLayer<B> {
    pub fn new(
        device: &B::Device,
        block_num: usize,
        latent_dim: usize,
        input_dim: usize,
        kernel: usize,
    ) -> Result<Self> {
        let mut blocks = Vec::with_capacity(2 * block_num);
        for _ in 0..block_num {
            blocks.push(ClassifierBlock::forward_ordered(device, latent_dim, input_dim, kernel)?);
            blocks.push(ClassifierBlock::reverse_ordered(device, latent_dim, input_dim, kernel)?);
        }
        Ok(Self { blocks })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }

    pub fn blocks(&self) -> &[ClassifierBlock<B>] {
        &self.blocks
    }
}

/// Image classifier built from masked convolution blocks
#[derive(Module, Debug)]
pub struct ClassifierNet<B: Backend> {
    layers: Vec<ClassifierLayer<B>>,
    fc: Linear<B>,
    /// Multi-resolution hook, not used by `forward`
    increase_dim: SpaceToDepth,
    channels: usize,
    image_size: usize,
    num_classes: usize,
}

impl<B: Backend> ClassifierNet<B> {
    /// Create a new classifier from configuration
    pub fn new(device: &B::Device, config: &NetConfig) -> Result<Self> {
        config.validate()?;
        B::seed(config.seed);

        let layers = config
            .layer_size
            .iter()
            .zip(config.latent_size.iter())
            .map(|(&block_num, &latent_dim)| {
                ClassifierLayer::new(device, block_num, latent_dim, config.channels, config.kernel)
            })
            .collect::<Result<Vec<_>>>()?;
        let fc = LinearConfig::new(config.flat_dim(), config.num_classes).init(device);

        info!(
            "Built classifier: {} layers, {} inputs, {} classes",
            layers.len(),
            config.flat_dim(),
            config.num_classes
        );

        Ok(Self {
            layers,
            fc,
            increase_dim: SpaceToDepth::new(REARRANGE_BLOCK),
            channels: config.channels,
            image_size: config.image_size,
            num_classes: config.num_classes,
        })
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Images of shape [batch, channels, image_size, image_size]
    ///
    /// # Returns
    /// * Class log-probabilities [batch, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let dims = x.dims();
        let [batch, channels, height, width] = dims;
        assert!(
            channels == self.channels && height == self.image_size && width == self.image_size,
            "classifier expects [_, {}, {}, {}], got {:?}",
            self.channels,
            self.image_size,
            self.image_size,
            dims
        );

        let x = self.layers.iter().fold(x, |x, layer| layer.forward(x));
        let x = x.reshape([batch, channels * height * width]);
        log_softmax(self.fc.forward(x), 1)
    }

    /// Predicted class per sample
    pub fn predict(&self, x: Tensor<B, 4>) -> Tensor<B, 1, Int> {
        let [batch, _, _, _] = x.dims();
        self.forward(x).argmax(1).reshape([batch])
    }

    /// Class probabilities per sample
    pub fn predict_proba(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(x).exp()
    }

    pub fn layers(&self) -> &[ClassifierLayer<B>] {
        &self.layers
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Space-to-depth rearrangement reserved for a multi-resolution path
    pub fn increase_dim(&self) -> &SpaceToDepth {
        &self.increase_dim
    }
}
