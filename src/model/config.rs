//! Network configuration
//!
//! Read-only construction parameters shared by the flow and classification
//! networks.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{LayerError, Result};
use crate::masks::validate_geometry;

/// Configuration for the masked convolution networks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetConfig {
    /// Number of (A, B) block pairs in each layer
    pub layer_size: Vec<usize>,
    /// Number of parallel latent units of the blocks in each layer
    pub latent_size: Vec<usize>,
    /// Input image channels
    pub channels: usize,
    /// Input image height and width
    pub image_size: usize,
    /// Output classes of the classification network
    pub num_classes: usize,
    /// Spatial kernel size of every masked convolution
    #[serde(default = "default_kernel")]
    pub kernel: usize,
    /// Random seed applied before parameter initialization
    #[serde(default)]
    pub seed: u64,
}

fn default_kernel() -> usize {
    crate::DEFAULT_KERNEL
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            layer_size: vec![1, 1, 1],
            latent_size: vec![2, 2, 2],
            channels: 3,
            image_size: 32,
            num_classes: 10,
            kernel: default_kernel(),
            seed: 0,
        }
    }
}

impl NetConfig {
    /// Create a new configuration builder
    pub fn builder() -> NetConfigBuilder {
        NetConfigBuilder::default()
    }

    /// Grey scale 28x28 preset
    pub fn mnist() -> Self {
        Self {
            channels: 1,
            image_size: 28,
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        validate_geometry(self.channels, self.kernel)?;

        if self.layer_size.is_empty() {
            return Err(LayerError::InvalidConfig(
                "at least one layer is required".to_string(),
            ));
        }
        if self.layer_size.len() != self.latent_size.len() {
            return Err(LayerError::InvalidConfig(format!(
                "layer_size has {} entries but latent_size has {}",
                self.layer_size.len(),
                self.latent_size.len()
            )));
        }
        if let Some(layer) = self.layer_size.iter().position(|&l| l == 0) {
            return Err(LayerError::InvalidConfig(format!(
                "layer_size[{}] must be > 0",
                layer
            )));
        }
        if let Some(layer) = self.latent_size.iter().position(|&l| l == 0) {
            return Err(LayerError::InvalidConfig(format!(
                "latent_size[{}] must be > 0",
                layer
            )));
        }
        if self.image_size < self.kernel {
            return Err(LayerError::InvalidConfig(format!(
                "image_size ({}) must be >= kernel ({})",
                self.image_size, self.kernel
            )));
        }
        if self.num_classes < 2 {
            return Err(LayerError::InvalidConfig(
                "num_classes must be >= 2".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of layers
    pub fn num_layers(&self) -> usize {
        self.layer_size.len()
    }

    /// Number of pixels per channel
    pub fn num_pixels(&self) -> usize {
        self.image_size * self.image_size
    }

    /// Length of a flattened image
    pub fn flat_dim(&self) -> usize {
        self.channels * self.num_pixels()
    }

    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Builder for NetConfig
#[derive(Debug, Default)]
pub struct NetConfigBuilder {
    config: NetConfig,
}

impl NetConfigBuilder {
    pub fn layer_size(mut self, layer_size: Vec<usize>) -> Self {
        self.config.layer_size = layer_size;
        self
    }

    pub fn latent_size(mut self, latent_size: Vec<usize>) -> Self {
        self.config.latent_size = latent_size;
        self
    }

    pub fn channels(mut self, channels: usize) -> Self {
        self.config.channels = channels;
        self
    }

    pub fn image_size(mut self, image_size: usize) -> Self {
        self.config.image_size = image_size;
        self
    }

    pub fn num_classes(mut self, num_classes: usize) -> Self {
        self.config.num_classes = num_classes;
        self
    }

    pub fn kernel(mut self, kernel: usize) -> Self {
        self.config.kernel = kernel;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn build(self) -> Result<NetConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
