//! # Decoder Blocks
//!
//! Building blocks of the U-Net decoder. Every block doubles (more generally,
//! multiplies by its rate) the spatial resolution, concatenates the skip feature when
//! one is wired to it, and refines the result with 3x3 convolutions.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

use crate::config::DecoderBlockType;

/// Configuration for the [`ConvRelu`] module.
#[derive(Config, Debug)]
pub struct ConvReluConfig {
    /// Number of input channels.
    in_channels: usize,
    /// Number of output channels.
    out_channels: usize,
    /// Insert BatchNorm between the convolution and the ReLU.
    #[config(default = "true")]
    use_batchnorm: bool,
}

impl ConvReluConfig {
    /// Initializes a new `ConvRelu` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ConvRelu<B> {
        let conv = Conv2dConfig::new([self.in_channels, self.out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(!self.use_batchnorm)
            .init(device);
        let bn = self
            .use_batchnorm
            .then(|| BatchNormConfig::new(self.out_channels).init(device));

        ConvRelu {
            conv,
            bn,
            relu: Relu::new(),
        }
    }
}

/// 3x3 convolution, optional BatchNorm, ReLU.
#[derive(Module, Debug)]
pub struct ConvRelu<B: Backend> {
    conv: Conv2d<B>,
    bn: Option<BatchNorm<B, 2>>,
    relu: Relu,
}

impl<B: Backend> ConvRelu<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = match &self.bn {
            Some(bn) => bn.forward(x),
            None => x,
        };
        self.relu.forward(x)
    }
}

/// Configuration for a [`DecoderBlock`].
#[derive(Config, Debug)]
pub struct DecoderBlockConfig {
    /// Channels of the feature coming from the previous stage.
    in_channels: usize,
    /// Channels of the skip feature; zero when the stage has no skip connection.
    #[config(default = "0")]
    skip_channels: usize,
    /// Output channels of the block.
    filters: usize,
    /// Spatial upsampling factor.
    #[config(default = "2")]
    rate: usize,
    #[config(default = "true")]
    use_batchnorm: bool,
    #[config(default = "DecoderBlockType::Upsampling")]
    block_type: DecoderBlockType,
}

impl DecoderBlockConfig {
    /// Initializes the block variant selected by `block_type`.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DecoderBlock<B> {
        match self.block_type {
            DecoderBlockType::Upsampling => DecoderBlock::Upsample(self.init_upsample(device)),
            DecoderBlockType::Transpose => DecoderBlock::Transpose(self.init_transpose(device)),
        }
    }

    fn init_upsample<B: Backend>(&self, device: &Device<B>) -> UpsampleBlock<B> {
        let conv1 = ConvReluConfig::new(self.in_channels + self.skip_channels, self.filters)
            .with_use_batchnorm(self.use_batchnorm)
            .init(device);
        let conv2 = ConvReluConfig::new(self.filters, self.filters)
            .with_use_batchnorm(self.use_batchnorm)
            .init(device);

        UpsampleBlock {
            rate: self.rate,
            conv1,
            conv2,
        }
    }

    /// Kernel `2 * rate` with padding `rate / 2` scales the input by exactly `rate`
    /// for even rates.
    fn init_transpose<B: Backend>(&self, device: &Device<B>) -> TransposeBlock<B> {
        let kernel = 2 * self.rate;
        let padding = self.rate / 2;
        let up = ConvTranspose2dConfig::new([self.in_channels, self.filters], [kernel, kernel])
            .with_stride([self.rate, self.rate])
            .with_padding([padding, padding])
            .with_bias(!self.use_batchnorm)
            .init(device);
        let bn = self
            .use_batchnorm
            .then(|| BatchNormConfig::new(self.filters).init(device));
        let conv = ConvReluConfig::new(self.filters + self.skip_channels, self.filters)
            .with_use_batchnorm(self.use_batchnorm)
            .init(device);

        TransposeBlock {
            up,
            bn,
            relu: Relu::new(),
            conv,
        }
    }
}

/// Nearest-neighbour upsampling, skip concatenation, two [`ConvRelu`].
#[derive(Module, Debug)]
pub struct UpsampleBlock<B: Backend> {
    rate: usize,
    conv1: ConvRelu<B>,
    conv2: ConvRelu<B>,
}

impl<B: Backend> UpsampleBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Option<Tensor<B, 4>>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();
        let x = interpolate(
            x,
            [height * self.rate, width * self.rate],
            InterpolateOptions::new(InterpolateMode::Nearest),
        );
        let x = concat_skip(x, skip);
        self.conv2.forward(self.conv1.forward(x))
    }
}

/// Transposed convolution, optional BatchNorm, ReLU, skip concatenation, one [`ConvRelu`].
#[derive(Module, Debug)]
pub struct TransposeBlock<B: Backend> {
    up: ConvTranspose2d<B>,
    bn: Option<BatchNorm<B, 2>>,
    relu: Relu,
    conv: ConvRelu<B>,
}

impl<B: Backend> TransposeBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Option<Tensor<B, 4>>) -> Tensor<B, 4> {
        let x = self.up.forward(x);
        let x = match &self.bn {
            Some(bn) => bn.forward(x),
            None => x,
        };
        let x = self.relu.forward(x);
        let x = concat_skip(x, skip);
        self.conv.forward(x)
    }
}

/// An enum to wrap the two decoder block structures.
#[derive(Module, Debug)]
pub enum DecoderBlock<B: Backend> {
    Upsample(UpsampleBlock<B>),
    Transpose(TransposeBlock<B>),
}

impl<B: Backend> DecoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Option<Tensor<B, 4>>) -> Tensor<B, 4> {
        match self {
            Self::Upsample(block) => block.forward(x, skip),
            Self::Transpose(block) => block.forward(x, skip),
        }
    }
}

fn concat_skip<B: Backend>(x: Tensor<B, 4>, skip: Option<Tensor<B, 4>>) -> Tensor<B, 4> {
    match skip {
        Some(skip) => Tensor::cat(vec![x, skip], 1),
        None => x,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    fn random(shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::random(shape, Distribution::Normal(0.0, 1.0), &Default::default())
    }

    #[test]
    fn upsample_block_doubles_resolution_and_concatenates_skip() {
        let block = DecoderBlockConfig::new(32, 8)
            .with_skip_channels(16)
            .init::<TestBackend>(&Default::default());

        let output = block.forward(random([2, 32, 4, 4]), Some(random([2, 16, 8, 8])));
        assert_eq!(output.dims(), [2, 8, 8, 8]);
    }

    #[test]
    fn transpose_block_matches_upsample_geometry() {
        let device = Default::default();
        let config = DecoderBlockConfig::new(32, 8).with_skip_channels(16);
        let upsample = config.init::<TestBackend>(&device);
        let transpose = config
            .clone()
            .with_block_type(DecoderBlockType::Transpose)
            .init::<TestBackend>(&device);

        let x = random([1, 32, 4, 6]);
        let skip = random([1, 16, 8, 12]);
        let expected = upsample.forward(x.clone(), Some(skip.clone())).dims();
        assert_eq!(transpose.forward(x, Some(skip)).dims(), expected);
        assert_eq!(expected, [1, 8, 8, 12]);
    }

    #[test]
    fn blocks_run_without_skip() {
        for block_type in [DecoderBlockType::Upsampling, DecoderBlockType::Transpose] {
            let block = DecoderBlockConfig::new(8, 4)
                .with_block_type(block_type)
                .with_use_batchnorm(false)
                .init::<TestBackend>(&Default::default());
            assert_eq!(block.forward(random([1, 8, 2, 2]), None).dims(), [1, 4, 4, 4]);
        }
    }

    #[test]
    fn conv_relu_without_batchnorm_has_bias_and_non_negative_output() {
        let with_bn = ConvReluConfig::new(3, 4).init::<TestBackend>(&Default::default());
        let without_bn = ConvReluConfig::new(3, 4)
            .with_use_batchnorm(false)
            .init::<TestBackend>(&Default::default());

        assert!(with_bn.conv.bias.is_none());
        assert!(without_bn.conv.bias.is_some());
        assert!(without_bn.bn.is_none());

        let output = without_bn.forward(random([1, 3, 5, 5]));
        assert_eq!(output.dims(), [1, 4, 5, 5]);
        assert!(output.min().into_scalar() >= 0.0);
    }
}
