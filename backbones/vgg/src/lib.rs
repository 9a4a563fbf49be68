//! VGG encoder for U-Net segmentation models.
//!
//! The convolutional part of VGG16 / VGG19 without the classifier head. Every layer
//! is registered in a [`LayerGraph`] under the name the Keras applications use
//! (`block1_conv1`, `block1_pool`, ...) so skip connections can be addressed by those
//! names or by their position.

use core::f64::consts::SQRT_2;

use burn::{
    module::Ignored,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};
use feature_taps::{FeatureTaps, LayerGraph};

/// Convolutions per block and their channel width.
const VGG16_BLOCKS: [(usize, usize); 5] = [(2, 64), (2, 128), (3, 256), (3, 512), (3, 512)];
const VGG19_BLOCKS: [(usize, usize); 5] = [(2, 64), (2, 128), (4, 256), (4, 512), (4, 512)];

/// VGG variant enumeration
#[derive(Config, Debug, PartialEq, Eq)]
pub enum VggVariant {
    /// VGG16
    Vgg16,
    /// VGG19
    Vgg19,
}

/// VGG configuration
#[derive(Config, Debug)]
pub struct VggConfig {
    /// VGG variant (16 or 19)
    pub variant: VggVariant,
    /// Number of input image channels
    #[config(default = "3")]
    pub in_channels: usize,
}

impl VggConfig {
    /// VGG16 configuration
    pub fn vgg16() -> Self {
        Self::new(VggVariant::Vgg16)
    }

    /// VGG19 configuration
    pub fn vgg19() -> Self {
        Self::new(VggVariant::Vgg19)
    }

    /// Initialize VGG model
    pub fn init<B: Backend>(&self, device: &B::Device) -> VggBackbone<B> {
        let blocks = match self.variant {
            VggVariant::Vgg16 => VGG16_BLOCKS,
            VggVariant::Vgg19 => VGG19_BLOCKS,
        };

        let mut graph = LayerGraph::new();
        graph.push("input", self.in_channels, 1);

        let mut layers = Vec::new();
        let mut channels = self.in_channels;
        let mut reduction = 1;

        for (block, (convs, width)) in blocks.into_iter().enumerate() {
            for conv in 0..convs {
                layers.push(VggLayer::Conv(VggConvLayer::new(channels, width, device)));
                channels = width;
                graph.push(
                    format!("block{}_conv{}", block + 1, conv + 1),
                    channels,
                    reduction,
                );
            }
            layers.push(VggLayer::MaxPool(
                MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            ));
            reduction *= 2;
            graph.push(format!("block{}_pool", block + 1), channels, reduction);
        }

        VggBackbone {
            layers,
            graph: Ignored(graph),
        }
    }
}

/// VGG encoder.
///
/// Output is `block5_pool`: 512 channels at 1/32 of the input resolution.
#[derive(Module, Debug)]
pub struct VggBackbone<B: Backend> {
    /// Layers in graph order (the input node has no layer).
    pub layers: Vec<VggLayer<B>>,
    graph: Ignored<LayerGraph>,
}

impl<B: Backend> VggBackbone<B> {
    /// Create VGG16 encoder.
    pub fn vgg16(device: &Device<B>) -> Self {
        VggConfig::vgg16().init(device)
    }

    /// Create VGG19 encoder.
    pub fn vgg19(device: &Device<B>) -> Self {
        VggConfig::vgg19().init(device)
    }

    /// The layer graph of this encoder.
    pub fn layer_graph(&self) -> &LayerGraph {
        &self.graph.0
    }

    /// Forward pass, recording every graph node into `taps`.
    pub fn forward_taps(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        taps.visit(&input);
        let mut x = input;
        for layer in &self.layers {
            x = layer.forward(x);
            taps.visit(&x);
        }
        x
    }

    /// Forward pass returning only the encoder output.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward_taps(input, &mut FeatureTaps::none())
    }
}

/// Individual layer types in VGG.
#[derive(Module, Debug)]
pub enum VggLayer<B: Backend> {
    /// 3x3 convolution followed by ReLU.
    Conv(VggConvLayer<B>),
    /// 2x2 max pooling.
    MaxPool(MaxPool2d),
}

impl<B: Backend> VggLayer<B> {
    /// Forward pass through the layer.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Conv(conv) => conv.forward(input),
            Self::MaxPool(pool) => pool.forward(input),
        }
    }
}

/// VGG convolution layer with its activation.
#[derive(Module, Debug)]
pub struct VggConvLayer<B: Backend> {
    /// The 3x3 convolution.
    pub conv: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> VggConvLayer<B> {
    /// Forward pass through the convolution layer.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.relu.forward(self.conv.forward(input))
    }

    /// Create a new VGG convolution layer.
    pub fn new(in_channels: usize, out_channels: usize, device: &Device<B>) -> Self {
        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        };

        // 3x3 conv, stride=1, padding=1
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_initializer(initializer)
            .init(device);

        Self {
            conv,
            relu: Relu::new(),
        }
    }
}
