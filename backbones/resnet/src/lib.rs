//! ResNet and ResNeXt encoders for U-Net segmentation models.
//!
//! ResNet here is the pre-activation variant: each residual unit starts with
//! BatchNorm + ReLU (`stageN_unitM_bn1`, `stageN_unitM_relu1`) and the network ends with
//! a final `bn1` / `relu1`. Node names follow the Keras classification-models
//! convention so the same skip-connection identifiers work unchanged.

use burn::{
    module::Ignored,
    nn::{BatchNorm, BatchNormConfig, Relu},
    prelude::*,
};
use feature_taps::{FeatureTaps, LayerGraph};

mod blocks;
mod resnext;

pub use blocks::*;
pub use resnext::*;

// ResNet residual stage unit counts
const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];
const RESNET34_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];
const RESNET152_BLOCKS: [usize; 4] = [3, 8, 36, 3];

/// ResNet configuration
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Number of units in each stage, [3, 4, 6, 3] for ResNet50
    pub layers: [usize; 4],
    /// Use bottleneck units (ResNet50 and deeper)
    pub bottleneck: bool,
    /// Number of input image channels
    #[config(default = "3")]
    pub in_channels: usize,
}

impl ResNetConfig {
    /// ResNet18 configuration
    pub fn resnet18() -> Self {
        Self::new(RESNET18_BLOCKS, false)
    }

    /// ResNet34 configuration
    pub fn resnet34() -> Self {
        Self::new(RESNET34_BLOCKS, false)
    }

    /// ResNet50 configuration
    pub fn resnet50() -> Self {
        Self::new(RESNET50_BLOCKS, true)
    }

    /// ResNet101 configuration
    pub fn resnet101() -> Self {
        Self::new(RESNET101_BLOCKS, true)
    }

    /// ResNet152 configuration
    pub fn resnet152() -> Self {
        Self::new(RESNET152_BLOCKS, true)
    }

    /// Initialize ResNet model
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNetBackbone<B> {
        let mut graph = LayerGraph::new();
        let stem = Stem::new(self.in_channels, &mut graph, device);

        let mut channels = STEM_CHANNELS;
        let mut reduction = 4;
        let mut stages = Vec::with_capacity(self.layers.len());

        for (stage, &num_units) in self.layers.iter().enumerate() {
            let filters = STEM_CHANNELS << stage;
            let (block, out_channels) = StageBlock::new(
                stage,
                num_units,
                channels,
                filters,
                reduction,
                self.bottleneck,
                &mut graph,
                device,
            );
            stages.push(block);
            channels = out_channels;
            if stage > 0 {
                reduction *= 2;
            }
        }

        graph.push("bn1", channels, reduction);
        graph.push("relu1", channels, reduction);

        ResNetBackbone {
            stem,
            stages,
            bn1: BatchNormConfig::new(channels).init(device),
            relu: Relu::new(),
            graph: Ignored(graph),
        }
    }
}

/// Pre-activation ResNet encoder.
///
/// Output is `relu1` at 1/32 of the input resolution.
#[derive(Module, Debug)]
pub struct ResNetBackbone<B: Backend> {
    pub stem: Stem<B>,
    pub stages: Vec<StageBlock<B>>,
    pub bn1: BatchNorm<B, 2>,
    relu: Relu,
    graph: Ignored<LayerGraph>,
}

impl<B: Backend> ResNetBackbone<B> {
    /// Create ResNet-18 encoder.
    pub fn resnet18(device: &Device<B>) -> Self {
        ResNetConfig::resnet18().init(device)
    }

    /// Create ResNet-34 encoder.
    pub fn resnet34(device: &Device<B>) -> Self {
        ResNetConfig::resnet34().init(device)
    }

    /// Create ResNet-50 encoder.
    pub fn resnet50(device: &Device<B>) -> Self {
        ResNetConfig::resnet50().init(device)
    }

    /// Create ResNet-101 encoder.
    pub fn resnet101(device: &Device<B>) -> Self {
        ResNetConfig::resnet101().init(device)
    }

    /// Create ResNet-152 encoder.
    pub fn resnet152(device: &Device<B>) -> Self {
        ResNetConfig::resnet152().init(device)
    }

    /// The layer graph of this encoder.
    pub fn layer_graph(&self) -> &LayerGraph {
        &self.graph.0
    }

    /// Forward pass, recording every graph node into `taps`.
    pub fn forward_taps(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        let mut out = self.stem.forward(input, taps);
        for stage in &self.stages {
            out = stage.forward(out, taps);
        }

        let out = self.bn1.forward(out);
        taps.visit(&out);
        let out = self.relu.forward(out);
        taps.visit(&out);
        out
    }

    /// Forward pass returning only the encoder output.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward_taps(input, &mut FeatureTaps::none())
    }
}
