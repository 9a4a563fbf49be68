//! ResNet building blocks.
//!
//! This module contains the stem shared by ResNet and ResNeXt, the pre-activation
//! residual units (basic and bottleneck) and the stage container. Every block
//! registers its nodes in the encoder's [`LayerGraph`] while it is built, and visits
//! them in the same order in its forward pass.

use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};
use feature_taps::{FeatureTaps, LayerGraph};

/// Channels produced by the stem convolution.
pub const STEM_CHANNELS: usize = 64;

/// Bias-free convolution with "same" padding for odd kernels.
pub(crate) fn conv2d<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    groups: usize,
    device: &Device<B>,
) -> Conv2d<B> {
    let initializer = Initializer::KaimingNormal {
        gain: SQRT_2,
        fan_out_only: true,
    };
    let padding = kernel / 2;

    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_groups(groups)
        .with_bias(false)
        .with_initializer(initializer)
        .init(device)
}

/// Stem: bn_data + conv0 + bn0 + relu0 + pooling0.
///
/// Registers `data`, `bn_data`, `conv0`, `bn0`, `relu0` and `pooling0`.
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    pub bn_data: BatchNorm<B, 2>,
    pub conv0: Conv2d<B>,
    pub bn0: BatchNorm<B, 2>,
    relu: Relu,
    pooling: MaxPool2d,
}

impl<B: Backend> Stem<B> {
    pub fn forward(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        taps.visit(&input);
        let out = self.bn_data.forward(input);
        taps.visit(&out);
        let out = self.conv0.forward(out);
        taps.visit(&out);
        let out = self.bn0.forward(out);
        taps.visit(&out);
        let out = self.relu.forward(out);
        taps.visit(&out);
        let out = self.pooling.forward(out);
        taps.visit(&out);
        out
    }

    /// Create a new stem and register its nodes.
    pub fn new(in_channels: usize, graph: &mut LayerGraph, device: &Device<B>) -> Self {
        graph.push("data", in_channels, 1);
        graph.push("bn_data", in_channels, 1);
        graph.push("conv0", STEM_CHANNELS, 2);
        graph.push("bn0", STEM_CHANNELS, 2);
        graph.push("relu0", STEM_CHANNELS, 2);
        graph.push("pooling0", STEM_CHANNELS, 4);

        // 7x7 conv, stride=2, padding=3
        let conv0 = conv2d([in_channels, STEM_CHANNELS], 7, 2, 1, device);

        // 3x3 maxpool, stride=2, padding=1
        let pooling = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        Self {
            bn_data: BatchNormConfig::new(in_channels).init(device),
            conv0,
            bn0: BatchNormConfig::new(STEM_CHANNELS).init(device),
            relu: Relu::new(),
            pooling,
        }
    }
}

/// Geometry of a residual unit being built.
#[derive(Debug, Clone)]
pub struct UnitSpec {
    /// Node name prefix, e.g. `stage2_unit1_`.
    pub prefix: String,
    pub in_channels: usize,
    pub filters: usize,
    pub stride: usize,
    /// Reduction of the unit input.
    pub reduction: usize,
    /// Whether the shortcut is a strided 1x1 projection of the pre-activated input.
    pub projection: bool,
}

impl UnitSpec {
    fn name(&self, node: &str) -> String {
        format!("{}{node}", self.prefix)
    }

    const fn out_reduction(&self) -> usize {
        self.reduction * self.stride
    }
}

#[derive(Module, Debug)]
pub enum ResidualUnit<B: Backend> {
    /// A basic pre-activation unit.
    Basic(BasicUnit<B>),
    /// A bottleneck pre-activation unit.
    Bottleneck(BottleneckUnit<B>),
}

impl<B: Backend> ResidualUnit<B> {
    pub fn forward(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        match self {
            Self::Basic(unit) => unit.forward(input, taps),
            Self::Bottleneck(unit) => unit.forward(input, taps),
        }
    }
}

/// Pre-activation basic unit: bn1, relu1, [sc], conv1, bn2, relu2, conv2, add.
#[derive(Module, Debug)]
pub struct BasicUnit<B: Backend> {
    pub bn1: BatchNorm<B, 2>,
    pub conv1: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub shortcut: Option<Conv2d<B>>,
    relu: Relu,
}

impl<B: Backend> BasicUnit<B> {
    pub fn forward(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self.bn1.forward(input);
        taps.visit(&out);
        let out = self.relu.forward(out);
        taps.visit(&out);

        let shortcut = match &self.shortcut {
            Some(shortcut) => {
                let projected = shortcut.forward(out.clone());
                taps.visit(&projected);
                projected
            }
            None => identity,
        };

        let out = self.conv1.forward(out);
        taps.visit(&out);
        let out = self.bn2.forward(out);
        taps.visit(&out);
        let out = self.relu.forward(out);
        taps.visit(&out);
        let out = self.conv2.forward(out);
        taps.visit(&out);

        let out = out + shortcut;
        taps.visit(&out);
        out
    }

    /// Create a new basic unit and register its nodes.
    pub fn new(spec: &UnitSpec, graph: &mut LayerGraph, device: &Device<B>) -> Self {
        let (r_in, r_out) = (spec.reduction, spec.out_reduction());

        graph.push(spec.name("bn1"), spec.in_channels, r_in);
        graph.push(spec.name("relu1"), spec.in_channels, r_in);
        if spec.projection {
            graph.push(spec.name("sc"), spec.filters, r_out);
        }
        graph.push(spec.name("conv1"), spec.filters, r_out);
        graph.push(spec.name("bn2"), spec.filters, r_out);
        graph.push(spec.name("relu2"), spec.filters, r_out);
        graph.push(spec.name("conv2"), spec.filters, r_out);
        graph.push(spec.name("add"), spec.filters, r_out);

        let shortcut = spec.projection.then(|| {
            conv2d([spec.in_channels, spec.filters], 1, spec.stride, 1, device)
        });

        Self {
            bn1: BatchNormConfig::new(spec.in_channels).init(device),
            conv1: conv2d([spec.in_channels, spec.filters], 3, spec.stride, 1, device),
            bn2: BatchNormConfig::new(spec.filters).init(device),
            conv2: conv2d([spec.filters, spec.filters], 3, 1, 1, device),
            shortcut,
            relu: Relu::new(),
        }
    }
}

/// Pre-activation bottleneck unit with expansion 4.
///
/// Nodes: bn1, relu1, [sc], conv1, bn2, relu2, conv2, bn3, relu3, conv3, add.
/// The stride sits on the 3x3 convolution.
#[derive(Module, Debug)]
pub struct BottleneckUnit<B: Backend> {
    pub bn1: BatchNorm<B, 2>,
    pub conv1: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn3: BatchNorm<B, 2>,
    pub conv3: Conv2d<B>,
    pub shortcut: Option<Conv2d<B>>,
    relu: Relu,
}

/// Bottleneck channel expansion.
pub const BOTTLENECK_EXPANSION: usize = 4;

impl<B: Backend> BottleneckUnit<B> {
    pub fn forward(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self.bn1.forward(input);
        taps.visit(&out);
        let out = self.relu.forward(out);
        taps.visit(&out);

        let shortcut = match &self.shortcut {
            Some(shortcut) => {
                let projected = shortcut.forward(out.clone());
                taps.visit(&projected);
                projected
            }
            None => identity,
        };

        let out = self.conv1.forward(out);
        taps.visit(&out);
        let out = self.bn2.forward(out);
        taps.visit(&out);
        let out = self.relu.forward(out);
        taps.visit(&out);
        let out = self.conv2.forward(out);
        taps.visit(&out);
        let out = self.bn3.forward(out);
        taps.visit(&out);
        let out = self.relu.forward(out);
        taps.visit(&out);
        let out = self.conv3.forward(out);
        taps.visit(&out);

        let out = out + shortcut;
        taps.visit(&out);
        out
    }

    /// Create a new bottleneck unit and register its nodes.
    pub fn new(spec: &UnitSpec, graph: &mut LayerGraph, device: &Device<B>) -> Self {
        let (r_in, r_out) = (spec.reduction, spec.out_reduction());
        let out_channels = spec.filters * BOTTLENECK_EXPANSION;

        graph.push(spec.name("bn1"), spec.in_channels, r_in);
        graph.push(spec.name("relu1"), spec.in_channels, r_in);
        if spec.projection {
            graph.push(spec.name("sc"), out_channels, r_out);
        }
        graph.push(spec.name("conv1"), spec.filters, r_in);
        graph.push(spec.name("bn2"), spec.filters, r_in);
        graph.push(spec.name("relu2"), spec.filters, r_in);
        graph.push(spec.name("conv2"), spec.filters, r_out);
        graph.push(spec.name("bn3"), spec.filters, r_out);
        graph.push(spec.name("relu3"), spec.filters, r_out);
        graph.push(spec.name("conv3"), out_channels, r_out);
        graph.push(spec.name("add"), out_channels, r_out);

        let shortcut = spec.projection.then(|| {
            conv2d([spec.in_channels, out_channels], 1, spec.stride, 1, device)
        });

        Self {
            bn1: BatchNormConfig::new(spec.in_channels).init(device),
            conv1: conv2d([spec.in_channels, spec.filters], 1, 1, 1, device),
            bn2: BatchNormConfig::new(spec.filters).init(device),
            conv2: conv2d([spec.filters, spec.filters], 3, spec.stride, 1, device),
            bn3: BatchNormConfig::new(spec.filters).init(device),
            conv3: conv2d([spec.filters, out_channels], 1, 1, 1, device),
            shortcut,
            relu: Relu::new(),
        }
    }
}

/// Collection of sequential residual units forming one stage.
#[derive(Module, Debug)]
pub struct StageBlock<B: Backend> {
    pub units: Vec<ResidualUnit<B>>,
}

impl<B: Backend> StageBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        let mut out = input;
        for unit in &self.units {
            out = unit.forward(out, taps);
        }
        out
    }

    /// Create stage `stage` (zero based) and register its nodes.
    ///
    /// Returns the stage together with its output channels.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stage: usize,
        num_units: usize,
        in_channels: usize,
        filters: usize,
        reduction: usize,
        bottleneck: bool,
        graph: &mut LayerGraph,
        device: &Device<B>,
    ) -> (Self, usize) {
        let out_channels = if bottleneck {
            filters * BOTTLENECK_EXPANSION
        } else {
            filters
        };
        // The first stage follows the stride-2 max pool and keeps its resolution.
        let stride = if stage == 0 { 1 } else { 2 };

        let units = (0..num_units)
            .map(|u| {
                // First unit projects the shortcut and applies the stride
                let spec = UnitSpec {
                    prefix: format!("stage{}_unit{}_", stage + 1, u + 1),
                    in_channels: if u == 0 { in_channels } else { out_channels },
                    filters,
                    stride: if u == 0 { stride } else { 1 },
                    reduction: if u == 0 { reduction } else { reduction * stride },
                    projection: u == 0,
                };
                if bottleneck {
                    ResidualUnit::Bottleneck(BottleneckUnit::new(&spec, graph, device))
                } else {
                    ResidualUnit::Basic(BasicUnit::new(&spec, graph, device))
                }
            })
            .collect();

        (Self { units }, out_channels)
    }
}
