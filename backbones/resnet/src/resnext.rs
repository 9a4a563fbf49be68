//! ResNeXt encoder.
//!
//! Post-activation bottleneck units with a grouped 3x3 convolution. Shares the stem
//! (and therefore `relu0`) with ResNet; the first ReLU of each unit is registered as
//! `stageN_unitM_relu1`.

use burn::{
    module::Ignored,
    nn::{conv::Conv2d, BatchNorm, BatchNormConfig, Relu},
    prelude::*,
};
use feature_taps::{FeatureTaps, LayerGraph};

use crate::blocks::{conv2d, Stem, UnitSpec, STEM_CHANNELS};

const RESNEXT50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNEXT101_BLOCKS: [usize; 4] = [3, 4, 23, 3];

/// Width of the first stage; doubled at every following stage.
const RESNEXT_BASE_FILTERS: usize = 128;
/// Output channel expansion of a unit.
const RESNEXT_EXPANSION: usize = 2;

/// ResNeXt configuration
#[derive(Config, Debug)]
pub struct ResNeXtConfig {
    /// Number of units in each stage
    pub layers: [usize; 4],
    /// Number of groups of the 3x3 convolution
    #[config(default = "32")]
    pub cardinality: usize,
    /// Number of input image channels
    #[config(default = "3")]
    pub in_channels: usize,
}

impl ResNeXtConfig {
    /// ResNeXt50 (32x4d) configuration
    pub fn resnext50() -> Self {
        Self::new(RESNEXT50_BLOCKS)
    }

    /// ResNeXt101 (32x4d) configuration
    pub fn resnext101() -> Self {
        Self::new(RESNEXT101_BLOCKS)
    }

    /// Initialize ResNeXt model
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNeXtBackbone<B> {
        let mut graph = LayerGraph::new();
        let stem = Stem::new(self.in_channels, &mut graph, device);

        let mut channels = STEM_CHANNELS;
        let mut reduction = 4;
        let mut stages = Vec::with_capacity(self.layers.len());

        for (stage, &num_units) in self.layers.iter().enumerate() {
            let filters = RESNEXT_BASE_FILTERS << stage;
            let stride = if stage == 0 { 1 } else { 2 };

            let units = (0..num_units)
                .map(|u| {
                    let spec = UnitSpec {
                        prefix: format!("stage{}_unit{}_", stage + 1, u + 1),
                        in_channels: if u == 0 {
                            channels
                        } else {
                            filters * RESNEXT_EXPANSION
                        },
                        filters,
                        stride: if u == 0 { stride } else { 1 },
                        reduction: if u == 0 { reduction } else { reduction * stride },
                        projection: u == 0,
                    };
                    ResNeXtUnit::new(&spec, self.cardinality, &mut graph, device)
                })
                .collect();

            stages.push(ResNeXtStage { units });
            channels = filters * RESNEXT_EXPANSION;
            reduction *= stride;
        }

        ResNeXtBackbone {
            stem,
            stages,
            graph: Ignored(graph),
        }
    }
}

/// ResNeXt encoder.
///
/// Output is the last unit's ReLU at 1/32 of the input resolution.
#[derive(Module, Debug)]
pub struct ResNeXtBackbone<B: Backend> {
    pub stem: Stem<B>,
    pub stages: Vec<ResNeXtStage<B>>,
    graph: Ignored<LayerGraph>,
}

impl<B: Backend> ResNeXtBackbone<B> {
    /// Create ResNeXt-50 encoder.
    pub fn resnext50(device: &Device<B>) -> Self {
        ResNeXtConfig::resnext50().init(device)
    }

    /// Create ResNeXt-101 encoder.
    pub fn resnext101(device: &Device<B>) -> Self {
        ResNeXtConfig::resnext101().init(device)
    }

    /// The layer graph of this encoder.
    pub fn layer_graph(&self) -> &LayerGraph {
        &self.graph.0
    }

    /// Forward pass, recording every graph node into `taps`.
    pub fn forward_taps(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        let mut out = self.stem.forward(input, taps);
        for stage in &self.stages {
            for unit in &stage.units {
                out = unit.forward(out, taps);
            }
        }
        out
    }

    /// Forward pass returning only the encoder output.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward_taps(input, &mut FeatureTaps::none())
    }
}

#[derive(Module, Debug)]
pub struct ResNeXtStage<B: Backend> {
    pub units: Vec<ResNeXtUnit<B>>,
}

/// Projection shortcut: 1x1 conv + BatchNorm.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

/// Nodes: conv1, bn1, relu1, conv2, bn2, relu2, conv3, bn3, [sc, sc_bn], add, relu.
#[derive(Module, Debug)]
pub struct ResNeXtUnit<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub conv3: Conv2d<B>,
    pub bn3: BatchNorm<B, 2>,
    pub downsample: Option<Downsample<B>>,
    relu: Relu,
}

impl<B: Backend> ResNeXtUnit<B> {
    pub fn forward(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self.conv1.forward(input);
        taps.visit(&out);
        let out = self.bn1.forward(out);
        taps.visit(&out);
        let out = self.relu.forward(out);
        taps.visit(&out);
        let out = self.conv2.forward(out);
        taps.visit(&out);
        let out = self.bn2.forward(out);
        taps.visit(&out);
        let out = self.relu.forward(out);
        taps.visit(&out);
        let out = self.conv3.forward(out);
        taps.visit(&out);
        let out = self.bn3.forward(out);
        taps.visit(&out);

        let shortcut = match &self.downsample {
            Some(downsample) => {
                let projected = downsample.conv.forward(identity);
                taps.visit(&projected);
                let projected = downsample.bn.forward(projected);
                taps.visit(&projected);
                projected
            }
            None => identity,
        };

        let out = out + shortcut;
        taps.visit(&out);
        let out = self.relu.forward(out);
        taps.visit(&out);
        out
    }

    /// Create a new unit and register its nodes.
    pub fn new(
        spec: &UnitSpec,
        cardinality: usize,
        graph: &mut LayerGraph,
        device: &Device<B>,
    ) -> Self {
        let r_in = spec.reduction;
        let r_out = spec.reduction * spec.stride;
        let out_channels = spec.filters * RESNEXT_EXPANSION;
        let name = |node: &str| format!("{}{node}", spec.prefix);

        graph.push(name("conv1"), spec.filters, r_in);
        graph.push(name("bn1"), spec.filters, r_in);
        graph.push(name("relu1"), spec.filters, r_in);
        graph.push(name("conv2"), spec.filters, r_out);
        graph.push(name("bn2"), spec.filters, r_out);
        graph.push(name("relu2"), spec.filters, r_out);
        graph.push(name("conv3"), out_channels, r_out);
        graph.push(name("bn3"), out_channels, r_out);
        if spec.projection {
            graph.push(name("sc"), out_channels, r_out);
            graph.push(name("sc_bn"), out_channels, r_out);
        }
        graph.push(name("add"), out_channels, r_out);
        graph.push(name("relu"), out_channels, r_out);

        let downsample = spec.projection.then(|| Downsample {
            conv: conv2d([spec.in_channels, out_channels], 1, spec.stride, 1, device),
            bn: BatchNormConfig::new(out_channels).init(device),
        });

        Self {
            conv1: conv2d([spec.in_channels, spec.filters], 1, 1, 1, device),
            bn1: BatchNormConfig::new(spec.filters).init(device),
            conv2: conv2d(
                [spec.filters, spec.filters],
                3,
                spec.stride,
                cardinality,
                device,
            ),
            bn2: BatchNormConfig::new(spec.filters).init(device),
            conv3: conv2d([spec.filters, out_channels], 1, 1, 1, device),
            bn3: BatchNormConfig::new(out_channels).init(device),
            downsample,
            relu: Relu::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    #[test]
    fn resnext50_exposes_resnet_skip_names() {
        let model = ResNeXtBackbone::<TestBackend>::resnext50(&Default::default());
        let graph = model.layer_graph();

        for (name, reduction) in [
            ("stage4_unit1_relu1", 16),
            ("stage3_unit1_relu1", 8),
            ("stage2_unit1_relu1", 4),
            ("relu0", 2),
        ] {
            let index = graph.position(name).unwrap();
            assert_eq!(graph.get(index).unwrap().reduction, reduction, "{name}");
        }

        let output = graph.last().unwrap();
        assert_eq!(output.name, "stage4_unit3_relu");
        assert_eq!(output.channels, 2048);
        assert_eq!(output.reduction, 32);
    }

    #[test]
    fn resnext50_forward_visits_every_graph_node() {
        let device = Default::default();
        let model = ResNeXtBackbone::<TestBackend>::resnext50(&device);
        let mut taps = FeatureTaps::none();

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 64, 64],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = model.forward_taps(input, &mut taps);

        assert_eq!(taps.visited(), model.layer_graph().len());
        assert_eq!(output.dims(), [1, 2048, 2, 2]);
    }
}
