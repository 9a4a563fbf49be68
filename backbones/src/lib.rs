//! Encoder implementations for U-Net segmentation models
//!
//! This crate provides a unified interface over the encoder architectures the
//! segmentation models can be built on: VGG, ResNet and ResNeXt. Every encoder
//! exposes a [`LayerGraph`] describing its tappable layers, and a forward pass that
//! records the requested layers through [`FeatureTaps`].

use core::{fmt, str::FromStr};

use burn::prelude::*;
use thiserror::Error;

pub use feature_taps::{FeatureTaps, LayerGraph, LayerInfo, TapError};
pub use resnet::{ResNeXtBackbone, ResNeXtConfig, ResNetBackbone, ResNetConfig};
pub use vgg::{VggBackbone, VggConfig, VggVariant};

/// Errors raised while selecting an encoder.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BackboneError {
    /// The name does not denote any known architecture.
    #[error("Unknown backbone: {name}")]
    UnknownBackbone {
        /// The requested name.
        name: String,
    },

    /// The architecture is known but no encoder is implemented for it.
    #[error("Backbone {name} is known but has no encoder implementation")]
    Unsupported {
        /// The requested name.
        name: String,
    },
}

/// Unified encoder trait
pub trait Encoder<B: Backend> {
    /// Ordered description of every tappable layer.
    fn layer_graph(&self) -> &LayerGraph;

    /// Forward pass through the encoder
    ///
    /// # Arguments
    /// * `input` - Input tensor of shape `[batch_size, channels, height, width]`
    /// * `taps` - Recorder that receives every layer output in graph order
    ///
    /// # Returns
    /// The encoder output (the last node of the layer graph)
    fn forward_taps(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4>;

    /// Channels of the encoder output.
    fn output_channels(&self) -> usize {
        self.layer_graph().last().map_or(0, |layer| layer.channels)
    }

    /// Total downsampling factor of the encoder output.
    fn reduction(&self) -> usize {
        self.layer_graph().last().map_or(1, |layer| layer.reduction)
    }
}

impl<B: Backend> Encoder<B> for VggBackbone<B> {
    fn layer_graph(&self) -> &LayerGraph {
        self.layer_graph()
    }

    fn forward_taps(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        self.forward_taps(input, taps)
    }
}

impl<B: Backend> Encoder<B> for ResNetBackbone<B> {
    fn layer_graph(&self) -> &LayerGraph {
        self.layer_graph()
    }

    fn forward_taps(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        self.forward_taps(input, taps)
    }
}

impl<B: Backend> Encoder<B> for ResNeXtBackbone<B> {
    fn layer_graph(&self) -> &LayerGraph {
        self.layer_graph()
    }

    fn forward_taps(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        self.forward_taps(input, taps)
    }
}

/// Enumeration of known backbone architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackboneKind {
    /// VGG-16
    Vgg16,
    /// VGG-19
    Vgg19,
    /// ResNet-18
    ResNet18,
    /// ResNet-34
    ResNet34,
    /// ResNet-50
    ResNet50,
    /// ResNet-101
    ResNet101,
    /// ResNet-152
    ResNet152,
    /// ResNeXt-50
    ResNeXt50,
    /// ResNeXt-101
    ResNeXt101,
    /// Inception v3
    InceptionV3,
    /// Inception-ResNet v2
    InceptionResNetV2,
    /// DenseNet-121
    DenseNet121,
    /// DenseNet-169
    DenseNet169,
    /// DenseNet-201
    DenseNet201,
}

impl BackboneKind {
    /// Every known architecture.
    pub const ALL: [Self; 14] = [
        Self::Vgg16,
        Self::Vgg19,
        Self::ResNet18,
        Self::ResNet34,
        Self::ResNet50,
        Self::ResNet101,
        Self::ResNet152,
        Self::ResNeXt50,
        Self::ResNeXt101,
        Self::InceptionV3,
        Self::InceptionResNetV2,
        Self::DenseNet121,
        Self::DenseNet169,
        Self::DenseNet201,
    ];

    /// The canonical lowercase name, e.g. `resnet34`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vgg16 => "vgg16",
            Self::Vgg19 => "vgg19",
            Self::ResNet18 => "resnet18",
            Self::ResNet34 => "resnet34",
            Self::ResNet50 => "resnet50",
            Self::ResNet101 => "resnet101",
            Self::ResNet152 => "resnet152",
            Self::ResNeXt50 => "resnext50",
            Self::ResNeXt101 => "resnext101",
            Self::InceptionV3 => "inceptionv3",
            Self::InceptionResNetV2 => "inceptionresnetv2",
            Self::DenseNet121 => "densenet121",
            Self::DenseNet169 => "densenet169",
            Self::DenseNet201 => "densenet201",
        }
    }

    /// Whether [`create_backbone`] can build this architecture.
    pub const fn is_implemented(self) -> bool {
        !matches!(
            self,
            Self::InceptionV3
                | Self::InceptionResNetV2
                | Self::DenseNet121
                | Self::DenseNet169
                | Self::DenseNet201
        )
    }
}

impl fmt::Display for BackboneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackboneKind {
    type Err = BackboneError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| BackboneError::UnknownBackbone {
                name: name.to_string(),
            })
    }
}

/// Enum to wrap different encoder implementations
#[derive(Module, Debug)]
pub enum BackboneEncoder<B: Backend> {
    /// VGG encoder
    Vgg(VggBackbone<B>),
    /// ResNet encoder
    ResNet(ResNetBackbone<B>),
    /// ResNeXt encoder
    ResNeXt(ResNeXtBackbone<B>),
}

impl<B: Backend> Encoder<B> for BackboneEncoder<B> {
    fn layer_graph(&self) -> &LayerGraph {
        match self {
            Self::Vgg(encoder) => encoder.layer_graph(),
            Self::ResNet(encoder) => encoder.layer_graph(),
            Self::ResNeXt(encoder) => encoder.layer_graph(),
        }
    }

    fn forward_taps(&self, input: Tensor<B, 4>, taps: &mut FeatureTaps<B>) -> Tensor<B, 4> {
        match self {
            Self::Vgg(encoder) => encoder.forward_taps(input, taps),
            Self::ResNet(encoder) => encoder.forward_taps(input, taps),
            Self::ResNeXt(encoder) => encoder.forward_taps(input, taps),
        }
    }
}

/// Factory function to create encoders
///
/// # Errors
///
/// Returns [`BackboneError::Unsupported`] for architectures without an encoder
/// implementation.
pub fn create_backbone<B: Backend>(
    kind: BackboneKind,
    in_channels: usize,
    device: &Device<B>,
) -> Result<BackboneEncoder<B>, BackboneError> {
    let encoder = match kind {
        BackboneKind::Vgg16 => BackboneEncoder::Vgg(
            VggConfig::vgg16()
                .with_in_channels(in_channels)
                .init(device),
        ),
        BackboneKind::Vgg19 => BackboneEncoder::Vgg(
            VggConfig::vgg19()
                .with_in_channels(in_channels)
                .init(device),
        ),
        BackboneKind::ResNet18 => BackboneEncoder::ResNet(
            ResNetConfig::resnet18()
                .with_in_channels(in_channels)
                .init(device),
        ),
        BackboneKind::ResNet34 => BackboneEncoder::ResNet(
            ResNetConfig::resnet34()
                .with_in_channels(in_channels)
                .init(device),
        ),
        BackboneKind::ResNet50 => BackboneEncoder::ResNet(
            ResNetConfig::resnet50()
                .with_in_channels(in_channels)
                .init(device),
        ),
        BackboneKind::ResNet101 => BackboneEncoder::ResNet(
            ResNetConfig::resnet101()
                .with_in_channels(in_channels)
                .init(device),
        ),
        BackboneKind::ResNet152 => BackboneEncoder::ResNet(
            ResNetConfig::resnet152()
                .with_in_channels(in_channels)
                .init(device),
        ),
        BackboneKind::ResNeXt50 => BackboneEncoder::ResNeXt(
            ResNeXtConfig::resnext50()
                .with_in_channels(in_channels)
                .init(device),
        ),
        BackboneKind::ResNeXt101 => BackboneEncoder::ResNeXt(
            ResNeXtConfig::resnext101()
                .with_in_channels(in_channels)
                .init(device),
        ),
        BackboneKind::InceptionV3
        | BackboneKind::InceptionResNetV2
        | BackboneKind::DenseNet121
        | BackboneKind::DenseNet169
        | BackboneKind::DenseNet201 => {
            return Err(BackboneError::Unsupported {
                name: kind.to_string(),
            })
        }
    };

    Ok(encoder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_backbone_names_round_trip() {
        for kind in BackboneKind::ALL {
            assert_eq!(kind.as_str().parse::<BackboneKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_unknown_backbone_name() {
        assert_eq!(
            "resnet999".parse::<BackboneKind>(),
            Err(BackboneError::UnknownBackbone {
                name: "resnet999".to_string()
            })
        );
    }

    #[test]
    fn test_unimplemented_backbone() {
        let result =
            create_backbone::<TestBackend>(BackboneKind::DenseNet121, 3, &Default::default());
        assert!(matches!(result, Err(BackboneError::Unsupported { .. })));
    }

    #[test]
    fn test_vgg_backbone() {
        let device = Default::default();
        let backbone = create_backbone::<TestBackend>(BackboneKind::Vgg16, 3, &device).unwrap();

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 64, 64],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = backbone.forward_taps(input, &mut FeatureTaps::none());

        assert_eq!(output.dims(), [1, 512, 2, 2]);
        assert_eq!(backbone.output_channels(), 512);
        assert_eq!(backbone.reduction(), 32);
    }

    #[test]
    fn test_resnet_backbone_with_single_channel_input() {
        let device = Default::default();
        let backbone = create_backbone::<TestBackend>(BackboneKind::ResNet18, 1, &device).unwrap();

        let input = Tensor::<TestBackend, 4>::random(
            [2, 1, 32, 32],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = backbone.forward_taps(input, &mut FeatureTaps::none());

        assert_eq!(output.dims(), [2, 512, 1, 1]);
    }

    #[test]
    fn test_every_implemented_backbone_reduces_by_32() {
        let device = Default::default();
        for kind in BackboneKind::ALL
            .into_iter()
            .filter(|kind| kind.is_implemented())
            .filter(|kind| !matches!(kind, BackboneKind::ResNet152 | BackboneKind::ResNeXt101))
        {
            let backbone = create_backbone::<TestBackend>(kind, 3, &device).unwrap();
            assert_eq!(backbone.reduction(), 32, "{kind}");
        }
    }
}
