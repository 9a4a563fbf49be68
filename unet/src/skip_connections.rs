//! # Default Skip Connections
//!
//! Static table of the encoder layers that feed the decoder for every known backbone,
//! listed deepest first. VGG, ResNet and ResNeXt entries are layer names from the
//! encoder's layer graph; Inception and DenseNet entries are graph positions.

use crate::{
    config::{EncoderFeatures, LayerRef},
    error::{UnetError, UnetResult},
};

/// A skip-connection reference as stored in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipLayer {
    Name(&'static str),
    Index(usize),
}

impl From<SkipLayer> for LayerRef {
    fn from(layer: SkipLayer) -> Self {
        match layer {
            SkipLayer::Name(name) => Self::Name(name.to_string()),
            SkipLayer::Index(index) => Self::Index(index),
        }
    }
}

use SkipLayer::{Index, Name};

const VGG16_SKIPS: &[SkipLayer] = &[
    Name("block5_conv3"),
    Name("block4_conv3"),
    Name("block3_conv3"),
    Name("block2_conv2"),
    Name("block1_conv2"),
];

const VGG19_SKIPS: &[SkipLayer] = &[
    Name("block5_conv4"),
    Name("block4_conv4"),
    Name("block3_conv4"),
    Name("block2_conv2"),
    Name("block1_conv2"),
];

const RESNET_SKIPS: &[SkipLayer] = &[
    Name("stage4_unit1_relu1"),
    Name("stage3_unit1_relu1"),
    Name("stage2_unit1_relu1"),
    Name("relu0"),
];

/// Backbone name to default skip layers.
pub static DEFAULT_SKIP_CONNECTIONS: &[(&str, &[SkipLayer])] = &[
    ("vgg16", VGG16_SKIPS),
    ("vgg19", VGG19_SKIPS),
    ("resnet18", RESNET_SKIPS),
    ("resnet34", RESNET_SKIPS),
    ("resnet50", RESNET_SKIPS),
    ("resnet101", RESNET_SKIPS),
    ("resnet152", RESNET_SKIPS),
    ("resnext50", RESNET_SKIPS),
    ("resnext101", RESNET_SKIPS),
    ("inceptionv3", &[Index(228), Index(86), Index(16), Index(9)]),
    ("inceptionresnetv2", &[Index(594), Index(260), Index(16), Index(9)]),
    ("densenet121", &[Index(311), Index(139), Index(51), Index(4)]),
    ("densenet169", &[Index(367), Index(139), Index(51), Index(4)]),
    ("densenet201", &[Index(479), Index(139), Index(51), Index(4)]),
];

/// Returns the default skip layers of `backbone`, deepest first.
///
/// # Errors
///
/// Returns [`UnetError::NoDefaultSkipConnections`] when the backbone is not listed.
pub fn default_skip_connections(backbone: &str) -> UnetResult<Vec<LayerRef>> {
    DEFAULT_SKIP_CONNECTIONS
        .iter()
        .find(|(name, _)| *name == backbone)
        .map(|(_, layers)| layers.iter().copied().map(LayerRef::from).collect())
        .ok_or_else(|| UnetError::NoDefaultSkipConnections {
            backbone: backbone.to_string(),
        })
}

/// Turns an [`EncoderFeatures`] selector into a concrete list of layer references.
///
/// An explicit list is returned verbatim, even for backbones missing from the table.
pub fn resolve_encoder_features(
    backbone: &str,
    features: &EncoderFeatures,
) -> UnetResult<Vec<LayerRef>> {
    match features {
        EncoderFeatures::Default => default_skip_connections(backbone),
        EncoderFeatures::Layers(layers) => Ok(layers.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vgg16_defaults_are_deepest_first() {
        let skips = default_skip_connections("vgg16").unwrap();
        assert_eq!(
            skips,
            ["block5_conv3", "block4_conv3", "block3_conv3", "block2_conv2", "block1_conv2"]
                .map(LayerRef::from)
        );
    }

    #[test]
    fn resnet_family_shares_skip_layers() {
        let expected = default_skip_connections("resnet18").unwrap();
        for backbone in [
            "resnet34",
            "resnet50",
            "resnet101",
            "resnet152",
            "resnext50",
            "resnext101",
        ] {
            assert_eq!(default_skip_connections(backbone).unwrap(), expected);
        }
        assert_eq!(expected.len(), 4);
        assert_eq!(expected[3], LayerRef::from("relu0"));
    }

    #[test]
    fn positional_entries_are_indices() {
        assert_eq!(
            default_skip_connections("densenet201").unwrap(),
            [479_usize, 139, 51, 4].map(LayerRef::from)
        );
        assert_eq!(
            default_skip_connections("inceptionresnetv2").unwrap(),
            [594_usize, 260, 16, 9].map(LayerRef::from)
        );
    }

    #[test]
    fn remaining_entries_match_their_backbones() {
        assert_eq!(
            default_skip_connections("vgg19").unwrap(),
            ["block5_conv4", "block4_conv4", "block3_conv4", "block2_conv2", "block1_conv2"]
                .map(LayerRef::from)
        );
        assert_eq!(
            default_skip_connections("inceptionv3").unwrap(),
            [228_usize, 86, 16, 9].map(LayerRef::from)
        );
        assert_eq!(
            default_skip_connections("densenet121").unwrap(),
            [311_usize, 139, 51, 4].map(LayerRef::from)
        );
        assert_eq!(
            default_skip_connections("densenet169").unwrap(),
            [367_usize, 139, 51, 4].map(LayerRef::from)
        );
    }

    #[test]
    fn default_features_resolve_to_the_table_entry_in_order() {
        for (backbone, layers) in DEFAULT_SKIP_CONNECTIONS {
            let resolved = resolve_encoder_features(backbone, &EncoderFeatures::Default).unwrap();
            let expected: Vec<LayerRef> = layers.iter().copied().map(LayerRef::from).collect();
            assert_eq!(resolved, expected, "{backbone}");
        }
    }

    #[test]
    fn every_entry_has_at_most_five_layers() {
        assert_eq!(DEFAULT_SKIP_CONNECTIONS.len(), 14);
        for (backbone, layers) in DEFAULT_SKIP_CONNECTIONS {
            assert!(!layers.is_empty() && layers.len() <= 5, "{backbone}");
        }
    }

    #[test]
    fn unlisted_backbone_has_no_defaults() {
        match default_skip_connections("mobilenet") {
            Err(UnetError::NoDefaultSkipConnections { backbone }) => {
                assert_eq!(backbone, "mobilenet");
            }
            other => panic!("Expected NoDefaultSkipConnections error, got {other:?}"),
        }
    }

    #[test]
    fn explicit_features_are_used_verbatim() {
        let layers = vec![LayerRef::from("block4_pool"), LayerRef::Index(3)];
        let resolved =
            resolve_encoder_features("mobilenet", &EncoderFeatures::Layers(layers.clone()))
                .unwrap();
        assert_eq!(resolved, layers);
    }
}
