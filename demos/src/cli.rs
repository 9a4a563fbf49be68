//! Command-line arguments of the `assemble` demo.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use unet_burn::{Activation, DecoderBlockType, EncoderFeatures, EncoderWeights, UnetConfig};

/// Input size used when neither the flags nor the config file set one.
pub const DEFAULT_INPUT_SIZE: [usize; 2] = [256, 256];

#[derive(Parser, Debug)]
#[command(author, version, about = "Assemble a U-Net and run it on a random batch", long_about = None)]
pub struct AssembleArgs {
    /// JSON file with assembler arguments; deprecated argument names are accepted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Backbone identifier, e.g. vgg16 or resnet34
    #[arg(short, long)]
    pub backbone: Option<String>,

    /// Number of output classes
    #[arg(long)]
    pub classes: Option<usize>,

    /// Number of input channels
    #[arg(long)]
    pub input_channels: Option<usize>,

    /// Output activation: sigmoid, softmax, linear, relu or tanh
    #[arg(long)]
    pub activation: Option<Activation>,

    /// Encoder weights: none, imagenet, or a record file
    #[arg(long)]
    pub encoder_weights: Option<EncoderWeights>,

    /// Freeze the encoder
    #[arg(long)]
    pub encoder_freeze: bool,

    /// Skip layers, `default` or a comma separated list of names / indices
    #[arg(long)]
    pub encoder_features: Option<EncoderFeatures>,

    /// Decoder block type: upsampling or transpose
    #[arg(long)]
    pub decoder_block_type: Option<DecoderBlockType>,

    /// Decoder filters, comma separated
    #[arg(long, value_delimiter = ',')]
    pub decoder_filters: Option<Vec<usize>>,

    /// Disable BatchNorm in the decoder
    #[arg(long)]
    pub no_batchnorm: bool,

    /// Height of the random input [default: config input size or 256]
    #[arg(long)]
    pub height: Option<usize>,

    /// Width of the random input [default: config input size or 256]
    #[arg(long)]
    pub width: Option<usize>,

    /// Batch size of the random input
    #[arg(long, default_value = "1")]
    pub batch_size: usize,

    /// Print the encoder layer graph
    #[arg(long)]
    pub show_graph: bool,

    /// Save the assembled model (`.mpk`) and its configuration (`.json`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl AssembleArgs {
    /// Builds the assembler configuration: the config file first, then flags on top.
    pub fn to_config(&self) -> Result<UnetConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                UnetConfig::from_legacy_str(&json)
                    .with_context(|| format!("invalid configuration in {}", path.display()))?
            }
            None => UnetConfig::new(),
        };

        if let Some(backbone) = &self.backbone {
            config.backbone_name = backbone.clone();
        }
        if let Some(classes) = self.classes {
            config.classes = classes;
        }
        if let Some(channels) = self.input_channels {
            config.input_channels = channels;
        }
        if let Some(activation) = &self.activation {
            config.activation = activation.clone();
        }
        if let Some(weights) = &self.encoder_weights {
            config.encoder_weights = weights.clone();
        }
        if let Some(features) = &self.encoder_features {
            config.encoder_features = features.clone();
        }
        if let Some(block_type) = &self.decoder_block_type {
            config.decoder_block_type = block_type.clone();
        }
        if let Some(filters) = &self.decoder_filters {
            config.decoder_filters = filters.clone();
        }
        config.encoder_freeze |= self.encoder_freeze;
        config.decoder_use_batchnorm &= !self.no_batchnorm;
        let [height, width] = config.input_size.unwrap_or(DEFAULT_INPUT_SIZE);
        config.input_size = Some([
            self.height.unwrap_or(height),
            self.width.unwrap_or(width),
        ]);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use unet_burn::LayerRef;

    #[test]
    fn flags_override_defaults() {
        let args = AssembleArgs::try_parse_from([
            "assemble",
            "--backbone",
            "resnet34",
            "--classes",
            "3",
            "--activation",
            "softmax",
            "--encoder-features",
            "stage4_unit1_relu1,relu0",
            "--decoder-filters",
            "128,64",
            "--no-batchnorm",
        ])
        .unwrap();
        let config = args.to_config().unwrap();

        assert_eq!(config.backbone_name, "resnet34");
        assert_eq!(config.classes, 3);
        assert_eq!(config.activation, Activation::Softmax);
        assert_eq!(
            config.encoder_features,
            EncoderFeatures::Layers(vec![
                LayerRef::from("stage4_unit1_relu1"),
                LayerRef::from("relu0")
            ])
        );
        assert_eq!(config.decoder_filters, vec![128, 64]);
        assert!(!config.decoder_use_batchnorm);
        assert_eq!(config.input_size, Some([256, 256]));
    }

    #[test]
    fn unknown_block_type_is_rejected() {
        let result =
            AssembleArgs::try_parse_from(["assemble", "--decoder-block-type", "pixelshuffle"]);
        assert!(result.is_err());
    }

    #[test]
    fn legacy_config_file_is_normalized() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "backbone_name": "vgg19", "freeze_encoder": true, "input_tensor": null }}"#
        )
        .unwrap();

        let args = AssembleArgs::try_parse_from([
            "assemble",
            "--config",
            file.path().to_str().unwrap(),
            "--classes",
            "2",
        ])
        .unwrap();
        let config = args.to_config().unwrap();

        assert_eq!(config.backbone_name, "vgg19");
        assert!(config.encoder_freeze);
        assert_eq!(config.classes, 2);
    }
}
