//! Core configuration structure for U-Net assembly.
//!
//! [`UnetConfig`] carries every argument the assembler accepts. Its defaults match
//! the classic `Unet(backbone_name='vgg16', ...)` factory, except for the encoder
//! weights (see [`EncoderWeights`]).

use crate::error::{UnetError, UnetResult};
use burn::prelude::*;

use super::enums::*;

/// Upsampling rate of every decoder stage.
pub const UPSAMPLE_RATES: [usize; 5] = [2; 5];

/// Main configuration for the U-Net model.
#[derive(Config, Debug)]
pub struct UnetConfig {
    /// Name of the classification backbone used as feature extractor (e.g. `resnet34`).
    #[config(default = "String::from(\"vgg16\")")]
    pub backbone_name: String,
    /// Number of input image channels.
    #[config(default = "3")]
    pub input_channels: usize,
    /// Optional fixed input size `[height, width]`; both must be divisible by 32.
    #[config(default = "None")]
    pub input_size: Option<[usize; 2]>,
    /// Number of output classes (channels of the output mask).
    #[config(default = "1")]
    pub classes: usize,
    /// Activation applied to the final convolution.
    #[config(default = "Activation::Sigmoid")]
    pub activation: Activation,
    /// Source of the encoder weights.
    #[config(default = "EncoderWeights::None")]
    pub encoder_weights: EncoderWeights,
    /// Mark every encoder parameter as non-trainable.
    #[config(default = "false")]
    pub encoder_freeze: bool,
    /// Encoder layers feeding the decoder, deepest first.
    #[config(default = "EncoderFeatures::Default")]
    pub encoder_features: EncoderFeatures,
    /// Structure of the decoder blocks.
    #[config(default = "DecoderBlockType::Upsampling")]
    pub decoder_block_type: DecoderBlockType,
    /// Convolution filters of each decoder block; its length is the number of blocks.
    #[config(default = "vec![256, 128, 64, 32, 16]")]
    pub decoder_filters: Vec<usize>,
    /// Insert BatchNorm between each decoder convolution and its activation.
    #[config(default = "true")]
    pub decoder_use_batchnorm: bool,
}

impl UnetConfig {
    /// Validate the configuration and return appropriate errors for invalid settings.
    ///
    /// Only checks what can be decided without building the encoder; skip layer
    /// references are checked against the encoder's layer graph by the decoder builder.
    pub fn validate(&self) -> UnetResult<()> {
        if self.input_channels == 0 {
            return Err(UnetError::InvalidConfiguration {
                reason: "input_channels must be positive".to_string(),
            });
        }

        if self.classes == 0 {
            return Err(UnetError::InvalidConfiguration {
                reason: "classes must be positive".to_string(),
            });
        }

        if let Some([height, width]) = self.input_size {
            let stride = 1 << UPSAMPLE_RATES.len();
            if height % stride != 0 || width % stride != 0 {
                return Err(UnetError::InvalidConfiguration {
                    reason: format!(
                        "input_size {height}x{width} must be divisible by {stride}"
                    ),
                });
            }
        }

        if self.decoder_filters.is_empty() {
            return Err(UnetError::InvalidConfiguration {
                reason: "decoder_filters must not be empty".to_string(),
            });
        }

        if self.decoder_filters.len() > UPSAMPLE_RATES.len() {
            return Err(UnetError::InvalidConfiguration {
                reason: format!(
                    "at most {} decoder blocks are supported, got {}",
                    UPSAMPLE_RATES.len(),
                    self.decoder_filters.len()
                ),
            });
        }

        if self.decoder_filters.contains(&0) {
            return Err(UnetError::InvalidConfiguration {
                reason: "decoder_filters must be positive".to_string(),
            });
        }

        if self.encoder_weights != EncoderWeights::None && self.input_channels != 3 {
            return Err(UnetError::InvalidConfiguration {
                reason: format!(
                    "pretrained encoder weights require 3 input channels, got {}",
                    self.input_channels
                ),
            });
        }

        Ok(())
    }

    /// Name given to the assembled model.
    pub fn model_name(&self) -> String {
        format!("u-{}", self.backbone_name)
    }
}
