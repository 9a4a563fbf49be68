//! # Backbone Provider
//!
//! Builds the encoder named by a backbone identifier and applies its weights.

use backbones::{create_backbone, BackboneEncoder, BackboneKind};
use burn::prelude::*;
use log::debug;

use crate::{config::EncoderWeights, error::UnetResult, weights::apply_encoder_weights};

/// Constructs the encoder for `name`.
///
/// # Errors
///
/// - [`crate::UnetError::UnknownBackbone`] if the name does not denote a known architecture
/// - [`crate::UnetError::UnsupportedBackbone`] for listed architectures without an encoder
/// - [`crate::UnetError::WeightLoadingFailed`] if the weights cannot be applied
pub fn get_backbone<B: Backend>(
    name: &str,
    input_channels: usize,
    weights: &EncoderWeights,
    device: &Device<B>,
) -> UnetResult<BackboneEncoder<B>> {
    let kind: BackboneKind = name.parse()?;
    let encoder = create_backbone(kind, input_channels, device)?;
    debug!("Built {kind} encoder with {input_channels} input channels");

    apply_encoder_weights(encoder, name, weights, device)
}
