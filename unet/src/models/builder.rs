//! # Decoder Builder
//!
//! [`build_unet`] attaches a decoder to an encoder. Skip references are resolved
//! against the encoder's layer graph, and every decoder stage is checked to work at
//! the same resolution as the skip feature it consumes.

use backbones::{BackboneEncoder, Encoder, LayerGraph};
use burn::{
    module::Ignored,
    nn::{conv::Conv2dConfig, PaddingConfig2d},
    prelude::*,
};
use log::debug;

use super::{blocks::DecoderBlockConfig, Unet};
use crate::{
    config::{Activation, DecoderBlockType, LayerRef, UPSAMPLE_RATES},
    error::{UnetError, UnetResult},
};

/// Configuration of the decoder attached by [`build_unet`].
#[derive(Config, Debug)]
pub struct DecoderConfig {
    /// Number of output classes.
    pub classes: usize,
    /// Encoder layers feeding the decoder stages, deepest first.
    pub skip_layers: Vec<LayerRef>,
    /// Convolution filters of each decoder stage.
    #[config(default = "vec![256, 128, 64, 32, 16]")]
    pub decoder_filters: Vec<usize>,
    #[config(default = "DecoderBlockType::Upsampling")]
    pub block_type: DecoderBlockType,
    #[config(default = "Activation::Sigmoid")]
    pub activation: Activation,
    /// Number of decoder stages; taken from the first entries of the filters and rates.
    #[config(default = "5")]
    pub n_upsample_blocks: usize,
    #[config(default = "UPSAMPLE_RATES.to_vec()")]
    pub upsample_rates: Vec<usize>,
    #[config(default = "true")]
    pub use_batchnorm: bool,
}

impl DecoderConfig {
    fn validate(&self) -> UnetResult<()> {
        let invalid = |reason: String| Err(UnetError::InvalidConfiguration { reason });

        if self.classes == 0 {
            return invalid("classes must be positive".to_string());
        }
        if self.n_upsample_blocks == 0 {
            return invalid("at least one decoder block is required".to_string());
        }
        if self.n_upsample_blocks > self.decoder_filters.len() {
            return invalid(format!(
                "{} decoder blocks requested but only {} filters given",
                self.n_upsample_blocks,
                self.decoder_filters.len()
            ));
        }
        if self.n_upsample_blocks > self.upsample_rates.len() {
            return invalid(format!(
                "{} decoder blocks requested but only {} upsample rates given",
                self.n_upsample_blocks,
                self.upsample_rates.len()
            ));
        }
        if self.skip_layers.len() > self.n_upsample_blocks {
            return invalid(format!(
                "{} skip connections given for {} decoder blocks",
                self.skip_layers.len(),
                self.n_upsample_blocks
            ));
        }
        if self.decoder_filters[..self.n_upsample_blocks].contains(&0) {
            return invalid("decoder_filters must be positive".to_string());
        }
        for &rate in &self.upsample_rates[..self.n_upsample_blocks] {
            if rate == 0 {
                return invalid("upsample rates must be positive".to_string());
            }
            if self.block_type == DecoderBlockType::Transpose && rate % 2 != 0 {
                return invalid(format!(
                    "transpose decoder blocks need even upsample rates, got {rate}"
                ));
            }
        }
        Ok(())
    }
}

/// Resolves a layer reference to its position in `graph`.
pub fn resolve_layer(graph: &LayerGraph, layer: &LayerRef) -> UnetResult<usize> {
    match layer {
        LayerRef::Name(name) => graph
            .position(name)
            .ok_or_else(|| UnetError::LayerNotFound {
                layer: name.clone(),
            }),
        LayerRef::Index(index) if *index < graph.len() => Ok(*index),
        LayerRef::Index(index) => Err(UnetError::LayerIndexOutOfRange {
            index: *index,
            len: graph.len(),
        }),
    }
}

/// Builds a U-Net from an encoder and a decoder configuration.
///
/// The decoder starts from the encoder output. Stage `i` upsamples by
/// `upsample_rates[i]`, concatenates the activation of `skip_layers[i]` when there is
/// one, and produces `decoder_filters[i]` channels. A final 3x3 convolution maps the
/// last stage to `classes` channels, followed by `activation`.
///
/// # Errors
///
/// - [`UnetError::LayerNotFound`] / [`UnetError::LayerIndexOutOfRange`] for skip
///   references missing from the encoder
/// - [`UnetError::SkipResolutionMismatch`] when a skip layer does not match the
///   resolution of its stage
/// - [`UnetError::InvalidConfiguration`] for inconsistent decoder settings
pub fn build_unet<B: Backend>(
    encoder: BackboneEncoder<B>,
    config: &DecoderConfig,
    device: &Device<B>,
) -> UnetResult<Unet<B>> {
    config.validate()?;

    let graph = encoder.layer_graph();
    let skip_indices = config
        .skip_layers
        .iter()
        .map(|layer| resolve_layer(graph, layer))
        .collect::<UnetResult<Vec<_>>>()?;

    let mut channels = encoder.output_channels();
    let mut reduction = encoder.reduction();
    let mut blocks = Vec::with_capacity(config.n_upsample_blocks);

    for stage in 0..config.n_upsample_blocks {
        let rate = config.upsample_rates[stage];
        if reduction % rate != 0 {
            return Err(UnetError::InvalidConfiguration {
                reason: format!(
                    "decoder stage {stage} cannot upsample /{reduction} by {rate}"
                ),
            });
        }
        reduction /= rate;

        let skip_channels = match skip_indices.get(stage) {
            Some(&index) => {
                let info = graph.get(index).ok_or(UnetError::LayerIndexOutOfRange {
                    index,
                    len: graph.len(),
                })?;
                if info.reduction != reduction {
                    return Err(UnetError::SkipResolutionMismatch {
                        layer: info.name.clone(),
                        stage,
                        expected: reduction,
                        actual: info.reduction,
                    });
                }
                debug!(
                    "Decoder stage {stage}: skip {} ({} channels, /{reduction})",
                    info.name, info.channels
                );
                info.channels
            }
            None => 0,
        };

        let filters = config.decoder_filters[stage];
        blocks.push(
            DecoderBlockConfig::new(channels, filters)
                .with_skip_channels(skip_channels)
                .with_rate(rate)
                .with_use_batchnorm(config.use_batchnorm)
                .with_block_type(config.block_type.clone())
                .init(device),
        );
        channels = filters;
    }

    let final_conv = Conv2dConfig::new([channels, config.classes], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device);

    Ok(Unet {
        encoder,
        blocks,
        final_conv,
        activation: Ignored(config.activation.clone()),
        skip_indices: Ignored(skip_indices),
        output_reduction: Ignored(reduction),
        name: Ignored(String::new()),
    })
}
