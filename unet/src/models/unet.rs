//! # U-Net Model
//!
//! The assembled segmentation model and the assembler that builds it from a
//! [`UnetConfig`].
//!
//! Assembly runs in a fixed order:
//! 1. validate the configuration
//! 2. build the encoder and apply its weights
//! 3. resolve the skip connections (the default table or an explicit list)
//! 4. attach the decoder
//! 5. freeze the encoder when requested
//! 6. name the model `u-<backbone>`

use backbones::{BackboneEncoder, Encoder, FeatureTaps};
use burn::{
    module::Ignored,
    nn::conv::Conv2d,
    prelude::*,
    tensor::activation::{relu, sigmoid, softmax, tanh},
};
use log::{debug, info};

use super::{
    backbones::get_backbone,
    blocks::DecoderBlock,
    builder::{build_unet, DecoderConfig},
};
use crate::{
    config::{Activation, UnetConfig, UPSAMPLE_RATES},
    error::{UnetError, UnetResult},
    freeze::freeze_model,
    skip_connections::resolve_encoder_features,
};

/// A U-Net segmentation model: encoder, decoder blocks and a classification head.
#[derive(Module, Debug)]
pub struct Unet<B: Backend> {
    /// The encoder.
    pub(crate) encoder: BackboneEncoder<B>,
    /// Decoder blocks, deepest first.
    pub(crate) blocks: Vec<DecoderBlock<B>>,
    /// 3x3 convolution producing one channel per class.
    pub(crate) final_conv: Conv2d<B>,
    pub(crate) activation: Ignored<Activation>,
    /// Layer graph positions of the skip features, one per leading decoder block.
    pub(crate) skip_indices: Ignored<Vec<usize>>,
    /// Downsampling factor of the output relative to the input.
    pub(crate) output_reduction: Ignored<usize>,
    pub(crate) name: Ignored<String>,
}

impl<B: Backend> Unet<B> {
    /// Segments a batch of images.
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape `[batch_size, channels, height, width]`; height and
    ///   width must be divisible by the encoder stride (32).
    ///
    /// # Returns
    ///
    /// The activated mask of shape `[batch_size, classes, height, width]` (smaller by
    /// the remaining stride when the decoder has fewer than five blocks).
    pub fn forward(&self, input: Tensor<B, 4>) -> UnetResult<Tensor<B, 4>> {
        self.check_input(&input)?;

        let mut taps = FeatureTaps::new(&self.skip_indices.0);
        let x = self.encoder.forward_taps(input, &mut taps);
        let skips = taps
            .finish()
            .map_err(|e| UnetError::TensorOperationFailed {
                operation: format!("collecting skip features: {e}"),
            })?;

        let mut skips = skips.into_iter();
        let x = self
            .blocks
            .iter()
            .fold(x, |x, block| block.forward(x, skips.next()));

        let x = self.final_conv.forward(x);
        Ok(self.activate(x))
    }

    fn check_input(&self, input: &Tensor<B, 4>) -> UnetResult<()> {
        let [batch, channels, height, width] = input.dims();
        let stride = self.encoder.reduction();
        let expected_channels = self
            .encoder
            .layer_graph()
            .get(0)
            .map_or(channels, |layer| layer.channels);

        if channels != expected_channels || height % stride != 0 || width % stride != 0 {
            return Err(UnetError::InvalidTensorShape {
                expected: format!(
                    "[batch, {expected_channels}, H, W] with H and W divisible by {stride}"
                ),
                actual: format!("[{batch}, {channels}, {height}, {width}]"),
            });
        }
        Ok(())
    }

    fn activate(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self.activation.0 {
            Activation::Sigmoid => sigmoid(x),
            Activation::Softmax => softmax(x, 1),
            Activation::Linear => x,
            Activation::Relu => relu(x),
            Activation::Tanh => tanh(x),
        }
    }

    /// The model name, `u-<backbone>` for assembled models.
    pub fn name(&self) -> &str {
        &self.name.0
    }

    /// Renames the model.
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Ignored(name.into());
        self
    }

    /// The encoder.
    pub fn encoder(&self) -> &BackboneEncoder<B> {
        &self.encoder
    }

    /// Number of decoder blocks.
    pub fn num_decoder_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Layer graph positions feeding the decoder blocks.
    pub fn skip_indices(&self) -> &[usize] {
        &self.skip_indices.0
    }

    /// Output activation.
    pub fn activation(&self) -> &Activation {
        &self.activation.0
    }

    /// Downsampling factor of the output relative to the input.
    pub fn output_reduction(&self) -> usize {
        self.output_reduction.0
    }

    /// Marks every encoder parameter as non-trainable; the decoder is left untouched.
    pub fn freeze_encoder(self) -> Self {
        Self {
            encoder: freeze_model::<B, _>(self.encoder),
            ..self
        }
    }
}

impl UnetConfig {
    /// Assembles the U-Net described by this configuration.
    ///
    /// # Errors
    ///
    /// Every failure of a sub-step (unknown backbone, table miss, unresolvable or
    /// misplaced skip layer, invalid decoder settings, weight loading) is returned
    /// unchanged.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UnetResult<Unet<B>> {
        self.validate()?;

        let encoder = get_backbone(
            &self.backbone_name,
            self.input_channels,
            &self.encoder_weights,
            device,
        )?;

        let skip_layers = resolve_encoder_features(&self.backbone_name, &self.encoder_features)?;
        debug!(
            "Skip connections for {}: {:?}",
            self.backbone_name,
            skip_layers.iter().map(|layer| layer.describe()).collect::<Vec<_>>()
        );

        let decoder = DecoderConfig::new(self.classes, skip_layers)
            .with_decoder_filters(self.decoder_filters.clone())
            .with_block_type(self.decoder_block_type.clone())
            .with_activation(self.activation.clone())
            .with_n_upsample_blocks(self.decoder_filters.len())
            .with_upsample_rates(UPSAMPLE_RATES.to_vec())
            .with_use_batchnorm(self.decoder_use_batchnorm);

        let mut model = build_unet(encoder, &decoder, device)?;

        if self.encoder_freeze {
            debug!("Freezing encoder parameters");
            model = model.freeze_encoder();
        }

        let model = model.set_name(self.model_name());
        info!(
            "Assembled {} ({} decoder blocks, {} parameters)",
            model.name(),
            model.num_decoder_blocks(),
            model.num_params()
        );
        Ok(model)
    }
}

/// Assembles a U-Net; shorthand for [`UnetConfig::init`].
pub fn unet<B: Backend>(config: &UnetConfig, device: &Device<B>) -> UnetResult<Unet<B>> {
    config.init(device)
}
