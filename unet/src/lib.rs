//! # U-Net segmentation models on Burn
//!
//! Assembles a U-Net from a classification backbone: the encoder is built from a
//! backbone identifier, a set of its intermediate layers is wired as skip connections
//! into an upsampling decoder, and a 3x3 convolution with an output activation
//! produces the mask.
//!
//! ```no_run
//! use burn::backend::NdArray;
//! use unet_burn::UnetConfig;
//!
//! let model = UnetConfig::new()
//!     .with_backbone_name("resnet34".to_string())
//!     .with_classes(3)
//!     .init::<NdArray>(&Default::default())
//!     .unwrap();
//! assert_eq!(model.name(), "u-resnet34");
//! ```

mod config;
mod error;
mod freeze;
mod models;
mod skip_connections;
mod weights;

#[cfg(test)]
mod tests;

pub use config::*;
pub use error::{UnetError, UnetResult};
pub use freeze::freeze_model;
pub use models::{
    build_unet, get_backbone, resolve_layer, unet, ConvRelu, ConvReluConfig, DecoderBlock,
    DecoderBlockConfig, DecoderConfig, Unet, UnetRecord,
};
pub use skip_connections::{
    default_skip_connections, resolve_encoder_features, SkipLayer, DEFAULT_SKIP_CONNECTIONS,
};
pub use weights::{apply_encoder_weights, imagenet_weights_path, load_weights, WeightFormat};
#[cfg(feature = "pretrained")]
pub use weights::weights_cache_dir;

pub use backbones::{BackboneEncoder, BackboneKind, Encoder, LayerGraph, LayerInfo};
