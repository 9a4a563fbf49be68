//! # Model Architectures
//!
//! - `backbones`: builds the encoder for a backbone identifier.
//! - `blocks`: decoder building blocks (`ConvRelu`, upsampling and transpose blocks).
//! - `builder`: `build_unet`, which attaches a decoder to an encoder.
//! - `unet`: the assembled `Unet` model and the assembler.

pub mod backbones;
pub mod blocks;
pub mod builder;
pub mod unet;

pub use backbones::get_backbone;
pub use blocks::{ConvRelu, ConvReluConfig, DecoderBlock, DecoderBlockConfig};
pub use builder::{build_unet, resolve_layer, DecoderConfig};
pub use unet::{unet, Unet, UnetRecord};
