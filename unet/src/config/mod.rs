//! Configuration module for U-Net assembly.
//!
//! - `core`: the assembler arguments ([`UnetConfig`]) and their validation
//! - `enums`: decoder block types, activations, weight sources and layer references
//! - `legacy`: normalization of deprecated argument names

pub mod core;
pub mod enums;
pub mod legacy;

pub use core::{UnetConfig, UPSAMPLE_RATES};

pub use enums::{Activation, DecoderBlockType, EncoderFeatures, EncoderWeights, LayerRef};
pub use legacy::{normalize_legacy_args, LEGACY_ARGUMENTS};
