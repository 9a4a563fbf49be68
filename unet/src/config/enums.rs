//! Enumeration types for U-Net configuration.
//!
//! This module contains the tagged variants that describe decoder blocks, output
//! activations, encoder weight sources and skip-connection layer references.

use std::{path::PathBuf, str::FromStr};

use burn::prelude::*;

use crate::error::{UnetError, UnetResult};

/// Defines the structure of a decoder block.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum DecoderBlockType {
    /// Nearest-neighbour upsampling, then two 3x3 convolutions.
    Upsampling,
    /// 4x4 transposed convolution, then one 3x3 convolution.
    Transpose,
}

impl DecoderBlockType {
    /// The lowercase name of the block type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upsampling => "upsampling",
            Self::Transpose => "transpose",
        }
    }
}

impl FromStr for DecoderBlockType {
    type Err = UnetError;

    fn from_str(s: &str) -> UnetResult<Self> {
        match s {
            "upsampling" => Ok(Self::Upsampling),
            "transpose" => Ok(Self::Transpose),
            other => Err(UnetError::UnsupportedDecoderBlock {
                block_type: other.to_string(),
            }),
        }
    }
}

/// Defines the activation applied to the model output.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Activation {
    /// Element-wise logistic sigmoid.
    Sigmoid,
    /// Softmax over the class (channel) axis.
    Softmax,
    /// No activation.
    Linear,
    /// Rectified linear unit.
    Relu,
    /// Hyperbolic tangent.
    Tanh,
}

impl Activation {
    /// The lowercase name of the activation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sigmoid => "sigmoid",
            Self::Softmax => "softmax",
            Self::Linear => "linear",
            Self::Relu => "relu",
            Self::Tanh => "tanh",
        }
    }
}

impl FromStr for Activation {
    type Err = UnetError;

    fn from_str(s: &str) -> UnetResult<Self> {
        match s {
            "sigmoid" => Ok(Self::Sigmoid),
            "softmax" => Ok(Self::Softmax),
            "linear" => Ok(Self::Linear),
            "relu" => Ok(Self::Relu),
            "tanh" => Ok(Self::Tanh),
            other => Err(UnetError::UnsupportedActivation {
                activation: other.to_string(),
            }),
        }
    }
}

/// Defines where the encoder weights come from.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum EncoderWeights {
    /// Random initialization.
    None,
    /// ImageNet weights from the local weights cache.
    Imagenet,
    /// Weights from an explicit record file (`.mpk`, `.bin`, or `.pth` with `pretrained`).
    File(PathBuf),
}

impl FromStr for EncoderWeights {
    type Err = UnetError;

    /// `none` and `imagenet` select the named sources, anything else is a file path.
    fn from_str(s: &str) -> UnetResult<Self> {
        Ok(match s {
            "none" => Self::None,
            "imagenet" => Self::Imagenet,
            path => Self::File(PathBuf::from(path)),
        })
    }
}

/// A reference to a layer of the encoder's layer graph.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum LayerRef {
    /// By layer name.
    Name(String),
    /// By position in the layer graph.
    Index(usize),
}

impl LayerRef {
    /// Human readable form used in logs and errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Name(name) => name.clone(),
            Self::Index(index) => format!("#{index}"),
        }
    }
}

impl From<&str> for LayerRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<usize> for LayerRef {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl FromStr for LayerRef {
    type Err = UnetError;

    /// Integers are positions, everything else is a layer name.
    fn from_str(s: &str) -> UnetResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(UnetError::InvalidConfiguration {
                reason: "empty layer reference".to_string(),
            });
        }
        Ok(s.parse::<usize>()
            .map_or_else(|_| Self::Name(s.to_string()), Self::Index))
    }
}

/// Selects the encoder layers feeding the decoder skip connections.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum EncoderFeatures {
    /// Use the default skip connections listed for the backbone.
    Default,
    /// Use these layers, deepest first.
    Layers(Vec<LayerRef>),
}

impl FromStr for EncoderFeatures {
    type Err = UnetError;

    /// `default`, or a comma separated list of layer names / indices.
    fn from_str(s: &str) -> UnetResult<Self> {
        if s == "default" {
            return Ok(Self::Default);
        }
        let layers = s
            .split(',')
            .map(str::parse)
            .collect::<UnetResult<Vec<LayerRef>>>()?;
        Ok(Self::Layers(layers))
    }
}
