use backbones::BackboneError;
use thiserror::Error;

/// The error type for `unet-burn` operations.
///
/// Every failure of model assembly surfaces through this enum and is fatal to the
/// call: nothing is retried and no partially built model is returned.
#[derive(Error, Debug)]
pub enum UnetError {
    /// The backbone name does not denote any known architecture.
    #[error("Unknown backbone: {backbone}")]
    UnknownBackbone {
        /// The requested backbone name.
        backbone: String,
    },

    /// The backbone is known but no encoder is implemented for it.
    #[error("Unsupported backbone: {backbone}")]
    UnsupportedBackbone {
        /// The requested backbone name.
        backbone: String,
    },

    /// Default skip connections were requested for a backbone the table does not list.
    #[error("No default skip connections for backbone: {backbone}")]
    NoDefaultSkipConnections {
        /// The requested backbone name.
        backbone: String,
    },

    /// A skip connection names a layer the encoder does not have.
    #[error("Layer not found in encoder: {layer}")]
    LayerNotFound {
        /// The requested layer name.
        layer: String,
    },

    /// A skip connection index is past the end of the encoder's layer graph.
    #[error("Layer index {index} out of range for encoder with {len} layers")]
    LayerIndexOutOfRange {
        /// The requested layer index.
        index: usize,
        /// Number of layers in the encoder.
        len: usize,
    },

    /// A skip connection does not match the resolution of its decoder stage.
    #[error(
        "Skip layer {layer} has reduction /{actual} but decoder stage {stage} expects /{expected}"
    )]
    SkipResolutionMismatch {
        /// Name of the skip layer.
        layer: String,
        /// Zero-based decoder stage.
        stage: usize,
        /// Reduction the decoder stage works at.
        expected: usize,
        /// Reduction of the skip layer.
        actual: usize,
    },

    /// An unknown decoder block type was requested.
    #[error("Unsupported decoder block type: {block_type}")]
    UnsupportedDecoderBlock {
        /// The requested block type.
        block_type: String,
    },

    /// An unknown output activation was requested.
    #[error("Unsupported activation: {activation}")]
    UnsupportedActivation {
        /// The requested activation.
        activation: String,
    },

    /// Error for when an invalid model configuration is provided.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// A deprecated argument and its replacement were both supplied.
    #[error("Conflicting arguments: `{deprecated}` and `{current}` were both supplied")]
    ConflictingArguments {
        /// The deprecated argument name.
        deprecated: String,
        /// The current argument name.
        current: String,
    },

    /// Error for when an input tensor has an invalid shape.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },

    /// Error for when a tensor operation fails.
    #[error("Tensor operation failed: {operation}")]
    TensorOperationFailed {
        /// A description of the failed tensor operation.
        operation: String,
    },

    /// Error for when loading encoder weights fails.
    #[error("Failed to load weights: {reason}")]
    WeightLoadingFailed {
        /// The reason for the weight loading failure.
        reason: String,
    },

    /// A configuration could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<BackboneError> for UnetError {
    fn from(error: BackboneError) -> Self {
        match error {
            BackboneError::UnknownBackbone { name } => Self::UnknownBackbone { backbone: name },
            BackboneError::Unsupported { name } => Self::UnsupportedBackbone { backbone: name },
        }
    }
}

/// A specialized `Result` type for `unet-burn` operations.
pub type UnetResult<T> = Result<T, UnetError>;
