//! Backward compatibility for deprecated argument names.
//!
//! Older configurations used different names for some assembler arguments, and passed
//! two arguments that no longer exist. Normalization is a pure step over the keyword
//! map (the JSON object form of [`UnetConfig`]) that runs before assembly:
//! renamed keys are moved to their current name, removed keys are dropped, and both
//! are reported through a deprecation warning.
//!
//! Keyword values may be given in their plain form (`"softmax"`, `"transpose"`,
//! `"default"`, `null` weights, a list of layer names and indices) as well as in the
//! serialized form of the configuration enums.

use log::warn;
use serde_json::{Map, Value};

use super::{
    core::UnetConfig,
    enums::{Activation, DecoderBlockType, EncoderFeatures, EncoderWeights, LayerRef},
};
use crate::error::{UnetError, UnetResult};

/// Deprecated argument names and their replacements; `None` marks removed arguments.
pub const LEGACY_ARGUMENTS: [(&str, Option<&str>); 4] = [
    ("freeze_encoder", Some("encoder_freeze")),
    ("skip_connections", Some("encoder_features")),
    ("upsample_rates", None),
    ("input_tensor", None),
];

fn replacement(key: &str) -> Option<Option<&'static str>> {
    LEGACY_ARGUMENTS
        .iter()
        .find(|(old, _)| *old == key)
        .map(|(_, new)| *new)
}

/// Rewrites deprecated keys of an argument map to their current names.
///
/// # Errors
///
/// Returns [`UnetError::ConflictingArguments`] when a deprecated key and its
/// replacement are both present.
pub fn normalize_legacy_args(args: Map<String, Value>) -> UnetResult<Map<String, Value>> {
    let (legacy, mut normalized): (Map<String, Value>, Map<String, Value>) = args
        .into_iter()
        .partition(|(key, _)| replacement(key).is_some());

    for (old, value) in legacy {
        match replacement(&old).flatten() {
            Some(new) => {
                if normalized.contains_key(new) {
                    return Err(UnetError::ConflictingArguments {
                        deprecated: old,
                        current: new.to_string(),
                    });
                }
                warn!("`{old}` is deprecated and will be removed in future releases, use `{new}`");
                normalized.insert(new.to_string(), value);
            }
            None => {
                warn!("`{old}` is deprecated and has been removed; the value is ignored");
            }
        }
    }

    Ok(normalized)
}

fn invalid_value(key: &str, value: &Value) -> UnetError {
    UnetError::InvalidConfiguration {
        reason: format!("invalid value for `{key}`: {value}"),
    }
}

fn layer_ref_value(value: Value) -> UnetResult<Value> {
    let layer = match value {
        Value::String(name) => LayerRef::Name(name),
        Value::Number(index) => index
            .as_u64()
            .and_then(|index| usize::try_from(index).ok())
            .map(LayerRef::from)
            .ok_or_else(|| invalid_value("encoder_features", &Value::Number(index)))?,
        other => return Ok(other),
    };
    Ok(serde_json::to_value(layer)?)
}

/// Converts the plain form of a keyword value into the serialized form of its enum.
///
/// Values already in serialized form are returned unchanged.
fn keyword_value(key: &str, value: Value) -> UnetResult<Value> {
    let converted = match (key, value) {
        ("activation", Value::String(name)) => {
            serde_json::to_value(name.to_ascii_lowercase().parse::<Activation>()?)?
        }
        ("decoder_block_type", Value::String(name)) => {
            serde_json::to_value(name.to_ascii_lowercase().parse::<DecoderBlockType>()?)?
        }
        ("encoder_weights", Value::Null) => serde_json::to_value(EncoderWeights::None)?,
        ("encoder_weights", Value::String(source)) => {
            let weights = match source.to_ascii_lowercase().as_str() {
                "none" => EncoderWeights::None,
                "imagenet" => EncoderWeights::Imagenet,
                _ => source.parse::<EncoderWeights>()?,
            };
            serde_json::to_value(weights)?
        }
        ("encoder_features", Value::String(features)) => {
            if features.eq_ignore_ascii_case("default") {
                serde_json::to_value(EncoderFeatures::Default)?
            } else {
                serde_json::to_value(features.parse::<EncoderFeatures>()?)?
            }
        }
        ("encoder_features", Value::Array(layers)) => {
            let layers = layers
                .into_iter()
                .map(layer_ref_value)
                .collect::<UnetResult<Vec<_>>>()?;
            serde_json::json!({ "Layers": layers })
        }
        (_, value) => value,
    };
    Ok(converted)
}

impl UnetConfig {
    /// Builds a configuration from a JSON argument object that may use deprecated names.
    ///
    /// Missing keys take their default value; unknown keys are rejected. Enum-valued
    /// arguments accept their plain names, e.g. `"activation": "softmax"` or
    /// `"skip_connections": ["relu0", 4]`.
    pub fn from_legacy_json(args: Value) -> UnetResult<Self> {
        let Value::Object(args) = args else {
            return Err(UnetError::InvalidConfiguration {
                reason: "arguments must be a JSON object".to_string(),
            });
        };
        let args = normalize_legacy_args(args)?;

        let mut merged = match serde_json::to_value(Self::new())? {
            Value::Object(defaults) => defaults,
            other => {
                return Err(UnetError::InvalidConfiguration {
                    reason: format!("default configuration serialized as {other}"),
                })
            }
        };

        for (key, value) in args {
            if !merged.contains_key(&key) {
                return Err(UnetError::InvalidConfiguration {
                    reason: format!("unknown argument `{key}`"),
                });
            }
            let value = keyword_value(&key, value)?;
            merged.insert(key, value);
        }

        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    /// Same as [`UnetConfig::from_legacy_json`] for a JSON document.
    pub fn from_legacy_str(json: &str) -> UnetResult<Self> {
        Self::from_legacy_json(serde_json::from_str(json)?)
    }
}
