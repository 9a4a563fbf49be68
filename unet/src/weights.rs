//! Encoder weight loading.
//!
//! Burn records (`.mpk`, `.bin`) are always supported. PyTorch checkpoints and the
//! ImageNet weights cache need the `pretrained` feature.

use std::path::{Path, PathBuf};

use burn::{
    prelude::*,
    record::{BinFileRecorder, FullPrecisionSettings, NamedMpkFileRecorder},
};
#[cfg(feature = "pretrained")]
use burn::record::Recorder;
#[cfg(feature = "pretrained")]
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use log::info;

use crate::{
    config::EncoderWeights,
    error::{UnetError, UnetResult},
};

/// Record formats understood by [`load_weights`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightFormat {
    /// Burn named MessagePack record.
    NamedMpk,
    /// Burn binary record.
    Bin,
    /// PyTorch checkpoint.
    PyTorch,
}

impl WeightFormat {
    /// Detects the format from the file extension.
    pub fn from_path(path: &Path) -> UnetResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("mpk") => Ok(Self::NamedMpk),
            Some("bin") => Ok(Self::Bin),
            Some("pth" | "pt") => Ok(Self::PyTorch),
            _ => Err(UnetError::WeightLoadingFailed {
                reason: format!("unsupported weight file format: {}", path.display()),
            }),
        }
    }
}

/// Applies `weights` to a freshly built encoder.
pub fn apply_encoder_weights<B: Backend, M: Module<B>>(
    module: M,
    backbone: &str,
    weights: &EncoderWeights,
    device: &Device<B>,
) -> UnetResult<M> {
    match weights {
        EncoderWeights::None => Ok(module),
        EncoderWeights::File(path) => load_weights(module, path, device),
        EncoderWeights::Imagenet => {
            let path = imagenet_weights_path(backbone)?;
            load_weights(module, &path, device)
        }
    }
}

/// Loads a record file into `module`.
///
/// # Errors
///
/// Returns [`UnetError::WeightLoadingFailed`] when the file is missing, has an unknown
/// extension, or does not match the module structure.
pub fn load_weights<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    device: &Device<B>,
) -> UnetResult<M> {
    if !path.exists() {
        return Err(UnetError::WeightLoadingFailed {
            reason: format!("weight file not found: {}", path.display()),
        });
    }

    info!("Loading encoder weights from {}", path.display());

    match WeightFormat::from_path(path)? {
        WeightFormat::NamedMpk => {
            let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
            module
                .load_file(path.to_path_buf(), &recorder, device)
                .map_err(|e| UnetError::WeightLoadingFailed {
                    reason: format!("MessagePack record loading failed: {e}"),
                })
        }
        WeightFormat::Bin => {
            let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
            module
                .load_file(path.to_path_buf(), &recorder, device)
                .map_err(|e| UnetError::WeightLoadingFailed {
                    reason: format!("Binary record loading failed: {e}"),
                })
        }
        WeightFormat::PyTorch => load_pytorch(module, path, device),
    }
}

#[cfg(feature = "pretrained")]
fn load_pytorch<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    device: &Device<B>,
) -> UnetResult<M> {
    let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();
    let record = recorder
        .load(LoadArgs::new(path.to_path_buf()), device)
        .map_err(|e| UnetError::WeightLoadingFailed {
            reason: format!("PyTorch record loading failed: {e}"),
        })?;
    Ok(module.load_record(record))
}

#[cfg(not(feature = "pretrained"))]
fn load_pytorch<B: Backend, M: Module<B>>(
    _module: M,
    path: &Path,
    _device: &Device<B>,
) -> UnetResult<M> {
    Err(UnetError::WeightLoadingFailed {
        reason: format!(
            "loading {} requires the `pretrained` feature",
            path.display()
        ),
    })
}

/// Directory holding the ImageNet encoder weights.
#[cfg(feature = "pretrained")]
pub fn weights_cache_dir() -> UnetResult<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join("unet-burn").join("weights"))
        .ok_or_else(|| UnetError::WeightLoadingFailed {
            reason: "no cache directory available on this platform".to_string(),
        })
}

/// Locates `<backbone>_imagenet.mpk` (or `.pth`) in the weights cache.
#[cfg(feature = "pretrained")]
pub fn imagenet_weights_path(backbone: &str) -> UnetResult<PathBuf> {
    let dir = weights_cache_dir()?;
    ["mpk", "pth"]
        .iter()
        .map(|ext| dir.join(format!("{backbone}_imagenet.{ext}")))
        .find(|path| path.exists())
        .ok_or_else(|| UnetError::WeightLoadingFailed {
            reason: format!(
                "no imagenet weights for {backbone} in {}",
                dir.display()
            ),
        })
}

#[cfg(not(feature = "pretrained"))]
pub fn imagenet_weights_path(backbone: &str) -> UnetResult<PathBuf> {
    Err(UnetError::WeightLoadingFailed {
        reason: format!("imagenet weights for {backbone} require the `pretrained` feature"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use backbones::{VggConfig, VggBackbone};
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    #[test]
    fn detects_formats_from_extension() {
        assert_eq!(
            WeightFormat::from_path(Path::new("a/vgg16.mpk")).unwrap(),
            WeightFormat::NamedMpk
        );
        assert_eq!(
            WeightFormat::from_path(Path::new("vgg16.bin")).unwrap(),
            WeightFormat::Bin
        );
        assert_eq!(
            WeightFormat::from_path(Path::new("vgg16.pth")).unwrap(),
            WeightFormat::PyTorch
        );
        assert!(WeightFormat::from_path(Path::new("vgg16.h5")).is_err());
    }

    #[test]
    fn missing_file_fails() {
        let device = Default::default();
        let encoder = VggBackbone::<TestBackend>::vgg16(&device);
        let result = apply_encoder_weights(
            encoder,
            "vgg16",
            &EncoderWeights::File(PathBuf::from("/nonexistent/vgg16.mpk")),
            &device,
        );
        assert!(matches!(result, Err(UnetError::WeightLoadingFailed { .. })));
    }

    #[test]
    fn saved_record_is_loaded_back() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encoder.mpk");

        let config = VggConfig::vgg16().with_in_channels(1);
        let saved = config.init::<TestBackend>(&device);
        saved
            .clone()
            .save_file(
                path.clone(),
                &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            )
            .unwrap();

        let loaded = apply_encoder_weights(
            config.init::<TestBackend>(&device),
            "vgg16",
            &EncoderWeights::File(path),
            &device,
        )
        .unwrap();

        let input = Tensor::<TestBackend, 4>::random(
            [1, 1, 32, 32],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let expected = saved.forward(input.clone());
        let actual = loaded.forward(input);
        expected.into_data().assert_approx_eq::<f32>(&actual.into_data(), Default::default());
    }

    #[test]
    fn none_keeps_module() {
        let device = Default::default();
        let encoder = VggBackbone::<TestBackend>::vgg16(&device);
        let params = encoder.num_params();
        let kept = apply_encoder_weights(encoder, "vgg16", &EncoderWeights::None, &device).unwrap();
        assert_eq!(kept.num_params(), params);
    }
}
