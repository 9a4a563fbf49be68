//! Backend used by the demos, picked at compile time: `cuda`, then `wgpu`, then NdArray.

use burn::prelude::Backend;
use cfg_if::cfg_if;
use log::info;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        pub type SelectedBackend = burn::backend::Cuda;
        const BACKEND_NAME: &str = "CUDA (NVIDIA GPU)";
    } else if #[cfg(feature = "wgpu")] {
        pub type SelectedBackend = burn::backend::Wgpu;
        const BACKEND_NAME: &str = "WGPU (GPU)";
    } else {
        pub type SelectedBackend = burn::backend::NdArray;
        const BACKEND_NAME: &str = "NdArray (CPU)";
    }
}

/// Device type of [`SelectedBackend`].
pub type SelectedDevice = <SelectedBackend as Backend>::Device;

/// Human readable name of the selected backend.
pub const fn backend_name() -> &'static str {
    BACKEND_NAME
}

/// Default device of the selected backend.
pub fn create_device() -> SelectedDevice {
    let device = SelectedDevice::default();
    info!("Using backend: {BACKEND_NAME} ({device:?})");
    device
}
