//! Shared code of the U-Net demos.

pub mod backend;
pub mod cli;

pub use backend::{backend_name, create_device, SelectedBackend, SelectedDevice};
pub use cli::{AssembleArgs, DEFAULT_INPUT_SIZE};
