//! Layer graphs and feature taps for encoder networks
//!
//! Burn modules are plain structs, so an encoder cannot be queried for an arbitrary
//! intermediate layer the way a graph-based framework allows. This crate provides the
//! two pieces every encoder in the workspace shares to expose one anyway:
//!
//! - [`LayerGraph`]: the ordered list of tappable nodes of an encoder, addressable by
//!   name or by position.
//! - [`FeatureTaps`]: a recorder passed through the forward pass that keeps the
//!   activations of the requested nodes.
//!
//! An encoder must visit its nodes in exactly the order its graph lists them.

mod graph;
mod taps;

pub use graph::{LayerGraph, LayerInfo};
pub use taps::{FeatureTaps, TapError};
