//! Parameter freezing.

use burn::prelude::*;

/// Marks every parameter of `module` as not requiring gradients.
///
/// Freezing is a property of the live module only; it is not part of saved records.
pub fn freeze_model<B: Backend, M: Module<B>>(module: M) -> M {
    module.no_grad()
}
