//! Forward-pass recorder for intermediate activations.

use burn::prelude::*;
use thiserror::Error;

/// Error raised when requested taps do not line up with the nodes an encoder visited.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TapError {
    /// A requested node index was never reached during the forward pass.
    #[error("layer {index} was requested but only {visited} layers were visited")]
    NotVisited {
        /// The requested graph index.
        index: usize,
        /// Number of nodes visited by the forward pass.
        visited: usize,
    },
}

/// Collects the activations of a fixed set of graph nodes during a forward pass.
///
/// Every call to [`FeatureTaps::visit`] advances the cursor by one graph node.
/// Requested nodes are returned by [`FeatureTaps::finish`] in the order they were
/// requested, which need not be graph order. The same node may be requested twice.
#[derive(Debug)]
pub struct FeatureTaps<B: Backend> {
    requested: Vec<usize>,
    captured: Vec<Option<Tensor<B, 4>>>,
    cursor: usize,
}

impl<B: Backend> FeatureTaps<B> {
    /// Creates a recorder for the given graph indices.
    pub fn new(requested: &[usize]) -> Self {
        Self {
            requested: requested.to_vec(),
            captured: vec![None; requested.len()],
            cursor: 0,
        }
    }

    /// Creates a recorder that keeps nothing.
    pub fn none() -> Self {
        Self::new(&[])
    }

    /// Records the output of the next graph node.
    pub fn visit(&mut self, output: &Tensor<B, 4>) {
        for (slot, &index) in self.captured.iter_mut().zip(&self.requested) {
            if index == self.cursor {
                *slot = Some(output.clone());
            }
        }
        self.cursor += 1;
    }

    /// Number of nodes visited so far.
    pub const fn visited(&self) -> usize {
        self.cursor
    }

    /// Returns the captured activations in request order.
    ///
    /// # Errors
    ///
    /// Returns [`TapError::NotVisited`] if the forward pass stopped before reaching a
    /// requested node.
    pub fn finish(self) -> Result<Vec<Tensor<B, 4>>, TapError> {
        let visited = self.cursor;
        self.captured
            .into_iter()
            .zip(self.requested)
            .map(|(tensor, index)| tensor.ok_or(TapError::NotVisited { index, visited }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn constant(value: f32) -> Tensor<TestBackend, 4> {
        Tensor::<TestBackend, 4>::ones([1, 1, 2, 2], &Default::default()).mul_scalar(value)
    }

    #[test]
    fn finish_returns_taps_in_request_order() {
        let mut taps = FeatureTaps::<TestBackend>::new(&[2, 0]);
        for value in [10.0, 20.0, 30.0] {
            taps.visit(&constant(value));
        }

        let features = taps.finish().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].clone().sum().into_scalar(), 120.0);
        assert_eq!(features[1].clone().sum().into_scalar(), 40.0);
    }

    #[test]
    fn visit_counts_every_node() {
        let mut taps = FeatureTaps::<TestBackend>::none();
        taps.visit(&constant(1.0));
        taps.visit(&constant(1.0));
        assert_eq!(taps.visited(), 2);
        assert!(taps.finish().unwrap().is_empty());
    }

    #[test]
    fn unreached_tap_is_reported() {
        let mut taps = FeatureTaps::<TestBackend>::new(&[5]);
        taps.visit(&constant(1.0));

        assert_eq!(
            taps.finish().unwrap_err(),
            TapError::NotVisited {
                index: 5,
                visited: 1
            }
        );
    }
}
