//! Ordered description of the tappable nodes of an encoder.

use core::fmt;

/// A single node of an encoder's layer graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    /// Unique node name, e.g. `block5_conv3` or `stage4_unit1_relu1`.
    pub name: String,
    /// Number of channels produced by the node.
    pub channels: usize,
    /// Spatial downsampling factor of the node output relative to the encoder input.
    pub reduction: usize,
}

/// The ordered list of nodes an encoder exposes.
///
/// Position 0 is always the input node, and the last node is the encoder output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerGraph {
    layers: Vec<LayerInfo>,
}

impl LayerGraph {
    /// Creates an empty graph.
    pub const fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Appends a node and returns its index.
    pub fn push(&mut self, name: impl Into<String>, channels: usize, reduction: usize) -> usize {
        self.layers.push(LayerInfo {
            name: name.into(),
            channels,
            reduction,
        });
        self.layers.len() - 1
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Node at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&LayerInfo> {
        self.layers.get(index)
    }

    /// Index of the node called `name`, if any.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|layer| layer.name == name)
    }

    /// The output node.
    pub fn last(&self) -> Option<&LayerInfo> {
        self.layers.last()
    }

    /// Iterates over all nodes in graph order.
    pub fn iter(&self) -> impl Iterator<Item = &LayerInfo> {
        self.layers.iter()
    }

    /// Node names in graph order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|layer| layer.name.as_str())
    }
}

impl fmt::Display for LayerGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, layer) in self.iter().enumerate() {
            writeln!(
                f,
                "{index:>4}  {:<28} {:>5} ch  /{}",
                layer.name, layer.channels, layer.reduction
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> LayerGraph {
        let mut graph = LayerGraph::new();
        graph.push("input", 3, 1);
        graph.push("conv", 64, 2);
        graph.push("pool", 64, 4);
        graph
    }

    #[test]
    fn push_returns_sequential_indices() {
        let mut graph = LayerGraph::new();
        assert_eq!(graph.push("a", 1, 1), 0);
        assert_eq!(graph.push("b", 1, 1), 1);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn position_finds_layers_by_name() {
        let graph = sample_graph();
        assert_eq!(graph.position("conv"), Some(1));
        assert_eq!(graph.position("missing"), None);
    }

    #[test]
    fn last_is_the_output_node() {
        let graph = sample_graph();
        let output = graph.last().unwrap();
        assert_eq!(output.name, "pool");
        assert_eq!(output.reduction, 4);
    }

    #[test]
    fn names_follow_graph_order() {
        let graph = sample_graph();
        assert_eq!(graph.names().collect::<Vec<_>>(), ["input", "conv", "pool"]);
    }

    #[test]
    fn display_lists_every_node() {
        let rendered = sample_graph().to_string();
        assert_eq!(rendered.lines().count(), 3);
        assert!(rendered.contains("conv"));
    }
}
