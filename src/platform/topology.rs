//! Graph primitives shared by both platform styles.

use std::sync::Arc;

use super::{MediaSource, PresentationDescriptor, RendererKind, StreamDescriptor};
use crate::error::NativeError;

/// Node-level operations a pipeline offers for wiring source streams to
/// renderers.
///
/// `connect_output` returning `Ok` does not guarantee that anything will be
/// rendered; `connected_branches` is the authoritative count.
pub trait GraphPrimitives {
    type Source: MediaSource;
    type Node: Copy;

    fn add_source_node(
        &mut self,
        source: &Arc<Self::Source>,
        presentation: &PresentationDescriptor,
        stream: &StreamDescriptor,
    ) -> Result<Self::Node, NativeError>;

    fn add_output_node(
        &mut self,
        renderer: RendererKind,
        stream_sink_id: u32,
    ) -> Result<Self::Node, NativeError>;

    fn connect_output(&mut self, from: Self::Node, to: Self::Node) -> Result<(), NativeError>;

    fn connected_branches(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

pub enum TopologyNode<S> {
    SourceStream {
        source: Arc<S>,
        presentation: PresentationDescriptor,
        stream: StreamDescriptor,
    },
    Output {
        renderer: RendererKind,
        stream_sink_id: u32,
    },
}

/// One connected source-stream -> renderer pair.
pub struct Branch<'a, S> {
    pub source: &'a Arc<S>,
    pub stream: &'a StreamDescriptor,
    pub renderer: RendererKind,
}

/// A partial playback topology handed to a media session.
///
/// Plain data: building one has no side effects on the platform.
pub struct Topology<S> {
    nodes: Vec<TopologyNode<S>>,
    edges: Vec<(NodeId, NodeId)>,
}

impl<S> Default for Topology<S> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl<S> Topology<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn branches(&self) -> impl Iterator<Item = Branch<'_, S>> {
        self.edges.iter().filter_map(|(from, to)| {
            match (&self.nodes[from.0], &self.nodes[to.0]) {
                (
                    TopologyNode::SourceStream { source, stream, .. },
                    TopologyNode::Output { renderer, .. },
                ) => Some(Branch {
                    source,
                    stream,
                    renderer: *renderer,
                }),
                _ => None,
            }
        })
    }

    fn push(&mut self, node: TopologyNode<S>) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }
}

impl<S: MediaSource> GraphPrimitives for Topology<S> {
    type Source = S;
    type Node = NodeId;

    fn add_source_node(
        &mut self,
        source: &Arc<S>,
        presentation: &PresentationDescriptor,
        stream: &StreamDescriptor,
    ) -> Result<NodeId, NativeError> {
        Ok(self.push(TopologyNode::SourceStream {
            source: Arc::clone(source),
            presentation: presentation.clone(),
            stream: stream.clone(),
        }))
    }

    fn add_output_node(
        &mut self,
        renderer: RendererKind,
        stream_sink_id: u32,
    ) -> Result<NodeId, NativeError> {
        Ok(self.push(TopologyNode::Output {
            renderer,
            stream_sink_id,
        }))
    }

    fn connect_output(&mut self, from: NodeId, to: NodeId) -> Result<(), NativeError> {
        let (Some(from_node), Some(to_node)) = (self.nodes.get(from.0), self.nodes.get(to.0))
        else {
            return Err(NativeError::InvalidRequest("unknown topology node"));
        };
        if !matches!(from_node, TopologyNode::SourceStream { .. }) {
            return Err(NativeError::InvalidRequest("upstream node is not a source stream"));
        }
        if !matches!(to_node, TopologyNode::Output { .. }) {
            return Err(NativeError::InvalidRequest("downstream node is not an output"));
        }
        if self.edges.iter().any(|(_, t)| *t == to) {
            return Err(NativeError::InvalidRequest("output node already connected"));
        }
        self.edges.push((from, to));
        Ok(())
    }

    fn connected_branches(&self) -> usize {
        self.branches().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakeSource;

    #[test]
    fn connects_source_to_output() {
        let source = Arc::new(FakeSource::audio(1));
        let pd = source.descriptor();
        let mut topo = Topology::new();

        let s = topo.add_source_node(&source, &pd, &pd.streams[0]).expect("source");
        let o = topo.add_output_node(RendererKind::Audio, 0).expect("output");
        topo.connect_output(s, o).expect("connect");

        assert_eq!(topo.node_count(), 2);
        assert_eq!(topo.connected_branches(), 1);
        let branch = topo.branches().next().expect("branch");
        assert_eq!(branch.stream.index, 0);
        assert_eq!(branch.renderer, RendererKind::Audio);
    }

    #[test]
    fn rejects_reversed_and_double_connections() {
        let source = Arc::new(FakeSource::audio(1));
        let pd = source.descriptor();
        let mut topo = Topology::new();

        let s = topo.add_source_node(&source, &pd, &pd.streams[0]).expect("source");
        let o = topo.add_output_node(RendererKind::Audio, 0).expect("output");

        assert!(topo.connect_output(o, s).is_err());
        topo.connect_output(s, o).expect("connect");
        assert!(topo.connect_output(s, o).is_err());
        assert_eq!(topo.connected_branches(), 1);
    }

    #[test]
    fn unconnected_nodes_are_not_branches() {
        let source = Arc::new(FakeSource::audio(1));
        let pd = source.descriptor();
        let mut topo = Topology::new();
        topo.add_source_node(&source, &pd, &pd.streams[0]).expect("source");
        topo.add_output_node(RendererKind::Audio, 0).expect("output");
        assert_eq!(topo.connected_branches(), 0);
    }
}
