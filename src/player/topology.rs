//! Builds source -> renderer branches for an opened source.

use std::sync::Arc;

use crate::error::PlayerError;
use crate::platform::topology::{GraphPrimitives, Topology};
use crate::platform::{MajorType, MediaSource, PresentationDescriptor, RendererKind, StreamDescriptor};

/// Only audio streams have a renderer; anything else fails the build.
pub fn renderer_for(stream: &StreamDescriptor) -> Result<RendererKind, PlayerError> {
    match stream.major_type {
        MajorType::Audio => Ok(RendererKind::Audio),
        major => Err(PlayerError::UnsupportedStream {
            index: stream.index,
            major,
        }),
    }
}

/// Add one branch per selected stream of `presentation` to `graph`.
///
/// Returns the number of connected branches as reported by the graph itself,
/// which must be at least one even when every connect call succeeded.
pub fn build_topology<G: GraphPrimitives>(
    graph: &mut G,
    source: &Arc<G::Source>,
    presentation: &PresentationDescriptor,
) -> Result<usize, PlayerError> {
    let mut attempted = 0usize;

    for index in 0..presentation.stream_count() {
        let Some(stream) = presentation.stream(index) else {
            continue;
        };
        if !stream.selected {
            tracing::trace!(index, "stream not selected, skipped");
            continue;
        }

        let renderer = renderer_for(stream)?;
        let source_node = graph.add_source_node(source, presentation, stream)?;
        let output_node = graph.add_output_node(renderer, 0)?;
        graph.connect_output(source_node, output_node)?;
        attempted += 1;
    }

    let branches = graph.connected_branches();
    if branches == 0 {
        tracing::warn!(attempted, "topology rendered nothing");
        return Err(PlayerError::NoConnectedBranches);
    }
    tracing::debug!(attempted, branches, "topology built");
    Ok(branches)
}

/// Fresh session topology for `source` / `presentation`.
pub fn create_playback_topology<S: MediaSource>(
    source: &Arc<S>,
    presentation: &PresentationDescriptor,
) -> Result<Topology<S>, PlayerError> {
    let mut topology = Topology::new();
    build_topology(&mut topology, source, presentation)?;
    Ok(topology)
}
