//! Filter-graph style API on the local platform.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use super::{MediaPlatform, PlatformOutput};
use super::fetch::{extension_hint, fetch_to_temp};
use super::render::{AudioRenderer, EndCallback, centibels_to_linear};
use super::source::FileMediaSource;
use crate::error::NativeError;
use crate::platform::graph::{FilterGraph, GraphEvent, GraphFactory, GraphNotifier};
use crate::platform::topology::GraphPrimitives;
use crate::platform::{MediaSource, PresentationDescriptor, RendererKind, StreamDescriptor};

pub struct RodioGraphFactory {
    output: PlatformOutput,
}

impl RodioGraphFactory {
    pub fn new(platform: MediaPlatform) -> Self {
        Self::with_output(platform.output())
    }

    pub fn with_output(output: PlatformOutput) -> Self {
        Self { output }
    }
}

impl GraphFactory for RodioGraphFactory {
    type Graph = RodioFilterGraph;

    fn create_graph(&self, notifier: GraphNotifier) -> Result<RodioFilterGraph, NativeError> {
        Ok(RodioFilterGraph {
            output: self.output.clone(),
            notifier,
            sources: Vec::new(),
            nodes: Vec::new(),
            renderers: Vec::new(),
            pending_ends: Arc::new(AtomicUsize::new(0)),
            volume: 1.0,
        })
    }
}

#[derive(Clone, Copy)]
enum GraphNode {
    Stream { source: usize },
    Output { connected: bool },
}

pub struct RodioFilterGraph {
    output: PlatformOutput,
    notifier: GraphNotifier,
    sources: Vec<Arc<FileMediaSource>>,
    nodes: Vec<GraphNode>,
    renderers: Vec<AudioRenderer>,
    /// Renderers that still have to reach end of stream before `Complete`
    pending_ends: Arc<AtomicUsize>,
    volume: f32,
}

impl RodioFilterGraph {
    fn end_callback(&self) -> EndCallback {
        let pending = Arc::clone(&self.pending_ends);
        let notifier = self.notifier.clone();
        Arc::new(move || {
            let before = pending
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .unwrap_or(0);
            if before == 1 {
                notifier.notify(GraphEvent::Complete);
            }
        })
    }

    fn first_renderer(&self) -> Result<&AudioRenderer, NativeError> {
        self.renderers
            .first()
            .ok_or(NativeError::NotInitialized("graph has no renderer"))
    }
}

impl Drop for RodioFilterGraph {
    fn drop(&mut self) {
        self.renderers.clear();
        for source in &self.sources {
            source.shutdown();
        }
    }
}

impl GraphPrimitives for RodioFilterGraph {
    type Source = FileMediaSource;
    type Node = usize;

    fn add_source_node(
        &mut self,
        source: &Arc<FileMediaSource>,
        _presentation: &PresentationDescriptor,
        _stream: &StreamDescriptor,
    ) -> Result<usize, NativeError> {
        let index = match self.sources.iter().position(|s| Arc::ptr_eq(s, source)) {
            Some(index) => index,
            None => {
                self.sources.push(Arc::clone(source));
                self.sources.len() - 1
            }
        };
        self.nodes.push(GraphNode::Stream { source: index });
        Ok(self.nodes.len() - 1)
    }

    fn add_output_node(&mut self, renderer: RendererKind, _: u32) -> Result<usize, NativeError> {
        match renderer {
            RendererKind::Audio => {
                self.nodes.push(GraphNode::Output { connected: false });
                Ok(self.nodes.len() - 1)
            }
        }
    }

    fn connect_output(&mut self, from: usize, to: usize) -> Result<(), NativeError> {
        let source = match self.nodes.get(from) {
            Some(GraphNode::Stream { source }) => *source,
            _ => return Err(NativeError::InvalidRequest("upstream node is not a source stream")),
        };
        match self.nodes.get(to) {
            Some(GraphNode::Output { connected: false }) => {}
            Some(GraphNode::Output { connected: true }) => {
                return Err(NativeError::InvalidRequest("output node already connected"));
            }
            _ => return Err(NativeError::InvalidRequest("downstream node is not an output")),
        }

        let source = self
            .sources
            .get(source)
            .cloned()
            .ok_or(NativeError::InvalidRequest("unknown source"))?;
        let label = self.notifier.generation() * 100 + self.renderers.len() as u64;
        let mut renderer = AudioRenderer::new(
            self.output.mixer().clone(),
            source,
            label,
            self.end_callback(),
        );
        renderer.set_volume(self.volume);
        renderer.prepare()?;

        self.renderers.push(renderer);
        self.pending_ends.fetch_add(1, Ordering::AcqRel);
        self.nodes[to] = GraphNode::Output { connected: true };
        Ok(())
    }

    fn connected_branches(&self) -> usize {
        self.renderers.len()
    }
}

impl FilterGraph for RodioFilterGraph {
    /// The fetch runs as a task on the work queue while this thread waits on
    /// its result, so the caller may itself be inside an async runtime.
    fn add_source_filter(&mut self, url: &str) -> Result<Arc<FileMediaSource>, NativeError> {
        let (tx, rx) = mpsc::channel();
        let http = self.output.http().clone();
        let owned = url.to_owned();
        self.output.handle().spawn(async move {
            let _ = tx.send(fetch_to_temp(&http, &owned).await);
        });
        let file = rx
            .recv()
            .map_err(|_| NativeError::Unexpected("fetch task dropped".to_owned()))??;
        let source = Arc::new(FileMediaSource::open(file, extension_hint(url))?);
        self.sources.push(Arc::clone(&source));
        Ok(source)
    }

    fn run(&mut self) -> Result<(), NativeError> {
        if self.renderers.is_empty() {
            return Err(NativeError::NotInitialized("graph has no renderer"));
        }
        for renderer in &self.renderers {
            renderer.play();
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), NativeError> {
        for renderer in &self.renderers {
            renderer.pause();
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), NativeError> {
        self.pause()
    }

    fn rewind(&mut self) -> Result<(), NativeError> {
        for renderer in &mut self.renderers {
            renderer.rewind()?;
        }
        self.pending_ends
            .store(self.renderers.len(), Ordering::Release);
        Ok(())
    }

    fn current_position(&self) -> Result<Duration, NativeError> {
        Ok(self.first_renderer()?.position())
    }

    fn duration(&self) -> Result<Duration, NativeError> {
        self.first_renderer()?
            .duration()
            .ok_or(NativeError::NotInitialized("duration unknown"))
    }

    fn put_volume(&mut self, centibels: i32) -> Result<(), NativeError> {
        if !(-10_000..=0).contains(&centibels) {
            return Err(NativeError::InvalidRequest("volume out of range"));
        }
        self.volume = centibels_to_linear(centibels);
        for renderer in &mut self.renderers {
            renderer.set_volume(self.volume);
        }
        Ok(())
    }
}
