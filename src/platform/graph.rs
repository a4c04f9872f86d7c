//! Synchronous filter-graph style API.
//!
//! Everything here returns when the work is done; the only asynchronous
//! signal is the notification queue handed to the graph at creation.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use super::topology::GraphPrimitives;
use crate::error::NativeError;

/// Notification a graph posts while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// All renderers reached end of stream
    Complete,
    /// Playback stopped because of an error
    ErrorAbort(String),
}

#[derive(Debug)]
pub enum GraphNotification {
    Event { generation: u64, event: GraphEvent },
    Quit,
}

/// Posting end of a graph's notification queue.
///
/// Every event carries the generation of the graph it was handed to, so a
/// poller can tell a live graph from one that was already torn down.
#[derive(Debug, Clone)]
pub struct GraphNotifier {
    generation: u64,
    tx: mpsc::Sender<GraphNotification>,
}

impl GraphNotifier {
    pub fn new(generation: u64, tx: mpsc::Sender<GraphNotification>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notify(&self, event: GraphEvent) {
        let _ = self.tx.send(GraphNotification::Event {
            generation: self.generation,
            event,
        });
    }
}

/// A filter graph that renders one source.
pub trait FilterGraph: GraphPrimitives + Send {
    /// Resolve `url` into a source filter inside this graph. Blocks until the
    /// source is readable or fails.
    fn add_source_filter(&mut self, url: &str) -> Result<Arc<Self::Source>, NativeError>;

    fn run(&mut self) -> Result<(), NativeError>;
    fn pause(&mut self) -> Result<(), NativeError>;
    fn stop(&mut self) -> Result<(), NativeError>;

    /// Seek every renderer back to time zero.
    fn rewind(&mut self) -> Result<(), NativeError>;

    fn current_position(&self) -> Result<Duration, NativeError>;
    fn duration(&self) -> Result<Duration, NativeError>;

    /// Output attenuation in hundredths of a decibel, `-10000..=0`.
    fn put_volume(&mut self, centibels: i32) -> Result<(), NativeError>;
}

pub trait GraphFactory: Send + 'static {
    type Graph: FilterGraph;

    fn create_graph(&self, notifier: GraphNotifier) -> Result<Self::Graph, NativeError>;
}
