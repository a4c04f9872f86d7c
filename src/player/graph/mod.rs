//! Synchronous filter-graph adapter.
//!
//! The whole graph is built inside `open`; afterwards every transport call
//! maps onto one blocking graph call. Any native failure outside `open`
//! tears the graph down, leaving the instance `Closed`.

mod poller;

use std::sync::Arc;
use std::time::Duration;

use poller::GraphPoller;

use super::backend::{BackendOptions, PlayerBackend};
use super::mixer::VolumeSetting;
use super::state::{PlaybackState, StateMachine, Transition};
use super::topology::build_topology;
use crate::error::{NativeError, PlayerError};
use crate::platform::MediaSource;
use crate::platform::graph::{FilterGraph, GraphFactory};

struct ActiveGraph<G: FilterGraph> {
    graph: G,
    source: Arc<G::Source>,
    generation: u64,
}

impl<G: FilterGraph> ActiveGraph<G> {
    fn release(mut self) {
        if let Err(e) = self.graph.stop() {
            tracing::debug!(generation = self.generation, err = %e, "stop during teardown failed");
        }
        self.source.shutdown();
        drop(self.graph);
        tracing::debug!(generation = self.generation, "graph released");
    }
}

pub struct GraphPlayer<F: GraphFactory> {
    factory: F,
    machine: StateMachine,
    volume: VolumeSetting,
    active: Option<ActiveGraph<F::Graph>>,
    generation: u64,
    poller: GraphPoller,
    options: BackendOptions,
}

impl<F: GraphFactory> GraphPlayer<F> {
    pub fn new(factory: F, options: BackendOptions) -> Result<Self, PlayerError> {
        Ok(Self {
            factory,
            machine: StateMachine::new(),
            volume: VolumeSetting::default(),
            active: None,
            generation: 0,
            poller: GraphPoller::spawn()?,
            options,
        })
    }

    fn release_graph(&mut self) {
        if let Some(active) = self.active.take() {
            active.release();
        }
    }

    /// Closing -> Closed around a synchronous release.
    fn close_session(&mut self) {
        if self.machine.state() == PlaybackState::Closed {
            return;
        }
        let _ = self.machine.apply(Transition::Close);
        self.release_graph();
        let _ = self.machine.apply(Transition::SessionClosed);
    }

    /// A native call failed mid-session: tear down instead of leaving the
    /// graph half-applied.
    fn fail(&mut self, op: &'static str, err: NativeError) -> PlayerError {
        tracing::warn!(op, generation = self.generation, err = %err, "graph call failed, tearing down");
        self.release_graph();
        let _ = self.machine.apply(Transition::Finish);
        PlayerError::Native(err)
    }

    fn apply_volume(&mut self) {
        let centibels = self.volume.centibels();
        if let Some(active) = self.active.as_mut()
            && let Err(e) = active.graph.put_volume(centibels)
        {
            tracing::warn!(centibels, err = %e, "failed to apply graph volume");
        }
    }

    fn build(
        &mut self,
        url: &str,
        generation: u64,
    ) -> Result<ActiveGraph<F::Graph>, PlayerError> {
        let notifier = self.poller.arm(generation);
        let mut graph = self.factory.create_graph(notifier)?;
        let source = graph.add_source_filter(url)?;

        let built = source
            .create_presentation_descriptor()
            .map_err(PlayerError::from)
            .and_then(|pd| build_topology(&mut graph, &source, &pd));
        match built {
            Ok(branches) => {
                tracing::debug!(generation, branches, "graph rendered");
                Ok(ActiveGraph {
                    graph,
                    source,
                    generation,
                })
            }
            Err(e) => {
                source.shutdown();
                Err(e)
            }
        }
    }

    fn graph(&self) -> Option<&F::Graph> {
        self.active.as_ref().map(|a| &a.graph)
    }
}

impl<F: GraphFactory> Drop for GraphPlayer<F> {
    fn drop(&mut self) {
        self.close_session();
    }
}

impl<F: GraphFactory> PlayerBackend for GraphPlayer<F> {
    fn set_volume(&mut self, volume: f32) {
        self.volume.set_master(volume);
        self.apply_volume();
    }

    fn volume(&self) -> f32 {
        self.volume.master()
    }

    fn set_gain(&mut self, gain_db: f32) {
        self.volume.set_gain_db(gain_db);
        self.apply_volume();
    }

    fn gain(&self) -> f32 {
        self.volume.gain_db()
    }

    fn duration(&self) -> Duration {
        self.graph()
            .and_then(|g| g.duration().ok())
            .unwrap_or_default()
    }

    fn time(&self) -> Duration {
        self.graph()
            .and_then(|g| g.current_position().ok())
            .unwrap_or_default()
    }

    fn open(&mut self, url: &str) -> Result<(), PlayerError> {
        if url.trim().is_empty() {
            return Err(PlayerError::EmptyUrl);
        }

        self.close_session();
        self.machine.apply(Transition::Open)?;
        self.generation += 1;
        let generation = self.generation;
        tracing::info!(url, generation, "opening graph");

        match self.build(url, generation) {
            Ok(active) => {
                self.active = Some(active);
                self.machine.apply(Transition::Built)?;
                self.apply_volume();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(url, generation, err = %e, "graph open failed");
                self.machine.apply(Transition::OpenFailed)?;
                Err(e)
            }
        }
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        let from = self.machine.state();
        self.machine.check(Transition::Play)?;
        let Some(active) = self.active.as_mut() else {
            return Err(PlayerError::invalid("play", from));
        };

        let result = if from == PlaybackState::Stopped {
            active.graph.rewind().and_then(|()| active.graph.run())
        } else {
            active.graph.run()
        };
        if let Err(e) = result {
            return Err(self.fail("play", e));
        }
        self.machine.apply(Transition::Play)?;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        let from = self.machine.state();
        self.machine.check(Transition::Pause)?;
        let Some(active) = self.active.as_mut() else {
            return Err(PlayerError::invalid("pause", from));
        };
        if let Err(e) = active.graph.pause() {
            return Err(self.fail("pause", e));
        }
        self.machine.apply(Transition::Pause)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        let from = self.machine.state();
        self.machine.check(Transition::Stop)?;
        let Some(active) = self.active.as_mut() else {
            return Err(PlayerError::invalid("stop", from));
        };
        if let Err(e) = active.graph.stop() {
            return Err(self.fail("stop", e));
        }
        self.machine.apply(Transition::Stop)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PlayerError> {
        self.machine.check(Transition::Finish)?;
        self.release_graph();
        self.machine.apply(Transition::Finish)?;
        Ok(())
    }

    fn state(&self) -> PlaybackState {
        self.machine.state()
    }

    /// No graph, an aborted graph, or a position within tolerance of the
    /// duration all count as finished.
    fn is_finished(&self) -> bool {
        let Some(graph) = self.graph() else {
            return true;
        };
        if self.poller.is_aborted() {
            return true;
        }
        match (graph.current_position(), graph.duration()) {
            (Ok(position), Ok(duration)) => {
                position + self.options.finish_tolerance >= duration
            }
            _ => true,
        }
    }
}
