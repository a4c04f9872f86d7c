use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::error::NativeError;
use crate::platform::graph::{GraphEvent, GraphNotification, GraphNotifier};

#[derive(Debug, Default)]
struct PollerState {
    generation: u64,
    aborted: Option<String>,
}

/// Drains graph notifications on a dedicated thread.
///
/// Only events tagged with the currently armed generation are recorded;
/// anything posted by a graph that was already torn down is dropped.
pub(crate) struct GraphPoller {
    tx: mpsc::Sender<GraphNotification>,
    state: Arc<Mutex<PollerState>>,
    handle: Option<JoinHandle<()>>,
}

fn lock(state: &Mutex<PollerState>) -> MutexGuard<'_, PollerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GraphPoller {
    pub(crate) fn spawn() -> Result<Self, NativeError> {
        let (tx, rx) = mpsc::channel::<GraphNotification>();
        let state = Arc::new(Mutex::new(PollerState::default()));
        let thread_state = Arc::clone(&state);

        let handle = thread::Builder::new()
            .name("barplayer-graph-events".to_owned())
            .spawn(move || {
                while let Ok(notification) = rx.recv() {
                    let (generation, event) = match notification {
                        GraphNotification::Quit => break,
                        GraphNotification::Event { generation, event } => (generation, event),
                    };
                    let mut st = lock(&thread_state);
                    if generation != st.generation {
                        tracing::trace!(generation, current = st.generation, "stale graph event dropped");
                        continue;
                    }
                    match event {
                        GraphEvent::Complete => {
                            tracing::debug!(generation, "graph complete");
                        }
                        GraphEvent::ErrorAbort(reason) => {
                            tracing::warn!(generation, reason = %reason, "graph aborted");
                            st.aborted = Some(reason);
                        }
                    }
                }
                tracing::trace!("graph event poller exiting");
            })?;

        Ok(Self {
            tx,
            state,
            handle: Some(handle),
        })
    }

    /// Start accepting events for `generation` and hand out its notifier.
    pub(crate) fn arm(&self, generation: u64) -> GraphNotifier {
        let mut st = lock(&self.state);
        st.generation = generation;
        st.aborted = None;
        GraphNotifier::new(generation, self.tx.clone())
    }

    pub(crate) fn is_aborted(&self) -> bool {
        lock(&self.state).aborted.is_some()
    }
}

impl Drop for GraphPoller {
    fn drop(&mut self) {
        let _ = self.tx.send(GraphNotification::Quit);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
