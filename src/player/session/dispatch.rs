//! Completion dispatch for the session adapter.
//!
//! Platform callbacks only post into a channel; a dedicated thread folds each
//! completion into the state machine under the instance lock. The thread
//! holds a weak reference, so the adapter owns its state outright.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use super::{Inner, Shared};
use crate::platform::session::{
    AsyncCallback, AsyncResult, MediaEventKind, MediaSession, SessionPlatform, StartPosition,
    TopologyStatus,
};
use crate::player::state::{PlaybackState, Transition};

pub(super) enum Dispatch {
    Completion { generation: u64, result: AsyncResult },
    Quit,
}

/// The one callback object registered with the resolver and the session of
/// a single open. Carries nothing but its generation and a channel.
pub(super) struct CompletionRelay {
    generation: u64,
    tx: mpsc::Sender<Dispatch>,
}

impl CompletionRelay {
    pub(super) fn new(generation: u64, tx: mpsc::Sender<Dispatch>) -> Arc<Self> {
        Arc::new(Self { generation, tx })
    }
}

impl AsyncCallback for CompletionRelay {
    fn invoke(&self, result: AsyncResult) {
        let sent = self.tx.send(Dispatch::Completion {
            generation: self.generation,
            result,
        });
        if sent.is_err() {
            tracing::trace!(generation = self.generation, "completion after player was destroyed");
        }
    }
}

pub(super) fn spawn<P: SessionPlatform>(
    shared: Weak<Shared<P>>,
    rx: Receiver<Dispatch>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("barplayer-session-events".to_owned())
        .spawn(move || {
            while let Ok(msg) = rx.recv() {
                let (generation, result) = match msg {
                    Dispatch::Quit => break,
                    Dispatch::Completion { generation, result } => (generation, result),
                };
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.dispatch(generation, result);
            }
            tracing::trace!("session dispatcher exiting");
        })
}

impl<P: SessionPlatform> Shared<P> {
    fn dispatch(&self, generation: u64, result: AsyncResult) {
        let mut inner = self.lock();
        if generation != inner.generation {
            tracing::trace!(
                generation,
                current = inner.generation,
                "stale completion dropped"
            );
            return;
        }

        // An open in flight owns the next completion, whatever it carries.
        if inner.machine.state() == PlaybackState::OpenPending && inner.cookie.is_some() {
            inner.complete_open(result);
        } else {
            self.handle_event(&mut inner, result);
        }

        // a caller blocked in close also wakes when a failure already closed us
        if inner.close_acked || inner.machine.state() == PlaybackState::Closed {
            self.closed.notify_all();
        }
    }

    fn handle_event(&self, inner: &mut Inner<P>, result: AsyncResult) {
        let Some(session) = inner.session.as_ref() else {
            return;
        };
        let closing = inner.machine.state() == PlaybackState::Closing;

        let event = match session.end_get_event(result) {
            Ok(event) => event,
            Err(e) if closing => {
                // most likely a cancelled open; the event wait is still armed
                tracing::debug!(err = %e, "completion ignored while closing");
                return;
            }
            Err(e) => {
                inner.fail_runtime("event", e.into());
                return;
            }
        };
        tracing::trace!(kind = ?event.kind, generation = inner.generation, "session event");

        if event.kind == MediaEventKind::SessionClosed {
            if closing {
                inner.close_acked = true;
            } else {
                tracing::warn!("session closed without a close request");
                inner.release_now();
                let _ = inner.machine.apply(Transition::Finish);
            }
            return;
        }

        if closing {
            inner.rearm();
            return;
        }

        if let Some(error) = event.error {
            tracing::warn!(kind = ?event.kind, error = %error, "session reported failure");
            inner.fail_runtime(
                "event",
                crate::error::NativeError::Unexpected(error).into(),
            );
            return;
        }

        match event.kind {
            MediaEventKind::TopologyStatus(TopologyStatus::Ready)
                if inner.machine.state() == PlaybackState::OpenPending =>
            {
                if let Err(e) = inner.start_playback(Transition::TopologyReady, StartPosition::Current)
                {
                    tracing::warn!(err = %e, "failed to start after topology ready");
                }
            }
            MediaEventKind::EndOfPresentation if inner.machine.state() == PlaybackState::Started => {
                let _ = inner.machine.apply(Transition::EndOfStream);
                inner.drop_controls();
            }
            MediaEventKind::NewPresentation(presentation) => {
                inner.renegotiate(presentation);
            }
            _ => {}
        }

        if inner.session.is_some() {
            inner.rearm();
        }
    }
}
