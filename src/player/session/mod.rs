//! Asynchronous media-session adapter.
//!
//! `open` only starts resolving the source; the dispatcher thread finishes
//! the open, applies the topology and starts playback as completions arrive.
//! Callers poll the state to learn when playback actually began.

mod dispatch;

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use dispatch::{CompletionRelay, Dispatch};

use super::backend::{BackendOptions, PlayerBackend};
use super::mixer::VolumeSetting;
use super::state::{PlaybackState, StateMachine, Transition};
use super::topology::create_playback_topology;
use crate::error::PlayerError;
use crate::platform::session::{
    AsyncCallback, AsyncResult, AudioStreamVolume, MediaSession, PresentationClock,
    SessionPlatform, SourceResolver, StartPosition,
};
use crate::platform::{MediaSource, PresentationDescriptor};

type Cookie<P> = <<P as SessionPlatform>::Resolver as SourceResolver>::Cookie;
type Clock<P> = <<P as SessionPlatform>::Session as MediaSession>::Clock;
type StreamVolume<P> = <<P as SessionPlatform>::Session as MediaSession>::Volume;

struct Inner<P: SessionPlatform> {
    machine: StateMachine,
    volume: VolumeSetting,
    /// Bumped on every open and every release; completions carry the value
    /// current when they were registered.
    generation: u64,
    session: Option<P::Session>,
    resolver: Option<P::Resolver>,
    cookie: Option<Cookie<P>>,
    source: Option<Arc<P::Source>>,
    relay: Option<Arc<CompletionRelay>>,
    duration: Option<Duration>,
    clock: Option<Clock<P>>,
    stream_volume: Option<StreamVolume<P>>,
    close_acked: bool,
    /// Set when the platform never acknowledged a close
    poisoned: bool,
}

impl<P: SessionPlatform> Inner<P> {
    fn new() -> Self {
        Self {
            machine: StateMachine::new(),
            volume: VolumeSetting::default(),
            generation: 0,
            session: None,
            resolver: None,
            cookie: None,
            source: None,
            relay: None,
            duration: None,
            clock: None,
            stream_volume: None,
            close_acked: false,
            poisoned: false,
        }
    }

    fn check_usable(&self) -> Result<(), PlayerError> {
        if self.poisoned {
            Err(PlayerError::Unresponsive)
        } else {
            Ok(())
        }
    }

    /// Cancel any pending open, then shut source and session down
    /// synchronously. Raises no events; anything still in flight becomes stale.
    fn release_now(&mut self) {
        if let Some(cookie) = self.cookie.take()
            && let Some(resolver) = self.resolver.as_ref()
            && let Err(e) = resolver.cancel_object_creation(cookie)
        {
            tracing::debug!(err = %e, "cancel of pending open failed");
        }
        self.resolver = None;
        self.relay = None;
        self.drop_controls();
        if let Some(source) = self.source.take() {
            source.shutdown();
        }
        if let Some(session) = self.session.take()
            && let Err(e) = session.shutdown()
        {
            tracing::debug!(err = %e, "session shutdown failed");
        }
        self.duration = None;
        self.close_acked = false;
        self.generation += 1;
    }

    fn fail_open(&mut self, err: &PlayerError) {
        tracing::warn!(generation = self.generation, err = %err, "open failed");
        self.release_now();
        let _ = self.machine.apply(Transition::OpenFailed);
    }

    /// Native failure outside of open: tear down, end up `Closed`.
    fn fail_runtime(&mut self, op: &'static str, err: PlayerError) -> PlayerError {
        tracing::warn!(op, generation = self.generation, err = %err, "session failed, tearing down");
        self.release_now();
        if self.machine.state() != PlaybackState::Closed {
            let _ = self.machine.apply(Transition::Finish);
        }
        err
    }

    fn complete_open(&mut self, result: AsyncResult) {
        self.cookie = None;
        let Some(resolver) = self.resolver.take() else {
            return;
        };

        let opened = resolver
            .end_create_object_from_url(result)
            .map_err(PlayerError::from)
            .and_then(|source| {
                let built = source
                    .create_presentation_descriptor()
                    .map_err(PlayerError::from)
                    .and_then(|pd| {
                        let topology = create_playback_topology(&source, &pd)?;
                        Ok((pd.duration, topology))
                    });
                match built {
                    Ok((duration, topology)) => Ok((source, duration, topology)),
                    Err(e) => {
                        source.shutdown();
                        Err(e)
                    }
                }
            });

        let (source, duration, topology) = match opened {
            Ok(parts) => parts,
            Err(e) => return self.fail_open(&e),
        };
        self.source = Some(source);
        self.duration = duration;

        let queued = match self.session.as_ref() {
            Some(session) => session.set_topology(topology).map_err(PlayerError::from),
            None => Err(PlayerError::invalid("open", self.machine.state())),
        };
        match queued {
            Ok(()) => tracing::debug!(generation = self.generation, "source resolved, topology queued"),
            Err(e) => self.fail_open(&e),
        }
    }

    /// Start the session and move along `transition`.
    fn start_playback(
        &mut self,
        transition: Transition,
        position: StartPosition,
    ) -> Result<(), PlayerError> {
        let from = self.machine.state();
        self.machine.check(transition)?;
        let started = match self.session.as_ref() {
            Some(session) => session.start(position),
            None => return Err(PlayerError::invalid(transition.op(), from)),
        };
        if let Err(e) = started {
            return Err(self.fail_runtime(transition.op(), e.into()));
        }
        self.machine.apply(transition)?;
        if from != PlaybackState::Paused {
            self.acquire_controls();
        }
        Ok(())
    }

    fn renegotiate(&mut self, presentation: PresentationDescriptor) {
        let (Some(source), Some(session)) = (self.source.as_ref(), self.session.as_ref()) else {
            return;
        };
        let applied = create_playback_topology(source, &presentation)
            .and_then(|topology| session.set_topology(topology).map_err(PlayerError::from));
        match applied {
            Ok(()) => {
                if presentation.duration.is_some() {
                    self.duration = presentation.duration;
                }
                match self.machine.apply(Transition::NewPresentation) {
                    Ok(_) => tracing::debug!(generation = self.generation, "topology renegotiated"),
                    Err(e) => tracing::debug!(err = %e, "new presentation while not playing"),
                }
            }
            Err(e) => {
                self.fail_runtime("new presentation", e);
            }
        }
    }

    /// Wait for the next session event. A failure here would silence the
    /// session for good, so it tears the session down instead.
    fn rearm(&mut self) {
        let (Some(session), Some(relay)) = (self.session.as_ref(), self.relay.as_ref()) else {
            return;
        };
        let callback: Arc<dyn AsyncCallback> = relay.clone();
        if let Err(e) = session.begin_get_event(callback) {
            tracing::error!(generation = self.generation, err = %e, "failed to re-arm session events");
            self.fail_runtime("re-arm", e.into());
        }
    }

    fn acquire_controls(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        self.clock = session
            .clock()
            .inspect_err(|e| tracing::debug!(err = %e, "presentation clock unavailable"))
            .ok();
        self.stream_volume = session
            .stream_volume()
            .inspect_err(|e| tracing::debug!(err = %e, "stream volume unavailable"))
            .ok();
        self.apply_volume();
    }

    fn drop_controls(&mut self) {
        self.clock = None;
        self.stream_volume = None;
    }

    fn apply_volume(&self) {
        let Some(control) = self.stream_volume.as_ref() else {
            return;
        };
        let level = self.volume.linear();
        let applied = control.channel_count().and_then(|channels| {
            (0..channels).try_for_each(|ch| control.set_channel_volume(ch, level))
        });
        match applied {
            Ok(()) => tracing::trace!(level, db = self.volume.applied_db(), "stream volume applied"),
            Err(e) => tracing::warn!(level, err = %e, "failed to apply stream volume"),
        }
    }
}

struct Shared<P: SessionPlatform> {
    inner: Mutex<Inner<P>>,
    closed: Condvar,
}

impl<P: SessionPlatform> Shared<P> {
    fn lock(&self) -> MutexGuard<'_, Inner<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SessionPlayer<P: SessionPlatform> {
    platform: P,
    shared: Arc<Shared<P>>,
    tx: mpsc::Sender<Dispatch>,
    dispatcher: Option<JoinHandle<()>>,
    options: BackendOptions,
}

impl<P: SessionPlatform> SessionPlayer<P> {
    pub fn new(platform: P, options: BackendOptions) -> Result<Self, PlayerError> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner::new()),
            closed: Condvar::new(),
        });
        let (tx, rx) = mpsc::channel();
        let dispatcher = dispatch::spawn(Arc::downgrade(&shared), rx)
            .map_err(crate::error::NativeError::from)?;
        Ok(Self {
            platform,
            shared,
            tx,
            dispatcher: Some(dispatcher),
            options,
        })
    }

    /// Close the current session and wait for the platform to acknowledge.
    fn close_blocking(&self) -> Result<(), PlayerError> {
        let mut inner = self.shared.lock();
        inner.check_usable()?;
        if inner.machine.state() == PlaybackState::Closed {
            return Ok(());
        }

        if let Some(cookie) = inner.cookie.take()
            && let Some(resolver) = inner.resolver.as_ref()
        {
            tracing::debug!(generation = inner.generation, "cancelling pending open");
            if let Err(e) = resolver.cancel_object_creation(cookie) {
                tracing::debug!(err = %e, "cancel of pending open failed");
            }
        }
        inner.resolver = None;
        inner.machine.apply(Transition::Close)?;
        inner.close_acked = false;

        let requested = match inner.session.as_ref() {
            Some(session) => session.close(),
            None => Err(crate::error::NativeError::NotInitialized("session")),
        };
        match requested {
            Ok(()) => {
                let timeout = self.options.close_timeout;
                let (guard, wait) = self
                    .shared
                    .closed
                    .wait_timeout_while(inner, timeout, |i| {
                        !i.close_acked && i.machine.state() == PlaybackState::Closing
                    })
                    .unwrap_or_else(PoisonError::into_inner);
                inner = guard;
                if wait.timed_out() {
                    inner.poisoned = true;
                    tracing::error!(
                        timeout_ms = timeout.as_millis() as u64,
                        generation = inner.generation,
                        "platform never acknowledged close"
                    );
                    return Err(PlayerError::CloseTimeout(timeout));
                }
            }
            Err(e) => tracing::debug!(err = %e, "close request failed, releasing directly"),
        }

        inner.release_now();
        if inner.machine.state() == PlaybackState::Closing {
            inner.machine.apply(Transition::SessionClosed)?;
        }
        Ok(())
    }

    fn begin_open(&self, inner: &mut Inner<P>, url: &str) -> Result<(), PlayerError> {
        let relay = CompletionRelay::new(inner.generation, self.tx.clone());
        inner.relay = Some(Arc::clone(&relay));

        let session = self.platform.create_session()?;
        session.begin_get_event(relay.clone())?;
        inner.session = Some(session);

        let resolver = self.platform.create_source_resolver()?;
        let cookie = resolver.begin_create_object_from_url(url, relay)?;
        inner.resolver = Some(resolver);
        inner.cookie = Some(cookie);
        Ok(())
    }
}

impl<P: SessionPlatform> Drop for SessionPlayer<P> {
    fn drop(&mut self) {
        if let Err(e) = self.close_blocking() {
            tracing::error!(err = %e, "destroying player without a clean close");
        }
        let _ = self.tx.send(Dispatch::Quit);
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }
}

impl<P: SessionPlatform> PlayerBackend for SessionPlayer<P> {
    fn set_volume(&mut self, volume: f32) {
        let mut inner = self.shared.lock();
        inner.volume.set_master(volume);
        inner.apply_volume();
    }

    fn volume(&self) -> f32 {
        self.shared.lock().volume.master()
    }

    fn set_gain(&mut self, gain_db: f32) {
        let mut inner = self.shared.lock();
        inner.volume.set_gain_db(gain_db);
        inner.apply_volume();
    }

    fn gain(&self) -> f32 {
        self.shared.lock().volume.gain_db()
    }

    fn duration(&self) -> Duration {
        self.shared.lock().duration.unwrap_or_default()
    }

    fn time(&self) -> Duration {
        let inner = self.shared.lock();
        inner
            .clock
            .as_ref()
            .and_then(|clock| clock.time().ok())
            .unwrap_or_default()
    }

    fn open(&mut self, url: &str) -> Result<(), PlayerError> {
        if url.trim().is_empty() {
            return Err(PlayerError::EmptyUrl);
        }
        self.close_blocking()?;

        let mut inner = self.shared.lock();
        inner.machine.apply(Transition::Open)?;
        inner.generation += 1;
        tracing::info!(url, generation = inner.generation, "opening session");

        if let Err(e) = self.begin_open(&mut inner, url) {
            inner.fail_open(&e);
            return Err(e);
        }
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        let mut inner = self.shared.lock();
        inner.check_usable()?;
        let position = if inner.machine.state() == PlaybackState::Stopped {
            StartPosition::Zero
        } else {
            StartPosition::Current
        };
        inner.start_playback(Transition::Play, position)
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        let mut inner = self.shared.lock();
        inner.check_usable()?;
        let from = inner.machine.state();
        inner.machine.check(Transition::Pause)?;
        let paused = match inner.session.as_ref() {
            Some(session) => session.pause(),
            None => return Err(PlayerError::invalid("pause", from)),
        };
        if let Err(e) = paused {
            return Err(inner.fail_runtime("pause", e.into()));
        }
        inner.machine.apply(Transition::Pause)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        let mut inner = self.shared.lock();
        inner.check_usable()?;
        let from = inner.machine.state();
        inner.machine.check(Transition::Stop)?;
        let stopped = match inner.session.as_ref() {
            Some(session) => session.stop(),
            None => return Err(PlayerError::invalid("stop", from)),
        };
        if let Err(e) = stopped {
            return Err(inner.fail_runtime("stop", e.into()));
        }
        inner.machine.apply(Transition::Stop)?;
        inner.drop_controls();
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PlayerError> {
        {
            let inner = self.shared.lock();
            inner.check_usable()?;
            inner.machine.check(Transition::Finish)?;
        }
        self.close_blocking()
    }

    fn state(&self) -> PlaybackState {
        self.shared.lock().machine.state()
    }

    fn is_finished(&self) -> bool {
        matches!(
            self.state(),
            PlaybackState::Stopped | PlaybackState::Closing | PlaybackState::Closed
        )
    }
}
