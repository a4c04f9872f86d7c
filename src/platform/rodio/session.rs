//! Media-session style API on the local platform.
//!
//! Events are queued per session and handed to the single armed callback on
//! the work queue's blocking pool, never on the caller's thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use reqwest::Client;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::{MediaPlatform, PlatformOutput};
use super::fetch::{extension_hint, fetch_to_temp};
use super::render::{AudioRenderer, EndCallback};
use super::source::FileMediaSource;
use crate::error::NativeError;
use crate::platform::session::{
    AsyncCallback, AsyncResult, AudioStreamVolume, MediaEvent, MediaEventKind, MediaSession,
    PresentationClock, SessionPlatform, SourceResolver, StartPosition, TopologyStatus,
};
use crate::platform::topology::Topology;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct RodioSessionPlatform {
    output: PlatformOutput,
}

impl RodioSessionPlatform {
    pub fn new(platform: MediaPlatform) -> Self {
        Self::with_output(platform.output())
    }

    pub fn with_output(output: PlatformOutput) -> Self {
        Self { output }
    }
}

impl SessionPlatform for RodioSessionPlatform {
    type Source = FileMediaSource;
    type Session = RodioSession;
    type Resolver = RodioSourceResolver;

    fn create_session(&self) -> Result<RodioSession, NativeError> {
        Ok(RodioSession {
            core: Arc::new(SessionCore::new(self.output.handle().clone())),
            output: self.output.clone(),
        })
    }

    fn create_source_resolver(&self) -> Result<RodioSourceResolver, NativeError> {
        Ok(RodioSourceResolver {
            handle: self.output.handle().clone(),
            http: self.output.http().clone(),
        })
    }
}

#[derive(Default)]
struct EventQueue {
    pending: VecDeque<MediaEvent>,
    waiter: Option<Arc<dyn AsyncCallback>>,
    /// Set once `SessionClosed` was queued; nothing follows it
    closed: bool,
}

struct SessionCore {
    handle: Handle,
    events: Mutex<EventQueue>,
    renderers: Mutex<Vec<AudioRenderer>>,
    levels: Mutex<Vec<f32>>,
    pending_ends: AtomicUsize,
    rewind_on_start: AtomicBool,
    shut_down: AtomicBool,
}

impl SessionCore {
    fn new(handle: Handle) -> Self {
        Self {
            handle,
            events: Mutex::new(EventQueue::default()),
            renderers: Mutex::new(Vec::new()),
            levels: Mutex::new(Vec::new()),
            pending_ends: AtomicUsize::new(0),
            rewind_on_start: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    fn raise(&self, event: MediaEvent) {
        let mut events = lock(&self.events);
        if events.closed || self.shut_down.load(Ordering::Acquire) {
            return;
        }
        if event.kind == MediaEventKind::SessionClosed {
            events.closed = true;
        }
        match events.waiter.take() {
            Some(callback) => self.deliver(callback, event),
            None => events.pending.push_back(event),
        }
    }

    fn deliver(&self, callback: Arc<dyn AsyncCallback>, event: MediaEvent) {
        self.handle
            .spawn_blocking(move || callback.invoke(AsyncResult::new(Ok(event))));
    }

    fn renderer_ended(&self) {
        let before = self
            .pending_ends
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if before == 1 {
            self.rewind_on_start.store(true, Ordering::Release);
            self.raise(MediaEvent::ok(MediaEventKind::EndOfPresentation));
            self.raise(MediaEvent::ok(MediaEventKind::SessionEnded));
        }
    }

    fn check_alive(&self) -> Result<(), NativeError> {
        if self.shut_down.load(Ordering::Acquire) {
            Err(NativeError::Shutdown)
        } else {
            Ok(())
        }
    }

    fn applied_level(&self) -> f32 {
        let levels = lock(&self.levels);
        if levels.is_empty() {
            1.0
        } else {
            levels.iter().sum::<f32>() / levels.len() as f32
        }
    }
}

pub struct RodioSession {
    core: Arc<SessionCore>,
    /// Keeps the output and work queue alive while the session renders
    output: PlatformOutput,
}

impl RodioSession {
    fn end_callback(&self) -> EndCallback {
        let core: Weak<SessionCore> = Arc::downgrade(&self.core);
        Arc::new(move || {
            if let Some(core) = core.upgrade() {
                core.renderer_ended();
            }
        })
    }

    fn with_renderers<R>(
        &self,
        f: impl FnOnce(&mut Vec<AudioRenderer>) -> Result<R, NativeError>,
    ) -> Result<R, NativeError> {
        self.core.check_alive()?;
        let mut renderers = lock(&self.core.renderers);
        if renderers.is_empty() {
            return Err(NativeError::NotInitialized("no active topology"));
        }
        f(&mut renderers)
    }
}

impl Drop for RodioSession {
    fn drop(&mut self) {
        lock(&self.core.renderers).clear();
    }
}

impl MediaSession for RodioSession {
    type Source = FileMediaSource;
    type Clock = RodioClock;
    type Volume = RodioStreamVolume;

    fn begin_get_event(&self, callback: Arc<dyn AsyncCallback>) -> Result<(), NativeError> {
        self.core.check_alive()?;
        let mut events = lock(&self.core.events);
        if events.waiter.is_some() {
            return Err(NativeError::InvalidRequest("event already requested"));
        }
        match events.pending.pop_front() {
            Some(event) => self.core.deliver(callback, event),
            None => events.waiter = Some(callback),
        }
        Ok(())
    }

    fn end_get_event(&self, result: AsyncResult) -> Result<MediaEvent, NativeError> {
        result.into_value::<MediaEvent>()
    }

    fn set_topology(&self, topology: Topology<FileMediaSource>) -> Result<(), NativeError> {
        self.core.check_alive()?;

        let level = self.core.applied_level();
        let mut built = Vec::new();
        for (i, branch) in topology.branches().enumerate() {
            let mut renderer = AudioRenderer::new(
                self.output.mixer().clone(),
                Arc::clone(branch.source),
                i as u64,
                self.end_callback(),
            );
            renderer.set_volume(level);
            renderer.prepare()?;
            built.push(renderer);
        }
        if built.is_empty() {
            return Err(NativeError::CannotRender("topology has no branches".to_owned()));
        }

        let channels = built.first().map_or(2, AudioRenderer::channels);
        {
            let mut levels = lock(&self.core.levels);
            if levels.len() != usize::from(channels) {
                *levels = vec![level; usize::from(channels)];
            }
        }

        self.core.pending_ends.store(built.len(), Ordering::Release);
        self.core.rewind_on_start.store(false, Ordering::Release);
        *lock(&self.core.renderers) = built;

        self.core.raise(MediaEvent::ok(MediaEventKind::TopologySet));
        self.core.raise(MediaEvent::ok(MediaEventKind::TopologyStatus(
            TopologyStatus::Ready,
        )));
        Ok(())
    }

    fn start(&self, position: StartPosition) -> Result<(), NativeError> {
        let rewind =
            position == StartPosition::Zero || self.core.rewind_on_start.swap(false, Ordering::AcqRel);
        self.with_renderers(|renderers| {
            if rewind {
                for renderer in renderers.iter_mut() {
                    renderer.rewind()?;
                }
                self.core
                    .pending_ends
                    .store(renderers.len(), Ordering::Release);
            }
            // raised before the sinks run so it always precedes their end
            self.core.raise(MediaEvent::ok(MediaEventKind::SessionStarted));
            for renderer in renderers.iter() {
                renderer.play();
            }
            Ok(())
        })
    }

    fn pause(&self) -> Result<(), NativeError> {
        self.with_renderers(|renderers| {
            renderers.iter().for_each(AudioRenderer::pause);
            Ok(())
        })?;
        self.core.raise(MediaEvent::ok(MediaEventKind::SessionPaused));
        Ok(())
    }

    fn stop(&self) -> Result<(), NativeError> {
        self.with_renderers(|renderers| {
            renderers.iter().for_each(AudioRenderer::pause);
            Ok(())
        })?;
        self.core.rewind_on_start.store(true, Ordering::Release);
        self.core.raise(MediaEvent::ok(MediaEventKind::SessionStopped));
        Ok(())
    }

    fn close(&self) -> Result<(), NativeError> {
        self.core.check_alive()?;
        let renderers = std::mem::take(&mut *lock(&self.core.renderers));
        drop(renderers);
        self.core.raise(MediaEvent::ok(MediaEventKind::SessionClosed));
        Ok(())
    }

    fn shutdown(&self) -> Result<(), NativeError> {
        self.core.shut_down.store(true, Ordering::Release);
        lock(&self.core.renderers).clear();
        let mut events = lock(&self.core.events);
        events.pending.clear();
        events.waiter = None;
        Ok(())
    }

    fn clock(&self) -> Result<RodioClock, NativeError> {
        self.with_renderers(|_| Ok(()))?;
        Ok(RodioClock {
            core: Arc::clone(&self.core),
        })
    }

    fn stream_volume(&self) -> Result<RodioStreamVolume, NativeError> {
        self.with_renderers(|_| Ok(()))?;
        Ok(RodioStreamVolume {
            core: Arc::clone(&self.core),
        })
    }
}

/// Reads the first renderer's position.
pub struct RodioClock {
    core: Arc<SessionCore>,
}

impl PresentationClock for RodioClock {
    fn time(&self) -> Result<Duration, NativeError> {
        self.core.check_alive()?;
        lock(&self.core.renderers)
            .first()
            .map(AudioRenderer::position)
            .ok_or(NativeError::NotInitialized("clock stopped"))
    }
}

/// Per-channel levels folded onto each sink as their mean.
pub struct RodioStreamVolume {
    core: Arc<SessionCore>,
}

impl AudioStreamVolume for RodioStreamVolume {
    fn channel_count(&self) -> Result<u32, NativeError> {
        self.core.check_alive()?;
        Ok(lock(&self.core.levels).len() as u32)
    }

    fn set_channel_volume(&self, channel: u32, level: f32) -> Result<(), NativeError> {
        self.core.check_alive()?;
        {
            let mut levels = lock(&self.core.levels);
            let slot = levels
                .get_mut(channel as usize)
                .ok_or(NativeError::InvalidRequest("channel out of range"))?;
            *slot = level.clamp(0.0, 1.0);
        }
        let applied = self.core.applied_level();
        for renderer in lock(&self.core.renderers).iter_mut() {
            renderer.set_volume(applied);
        }
        Ok(())
    }
}

pub struct RodioSourceResolver {
    handle: Handle,
    http: Client,
}

async fn resolve(http: Client, url: String) -> Result<Arc<FileMediaSource>, NativeError> {
    let file = fetch_to_temp(&http, &url).await?;
    let ext = extension_hint(&url).map(str::to_owned);
    let source = tokio::task::spawn_blocking(move || FileMediaSource::open(file, ext.as_deref()))
        .await
        .map_err(|e| NativeError::Unexpected(e.to_string()))??;
    Ok(Arc::new(source))
}

impl SourceResolver for RodioSourceResolver {
    type Source = FileMediaSource;
    type Cookie = AbortHandle;

    fn begin_create_object_from_url(
        &self,
        url: &str,
        callback: Arc<dyn AsyncCallback>,
    ) -> Result<AbortHandle, NativeError> {
        let http = self.http.clone();
        let url = url.to_owned();
        let task = self.handle.spawn(async move {
            let result = resolve(http, url.clone()).await;
            if let Err(e) = &result {
                tracing::debug!(url, err = %e, "source resolution failed");
            }
            callback.invoke(AsyncResult::new(result));
        });
        Ok(task.abort_handle())
    }

    fn end_create_object_from_url(
        &self,
        result: AsyncResult,
    ) -> Result<Arc<FileMediaSource>, NativeError> {
        result.into_value::<Arc<FileMediaSource>>()
    }

    fn cancel_object_creation(&self, cookie: AbortHandle) -> Result<(), NativeError> {
        cookie.abort();
        Ok(())
    }
}
