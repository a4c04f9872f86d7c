//! Scripted stand-ins for both platform styles, used by adapter tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::StatusCode;

use super::graph::{FilterGraph, GraphFactory, GraphNotifier};
use super::session::{
    AsyncCallback, AsyncResult, AudioStreamVolume, MediaEvent, MediaEventKind, MediaSession,
    PresentationClock, SessionPlatform, SourceResolver, StartPosition, TopologyStatus,
};
use super::topology::{GraphPrimitives, Topology};
use super::{MediaSource, PresentationDescriptor, RendererKind, StreamDescriptor};
use crate::error::NativeError;

pub(crate) const FAKE_DURATION: Duration = Duration::from_secs(180);

pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

pub(crate) struct FakeSource {
    descriptor: Mutex<PresentationDescriptor>,
    shut_down: AtomicBool,
}

impl FakeSource {
    pub(crate) fn audio(streams: usize) -> Self {
        Self::with_streams(
            (0..streams)
                .map(|i| StreamDescriptor::audio(i, 2, 44_100))
                .collect(),
        )
    }

    pub(crate) fn with_streams(streams: Vec<StreamDescriptor>) -> Self {
        Self {
            descriptor: Mutex::new(PresentationDescriptor {
                streams,
                duration: Some(FAKE_DURATION),
            }),
            shut_down: AtomicBool::new(false),
        }
    }

    pub(crate) fn descriptor(&self) -> PresentationDescriptor {
        self.descriptor.lock().unwrap().clone()
    }

    pub(crate) fn set_duration(&self, duration: Option<Duration>) {
        self.descriptor.lock().unwrap().duration = duration;
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl MediaSource for FakeSource {
    fn create_presentation_descriptor(&self) -> Result<PresentationDescriptor, NativeError> {
        if self.is_shut_down() {
            return Err(NativeError::Shutdown);
        }
        Ok(self.descriptor())
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

fn default_streams(configured: &Mutex<Vec<StreamDescriptor>>) -> Vec<StreamDescriptor> {
    let streams = configured.lock().unwrap().clone();
    if streams.is_empty() {
        vec![StreamDescriptor::audio(0, 2, 44_100)]
    } else {
        streams
    }
}

// ---------------------------------------------------------------- graph

#[derive(Default)]
pub(crate) struct GraphProbe {
    pub created: AtomicUsize,
    pub live: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_open: AtomicBool,
    pub silent_connect: AtomicBool,
    pub fail_run: AtomicBool,
    pub streams: Mutex<Vec<StreamDescriptor>>,
    pub position: Mutex<Duration>,
    pub duration: Mutex<Option<Duration>>,
    pub volume: Mutex<Option<i32>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub notifier: Mutex<Option<GraphNotifier>>,
    pub sources: Mutex<Vec<Arc<FakeSource>>>,
}

impl GraphProbe {
    pub(crate) fn new() -> Arc<Self> {
        let probe = Self::default();
        *probe.duration.lock().unwrap() = Some(FAKE_DURATION);
        Arc::new(probe)
    }

    pub(crate) fn set_position(&self, position: Duration) {
        *self.position.lock().unwrap() = position;
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

pub(crate) struct FakeGraphFactory {
    pub probe: Arc<GraphProbe>,
}

impl GraphFactory for FakeGraphFactory {
    type Graph = FakeGraph;

    fn create_graph(&self, notifier: GraphNotifier) -> Result<FakeGraph, NativeError> {
        if self.probe.fail_create.load(Ordering::SeqCst) {
            return Err(NativeError::Unexpected("graph creation refused".to_owned()));
        }
        self.probe.created.fetch_add(1, Ordering::SeqCst);
        self.probe.live.fetch_add(1, Ordering::SeqCst);
        *self.probe.notifier.lock().unwrap() = Some(notifier);
        Ok(FakeGraph {
            probe: Arc::clone(&self.probe),
            branches: 0,
        })
    }
}

pub(crate) struct FakeGraph {
    probe: Arc<GraphProbe>,
    branches: usize,
}

impl Drop for FakeGraph {
    fn drop(&mut self) {
        self.probe.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GraphPrimitives for FakeGraph {
    type Source = FakeSource;
    type Node = usize;

    fn add_source_node(
        &mut self,
        _source: &Arc<FakeSource>,
        _presentation: &PresentationDescriptor,
        stream: &StreamDescriptor,
    ) -> Result<usize, NativeError> {
        Ok(stream.index)
    }

    fn add_output_node(&mut self, _: RendererKind, _: u32) -> Result<usize, NativeError> {
        Ok(usize::MAX)
    }

    fn connect_output(&mut self, _: usize, _: usize) -> Result<(), NativeError> {
        if !self.probe.silent_connect.load(Ordering::SeqCst) {
            self.branches += 1;
        }
        Ok(())
    }

    fn connected_branches(&self) -> usize {
        self.branches
    }
}

impl FilterGraph for FakeGraph {
    fn add_source_filter(&mut self, url: &str) -> Result<Arc<FakeSource>, NativeError> {
        self.probe.record("add_source_filter");
        if self.probe.fail_open.load(Ordering::SeqCst) {
            return Err(NativeError::HttpStatus {
                status: StatusCode::NOT_FOUND,
                url: url.to_owned(),
            });
        }
        let source = Arc::new(FakeSource::with_streams(default_streams(&self.probe.streams)));
        source.set_duration(*self.probe.duration.lock().unwrap());
        self.probe.sources.lock().unwrap().push(Arc::clone(&source));
        Ok(source)
    }

    fn run(&mut self) -> Result<(), NativeError> {
        self.probe.record("run");
        if self.probe.fail_run.load(Ordering::SeqCst) {
            return Err(NativeError::Unexpected("run refused".to_owned()));
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), NativeError> {
        self.probe.record("pause");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), NativeError> {
        self.probe.record("stop");
        Ok(())
    }

    fn rewind(&mut self) -> Result<(), NativeError> {
        self.probe.record("rewind");
        self.probe.set_position(Duration::ZERO);
        Ok(())
    }

    fn current_position(&self) -> Result<Duration, NativeError> {
        Ok(*self.probe.position.lock().unwrap())
    }

    fn duration(&self) -> Result<Duration, NativeError> {
        self.probe
            .duration
            .lock()
            .unwrap()
            .ok_or(NativeError::NotInitialized("duration"))
    }

    fn put_volume(&mut self, centibels: i32) -> Result<(), NativeError> {
        *self.probe.volume.lock().unwrap() = Some(centibels);
        Ok(())
    }
}

// -------------------------------------------------------------- session

pub(crate) struct PendingOpen {
    pub url: String,
    callback: Option<Arc<dyn AsyncCallback>>,
    pub cancelled: bool,
}

pub(crate) struct SessionProbe {
    pub sessions_created: AtomicUsize,
    pub live_sessions: AtomicUsize,
    pub arms: AtomicUsize,
    pub deliveries: AtomicUsize,
    pub cancels: AtomicUsize,
    pub volume_sets: AtomicUsize,
    pub auto_ready: AtomicBool,
    pub hang_on_close: AtomicBool,
    pub fail_begin_open: AtomicBool,
    pub fail_start: AtomicBool,
    pub streams: Mutex<Vec<StreamDescriptor>>,
    pub opens: Mutex<Vec<PendingOpen>>,
    pub topologies: Mutex<Vec<usize>>,
    pub position: Mutex<Duration>,
    pub channel_levels: Mutex<Vec<f32>>,
    pub calls: Mutex<Vec<&'static str>>,
    current: Mutex<Option<Arc<SessionCore>>>,
}

impl SessionProbe {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions_created: AtomicUsize::new(0),
            live_sessions: AtomicUsize::new(0),
            arms: AtomicUsize::new(0),
            deliveries: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            volume_sets: AtomicUsize::new(0),
            auto_ready: AtomicBool::new(true),
            hang_on_close: AtomicBool::new(false),
            fail_begin_open: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            streams: Mutex::new(Vec::new()),
            opens: Mutex::new(Vec::new()),
            topologies: Mutex::new(Vec::new()),
            position: Mutex::new(Duration::ZERO),
            channel_levels: Mutex::new(vec![1.0, 1.0]),
            calls: Mutex::new(Vec::new()),
            current: Mutex::new(None),
        })
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub(crate) fn set_position(&self, position: Duration) {
        *self.position.lock().unwrap() = position;
    }

    pub(crate) fn levels(&self) -> Vec<f32> {
        self.channel_levels.lock().unwrap().clone()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    /// Deliver the completion of open request `index`, whether or not it
    /// was cancelled.
    pub(crate) fn complete_open(&self, index: usize, result: Result<(), NativeError>) {
        let callback = {
            let mut opens = self.opens.lock().unwrap();
            opens[index].callback.take().expect("open already completed")
        };
        let streams = default_streams(&self.streams);
        let payload = result.map(|()| Arc::new(FakeSource::with_streams(streams)));
        thread::spawn(move || callback.invoke(AsyncResult::new(payload)));
    }

    pub(crate) fn complete_latest_open(&self, result: Result<(), NativeError>) {
        let last = self.open_count().checked_sub(1).expect("no open requested");
        self.complete_open(last, result);
    }

    pub(crate) fn was_cancelled(&self, index: usize) -> bool {
        self.opens.lock().unwrap()[index].cancelled
    }

    /// Raise `kind` on the most recently created session.
    pub(crate) fn raise(&self, kind: MediaEventKind) {
        let core = self.current.lock().unwrap().clone();
        if let Some(core) = core {
            core.raise(MediaEvent::ok(kind));
        }
    }

    pub(crate) fn raise_failed(&self, kind: MediaEventKind, error: &str) {
        let core = self.current.lock().unwrap().clone();
        if let Some(core) = core {
            core.raise(MediaEvent::failed(kind, error));
        }
    }
}

#[derive(Default)]
struct EventQueue {
    pending: VecDeque<MediaEvent>,
    waiter: Option<Arc<dyn AsyncCallback>>,
}

struct SessionCore {
    probe: Arc<SessionProbe>,
    events: Mutex<EventQueue>,
    shut_down: AtomicBool,
    topology_active: AtomicBool,
}

impl SessionCore {
    fn raise(&self, event: MediaEvent) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        let mut events = self.events.lock().unwrap();
        match events.waiter.take() {
            Some(callback) => self.deliver(callback, event),
            None => events.pending.push_back(event),
        }
    }

    fn deliver(&self, callback: Arc<dyn AsyncCallback>, event: MediaEvent) {
        self.probe.deliveries.fetch_add(1, Ordering::SeqCst);
        thread::spawn(move || callback.invoke(AsyncResult::new(Ok(event))));
    }
}

pub(crate) struct FakeSession {
    core: Arc<SessionCore>,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.core.probe.live_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeSession {
    fn check_alive(&self) -> Result<(), NativeError> {
        if self.core.shut_down.load(Ordering::SeqCst) {
            Err(NativeError::Shutdown)
        } else {
            Ok(())
        }
    }
}

impl MediaSession for FakeSession {
    type Source = FakeSource;
    type Clock = FakeClock;
    type Volume = FakeVolume;

    fn begin_get_event(&self, callback: Arc<dyn AsyncCallback>) -> Result<(), NativeError> {
        self.check_alive()?;
        let mut events = self.core.events.lock().unwrap();
        if events.waiter.is_some() {
            return Err(NativeError::InvalidRequest("event already requested"));
        }
        self.core.probe.arms.fetch_add(1, Ordering::SeqCst);
        match events.pending.pop_front() {
            Some(event) => self.core.deliver(callback, event),
            None => events.waiter = Some(callback),
        }
        Ok(())
    }

    fn end_get_event(&self, result: AsyncResult) -> Result<MediaEvent, NativeError> {
        result.into_value::<MediaEvent>()
    }

    fn set_topology(&self, topology: Topology<FakeSource>) -> Result<(), NativeError> {
        self.check_alive()?;
        let probe = &self.core.probe;
        probe.record("set_topology");
        probe
            .topologies
            .lock()
            .unwrap()
            .push(topology.connected_branches());
        self.core.topology_active.store(true, Ordering::SeqCst);
        self.core.raise(MediaEvent::ok(MediaEventKind::TopologySet));
        if probe.auto_ready.load(Ordering::SeqCst) {
            self.core.raise(MediaEvent::ok(MediaEventKind::TopologyStatus(
                TopologyStatus::Ready,
            )));
        }
        Ok(())
    }

    fn start(&self, position: StartPosition) -> Result<(), NativeError> {
        self.check_alive()?;
        let probe = &self.core.probe;
        if probe.fail_start.load(Ordering::SeqCst) {
            return Err(NativeError::Unexpected("start refused".to_owned()));
        }
        match position {
            StartPosition::Current => probe.record("start"),
            StartPosition::Zero => {
                probe.record("start_from_zero");
                probe.set_position(Duration::ZERO);
            }
        }
        self.core.raise(MediaEvent::ok(MediaEventKind::SessionStarted));
        Ok(())
    }

    fn pause(&self) -> Result<(), NativeError> {
        self.check_alive()?;
        self.core.probe.record("pause");
        self.core.raise(MediaEvent::ok(MediaEventKind::SessionPaused));
        Ok(())
    }

    fn stop(&self) -> Result<(), NativeError> {
        self.check_alive()?;
        self.core.probe.record("stop");
        self.core.raise(MediaEvent::ok(MediaEventKind::SessionStopped));
        Ok(())
    }

    fn close(&self) -> Result<(), NativeError> {
        self.check_alive()?;
        self.core.probe.record("close");
        self.core.topology_active.store(false, Ordering::SeqCst);
        if !self.core.probe.hang_on_close.load(Ordering::SeqCst) {
            self.core.raise(MediaEvent::ok(MediaEventKind::SessionClosed));
        }
        Ok(())
    }

    fn shutdown(&self) -> Result<(), NativeError> {
        self.core.probe.record("shutdown");
        self.core.shut_down.store(true, Ordering::SeqCst);
        let mut events = self.core.events.lock().unwrap();
        events.pending.clear();
        events.waiter = None;
        Ok(())
    }

    fn clock(&self) -> Result<FakeClock, NativeError> {
        self.check_alive()?;
        if !self.core.topology_active.load(Ordering::SeqCst) {
            return Err(NativeError::NotInitialized("clock"));
        }
        Ok(FakeClock {
            probe: Arc::clone(&self.core.probe),
        })
    }

    fn stream_volume(&self) -> Result<FakeVolume, NativeError> {
        self.check_alive()?;
        if !self.core.topology_active.load(Ordering::SeqCst) {
            return Err(NativeError::NotInitialized("stream volume"));
        }
        Ok(FakeVolume {
            probe: Arc::clone(&self.core.probe),
        })
    }
}

pub(crate) struct FakeClock {
    probe: Arc<SessionProbe>,
}

impl PresentationClock for FakeClock {
    fn time(&self) -> Result<Duration, NativeError> {
        Ok(*self.probe.position.lock().unwrap())
    }
}

pub(crate) struct FakeVolume {
    probe: Arc<SessionProbe>,
}

impl AudioStreamVolume for FakeVolume {
    fn channel_count(&self) -> Result<u32, NativeError> {
        Ok(self.probe.channel_levels.lock().unwrap().len() as u32)
    }

    fn set_channel_volume(&self, channel: u32, level: f32) -> Result<(), NativeError> {
        let mut levels = self.probe.channel_levels.lock().unwrap();
        let slot = levels
            .get_mut(channel as usize)
            .ok_or(NativeError::InvalidRequest("channel out of range"))?;
        *slot = level;
        self.probe.volume_sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct FakeResolver {
    probe: Arc<SessionProbe>,
}

impl SourceResolver for FakeResolver {
    type Source = FakeSource;
    type Cookie = usize;

    fn begin_create_object_from_url(
        &self,
        url: &str,
        callback: Arc<dyn AsyncCallback>,
    ) -> Result<usize, NativeError> {
        if self.probe.fail_begin_open.load(Ordering::SeqCst) {
            return Err(NativeError::UnsupportedByteStream(url.to_owned()));
        }
        let mut opens = self.probe.opens.lock().unwrap();
        opens.push(PendingOpen {
            url: url.to_owned(),
            callback: Some(callback),
            cancelled: false,
        });
        Ok(opens.len() - 1)
    }

    fn end_create_object_from_url(
        &self,
        result: AsyncResult,
    ) -> Result<Arc<FakeSource>, NativeError> {
        result.into_value::<Arc<FakeSource>>()
    }

    fn cancel_object_creation(&self, cookie: usize) -> Result<(), NativeError> {
        self.probe.cancels.fetch_add(1, Ordering::SeqCst);
        if let Some(open) = self.probe.opens.lock().unwrap().get_mut(cookie) {
            open.cancelled = true;
        }
        Ok(())
    }
}

pub(crate) struct FakeSessionPlatform {
    pub probe: Arc<SessionProbe>,
}

impl SessionPlatform for FakeSessionPlatform {
    type Source = FakeSource;
    type Session = FakeSession;
    type Resolver = FakeResolver;

    fn create_session(&self) -> Result<FakeSession, NativeError> {
        self.probe.sessions_created.fetch_add(1, Ordering::SeqCst);
        self.probe.live_sessions.fetch_add(1, Ordering::SeqCst);
        let core = Arc::new(SessionCore {
            probe: Arc::clone(&self.probe),
            events: Mutex::new(EventQueue::default()),
            shut_down: AtomicBool::new(false),
            topology_active: AtomicBool::new(false),
        });
        *self.probe.current.lock().unwrap() = Some(Arc::clone(&core));
        Ok(FakeSession { core })
    }

    fn create_source_resolver(&self) -> Result<FakeResolver, NativeError> {
        Ok(FakeResolver {
            probe: Arc::clone(&self.probe),
        })
    }
}
