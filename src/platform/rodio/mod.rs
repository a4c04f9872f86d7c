//! Local media platform on rodio, symphonia and reqwest.
//!
//! One process-wide instance owns the audio output thread, the async work
//! queue and the HTTP client. Every backend constructed in the process shares
//! it; it is torn down when the last [`MediaPlatform`] handle is dropped.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use reqwest::Client;
use rodio::OutputStreamBuilder;
use rodio::mixer::Mixer;
use tokio::runtime::{Handle, Runtime};

use crate::error::NativeError;

pub mod fetch;
pub mod graph;
pub mod render;
pub mod session;
pub mod source;

pub use graph::{RodioFilterGraph, RodioGraphFactory};
pub use session::{RodioSession, RodioSessionPlatform, RodioSourceResolver};
pub use source::FileMediaSource;

static PLATFORM: Mutex<Weak<PlatformInner>> = Mutex::new(Weak::new());

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub http_timeout: Duration,
    pub http_connect_timeout: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(30),
            http_connect_timeout: Duration::from_secs(10),
        }
    }
}

struct OutputThread {
    quit: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

struct PlatformInner {
    runtime: Option<Runtime>,
    handle: Handle,
    output: Option<OutputThread>,
    mixer: Mixer,
    http: Client,
}

impl Drop for PlatformInner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        if let Some(output) = self.output.take() {
            let _ = output.quit.send(());
            let _ = output.handle.join();
        }
        tracing::info!("media platform shut down");
    }
}

/// Shared handle to the started platform.
#[derive(Clone)]
pub struct MediaPlatform {
    inner: Arc<PlatformInner>,
}

impl MediaPlatform {
    /// Start the platform, or join the one already running in this process.
    ///
    /// `config` only takes effect for the call that actually starts it.
    pub fn startup(config: &PlatformConfig) -> Result<Self, NativeError> {
        let mut slot = PLATFORM.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(inner) = slot.upgrade() {
            return Ok(Self { inner });
        }

        let http = Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(config.http_connect_timeout)
            .build()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("barplayer-queue")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        let (output, mixer) = spawn_output()?;

        let inner = Arc::new(PlatformInner {
            runtime: Some(runtime),
            handle,
            output: Some(output),
            mixer,
            http,
        });
        *slot = Arc::downgrade(&inner);
        tracing::info!(
            timeout_secs = config.http_timeout.as_secs(),
            connect_timeout_secs = config.http_connect_timeout.as_secs(),
            "media platform started"
        );
        Ok(Self { inner })
    }

    /// Whether a platform instance is alive in this process.
    pub fn is_running() -> bool {
        PLATFORM
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .strong_count()
            > 0
    }

    /// Output, work queue and HTTP client of this instance.
    pub fn output(&self) -> PlatformOutput {
        PlatformOutput {
            handle: self.inner.handle.clone(),
            mixer: self.inner.mixer.clone(),
            http: self.inner.http.clone(),
            _platform: Some(self.clone()),
        }
    }
}

/// What the session and graph layers render and fetch with.
///
/// Built from a running [`MediaPlatform`], or from parts the caller owns, in
/// which case the caller keeps the runtime alive and drains the mixer.
#[derive(Clone)]
pub struct PlatformOutput {
    handle: Handle,
    mixer: Mixer,
    http: Client,
    _platform: Option<MediaPlatform>,
}

impl PlatformOutput {
    pub fn from_parts(handle: Handle, mixer: Mixer, http: Client) -> Self {
        Self {
            handle,
            mixer,
            http,
            _platform: None,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn http(&self) -> &Client {
        &self.http
    }
}

/// `OutputStream` must stay on the thread that opened it; only its mixer
/// leaves.
fn spawn_output() -> Result<(OutputThread, Mixer), NativeError> {
    let (ready_tx, ready_rx) = mpsc::channel::<Result<Mixer, NativeError>>();
    let (quit_tx, quit_rx) = mpsc::channel::<()>();

    let handle = thread::Builder::new()
        .name("barplayer-output".to_owned())
        .spawn(move || {
            let stream = match OutputStreamBuilder::open_default_stream() {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(err = %e, "failed to open audio output");
                    let _ = ready_tx.send(Err(NativeError::Output(e.to_string())));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(stream.mixer().clone()));
            // returns on quit or when the platform is gone
            let _ = quit_rx.recv();
            drop(stream);
        })?;

    match ready_rx.recv() {
        Ok(Ok(mixer)) => Ok((
            OutputThread {
                quit: quit_tx,
                handle,
            },
            mixer,
        )),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            let _ = handle.join();
            Err(NativeError::Output("audio output thread exited".to_owned()))
        }
    }
}
