use rodio::mixer::Mixer;
use rodio::{Decoder, Sink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use super::source::FileMediaSource;
use crate::error::NativeError;

/// Called once when a sink plays out naturally; never on teardown or rewind.
pub type EndCallback = Arc<dyn Fn() + Send + Sync>;

struct ActiveSink {
    sink: Arc<Sink>,
    end_cancel: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
}

/// One source stream rendered on the shared mixer.
pub struct AudioRenderer {
    mixer: Mixer,
    source: Arc<FileMediaSource>,
    duration: Option<Duration>,
    on_end: EndCallback,
    current: Option<ActiveSink>,
    volume: f32,
    label: u64,
}

impl AudioRenderer {
    pub fn new(
        mixer: Mixer,
        source: Arc<FileMediaSource>,
        label: u64,
        on_end: EndCallback,
    ) -> Self {
        let duration = source.descriptor().duration;
        Self {
            mixer,
            source,
            duration,
            on_end,
            current: None,
            volume: 1.0,
            label,
        }
    }

    pub fn channels(&self) -> u16 {
        self.source
            .descriptor()
            .streams
            .iter()
            .find(|s| s.selected)
            .and_then(|s| s.channels)
            .unwrap_or(2)
    }

    /// Build a paused sink at time zero, replacing any previous one.
    pub fn prepare(&mut self) -> Result<(), NativeError> {
        self.stop_current();

        let reader = self.source.open_reader()?;
        let decoder = Decoder::new(reader).map_err(|e| NativeError::Decoder(e.to_string()))?;

        let sink = Arc::new(Sink::connect_new(&self.mixer));
        sink.pause();
        sink.set_volume(self.volume);
        sink.append(decoder);

        self.attach(sink)
    }

    /// Restart at time zero, keeping the paused/playing state.
    pub fn rewind(&mut self) -> Result<(), NativeError> {
        let playing = self.current.as_ref().is_some_and(|c| !c.sink.is_paused());
        self.prepare()?;
        if playing {
            self.play();
        }
        Ok(())
    }

    pub fn play(&self) {
        if let Some(cur) = self.current.as_ref() {
            cur.sink.play();
        }
    }

    pub fn pause(&self) {
        if let Some(cur) = self.current.as_ref() {
            cur.sink.pause();
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(cur) = self.current.as_ref() {
            cur.sink.set_volume(self.volume);
        }
    }

    /// Playback position; reads as the full duration once the sink ended.
    pub fn position(&self) -> Duration {
        match self.current.as_ref() {
            Some(cur) if cur.ended.load(Ordering::Acquire) => {
                self.duration.unwrap_or_else(|| cur.sink.get_pos())
            }
            Some(cur) => cur.sink.get_pos(),
            None => Duration::ZERO,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn stop_current(&mut self) {
        if let Some(cur) = self.current.take() {
            tracing::trace!(renderer = self.label, "stopping sink, cancelling end watch");
            cur.end_cancel.store(true, Ordering::Release);
            cur.sink.stop();
        }
    }

    fn attach(&mut self, sink: Arc<Sink>) -> Result<(), NativeError> {
        let label = self.label;
        let cancel = Arc::new(AtomicBool::new(false));
        let ended = Arc::new(AtomicBool::new(false));
        let sink_end = Arc::clone(&sink);
        let cancel_end = Arc::clone(&cancel);
        let ended_end = Arc::clone(&ended);
        let on_end = Arc::clone(&self.on_end);

        thread::Builder::new()
            .name(format!("barplayer-end-{label}"))
            .spawn(move || {
                sink_end.sleep_until_end();
                if cancel_end.load(Ordering::Acquire) {
                    tracing::trace!(renderer = label, "end watch cancelled");
                    return;
                }
                ended_end.store(true, Ordering::Release);
                tracing::debug!(renderer = label, "renderer reached end of stream");
                on_end();
            })?;

        self.current = Some(ActiveSink {
            sink,
            end_cancel: cancel,
            ended,
        });
        Ok(())
    }
}

impl Drop for AudioRenderer {
    fn drop(&mut self) {
        self.stop_current();
    }
}

/// Linear level for an attenuation in hundredths of a decibel.
pub fn centibels_to_linear(centibels: i32) -> f32 {
    if centibels <= -10_000 {
        0.0
    } else {
        10f32.powf(centibels.min(0) as f32 / 2000.0)
    }
}
