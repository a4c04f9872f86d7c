//! Fetched media file exposed as a [`MediaSource`].

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tempfile::NamedTempFile;

use crate::error::NativeError;
use crate::platform::{MajorType, MediaSource, PresentationDescriptor, StreamDescriptor};

pub struct FileMediaSource {
    file: NamedTempFile,
    descriptor: PresentationDescriptor,
    shut_down: AtomicBool,
}

impl FileMediaSource {
    /// Probe `file` and take ownership of it. The file is deleted when the
    /// source is dropped.
    pub fn open(file: NamedTempFile, extension: Option<&str>) -> Result<Self, NativeError> {
        let descriptor = probe_file(file.path(), extension)?;
        tracing::debug!(
            streams = descriptor.stream_count(),
            duration_ms = descriptor.duration.map(|d| d.as_millis() as u64),
            "source opened"
        );
        Ok(Self {
            file,
            descriptor,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn descriptor(&self) -> &PresentationDescriptor {
        &self.descriptor
    }

    /// Fresh reader positioned at the start of the file.
    pub fn open_reader(&self) -> Result<BufReader<File>, NativeError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(NativeError::Shutdown);
        }
        Ok(BufReader::new(self.file.reopen()?))
    }
}

impl MediaSource for FileMediaSource {
    fn create_presentation_descriptor(&self) -> Result<PresentationDescriptor, NativeError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(NativeError::Shutdown);
        }
        Ok(self.descriptor.clone())
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
    }
}

/// Enumerate the container's tracks.
///
/// The default track is the only selected one. The duration is taken from
/// the default track's declared frame count, or measured by summing packet
/// durations when the container does not declare one.
pub fn probe_file(path: &Path, extension: Option<&str>) -> Result<PresentationDescriptor, NativeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| NativeError::UnsupportedByteStream(e.to_string()))?;
    let mut format = probed.format;

    let default = format
        .default_track()
        .map(|t| (t.id, t.codec_params.clone()));

    let streams: Vec<StreamDescriptor> = format
        .tracks()
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let params = &track.codec_params;
            let audio = params.codec != CODEC_TYPE_NULL && params.sample_rate.is_some();
            StreamDescriptor {
                index,
                selected: default.as_ref().is_some_and(|(id, _)| *id == track.id),
                major_type: if audio {
                    MajorType::Audio
                } else {
                    MajorType::Other
                },
                channels: params.channels.map(|c| c.count() as u16),
                sample_rate: params.sample_rate,
            }
        })
        .collect();

    if streams.is_empty() {
        return Err(NativeError::UnsupportedByteStream(
            "container has no tracks".to_owned(),
        ));
    }

    let duration = default.and_then(|(id, params)| {
        declared_duration(&params).or_else(|| measure_duration(format.as_mut(), id, &params))
    });

    Ok(PresentationDescriptor { streams, duration })
}

fn declared_duration(params: &CodecParameters) -> Option<Duration> {
    let frames = params.n_frames?;
    match (params.time_base, params.sample_rate) {
        (Some(tb), _) => Some(to_duration(tb.calc_time(frames))),
        (None, Some(rate)) if rate > 0 => {
            Some(Duration::from_secs_f64(frames as f64 / f64::from(rate)))
        }
        _ => None,
    }
}

fn measure_duration(
    format: &mut dyn FormatReader,
    track_id: u32,
    params: &CodecParameters,
) -> Option<Duration> {
    let time_base = params
        .time_base
        .or_else(|| {
            params
                .sample_rate
                .filter(|rate| *rate > 0)
                .map(|rate| TimeBase::new(1, rate))
        })?;

    let mut total = 0u64;
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => {
                total = total.saturating_add(packet.dur());
            }
            Ok(_) => {}
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::debug!(err = %e, "duration scan stopped early");
                break;
            }
        }
    }

    (total > 0).then(|| to_duration(time_base.calc_time(total)))
}

fn to_duration(time: Time) -> Duration {
    Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac.clamp(0.0, 1.0))
}
