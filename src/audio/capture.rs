//! Microphone capture via `cpal`.
//!
//! `cpal::Stream` is not `Send`, so [`CpalRecorder`] parks the stream on a
//! dedicated OS thread for the lifetime of one recording.  The async side
//! waits on the stop signal, the cancellation token, or the max-duration
//! ceiling, then releases the capture thread and collects the samples.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio_util::sync::CancellationToken;

use crate::config::AudioSettings;

use super::{AudioError, AudioRecorder, Recording};

// ---------------------------------------------------------------------------
// CpalRecorder
// ---------------------------------------------------------------------------

/// Records mono 16-bit PCM from a cpal input device.
///
/// Recordings shorter than the configured floor are rejected with
/// [`AudioError::TooShort`]; recordings hitting the ceiling are cancelled,
/// matching an abort.
pub struct CpalRecorder {
    device_name: Option<String>,
    min: Duration,
    max: Duration,
}

impl CpalRecorder {
    pub fn new(device_name: Option<String>, min: Duration, max: Duration) -> Self {
        Self {
            device_name,
            min,
            max,
        }
    }

    pub fn from_config(config: &AudioSettings) -> Self {
        Self::new(
            config.device.clone(),
            Duration::from_secs_f32(config.min_record_secs),
            Duration::from_secs_f32(config.max_record_secs),
        )
    }
}

#[async_trait]
impl AudioRecorder for CpalRecorder {
    async fn record(
        &self,
        cancel: CancellationToken,
        stop: CancellationToken,
    ) -> Result<Recording, AudioError> {
        let started = Instant::now();

        // The capture thread blocks on `finish_rx.recv()`; dropping
        // `finish_tx` releases it and stops the stream.
        let (finish_tx, finish_rx) = std::sync::mpsc::channel::<()>();
        let (out_tx, out_rx) = tokio::sync::oneshot::channel();
        let device_name = self.device_name.clone();

        std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let _ = out_tx.send(capture_until_released(device_name.as_deref(), finish_rx));
            })
            .map_err(|e| AudioError::Device(e.to_string()))?;

        log::info!("audio: recording, waiting for stop signal");
        let outcome = tokio::select! {
            _ = stop.cancelled() => {
                log::info!("audio: recording finished");
                Ok(())
            }
            _ = cancel.cancelled() => Err(AudioError::Cancelled),
            _ = tokio::time::sleep(self.max) => {
                log::warn!("audio: max recording duration reached");
                Err(AudioError::Cancelled)
            }
        };

        drop(finish_tx);
        let recording = out_rx
            .await
            .map_err(|_| AudioError::Device("capture thread exited unexpectedly".into()))??;
        outcome?;

        let elapsed = started.elapsed();
        if elapsed < self.min {
            return Err(AudioError::TooShort {
                actual_secs: elapsed.as_secs_f32(),
                min_secs: self.min.as_secs_f32(),
            });
        }

        Ok(recording)
    }
}

// ---------------------------------------------------------------------------
// Capture thread body
// ---------------------------------------------------------------------------

/// Open the input device, stream samples into a shared buffer until the
/// `finish` channel's sender is dropped, then hand the buffer back.
fn capture_until_released(
    device_name: Option<&str>,
    finish: std::sync::mpsc::Receiver<()>,
) -> Result<Recording, AudioError> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| AudioError::Device(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::Device(format!("input device '{name}' not found")))?,
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::Device("no default input device".into()))?,
    };

    let config = device
        .default_input_config()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.into();

    log::debug!(
        "audio: capturing from {:?} at {} Hz, {} ch, {:?}",
        device.name().unwrap_or_else(|_| "<unnamed>".into()),
        sample_rate,
        channels,
        format
    );

    let samples = Arc::new(Mutex::new(Vec::<i16>::new()));

    let stream = match format {
        cpal::SampleFormat::F32 => {
            let sink = Arc::clone(&samples);
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _| push_frames_f32(&sink, data, channels),
                log_stream_error,
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let sink = Arc::clone(&samples);
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _| push_frames_i16(&sink, data, channels),
                log_stream_error,
                None,
            )
        }
        other => {
            return Err(AudioError::Device(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    }
    .map_err(|e| AudioError::Device(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::Device(e.to_string()))?;

    // Blocks until the recording side drops its sender.
    let _ = finish.recv();
    drop(stream);

    let samples = std::mem::take(&mut *samples.lock().unwrap());
    Ok(Recording {
        samples,
        sample_rate,
    })
}

fn log_stream_error(e: cpal::StreamError) {
    log::error!("audio: stream error: {e}");
}

/// Downmix interleaved f32 frames to mono i16.
fn push_frames_f32(sink: &Mutex<Vec<i16>>, data: &[f32], channels: usize) {
    let mut out = sink.lock().unwrap();
    for frame in data.chunks(channels.max(1)) {
        let avg = frame.iter().sum::<f32>() / frame.len() as f32;
        out.push((avg.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
    }
}

/// Downmix interleaved i16 frames to mono.
fn push_frames_i16(sink: &Mutex<Vec<i16>>, data: &[i16], channels: usize) {
    let mut out = sink.lock().unwrap();
    for frame in data.chunks(channels.max(1)) {
        let sum: i32 = frame.iter().map(|&s| s as i32).sum();
        out.push((sum / frame.len() as i32) as i16);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
