//! Microphone capture.
//!
//! Produces mono PCM16 frames at the wire rate from the default input device,
//! pushing them to a caller-supplied handler from the capture thread. The
//! handler must never block (the session controller's ingest path is
//! lock-free for exactly this reason). Hardware that cannot run mono/24 kHz
//! natively is converted here: channel 0 is extracted and the rate is
//! linearly interpolated.

use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig};
use tracing::{debug, error, warn};

use super::{AudioError, SAMPLE_RATE};

/// Emitted frame length in samples (100 ms at the wire rate).
pub const CAPTURE_FRAME_SAMPLES: usize = (SAMPLE_RATE as usize) / 10;

/// Live microphone capture. Dropping (or calling [`CpalCapture::stop`])
/// releases the device; no frame is delivered after the capture thread ends.
pub struct CpalCapture {
    stop_tx: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CpalCapture {
    /// Open the default input device and start pushing frames to `handler`.
    ///
    /// Device problems surface here as [`AudioError::Device`] /
    /// [`AudioError::Stream`] (a capture-unavailable condition); the playback
    /// path is unaffected.
    pub fn start<F>(handler: F) -> Result<Self, AudioError>
    where
        F: Fn(Vec<i16>) + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::<()>();
        let (ready_tx, ready_rx) = channel::<Result<(), AudioError>>();

        let thread = thread::spawn(move || {
            run_capture_thread(handler, stop_rx, ready_tx);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop_tx,
                thread: Some(thread),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::Device("capture thread died".to_string())),
        }
    }

    /// Stop capturing and release the device.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("failed to join capture thread");
        }
    }
}

fn run_capture_thread<F>(handler: F, stop_rx: Receiver<()>, ready_tx: Sender<Result<(), AudioError>>)
where
    F: Fn(Vec<i16>) + Send + 'static,
{
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        let _ = ready_tx.send(Err(AudioError::Device(
            "no default input device".to_string(),
        )));
        return;
    };
    debug!(device = ?device.name(), "opening capture device");

    let supported = match select_input_config(&device) {
        Ok(config) => config,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let device_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let sample_format = supported.sample_format();
    debug!(device_rate, channels, ?sample_format, "capture config selected");

    // Accumulates mono samples at the device rate; drained in ~100 ms slices
    // that are resampled to the wire rate before they reach the handler.
    let device_frame = (device_rate as usize) / 10;
    let mut pending: Vec<i16> = Vec::with_capacity(device_frame * 2);
    let mut deliver = move |mono: &[i16]| {
        pending.extend_from_slice(mono);
        while pending.len() >= device_frame {
            let slice: Vec<i16> = pending.drain(..device_frame).collect();
            let frame = resample_linear(&slice, device_rate, SAMPLE_RATE);
            handler(frame);
        }
    };

    let err_fn = |err| error!("capture stream error: {err}");
    let config = supported.config();

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let mono: Vec<i16> = data.chunks(channels).map(|f| f[0]).collect();
                deliver(&mono);
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let mono: Vec<i16> = data
                    .chunks(channels)
                    .map(|f| (f[0] as i32 - 32_768) as i16)
                    .collect();
                deliver(&mono);
            },
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono: Vec<i16> = data
                    .chunks(channels)
                    .map(|f| (f[0].clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .collect();
                deliver(&mono);
            },
            err_fn,
            None,
        ),
        other => {
            let _ = ready_tx.send(Err(AudioError::Device(format!(
                "unsupported sample format: {other:?}"
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::Stream(e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioError::Stream(e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Park until stopped; the stream dies with this thread.
    let _ = stop_rx.recv();
    debug!("capture thread exiting");
}

/// Prefer a native mono/24 kHz i16 config, falling back to the device default.
fn select_input_config(device: &cpal::Device) -> Result<SupportedStreamConfig, AudioError> {
    if let Ok(ranges) = device.supported_input_configs() {
        for range in ranges {
            if range.channels() == 1
                && range.sample_format() == SampleFormat::I16
                && range.min_sample_rate().0 <= SAMPLE_RATE
                && range.max_sample_rate().0 >= SAMPLE_RATE
            {
                return Ok(range.with_sample_rate(cpal::SampleRate(SAMPLE_RATE)));
            }
        }
    }
    warn!("no native mono 24 kHz i16 input config, falling back to device default");
    device
        .default_input_config()
        .map_err(|e| AudioError::Device(e.to_string()))
}

/// Linear-interpolation resample. Identity when the rates already match.
fn resample_linear(input: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }
    let out_len = (input.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f32 / to_rate as f32;
    (0..out_len)
        .map(|i| {
            let pos = i as f32 * step;
            let base = pos.floor() as usize;
            let fract = pos.fract();
            let s0 = input.get(base).copied().unwrap_or(0) as f32;
            let s1 = input.get(base + 1).copied().unwrap_or(0) as f32;
            (s0 * (1.0 - fract) + s1 * fract) as i16
        })
        .collect()
}
