//! Playback sequencer.
//!
//! Decoded audio chunks are appended to one FIFO sample queue and drained by
//! the output device's own callback, so each chunk starts exactly when the
//! previous one ends with no wall-clock timers involved. `clear` drops queued
//! samples and silences the in-flight chunk immediately; underrun plays
//! silence rather than blocking the device.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc::{Sender, channel};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{debug, error};

use super::{AudioError, SAMPLE_RATE};

/// Seam between the session controller and the audio output. Production uses
/// [`CpalPlayer`]; tests enqueue into a bare [`SampleQueue`].
pub trait AudioSink: Send + Sync {
    /// Append one decoded chunk behind everything already queued.
    fn enqueue(&self, samples: &[i16]);

    /// Drop all queued audio and silence the in-flight chunk.
    fn clear(&self);
}

/// FIFO of interleaved PCM16 samples at the wire rate.
#[derive(Debug, Default)]
pub struct SampleQueue {
    samples: Mutex<VecDeque<i16>>,
}

impl SampleQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Samples queued but not yet played.
    pub fn queued_samples(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Remove and return up to `max` samples from the front.
    pub fn pop_chunk(&self, max: usize) -> Vec<i16> {
        let mut queue = self.samples.lock();
        let take = max.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Fill one interleaved output buffer from the queue, converting to f32
    /// and linearly interpolating from the wire rate to the device rate
    /// (`rate_step` = wire rate / device rate). The queue advances by the
    /// number of source samples the buffer consumed; an empty queue yields
    /// silence.
    pub fn fill_output(&self, out: &mut [f32], channels: usize, rate_step: f32) {
        let mut queue = self.samples.lock();
        let frames = out.len() / channels;
        let consumed = (frames as f32 * rate_step).ceil() as usize;

        let mut pos: f32 = 0.0;
        for frame in out.chunks_mut(channels) {
            let value = if queue.is_empty() {
                0.0
            } else {
                let base = pos.floor() as usize;
                let fract = pos.fract();
                let s0 = queue.get(base).copied().unwrap_or(0) as f32 / i16::MAX as f32;
                let s1 = queue.get(base + 1).copied().unwrap_or(0) as f32 / i16::MAX as f32;
                s0 * (1.0 - fract) + s1 * fract
            };
            for channel in frame.iter_mut() {
                *channel = value;
            }
            pos += rate_step;
        }

        if consumed <= queue.len() {
            queue.drain(..consumed);
        } else {
            queue.clear();
        }
    }
}

impl AudioSink for SampleQueue {
    fn enqueue(&self, samples: &[i16]) {
        self.samples.lock().extend(samples.iter().copied());
    }

    fn clear(&self) {
        self.samples.lock().clear();
    }
}

/// Speaker output backed by a cpal stream.
///
/// The cpal stream is not `Send`, so a dedicated thread owns it for the
/// player's lifetime; the device callback drains the shared [`SampleQueue`].
pub struct CpalPlayer {
    queue: Arc<SampleQueue>,
    // Mutex-wrapped because std channel senders are not Sync and the sink is
    // shared behind an Arc.
    stop_tx: Mutex<Sender<()>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalPlayer {
    pub fn new() -> Result<Self, AudioError> {
        let queue = SampleQueue::new();
        let callback_queue = Arc::clone(&queue);
        let (stop_tx, stop_rx) = channel::<()>();
        let (ready_tx, ready_rx) = channel::<Result<(), AudioError>>();

        let thread = thread::spawn(move || {
            let host = cpal::default_host();
            let Some(device) = host.default_output_device() else {
                let _ = ready_tx.send(Err(AudioError::Device(
                    "no default output device".to_string(),
                )));
                return;
            };
            debug!(device = ?device.name(), "opening playback device");

            let supported = match device.default_output_config() {
                Ok(config) => config,
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::Device(e.to_string())));
                    return;
                }
            };
            let channels = supported.channels() as usize;
            let rate_step = SAMPLE_RATE as f32 / supported.sample_rate().0 as f32;

            let stream = match device.build_output_stream(
                &supported.config(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_queue.fill_output(data, channels, rate_step);
                },
                |err| error!("playback stream error: {err}"),
                None,
            ) {
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

            // Park until the player is dropped; the stream dies with this
            // thread.
            let _ = stop_rx.recv();
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                queue,
                stop_tx: Mutex::new(stop_tx),
                thread: Mutex::new(Some(thread)),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::Device("playback thread died".to_string())),
        }
    }
}

impl AudioSink for CpalPlayer {
    fn enqueue(&self, samples: &[i16]) {
        self.queue.enqueue(samples);
    }

    fn clear(&self) {
        self.queue.clear();
    }
}

impl Drop for CpalPlayer {
    fn drop(&mut self) {
        let _ = self.stop_tx.lock().send(());
        if let Some(thread) = self.thread.lock().take()
            && thread.join().is_err()
        {
            error!("failed to join playback thread");
        }
    }
}
