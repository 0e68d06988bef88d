//! Delivery of pipeline output to the presentation side.
//!
//! The pipeline never touches presentation state; it posts payloads through
//! these traits from the capture and decode threads. The channel-backed
//! implementations let a UI or display loop drain events at its own pace
//! while the pipeline stays non-blocking: waveform frames are dropped when
//! the consumer lags, transcripts are never dropped.

use crate::asr::TranscriptEvent;
use crate::audio::{rms_db, LiveMeter};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Receives raw capture buffers, sized to the count actually read.
pub trait WaveformSink: Send + Sync {
    fn on_waveform(&self, samples: &[i16]);
}

/// Receives transcript updates from the decode thread.
pub trait TranscriptSink: Send + Sync {
    fn on_transcript(&self, event: TranscriptEvent);
}

/// Waveform sink posting frame copies to a bounded channel.
pub struct ChannelWaveformSink {
    tx: Sender<Vec<i16>>,
    dropped: Arc<AtomicUsize>,
}

impl ChannelWaveformSink {
    /// Frames discarded because the receiver lagged.
    pub fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a channel-backed waveform sink plus its receiving end.
pub fn waveform_channel(capacity: usize) -> (ChannelWaveformSink, Receiver<Vec<i16>>) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        ChannelWaveformSink {
            tx,
            dropped: Arc::new(AtomicUsize::new(0)),
        },
        rx,
    )
}

impl WaveformSink for ChannelWaveformSink {
    fn on_waveform(&self, samples: &[i16]) {
        match self.tx.try_send(samples.to_vec()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Transcript sink posting events to an unbounded channel. Transcript events
/// are small and rare compared to audio, so nothing is ever discarded.
pub struct ChannelTranscriptSink {
    tx: Sender<TranscriptEvent>,
}

/// Create a channel-backed transcript sink plus its receiving end.
pub fn transcript_channel() -> (ChannelTranscriptSink, Receiver<TranscriptEvent>) {
    let (tx, rx) = unbounded();
    (ChannelTranscriptSink { tx }, rx)
}

impl TranscriptSink for ChannelTranscriptSink {
    fn on_transcript(&self, event: TranscriptEvent) {
        let _ = self.tx.send(event);
    }
}

/// Waveform sink folding each frame into a shared live level meter.
pub struct MeterSink {
    meter: LiveMeter,
}

impl MeterSink {
    pub fn new(meter: LiveMeter) -> Self {
        Self { meter }
    }
}

impl WaveformSink for MeterSink {
    fn on_waveform(&self, samples: &[i16]) {
        self.meter.set_db(rms_db(samples));
    }
}
