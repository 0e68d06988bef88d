//! Pipeline lifecycle: owns the audio source and the recognizer session,
//! spawns the capture and decode threads, and tears everything down in a
//! fixed order.
//!
//! Ownership does the synchronization work here. At start the source moves
//! into the capture thread and the session into the decode thread; at stop
//! both come back through `JoinHandle::join`. The session therefore cannot
//! be destroyed while the decode thread might still call into it, and no
//! two threads ever share either handle.

use crate::asr::{
    run_decode_loop, DecodeContext, DecodeStats, EngineError, PartialTranscripts,
    StreamingRecognizer,
};
use crate::audio::{
    run_capture_loop, AudioError, AudioSource, CaptureContext, CaptureStats, Handoff,
};
use crate::sinks::{TranscriptSink, WaveformSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Lifecycle errors. Plain misuse (double stop, double release, start while
/// recording) is a no-op rather than an error or a panic.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("pipeline already released")]
    Released,
}

/// Whether the capture and decode threads are currently alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Stopped,
    Recording,
}

/// Orchestration knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capture chunk duration in milliseconds.
    pub chunk_ms: u64,
    /// Cadence of non-final transcript events.
    pub partials: PartialTranscripts,
    /// Consecutive no-data capture ticks tolerated before capture aborts
    /// instead of spinning on a dead device.
    pub max_failed_ticks: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_ms: 100,
            partials: PartialTranscripts::default(),
            max_failed_ticks: 50,
        }
    }
}

/// Thread counters from the most recently stopped recording.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub capture: CaptureStats,
    pub decode: DecodeStats,
}

/// Capture-to-transcript orchestrator.
///
/// Construct once with a recognizer session and an audio source, then drive
/// through [`start`](Self::start) / [`stop`](Self::stop) /
/// [`release`](Self::release). While recording, exactly one capture thread
/// and one decode thread are alive; while stopped, neither is.
pub struct SpeechPipeline {
    config: PipelineConfig,
    state: RecordingState,
    released: bool,
    source: Option<Box<dyn AudioSource>>,
    engine: Option<Box<dyn StreamingRecognizer>>,
    waveform: Arc<dyn WaveformSink>,
    transcripts: Arc<dyn TranscriptSink>,
    stop_flag: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<(Box<dyn AudioSource>, CaptureStats)>>,
    decode_thread: Option<JoinHandle<(Box<dyn StreamingRecognizer>, DecodeStats)>>,
    stats: PipelineStats,
}

impl SpeechPipeline {
    pub fn new(
        engine: Box<dyn StreamingRecognizer>,
        source: Box<dyn AudioSource>,
        waveform: Arc<dyn WaveformSink>,
        transcripts: Arc<dyn TranscriptSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            config,
            state: RecordingState::Stopped,
            released: false,
            source: Some(source),
            engine: Some(engine),
            waveform,
            transcripts,
            stop_flag: Arc::new(AtomicBool::new(false)),
            capture_thread: None,
            decode_thread: None,
            stats: PipelineStats::default(),
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Counters from the last completed recording.
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Start the audio stream and spawn the capture and decode threads.
    ///
    /// A second call while recording logs a warning and returns `Ok`;
    /// starting after [`release`](Self::release) is an error. Device
    /// failures surface here, before any thread exists.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.released {
            return Err(PipelineError::Released);
        }
        if self.state == RecordingState::Recording {
            tracing::warn!("start requested while already recording");
            return Ok(());
        }
        let Some(mut source) = self.source.take() else {
            return Err(PipelineError::Released);
        };
        if let Err(err) = source.start() {
            self.source = Some(source);
            return Err(err.into());
        }
        let Some(engine) = self.engine.take() else {
            source.stop();
            self.source = Some(source);
            return Err(PipelineError::Released);
        };

        let chunk_samples =
            (self.config.chunk_ms as usize * source.sample_rate() as usize) / 1000;
        self.stop_flag.store(false, Ordering::Relaxed);
        // Fresh slot per recording so no stale chunk survives a restart.
        let handoff = Arc::new(Handoff::new());

        let capture_ctx = CaptureContext {
            source,
            handoff: handoff.clone(),
            waveform: self.waveform.clone(),
            stop: self.stop_flag.clone(),
            chunk_samples: chunk_samples.max(1),
            max_failed_ticks: self.config.max_failed_ticks,
        };
        let capture_thread = match thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || run_capture_loop(capture_ctx))
        {
            Ok(handle) => handle,
            Err(err) => {
                // The capture context went down with the spawn failure and
                // took the source with it; drop the session to match.
                drop(engine);
                self.released = true;
                return Err(PipelineError::Audio(AudioError::Device(format!(
                    "failed to spawn capture thread: {err}"
                ))));
            }
        };

        let decode_ctx = DecodeContext {
            engine,
            handoff,
            transcripts: self.transcripts.clone(),
            stop: self.stop_flag.clone(),
            partials: self.config.partials,
        };
        let decode_thread = match thread::Builder::new()
            .name("asr-decode".into())
            .spawn(move || run_decode_loop(decode_ctx))
        {
            Ok(handle) => handle,
            Err(err) => {
                self.stop_flag.store(true, Ordering::Relaxed);
                if let Ok((source, _)) = capture_thread.join() {
                    self.source = Some(source);
                }
                // The decode context went down with the spawn failure and
                // took the session with it.
                self.released = true;
                return Err(PipelineError::Audio(AudioError::Device(format!(
                    "failed to spawn decode thread: {err}"
                ))));
            }
        };

        self.capture_thread = Some(capture_thread);
        self.decode_thread = Some(decode_thread);
        self.state = RecordingState::Recording;
        tracing::info!("recording started");
        Ok(())
    }

    /// Signal both threads to stop and wait for each to finish its current
    /// iteration. Safe to call any number of times.
    pub fn stop(&mut self) {
        if self.state != RecordingState::Recording {
            return;
        }
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.capture_thread.take() {
            match handle.join() {
                Ok((source, stats)) => {
                    self.stats.capture = stats;
                    self.source = Some(source);
                }
                Err(_) => tracing::error!("capture thread panicked"),
            }
        }
        if let Some(handle) = self.decode_thread.take() {
            match handle.join() {
                Ok((engine, stats)) => {
                    self.stats.decode = stats;
                    self.engine = Some(engine);
                }
                Err(_) => tracing::error!("decode thread panicked"),
            }
        }
        self.state = RecordingState::Stopped;
        tracing::info!(
            chunks = self.stats.capture.chunks_read,
            finals = self.stats.decode.finals_emitted,
            "recording stopped"
        );
    }

    /// Stop if recording, destroy the recognizer session, and release the
    /// audio device. Further calls are no-ops and a later
    /// [`start`](Self::start) returns [`PipelineError::Released`].
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.stop();
        // Both threads are joined, so nothing can reach the session or the
        // device from here on.
        self.engine = None;
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        self.released = true;
        tracing::info!("pipeline released");
    }
}

impl Drop for SpeechPipeline {
    fn drop(&mut self) {
        self.release();
    }
}
