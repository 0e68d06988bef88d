//! Decode thread: drives the recognizer's incremental decode loop and turns
//! endpoints into transcript events.
//!
//! The recognizer session is touched by this thread only. Each iteration
//! waits on the handoff slot (bounded wait, no spinning), feeds the chunk to
//! the engine, drains every pending decode step, and checks for an
//! utterance endpoint.

use super::{StreamingRecognizer, TranscriptEvent};
use crate::audio::{AudioChunk, Handoff};
use crate::sinks::TranscriptSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on one handoff wait; the stop flag is re-checked after each.
const HANDOFF_WAIT: Duration = Duration::from_millis(50);

/// When to surface non-final transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialTranscripts {
    /// Finals only.
    Disabled,
    /// A partial after every decode drain whose text changed.
    EveryDrain,
    /// Partials at most once per interval.
    Throttled { min_interval: Duration },
}

impl Default for PartialTranscripts {
    fn default() -> Self {
        PartialTranscripts::EveryDrain
    }
}

/// Counters collected by the decode thread, recovered at stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub chunks_consumed: u64,
    pub decode_steps: u64,
    pub endpoints: u64,
    pub finals_emitted: u64,
    pub partials_emitted: u64,
}

pub(crate) struct DecodeContext {
    pub engine: Box<dyn StreamingRecognizer>,
    pub handoff: Arc<Handoff<AudioChunk>>,
    pub transcripts: Arc<dyn TranscriptSink>,
    pub stop: Arc<AtomicBool>,
    pub partials: PartialTranscripts,
}

/// Body of the decode thread. Returns the engine session so the controller
/// can destroy it only after this thread is gone.
pub(crate) fn run_decode_loop(
    mut ctx: DecodeContext,
) -> (Box<dyn StreamingRecognizer>, DecodeStats) {
    let mut stats = DecodeStats::default();
    let mut last_partial_at: Option<Instant> = None;
    let mut last_partial = String::new();

    while !ctx.stop.load(Ordering::Relaxed) {
        let Some(chunk) = ctx.handoff.take_timeout(HANDOFF_WAIT) else {
            continue;
        };
        stats.chunks_consumed += 1;
        ctx.engine.accept_waveform(&chunk.samples, chunk.sample_rate);
        while ctx.engine.is_ready() {
            ctx.engine.decode();
            stats.decode_steps += 1;
        }
        if ctx.engine.is_endpoint() {
            stats.endpoints += 1;
            // Text must come out before reset clears the utterance.
            let text = ctx.engine.text();
            if !text.is_empty() {
                stats.finals_emitted += 1;
                tracing::debug!(%text, "utterance endpoint");
                ctx.transcripts.on_transcript(TranscriptEvent {
                    text,
                    is_final: true,
                });
            }
            ctx.engine.reset();
            last_partial_at = None;
            last_partial.clear();
        } else if should_emit_partial(ctx.partials, last_partial_at) {
            let text = ctx.engine.text();
            if !text.is_empty() && text != last_partial {
                stats.partials_emitted += 1;
                last_partial_at = Some(Instant::now());
                last_partial.clone_from(&text);
                ctx.transcripts.on_transcript(TranscriptEvent {
                    text,
                    is_final: false,
                });
            }
        }
    }

    (ctx.engine, stats)
}

fn should_emit_partial(policy: PartialTranscripts, last: Option<Instant>) -> bool {
    match policy {
        PartialTranscripts::Disabled => false,
        PartialTranscripts::EveryDrain => true,
        PartialTranscripts::Throttled { min_interval } => {
            last.map_or(true, |at| at.elapsed() >= min_interval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::transcript_channel;
    use std::sync::Mutex;
    use std::thread;

    /// Scripted engine that records every call so tests can assert ordering.
    struct StubEngine {
        calls: Arc<Mutex<Vec<String>>>,
        chunks: usize,
        /// Report an endpoint every N accepted chunks; 0 = never.
        endpoint_every: usize,
        final_text: String,
        partial_text: fn(usize) -> String,
        ready_steps_per_chunk: usize,
        pending_steps: usize,
    }

    impl StubEngine {
        fn new(endpoint_every: usize, final_text: &str) -> (Self, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let engine = Self {
                calls: calls.clone(),
                chunks: 0,
                endpoint_every,
                final_text: final_text.to_string(),
                partial_text: |_| String::new(),
                ready_steps_per_chunk: 1,
                pending_steps: 0,
            };
            (engine, calls)
        }

        fn at_endpoint(&self) -> bool {
            self.endpoint_every > 0 && self.chunks > 0 && self.chunks % self.endpoint_every == 0
        }

        fn record(&self, call: &str) {
            self.calls.lock().expect("call log lock").push(call.to_string());
        }
    }

    impl StreamingRecognizer for StubEngine {
        fn accept_waveform(&mut self, _samples: &[f32], _sample_rate: u32) {
            self.chunks += 1;
            self.pending_steps = self.ready_steps_per_chunk;
            self.record("accept");
        }

        fn is_ready(&mut self) -> bool {
            self.pending_steps > 0
        }

        fn decode(&mut self) {
            self.pending_steps = self.pending_steps.saturating_sub(1);
            self.record("decode");
        }

        fn is_endpoint(&mut self) -> bool {
            self.at_endpoint()
        }

        fn text(&mut self) -> String {
            self.record("text");
            if self.at_endpoint() {
                self.final_text.clone()
            } else {
                (self.partial_text)(self.chunks)
            }
        }

        fn reset(&mut self) {
            self.record("reset");
        }
    }

    fn chunk(len: usize) -> AudioChunk {
        AudioChunk {
            samples: vec![0.0; len],
            sample_rate: 16_000,
        }
    }

    /// Run the decode loop on a worker thread, pacing chunks so the lossy
    /// slot delivers every one of them.
    fn drive(
        engine: StubEngine,
        chunks: usize,
        partials: PartialTranscripts,
    ) -> (DecodeStats, Vec<TranscriptEvent>) {
        let handoff = Arc::new(Handoff::new());
        let stop = Arc::new(AtomicBool::new(false));
        let (sink, events_rx) = transcript_channel();
        let ctx = DecodeContext {
            engine: Box::new(engine),
            handoff: handoff.clone(),
            transcripts: Arc::new(sink),
            stop: stop.clone(),
            partials,
        };
        let worker = thread::spawn(move || run_decode_loop(ctx));
        for _ in 0..chunks {
            handoff.publish(chunk(1_600));
            thread::sleep(Duration::from_millis(20));
        }
        stop.store(true, Ordering::Relaxed);
        let (_engine, stats) = worker.join().expect("decode thread");
        (stats, events_rx.try_iter().collect())
    }

    #[test]
    fn emits_one_final_per_endpoint() {
        let (engine, _calls) = StubEngine::new(3, "hello");
        let (stats, events) = drive(engine, 6, PartialTranscripts::Disabled);
        assert_eq!(stats.chunks_consumed, 6);
        assert_eq!(stats.endpoints, 2);
        assert_eq!(stats.finals_emitted, 2);
        assert_eq!(events.len(), 2);
        for event in &events {
            assert!(event.is_final);
            assert_eq!(event.text, "hello");
        }
    }

    #[test]
    fn no_events_without_endpoint_or_text() {
        let (engine, _calls) = StubEngine::new(0, "");
        let (stats, events) = drive(engine, 5, PartialTranscripts::EveryDrain);
        assert_eq!(stats.chunks_consumed, 5);
        assert_eq!(stats.endpoints, 0);
        assert_eq!(stats.finals_emitted, 0);
        assert_eq!(stats.partials_emitted, 0);
        assert!(events.is_empty());
    }

    #[test]
    fn empty_endpoint_text_suppresses_final_but_still_resets() {
        let (engine, calls) = StubEngine::new(1, "");
        let (stats, events) = drive(engine, 3, PartialTranscripts::Disabled);
        assert_eq!(stats.endpoints, 3);
        assert_eq!(stats.finals_emitted, 0);
        assert!(events.is_empty());
        let calls = calls.lock().expect("call log lock");
        assert_eq!(calls.iter().filter(|call| *call == "reset").count(), 3);
    }

    #[test]
    fn text_is_read_before_reset_and_reset_precedes_next_accept() {
        let (engine, calls) = StubEngine::new(2, "segment");
        let (stats, _events) = drive(engine, 4, PartialTranscripts::Disabled);
        assert_eq!(stats.finals_emitted, 2);
        let calls = calls.lock().expect("call log lock");
        let mut pending_reset = false;
        for call in calls.iter() {
            match call.as_str() {
                "text" => pending_reset = true,
                "reset" => {
                    assert!(pending_reset, "reset without a preceding text read");
                    pending_reset = false;
                }
                "accept" => {
                    assert!(!pending_reset, "accepted audio between text and reset");
                }
                _ => {}
            }
        }
        assert!(!pending_reset, "final text was never followed by a reset");
    }

    #[test]
    fn partials_follow_changing_text() {
        let (mut engine, _calls) = StubEngine::new(0, "");
        engine.partial_text = |chunks| format!("partial {chunks}");
        let (stats, events) = drive(engine, 3, PartialTranscripts::EveryDrain);
        assert_eq!(stats.partials_emitted, 3);
        assert!(events.iter().all(|event| !event.is_final));
    }

    #[test]
    fn unchanged_partial_text_is_not_repeated() {
        let (mut engine, _calls) = StubEngine::new(0, "");
        engine.partial_text = |_| "steady".to_string();
        let (stats, events) = drive(engine, 4, PartialTranscripts::EveryDrain);
        assert_eq!(stats.partials_emitted, 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "steady");
    }

    #[test]
    fn throttled_partials_respect_the_interval() {
        let (mut engine, _calls) = StubEngine::new(0, "");
        engine.partial_text = |chunks| format!("partial {chunks}");
        let (stats, _events) = drive(
            engine,
            4,
            PartialTranscripts::Throttled {
                min_interval: Duration::from_secs(60),
            },
        );
        assert_eq!(stats.partials_emitted, 1);
    }

    #[test]
    fn disabled_partials_emit_nothing_without_endpoints() {
        let (mut engine, _calls) = StubEngine::new(0, "");
        engine.partial_text = |chunks| format!("partial {chunks}");
        let (stats, events) = drive(engine, 3, PartialTranscripts::Disabled);
        assert_eq!(stats.partials_emitted, 0);
        assert!(events.is_empty());
    }
}
