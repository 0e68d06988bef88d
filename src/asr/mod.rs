//! Streaming recognizer contract and transcript events.
//!
//! The recognition engine is an external collaborator: this crate drives it
//! through [`StreamingRecognizer`] and never looks inside. Engine bindings
//! implement the trait and take the pass-through configuration from
//! [`RecognizerConfig`]; releasing engine resources is `Drop`.

mod config;
mod decode;

pub use config::{
    DecodingMethod, EndpointRules, EngineError, FeatureConfig, ModelAssets, RecognizerConfig,
};
pub use decode::{DecodeStats, PartialTranscripts};
pub(crate) use decode::{run_decode_loop, DecodeContext};

use serde::{Deserialize, Serialize};

/// Incremental speech recognition engine.
///
/// The engine buffers audio internally: after `accept_waveform`, zero, one,
/// or many decode steps may be pending, so callers drain with
/// `while is_ready() { decode() }`. `is_endpoint` turns true once the
/// engine's trailing-silence or utterance-length rules fire; `reset` clears
/// utterance state for the next segment. Exactly one thread may call into an
/// engine instance at a time.
pub trait StreamingRecognizer: Send {
    /// Ingest normalized samples in [-1.0, 1.0].
    fn accept_waveform(&mut self, samples: &[f32], sample_rate: u32);
    fn is_ready(&mut self) -> bool;
    /// Advance the engine one internal step.
    fn decode(&mut self);
    fn is_endpoint(&mut self) -> bool;
    /// Best transcript for the in-progress or just-ended utterance.
    fn text(&mut self) -> String;
    /// Clear utterance state, starting a new segment.
    fn reset(&mut self);
}

/// One transcript update delivered to the presentation layer.
///
/// Final events are emitted exactly once per detected endpoint; the engine
/// is reset immediately afterwards so the next event starts a fresh
/// utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

/// Engine stand-in that consumes audio and never produces text.
///
/// Used by the diagnostics CLI to exercise the full pipeline without a
/// model, and handy as a placeholder while wiring an embedding application.
#[derive(Debug, Default)]
pub struct NoopRecognizer;

impl StreamingRecognizer for NoopRecognizer {
    fn accept_waveform(&mut self, _samples: &[f32], _sample_rate: u32) {}

    fn is_ready(&mut self) -> bool {
        false
    }

    fn decode(&mut self) {}

    fn is_endpoint(&mut self) -> bool {
        false
    }

    fn text(&mut self) -> String {
        String::new()
    }

    fn reset(&mut self) {}
}
