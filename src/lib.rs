//! Real-time microphone capture orchestrated into a streaming speech
//! recognizer.
//!
//! Audio moves from the microphone through a dedicated capture thread into a
//! single-slot handoff, where a dedicated decode thread feeds it to an
//! external incremental recognizer, drains its decode steps, and turns
//! detected utterance endpoints into final transcript events. Waveform
//! frames and transcripts are posted to presentation-side sinks; neither
//! thread ever blocks on the display.
//!
//! The recognition engine itself is a collaborator behind
//! [`StreamingRecognizer`]; this crate owns the threading, the lossy
//! freshest-audio handoff, endpoint-driven resets, and lifecycle teardown
//! ordering.

pub mod asr;
pub mod audio;
pub mod config;
pub mod pipeline;
pub mod sinks;
pub mod telemetry;

pub use asr::{
    DecodingMethod, EndpointRules, EngineError, FeatureConfig, ModelAssets, NoopRecognizer,
    PartialTranscripts, RecognizerConfig, StreamingRecognizer, TranscriptEvent,
};
pub use audio::{AudioChunk, AudioError, AudioSource, AudioSourceConfig, CpalAudioSource};
pub use pipeline::{
    PipelineConfig, PipelineError, PipelineStats, RecordingState, SpeechPipeline,
};
pub use sinks::{TranscriptSink, WaveformSink};
