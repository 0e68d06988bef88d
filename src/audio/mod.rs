//! Microphone capture half of the pipeline.
//!
//! Audio flows from an [`AudioSource`] through the capture thread, which
//! normalizes 16-bit device samples to `f32` in [-1.0, 1.0] and publishes
//! them chunk by chunk through the single-slot [`Handoff`] to the decode
//! side, mirroring the raw samples to a waveform sink along the way.

mod capture;
mod handoff;
mod meter;
mod source;
#[cfg(test)]
mod tests;

pub use capture::CaptureStats;
pub(crate) use capture::{run_capture_loop, CaptureContext};
pub use handoff::Handoff;
pub use meter::{rms_db, LiveMeter};
pub use source::{AudioError, AudioSource, AudioSourceConfig, CpalAudioSource};

/// One fixed-duration window of audio moved from capture to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Normalized samples in [-1.0, 1.0]; the length is the count actually
    /// read, which may be less than a full chunk on a short read.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}
