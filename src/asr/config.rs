//! Pass-through configuration for the external recognizer.
//!
//! These values are handed to the engine binding unchanged; the pipeline
//! itself only validates ranges and checks that model files exist before
//! recording can start.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal engine setup failures, surfaced before recording can start. Not
/// retried.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("missing model asset: {0}")]
    MissingModelAsset(PathBuf),
    #[error("invalid recognizer config: {0}")]
    InvalidConfig(String),
}

/// Model files consumed by the engine loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAssets {
    pub encoder_param: PathBuf,
    pub encoder_bin: PathBuf,
    pub decoder_param: PathBuf,
    pub decoder_bin: PathBuf,
    pub joiner_param: PathBuf,
    pub joiner_bin: PathBuf,
    pub tokens: PathBuf,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    #[serde(default)]
    pub use_gpu: bool,
}

fn default_num_threads() -> usize {
    num_cpus::get().min(4)
}

impl ModelAssets {
    /// Report the first missing model file. Engine constructors call this so
    /// a bad install fails before any thread is spawned.
    pub fn verify(&self) -> Result<(), EngineError> {
        let paths = [
            &self.encoder_param,
            &self.encoder_bin,
            &self.decoder_param,
            &self.decoder_bin,
            &self.joiner_param,
            &self.joiner_bin,
            &self.tokens,
        ];
        for path in paths {
            if !path.is_file() {
                return Err(EngineError::MissingModelAsset(path.clone()));
            }
        }
        Ok(())
    }
}

/// Feature extraction parameters forwarded to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub sample_rate: u32,
    pub feature_dim: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            feature_dim: 80,
        }
    }
}

/// Search strategy forwarded to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum DecodingMethod {
    GreedySearch,
    ModifiedBeamSearch {
        #[serde(default = "default_active_paths")]
        num_active_paths: usize,
    },
}

fn default_active_paths() -> usize {
    4
}

impl Default for DecodingMethod {
    fn default() -> Self {
        DecodingMethod::GreedySearch
    }
}

/// Endpoint detection thresholds, in seconds.
///
/// Rule 1 fires on long trailing silence regardless of decoded text, rule 2
/// on shorter trailing silence after something was decoded, rule 3 caps the
/// utterance length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EndpointRules {
    pub enable: bool,
    pub rule1_min_trailing_silence: f32,
    pub rule2_min_trailing_silence: f32,
    pub rule3_min_utterance_length: f32,
}

impl Default for EndpointRules {
    fn default() -> Self {
        Self {
            enable: true,
            rule1_min_trailing_silence: 2.4,
            rule2_min_trailing_silence: 1.0,
            rule3_min_utterance_length: 30.0,
        }
    }
}

/// Everything an engine binding needs besides the model files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognizerConfig {
    #[serde(default)]
    pub feature: FeatureConfig,
    #[serde(default)]
    pub decoding: DecodingMethod,
    #[serde(default)]
    pub endpoint: EndpointRules,
}

impl RecognizerConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(8_000..=96_000).contains(&self.feature.sample_rate) {
            return Err(EngineError::InvalidConfig(format!(
                "sample_rate must be between 8000 and 96000 Hz, got {}",
                self.feature.sample_rate
            )));
        }
        if !(1..=512).contains(&self.feature.feature_dim) {
            return Err(EngineError::InvalidConfig(format!(
                "feature_dim must be between 1 and 512, got {}",
                self.feature.feature_dim
            )));
        }
        if let DecodingMethod::ModifiedBeamSearch { num_active_paths } = self.decoding {
            if !(1..=32).contains(&num_active_paths) {
                return Err(EngineError::InvalidConfig(format!(
                    "num_active_paths must be between 1 and 32, got {num_active_paths}"
                )));
            }
        }
        if self.endpoint.enable {
            for (name, value) in [
                (
                    "rule1_min_trailing_silence",
                    self.endpoint.rule1_min_trailing_silence,
                ),
                (
                    "rule2_min_trailing_silence",
                    self.endpoint.rule2_min_trailing_silence,
                ),
                (
                    "rule3_min_utterance_length",
                    self.endpoint.rule3_min_utterance_length,
                ),
            ] {
                if !value.is_finite() || value <= 0.0 {
                    return Err(EngineError::InvalidConfig(format!(
                        "{name} must be a positive number of seconds, got {value}"
                    )));
                }
            }
        }
        Ok(())
    }
}
