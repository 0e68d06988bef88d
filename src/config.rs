//! Command-line parsing and validation for the livescribe binary.

use crate::audio::AudioSourceConfig;
use crate::pipeline::PipelineConfig;
use anyhow::{bail, Result};
use clap::Parser;

/// CLI options for the microphone diagnostics tool. Validated before
/// anything touches the audio device.
#[derive(Debug, Parser, Clone)]
#[command(about = "Live microphone capture diagnostics", author, version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long = "input-device")]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Capture sample rate in Hz
    #[arg(long = "sample-rate", env = "LIVESCRIBE_SAMPLE_RATE", default_value_t = 16_000)]
    pub sample_rate: u32,

    /// Capture chunk duration in milliseconds
    #[arg(long = "chunk-ms", default_value_t = 100)]
    pub chunk_ms: u64,

    /// How long to run before exiting (milliseconds)
    #[arg(long = "duration-ms", default_value_t = 5_000)]
    pub duration_ms: u64,

    /// Emit waveform frames as JSON lines instead of the live meter
    #[arg(long = "json", default_value_t = false)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long = "logs", env = "LIVESCRIBE_LOGS", default_value_t = false)]
    pub logs: bool,
}

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values against the ranges the pipeline supports.
    pub fn validate(&self) -> Result<()> {
        if !(8_000..=96_000).contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be between 8000 and 96000 Hz, got {}",
                self.sample_rate
            );
        }
        if !(10..=1_000).contains(&self.chunk_ms) {
            bail!("--chunk-ms must be between 10 and 1000, got {}", self.chunk_ms);
        }
        if !(100..=600_000).contains(&self.duration_ms) {
            bail!(
                "--duration-ms must be between 100 and 600000, got {}",
                self.duration_ms
            );
        }
        if let Some(device) = &self.input_device {
            if device.trim().is_empty() {
                bail!("--input-device must not be empty");
            }
        }
        Ok(())
    }

    /// Snapshot of the audio device settings.
    pub fn source_config(&self) -> AudioSourceConfig {
        AudioSourceConfig {
            device: self.input_device.clone(),
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    /// Snapshot of the orchestration settings.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            chunk_ms: self.chunk_ms,
            ..PipelineConfig::default()
        }
    }
}
