//! Microphone diagnostics entrypoint: device listing and a live level meter
//! driven by the full capture pipeline.
//!
//! The meter runs the real capture and decode threads against a no-op
//! recognizer, so it exercises exactly the path an embedding application
//! uses, minus the model.

use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use livescribe::audio::{rms_db, LiveMeter};
use livescribe::config::AppConfig;
use livescribe::sinks::{transcript_channel, waveform_channel, MeterSink, WaveformSink};
use livescribe::{telemetry, CpalAudioSource, NoopRecognizer, SpeechPipeline};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

const METER_UPDATE_MS: u64 = 80;
const METER_WIDTH: usize = 40;
const METER_FLOOR_DB: f32 = -60.0;

#[derive(Serialize)]
struct WaveformFrame {
    samples: usize,
    rms_db: f32,
}

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    telemetry::init_tracing(config.logs);

    if config.list_input_devices {
        let names = CpalAudioSource::list_input_devices()
            .context("failed to list audio input devices")?;
        if names.is_empty() {
            println!("no audio input devices detected");
        }
        for name in names {
            println!("{name}");
        }
        return Ok(());
    }

    let source =
        CpalAudioSource::open(config.source_config()).context("failed to open microphone")?;
    let (transcript_sink, transcript_rx) = transcript_channel();

    let meter = LiveMeter::new();
    let mut waveform_rx = None;
    let waveform_sink: Arc<dyn WaveformSink> = if config.json {
        let (sink, rx) = waveform_channel(64);
        waveform_rx = Some(rx);
        Arc::new(sink)
    } else {
        Arc::new(MeterSink::new(meter.clone()))
    };

    let mut pipeline = SpeechPipeline::new(
        Box::new(NoopRecognizer),
        Box::new(source),
        waveform_sink,
        Arc::new(transcript_sink),
        config.pipeline_config(),
    );
    pipeline.start().context("failed to start capture")?;

    let deadline = Instant::now() + Duration::from_millis(config.duration_ms);
    match waveform_rx {
        Some(rx) => {
            let mut stdout = std::io::stdout().lock();
            while Instant::now() < deadline {
                match rx.recv_timeout(Duration::from_millis(METER_UPDATE_MS)) {
                    Ok(frame) => {
                        let line = serde_json::to_string(&WaveformFrame {
                            samples: frame.len(),
                            rms_db: rms_db(&frame),
                        })?;
                        writeln!(stdout, "{line}")?;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        }
        None => {
            while Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(METER_UPDATE_MS));
                render_meter(meter.level_db())?;
            }
            println!();
        }
    }

    pipeline.release();

    for event in transcript_rx.try_iter() {
        println!("{}", event.text);
    }
    let stats = pipeline.stats();
    eprintln!(
        "chunks={} samples={} short_reads={} overwritten={} failed_ticks={}",
        stats.capture.chunks_read,
        stats.capture.samples_read,
        stats.capture.short_reads,
        stats.capture.chunks_overwritten,
        stats.capture.failed_ticks,
    );
    Ok(())
}

fn render_meter(db: f32) -> Result<()> {
    let level = ((db - METER_FLOOR_DB) / -METER_FLOOR_DB).clamp(0.0, 1.0);
    let filled = (level * METER_WIDTH as f32).round() as usize;
    let mut stdout = std::io::stdout().lock();
    write!(
        stdout,
        "\r[{}{}] {db:6.1} dB",
        "#".repeat(filled),
        "-".repeat(METER_WIDTH - filled)
    )?;
    stdout.flush()?;
    Ok(())
}
