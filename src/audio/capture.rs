//! Capture thread: pulls fixed-duration chunks from the audio source,
//! normalizes them, and hands them to the decode side.
//!
//! The loop only produces side effects: normalized chunks go to the handoff
//! slot (overwriting anything stale) and the raw samples go to the waveform
//! sink, truncated to the count actually read.

use super::handoff::Handoff;
use super::source::AudioSource;
use super::AudioChunk;
use crate::sinks::WaveformSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Pause after a failed read so a broken device cannot spin the loop.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Counters collected by the capture thread, recovered at stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub chunks_read: u64,
    pub samples_read: u64,
    /// Reads that filled less than a full chunk.
    pub short_reads: u64,
    /// Ticks that produced no audio (read error or empty read).
    pub failed_ticks: u64,
    /// Chunks the decode side never consumed before the next publish.
    pub chunks_overwritten: u64,
    /// True when the loop gave up after sustained failed ticks.
    pub aborted: bool,
}

pub(crate) struct CaptureContext {
    pub source: Box<dyn AudioSource>,
    pub handoff: Arc<Handoff<AudioChunk>>,
    pub waveform: Arc<dyn WaveformSink>,
    pub stop: Arc<AtomicBool>,
    pub chunk_samples: usize,
    pub max_failed_ticks: u32,
}

/// Body of the capture thread. Returns the source so the controller can
/// restart or release the device after joining.
pub(crate) fn run_capture_loop(mut ctx: CaptureContext) -> (Box<dyn AudioSource>, CaptureStats) {
    let mut stats = CaptureStats::default();
    if elevate_thread_priority() {
        tracing::debug!("capture thread promoted to real-time scheduling");
    }
    let sample_rate = ctx.source.sample_rate();
    let mut buffer = vec![0i16; ctx.chunk_samples.max(1)];
    let mut consecutive_failures: u32 = 0;

    while !ctx.stop.load(Ordering::Relaxed) {
        match ctx.source.read(&mut buffer) {
            Ok(0) => {
                consecutive_failures += 1;
                stats.failed_ticks += 1;
            }
            Ok(count) => {
                consecutive_failures = 0;
                stats.chunks_read += 1;
                stats.samples_read += count as u64;
                if count < buffer.len() {
                    stats.short_reads += 1;
                }
                let samples: Vec<f32> = buffer[..count]
                    .iter()
                    .map(|&sample| f32::from(sample) / 32_768.0)
                    .collect();
                if ctx.handoff.publish(AudioChunk {
                    samples,
                    sample_rate,
                }) {
                    stats.chunks_overwritten += 1;
                }
                ctx.waveform.on_waveform(&buffer[..count]);
            }
            Err(err) => {
                consecutive_failures += 1;
                stats.failed_ticks += 1;
                tracing::debug!("audio read failed, skipping tick: {err}");
                thread::sleep(READ_ERROR_BACKOFF);
            }
        }
        if consecutive_failures >= ctx.max_failed_ticks {
            tracing::error!(
                "audio source produced no data for {consecutive_failures} consecutive ticks, stopping capture"
            );
            stats.aborted = true;
            break;
        }
    }

    ctx.source.stop();
    (ctx.source, stats)
}

/// Ask the scheduler for round-robin priority so capture cadence is not
/// starved by UI or background work. Needs CAP_SYS_NICE or equivalent;
/// failure is expected on desktops and harmless.
#[cfg(unix)]
fn elevate_thread_priority() -> bool {
    unsafe {
        let policy = libc::SCHED_RR;
        let min = libc::sched_get_priority_min(policy);
        let max = libc::sched_get_priority_max(policy);
        if min < 0 || max < min {
            return false;
        }
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = min + (max - min) / 4;
        libc::pthread_setschedparam(libc::pthread_self(), policy, &param) == 0
    }
}

#[cfg(not(unix))]
fn elevate_thread_priority() -> bool {
    false
}
