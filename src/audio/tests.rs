use super::capture::{run_capture_loop, CaptureContext};
use super::handoff::Handoff;
use super::meter::rms_db;
use super::source::{downmix_into, AudioError, AudioSource};
use super::AudioChunk;
use crate::sinks::WaveformSink;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

enum Step {
    Samples(Vec<i16>),
    Empty,
    Fail,
}

/// Audio source that replays a fixed script, pacing reads like a real
/// device, then reports no data once the script runs out.
struct ScriptedSource {
    steps: std::vec::IntoIter<Step>,
    pace: Duration,
}

impl ScriptedSource {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into_iter(),
            pace: Duration::from_millis(5),
        }
    }
}

impl AudioSource for ScriptedSource {
    fn start(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize, AudioError> {
        thread::sleep(self.pace);
        match self.steps.next() {
            Some(Step::Samples(samples)) => {
                let count = samples.len().min(buf.len());
                buf[..count].copy_from_slice(&samples[..count]);
                Ok(count)
            }
            Some(Step::Empty) | None => Ok(0),
            Some(Step::Fail) => Err(AudioError::Device("scripted failure".into())),
        }
    }

    fn stop(&mut self) {}

    fn close(&mut self) {}

    fn sample_rate(&self) -> u32 {
        16_000
    }
}

#[derive(Default)]
struct CollectingWaveform {
    frames: Mutex<Vec<Vec<i16>>>,
}

impl CollectingWaveform {
    fn frame_lengths(&self) -> Vec<usize> {
        self.frames
            .lock()
            .expect("frame lock")
            .iter()
            .map(Vec::len)
            .collect()
    }
}

impl WaveformSink for CollectingWaveform {
    fn on_waveform(&self, samples: &[i16]) {
        self.frames.lock().expect("frame lock").push(samples.to_vec());
    }
}

/// Run the capture loop to completion; the scripted source runs dry and the
/// failure threshold ends the loop without an external stop signal.
fn run_script(
    steps: Vec<Step>,
    chunk_samples: usize,
    max_failed_ticks: u32,
) -> (
    super::capture::CaptureStats,
    Arc<CollectingWaveform>,
    Arc<Handoff<AudioChunk>>,
) {
    let waveform = Arc::new(CollectingWaveform::default());
    let handoff = Arc::new(Handoff::new());
    let ctx = CaptureContext {
        source: Box::new(ScriptedSource::new(steps)),
        handoff: handoff.clone(),
        waveform: waveform.clone(),
        stop: Arc::new(AtomicBool::new(false)),
        chunk_samples,
        max_failed_ticks,
    };
    let (_source, stats) = run_capture_loop(ctx);
    (stats, waveform, handoff)
}

#[test]
fn handoff_overwrites_unconsumed_value() {
    let handoff = Handoff::new();
    assert!(!handoff.publish(1));
    assert!(handoff.publish(2));
    assert!(handoff.publish(3));
    assert_eq!(handoff.take(), Some(3));
    assert_eq!(handoff.take(), None);
}

#[test]
fn handoff_take_timeout_wakes_on_publish() {
    let handoff = Arc::new(Handoff::new());
    let publisher = handoff.clone();
    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        publisher.publish(7u32);
    });
    let started = Instant::now();
    let value = handoff.take_timeout(Duration::from_millis(500));
    assert_eq!(value, Some(7));
    assert!(started.elapsed() < Duration::from_millis(400));
    worker.join().expect("publisher thread");
}

#[test]
fn handoff_take_timeout_expires_when_empty() {
    let handoff: Handoff<u32> = Handoff::new();
    let started = Instant::now();
    assert_eq!(handoff.take_timeout(Duration::from_millis(30)), None);
    assert!(started.elapsed() >= Duration::from_millis(25));
}

#[test]
fn capture_normalizes_samples_into_unit_range() {
    let (_stats, _waveform, handoff) = run_script(
        vec![Step::Samples(vec![16_384, -16_384, 0])],
        3,
        1,
    );
    let chunk = handoff.take().expect("chunk published");
    assert_eq!(chunk.sample_rate, 16_000);
    assert_eq!(chunk.samples.len(), 3);
    assert!((chunk.samples[0] - 0.5).abs() < 1e-6);
    assert!((chunk.samples[1] + 0.5).abs() < 1e-6);
    assert_eq!(chunk.samples[2], 0.0);
    assert!(chunk.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
}

#[test]
fn capture_sizes_waveform_frames_to_actual_count() {
    let (stats, waveform, _handoff) = run_script(
        vec![
            Step::Samples(vec![100; 1_600]),
            Step::Samples(vec![200; 700]),
        ],
        1_600,
        1,
    );
    assert_eq!(stats.chunks_read, 2);
    assert_eq!(stats.short_reads, 1);
    assert_eq!(waveform.frame_lengths(), vec![1_600, 700]);
}

#[test]
fn capture_counts_overwritten_chunks() {
    // Nothing consumes the handoff, so the second publish replaces the first.
    let (stats, _waveform, handoff) = run_script(
        vec![
            Step::Samples(vec![1; 160]),
            Step::Samples(vec![2; 160]),
        ],
        160,
        1,
    );
    assert_eq!(stats.chunks_overwritten, 1);
    let survivor = handoff.take().expect("latest chunk kept");
    assert!((survivor.samples[0] - 2.0 / 32_768.0).abs() < 1e-9);
    assert_eq!(handoff.take(), None);
}

#[test]
fn capture_aborts_after_sustained_failures() {
    let (stats, waveform, _handoff) = run_script(
        vec![Step::Fail, Step::Fail, Step::Fail],
        160,
        3,
    );
    assert!(stats.aborted);
    assert_eq!(stats.failed_ticks, 3);
    assert_eq!(stats.chunks_read, 0);
    assert!(waveform.frame_lengths().is_empty());
}

#[test]
fn capture_recovers_after_transient_failures() {
    let (stats, waveform, _handoff) = run_script(
        vec![
            Step::Fail,
            Step::Empty,
            Step::Samples(vec![50; 160]),
        ],
        160,
        10,
    );
    assert_eq!(stats.chunks_read, 1);
    assert_eq!(stats.failed_ticks, 2 + 10);
    assert_eq!(waveform.frame_lengths(), vec![160]);
}

#[test]
fn downmix_averages_interleaved_channels() {
    let mut out = Vec::new();
    downmix_into(&mut out, &[1.0f32, -1.0, 0.5, 0.5], 2, &|s| s);
    assert_eq!(out, vec![0, 16_383]);
}

#[test]
fn downmix_passes_mono_through() {
    let mut out = Vec::new();
    downmix_into(&mut out, &[0.5f32, -0.5], 1, &|s| s);
    assert_eq!(out, vec![16_383, -16_383]);
}

#[test]
fn rms_db_floors_on_empty_input() {
    assert_eq!(rms_db(&[]), -60.0);
}

#[test]
fn rms_db_tracks_signal_level() {
    let loud = vec![i16::MAX; 320];
    let quiet = vec![327; 320];
    assert!(rms_db(&loud) > -1.0);
    assert!(rms_db(&loud) <= 0.1);
    let quiet_db = rms_db(&quiet);
    assert!(quiet_db < -35.0 && quiet_db > -45.0);
}

#[test]
fn silence_reads_near_the_meter_floor() {
    let db = rms_db(&[0i16; 320]);
    assert!(db <= -100.0);
}
