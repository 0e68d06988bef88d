//! Microphone access behind a pull-based source contract.
//!
//! The capture loop consumes an [`AudioSource`] and never talks to the audio
//! backend directly. [`CpalAudioSource`] adapts CPAL's callback model to the
//! blocking `read` contract: the stream lives on an internal device thread
//! and delivers converted 16-bit mono blocks over a bounded channel.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Device callback blocks buffered ahead of the reader before drops start.
const DEVICE_BLOCK_CAPACITY: usize = 32;

/// Upper bound on a single blocking `read` before it returns a short count.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Errors surfaced by audio sources.
///
/// Open and start failures are fatal to the capture feature and surfaced
/// once. Read errors on an open stream are transient; the capture loop skips
/// the tick instead of tearing anything down.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The requested device is absent, busy, or permission was denied.
    #[error("audio input unavailable: {0}")]
    Unavailable(String),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    /// Transient failure on an open stream.
    #[error("audio device error: {0}")]
    Device(String),
    #[error("audio source is closed")]
    Closed,
}

/// How a source should open the microphone.
#[derive(Debug, Clone)]
pub struct AudioSourceConfig {
    /// Preferred device name; `None` selects the system default input.
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioSourceConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 16_000,
            channels: 1,
        }
    }
}

/// Pull-based microphone contract consumed by the capture loop.
///
/// `read` blocks up to roughly one chunk duration and may fill fewer samples
/// than requested (a short read). `Ok(0)` means no data arrived this tick.
/// Errors from `read` must be treated as transient by callers.
pub trait AudioSource: Send {
    /// Start the device stream. Fatal on failure.
    fn start(&mut self) -> Result<(), AudioError>;
    /// Fill `buf` with captured samples, returning the count actually read.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, AudioError>;
    /// Stop the device stream, keeping the device for a later restart.
    fn stop(&mut self);
    /// Stop and release the device entirely.
    fn close(&mut self);
    fn sample_rate(&self) -> u32;
}

enum WorkerSignal {
    Stop,
}

/// Microphone source backed by CPAL.
///
/// The `cpal::Stream` is created, driven, and dropped on a dedicated device
/// thread, so this handle stays `Send` and the capture loop can own it.
pub struct CpalAudioSource {
    config: AudioSourceConfig,
    data_tx: Sender<Vec<i16>>,
    data_rx: Receiver<Vec<i16>>,
    pending: VecDeque<i16>,
    dropped_blocks: Arc<AtomicUsize>,
    worker: Option<(Sender<WorkerSignal>, JoinHandle<()>)>,
    closed: bool,
}

impl CpalAudioSource {
    /// Resolve the configured device and prepare a source.
    ///
    /// A missing microphone fails here, not mid-capture. The stream itself is
    /// not opened until [`AudioSource::start`].
    pub fn open(config: AudioSourceConfig) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        resolve_device(&host, config.device.as_deref())?;
        let (data_tx, data_rx) = bounded(DEVICE_BLOCK_CAPACITY);
        Ok(Self {
            config,
            data_tx,
            data_rx,
            pending: VecDeque::new(),
            dropped_blocks: Arc::new(AtomicUsize::new(0)),
            worker: None,
            closed: false,
        })
    }

    /// Microphone names visible to the default host.
    pub fn list_input_devices() -> Result<Vec<String>, AudioError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|err| AudioError::Unavailable(format!("no input devices available: {err}")))?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Callback blocks discarded because the reader lagged behind.
    pub fn dropped_blocks(&self) -> usize {
        self.dropped_blocks.load(Ordering::Relaxed)
    }
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.closed {
            return Err(AudioError::Closed);
        }
        if self.worker.is_some() {
            return Ok(());
        }
        let (ctrl_tx, ctrl_rx) = bounded::<WorkerSignal>(1);
        let (status_tx, status_rx) = bounded::<Result<(), AudioError>>(1);
        let config = self.config.clone();
        let data_tx = self.data_tx.clone();
        let dropped = self.dropped_blocks.clone();
        let handle = thread::Builder::new()
            .name("mic-device".into())
            .spawn(move || device_worker(config, data_tx, dropped, ctrl_rx, status_tx))
            .map_err(|err| {
                AudioError::Unavailable(format!("failed to spawn device thread: {err}"))
            })?;
        match status_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some((ctrl_tx, handle));
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::Unavailable(
                    "device thread exited before startup".into(),
                ))
            }
        }
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize, AudioError> {
        if self.closed {
            return Err(AudioError::Closed);
        }
        if self.worker.is_none() {
            return Ok(0);
        }
        let deadline = Instant::now() + READ_TIMEOUT;
        let mut filled = 0;
        loop {
            while filled < buf.len() {
                match self.pending.pop_front() {
                    Some(sample) => {
                        buf[filled] = sample;
                        filled += 1;
                    }
                    None => break,
                }
            }
            if filled == buf.len() {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.data_rx.recv_timeout(deadline - now) {
                Ok(block) => self.pending.extend(block),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(AudioError::Device("input stream disconnected".into()));
                }
            }
        }
        Ok(filled)
    }

    fn stop(&mut self) {
        if let Some((ctrl_tx, handle)) = self.worker.take() {
            let _ = ctrl_tx.send(WorkerSignal::Stop);
            let _ = handle.join();
        }
        // Discard stale audio so a restart begins with fresh samples.
        self.pending.clear();
        while self.data_rx.try_recv().is_ok() {}
    }

    fn close(&mut self) {
        self.stop();
        self.closed = true;
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

impl Drop for CpalAudioSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Owns the CPAL stream for its whole lifetime: build, play, park until the
/// stop signal, drop. Dropping the stream releases the device.
fn device_worker(
    config: AudioSourceConfig,
    data_tx: Sender<Vec<i16>>,
    dropped: Arc<AtomicUsize>,
    ctrl_rx: Receiver<WorkerSignal>,
    status_tx: Sender<Result<(), AudioError>>,
) {
    let stream = match build_capture_stream(&config, data_tx, dropped) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = status_tx.send(Err(err));
            return;
        }
    };
    if let Err(err) = stream.play() {
        let _ = status_tx.send(Err(AudioError::Unavailable(format!(
            "failed to start input stream: {err}"
        ))));
        return;
    }
    let _ = status_tx.send(Ok(()));
    let _ = ctrl_rx.recv();
    drop(stream);
}

fn build_capture_stream(
    config: &AudioSourceConfig,
    data_tx: Sender<Vec<i16>>,
    dropped: Arc<AtomicUsize>,
) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = resolve_device(&host, config.device.as_deref())?;
    let default_config = device.default_input_config().map_err(|err| {
        AudioError::Unavailable(format!("failed to query input config: {err}"))
    })?;
    let format = default_config.sample_format();
    // Ask for the device's native channel layout at our sample rate and
    // downmix to mono ourselves; many microphones only expose stereo.
    let channels = default_config.channels().max(config.channels).max(1);
    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = usize::from(channels);

    match format {
        SampleFormat::F32 => build_stream(
            &device,
            &stream_config,
            channels,
            data_tx,
            dropped,
            |sample: f32| sample,
        ),
        SampleFormat::I16 => build_stream(
            &device,
            &stream_config,
            channels,
            data_tx,
            dropped,
            |sample: i16| f32::from(sample) / 32_768.0,
        ),
        SampleFormat::U16 => build_stream(
            &device,
            &stream_config,
            channels,
            data_tx,
            dropped,
            |sample: u16| (f32::from(sample) - 32_768.0) / 32_768.0,
        ),
        other => Err(AudioError::UnsupportedFormat(format!("{other:?}"))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    data_tx: Sender<Vec<i16>>,
    dropped: Arc<AtomicUsize>,
    convert: impl Fn(T) -> f32 + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample + Send + 'static,
{
    let err_fn = |err| tracing::debug!("audio stream error: {err}");
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mut block = Vec::with_capacity(data.len() / channels.max(1) + 1);
                downmix_into(&mut block, data, channels, &convert);
                match data_tx.try_send(block) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => {}
                }
            },
            err_fn,
            None,
        )
        .map_err(|err| AudioError::Unavailable(format!("failed to open input stream: {err}")))
}

fn resolve_device(
    host: &cpal::Host,
    preferred: Option<&str>,
) -> Result<cpal::Device, AudioError> {
    match preferred {
        Some(name) => host
            .input_devices()
            .map_err(|err| AudioError::Unavailable(format!("no input devices available: {err}")))?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::Unavailable(format!("input device '{name}' not found"))),
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::Unavailable("no default input device".into())),
    }
}

/// Average interleaved frames down to mono and convert to 16-bit samples.
pub(super) fn downmix_into<T, F>(out: &mut Vec<i16>, data: &[T], channels: usize, convert: &F)
where
    T: Copy,
    F: Fn(T) -> f32,
{
    if channels <= 1 {
        out.extend(data.iter().copied().map(|sample| to_i16(convert(sample))));
        return;
    }
    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            out.push(to_i16(acc / channels as f32));
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        out.push(to_i16(acc / count as f32));
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}
