use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const METER_FLOOR_DB: f32 = -60.0;

/// Lock-free level cell shared between the capture pipeline and a display
/// loop. Stores the level as f32 bits in an atomic so readers never block
/// the audio path.
#[derive(Clone, Debug)]
pub struct LiveMeter {
    level_bits: Arc<AtomicU32>,
}

impl LiveMeter {
    pub fn new() -> Self {
        Self {
            level_bits: Arc::new(AtomicU32::new(METER_FLOOR_DB.to_bits())),
        }
    }

    pub fn set_db(&self, db: f32) {
        self.level_bits.store(db.to_bits(), Ordering::Relaxed);
    }

    pub fn level_db(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }
}

impl Default for LiveMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// RMS level of a 16-bit frame in dBFS.
pub fn rms_db(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return METER_FLOOR_DB;
    }
    let energy: f32 = samples
        .iter()
        .map(|&sample| {
            let normalized = f32::from(sample) / 32_768.0;
            normalized * normalized
        })
        .sum::<f32>()
        / samples.len() as f32;
    let rms = energy.sqrt().max(1e-6);
    20.0 * rms.log10()
}
