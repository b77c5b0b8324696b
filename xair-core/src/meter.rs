//! Input level metering and clip protection.
//!
//! The mixer streams input meters as signed 16-bit values in 1/256 dB. Each
//! input gets a [`Meter`] that keeps the sum of the last four samples, so
//! dividing the sum by 1024 gives a four-sample moving average in dB.

use std::collections::BTreeSet;

/// Samples kept per meter.
pub const METER_WINDOW: usize = 4;

/// Initial window contents: far below any real level.
pub const METER_SENTINEL: i16 = i16::MIN;

/// Inputs reported by the `/meters/2` subscription.
pub const METER_CHANNELS: usize = 16;

/// Divisor turning a window sum into dB (four samples of 1/256 dB).
pub const DEFAULT_METER_SCALE: f32 = 1024.0;

pub const DEFAULT_CLIP_THRESHOLD_DB: f32 = -3.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meter {
    window: [i32; METER_WINDOW],
    next: usize,
    sum: i32,
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

impl Meter {
    pub fn new() -> Self {
        let sentinel = METER_SENTINEL as i32;
        Self {
            window: [sentinel; METER_WINDOW],
            next: 0,
            sum: sentinel * METER_WINDOW as i32,
        }
    }

    /// Replace the oldest sample with `raw` and return the new window sum.
    pub fn insert(&mut self, raw: i16) -> i32 {
        let raw = raw as i32;
        self.sum += raw - self.window[self.next];
        self.window[self.next] = raw;
        self.next = (self.next + 1) % METER_WINDOW;
        self.sum
    }
}

/// One meter per streamed input.
#[derive(Debug, Clone)]
pub struct MeterBank {
    meters: Vec<Meter>,
    scale: f32,
}

impl Default for MeterBank {
    fn default() -> Self {
        Self::new(DEFAULT_METER_SCALE)
    }
}

impl MeterBank {
    pub fn new(scale: f32) -> Self {
        Self {
            meters: vec![Meter::new(); METER_CHANNELS],
            scale,
        }
    }

    /// Feed one telemetry frame and return the smoothed level of every input
    /// in dB. Samples past the last meter are ignored.
    pub fn push_batch(&mut self, samples: &[i16]) -> Vec<f32> {
        self.meters
            .iter_mut()
            .zip(samples)
            .map(|(meter, &raw)| meter.insert(raw) as f32 / self.scale)
            .collect()
    }
}

/// Decode a meter blob: a little-endian `u32` sample count followed by that
/// many little-endian `i16` samples. Returns `None` when the blob is shorter
/// than its count says.
pub fn decode_meter_blob(blob: &[u8]) -> Option<Vec<i16>> {
    let (count, rest) = blob.split_first_chunk::<4>()?;
    let count = u32::from_le_bytes(*count) as usize;
    let body = rest.get(..count.checked_mul(2)?)?;
    Some(
        body.chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect(),
    )
}

/// Gain reduction trigger for inputs running close to 0 dB.
#[derive(Debug, Clone)]
pub struct ClipGuard {
    enabled: bool,
    threshold_db: f32,
    excluded: BTreeSet<usize>,
}

impl ClipGuard {
    pub fn new(threshold_db: f32, excluded: impl IntoIterator<Item = usize>) -> Self {
        Self {
            enabled: false,
            threshold_db,
            excluded: excluded.into_iter().collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// Indices whose smoothed level is above the threshold. Empty while
    /// protection is disabled. Protection stays enabled after a trip.
    pub fn tripped(&self, smoothed_db: &[f32]) -> Vec<usize> {
        if !self.enabled {
            return Vec::new();
        }
        smoothed_db
            .iter()
            .enumerate()
            .filter(|(i, db)| **db > self.threshold_db && !self.excluded.contains(i))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oldest_first(m: &Meter) -> [i32; METER_WINDOW] {
        std::array::from_fn(|i| m.window[(m.next + i) % METER_WINDOW])
    }

    #[test]
    fn fresh_meter_is_all_sentinel() {
        let m = Meter::new();
        assert_eq!(m.sum, METER_SENTINEL as i32 * 4);
        assert_eq!(oldest_first(&m), [METER_SENTINEL as i32; 4]);
    }

    #[test]
    fn four_inserts_flush_the_sentinel() {
        let mut m = Meter::new();
        for v in [-100, -200, -300, -400] {
            m.insert(v);
        }
        assert_eq!(m.sum, -1000);
        assert_eq!(oldest_first(&m), [-100, -200, -300, -400]);

        // Fifth insert evicts the oldest
        assert_eq!(m.insert(0), -900);
        assert_eq!(oldest_first(&m), [-200, -300, -400, 0]);
    }

    #[test]
    fn bank_smooths_to_db() {
        let mut bank = MeterBank::default();
        let frame = vec![-512i16; METER_CHANNELS + 2];
        let mut out = Vec::new();
        for _ in 0..4 {
            out = bank.push_batch(&frame);
        }
        assert_eq!(out.len(), METER_CHANNELS);
        assert!((out[0] + 2.0).abs() < 1e-6);
    }

    #[test]
    fn decodes_blob() {
        let mut blob = 3u32.to_le_bytes().to_vec();
        for v in [-1i16, 256, i16::MIN] {
            blob.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(decode_meter_blob(&blob), Some(vec![-1, 256, i16::MIN]));

        blob.pop();
        assert_eq!(decode_meter_blob(&blob), None);
        assert_eq!(decode_meter_blob(&[1, 0]), None);
    }

    #[test]
    fn clip_guard_respects_enable_and_exclusions() {
        let mut guard = ClipGuard::new(DEFAULT_CLIP_THRESHOLD_DB, [8, 9]);
        let levels = [-2.0, -10.0, -2.9, -3.0, 0.0, -40.0, -40.0, -40.0, 0.0, 0.0];
        assert!(guard.tripped(&levels).is_empty());
        assert!(guard.toggle());
        assert_eq!(guard.tripped(&levels), vec![0, 2, 4]);
        assert!(guard.is_enabled());
    }
}
