//! Tap-tempo detection and the blink loop that shows the current tempo.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::runtime::ShutdownFlag;

/// 120 BPM.
pub const DEFAULT_TEMPO_SECS: f32 = 0.5;

/// Taps further apart than this start a new measurement.
pub const TAP_GAP_CEILING: Duration = Duration::from_secs(3);

/// Fraction of each beat the tap LED stays lit.
const BLINK_DUTY: f32 = 0.2;

/// Averages the intervals between consecutive taps.
#[derive(Debug, Clone)]
pub struct TempoDetector {
    last_tap: Option<Instant>,
    intervals: u32,
    cumulative: Duration,
    ceiling: Duration,
}

impl Default for TempoDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl TempoDetector {
    pub fn new() -> Self {
        Self::with_ceiling(TAP_GAP_CEILING)
    }

    pub fn with_ceiling(ceiling: Duration) -> Self {
        Self {
            last_tap: None,
            intervals: 0,
            cumulative: Duration::ZERO,
            ceiling,
        }
    }

    /// Register a tap at `now`. Returns the new tempo in seconds once at least
    /// one interval has been measured; a lone tap returns `None`.
    pub fn tap(&mut self, now: Instant) -> Option<f32> {
        let previous = self.last_tap.replace(now);
        let gap = previous.map(|last| now.saturating_duration_since(last));
        match gap {
            Some(gap) if gap <= self.ceiling => {
                self.intervals += 1;
                self.cumulative += gap;
                let tempo = self.cumulative.as_secs_f32() / self.intervals as f32;
                log::debug!(target: "tempo", "tap {} -> {:.3}s", self.intervals + 1, tempo);
                Some(tempo)
            }
            _ => {
                self.intervals = 0;
                self.cumulative = Duration::ZERO;
                None
            }
        }
    }
}

/// The current tempo, shared between the coordinator (writer) and the blink
/// loop (reader). Stored as the bit pattern of an `f32`.
#[derive(Debug, Clone)]
pub struct TempoCell(Arc<AtomicU32>);

impl Default for TempoCell {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPO_SECS)
    }
}

impl TempoCell {
    pub fn new(seconds: f32) -> Self {
        Self(Arc::new(AtomicU32::new(seconds.to_bits())))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, seconds: f32) {
        self.0.store(seconds.to_bits(), Ordering::Relaxed);
    }

    /// On and off phases of one blink cycle at the current tempo.
    pub fn blink_phases(&self) -> (Duration, Duration) {
        let beat = self.get().max(0.01);
        (
            Duration::from_secs_f32(beat * BLINK_DUTY),
            Duration::from_secs_f32(beat * (1.0 - BLINK_DUTY)),
        )
    }
}

/// Toggle the tap LED forever: `notify(true)`, wait the on phase, `notify(false)`,
/// wait the off phase. The tempo is re-read every cycle. The loop ends when the
/// shutdown flag is set or `notify` returns false.
pub fn spawn_blink_loop<F>(
    tempo: TempoCell,
    shutdown: ShutdownFlag,
    mut notify: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnMut(bool) -> bool + Send + 'static,
{
    std::thread::Builder::new()
        .name("tempo-blink".into())
        .spawn(move || {
            while !shutdown.is_set() {
                let (on, off) = tempo.blink_phases();
                if !notify(true) {
                    break;
                }
                std::thread::sleep(on);
                if shutdown.is_set() || !notify(false) {
                    break;
                }
                std::thread::sleep(off);
            }
            log::debug!(target: "tempo", "blink loop stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tap_does_not_publish() {
        let mut det = TempoDetector::new();
        assert_eq!(det.tap(Instant::now()), None);
    }

    #[test]
    fn two_taps_set_interval() {
        let mut det = TempoDetector::new();
        let t0 = Instant::now();
        det.tap(t0);
        let tempo = det.tap(t0 + Duration::from_millis(500)).unwrap();
        assert!((tempo - 0.5).abs() < 1e-4);
    }

    #[test]
    fn taps_average_intervals() {
        let mut det = TempoDetector::new();
        let t0 = Instant::now();
        det.tap(t0);
        det.tap(t0 + Duration::from_millis(400));
        let tempo = det.tap(t0 + Duration::from_millis(1000)).unwrap();
        assert!((tempo - 0.5).abs() < 1e-4);
    }

    #[test]
    fn long_gap_resets_accumulation() {
        let mut det = TempoDetector::new();
        let t0 = Instant::now();
        det.tap(t0);
        det.tap(t0 + Duration::from_millis(500));
        let late = t0 + Duration::from_millis(4500);
        assert_eq!(det.tap(late), None);
        let tempo = det.tap(late + Duration::from_millis(800)).unwrap();
        assert!((tempo - 0.8).abs() < 1e-4);
    }

    #[test]
    fn cell_shares_tempo_and_splits_phases() {
        let cell = TempoCell::default();
        assert_eq!(cell.get(), DEFAULT_TEMPO_SECS);
        let reader = cell.clone();
        cell.set(1.0);
        let (on, off) = reader.blink_phases();
        assert!((on.as_secs_f32() - 0.2).abs() < 1e-4);
        assert!((off.as_secs_f32() - 0.8).abs() < 1e-4);
    }

    #[test]
    fn blink_loop_stops_on_shutdown() {
        let shutdown = ShutdownFlag::new();
        let flag = shutdown.clone();
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = spawn_blink_loop(TempoCell::new(0.05), shutdown, move |on| tx.send(on).is_ok()).unwrap();
        assert_eq!(rx.recv().unwrap(), true);
        assert_eq!(rx.recv().unwrap(), false);
        flag.set();
        handle.join().unwrap();
    }
}
