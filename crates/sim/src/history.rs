//! Synthetic past trajectory for chart rendering.

use serde::{Deserialize, Serialize};

use crate::noise::NoiseSource;
use crate::profile::{HistoryProfile, Wave};
use crate::state::round_to;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySample {
    /// Unix seconds.
    pub ts: i64,
    #[serde(rename = "pH")]
    pub ph: f64,
    pub ec: f64,
    pub water_temp: f64,
}

/// Number of samples covering `duration_hours` at `interval_secs`. Capped so
/// the oldest timestamp offset still fits in an `i64`.
pub fn sample_count(duration_hours: f64, interval_secs: u64) -> usize {
    if !duration_hours.is_finite() || duration_hours <= 0.0 || interval_secs == 0 {
        return 0;
    }
    let max = usize::try_from(i64::MAX as u64 / interval_secs).unwrap_or(usize::MAX);
    let n = (duration_hours * 3600.0 / interval_secs as f64).round() as usize;
    n.min(max)
}

/// Lazy, finite, oldest-first sequence of synthetic readings ending at
/// `end_ts`. Each sample draws fresh noise; the iterator owns its source.
pub struct HistoryIter<N> {
    profile: HistoryProfile,
    noise: N,
    end_ts: i64,
    len: usize,
    next: usize,
}

impl<N: NoiseSource> HistoryIter<N> {
    pub fn new(profile: HistoryProfile, duration_hours: f64, end_ts: i64, noise: N) -> Self {
        let len = sample_count(duration_hours, profile.interval_secs);
        Self {
            profile,
            noise,
            end_ts,
            len,
            next: 0,
        }
    }
}

fn wave<N: NoiseSource>(w: &Wave, back: usize, decimals: u32, noise: &mut N) -> f64 {
    let seasonal = w.base + (back as f64 * w.rate).sin() * w.amplitude;
    round_to(seasonal + noise.gaussian(w.noise_sigma), decimals)
}

impl<N: NoiseSource> Iterator for HistoryIter<N> {
    type Item = HistorySample;

    fn next(&mut self) -> Option<HistorySample> {
        if self.next >= self.len {
            return None;
        }
        // Samples are indexed backward from the newest one.
        let back = self.len - 1 - self.next;
        self.next += 1;

        let interval = self.profile.interval_secs as i64;
        let ts = self
            .end_ts
            .saturating_sub((back as i64).saturating_mul(interval));

        let p = &self.profile;
        Some(HistorySample {
            ts,
            ph: wave(&p.ph, back, 2, &mut self.noise),
            ec: wave(&p.ec, back, 2, &mut self.noise),
            water_temp: wave(&p.water_temp, back, 1, &mut self.noise),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.len - self.next;
        (left, Some(left))
    }
}

impl<N: NoiseSource> ExactSizeIterator for HistoryIter<N> {}

// ===========================================================================
// Tests
// ===========================================================================
