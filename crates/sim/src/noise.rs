//! Random perturbation sources.
//!
//! The simulator never touches a global RNG; it draws every perturbation
//! through [`NoiseSource`] so tests can swap in a seeded or silent source.

/// Supplier of standard-normal samples, N(0, 1).
pub trait NoiseSource {
    fn standard_normal(&mut self) -> f64;

    /// Sample from N(0, sigma).
    fn gaussian(&mut self, sigma: f64) -> f64 {
        sigma * self.standard_normal()
    }
}

// ---------------------------------------------------------------------------
// fastrand-backed source
// ---------------------------------------------------------------------------

/// Irwin-Hall approximation of N(0,1): sum of 12 uniform [0,1) values
/// minus 6. Output is naturally confined to [-6, 6].
pub struct FastNoise {
    rng: fastrand::Rng,
}

impl FastNoise {
    /// Randomly seeded source.
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    /// Reproducible source for tests and replays.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl Default for FastNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseSource for FastNoise {
    fn standard_normal(&mut self) -> f64 {
        let mut sum: f64 = 0.0;
        for _ in 0..12 {
            sum += self.rng.f64();
        }
        sum - 6.0
    }
}

// ---------------------------------------------------------------------------
// Silent source
// ---------------------------------------------------------------------------

/// Always returns zero. Isolates drift, events and clamping in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl NoiseSource for Silent {
    fn standard_normal(&mut self) -> f64 {
        0.0
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_noise_has_zero_mean() {
        let mut noise = FastNoise::with_seed(7);
        let n = 5000;
        let mean: f64 = (0..n).map(|_| noise.standard_normal()).sum::<f64>() / n as f64;
        // std error is 1/sqrt(5000) ≈ 0.014
        assert!(mean.abs() < 0.1, "mean should be near zero: {mean}");
    }

    #[test]
    fn fast_noise_has_unit_variance() {
        let mut noise = FastNoise::with_seed(11);
        let n = 5000;
        let samples: Vec<f64> = (0..n).map(|_| noise.standard_normal()).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        assert!((0.85..1.15).contains(&var), "variance should be near one: {var}");
    }

    #[test]
    fn fast_noise_is_bounded() {
        let mut noise = FastNoise::with_seed(3);
        for _ in 0..10_000 {
            let v = noise.standard_normal();
            assert!((-6.0..=6.0).contains(&v), "out of Irwin-Hall support: {v}");
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = FastNoise::with_seed(42);
        let mut b = FastNoise::with_seed(42);
        for _ in 0..100 {
            assert_eq!(a.standard_normal(), b.standard_normal());
        }
    }

    #[test]
    fn gaussian_scales_by_sigma() {
        let mut a = FastNoise::with_seed(5);
        let mut b = FastNoise::with_seed(5);
        let unit = a.standard_normal();
        assert_eq!(b.gaussian(0.5), 0.5 * unit);
    }

    #[test]
    fn silent_is_always_zero() {
        let mut s = Silent;
        assert_eq!(s.standard_normal(), 0.0);
        assert_eq!(s.gaussian(3.0), 0.0);
    }
}
