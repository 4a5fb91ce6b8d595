//! Threshold colouring for readings against a target band.

use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Optimal,
    Warning,
    Critical,
}

impl Status {
    /// Most severe of `statuses`; `Optimal` when empty.
    pub fn worst<I: IntoIterator<Item = Status>>(statuses: I) -> Status {
        statuses.into_iter().max().unwrap_or(Status::Optimal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub target: f64,
    pub tolerance: f64,
}

impl Target {
    pub const fn new(target: f64, tolerance: f64) -> Self {
        Self { target, tolerance }
    }

    /// Within one tolerance is optimal, within two is a warning.
    pub fn evaluate(&self, value: f64) -> Status {
        let diff = (value - self.target).abs();
        if diff <= self.tolerance + EPSILON {
            Status::Optimal
        } else if diff <= 2.0 * self.tolerance + EPSILON {
            Status::Warning
        } else {
            Status::Critical
        }
    }
}

/// Dashboard bands for the three headline readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Targets {
    pub ph: Target,
    pub ec: Target,
    pub water_temp: Target,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            ph: Target::new(5.8, 0.15),
            ec: Target::new(1.2, 0.08),
            water_temp: Target::new(20.0, 2.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readout {
    #[serde(rename = "pH")]
    pub ph: Status,
    pub ec: Status,
    pub water_temp: Status,
    pub overall: Status,
}

impl Targets {
    pub fn readout(&self, ph: f64, ec: f64, water_temp: f64) -> Readout {
        let ph = self.ph.evaluate(ph);
        let ec = self.ec.evaluate(ec);
        let water_temp = self.water_temp.evaluate(water_temp);
        Readout {
            ph,
            ec,
            water_temp,
            overall: Status::worst([ph, ec, water_temp]),
        }
    }
}
