//! Simulator profile: every tunable of the telemetry model in one struct.
//!
//! Deserializable from TOML (the `[simulator]` table of the hub and node
//! config files). Any table or field left out falls back to the demo
//! defaults; a partly given channel or wave keeps that variable's defaults
//! for the fields it omits.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::events::{default_events, ScriptedEvent, TriggerMode};
use crate::state::Variable;

/// Upper bound on display precision.
const MAX_DECIMALS: u32 = 6;

// ---------------------------------------------------------------------------
// Per-variable channel
// ---------------------------------------------------------------------------

/// Shape of one process variable.
///
/// Each snapshot shows `base + drift_amplitude * sin(step * drift_rate) +
/// noise`, where `base` starts at `initial` and moves by `trend_per_step`
/// every step. The result is clamped to `[min, max]` and rounded to
/// `decimals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelProfile {
    pub initial: f64,
    pub noise_sigma: f64,
    pub drift_amplitude: f64,
    /// Radians per step.
    pub drift_rate: f64,
    pub trend_per_step: f64,
    pub min: f64,
    pub max: f64,
    pub decimals: u32,
}

impl ChannelProfile {
    fn steady(initial: f64, noise_sigma: f64, min: f64, max: f64, decimals: u32) -> Self {
        Self {
            initial,
            noise_sigma,
            drift_amplitude: 0.0,
            drift_rate: 0.0,
            trend_per_step: 0.0,
            min,
            max,
            decimals,
        }
    }

    fn with_drift(mut self, amplitude: f64, rate: f64) -> Self {
        self.drift_amplitude = amplitude;
        self.drift_rate = rate;
        self
    }

    fn with_trend(mut self, per_step: f64) -> Self {
        self.trend_per_step = per_step;
        self
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Copy every `Some` field of a patch over the matching field of `$base`.
macro_rules! overlay {
    ($base:ident, $patch:ident, $($field:ident),+) => {
        $(if let Some(v) = $patch.$field {
            $base.$field = v;
        })+
    };
}

/// A channel as written in TOML: any subset of fields.
#[derive(Debug, Default, Deserialize)]
struct ChannelPatch {
    initial: Option<f64>,
    noise_sigma: Option<f64>,
    drift_amplitude: Option<f64>,
    drift_rate: Option<f64>,
    trend_per_step: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    decimals: Option<u32>,
}

impl ChannelPatch {
    fn over(self, mut base: ChannelProfile) -> ChannelProfile {
        let patch = self;
        overlay!(
            base,
            patch,
            initial,
            noise_sigma,
            drift_amplitude,
            drift_rate,
            trend_per_step,
            min,
            max,
            decimals
        );
        base
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChannelsPatch {
    ph: ChannelPatch,
    ec: ChannelPatch,
    water_temp: ChannelPatch,
    air_temp: ChannelPatch,
    humidity: ChannelPatch,
    water_level: ChannelPatch,
    battery: ChannelPatch,
}

impl From<ChannelsPatch> for Channels {
    fn from(p: ChannelsPatch) -> Self {
        let d = Channels::default();
        Self {
            ph: p.ph.over(d.ph),
            ec: p.ec.over(d.ec),
            water_temp: p.water_temp.over(d.water_temp),
            air_temp: p.air_temp.over(d.air_temp),
            humidity: p.humidity.over(d.humidity),
            water_level: p.water_level.over(d.water_level),
            battery: p.battery.over(d.battery),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ChannelsPatch")]
pub struct Channels {
    pub ph: ChannelProfile,
    pub ec: ChannelProfile,
    pub water_temp: ChannelProfile,
    pub air_temp: ChannelProfile,
    pub humidity: ChannelProfile,
    pub water_level: ChannelProfile,
    pub battery: ChannelProfile,
}

impl Channels {
    pub fn get(&self, var: Variable) -> &ChannelProfile {
        match var {
            Variable::Ph => &self.ph,
            Variable::Ec => &self.ec,
            Variable::WaterTemp => &self.water_temp,
            Variable::AirTemp => &self.air_temp,
            Variable::Humidity => &self.humidity,
            Variable::WaterLevel => &self.water_level,
            Variable::Battery => &self.battery,
        }
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            ph: ChannelProfile::steady(5.80, 0.01, 0.0, 14.0, 2).with_drift(0.03, 0.02),
            ec: ChannelProfile::steady(1.20, 0.005, 0.8, 5.0, 2)
                .with_drift(0.02, 0.015)
                .with_trend(-0.0001),
            water_temp: ChannelProfile::steady(20.5, 0.1, 0.0, 40.0, 1).with_drift(0.2, 0.01),
            air_temp: ChannelProfile::steady(24.0, 0.5, -10.0, 50.0, 1).with_drift(0.5, 0.008),
            humidity: ChannelProfile::steady(65.0, 0.5, 0.0, 100.0, 1).with_drift(1.5, 0.005),
            water_level: ChannelProfile::steady(18.5, 0.0, 5.0, 30.0, 1).with_trend(-0.002),
            battery: ChannelProfile::steady(12.4, 0.0, 11.5, 14.4, 1).with_trend(-0.000_05),
        }
    }
}

// ---------------------------------------------------------------------------
// Manual actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualProfile {
    pub ph_step: f64,
    pub nutrient_step: f64,
    pub refill_level: f64,
}

impl Default for ManualProfile {
    fn default() -> Self {
        Self {
            ph_step: 0.15,
            nutrient_step: 0.08,
            refill_level: 20.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Synthetic history
// ---------------------------------------------------------------------------

/// `base + amplitude * sin(index * rate) + N(0, noise_sigma)`, where `index`
/// counts samples backward from the newest one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wave {
    pub base: f64,
    pub amplitude: f64,
    pub rate: f64,
    pub noise_sigma: f64,
}

#[derive(Debug, Default, Deserialize)]
struct WavePatch {
    base: Option<f64>,
    amplitude: Option<f64>,
    rate: Option<f64>,
    noise_sigma: Option<f64>,
}

impl WavePatch {
    fn over(self, mut wave: Wave) -> Wave {
        let patch = self;
        overlay!(wave, patch, base, amplitude, rate, noise_sigma);
        wave
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HistoryPatch {
    interval_secs: Option<u64>,
    ph: WavePatch,
    ec: WavePatch,
    water_temp: WavePatch,
}

impl From<HistoryPatch> for HistoryProfile {
    fn from(p: HistoryPatch) -> Self {
        let d = HistoryProfile::default();
        Self {
            interval_secs: p.interval_secs.unwrap_or(d.interval_secs),
            ph: p.ph.over(d.ph),
            ec: p.ec.over(d.ec),
            water_temp: p.water_temp.over(d.water_temp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "HistoryPatch")]
pub struct HistoryProfile {
    pub interval_secs: u64,
    pub ph: Wave,
    pub ec: Wave,
    pub water_temp: Wave,
}

impl Default for HistoryProfile {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            ph: Wave {
                base: 5.80,
                amplitude: 0.08,
                rate: 0.1,
                noise_sigma: 0.02,
            },
            ec: Wave {
                base: 1.20,
                amplitude: 0.04,
                rate: 0.05,
                noise_sigma: 0.01,
            },
            water_temp: Wave {
                base: 20.5,
                amplitude: 0.0,
                rate: 0.0,
                noise_sigma: 0.3,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Full profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimProfile {
    pub channels: Channels,
    pub trigger: TriggerMode,
    pub events: Vec<ScriptedEvent>,
    pub manual: ManualProfile,
    pub history: HistoryProfile,
}

impl Default for SimProfile {
    fn default() -> Self {
        Self {
            channels: Channels::default(),
            trigger: TriggerMode::default(),
            events: default_events(),
            manual: ManualProfile::default(),
            history: HistoryProfile::default(),
        }
    }
}

impl SimProfile {
    /// Validate the whole profile. Returns `Ok(())` or an error listing
    /// every violation found.
    pub fn validate(&self) -> Result<()> {
        let errors = self.errors();
        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "simulator profile invalid ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    /// Every violation as a separate message, for callers that merge them
    /// into a larger report.
    pub fn errors(&self) -> Vec<String> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_channels(&mut errors);
        self.validate_events(&mut errors);
        self.validate_manual(&mut errors);
        self.validate_history(&mut errors);
        errors
    }

    fn validate_channels(&self, errors: &mut Vec<String>) {
        for var in Variable::ALL {
            let c = self.channels.get(var);

            if !(c.min < c.max) {
                errors.push(format!("{var}: min ({}) must be below max ({})", c.min, c.max));
            } else if !(c.min..=c.max).contains(&c.initial) {
                errors.push(format!(
                    "{var}: initial {} outside [{}, {}]",
                    c.initial, c.min, c.max
                ));
            }
            if !(c.noise_sigma >= 0.0) {
                errors.push(format!("{var}: noise_sigma must be non-negative"));
            }
            if !(c.drift_amplitude >= 0.0) {
                errors.push(format!("{var}: drift_amplitude must be non-negative"));
            }
            if !c.drift_rate.is_finite() || !c.trend_per_step.is_finite() {
                errors.push(format!("{var}: drift_rate and trend_per_step must be finite"));
            }
            if c.decimals > MAX_DECIMALS {
                errors.push(format!(
                    "{var}: decimals {} exceeds {MAX_DECIMALS}",
                    c.decimals
                ));
            }

            // Draining channels must be non-increasing between refills.
            if var.is_draining() {
                if c.noise_sigma != 0.0 {
                    errors.push(format!("{var}: draining channel must have zero noise_sigma"));
                }
                if c.drift_amplitude != 0.0 {
                    errors.push(format!(
                        "{var}: draining channel must have zero drift_amplitude"
                    ));
                }
                if c.trend_per_step > 0.0 {
                    errors.push(format!(
                        "{var}: draining channel trend_per_step must not be positive, got {}",
                        c.trend_per_step
                    ));
                }
            }
        }

        for var in [Variable::Ec, Variable::WaterLevel, Variable::Humidity] {
            let c = self.channels.get(var);
            if c.min < 0.0 {
                errors.push(format!("{var}: floor {} must be non-negative", c.min));
            }
        }

        let ph = &self.channels.ph;
        if ph.min < 0.0 || ph.max > 14.0 {
            errors.push(format!(
                "ph: range [{}, {}] exceeds the pH scale [0, 14]",
                ph.min, ph.max
            ));
        }
        let humidity = &self.channels.humidity;
        if humidity.max > 100.0 {
            errors.push(format!("humidity: max {} exceeds 100%", humidity.max));
        }
    }

    fn validate_events(&self, errors: &mut Vec<String>) {
        let mut prev_step = 0;
        for (i, e) in self.events.iter().enumerate() {
            if e.step == 0 {
                errors.push(format!("events[{i}] ({}): step must be at least 1", e.kind));
            }
            if e.step < prev_step {
                errors.push(format!(
                    "events[{i}] ({}): step {} is before the previous entry's step {prev_step}",
                    e.kind, e.step
                ));
            }
            if e.message.trim().is_empty() {
                errors.push(format!("events[{i}] ({}): message is empty", e.kind));
            }
            prev_step = prev_step.max(e.step);
        }
    }

    fn validate_manual(&self, errors: &mut Vec<String>) {
        let m = &self.manual;
        if !(m.ph_step > 0.0) {
            errors.push(format!("manual.ph_step must be positive, got {}", m.ph_step));
        }
        if !(m.nutrient_step > 0.0) {
            errors.push(format!(
                "manual.nutrient_step must be positive, got {}",
                m.nutrient_step
            ));
        }
        let wl = &self.channels.water_level;
        if !(wl.min..=wl.max).contains(&m.refill_level) {
            errors.push(format!(
                "manual.refill_level {} outside water_level range [{}, {}]",
                m.refill_level, wl.min, wl.max
            ));
        }
    }

    fn validate_history(&self, errors: &mut Vec<String>) {
        let h = &self.history;
        if h.interval_secs == 0 {
            errors.push("history.interval_secs must be positive".to_string());
        }
        for (name, w) in [("ph", &h.ph), ("ec", &h.ec), ("water_temp", &h.water_temp)] {
            if !(w.noise_sigma >= 0.0) || !(w.amplitude >= 0.0) {
                errors.push(format!(
                    "history.{name}: amplitude and noise_sigma must be non-negative"
                ));
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
