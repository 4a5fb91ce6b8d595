//! The telemetry simulator: one reservoir's worth of process variables that
//! drift, jitter, drain and jump on a script, plus manual overrides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::events::{EventSchedule, ScriptedEvent};
use crate::history::HistoryIter;
use crate::noise::{FastNoise, NoiseSource};
use crate::profile::SimProfile;
use crate::state::{round_to, ProcessState, Variable};

/// Noise is truncated to this many standard deviations.
pub const NOISE_BOUND_SIGMAS: f64 = 3.0;

pub const INITIAL_ACTION: &str = "System initialized";

// ---------------------------------------------------------------------------
// Manual actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualAction {
    PhUp,
    PhDown,
    AddNutrient,
    RefillWater,
    Reset,
}

impl ManualAction {
    pub const ALL: [ManualAction; 5] = [
        ManualAction::PhUp,
        ManualAction::PhDown,
        ManualAction::AddNutrient,
        ManualAction::RefillWater,
        ManualAction::Reset,
    ];
}

impl FromStr for ManualAction {
    type Err = String;

    /// Case-insensitive; accepts `-` in place of `_` and the short forms
    /// `nutrient` / `refill`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        match norm.as_str() {
            "ph_up" => Ok(Self::PhUp),
            "ph_down" => Ok(Self::PhDown),
            "add_nutrient" | "nutrient" => Ok(Self::AddNutrient),
            "refill_water" | "refill" => Ok(Self::RefillWater),
            "reset" => Ok(Self::Reset),
            _ => Err(format!("unknown manual action '{}'", s.trim())),
        }
    }
}

impl fmt::Display for ManualAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PhUp => "ph_up",
            Self::PhDown => "ph_down",
            Self::AddNutrient => "add_nutrient",
            Self::RefillWater => "refill_water",
            Self::Reset => "reset",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Owns the base values of every process variable, the step counter and the
/// event schedule. Exclusively owned by one session; wrap it in a lock if
/// several viewers share it.
pub struct TelemetrySimulator<N = FastNoise> {
    profile: SimProfile,
    base: ProcessState,
    schedule: EventSchedule,
    noise: N,
}

impl TelemetrySimulator<FastNoise> {
    /// Simulator with a randomly seeded noise source.
    pub fn new(profile: SimProfile) -> Self {
        Self::with_noise(profile, FastNoise::new())
    }
}

impl Default for TelemetrySimulator<FastNoise> {
    fn default() -> Self {
        Self::new(SimProfile::default())
    }
}

impl<N: NoiseSource> TelemetrySimulator<N> {
    pub fn with_noise(profile: SimProfile, noise: N) -> Self {
        let base = initial_state(&profile);
        let schedule = EventSchedule::new(profile.events.clone(), profile.trigger);
        Self {
            profile,
            base,
            schedule,
            noise,
        }
    }

    pub fn profile(&self) -> &SimProfile {
        &self.profile
    }

    /// Copy of the current base values and counters. Does not advance.
    pub fn state(&self) -> ProcessState {
        self.base.clone()
    }

    /// Advance one step and return the displayed reading.
    pub fn snapshot(&mut self) -> ProcessState {
        self.base.step_count += 1;
        let step = self.base.step_count;

        for event in self.schedule.due(step) {
            self.apply_event(&event);
        }

        // Linear trends (evaporation, discharge, uptake) accumulate into
        // the base so later jumps and refills start from the real level.
        for var in Variable::ALL {
            let c = self.profile.channels.get(var);
            if c.trend_per_step != 0.0 {
                let slot = self.base.value_mut(var);
                *slot = c.clamp(*slot + c.trend_per_step);
            }
        }

        let mut out = self.base.clone();
        for var in Variable::ALL {
            let c = self.profile.channels.get(var);
            let drift = c.drift_amplitude * (step as f64 * c.drift_rate).sin();
            let bound = NOISE_BOUND_SIGMAS * c.noise_sigma;
            let noise = self.noise.gaussian(c.noise_sigma).clamp(-bound, bound);
            let raw = c.clamp(self.base.value(var) + drift + noise);
            *out.value_mut(var) = c.clamp(round_to(raw, c.decimals));
        }

        out
    }

    /// Apply one fixed-magnitude manual adjustment and return the
    /// confirmation shown to the operator.
    pub fn manual_action(&mut self, action: ManualAction) -> String {
        let manual = self.profile.manual.clone();
        let message = match action {
            ManualAction::PhUp => {
                self.shift(Variable::Ph, manual.ph_step);
                format!("pH UP dosed - pH increased by +{:.2}", manual.ph_step)
            }
            ManualAction::PhDown => {
                self.shift(Variable::Ph, -manual.ph_step);
                format!("pH DOWN dosed - pH decreased by -{:.2}", manual.ph_step)
            }
            ManualAction::AddNutrient => {
                self.shift(Variable::Ec, manual.nutrient_step);
                format!("Nutrients added - EC increased by +{:.2}", manual.nutrient_step)
            }
            ManualAction::RefillWater => {
                self.base.water_level = manual.refill_level;
                format!("Water reservoir refilled to {} cm", manual.refill_level)
            }
            ManualAction::Reset => {
                self.reset();
                "System reset to initial conditions".to_string()
            }
        };

        if action != ManualAction::Reset {
            self.base.action_count += 1;
        }
        self.base.last_action = message.clone();

        info!(
            %action,
            step = self.base.step_count,
            actions = self.base.action_count,
            "manual action applied"
        );
        message
    }

    /// Synthetic past readings for charting, ending now. Independent of the
    /// live state; every call draws fresh noise.
    pub fn history(&self, duration_hours: f64) -> HistoryIter<FastNoise> {
        self.history_until(duration_hours, now_unix(), FastNoise::new())
    }

    /// [`history`](Self::history) with an explicit end timestamp and noise
    /// source.
    pub fn history_until<H: NoiseSource>(
        &self,
        duration_hours: f64,
        end_ts: i64,
        noise: H,
    ) -> HistoryIter<H> {
        HistoryIter::new(self.profile.history.clone(), duration_hours, end_ts, noise)
    }

    fn apply_event(&mut self, event: &ScriptedEvent) {
        for &(var, target) in event.kind.jumps() {
            let c = self.profile.channels.get(var);
            let slot = self.base.value_mut(var);
            let next = if var.is_draining() {
                slot.min(target)
            } else {
                target
            };
            *slot = c.clamp(next);
        }
        self.base.last_action = event.message.clone();
        if event.kind.is_corrective() {
            self.base.action_count += 1;
        }
        debug!(
            step = self.base.step_count,
            kind = %event.kind,
            "scripted event fired"
        );
    }

    fn shift(&mut self, var: Variable, delta: f64) {
        let c = self.profile.channels.get(var);
        let slot = self.base.value_mut(var);
        *slot = c.clamp(*slot + delta);
    }

    fn reset(&mut self) {
        self.base = initial_state(&self.profile);
        self.schedule.rearm();
    }
}

fn initial_state(profile: &SimProfile) -> ProcessState {
    let c = &profile.channels;
    ProcessState {
        ph: c.ph.initial,
        ec: c.ec.initial,
        water_temp: c.water_temp.initial,
        air_temp: c.air_temp.initial,
        humidity: c.humidity.initial,
        water_level: c.water_level.initial,
        battery: c.battery.initial,
        step_count: 0,
        last_action: INITIAL_ACTION.to_string(),
        action_count: 0,
    }
}

pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

// ===========================================================================
// Tests
// ===========================================================================
