//! Process variables of the hydroponic reservoir and the snapshot type handed
//! to display and control layers.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Variable identifiers
// ---------------------------------------------------------------------------

/// One continuously varying process variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Ph,
    Ec,
    WaterTemp,
    AirTemp,
    Humidity,
    WaterLevel,
    Battery,
}

impl Variable {
    pub const ALL: [Variable; 7] = [
        Variable::Ph,
        Variable::Ec,
        Variable::WaterTemp,
        Variable::AirTemp,
        Variable::Humidity,
        Variable::WaterLevel,
        Variable::Battery,
    ];

    /// Variables that only drain between manual refills (evaporation,
    /// discharge). Scripted events may lower them but never raise them.
    pub fn is_draining(self) -> bool {
        matches!(self, Variable::WaterLevel | Variable::Battery)
    }

    pub fn unit(self) -> &'static str {
        match self {
            Variable::Ph => "",
            Variable::Ec => "mS/cm",
            Variable::WaterTemp | Variable::AirTemp => "°C",
            Variable::Humidity => "%",
            Variable::WaterLevel => "cm",
            Variable::Battery => "V",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Variable::Ph => "ph",
            Variable::Ec => "ec",
            Variable::WaterTemp => "water_temp",
            Variable::AirTemp => "air_temp",
            Variable::Humidity => "humidity",
            Variable::WaterLevel => "water_level",
            Variable::Battery => "battery",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// ProcessState
// ---------------------------------------------------------------------------

/// Point-in-time reading of every process variable plus the simulator's
/// counters. Always handed out by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessState {
    #[serde(rename = "pH")]
    pub ph: f64,
    pub ec: f64,
    pub water_temp: f64,
    pub air_temp: f64,
    pub humidity: f64,
    pub water_level: f64,
    pub battery: f64,
    pub step_count: u64,
    pub last_action: String,
    pub action_count: u64,
}

impl ProcessState {
    pub fn value(&self, var: Variable) -> f64 {
        match var {
            Variable::Ph => self.ph,
            Variable::Ec => self.ec,
            Variable::WaterTemp => self.water_temp,
            Variable::AirTemp => self.air_temp,
            Variable::Humidity => self.humidity,
            Variable::WaterLevel => self.water_level,
            Variable::Battery => self.battery,
        }
    }

    pub fn value_mut(&mut self, var: Variable) -> &mut f64 {
        match var {
            Variable::Ph => &mut self.ph,
            Variable::Ec => &mut self.ec,
            Variable::WaterTemp => &mut self.water_temp,
            Variable::AirTemp => &mut self.air_temp,
            Variable::Humidity => &mut self.humidity,
            Variable::WaterLevel => &mut self.water_level,
            Variable::Battery => &mut self.battery,
        }
    }
}

/// Round `value` to `decimals` places for display.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

// ===========================================================================
// Tests
// ===========================================================================
