//! Scripted, step-indexed state jumps that tell the demo's control story:
//! a variable drifts out of band, then an automatic correction pulls it back.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::Variable;

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PhDriftHigh,
    AutoCorrectPh,
    EcDriftLow,
    AutoCorrectEc,
    WaterLow,
    AllStable,
}

impl EventKind {
    /// Fixed jumps applied when the event fires: each variable is set to the
    /// given value (draining variables only ever move down).
    pub fn jumps(self) -> &'static [(Variable, f64)] {
        match self {
            Self::PhDriftHigh => &[(Variable::Ph, 6.1)],
            Self::AutoCorrectPh => &[(Variable::Ph, 5.85)],
            Self::EcDriftLow => &[(Variable::Ec, 1.08)],
            Self::AutoCorrectEc => &[(Variable::Ec, 1.18)],
            Self::WaterLow => &[(Variable::WaterLevel, 12.0)],
            Self::AllStable => &[
                (Variable::Ph, 5.80),
                (Variable::Ec, 1.20),
                (Variable::WaterLevel, 18.0),
            ],
        }
    }

    /// Corrective events count toward the "actions taken" counter.
    pub fn is_corrective(self) -> bool {
        matches!(self, Self::AutoCorrectPh | Self::AutoCorrectEc)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PhDriftHigh => "ph_drift_high",
            Self::AutoCorrectPh => "auto_correct_ph",
            Self::EcDriftLow => "ec_drift_low",
            Self::AutoCorrectEc => "auto_correct_ec",
            Self::WaterLow => "water_low",
            Self::AllStable => "all_stable",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Table entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedEvent {
    pub step: u64,
    pub kind: EventKind,
    pub message: String,
}

impl ScriptedEvent {
    pub fn new(step: u64, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            step,
            kind,
            message: message.into(),
        }
    }
}

/// The demo narrative: pH drifts high and is corrected, EC drops and is
/// topped up, water runs low, then everything settles.
pub fn default_events() -> Vec<ScriptedEvent> {
    vec![
        ScriptedEvent::new(50, EventKind::PhDriftHigh, "pH slowly increasing..."),
        ScriptedEvent::new(100, EventKind::AutoCorrectPh, "AUTO: pH adjusted with pH DOWN"),
        ScriptedEvent::new(150, EventKind::EcDriftLow, "EC decreasing (plant uptake)"),
        ScriptedEvent::new(200, EventKind::AutoCorrectEc, "AUTO: Nutrients added"),
        ScriptedEvent::new(250, EventKind::WaterLow, "Water level dropping"),
        ScriptedEvent::new(300, EventKind::AllStable, "All parameters stabilized"),
    ]
}

// ---------------------------------------------------------------------------
// Trigger matching
// ---------------------------------------------------------------------------

/// How a table entry is matched against the step counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Fire once the counter reaches or passes the trigger step.
    #[default]
    CatchUp,
    /// Fire only on the exact trigger step.
    Exact,
}

/// Event table plus per-entry fired flags. Every entry fires at most once
/// between resets.
#[derive(Debug, Clone)]
pub struct EventSchedule {
    events: Vec<ScriptedEvent>,
    fired: Vec<bool>,
    mode: TriggerMode,
}

impl EventSchedule {
    pub fn new(events: Vec<ScriptedEvent>, mode: TriggerMode) -> Self {
        let fired = vec![false; events.len()];
        Self {
            events,
            fired,
            mode,
        }
    }

    /// Mark and return the entries due at `step`, in table order.
    pub fn due(&mut self, step: u64) -> Vec<ScriptedEvent> {
        let mut out = Vec::new();
        for (event, fired) in self.events.iter().zip(self.fired.iter_mut()) {
            if *fired {
                continue;
            }
            let hit = match self.mode {
                TriggerMode::CatchUp => step >= event.step,
                TriggerMode::Exact => step == event.step,
            };
            if hit {
                *fired = true;
                out.push(event.clone());
            }
        }
        out
    }

    /// Re-arm every entry.
    pub fn rearm(&mut self) {
        self.fired.iter_mut().for_each(|f| *f = false);
    }

    pub fn pending(&self) -> usize {
        self.fired.iter().filter(|f| !**f).count()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
