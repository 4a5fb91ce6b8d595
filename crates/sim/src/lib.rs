//! Synthetic telemetry for a portable hydroponic monitor.
//!
//! [`TelemetrySimulator`] produces a believable live control loop (pH, EC,
//! temperatures, humidity, reservoir level and battery) for dashboards
//! running without hardware. Everything tunable lives in [`SimProfile`].

pub mod events;
pub mod history;
pub mod noise;
pub mod plant;
pub mod profile;
pub mod simulator;
pub mod state;
pub mod status;

pub use events::{EventKind, ScriptedEvent, TriggerMode};
pub use history::{HistoryIter, HistorySample};
pub use noise::{FastNoise, NoiseSource, Silent};
pub use profile::SimProfile;
pub use simulator::{now_unix, ManualAction, TelemetrySimulator};
pub use state::{ProcessState, Variable};
pub use status::{Readout, Status, Target, Targets};
