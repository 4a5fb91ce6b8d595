//! TOML config file loading and validation for the dashboard and the
//! simulator profile it hands to every session.

use anyhow::{bail, Context, Result};
use hydro_sim::{SimProfile, Target, Targets};
use serde::{Deserialize, Serialize};
use std::io;
use tracing::warn;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub simulator: SimProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Page polling cadence.
    pub refresh_secs: u64,
    pub history_hours: f64,
    pub max_history_hours: f64,
    pub max_sessions: usize,
    /// Node whose telemetry backs the `/api/device` routes.
    pub device_node: String,
    /// Readings kept for the device history (a day at 5 s).
    pub device_history_len: usize,
    pub targets: Targets,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 5,
            history_hours: 24.0,
            max_history_hours: 168.0,
            max_sessions: 64,
            device_node: "hydro-1".to_string(),
            device_history_len: 17_280,
            targets: Targets::default(),
        }
    }
}

const REFRESH_RANGE: std::ops::RangeInclusive<u64> = 2..=60;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate both tables. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_dashboard(&mut errors);
        errors.extend(
            self.simulator
                .errors()
                .into_iter()
                .map(|e| format!("simulator: {e}")),
        );

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_dashboard(&self, errors: &mut Vec<String>) {
        let d = &self.dashboard;

        if !REFRESH_RANGE.contains(&d.refresh_secs) {
            errors.push(format!(
                "dashboard: refresh_secs {} out of range [{}, {}]",
                d.refresh_secs,
                REFRESH_RANGE.start(),
                REFRESH_RANGE.end()
            ));
        }

        // ── History window ──────────────────────────────────────────
        if !(d.max_history_hours.is_finite() && d.max_history_hours > 0.0) {
            errors.push(format!(
                "dashboard: max_history_hours must be positive, got {}",
                d.max_history_hours
            ));
        }
        if !(d.history_hours.is_finite() && d.history_hours > 0.0) {
            errors.push(format!(
                "dashboard: history_hours must be positive, got {}",
                d.history_hours
            ));
        } else if d.history_hours > d.max_history_hours {
            errors.push(format!(
                "dashboard: history_hours ({}) exceeds max_history_hours ({})",
                d.history_hours, d.max_history_hours
            ));
        }

        // ── Capacities ──────────────────────────────────────────────
        if d.max_sessions == 0 {
            errors.push("dashboard: max_sessions must be positive".to_string());
        }
        if d.device_history_len == 0 {
            errors.push("dashboard: device_history_len must be positive".to_string());
        }

        // ── Device topic segment ────────────────────────────────────
        if d.device_node.trim().is_empty() {
            errors.push("dashboard: device_node is empty".to_string());
        } else if d.device_node.contains(['/', '+', '#']) {
            errors.push(format!(
                "dashboard: device_node '{}' must be a single topic segment",
                d.device_node
            ));
        }

        for (name, t) in [
            ("pH", &d.targets.ph),
            ("ec", &d.targets.ec),
            ("water_temp", &d.targets.water_temp),
        ] {
            validate_target(name, t, errors);
        }
    }
}

fn validate_target(name: &str, t: &Target, errors: &mut Vec<String>) {
    if !t.target.is_finite() {
        errors.push(format!("dashboard.targets.{name}: target must be finite"));
    }
    if !(t.tolerance.is_finite() && t.tolerance > 0.0) {
        errors.push(format!(
            "dashboard.targets.{name}: tolerance must be positive, got {}",
            t.tolerance
        ));
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file. A missing file yields the
/// built-in demo configuration.
pub fn load(path: &str) -> Result<Config> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path, "config file not found, using defaults");
            return Ok(Config::default());
        }
        Err(e) => return Err(e).with_context(|| format!("failed to read config: {path}")),
    };
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
