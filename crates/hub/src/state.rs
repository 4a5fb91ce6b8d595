use hydro_sim::plant::Classification;
use hydro_sim::{now_unix, FastNoise, HistoryIter, ProcessState, SimProfile, TelemetrySimulator};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::info;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

/// The write lock serialises every snapshot and manual action.
pub type SharedState = Arc<RwLock<HubState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct HubState {
    pub started_at: Instant,
    pub mqtt_connected: bool,
    profile: SimProfile,
    max_sessions: usize,
    sessions: HashMap<String, Session>,
    /// Logical clock for least-recently-used ordering.
    tick: u64,
    pub device: DeviceFeed,
    pub events: VecDeque<SystemEvent>,
}

struct Session {
    sim: TelemetrySimulator,
    last_used: u64,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Telemetry,
    Action,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// Device feed
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceReading {
    pub ts: i64,
    pub reading: ProcessState,
}

/// Readings streamed from the physical node: the latest one plus a bounded,
/// timestamp-ordered ring of past ones.
pub struct DeviceFeed {
    capacity: usize,
    current: Option<DeviceReading>,
    readings: VecDeque<DeviceReading>,
    classification: Option<Classification>,
}

impl DeviceFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            current: None,
            readings: VecDeque::new(),
            classification: None,
        }
    }

    pub fn current(&self) -> Option<&DeviceReading> {
        self.current.as_ref()
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Store a reading. Late arrivals are slotted in by timestamp; when the
    /// ring is full the oldest reading is dropped.
    pub fn record(&mut self, reading: DeviceReading) {
        let newest = self.current.as_ref().map_or(i64::MIN, |c| c.ts);
        if reading.ts >= newest {
            self.current = Some(reading.clone());
        }

        let pos = self.readings.partition_point(|r| r.ts <= reading.ts);
        self.readings.insert(pos, reading);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
    }

    /// Readings with `from <= ts <= to`, oldest first.
    pub fn range(&self, from: i64, to: i64) -> Vec<DeviceReading> {
        let start = self.readings.partition_point(|r| r.ts < from);
        self.readings
            .iter()
            .skip(start)
            .take_while(|r| r.ts <= to)
            .cloned()
            .collect()
    }

    pub fn set_classification(&mut self, classification: Classification) {
        self.classification = Some(classification);
    }
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mqtt_connected: bool,
    pub sessions: usize,
    pub device_readings: usize,
    pub device_last_ts: Option<i64>,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl HubState {
    pub fn new(profile: SimProfile, max_sessions: usize, device_history_len: usize) -> Self {
        Self {
            started_at: Instant::now(),
            mqtt_connected: false,
            profile,
            max_sessions: max_sessions.max(1),
            sessions: HashMap::new(),
            tick: 0,
            device: DeviceFeed::new(device_history_len),
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub fn has_session(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Synthetic chart history ending now. Every session shares the hub's
    /// profile, so this needs no session and creates none.
    pub fn history(&self, duration_hours: f64) -> HistoryIter<FastNoise> {
        HistoryIter::new(
            self.profile.history.clone(),
            duration_hours,
            now_unix(),
            FastNoise::new(),
        )
    }

    /// The simulator owned by session `id`, created on first use. Creating a
    /// session beyond `max_sessions` evicts the least recently used one.
    pub fn session(&mut self, id: &str) -> &mut TelemetrySimulator {
        self.tick += 1;
        let tick = self.tick;

        if !self.sessions.contains_key(id) {
            if self.sessions.len() >= self.max_sessions {
                self.evict_lru();
            }
            info!(session = id, "session started");
            self.push_event(EventKind::System, format!("session {id} started"));
        }

        let profile = &self.profile;
        let session = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| Session {
                sim: TelemetrySimulator::new(profile.clone()),
                last_used: tick,
            });
        session.last_used = tick;
        &mut session.sim
    }

    /// Drop session `id`. Returns whether it existed.
    pub fn end_session(&mut self, id: &str) -> bool {
        let existed = self.sessions.remove(id).is_some();
        if existed {
            self.push_event(EventKind::System, format!("session {id} ended"));
        }
        existed
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|(_, s)| s.last_used)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            self.sessions.remove(&id);
            info!(session = %id, "session evicted");
            self.push_event(EventKind::System, format!("session {id} evicted"));
        }
    }

    /// Record a telemetry reading from the device node.
    pub fn record_reading(&mut self, node_id: &str, reading: DeviceReading) {
        let detail = format!(
            "{node_id}: step={} pH={} ec={} water={}",
            reading.reading.step_count,
            reading.reading.ph,
            reading.reading.ec,
            reading.reading.water_level
        );
        self.device.record(reading);
        self.push_event(EventKind::Telemetry, detail);
    }

    /// Record a manual action applied to a session or the device.
    pub fn record_action(&mut self, origin: &str, message: &str) {
        self.push_event(EventKind::Action, format!("{origin}: {message}"));
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mqtt_connected: self.mqtt_connected,
            sessions: self.sessions.len(),
            device_readings: self.device.len(),
            device_last_ts: self.device.current().map(|r| r.ts),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn reading_at(ts: i64, step: u64) -> DeviceReading {
        let mut reading = TelemetrySimulator::default().state();
        reading.step_count = step;
        DeviceReading { ts, reading }
    }

    // -- Sessions ---------------------------------------------------------

    #[test]
    fn session_created_lazily_and_kept() {
        let mut st = HubState::new(SimProfile::default(), 4, 10);
        assert_eq!(st.session_count(), 0);

        st.session("a").snapshot();
        st.session("a").snapshot();
        assert_eq!(st.session_count(), 1);
        assert_eq!(st.session("a").state().step_count, 2);
    }

    #[test]
    fn sessions_are_independent() {
        let mut st = HubState::new(SimProfile::default(), 4, 10);
        st.session("a").snapshot();
        st.session("a").snapshot();
        st.session("b").snapshot();
        assert_eq!(st.session("a").state().step_count, 2);
        assert_eq!(st.session("b").state().step_count, 1);
    }

    #[test]
    fn least_recently_used_session_evicted() {
        let mut st = HubState::new(SimProfile::default(), 2, 10);
        st.session("a");
        st.session("b");
        st.session("a"); // b is now the oldest
        st.session("c");

        assert_eq!(st.session_count(), 2);
        assert!(st.has_session("a"));
        assert!(!st.has_session("b"));
        assert!(st.has_session("c"));
        assert!(st.events.iter().any(|e| e.detail == "session b evicted"));
    }

    #[test]
    fn history_creates_no_session() {
        let st = HubState::new(SimProfile::default(), 2, 10);
        assert_eq!(st.history(1.0).count(), 12);
        assert_eq!(st.session_count(), 0);
        assert!(st.events.is_empty());
    }

    #[test]
    fn end_session_reports_existence() {
        let mut st = HubState::new(SimProfile::default(), 2, 10);
        st.session("a");
        assert!(st.end_session("a"));
        assert!(!st.end_session("a"));
        assert_eq!(st.session_count(), 0);
    }

    #[test]
    fn sessions_use_configured_profile() {
        let mut profile = SimProfile::default();
        profile.manual.ph_step = 0.5;
        let mut st = HubState::new(profile, 2, 10);
        let sim = st.session("a");
        let before = sim.state().ph;
        sim.manual_action(hydro_sim::ManualAction::PhUp);
        assert!((sim.state().ph - (before + 0.5)).abs() < 1e-9);
    }

    // -- Device feed ------------------------------------------------------

    #[test]
    fn feed_starts_empty() {
        let feed = DeviceFeed::new(10);
        assert!(feed.current().is_none());
        assert!(feed.classification().is_none());
        assert!(feed.range(i64::MIN, i64::MAX).is_empty());
    }

    #[test]
    fn feed_current_tracks_newest() {
        let mut feed = DeviceFeed::new(10);
        feed.record(reading_at(100, 1));
        feed.record(reading_at(200, 2));
        feed.record(reading_at(150, 3)); // late arrival
        assert_eq!(feed.current().unwrap().ts, 200);
    }

    #[test]
    fn feed_range_is_ascending_and_inclusive() {
        let mut feed = DeviceFeed::new(10);
        for ts in [300, 100, 200, 500, 400] {
            feed.record(reading_at(ts, 0));
        }
        let ts: Vec<i64> = feed.range(200, 400).iter().map(|r| r.ts).collect();
        assert_eq!(ts, vec![200, 300, 400]);
    }

    #[test]
    fn feed_drops_oldest_when_full() {
        let mut feed = DeviceFeed::new(3);
        for ts in 1..=5 {
            feed.record(reading_at(ts, 0));
        }
        assert_eq!(feed.len(), 3);
        let ts: Vec<i64> = feed.range(i64::MIN, i64::MAX).iter().map(|r| r.ts).collect();
        assert_eq!(ts, vec![3, 4, 5]);
    }

    // -- Events -----------------------------------------------------------

    #[test]
    fn event_ring_is_bounded() {
        let mut st = HubState::new(SimProfile::default(), 2, 10);
        for i in 0..(MAX_EVENTS + 25) {
            st.record_system(format!("event {i}"));
        }
        assert_eq!(st.events.len(), MAX_EVENTS);
        assert_eq!(st.events.front().unwrap().detail, "event 25");
    }

    #[test]
    fn status_lists_newest_event_first() {
        let mut st = HubState::new(SimProfile::default(), 2, 10);
        st.record_system("first".into());
        st.record_action("session a", "pH UP dosed");
        st.record_reading("hydro-1", reading_at(42, 7));

        let status = st.to_status();
        assert_eq!(status.events.len(), 3);
        assert_eq!(status.events[0].kind, EventKind::Telemetry);
        assert_eq!(status.events[1].detail, "session a: pH UP dosed");
        assert_eq!(status.device_last_ts, Some(42));
        assert_eq!(status.device_readings, 1);
        assert!(!status.mqtt_connected);
    }

    #[test]
    fn event_serializes_rfc3339() {
        let mut st = HubState::new(SimProfile::default(), 2, 10);
        st.record_error("boom".into());
        let json = serde_json::to_value(&st.events[0]).unwrap();
        assert_eq!(json["kind"], "error");
        assert!(json["ts"].as_str().unwrap().contains('T'));
    }
}
