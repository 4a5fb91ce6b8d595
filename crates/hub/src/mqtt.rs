use hydro_sim::ProcessState;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// MQTT message types
// ---------------------------------------------------------------------------

/// Payload of `tele/<node_id>/reading`.
#[derive(Debug, Deserialize)]
pub(crate) struct TelemetryMsg {
    pub(crate) ts: i64,
    pub(crate) reading: ProcessState,
}

/// Subscriptions the device feed needs.
pub(crate) const FEED_TOPICS: [&str; 3] =
    ["tele/+/reading", "ack/+/action", "img/+/classification"];

// ---------------------------------------------------------------------------
// Topic / payload helpers
// ---------------------------------------------------------------------------

/// Middle segment of "<prefix>/<node_id>/<suffix>".
fn node_segment<'a>(topic: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() == 3 && parts[0] == prefix && parts[2] == suffix && !parts[1].is_empty() {
        Some(parts[1])
    } else {
        None
    }
}

/// Extract node_id from "tele/<node_id>/reading".
pub(crate) fn extract_node_id(topic: &str) -> Option<&str> {
    node_segment(topic, "tele", "reading")
}

/// Extract node_id from "ack/<node_id>/action".
pub(crate) fn extract_ack_node(topic: &str) -> Option<&str> {
    node_segment(topic, "ack", "action")
}

/// Extract node_id from "img/<node_id>/classification".
pub(crate) fn extract_image_node(topic: &str) -> Option<&str> {
    node_segment(topic, "img", "classification")
}

/// Command topic the node listens on.
pub(crate) fn action_topic(node_id: &str) -> String {
    format!("ctl/{node_id}/action")
}

/// Confirmation text published by the node (trims whitespace).
pub(crate) fn parse_ack(payload: &[u8]) -> Result<String, String> {
    let s = String::from_utf8_lossy(payload).trim().to_string();
    if s.is_empty() {
        Err("empty action ack".to_string())
    } else {
        Ok(s)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- extract_node_id ----------------------------------------------------

    #[test]
    fn extract_node_id_valid_topic() {
        assert_eq!(extract_node_id("tele/hydro-1/reading"), Some("hydro-1"));
    }

    #[test]
    fn extract_node_id_wrong_prefix() {
        assert_eq!(extract_node_id("foo/hydro-1/reading"), None);
    }

    #[test]
    fn extract_node_id_wrong_suffix() {
        assert_eq!(extract_node_id("tele/hydro-1/status"), None);
    }

    #[test]
    fn extract_node_id_too_few_segments() {
        assert_eq!(extract_node_id("tele/reading"), None);
    }

    #[test]
    fn extract_node_id_too_many_segments() {
        assert_eq!(extract_node_id("tele/hydro-1/sub/reading"), None);
    }

    #[test]
    fn extract_node_id_empty_segment() {
        assert_eq!(extract_node_id("tele//reading"), None);
        assert_eq!(extract_node_id(""), None);
    }

    // -- ack / img topics -----------------------------------------------------

    #[test]
    fn extract_ack_node_valid_topic() {
        assert_eq!(extract_ack_node("ack/hydro-1/action"), Some("hydro-1"));
        assert_eq!(extract_ack_node("ctl/hydro-1/action"), None);
    }

    #[test]
    fn extract_image_node_valid_topic() {
        assert_eq!(
            extract_image_node("img/tent-2/classification"),
            Some("tent-2")
        );
        assert_eq!(extract_image_node("img/tent-2/raw"), None);
    }

    #[test]
    fn action_topic_round_trips_through_node_segment() {
        let topic = action_topic("hydro-1");
        assert_eq!(topic, "ctl/hydro-1/action");
        assert_eq!(node_segment(&topic, "ctl", "action"), Some("hydro-1"));
    }

    // -- parse_ack ------------------------------------------------------------

    #[test]
    fn parse_ack_trims() {
        assert_eq!(
            parse_ack(b"  Water reservoir refilled to 20 cm\n"),
            Ok("Water reservoir refilled to 20 cm".to_string())
        );
    }

    #[test]
    fn parse_ack_empty_rejected() {
        assert!(parse_ack(b"   ").is_err());
    }

    // -- TelemetryMsg deserialization -----------------------------------------

    #[test]
    fn telemetry_msg_deserialize_valid() {
        let json = r#"{"ts":1700000000,"reading":{
            "pH":5.81,"ec":1.2,"waterTemp":20.4,"airTemp":24.1,"humidity":64.8,
            "waterLevel":18.5,"battery":12.4,"stepCount":3,
            "lastAction":"System initialized","actionCount":0}}"#;
        let msg: TelemetryMsg = serde_json::from_str(json).unwrap();
        assert_eq!(msg.ts, 1700000000);
        assert_eq!(msg.reading.ph, 5.81);
        assert_eq!(msg.reading.step_count, 3);
        assert_eq!(msg.reading.last_action, "System initialized");
    }

    #[test]
    fn telemetry_msg_missing_reading_fails() {
        assert!(serde_json::from_str::<TelemetryMsg>(r#"{"ts":1}"#).is_err());
    }

    #[test]
    fn telemetry_msg_extra_fields_ignored() {
        let reading = hydro_sim::TelemetrySimulator::default().state();
        let json = serde_json::json!({ "ts": 5, "reading": reading, "fw": "1.2.0" });
        let msg: TelemetryMsg = serde_json::from_value(json).unwrap();
        assert_eq!(msg.ts, 5);
        assert_eq!(msg.reading, reading);
    }
}
