//! Device emulator: runs one telemetry simulator and streams its snapshots
//! over MQTT as if it were the reservoir's sensor board.

use anyhow::{Context, Result};
use hydro_sim::{now_unix, ManualAction, ProcessState, SimProfile, TelemetrySimulator};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::{env, time::Duration};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct ReadingMsg<'a> {
    ts: i64,
    reading: &'a ProcessState,
}

#[derive(Debug, Default, Deserialize)]
struct NodeConfig {
    #[serde(default)]
    simulator: SimProfile,
}

/// Read the `[simulator]` table from `path`, or the demo defaults when no
/// path is given.
fn load_profile(path: Option<&str>) -> Result<SimProfile> {
    let Some(path) = path else {
        return Ok(SimProfile::default());
    };
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let cfg: NodeConfig =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    cfg.simulator
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(cfg.simulator)
}

fn parse_action_payload(payload: &[u8]) -> Result<ManualAction, String> {
    String::from_utf8_lossy(payload).parse()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let node_id = env::var("NODE_ID").unwrap_or_else(|_| "hydro-1".to_string());
    let sample_every_s: u64 = env::var("SAMPLE_EVERY_S")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|s| *s > 0)
        .unwrap_or(5);

    let config_path = env::var("CONFIG_PATH").ok();
    let profile = load_profile(config_path.as_deref())?;
    let mut sim = TelemetrySimulator::new(profile);

    // ── MQTT ────────────────────────────────────────────────────────
    let client_id = format!("hydro-node-{node_id}");
    let mut mqttoptions = MqttOptions::new(client_id, broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

    let tele_topic = format!("tele/{node_id}/reading");
    let action_topic = format!("ctl/{node_id}/action");
    let ack_topic = format!("ack/{node_id}/action");

    // Commands are handed to the sampling loop so the simulator has a single
    // owner.
    let (action_tx, mut action_rx) = mpsc::channel::<Vec<u8>>(16);
    {
        let client = client.clone();
        let action_topic = action_topic.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("node connected to mqtt");
                        if let Err(e) = client.subscribe(&action_topic, QoS::AtLeastOnce).await {
                            error!("subscribe {action_topic} failed: {e}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(p))) if p.topic == action_topic => {
                        if action_tx.send(p.payload.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("mqtt error: {e}. retrying...");
                        sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });
    }

    info!(topic = %tele_topic, every_s = sample_every_s, "publishing snapshots");

    let mut ticker = tokio::time::interval(Duration::from_secs(sample_every_s));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reading = sim.snapshot();
                let msg = ReadingMsg { ts: now_unix(), reading: &reading };
                let payload = serde_json::to_vec(&msg)?;

                if let Err(e) = client
                    .publish(&tele_topic, QoS::AtLeastOnce, false, payload)
                    .await
                {
                    error!("publish error: {e}");
                } else {
                    info!(
                        step = reading.step_count,
                        ph = reading.ph,
                        ec = reading.ec,
                        "published snapshot"
                    );
                }
            }
            Some(payload) = action_rx.recv() => {
                match parse_action_payload(&payload) {
                    Ok(action) => {
                        let message = sim.manual_action(action);
                        if let Err(e) = client
                            .publish(&ack_topic, QoS::AtLeastOnce, false, message.into_bytes())
                            .await
                        {
                            error!("ack publish error: {e}");
                        }
                    }
                    Err(e) => warn!("{e} (ignored)"),
                }
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_msg_wraps_snapshot() {
        let mut sim = TelemetrySimulator::default();
        let reading = sim.snapshot();
        let msg = ReadingMsg {
            ts: 1_700_000_000,
            reading: &reading,
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["ts"], 1_700_000_000);
        assert_eq!(json["reading"]["stepCount"], 1);
        assert!(json["reading"]["pH"].is_number());
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[test]
    fn parse_action_payload_accepts_names() {
        assert_eq!(parse_action_payload(b"ph_up"), Ok(ManualAction::PhUp));
        assert_eq!(parse_action_payload(b" REFILL_WATER\n"), Ok(ManualAction::RefillWater));
        assert_eq!(parse_action_payload(b"reset"), Ok(ManualAction::Reset));
    }

    #[test]
    fn parse_action_payload_rejects_garbage() {
        assert!(parse_action_payload(b"flood").is_err());
        assert!(parse_action_payload(b"").is_err());
    }

    #[test]
    fn load_profile_without_path_is_default() {
        assert_eq!(load_profile(None).unwrap(), SimProfile::default());
    }

    #[test]
    fn load_profile_missing_file_fails() {
        let err = load_profile(Some("/nonexistent/hydro.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read config"));
    }

    #[test]
    fn node_config_ignores_other_tables() {
        let toml_str = r#"
[dashboard]
refresh_secs = 5

[simulator.manual]
ph_step = 0.1
nutrient_step = 0.05
refill_level = 19.0
"#;
        let cfg: NodeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.simulator.manual.ph_step, 0.1);
        cfg.simulator.validate().unwrap();
    }
}
