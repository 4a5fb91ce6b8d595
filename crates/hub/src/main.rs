mod config;
mod mqtt;
mod state;
mod web;

use anyhow::Result;
use hydro_sim::plant::parse_classifier_response;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::{env, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use mqtt::{extract_ack_node, extract_image_node, extract_node_id, parse_ack, TelemetryMsg};
use state::{DeviceReading, HubState, SharedState};
use web::AppCtx;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let broker = env::var("MQTT_HOST").ok().filter(|h| !h.trim().is_empty());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let web_port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // ── Config file ─────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "hub.toml".to_string());
    let cfg = config::load(&config_path)?;
    let dashboard = Arc::new(cfg.dashboard);

    info!(
        refresh_secs = dashboard.refresh_secs,
        max_sessions = dashboard.max_sessions,
        device_node = %dashboard.device_node,
        events = cfg.simulator.events.len(),
        "config loaded"
    );

    // ── Shared state (ephemeral, for the web UI) ────────────────────
    let shared: SharedState = Arc::new(RwLock::new(HubState::new(
        cfg.simulator,
        dashboard.max_sessions,
        dashboard.device_history_len,
    )));
    shared.write().await.record_system("hub started".to_string());

    // ── MQTT device feed (optional) ─────────────────────────────────
    let mqtt = match broker {
        Some(broker) => {
            let mut mqttoptions = MqttOptions::new("hydro-hub", broker, port);
            mqttoptions.set_keep_alive(Duration::from_secs(30));
            let (client, eventloop) = AsyncClient::new(mqttoptions, 20);

            let feed_state = Arc::clone(&shared);
            let feed_client = client.clone();
            let device_node = dashboard.device_node.clone();
            tokio::spawn(async move {
                device_feed(feed_client, eventloop, feed_state, device_node).await;
            });
            Some(client)
        }
        None => {
            warn!("MQTT_HOST not set, device feed disabled");
            None
        }
    };

    // ── Web server ──────────────────────────────────────────────────
    let ctx = AppCtx {
        state: shared,
        dashboard,
        mqtt,
    };
    web::serve(ctx, web_port).await
}

/// Poll the broker forever, folding device telemetry, action acks and image
/// classifications into shared state. Never returns.
async fn device_feed(
    client: AsyncClient,
    mut eventloop: EventLoop,
    shared: SharedState,
    device_node: String,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                let topic = p.topic.clone();
                let payload = p.payload.to_vec();

                if let Some(node_id) = extract_node_id(&topic) {
                    if node_id != device_node {
                        debug!(node_id, "ignoring telemetry from other node");
                        continue;
                    }
                    match serde_json::from_slice::<TelemetryMsg>(&payload) {
                        Ok(msg) => {
                            debug!(
                                node_id,
                                ts = msg.ts,
                                step = msg.reading.step_count,
                                "telemetry"
                            );
                            let mut st = shared.write().await;
                            st.record_reading(
                                node_id,
                                DeviceReading {
                                    ts: msg.ts,
                                    reading: msg.reading,
                                },
                            );
                        }
                        Err(e) => {
                            warn!("bad telemetry json: {e} topic={topic}");
                            let mut st = shared.write().await;
                            st.record_error(format!("bad telemetry json: {e}"));
                        }
                    }
                } else if let Some(node_id) = extract_ack_node(&topic) {
                    match parse_ack(&payload) {
                        Ok(message) => {
                            info!(node_id, %message, "device action applied");
                            let mut st = shared.write().await;
                            st.record_action(&format!("device {node_id}"), &message);
                        }
                        Err(msg) => {
                            warn!("{msg} topic={topic}");
                            let mut st = shared.write().await;
                            st.record_error(msg);
                        }
                    }
                } else if let Some(node_id) = extract_image_node(&topic) {
                    if node_id != device_node {
                        continue;
                    }
                    let classification = parse_classifier_response(&payload);
                    info!(node_id, top = ?classification.top(), "classification received");
                    let mut st = shared.write().await;
                    st.device.set_classification(classification);
                } else {
                    warn!("unhandled topic={topic}");
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                for topic in mqtt::FEED_TOPICS {
                    if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                        error!("subscribe {topic} failed: {e}");
                    }
                }
                let mut st = shared.write().await;
                st.mqtt_connected = true;
                st.record_system("mqtt connected".to_string());
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_system("mqtt disconnected".to_string());
            }
            Ok(_) => {}
            Err(e) => {
                warn!("mqtt error: {e}. reconnecting...");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_error(format!("mqtt error: {e}"));
                drop(st);

                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
