use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use hydro_sim::plant::{assess, Classification, PlantSample};
use hydro_sim::{now_unix, HistorySample, ManualAction, ProcessState, Readout, Variable};
use rumqttc::{AsyncClient, QoS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::DashboardConfig;
use crate::mqtt::action_topic;
use crate::state::SharedState;

const INDEX_HTML: &str = include_str!("ui/index.html");

const MAX_SESSION_ID_LEN: usize = 64;

/// Everything a handler can reach.
#[derive(Clone)]
pub struct AppCtx {
    pub state: SharedState,
    pub dashboard: Arc<DashboardConfig>,
    /// `None` when the device feed is disabled.
    pub mqtt: Option<AsyncClient>,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(ctx: AppCtx) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(api_status))
        .route("/api/config", get(api_config))
        .route("/api/sessions/{id}", delete(end_session))
        .route("/api/sessions/{id}/snapshot", get(session_snapshot))
        .route("/api/sessions/{id}/history", get(session_history))
        .route("/api/sessions/{id}/actions/{action}", post(session_action))
        .route("/api/device/current", get(device_current))
        .route("/api/device/history", get(device_history))
        .route("/api/device/actions/{action}", post(device_action))
        .route("/api/device/classification", get(device_classification))
        .route("/api/plant-health/{sample}", get(plant_health))
        .with_state(ctx)
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    let message = message.into();
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn check_session_id(id: &str) -> Result<(), Response> {
    let ok = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(json_error(
            StatusCode::BAD_REQUEST,
            format!("invalid session id '{id}'"),
        ))
    }
}

fn parse_action(action: &str) -> Result<ManualAction, Response> {
    action
        .parse()
        .map_err(|e: String| json_error(StatusCode::BAD_REQUEST, e))
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HistoryParams {
    hours: Option<f64>,
}

impl HistoryParams {
    fn resolve(&self, cfg: &DashboardConfig) -> Result<f64, Response> {
        let hours = self.hours.unwrap_or(cfg.history_hours);
        if hours.is_finite() && hours > 0.0 && hours <= cfg.max_history_hours {
            Ok(hours)
        } else {
            Err(json_error(
                StatusCode::BAD_REQUEST,
                format!("hours must be in (0, {}], got {hours}", cfg.max_history_hours),
            ))
        }
    }
}

#[derive(Serialize)]
struct SnapshotResponse {
    reading: ProcessState,
    readout: Readout,
}

#[derive(Serialize)]
struct HistoryResponse {
    hours: f64,
    samples: Vec<HistorySample>,
}

#[derive(Serialize)]
struct ActionResponse {
    message: String,
    reading: ProcessState,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum DeviceCurrent {
    Ok {
        node_id: String,
        ts: i64,
        reading: ProcessState,
        readout: Readout,
    },
    NoData {
        node_id: String,
    },
}

#[derive(Serialize)]
struct ConfigResponse<'a> {
    #[serde(flatten)]
    dashboard: &'a DashboardConfig,
    units: BTreeMap<String, &'static str>,
}

// ---------------------------------------------------------------------------
// Page + status
// ---------------------------------------------------------------------------

async fn index() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML)
}

async fn api_status(State(ctx): State<AppCtx>) -> impl IntoResponse {
    let st = ctx.state.read().await;
    Json(st.to_status())
}

async fn api_config(State(ctx): State<AppCtx>) -> Response {
    let units = Variable::ALL
        .iter()
        .map(|v| (v.to_string(), v.unit()))
        .collect();
    Json(ConfigResponse {
        dashboard: &ctx.dashboard,
        units,
    })
    .into_response()
}

// ---------------------------------------------------------------------------
// Simulated sessions
// ---------------------------------------------------------------------------

async fn session_snapshot(
    State(ctx): State<AppCtx>,
    Path(id): Path<String>,
) -> Result<Json<SnapshotResponse>, Response> {
    check_session_id(&id)?;
    let reading = ctx.state.write().await.session(&id).snapshot();
    let readout = ctx
        .dashboard
        .targets
        .readout(reading.ph, reading.ec, reading.water_temp);
    Ok(Json(SnapshotResponse { reading, readout }))
}

async fn session_history(
    State(ctx): State<AppCtx>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, Response> {
    check_session_id(&id)?;
    let hours = params.resolve(&ctx.dashboard)?;
    let history = ctx.state.read().await.history(hours);
    Ok(Json(HistoryResponse {
        hours,
        samples: history.collect(),
    }))
}

async fn session_action(
    State(ctx): State<AppCtx>,
    Path((id, action)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, Response> {
    check_session_id(&id)?;
    let action = parse_action(&action)?;

    let mut st = ctx.state.write().await;
    let sim = st.session(&id);
    let message = sim.manual_action(action);
    let reading = sim.state();
    st.record_action(&format!("session {id}"), &message);

    Ok(Json(ActionResponse { message, reading }))
}

async fn end_session(State(ctx): State<AppCtx>, Path(id): Path<String>) -> Response {
    if let Err(resp) = check_session_id(&id) {
        return resp;
    }
    if ctx.state.write().await.end_session(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        json_error(StatusCode::NOT_FOUND, format!("no session '{id}'"))
    }
}

// ---------------------------------------------------------------------------
// Device feed
// ---------------------------------------------------------------------------

async fn device_current(State(ctx): State<AppCtx>) -> Json<DeviceCurrent> {
    let node_id = ctx.dashboard.device_node.clone();
    let st = ctx.state.read().await;
    let body = match st.device.current() {
        Some(r) => DeviceCurrent::Ok {
            node_id,
            ts: r.ts,
            readout: ctx
                .dashboard
                .targets
                .readout(r.reading.ph, r.reading.ec, r.reading.water_temp),
            reading: r.reading.clone(),
        },
        None => DeviceCurrent::NoData { node_id },
    };
    Json(body)
}

async fn device_history(
    State(ctx): State<AppCtx>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, Response> {
    let hours = params.resolve(&ctx.dashboard)?;
    let from = now_unix() - (hours * 3600.0).round() as i64;

    let st = ctx.state.read().await;
    let samples = st
        .device
        .range(from, i64::MAX)
        .into_iter()
        .map(|r| HistorySample {
            ts: r.ts,
            ph: r.reading.ph,
            ec: r.reading.ec,
            water_temp: r.reading.water_temp,
        })
        .collect();
    Ok(Json(HistoryResponse { hours, samples }))
}

async fn device_action(
    State(ctx): State<AppCtx>,
    Path(action): Path<String>,
) -> Result<Response, Response> {
    let Some(client) = &ctx.mqtt else {
        return Err(json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "device feed disabled (MQTT_HOST not set)",
        ));
    };
    let action = parse_action(&action)?;
    let node_id = &ctx.dashboard.device_node;
    let topic = action_topic(node_id);

    client
        .publish(&topic, QoS::AtLeastOnce, false, action.to_string())
        .await
        .map_err(|e| {
            warn!(%topic, "action publish failed: {e}");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("failed to publish action: {e}"),
            )
        })?;

    ctx.state
        .write()
        .await
        .record_action(&format!("device {node_id}"), &format!("{action} requested"));

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "queued": action.to_string(), "topic": topic })),
    )
        .into_response())
}

async fn device_classification(State(ctx): State<AppCtx>) -> Json<Classification> {
    let st = ctx.state.read().await;
    let classification = st
        .device
        .classification()
        .cloned()
        .unwrap_or_else(|| Classification::unavailable("no classification received"));
    Json(classification)
}

// ---------------------------------------------------------------------------
// Plant health
// ---------------------------------------------------------------------------

async fn plant_health(Path(sample): Path<String>) -> Response {
    match sample.parse::<PlantSample>() {
        Ok(sample) => Json(assess(sample)).into_response(),
        Err(e) => json_error(StatusCode::NOT_FOUND, e),
    }
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(ctx: AppCtx, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!("web ui listening on http://{addr}");

    axum::serve(listener, router(ctx))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DeviceReading, HubState};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use hydro_sim::{SimProfile, TelemetrySimulator};
    use rumqttc::MqttOptions;
    use serde_json::Value;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    fn test_ctx() -> AppCtx {
        let cfg = DashboardConfig::default();
        let state = HubState::new(
            SimProfile::default(),
            cfg.max_sessions,
            cfg.device_history_len,
        );
        AppCtx {
            state: Arc::new(RwLock::new(state)),
            dashboard: Arc::new(cfg),
            mqtt: None,
        }
    }

    async fn send(ctx: &AppCtx, method: &str, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let resp = router(ctx.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    // -- Page + status ----------------------------------------------------

    #[tokio::test]
    async fn index_serves_html() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = router(test_ctx()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn config_exposes_refresh_and_units() {
        let (status, json) = send(&test_ctx(), "GET", "/api/config").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["refresh_secs"], 5);
        assert_eq!(json["targets"]["ph"]["target"], 5.8);
        assert_eq!(json["units"]["ec"], "mS/cm");
    }

    #[tokio::test]
    async fn status_counts_sessions() {
        let ctx = test_ctx();
        send(&ctx, "GET", "/api/sessions/a/snapshot").await;
        let (status, json) = send(&ctx, "GET", "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sessions"], 1);
        assert_eq!(json["mqtt_connected"], false);
        assert_eq!(json["events"][0]["detail"], "session a started");
    }

    // -- Sessions ---------------------------------------------------------

    #[tokio::test]
    async fn snapshot_advances_step_per_request() {
        let ctx = test_ctx();
        let (status, first) = send(&ctx, "GET", "/api/sessions/s1/snapshot").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["reading"]["stepCount"], 1);
        assert_eq!(first["reading"]["lastAction"], "System initialized");
        assert!(first["readout"]["overall"].is_string());

        let (_, second) = send(&ctx, "GET", "/api/sessions/s1/snapshot").await;
        assert_eq!(second["reading"]["stepCount"], 2);
    }

    #[tokio::test]
    async fn invalid_session_id_rejected() {
        let (status, json) = send(&test_ctx(), "GET", "/api/sessions/a.b/snapshot").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("invalid session id"));
    }

    #[tokio::test]
    async fn history_defaults_to_one_day() {
        let (status, json) = send(&test_ctx(), "GET", "/api/sessions/h/history").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["hours"], 24.0);
        let samples = json["samples"].as_array().unwrap();
        assert_eq!(samples.len(), 288);
        let ts: Vec<i64> = samples.iter().map(|s| s["ts"].as_i64().unwrap()).collect();
        assert!(ts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn history_honours_hours_param() {
        let (status, json) = send(&test_ctx(), "GET", "/api/sessions/h/history?hours=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["samples"].as_array().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn history_out_of_range_rejected() {
        let ctx = test_ctx();
        let (status, _) = send(&ctx, "GET", "/api/sessions/h/history?hours=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, json) = send(&ctx, "GET", "/api/sessions/h/history?hours=500").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("hours must be in"));
    }

    #[tokio::test]
    async fn history_does_not_advance_session() {
        let ctx = test_ctx();
        send(&ctx, "GET", "/api/sessions/h/snapshot").await;
        send(&ctx, "GET", "/api/sessions/h/history?hours=2").await;
        let (_, json) = send(&ctx, "GET", "/api/sessions/h/snapshot").await;
        assert_eq!(json["reading"]["stepCount"], 2);
    }

    #[tokio::test]
    async fn history_leaves_sessions_untouched() {
        let ctx = test_ctx();
        let (status, _) = send(&ctx, "GET", "/api/sessions/fresh/history?hours=1").await;
        assert_eq!(status, StatusCode::OK);

        let (_, json) = send(&ctx, "GET", "/api/status").await;
        assert_eq!(json["sessions"], 0);
        assert!(json["events"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn manual_action_returns_message_and_state() {
        let ctx = test_ctx();
        let (status, json) = send(&ctx, "POST", "/api/sessions/m/actions/refill_water").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Water reservoir refilled to 20 cm");
        assert_eq!(json["reading"]["waterLevel"], 20.0);
        assert_eq!(json["reading"]["actionCount"], 1);

        let st = ctx.state.read().await;
        assert!(st
            .events
            .iter()
            .any(|e| e.detail == "session m: Water reservoir refilled to 20 cm"));
    }

    #[tokio::test]
    async fn unknown_action_rejected() {
        let (status, json) = send(&test_ctx(), "POST", "/api/sessions/m/actions/flood").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("unknown manual action"));
    }

    #[tokio::test]
    async fn delete_session_then_404() {
        let ctx = test_ctx();
        send(&ctx, "GET", "/api/sessions/d/snapshot").await;
        let (status, _) = send(&ctx, "DELETE", "/api/sessions/d").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, json) = send(&ctx, "DELETE", "/api/sessions/d").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "no session 'd'");
    }

    // -- Device feed ------------------------------------------------------

    #[tokio::test]
    async fn device_current_without_data() {
        let (status, json) = send(&test_ctx(), "GET", "/api/device/current").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "no_data");
        assert_eq!(json["node_id"], "hydro-1");
    }

    #[tokio::test]
    async fn device_current_and_history_after_reading() {
        let ctx = test_ctx();
        let now = now_unix();
        {
            let mut st = ctx.state.write().await;
            let mut sim = TelemetrySimulator::default();
            st.record_reading(
                "hydro-1",
                DeviceReading {
                    ts: now - 60,
                    reading: sim.snapshot(),
                },
            );
            st.record_reading(
                "hydro-1",
                DeviceReading {
                    ts: now,
                    reading: sim.snapshot(),
                },
            );
        }

        let (_, json) = send(&ctx, "GET", "/api/device/current").await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["ts"], now);
        assert_eq!(json["reading"]["stepCount"], 2);

        let (status, json) = send(&ctx, "GET", "/api/device/history?hours=1").await;
        assert_eq!(status, StatusCode::OK);
        let samples = json["samples"].as_array().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0]["ts"], now - 60);
        assert!(samples[1]["pH"].is_number());
    }

    #[tokio::test]
    async fn device_action_without_mqtt_is_unavailable() {
        let (status, json) = send(&test_ctx(), "POST", "/api/device/actions/ph_up").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(json["error"].as_str().unwrap().contains("MQTT_HOST"));
    }

    #[tokio::test]
    async fn device_action_queues_publish() {
        let (client, _eventloop) = AsyncClient::new(MqttOptions::new("test", "127.0.0.1", 1883), 10);
        let ctx = AppCtx {
            mqtt: Some(client),
            ..test_ctx()
        };

        let (status, json) = send(&ctx, "POST", "/api/device/actions/ph-down").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["queued"], "ph_down");
        assert_eq!(json["topic"], "ctl/hydro-1/action");

        let (status, _) = send(&ctx, "POST", "/api/device/actions/flood").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn classification_unavailable_until_received() {
        let ctx = test_ctx();
        let (_, json) = send(&ctx, "GET", "/api/device/classification").await;
        assert_eq!(json["status"], "unavailable");

        ctx.state.write().await.device.set_classification(
            hydro_sim::plant::parse_classifier_response(
                br#"[{"label":"healthy","probability":0.9}]"#,
            ),
        );
        let (_, json) = send(&ctx, "GET", "/api/device/classification").await;
        assert_eq!(json["status"], "available");
        assert_eq!(json["ranked"][0]["class"], "healthy");
    }

    // -- Plant health -----------------------------------------------------

    #[tokio::test]
    async fn plant_health_known_sample() {
        let (status, json) = send(&test_ctx(), "GET", "/api/plant-health/disease").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["prediction"]["class"], "disease");
    }

    #[tokio::test]
    async fn plant_health_unknown_sample_404() {
        let (status, json) = send(&test_ctx(), "GET", "/api/plant-health/cactus").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].is_string());
    }
}
