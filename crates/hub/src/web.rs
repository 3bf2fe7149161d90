use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use dripper_store::field::NOT_AVAILABLE;
use dripper_store::{FieldSnapshot, IrrigationTrigger, StoreError, Stores};

use crate::state::{HubEvent, SharedState};

#[derive(Clone)]
pub struct AppState {
    pub hub: SharedState,
    pub stores: Arc<Stores>,
}

// ---------------------------------------------------------------------------
// JSON views
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TriggerView {
    pub id: usize,
    pub one_time: bool,
    pub start_date: String,
    pub start_time: String,
    pub duration_secs: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub week_days: Vec<&'static str>,
}

impl TriggerView {
    fn new(id: usize, t: IrrigationTrigger) -> Self {
        let (hours, minutes, seconds) = t.duration.hms();
        Self {
            id,
            one_time: t.one_time,
            duration_secs: t.duration.as_secs(),
            hours,
            minutes,
            seconds,
            week_days: t.week_days.names(),
            start_date: t.start_date,
            start_time: t.start_time,
        }
    }
}

/// Snapshot with absent readings spelled out the way the app displays them.
#[derive(Serialize)]
pub struct SnapshotView {
    pub last_irrigation_time: String,
    pub temperature: String,
    pub moisture: String,
    pub luminosity: String,
    pub soil_moisture: String,
}

impl From<FieldSnapshot> for SnapshotView {
    fn from(s: FieldSnapshot) -> Self {
        fn or_na<T: ToString>(v: Option<T>) -> String {
            v.map(|v| v.to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        }
        Self {
            last_irrigation_time: s.last_irrigation_time,
            temperature: or_na(s.temperature),
            moisture: or_na(s.moisture),
            luminosity: or_na(s.luminosity),
            soil_moisture: or_na(s.soil_moisture),
        }
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub auto_mode: bool,
    pub triggers: Vec<TriggerView>,
    pub snapshot: SnapshotView,
    pub device_address: String,
    pub last_sync: String,
    pub events: Vec<HubEvent>,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/triggers/{id}", get(api_trigger))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    let stores = &state.stores;
    let triggers = stores
        .schedule
        .list()
        .await
        .into_iter()
        .enumerate()
        .map(|(id, t)| TriggerView::new(id, t))
        .collect();
    let prefs = stores.prefs.get().await;
    let (uptime_secs, events) = {
        let st = state.hub.read().await;
        (st.uptime_secs(), st.recent_events())
    };

    Json(StatusResponse {
        uptime_secs,
        auto_mode: stores.schedule.auto_mode().await,
        triggers,
        snapshot: stores.field_data.current_snapshot().await.into(),
        device_address: prefs.device_address,
        last_sync: prefs.last_sync,
        events,
    })
}

async fn api_trigger(State(state): State<AppState>, Path(id): Path<usize>) -> Response {
    match state.stores.schedule.get(id).await {
        Ok(t) => Json(TriggerView::new(id, t)).into_response(),
        Err(e @ StoreError::NotFound { .. }) => {
            (StatusCode::NOT_FOUND, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "status api listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
