use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::broadcast};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{debug, warn};

use crate::{
    engine::{Engine, EngineStats},
    filter::{FilterState, FilterUpdate},
    geo::{LatLng, Viewport},
    historical::{group_nearby, DEFAULT_GROUP_KM, DEFAULT_NEARBY_KM},
    lod::{PendingPass, SettleKind, Transition},
    snapshot::ZoneFrame,
    surface::{MapSurface, RecordingSurface},
    timer::{Clock, SystemClock},
    zone::{Category, TierKind},
};

const TICK_INTERVAL: Duration = Duration::from_millis(50);

type SharedEngine = Arc<Mutex<Engine<RecordingSurface>>>;

struct AppState {
    engine: SharedEngine,
    clock: SystemClock,
    broadcaster: broadcast::Sender<String>,
}

impl AppState {
    /// Sends every surface call made since the last drain to SSE clients.
    fn publish(&self, engine: &mut Engine<RecordingSurface>) {
        for op in engine.surface_mut().drain_log() {
            if let Ok(payload) = serde_json::to_string(&op) {
                let _ = self.broadcaster.send(payload);
            }
        }
    }
}

pub struct WebServerConfig {
    pub engine: Engine<RecordingSurface>,
    pub host: String,
    pub port: u16,
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig { engine, host, port } = config;

    let (tx, _) = broadcast::channel::<String>(1024);
    let state = Arc::new(AppState {
        engine: Arc::new(Mutex::new(engine)),
        clock: SystemClock::new(),
        broadcaster: tx,
    });

    let ticker_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            let mut engine = ticker_state.engine.lock().expect("engine lock poisoned");
            if let Some(report) = engine.advance_to(ticker_state.clock.now()) {
                debug!(
                    pass = report.pass,
                    tier = %report.tier,
                    incomplete = report.is_incomplete(),
                    "pass fired"
                );
                if let Ok(payload) = serde_json::to_string(&report) {
                    let _ = ticker_state.broadcaster.send(payload);
                }
            }
            ticker_state.publish(&mut engine);
        }
    });

    let router = Router::new()
        .route("/api/state", get(engine_state))
        .route("/api/zones", get(zones))
        .route("/api/viewport", post(viewport_changed))
        .route("/api/filter", post(update_filter))
        .route("/api/nearby", get(nearby_events))
        .route("/api/events", get(stream_events))
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    println!("[web] zone engine live at http://{}:{} (Ctrl+C to stop)", host, port);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    println!("[web] shutting down...");
}

#[derive(Serialize)]
struct StateEnvelope {
    tier: Option<TierKind>,
    zoom: Option<u8>,
    bounds: Viewport,
    filter: FilterState,
    zones: usize,
    attached: usize,
    pending: Option<PendingView>,
    stats: EngineStats,
}

#[derive(Serialize)]
struct PendingView {
    kind: SettleKind,
    zoom: u8,
    tier: TierKind,
}

impl From<&PendingPass> for PendingView {
    fn from(pass: &PendingPass) -> Self {
        Self {
            kind: pass.kind,
            zoom: pass.zoom,
            tier: pass.tier,
        }
    }
}

async fn engine_state(State(state): State<Arc<AppState>>) -> Json<StateEnvelope> {
    let engine = state.engine.lock().expect("engine lock poisoned");
    Json(StateEnvelope {
        tier: engine.current_tier(),
        zoom: engine.current_zoom(),
        bounds: engine.surface().bounds(),
        filter: engine.filter().clone(),
        zones: engine.state().zone_count(),
        attached: engine.attached_count(),
        pending: engine.pending().map(PendingView::from),
        stats: engine.stats(),
    })
}

async fn zones(State(state): State<Arc<AppState>>) -> Json<ZoneFrame> {
    let engine = state.engine.lock().expect("engine lock poisoned");
    Json(ZoneFrame::capture(&*engine, engine.stats().passes))
}

#[derive(Debug, Deserialize)]
struct ViewportRequest {
    kind: SettleKind,
    zoom: u8,
    bounds: Viewport,
}

#[derive(Serialize)]
struct ViewportResponse {
    tier: TierKind,
    tier_changed: bool,
}

async fn viewport_changed(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ViewportRequest>,
) -> Json<ViewportResponse> {
    let mut engine = state.engine.lock().expect("engine lock poisoned");
    engine.surface_mut().set_view(request.bounds, request.zoom);
    let transition = engine.on_viewport_changed(request.kind, request.zoom, state.clock.now());
    state.publish(&mut engine);
    let (tier, tier_changed) = match transition {
        Transition::Entered { to, .. } => (to, true),
        Transition::Stayed(tier) => (tier, false),
    };
    Json(ViewportResponse { tier, tier_changed })
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

async fn update_filter(
    State(state): State<Arc<AppState>>,
    Json(update): Json<FilterUpdate>,
) -> Result<Json<FilterState>, (StatusCode, Json<ErrorBody>)> {
    let mut engine = state.engine.lock().expect("engine lock poisoned");
    match engine.set_filter_state(&update) {
        Ok(_) => {
            state.publish(&mut engine);
            Ok(Json(engine.filter().clone()))
        }
        Err(err) => {
            warn!(error = %err, "rejected filter update");
            Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorBody {
                    error: err.to_string(),
                }),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct NearbyQuery {
    lat: f64,
    lng: f64,
    #[serde(default)]
    km: Option<f64>,
}

#[derive(Serialize)]
struct NearbyEventView {
    year: i32,
    category: Category,
    intensity: f64,
    distance_km: f64,
    source: Option<String>,
    name: Option<String>,
    /// Filter change that would make this event visible, if it is hidden.
    reveal: Option<FilterUpdate>,
}

async fn nearby_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Json<Vec<Vec<NearbyEventView>>> {
    let engine = state.engine.lock().expect("engine lock poisoned");
    let center = LatLng::new(query.lat, query.lng);
    let events = engine
        .dataset()
        .events_near(&center, query.km.unwrap_or(DEFAULT_NEARBY_KM));
    let filter = engine.filter();
    let groups = group_nearby(&events, DEFAULT_GROUP_KM)
        .into_iter()
        .map(|group| {
            group
                .into_iter()
                .map(|event| NearbyEventView {
                    year: event.year,
                    category: event.record.category,
                    intensity: event.record.intensity,
                    distance_km: event.distance_km,
                    source: event.record.source_label.clone(),
                    name: event.record.name.clone(),
                    reveal: filter.reveal(event.record.category, event.record.intensity),
                })
                .collect()
        })
        .collect();
    Json(groups)
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok(Event::default().data(payload))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(2))
            .text("keep-alive"),
    )
}
