use std::net::SocketAddr;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::runtime::Builder;

use bevy::{
    log::{error, info},
    prelude::{App, EventReader, NonSend, Plugin, Res, ResMut, Resource, Update},
};

use crate::{
    board::GaltonBoard,
    config::Timings,
    histogram::histogram_bars,
    lifecycle::BeadLifecycle,
    tally::CountersChanged,
};

// Hierarchical API structs for request/response JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiTuning {
    pub spawn: ApiSpawn,
    pub reap: ApiReap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSpawn { pub spawning_enabled: bool, pub spawn_interval_ms: u64 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiReap { pub reap_interval_ms: u64, pub bead_max_age_ms: Option<u64> }

// Partial update types mirror ApiTuning with Options down to lowest level
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiTuningUpdate {
    pub spawn: Option<ApiSpawnUpdate>,
    pub reap: Option<ApiReapUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiSpawnUpdate { pub spawning_enabled: Option<bool>, pub spawn_interval_ms: Option<u64> }

/// `bead_max_age_ms: 0` switches age-based reaping off.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiReapUpdate { pub reap_interval_ms: Option<u64>, pub bead_max_age_ms: Option<u64> }

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardTuning {
    pub spawning_enabled: bool,
    pub spawn_interval_ms: u64,
    pub reap_interval_ms: u64,
    pub bead_max_age_ms: Option<u64>,
}

impl BoardTuning {
    pub fn from_timings(timings: &Timings) -> Self {
        Self {
            spawning_enabled: true,
            spawn_interval_ms: timings.spawn_interval_ms,
            reap_interval_ms: timings.reap_interval_ms,
            bead_max_age_ms: timings.bead_max_age_ms,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.spawn_interval_ms == 0 {
            return Err("spawn_interval_ms must be at least 1".into());
        }
        if self.reap_interval_ms == 0 {
            return Err("reap_interval_ms must be at least 1".into());
        }
        Ok(())
    }

    /// Pushes changed values into the lifecycle; untouched timers keep their phase.
    pub fn apply_to_lifecycle(&self, lifecycle: &mut BeadLifecycle) {
        let spawn = Duration::from_millis(self.spawn_interval_ms);
        if lifecycle.spawn_interval() != spawn {
            lifecycle.set_spawn_interval(spawn);
        }
        let reap = Duration::from_millis(self.reap_interval_ms);
        if lifecycle.reap_interval() != reap {
            lifecycle.set_reap_interval(reap);
        }
        lifecycle.set_spawning_enabled(self.spawning_enabled);
        lifecycle.set_max_age(self.bead_max_age_ms.map(Duration::from_millis));
    }
}

impl ApiTuningUpdate {
    pub fn apply_to(self, t: &mut BoardTuning) {
        if let Some(s) = self.spawn {
            if let Some(v) = s.spawning_enabled { t.spawning_enabled = v; }
            if let Some(v) = s.spawn_interval_ms { t.spawn_interval_ms = v; }
        }
        if let Some(r) = self.reap {
            if let Some(v) = r.reap_interval_ms { t.reap_interval_ms = v; }
            if let Some(v) = r.bead_max_age_ms { t.bead_max_age_ms = if v == 0 { None } else { Some(v) }; }
        }
    }
}

impl From<&BoardTuning> for ApiTuning {
    fn from(t: &BoardTuning) -> Self {
        ApiTuning {
            spawn: ApiSpawn { spawning_enabled: t.spawning_enabled, spawn_interval_ms: t.spawn_interval_ms },
            reap: ApiReap { reap_interval_ms: t.reap_interval_ms, bead_max_age_ms: t.bead_max_age_ms },
        }
    }
}

impl From<ApiTuning> for BoardTuning {
    fn from(api: ApiTuning) -> Self {
        BoardTuning {
            spawning_enabled: api.spawn.spawning_enabled,
            spawn_interval_ms: api.spawn.spawn_interval_ms,
            reap_interval_ms: api.reap.reap_interval_ms,
            bead_max_age_ms: api.reap.bead_max_age_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub counters: Vec<u64>,
    pub top_counter: u64,
    pub total: u64,
    pub bar_heights: Vec<f32>,
    pub captured_at: String,
}

impl HistogramSnapshot {
    pub fn capture(board: &GaltonBoard) -> Self {
        Self {
            counters: board.tally.counters().to_vec(),
            top_counter: board.tally.top_counter(),
            total: board.tally.total(),
            bar_heights: histogram_bars(&board.layout, &board.tally).iter().map(|b| b.height).collect(),
            captured_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
struct AppState {
    tx: mpsc::Sender<BoardTuning>,
    mirror: Arc<Mutex<BoardTuning>>, // for GET /tuning
    histogram: Arc<Mutex<HistogramSnapshot>>,
}

async fn get_tuning(State(state): State<AppState>) -> Json<ApiTuning> {
    let guard = lock(&state.mirror);
    Json(ApiTuning::from(&*guard))
}

async fn patch_tuning(
    State(state): State<AppState>,
    Json(api_update): Json<ApiTuningUpdate>,
) -> Result<Json<ApiTuning>, (StatusCode, String)> {
    let new_tuning = {
        let mut candidate = *lock(&state.mirror);
        api_update.apply_to(&mut candidate);
        candidate.validate().map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;
        *lock(&state.mirror) = candidate;
        candidate
    };
    // Send to Bevy for authoritative apply
    let _ = state.tx.send(new_tuning);
    Ok(Json(ApiTuning::from(&new_tuning)))
}

async fn get_histogram(State(state): State<AppState>) -> Json<HistogramSnapshot> {
    Json(lock(&state.histogram).clone())
}

pub fn spawn_axum_server(
    addr: SocketAddr,
    tx: mpsc::Sender<BoardTuning>,
    mirror: Arc<Mutex<BoardTuning>>,
    histogram: Arc<Mutex<HistogramSnapshot>>,
) {
    std::thread::spawn(move || {
        let rt = match Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                error!("tuning server: tokio runtime failed: {}", e);
                return;
            }
        };

        rt.block_on(async move {
            let app = build_router(tx, mirror, histogram);

            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("tuning server: cannot bind {}: {}", addr, e);
                    return;
                }
            };
            info!("tuning server on http://{}", addr);
            if let Err(e) = axum::serve(listener, app).await {
                error!("tuning server stopped: {}", e);
            }
        });
    });
}

fn build_router(
    tx: mpsc::Sender<BoardTuning>,
    mirror: Arc<Mutex<BoardTuning>>,
    histogram: Arc<Mutex<HistogramSnapshot>>,
) -> Router {
    let state = AppState { tx, mirror, histogram };
    Router::new()
        .route("/tuning", get(get_tuning).patch(patch_tuning))
        .route("/histogram", get(get_histogram))
        .with_state(state)
}

pub fn build_router_for_test(
    tx: mpsc::Sender<BoardTuning>,
    mirror: Arc<Mutex<BoardTuning>>,
    histogram: Arc<Mutex<HistogramSnapshot>>,
) -> Router {
    build_router(tx, mirror, histogram)
}

// Receiver is not Sync, so it lives in the app as a non-send resource.
pub struct TuningRx(pub mpsc::Receiver<BoardTuning>);

#[derive(Resource, Clone)]
pub struct TuningMirror(pub Arc<Mutex<BoardTuning>>);

#[derive(Resource, Clone)]
pub struct HistogramMirror(pub Arc<Mutex<HistogramSnapshot>>);

pub fn apply_tuning_updates_system(
    rx: NonSend<TuningRx>,
    mut lifecycle: ResMut<BeadLifecycle>,
    mirror: Res<TuningMirror>,
) {
    while let Ok(new_tuning) = rx.0.try_recv() {
        new_tuning.apply_to_lifecycle(&mut lifecycle);
        *lock(&mirror.0) = new_tuning;
        info!("tuning applied: {:?}", new_tuning);
    }
}

pub fn publish_histogram(
    mut counters_changed: EventReader<CountersChanged>,
    board: Res<GaltonBoard>,
    mirror: Res<HistogramMirror>,
) {
    if counters_changed.read().count() == 0 {
        return;
    }
    *lock(&mirror.0) = HistogramSnapshot::capture(&board);
}

/// Serves `/tuning` and `/histogram` on `addr`. Add after `GaltonPlugin`.
pub struct TuningPlugin {
    pub addr: SocketAddr,
}

impl Plugin for TuningPlugin {
    fn build(&self, app: &mut App) {
        let (tuning, histogram) = match app.world().get_resource::<GaltonBoard>() {
            Some(board) => (
                BoardTuning::from_timings(&board.config.timings),
                HistogramSnapshot::capture(board),
            ),
            None => {
                error!("TuningPlugin needs GaltonPlugin; tuning server not started");
                return;
            }
        };
        let (tx, rx) = mpsc::channel::<BoardTuning>();
        let mirror = Arc::new(Mutex::new(tuning));
        let histogram = Arc::new(Mutex::new(histogram));
        spawn_axum_server(self.addr, tx, mirror.clone(), histogram.clone());

        app.insert_non_send_resource(TuningRx(rx))
            .insert_resource(TuningMirror(mirror))
            .insert_resource(HistogramMirror(histogram))
            .add_systems(Update, (apply_tuning_updates_system, publish_histogram));
    }
}
