//! HTTP surface: router, handlers, and connection plumbing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use storage::Storage;

pub mod auth;
pub mod game;
pub mod session;
pub mod stream;

pub use auth::AuthState;
pub use game::{run_game_loop, GameService, SnapshotSeq};
pub use session::{Session, SessionRegistry};

use crate::config::RuntimeConfig;
use crate::economy::{EconomyService, PurchaseError};
use crate::entity::Dir;
use crate::world::World;
use game::now_ms;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub world: Arc<World>,
    pub storage: Arc<dyn Storage>,
    pub game: Arc<GameService>,
    pub economy: Arc<EconomyService>,
    pub auth: Arc<AuthState>,
    pub sessions: Arc<SessionRegistry>,
    pub seq: Arc<SnapshotSeq>,
    pub config: RuntimeConfig,
}

fn error_response(status: StatusCode, code: &'static str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

fn require_auth_user(auth: &AuthState, headers: &HeaderMap) -> Option<i32> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    auth.token_to_user(token)
}

/// Builds the application router with permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health))
        .route("/game/state", get(game_state))
        .route("/game/runtime", get(game_runtime))
        .route("/game/stream", get(stream::stream_handler))
        .route("/game/camera", post(game_camera))
        .route("/economy/state", get(economy_state))
        .route("/economy/purchase", post(economy_purchase))
        .route("/auth/login", post(auth_login))
        .route("/me/snakes", get(me_snakes_list).post(me_snakes_create))
        .route("/snakes/{id}/dir", post(snake_dir))
        .route("/snakes/{id}/pause", post(snake_pause))
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
}

/// Binds and serves until the shutdown future resolves.
pub async fn run(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("listening on http://{addr}");
    info!("SSE:   GET /game/stream");
    info!("State: GET /game/state");
    info!("Login: POST /auth/login {{username,password}}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server errored")
}

async fn health() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn game_state(State(app): State<AppState>) -> Response {
    Json(app.world.snapshot().to_protocol()).into_response()
}

async fn game_runtime(State(app): State<AppState>) -> Response {
    Json(protocol::RuntimeInfo {
        tick_hz: app.config.tick_hz,
        spectator_hz: app.config.spectator_hz,
        player_hz: app.config.player_hz,
        enable_broadcast: app.config.enable_broadcast,
        chunk_size: app.config.chunk_size,
        single_chunk_mode: app.config.single_chunk_mode,
        aoi_enabled: app.config.aoi_enabled,
        aoi_radius: app.config.aoi_radius,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct CameraRequest {
    sid: Option<String>,
    x: Option<i32>,
    y: Option<i32>,
    zoom: Option<f32>,
    watch_snake_id: Option<i32>,
}

async fn game_camera(State(app): State<AppState>, body: String) -> Response {
    let Ok(req) = serde_json::from_str::<CameraRequest>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "bad_camera_payload");
    };
    let (Some(sid), Some(x), Some(y)) = (req.sid, req.x, req.y) else {
        return error_response(StatusCode::BAD_REQUEST, "bad_camera_payload");
    };
    if sid.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "bad_camera_payload");
    }

    let session = app.sessions.update_camera(
        &sid,
        x,
        y,
        req.zoom,
        req.watch_snake_id,
        &app.config,
        now_ms(),
    );
    Json(session).into_response()
}

async fn economy_state(State(app): State<AppState>) -> Response {
    let s = app.economy.get_state();
    Json(json!({
        "period_key": s.state.period_key,
        "M": s.state.m,
        "K": s.state.k,
        "Y": s.state.y,
        "P": s.state.p,
        "pi": s.state.pi,
        "A_world": s.state.a_world,
        "M_white": s.state.m_white,
        "inputs": {
            "k_land": s.params.k_land,
            "A": s.params.a_productivity,
            "V": s.params.v_velocity,
            "M_G": s.params.m_gov_reserve,
            "cap_delta_m": s.params.cap_delta_m,
            "delta_m_issue": s.params.delta_m_issue,
            "delta_m_buy": s.delta_m_buy,
            "delta_k_obs": s.params.delta_k_obs,
            "sum_mi": s.state.sum_mi,
            "k_snakes": s.k_snakes,
        },
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct PurchaseRequest {
    cells: Option<i64>,
    purchased_cells: Option<i64>,
}

async fn economy_purchase(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(user_id) = require_auth_user(&app.auth, &headers) else {
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    };

    let cells = serde_json::from_str::<PurchaseRequest>(&body)
        .ok()
        .and_then(|req| req.cells.or(req.purchased_cells));
    let Some(cells) = cells.filter(|&c| c > 0) else {
        return error_response(StatusCode::BAD_REQUEST, "bad_cells");
    };

    match app.economy.purchase(user_id, cells) {
        Ok(snapshot) => Json(json!({
            "status": "OK",
            "cells": cells,
            "period_key": snapshot.state.period_key,
            "M": snapshot.state.m,
            "P": snapshot.state.p,
        }))
        .into_response(),
        Err(PurchaseError::UserUpdateFailed) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "purchase_user_update_failed",
        ),
        Err(PurchaseError::PeriodUpdateFailed) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "purchase_period_update_failed",
        ),
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

async fn auth_login(State(app): State<AppState>, body: String) -> Response {
    let Ok(req) = serde_json::from_str::<LoginRequest>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "bad_request");
    };
    let (Some(username), Some(password)) = (req.username, req.password) else {
        return error_response(StatusCode::BAD_REQUEST, "bad_request");
    };

    let user = match app.storage.get_user_by_username(&username) {
        Ok(Some(user)) if user.password_hash == password => user,
        _ => return error_response(StatusCode::UNAUTHORIZED, "unauthorized"),
    };
    let Ok(user_id) = user.user_id.parse::<i32>() else {
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    };

    let token = app.auth.issue_token(user_id);
    Json(json!({ "token": token, "user_id": user_id })).into_response()
}

async fn me_snakes_list(State(app): State<AppState>, headers: HeaderMap) -> Response {
    let Some(user_id) = require_auth_user(&app.auth, &headers) else {
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    };

    let snakes: Vec<_> = app
        .world
        .list_user_snakes(user_id)
        .into_iter()
        .map(|s| {
            json!({
                "id": s.id,
                "color": s.color,
                "paused": s.paused,
                "len": s.body.len(),
            })
        })
        .collect();
    Json(json!({ "snakes": snakes })).into_response()
}

#[derive(Debug, Deserialize)]
struct CreateSnakeRequest {
    color: Option<String>,
}

async fn me_snakes_create(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(user_id) = require_auth_user(&app.auth, &headers) else {
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    };

    // The body is optional; a missing or malformed color falls back.
    let color = serde_json::from_str::<CreateSnakeRequest>(&body)
        .ok()
        .and_then(|req| req.color)
        .unwrap_or_else(|| "#ff00ff".to_string());

    let Some(id) = app.world.create_snake_for_user(user_id, &color) else {
        return error_response(StatusCode::TOO_MANY_REQUESTS, "snake_limit");
    };
    app.game.flush_persistence_delta();

    Json(json!({ "id": id })).into_response()
}

#[derive(Debug, Deserialize)]
struct DirRequest {
    dir: Option<i32>,
}

async fn snake_dir(
    State(app): State<AppState>,
    Path(snake_id): Path<i32>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(user_id) = require_auth_user(&app.auth, &headers) else {
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    };

    let code = serde_json::from_str::<DirRequest>(&body)
        .ok()
        .and_then(|req| req.dir);
    let Some(code) = code.filter(|&d| (1..=4).contains(&d)) else {
        return error_response(StatusCode::BAD_REQUEST, "bad_dir");
    };
    let dir = Dir::try_from(code).expect("validated direction code");

    if !app.world.queue_direction_input(user_id, snake_id, dir) {
        return error_response(StatusCode::FORBIDDEN, "forbidden");
    }
    Json(json!({ "status": "OK" })).into_response()
}

async fn snake_pause(
    State(app): State<AppState>,
    Path(snake_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let Some(user_id) = require_auth_user(&app.auth, &headers) else {
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    };

    if !app.world.queue_pause_toggle(user_id, snake_id) {
        return error_response(StatusCode::FORBIDDEN, "forbidden");
    }
    Json(json!({ "status": "OK" })).into_response()
}
