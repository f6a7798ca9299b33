//! SSE fan-out.
//!
//! Each stream is an independent task that samples the snapshot sequence
//! at half the spectator interval and re-derives a per-camera view when it
//! moves. The world lock is never held across a network write; axum's
//! keep-alive inserts the `: keepalive` comment during idle stretches.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use serde::Deserialize;

use super::game::now_ms;
use super::AppState;
use crate::world::WorldSnapshot;

const HEARTBEAT_EVERY: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub sid: Option<String>,
}

fn derive_snapshot(app: &AppState, sid: Option<&str>) -> WorldSnapshot {
    match sid.and_then(|sid| app.sessions.get(sid)) {
        Some(session) => app.world.snapshot_for_camera(
            session.camera_x,
            session.camera_y,
            app.config.aoi_enabled,
            app.config.aoi_radius,
        ),
        None => app.world.snapshot(),
    }
}

/// `GET /game/stream?sid=...`
pub async fn stream_handler(
    State(app): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    if let Some(sid) = &query.sid {
        app.sessions.touch(sid, &app.config, now_ms());
    }

    let poll = Duration::from_millis((app.config.spectator_interval_ms() / 2).max(1));

    let frames = stream::unfold(
        (app, query.sid, 0u64),
        move |(app, sid, last_seq)| async move {
            loop {
                tokio::time::sleep(poll).await;
                let seq = app.seq.get();
                if seq == last_seq {
                    continue;
                }

                let snapshot = derive_snapshot(&app, sid.as_deref());
                let json = serde_json::to_string(&snapshot.to_protocol())
                    .expect("snapshot serializes to JSON");
                let event = Event::default().event("frame").data(json);
                return Some((Ok::<_, Infallible>(event), (app, sid, seq)));
            }
        },
    );

    Sse::new(frames).keep_alive(KeepAlive::new().interval(HEARTBEAT_EVERY).text("keepalive"))
}
