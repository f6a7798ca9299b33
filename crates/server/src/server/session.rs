//! Viewer sessions and camera state.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::config::RuntimeConfig;

const MIN_ZOOM: f32 = 0.25;
const MAX_ZOOM: f32 = 4.0;

/// Per-viewer camera state, keyed by an opaque client-chosen id.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub sid: String,
    pub camera_x: i32,
    pub camera_y: i32,
    pub camera_zoom: f32,
    pub watched_snake_id: Option<i32>,
    /// `(2r+1)^2` visible chunks, `1` in single-chunk mode, `-1` when AOI
    /// filtering is off entirely.
    pub subscribed_chunks_count: i32,
    pub updated_at_ms: i64,
}

/// Process-level session map. Reads and writes are short; the mutex is
/// never held across I/O.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
}

fn subscribed_chunks_count(config: &RuntimeConfig) -> i32 {
    if !config.aoi_enabled {
        return -1;
    }
    if config.single_chunk_mode {
        return 1;
    }
    let side = 2 * config.aoi_radius.max(0) + 1;
    side * side
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the session, creating a default-camera one on first touch.
    pub fn touch(&self, sid: &str, config: &RuntimeConfig, now_ms: i64) -> Session {
        let mut sessions = self.sessions.lock().expect("session lock");
        sessions
            .entry(sid.to_string())
            .or_insert_with(|| Session {
                sid: sid.to_string(),
                camera_x: 0,
                camera_y: 0,
                camera_zoom: 1.0,
                watched_snake_id: None,
                subscribed_chunks_count: subscribed_chunks_count(config),
                updated_at_ms: now_ms,
            })
            .clone()
    }

    /// Applies a camera update, clamping coordinates into the grid and the
    /// zoom into its range.
    pub fn update_camera(
        &self,
        sid: &str,
        x: i32,
        y: i32,
        zoom: Option<f32>,
        watched_snake_id: Option<i32>,
        config: &RuntimeConfig,
        now_ms: i64,
    ) -> Session {
        let mut sessions = self.sessions.lock().expect("session lock");
        let session = sessions.entry(sid.to_string()).or_insert_with(|| Session {
            sid: sid.to_string(),
            camera_x: 0,
            camera_y: 0,
            camera_zoom: 1.0,
            watched_snake_id: None,
            subscribed_chunks_count: subscribed_chunks_count(config),
            updated_at_ms: now_ms,
        });

        session.camera_x = x.clamp(0, config.width - 1);
        session.camera_y = y.clamp(0, config.height - 1);
        if let Some(zoom) = zoom {
            session.camera_zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        }
        if watched_snake_id.is_some() {
            session.watched_snake_id = watched_snake_id;
        }
        session.subscribed_chunks_count = subscribed_chunks_count(config);
        session.updated_at_ms = now_ms;
        session.clone()
    }

    pub fn get(&self, sid: &str) -> Option<Session> {
        self.sessions.lock().expect("session lock").get(sid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            width: 40,
            height: 20,
            ..RuntimeConfig::default()
        }
    }

    #[test]
    fn touch_creates_a_default_session_once() {
        let registry = SessionRegistry::new();
        let cfg = config();

        let first = registry.touch("abc", &cfg, 100);
        assert_eq!(first.camera_x, 0);
        assert_eq!(first.camera_zoom, 1.0);

        registry.update_camera("abc", 5, 5, None, None, &cfg, 200);
        let again = registry.touch("abc", &cfg, 300);
        assert_eq!(again.camera_x, 5);
    }

    #[test]
    fn camera_updates_clamp_into_the_grid() {
        let registry = SessionRegistry::new();
        let cfg = config();

        let session = registry.update_camera("abc", 500, -3, Some(9.0), Some(7), &cfg, 1);
        assert_eq!(session.camera_x, 39);
        assert_eq!(session.camera_y, 0);
        assert_eq!(session.camera_zoom, 4.0);
        assert_eq!(session.watched_snake_id, Some(7));

        let session = registry.update_camera("abc", 3, 4, Some(0.01), None, &cfg, 2);
        assert_eq!(session.camera_zoom, 0.25);
        // Absent watch id keeps the previous one.
        assert_eq!(session.watched_snake_id, Some(7));
    }

    #[test]
    fn chunk_count_reflects_aoi_config() {
        let registry = SessionRegistry::new();

        let mut cfg = config();
        cfg.aoi_enabled = false;
        assert_eq!(registry.touch("a", &cfg, 1).subscribed_chunks_count, -1);

        cfg.aoi_enabled = true;
        cfg.single_chunk_mode = true;
        assert_eq!(
            registry.update_camera("a", 0, 0, None, None, &cfg, 2).subscribed_chunks_count,
            1
        );

        cfg.single_chunk_mode = false;
        cfg.aoi_radius = 2;
        assert_eq!(
            registry.update_camera("a", 0, 0, None, None, &cfg, 3).subscribed_chunks_count,
            25
        );
    }
}
