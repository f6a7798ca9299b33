//! Shared protocol crate for the snake server.
//!
//! This crate contains:
//! - Snapshot JSON shapes served by `/game/state` and the SSE stream
//! - Runtime info served by `/game/runtime`
//! - Direction wire codes

use serde::{Deserialize, Serialize};

/// Wire protocol version. Bump before altering the snapshot shape.
pub const PROTOCOL_VERSION: u32 = 1;

/// Direction wire codes shared with clients.
pub mod dir_code {
    pub const STOP: i32 = 0;
    pub const LEFT: i32 = 1;
    pub const RIGHT: i32 = 2;
    pub const UP: i32 = 3;
    pub const DOWN: i32 = 4;
}

/// A grid cell as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// One snake inside a snapshot frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnakeState {
    pub id: i32,
    pub user_id: i32,
    pub color: String,
    pub dir: i32,
    pub paused: bool,
    pub body: Vec<Point>,
}

/// A full (or AOI-filtered) world frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub w: i32,
    pub h: i32,
    pub foods: Vec<Point>,
    pub snakes: Vec<SnakeState>,
}

/// Active rates and AOI configuration, as reported by `/game/runtime`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeInfo {
    pub tick_hz: i32,
    pub spectator_hz: i32,
    pub player_hz: i32,
    pub enable_broadcast: bool,
    pub chunk_size: i32,
    pub single_chunk_mode: bool,
    pub aoi_enabled: bool,
    pub aoi_radius: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_json_shape_is_stable() {
        let snap = Snapshot {
            tick: 7,
            w: 40,
            h: 20,
            foods: vec![Point { x: 3, y: 4 }],
            snakes: vec![SnakeState {
                id: 1,
                user_id: 1,
                color: "#00ff00".to_string(),
                dir: dir_code::RIGHT,
                paused: false,
                body: vec![Point { x: 5, y: 5 }, Point { x: 4, y: 5 }],
            }],
        };

        let json = serde_json::to_string(&snap).unwrap();
        assert_eq!(
            json,
            concat!(
                "{\"tick\":7,\"w\":40,\"h\":20,",
                "\"foods\":[{\"x\":3,\"y\":4}],",
                "\"snakes\":[{\"id\":1,\"user_id\":1,\"color\":\"#00ff00\",",
                "\"dir\":2,\"paused\":false,",
                "\"body\":[{\"x\":5,\"y\":5},{\"x\":4,\"y\":5}]}]}"
            )
        );

        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
