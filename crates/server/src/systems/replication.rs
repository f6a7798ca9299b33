//! Per-camera snapshot derivation.

use std::collections::HashSet;

use crate::spatial::{ChunkId, ChunkManager};
use crate::world::WorldSnapshot;

/// Camera parameters for one derived view.
#[derive(Debug, Clone, Copy)]
pub struct ReplicationRequest {
    pub camera_x: i32,
    pub camera_y: i32,
    pub aoi_enabled: bool,
    pub aoi_radius: i32,
}

/// Filters `source` down to the camera's visible chunk set.
///
/// Snake visibility is head-based: a snake whose head chunk is visible is
/// kept whole. Grid dimensions and tick are always preserved.
pub fn build_snapshot(
    source: WorldSnapshot,
    chunk_manager: &ChunkManager,
    req: &ReplicationRequest,
) -> WorldSnapshot {
    if !req.aoi_enabled {
        return source;
    }

    let center = chunk_manager.coord_to_chunk(req.camera_x, req.camera_y);
    let visible: HashSet<ChunkId> = chunk_manager
        .chunks_in_radius(center, req.aoi_radius)
        .into_iter()
        .collect();

    let mut out = WorldSnapshot {
        tick: source.tick,
        w: source.w,
        h: source.h,
        snakes: Vec::with_capacity(source.snakes.len()),
        foods: Vec::with_capacity(source.foods.len()),
    };

    for s in source.snakes {
        if chunk_manager.snake_in_chunks(s.id, &visible) {
            out.snakes.push(s);
        }
    }

    for f in source.foods {
        if chunk_manager.food_in_chunks(f, &visible) {
            out.foods.push(f);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Cell, Dir, Food, Snake};

    fn snake(id: i32, head: (i32, i32), tail: (i32, i32)) -> Snake {
        Snake {
            id,
            user_id: id,
            color: "#00ff00".to_string(),
            dir: Dir::Stop,
            paused: false,
            alive: true,
            grow: 0,
            body: vec![Cell::new(head.0, head.1), Cell::new(tail.0, tail.1)],
        }
    }

    fn world_snapshot(snakes: Vec<Snake>, foods: Vec<Food>) -> WorldSnapshot {
        WorldSnapshot {
            tick: 9,
            w: 64,
            h: 64,
            snakes,
            foods,
        }
    }

    #[test]
    fn disabled_aoi_passes_everything_through() {
        let mgr = ChunkManager::new(16, false);
        let source = world_snapshot(
            vec![snake(1, (2, 2), (3, 2))],
            vec![Food { x: 60, y: 60 }],
        );

        let out = build_snapshot(source.clone(), &mgr, &ReplicationRequest {
            camera_x: 0,
            camera_y: 0,
            aoi_enabled: false,
            aoi_radius: 1,
        });

        assert_eq!(out.snakes.len(), 1);
        assert_eq!(out.foods.len(), 1);
        assert_eq!(out.tick, source.tick);
    }

    #[test]
    fn aoi_keeps_head_visible_snakes_whole() {
        let mut mgr = ChunkManager::new(16, false);
        // Head in chunk (0,0), tail stretching into chunk (1,0).
        let near = snake(1, (15, 2), (16, 2));
        let far = snake(2, (60, 60), (61, 60));
        let snakes = vec![near, far];
        let foods = vec![Food { x: 5, y: 5 }, Food { x: 60, y: 5 }];
        mgr.rebuild(&snakes, &foods, &Vec::new(), 9);

        let out = build_snapshot(world_snapshot(snakes, foods), &mgr, &ReplicationRequest {
            camera_x: 8,
            camera_y: 8,
            aoi_enabled: true,
            aoi_radius: 0,
        });

        assert_eq!(out.snakes.len(), 1);
        assert_eq!(out.snakes[0].id, 1);
        assert_eq!(out.snakes[0].body.len(), 2);
        assert_eq!(out.foods, vec![Food { x: 5, y: 5 }]);
        assert_eq!(out.w, 64);
        assert_eq!(out.h, 64);
    }

    #[test]
    fn radius_widens_the_visible_set() {
        let mut mgr = ChunkManager::new(16, false);
        let snakes = vec![snake(1, (20, 8), (21, 8))];
        mgr.rebuild(&snakes, &[], &Vec::new(), 1);

        let narrow = build_snapshot(
            world_snapshot(snakes.clone(), Vec::new()),
            &mgr,
            &ReplicationRequest {
                camera_x: 8,
                camera_y: 8,
                aoi_enabled: true,
                aoi_radius: 0,
            },
        );
        assert!(narrow.snakes.is_empty());

        let wide = build_snapshot(
            world_snapshot(snakes, Vec::new()),
            &mgr,
            &ReplicationRequest {
                camera_x: 8,
                camera_y: 8,
                aoi_enabled: true,
                aoi_radius: 1,
            },
        );
        assert_eq!(wide.snakes.len(), 1);
    }
}
