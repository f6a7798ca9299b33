//! Chunk grid over world cells.
//!
//! Each chunk covers `[cx*S, (cx+1)*S) x [cy*S, (cy+1)*S)` for chunk size
//! `S`. In single-chunk mode everything maps to `(0,0)`, which keeps small
//! deployments on one persistence row.

use std::collections::{HashMap, HashSet};

use crate::entity::{Cell, Food, Obstacles, Snake};

const MIN_CHUNK_SIZE: i32 = 8;

/// Chunk coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChunkId {
    pub cx: i32,
    pub cy: i32,
}

/// Per-chunk occupancy, rebuilt after every tick.
#[derive(Debug, Default)]
pub struct ChunkData {
    pub id: ChunkId,
    pub snake_ids: HashSet<i32>,
    pub foods: Vec<Food>,
    pub obstacles: Vec<Cell>,
    pub dirty: bool,
    pub dirty_since_tick: u64,
}

/// Maps cells to chunks and tracks which chunk holds each snake head.
#[derive(Debug)]
pub struct ChunkManager {
    chunk_size: i32,
    single_chunk_mode: bool,
    chunks: HashMap<ChunkId, ChunkData>,
    snake_head_chunk: HashMap<i32, ChunkId>,
}

impl ChunkManager {
    pub fn new(chunk_size: i32, single_chunk_mode: bool) -> Self {
        Self {
            chunk_size: chunk_size.max(MIN_CHUNK_SIZE),
            single_chunk_mode,
            chunks: HashMap::new(),
            snake_head_chunk: HashMap::new(),
        }
    }

    pub fn set_config(&mut self, chunk_size: i32, single_chunk_mode: bool) {
        self.chunk_size = chunk_size.max(MIN_CHUNK_SIZE);
        self.single_chunk_mode = single_chunk_mode;
    }

    pub fn coord_to_chunk(&self, x: i32, y: i32) -> ChunkId {
        if self.single_chunk_mode {
            return ChunkId::default();
        }
        ChunkId {
            cx: (x as f64 / self.chunk_size as f64).floor() as i32,
            cy: (y as f64 / self.chunk_size as f64).floor() as i32,
        }
    }

    /// The `(2r+1)^2` square neighborhood around `center`.
    pub fn chunks_in_radius(&self, center: ChunkId, radius: i32) -> Vec<ChunkId> {
        let r = radius.max(0);
        let side = (2 * r + 1) as usize;
        let mut out = Vec::with_capacity(side * side);
        for dx in -r..=r {
            for dy in -r..=r {
                out.push(ChunkId {
                    cx: center.cx + dx,
                    cy: center.cy + dy,
                });
            }
        }
        out
    }

    fn ensure_chunk(&mut self, id: ChunkId, tick_id: u64) -> &mut ChunkData {
        self.chunks.entry(id).or_insert_with(|| ChunkData {
            id,
            dirty: true,
            dirty_since_tick: tick_id,
            ..ChunkData::default()
        })
    }

    /// Re-indexes snake heads, foods, and obstacles into chunks.
    pub fn rebuild(
        &mut self,
        snakes: &[Snake],
        foods: &[Food],
        obstacles: &Obstacles,
        tick_id: u64,
    ) {
        self.chunks.clear();
        self.snake_head_chunk.clear();

        for s in snakes {
            let Some(head) = s.head() else { continue };
            if !s.alive {
                continue;
            }
            let id = self.coord_to_chunk(head.x, head.y);
            self.ensure_chunk(id, tick_id).snake_ids.insert(s.id);
            self.snake_head_chunk.insert(s.id, id);
        }

        for &f in foods {
            let id = self.coord_to_chunk(f.x, f.y);
            self.ensure_chunk(id, tick_id).foods.push(f);
        }

        for o in obstacles {
            let id = self.coord_to_chunk(o.pos.x, o.pos.y);
            self.ensure_chunk(id, tick_id).obstacles.push(o.pos);
        }
    }

    pub fn chunks(&self) -> &HashMap<ChunkId, ChunkData> {
        &self.chunks
    }

    /// Whether the snake's recorded head chunk is in the visible set.
    pub fn snake_in_chunks(&self, snake_id: i32, visible: &HashSet<ChunkId>) -> bool {
        self.snake_head_chunk
            .get(&snake_id)
            .is_some_and(|id| visible.contains(id))
    }

    pub fn food_in_chunks(&self, food: Food, visible: &HashSet<ChunkId>) -> bool {
        visible.contains(&self.coord_to_chunk(food.x, food.y))
    }
}
