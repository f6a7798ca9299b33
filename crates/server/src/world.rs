//! World facade: the single authoritative copy of simulation state.
//!
//! Every public method takes the state mutex for its whole duration, so
//! ticks, snapshots, input queueing, and delta draining are mutually
//! exclusive. Nothing here performs I/O; persistence happens by draining
//! [`PersistenceDelta`]s and shipping them to the store elsewhere.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::SeedableRng;

use storage::models::{SnakeEvent, SnakeRecord, WorldChunk};

use crate::entity::{Cell, Dir, Food, InputIntent, Obstacles, Snake};
use crate::spatial::ChunkManager;
use crate::systems::collision::{self, CollisionEvent, EventType};
use crate::systems::replication::{self, ReplicationRequest};
use crate::systems::{movement, spawn};

/// A consistent copy of world state taken under the lock.
#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub w: i32,
    pub h: i32,
    pub snakes: Vec<Snake>,
    pub foods: Vec<Food>,
}

impl WorldSnapshot {
    /// Converts into the wire shape served by `/game/state` and the stream.
    pub fn to_protocol(&self) -> protocol::Snapshot {
        protocol::Snapshot {
            tick: self.tick,
            w: self.w,
            h: self.h,
            foods: self
                .foods
                .iter()
                .map(|f| protocol::Point { x: f.x, y: f.y })
                .collect(),
            snakes: self
                .snakes
                .iter()
                .map(|s| protocol::SnakeState {
                    id: s.id,
                    user_id: s.user_id,
                    color: s.color.clone(),
                    dir: s.dir.code(),
                    paused: s.paused,
                    body: s
                        .body
                        .iter()
                        .map(|c| protocol::Point { x: c.x, y: c.y })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Meaningful state mutations accumulated since the last drain.
///
/// Per-tick movement is deliberately absent: only events, dirty snakes, and
/// food changes reach the store.
#[derive(Debug, Default)]
pub struct PersistenceDelta {
    pub upsert_snakes: Vec<SnakeRecord>,
    pub delete_snake_ids: Vec<String>,
    pub upsert_world_chunk: Option<WorldChunk>,
    pub snake_events: Vec<SnakeEvent>,
}

impl PersistenceDelta {
    pub fn empty(&self) -> bool {
        self.upsert_snakes.is_empty()
            && self.delete_snake_ids.is_empty()
            && self.upsert_world_chunk.is_none()
            && self.snake_events.is_empty()
    }
}

struct WorldState {
    width: i32,
    height: i32,
    food_count: usize,
    max_snakes_per_user: usize,

    tick: u64,
    world_version: i64,
    next_snake_id: i32,

    snakes: Vec<Snake>,
    foods: Vec<Food>,
    obstacles: Obstacles,

    input_buffer: HashMap<i32, InputIntent>,
    snake_created_at_ms: HashMap<i32, i64>,
    dirty_snake_ids: HashSet<i32>,
    deleted_snake_ids: HashSet<i32>,
    pending_snake_events: Vec<SnakeEvent>,
    world_chunk_dirty: bool,

    rng: StdRng,
    chunk_manager: ChunkManager,
}

/// The mutex-guarded world aggregate.
pub struct World {
    state: Mutex<WorldState>,
}

impl World {
    pub fn new(width: i32, height: i32, food_count: usize, max_snakes_per_user: usize) -> Self {
        Self::with_rng(
            width,
            height,
            food_count,
            max_snakes_per_user,
            StdRng::from_os_rng(),
        )
    }

    /// Seeded constructor so property tests stay reproducible.
    pub fn with_seed(
        width: i32,
        height: i32,
        food_count: usize,
        max_snakes_per_user: usize,
        seed: u64,
    ) -> Self {
        Self::with_rng(
            width,
            height,
            food_count,
            max_snakes_per_user,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        width: i32,
        height: i32,
        food_count: usize,
        max_snakes_per_user: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            state: Mutex::new(WorldState {
                width,
                height,
                food_count,
                max_snakes_per_user,
                tick: 0,
                world_version: 0,
                next_snake_id: 1,
                snakes: Vec::new(),
                foods: Vec::new(),
                obstacles: Vec::new(),
                input_buffer: HashMap::new(),
                snake_created_at_ms: HashMap::new(),
                dirty_snake_ids: HashSet::new(),
                deleted_snake_ids: HashSet::new(),
                pending_snake_events: Vec::new(),
                world_chunk_dirty: false,
                rng,
                chunk_manager: ChunkManager::new(64, true),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WorldState> {
        self.state.lock().expect("world mutex poisoned")
    }

    pub fn configure_chunking(&self, chunk_size: i32, single_chunk_mode: bool) {
        let mut state = self.lock();
        state.chunk_manager.set_config(chunk_size, single_chunk_mode);
        let state = &mut *state;
        state
            .chunk_manager
            .rebuild(&state.snakes, &state.foods, &state.obstacles, state.tick);
    }

    /// Resets in-memory state from persisted records.
    ///
    /// Records with an unusable id, owner, or liveness are skipped; bodies
    /// decode from the compact form with the stored head as fallback. Foods
    /// come from the chunk record when present, then get topped up. Snakes
    /// overlapping an already-seen cell are re-seeded onto free cells.
    pub fn load_from_storage(&self, stored: Vec<SnakeRecord>, world_chunk: Option<WorldChunk>) {
        let mut guard = self.lock();
        let state = &mut *guard;

        state.snakes.clear();
        state.foods.clear();
        state.input_buffer.clear();
        state.snake_created_at_ms.clear();
        state.dirty_snake_ids.clear();
        state.deleted_snake_ids.clear();
        state.pending_snake_events.clear();
        state.world_chunk_dirty = false;

        let mut max_snake_id = 0;
        for record in &stored {
            let id = parse_i32(&record.snake_id);
            let user_id = parse_i32(&record.owner_user_id);

            let mut body = decode_cells(&record.body_compact);
            if body.is_empty() {
                body.push(Cell::new(record.head_x, record.head_y));
            }

            if id <= 0 || user_id <= 0 || !record.alive {
                continue;
            }

            let snake = Snake {
                id,
                user_id,
                color: if record.color.is_empty() {
                    color_for_user(user_id).to_string()
                } else {
                    record.color.clone()
                },
                dir: Dir::try_from(record.direction).unwrap_or(Dir::Stop),
                paused: record.paused,
                alive: record.alive,
                grow: 0,
                body,
            };
            state.snake_created_at_ms.insert(snake.id, record.created_at);
            max_snake_id = max_snake_id.max(snake.id);
            state.snakes.push(snake);
        }
        state.next_snake_id = max_snake_id + 1;

        if let Some(chunk) = &world_chunk {
            state.foods = decode_foods(&chunk.food_state);
            state.world_version = chunk.version;
            if chunk.width > 0 {
                state.width = chunk.width;
            }
            if chunk.height > 0 {
                state.height = chunk.height;
            }
        }

        spawn::ensure_food_count(
            &state.snakes,
            &mut state.foods,
            state.food_count,
            state.width,
            state.height,
            &mut state.rng,
        );
        state.resolve_overlaps_on_start();

        if world_chunk.is_none() {
            // First boot against an empty store needs an initial world row.
            state.world_chunk_dirty = true;
            state.world_version += 1;
        }

        state
            .chunk_manager
            .rebuild(&state.snakes, &state.foods, &state.obstacles, state.tick);
    }

    /// Advances the simulation one step: movement, collision, spawn.
    ///
    /// Returns whether the tick produced observable change (any event fired
    /// or food moved), so the caller can bump the snapshot sequence.
    pub fn tick(&self) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;

        let mut before: HashMap<i32, (Dir, bool)> = HashMap::with_capacity(state.snakes.len());
        for s in &state.snakes {
            before.insert(s.id, (s.dir, s.paused));
        }

        movement::run(
            &mut state.snakes,
            &mut state.input_buffer,
            state.width,
            state.height,
        );

        let mut events: Vec<CollisionEvent> = Vec::with_capacity(8);
        let mut food_changed = false;
        collision::run(
            &mut state.snakes,
            &mut state.foods,
            state.width,
            state.height,
            &mut state.rng,
            &mut events,
            &mut food_changed,
        );

        spawn::ensure_food_count(
            &state.snakes,
            &mut state.foods,
            state.food_count,
            state.width,
            state.height,
            &mut state.rng,
        );

        for e in &events {
            state.push_snake_event(e, 0);
            if e.snake_id > 0 {
                state.mark_snake_dirty(e.snake_id);
            }
            if e.other_snake_id > 0 {
                state.mark_snake_dirty(e.other_snake_id);
            }
            if e.event_type == EventType::Death && e.snake_id > 0 {
                state.deleted_snake_ids.insert(e.snake_id);
                state.dirty_snake_ids.remove(&e.snake_id);
            }
        }

        let changed_ids: Vec<i32> = state
            .snakes
            .iter()
            .filter(|s| {
                before
                    .get(&s.id)
                    .is_some_and(|&(dir, paused)| dir != s.dir || paused != s.paused)
            })
            .map(|s| s.id)
            .collect();
        for id in changed_ids {
            state.mark_snake_dirty(id);
        }

        let observable = food_changed || !events.is_empty();
        if observable {
            state.world_chunk_dirty = true;
            state.world_version += 1;
        }

        state.tick += 1;
        state
            .chunk_manager
            .rebuild(&state.snakes, &state.foods, &state.obstacles, state.tick);

        observable
    }

    pub fn tick_id(&self) -> u64 {
        self.lock().tick
    }

    pub fn dimensions(&self) -> (i32, i32) {
        let state = self.lock();
        (state.width, state.height)
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let state = self.lock();
        WorldSnapshot {
            tick: state.tick,
            w: state.width,
            h: state.height,
            snakes: state.snakes.clone(),
            foods: state.foods.clone(),
        }
    }

    /// Snapshot filtered to a camera's area of interest.
    pub fn snapshot_for_camera(
        &self,
        camera_x: i32,
        camera_y: i32,
        aoi_enabled: bool,
        aoi_radius: i32,
    ) -> WorldSnapshot {
        let state = self.lock();
        let source = WorldSnapshot {
            tick: state.tick,
            w: state.width,
            h: state.height,
            snakes: state.snakes.clone(),
            foods: state.foods.clone(),
        };
        replication::build_snapshot(
            source,
            &state.chunk_manager,
            &ReplicationRequest {
                camera_x,
                camera_y,
                aoi_enabled,
                aoi_radius,
            },
        )
    }

    /// Buffers a direction intent. Returns false unless `user_id` owns the
    /// snake.
    pub fn queue_direction_input(&self, user_id: i32, snake_id: i32, dir: Dir) -> bool {
        let mut state = self.lock();
        if !state
            .snakes
            .iter()
            .any(|s| s.id == snake_id && s.user_id == user_id)
        {
            return false;
        }
        let intent = state.input_buffer.entry(snake_id).or_default();
        intent.has_desired_dir = true;
        intent.desired_dir = dir;
        true
    }

    /// Flips the buffered pause-toggle parity bit. Ownership-checked.
    pub fn queue_pause_toggle(&self, user_id: i32, snake_id: i32) -> bool {
        let mut state = self.lock();
        if !state
            .snakes
            .iter()
            .any(|s| s.id == snake_id && s.user_id == user_id)
        {
            return false;
        }
        let intent = state.input_buffer.entry(snake_id).or_default();
        intent.toggle_pause = !intent.toggle_pause;
        true
    }

    pub fn list_user_snakes(&self, user_id: i32) -> Vec<Snake> {
        self.lock()
            .snakes
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Creates a snake on a free cell. Returns `None` when the caller
    /// already owns `max_snakes_per_user` snakes.
    pub fn create_snake_for_user(&self, user_id: i32, color: &str) -> Option<i32> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let owned = state.snakes.iter().filter(|s| s.user_id == user_id).count();
        if owned >= state.max_snakes_per_user {
            return None;
        }

        let pos = spawn::rand_free_cell(
            &state.snakes,
            &state.foods,
            state.width,
            state.height,
            &mut state.rng,
        );

        let id = state.next_snake_id;
        state.next_snake_id += 1;
        state.snakes.push(Snake {
            id,
            user_id,
            color: color.to_string(),
            dir: Dir::Stop,
            paused: false,
            alive: true,
            grow: 0,
            body: vec![pos],
        });

        let now = state.tick as i64;
        state.snake_created_at_ms.insert(id, now);
        state.mark_snake_dirty(id);

        state.push_snake_event(
            &CollisionEvent {
                event_type: EventType::Spawn,
                snake_id: id,
                other_snake_id: 0,
                x: pos.x,
                y: pos.y,
                delta_length: 1,
            },
            now,
        );

        Some(id)
    }

    /// Drains all accumulated mutations into a delta and clears the
    /// bookkeeping. The delta is empty iff nothing fired since last drain.
    pub fn drain_persistence_delta(&self, ts_ms: i64) -> PersistenceDelta {
        let mut guard = self.lock();
        let state = &mut *guard;

        let mut delta = PersistenceDelta::default();

        delta.delete_snake_ids.reserve(state.deleted_snake_ids.len());
        for sid in state.deleted_snake_ids.drain() {
            delta.delete_snake_ids.push(sid.to_string());
            state.snake_created_at_ms.remove(&sid);
        }

        let dirty: Vec<i32> = state.dirty_snake_ids.drain().collect();
        for sid in dirty {
            let Some(snake) = state.snakes.iter().find(|s| s.id == sid) else {
                continue;
            };

            let snake_id = snake.id.to_string();
            let last_event_id = state
                .pending_snake_events
                .iter()
                .rev()
                .find(|e| e.snake_id == snake_id)
                .map(|e| e.event_id.clone());

            delta.upsert_snakes.push(SnakeRecord {
                snake_id,
                owner_user_id: snake.user_id.to_string(),
                alive: snake.alive,
                head_x: snake.head().map_or(0, |h| h.x),
                head_y: snake.head().map_or(0, |h| h.y),
                direction: snake.dir.code(),
                paused: snake.paused,
                length_k: snake.body.len() as i32,
                body_compact: encode_cells(&snake.body),
                color: snake.color.clone(),
                is_on_field: true,
                last_event_id,
                created_at: state.snake_created_at_ms.get(&sid).copied().unwrap_or(ts_ms),
                updated_at: ts_ms,
            });
        }

        if state.world_chunk_dirty {
            delta.upsert_world_chunk = Some(WorldChunk {
                chunk_id: "main".to_string(),
                width: state.width,
                height: state.height,
                obstacles: "[]".to_string(),
                food_state: encode_foods(&state.foods),
                version: state.world_version,
                updated_at: ts_ms,
            });
            state.world_chunk_dirty = false;
        }

        delta.snake_events = std::mem::take(&mut state.pending_snake_events);
        for e in &mut delta.snake_events {
            if e.created_at <= 0 {
                e.created_at = ts_ms;
            }
            if e.world_version <= 0 {
                e.world_version = state.world_version;
            }
        }

        delta
    }
}

impl WorldState {
    fn mark_snake_dirty(&mut self, snake_id: i32) {
        if snake_id > 0 && !self.deleted_snake_ids.contains(&snake_id) {
            self.dirty_snake_ids.insert(snake_id);
        }
    }

    fn push_snake_event(&mut self, e: &CollisionEvent, created_at: i64) {
        if e.snake_id <= 0 {
            return;
        }
        let event_type = e.event_type.as_str();
        self.pending_snake_events.push(SnakeEvent {
            snake_id: e.snake_id.to_string(),
            event_id: format!(
                "{created_at}#{}#{event_type}#{}",
                self.tick,
                self.pending_snake_events.len()
            ),
            event_type: event_type.to_string(),
            x: e.x,
            y: e.y,
            other_snake_id: (e.other_snake_id > 0).then(|| e.other_snake_id.to_string()),
            delta_length: e.delta_length,
            tick_number: self.tick,
            world_version: self.world_version,
            created_at,
        });
    }

    /// Re-seeds any snake whose body intersects an already-seen cell, so a
    /// reloaded world never starts with co-occupied cells.
    fn resolve_overlaps_on_start(&mut self) {
        let mut occupied: HashSet<Cell> = HashSet::new();

        for i in 0..self.snakes.len() {
            if !self.snakes[i].alive {
                continue;
            }
            if self.snakes[i].body.is_empty() {
                let cell = spawn::rand_free_cell(
                    &self.snakes,
                    &self.foods,
                    self.width,
                    self.height,
                    &mut self.rng,
                );
                self.snakes[i].body.push(cell);
            }

            let overlaps = self.snakes[i].body.iter().any(|c| occupied.contains(c));
            if overlaps {
                let cell = spawn::rand_free_cell(
                    &self.snakes,
                    &self.foods,
                    self.width,
                    self.height,
                    &mut self.rng,
                );
                let snake = &mut self.snakes[i];
                snake.body = vec![cell];
                snake.grow = 0;
                snake.dir = Dir::Stop;
                snake.paused = false;
                let id = snake.id;
                self.mark_snake_dirty(id);
            }

            occupied.extend(self.snakes[i].body.iter().copied());
        }
    }
}

/// Default display color for a user, cycling a small palette.
pub fn color_for_user(user_id: i32) -> &'static str {
    const PALETTE: [&str; 6] = [
        "#00ff00", "#00aaff", "#ff00ff", "#ff8800", "#00ffaa", "#ffaa00",
    ];
    if user_id <= 0 {
        return PALETTE[0];
    }
    PALETTE[(user_id as usize - 1) % PALETTE.len()]
}

fn parse_i32(s: &str) -> i32 {
    s.trim().parse().unwrap_or(0)
}

/// Encodes cells as the compact `[[x,y],...]` storage string, head first.
pub fn encode_cells(cells: &[Cell]) -> String {
    let mut out = String::with_capacity(2 + cells.len() * 8);
    out.push('[');
    for (i, c) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('[');
        out.push_str(&c.x.to_string());
        out.push(',');
        out.push_str(&c.y.to_string());
        out.push(']');
    }
    out.push(']');
    out
}

/// Decodes the compact `[[x,y],...]` form. Tolerates whitespace; stops at
/// the first malformed pair. Only ever fed strings this system produced.
pub fn decode_cells(input: &str) -> Vec<Cell> {
    let mut out = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0usize;

    let skip_ws = |i: &mut usize| {
        while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
            *i += 1;
        }
    };
    let read_int = |i: &mut usize| -> Option<i32> {
        skip_ws(i);
        let start = *i;
        if *i < bytes.len() && bytes[*i] == b'-' {
            *i += 1;
        }
        while *i < bytes.len() && bytes[*i].is_ascii_digit() {
            *i += 1;
        }
        if *i == start || (*i == start + 1 && bytes[start] == b'-') {
            return None;
        }
        input[start..*i].parse().ok()
    };

    skip_ws(&mut i);
    if i >= bytes.len() || bytes[i] != b'[' {
        return out;
    }
    i += 1;

    loop {
        skip_ws(&mut i);
        if i >= bytes.len() || bytes[i] == b']' {
            break;
        }
        if bytes[i] != b'[' {
            break;
        }
        i += 1;

        let Some(x) = read_int(&mut i) else { break };
        skip_ws(&mut i);
        if i >= bytes.len() || bytes[i] != b',' {
            break;
        }
        i += 1;
        let Some(y) = read_int(&mut i) else { break };
        skip_ws(&mut i);
        if i >= bytes.len() || bytes[i] != b']' {
            break;
        }
        i += 1;

        out.push(Cell::new(x, y));
        skip_ws(&mut i);
        if i < bytes.len() && bytes[i] == b',' {
            i += 1;
        }
    }

    out
}

pub fn encode_foods(foods: &[Food]) -> String {
    let cells: Vec<Cell> = foods.iter().map(|f| f.cell()).collect();
    encode_cells(&cells)
}

pub fn decode_foods(input: &str) -> Vec<Food> {
    decode_cells(input).into_iter().map(Food::from).collect()
}
