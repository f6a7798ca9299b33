//! Game service and the tick/broadcast loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

use storage::Storage;

use crate::config::RuntimeConfig;
use crate::world::World;

/// Wall-clock milliseconds for persistence stamps.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Monotonic snapshot sequence. Readers only ever load the integer; SSE
/// sessions remember the last value they forwarded.
#[derive(Default)]
pub struct SnapshotSeq {
    seq: Mutex<u64>,
}

impl SnapshotSeq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) {
        *self.seq.lock().expect("sequence lock") += 1;
    }

    pub fn get(&self) -> u64 {
        *self.seq.lock().expect("sequence lock")
    }
}

/// Couples the world to the store: loads checkpoints in, flushes deltas out.
pub struct GameService {
    world: Arc<World>,
    storage: Arc<dyn Storage>,
}

impl GameService {
    pub fn new(world: Arc<World>, storage: Arc<dyn Storage>) -> Self {
        Self { world, storage }
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// Reloads the in-memory world from persisted snakes and the main chunk.
    pub fn load_from_storage(&self) -> anyhow::Result<()> {
        let snakes = self.storage.list_snakes()?;
        let chunk = self.storage.get_world_chunk("main")?;
        self.world.load_from_storage(snakes, chunk);
        Ok(())
    }

    /// Ships the accumulated delta to the store, one write per item.
    ///
    /// Failures are logged and dropped: dirty-id bookkeeping re-upserts
    /// failed snakes on the next tick, and events are best-effort.
    pub fn flush_persistence_delta(&self) {
        let delta = self.world.drain_persistence_delta(now_ms());
        if delta.empty() {
            return;
        }

        for snake in &delta.upsert_snakes {
            if let Err(err) = self.storage.put_snake(snake) {
                warn!(%err, snake_id = %snake.snake_id, "snake upsert failed");
            }
        }
        for snake_id in &delta.delete_snake_ids {
            if let Err(err) = self.storage.delete_snake(snake_id) {
                warn!(%err, %snake_id, "snake delete failed");
            }
        }
        if let Some(chunk) = &delta.upsert_world_chunk {
            if let Err(err) = self.storage.put_world_chunk(chunk) {
                warn!(%err, chunk_id = %chunk.chunk_id, "world chunk upsert failed");
            }
        }
        for event in &delta.snake_events {
            if let Err(err) = self.storage.append_snake_event(event) {
                warn!(%err, event_id = %event.event_id, "event append failed");
            }
        }
    }
}

const MAX_CATCH_UP_TICKS: u32 = 3;

/// Runs the fixed-rate tick and broadcast loop until `running` clears.
///
/// Each fired tick is followed immediately by a delta flush. The loop never
/// sleeps more than 5ms past a deadline so shutdown stays responsive, and a
/// final flush runs on the way out.
pub async fn run_game_loop(
    game: Arc<GameService>,
    config: RuntimeConfig,
    seq: Arc<SnapshotSeq>,
    reload: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
) {
    let tick_dt = Duration::from_millis(config.tick_interval_ms());
    let spectator_dt = Duration::from_millis(config.spectator_interval_ms());
    let max_lag = tick_dt * 5;

    let mut next_tick = Instant::now() + tick_dt;
    let mut next_broadcast = Instant::now() + spectator_dt;

    let mut ticks_since_log = 0u64;
    let mut broadcasts_since_log = 0u64;
    let mut next_log_at = Instant::now() + Duration::from_secs(5);

    while running.load(Ordering::Relaxed) {
        if reload.swap(false, Ordering::Relaxed) {
            info!("reload requested; loading world from storage");
            if let Err(err) = game.load_from_storage() {
                error!(%err, "world reload failed");
            }
            seq.bump();
        }

        let mut now = Instant::now();

        let mut catch_up_ticks = 0;
        while now >= next_tick && catch_up_ticks < MAX_CATCH_UP_TICKS {
            let changed = game.world().tick();
            game.flush_persistence_delta();
            if changed {
                seq.bump();
            }
            ticks_since_log += 1;
            catch_up_ticks += 1;
            next_tick += tick_dt;
            now = Instant::now();
        }

        if now.saturating_duration_since(next_tick) > max_lag {
            next_tick = now + tick_dt;
        }

        while config.enable_broadcast && now >= next_broadcast {
            seq.bump();
            broadcasts_since_log += 1;
            next_broadcast += spectator_dt;
            now = Instant::now();
        }

        if now.saturating_duration_since(next_broadcast) > spectator_dt * 5 {
            next_broadcast = now + spectator_dt;
        }

        if config.debug_tps && now >= next_log_at {
            info!(
                ticks_per_5s = ticks_since_log,
                broadcasts_per_5s = broadcasts_since_log,
                "rate"
            );
            ticks_since_log = 0;
            broadcasts_since_log = 0;
            next_log_at += Duration::from_secs(5);
        }

        let next_deadline = if config.enable_broadcast {
            next_tick.min(next_broadcast)
        } else {
            next_tick
        };
        let max_sleep_until = Instant::now() + Duration::from_millis(5);
        sleep_until(next_deadline.min(max_sleep_until)).await;
    }

    game.flush_persistence_delta();
    info!("game loop stopped");
}
