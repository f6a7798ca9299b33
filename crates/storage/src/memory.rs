//! Ordered-map storage implementation.
//!
//! Backs local development and every storage-facing test. Data lives in
//! `BTreeMap`s so scans come back in key order, matching how the backing
//! wide-column store pages through partitions.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::models::{
    EconomyParams, EconomyPeriod, Settings, SnakeEvent, SnakeRecord, User, WorldChunk,
};
use crate::{Result, Storage, StorageConfig, StorageError};

#[derive(Default)]
struct Tables {
    users: BTreeMap<String, User>,
    snakes: BTreeMap<String, SnakeRecord>,
    world_chunks: BTreeMap<String, WorldChunk>,
    snake_events: Vec<SnakeEvent>,
    settings: BTreeMap<String, Settings>,
    economy_params: BTreeMap<String, EconomyParams>,
    economy_periods: BTreeMap<String, EconomyPeriod>,
}

/// In-memory store over the seven logical tables.
pub struct MemoryStorage {
    #[allow(dead_code)]
    config: StorageConfig,
    tables: Mutex<Tables>,
}

const ACTIVE_PARAMS_KEY: &str = "active";

impl MemoryStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Number of appended events, for tests and diagnostics.
    pub fn event_count(&self) -> usize {
        self.tables.lock().expect("storage lock").snake_events.len()
    }

    /// Copy of the event log, for tests and diagnostics.
    pub fn events(&self) -> Vec<SnakeEvent> {
        self.tables.lock().expect("storage lock").snake_events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("storage lock")
    }
}

impl Storage for MemoryStorage {
    fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.lock().users.values().cloned().collect())
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.lock().users.get(user_id).cloned())
    }

    fn put_user(&self, user: &User) -> Result<()> {
        self.lock().users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    fn list_snakes(&self) -> Result<Vec<SnakeRecord>> {
        Ok(self.lock().snakes.values().cloned().collect())
    }

    fn get_snake_by_id(&self, snake_id: &str) -> Result<Option<SnakeRecord>> {
        Ok(self.lock().snakes.get(snake_id).cloned())
    }

    fn put_snake(&self, snake: &SnakeRecord) -> Result<()> {
        self.lock()
            .snakes
            .insert(snake.snake_id.clone(), snake.clone());
        Ok(())
    }

    fn delete_snake(&self, snake_id: &str) -> Result<()> {
        self.lock().snakes.remove(snake_id);
        Ok(())
    }

    fn get_world_chunk(&self, chunk_id: &str) -> Result<Option<WorldChunk>> {
        Ok(self.lock().world_chunks.get(chunk_id).cloned())
    }

    fn put_world_chunk(&self, chunk: &WorldChunk) -> Result<()> {
        self.lock()
            .world_chunks
            .insert(chunk.chunk_id.clone(), chunk.clone());
        Ok(())
    }

    fn append_snake_event(&self, event: &SnakeEvent) -> Result<()> {
        self.lock().snake_events.push(event.clone());
        Ok(())
    }

    fn get_settings(&self, settings_id: &str) -> Result<Option<Settings>> {
        Ok(self.lock().settings.get(settings_id).cloned())
    }

    fn put_settings(&self, settings: &Settings) -> Result<()> {
        self.lock()
            .settings
            .insert(settings.settings_id.clone(), settings.clone());
        Ok(())
    }

    fn get_economy_params_active(&self) -> Result<Option<EconomyParams>> {
        Ok(self.lock().economy_params.get(ACTIVE_PARAMS_KEY).cloned())
    }

    fn put_economy_params_active_and_versioned(
        &self,
        params: &EconomyParams,
        updated_by: &str,
    ) -> Result<EconomyParams> {
        let mut tables = self.lock();

        let next_version = tables
            .economy_params
            .get(ACTIVE_PARAMS_KEY)
            .map(|active| active.version + 1)
            .unwrap_or_else(|| params.version.max(1));

        let mut stored = params.clone();
        stored.version = next_version;
        stored.updated_by = updated_by.to_string();

        tables
            .economy_params
            .insert(format!("ver#{next_version}"), stored.clone());
        tables
            .economy_params
            .insert(ACTIVE_PARAMS_KEY.to_string(), stored.clone());
        Ok(stored)
    }

    fn get_economy_period(&self, period_key: &str) -> Result<Option<EconomyPeriod>> {
        Ok(self.lock().economy_periods.get(period_key).cloned())
    }

    fn put_economy_period(&self, period: &EconomyPeriod) -> Result<()> {
        self.lock()
            .economy_periods
            .insert(period.period_key.clone(), period.clone());
        Ok(())
    }

    fn increment_user_balance(&self, user_id: &str, delta: i64) -> Result<i64> {
        let mut tables = self.lock();
        let user = tables
            .users
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound(format!("user {user_id}")))?;
        user.balance_mi += delta;
        Ok(user.balance_mi)
    }

    fn increment_economy_period_delta_m_buy(&self, period_key: &str, delta: i64) -> Result<i64> {
        let mut tables = self.lock();
        let period = tables
            .economy_periods
            .entry(period_key.to_string())
            .or_insert_with(|| EconomyPeriod {
                period_key: period_key.to_string(),
                ..EconomyPeriod::default()
            });
        period.delta_m_buy += delta;
        Ok(period.delta_m_buy)
    }

    fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn reset_for_dev(&self) -> Result<()> {
        let mut tables = self.lock();
        *tables = Tables::default();
        Ok(())
    }
}
