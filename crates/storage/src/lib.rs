//! Storage contract for the snake server.
//!
//! The store is a wide-column key/value service with conditional updates and
//! atomic counters. The core only depends on the operations declared here;
//! implementations are interchangeable. [`MemoryStorage`] backs tests and
//! local development, and [`RetryingStorage`] adds the counter retry policy
//! any production implementation is expected to sit behind.

pub mod models;

mod memory;
mod retry;

use std::env;

use thiserror::Error;

pub use memory::MemoryStorage;
pub use retry::RetryingStorage;

use models::{
    EconomyParams, EconomyPeriod, Settings, SnakeEvent, SnakeRecord, User, WorldChunk,
};

/// Errors surfaced by storage implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("conditional write failed: {0}")]
    ConditionFailed(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Keyed access over the seven logical tables plus the two atomic counters.
///
/// Counter operations are the only ones retried; everything else is
/// single-shot and the caller's bookkeeping re-issues failed writes.
pub trait Storage: Send + Sync {
    // Full user listing is used by low-frequency aggregated reads
    // (the economy endpoint).
    fn list_users(&self) -> Result<Vec<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>>;
    fn put_user(&self, user: &User) -> Result<()>;

    fn list_snakes(&self) -> Result<Vec<SnakeRecord>>;
    fn get_snake_by_id(&self, snake_id: &str) -> Result<Option<SnakeRecord>>;
    fn put_snake(&self, snake: &SnakeRecord) -> Result<()>;
    fn delete_snake(&self, snake_id: &str) -> Result<()>;

    fn get_world_chunk(&self, chunk_id: &str) -> Result<Option<WorldChunk>>;
    fn put_world_chunk(&self, chunk: &WorldChunk) -> Result<()>;

    fn append_snake_event(&self, event: &SnakeEvent) -> Result<()>;

    fn get_settings(&self, settings_id: &str) -> Result<Option<Settings>>;
    fn put_settings(&self, settings: &Settings) -> Result<()>;

    fn get_economy_params_active(&self) -> Result<Option<EconomyParams>>;
    /// Writes a `ver#N` history row, then overwrites the `active` row.
    /// The assigned version is strictly monotone.
    fn put_economy_params_active_and_versioned(
        &self,
        params: &EconomyParams,
        updated_by: &str,
    ) -> Result<EconomyParams>;

    fn get_economy_period(&self, period_key: &str) -> Result<Option<EconomyPeriod>>;
    fn put_economy_period(&self, period: &EconomyPeriod) -> Result<()>;

    /// Atomically adds `delta` to the user's balance, returning the new value.
    fn increment_user_balance(&self, user_id: &str, delta: i64) -> Result<i64>;
    /// Atomically adds `delta` to the period's buy counter, creating the
    /// period row when absent. Returns the new counter value.
    fn increment_economy_period_delta_m_buy(&self, period_key: &str, delta: i64) -> Result<i64>;

    fn health_check(&self) -> Result<()>;
    fn reset_for_dev(&self) -> Result<()>;
}

/// Names of the seven backing tables.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub users_table: String,
    pub snakes_table: String,
    pub world_chunks_table: String,
    pub snake_events_table: String,
    pub settings_table: String,
    pub economy_params_table: String,
    pub economy_periods_table: String,
}

impl StorageConfig {
    /// Reads `TABLE_*` names from the environment, honoring the legacy
    /// `DYNAMO_TABLE_*` spellings still used by older deployments.
    pub fn from_env() -> Self {
        Self {
            users_table: table_env("USERS", "snake-users"),
            snakes_table: table_env("SNAKES", "snake-snakes"),
            world_chunks_table: table_env("WORLD_CHUNKS", "snake-world_chunks"),
            snake_events_table: table_env("SNAKE_EVENTS", "snake-snake_events"),
            settings_table: table_env("SETTINGS", "snake-settings"),
            economy_params_table: table_env("ECONOMY_PARAMS", "snake-economy_params"),
            economy_periods_table: table_env("ECONOMY_PERIODS", "snake-economy_periods"),
        }
    }
}

fn table_env(suffix: &str, default: &str) -> String {
    env::var(format!("TABLE_{suffix}"))
        .or_else(|_| env::var(format!("DYNAMO_TABLE_{suffix}")))
        .unwrap_or_else(|_| default.to_string())
}

/// Builds the process-wide store from the environment: the in-memory
/// implementation behind the counter retry policy.
pub fn create_storage_from_env() -> RetryingStorage<MemoryStorage> {
    let config = StorageConfig::from_env();
    RetryingStorage::new(MemoryStorage::new(config))
}
