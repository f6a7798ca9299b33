//! Retry policy for the atomic counter operations.
//!
//! Counter updates retry up to 3 times with linear backoff (50ms per
//! attempt). Every other operation is single-shot: failed snake upserts are
//! re-issued by the world's dirty-id bookkeeping on the next tick, so
//! retrying them here would only duplicate writes.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::models::{
    EconomyParams, EconomyPeriod, Settings, SnakeEvent, SnakeRecord, User, WorldChunk,
};
use crate::{Result, Storage};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_STEP_MS: u64 = 50;

/// Decorator adding the counter retry policy to any [`Storage`].
pub struct RetryingStorage<S> {
    inner: S,
}

impl<S: Storage> RetryingStorage<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn with_retries<T>(&self, op_name: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(%err, attempt, op = op_name, "counter update failed");
                    last_err = Some(err);
                    if attempt < MAX_ATTEMPTS {
                        thread::sleep(Duration::from_millis(BACKOFF_STEP_MS * attempt as u64));
                    }
                }
            }
        }
        Err(last_err.expect("at least one attempt"))
    }
}

impl<S: Storage> Storage for RetryingStorage<S> {
    fn list_users(&self) -> Result<Vec<User>> {
        self.inner.list_users()
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.inner.get_user_by_username(username)
    }

    fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        self.inner.get_user_by_id(user_id)
    }

    fn put_user(&self, user: &User) -> Result<()> {
        self.inner.put_user(user)
    }

    fn list_snakes(&self) -> Result<Vec<SnakeRecord>> {
        self.inner.list_snakes()
    }

    fn get_snake_by_id(&self, snake_id: &str) -> Result<Option<SnakeRecord>> {
        self.inner.get_snake_by_id(snake_id)
    }

    fn put_snake(&self, snake: &SnakeRecord) -> Result<()> {
        self.inner.put_snake(snake)
    }

    fn delete_snake(&self, snake_id: &str) -> Result<()> {
        self.inner.delete_snake(snake_id)
    }

    fn get_world_chunk(&self, chunk_id: &str) -> Result<Option<WorldChunk>> {
        self.inner.get_world_chunk(chunk_id)
    }

    fn put_world_chunk(&self, chunk: &WorldChunk) -> Result<()> {
        self.inner.put_world_chunk(chunk)
    }

    fn append_snake_event(&self, event: &SnakeEvent) -> Result<()> {
        self.inner.append_snake_event(event)
    }

    fn get_settings(&self, settings_id: &str) -> Result<Option<Settings>> {
        self.inner.get_settings(settings_id)
    }

    fn put_settings(&self, settings: &Settings) -> Result<()> {
        self.inner.put_settings(settings)
    }

    fn get_economy_params_active(&self) -> Result<Option<EconomyParams>> {
        self.inner.get_economy_params_active()
    }

    fn put_economy_params_active_and_versioned(
        &self,
        params: &EconomyParams,
        updated_by: &str,
    ) -> Result<EconomyParams> {
        self.inner
            .put_economy_params_active_and_versioned(params, updated_by)
    }

    fn get_economy_period(&self, period_key: &str) -> Result<Option<EconomyPeriod>> {
        self.inner.get_economy_period(period_key)
    }

    fn put_economy_period(&self, period: &EconomyPeriod) -> Result<()> {
        self.inner.put_economy_period(period)
    }

    fn increment_user_balance(&self, user_id: &str, delta: i64) -> Result<i64> {
        self.with_retries("increment_user_balance", || {
            self.inner.increment_user_balance(user_id, delta)
        })
    }

    fn increment_economy_period_delta_m_buy(&self, period_key: &str, delta: i64) -> Result<i64> {
        self.with_retries("increment_economy_period_delta_m_buy", || {
            self.inner
                .increment_economy_period_delta_m_buy(period_key, delta)
        })
    }

    fn health_check(&self) -> Result<()> {
        self.inner.health_check()
    }

    fn reset_for_dev(&self) -> Result<()> {
        self.inner.reset_for_dev()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{MemoryStorage, StorageConfig, StorageError};

    /// Fails the first `fail_count` counter updates, then delegates.
    struct Flaky {
        inner: MemoryStorage,
        fail_count: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(fail_count: u32) -> Self {
            let inner = MemoryStorage::new(StorageConfig::from_env());
            inner
                .put_user(&crate::models::User {
                    user_id: "1".to_string(),
                    username: "u".to_string(),
                    ..Default::default()
                })
                .unwrap();
            Self {
                inner,
                fail_count,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl Storage for Flaky {
        fn list_users(&self) -> Result<Vec<User>> {
            self.inner.list_users()
        }
        fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
            self.inner.get_user_by_username(username)
        }
        fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
            self.inner.get_user_by_id(user_id)
        }
        fn put_user(&self, user: &User) -> Result<()> {
            self.inner.put_user(user)
        }
        fn list_snakes(&self) -> Result<Vec<SnakeRecord>> {
            self.inner.list_snakes()
        }
        fn get_snake_by_id(&self, snake_id: &str) -> Result<Option<SnakeRecord>> {
            self.inner.get_snake_by_id(snake_id)
        }
        fn put_snake(&self, snake: &SnakeRecord) -> Result<()> {
            self.inner.put_snake(snake)
        }
        fn delete_snake(&self, snake_id: &str) -> Result<()> {
            self.inner.delete_snake(snake_id)
        }
        fn get_world_chunk(&self, chunk_id: &str) -> Result<Option<WorldChunk>> {
            self.inner.get_world_chunk(chunk_id)
        }
        fn put_world_chunk(&self, chunk: &WorldChunk) -> Result<()> {
            self.inner.put_world_chunk(chunk)
        }
        fn append_snake_event(&self, event: &SnakeEvent) -> Result<()> {
            self.inner.append_snake_event(event)
        }
        fn get_settings(&self, settings_id: &str) -> Result<Option<Settings>> {
            self.inner.get_settings(settings_id)
        }
        fn put_settings(&self, settings: &Settings) -> Result<()> {
            self.inner.put_settings(settings)
        }
        fn get_economy_params_active(&self) -> Result<Option<EconomyParams>> {
            self.inner.get_economy_params_active()
        }
        fn put_economy_params_active_and_versioned(
            &self,
            params: &EconomyParams,
            updated_by: &str,
        ) -> Result<EconomyParams> {
            self.inner
                .put_economy_params_active_and_versioned(params, updated_by)
        }
        fn get_economy_period(&self, period_key: &str) -> Result<Option<EconomyPeriod>> {
            self.inner.get_economy_period(period_key)
        }
        fn put_economy_period(&self, period: &EconomyPeriod) -> Result<()> {
            self.inner.put_economy_period(period)
        }

        fn increment_user_balance(&self, user_id: &str, delta: i64) -> Result<i64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_count {
                return Err(StorageError::Unavailable("simulated".to_string()));
            }
            self.inner.increment_user_balance(user_id, delta)
        }

        fn increment_economy_period_delta_m_buy(
            &self,
            period_key: &str,
            delta: i64,
        ) -> Result<i64> {
            self.inner
                .increment_economy_period_delta_m_buy(period_key, delta)
        }

        fn health_check(&self) -> Result<()> {
            self.inner.health_check()
        }
        fn reset_for_dev(&self) -> Result<()> {
            self.inner.reset_for_dev()
        }
    }

    #[test]
    fn counter_retries_then_succeeds() {
        let store = RetryingStorage::new(Flaky::new(2));
        assert_eq!(store.increment_user_balance("1", 10).unwrap(), 10);
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn counter_gives_up_after_three_attempts() {
        let store = RetryingStorage::new(Flaky::new(5));
        assert!(store.increment_user_balance("1", 10).is_err());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }
}
