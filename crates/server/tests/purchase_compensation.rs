//! Purchase two-write semantics against a store that fails the period
//! counter: the balance credit must be rolled back and the call must
//! surface the period failure.

use std::sync::Arc;
use std::sync::Mutex;

use server::economy::{EconomyService, PurchaseError};
use storage::models::{
    EconomyParams, EconomyPeriod, Settings, SnakeEvent, SnakeRecord, User, WorldChunk,
};
use storage::{MemoryStorage, Storage, StorageConfig, StorageError};

/// Delegates everything to a memory store but fails period-counter updates
/// and records every balance increment it sees.
struct PeriodFailingStore {
    inner: MemoryStorage,
    balance_calls: Mutex<Vec<(String, i64)>>,
    fail_period: bool,
}

impl PeriodFailingStore {
    fn new(fail_period: bool) -> Self {
        let inner = MemoryStorage::new(StorageConfig::from_env());
        inner
            .put_user(&User {
                user_id: "1".to_string(),
                username: "user1".to_string(),
                password_hash: "pass1".to_string(),
                balance_mi: 0,
                created_at: 1,
            })
            .unwrap();
        Self {
            inner,
            balance_calls: Mutex::new(Vec::new()),
            fail_period,
        }
    }
}

impl Storage for PeriodFailingStore {
    fn list_users(&self) -> storage::Result<Vec<User>> {
        self.inner.list_users()
    }
    fn get_user_by_username(&self, username: &str) -> storage::Result<Option<User>> {
        self.inner.get_user_by_username(username)
    }
    fn get_user_by_id(&self, user_id: &str) -> storage::Result<Option<User>> {
        self.inner.get_user_by_id(user_id)
    }
    fn put_user(&self, user: &User) -> storage::Result<()> {
        self.inner.put_user(user)
    }
    fn list_snakes(&self) -> storage::Result<Vec<SnakeRecord>> {
        self.inner.list_snakes()
    }
    fn get_snake_by_id(&self, snake_id: &str) -> storage::Result<Option<SnakeRecord>> {
        self.inner.get_snake_by_id(snake_id)
    }
    fn put_snake(&self, snake: &SnakeRecord) -> storage::Result<()> {
        self.inner.put_snake(snake)
    }
    fn delete_snake(&self, snake_id: &str) -> storage::Result<()> {
        self.inner.delete_snake(snake_id)
    }
    fn get_world_chunk(&self, chunk_id: &str) -> storage::Result<Option<WorldChunk>> {
        self.inner.get_world_chunk(chunk_id)
    }
    fn put_world_chunk(&self, chunk: &WorldChunk) -> storage::Result<()> {
        self.inner.put_world_chunk(chunk)
    }
    fn append_snake_event(&self, event: &SnakeEvent) -> storage::Result<()> {
        self.inner.append_snake_event(event)
    }
    fn get_settings(&self, settings_id: &str) -> storage::Result<Option<Settings>> {
        self.inner.get_settings(settings_id)
    }
    fn put_settings(&self, settings: &Settings) -> storage::Result<()> {
        self.inner.put_settings(settings)
    }
    fn get_economy_params_active(&self) -> storage::Result<Option<EconomyParams>> {
        self.inner.get_economy_params_active()
    }
    fn put_economy_params_active_and_versioned(
        &self,
        params: &EconomyParams,
        updated_by: &str,
    ) -> storage::Result<EconomyParams> {
        self.inner
            .put_economy_params_active_and_versioned(params, updated_by)
    }
    fn get_economy_period(&self, period_key: &str) -> storage::Result<Option<EconomyPeriod>> {
        self.inner.get_economy_period(period_key)
    }
    fn put_economy_period(&self, period: &EconomyPeriod) -> storage::Result<()> {
        self.inner.put_economy_period(period)
    }

    fn increment_user_balance(&self, user_id: &str, delta: i64) -> storage::Result<i64> {
        self.balance_calls
            .lock()
            .unwrap()
            .push((user_id.to_string(), delta));
        self.inner.increment_user_balance(user_id, delta)
    }

    fn increment_economy_period_delta_m_buy(
        &self,
        period_key: &str,
        delta: i64,
    ) -> storage::Result<i64> {
        if self.fail_period {
            return Err(StorageError::Unavailable("period table down".to_string()));
        }
        self.inner
            .increment_economy_period_delta_m_buy(period_key, delta)
    }

    fn health_check(&self) -> storage::Result<()> {
        self.inner.health_check()
    }
    fn reset_for_dev(&self) -> storage::Result<()> {
        self.inner.reset_for_dev()
    }
}

#[test]
fn failed_period_update_compensates_the_balance() {
    let store = Arc::new(PeriodFailingStore::new(true));
    let economy = EconomyService::new(Arc::clone(&store) as Arc<dyn Storage>);

    let result = economy.purchase(1, 7);
    assert!(matches!(result, Err(PurchaseError::PeriodUpdateFailed)));

    let calls = store.balance_calls.lock().unwrap().clone();
    assert_eq!(calls, vec![("1".to_string(), 7), ("1".to_string(), -7)]);

    // Net effect on the balance is zero.
    let user = store.get_user_by_id("1").unwrap().unwrap();
    assert_eq!(user.balance_mi, 0);
}

#[test]
fn unknown_user_surfaces_the_balance_failure() {
    let store = Arc::new(PeriodFailingStore::new(false));
    let economy = EconomyService::new(Arc::clone(&store) as Arc<dyn Storage>);

    let result = economy.purchase(99, 3);
    assert!(matches!(result, Err(PurchaseError::UserUpdateFailed)));

    // No compensation fires when the first write never landed.
    let calls = store.balance_calls.lock().unwrap().clone();
    assert_eq!(calls, vec![("99".to_string(), 3)]);
}

#[test]
fn successful_purchase_moves_balance_and_period_counter() {
    let store = Arc::new(PeriodFailingStore::new(false));
    let economy = EconomyService::new(Arc::clone(&store) as Arc<dyn Storage>);

    let snapshot = economy.purchase(1, 5).expect("purchase succeeds");

    let user = store.get_user_by_id("1").unwrap().unwrap();
    assert_eq!(user.balance_mi, 5);
    // The fresh state reflects the credited balance and the buy counter.
    assert_eq!(snapshot.state.sum_mi, 5);
    assert_eq!(snapshot.delta_m_buy, 5);
}
