//! Macro-economy aggregation over world occupancy and user balances.
//!
//! Reads are cached with a short TTL and degrade to a zero-state when the
//! backing store is unavailable, so `/economy/state` stays up through
//! transient outages. Purchases are a two-write path with best-effort
//! compensation; the inconsistency window is accepted and logged.

use std::env;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tracing::warn;

use storage::models::{EconomyParams, EconomyPeriod};
use storage::Storage;

/// Current UTC accumulation window, `YYYYMMDDHH`.
pub fn utc_period_key() -> String {
    Utc::now().format("%Y%m%d%H").to_string()
}

/// Inputs to the v1 formulas.
#[derive(Debug, Clone, Default)]
pub struct EconomyInputs {
    pub params: EconomyParams,
    pub sum_mi: i64,
    pub m_g: i64,
    pub delta_m_buy: i64,
    pub delta_m_issue: i64,
    pub cap_delta_m: i64,
    pub k_snakes: i64,
    pub delta_k_obs: i64,
}

/// Derived macro aggregates for one period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EconomyState {
    pub period_key: String,
    pub sum_mi: i64,
    pub m_g: i64,
    /// Money supply.
    pub m: i64,
    /// Money growth for the current period.
    pub delta_m: i64,
    /// Effective capital.
    pub k: i64,
    /// Output.
    pub y: f64,
    /// Price index.
    pub p: f64,
    /// Inflation.
    pub pi: f64,
    /// Implied world area.
    pub a_world: i64,
    /// Free space.
    pub m_white: i64,
    pub p_clamped: f64,
}

/// The v1 formulas. Deterministic and side-effect free.
pub fn compute_economy_v1(input: &EconomyInputs, period_key: &str) -> EconomyState {
    let mut out = EconomyState {
        period_key: period_key.to_string(),
        sum_mi: input.sum_mi,
        m_g: input.m_g,
        ..EconomyState::default()
    };

    out.m = input.sum_mi + input.m_g;
    out.delta_m = input.cap_delta_m.min(input.delta_m_issue) + input.delta_m_buy;
    out.k = input.k_snakes + input.delta_k_obs;
    out.y = input.params.a_productivity * out.k as f64;

    let denom_y = out.y.max(1.0);
    out.p = (out.m as f64 * input.params.v_velocity) / denom_y;
    out.p_clamped = out.p.clamp(0.2, 5.0);

    let denom_m = out.m.max(1) as f64;
    out.pi = out.delta_m as f64 / denom_m;

    out.a_world = input.params.k_land * out.m;
    out.m_white = (out.a_world - out.k).max(0);
    out
}

/// Everything the economy endpoints report for one computation.
#[derive(Debug, Clone, Default)]
pub struct EconomySnapshot {
    pub state: EconomyState,
    pub params: EconomyParams,
    pub delta_m_buy: i64,
    pub k_snakes: i64,
}

/// Purchase failures, mapped onto the wire error codes by the handlers.
#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("user balance update failed")]
    UserUpdateFailed,
    #[error("period counter update failed")]
    PeriodUpdateFailed,
}

struct CacheSlot {
    snapshot: EconomySnapshot,
    expires_at: Instant,
    valid: bool,
}

/// Cached, storage-backed economy reads plus the purchase path.
pub struct EconomyService {
    storage: Arc<dyn Storage>,
    cache_ttl: Duration,
    cache: Mutex<CacheSlot>,
}

impl EconomyService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let cache_ttl_ms = env::var("ECONOMY_CACHE_MS")
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(2000)
            .clamp(500, 10_000);

        Self {
            storage,
            cache_ttl: Duration::from_millis(cache_ttl_ms as u64),
            cache: Mutex::new(CacheSlot {
                snapshot: EconomySnapshot::default(),
                expires_at: Instant::now(),
                valid: false,
            }),
        }
    }

    /// Cached read of the current period's macro state.
    pub fn get_state(&self) -> EconomySnapshot {
        let now = Instant::now();
        {
            let cache = self.cache.lock().expect("economy cache lock");
            if cache.valid && now < cache.expires_at {
                return cache.snapshot.clone();
            }
        }

        // Compute outside the lock, then swap in.
        let fresh = self.compute_fresh(&utc_period_key());
        let mut cache = self.cache.lock().expect("economy cache lock");
        cache.snapshot = fresh.clone();
        cache.expires_at = now + self.cache_ttl;
        cache.valid = true;
        fresh
    }

    pub fn invalidate_cache(&self) {
        self.cache.lock().expect("economy cache lock").valid = false;
    }

    /// Credits `cells` to the user and the period counter.
    ///
    /// The two writes are not transactional: when the period update fails
    /// the balance credit is rolled back best-effort and the whole call
    /// reports failure.
    pub fn purchase(&self, user_id: i32, cells: i64) -> Result<EconomySnapshot, PurchaseError> {
        let user_key = user_id.to_string();
        let period_key = utc_period_key();

        if let Err(err) = self.storage.increment_user_balance(&user_key, cells) {
            warn!(%err, user_id, "purchase balance update failed");
            return Err(PurchaseError::UserUpdateFailed);
        }

        if let Err(err) = self
            .storage
            .increment_economy_period_delta_m_buy(&period_key, cells)
        {
            warn!(%err, user_id, %period_key, "purchase period update failed; compensating");
            if let Err(comp_err) = self.storage.increment_user_balance(&user_key, -cells) {
                warn!(%comp_err, user_id, "purchase compensation failed; balances inconsistent");
            }
            return Err(PurchaseError::PeriodUpdateFailed);
        }

        self.invalidate_cache();
        Ok(self.get_state())
    }

    /// Recomputes the period and persists its computed aggregates
    /// (p and pi stored as millionths).
    pub fn recompute_and_persist(&self, period_key: &str) -> EconomySnapshot {
        let fresh = self.compute_fresh(period_key);
        let period = EconomyPeriod {
            period_key: period_key.to_string(),
            delta_m_buy: fresh.delta_m_buy,
            computed_m: fresh.state.m,
            computed_k: fresh.state.k,
            computed_y: fresh.state.y as i64,
            computed_p: (fresh.state.p * 1_000_000.0) as i64,
            computed_pi: (fresh.state.pi * 1_000_000.0) as i64,
            computed_world_area: fresh.state.a_world,
            computed_white: fresh.state.m_white,
            computed_at: Utc::now().timestamp(),
        };
        if let Err(err) = self.storage.put_economy_period(&period) {
            warn!(%err, %period_key, "failed to persist recomputed period");
        }
        fresh
    }

    /// Fresh computation from storage. Backing-read failures degrade to
    /// zeros so the endpoint stays available.
    fn compute_fresh(&self, period_key: &str) -> EconomySnapshot {
        let params = match self.storage.get_economy_params_active() {
            Ok(Some(p)) => p,
            Ok(None) => EconomyParams::default(),
            Err(err) => {
                warn!(%err, "economy params read failed; using defaults");
                EconomyParams::default()
            }
        };

        let delta_m_buy = match self.storage.get_economy_period(period_key) {
            Ok(Some(period)) => period.delta_m_buy,
            Ok(None) => 0,
            Err(err) => {
                warn!(%err, %period_key, "economy period read failed; assuming zero");
                0
            }
        };

        let sum_mi = match self.storage.list_users() {
            Ok(users) => users.iter().map(|u| u.balance_mi).sum(),
            Err(err) => {
                warn!(%err, "user listing failed; assuming zero balances");
                0
            }
        };

        let k_snakes = match self.storage.list_snakes() {
            Ok(snakes) => snakes
                .iter()
                .filter(|s| s.alive && s.is_on_field)
                .map(|s| i64::from(s.length_k).max(0))
                .sum(),
            Err(err) => {
                warn!(%err, "snake listing failed; assuming empty field");
                0
            }
        };

        let inputs = EconomyInputs {
            sum_mi,
            m_g: params.m_gov_reserve,
            delta_m_buy,
            delta_m_issue: params.delta_m_issue,
            cap_delta_m: params.cap_delta_m,
            k_snakes,
            delta_k_obs: params.delta_k_obs,
            params,
        };

        let state = compute_economy_v1(&inputs, period_key);
        EconomySnapshot {
            state,
            delta_m_buy: inputs.delta_m_buy,
            k_snakes: inputs.k_snakes,
            params: inputs.params,
        }
    }
}
