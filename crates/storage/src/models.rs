//! Record shapes for the seven logical tables.

/// An account row. Balances mutate only through the atomic increment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub password_hash: String,
    pub balance_mi: i64,
    pub created_at: i64,
}

/// Persisted snake state. Written only from persistence deltas, never
/// per-tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnakeRecord {
    pub snake_id: String,
    pub owner_user_id: String,
    pub alive: bool,
    pub head_x: i32,
    pub head_y: i32,
    pub direction: i32,
    pub paused: bool,
    pub length_k: i32,
    /// Compact body as `[[x,y],...]`, head first.
    pub body_compact: String,
    pub color: String,
    /// Set when the snake is first persisted onto the field; never cleared.
    pub is_on_field: bool,
    pub last_event_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One persisted world chunk. The single-chunk world uses `chunk_id = "main"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldChunk {
    pub chunk_id: String,
    pub width: i32,
    pub height: i32,
    pub obstacles: String,
    pub food_state: String,
    pub version: i64,
    pub updated_at: i64,
}

/// An append-only gameplay event. Never mutated after the write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnakeEvent {
    pub snake_id: String,
    pub event_id: String,
    pub event_type: String,
    pub x: i32,
    pub y: i32,
    pub other_snake_id: Option<String>,
    pub delta_length: i32,
    pub tick_number: u64,
    pub world_version: i64,
    pub created_at: i64,
}

/// Free-form settings row keyed by id (`"global"` by default).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub settings_id: String,
    pub payload_json: String,
    pub updated_at: i64,
}

/// Macro-economy policy parameters. The `active` row is the current
/// authority; every write also appends a `ver#N` history row.
#[derive(Debug, Clone, PartialEq)]
pub struct EconomyParams {
    pub version: i64,
    pub k_land: i64,
    pub a_productivity: f64,
    pub v_velocity: f64,
    pub m_gov_reserve: i64,
    pub cap_delta_m: i64,
    pub delta_m_issue: i64,
    pub delta_k_obs: i64,
    pub updated_at: i64,
    pub updated_by: String,
}

impl Default for EconomyParams {
    fn default() -> Self {
        Self {
            version: 1,
            k_land: 24,
            a_productivity: 1.0,
            v_velocity: 2.0,
            m_gov_reserve: 400,
            cap_delta_m: 5000,
            delta_m_issue: 0,
            delta_k_obs: 0,
            updated_at: 0,
            updated_by: String::new(),
        }
    }
}

/// One accumulation window keyed `YYYYMMDDHH` (UTC). `delta_m_buy` is an
/// atomic counter; the `computed_*` fields hold the last persisted macro
/// aggregates (p and pi stored as millionths).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EconomyPeriod {
    pub period_key: String,
    pub delta_m_buy: i64,
    pub computed_m: i64,
    pub computed_k: i64,
    pub computed_y: i64,
    pub computed_p: i64,
    pub computed_pi: i64,
    pub computed_world_area: i64,
    pub computed_white: i64,
    pub computed_at: i64,
}
