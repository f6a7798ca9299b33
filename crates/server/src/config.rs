//! Runtime configuration from the environment.

use std::env;

use tracing::warn;

/// All tunables the server reads at boot. Everything is optional and
/// clamped to a sane range.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Simulation rate, ticks per second.
    pub tick_hz: i32,
    /// Spectator broadcast rate, snapshots per second.
    pub spectator_hz: i32,
    /// Reserved player-facing rate; reported by `/game/runtime`.
    pub player_hz: i32,
    pub enable_broadcast: bool,
    pub debug_tps: bool,

    pub width: i32,
    pub height: i32,
    pub max_snakes_per_user: usize,

    pub bind_host: String,
    pub bind_port: u16,

    pub chunk_size: i32,
    pub single_chunk_mode: bool,
    pub aoi_enabled: bool,
    pub aoi_radius: i32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_hz: 10,
            spectator_hz: 10,
            player_hz: 10,
            enable_broadcast: true,
            debug_tps: false,
            width: 40,
            height: 20,
            max_snakes_per_user: 3,
            bind_host: "127.0.0.1".to_string(),
            bind_port: 8080,
            chunk_size: 64,
            single_chunk_mode: true,
            aoi_enabled: false,
            aoi_radius: 1,
        }
    }
}

impl RuntimeConfig {
    /// Builds configuration from environment variables, falling back to
    /// defaults and clamping out-of-range values.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.tick_hz = env_int("TICK_HZ", cfg.tick_hz).clamp(5, 60);
        cfg.spectator_hz = env_int("SPECTATOR_HZ", cfg.spectator_hz).clamp(1, 60);
        cfg.player_hz = env_int("PLAYER_HZ", cfg.player_hz).clamp(1, 60);
        cfg.enable_broadcast = env_bool("ENABLE_BROADCAST", cfg.enable_broadcast);
        cfg.debug_tps = env_bool("DEBUG_TPS", cfg.debug_tps);
        if !has_env("DEBUG_TPS") {
            // Backward compatibility for deployments still setting LOG_HZ.
            cfg.debug_tps = env_bool("LOG_HZ", cfg.debug_tps);
        }

        // Backward compatibility with interval-based deployments.
        if !has_env("TICK_HZ") {
            let legacy_tick_ms = env_int("SNAKE_TICK_MS", -1);
            if legacy_tick_ms > 0 {
                let legacy_hz = (1000.0 / legacy_tick_ms as f64).round() as i32;
                cfg.tick_hz = legacy_hz.clamp(5, 60);
            }
        }

        cfg.width = env_int("SNAKE_W", cfg.width).max(10);
        cfg.height = env_int("SNAKE_H", cfg.height).max(10);
        cfg.max_snakes_per_user = env_int("SNAKE_MAX_PER_USER", cfg.max_snakes_per_user as i32)
            .max(1) as usize;

        if let Ok(host) = env::var("SERVER_BIND_HOST") {
            if !host.is_empty() {
                cfg.bind_host = host;
            }
        }
        cfg.bind_port = env_int("SERVER_BIND_PORT", cfg.bind_port as i32).max(1) as u16;

        cfg.chunk_size = env_int("CHUNK_SIZE", cfg.chunk_size).max(8);
        cfg.single_chunk_mode = env_bool("SINGLE_CHUNK_MODE", cfg.single_chunk_mode);
        cfg.aoi_enabled = env_bool("AOI_ENABLED", cfg.aoi_enabled);
        cfg.aoi_radius = env_int("AOI_RADIUS", cfg.aoi_radius).max(0);

        cfg
    }

    /// Tick interval, clamped to at least 1ms.
    pub fn tick_interval_ms(&self) -> u64 {
        ((1000.0 / self.tick_hz as f64).round() as u64).max(1)
    }

    /// Spectator broadcast interval, clamped to at least 1ms.
    pub fn spectator_interval_ms(&self) -> u64 {
        ((1000.0 / self.spectator_hz as f64).round() as u64).max(1)
    }
}

fn has_env(name: &str) -> bool {
    env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
}

fn env_int(name: &str, default: i32) -> i32 {
    let Ok(raw) = env::var(name) else {
        return default;
    };
    if raw.is_empty() {
        return default;
    }
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(%raw, var = name, "invalid integer in environment; using default");
            default
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    let Ok(raw) = env::var(name) else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_derive_from_rates() {
        let mut cfg = RuntimeConfig::default();
        cfg.tick_hz = 10;
        cfg.spectator_hz = 60;
        assert_eq!(cfg.tick_interval_ms(), 100);
        assert_eq!(cfg.spectator_interval_ms(), 17);
    }

    #[test]
    fn defaults_are_in_range() {
        let cfg = RuntimeConfig::default();
        assert!((5..=60).contains(&cfg.tick_hz));
        assert!((1..=60).contains(&cfg.spectator_hz));
        assert!(cfg.width >= 10 && cfg.height >= 10);
        assert!(cfg.max_snakes_per_user >= 1);
        assert!(cfg.chunk_size >= 8);
    }
}
