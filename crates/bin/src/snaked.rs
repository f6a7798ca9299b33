//! snaked - authoritative tick-based snake server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use server::economy::{utc_period_key, EconomyService};
use server::server::{self as http, AppState, AuthState, GameService, SessionRegistry, SnapshotSeq};
use server::{run_game_loop, RuntimeConfig, World};
use storage::models::{EconomyParams, User};
use storage::Storage;

const FOOD_COUNT: usize = 1;

#[derive(Parser)]
#[command(name = "snaked", version, about = "Authoritative tick-based snake server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server and simulation loop.
    Serve,
    /// Ensure two demo users with one snake each.
    Seed,
    /// Wipe all backing tables.
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("snaked v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = RuntimeConfig::from_env();
    info!(
        tick_hz = config.tick_hz,
        spectator_hz = config.spectator_hz,
        player_hz = config.player_hz,
        enable_broadcast = config.enable_broadcast,
        debug_tps = config.debug_tps,
        "runtime config"
    );
    info!(
        width = config.width,
        height = config.height,
        max_snakes_per_user = config.max_snakes_per_user,
        "grid config"
    );

    let storage: Arc<dyn Storage> = Arc::new(storage::create_storage_from_env());
    storage.health_check().context("storage health check failed")?;

    // The read and write paths both assume an active economy policy row.
    if storage.get_economy_params_active()?.is_none() {
        let defaults = EconomyParams {
            updated_at: Utc::now().timestamp(),
            ..EconomyParams::default()
        };
        storage
            .put_economy_params_active_and_versioned(&defaults, "bootstrap")
            .context("failed to initialize active economy params")?;
    }

    let world = Arc::new(World::new(
        config.width,
        config.height,
        FOOD_COUNT,
        config.max_snakes_per_user,
    ));
    world.configure_chunking(config.chunk_size, config.single_chunk_mode);

    let game = Arc::new(GameService::new(Arc::clone(&world), Arc::clone(&storage)));
    let economy = Arc::new(EconomyService::new(Arc::clone(&storage)));

    game.load_from_storage()?;
    game.flush_persistence_delta();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Reset => {
            storage.reset_for_dev().context("storage reset failed")?;
            info!("storage reset complete");
            Ok(())
        }
        Command::Seed => seed(storage.as_ref(), &game, &economy),
        Command::Serve => serve(config, world, storage, game, economy).await,
    }
}

fn ensure_user(
    storage: &dyn Storage,
    user_id: &str,
    username: &str,
    password: &str,
) -> anyhow::Result<()> {
    if storage.get_user_by_id(user_id)?.is_some() {
        return Ok(());
    }
    storage
        .put_user(&User {
            user_id: user_id.to_string(),
            username: username.to_string(),
            password_hash: password.to_string(),
            balance_mi: 0,
            created_at: Utc::now().timestamp(),
        })
        .with_context(|| format!("failed to seed user {username}"))?;
    Ok(())
}

fn seed(storage: &dyn Storage, game: &GameService, economy: &EconomyService) -> anyhow::Result<()> {
    ensure_user(storage, "1", "user1", "pass1")?;
    ensure_user(storage, "2", "user2", "pass2")?;

    game.load_from_storage()?;
    if game.world().list_user_snakes(1).is_empty() {
        let _ = game.world().create_snake_for_user(1, "#00ff00");
    }
    if game.world().list_user_snakes(2).is_empty() {
        let _ = game.world().create_snake_for_user(2, "#00aaff");
    }
    game.flush_persistence_delta();
    game.load_from_storage()?;

    economy.recompute_and_persist(&utc_period_key());

    info!("seeded users: user1/pass1, user2/pass2 (1 snake each)");
    Ok(())
}

async fn serve(
    config: RuntimeConfig,
    world: Arc<World>,
    storage: Arc<dyn Storage>,
    game: Arc<GameService>,
    economy: Arc<EconomyService>,
) -> anyhow::Result<()> {
    let seq = Arc::new(SnapshotSeq::new());
    seq.bump();
    let reload = Arc::new(AtomicBool::new(false));
    let running = Arc::new(AtomicBool::new(true));

    spawn_reload_watchers(Arc::clone(&reload));

    let loop_handle = tokio::spawn(run_game_loop(
        Arc::clone(&game),
        config.clone(),
        Arc::clone(&seq),
        Arc::clone(&reload),
        Arc::clone(&running),
    ));

    let state = AppState {
        world,
        storage,
        game,
        economy,
        auth: Arc::new(AuthState::new()),
        sessions: Arc::new(SessionRegistry::new()),
        seq,
        config: config.clone(),
    };

    let addr: SocketAddr = format!("{}:{}", config.bind_host, config.bind_port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address {}:{}",
                config.bind_host, config.bind_port
            )
        })?;

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    };
    let result = http::run(state, addr, shutdown).await;

    running.store(false, Ordering::Relaxed);
    if let Err(err) = loop_handle.await {
        error!(%err, "game loop task failed");
    }
    result
}

/// SIGUSR1 and SIGHUP flag a world reload; the loop picks it up.
fn spawn_reload_watchers(reload: Arc<AtomicBool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for kind in [SignalKind::user_defined1(), SignalKind::hangup()] {
            let reload = Arc::clone(&reload);
            match signal(kind) {
                Ok(mut sig) => {
                    tokio::spawn(async move {
                        while sig.recv().await.is_some() {
                            info!("reload signal received");
                            reload.store(true, Ordering::Relaxed);
                        }
                    });
                }
                Err(err) => warn!(%err, "failed to install reload signal handler"),
            }
        }
    }
    #[cfg(not(unix))]
    let _ = reload;
}
