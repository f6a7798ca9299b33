//! Authoritative tick-based snake simulation server library.

pub mod config;
pub mod economy;
pub mod entity;
pub mod server;
pub mod spatial;
pub mod systems;
pub mod world;

// Re-export commonly used types
pub use config::RuntimeConfig;
pub use server::{
    run_game_loop, AppState, AuthState, GameService, SessionRegistry, SnapshotSeq,
};
pub use world::{PersistenceDelta, World, WorldSnapshot};
