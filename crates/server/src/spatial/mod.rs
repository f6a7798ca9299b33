//! Spatial indexing utilities.
//!
//! Fixed-size chunk grid used for area-of-interest filtering.

mod chunks;

pub use chunks::{ChunkData, ChunkId, ChunkManager};
