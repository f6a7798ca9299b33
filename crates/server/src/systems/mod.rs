//! Simulation systems, run in a fixed order by the world tick:
//! movement, collision, spawn. Replication runs on demand per camera.

pub mod collision;
pub mod movement;
pub mod replication;
pub mod spawn;
