pub mod config;
pub mod discovery;
pub mod error;
pub mod stats;
pub mod swarm;
pub mod target;
pub mod worker;
