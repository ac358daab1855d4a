//! Authoritative server for a persistent multiplayer space simulation.

pub mod agency;
pub mod broadcasts;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod meta;
pub mod players;
pub mod server;
pub mod stats;
pub mod streaming;
pub mod terrain;
pub mod vessel;
pub mod world;

pub use config::ServerConfig;
pub use error::{GameError, StartupError};
pub use server::{start, ServerHandle};
pub use world::World;
