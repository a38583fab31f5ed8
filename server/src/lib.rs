//! # Game Server Library
//!
//! Authoritative server for the arena shooter. It owns the canonical world
//! (players, server-tracked bullets and creatures), accepts one TCP stream
//! per client and keeps every client's view consistent by fanning each
//! accepted change out to the other sessions.
//!
//! ## Architecture
//!
//! Work is spread over independent tasks that share state through
//! concurrent maps rather than a single lock:
//!
//! - **Sessions** ([`session`]): per connection, a receive loop that
//!   dispatches each message synchronously and a send loop draining a
//!   bounded outbound queue. A full queue drops the newest message.
//! - **Registry** ([`registry`]): identity to session handle, the only
//!   fan-out path.
//! - **World** ([`world`]): players, bullets and creatures, each entity
//!   replaced atomically.
//! - **Broadcast engine** ([`broadcast`]): join, leave, update, bullet, hit
//!   and respawn rules.
//! - **Simulation** ([`simulation`]): fixed-rate loop driving server
//!   bullets, creature steering ([`npc`]) and population upkeep
//!   ([`population`]).
//! - **Health sweep** ([`health`]): pings and stale-session cleanup.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Model
//!
//! Only failing to bind the listener is fatal. Transport faults end one
//! session and broadcast its LEAVE; malformed messages are dropped and
//! logged; simulation edge cases are clamped.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod network;
pub mod npc;
pub mod population;
pub mod registry;
pub mod session;
pub mod simulation;
pub mod world;
