//! # Game Client Library
//!
//! Client side of the shooter: a TCP connection to the authoritative server
//! and a local view of the world that stays responsive while the server
//! decides what really happened.
//!
//! ## Architecture Overview
//!
//! ### Local Prediction
//! The locally controlled player moves and fires as soon as input arrives.
//! The server never corrects its position; it only overwrites health, kills,
//! ammo and death state, and hands out a new position on respawn.
//!
//! ### Remote Smoothing
//! Every remote player and creature is drawn at a display position that closes
//! a fixed fraction of the distance to its last authoritative position each
//! tick. Late or bunched updates shorten or stretch the approach instead of
//! causing jumps.
//!
//! ### Client-Side Hits
//! Bullets fired by the local player are simulated locally against remote
//! players. The first player a bullet touches is reported to the server as a
//! HIT; the server applies the damage and broadcasts the result.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! - Local player movement, weapon cooldown and reload
//! - Reconciliation of server broadcasts into the local view
//! - Interpolated remote players and creatures
//! - Bullet simulation and hit reporting
//!
//! ### Input Module (`input`)
//! - Per-tick input intents
//! - A seeded scripted input source for headless play
//!
//! ### Network Module (`network`)
//! - Length-prefixed envelope framing over TCP
//! - Sequence stamping of outgoing messages
//! - Automatic answers to server pings and round-trip measurement
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::game::ClientGameState;
//! use client::input::ScriptedInput;
//! use client::network::NetworkClient;
//! use shared::{default_player_zones, now_millis, Message, WorldMap};
//!
//! # async fn play() -> Result<(), client::error::ClientError> {
//! let mut rng = rand::thread_rng();
//! let mut network = NetworkClient::connect("127.0.0.1:8888", "bot-1").await?;
//! let mut game =
//!     ClientGameState::spawn("bot-1", "bot", WorldMap::default_arena(), &default_player_zones(), &mut rng);
//! let mut input = ScriptedInput::new(7);
//!
//! network.send(game.join_message()).await?;
//! loop {
//!     while let Some(envelope) = network.try_recv()? {
//!         game.apply_message(&envelope);
//!     }
//!
//!     let now = now_millis();
//!     let intent = input.next_intent(game.local().position, game.nearest_target());
//!     game.apply_input(&intent, now);
//!     if intent.fire {
//!         if let Some(spawn) = game.fire(now) {
//!             network.send(Message::BulletSpawn(spawn)).await?;
//!         }
//!     }
//!     for hit in game.step_bullets() {
//!         network.send(Message::Hit(hit)).await?;
//!     }
//!     game.interpolate();
//!     network.send(game.local_update_message(now)).await?;
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod game;
pub mod input;
pub mod network;
