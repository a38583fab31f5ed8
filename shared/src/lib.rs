//! Types and rules shared by the server and the client: the wire protocol,
//! entity records, world geometry and bullet ballistics.
//!
//! All distances are in map pixels and all speeds are per simulation tick.

pub mod ballistics;
pub mod error;
pub mod math;
pub mod protocol;
pub mod state;
pub mod world;

pub use ballistics::{first_hit, BulletOutcome, BulletState};
pub use error::ProtocolError;
pub use math::{Rect, Vector2};
pub use protocol::{Envelope, Message, MessageKind};
pub use state::{
    BulletId, BulletSpawn, DamageOutcome, HitCause, HitReport, HitTarget, Identity, NpcId,
    NpcKind, NpcSnapshot, PlayerState,
};
pub use world::{default_player_zones, find_safe_spawn, SpawnZone, WorldMap};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_PORT: u16 = 8888;
pub const TICK_RATE: u32 = 60;

pub const PLAYER_MAX_HEALTH: u32 = 100;
pub const MAX_AMMO: u32 = 20;
pub const PLAYER_SIZE: f32 = 32.0;
pub const PLAYER_SPEED: f32 = 3.0;

pub const BULLET_SPEED: f32 = 7.0;
pub const BULLET_RANGE: f32 = 500.0;
pub const BULLET_DAMAGE: u32 = 10;
pub const BULLET_SIZE: f32 = 4.0;
pub const BULLET_BOUNDS_MARGIN: f32 = 64.0;
/// Minimum delay between two shots from the same player.
pub const SHOOT_DELAY_MS: u64 = 80;
pub const RELOAD_TIME_MS: u64 = 600;

pub const MELEE_DAMAGE: u32 = 20;
pub const MELEE_RANGE: f32 = 60.0;

pub const RESPAWN_DELAY_MS: u64 = 3000;
pub const RESPAWN_SAFE_DISTANCE: f32 = 100.0;
pub const RESPAWN_ATTEMPTS: usize = 50;

/// Fraction of the remaining gap a remote entity closes per tick.
pub const INTERPOLATION_FACTOR: f32 = 0.3;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    (millis.min(u64::MAX as u128)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_generation() {
        let t1 = now_millis();
        std::thread::sleep(Duration::from_millis(2));
        let t2 = now_millis();
        assert!(t2 > t1);
    }
}
