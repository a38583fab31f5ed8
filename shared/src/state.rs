use crate::math::{Rect, Vector2};
use crate::{MAX_AMMO, PLAYER_MAX_HEALTH, PLAYER_SIZE};
use serde::{Deserialize, Serialize};

/// Opaque per-connection player token.
pub type Identity = String;
pub type NpcId = u32;
pub type BulletId = u64;

/// Result of applying damage to a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Player was already dead or invulnerable; nothing changed.
    Ignored,
    Damaged,
    /// Health crossed to zero on this hit.
    Killed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: Identity,
    pub name: String,
    pub position: Vector2,
    /// Facing angle in radians.
    pub angle: f32,
    pub health: u32,
    pub ammo: u32,
    pub kills: u32,
    pub firing: bool,
    pub reloading: bool,
    pub has_weapon: bool,
    pub invulnerable: bool,
    pub dead: bool,
    /// Epoch millis of the last death, 0 while alive.
    pub death_time: u64,
    /// Epoch millis of the last accepted update.
    pub last_update: u64,
}

impl PlayerState {
    pub fn new(id: impl Into<Identity>, name: impl Into<String>, position: Vector2) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            angle: 0.0,
            health: PLAYER_MAX_HEALTH,
            ammo: MAX_AMMO,
            kills: 0,
            firing: false,
            reloading: false,
            has_weapon: true,
            invulnerable: false,
            dead: false,
            death_time: 0,
            last_update: crate::now_millis(),
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::centered(self.position, PLAYER_SIZE, PLAYER_SIZE)
    }

    pub fn is_alive(&self) -> bool {
        !self.dead && self.health > 0
    }

    /// Subtracts `damage`, clamping at zero. Crossing zero marks the player dead.
    pub fn apply_damage(&mut self, damage: u32, now: u64) -> DamageOutcome {
        if !self.is_alive() || self.invulnerable {
            return DamageOutcome::Ignored;
        }

        self.health = self.health.saturating_sub(damage);
        self.last_update = now;

        if self.health == 0 {
            self.dead = true;
            self.death_time = now;
            self.firing = false;
            self.reloading = false;
            DamageOutcome::Killed
        } else {
            DamageOutcome::Damaged
        }
    }

    /// Restores health up to the maximum. Dead players cannot be healed.
    pub fn heal(&mut self, amount: u32, now: u64) {
        if !self.is_alive() {
            return;
        }
        self.health = self.health.saturating_add(amount).min(PLAYER_MAX_HEALTH);
        self.last_update = now;
    }

    /// Builds the record that replaces `self` when its owner sends `incoming`.
    ///
    /// Client-owned fields (position, angle, ammo, firing flags, name) come
    /// from the update. Health, death state, invulnerability and kills stay
    /// server-owned, so the owner can't heal or revive itself, can't make
    /// itself immune and can't lose kills it was credited.
    ///
    /// An update sent while dead that arrives after the respawn keeps the
    /// respawn position and angle.
    pub fn validated_update(&self, incoming: PlayerState, now: u64) -> PlayerState {
        let stale_death = incoming.dead && !self.dead;

        let mut next = incoming;
        next.id = self.id.clone();
        next.ammo = next.ammo.min(MAX_AMMO);
        next.kills = next.kills.max(self.kills);
        next.health = self.health;
        next.dead = self.dead;
        next.death_time = self.death_time;
        next.invulnerable = self.invulnerable;
        next.last_update = now;

        if stale_death {
            next.position = self.position;
            next.angle = self.angle;
        }

        if self.dead {
            next.firing = false;
            next.reloading = false;
        }

        next
    }

    /// Returns a fresh, alive copy of this player at `position`.
    pub fn respawned_at(&self, position: Vector2, now: u64) -> PlayerState {
        PlayerState {
            id: self.id.clone(),
            name: self.name.clone(),
            position,
            angle: self.angle,
            health: PLAYER_MAX_HEALTH,
            ammo: MAX_AMMO,
            kills: self.kills,
            firing: false,
            reloading: false,
            has_weapon: true,
            invulnerable: false,
            dead: false,
            death_time: 0,
            last_update: now,
        }
    }
}

/// Payload of a BULLET_SPAWN message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulletSpawn {
    pub bullet_id: BulletId,
    pub origin: Vector2,
    pub angle: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitTarget {
    Player(Identity),
    Npc(NpcId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitCause {
    Bullet,
    Melee,
}

/// Payload of a HIT message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitReport {
    pub target: HitTarget,
    pub damage: u32,
    pub cause: HitCause,
}

impl HitReport {
    pub fn player(victim: impl Into<Identity>, damage: u32) -> Self {
        Self {
            target: HitTarget::Player(victim.into()),
            damage,
            cause: HitCause::Bullet,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NpcKind {
    /// Slow zone-roaming creature that never attacks.
    Grazer,
    /// Ground melee chaser, immune to bullets.
    Chaser,
    /// Aerial chaser that flies over obstacles.
    Flyer,
}

impl NpcKind {
    pub const ALL: [NpcKind; 3] = [NpcKind::Grazer, NpcKind::Chaser, NpcKind::Flyer];
}

/// Payload of an NPC_UPDATE message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NpcSnapshot {
    pub id: NpcId,
    pub kind: NpcKind,
    pub position: Vector2,
    pub angle: f32,
    pub health: u32,
    pub alive: bool,
    pub moving: bool,
    pub attacking: bool,
    pub hit: bool,
}
