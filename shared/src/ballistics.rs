//! Straight-line bullet flight, sampled once per simulation tick.

use crate::math::{Rect, Vector2};
use crate::state::{BulletId, BulletSpawn, Identity};
use crate::world::WorldMap;
use crate::{BULLET_BOUNDS_MARGIN, BULLET_RANGE, BULLET_SIZE, BULLET_SPEED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulletOutcome {
    InFlight,
    RangeExceeded,
    OutOfBounds,
    Obstacle,
}

impl BulletOutcome {
    pub fn is_removed(&self) -> bool {
        !matches!(self, BulletOutcome::InFlight)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulletState {
    pub id: BulletId,
    pub owner: Identity,
    pub origin: Vector2,
    pub position: Vector2,
    /// Per-tick displacement.
    pub velocity: Vector2,
    pub spawned_at: u64,
    pub distance_traveled: f32,
}

impl BulletState {
    pub fn from_spawn(owner: impl Into<Identity>, spawn: &BulletSpawn, now: u64) -> Self {
        Self {
            id: spawn.bullet_id,
            owner: owner.into(),
            origin: spawn.origin,
            position: spawn.origin,
            velocity: Vector2::from_angle(spawn.angle).scale(BULLET_SPEED),
            spawned_at: now,
            distance_traveled: 0.0,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::centered(self.position, BULLET_SIZE, BULLET_SIZE)
    }

    /// Advances one tick and reports whether the bullet survives against the
    /// static world. Target intersection is checked separately with [`first_hit`].
    pub fn advance(&mut self, map: &WorldMap) -> BulletOutcome {
        self.position = self.position.add(&self.velocity);
        self.distance_traveled += self.velocity.magnitude();

        if self.distance_traveled > BULLET_RANGE {
            return BulletOutcome::RangeExceeded;
        }
        if map.out_of_bounds(&self.position, BULLET_BOUNDS_MARGIN) {
            return BulletOutcome::OutOfBounds;
        }
        if map.hits_obstacle(&self.bounds()) {
            return BulletOutcome::Obstacle;
        }
        BulletOutcome::InFlight
    }
}

/// Returns the first target whose bounds intersect `bullet`.
///
/// Callers pass living targets only; iteration order decides ties, so a bullet
/// always resolves against exactly one target.
pub fn first_hit<T, I>(bullet: &Rect, targets: I) -> Option<T>
where
    I: IntoIterator<Item = (T, Rect)>,
{
    targets
        .into_iter()
        .find(|(_, bounds)| bounds.intersects(bullet))
        .map(|(target, _)| target)
}
