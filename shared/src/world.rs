//! Static world geometry shared by server and client.
//!
//! The map-loading collaborator hands the core a [`WorldMap`] once at startup:
//! the playable bounds plus a list of axis-aligned obstacles. Spawn zones are
//! circular regions used both for creature population and player respawns.

use crate::math::{Rect, Vector2};
use crate::{PLAYER_SIZE, RESPAWN_ATTEMPTS, RESPAWN_SAFE_DISTANCE};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Circular region with a creature quota.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnZone {
    pub center: Vector2,
    pub radius: f32,
    /// Maximum number of living creatures the zone maintains.
    pub max_count: usize,
}

impl SpawnZone {
    pub const fn new(x: f32, y: f32, radius: f32, max_count: usize) -> Self {
        Self {
            center: Vector2::new(x, y),
            radius,
            max_count,
        }
    }

    pub fn contains(&self, position: &Vector2) -> bool {
        self.center.distance_to(position) <= self.radius
    }

    /// Uniformly samples a point inside the zone's disk.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vector2 {
        let r = self.radius * rng.gen::<f32>().sqrt();
        let theta = rng.gen_range(0.0..std::f32::consts::TAU);
        self.center.add(&Vector2::from_angle(theta).scale(r))
    }
}

/// Returns the zone whose center is closest to `position`.
pub fn nearest_zone<'a>(zones: &'a [SpawnZone], position: &Vector2) -> Option<&'a SpawnZone> {
    zones.iter().min_by(|a, b| {
        a.center
            .distance_to(position)
            .total_cmp(&b.center.distance_to(position))
    })
}

/// Playable area and static obstacles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldMap {
    pub width: f32,
    pub height: f32,
    pub obstacles: Vec<Rect>,
}

impl WorldMap {
    pub fn new(width: f32, height: f32, obstacles: Vec<Rect>) -> Self {
        Self {
            width,
            height,
            obstacles,
        }
    }

    /// Built-in arena used when no map collaborator supplies geometry.
    pub fn default_arena() -> Self {
        let width = 3200.0;
        let height = 3200.0;
        let wall = 32.0;

        let mut obstacles = vec![
            // Perimeter
            Rect::new(0.0, 0.0, width, wall),
            Rect::new(0.0, height - wall, width, wall),
            Rect::new(0.0, 0.0, wall, height),
            Rect::new(width - wall, 0.0, wall, height),
        ];
        obstacles.extend_from_slice(&[
            Rect::new(600.0, 400.0, 256.0, 64.0),
            Rect::new(1400.0, 900.0, 64.0, 320.0),
            Rect::new(2000.0, 1500.0, 320.0, 64.0),
            Rect::new(500.0, 2200.0, 192.0, 192.0),
            Rect::new(2600.0, 2500.0, 96.0, 256.0),
        ]);

        Self::new(width, height, obstacles)
    }

    pub fn hits_obstacle(&self, rect: &Rect) -> bool {
        self.obstacles.iter().any(|obstacle| obstacle.intersects(rect))
    }

    pub fn center(&self) -> Vector2 {
        Vector2::new(self.width / 2.0, self.height / 2.0)
    }

    /// True when `position` lies more than `margin` outside the map.
    pub fn out_of_bounds(&self, position: &Vector2, margin: f32) -> bool {
        position.x < -margin
            || position.y < -margin
            || position.x > self.width + margin
            || position.y > self.height + margin
    }
}

/// Player spawn zones of the built-in arena. Quotas are unused for players.
pub fn default_player_zones() -> Vec<SpawnZone> {
    vec![
        SpawnZone::new(400.0, 400.0, 150.0, 0),
        SpawnZone::new(2800.0, 2800.0, 150.0, 0),
        SpawnZone::new(1600.0, 1600.0, 200.0, 0),
    ]
}

/// Picks a respawn point for a player.
///
/// Samples random points inside `zones`, rejecting any whose player-sized
/// bounds hit an obstacle or that lie within [`RESPAWN_SAFE_DISTANCE`] of a
/// position in `occupied`. After [`RESPAWN_ATTEMPTS`] failures it falls back
/// to the first zone center, or the map center when no zones are configured.
pub fn find_safe_spawn<R: Rng + ?Sized>(
    map: &WorldMap,
    zones: &[SpawnZone],
    occupied: &[Vector2],
    rng: &mut R,
) -> Vector2 {
    if zones.is_empty() {
        return map.center();
    }

    for _ in 0..RESPAWN_ATTEMPTS {
        let zone = &zones[rng.gen_range(0..zones.len())];
        let candidate = zone.random_point(rng);

        let bounds = Rect::centered(candidate, PLAYER_SIZE, PLAYER_SIZE);
        if map.hits_obstacle(&bounds) {
            continue;
        }

        let crowded = occupied
            .iter()
            .any(|other| other.distance_to(&candidate) < RESPAWN_SAFE_DISTANCE);
        if !crowded {
            return candidate;
        }
    }

    zones[0].center
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zone_contains() {
        let zone = SpawnZone::new(100.0, 100.0, 50.0, 3);
        assert!(zone.contains(&Vector2::new(100.0, 150.0)));
        assert!(!zone.contains(&Vector2::new(100.0, 151.0)));
    }

    #[test]
    fn test_random_point_stays_in_zone() {
        let zone = SpawnZone::new(500.0, 500.0, 120.0, 3);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let p = zone.random_point(&mut rng);
            assert!(zone.contains(&p), "{:?} escaped the zone", p);
        }
    }

    #[test]
    fn test_nearest_zone() {
        let zones = [
            SpawnZone::new(0.0, 0.0, 10.0, 1),
            SpawnZone::new(1000.0, 0.0, 10.0, 1),
        ];
        let nearest = nearest_zone(&zones, &Vector2::new(800.0, 0.0)).unwrap();
        assert_eq!(nearest.center.x, 1000.0);
        assert!(nearest_zone(&[], &Vector2::ZERO).is_none());
    }

    #[test]
    fn test_out_of_bounds_margin() {
        let map = WorldMap::new(100.0, 100.0, vec![]);
        assert!(!map.out_of_bounds(&Vector2::new(-10.0, 50.0), 64.0));
        assert!(map.out_of_bounds(&Vector2::new(-65.0, 50.0), 64.0));
        assert!(map.out_of_bounds(&Vector2::new(50.0, 165.0), 64.0));
    }

    #[test]
    fn test_safe_spawn_avoids_obstacles_and_players() {
        let map = WorldMap::new(
            1000.0,
            1000.0,
            vec![Rect::new(450.0, 450.0, 100.0, 100.0)],
        );
        let zones = [SpawnZone::new(500.0, 500.0, 200.0, 0)];
        let occupied = [Vector2::new(400.0, 500.0)];
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let p = find_safe_spawn(&map, &zones, &occupied, &mut rng);
            if p == zones[0].center {
                continue;
            }
            assert!(zones[0].contains(&p));
            assert!(!map.hits_obstacle(&Rect::centered(p, PLAYER_SIZE, PLAYER_SIZE)));
            assert!(p.distance_to(&occupied[0]) >= RESPAWN_SAFE_DISTANCE);
        }
    }

    #[test]
    fn test_safe_spawn_falls_back_to_zone_center() {
        // Obstacle covers the whole zone, so every sample is rejected.
        let map = WorldMap::new(
            1000.0,
            1000.0,
            vec![Rect::new(0.0, 0.0, 1000.0, 1000.0)],
        );
        let zones = [SpawnZone::new(300.0, 300.0, 50.0, 0)];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            find_safe_spawn(&map, &zones, &[], &mut rng),
            Vector2::new(300.0, 300.0)
        );
    }

    #[test]
    fn test_safe_spawn_without_zones_uses_map_center() {
        let map = WorldMap::new(800.0, 600.0, vec![]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            find_safe_spawn(&map, &[], &[], &mut rng),
            Vector2::new(400.0, 300.0)
        );
    }
}
