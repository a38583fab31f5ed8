//! Creature behaviour: a small per-creature state machine evaluated once per
//! simulation tick.
//!
//! Every kind runs the same steering pipeline and differs only in its
//! [`NpcTuning`]:
//!
//! 1. keep or drop the current target (detection radius to acquire, the
//!    larger chase radius to keep)
//! 2. seek an offset point beside the target, or wander toward a random point
//! 3. add separation from neighbours inside the avoidance radius
//! 4. replace the step with a soft return toward the nearest home zone when
//!    it would leave every zone
//! 5. reject the step when it lands in an obstacle or another creature

use rand::Rng;
use shared::world::nearest_zone;
use shared::{
    DamageOutcome, Identity, NpcId, NpcKind, NpcSnapshot, Rect, SpawnZone, Vector2, WorldMap,
};

/// Behaviour parameters for one creature kind.
#[derive(Debug, Clone, PartialEq)]
pub struct NpcTuning {
    pub kind: NpcKind,
    pub max_health: u32,
    /// Edge length of the square collision box.
    pub size: f32,
    pub speed: f32,
    /// A living player closer than this becomes the target. Zero disables targeting.
    pub detection_radius: f32,
    /// The target is released once it gets farther than this.
    pub chase_radius: f32,
    pub attack_range: f32,
    pub attack_damage: u32,
    pub attack_cooldown_ticks: u32,
    pub avoidance_radius: f32,
    pub avoidance_strength: f32,
    /// Creatures stop this far short of their target.
    pub target_offset: f32,
    pub wander_radius: f32,
    pub wander_interval_ticks: (u32, u32),
    /// Length of the step taken back toward a zone center.
    pub confinement_step: f32,
    /// Bullets pass through this kind.
    pub ranged_immune: bool,
    /// Obstacles do not block movement.
    pub airborne: bool,
    /// Health restored to the player who lands the killing blow.
    pub kill_heal: u32,
    pub hit_flash_ticks: u32,
}

impl NpcTuning {
    pub fn grazer() -> Self {
        Self {
            kind: NpcKind::Grazer,
            max_health: 80,
            size: 32.0,
            speed: 1.0,
            detection_radius: 0.0,
            chase_radius: 0.0,
            attack_range: 0.0,
            attack_damage: 0,
            attack_cooldown_ticks: 0,
            avoidance_radius: 40.0,
            avoidance_strength: 2.0,
            target_offset: 0.0,
            wander_radius: 100.0,
            wander_interval_ticks: (60, 180),
            confinement_step: 2.0,
            ranged_immune: false,
            airborne: false,
            kill_heal: 30,
            hit_flash_ticks: 30,
        }
    }

    pub fn chaser() -> Self {
        Self {
            kind: NpcKind::Chaser,
            max_health: 100,
            size: 32.0,
            speed: 1.5,
            detection_radius: 500.0,
            chase_radius: 800.0,
            attack_range: 60.0,
            attack_damage: 10,
            attack_cooldown_ticks: 60,
            avoidance_radius: 50.0,
            avoidance_strength: 3.0,
            target_offset: 40.0,
            wander_radius: 150.0,
            wander_interval_ticks: (60, 180),
            confinement_step: 2.0,
            ranged_immune: true,
            airborne: false,
            kill_heal: 20,
            hit_flash_ticks: 30,
        }
    }

    pub fn flyer() -> Self {
        Self {
            kind: NpcKind::Flyer,
            max_health: 60,
            size: 48.0,
            speed: 1.2,
            detection_radius: 500.0,
            chase_radius: 800.0,
            attack_range: 80.0,
            attack_damage: 5,
            attack_cooldown_ticks: 90,
            avoidance_radius: 60.0,
            avoidance_strength: 2.5,
            target_offset: 50.0,
            wander_radius: 100.0,
            wander_interval_ticks: (90, 240),
            confinement_step: 2.0,
            ranged_immune: false,
            airborne: true,
            kill_heal: 0,
            hit_flash_ticks: 30,
        }
    }

    pub fn for_kind(kind: NpcKind) -> Self {
        match kind {
            NpcKind::Grazer => Self::grazer(),
            NpcKind::Chaser => Self::chaser(),
            NpcKind::Flyer => Self::flyer(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpcMode {
    Wandering,
    Seeking,
    Attacking,
}

/// Server-side record of one creature.
#[derive(Debug, Clone, PartialEq)]
pub struct NpcState {
    pub id: NpcId,
    pub kind: NpcKind,
    pub position: Vector2,
    pub angle: f32,
    pub health: u32,
    pub alive: bool,
    pub size: f32,
    pub mode: NpcMode,
    pub target: Option<Identity>,
    pub wander_point: Vector2,
    pub wander_timer: u32,
    pub attack_cooldown: u32,
    pub hit_timer: u32,
    pub moving: bool,
}

impl NpcState {
    pub fn new<R: Rng + ?Sized>(id: NpcId, tuning: &NpcTuning, position: Vector2, rng: &mut R) -> Self {
        let (min, max) = tuning.wander_interval_ticks;
        Self {
            id,
            kind: tuning.kind,
            position,
            angle: rng.gen_range(0.0..std::f32::consts::TAU),
            health: tuning.max_health,
            alive: true,
            size: tuning.size,
            mode: NpcMode::Wandering,
            target: None,
            wander_point: position,
            wander_timer: rng.gen_range(min..=max.max(min)),
            attack_cooldown: 0,
            hit_timer: 0,
            moving: false,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::centered(self.position, self.size, self.size)
    }

    pub fn bounds_at(&self, position: Vector2) -> Rect {
        Rect::centered(position, self.size, self.size)
    }

    pub fn is_attacking(&self) -> bool {
        self.mode == NpcMode::Attacking
    }

    pub fn apply_damage(&mut self, damage: u32, tuning: &NpcTuning) -> DamageOutcome {
        if !self.alive {
            return DamageOutcome::Ignored;
        }
        self.health = self.health.saturating_sub(damage);
        self.hit_timer = tuning.hit_flash_ticks;
        if self.health == 0 {
            self.alive = false;
            self.moving = false;
            self.target = None;
            DamageOutcome::Killed
        } else {
            DamageOutcome::Damaged
        }
    }

    pub fn snapshot(&self) -> NpcSnapshot {
        NpcSnapshot {
            id: self.id,
            kind: self.kind,
            position: self.position,
            angle: self.angle,
            health: self.health,
            alive: self.alive,
            moving: self.moving,
            attacking: self.is_attacking(),
            hit: self.hit_timer > 0,
        }
    }
}

/// Another creature as seen by the one being stepped.
#[derive(Debug, Clone, Copy)]
pub struct Neighbour {
    pub id: NpcId,
    pub position: Vector2,
    pub bounds: Rect,
}

/// Everything a creature may look at while deciding its step.
pub struct SteeringContext<'a> {
    pub tuning: &'a NpcTuning,
    /// Living players only.
    pub players: &'a [(Identity, Vector2)],
    /// Other living creatures, any kind.
    pub neighbours: &'a [Neighbour],
    /// Home zones of this creature's kind.
    pub zones: &'a [SpawnZone],
    pub map: &'a WorldMap,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SteeringOutcome {
    /// Player to damage this tick, with the damage amount.
    pub attack: Option<(Identity, u32)>,
    pub acquired: Option<Identity>,
    pub released: Option<Identity>,
}

/// Keeps, drops or picks the target for this tick and returns its position.
pub fn acquire_target(
    npc: &mut NpcState,
    tuning: &NpcTuning,
    players: &[(Identity, Vector2)],
    outcome: &mut SteeringOutcome,
) -> Option<Vector2> {
    if let Some(current) = npc.target.clone() {
        let kept = players
            .iter()
            .find(|(id, _)| *id == current)
            .map(|(_, pos)| *pos)
            .filter(|pos| pos.distance_to(&npc.position) <= tuning.chase_radius);
        match kept {
            Some(pos) => return Some(pos),
            None => {
                npc.target = None;
                outcome.released = Some(current);
            }
        }
    }

    if tuning.detection_radius <= 0.0 {
        return None;
    }

    let nearest = players
        .iter()
        .map(|(id, pos)| (id, *pos, pos.distance_to(&npc.position)))
        .filter(|(_, _, dist)| *dist <= tuning.detection_radius)
        .min_by(|a, b| a.2.total_cmp(&b.2));

    nearest.map(|(id, pos, _)| {
        npc.target = Some(id.clone());
        outcome.acquired = Some(id.clone());
        pos
    })
}

/// Push away from every neighbour inside the avoidance radius, weighted by
/// how deep inside the radius it is.
pub fn separation(position: &Vector2, neighbours: &[Neighbour], tuning: &NpcTuning) -> Vector2 {
    neighbours
        .iter()
        .filter_map(|other| {
            let away = position.sub(&other.position);
            let dist = away.magnitude();
            if dist <= f32::EPSILON || dist >= tuning.avoidance_radius {
                return None;
            }
            let weight = (tuning.avoidance_radius - dist) / tuning.avoidance_radius;
            Some(away.normalize().scale(weight * tuning.avoidance_strength))
        })
        .fold(Vector2::ZERO, |acc, push| acc.add(&push))
}

/// Returns the displacement to use instead of `step` when the resulting
/// position would leave every zone.
pub fn zone_confinement(
    position: &Vector2,
    step: Vector2,
    zones: &[SpawnZone],
    confinement_step: f32,
) -> Vector2 {
    let candidate = position.add(&step);
    if zones.is_empty() || zones.iter().any(|zone| zone.contains(&candidate)) {
        return step;
    }
    match nearest_zone(zones, position) {
        Some(zone) => {
            let home = zone.center.sub(position);
            let dist = home.magnitude();
            if dist <= f32::EPSILON {
                Vector2::ZERO
            } else {
                home.normalize().scale(confinement_step.min(dist))
            }
        }
        None => step,
    }
}

fn step_toward(from: &Vector2, to: &Vector2, speed: f32) -> Vector2 {
    let delta = to.sub(from);
    let dist = delta.magnitude();
    if dist <= speed {
        delta
    } else {
        delta.normalize().scale(speed)
    }
}

fn blocked(npc: &NpcState, candidate: Vector2, ctx: &SteeringContext<'_>) -> bool {
    let bounds = npc.bounds_at(candidate);
    if !ctx.tuning.airborne && ctx.map.hits_obstacle(&bounds) {
        return true;
    }
    // A step is allowed out of an existing overlap as long as it moves away.
    ctx.neighbours.iter().any(|other| {
        other.bounds.intersects(&bounds)
            && candidate.distance_to(&other.position) <= npc.position.distance_to(&other.position)
    })
}

/// Advances one creature by one tick.
pub fn steer<R: Rng + ?Sized>(
    npc: &mut NpcState,
    ctx: &SteeringContext<'_>,
    rng: &mut R,
) -> SteeringOutcome {
    let mut outcome = SteeringOutcome::default();
    if !npc.alive {
        return outcome;
    }

    let tuning = ctx.tuning;
    npc.attack_cooldown = npc.attack_cooldown.saturating_sub(1);
    npc.hit_timer = npc.hit_timer.saturating_sub(1);

    let seek = match acquire_target(npc, tuning, ctx.players, &mut outcome) {
        Some(target_pos) => {
            let dist = npc.position.distance_to(&target_pos);
            if dist <= tuning.attack_range {
                npc.mode = NpcMode::Attacking;
                npc.angle = target_pos.sub(&npc.position).angle();
                if npc.attack_cooldown == 0 {
                    if let Some(target) = npc.target.clone() {
                        outcome.attack = Some((target, tuning.attack_damage));
                    }
                    npc.attack_cooldown = tuning.attack_cooldown_ticks;
                }
                Vector2::ZERO
            } else {
                npc.mode = NpcMode::Seeking;
                let toward_npc = npc.position.sub(&target_pos).normalize();
                let destination = target_pos.add(&toward_npc.scale(tuning.target_offset));
                step_toward(&npc.position, &destination, tuning.speed)
            }
        }
        None => {
            npc.mode = NpcMode::Wandering;
            if npc.wander_timer == 0 {
                let offset = Vector2::new(
                    rng.gen_range(-tuning.wander_radius..=tuning.wander_radius),
                    rng.gen_range(-tuning.wander_radius..=tuning.wander_radius),
                );
                npc.wander_point = npc.position.add(&offset);
                let (min, max) = tuning.wander_interval_ticks;
                npc.wander_timer = rng.gen_range(min..=max.max(min));
            } else {
                npc.wander_timer -= 1;
            }
            step_toward(&npc.position, &npc.wander_point, tuning.speed)
        }
    };

    let desired = seek.add(&separation(&npc.position, ctx.neighbours, tuning));
    let step = zone_confinement(&npc.position, desired, ctx.zones, tuning.confinement_step);

    npc.moving = false;
    if step.magnitude() > f32::EPSILON {
        let candidate = npc.position.add(&step);
        if !blocked(npc, candidate, ctx) {
            npc.position = candidate;
            npc.moving = true;
            if !npc.is_attacking() {
                npc.angle = step.angle();
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn open_map() -> WorldMap {
        WorldMap::new(4000.0, 4000.0, vec![])
    }

    fn neighbour_of(npc: &NpcState) -> Neighbour {
        Neighbour {
            id: npc.id,
            position: npc.position,
            bounds: npc.bounds(),
        }
    }

    fn chaser_at(id: NpcId, x: f32, y: f32) -> NpcState {
        let mut rng = StdRng::seed_from_u64(id as u64);
        NpcState::new(id, &NpcTuning::chaser(), Vector2::new(x, y), &mut rng)
    }

    #[test]
    fn test_target_acquired_inside_detection_radius() {
        let tuning = NpcTuning::chaser();
        let mut npc = chaser_at(1, 0.0, 0.0);
        let players = vec![
            ("far".to_string(), Vector2::new(900.0, 0.0)),
            ("near".to_string(), Vector2::new(200.0, 0.0)),
            ("nearer".to_string(), Vector2::new(0.0, 150.0)),
        ];
        let mut outcome = SteeringOutcome::default();
        let pos = acquire_target(&mut npc, &tuning, &players, &mut outcome);
        assert_eq!(pos, Some(Vector2::new(0.0, 150.0)));
        assert_eq!(npc.target.as_deref(), Some("nearer"));
        assert_eq!(outcome.acquired.as_deref(), Some("nearer"));
    }

    #[test]
    fn test_target_kept_until_chase_radius() {
        let tuning = NpcTuning::chaser();
        let mut npc = chaser_at(1, 0.0, 0.0);
        npc.target = Some("p1".into());

        // Between detection and chase radius: kept.
        let players = vec![("p1".to_string(), Vector2::new(700.0, 0.0))];
        let mut outcome = SteeringOutcome::default();
        assert!(acquire_target(&mut npc, &tuning, &players, &mut outcome).is_some());
        assert_eq!(npc.target.as_deref(), Some("p1"));

        // Past chase radius: released and nobody else in range.
        let players = vec![("p1".to_string(), Vector2::new(801.0, 0.0))];
        let mut outcome = SteeringOutcome::default();
        assert!(acquire_target(&mut npc, &tuning, &players, &mut outcome).is_none());
        assert_eq!(npc.target, None);
        assert_eq!(outcome.released.as_deref(), Some("p1"));
    }

    #[test]
    fn test_chaser_gives_up_and_wanders_when_player_retreats() {
        let tuning = NpcTuning::chaser();
        let map = open_map();
        let mut rng = StdRng::seed_from_u64(4);
        let mut npc = chaser_at(1, 1000.0, 1000.0);

        let near = vec![("p1".to_string(), Vector2::new(1400.0, 1000.0))];
        let ctx = SteeringContext {
            tuning: &tuning,
            players: &near,
            neighbours: &[],
            zones: &[],
            map: &map,
        };
        let outcome = steer(&mut npc, &ctx, &mut rng);
        assert_eq!(outcome.acquired.as_deref(), Some("p1"));
        assert_eq!(npc.target.as_deref(), Some("p1"));
        assert_eq!(npc.mode, NpcMode::Seeking);

        npc.wander_point = Vector2::new(npc.position.x, 1200.0);
        npc.wander_timer = 100;
        let before = npc.position;

        let far = vec![("p1".to_string(), Vector2::new(before.x + 900.0, 1000.0))];
        let ctx = SteeringContext {
            tuning: &tuning,
            players: &far,
            neighbours: &[],
            zones: &[],
            map: &map,
        };
        let outcome = steer(&mut npc, &ctx, &mut rng);
        assert_eq!(outcome.released.as_deref(), Some("p1"));
        assert_eq!(npc.target, None);
        assert_eq!(npc.mode, NpcMode::Wandering);
        assert!(npc.moving);
        assert_approx_eq!(npc.position.x, before.x, 1e-4);
        assert_approx_eq!(npc.position.y, before.y + tuning.speed, 1e-4);
        assert!(npc.position.distance_to(&npc.wander_point) < before.distance_to(&npc.wander_point));
    }

    #[test]
    fn test_target_released_when_player_gone() {
        let tuning = NpcTuning::chaser();
        let mut npc = chaser_at(1, 0.0, 0.0);
        npc.target = Some("p1".into());
        let mut outcome = SteeringOutcome::default();
        assert!(acquire_target(&mut npc, &tuning, &[], &mut outcome).is_none());
        assert_eq!(outcome.released.as_deref(), Some("p1"));
    }

    #[test]
    fn test_grazer_never_targets() {
        let tuning = NpcTuning::grazer();
        let mut rng = StdRng::seed_from_u64(3);
        let mut npc = NpcState::new(1, &tuning, Vector2::new(0.0, 0.0), &mut rng);
        let players = vec![("p1".to_string(), Vector2::new(5.0, 0.0))];
        let mut outcome = SteeringOutcome::default();
        assert!(acquire_target(&mut npc, &tuning, &players, &mut outcome).is_none());
        assert_eq!(npc.target, None);
    }

    #[test]
    fn test_chaser_steps_toward_target() {
        let tuning = NpcTuning::chaser();
        let map = open_map();
        let mut rng = StdRng::seed_from_u64(9);
        let mut npc = chaser_at(1, 1000.0, 1000.0);
        let players = vec![("p1".to_string(), Vector2::new(1300.0, 1000.0))];
        let ctx = SteeringContext {
            tuning: &tuning,
            players: &players,
            neighbours: &[],
            zones: &[],
            map: &map,
        };

        let outcome = steer(&mut npc, &ctx, &mut rng);
        assert_eq!(outcome.acquired.as_deref(), Some("p1"));
        assert_eq!(npc.mode, NpcMode::Seeking);
        assert!(npc.moving);
        assert_approx_eq!(npc.position.x, 1000.0 + tuning.speed, 1e-4);
        assert_approx_eq!(npc.position.y, 1000.0, 1e-4);
    }

    #[test]
    fn test_attack_respects_cooldown() {
        let tuning = NpcTuning::chaser();
        let map = open_map();
        let mut rng = StdRng::seed_from_u64(9);
        let mut npc = chaser_at(1, 1000.0, 1000.0);
        let players = vec![("p1".to_string(), Vector2::new(1030.0, 1000.0))];
        let ctx = SteeringContext {
            tuning: &tuning,
            players: &players,
            neighbours: &[],
            zones: &[],
            map: &map,
        };

        let first = steer(&mut npc, &ctx, &mut rng);
        assert_eq!(first.attack, Some(("p1".to_string(), tuning.attack_damage)));
        assert!(npc.snapshot().attacking);

        let mut attacks = 0;
        for _ in 0..tuning.attack_cooldown_ticks - 1 {
            if steer(&mut npc, &ctx, &mut rng).attack.is_some() {
                attacks += 1;
            }
        }
        assert_eq!(attacks, 0);
        assert!(steer(&mut npc, &ctx, &mut rng).attack.is_some());
    }

    #[test]
    fn test_separation_points_away_from_neighbour() {
        let tuning = NpcTuning::chaser();
        let other = chaser_at(2, 110.0, 100.0);
        let push = separation(&Vector2::new(100.0, 100.0), &[neighbour_of(&other)], &tuning);
        assert!(push.x < 0.0);
        assert_approx_eq!(push.y, 0.0, 1e-5);

        let far = chaser_at(3, 500.0, 100.0);
        let none = separation(&Vector2::new(100.0, 100.0), &[neighbour_of(&far)], &tuning);
        assert_eq!(none, Vector2::ZERO);
    }

    #[test]
    fn test_separation_keeps_creatures_apart() {
        // Two chasers heading for the same player end farther apart with
        // separation than they would by seeking alone.
        let tuning = NpcTuning::chaser();
        let map = open_map();
        let players = vec![("p1".to_string(), Vector2::new(1000.0, 1400.0))];

        let mut a = chaser_at(1, 980.0, 1000.0);
        let mut b = chaser_at(2, 1020.0, 1000.0);
        let seek_only_a = step_toward(
            &a.position,
            &Vector2::new(1000.0, 1400.0 - tuning.target_offset),
            tuning.speed,
        );
        let seek_only_b = step_toward(
            &b.position,
            &Vector2::new(1000.0, 1400.0 - tuning.target_offset),
            tuning.speed,
        );
        let without = a
            .position
            .add(&seek_only_a)
            .distance_to(&b.position.add(&seek_only_b));

        let mut rng = StdRng::seed_from_u64(1);
        let b_before = neighbour_of(&b);
        let a_before = neighbour_of(&a);
        steer(
            &mut a,
            &SteeringContext {
                tuning: &tuning,
                players: &players,
                neighbours: &[b_before],
                zones: &[],
                map: &map,
            },
            &mut rng,
        );
        steer(
            &mut b,
            &SteeringContext {
                tuning: &tuning,
                players: &players,
                neighbours: &[a_before],
                zones: &[],
                map: &map,
            },
            &mut rng,
        );

        assert!(a.position.distance_to(&b.position) > without);
    }

    #[test]
    fn test_zone_confinement_replaces_outbound_step() {
        let zones = [SpawnZone::new(0.0, 0.0, 100.0, 3)];
        let position = Vector2::new(99.0, 0.0);

        let kept = zone_confinement(&position, Vector2::new(-1.0, 0.0), &zones, 2.0);
        assert_eq!(kept, Vector2::new(-1.0, 0.0));

        let corrected = zone_confinement(&position, Vector2::new(5.0, 0.0), &zones, 2.0);
        assert_approx_eq!(corrected.x, -2.0, 1e-5);
        assert_approx_eq!(corrected.y, 0.0, 1e-5);
    }

    #[test]
    fn test_wandering_creature_stays_near_home_zone() {
        let tuning = NpcTuning::grazer();
        let map = open_map();
        let zones = [SpawnZone::new(1000.0, 1000.0, 150.0, 3)];
        let mut rng = StdRng::seed_from_u64(42);
        let mut npc = NpcState::new(1, &tuning, Vector2::new(1100.0, 1000.0), &mut rng);

        for _ in 0..5_000 {
            steer(
                &mut npc,
                &SteeringContext {
                    tuning: &tuning,
                    players: &[],
                    neighbours: &[],
                    zones: &zones,
                    map: &map,
                },
                &mut rng,
            );
            let drift = npc.position.distance_to(&zones[0].center);
            assert!(drift <= zones[0].radius + tuning.confinement_step + 1e-3);
        }
    }

    #[test]
    fn test_obstacle_blocks_ground_but_not_air() {
        let map = WorldMap::new(4000.0, 4000.0, vec![Rect::new(1010.0, 900.0, 40.0, 200.0)]);
        let players = vec![("p1".to_string(), Vector2::new(1200.0, 1000.0))];
        let mut rng = StdRng::seed_from_u64(5);

        let chaser = NpcTuning::chaser();
        let mut ground = NpcState::new(1, &chaser, Vector2::new(993.0, 1000.0), &mut rng);
        steer(
            &mut ground,
            &SteeringContext {
                tuning: &chaser,
                players: &players,
                neighbours: &[],
                zones: &[],
                map: &map,
            },
            &mut rng,
        );
        assert_eq!(ground.position, Vector2::new(993.0, 1000.0));
        assert!(!ground.moving);

        let flyer = NpcTuning::flyer();
        let mut air = NpcState::new(2, &flyer, Vector2::new(985.0, 1000.0), &mut rng);
        steer(
            &mut air,
            &SteeringContext {
                tuning: &flyer,
                players: &players,
                neighbours: &[],
                zones: &[],
                map: &map,
            },
            &mut rng,
        );
        assert!(air.moving);
        assert!(air.position.x > 985.0);
    }

    #[test]
    fn test_damage_kills_and_flashes() {
        let tuning = NpcTuning::grazer();
        let mut rng = StdRng::seed_from_u64(1);
        let mut npc = NpcState::new(7, &tuning, Vector2::new(0.0, 0.0), &mut rng);

        assert_eq!(npc.apply_damage(30, &tuning), DamageOutcome::Damaged);
        assert!(npc.snapshot().hit);
        assert_eq!(npc.apply_damage(100, &tuning), DamageOutcome::Killed);
        assert!(!npc.alive);
        assert_eq!(npc.health, 0);
        assert_eq!(npc.apply_damage(10, &tuning), DamageOutcome::Ignored);
    }
}
