//! Keeps each creature zone topped up to its quota.
//!
//! Every zone has a countdown in ticks. While the zone holds fewer living
//! creatures of its kind than its quota the countdown runs; when it reaches
//! zero one creature spawns inside the zone and the countdown restarts.

use crate::config::CreatureConfig;
use crate::npc::{NpcState, NpcTuning};
use log::{debug, info};
use rand::Rng;
use shared::{NpcId, NpcKind, SpawnZone, Vector2, WorldMap};

/// Random points tried before falling back to the zone center.
pub const SPAWN_ATTEMPTS: usize = 10;

#[derive(Debug, Clone)]
struct KindPopulation {
    config: CreatureConfig,
    timers: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct PopulationController {
    kinds: Vec<KindPopulation>,
    next_id: NpcId,
}

impl PopulationController {
    /// Zone timers start at a random point of their period so zones do not
    /// all fill on the same tick.
    pub fn new<R: Rng + ?Sized>(creatures: &[CreatureConfig], rng: &mut R) -> Self {
        let kinds = creatures
            .iter()
            .map(|config| KindPopulation {
                timers: config
                    .zones
                    .iter()
                    .map(|_| rng.gen_range(0..config.respawn_ticks.max(1)))
                    .collect(),
                config: config.clone(),
            })
            .collect();
        Self { kinds, next_id: 1 }
    }

    pub fn timers(&self, kind: NpcKind) -> Option<&[u32]> {
        self.kinds
            .iter()
            .find(|k| k.config.tuning.kind == kind)
            .map(|k| k.timers.as_slice())
    }

    pub fn set_timer(&mut self, kind: NpcKind, zone: usize, ticks: u32) {
        if let Some(timer) = self
            .kinds
            .iter_mut()
            .find(|k| k.config.tuning.kind == kind)
            .and_then(|k| k.timers.get_mut(zone))
        {
            *timer = ticks;
        }
    }

    /// Runs one tick of population upkeep against the current creatures and
    /// returns the ones spawned.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        living: &[NpcState],
        map: &WorldMap,
        rng: &mut R,
    ) -> Vec<NpcState> {
        let mut spawned: Vec<NpcState> = Vec::new();

        for population in &mut self.kinds {
            let kind = population.config.tuning.kind;
            let mut total = living
                .iter()
                .filter(|npc| npc.alive && npc.kind == kind)
                .count();

            for (index, zone) in population.config.zones.iter().enumerate() {
                let in_zone = living
                    .iter()
                    .chain(spawned.iter())
                    .filter(|npc| npc.alive && npc.kind == kind && zone.contains(&npc.position))
                    .count();
                if in_zone >= zone.max_count || total >= population.config.max_total {
                    continue;
                }

                let timer = &mut population.timers[index];
                *timer = timer.saturating_sub(1);
                if *timer > 0 {
                    continue;
                }
                *timer = population.config.respawn_ticks;

                let occupied: Vec<&NpcState> = living.iter().chain(spawned.iter()).collect();
                let position = spawn_in_zone(zone, &population.config.tuning, map, &occupied, rng);
                let npc = NpcState::new(self.next_id, &population.config.tuning, position, rng);
                self.next_id = self.next_id.wrapping_add(1).max(1);

                info!(
                    "Spawned {:?} {} at ({:.0}, {:.0}), zone {} now {}/{}",
                    kind,
                    npc.id,
                    position.x,
                    position.y,
                    index,
                    in_zone + 1,
                    zone.max_count
                );
                total += 1;
                spawned.push(npc);
            }
        }

        spawned
    }
}

/// Picks a spawn point inside `zone` clear of obstacles and other creatures,
/// falling back to the zone center.
pub fn spawn_in_zone<R: Rng + ?Sized>(
    zone: &SpawnZone,
    tuning: &NpcTuning,
    map: &WorldMap,
    occupied: &[&NpcState],
    rng: &mut R,
) -> Vector2 {
    for _ in 0..SPAWN_ATTEMPTS {
        let candidate = zone.random_point(rng);
        let bounds = shared::Rect::centered(candidate, tuning.size, tuning.size);
        if map.hits_obstacle(&bounds) {
            continue;
        }
        if occupied
            .iter()
            .any(|npc| npc.alive && npc.bounds().intersects(&bounds))
        {
            continue;
        }
        return candidate;
    }
    debug!(
        "No clear point in zone at ({:.0}, {:.0}), using center",
        zone.center.x, zone.center.y
    );
    zone.center
}
