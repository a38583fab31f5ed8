//! Canonical world state: players, server-tracked bullets and creatures.
//!
//! Each collection is a concurrent map. A write to one entity replaces or
//! edits that entity under its shard lock, so readers never observe a
//! half-applied update. Nothing here spans more than one entity.

use crate::npc::NpcState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;
use shared::{BulletState, Identity, NpcId, PlayerState, Vector2};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct WorldStore {
    players: DashMap<Identity, PlayerState>,
    bullets: DashMap<u64, BulletState>,
    npcs: DashMap<NpcId, NpcState>,
    next_bullet: AtomicU64,
}

impl WorldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `player` unless its identity is already present.
    pub fn insert_player(&self, player: PlayerState) -> bool {
        match self.players.entry(player.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                info!(
                    "Added player {} at ({:.0}, {:.0})",
                    player.id, player.position.x, player.position.y
                );
                slot.insert(player);
                true
            }
        }
    }

    pub fn remove_player(&self, id: &str) -> Option<PlayerState> {
        let removed = self.players.remove(id).map(|(_, player)| player);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    pub fn player(&self, id: &str) -> Option<PlayerState> {
        self.players.get(id).map(|entry| entry.value().clone())
    }

    /// Runs `f` on the player's record while holding its lock.
    ///
    /// `f` must not touch the store.
    pub fn modify_player<T, F>(&self, id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut PlayerState) -> T,
    {
        self.players.get_mut(id).map(|mut entry| f(entry.value_mut()))
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Copies of every player except `exclude`.
    pub fn player_snapshot(&self, exclude: Option<&str>) -> Vec<PlayerState> {
        self.players
            .iter()
            .filter(|entry| Some(entry.key().as_str()) != exclude)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Positions of living players, optionally leaving one out.
    pub fn live_player_positions(&self, exclude: Option<&str>) -> Vec<(Identity, Vector2)> {
        self.players
            .iter()
            .filter(|entry| entry.value().is_alive() && Some(entry.key().as_str()) != exclude)
            .map(|entry| (entry.key().clone(), entry.value().position))
            .collect()
    }

    pub fn dead_players(&self) -> Vec<(Identity, u64)> {
        self.players
            .iter()
            .filter(|entry| entry.value().dead)
            .map(|entry| (entry.key().clone(), entry.value().death_time))
            .collect()
    }

    /// Stores a bullet under a fresh server key and returns the key.
    pub fn spawn_bullet(&self, bullet: BulletState) -> u64 {
        let key = self.next_bullet.fetch_add(1, Ordering::Relaxed);
        self.bullets.insert(key, bullet);
        key
    }

    pub fn bullet_snapshot(&self) -> Vec<(u64, BulletState)> {
        self.bullets
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn replace_bullet(&self, key: u64, bullet: BulletState) {
        self.bullets.insert(key, bullet);
    }

    pub fn remove_bullet(&self, key: u64) -> Option<BulletState> {
        self.bullets.remove(&key).map(|(_, bullet)| bullet)
    }

    pub fn bullet_count(&self) -> usize {
        self.bullets.len()
    }

    pub fn upsert_npc(&self, npc: NpcState) {
        self.npcs.insert(npc.id, npc);
    }

    pub fn remove_npc(&self, id: NpcId) -> Option<NpcState> {
        self.npcs.remove(&id).map(|(_, npc)| npc)
    }

    pub fn npc(&self, id: NpcId) -> Option<NpcState> {
        self.npcs.get(&id).map(|entry| entry.value().clone())
    }

    /// Copies of every creature, ordered by id.
    pub fn npc_snapshot(&self) -> Vec<NpcState> {
        let mut npcs: Vec<NpcState> = self.npcs.iter().map(|entry| entry.value().clone()).collect();
        npcs.sort_by_key(|npc| npc.id);
        npcs
    }

    pub fn npc_count(&self) -> usize {
        self.npcs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npc::NpcTuning;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::BulletSpawn;
    use std::sync::Arc;

    fn player(id: &str, x: f32) -> PlayerState {
        PlayerState::new(id, id, Vector2::new(x, 100.0))
    }

    #[test]
    fn test_one_record_per_identity() {
        let world = WorldStore::new();
        assert!(world.insert_player(player("p1", 10.0)));
        assert!(!world.insert_player(player("p1", 20.0)));
        assert_eq!(world.player_count(), 1);
        assert_eq!(world.player("p1").unwrap().position.x, 10.0);
    }

    #[test]
    fn test_snapshots_exclude_and_filter_dead() {
        let world = WorldStore::new();
        world.insert_player(player("p1", 10.0));
        world.insert_player(player("p2", 20.0));
        world.insert_player(player("p3", 30.0));
        world.modify_player("p3", |p| p.apply_damage(500, 1));

        assert_eq!(world.player_snapshot(Some("p1")).len(), 2);
        let mut live: Vec<Identity> = world
            .live_player_positions(None)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        live.sort();
        assert_eq!(live, vec!["p1".to_string(), "p2".to_string()]);
        assert_eq!(world.dead_players(), vec![("p3".to_string(), 1)]);
    }

    #[test]
    fn test_concurrent_damage_is_not_lost() {
        let world = Arc::new(WorldStore::new());
        world.insert_player(player("p1", 0.0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let world = Arc::clone(&world);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        world.modify_player("p1", |p| p.apply_damage(1, 1));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(world.player("p1").unwrap().health, 20);
    }

    #[test]
    fn test_bullets_get_distinct_keys() {
        let world = WorldStore::new();
        let spawn = BulletSpawn {
            bullet_id: 1,
            origin: Vector2::ZERO,
            angle: 0.0,
        };
        // Two clients may reuse the same bullet id.
        let a = world.spawn_bullet(BulletState::from_spawn("p1", &spawn, 0));
        let b = world.spawn_bullet(BulletState::from_spawn("p2", &spawn, 0));
        assert_ne!(a, b);
        assert_eq!(world.bullet_count(), 2);
        assert_eq!(world.remove_bullet(a).unwrap().owner, "p1");
        assert_eq!(world.bullet_count(), 1);
    }

    #[test]
    fn test_npc_snapshot_sorted() {
        let world = WorldStore::new();
        let mut rng = StdRng::seed_from_u64(1);
        let tuning = NpcTuning::grazer();
        for id in [3, 1, 2] {
            world.upsert_npc(NpcState::new(id, &tuning, Vector2::ZERO, &mut rng));
        }
        let ids: Vec<NpcId> = world.npc_snapshot().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(world.remove_npc(2).is_some());
        assert_eq!(world.npc_count(), 2);
    }
}
