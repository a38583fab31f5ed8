//! The authoritative side of every client message.
//!
//! Each handler mutates the [`WorldStore`] and fans the result out through
//! the [`SessionRegistry`]. Membership changes (join and leave) are
//! serialised so a joining client sees every peer exactly once; all other
//! handlers touch one entity at a time.

use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::metrics::ServerMetrics;
use crate::npc::NpcState;
use crate::registry::SessionRegistry;
use crate::session::{SessionHandle, SessionId};
use crate::world::WorldStore;
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    find_safe_spawn, now_millis, BulletSpawn, BulletState, DamageOutcome, Envelope, HitCause,
    HitReport, HitTarget, Identity, Message, NpcId, PlayerState, Vector2, MELEE_DAMAGE,
    MELEE_RANGE,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Damage addressed to a creature, applied by the simulation loop which
/// owns creature state.
#[derive(Debug, Clone, PartialEq)]
pub enum NpcCommand {
    Damage {
        npc: NpcId,
        damage: u32,
        attacker: Identity,
        cause: HitCause,
    },
}

pub struct BroadcastEngine {
    config: Arc<ServerConfig>,
    world: Arc<WorldStore>,
    registry: Arc<SessionRegistry>,
    metrics: Arc<ServerMetrics>,
    membership: Mutex<()>,
    npc_commands: mpsc::UnboundedSender<NpcCommand>,
    npc_command_rx: Mutex<Option<mpsc::UnboundedReceiver<NpcCommand>>>,
}

impl BroadcastEngine {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            world: Arc::new(WorldStore::new()),
            registry: Arc::new(SessionRegistry::new()),
            metrics: Arc::new(ServerMetrics::default()),
            membership: Mutex::new(()),
            npc_commands: tx,
            npc_command_rx: Mutex::new(Some(rx)),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn world(&self) -> &Arc<WorldStore> {
        &self.world
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    /// Hands the creature command queue to its consumer. Only the first
    /// call returns it.
    pub fn take_npc_commands(&self) -> Option<mpsc::UnboundedReceiver<NpcCommand>> {
        self.npc_command_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Registers the session, stores a fresh record, announces it to the
    /// others and then sends the newcomer everyone already present.
    pub fn handle_join(&self, requested: PlayerState, handle: SessionHandle) -> Result<(), SessionError> {
        let _membership = self
            .membership
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let id = requested.id.clone();
        if !self.registry.register(&id, handle.clone()) {
            self.metrics.join_rejected();
            return Err(SessionError::IdentityInUse(id));
        }

        let name = if requested.name.is_empty() {
            id.clone()
        } else {
            requested.name
        };
        let mut fresh = PlayerState::new(id.clone(), name, requested.position);
        fresh.angle = requested.angle;
        if !self.world.insert_player(fresh.clone()) {
            warn!("Replacing stale record for {}", id);
            self.world.modify_player(&id, |player| *player = fresh.clone());
        }

        self.registry
            .broadcast_except(&id, &Envelope::new(id.clone(), Message::Join(fresh)));

        let peers = self.world.player_snapshot(Some(&id));
        let peer_count = peers.len();
        for peer in peers {
            handle.enqueue(Envelope::new(peer.id.clone(), Message::Join(peer)));
        }
        for npc in self.world.npc_snapshot().into_iter().filter(|npc| npc.alive) {
            handle.enqueue(Envelope::from_server(Message::NpcUpdate(npc.snapshot())));
        }

        info!("{} joined, {} peers already present", id, peer_count);
        Ok(())
    }

    /// Removes `identity` if it still belongs to `session` and tells everyone.
    /// Safe to call more than once.
    pub fn handle_leave(&self, identity: &str, session: SessionId) -> bool {
        let _membership = self
            .membership
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !self.registry.unregister(identity, session) {
            return false;
        }
        self.world.remove_player(identity);
        self.registry.broadcast(&Envelope::new(
            identity,
            Message::Leave {
                id: identity.to_string(),
            },
        ));
        info!("{} left", identity);
        true
    }

    /// Replaces the sender's record and relays it to everyone else.
    pub fn handle_player_update(&self, identity: &str, incoming: PlayerState) -> Option<PlayerState> {
        let now = now_millis();
        let updated = self.world.modify_player(identity, |current| {
            let next = current.validated_update(incoming, now);
            *current = next.clone();
            next
        })?;

        self.registry.broadcast_except(
            identity,
            &Envelope::new(identity, Message::PlayerUpdate(updated.clone())),
        );
        Some(updated)
    }

    /// Tracks the bullet for creature hits and relays it to everyone else.
    pub fn handle_bullet_spawn(&self, identity: &str, spawn: BulletSpawn) -> Result<(), SessionError> {
        let alive = self
            .world
            .player(identity)
            .map(|player| player.is_alive())
            .unwrap_or(false);
        if !alive {
            return Err(SessionError::DeadShooter(identity.to_string()));
        }

        self.world
            .spawn_bullet(BulletState::from_spawn(identity, &spawn, now_millis()));
        self.registry
            .broadcast_except(identity, &Envelope::new(identity, Message::BulletSpawn(spawn)));
        Ok(())
    }

    pub fn handle_hit(&self, attacker: &str, report: HitReport) -> Result<(), SessionError> {
        match report.target {
            HitTarget::Player(victim) => {
                if victim == attacker {
                    debug!("{} reported hitting itself, ignored", attacker);
                    return Ok(());
                }
                self.apply_player_damage(&victim, report.damage, Some(attacker));
                Ok(())
            }
            HitTarget::Npc(npc) => match report.cause {
                HitCause::Bullet => {
                    // Server bullets resolve against creatures on their own.
                    debug!("Ignoring client bullet hit on creature {}", npc);
                    Ok(())
                }
                HitCause::Melee => self.handle_melee(attacker, npc, report.damage),
            },
        }
    }

    fn handle_melee(&self, attacker: &str, npc: NpcId, damage: u32) -> Result<(), SessionError> {
        let attacker_pos = self
            .world
            .player(attacker)
            .filter(|player| player.is_alive())
            .map(|player| player.position)
            .ok_or(SessionError::InvalidMelee {
                npc,
                reason: "attacker is not alive",
            })?;
        let creature = self
            .world
            .npc(npc)
            .filter(|creature| creature.alive)
            .ok_or(SessionError::InvalidMelee {
                npc,
                reason: "no such creature",
            })?;
        if attacker_pos.distance_to(&creature.position) > MELEE_RANGE {
            return Err(SessionError::InvalidMelee {
                npc,
                reason: "out of range",
            });
        }

        let command = NpcCommand::Damage {
            npc,
            damage: damage.min(MELEE_DAMAGE),
            attacker: attacker.to_string(),
            cause: HitCause::Melee,
        };
        if self.npc_commands.send(command).is_err() {
            debug!("Simulation stopped, melee on {} dropped", npc);
        }
        Ok(())
    }

    /// Applies damage to a player and broadcasts the result to everyone,
    /// the victim included. A hit on a player that is already dead changes
    /// nothing.
    pub fn apply_player_damage(&self, victim: &str, damage: u32, attacker: Option<&str>) -> DamageOutcome {
        let now = now_millis();
        let applied = self.world.modify_player(victim, |player| {
            let outcome = player.apply_damage(damage, now);
            (outcome, player.clone())
        });

        let (outcome, updated) = match applied {
            Some((DamageOutcome::Ignored, _)) | None => return DamageOutcome::Ignored,
            Some(applied) => applied,
        };

        self.registry
            .broadcast(&Envelope::from_server(Message::PlayerUpdate(updated)));

        if outcome == DamageOutcome::Killed {
            match attacker {
                Some(killer) if killer != victim => {
                    info!("{} was killed by {}", victim, killer);
                    self.credit_kill(killer, 0);
                }
                _ => info!("{} died", victim),
            }
        }
        outcome
    }

    /// Adds a kill to `killer`, heals it by `heal` and broadcasts the result.
    pub fn credit_kill(&self, killer: &str, heal: u32) -> Option<PlayerState> {
        let now = now_millis();
        let updated = self.world.modify_player(killer, |player| {
            player.kills += 1;
            player.heal(heal, now);
            player.clone()
        })?;
        self.registry
            .broadcast(&Envelope::from_server(Message::PlayerUpdate(updated.clone())));
        Some(updated)
    }

    /// Brings back every player whose respawn delay has passed, at a safe
    /// spawn point, and broadcasts each one.
    pub fn respawn_due_players<R: Rng + ?Sized>(&self, now: u64, rng: &mut R) -> Vec<PlayerState> {
        let delay = self.config.respawn_delay.as_millis() as u64;
        let mut respawned = Vec::new();

        for (id, death_time) in self.world.dead_players() {
            if now.saturating_sub(death_time) < delay {
                continue;
            }

            let occupied: Vec<Vector2> = self
                .world
                .live_player_positions(Some(&id))
                .into_iter()
                .map(|(_, position)| position)
                .collect();
            let position = find_safe_spawn(
                &self.config.map,
                &self.config.player_spawn_zones,
                &occupied,
                rng,
            );

            let fresh = self
                .world
                .modify_player(&id, |player| {
                    if player.dead && player.death_time == death_time {
                        *player = player.respawned_at(position, now);
                        Some(player.clone())
                    } else {
                        None
                    }
                })
                .flatten();

            if let Some(fresh) = fresh {
                info!(
                    "Respawned {} at ({:.0}, {:.0})",
                    id, fresh.position.x, fresh.position.y
                );
                self.registry
                    .broadcast(&Envelope::from_server(Message::PlayerUpdate(fresh.clone())));
                respawned.push(fresh);
            }
        }
        respawned
    }

    pub fn broadcast_npc(&self, npc: &NpcState) -> usize {
        self.registry
            .broadcast(&Envelope::from_server(Message::NpcUpdate(npc.snapshot())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SessionMetrics;
    use crate::npc::NpcTuning;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::PLAYER_MAX_HEALTH;
    use std::time::Duration;

    fn engine() -> BroadcastEngine {
        BroadcastEngine::new(Arc::new(ServerConfig::default().without_creatures()))
    }

    fn connect(engine: &BroadcastEngine, id: &str, session: SessionId) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(64);
        let addr = "127.0.0.1:6000".parse().unwrap();
        let handle = SessionHandle::new(session, addr, tx, Arc::new(SessionMetrics::default()));
        engine
            .handle_join(PlayerState::new(id, id, Vector2::new(400.0, 400.0)), handle)
            .unwrap();
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<Envelope>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            out.push(envelope);
        }
        out
    }

    fn joins_for(envelopes: &[Envelope], id: &str) -> usize {
        envelopes
            .iter()
            .filter(|e| matches!(&e.message, Message::Join(p) if p.id == id))
            .count()
    }

    #[test]
    fn test_join_sees_each_peer_exactly_once() {
        let engine = engine();
        let mut r1 = connect(&engine, "p1", 1);
        let mut r2 = connect(&engine, "p2", 2);

        let to_p1 = drain(&mut r1);
        let to_p2 = drain(&mut r2);
        assert_eq!(joins_for(&to_p1, "p2"), 1);
        assert_eq!(joins_for(&to_p1, "p1"), 0);
        assert_eq!(joins_for(&to_p2, "p1"), 1);
        assert_eq!(joins_for(&to_p2, "p2"), 0);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let engine = engine();
        let _r1 = connect(&engine, "p1", 1);

        let (tx, _rx) = mpsc::channel(4);
        let handle = SessionHandle::new(
            2,
            "127.0.0.1:6001".parse().unwrap(),
            tx,
            Arc::new(SessionMetrics::default()),
        );
        let result = engine.handle_join(PlayerState::new("p1", "x", Vector2::ZERO), handle);
        assert_eq!(result, Err(SessionError::IdentityInUse("p1".into())));
        assert_eq!(engine.world().player_count(), 1);
        assert_eq!(engine.metrics().joins_rejected(), 1);
    }

    #[test]
    fn test_update_goes_to_everyone_but_sender() {
        let engine = engine();
        let mut r1 = connect(&engine, "p1", 1);
        let mut r2 = connect(&engine, "p2", 2);
        let mut r3 = connect(&engine, "p3", 3);
        drain(&mut r1);
        drain(&mut r2);
        drain(&mut r3);

        let mut moved = engine.world().player("p1").unwrap();
        moved.position = Vector2::new(500.0, 420.0);
        engine.handle_player_update("p1", moved);

        assert!(drain(&mut r1).is_empty());
        for rx in [&mut r2, &mut r3] {
            let got = drain(rx);
            assert_eq!(got.len(), 1);
            match &got[0].message {
                Message::PlayerUpdate(p) => assert_eq!(p.position, Vector2::new(500.0, 420.0)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_hit_kill_is_idempotent() {
        let engine = engine();
        let mut r1 = connect(&engine, "p1", 1);
        let _r2 = connect(&engine, "p2", 2);

        assert_eq!(
            engine.handle_hit("p1", HitReport::player("p2", 60)),
            Ok(())
        );
        engine.handle_hit("p1", HitReport::player("p2", 60)).unwrap();
        // Replay against the corpse.
        engine.handle_hit("p1", HitReport::player("p2", 60)).unwrap();

        let victim = engine.world().player("p2").unwrap();
        assert_eq!(victim.health, 0);
        assert!(victim.dead);
        assert_eq!(engine.world().player("p1").unwrap().kills, 1);

        // The victim's update reaches the attacker too, and the kill credit follows.
        let to_p1 = drain(&mut r1);
        assert!(to_p1.iter().any(|e| matches!(&e.message,
            Message::PlayerUpdate(p) if p.id == "p2" && p.dead)));
        assert!(to_p1.iter().any(|e| matches!(&e.message,
            Message::PlayerUpdate(p) if p.id == "p1" && p.kills == 1)));
    }

    #[test]
    fn test_damage_broadcast_includes_victim() {
        let engine = engine();
        let _r1 = connect(&engine, "p1", 1);
        let mut r2 = connect(&engine, "p2", 2);
        drain(&mut r2);

        assert_eq!(
            engine.apply_player_damage("p2", 10, Some("p1")),
            DamageOutcome::Damaged
        );
        let got = drain(&mut r2);
        assert!(matches!(&got[0].message,
            Message::PlayerUpdate(p) if p.id == "p2" && p.health == PLAYER_MAX_HEALTH - 10));
    }

    #[test]
    fn test_self_hit_ignored() {
        let engine = engine();
        let _r1 = connect(&engine, "p1", 1);
        engine.handle_hit("p1", HitReport::player("p1", 50)).unwrap();
        assert_eq!(engine.world().player("p1").unwrap().health, PLAYER_MAX_HEALTH);
    }

    #[test]
    fn test_leave_broadcasts_once() {
        let engine = engine();
        let mut r1 = connect(&engine, "p1", 1);
        let _r2 = connect(&engine, "p2", 2);
        drain(&mut r1);

        assert!(engine.handle_leave("p2", 2));
        assert!(!engine.handle_leave("p2", 2));
        let got = drain(&mut r1);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].message, Message::Leave { id: "p2".into() });
        assert!(engine.world().player("p2").is_none());
    }

    #[test]
    fn test_dead_player_cannot_fire() {
        let engine = engine();
        let _r1 = connect(&engine, "p1", 1);
        let spawn = BulletSpawn {
            bullet_id: 1,
            origin: Vector2::new(400.0, 400.0),
            angle: 0.0,
        };
        engine.handle_bullet_spawn("p1", spawn).unwrap();
        assert_eq!(engine.world().bullet_count(), 1);

        engine.apply_player_damage("p1", 500, None);
        assert_eq!(
            engine.handle_bullet_spawn("p1", spawn),
            Err(SessionError::DeadShooter("p1".into()))
        );
        assert_eq!(engine.world().bullet_count(), 1);
    }

    #[test]
    fn test_respawn_after_delay_exactly_once() {
        let config = ServerConfig {
            respawn_delay: Duration::from_millis(3000),
            ..ServerConfig::default().without_creatures()
        };
        let engine = BroadcastEngine::new(Arc::new(config));
        let _r1 = connect(&engine, "p1", 1);
        let mut rng = StdRng::seed_from_u64(11);

        engine.apply_player_damage("p1", 500, None);
        let died_at = engine.world().player("p1").unwrap().death_time;

        assert!(engine.respawn_due_players(died_at + 2999, &mut rng).is_empty());
        let respawned = engine.respawn_due_players(died_at + 3000, &mut rng);
        assert_eq!(respawned.len(), 1);
        assert!(engine.respawn_due_players(died_at + 9000, &mut rng).is_empty());

        let player = engine.world().player("p1").unwrap();
        assert!(player.is_alive());
        assert_eq!(player.health, PLAYER_MAX_HEALTH);
        assert!(!engine.config().map.hits_obstacle(&player.bounds()));
    }

    #[test]
    fn test_update_in_flight_across_respawn_keeps_spawn_point() {
        let engine = engine();
        let _r1 = connect(&engine, "p1", 1);
        let mut r2 = connect(&engine, "p2", 2);
        let mut rng = StdRng::seed_from_u64(5);

        engine.world().modify_player("p1", |p| p.position = Vector2::new(1000.0, 1000.0));
        engine.apply_player_damage("p1", 500, None);
        let sent_while_dead = engine.world().player("p1").unwrap();

        let respawned = engine.respawn_due_players(sent_while_dead.death_time + 10_000, &mut rng);
        assert_eq!(respawned.len(), 1);
        let spawn_point = respawned[0].position;
        drain(&mut r2);

        let updated = engine.handle_player_update("p1", sent_while_dead).unwrap();
        assert!(updated.is_alive());
        assert_eq!(updated.position, spawn_point);
        assert_eq!(engine.world().player("p1").unwrap().position, spawn_point);

        let relayed = drain(&mut r2);
        assert!(relayed.iter().any(|e| matches!(
            &e.message,
            Message::PlayerUpdate(p) if p.id == "p1" && p.position == spawn_point
        )));
    }

    #[test]
    fn test_melee_on_creature_queues_damage() {
        let engine = engine();
        let mut commands = engine.take_npc_commands().unwrap();
        assert!(engine.take_npc_commands().is_none());
        let _r1 = connect(&engine, "p1", 1);

        let mut rng = StdRng::seed_from_u64(2);
        let near = NpcState::new(5, &NpcTuning::chaser(), Vector2::new(430.0, 400.0), &mut rng);
        let far = NpcState::new(6, &NpcTuning::chaser(), Vector2::new(900.0, 400.0), &mut rng);
        engine.world().upsert_npc(near);
        engine.world().upsert_npc(far);

        let melee = |npc| HitReport {
            target: HitTarget::Npc(npc),
            damage: 999,
            cause: HitCause::Melee,
        };
        engine.handle_hit("p1", melee(5)).unwrap();
        assert!(matches!(
            engine.handle_hit("p1", melee(6)),
            Err(SessionError::InvalidMelee { npc: 6, .. })
        ));

        assert_eq!(
            commands.try_recv().unwrap(),
            NpcCommand::Damage {
                npc: 5,
                damage: MELEE_DAMAGE,
                attacker: "p1".into(),
                cause: HitCause::Melee,
            }
        );
        assert!(commands.try_recv().is_err());
    }
}
