//! Fixed-rate world simulation: server bullets, creature steering,
//! population upkeep and player respawns.
//!
//! The loop is the only writer of creature records. Damage that arrives
//! from sessions is queued as [`NpcCommand`]s and applied at the start of
//! the next tick.

use crate::broadcast::{BroadcastEngine, NpcCommand};
use crate::config::CreatureConfig;
use crate::npc::{steer, Neighbour, NpcState, SteeringContext};
use crate::population::PopulationController;
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{first_hit, now_millis, DamageOutcome, HitCause, Identity, NpcId, Rect};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};

pub struct Simulation {
    engine: Arc<BroadcastEngine>,
    population: PopulationController,
    commands: mpsc::UnboundedReceiver<NpcCommand>,
    rng: StdRng,
    tick: u64,
}

impl Simulation {
    pub fn new(
        engine: Arc<BroadcastEngine>,
        commands: mpsc::UnboundedReceiver<NpcCommand>,
        mut rng: StdRng,
    ) -> Self {
        let population = PopulationController::new(&engine.config().creatures, &mut rng);
        Self {
            engine,
            population,
            commands,
            rng,
            tick: 0,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    fn creature_config(&self, kind: shared::NpcKind) -> Option<&CreatureConfig> {
        self.engine.config().creature(kind)
    }

    /// Advances the world by one tick.
    pub fn tick(&mut self) {
        self.tick += 1;
        let now = now_millis();

        while let Ok(command) = self.commands.try_recv() {
            match command {
                NpcCommand::Damage {
                    npc,
                    damage,
                    attacker,
                    cause,
                } => {
                    self.damage_npc(npc, damage, Some(&attacker), cause);
                }
            }
        }

        self.step_bullets();
        self.step_npcs();

        let living = self.engine.world().npc_snapshot();
        let spawned = self
            .population
            .tick(&living, &self.engine.config().map, &mut self.rng);
        for npc in spawned {
            self.engine.world().upsert_npc(npc.clone());
            self.engine.broadcast_npc(&npc);
        }

        self.engine.respawn_due_players(now, &mut self.rng);
        self.engine.metrics().tick();
    }

    /// Moves every server bullet and resolves it against creatures. Bullets
    /// pass through ranged-immune kinds.
    fn step_bullets(&mut self) {
        let world = Arc::clone(self.engine.world());
        let mut targets: Vec<(NpcId, Rect)> = world
            .npc_snapshot()
            .into_iter()
            .filter(|npc| npc.alive)
            .filter(|npc| {
                self.creature_config(npc.kind)
                    .map(|c| !c.tuning.ranged_immune)
                    .unwrap_or(true)
            })
            .map(|npc| (npc.id, npc.bounds()))
            .collect();

        for (key, mut bullet) in world.bullet_snapshot() {
            let outcome = bullet.advance(&self.engine.config().map);
            if outcome.is_removed() {
                trace!("Bullet {} from {} removed: {:?}", bullet.id, bullet.owner, outcome);
                world.remove_bullet(key);
                continue;
            }

            let hit = first_hit(&bullet.bounds(), targets.iter().copied());
            match hit {
                Some(npc) => {
                    world.remove_bullet(key);
                    let outcome =
                        self.damage_npc(npc, shared::BULLET_DAMAGE, Some(&bullet.owner), HitCause::Bullet);
                    if outcome == DamageOutcome::Killed {
                        targets.retain(|(id, _)| *id != npc);
                    }
                }
                None => world.replace_bullet(key, bullet),
            }
        }
    }

    /// Steers every living creature, applying creature attacks to players.
    fn step_npcs(&mut self) {
        let engine = Arc::clone(&self.engine);
        let config = engine.config();
        let world = engine.world();

        let mut npcs = world.npc_snapshot();
        if npcs.is_empty() {
            return;
        }
        let players = world.live_player_positions(None);
        let broadcast_now = config.npc_broadcast_interval <= 1
            || self.tick % config.npc_broadcast_interval as u64 == 0;

        for index in 0..npcs.len() {
            if !npcs[index].alive {
                continue;
            }
            let Some(creature) = config.creature(npcs[index].kind) else {
                warn!("No configuration for {:?}, skipping", npcs[index].kind);
                continue;
            };

            let neighbours: Vec<Neighbour> = npcs
                .iter()
                .enumerate()
                .filter(|(other, npc)| *other != index && npc.alive)
                .map(|(_, npc)| Neighbour {
                    id: npc.id,
                    position: npc.position,
                    bounds: npc.bounds(),
                })
                .collect();
            let ctx = SteeringContext {
                tuning: &creature.tuning,
                players: &players,
                neighbours: &neighbours,
                zones: &creature.zones,
                map: &config.map,
            };

            let npc = &mut npcs[index];
            let outcome = steer(npc, &ctx, &mut self.rng);
            if let Some(target) = &outcome.acquired {
                debug!("{:?} {} acquired {}", npc.kind, npc.id, target);
            }
            if let Some(target) = &outcome.released {
                debug!("{:?} {} lost {}", npc.kind, npc.id, target);
            }
            if let Some((target, damage)) = outcome.attack {
                trace!("{:?} {} attacks {} for {}", npc.kind, npc.id, target, damage);
                engine.apply_player_damage(&target, damage, None);
            }
        }

        for npc in npcs {
            // Commands only arrive between ticks, so nothing else wrote these.
            world.upsert_npc(npc.clone());
            if broadcast_now {
                engine.broadcast_npc(&npc);
            }
        }
    }

    fn damage_npc(
        &self,
        id: NpcId,
        damage: u32,
        attacker: Option<&Identity>,
        cause: HitCause,
    ) -> DamageOutcome {
        let world = Arc::clone(self.engine.world());
        let Some(mut npc) = world.npc(id) else {
            return DamageOutcome::Ignored;
        };
        let Some(creature) = self.creature_config(npc.kind) else {
            return DamageOutcome::Ignored;
        };
        if cause == HitCause::Bullet && creature.tuning.ranged_immune {
            return DamageOutcome::Ignored;
        }
        let kill_heal = creature.tuning.kill_heal;

        let outcome = npc.apply_damage(damage, &creature.tuning);
        match outcome {
            DamageOutcome::Ignored => {}
            DamageOutcome::Damaged => {
                world.upsert_npc(npc.clone());
                self.engine.broadcast_npc(&npc);
            }
            DamageOutcome::Killed => {
                world.remove_npc(id);
                self.engine.broadcast_npc(&npc);
                match attacker {
                    Some(killer) => {
                        info!("{:?} {} killed by {}", npc.kind, id, killer);
                        self.engine.credit_kill(killer, kill_heal);
                    }
                    None => info!("{:?} {} died", npc.kind, id),
                }
            }
        }
        outcome
    }

    /// Creatures currently alive.
    pub fn living(&self) -> Vec<NpcState> {
        self.engine.world().npc_snapshot()
    }
}

/// Runs [`Simulation::tick`] at the configured rate until the task is
/// dropped. Missed ticks are skipped rather than replayed.
pub async fn run_simulation_loop(mut simulation: Simulation) {
    let tick_duration = simulation.engine.config().tick_duration();
    let mut ticker = interval(tick_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        "Simulation running at {} Hz",
        simulation.engine.config().tick_rate
    );

    loop {
        ticker.tick().await;
        let started = Instant::now();
        simulation.tick();

        let elapsed = started.elapsed();
        if elapsed > tick_duration {
            warn!(
                "Tick {} took {:.1}ms, longer than the {:.1}ms budget",
                simulation.tick_count(),
                elapsed.as_secs_f64() * 1000.0,
                tick_duration.as_secs_f64() * 1000.0
            );
        }
        if simulation.tick_count() % (simulation.engine.config().tick_rate.max(1) as u64 * 10) == 0 {
            debug!(
                "Tick {}: {} players, {} creatures, {} bullets",
                simulation.tick_count(),
                simulation.engine.world().player_count(),
                simulation.engine.world().npc_count(),
                simulation.engine.world().bullet_count()
            );
        }
    }
}

/// Builds a simulation with a seed taken from the OS.
pub fn simulation_for(engine: Arc<BroadcastEngine>) -> Option<Simulation> {
    let commands = engine.take_npc_commands()?;
    Some(Simulation::new(engine, commands, StdRng::from_entropy()))
}
