//! Client-side view of the world.
//!
//! The local player is predicted: input moves it immediately and the server
//! only ever corrects its health, kills, ammo and death state. Its position is
//! taken from the server only when a broadcast shows it coming back to life.
//!
//! Remote players and creatures are drawn at a display position that closes a
//! fixed fraction of the gap to their last authoritative position every tick.

use crate::input::InputIntent;
use log::{debug, info};
use rand::Rng;
use shared::{
    find_safe_spawn, first_hit, now_millis, BulletId, BulletSpawn, BulletState, Envelope,
    HitReport, Identity, Message, NpcId, NpcSnapshot, PlayerState, Rect, SpawnZone, Vector2,
    WorldMap, BULLET_DAMAGE, INTERPOLATION_FACTOR, MAX_AMMO, PLAYER_SIZE, PLAYER_SPEED,
    RELOAD_TIME_MS, SHOOT_DELAY_MS,
};
use std::collections::HashMap;

/// A remote entity with its last authoritative state and where it is drawn.
#[derive(Debug, Clone)]
pub struct Smoothed<T> {
    pub state: T,
    pub target: Vector2,
    pub display: Vector2,
}

impl<T> Smoothed<T> {
    fn new(state: T, position: Vector2) -> Self {
        Self {
            state,
            target: position,
            display: position,
        }
    }

    fn update(&mut self, state: T, position: Vector2) {
        self.state = state;
        self.target = position;
    }

    fn snap(&mut self) {
        self.display = self.target;
    }

    fn step(&mut self, factor: f32) {
        self.display = self.display.lerp(&self.target, factor);
    }
}

pub struct ClientGameState {
    local: PlayerState,
    map: WorldMap,
    players: HashMap<Identity, Smoothed<PlayerState>>,
    npcs: HashMap<NpcId, Smoothed<NpcSnapshot>>,
    own_bullets: Vec<BulletState>,
    remote_bullets: Vec<BulletState>,
    next_bullet_id: BulletId,
    last_shot: Option<u64>,
    reload_started: u64,
}

impl ClientGameState {
    pub fn new(local: PlayerState, map: WorldMap) -> Self {
        Self {
            local,
            map,
            players: HashMap::new(),
            npcs: HashMap::new(),
            own_bullets: Vec::new(),
            remote_bullets: Vec::new(),
            next_bullet_id: 1,
            last_shot: None,
            reload_started: 0,
        }
    }

    /// Creates the local player at a safe point in one of `zones`.
    pub fn spawn<R: Rng + ?Sized>(
        identity: impl Into<Identity>,
        name: impl Into<String>,
        map: WorldMap,
        zones: &[SpawnZone],
        rng: &mut R,
    ) -> Self {
        let position = find_safe_spawn(&map, zones, &[], rng);
        Self::new(PlayerState::new(identity, name, position), map)
    }

    pub fn local(&self) -> &PlayerState {
        &self.local
    }

    pub fn map(&self) -> &WorldMap {
        &self.map
    }

    pub fn player(&self, id: &str) -> Option<&Smoothed<PlayerState>> {
        self.players.get(id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Smoothed<PlayerState>> {
        self.players.values()
    }

    pub fn npc(&self, id: NpcId) -> Option<&Smoothed<NpcSnapshot>> {
        self.npcs.get(&id)
    }

    pub fn npcs(&self) -> impl Iterator<Item = &Smoothed<NpcSnapshot>> {
        self.npcs.values()
    }

    pub fn own_bullet_count(&self) -> usize {
        self.own_bullets.len()
    }

    pub fn remote_bullet_count(&self) -> usize {
        self.remote_bullets.len()
    }

    /// Closest living player or creature to the local player.
    pub fn nearest_target(&self) -> Option<Vector2> {
        let players = self
            .players
            .values()
            .filter(|p| p.state.is_alive())
            .map(|p| p.target);
        let npcs = self
            .npcs
            .values()
            .filter(|n| n.state.alive)
            .map(|n| n.target);

        players.chain(npcs).min_by(|a, b| {
            let da = a.distance_to(&self.local.position);
            let db = b.distance_to(&self.local.position);
            da.total_cmp(&db)
        })
    }

    pub fn apply_message(&mut self, envelope: &Envelope) {
        match &envelope.message {
            Message::Join(player) | Message::PlayerUpdate(player) => self.apply_player(player),
            Message::Leave { id } => {
                if self.players.remove(id).is_some() {
                    info!("{} left", id);
                }
            }
            Message::BulletSpawn(spawn) => {
                if envelope.sender != self.local.id {
                    self.remote_bullets.push(BulletState::from_spawn(
                        envelope.sender.clone(),
                        spawn,
                        now_millis(),
                    ));
                }
            }
            Message::NpcUpdate(npc) => self.apply_npc(npc),
            Message::Hit(_) | Message::Ping | Message::Pong { .. } => {}
        }
    }

    fn apply_player(&mut self, player: &PlayerState) {
        if player.id == self.local.id {
            self.reconcile_local(player);
            return;
        }

        match self.players.get_mut(&player.id) {
            Some(remote) => {
                let respawned = remote.state.dead && !player.dead;
                remote.update(player.clone(), player.position);
                if respawned {
                    remote.snap();
                }
            }
            None => {
                debug!("Tracking player {}", player.id);
                self.players
                    .insert(player.id.clone(), Smoothed::new(player.clone(), player.position));
            }
        }
    }

    fn reconcile_local(&mut self, authoritative: &PlayerState) {
        let was_dead = self.local.dead;

        self.local.health = authoritative.health;
        self.local.kills = authoritative.kills;
        self.local.ammo = authoritative.ammo;
        self.local.dead = authoritative.dead;
        self.local.death_time = authoritative.death_time;

        if self.local.dead {
            self.local.firing = false;
            self.local.reloading = false;
            if !was_dead {
                info!("Killed, waiting to respawn");
            }
        } else if was_dead {
            self.local.position = authoritative.position;
            self.local.reloading = false;
            self.last_shot = None;
            info!(
                "Respawned at ({:.0}, {:.0})",
                self.local.position.x, self.local.position.y
            );
        }
    }

    fn apply_npc(&mut self, npc: &NpcSnapshot) {
        if !npc.alive {
            if self.npcs.remove(&npc.id).is_some() {
                debug!("{:?} {} died", npc.kind, npc.id);
            }
            return;
        }

        match self.npcs.get_mut(&npc.id) {
            Some(known) => known.update(*npc, npc.position),
            None => {
                self.npcs
                    .insert(npc.id, Smoothed::new(*npc, npc.position));
            }
        }
    }

    /// Moves every remote display position one step toward its target.
    pub fn interpolate(&mut self) {
        for player in self.players.values_mut() {
            player.step(INTERPOLATION_FACTOR);
        }
        for npc in self.npcs.values_mut() {
            npc.step(INTERPOLATION_FACTOR);
        }
    }

    /// Applies one tick of input to the local player.
    pub fn apply_input(&mut self, intent: &InputIntent, now: u64) {
        self.update_weapon(now);
        self.local.firing = false;
        if self.local.dead {
            return;
        }

        self.local.angle = intent.aim_angle;
        if intent.reload {
            self.start_reload(now);
        }

        // One axis at a time so the player slides along walls.
        let step = intent.move_dir.normalize().scale(PLAYER_SPEED);
        self.try_move(Vector2::new(step.x, 0.0));
        self.try_move(Vector2::new(0.0, step.y));
    }

    fn try_move(&mut self, delta: Vector2) {
        if delta == Vector2::ZERO {
            return;
        }
        let next = self.local.position.add(&delta);
        let bounds = Rect::centered(next, PLAYER_SIZE, PLAYER_SIZE);
        let inside = bounds.x >= 0.0
            && bounds.y >= 0.0
            && bounds.x + bounds.width <= self.map.width
            && bounds.y + bounds.height <= self.map.height;
        if inside && !self.map.hits_obstacle(&bounds) {
            self.local.position = next;
        }
    }

    /// Fires one bullet if the weapon allows it, returning the spawn to send.
    pub fn fire(&mut self, now: u64) -> Option<BulletSpawn> {
        self.update_weapon(now);
        if self.local.dead || self.local.reloading || !self.local.has_weapon {
            return None;
        }
        if self.local.ammo == 0 {
            self.start_reload(now);
            return None;
        }
        if let Some(last) = self.last_shot {
            if now.saturating_sub(last) < SHOOT_DELAY_MS {
                return None;
            }
        }

        self.local.ammo -= 1;
        self.local.firing = true;
        self.last_shot = Some(now);

        let spawn = BulletSpawn {
            bullet_id: self.next_bullet_id,
            origin: self.local.position,
            angle: self.local.angle,
        };
        self.next_bullet_id += 1;
        self.own_bullets
            .push(BulletState::from_spawn(self.local.id.clone(), &spawn, now));
        Some(spawn)
    }

    fn start_reload(&mut self, now: u64) {
        if !self.local.reloading && self.local.ammo < MAX_AMMO {
            self.local.reloading = true;
            self.reload_started = now;
        }
    }

    fn update_weapon(&mut self, now: u64) {
        if self.local.reloading && now.saturating_sub(self.reload_started) >= RELOAD_TIME_MS {
            self.local.reloading = false;
            self.local.ammo = MAX_AMMO;
        }
    }

    /// Advances every bullet one tick. Our own bullets that strike a living
    /// remote player are removed and returned as hits to report; bullets
    /// fired by others are only simulated for display.
    pub fn step_bullets(&mut self) -> Vec<HitReport> {
        let map = &self.map;
        let players = &self.players;
        let mut hits = Vec::new();

        self.own_bullets.retain_mut(|bullet| {
            if bullet.advance(map).is_removed() {
                return false;
            }
            let targets = players
                .values()
                .filter(|p| p.state.is_alive())
                .map(|p| (p.state.id.clone(), p.state.bounds()));
            match first_hit(&bullet.bounds(), targets) {
                Some(victim) => {
                    hits.push(HitReport::player(victim, BULLET_DAMAGE));
                    false
                }
                None => true,
            }
        });

        let local_bounds = self.local.is_alive().then(|| self.local.bounds());
        self.remote_bullets.retain_mut(|bullet| {
            if bullet.advance(map).is_removed() {
                return false;
            }
            let bounds = bullet.bounds();
            let struck_local = local_bounds.map_or(false, |b| b.intersects(&bounds));
            let struck_remote = players.values().any(|p| {
                p.state.id != bullet.owner
                    && p.state.is_alive()
                    && p.state.bounds().intersects(&bounds)
            });
            !(struck_local || struck_remote)
        });

        hits
    }

    pub fn join_message(&self) -> Message {
        Message::Join(self.local.clone())
    }

    pub fn local_update_message(&self, now: u64) -> Message {
        let mut state = self.local.clone();
        state.last_update = now;
        Message::PlayerUpdate(state)
    }
}
