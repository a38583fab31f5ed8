//! Runtime configuration for the server.

use crate::npc::NpcTuning;
use shared::{
    default_player_zones, NpcKind, SpawnZone, WorldMap, DEFAULT_PORT, RESPAWN_DELAY_MS, TICK_RATE,
};
use std::time::Duration;

/// Population settings for one creature kind.
#[derive(Debug, Clone)]
pub struct CreatureConfig {
    pub tuning: NpcTuning,
    /// Home zones; each zone's `max_count` is its quota.
    pub zones: Vec<SpawnZone>,
    pub respawn_ticks: u32,
    /// Cap on living creatures of this kind across all zones.
    pub max_total: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tick_rate: u32,
    pub respawn_delay: Duration,
    /// Capacity of each session's outbound queue.
    pub queue_capacity: usize,
    pub ping_interval: Duration,
    /// A session with no inbound frame for this long is closed.
    pub idle_timeout: Duration,
    /// Creature snapshots are broadcast every this many ticks.
    pub npc_broadcast_interval: u32,
    pub map: WorldMap,
    pub player_spawn_zones: Vec<SpawnZone>,
    pub creatures: Vec<CreatureConfig>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn creature(&self, kind: NpcKind) -> Option<&CreatureConfig> {
        self.creatures.iter().find(|c| c.tuning.kind == kind)
    }

    /// Same world without any creatures.
    pub fn without_creatures(mut self) -> Self {
        self.creatures.clear();
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tick_rate: TICK_RATE,
            respawn_delay: Duration::from_millis(RESPAWN_DELAY_MS),
            queue_capacity: 256,
            ping_interval: Duration::from_millis(1000),
            idle_timeout: Duration::from_millis(10_000),
            npc_broadcast_interval: 3,
            map: WorldMap::default_arena(),
            player_spawn_zones: default_player_zones(),
            creatures: vec![
                CreatureConfig {
                    tuning: NpcTuning::grazer(),
                    zones: vec![
                        SpawnZone::new(1000.0, 1200.0, 200.0, 3),
                        SpawnZone::new(1500.0, 600.0, 180.0, 2),
                        SpawnZone::new(800.0, 1800.0, 160.0, 2),
                        SpawnZone::new(2524.0, 2023.0, 120.0, 1),
                    ],
                    respawn_ticks: 300,
                    max_total: 8,
                },
                CreatureConfig {
                    tuning: NpcTuning::chaser(),
                    zones: vec![
                        SpawnZone::new(2200.0, 800.0, 250.0, 3),
                        SpawnZone::new(1200.0, 2600.0, 220.0, 2),
                    ],
                    respawn_ticks: 600,
                    max_total: 5,
                },
                CreatureConfig {
                    tuning: NpcTuning::flyer(),
                    zones: vec![
                        SpawnZone::new(2700.0, 1400.0, 300.0, 2),
                        SpawnZone::new(600.0, 800.0, 250.0, 2),
                    ],
                    respawn_ticks: 600,
                    max_total: 4,
                },
            ],
        }
    }
}
