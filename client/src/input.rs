//! Input intents and the scripted source that drives the headless client.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Vector2, BULLET_RANGE};
use std::f32::consts::TAU;

/// What the local player wants to do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputIntent {
    /// Desired direction of travel; zero to stand still.
    pub move_dir: Vector2,
    pub aim_angle: f32,
    pub fire: bool,
    pub reload: bool,
}

/// Wanders in a random heading that changes every few seconds, and shoots at
/// the given target when it is in range.
#[derive(Debug)]
pub struct ScriptedInput {
    rng: StdRng,
    heading: f32,
    ticks_until_turn: u32,
    tick: u64,
    fire_interval: u64,
}

impl ScriptedInput {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            heading: 0.0,
            ticks_until_turn: 0,
            tick: 0,
            fire_interval: 15,
        }
    }

    pub fn with_fire_interval(mut self, ticks: u64) -> Self {
        self.fire_interval = ticks.max(1);
        self
    }

    pub fn next_intent(&mut self, position: Vector2, target: Option<Vector2>) -> InputIntent {
        self.tick += 1;

        if self.ticks_until_turn == 0 {
            self.heading = self.rng.gen_range(0.0..TAU);
            self.ticks_until_turn = self.rng.gen_range(60..180);
        }
        self.ticks_until_turn -= 1;

        let in_range = target.filter(|t| t.distance_to(&position) <= BULLET_RANGE);
        let aim_angle = match in_range {
            Some(target) => target.sub(&position).angle(),
            None => self.heading,
        };

        InputIntent {
            move_dir: Vector2::from_angle(self.heading),
            aim_angle,
            fire: in_range.is_some() && self.tick % self.fire_interval == 0,
            reload: false,
        }
    }
}
