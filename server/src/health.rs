//! Periodic connection health sweep.
//!
//! Pings every joined session, drops registry entries whose send loop has
//! already gone away and logs per-session counters. A missing PONG never
//! closes a session on its own.

use crate::broadcast::BroadcastEngine;
use log::{debug, info};
use shared::{now_millis, Envelope, Message};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};

/// Runs one sweep and returns how many stale sessions were removed.
pub fn sweep(engine: &BroadcastEngine) -> usize {
    let now = now_millis();
    let mut removed = 0;

    for (identity, handle) in engine.registry().handles() {
        if handle.is_closed() {
            if engine.handle_leave(&identity, handle.id()) {
                info!("Removed stale session {} for {}", handle.id(), identity);
                removed += 1;
            }
            continue;
        }

        handle.metrics().record_ping_sent(now);
        handle.enqueue(Envelope::from_server(Message::Ping));

        let stats = handle.metrics().stats();
        debug!(
            "{}: sent {} recv {} dropped {} ({} critical) rejected {} seq-violations {} rtt {}ms",
            identity,
            stats.frames_sent,
            stats.frames_received,
            stats.frames_dropped,
            stats.critical_dropped,
            stats.messages_rejected,
            stats.sequence_violations,
            stats.last_rtt_ms
        );
    }

    removed
}

pub async fn run_health_sweep(engine: Arc<BroadcastEngine>) {
    let mut ticker = interval(engine.config().ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep(&engine);
        debug!(
            "{} sessions open, {} players, {} ticks simulated",
            engine.metrics().open_sessions(),
            engine.world().player_count(),
            engine.metrics().ticks()
        );
    }
}
