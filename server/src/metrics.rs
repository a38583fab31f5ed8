//! Lock-free counters read by the health sweep.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SessionMetrics {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    /// Outbound messages dropped because the queue was full.
    frames_dropped: AtomicU64,
    /// Dropped messages of a kind that is not superseded by a later one.
    critical_dropped: AtomicU64,
    messages_rejected: AtomicU64,
    sequence_violations: AtomicU64,
    last_ping_sent: AtomicU64,
    last_rtt_ms: AtomicU64,
}

/// Point-in-time copy of [`SessionMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub critical_dropped: u64,
    pub messages_rejected: u64,
    pub sequence_violations: u64,
    pub last_rtt_ms: u64,
}

impl SessionMetrics {
    pub fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, critical: bool) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
        if critical {
            self.critical_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sequence_violation(&self) {
        self.sequence_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ping_sent(&self, now: u64) {
        self.last_ping_sent.store(now, Ordering::Relaxed);
    }

    /// Derives the round trip from the most recent ping.
    pub fn record_pong(&self, now: u64) {
        let sent = self.last_ping_sent.load(Ordering::Relaxed);
        if sent > 0 && now >= sent {
            self.last_rtt_ms.store(now - sent, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            critical_dropped: self.critical_dropped.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            sequence_violations: self.sequence_violations.load(Ordering::Relaxed),
            last_rtt_ms: self.last_rtt_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
pub struct ServerMetrics {
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    joins_rejected: AtomicU64,
    ticks: AtomicU64,
}

impl ServerMetrics {
    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn join_rejected(&self) {
        self.joins_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn open_sessions(&self) -> u64 {
        self.sessions_opened
            .load(Ordering::Relaxed)
            .saturating_sub(self.sessions_closed.load(Ordering::Relaxed))
    }

    pub fn joins_rejected(&self) -> u64 {
        self.joins_rejected.load(Ordering::Relaxed)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}
