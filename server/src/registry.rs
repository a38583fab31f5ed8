//! Joined sessions, keyed by player identity.
//!
//! A session is registered once its JOIN is accepted and removed when it
//! leaves or its transport fails. All fan-out goes through here and never
//! waits on a slow client: each send is a non-blocking enqueue.

use crate::session::{EnqueueResult, SessionHandle, SessionId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use shared::{Envelope, Identity};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Identity, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `identity` with `handle`. Returns false if the identity is
    /// already held by another live session.
    pub fn register(&self, identity: &str, handle: SessionHandle) -> bool {
        match self.sessions.entry(identity.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                info!("Registered {} on session {} ({})", identity, handle.id(), handle.addr());
                slot.insert(handle);
                true
            }
        }
    }

    /// Removes `identity` if it still belongs to `session`.
    pub fn unregister(&self, identity: &str, session: SessionId) -> bool {
        let removed = self
            .sessions
            .remove_if(identity, |_, handle| handle.id() == session)
            .is_some();
        if removed {
            info!("Unregistered {} from session {}", identity, session);
        }
        removed
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.sessions.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn handles(&self) -> Vec<(Identity, SessionHandle)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn send_to(&self, identity: &str, envelope: Envelope) -> EnqueueResult {
        // Clone the handle so no shard lock is held while enqueueing.
        let handle = self.sessions.get(identity).map(|entry| entry.value().clone());
        match handle {
            Some(handle) => handle.enqueue(envelope),
            None => {
                debug!("send_to unknown identity {}", identity);
                EnqueueResult::Closed
            }
        }
    }

    /// Sends `envelope` to every registered session.
    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        self.fan_out(envelope, None)
    }

    /// Sends `envelope` to every registered session except `exclude`.
    pub fn broadcast_except(&self, exclude: &str, envelope: &Envelope) -> usize {
        self.fan_out(envelope, Some(exclude))
    }

    fn fan_out(&self, envelope: &Envelope, exclude: Option<&str>) -> usize {
        let targets: Vec<SessionHandle> = self
            .sessions
            .iter()
            .filter(|entry| Some(entry.key().as_str()) != exclude)
            .map(|entry| entry.value().clone())
            .collect();

        targets
            .iter()
            .filter(|handle| handle.enqueue(envelope.clone()) == EnqueueResult::Queued)
            .count()
    }
}
