use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;

use crate::state::{
    fanout::ConnectionId,
    game::{PlayerId, SessionId},
};

/// Seat a connection currently speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Session the connection joined.
    pub session_id: SessionId,
    /// Player identity inside that session.
    pub player_id: PlayerId,
}

/// Tracks which connection owns which seat, plus pending grace-period departures.
///
/// A player has at most one owning connection: binding a new one evicts the old
/// binding, so a later close of the stale socket is ignored.
pub struct PresenceTracker {
    bindings: DashMap<ConnectionId, Binding>,
    owners: DashMap<PlayerId, ConnectionId>,
    departures: DashMap<PlayerId, AbortHandle>,
    grace: Duration,
}

impl PresenceTracker {
    /// Create a tracker applying `grace` before a dropped player is removed.
    pub fn new(grace: Duration) -> Self {
        Self {
            bindings: DashMap::new(),
            owners: DashMap::new(),
            departures: DashMap::new(),
            grace,
        }
    }

    /// How long a dropped player keeps their seat.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Bind `connection_id` to a seat. Returns the connection it replaced, if any.
    pub fn bind(&self, connection_id: ConnectionId, binding: Binding) -> Option<ConnectionId> {
        self.cancel_departure(&binding.player_id);
        let previous = self
            .owners
            .insert(binding.player_id, connection_id)
            .filter(|previous| *previous != connection_id);
        if let Some(previous) = previous {
            self.bindings.remove(&previous);
        }
        self.bindings.insert(connection_id, binding);
        previous
    }

    /// Seat currently owned by `connection_id`.
    pub fn binding(&self, connection_id: &ConnectionId) -> Option<Binding> {
        self.bindings.get(connection_id).map(|entry| *entry)
    }

    /// Release whatever `connection_id` owned. `None` if it owned nothing (or was evicted).
    pub fn unbind(&self, connection_id: &ConnectionId) -> Option<Binding> {
        let (_, binding) = self.bindings.remove(connection_id)?;
        self.owners
            .remove_if(&binding.player_id, |_, owner| owner == connection_id);
        Some(binding)
    }

    /// Remember a pending departure task, aborting any earlier one for the player.
    pub fn schedule_departure(&self, player_id: PlayerId, handle: AbortHandle) {
        if let Some(previous) = self.departures.insert(player_id, handle) {
            previous.abort();
        }
    }

    /// Abort the pending departure of `player_id`. Returns whether one was pending.
    pub fn cancel_departure(&self, player_id: &PlayerId) -> bool {
        match self.departures.remove(player_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forget the departure entry once its task ran to completion.
    pub fn finish_departure(&self, player_id: &PlayerId) {
        self.departures.remove(player_id);
    }

    /// Number of connections bound to a seat.
    pub fn bound_connections(&self) -> usize {
        self.bindings.len()
    }
}
