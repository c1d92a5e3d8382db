use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use snaphunt_common::protocol::{ClientMessage, ParticipantInfo};
use snaphunt_common::room::Role;
use uuid::Uuid;

/// Joined participants keyed by user id, in the order the server listed them.
pub type Roster = IndexMap<Uuid, ParticipantInfo>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("only the organizer can remove participants")]
    NotOrganizer,
    #[error("participant {0} is not in the room")]
    UnknownParticipant(Uuid),
}

/// Live roster of the waiting room. Only a server snapshot changes membership; a removal
/// request is sent and then waits for the next snapshot like everyone else.
#[derive(Debug)]
pub struct RosterSynchronizer {
    role: Role,
    roster: Arc<Roster>,
    pending_removals: Arc<HashSet<Uuid>>,
    snapshots: u64,
}

impl RosterSynchronizer {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            roster: Arc::new(Roster::new()),
            pending_removals: Arc::new(HashSet::new()),
            snapshots: 0,
        }
    }

    /// Replace the whole roster with `snapshot`.
    pub fn on_update(&mut self, snapshot: Vec<ParticipantInfo>) {
        let roster: Roster = snapshot.into_iter().map(|p| (p.user_id, p)).collect();
        self.snapshots += 1;
        tracing::debug!(
            participants = roster.len(),
            previous = self.len(),
            snapshot = self.snapshots,
            "roster replaced"
        );
        self.roster = Arc::new(roster);
        self.pending_removals = Arc::new(HashSet::new());
    }

    pub fn request_removal(&mut self, user_id: Uuid) -> Result<ClientMessage, RosterError> {
        if !self.role.is_organizer() {
            return Err(RosterError::NotOrganizer);
        }
        if !self.roster.contains_key(&user_id) {
            return Err(RosterError::UnknownParticipant(user_id));
        }
        let mut pending = (*self.pending_removals).clone();
        pending.insert(user_id);
        self.pending_removals = Arc::new(pending);
        tracing::info!(%user_id, "removal requested");
        Ok(ClientMessage::RemoveParticipant { user_id })
    }

    pub fn roster(&self) -> Arc<Roster> {
        self.roster.clone()
    }

    pub fn pending_removals(&self) -> Arc<HashSet<Uuid>> {
        self.pending_removals.clone()
    }

    pub fn is_removal_pending(&self, user_id: &Uuid) -> bool {
        self.pending_removals.contains(user_id)
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    /// Drop the "removal requested" mark of a request that never reached the server.
    pub fn cancel_removal(&mut self, user_id: Uuid) {
        if !self.is_removal_pending(&user_id) {
            return;
        }
        let mut pending = (*self.pending_removals).clone();
        pending.remove(&user_id);
        self.pending_removals = Arc::new(pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(name: &str) -> ParticipantInfo {
        ParticipantInfo {
            user_id: Uuid::new_v4(),
            display_name: name.into(),
            avatar_index: 0,
        }
    }

    #[test]
    fn test_snapshot_fully_replaces() {
        let mut sync = RosterSynchronizer::new(Role::Organizer);
        let alice = participant("Alice");
        let bob = participant("Bob");
        let carol = participant("Carol");

        sync.on_update(vec![alice.clone(), bob.clone()]);
        assert_eq!(sync.len(), 2);

        sync.on_update(vec![carol.clone()]);
        let roster = sync.roster();
        assert_eq!(roster.len(), 1);
        assert!(!roster.contains_key(&alice.user_id));
        assert!(!roster.contains_key(&bob.user_id));
        assert_eq!(roster.get(&carol.user_id), Some(&carol));

        sync.on_update(Vec::new());
        assert_eq!(sync.len(), 0);
    }

    #[test]
    fn test_held_roster_does_not_change_underfoot() {
        let mut sync = RosterSynchronizer::new(Role::Organizer);
        sync.on_update(vec![participant("Alice")]);
        let held = sync.roster();
        sync.on_update(vec![participant("Bob"), participant("Carol")]);
        assert_eq!(held.len(), 1);
        assert_eq!(sync.len(), 2);
    }

    #[test]
    fn test_removal_waits_for_snapshot() {
        let mut sync = RosterSynchronizer::new(Role::Organizer);
        let alice = participant("Alice");
        let bob = participant("Bob");
        sync.on_update(vec![alice.clone(), bob.clone()]);

        let cmd = sync.request_removal(alice.user_id).unwrap();
        assert_eq!(cmd, ClientMessage::RemoveParticipant { user_id: alice.user_id });
        // still listed until the server says otherwise
        assert!(sync.roster().contains_key(&alice.user_id));
        assert!(sync.is_removal_pending(&alice.user_id));

        sync.on_update(vec![bob]);
        assert!(!sync.roster().contains_key(&alice.user_id));
        assert!(!sync.is_removal_pending(&alice.user_id));
    }

    #[test]
    fn test_refused_removal_leaves_participant() {
        let mut sync = RosterSynchronizer::new(Role::Organizer);
        let alice = participant("Alice");
        sync.on_update(vec![alice.clone()]);
        sync.request_removal(alice.user_id).unwrap();

        // server refused: the next snapshot still lists Alice
        sync.on_update(vec![alice.clone()]);
        assert!(sync.roster().contains_key(&alice.user_id));
        assert!(sync.pending_removals().is_empty());
    }

    #[test]
    fn test_cancelled_removal_clears_mark() {
        let mut sync = RosterSynchronizer::new(Role::Organizer);
        let alice = participant("Alice");
        sync.on_update(vec![alice.clone()]);
        sync.request_removal(alice.user_id).unwrap();

        sync.cancel_removal(alice.user_id);
        assert!(!sync.is_removal_pending(&alice.user_id));
        assert!(sync.roster().contains_key(&alice.user_id));
    }

    #[test]
    fn test_participants_cannot_remove() {
        let mut sync = RosterSynchronizer::new(Role::Participant {
            user_id: Uuid::new_v4(),
        });
        let alice = participant("Alice");
        sync.on_update(vec![alice.clone()]);
        assert_eq!(sync.request_removal(alice.user_id), Err(RosterError::NotOrganizer));
    }

    #[test]
    fn test_unknown_participant() {
        let mut sync = RosterSynchronizer::new(Role::Organizer);
        let stranger = Uuid::new_v4();
        assert_eq!(
            sync.request_removal(stranger),
            Err(RosterError::UnknownParticipant(stranger))
        );
    }
}
