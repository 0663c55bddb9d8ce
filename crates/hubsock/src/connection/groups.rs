use std::collections::BTreeSet;

use hashbrown::HashMap;

/// Desired group membership of a hub connection.
///
/// `joined` survives transport drops on purpose: after a reconnect the server
/// has forgotten us, and this set is what gets replayed. Only an explicit
/// stop clears it.
#[derive(Default, Debug)]
pub struct GroupTracker {
    joined: BTreeSet<String>,
    /// invocation id -> group of joins waiting for their completion
    pending_joins: HashMap<String, String>,
}

impl GroupTracker {
    pub fn joined(&self) -> &BTreeSet<String> {
        &self.joined
    }

    pub fn contains(&self, group: &str) -> bool {
        self.joined.contains(group)
    }

    /// Groups to rejoin after a reconnect, in a stable order.
    pub fn replay_list(&self) -> Vec<String> {
        self.joined.iter().cloned().collect()
    }

    pub fn join_requested(&mut self, invocation_id: String, group: String) {
        self.pending_joins.insert(invocation_id, group);
    }

    /// A join completed. Returns the group it was for, if it was a join.
    pub fn join_completed(&mut self, invocation_id: &str, ok: bool) -> Option<String> {
        let group = self.pending_joins.remove(invocation_id)?;
        if ok {
            self.joined.insert(group.clone());
        }
        Some(group)
    }

    pub fn remove(&mut self, group: &str) -> bool {
        self.pending_joins.retain(|_, g| g != group);
        self.joined.remove(group)
    }

    /// In-flight joins are lost with the connection they were sent on.
    pub fn connection_lost(&mut self) {
        self.pending_joins.clear();
    }

    pub fn clear(&mut self) {
        self.joined.clear();
        self.pending_joins.clear();
    }
}
