use std::time::{Duration, Instant};

use hubsock::{CommandHandle, HubConnection, HubTransport};
use tracing::{debug, info, warn};

use crate::UserId;

/// Wait before asking again after the user group join was refused.
const JOIN_RETRY: Duration = Duration::from_secs(5);

struct ActiveHub<T: HubTransport> {
    user: UserId,
    hub: HubConnection<T>,
    /// connection the user group join was last requested on
    joined_on: Option<String>,
    join: Option<CommandHandle>,
    join_retry_at: Option<Instant>,
}

/// Owner of the one hub connection of the signed in user.
///
/// Switching users fully stops the old connection before a new one is
/// created; connections are never carried over to another identity.
pub struct HubManager<T: HubTransport> {
    active: Option<ActiveHub<T>>,
}

impl<T: HubTransport> Default for HubManager<T> {
    fn default() -> Self {
        Self { active: None }
    }
}

impl<T: HubTransport> HubManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `user` the active identity. `make` builds the connection when
    /// there is none for this user yet. The connection is started either way.
    pub fn sign_in(
        &mut self,
        user: UserId,
        make: impl FnOnce(&UserId) -> HubConnection<T>,
    ) -> &mut HubConnection<T> {
        let active = match self.active.take() {
            Some(active) if active.user == user => active,
            previous => {
                if let Some(mut previous) = previous {
                    info!("switching hub connection from user {} to {user}", previous.user);
                    previous.hub.stop();
                }
                info!("creating hub connection for user {user}");
                let hub = make(&user);
                ActiveHub {
                    user,
                    hub,
                    joined_on: None,
                    join: None,
                    join_retry_at: None,
                }
            }
        };

        let active = self.active.insert(active);
        active.hub.start();
        &mut active.hub
    }

    pub fn sign_out(&mut self) {
        if let Some(mut active) = self.active.take() {
            info!("stopping hub connection for user {}", active.user);
            active.hub.stop();
        }
    }

    pub fn current(&mut self) -> Option<&mut HubConnection<T>> {
        self.active.as_mut().map(|a| &mut a.hub)
    }

    pub fn current_user(&self) -> Option<&UserId> {
        self.active.as_ref().map(|a| &a.user)
    }

    pub fn is_connected(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.hub.is_connected())
    }

    /// Drive the active connection. Returns true when a new connection came
    /// up during this poll, which is the cue to resync from REST.
    pub fn poll(&mut self) -> bool {
        self.poll_at(Instant::now())
    }

    #[profiling::function]
    pub fn poll_at(&mut self, now: Instant) -> bool {
        let Some(active) = &mut self.active else {
            return false;
        };

        active.hub.poll_at(now);

        if let Some(join) = active.join.take() {
            match join.try_take() {
                Ok(Ok(_)) => debug!("joined {}", active.user.group_name()),
                Ok(Err(err)) => {
                    warn!(
                        "joining {} failed: {err}, retrying in {:?}",
                        active.user.group_name(),
                        JOIN_RETRY
                    );
                    active.join_retry_at = Some(now + JOIN_RETRY);
                }
                Err(join) => active.join = Some(join),
            }
        }

        let Some(connection_id) = active.hub.connection_id() else {
            return false;
        };

        let new_connection = active.joined_on.as_deref() != Some(connection_id);
        if new_connection {
            active.joined_on = Some(connection_id.to_owned());
            active.join_retry_at = None;
        } else {
            match active.join_retry_at {
                Some(at) if now >= at => active.join_retry_at = None,
                _ => return false,
            }
        }

        // after a reconnect the hub replays the group itself
        let group = active.user.group_name();
        if !active.hub.joined_groups().contains(&group) {
            match active.hub.join_group(&group) {
                Ok(handle) => active.join = Some(handle),
                Err(err) => {
                    warn!("could not join {group}: {err}");
                    active.join_retry_at = Some(now + JOIN_RETRY);
                }
            }
        }

        new_connection
    }
}

impl<T: HubTransport> Drop for HubManager<T> {
    fn drop(&mut self) {
        self.sign_out();
    }
}
