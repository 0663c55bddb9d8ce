use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use hashbrown::HashSet;
use hubsock::{HubEvent, Notification, NotificationId};
use tracing::{debug, info, warn};

use crate::api::{ApiPromise, ApiResult, NotificationApi};
use crate::{ApiError, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadScope {
    All,
    UnreadOnly,
}

/// Operations the store sends to the REST service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    Load(LoadScope),
    RefreshUnreadCount,
    MarkRead(NotificationId),
    MarkAllRead,
    Delete(NotificationId),
}

/// How a command ended. Failures leave the store untouched and can be
/// retried with [`NotificationStore::retry`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub command: StoreCommand,
    pub result: Result<(), ApiError>,
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationView {
    pub notifications: Vec<Notification>,
    pub unread_count: u32,
    pub is_loading: bool,
    pub is_connected: bool,
}

enum InFlight {
    Load {
        scope: LoadScope,
        generation: u64,
        promise: ApiPromise<Vec<Notification>>,
    },
    UnreadCount(ApiPromise<i64>),
    Mutation {
        command: StoreCommand,
        promise: ApiPromise<()>,
    },
}

/// Local notification list and unread counter for one user.
///
/// Fed by REST loads, hub pushes and acknowledged user commands. Mutations
/// are only applied once the server said yes.
pub struct NotificationStore {
    user: UserId,
    /// newest first
    notifications: Vec<Notification>,
    ids: HashSet<NotificationId>,
    unread_count: u32,

    load_generation: u64,
    in_flight: Vec<InFlight>,
    events: Option<Receiver<HubEvent>>,
}

impl NotificationStore {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            notifications: Vec::new(),
            ids: HashSet::new(),
            unread_count: 0,
            load_generation: 0,
            in_flight: Vec::new(),
            events: None,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.notifications.iter().find(|n| &n.id == id)
    }

    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    /// True while the latest list load has not come back.
    pub fn is_loading(&self) -> bool {
        self.in_flight.iter().any(|req| {
            matches!(req, InFlight::Load { generation, .. } if *generation == self.load_generation)
        })
    }

    pub fn view(&self, is_connected: bool) -> NotificationView {
        NotificationView {
            notifications: self.notifications.clone(),
            unread_count: self.unread_count,
            is_loading: self.is_loading(),
            is_connected,
        }
    }

    /// Where forwarded hub events arrive, see [`crate::HubBinding`].
    pub fn set_event_source(&mut self, events: Option<Receiver<HubEvent>>) {
        self.events = events;
    }

    pub fn load_all(&mut self, api: &impl NotificationApi) {
        self.load(api, LoadScope::All)
    }

    pub fn load_unread_only(&mut self, api: &impl NotificationApi) {
        self.load(api, LoadScope::UnreadOnly)
    }

    /// Start a replacing load. A load started later wins over this one.
    pub fn load(&mut self, api: &impl NotificationApi, scope: LoadScope) {
        self.load_generation += 1;
        let promise = match scope {
            LoadScope::All => api.list_all(&self.user),
            LoadScope::UnreadOnly => api.list_unread(&self.user),
        };
        self.in_flight.push(InFlight::Load {
            scope,
            generation: self.load_generation,
            promise,
        });
    }

    pub fn refresh_unread_count(&mut self, api: &impl NotificationApi) {
        self.in_flight
            .push(InFlight::UnreadCount(api.unread_count(&self.user)));
    }

    pub fn mark_as_read(&mut self, api: &impl NotificationApi, id: NotificationId) {
        self.issue(api, StoreCommand::MarkRead(id))
    }

    pub fn mark_all_as_read(&mut self, api: &impl NotificationApi) {
        self.issue(api, StoreCommand::MarkAllRead)
    }

    pub fn delete(&mut self, api: &impl NotificationApi, id: NotificationId) {
        self.issue(api, StoreCommand::Delete(id))
    }

    /// Send a command again, typically one whose outcome was a failure.
    pub fn retry(&mut self, api: &impl NotificationApi, command: StoreCommand) {
        match command {
            StoreCommand::Load(scope) => self.load(api, scope),
            StoreCommand::RefreshUnreadCount => self.refresh_unread_count(api),
            command => self.issue(api, command),
        }
    }

    fn issue(&mut self, api: &impl NotificationApi, command: StoreCommand) {
        let promise = match &command {
            StoreCommand::MarkRead(id) => api.mark_read(id),
            StoreCommand::MarkAllRead => api.mark_all_read(&self.user),
            StoreCommand::Delete(id) => api.delete(id),
            StoreCommand::Load(_) | StoreCommand::RefreshUnreadCount => return,
        };
        self.in_flight.push(InFlight::Mutation { command, promise });
    }

    /// Apply forwarded hub events and finished requests.
    #[profiling::function]
    pub fn poll(&mut self) -> Vec<CommandOutcome> {
        let events: Vec<HubEvent> = self
            .events
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default();
        for ev in events {
            self.apply_event(ev);
        }

        let mut outcomes = Vec::new();
        for req in std::mem::take(&mut self.in_flight) {
            match req {
                InFlight::Load {
                    scope,
                    generation,
                    promise,
                } => match promise.try_take() {
                    Ok(result) => {
                        if let Some(outcome) = self.finish_load(scope, generation, result) {
                            outcomes.push(outcome);
                        }
                    }
                    Err(promise) => self.in_flight.push(InFlight::Load {
                        scope,
                        generation,
                        promise,
                    }),
                },

                InFlight::UnreadCount(promise) => match promise.try_take() {
                    Ok(result) => outcomes.push(self.finish_unread_count(result)),
                    Err(promise) => self.in_flight.push(InFlight::UnreadCount(promise)),
                },

                InFlight::Mutation { command, promise } => match promise.try_take() {
                    Ok(result) => outcomes.push(self.finish_mutation(command, result)),
                    Err(promise) => self.in_flight.push(InFlight::Mutation { command, promise }),
                },
            }
        }

        outcomes
    }

    pub fn apply_event(&mut self, ev: HubEvent) {
        match ev {
            HubEvent::NotificationReceived(n) => {
                self.apply_received(n);
            }
            HubEvent::UnreadCountUpdated(count) => self.apply_unread_count_updated(count),
            HubEvent::NotificationRead(id) => {
                self.apply_read(&id);
            }
        }
    }

    /// Insert a pushed notification at the head. Returns false for ids we
    /// already have.
    pub fn apply_received(&mut self, n: Notification) -> bool {
        if self.ids.contains(&n.id) {
            debug!("notification {} already known", n.id);
            return false;
        }

        if !n.is_read {
            self.unread_count = self.unread_count.saturating_add(1);
        }
        self.ids.insert(n.id.clone());
        self.notifications.insert(0, n);
        true
    }

    /// The server's count wins over whatever we computed.
    pub fn apply_unread_count_updated(&mut self, count: u32) {
        if count != self.unread_count {
            debug!("unread count {} -> {count} (server)", self.unread_count);
        }
        self.unread_count = count;
    }

    /// Someone marked `id` read. Unknown ids are ignored.
    pub fn apply_read(&mut self, id: &NotificationId) -> bool {
        let found = self.mark_read_local(id, Utc::now());
        if found {
            self.recompute_unread();
        }
        found
    }

    fn finish_load(
        &mut self,
        scope: LoadScope,
        generation: u64,
        result: ApiResult<Vec<Notification>>,
    ) -> Option<CommandOutcome> {
        if generation != self.load_generation {
            debug!("discarding stale {scope:?} load #{generation}");
            return None;
        }

        let result = result.map(|mut list| {
            list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let mut ids = HashSet::with_capacity(list.len());
            list.retain(|n| ids.insert(n.id.clone()));

            info!("loaded {} notifications ({scope:?})", list.len());
            self.notifications = list;
            self.ids = ids;
            self.recompute_unread();
        });

        if let Err(err) = &result {
            warn!("loading notifications failed: {err}");
        }

        Some(CommandOutcome {
            command: StoreCommand::Load(scope),
            result,
        })
    }

    fn finish_unread_count(&mut self, result: ApiResult<i64>) -> CommandOutcome {
        let result = result.map(|count| {
            let count = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
            self.apply_unread_count_updated(count);
        });

        if let Err(err) = &result {
            warn!("fetching unread count failed: {err}");
        }

        CommandOutcome {
            command: StoreCommand::RefreshUnreadCount,
            result,
        }
    }

    fn finish_mutation(&mut self, command: StoreCommand, result: ApiResult<()>) -> CommandOutcome {
        match &result {
            Ok(()) => self.apply_acknowledged(&command),
            Err(err) => warn!("{command:?} failed, nothing applied: {err}"),
        }

        CommandOutcome { command, result }
    }

    fn apply_acknowledged(&mut self, command: &StoreCommand) {
        let now = Utc::now();
        match command {
            StoreCommand::MarkRead(id) => {
                if !self.ids.contains(id) {
                    debug!("{id} acknowledged as read but no longer cached");
                }
                self.mark_read_local(id, now);
            }
            StoreCommand::MarkAllRead => {
                for n in &mut self.notifications {
                    n.mark_read(now);
                }
            }
            StoreCommand::Delete(id) => {
                if self.ids.remove(id) {
                    self.notifications.retain(|n| &n.id != id);
                } else {
                    debug!("{id} deleted but no longer cached");
                }
            }
            StoreCommand::Load(_) | StoreCommand::RefreshUnreadCount => return,
        }

        self.recompute_unread();
    }

    fn mark_read_local(&mut self, id: &NotificationId, at: DateTime<Utc>) -> bool {
        match self.notifications.iter_mut().find(|n| &n.id == id) {
            Some(n) => {
                n.mark_read(at);
                true
            }
            None => false,
        }
    }

    fn recompute_unread(&mut self) {
        let unread = self.notifications.iter().filter(|n| !n.is_read).count();
        self.unread_count = u32::try_from(unread).unwrap_or(u32::MAX);
    }
}
