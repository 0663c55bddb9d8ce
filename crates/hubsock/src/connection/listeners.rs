use serde_json::Value;

use crate::protocol::{NOTIFICATION_READ, RECEIVE_NOTIFICATION, UPDATE_UNREAD_COUNT};
use crate::{HubError, Notification, NotificationId, Result};

/// Events pushed by the server that the app can listen for.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    NotificationReceived(Notification),
    UnreadCountUpdated(u32),
    NotificationRead(NotificationId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubEventKind {
    NotificationReceived,
    UnreadCountUpdated,
    NotificationRead,
}

impl HubEventKind {
    pub const ALL: [HubEventKind; 3] = [
        HubEventKind::NotificationReceived,
        HubEventKind::UnreadCountUpdated,
        HubEventKind::NotificationRead,
    ];

    pub fn target(&self) -> &'static str {
        match self {
            HubEventKind::NotificationReceived => RECEIVE_NOTIFICATION,
            HubEventKind::UnreadCountUpdated => UPDATE_UNREAD_COUNT,
            HubEventKind::NotificationRead => NOTIFICATION_READ,
        }
    }
}

impl HubEvent {
    pub fn kind(&self) -> HubEventKind {
        match self {
            HubEvent::NotificationReceived(_) => HubEventKind::NotificationReceived,
            HubEvent::UnreadCountUpdated(_) => HubEventKind::UnreadCountUpdated,
            HubEvent::NotificationRead(_) => HubEventKind::NotificationRead,
        }
    }

    /// Decode a server invocation. Unknown targets are `Ok(None)`.
    pub fn from_invocation(target: &str, arguments: &[Value]) -> Result<Option<HubEvent>> {
        let ev = match target {
            RECEIVE_NOTIFICATION => {
                HubEvent::NotificationReceived(serde_json::from_value(first_arg(target, arguments)?)?)
            }
            UPDATE_UNREAD_COUNT => {
                let count: i64 = serde_json::from_value(first_arg(target, arguments)?)?;
                if count < 0 {
                    tracing::warn!("server sent negative unread count {count}, clamping to 0");
                }
                HubEvent::UnreadCountUpdated(u32::try_from(count.max(0)).unwrap_or(u32::MAX))
            }
            NOTIFICATION_READ => {
                HubEvent::NotificationRead(serde_json::from_value(first_arg(target, arguments)?)?)
            }
            _ => return Ok(None),
        };

        Ok(Some(ev))
    }
}

fn first_arg(target: &str, arguments: &[Value]) -> Result<Value> {
    arguments
        .first()
        .cloned()
        .ok_or_else(|| HubError::Decode(format!("{target} without arguments")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Callback = Box<dyn FnMut(&HubEvent)>;

/// Callbacks per event kind, invoked in registration order.
#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, HubEventKind, Callback)>,
}

impl Listeners {
    pub fn add(&mut self, kind: HubEventKind, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, kind, callback));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(lid, _, _)| *lid != id);
        before != self.entries.len()
    }

    pub fn dispatch(&mut self, ev: &HubEvent) -> usize {
        let kind = ev.kind();
        let mut called = 0;
        for (_, _, callback) in self.entries.iter_mut().filter(|(_, k, _)| *k == kind) {
            callback(ev);
            called += 1;
        }
        called
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
