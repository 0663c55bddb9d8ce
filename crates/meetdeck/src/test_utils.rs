use std::cell::RefCell;
use std::collections::VecDeque;

use chrono::{Duration, TimeZone, Utc};
use hubsock::{HubMessage, HubTransport, Notification, NotificationId, TransportError, TransportEvent};
use poll_promise::{Promise, Sender};

use crate::api::{ApiPromise, ApiResult, NotificationApi};
use crate::UserId;

/// `minute` orders notifications: higher is newer.
pub fn notification(id: &str, is_read: bool, minute: i64) -> Notification {
    let created_at = Utc
        .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
        .single()
        .expect("valid date")
        + Duration::minutes(minute);

    Notification {
        id: NotificationId::from(id),
        title: format!("title {id}"),
        message: format!("message {id}"),
        is_read,
        read_at: is_read.then_some(created_at),
        created_at,
        entity_type: None,
        entity_id: None,
    }
}

type Slot<T> = Option<Sender<ApiResult<T>>>;

/// Records calls and keeps every promise pending until the test resolves it.
#[derive(Default)]
pub struct MockApi {
    calls: RefCell<Vec<String>>,
    lists: RefCell<Vec<Slot<Vec<Notification>>>>,
    counts: RefCell<Vec<Slot<i64>>>,
    units: RefCell<Vec<Slot<()>>>,
}

fn pending<T: Send + 'static>(slots: &RefCell<Vec<Slot<T>>>) -> ApiPromise<T> {
    let (sender, promise) = Promise::new();
    slots.borrow_mut().push(Some(sender));
    promise
}

fn resolve<T: Send + 'static>(slots: &RefCell<Vec<Slot<T>>>, index: Option<usize>, result: ApiResult<T>) {
    let mut slots = slots.borrow_mut();
    let slot = match index {
        Some(index) => slots.get_mut(index),
        None => slots.iter_mut().find(|s| s.is_some()),
    };
    let sender = slot.and_then(Option::take).expect("no pending request");
    sender.send(result);
}

impl MockApi {
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    /// Resolve the oldest pending list request.
    pub fn resolve_list(&self, result: ApiResult<Vec<Notification>>) {
        resolve(&self.lists, None, result)
    }

    pub fn resolve_list_at(&self, index: usize, result: ApiResult<Vec<Notification>>) {
        resolve(&self.lists, Some(index), result)
    }

    pub fn resolve_count(&self, result: ApiResult<i64>) {
        resolve(&self.counts, None, result)
    }

    pub fn resolve_unit(&self, result: ApiResult<()>) {
        resolve(&self.units, None, result)
    }
}

impl NotificationApi for MockApi {
    fn list_all(&self, user: &UserId) -> ApiPromise<Vec<Notification>> {
        self.record(format!("list_all {user}"));
        pending(&self.lists)
    }

    fn list_unread(&self, user: &UserId) -> ApiPromise<Vec<Notification>> {
        self.record(format!("list_unread {user}"));
        pending(&self.lists)
    }

    fn unread_count(&self, user: &UserId) -> ApiPromise<i64> {
        self.record(format!("unread_count {user}"));
        pending(&self.counts)
    }

    fn mark_read(&self, id: &NotificationId) -> ApiPromise<()> {
        self.record(format!("mark_read {id}"));
        pending(&self.units)
    }

    fn mark_all_read(&self, user: &UserId) -> ApiPromise<()> {
        self.record(format!("mark_all_read {user}"));
        pending(&self.units)
    }

    fn delete(&self, id: &NotificationId) -> ApiPromise<()> {
        self.record(format!("delete {id}"));
        pending(&self.units)
    }
}

/// Hub transport that opens on connect, records what is sent and, when
/// `ack` is set, answers every invocation with a successful completion.
#[derive(Default)]
pub struct Loopback {
    pub inbox: VecDeque<TransportEvent>,
    pub sent: Vec<HubMessage>,
    pub connects: usize,
    pub closes: usize,
    pub ack: bool,
}

impl Loopback {
    pub fn acking() -> Self {
        Self {
            ack: true,
            ..Self::default()
        }
    }

    pub fn push_invocation(&mut self, target: &str, arg: serde_json::Value) {
        self.inbox
            .push_back(TransportEvent::Message(HubMessage::invocation(
                None,
                target,
                vec![arg],
            )));
    }

    pub fn invoked(&self, target: &str) -> Vec<String> {
        self.sent
            .iter()
            .filter_map(|msg| match msg {
                HubMessage::Invocation {
                    target: t,
                    arguments,
                    ..
                } if t == target => arguments.first().and_then(|a| a.as_str()).map(str::to_owned),
                _ => None,
            })
            .collect()
    }
}

impl HubTransport for Loopback {
    fn connect(&mut self, _access_token: Option<&str>) -> Result<(), TransportError> {
        self.connects += 1;
        self.inbox.push_back(TransportEvent::Opened {
            connection_id: Some(format!("loopback-{}", self.connects)),
        });
        Ok(())
    }

    fn send(&mut self, msg: &HubMessage) -> Result<(), TransportError> {
        self.sent.push(msg.clone());
        if let (
            true,
            HubMessage::Invocation {
                invocation_id: Some(id),
                ..
            },
        ) = (self.ack, msg)
        {
            self.inbox
                .push_back(TransportEvent::Message(HubMessage::completion(
                    id,
                    Ok(serde_json::Value::Null),
                )));
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        self.inbox.pop_front()
    }

    fn close(&mut self) {
        self.closes += 1;
        self.inbox.clear();
    }
}
