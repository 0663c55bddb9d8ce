use std::collections::VecDeque;
use std::time::{Duration, Instant};

use hubsock::protocol::{JOIN_GROUP, RECEIVE_NOTIFICATION};
use hubsock::{
    Backoff, HubConnection, HubError, HubEvent, HubEventKind, HubMessage, HubOptions, HubPhase,
    HubTransport, TransportError, TransportEvent,
};
use serde_json::{json, Value};

/// A hub that acks every invocation and can be told to go away.
#[derive(Default)]
struct FakeHub {
    up: bool,
    reachable: bool,
    connects: usize,
    inbox: VecDeque<TransportEvent>,
    joins: Vec<String>,
}

impl FakeHub {
    fn reachable() -> Self {
        Self {
            reachable: true,
            ..Self::default()
        }
    }

    fn crash(&mut self) {
        self.up = false;
        self.inbox.push_back(TransportEvent::Error(TransportError::Io(
            "connection reset by peer".to_owned(),
        )));
    }

    fn push_notification(&mut self, id: &str) {
        self.inbox
            .push_back(TransportEvent::Message(HubMessage::invocation(
                None,
                RECEIVE_NOTIFICATION,
                vec![json!({
                    "id": id,
                    "title": "Meeting moved",
                    "message": "Standup is now at 10:00",
                    "isRead": false,
                    "createdAt": "2024-05-01T09:30:00Z",
                })],
            )));
    }
}

impl HubTransport for FakeHub {
    fn connect(&mut self, _access_token: Option<&str>) -> Result<(), TransportError> {
        self.connects += 1;
        if self.reachable {
            self.up = true;
            self.inbox.push_back(TransportEvent::Opened {
                connection_id: Some(format!("conn-{}", self.connects)),
            });
        } else {
            self.inbox.push_back(TransportEvent::Error(TransportError::Status {
                status: 502,
                message: "Bad Gateway".to_owned(),
            }));
        }
        Ok(())
    }

    fn send(&mut self, msg: &HubMessage) -> Result<(), TransportError> {
        if !self.up {
            return Err(TransportError::NotOpen);
        }
        if let HubMessage::Invocation {
            invocation_id: Some(id),
            target,
            arguments,
        } = msg
        {
            if target == JOIN_GROUP {
                if let Some(group) = arguments.first().and_then(Value::as_str) {
                    self.joins.push(group.to_owned());
                }
            }
            self.inbox
                .push_back(TransportEvent::Message(HubMessage::completion(
                    id,
                    Ok(Value::Null),
                )));
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        self.inbox.pop_front()
    }

    fn close(&mut self) {
        self.up = false;
        self.inbox.clear();
    }
}

#[test]
fn survives_a_flap_and_keeps_delivering() {
    let options = HubOptions {
        backoff: Backoff::from_millis(&[0, 1_000, 5_000]),
        ..HubOptions::default()
    };
    let mut hub = HubConnection::new(FakeHub::reachable(), options);

    let received = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = received.clone();
    hub.on(HubEventKind::NotificationReceived, move |ev| {
        if let HubEvent::NotificationReceived(n) = ev {
            sink.borrow_mut().push(n.id.to_string());
        }
    });

    let t0 = Instant::now();
    hub.start();
    hub.poll_at(t0);
    assert_eq!(hub.connection_id(), Some("conn-1"));

    let join = hub.join_group("user:42").expect("connected");
    hub.poll_at(t0);
    assert!(join.ready().is_some_and(|r| r.is_ok()));
    assert!(hub.joined_groups().contains("user:42"));

    hub.transport_mut().push_notification("n1");
    hub.poll_at(t0);

    // server goes away and the immediate retry fails too
    hub.transport_mut().reachable = false;
    hub.transport_mut().crash();
    hub.poll_at(t0);
    assert_eq!(hub.phase(), HubPhase::Reconnecting);

    hub.poll_at(t0);
    assert_eq!(hub.retry_attempt(), 2);
    assert!(matches!(
        hub.last_error(),
        Some(HubError::TransientTransport(_))
    ));

    hub.transport_mut().reachable = true;
    hub.poll_at(t0 + Duration::from_millis(999));
    assert_eq!(hub.phase(), HubPhase::Reconnecting);

    hub.poll_at(t0 + Duration::from_secs(1));
    assert_eq!(hub.phase(), HubPhase::Connected);
    assert_eq!(hub.connection_id(), Some("conn-3"));
    assert_eq!(hub.retry_attempt(), 0);
    assert_eq!(hub.transport().joins, vec!["user:42", "user:42"]);

    hub.transport_mut().push_notification("n2");
    hub.poll_at(t0 + Duration::from_secs(1));
    assert_eq!(*received.borrow(), vec!["n1", "n2"]);

    hub.stop();
    assert!(hub.joined_groups().is_empty());
    assert_eq!(hub.phase(), HubPhase::Disconnected);
}
