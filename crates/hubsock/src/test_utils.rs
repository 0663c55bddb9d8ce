use std::collections::VecDeque;

use serde_json::Value;

use crate::protocol::JOIN_GROUP;
use crate::{HubMessage, HubTransport, TransportError, TransportEvent};

/// What the next `connect` call should lead to.
#[derive(Debug, Clone)]
pub enum ConnectScript {
    Open,
    Fail(TransportError),
    /// Attempt stays in flight until the test pushes an event.
    Hang,
}

/// Scripted in-memory transport. Connect attempts consume [`ConnectScript`]
/// entries (opening by default), sends are recorded.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub script: VecDeque<ConnectScript>,
    pub events: VecDeque<TransportEvent>,
    pub tokens: Vec<Option<String>>,
    pub sent: Vec<HubMessage>,
    /// Sends whose first argument matches one of these fail.
    pub fail_sends_for: Vec<String>,
    pub closes: usize,
    pub open: bool,
}

impl MockTransport {
    pub fn scripted(script: impl IntoIterator<Item = ConnectScript>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.tokens.len()
    }

    pub fn push(&mut self, ev: TransportEvent) {
        self.events.push_back(ev);
    }

    pub fn push_invocation(&mut self, target: &str, args: Vec<Value>) {
        self.push(TransportEvent::Message(HubMessage::invocation(
            None, target, args,
        )));
    }

    pub fn complete(&mut self, invocation_id: &str, result: Result<Value, String>) {
        self.push(TransportEvent::Message(HubMessage::completion(
            invocation_id,
            result,
        )));
    }

    /// `(invocation id, group)` of every JoinGroup sent so far.
    pub fn joins(&self) -> Vec<(String, String)> {
        self.sent
            .iter()
            .filter_map(|msg| match msg {
                HubMessage::Invocation {
                    invocation_id: Some(id),
                    target,
                    arguments,
                } if target == JOIN_GROUP => Some((
                    id.clone(),
                    arguments.first()?.as_str()?.to_owned(),
                )),
                _ => None,
            })
            .collect()
    }

    pub fn last_invocation_id(&self) -> Option<String> {
        self.sent.iter().rev().find_map(|msg| match msg {
            HubMessage::Invocation { invocation_id, .. } => invocation_id.clone(),
            _ => None,
        })
    }
}

impl HubTransport for MockTransport {
    fn connect(&mut self, access_token: Option<&str>) -> Result<(), TransportError> {
        self.tokens.push(access_token.map(str::to_owned));
        match self.script.pop_front().unwrap_or(ConnectScript::Open) {
            ConnectScript::Open => {
                self.open = true;
                self.events.push_back(TransportEvent::Opened {
                    connection_id: None,
                });
            }
            ConnectScript::Fail(err) => self.events.push_back(TransportEvent::Error(err)),
            ConnectScript::Hang => {}
        }
        Ok(())
    }

    fn send(&mut self, msg: &HubMessage) -> Result<(), TransportError> {
        self.sent.push(msg.clone());
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        if let HubMessage::Invocation { arguments, .. } = msg {
            let arg = arguments.first().and_then(Value::as_str);
            if arg.is_some_and(|arg| self.fail_sends_for.iter().any(|f| f == arg)) {
                return Err(TransportError::Io("send failed".to_owned()));
            }
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }

    fn close(&mut self) {
        self.closes += 1;
        self.open = false;
        self.events.clear();
    }
}
