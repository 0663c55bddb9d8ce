use hashbrown::HashMap;
use poll_promise::{Promise, Sender};
use serde_json::Value;
use tracing::debug;

use crate::HubError;

pub type CommandResult = Result<Value, HubError>;

/// Completion signal of a command sent to the hub.
///
/// A handle always resolves: with the server's result, with
/// [`HubError::CommandFailed`], or with the error the send itself hit.
pub struct CommandHandle {
    promise: Promise<CommandResult>,
}

impl CommandHandle {
    pub(crate) fn pending() -> (ResultSender, Self) {
        let (sender, promise) = Promise::new();
        (ResultSender(Some(sender)), Self { promise })
    }

    pub fn resolved(result: CommandResult) -> Self {
        Self {
            promise: Promise::from_ready(result),
        }
    }

    pub fn ready(&self) -> Option<&CommandResult> {
        self.promise.ready()
    }

    pub fn is_ready(&self) -> bool {
        self.ready().is_some()
    }

    pub fn try_take(self) -> Result<CommandResult, Self> {
        self.promise.try_take().map_err(|promise| Self { promise })
    }
}

impl std::fmt::Debug for CommandHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandle")
            .field("result", &self.ready())
            .finish()
    }
}

/// Sending half of a [`CommandHandle`]. Dropping it unsent resolves the
/// handle with `CommandFailed` so no caller is left waiting.
pub(crate) struct ResultSender(Option<Sender<CommandResult>>);

impl ResultSender {
    pub fn send(mut self, result: CommandResult) {
        if let Some(sender) = self.0.take() {
            sender.send(result);
        }
    }
}

impl Drop for ResultSender {
    fn drop(&mut self) {
        if let Some(sender) = self.0.take() {
            sender.send(Err(HubError::CommandFailed(
                "command abandoned".to_owned(),
            )));
        }
    }
}

struct Pending {
    /// `target(argument)`, for logs
    label: String,
    sender: Option<ResultSender>,
}

/// Invocations sent on the current connection that still wait for their
/// completion frame.
#[derive(Default)]
pub(crate) struct PendingInvocations {
    next_id: u64,
    pending: HashMap<String, Pending>,
}

impl PendingInvocations {
    pub fn next_id(&mut self) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, invocation_id: String, label: String, sender: Option<ResultSender>) {
        self.pending.insert(invocation_id, Pending { label, sender });
    }

    /// Resolve an invocation. Returns its label, or `None` for ids we never
    /// sent (or already failed).
    pub fn complete(&mut self, invocation_id: &str, result: CommandResult) -> Option<String> {
        let Some(pending) = self.pending.remove(invocation_id) else {
            debug!("completion for unknown invocation {invocation_id}");
            return None;
        };

        if let Some(sender) = pending.sender {
            sender.send(result);
        }
        Some(pending.label)
    }

    pub fn fail_all(&mut self, reason: &str) {
        for (_, pending) in self.pending.drain() {
            if let Some(sender) = pending.sender {
                sender.send(Err(HubError::CommandFailed(format!(
                    "{}: {reason}",
                    pending.label
                ))));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
