use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::protocol::{JOIN_GROUP, LEAVE_GROUP, MARK_NOTIFICATION_AS_READ};
use crate::transport::{HubTransport, TransportEvent};
use crate::{Backoff, HubError, HubMessage, NotificationId, Result};

mod command;
mod groups;
mod listeners;

pub use command::{CommandHandle, CommandResult};
pub use groups::GroupTracker;
pub use listeners::{HubEvent, HubEventKind, ListenerId};

use command::{PendingInvocations, ResultSender};
use listeners::Listeners;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubPhase {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for HubPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HubPhase::Disconnected => "disconnected",
            HubPhase::Connecting => "connecting",
            HubPhase::Connected => "connected",
            HubPhase::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct HubOptions {
    pub backoff: Backoff,
    /// Keepalive ping rate while connected.
    pub ping_interval: Duration,
    /// Silence from the server longer than this counts as a dropped connection.
    pub server_timeout: Duration,
    /// A connect attempt that has not opened by then fails and is retried.
    pub connect_timeout: Duration,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            ping_interval: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

type TokenFactory = Box<dyn Fn() -> Option<String>>;

/// One long-lived push channel for one signed in user.
///
/// Nothing here runs on its own. The host loop calls [`HubConnection::poll`]
/// and everything (retries, event callbacks, completions, pings) happens
/// inside that call.
pub struct HubConnection<T: HubTransport> {
    transport: T,
    options: HubOptions,
    access_token: Option<TokenFactory>,

    phase: HubPhase,
    connection_id: Option<String>,
    retry_attempt: u32,
    next_attempt_at: Option<Instant>,
    connect_deadline: Option<Instant>,
    last_error: Option<HubError>,

    last_ping: Instant,
    last_frame: Instant,

    groups: GroupTracker,
    pending: PendingInvocations,
    listeners: Listeners,
}

impl<T: HubTransport> HubConnection<T> {
    pub fn new(transport: T, options: HubOptions) -> Self {
        let now = Instant::now();
        Self {
            transport,
            options,
            access_token: None,
            phase: HubPhase::Disconnected,
            connection_id: None,
            retry_attempt: 0,
            next_attempt_at: None,
            connect_deadline: None,
            last_error: None,
            last_ping: now,
            last_frame: now,
            groups: GroupTracker::default(),
            pending: PendingInvocations::default(),
            listeners: Listeners::default(),
        }
    }

    /// Called on every connect attempt, so a refreshed token is picked up on
    /// reconnect.
    pub fn with_access_token(mut self, factory: impl Fn() -> Option<String> + 'static) -> Self {
        self.access_token = Some(Box::new(factory));
        self
    }

    pub fn phase(&self) -> HubPhase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase == HubPhase::Connected
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    pub fn joined_groups(&self) -> &BTreeSet<String> {
        self.groups.joined()
    }

    pub fn last_error(&self) -> Option<&HubError> {
        self.last_error.as_ref()
    }

    pub fn pending_invocations(&self) -> usize {
        self.pending.len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Begin connecting. Does nothing unless we are disconnected. Failures are
    /// never returned; they drive the retry loop and show up in
    /// [`HubConnection::last_error`].
    pub fn start(&mut self) {
        self.start_at(Instant::now())
    }

    fn start_at(&mut self, now: Instant) {
        if self.phase != HubPhase::Disconnected {
            debug!("hub start ignored, already {}", self.phase);
            return;
        }

        info!("starting hub connection");
        self.phase = HubPhase::Connecting;
        self.retry_attempt = 0;
        self.last_error = None;
        self.attempt_connect(now);
    }

    /// Tear everything down. Desired group membership is forgotten and every
    /// pending command fails.
    pub fn stop(&mut self) {
        self.transport.close();
        if self.phase != HubPhase::Disconnected {
            info!("stopping hub connection ({})", self.phase);
        }
        self.phase = HubPhase::Disconnected;
        self.connection_id = None;
        self.retry_attempt = 0;
        self.next_attempt_at = None;
        self.connect_deadline = None;
        self.groups.clear();
        self.pending.fail_all("hub connection stopped");
    }

    pub fn on(
        &mut self,
        kind: HubEventKind,
        callback: impl FnMut(&HubEvent) + 'static,
    ) -> ListenerId {
        self.listeners.add(kind, Box::new(callback))
    }

    /// Unregister a callback. Unknown or already removed ids are ignored.
    pub fn off(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn join_group(&mut self, group: &str) -> Result<CommandHandle> {
        if !self.is_connected() {
            return Err(HubError::NotConnected);
        }

        let (sender, handle) = CommandHandle::pending();
        self.send_join(group, Some(sender));
        Ok(handle)
    }

    pub fn leave_group(&mut self, group: &str) -> CommandHandle {
        if !self.is_connected() {
            self.groups.remove(group);
            return CommandHandle::resolved(Ok(Value::Null));
        }

        let (sender, handle) = CommandHandle::pending();
        self.send_invocation(LEAVE_GROUP, vec![Value::from(group)], Some(sender));
        self.groups.remove(group);
        handle
    }

    pub fn mark_notification_as_read(&mut self, id: &NotificationId) -> Result<CommandHandle> {
        self.invoke(MARK_NOTIFICATION_AS_READ, vec![Value::from(id.as_str())])
    }

    /// Call a hub method and get a handle to its completion.
    pub fn invoke(&mut self, target: &str, arguments: Vec<Value>) -> Result<CommandHandle> {
        if !self.is_connected() {
            return Err(HubError::NotConnected);
        }

        let (sender, handle) = CommandHandle::pending();
        self.send_invocation(target, arguments, Some(sender));
        Ok(handle)
    }

    pub fn poll(&mut self) {
        self.poll_at(Instant::now())
    }

    #[profiling::function]
    pub fn poll_at(&mut self, now: Instant) {
        if let Some(at) = self.next_attempt_at {
            if now >= at && self.is_retrying() {
                debug!("hub retry attempt {}", self.retry_attempt);
                self.attempt_connect(now);
            }
        }

        while let Some(ev) = self.transport.try_recv() {
            self.handle_transport_event(ev, now);
        }

        if let Some(deadline) = self.connect_deadline {
            if now >= deadline && self.is_retrying() {
                let err = HubError::TransientTransport(format!(
                    "connect timed out after {:?}",
                    self.options.connect_timeout
                ));
                self.connect_failed(err, now);
            }
        }

        self.keepalive(now);
    }

    fn is_retrying(&self) -> bool {
        matches!(self.phase, HubPhase::Connecting | HubPhase::Reconnecting)
    }

    fn attempt_connect(&mut self, now: Instant) {
        self.next_attempt_at = None;
        self.connect_deadline = Some(now + self.options.connect_timeout);
        let token = self.access_token.as_ref().and_then(|factory| factory());

        if let Err(err) = self.transport.connect(token.as_deref()) {
            self.connect_failed(err.into(), now);
        }
    }

    /// A connect attempt failed. Either schedule the next one or give up.
    fn connect_failed(&mut self, err: HubError, now: Instant) {
        self.transport.close();
        self.connect_deadline = None;

        if err.is_terminal() {
            match &err {
                HubError::EndpointMisconfigured(_) => error!("hub connect failed: {err}"),
                _ => warn!("hub connect failed: {err}"),
            }
            self.phase = HubPhase::Disconnected;
            self.next_attempt_at = None;
            self.last_error = Some(err);
            return;
        }

        match self.options.backoff.delay(self.retry_attempt) {
            Some(delay) => {
                warn!(
                    "hub connect failed ({err}), retry {} in {:?}",
                    self.retry_attempt + 1,
                    delay
                );
                self.retry_attempt += 1;
                self.next_attempt_at = Some(now + delay);
            }
            None => {
                error!(
                    "hub connect failed ({err}), giving up after {} retries",
                    self.retry_attempt
                );
                self.phase = HubPhase::Disconnected;
                self.next_attempt_at = None;
            }
        }

        self.last_error = Some(err);
    }

    fn connection_dropped(&mut self, err: HubError, now: Instant) {
        warn!("hub connection {:?} dropped: {err}", self.connection_id);
        self.connection_id = None;
        self.pending.fail_all("connection lost");
        self.groups.connection_lost();
        self.phase = HubPhase::Reconnecting;
        self.retry_attempt = 0;
        self.connect_failed(err, now);
    }

    fn handle_open(&mut self, connection_id: Option<String>, now: Instant) {
        let connection_id = connection_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        info!("hub connected as {connection_id}");

        self.phase = HubPhase::Connected;
        self.connection_id = Some(connection_id);
        self.retry_attempt = 0;
        self.next_attempt_at = None;
        self.connect_deadline = None;
        self.last_error = None;
        self.last_ping = now;
        self.last_frame = now;

        for group in self.groups.replay_list() {
            debug!("rejoining {group}");
            self.send_join(&group, None);
        }
    }

    fn handle_transport_event(&mut self, ev: TransportEvent, now: Instant) {
        match ev {
            TransportEvent::Opened { connection_id } => {
                if self.is_retrying() {
                    self.handle_open(connection_id, now);
                } else {
                    debug!("ignoring transport open while {}", self.phase);
                }
            }

            TransportEvent::Message(msg) => {
                if self.is_connected() {
                    self.last_frame = now;
                    self.handle_message(msg, now);
                } else {
                    trace!("dropping hub message while {}: {msg:?}", self.phase);
                }
            }

            TransportEvent::Closed => {
                let err = HubError::TransientTransport("connection closed".to_owned());
                self.transport_failed(err, now);
            }

            TransportEvent::Error(err) => self.transport_failed(err.into(), now),
        }
    }

    fn transport_failed(&mut self, err: HubError, now: Instant) {
        match self.phase {
            HubPhase::Connected => self.connection_dropped(err, now),
            HubPhase::Connecting | HubPhase::Reconnecting => self.connect_failed(err, now),
            HubPhase::Disconnected => trace!("transport failure while disconnected: {err}"),
        }
    }

    fn handle_message(&mut self, msg: HubMessage, now: Instant) {
        match msg {
            HubMessage::Invocation {
                target, arguments, ..
            } => match HubEvent::from_invocation(&target, &arguments) {
                Ok(Some(ev)) => {
                    let called = self.listeners.dispatch(&ev);
                    trace!("{target} delivered to {called} listeners");
                }
                Ok(None) => debug!("no handler for hub method {target}"),
                Err(err) => error!("bad {target} payload: {err}"),
            },

            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                let result = match error {
                    Some(err) => Err(HubError::CommandFailed(err)),
                    None => Ok(result.unwrap_or(Value::Null)),
                };

                if let Some(group) = self.groups.join_completed(&invocation_id, result.is_ok()) {
                    match &result {
                        Ok(_) => debug!("joined {group}"),
                        Err(err) => warn!("joining {group} failed: {err}"),
                    }
                }

                self.pending.complete(&invocation_id, result);
            }

            HubMessage::Ping => {}

            HubMessage::Close {
                error,
                allow_reconnect,
            } => {
                let reason = error.unwrap_or_else(|| "no reason given".to_owned());
                let err = HubError::TransientTransport(format!("server closed connection: {reason}"));
                if allow_reconnect {
                    self.connection_dropped(err, now);
                } else {
                    warn!("{err}, not reconnecting");
                    self.transport.close();
                    self.connection_id = None;
                    self.pending.fail_all("connection closed by server");
                    self.groups.connection_lost();
                    self.phase = HubPhase::Disconnected;
                    self.next_attempt_at = None;
                    self.connect_deadline = None;
                    self.last_error = Some(err);
                }
            }
        }
    }

    fn keepalive(&mut self, now: Instant) {
        if !self.is_connected() {
            return;
        }

        if now.saturating_duration_since(self.last_frame) >= self.options.server_timeout {
            let err = HubError::TransientTransport(format!(
                "no frame from server in {:?}",
                self.options.server_timeout
            ));
            self.connection_dropped(err, now);
            return;
        }

        if now.saturating_duration_since(self.last_ping) >= self.options.ping_interval {
            trace!("pinging hub");
            self.last_ping = now;
            if let Err(err) = self.transport.send(&HubMessage::Ping) {
                self.connection_dropped(err.into(), now);
            }
        }
    }

    fn send_join(&mut self, group: &str, sender: Option<ResultSender>) {
        if let Some(id) = self.send_invocation(JOIN_GROUP, vec![Value::from(group)], sender) {
            self.groups.join_requested(id, group.to_owned());
        } else {
            warn!("could not send join for {group}");
        }
    }

    /// Returns the invocation id if the frame went out. On failure the sender
    /// is resolved right away.
    fn send_invocation(
        &mut self,
        target: &str,
        arguments: Vec<Value>,
        sender: Option<ResultSender>,
    ) -> Option<String> {
        let label = match arguments.first().and_then(Value::as_str) {
            Some(arg) => format!("{target}({arg})"),
            None => target.to_owned(),
        };
        let id = self.pending.next_id();
        let msg = HubMessage::invocation(Some(id.clone()), target, arguments);

        match self.transport.send(&msg) {
            Ok(()) => {
                self.pending.insert(id.clone(), label, sender);
                Some(id)
            }
            Err(err) => {
                warn!("sending {label} failed: {err}");
                if let Some(sender) = sender {
                    sender.send(Err(HubError::CommandFailed(err.to_string())));
                }
                None
            }
        }
    }
}

impl<T: HubTransport> Drop for HubConnection<T> {
    fn drop(&mut self) {
        self.transport.close();
        self.pending.fail_all("hub connection dropped");
    }
}

impl<T: HubTransport> fmt::Debug for HubConnection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubConnection")
            .field("phase", &self.phase)
            .field("connection_id", &self.connection_id)
            .field("retry_attempt", &self.retry_attempt)
            .field("joined_groups", self.groups.joined())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
