use crate::{HubMessage, TransportError};

mod websocket;

pub use websocket::WebsocketTransport;

/// Called by the transport whenever it has something for the host loop to poll.
pub trait Wakeup: Send + Sync + Clone + 'static {
    fn wake(&self);
}

impl<F> Wakeup for F
where
    F: Fn() + Send + Sync + Clone + 'static,
{
    fn wake(&self) {
        self()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The channel is open and the handshake completed.
    Opened { connection_id: Option<String> },
    Message(HubMessage),
    Closed,
    Error(TransportError),
}

/// The bidirectional push channel.
///
/// Implementations are non-blocking: `connect` only starts an attempt and its
/// outcome shows up later as `Opened`, `Error` or `Closed` from `try_recv`.
pub trait HubTransport {
    /// Begin a (re)connect attempt, dropping any previous connection.
    fn connect(&mut self, access_token: Option<&str>) -> Result<(), TransportError>;

    fn send(&mut self, msg: &HubMessage) -> Result<(), TransportError>;

    fn try_recv(&mut self) -> Option<TransportEvent>;

    /// Tear down the connection. Must be safe to call when already closed.
    fn close(&mut self);
}

impl<T: HubTransport + ?Sized> HubTransport for Box<T> {
    fn connect(&mut self, access_token: Option<&str>) -> Result<(), TransportError> {
        (**self).connect(access_token)
    }

    fn send(&mut self, msg: &HubMessage) -> Result<(), TransportError> {
        (**self).send(msg)
    }

    fn try_recv(&mut self) -> Option<TransportEvent> {
        (**self).try_recv()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
