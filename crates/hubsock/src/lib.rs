mod backoff;
mod connection;
mod error;
mod notification;
pub mod protocol;
mod transport;

#[cfg(test)]
mod test_utils;

pub use backoff::Backoff;
pub use connection::{
    CommandHandle, CommandResult, GroupTracker, HubConnection, HubEvent, HubEventKind,
    HubOptions, HubPhase, ListenerId,
};
pub use error::{HubError, TransportError};
pub use ewebsock;
pub use notification::{Notification, NotificationId};
pub use protocol::HubMessage;
pub use transport::{HubTransport, TransportEvent, Wakeup, WebsocketTransport};

pub type Result<T> = std::result::Result<T, error::HubError>;
