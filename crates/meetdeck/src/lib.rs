pub mod api;
mod args;
mod binding;
mod config;
mod error;
mod manager;
mod store;
mod user;

#[cfg(test)]
mod test_utils;

pub use api::{ApiPromise, ApiResult, HttpNotificationApi, NotificationApi};
pub use args::Args;
pub use binding::HubBinding;
pub use config::MeetdeckConfig;
pub use error::{ApiError, Error};
pub use hubsock;
pub use manager::HubManager;
pub use store::{CommandOutcome, LoadScope, NotificationStore, NotificationView, StoreCommand};
pub use user::UserId;

pub type Result<T> = std::result::Result<T, error::Error>;
