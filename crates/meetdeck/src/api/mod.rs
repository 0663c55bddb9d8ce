use hubsock::{Notification, NotificationId};
use poll_promise::Promise;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;

use crate::{ApiError, UserId};

mod http;

pub use http::HttpNotificationApi;

pub type ApiResult<T> = Result<T, ApiError>;
pub type ApiPromise<T> = Promise<ApiResult<T>>;

/// The REST notification service. Every call starts a request and hands back
/// a promise the caller polls; nothing blocks.
pub trait NotificationApi {
    fn list_all(&self, user: &UserId) -> ApiPromise<Vec<Notification>>;
    fn list_unread(&self, user: &UserId) -> ApiPromise<Vec<Notification>>;
    fn unread_count(&self, user: &UserId) -> ApiPromise<i64>;
    fn mark_read(&self, id: &NotificationId) -> ApiPromise<()>;
    fn mark_all_read(&self, user: &UserId) -> ApiPromise<()>;
    fn delete(&self, id: &NotificationId) -> ApiPromise<()>;
}

impl<T: NotificationApi + ?Sized> NotificationApi for &T {
    fn list_all(&self, user: &UserId) -> ApiPromise<Vec<Notification>> {
        (**self).list_all(user)
    }

    fn list_unread(&self, user: &UserId) -> ApiPromise<Vec<Notification>> {
        (**self).list_unread(user)
    }

    fn unread_count(&self, user: &UserId) -> ApiPromise<i64> {
        (**self).unread_count(user)
    }

    fn mark_read(&self, id: &NotificationId) -> ApiPromise<()> {
        (**self).mark_read(id)
    }

    fn mark_all_read(&self, user: &UserId) -> ApiPromise<()> {
        (**self).mark_all_read(user)
    }

    fn delete(&self, id: &NotificationId) -> ApiPromise<()> {
        (**self).delete(id)
    }
}

/// `{ "success": bool, "message": string?, "data": T? }`
#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

/// Unwrap the service envelope of a finished response.
pub fn decode_envelope<T: DeserializeOwned>(
    ok: bool,
    status: u16,
    body: &[u8],
) -> ApiResult<Option<T>> {
    if !ok {
        // error bodies usually carry an envelope too, log its message
        let envelope: Result<Envelope<IgnoredAny>, _> = serde_json::from_slice(body);
        if let Some(message) = envelope.ok().and_then(|e| e.message) {
            tracing::debug!("http {status}: {message}");
        }
        return Err(ApiError::Status(status));
    }

    let envelope: Envelope<T> = serde_json::from_slice(body)?;
    if !envelope.success {
        return Err(ApiError::Rejected(
            envelope
                .message
                .unwrap_or_else(|| "no reason given".to_owned()),
        ));
    }

    Ok(envelope.data)
}
