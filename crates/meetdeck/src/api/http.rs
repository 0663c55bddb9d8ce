use hubsock::{Notification, NotificationId};
use poll_promise::Promise;
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::trace;
use url::Url;

use super::{decode_envelope, ApiPromise, ApiResult, NotificationApi};
use crate::{ApiError, Error, UserId};

/// [`NotificationApi`] over HTTP. Requests run on ehttp's background
/// threads and report back through the returned promise.
#[derive(Debug, Clone)]
pub struct HttpNotificationApi {
    base: Url,
    token: Option<String>,
}

impl HttpNotificationApi {
    /// `api_url` is the service root, e.g. `https://api.example.com/api`.
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self, Error> {
        let base = Url::parse(api_url).map_err(|e| Error::Config(format!("{api_url}: {e}")))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(Error::Config(format!("{api_url} is not an http url")));
        }
        Ok(Self { base, token })
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // checked in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("notifications").extend(segments);
        }
        url
    }

    fn fetch<D, T>(&self, method: &str, url: Url, finish: fn(Option<D>) -> ApiResult<T>) -> ApiPromise<T>
    where
        D: DeserializeOwned + 'static,
        T: Send + 'static,
    {
        let (sender, promise) = Promise::new();

        let mut request = ehttp::Request::get(url.as_str());
        request.method = method.to_owned();
        request.headers.insert("Accept", "application/json");
        if let Some(token) = &self.token {
            request
                .headers
                .insert("Authorization", format!("Bearer {token}"));
        }

        trace!("{method} {url}");
        ehttp::fetch(request, move |response| {
            let result = response
                .map_err(ApiError::Transport)
                .and_then(|resp| decode_envelope::<D>(resp.ok, resp.status, &resp.bytes))
                .and_then(finish);
            sender.send(result);
        });

        promise
    }
}

fn list(data: Option<Vec<Notification>>) -> ApiResult<Vec<Notification>> {
    Ok(data.unwrap_or_default())
}

fn count(data: Option<i64>) -> ApiResult<i64> {
    data.ok_or_else(|| ApiError::Decode("missing unread count".to_owned()))
}

fn unit(_data: Option<IgnoredAny>) -> ApiResult<()> {
    Ok(())
}

impl NotificationApi for HttpNotificationApi {
    fn list_all(&self, user: &UserId) -> ApiPromise<Vec<Notification>> {
        let url = self.endpoint(&["user", user.as_str()]);
        self.fetch("GET", url, list)
    }

    fn list_unread(&self, user: &UserId) -> ApiPromise<Vec<Notification>> {
        let url = self.endpoint(&["user", user.as_str(), "unread"]);
        self.fetch("GET", url, list)
    }

    fn unread_count(&self, user: &UserId) -> ApiPromise<i64> {
        let url = self.endpoint(&["user", user.as_str(), "unread-count"]);
        self.fetch("GET", url, count)
    }

    fn mark_read(&self, id: &NotificationId) -> ApiPromise<()> {
        let url = self.endpoint(&[id.as_str(), "read"]);
        self.fetch("PUT", url, unit)
    }

    fn mark_all_read(&self, user: &UserId) -> ApiPromise<()> {
        let url = self.endpoint(&["user", user.as_str(), "read-all"]);
        self.fetch("PUT", url, unit)
    }

    fn delete(&self, id: &NotificationId) -> ApiPromise<()> {
        let url = self.endpoint(&[id.as_str()]);
        self.fetch("DELETE", url, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints() {
        let api = HttpNotificationApi::new("https://api.example.com/api/", None).unwrap();
        let user = UserId::from("42");
        let id = NotificationId::from("7d1c");

        assert_eq!(
            api.endpoint(&["user", user.as_str()]).as_str(),
            "https://api.example.com/api/notifications/user/42"
        );
        assert_eq!(
            api.endpoint(&["user", user.as_str(), "unread-count"]).as_str(),
            "https://api.example.com/api/notifications/user/42/unread-count"
        );
        assert_eq!(
            api.endpoint(&[id.as_str(), "read"]).as_str(),
            "https://api.example.com/api/notifications/7d1c/read"
        );
    }

    #[test]
    fn path_segments_are_escaped() {
        let api = HttpNotificationApi::new("http://localhost:5000", None).unwrap();
        assert_eq!(
            api.endpoint(&["a/b c"]).as_str(),
            "http://localhost:5000/notifications/a%2Fb%20c"
        );
    }

    #[test]
    fn rejects_non_http_roots() {
        assert!(HttpNotificationApi::new("mailto:ops@example.com", None).is_err());
        assert!(HttpNotificationApi::new("ws://localhost/hub", None).is_err());
        assert!(HttpNotificationApi::new("::", None).is_err());
    }

    #[test]
    fn missing_count_is_a_decode_error() {
        assert!(matches!(count(None), Err(ApiError::Decode(_))));
        assert_eq!(list(None), Ok(vec![]));
    }
}
