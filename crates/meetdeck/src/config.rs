use std::path::{Path, PathBuf};
use std::time::Duration;

use hubsock::{Backoff, HubOptions};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Args, Error, UserId};

const DEFAULT_HUB_URL: &str = "http://localhost:5000/hubs/notification";
const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_RETRY_DELAYS_MS: [u64; 4] = [0, 2_000, 10_000, 30_000];
const DEFAULT_PING_INTERVAL_SECS: u64 = 15;
const DEFAULT_SERVER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

fn default_hub_url() -> String {
    DEFAULT_HUB_URL.to_owned()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_owned()
}

fn default_retry_delays() -> Vec<u64> {
    DEFAULT_RETRY_DELAYS_MS.to_vec()
}

fn default_ping_interval() -> u64 {
    DEFAULT_PING_INTERVAL_SECS
}

fn default_server_timeout() -> u64 {
    DEFAULT_SERVER_TIMEOUT_SECS
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Settings file. Every field is optional on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetdeckConfig {
    #[serde(default = "default_hub_url")]
    pub hub_url: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub user: Option<UserId>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_retry_delays")]
    pub retry_delays_ms: Vec<u64>,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_server_timeout")]
    pub server_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for MeetdeckConfig {
    fn default() -> Self {
        Self {
            hub_url: default_hub_url(),
            api_url: default_api_url(),
            user: None,
            token: None,
            retry_delays_ms: default_retry_delays(),
            ping_interval_secs: default_ping_interval(),
            server_timeout_secs: default_server_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            log_dir: None,
        }
    }
}

impl MeetdeckConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Config file named by `--config` (if any) with command line values on top.
    pub fn from_args(args: &Args) -> Result<Self, Error> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(url) = &args.hub_url {
            self.hub_url = url.clone();
        }
        if let Some(url) = &args.api_url {
            self.api_url = url.clone();
        }
        if let Some(user) = &args.user {
            self.user = Some(user.clone());
        }
        if let Some(token) = &args.token {
            self.token = Some(token.clone());
        }
        if let Some(delays) = &args.retry_delays {
            self.retry_delays_ms = delays.clone();
        }
        if let Some(dir) = &args.log_dir {
            self.log_dir = Some(dir.clone());
        }
    }

    pub fn hub_options(&self) -> HubOptions {
        let mut delays = self.retry_delays_ms.clone();
        if delays.windows(2).any(|w| w[0] > w[1]) {
            warn!("retry delays {delays:?} are not ascending, sorting them");
            delays.sort_unstable();
        }

        HubOptions {
            backoff: Backoff::from_millis(&delays),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            server_timeout: Duration::from_secs(self.server_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn missing_fields_take_defaults() {
        let config: MeetdeckConfig =
            serde_json::from_str(r#"{"user": "42", "retry_delays_ms": [0, 1000]}"#).unwrap();

        assert_eq!(config.user, Some(UserId::from("42")));
        assert_eq!(config.hub_url, DEFAULT_HUB_URL);
        assert_eq!(config.ping_interval_secs, 15);
        assert_eq!(
            config.hub_options().connect_timeout,
            Duration::from_secs(15)
        );
        assert_eq!(
            config.hub_options().backoff,
            Backoff::from_millis(&[0, 1000])
        );
    }

    #[test]
    fn connect_timeout_from_file() {
        let config: MeetdeckConfig =
            serde_json::from_str(r#"{"connect_timeout_secs": 5}"#).unwrap();
        assert_eq!(
            config.hub_options().connect_timeout,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn unordered_delays_are_sorted() {
        let config = MeetdeckConfig {
            retry_delays_ms: vec![5000, 0, 1000],
            ..MeetdeckConfig::default()
        };
        assert_eq!(
            config.hub_options().backoff,
            Backoff::from_millis(&[0, 1000, 5000])
        );
    }

    #[test]
    fn args_override_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"hub_url": "https://file.example.com/hub", "api_url": "https://file.example.com/api", "token": "from-file"}}"#
        )
        .unwrap();

        let args = Args {
            config: Some(file.path().to_path_buf()),
            hub_url: Some("https://args.example.com/hub".to_owned()),
            ..Args::default()
        };
        let config = MeetdeckConfig::from_args(&args).unwrap();

        assert_eq!(config.hub_url, "https://args.example.com/hub");
        assert_eq!(config.api_url, "https://file.example.com/api");
        assert_eq!(config.token.as_deref(), Some("from-file"));
    }

    #[test]
    fn unreadable_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(MeetdeckConfig::load(&missing), Err(Error::Io(_))));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(MeetdeckConfig::load(&bad), Err(Error::Json(_))));
    }
}
