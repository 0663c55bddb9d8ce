use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::error;

use crate::UserId;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Args {
    pub hub_url: Option<String>,
    pub api_url: Option<String>,
    pub user: Option<UserId>,
    pub token: Option<String>,
    pub config: Option<PathBuf>,
    pub retry_delays: Option<Vec<u64>>,
    pub log_dir: Option<PathBuf>,
}

impl Args {
    // parse arguments, return set of unrecognized args
    pub fn parse(args: &[String]) -> (Self, BTreeSet<String>) {
        let mut unrecognized_args = BTreeSet::new();
        let mut res = Args::default();

        let mut i = 0;
        let len = args.len();
        while i < len {
            let arg = &args[i];

            if arg == "--hub-url" {
                i += 1;
                let Some(url) = args.get(i) else {
                    error!("hub-url argument missing?");
                    continue;
                };
                res.hub_url = Some(url.clone());
            } else if arg == "--api-url" {
                i += 1;
                let Some(url) = args.get(i) else {
                    error!("api-url argument missing?");
                    continue;
                };
                res.api_url = Some(url.clone());
            } else if arg == "-u" || arg == "--user" {
                i += 1;
                let Some(user) = args.get(i) else {
                    error!("user argument missing?");
                    continue;
                };
                res.user = Some(UserId::new(user.clone()));
            } else if arg == "--token" {
                i += 1;
                let Some(token) = args.get(i) else {
                    error!("token argument missing?");
                    continue;
                };
                res.token = Some(token.clone());
            } else if arg == "-c" || arg == "--config" {
                i += 1;
                let Some(path) = args.get(i) else {
                    error!("config argument missing?");
                    continue;
                };
                res.config = Some(PathBuf::from(path));
            } else if arg == "--retry-delays" {
                i += 1;
                let Some(delays) = args.get(i) else {
                    error!("retry-delays argument missing?");
                    continue;
                };
                match parse_delays(delays) {
                    Some(delays) => res.retry_delays = Some(delays),
                    None => error!(
                        "failed to parse --retry-delays '{}'. Expected comma separated milliseconds, e.g. 0,2000,10000",
                        delays
                    ),
                }
            } else if arg == "--log-dir" {
                i += 1;
                let Some(path) = args.get(i) else {
                    error!("log-dir argument missing?");
                    continue;
                };
                res.log_dir = Some(PathBuf::from(path));
            } else {
                unrecognized_args.insert(arg.clone());
            }

            i += 1;
        }

        (res, unrecognized_args)
    }
}

fn parse_delays(s: &str) -> Option<Vec<u64>> {
    let delays = s
        .split(',')
        .map(|part| part.trim().parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    // must be ascending
    if delays.windows(2).any(|w| w[0] > w[1]) {
        return None;
    }
    Some(delays)
}
