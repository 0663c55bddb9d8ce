#![warn(clippy::all, rust_2018_idioms)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hubsock::{HubConnection, HubEvent, HubEventKind, HubPhase, HubTransport, WebsocketTransport};
use meetdeck::{
    Args, HttpNotificationApi, HubBinding, HubManager, MeetdeckConfig, NotificationStore, UserId,
};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "meetdeck=info,hubsock=info,meetdeck_tail=info";

fn setup_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    use std::panic;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    panic::set_hook(Box::new(|panic_info| {
        error!("meetdeck_tail panicked: {:?}", panic_info);
    }));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stdout);

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(console_layer)
            .with(env_filter)
            .init();
        return None;
    };

    use tracing_appender::{
        non_blocking,
        rolling::{RollingFileAppender, Rotation},
    };

    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        log_dir,
        format!("meetdeck-{}.log", env!("CARGO_PKG_VERSION")),
    );
    let (non_blocking_writer, guard) = non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_writer);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Some(guard)
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (args, unrecognized) = Args::parse(&args);

    let config = MeetdeckConfig::from_args(&args);
    let log_dir = match &config {
        Ok(config) => config.log_dir.clone(),
        Err(_) => args.log_dir.clone(),
    };
    #[allow(unused_variables)] // need guard to live for lifetime of program
    let guard = setup_logging(log_dir.as_deref());

    for arg in unrecognized {
        warn!("ignoring unrecognized argument '{arg}'");
    }

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!("could not load config: {err}");
            return;
        }
    };

    let Some(user) = config.user.clone() else {
        error!("no user to follow, pass --user or set \"user\" in the config file");
        return;
    };

    if let Err(err) = run(config, user).await {
        error!("{err}");
    }
}

async fn run(config: MeetdeckConfig, user: UserId) -> meetdeck::Result<()> {
    let api = HttpNotificationApi::new(&config.api_url, config.token.clone())?;

    let notify = Arc::new(Notify::new());
    let wakeup = {
        let notify = notify.clone();
        move || notify.notify_one()
    };
    let transport = WebsocketTransport::new(&config.hub_url, wakeup)?;

    let mut manager = HubManager::new();
    let mut store = NotificationStore::new(user.clone());

    let options = config.hub_options();
    let token = config.token.clone();
    let hub = manager.sign_in(user, move |_| {
        HubConnection::new(transport, options).with_access_token(move || token.clone())
    });
    let binding = HubBinding::attach(hub, &mut store);
    hub.on(HubEventKind::NotificationReceived, |ev| {
        if let HubEvent::NotificationReceived(n) = ev {
            info!("new notification {}: {} - {}", n.id, n.title, n.message);
        }
    });

    store.load_all(&api);

    let mut state = TailState::default();
    let mut tick = tokio::time::interval(Duration::from_millis(100));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
            _ = notify.notified() => {}
            _ = tick.tick() => {}
        }

        update(&mut state, &mut manager, &mut store, &api);
    }

    if let Some(hub) = manager.current() {
        binding.detach(hub);
    }
    manager.sign_out();

    Ok(())
}

#[derive(Default)]
struct TailState {
    connected_once: bool,
    phase: Option<HubPhase>,
    unread: Option<u32>,
}

#[profiling::function]
fn update<T: HubTransport>(
    state: &mut TailState,
    manager: &mut HubManager<T>,
    store: &mut NotificationStore,
    api: &HttpNotificationApi,
) {
    if manager.poll() {
        // pushes sent while we were away are lost, fetch the list again
        if state.connected_once {
            store.load_all(api);
        }
        state.connected_once = true;
    }

    if let Some(hub) = manager.current() {
        let phase = hub.phase();
        if state.phase != Some(phase) {
            match (phase, hub.last_error()) {
                (HubPhase::Disconnected, Some(err)) => error!("hub gave up: {err}"),
                _ => info!("hub {phase}"),
            }
            state.phase = Some(phase);
        }
    }

    for outcome in store.poll() {
        if let Err(err) = &outcome.result {
            warn!("{:?} failed: {err}", outcome.command);
        }
    }

    let view = store.view(manager.is_connected());
    if state.unread != Some(view.unread_count) && !view.is_loading {
        info!(
            "{} unread of {} notifications (live: {})",
            view.unread_count,
            view.notifications.len(),
            view.is_connected
        );
        state.unread = Some(view.unread_count);
    }
}
