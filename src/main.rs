mod config;
mod models;
mod mta;
mod web;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use config::Config;
use models::PositionSnapshot;
use mta::client::{FeedPoller, FeedSource, MtaClient};

/// Shared application state: lock-free reads via ArcSwap.
pub struct AppState {
    pub config: ArcSwap<Config>,
    pub snapshot: ArcSwap<PositionSnapshot>,
    pub config_path: PathBuf,
    pub shutdown: CancellationToken,
    pub config_changed: tokio::sync::Notify,
    pub last_fetch_success: AtomicU64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing (structured logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("subway_tracker=info")),
        )
        .init();

    info!("NYC Subway Tracker starting");

    let config_path = find_config_path();
    info!("Config file: {}", config_path.display());

    let initial_config = match Config::load(&config_path) {
        Ok(cfg) => {
            info!(
                "Config loaded: routes: {}, {} feeds, refresh every {}s",
                cfg.routes.join(","),
                cfg.feed_urls.len(),
                cfg.refresh.trains_interval
            );
            cfg
        }
        Err(e) => {
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let client = match MtaClient::new() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState {
        config: ArcSwap::from_pointee(initial_config),
        snapshot: ArcSwap::from_pointee(PositionSnapshot::empty()),
        config_path,
        shutdown: CancellationToken::new(),
        config_changed: tokio::sync::Notify::new(),
        last_fetch_success: AtomicU64::new(0),
    });

    let fetch_handle = tokio::spawn(fetch_task(Arc::clone(&state), client));
    let config_handle = tokio::spawn(config_watcher_task(Arc::clone(&state)));
    let web_handle = tokio::spawn(web::server::run(Arc::clone(&state)));

    info!("All tasks started");

    shutdown_signal().await;
    info!("Shutdown signal received");

    state.shutdown.cancel();

    let _ = fetch_handle.await;
    let _ = config_handle.await;
    let _ = web_handle.await;

    info!("Shutdown complete");
}

/// Find the config.json file (check CWD, then parent directory).
fn find_config_path() -> PathBuf {
    let candidates = [
        PathBuf::from("config.json"),
        PathBuf::from("../config.json"),
    ];
    for path in &candidates {
        if path.exists() {
            return path.clone();
        }
    }
    PathBuf::from("config.json")
}

/// Refetch every configured feed and publish the new snapshot.
async fn do_fetch<S: FeedSource>(
    poller: &mut FeedPoller<S>,
    state: &AppState,
    last_train_count: &mut Option<usize>,
) {
    let config = state.config.load_full();
    let previous = state.snapshot.load_full();

    let (snapshot, any_success) = poller.poll(&config.feed_urls, &previous).await;
    let train_count = snapshot.train_count();
    state.snapshot.store(Arc::new(snapshot));

    if any_success {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        state.last_fetch_success.store(now, Ordering::Relaxed);
    }

    if *last_train_count != Some(train_count) {
        info!("[FETCH] {} trains reconciled", train_count);
        *last_train_count = Some(train_count);
    }
}

/// Background fetch task: refetches on the configured interval or on config change.
async fn fetch_task<S: FeedSource>(state: Arc<AppState>, source: S) {
    let mut poller = FeedPoller::new(source);
    let mut last_train_count = None;

    info!("[FETCH] Background fetch task started");

    let mut period = state.config.load().refresh.trains_interval;
    let mut interval = tokio::time::interval(Duration::from_secs(period));

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                info!("[FETCH] Shutting down");
                break;
            }
            _ = state.config_changed.notified() => {
                let new_period = state.config.load().refresh.trains_interval;
                if new_period != period {
                    info!("[FETCH] Refresh interval now {}s", new_period);
                    period = new_period;
                    interval = tokio::time::interval(Duration::from_secs(period));
                }
                info!("[FETCH] Config changed, re-fetching");
                do_fetch(&mut poller, &state, &mut last_train_count).await;
            }
            _ = interval.tick() => {
                do_fetch(&mut poller, &state, &mut last_train_count).await;
            }
        }
    }
}

/// Config watcher: polls config file mtime every 5 seconds.
async fn config_watcher_task(state: Arc<AppState>) {
    let mut last_mtime = std::fs::metadata(&state.config_path)
        .and_then(|m| m.modified())
        .ok();

    let mut interval = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                info!("[CONFIG] Shutting down");
                break;
            }
            _ = interval.tick() => {
                let current_mtime = std::fs::metadata(&state.config_path)
                    .and_then(|m| m.modified())
                    .ok();

                if current_mtime != last_mtime {
                    info!("[CONFIG] File changed, reloading...");
                    match Config::load(&state.config_path) {
                        Ok(new_config) => {
                            info!(
                                "[CONFIG] Reloaded: routes: {}, {} feeds",
                                new_config.routes.join(","),
                                new_config.feed_urls.len()
                            );
                            if new_config.bind != state.config.load().bind {
                                warn!("[CONFIG] web.bind changes apply after restart");
                            }
                            state.config.store(Arc::new(new_config));
                            state.config_changed.notify_one();
                        }
                        Err(e) => {
                            warn!("[CONFIG] Reload failed: {}", e);
                        }
                    }
                    last_mtime = current_mtime;
                }
            }
        }
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl-C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use crate::mta::client::tests::StubSource;
    use crate::mta::index::tests::{feed, trip, update_entity, vehicle_entity};

    fn test_config() -> Config {
        Config::from_json(r#"{ "feeds": { "routes": ["1"], "urls": ["stub://extra"] } }"#)
            .expect("test config is valid")
    }

    pub(crate) fn make_state() -> Arc<AppState> {
        Arc::new(AppState {
            config: ArcSwap::from_pointee(test_config()),
            snapshot: ArcSwap::from_pointee(PositionSnapshot::empty()),
            config_path: PathBuf::from("config.json"),
            shutdown: CancellationToken::new(),
            config_changed: tokio::sync::Notify::new(),
            last_fetch_success: AtomicU64::new(0),
        })
    }

    fn stub_for(state: &AppState) -> StubSource {
        let urls = state.config.load().feed_urls.clone();
        StubSource::with(vec![
            (
                urls[0].as_str(),
                feed(vec![
                    vehicle_entity("1", trip("T1", "1"), "101N"),
                    update_entity("2", trip("T1", "1"), &["102N", "103N"]),
                ]),
            ),
            (
                urls[1].as_str(),
                feed(vec![update_entity("1", trip("T2", "1"), &["104N"])]),
            ),
        ])
    }

    #[tokio::test]
    async fn test_do_fetch_publishes_snapshot() {
        let state = make_state();
        let mut poller = FeedPoller::new(stub_for(&state));
        let mut last_count = None;

        do_fetch(&mut poller, &state, &mut last_count).await;

        let snapshot = state.snapshot.load();
        assert_eq!(snapshot.train_count(), 2);
        assert_eq!(snapshot.find_trip("T1").unwrap().next_stops.len(), 2);
        assert_eq!(last_count, Some(2));
        assert!(state.last_fetch_success.load(Ordering::Relaxed) > 0);
    }

    #[tokio::test]
    async fn test_do_fetch_failure_leaves_heartbeat() {
        let state = make_state();
        let mut poller = FeedPoller::new(StubSource::default());
        let mut last_count = None;

        do_fetch(&mut poller, &state, &mut last_count).await;

        assert_eq!(state.snapshot.load().train_count(), 0);
        assert_eq!(state.last_fetch_success.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_fetch_task_stops_on_shutdown() {
        let state = make_state();
        let handle = tokio::spawn(fetch_task(Arc::clone(&state), stub_for(&state)));

        // First interval tick fires immediately
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.snapshot.load().train_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("fetch task should publish a snapshot");

        state.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("fetch task should stop")
            .unwrap();
    }
}
