use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use seekbridge::core::config::{AppConfig, SourceBackend};
use seekbridge::core::shutdown::{ShutdownCoordinator, HTTP_DRAIN_TIMEOUT_SECS};
use seekbridge::delivery::router::{self, AppState};
use seekbridge::observability::metrics as obs_metrics;
use seekbridge::source::directory::DirectorySource;
use seekbridge::source::memory::InMemoryRemote;
use seekbridge::source::retry::RetryingFetch;
use seekbridge::source::RemoteClient;

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration (layered: default.toml → {env}.toml → env vars)
    let config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    info!(version = env!("CARGO_PKG_VERSION"), "seekbridge starting");

    // Must be installed before any metrics are recorded.
    let metrics_handle = if config.observability.metrics_enabled {
        match obs_metrics::install_prometheus_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "failed to install Prometheus recorder, metrics disabled");
                None
            }
        }
    } else {
        None
    };

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        obs_metrics::inc_panic_total();
        let backtrace = std::backtrace::Backtrace::force_capture();
        eprintln!("PANIC: {info}\nBacktrace:\n{backtrace}");
        default_hook(info);
    }));

    obs_metrics::describe_all_metrics();

    let shutdown = ShutdownCoordinator::new();

    let result = match config.source.backend {
        SourceBackend::Memory => {
            info!("using in-memory source (empty catalog)");
            let remote = RetryingFetch::from_config(InMemoryRemote::new(), &config.streaming);
            serve(remote, config, metrics_handle, shutdown).await
        }
        SourceBackend::Directory => {
            let opened = DirectorySource::open(&config.source.root).await;
            match opened {
                Ok(source) => {
                    info!(
                        root = %source.root().display(),
                        objects = source.object_count(),
                        "using directory source"
                    );
                    let remote = RetryingFetch::from_config(source, &config.streaming);
                    serve(remote, config, metrics_handle, shutdown).await
                }
                Err(e) => Err(anyhow::anyhow!(
                    "failed to open source root {}: {}",
                    config.source.root.display(),
                    e
                )),
            }
        }
    };

    match result {
        Ok(()) => {
            info!("graceful shutdown completed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "seekbridge terminated with an error");
            ExitCode::FAILURE
        }
    }
}

/// Bind, serve until a shutdown signal arrives, then give open streams
/// `HTTP_DRAIN_TIMEOUT_SECS` to finish.
async fn serve<R: RemoteClient>(
    remote: R,
    config: AppConfig,
    metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
    shutdown: ShutdownCoordinator,
) -> anyhow::Result<()> {
    let http_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid HTTP bind address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let delivery = config.delivery.clone();
    let app_state = AppState::new(Arc::new(remote), config, metrics_handle);
    let start_time = app_state.start_time;
    let app = router::build_router(app_state, &delivery);

    let uptime_cancel = shutdown.token();
    tokio::spawn(async move {
        obs_metrics::run_uptime_task(start_time, uptime_cancel).await;
    });

    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {http_addr}"))?;
    info!(%http_addr, "HTTP server listening");

    let shutdown_token = shutdown.token();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await
    });

    let signal_waiter = shutdown.clone();
    tokio::spawn(async move {
        signal_waiter.wait_for_signal_and_shutdown().await;
    });

    let stop = shutdown.token();
    tokio::select! {
        joined = &mut server => {
            // The server only returns on its own when it failed.
            return match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("HTTP server error")),
                Err(e) => Err(anyhow::Error::new(e).context("HTTP server task failed")),
            };
        }
        _ = stop.cancelled() => {}
    }

    obs_metrics::set_shutdown_in_progress(true);
    info!(
        "draining open streams ({}s timeout)",
        HTTP_DRAIN_TIMEOUT_SECS
    );
    match tokio::time::timeout(Duration::from_secs(HTTP_DRAIN_TIMEOUT_SECS), server).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(anyhow::Error::new(e).context("HTTP server error during drain")),
        Ok(Err(e)) => Err(anyhow::Error::new(e).context("HTTP server task failed")),
        Err(_) => {
            warn!(
                "drain timed out after {}s, closing remaining streams",
                HTTP_DRAIN_TIMEOUT_SECS
            );
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str, log_format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .pretty()
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
