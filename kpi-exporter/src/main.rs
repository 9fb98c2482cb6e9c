//! Prometheus exporter for VOLTHA and ONOS KPI telemetry.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use kpi_exporter::{
    Coordinator, CoordinatorError, CoordinatorReport, ExporterConfig, HttpServer,
    KafkaConnector, KpiExporter, ListenerMetrics, MetricRegistry,
};

/// Prometheus exporter for VOLTHA and ONOS KPI telemetry.
#[derive(Parser, Debug)]
#[command(name = "kpi-exporter")]
#[command(about = "Export VOLTHA and ONOS KPIs from Kafka as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// Kafka broker address (overrides config).
    #[arg(long)]
    broker: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error; overrides config).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    if let Some(broker) = args.broker {
        config.kafka.broker = broker;
    }
    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    kpi_common::init_tracing(&config.logging)?;

    info!("Starting KPI exporter");
    info!(
        broker = %config.kafka.broker,
        voltha = %config.topics.voltha,
        onos = %config.topics.onos,
        onos_aaa = %config.topics.onos_aaa,
        "Kafka topics"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Every instrument is registered before any listener starts
    let registry = Arc::new(MetricRegistry::new());
    let exporter = Arc::new(KpiExporter::register(&registry)?);
    let metrics = ListenerMetrics::register(&registry)?;
    info!(metrics = registry.metric_count(), "Registered metrics");

    let coordinator = Coordinator::new(config.topics.bindings(), exporter, metrics);
    let http_server = HttpServer::new(
        Arc::clone(&registry),
        coordinator.status(),
        config.prometheus.listen_addr()?,
        config.prometheus.path.clone(),
    );

    // Start the listeners
    let connector = KafkaConnector::new(config.kafka.clone());
    let coordinator_shutdown = shutdown_rx.clone();
    let coordinator_task =
        tokio::spawn(async move { coordinator.run(&connector, coordinator_shutdown).await });

    // Start HTTP server
    let http_task = tokio::spawn(http_server.run(shutdown_rx));

    let signal = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
            _ = terminate_signal() => info!("Received SIGTERM, shutting down..."),
        }
    };

    let exit_code = supervise(
        coordinator_task,
        http_task,
        signal,
        shutdown_tx,
        SHUTDOWN_TIMEOUT,
    )
    .await;

    info!("Exporter stopped");
    Ok(exit_code)
}

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type CoordinatorTask = JoinHandle<Result<CoordinatorReport, CoordinatorError>>;
type HttpTask = JoinHandle<anyhow::Result<()>>;

/// Wait for a shutdown signal or for either task to stop on its own, then
/// stop the other one.
///
/// The HTTP server stopping by itself (bind failure, serve error) is always a
/// failure. Otherwise the exit code reflects the coordinator's report.
async fn supervise(
    mut coordinator_task: CoordinatorTask,
    mut http_task: HttpTask,
    signal: impl Future<Output = ()>,
    shutdown_tx: watch::Sender<bool>,
    timeout: Duration,
) -> ExitCode {
    let stopped = tokio::select! {
        _ = signal => Stopped::Signal,
        result = &mut coordinator_task => Stopped::Coordinator(result),
        result = &mut http_task => Stopped::Http(result),
    };

    let _ = shutdown_tx.send(true);

    match stopped {
        Stopped::Signal => {
            let code = wait_for_coordinator(&mut coordinator_task, timeout).await;
            let _ = tokio::time::timeout(timeout, http_task).await;
            code
        }
        Stopped::Coordinator(result) => {
            warn!("Coordinator finished on its own, shutting down");
            let code = coordinator_exit_code(result);
            let _ = tokio::time::timeout(timeout, http_task).await;
            code
        }
        Stopped::Http(result) => {
            match result {
                Ok(Ok(())) => error!("HTTP server stopped unexpectedly"),
                Ok(Err(e)) => error!("HTTP server error: {}", e),
                Err(e) => error!(error = %e, "HTTP server task failed"),
            }
            let _ = wait_for_coordinator(&mut coordinator_task, timeout).await;
            ExitCode::FAILURE
        }
    }
}

/// What ended the main wait.
enum Stopped {
    Signal,
    Coordinator(CoordinatorResult),
    Http(Result<anyhow::Result<()>, JoinError>),
}

/// Wait for the listeners to stop after shutdown was requested.
///
/// A coordinator that does not stop in time is aborted and counts as a
/// failure.
async fn wait_for_coordinator(task: &mut CoordinatorTask, timeout: Duration) -> ExitCode {
    match tokio::time::timeout(timeout, &mut *task).await {
        Ok(result) => coordinator_exit_code(result),
        Err(_) => {
            error!("Timed out waiting for topic listeners to stop");
            task.abort();
            ExitCode::FAILURE
        }
    }
}

type CoordinatorResult = Result<Result<CoordinatorReport, CoordinatorError>, JoinError>;

/// Map the coordinator's result to the process exit code.
fn coordinator_exit_code(result: CoordinatorResult) -> ExitCode {
    match result {
        Ok(Ok(report)) if report.is_success() => ExitCode::SUCCESS,
        Ok(Ok(report)) => {
            for (topic, reason) in report.failures() {
                error!(topic, reason, "Topic listener failed");
            }
            ExitCode::FAILURE
        }
        Ok(Err(e)) => {
            error!(error = %e, "Coordinator failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Coordinator task failed");
            ExitCode::FAILURE
        }
    }
}

async fn terminate_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpi_exporter::ListenerState;

    const TEST_TIMEOUT: Duration = Duration::from_millis(200);

    fn report(state: ListenerState) -> CoordinatorReport {
        CoordinatorReport {
            listeners: vec![("onos.kpis".to_string(), state)],
        }
    }

    /// A coordinator that completes once shutdown is requested.
    fn coordinator_until_shutdown(mut shutdown: watch::Receiver<bool>) -> CoordinatorTask {
        tokio::spawn(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
            Ok(report(ListenerState::Completed))
        })
    }

    /// An HTTP server that runs until shutdown is requested.
    fn http_until_shutdown(mut shutdown: watch::Receiver<bool>) -> HttpTask {
        tokio::spawn(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_signal_with_clean_listeners_succeeds() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let coordinator = coordinator_until_shutdown(shutdown_rx.clone());
        let http = http_until_shutdown(shutdown_rx);

        let code = supervise(coordinator, http, async {}, shutdown_tx, TEST_TIMEOUT).await;
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn test_http_failure_exits_non_zero() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let coordinator = coordinator_until_shutdown(shutdown_rx.clone());
        let http: HttpTask =
            tokio::spawn(async { Err(anyhow::anyhow!("Failed to bind to 0.0.0.0:8080")) });

        let code = supervise(
            coordinator,
            http,
            std::future::pending(),
            shutdown_tx,
            TEST_TIMEOUT,
        )
        .await;

        assert_eq!(code, ExitCode::FAILURE);
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_stuck_coordinator_exits_non_zero() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let coordinator: CoordinatorTask = tokio::spawn(async {
            std::future::pending::<()>().await;
            Ok(report(ListenerState::Completed))
        });
        let http = http_until_shutdown(shutdown_rx);

        let code = supervise(coordinator, http, async {}, shutdown_tx, TEST_TIMEOUT).await;
        assert_eq!(code, ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn test_failed_listener_exits_non_zero() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let coordinator: CoordinatorTask =
            tokio::spawn(async { Ok(report(ListenerState::Failed("unknown topic".into()))) });
        let http = http_until_shutdown(shutdown_rx.clone());

        let code = supervise(
            coordinator,
            http,
            std::future::pending(),
            shutdown_tx,
            TEST_TIMEOUT,
        )
        .await;

        assert_eq!(code, ExitCode::FAILURE);
        assert!(*shutdown_rx.borrow());
    }
}
