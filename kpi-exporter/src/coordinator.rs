//! Listener coordinator.
//!
//! The [`Coordinator`] opens the single shared bus connection, starts one
//! [`TopicListener`] per configured topic, waits for every listener to
//! terminate and then closes the connection. A failed listener does not
//! cancel its siblings; only the shutdown signal does.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use kpi_common::KpiKind;

use crate::bus::{BusConnector, BusError, MessageBus};
use crate::exporter::SharedExporter;
use crate::listener::{ListenerMetrics, ListenerOutcome, TopicListener};
use crate::status::{ListenerState, ListenerStatus};

/// Coordinator errors.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Failed to connect to the message bus: {0}")]
    Connect(#[source] BusError),

    #[error("Failed to close the message bus connection: {0}")]
    Close(#[source] BusError),

    #[error("Bus connection still referenced after all listeners stopped")]
    ConnectionInUse,
}

/// Terminal state of every listener after a coordinator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorReport {
    pub listeners: Vec<(String, ListenerState)>,
}

impl CoordinatorReport {
    /// Topics whose listener failed, with the reason.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.listeners.iter().filter_map(|(topic, state)| match state {
            ListenerState::Failed(reason) => Some((topic.as_str(), reason.as_str())),
            _ => None,
        })
    }

    /// Whether every listener completed without failure.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Owns the bus connection and the lifetime of the topic listeners.
pub struct Coordinator {
    bindings: Vec<(String, KpiKind)>,
    exporter: SharedExporter,
    metrics: ListenerMetrics,
    status: ListenerStatus,
}

impl Coordinator {
    /// Create a coordinator for the given topic bindings.
    pub fn new(
        bindings: Vec<(String, KpiKind)>,
        exporter: SharedExporter,
        metrics: ListenerMetrics,
    ) -> Self {
        let status = ListenerStatus::new(bindings.iter().map(|(topic, _)| topic.clone()));
        Self {
            bindings,
            exporter,
            metrics,
            status,
        }
    }

    /// Shared view of the listener states.
    pub fn status(&self) -> ListenerStatus {
        self.status.clone()
    }

    /// Run every listener to completion on one shared connection.
    ///
    /// Returns once all listeners have terminated and the connection has been
    /// closed. If the connection cannot be opened no listener is started.
    pub async fn run<C: BusConnector>(
        &self,
        connector: &C,
        shutdown: watch::Receiver<bool>,
    ) -> Result<CoordinatorReport, CoordinatorError> {
        let bus = connector.connect().await.map_err(|err| {
            error!(error = %err, "Failed to connect to the message bus");
            CoordinatorError::Connect(err)
        })?;
        let bus = Arc::new(bus);

        let mut handles = Vec::with_capacity(self.bindings.len());
        for (topic, kind) in &self.bindings {
            let listener = TopicListener::new(
                topic.clone(),
                *kind,
                Arc::clone(&bus),
                Arc::clone(&self.exporter),
                self.metrics.clone(),
            );

            let status = self.status.clone();
            let task_topic = topic.clone();
            let task_shutdown = shutdown.clone();

            self.status.set(topic, ListenerState::Running);
            let handle = tokio::spawn(async move {
                let outcome = listener.run(task_shutdown).await;
                status.set(&task_topic, terminal_state(&outcome));
                outcome
            });
            handles.push((topic.clone(), handle));
        }

        info!(listeners = handles.len(), "Started topic listeners");

        let mut listeners = Vec::with_capacity(handles.len());
        for (topic, handle) in handles {
            let state = match handle.await {
                Ok(outcome) => terminal_state(&outcome),
                Err(join_err) => {
                    let state =
                        ListenerState::Failed(format!("listener task panicked: {join_err}"));
                    self.status.set(&topic, state.clone());
                    state
                }
            };
            listeners.push((topic, state));
        }

        let bus = Arc::try_unwrap(bus).map_err(|_| CoordinatorError::ConnectionInUse)?;
        bus.close().map_err(|err| {
            error!(error = %err, "Failed to close the message bus connection");
            CoordinatorError::Close(err)
        })?;

        let report = CoordinatorReport { listeners };
        for (topic, reason) in report.failures() {
            warn!(topic, reason, "Listener ended with failure");
        }
        info!(success = report.is_success(), "All topic listeners stopped");

        Ok(report)
    }
}

fn terminal_state(outcome: &ListenerOutcome) -> ListenerState {
    match outcome {
        ListenerOutcome::Completed => ListenerState::Completed,
        ListenerOutcome::Failed(err) => ListenerState::Failed(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bus::MemoryBroker;
    use crate::exporter::KpiExporter;
    use crate::registry::MetricRegistry;

    fn bindings() -> Vec<(String, KpiKind)> {
        vec![
            ("voltha.kpis".to_string(), KpiKind::Voltha),
            ("onos.kpis".to_string(), KpiKind::Onos),
            ("onos.aaa.stats.kpis".to_string(), KpiKind::OnosAaa),
        ]
    }

    fn make_coordinator() -> Coordinator {
        let registry = MetricRegistry::new();
        let exporter = Arc::new(KpiExporter::register(&registry).unwrap());
        let metrics = ListenerMetrics::register(&registry).unwrap();
        Coordinator::new(bindings(), exporter, metrics)
    }

    #[tokio::test]
    async fn test_connect_failure_starts_no_listeners() {
        let broker = MemoryBroker::new();
        broker.refuse_connections("no brokers");
        let coordinator = make_coordinator();

        let result = coordinator.run(&broker, watch::channel(false).1).await;

        assert!(matches!(result, Err(CoordinatorError::Connect(_))));
        assert_eq!(broker.connections_opened(), 0);
        assert!(
            coordinator
                .status()
                .snapshot()
                .values()
                .all(|state| *state == ListenerState::NotStarted)
        );
    }

    #[tokio::test]
    async fn test_missing_topic_fails_without_blocking_others() {
        let broker = MemoryBroker::new();
        broker.create_topic("voltha.kpis", 1);
        broker.create_topic("onos.aaa.stats.kpis", 2);
        broker.close_topic("voltha.kpis").unwrap();
        broker.close_topic("onos.aaa.stats.kpis").unwrap();
        let coordinator = make_coordinator();

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            coordinator.run(&broker, watch::channel(false).1),
        )
        .await
        .expect("coordinator hung")
        .unwrap();

        let failures: Vec<_> = report.failures().map(|(topic, _)| topic).collect();
        assert_eq!(failures, vec!["onos.kpis"]);
        assert!(!report.is_success());
        assert_eq!(
            coordinator.status().get("voltha.kpis"),
            Some(ListenerState::Completed)
        );
        assert_eq!(broker.connections_opened(), 1);
        assert_eq!(broker.connections_closed(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_every_listener() {
        let broker = MemoryBroker::new();
        for (topic, _) in bindings() {
            broker.create_topic(topic, 1);
        }
        let coordinator = make_coordinator();
        let status = coordinator.status();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let trigger = async {
            while !status.all_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            shutdown_tx.send(true).unwrap();
        };
        let (result, ()) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(coordinator.run(&broker, shutdown_rx), trigger) },
        )
        .await
        .expect("coordinator did not stop");

        let report = result.unwrap();
        assert!(report.is_success());
        assert_eq!(report.listeners.len(), 3);
        assert!(
            report
                .listeners
                .iter()
                .all(|(_, state)| *state == ListenerState::Completed)
        );
        assert_eq!(broker.connections_closed(), 1);
    }

    #[tokio::test]
    async fn test_no_bindings_closes_connection() {
        let registry = MetricRegistry::new();
        let exporter = Arc::new(KpiExporter::register(&registry).unwrap());
        let metrics = ListenerMetrics::register(&registry).unwrap();
        let coordinator = Coordinator::new(Vec::new(), exporter, metrics);
        let broker = MemoryBroker::new();

        let report = coordinator
            .run(&broker, watch::channel(false).1)
            .await
            .unwrap();

        assert!(report.listeners.is_empty());
        assert_eq!(broker.connections_closed(), 1);
    }

    #[test]
    fn test_report_failures() {
        let report = CoordinatorReport {
            listeners: vec![
                ("a".to_string(), ListenerState::Completed),
                ("b".to_string(), ListenerState::Failed("gone".to_string())),
            ],
        };

        assert_eq!(report.failures().collect::<Vec<_>>(), vec![("b", "gone")]);
        assert!(!report.is_success());
    }
}
