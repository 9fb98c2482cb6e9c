//! Metric registry backing the scrape endpoint.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::{Metric, Registry};
use thiserror::Error;
use tracing::debug;

/// A gauge holding the latest `f64` value.
pub type FloatGauge = Gauge<f64, AtomicU64>;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Metric '{0}' is already registered")]
    Duplicate(String),

    #[error("Failed to encode metrics: {0}")]
    Encode(#[from] std::fmt::Error),
}

struct Inner {
    registry: Registry,
    names: HashSet<String>,
}

/// Registry of named instruments, each registered exactly once.
pub struct MetricRegistry {
    inner: RwLock<Inner>,
}

/// Shareable registry handle.
pub type SharedRegistry = Arc<MetricRegistry>;

impl MetricRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                registry: Registry::default(),
                names: HashSet::new(),
            }),
        }
    }

    /// Register an unlabelled gauge.
    pub fn gauge(&self, name: &str, help: &str) -> Result<FloatGauge, RegistryError> {
        let gauge = FloatGauge::default();
        self.register(name, help, gauge.clone())?;
        Ok(gauge)
    }

    /// Register a gauge family keyed by a label set.
    pub fn gauge_family<L>(
        &self,
        name: &str,
        help: &str,
    ) -> Result<Family<L, FloatGauge>, RegistryError>
    where
        L: EncodeLabelSet + Clone + Hash + Eq + Debug + Send + Sync + 'static,
    {
        let family = Family::<L, FloatGauge>::default();
        self.register(name, help, family.clone())?;
        Ok(family)
    }

    /// Register a counter family keyed by a label set.
    ///
    /// The exposition format appends `_total` to counter names.
    pub fn counter_family<L>(
        &self,
        name: &str,
        help: &str,
    ) -> Result<Family<L, Counter>, RegistryError>
    where
        L: EncodeLabelSet + Clone + Hash + Eq + Debug + Send + Sync + 'static,
    {
        let family = Family::<L, Counter>::default();
        self.register(name, help, family.clone())?;
        Ok(family)
    }

    fn register(&self, name: &str, help: &str, metric: impl Metric) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        if !inner.names.insert(name.to_string()) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }

        inner.registry.register(name, help, metric);
        debug!(metric = name, "Registered metric");
        Ok(())
    }

    /// Number of registered metrics.
    pub fn metric_count(&self) -> usize {
        self.inner.read().names.len()
    }

    /// Render every registered metric in the text exposition format.
    pub fn render(&self) -> Result<String, RegistryError> {
        let inner = self.inner.read();
        let mut output = String::new();
        encode(&mut output, &inner.registry)?;
        Ok(output)
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the value of a sample in rendered exposition text.
///
/// `series` is the metric name followed by its label block, if any, exactly
/// as rendered (e.g. `onos_rx_bytes_total{device_id="of:1",port_id="2"}`).
/// Test support for scraping assertions; not part of the exporter API.
#[doc(hidden)]
pub fn sample_value(exposition: &str, series: &str) -> Option<f64> {
    exposition
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let (name, value) = line.rsplit_once(' ')?;
            (name == series).then(|| value.parse().ok()).flatten()
        })
}
