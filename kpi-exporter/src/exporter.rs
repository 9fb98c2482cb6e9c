//! Per-shape exporters mapping decoded KPI records onto registered gauges.
//!
//! Every gauge is registered once, up front, by [`KpiExporter::register`].
//! Exporting a record is a sequence of independent "set" operations; the last
//! write for a series wins.

use std::sync::Arc;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use tracing::trace;

use kpi_common::{Kpi, OnosAaaKpi, OnosKpi, SliceMetadata, VolthaKpi};

use crate::registry::{FloatGauge, MetricRegistry, RegistryError};

/// Labels identifying a VOLTHA port series.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct VolthaLabels {
    pub title: String,
    pub logical_device_id: String,
    pub serial_number: String,
    pub device_id: String,
    pub intf_id: String,
    pub pon_id: String,
    pub port_number: String,
}

impl From<&SliceMetadata> for VolthaLabels {
    fn from(metadata: &SliceMetadata) -> Self {
        Self {
            title: metadata.title.clone(),
            logical_device_id: metadata.logical_device_id.clone(),
            serial_number: metadata.serial_no.clone(),
            device_id: metadata.device_id.clone(),
            intf_id: metadata.context_value("intf_id").to_string(),
            pon_id: metadata.context_value("pon_id").to_string(),
            port_number: metadata.context_value("port_no").to_string(),
        }
    }
}

/// Labels identifying an ONOS port series.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OnosLabels {
    pub device_id: String,
    pub port_id: String,
}

type GaugeFamily<L> = Family<L, FloatGauge>;

/// Gauges for VOLTHA port slices.
pub struct VolthaGauges {
    tx_bytes: GaugeFamily<VolthaLabels>,
    rx_bytes: GaugeFamily<VolthaLabels>,
    tx_packets: GaugeFamily<VolthaLabels>,
    rx_packets: GaugeFamily<VolthaLabels>,
    tx_error_packets: GaugeFamily<VolthaLabels>,
    rx_error_packets: GaugeFamily<VolthaLabels>,
}

impl VolthaGauges {
    /// Register the VOLTHA gauges.
    pub fn register(registry: &MetricRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            tx_bytes: registry
                .gauge_family("voltha_tx_bytes_total", "Number of total bytes transmitted")?,
            rx_bytes: registry
                .gauge_family("voltha_rx_bytes_total", "Number of total bytes received")?,
            tx_packets: registry
                .gauge_family("voltha_tx_packets_total", "Number of total packets transmitted")?,
            rx_packets: registry
                .gauge_family("voltha_rx_packets_total", "Number of total packets received")?,
            tx_error_packets: registry.gauge_family(
                "voltha_tx_error_packets_total",
                "Number of total transmitted packets with errors",
            )?,
            rx_error_packets: registry.gauge_family(
                "voltha_rx_error_packets_total",
                "Number of total received packets with errors",
            )?,
        })
    }

    /// Export every slice of a VOLTHA event.
    pub fn export(&self, kpi: &VolthaKpi) {
        for slice in &kpi.slice_data {
            let labels = VolthaLabels::from(&slice.metadata);
            let metrics = &slice.metrics;

            self.tx_bytes.get_or_create(&labels).set(metrics.tx_bytes);
            self.rx_bytes.get_or_create(&labels).set(metrics.rx_bytes);
            self.tx_packets.get_or_create(&labels).set(metrics.tx_packets);
            self.rx_packets.get_or_create(&labels).set(metrics.rx_packets);
            self.tx_error_packets
                .get_or_create(&labels)
                .set(metrics.tx_error_packets);
            self.rx_error_packets
                .get_or_create(&labels)
                .set(metrics.rx_error_packets);
        }
    }
}

/// Gauges for ONOS port statistics.
pub struct OnosGauges {
    tx_bytes: GaugeFamily<OnosLabels>,
    rx_bytes: GaugeFamily<OnosLabels>,
    tx_packets: GaugeFamily<OnosLabels>,
    rx_packets: GaugeFamily<OnosLabels>,
    tx_drop_packets: GaugeFamily<OnosLabels>,
    rx_drop_packets: GaugeFamily<OnosLabels>,
}

impl OnosGauges {
    /// Register the ONOS gauges.
    pub fn register(registry: &MetricRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            tx_bytes: registry
                .gauge_family("onos_tx_bytes_total", "Number of total bytes transmitted")?,
            rx_bytes: registry
                .gauge_family("onos_rx_bytes_total", "Number of total bytes received")?,
            tx_packets: registry
                .gauge_family("onos_tx_packets_total", "Number of total packets transmitted")?,
            rx_packets: registry
                .gauge_family("onos_rx_packets_total", "Number of total packets received")?,
            tx_drop_packets: registry.gauge_family(
                "onos_tx_drop_packets_total",
                "Number of total transmitted packets dropped",
            )?,
            rx_drop_packets: registry.gauge_family(
                "onos_rx_drop_packets_total",
                "Number of total received packets dropped",
            )?,
        })
    }

    /// Export every port of an ONOS event.
    pub fn export(&self, kpi: &OnosKpi) {
        for port in &kpi.ports {
            let labels = OnosLabels {
                device_id: kpi.device_id.clone(),
                port_id: port.port_id.clone(),
            };

            self.tx_bytes.get_or_create(&labels).set(port.bytes_tx);
            self.rx_bytes.get_or_create(&labels).set(port.bytes_rx);
            self.tx_packets.get_or_create(&labels).set(port.pkt_tx);
            self.rx_packets.get_or_create(&labels).set(port.pkt_rx);
            self.tx_drop_packets
                .get_or_create(&labels)
                .set(port.pkt_tx_drp);
            self.rx_drop_packets
                .get_or_create(&labels)
                .set(port.pkt_rx_drp);
        }
    }
}

/// Gauges for ONOS AAA RADIUS statistics.
pub struct OnosAaaGauges {
    rx_accept_responses: FloatGauge,
    rx_reject_responses: FloatGauge,
    rx_challenge_responses: FloatGauge,
    tx_access_requests: FloatGauge,
    rx_invalid_validators: FloatGauge,
    rx_unknown_type: FloatGauge,
    pending_requests: FloatGauge,
    rx_dropped_responses: FloatGauge,
    rx_malformed_responses: FloatGauge,
    rx_unknown_server: FloatGauge,
    request_rtt_millis: FloatGauge,
    request_re_tx: FloatGauge,
}

impl OnosAaaGauges {
    /// Register the ONOS AAA gauges.
    pub fn register(registry: &MetricRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            rx_accept_responses: registry.gauge(
                "onosaaa_rx_accept_responses",
                "Number of access accept packets received from the server",
            )?,
            rx_reject_responses: registry.gauge(
                "onosaaa_rx_reject_responses",
                "Number of access reject packets received from the server",
            )?,
            rx_challenge_responses: registry.gauge(
                "onosaaa_rx_challenge_response",
                "Number of access challenge packets received from the server",
            )?,
            tx_access_requests: registry.gauge(
                "onosaaa_tx_access_requests",
                "Number of access request packets sent to the server",
            )?,
            rx_invalid_validators: registry.gauge(
                "onosaaa_rx_invalid_validators",
                "Number of access response packets received from the server with an invalid validator",
            )?,
            rx_unknown_type: registry.gauge(
                "onosaaa_rx_unknown_type",
                "Number of packets of an unknown RADIUS type received from the accounting server",
            )?,
            pending_requests: registry.gauge(
                "onosaaa_pending_responses",
                "Number of access request packets pending a response from the server",
            )?,
            rx_dropped_responses: registry.gauge(
                "onosaaa_rx_dropped_responses",
                "Number of dropped packets received from the accounting server",
            )?,
            rx_malformed_responses: registry.gauge(
                "onosaaa_rx_malformed_responses",
                "Number of malformed access response packets received from the server",
            )?,
            rx_unknown_server: registry.gauge(
                "onosaaa_rx_from_unknown_server",
                "Number of packets received from an unknown server",
            )?,
            request_rtt_millis: registry.gauge(
                "onosaaa_request_rttmillis",
                "Roundtrip packet time to the accounting server in milliseconds",
            )?,
            request_re_tx: registry.gauge(
                "onosaaa_request_re_tx",
                "Number of access request packets retransmitted to the server",
            )?,
        })
    }

    /// Export an ONOS AAA statistics record.
    pub fn export(&self, kpi: &OnosAaaKpi) {
        self.rx_accept_responses.set(kpi.rx_accept_responses);
        self.rx_reject_responses.set(kpi.rx_reject_responses);
        self.rx_challenge_responses.set(kpi.rx_challenge_responses);
        self.tx_access_requests.set(kpi.tx_access_requests);
        self.rx_invalid_validators.set(kpi.rx_invalid_validators);
        self.rx_unknown_type.set(kpi.rx_unknown_type);
        self.pending_requests.set(kpi.pending_requests);
        self.rx_dropped_responses.set(kpi.rx_dropped_responses);
        self.rx_malformed_responses.set(kpi.rx_malformed_responses);
        self.rx_unknown_server.set(kpi.rx_unknown_server);
        self.request_rtt_millis.set(kpi.request_rtt_millis);
        self.request_re_tx.set(kpi.request_re_tx);
    }
}

/// Dispatches decoded records to the gauge set of their shape.
pub struct KpiExporter {
    voltha: VolthaGauges,
    onos: OnosGauges,
    onos_aaa: OnosAaaGauges,
}

/// Shareable exporter handle.
pub type SharedExporter = Arc<KpiExporter>;

impl KpiExporter {
    /// Register the gauges of every shape.
    ///
    /// Fails if any gauge name is already taken, so a bad registry is caught
    /// at startup rather than while processing messages.
    pub fn register(registry: &MetricRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            voltha: VolthaGauges::register(registry)?,
            onos: OnosGauges::register(registry)?,
            onos_aaa: OnosAaaGauges::register(registry)?,
        })
    }

    /// Export one decoded record.
    pub fn export(&self, kpi: &Kpi) {
        trace!(kind = %kpi.kind(), "Exporting KPI record");

        match kpi {
            Kpi::Voltha(kpi) => self.voltha.export(kpi),
            Kpi::Onos(kpi) => self.onos.export(kpi),
            Kpi::OnosAaa(kpi) => self.onos_aaa.export(kpi),
        }
    }
}
