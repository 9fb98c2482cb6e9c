use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The KPI shape carried by a topic.
///
/// Each source system publishes its own record layout, so a topic is bound to
/// exactly one kind when its listener is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiKind {
    /// Per-port slices emitted by VOLTHA adapters.
    Voltha,
    /// Per-port counters emitted by ONOS.
    Onos,
    /// RADIUS statistics emitted by the ONOS AAA application.
    OnosAaa,
}

impl KpiKind {
    /// Short identifier used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            KpiKind::Voltha => "voltha",
            KpiKind::Onos => "onos",
            KpiKind::OnosAaa => "onos_aaa",
        }
    }
}

impl fmt::Display for KpiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded KPI record.
#[derive(Debug, Clone, PartialEq)]
pub enum Kpi {
    Voltha(VolthaKpi),
    Onos(OnosKpi),
    OnosAaa(OnosAaaKpi),
}

impl Kpi {
    /// The kind this record was decoded as.
    pub fn kind(&self) -> KpiKind {
        match self {
            Kpi::Voltha(_) => KpiKind::Voltha,
            Kpi::Onos(_) => KpiKind::Onos,
            Kpi::OnosAaa(_) => KpiKind::OnosAaa,
        }
    }
}

/// A VOLTHA KPI event: a batch of per-port slices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolthaKpi {
    /// Event type (e.g. "slice").
    #[serde(rename = "type", default)]
    pub event_type: String,

    /// Emission time in seconds since the epoch.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub ts: f64,

    /// One entry per reporting port.
    pub slice_data: Vec<SliceData>,
}

/// A single VOLTHA slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceData {
    #[serde(default)]
    pub metadata: SliceMetadata,

    #[serde(default)]
    pub metrics: VolthaMetrics,
}

/// Identity of the port a slice was measured on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceMetadata {
    pub title: String,
    pub logical_device_id: String,
    pub serial_no: String,
    pub device_id: String,
    pub context: HashMap<String, String>,
}

impl SliceMetadata {
    /// Look up a context entry, empty if absent.
    pub fn context_value(&self, key: &str) -> &str {
        self.context.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Counters reported for a VOLTHA port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolthaMetrics {
    #[serde(deserialize_with = "null_as_zero")]
    pub tx_bytes: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub rx_bytes: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub tx_packets: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub rx_packets: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub tx_error_packets: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub rx_error_packets: f64,
}

/// An ONOS port statistics event for one device.
///
/// ONOS producers emit both `camelCase` and `PascalCase` keys, so every field
/// accepts either spelling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnosKpi {
    #[serde(rename = "type", alias = "Type", default)]
    pub event_type: String,

    #[serde(alias = "Ts", default, deserialize_with = "null_as_zero")]
    pub ts: f64,

    #[serde(alias = "DeviceId")]
    pub device_id: String,

    #[serde(alias = "Ports")]
    pub ports: Vec<OnosPort>,
}

/// Counters reported for an ONOS port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OnosPort {
    #[serde(alias = "PortId")]
    pub port_id: String,
    #[serde(alias = "PktRx", deserialize_with = "null_as_zero")]
    pub pkt_rx: f64,
    #[serde(alias = "PktTx", deserialize_with = "null_as_zero")]
    pub pkt_tx: f64,
    #[serde(alias = "BytesRx", deserialize_with = "null_as_zero")]
    pub bytes_rx: f64,
    #[serde(alias = "BytesTx", deserialize_with = "null_as_zero")]
    pub bytes_tx: f64,
    #[serde(alias = "PktRxDrp", deserialize_with = "null_as_zero")]
    pub pkt_rx_drp: f64,
    #[serde(alias = "PktTxDrp", deserialize_with = "null_as_zero")]
    pub pkt_tx_drp: f64,
}

/// RADIUS statistics from the ONOS AAA application.
///
/// The AAA application publishes `PascalCase` keys; `camelCase` is accepted
/// as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OnosAaaKpi {
    #[serde(alias = "RxAcceptResponses", deserialize_with = "null_as_zero")]
    pub rx_accept_responses: f64,
    #[serde(alias = "RxRejectResponses", deserialize_with = "null_as_zero")]
    pub rx_reject_responses: f64,
    #[serde(alias = "RxChallengeResponses", deserialize_with = "null_as_zero")]
    pub rx_challenge_responses: f64,
    #[serde(alias = "TxAccessRequests", deserialize_with = "null_as_zero")]
    pub tx_access_requests: f64,
    #[serde(alias = "RxInvalidValidators", deserialize_with = "null_as_zero")]
    pub rx_invalid_validators: f64,
    #[serde(alias = "RxUnknownType", deserialize_with = "null_as_zero")]
    pub rx_unknown_type: f64,
    #[serde(alias = "PendingRequests", deserialize_with = "null_as_zero")]
    pub pending_requests: f64,
    #[serde(alias = "RxDroppedResponses", deserialize_with = "null_as_zero")]
    pub rx_dropped_responses: f64,
    #[serde(alias = "RxMalformedResponses", deserialize_with = "null_as_zero")]
    pub rx_malformed_responses: f64,
    #[serde(
        rename = "rxUnknownserver",
        alias = "RxUnknownserver",
        deserialize_with = "null_as_zero"
    )]
    pub rx_unknown_server: f64,
    #[serde(alias = "RequestRttMillis", deserialize_with = "null_as_zero")]
    pub request_rtt_millis: f64,
    #[serde(alias = "RequestReTx", deserialize_with = "null_as_zero")]
    pub request_re_tx: f64,
}

/// A JSON `null` counter reads as zero, like an absent one.
fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Option::<f64>::deserialize(deserializer).map(Option::unwrap_or_default)
}
