//! Decoding of raw KPI payloads.
//!
//! Every source system publishes JSON. Decoding first checks the structural
//! markers a shape requires, then maps the object onto the typed record.
//! Numeric fields that are absent or `null` decode to `0.0`. Structural
//! markers are matched regardless of key case.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::kpi::{Kpi, KpiKind, OnosAaaKpi, OnosKpi, VolthaKpi};

impl KpiKind {
    /// Decode a payload as this kind.
    pub fn decode(&self, payload: &[u8]) -> Result<Kpi, DecodeError> {
        match self {
            KpiKind::Voltha => decode_voltha(payload).map(Kpi::Voltha),
            KpiKind::Onos => decode_onos(payload).map(Kpi::Onos),
            KpiKind::OnosAaa => decode_onos_aaa(payload).map(Kpi::OnosAaa),
        }
    }
}

/// Decode a VOLTHA KPI event. Requires `slice_data`.
pub fn decode_voltha(payload: &[u8]) -> Result<VolthaKpi, DecodeError> {
    decode_object(payload, "voltha", &["slice_data"])
}

/// Decode an ONOS port statistics event. Requires `deviceId` and `ports`.
pub fn decode_onos(payload: &[u8]) -> Result<OnosKpi, DecodeError> {
    decode_object(payload, "onos", &["deviceId", "ports"])
}

/// Decode an ONOS AAA statistics event.
pub fn decode_onos_aaa(payload: &[u8]) -> Result<OnosAaaKpi, DecodeError> {
    decode_object(payload, "onos_aaa", &[])
}

fn decode_object<T: DeserializeOwned>(
    payload: &[u8],
    kind: &'static str,
    required: &[&'static str],
) -> Result<T, DecodeError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|source| DecodeError::Malformed { kind, source })?;

    let object: &Map<String, Value> = value
        .as_object()
        .ok_or(DecodeError::NotAnObject { kind })?;

    for &field in required {
        if !object.keys().any(|key| key.eq_ignore_ascii_case(field)) {
            return Err(DecodeError::MissingField { kind, field });
        }
    }

    serde_json::from_value(value).map_err(|source| DecodeError::Malformed { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    const AAA_PAYLOAD: &str = r#"{
        "rxAcceptResponses": 12,
        "rxRejectResponses": 1,
        "rxChallengeResponses": 3,
        "txAccessRequests": 5,
        "rxInvalidValidators": 0,
        "rxUnknownType": 0,
        "pendingRequests": 2,
        "rxDroppedResponses": 0,
        "rxMalformedResponses": 0,
        "rxUnknownserver": 0,
        "requestRttMillis": 23.4,
        "requestReTx": 1
    }"#;

    const VOLTHA_PAYLOAD: &str = r#"{
        "type": "slice",
        "ts": 1534966011.48,
        "slice_data": [
            {
                "metadata": {
                    "title": "Ethernet",
                    "logical_device_id": "0001c4b7f6bd1e0d",
                    "serial_no": "BBSM00000001",
                    "device_id": "0001f2b4aef8d9c1",
                    "context": { "intf_id": "1", "pon_id": "0", "port_no": "128" }
                },
                "metrics": {
                    "tx_bytes": 1024,
                    "rx_bytes": 2048,
                    "tx_packets": 8,
                    "rx_packets": 16,
                    "tx_error_packets": 0,
                    "rx_error_packets": 1
                }
            }
        ]
    }"#;

    const ONOS_PAYLOAD: &str = r#"{
        "type": "Device",
        "ts": 1534966011.48,
        "deviceId": "of:0000000000000001",
        "ports": [
            { "portId": "1", "pktRx": 10, "pktTx": 20, "bytesRx": 100,
              "bytesTx": 200, "pktRxDrp": 1, "pktTxDrp": 2 },
            { "portId": "2", "pktRx": 5 }
        ]
    }"#;

    #[test]
    fn test_decode_onos_aaa() {
        let kpi = decode_onos_aaa(AAA_PAYLOAD.as_bytes()).unwrap();

        assert_eq!(kpi.rx_accept_responses, 12.0);
        assert_eq!(kpi.tx_access_requests, 5.0);
        assert_eq!(kpi.pending_requests, 2.0);
        assert_eq!(kpi.request_rtt_millis, 23.4);
        assert_eq!(kpi.request_re_tx, 1.0);
    }

    #[test]
    fn test_decode_onos_aaa_absent_fields_are_zero() {
        let kpi = decode_onos_aaa(br#"{"rxAcceptResponses": 7}"#).unwrap();

        assert_eq!(kpi.rx_accept_responses, 7.0);
        assert_eq!(kpi.rx_unknown_server, 0.0);
        assert_eq!(kpi.request_rtt_millis, 0.0);
    }

    #[test]
    fn test_decode_onos_aaa_pascal_case_keys() {
        let kpi = decode_onos_aaa(
            br#"{"RxAcceptResponses": 12, "TxAccessRequests": 5, "RequestRttMillis": 23.4}"#,
        )
        .unwrap();

        assert_eq!(kpi.rx_accept_responses, 12.0);
        assert_eq!(kpi.tx_access_requests, 5.0);
        assert_eq!(kpi.request_rtt_millis, 23.4);
        assert_eq!(kpi.pending_requests, 0.0);
    }

    #[test]
    fn test_decode_onos_aaa_null_is_zero() {
        let kpi = decode_onos_aaa(br#"{"rxAcceptResponses": 12, "pendingRequests": null}"#).unwrap();

        assert_eq!(kpi.rx_accept_responses, 12.0);
        assert_eq!(kpi.pending_requests, 0.0);
    }

    #[test]
    fn test_decode_voltha() {
        let kpi = decode_voltha(VOLTHA_PAYLOAD.as_bytes()).unwrap();

        assert_eq!(kpi.event_type, "slice");
        assert_eq!(kpi.slice_data.len(), 1);

        let slice = &kpi.slice_data[0];
        assert_eq!(slice.metadata.serial_no, "BBSM00000001");
        assert_eq!(slice.metadata.context_value("port_no"), "128");
        assert_eq!(slice.metrics.rx_bytes, 2048.0);
        assert_eq!(slice.metrics.rx_error_packets, 1.0);
    }

    #[test]
    fn test_decode_voltha_missing_slice_data() {
        let err = decode_voltha(br#"{"type": "slice", "ts": 1.0}"#).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MissingField {
                field: "slice_data",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_onos() {
        let kpi = decode_onos(ONOS_PAYLOAD.as_bytes()).unwrap();

        assert_eq!(kpi.device_id, "of:0000000000000001");
        assert_eq!(kpi.ports.len(), 2);
        assert_eq!(kpi.ports[0].bytes_tx, 200.0);
        assert_eq!(kpi.ports[0].pkt_tx_drp, 2.0);
        assert_eq!(kpi.ports[1].pkt_rx, 5.0);
        assert_eq!(kpi.ports[1].bytes_rx, 0.0);
    }

    #[test]
    fn test_decode_onos_pascal_case_keys() {
        let kpi = decode_onos(
            br#"{"DeviceId": "of:02", "Ts": null, "Ports": [{"PortId": "3", "BytesRx": 64}]}"#,
        )
        .unwrap();

        assert_eq!(kpi.device_id, "of:02");
        assert_eq!(kpi.ts, 0.0);
        assert_eq!(kpi.ports[0].port_id, "3");
        assert_eq!(kpi.ports[0].bytes_rx, 64.0);
    }

    #[test]
    fn test_decode_onos_missing_device_id() {
        let err = decode_onos(br#"{"ports": []}"#).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MissingField {
                field: "deviceId",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_not_json() {
        let err = decode_onos_aaa(b"not json at all").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_decode_not_an_object() {
        let err = decode_onos_aaa(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject { .. }));
    }

    #[test]
    fn test_decode_wrong_field_type() {
        let err = decode_onos_aaa(br#"{"rxAcceptResponses": "twelve"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_kind_selects_decoder() {
        let kpi = KpiKind::OnosAaa.decode(AAA_PAYLOAD.as_bytes()).unwrap();
        assert_eq!(kpi.kind(), KpiKind::OnosAaa);

        // A payload valid for one shape is rejected by another.
        assert!(KpiKind::Voltha.decode(AAA_PAYLOAD.as_bytes()).is_err());
    }
}
