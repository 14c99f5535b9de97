//! Packet codec for the gateway wire protocol
//!
//! Inbound frames are JSON objects `{"op", "d", "s", "t"}`; `s` and `t`
//! are only populated for op 0 dispatches. Outbound frames carry `{"op",
//! "d"}` and never a sequence number. The `d` payload is kept as raw JSON
//! so the event stream hands consumers untouched bytes.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// A parsed inbound gateway frame
#[derive(Debug, Deserialize)]
pub struct GatewayPacket {
    pub op: u8,
    #[serde(default)]
    pub d: Option<Box<RawValue>>,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

impl GatewayPacket {
    /// The raw `d` payload bytes, empty if the frame carried none
    #[must_use]
    pub fn data_bytes(&self) -> Vec<u8> {
        self.d
            .as_ref()
            .map(|raw| raw.get().as_bytes().to_vec())
            .unwrap_or_default()
    }
}

/// An outbound client frame
///
/// `d` is `None` only for the emitter-internal shutdown/close markers,
/// which never reach the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ClientPacket {
    pub op: u8,
    pub d: Option<serde_json::Value>,
}

/// Payload of op 10 (Hello)
#[derive(Debug, Deserialize)]
pub struct HelloPayload {
    pub heartbeat_interval: u32,
    #[serde(rename = "_trace", default)]
    pub trace: Vec<String>,
}

/// Payload of the READY dispatch, reduced to the fields the session tracks
#[derive(Debug, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
    #[serde(rename = "_trace", default)]
    pub trace: Vec<String>,
}

/// Identification properties sent inside the identify payload
#[derive(Debug, Serialize)]
pub struct IdentifyProperties {
    #[serde(rename = "$os")]
    pub os: String,
    #[serde(rename = "$browser")]
    pub browser: String,
    #[serde(rename = "$device")]
    pub device: String,
}

/// Payload of op 2 (Identify)
#[derive(Debug, Serialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub properties: IdentifyProperties,
    pub compress: bool,
    pub large_threshold: u32,
    /// `[shard_id, shard_count]`, omitted for unsharded bots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<serde_json::Value>,
}

/// Payload of op 6 (Resume)
#[derive(Debug, Serialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    pub seq: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_dispatch_frame() {
        let raw = br#"{"op":0,"d":{"session_id":"abc","_trace":["g1"]},"s":1,"t":"READY"}"#;
        let pkt: GatewayPacket = serde_json::from_slice(raw).unwrap();
        assert_eq!(pkt.op, 0);
        assert_eq!(pkt.s, Some(1));
        assert_eq!(pkt.t.as_deref(), Some("READY"));

        let ready: ReadyPayload = serde_json::from_slice(&pkt.data_bytes()).unwrap();
        assert_eq!(ready.session_id, "abc");
        assert_eq!(ready.trace, vec!["g1".to_string()]);
    }

    #[test]
    fn parses_control_frame_without_sequence() {
        let raw = br#"{"op":11,"d":null,"s":null,"t":null}"#;
        let pkt: GatewayPacket = serde_json::from_slice(raw).unwrap();
        assert_eq!(pkt.op, 11);
        assert_eq!(pkt.s, None);
        assert_eq!(pkt.t, None);
    }

    #[test]
    fn malformed_frame_is_an_error() {
        assert!(serde_json::from_slice::<GatewayPacket>(b"not json").is_err());
        assert!(serde_json::from_slice::<GatewayPacket>(br#"{"op":"ten"}"#).is_err());
    }

    #[test]
    fn outbound_roundtrip_preserves_logical_fields() {
        let out = ClientPacket {
            op: 1,
            d: Some(json!(42)),
        };
        let text = serde_json::to_string(&out).unwrap();
        let back: GatewayPacket = serde_json::from_str(&text).unwrap();
        assert_eq!(back.op, 1);
        assert_eq!(back.data_bytes(), b"42".to_vec());
        assert_eq!(back.s, None);
        assert_eq!(back.t, None);
    }

    #[test]
    fn identify_omits_shard_for_single_shard_bots() {
        let payload = IdentifyPayload {
            token: "T".into(),
            properties: IdentifyProperties {
                os: "linux".into(),
                browser: "b".into(),
                device: "d".into(),
            },
            compress: false,
            large_threshold: 250,
            shard: None,
            presence: None,
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert!(v.get("shard").is_none());
        assert_eq!(v["properties"]["$os"], "linux");
        assert_eq!(v["compress"], false);
    }

    #[test]
    fn resume_payload_shape() {
        let payload = ResumePayload {
            token: "T".into(),
            session_id: "abc".into(),
            seq: 5,
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v, json!({"token":"T","session_id":"abc","seq":5}));
    }
}
