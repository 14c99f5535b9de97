//! Events surfaced to consumers of the gateway client

/// Dispatched after a fresh identify completed; carries the session id
pub const READY: &str = "READY";
/// Dispatched after a successful resume
pub const RESUMED: &str = "RESUMED";

/// An event extracted from an inbound gateway dispatch
///
/// `data` is the raw `d` payload, untouched. Upper layers decide how to
/// deserialize it; the gateway core only tags it with the event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub data: Vec<u8>,
}
