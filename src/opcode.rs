//! Gateway operation codes
//!
//! Values are fixed by the wire protocol. The two highest codes are
//! emitter-internal control markers and never appear on the wire.

/// Server dispatches an event to the client
pub const DISCORD_EVENT: u8 = 0;
/// Heartbeat, sent by the client or requested by the server
pub const HEARTBEAT: u8 = 1;
/// Identify, authenticates a fresh session
pub const IDENTIFY: u8 = 2;
/// Status update (presence)
pub const STATUS_UPDATE: u8 = 3;
/// Voice state update
pub const VOICE_STATE_UPDATE: u8 = 4;
/// Resume a dropped session from a saved session id and sequence
pub const RESUME: u8 = 6;
/// Server requests the client to reconnect
pub const RECONNECT: u8 = 7;
/// Request guild member chunks
pub const REQUEST_GUILD_MEMBERS: u8 = 8;
/// Session was invalidated; client must re-identify
pub const INVALID_SESSION: u8 = 9;
/// Sent by the server on connect, carries the heartbeat interval
pub const HELLO: u8 = 10;
/// Server acknowledges a client heartbeat
pub const HEARTBEAT_ACK: u8 = 11;

/// Internal marker: tear down the emitter and the transport
pub const SHUTDOWN: u8 = 254;
/// Internal marker: close the transport, emitter exits
pub const CLOSE: u8 = 255;

/// Check whether an op code is an emitter-internal control marker
#[must_use]
pub const fn is_internal(op: u8) -> bool {
    matches!(op, SHUTDOWN | CLOSE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_markers_are_outside_the_wire_range() {
        assert!(is_internal(SHUTDOWN));
        assert!(is_internal(CLOSE));
        for op in [
            DISCORD_EVENT,
            HEARTBEAT,
            IDENTIFY,
            STATUS_UPDATE,
            VOICE_STATE_UPDATE,
            RESUME,
            RECONNECT,
            REQUEST_GUILD_MEMBERS,
            INVALID_SESSION,
            HELLO,
            HEARTBEAT_ACK,
        ] {
            assert!(!is_internal(op));
        }
    }
}
