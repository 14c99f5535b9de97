//! Gateway command names and their op code mapping
//!
//! Commands are the client-to-server vocabulary accepted by
//! [`GatewayClient::emit`](crate::client::GatewayClient::emit). The two
//! internal commands exist so the emitter can be told to close the
//! transport through the same ordered channel as real traffic.

use crate::opcode;

/// Internal: stop the emitter and close the transport
pub const SHUTDOWN: &str = "SHUTDOWN";
/// Internal: close the transport
pub const CLOSE: &str = "CLOSE";
/// Liveness probe carrying the last seen sequence number
pub const HEARTBEAT: &str = "HEARTBEAT";
/// Authenticate a fresh session
pub const IDENTIFY: &str = "IDENTIFY";
/// Replay a dropped session
pub const RESUME: &str = "RESUME";
/// Request guild member chunks
pub const REQUEST_GUILD_MEMBERS: &str = "REQUEST_GUILD_MEMBERS";
/// Update the bot's voice state
pub const UPDATE_VOICE_STATE: &str = "UPDATE_VOICE_STATE";
/// Update the bot's presence
pub const UPDATE_STATUS: &str = "UPDATE_STATUS";

/// Map a command name to its gateway op code
///
/// Returns `None` for names the gateway does not understand.
#[must_use]
pub fn opcode_for(command: &str) -> Option<u8> {
    match command {
        SHUTDOWN => Some(opcode::SHUTDOWN),
        CLOSE => Some(opcode::CLOSE),
        HEARTBEAT => Some(opcode::HEARTBEAT),
        IDENTIFY => Some(opcode::IDENTIFY),
        RESUME => Some(opcode::RESUME),
        REQUEST_GUILD_MEMBERS => Some(opcode::REQUEST_GUILD_MEMBERS),
        UPDATE_VOICE_STATE => Some(opcode::VOICE_STATE_UPDATE),
        UPDATE_STATUS => Some(opcode::STATUS_UPDATE),
        _ => None,
    }
}
