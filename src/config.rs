//! Client configuration

use serde::Deserialize;

fn default_version() -> u8 {
    6
}

fn default_encoding() -> String {
    "json".to_string()
}

fn default_large_threshold() -> u32 {
    250
}

fn default_shard_count() -> u32 {
    1
}

fn default_channel_buffer() -> usize {
    64
}

/// Configuration for a gateway session, immutable after creation
///
/// Unknown fields are rejected when deserializing from an external
/// source. The HTTP client is shared with endpoint discovery so a proxy
/// configuration applies to both the REST call and the upgrade.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Bot token used for identify and resume
    pub token: String,

    /// Gateway endpoint; fetched lazily from the API when empty
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Gateway protocol version
    #[serde(default = "default_version")]
    pub version: u8,

    /// Wire encoding tag; only `json` is supported
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Browser identification string for the identify payload
    #[serde(default)]
    pub browser: String,

    /// Device identification string for the identify payload
    #[serde(default)]
    pub device: String,

    /// Member count above which a guild is considered large
    #[serde(default = "default_large_threshold")]
    pub guild_large_threshold: u32,

    /// Shard identity of this session
    #[serde(default)]
    pub shard_id: u32,

    /// Total shard count; the shard pair is omitted from identify when `<= 1`
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,

    /// Capacity of the bounded event channel handed to consumers
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// HTTP client used for endpoint discovery, e.g. to route via a proxy
    #[serde(skip)]
    pub http_client: Option<reqwest::Client>,
}

impl Config {
    /// Minimal configuration for the given bot token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            endpoint: None,
            version: default_version(),
            encoding: default_encoding(),
            browser: String::new(),
            device: String::new(),
            guild_large_threshold: default_large_threshold(),
            shard_id: 0,
            shard_count: default_shard_count(),
            channel_buffer: default_channel_buffer(),
            http_client: None,
        }
    }
}
