//! Environment configuration supplied by the launching service.
//!
//! The peer starts the worker process with its channel descriptors already
//! open and describes them through environment variables:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `CLOUDI_API_INIT_PROTOCOL` | `tcp`, `udp` or `local` |
//! | `CLOUDI_API_INIT_BUFFER_SIZE` | maximum bytes per streaming read |
//! | `CLOUDI_API_INIT_THREAD_COUNT` | number of worker threads to start |
//!
//! # Example
//!
//! ```
//! use cloudi_api::control::{Config, Protocol};
//! use cloudi_api::transport::Framing;
//!
//! let config = Config::from_lookup(|key| match key {
//!     "CLOUDI_API_INIT_PROTOCOL" => Some("tcp".to_string()),
//!     "CLOUDI_API_INIT_BUFFER_SIZE" => Some("65536".to_string()),
//!     _ => None,
//! })?;
//!
//! assert_eq!(config.protocol, Protocol::Tcp);
//! assert_eq!(config.protocol.framing(), Framing::LengthPrefixed);
//! # Ok::<(), cloudi_api::ApiError>(())
//! ```

use serde::de::value::{Error as ValueError, MapDeserializer};
use serde::{Deserialize, Deserializer};

use crate::error::{ApiError, Result};
use crate::transport::Framing;

/// Environment variable naming the channel protocol.
pub const ENV_PROTOCOL: &str = "CLOUDI_API_INIT_PROTOCOL";

/// Environment variable holding the streaming read size.
pub const ENV_BUFFER_SIZE: &str = "CLOUDI_API_INIT_BUFFER_SIZE";

/// Environment variable holding the worker thread count.
pub const ENV_THREAD_COUNT: &str = "CLOUDI_API_INIT_THREAD_COUNT";

/// Descriptor of the channel for thread 0; thread `n` uses `3 + n`.
pub const CHANNEL_FD_OFFSET: i32 = 3;

/// Starting capacity of every engine buffer.
pub const INITIAL_BUFFER_SIZE: usize = 32768;

/// Transport the peer used to create the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Stream socket; messages carry a length header.
    Tcp,
    /// Datagram socket.
    Udp,
    /// Local (Unix domain) socket.
    Local,
}

impl Protocol {
    /// Framing used on a channel of this protocol.
    pub fn framing(self) -> Framing {
        match self {
            Protocol::Tcp => Framing::LengthPrefixed,
            Protocol::Udp | Protocol::Local => Framing::Streaming,
        }
    }
}

/// Per-process channel configuration.
///
/// Deserializing goes through the same checks as [`Config::from_lookup`]:
/// `buffer_size` is a decimal string and must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Channel protocol.
    pub protocol: Protocol,
    /// Streaming read size in bytes.
    #[serde(deserialize_with = "positive_size")]
    pub buffer_size: u32,
}

impl Config {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidInput`] if a variable is missing or invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let values = [("protocol", ENV_PROTOCOL), ("buffer_size", ENV_BUFFER_SIZE)]
            .into_iter()
            .filter_map(|(field, key)| lookup(key).map(|value| (field, value)));
        let config = Self::deserialize(MapDeserializer::<_, ValueError>::new(values))
            .map_err(|error| {
                tracing::error!(%error, "invalid channel configuration");
                ApiError::InvalidInput("invalid CLOUDI_API_INIT_* configuration")
            })?;

        tracing::debug!(?config, "channel configuration");
        Ok(config)
    }

    /// Framing used on the channel.
    #[inline]
    pub fn framing(&self) -> Framing {
        self.protocol.framing()
    }
}

fn positive_size<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    value
        .parse::<u32>()
        .ok()
        .filter(|&size| size > 0)
        .ok_or_else(|| {
            <D::Error as serde::de::Error>::custom(format!("invalid buffer size {value:?}"))
        })
}

/// Number of worker threads the process should start.
///
/// # Errors
///
/// Returns [`ApiError::InvalidInput`] if the variable is missing or invalid.
pub fn thread_count() -> Result<u32> {
    thread_count_from(|key| std::env::var(key).ok())
}

fn thread_count_from<F>(lookup: F) -> Result<u32>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(ENV_THREAD_COUNT)
        .ok_or(ApiError::InvalidInput("CLOUDI_API_INIT_THREAD_COUNT not set"))?
        .parse()
        .map_err(|_| ApiError::InvalidInput("invalid CLOUDI_API_INIT_THREAD_COUNT"))
}
