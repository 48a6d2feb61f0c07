//! Save path data and native connection strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Default port for redis-style backends.
pub const REDIS_PORT: u16 = 6379;

/// Default port for the memcache family.
pub const MEMCACHE_PORT: u16 = 11211;

/// Save path error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SavePathError {
    #[error("the `files` handler needs a directory path string")]
    NotText,
    #[error("handler `{0}` needs address records, not a plain string")]
    NotAddress(String),
    #[error("address record is missing the required `host` field")]
    MissingHost,
    #[error("malformed address record: {0}")]
    Malformed(String),
    #[error("no native path rules for handler `{0}`")]
    UnknownTag(String),
}

/// One server address for a network-backed handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAddress {
    /// Host name or IP.
    pub host: String,
    /// Port; the backend default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Relative weight among several servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

impl NetworkAddress {
    /// Create an address with backend-default port and no weight.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            weight: None,
        }
    }

    /// Set the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the weight.
    #[must_use]
    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Render in the connection-string syntax of a native tag.
    ///
    /// `memcached` uses `host:port[:weight]`; `redis` and `memcache` use
    /// `tcp://host:port[?weight=N]`.
    #[must_use]
    pub fn to_native(&self, tag: &str) -> String {
        let memcached = tag == "memcached";
        let port = self
            .port
            .unwrap_or(if tag == "redis" { REDIS_PORT } else { MEMCACHE_PORT });
        let mut out = if memcached {
            format!("{}:{port}", self.host)
        } else {
            format!("tcp://{}:{port}", self.host)
        };
        if let Some(weight) = self.weight {
            if memcached {
                out.push_str(&format!(":{weight}"));
            } else {
                out.push_str(&format!("?weight={weight}"));
            }
        }
        out
    }
}

/// Path or address data handed to a backend.
///
/// Well-known backends accept only the shapes they understand. Handler
/// instances accept anything and read it back through
/// [`HandlerContext`](crate::HandlerContext).
#[derive(Debug, Clone, PartialEq)]
pub enum SavePath {
    /// A plain string (a directory for `files`).
    Text(String),
    /// An ordered list of server addresses.
    Addresses(Vec<NetworkAddress>),
    /// Arbitrary structured data.
    Data(Value),
}

impl Default for SavePath {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl SavePath {
    /// The string form, if this is a plain string.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Addresses(_) | Self::Data(_) => None,
        }
    }

    /// Resolve to the connection string a native tag expects.
    ///
    /// # Errors
    /// Returns error if the shape does not fit the tag or a record lacks `host`.
    pub fn to_native(&self, tag: &str) -> Result<String, SavePathError> {
        match tag {
            "files" => self
                .as_text()
                .map(str::to_string)
                .ok_or(SavePathError::NotText),
            "redis" | "memcache" | "memcached" => {
                let addresses = self.addresses(tag)?;
                if addresses.is_empty() {
                    return Err(SavePathError::MissingHost);
                }
                Ok(addresses
                    .iter()
                    .map(|a| a.to_native(tag))
                    .collect::<Vec<_>>()
                    .join(","))
            }
            other => Err(SavePathError::UnknownTag(other.to_string())),
        }
    }

    fn addresses(&self, tag: &str) -> Result<Vec<NetworkAddress>, SavePathError> {
        match self {
            Self::Text(_) => Err(SavePathError::NotAddress(tag.to_string())),
            Self::Addresses(list) => Ok(list.clone()),
            Self::Data(Value::Array(items)) => items.iter().map(parse_address).collect(),
            Self::Data(value @ Value::Object(_)) => Ok(vec![parse_address(value)?]),
            Self::Data(_) => Err(SavePathError::NotAddress(tag.to_string())),
        }
    }
}

fn parse_address(value: &Value) -> Result<NetworkAddress, SavePathError> {
    let Value::Object(map) = value else {
        return Err(SavePathError::Malformed(value.to_string()));
    };
    if !map.contains_key("host") {
        return Err(SavePathError::MissingHost);
    }
    serde_json::from_value(value.clone()).map_err(|e| SavePathError::Malformed(e.to_string()))
}

impl From<&str> for SavePath {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SavePath {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<NetworkAddress> for SavePath {
    fn from(address: NetworkAddress) -> Self {
        Self::Addresses(vec![address])
    }
}

impl From<Vec<NetworkAddress>> for SavePath {
    fn from(addresses: Vec<NetworkAddress>) -> Self {
        Self::Addresses(addresses)
    }
}

impl From<Value> for SavePath {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            other => Self::Data(other),
        }
    }
}
