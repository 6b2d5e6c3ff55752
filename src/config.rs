/*!
 * @file config.rs
 * @brief Mock server configuration
 */

use crate::error::{MockError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Controls how the server answers the initial handshake (`ismaster`/`hello`)
/// without the test author needing to register an explicit autoresponder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AutoIsMaster {
    Disabled,
    Enabled,
    Document(bson::Document),
}

impl Default for AutoIsMaster {
    fn default() -> Self {
        AutoIsMaster::Enabled
    }
}

/// Construction-time options for a [`crate::server::MockServer`].
///
/// `ssl` is intentionally absent from this serializable struct: a
/// `rustls::ServerConfig` has no stable serde representation, so TLS is
/// attached separately via [`crate::server::MockServer::with_tls`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerOptions {
    /// Bind host for the TCP listener. Ignored if `uds_path` is set.
    pub host: String,
    /// Bind port. `None` (the default) picks an OS-assigned ephemeral port.
    pub port: Option<u16>,
    /// If set, listen on a Unix-domain socket at this path instead of TCP.
    pub uds_path: Option<String>,
    pub auto_ismaster: AutoIsMaster,
    pub min_wire_version: i32,
    pub max_wire_version: i32,
    /// Default timeout, in seconds, for `receives()` calls.
    pub request_timeout_secs: u64,
    /// Log every decoded request and encoded reply via `tracing`.
    pub verbose: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
            uds_path: None,
            auto_ismaster: AutoIsMaster::default(),
            min_wire_version: 0,
            max_wire_version: 6,
            request_timeout_secs: 10,
            verbose: false,
        }
    }
}

impl ServerOptions {
    pub fn builder() -> ServerOptionsBuilder {
        ServerOptionsBuilder::default()
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let options = Self::default();
            options.save(path).await?;
            return Ok(options);
        }

        let content = tokio::fs::read_to_string(path).await?;

        let options: ServerOptions = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| MockError::Config(e.to_string()))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| MockError::Config(e.to_string()))?,
            Some("toml") => toml::from_str(&content).map_err(|e| MockError::Config(e.to_string()))?,
            _ => toml::from_str(&content).map_err(|e| MockError::Config(e.to_string()))?,
        };

        Ok(options)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => {
                serde_json::to_string_pretty(self).map_err(|e| MockError::Config(e.to_string()))?
            }
            Some("yaml") | Some("yml") => {
                serde_yaml::to_string(self).map_err(|e| MockError::Config(e.to_string()))?
            }
            Some("toml") => {
                toml::to_string_pretty(self).map_err(|e| MockError::Config(e.to_string()))?
            }
            _ => toml::to_string_pretty(self).map_err(|e| MockError::Config(e.to_string()))?,
        };

        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerOptionsBuilder {
    options: ServerOptions,
}

impl ServerOptionsBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.options.port = Some(port);
        self
    }

    pub fn uds_path(mut self, path: impl Into<String>) -> Self {
        self.options.uds_path = Some(path.into());
        self
    }

    pub fn auto_ismaster(mut self, value: AutoIsMaster) -> Self {
        self.options.auto_ismaster = value;
        self
    }

    pub fn wire_version_range(mut self, min: i32, max: i32) -> Self {
        self.options.min_wire_version = min;
        self.options.max_wire_version = max;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.options.request_timeout_secs = secs;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.options.verbose = verbose;
        self
    }

    pub fn build(self) -> ServerOptions {
        self.options
    }
}
