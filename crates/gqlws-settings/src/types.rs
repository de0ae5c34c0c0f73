//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial; missing fields take their default.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
///
/// ```json
/// {
///   "server": { "port": 9000, "allowedOrigins": ["https://app.example.com"] },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GqlWsSettings {
    /// Network and socket settings.
    pub server: ServerSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl GqlWsSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if !server.path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.path must start with '/', got {:?}",
                server.path
            )));
        }
        if server.subprotocol.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "server.subprotocol must not be empty".into(),
            ));
        }
        if server.allowed_origins.as_ref().is_some_and(Vec::is_empty) {
            return Err(SettingsError::InvalidValue(
                "server.allowedOrigins must name at least one origin, or be null".into(),
            ));
        }
        if server.send_queue_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueSize must be at least 1".into(),
            ));
        }
        if server.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and socket settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks an ephemeral port).
    pub port: u16,
    /// HTTP path of the upgrade endpoint.
    pub path: String,
    /// Sub-protocol token clients must offer.
    pub subprotocol: String,
    /// Origins allowed to upgrade. `None` accepts every origin.
    pub allowed_origins: Option<Vec<String>>,
    /// Interval between `ka` frames in milliseconds. `0` disables keep-alive.
    pub keep_alive_interval_ms: u64,
    /// Outbound frames buffered per connection before frames are dropped.
    pub send_queue_size: usize,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path: "/subscriptions".to_string(),
            subprotocol: "graphql-ws".to_string(),
            allowed_origins: None,
            keep_alive_interval_ms: 0,
            send_queue_size: 256,
            max_message_size: 64 * 1024,
        }
    }
}

impl ServerSettings {
    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Compact,
    /// JSON lines.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`RUST_LOG` wins when set).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn server_defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.port, 8080);
        assert_eq!(s.path, "/subscriptions");
        assert_eq!(s.subprotocol, "graphql-ws");
        assert!(s.allowed_origins.is_none());
        assert_eq!(s.keep_alive_interval_ms, 0);
        assert_eq!(s.send_queue_size, 256);
        assert_eq!(s.max_message_size, 65_536);
    }

    #[test]
    fn logging_defaults() {
        let l = LoggingSettings::default();
        assert_eq!(l.level, "info");
        assert_eq!(l.format, LogFormat::Compact);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: GqlWsSettings =
            serde_json::from_str(r#"{"server":{"port":9000,"allowedOrigins":["https://a.test"]}}"#)
                .unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(
            s.server.allowed_origins,
            Some(vec!["https://a.test".to_string()])
        );
        assert_eq!(s.logging, LoggingSettings::default());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(GqlWsSettings::default()).unwrap();
        assert!(json["server"].get("keepAliveIntervalMs").is_some());
        assert!(json["server"].get("sendQueueSize").is_some());
        assert_eq!(json["logging"]["format"], "compact");
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let s = ServerSettings {
            host: "0.0.0.0".into(),
            port: 4000,
            ..ServerSettings::default()
        };
        assert_eq!(s.bind_addr(), "0.0.0.0:4000");
    }

    #[test]
    fn defaults_validate() {
        assert!(GqlWsSettings::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_relative_path() {
        let mut s = GqlWsSettings::default();
        s.server.path = "graphql".into();
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_rejects_empty_subprotocol() {
        let mut s = GqlWsSettings::default();
        s.server.subprotocol = "  ".into();
        assert_matches!(
            s.validate(),
            Err(SettingsError::InvalidValue(m)) if m.contains("subprotocol")
        );
    }

    #[test]
    fn validate_rejects_empty_origin_list() {
        let mut s = GqlWsSettings::default();
        s.server.allowed_origins = Some(Vec::new());
        assert_matches!(
            s.validate(),
            Err(SettingsError::InvalidValue(m)) if m.contains("allowedOrigins")
        );
    }

    #[test]
    fn validate_rejects_zero_queue() {
        let mut s = GqlWsSettings::default();
        s.server.send_queue_size = 0;
        assert!(s.validate().is_err());
    }
}
