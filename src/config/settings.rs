use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub server: ServerSettings,
    pub bus: BusSettings,
    pub producer: ProducerSettings,
    pub protocol: ProtocolSettings,
    pub shutdown: ShutdownSettings,
    pub log: LogSettings,
}

/// Development or production behavior of the fallback request handler.
///
/// Any value other than `production` selects development.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(from = "String")]
pub enum RunMode {
    #[default]
    Development,
    Production,
}

impl From<String> for RunMode {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("production") {
            RunMode::Production
        } else {
            RunMode::Development
        }
    }
}

/// Listening socket and HTTP/WebSocket limits.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub graphql_path: String,
    pub mode: RunMode,
    pub max_request_bytes: usize,
    pub handshake_timeout_ms: u64,
    pub outbound_capacity: usize,
}

/// Topic bus tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct BusSettings {
    pub listener_capacity: usize,
}

/// Event producer timing and target topic.
#[derive(Debug, Deserialize, Clone)]
pub struct ProducerSettings {
    pub topic: String,
    pub interval_ms: u64,
}

/// Subscription protocol timers. A zero keep-alive disables `ka` frames.
#[derive(Debug, Deserialize, Clone)]
pub struct ProtocolSettings {
    pub connection_init_timeout_ms: u64,
    pub keep_alive_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShutdownSettings {
    pub drain_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            graphql_path: "/api/graphql".to_string(),
            mode: RunMode::Development,
            max_request_bytes: 64 * 1024,
            handshake_timeout_ms: 10_000,
            outbound_capacity: 256,
        }
    }
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            listener_capacity: 64,
        }
    }
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            topic: crate::producer::NUMBER_INCREMENTED.to_string(),
            interval_ms: 1000,
        }
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            connection_init_timeout_ms: 3000,
            keep_alive_ms: 12_000,
        }
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 10_000,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing sections and fields are filled in from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub bus: Option<PartialBusSettings>,
    pub producer: Option<PartialProducerSettings>,
    pub protocol: Option<PartialProtocolSettings>,
    pub shutdown: Option<PartialShutdownSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub graphql_path: Option<String>,
    pub mode: Option<RunMode>,
    pub max_request_bytes: Option<usize>,
    pub handshake_timeout_ms: Option<u64>,
    pub outbound_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBusSettings {
    pub listener_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialProducerSettings {
    pub topic: Option<String>,
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialProtocolSettings {
    pub connection_init_timeout_ms: Option<u64>,
    pub keep_alive_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialShutdownSettings {
    pub drain_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Merge with defaults.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let bus = self.bus.unwrap_or_default();
        let producer = self.producer.unwrap_or_default();
        let protocol = self.protocol.unwrap_or_default();
        let shutdown = self.shutdown.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
                graphql_path: server.graphql_path.unwrap_or(default.server.graphql_path),
                mode: server.mode.unwrap_or(default.server.mode),
                max_request_bytes: server
                    .max_request_bytes
                    .unwrap_or(default.server.max_request_bytes),
                handshake_timeout_ms: server
                    .handshake_timeout_ms
                    .unwrap_or(default.server.handshake_timeout_ms),
                outbound_capacity: server
                    .outbound_capacity
                    .unwrap_or(default.server.outbound_capacity),
            },
            bus: BusSettings {
                listener_capacity: bus
                    .listener_capacity
                    .unwrap_or(default.bus.listener_capacity),
            },
            producer: ProducerSettings {
                topic: producer.topic.unwrap_or(default.producer.topic),
                interval_ms: producer.interval_ms.unwrap_or(default.producer.interval_ms),
            },
            protocol: ProtocolSettings {
                connection_init_timeout_ms: protocol
                    .connection_init_timeout_ms
                    .unwrap_or(default.protocol.connection_init_timeout_ms),
                keep_alive_ms: protocol
                    .keep_alive_ms
                    .unwrap_or(default.protocol.keep_alive_ms),
            },
            shutdown: ShutdownSettings {
                drain_timeout_ms: shutdown
                    .drain_timeout_ms
                    .unwrap_or(default.shutdown.drain_timeout_ms),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }
}
