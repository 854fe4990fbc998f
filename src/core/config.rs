use std::env;

use thiserror::Error;

/// Crate configuration, loaded from the environment (a `.env` file is
/// honored when present).
#[derive(Debug, Clone)]
pub struct Settings {
    session: SessionSettings,
    telemetry: TelemetrySettings,
}

/// Knobs for the session runtime, passed explicitly into
/// `SessionRuntime::start` rather than read from ambient state.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Minimum seconds between resume-snapshot writes.
    pub snapshot_debounce_seconds: u64,
    /// Snapshots older than this are discarded at load. Zero disables expiry.
    pub snapshot_ttl_minutes: u64,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub json: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { snapshot_debounce_seconds: 10, snapshot_ttl_minutes: 24 * 60 }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let snapshot_debounce_seconds = parse_u64(
            "SNAPSHOT_DEBOUNCE_SECONDS",
            env_or_default("SNAPSHOT_DEBOUNCE_SECONDS", "10"),
        )?;
        let snapshot_ttl_minutes =
            parse_u64("SNAPSHOT_TTL_MINUTES", env_or_default("SNAPSHOT_TTL_MINUTES", "1440"))?;

        let log_level = env_or_default("QUIZCORE_LOG_LEVEL", "info");
        let json = env_optional("QUIZCORE_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);

        Ok(Self {
            session: SessionSettings { snapshot_debounce_seconds, snapshot_ttl_minutes },
            telemetry: TelemetrySettings { log_level, json },
        })
    }

    pub fn session(&self) -> &SessionSettings {
        &self.session
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}
