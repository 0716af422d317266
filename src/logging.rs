//! Structured Logging for the kBTC Custody Backend
//!
//! Lifecycle events (group created/deleted, mint requested/verified/
//! revoked, burn requested/verified/recovered, refund recorded) are
//! emitted as structured JSON records attributed to the acting account.
//! Forced transitions carry the forcing caller as actor, not the original
//! requester.

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Event categories
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Group,
    Mint,
    Burn,
    Refund,
    Fees,
    System,
}

/// Structured lifecycle event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    /// Event category
    pub category: EventCategory,
    /// Event type, e.g. "mint_verified"
    pub event: String,
    /// Acting account the event is attributed to
    pub actor: String,
    /// Additional structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl LogEvent {
    pub fn new(category: EventCategory, event: impl Into<String>, actor: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            category,
            event: event.into(),
            actor: actor.to_string(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!("{{\"event\": \"{}\"}}", self.event))
    }
}

/// Log a group lifecycle event
pub fn log_group_event(event: &str, custody_address: &str, actor: &str, data: serde_json::Value) {
    let record = LogEvent::new(EventCategory::Group, event, actor).with_data(serde_json::json!({
        "custody_address": custody_address,
        "details": data,
    }));
    tracing::info!(target: "kbtc::group", "{}", record.to_json());
}

/// Log a mint lifecycle event
pub fn log_mint_event(event: &str, receipt_id: &str, actor: &str, amount_sats: u64) {
    let record = LogEvent::new(EventCategory::Mint, event, actor).with_data(serde_json::json!({
        "receipt_id": receipt_id,
        "amount_sats": amount_sats,
    }));
    tracing::info!(target: "kbtc::mint", "{}", record.to_json());
}

/// Log a burn lifecycle event
pub fn log_burn_event(event: &str, receipt_id: &str, actor: &str, amount_sats: u64) {
    let record = LogEvent::new(EventCategory::Burn, event, actor).with_data(serde_json::json!({
        "receipt_id": receipt_id,
        "amount_sats": amount_sats,
    }));
    tracing::info!(target: "kbtc::burn", "{}", record.to_json());
}

/// Log a refund-slot event
pub fn log_refund_event(event: &str, custody_address: &str, btc_txid: &str, actor: &str) {
    let record = LogEvent::new(EventCategory::Refund, event, actor).with_data(serde_json::json!({
        "custody_address": custody_address,
        "btc_txid": btc_txid,
    }));
    tracing::info!(target: "kbtc::refund", "{}", record.to_json());
}

/// Log a fee/admin event
pub fn log_fees_event(event: &str, actor: &str, data: serde_json::Value) {
    let record = LogEvent::new(EventCategory::Fees, event, actor).with_data(data);
    tracing::info!(target: "kbtc::fees", "{}", record.to_json());
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Initialize the logging system
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let level_str = format!("{:?}", level).to_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kbtc={},tower_http={}", level_str, level_str)));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}
