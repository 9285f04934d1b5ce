//! # Structured Logging Module
//!
//! Environment-aware structured logging for the approval engine. Console
//! output is always on; JSON output is switched on by configuration or by
//! `APPROVAL_LOG_FORMAT=json`.

use crate::config::LoggingConfig;
use chrono::{DateTime, Utc};
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging from environment variables alone
pub fn init_structured_logging() {
    let environment = get_environment();
    let config = LoggingConfig {
        level: get_log_level(&environment),
        json: std::env::var("APPROVAL_LOG_FORMAT").is_ok_and(|format| format == "json"),
    };
    init_with_config(&config);
}

/// Initialize structured logging with explicit settings.
///
/// Only the first call installs a subscriber. `RUST_LOG` overrides the
/// configured level when set.
pub fn init_with_config(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
        };

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(!config.json)
            .with_filter(filter());
        let json = config.json.then(|| {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter())
        });

        // A global subscriber may already be installed by the embedding service
        if tracing_subscriber::registry()
            .with(if config.json { None } else { Some(console) })
            .with(json)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            level = %config.level,
            json = config.json,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
pub(crate) fn get_environment() -> String {
    std::env::var("APPROVAL_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for flow definition and instance operations.
///
/// `at` is the operation time from the caller's clock, so log lines line up
/// with the timestamps stored on the records.
pub fn log_flow_operation(
    operation: &str,
    flow_id: Option<Uuid>,
    instance_id: Option<Uuid>,
    tenant_id: Option<&str>,
    status: &str,
    details: Option<&str>,
    at: DateTime<Utc>,
) {
    tracing::info!(
        operation = %operation,
        flow_id = flow_id.map(|id| id.to_string()),
        instance_id = instance_id.map(|id| id.to_string()),
        tenant_id = tenant_id,
        status = %status,
        details = details,
        timestamp = %at.to_rfc3339(),
        "FLOW_OPERATION"
    );
}

/// Log structured data for step operations
pub fn log_step_operation(
    operation: &str,
    instance_id: Uuid,
    step_index: usize,
    approver_id: Option<&str>,
    status: &str,
    details: Option<&str>,
    at: DateTime<Utc>,
) {
    tracing::info!(
        operation = %operation,
        instance_id = %instance_id,
        step_index = step_index,
        approver_id = approver_id,
        status = %status,
        details = details,
        timestamp = %at.to_rfc3339(),
        "STEP_OPERATION"
    );
}
