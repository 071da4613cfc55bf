//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and a
//! JSON file, for following fan-out, batching and breaker activity across
//! concurrent tasks.

use crate::config::detect_environment;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call repeatedly; only the first call installs anything. If the
/// host application already set a global subscriber, that one is kept.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = detect_environment();
        let log_level = get_log_level(&environment);

        let log_dir = PathBuf::from("log");
        let file_layer = match fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let pid = process::id();
                let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
                let file_appender = tracing_appender::rolling::never(
                    &log_dir,
                    format!("{environment}.{pid}.{timestamp}.log"),
                );
                let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
                // Keep the writer alive for the life of the process
                std::mem::forget(guard);

                Some(
                    fmt::layer()
                        .with_writer(file_writer)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(false)
                        .json()
                        .with_filter(build_filter(&log_level)),
                )
            }
            Err(_) => None,
        };

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(build_filter(&log_level)),
            )
            .with(file_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_dir = %log_dir.display(),
            "Structured logging initialized"
        );
    });
}

/// `RUST_LOG` wins over the environment-derived level
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for a single named fetch
pub fn log_fetch_operation(service: &str, success: bool, duration: Duration, error: Option<&str>) {
    tracing::info!(
        service = %service,
        success = success,
        duration_ms = duration.as_millis() as u64,
        error = error,
        timestamp = %Utc::now().to_rfc3339(),
        "FETCH_OPERATION"
    );
}

/// Log structured data for a batch dispatch
pub fn log_batch_operation(
    operation: &str,
    key: &str,
    batch_size: usize,
    status: &str,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        key = %key,
        batch_size = batch_size,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "BATCH_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
