/*!
 * Tracing
 * Subscriber setup and timed spans around channel operations
 */

use crate::core::errors::IpcError;
use crate::support::random::rand_str;
use std::time::Instant;
use tracing::{debug, info, span, Level};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable switching the subscriber to JSON output
pub const ENV_TRACE_JSON: &str = "SIBLING_IPC_TRACE_JSON";

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: log level (default: info)
/// - SIBLING_IPC_TRACE_JSON: JSON output (default: false)
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(ENV_TRACE_JSON)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json = use_json, "tracing initialized");
    }
}

/// Span covering one send or read, including the credit wait
pub struct ChannelSpan {
    span: tracing::Span,
    start: Instant,
    trace_id: String,
}

impl ChannelSpan {
    pub fn new(operation: &'static str, channel: &str) -> Self {
        let trace_id = rand_str(false);
        let span = span!(
            Level::TRACE,
            "channel_op",
            trace_id = %trace_id,
            operation,
            channel,
            duration_us = tracing::field::Empty,
            result = tracing::field::Empty,
            error = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            trace_id,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn record_outcome<T>(&self, result: &Result<T, IpcError>) {
        match result {
            Ok(_) => {
                self.span.record("result", "success");
            }
            Err(e) => {
                self.span.record("result", "error");
                self.span.record("error", tracing::field::display(e));
            }
        }
    }
}

impl Drop for ChannelSpan {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        self.span.record("duration_us", elapsed.as_micros() as u64);
        let _entered = self.span.enter();
        debug!(
            trace_id = %self.trace_id,
            duration_us = elapsed.as_micros() as u64,
            "channel operation finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn test_span_trace_ids_differ() {
        let a = ChannelSpan::new("send", "chan");
        let b = ChannelSpan::new("send", "chan");
        assert_eq!(a.trace_id().len(), 16);
        assert_ne!(a.trace_id(), b.trace_id());
        a.record_outcome::<()>(&Err(IpcError::CorruptedStatus));
    }
}
