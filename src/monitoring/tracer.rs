/*!
 * Structured Tracing
 * Tracing setup and spans for topology lifecycle operations
 *
 * Features:
 * - Trace IDs correlating every event of one spawn
 * - JSON-formatted logs for structured parsing
 * - PET thread spans parented to the launching span across threads
 */

use crate::core::limits::ENV_TRACE_JSON;
use crate::core::types::{PetId, VmId};
use std::time::Instant;
use tracing::{debug, info, span, warn, Level, Span};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Launches slower than this are reported
const SLOW_LAUNCH_MS: u128 = 100;

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - PETVM_TRACE_JSON: Enable JSON output (default: false)
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing() -> bool {
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
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
    installed
}

/// Generate a unique trace ID for launch correlation
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one `startup` call
pub struct LaunchSpan {
    span: Span,
    start: Instant,
    trace_id: String,
}

impl LaunchSpan {
    pub fn new(parent: VmId, nspawn: usize) -> Self {
        let trace_id = generate_trace_id();

        let span = span!(
            Level::INFO,
            "startup",
            trace_id = %trace_id,
            parent = parent,
            nspawn = nspawn,
            launched = tracing::field::Empty,
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

    /// Underlying span, used to parent PET thread spans
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn record_launched(&self, pets: usize) {
        self.span.record("launched", pets);
        self.span.record("result", "success");
    }

    pub fn record_error(&self, error: &str) {
        self.span.record("error", error);
        self.span.record("result", "error");
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for LaunchSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();

        if duration.as_millis() > SLOW_LAUNCH_MS {
            warn!(
                trace_id = %self.trace_id,
                duration_ms = duration.as_millis(),
                slow = true,
                "slow launch detected"
            );
        } else {
            debug!(
                trace_id = %self.trace_id,
                duration_us = duration.as_micros(),
                "launch completed"
            );
        }
    }
}

/// Span for one PET thread of a child VM, parented to its launch span
pub fn span_pet(launch: &Span, vm: VmId, pet: PetId) -> Span {
    tracing::debug_span!(parent: launch, "pet", vm = vm, pet = pet)
}
