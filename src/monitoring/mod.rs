/*!
 * Monitoring
 * Structured tracing for bring-up, spawn, and PET threads
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, span_pet, LaunchSpan};
