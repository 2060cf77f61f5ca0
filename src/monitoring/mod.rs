/*!
 * Monitoring
 * Tracing subscriber and per-operation spans
 */

mod tracer;

pub use tracer::{init_tracing, ChannelSpan, ENV_TRACE_JSON};
