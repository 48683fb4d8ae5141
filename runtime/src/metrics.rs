//! Consumer runtime metrics.
//!
//! # Exported Metrics
//!
//! - `tablehop_facts_consumed_total{consumer}` - envelopes taken off the bus
//! - `tablehop_fact_retries_total{consumer}` - handler retries performed
//! - `tablehop_facts_dead_lettered_total{consumer}` - envelopes routed to a
//!   dead-letter topic

use metrics::describe_counter;

/// Register metric descriptions for the consumer runtime.
///
/// Call once at application startup, before any consumer is spawned.
pub fn register_consumer_metrics() {
    describe_counter!(
        "tablehop_facts_consumed_total",
        "Total fact envelopes received from the event bus, per consumer"
    );
    describe_counter!(
        "tablehop_fact_retries_total",
        "Total handler retry attempts, per consumer"
    );
    describe_counter!(
        "tablehop_facts_dead_lettered_total",
        "Total fact envelopes routed to a dead-letter topic, per consumer"
    );
}
