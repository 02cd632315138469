//! Per-request LLM metrics
//!
//! Tracks, for one logical generation (all of its retries):
//! - end-to-end latency
//! - number of provider calls made
//! - tokens reported by the provider
//! - prompt and response sizes

use std::time::{Duration, Instant};

/// Metrics for one structured or text generation
#[derive(Debug, Clone, Default)]
pub struct RequestMetrics {
    /// Model identifier the request went to
    pub model: String,

    /// Wall time from first call to final outcome (milliseconds)
    pub latency_ms: u64,

    /// Provider calls made, including the successful one
    pub attempts: u32,

    /// Calls whose output could not be parsed or validated
    pub parse_failures: u32,

    /// Calls that failed before any output arrived
    pub transport_failures: u32,

    /// Total tokens reported across all calls
    pub tokens_used: u64,

    /// Characters sent in the final user message
    pub prompt_chars: usize,

    /// Characters in the last response received
    pub response_chars: usize,
}

impl RequestMetrics {
    pub fn new(model: impl Into<String>, prompt_chars: usize) -> Self {
        Self {
            model: model.into(),
            prompt_chars,
            ..Self::default()
        }
    }

    pub fn set_latency(&mut self, duration: Duration) {
        self.latency_ms = duration.as_millis() as u64;
    }

    /// Record a call that returned text
    pub fn record_response(&mut self, response_chars: usize, tokens: Option<u32>) {
        self.attempts += 1;
        self.response_chars = response_chars;
        self.tokens_used += u64::from(tokens.unwrap_or(0));
    }

    pub fn record_transport_failure(&mut self) {
        self.attempts += 1;
        self.transport_failures += 1;
    }

    pub fn record_parse_failure(&mut self) {
        self.parse_failures += 1;
    }

    /// Calls that did not lead to the final outcome
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    /// Report metrics to tracing logs
    pub fn report(&self) {
        tracing::info!(
            "LLM Metrics: model={}, latency={}ms, attempts={}, parse_failures={}, transport_failures={}, tokens={}, prompt={} chars, response={} chars",
            self.model,
            self.latency_ms,
            self.attempts,
            self.parse_failures,
            self.transport_failures,
            self.tokens_used,
            self.prompt_chars,
            self.response_chars,
        );
    }
}

/// Timer helper for measuring operation latency
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn stop(self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = RequestMetrics::new("gpt-4", 120);
        assert_eq!(metrics.model, "gpt-4");
        assert_eq!(metrics.prompt_chars, 120);
        assert_eq!(metrics.attempts, 0);
        assert_eq!(metrics.retries(), 0);
    }

    #[test]
    fn test_attempt_accounting() {
        let mut metrics = RequestMetrics::new("gpt-4", 10);
        metrics.record_transport_failure();
        metrics.record_response(40, Some(100));
        metrics.record_parse_failure();
        metrics.record_response(42, None);

        assert_eq!(metrics.attempts, 3);
        assert_eq!(metrics.retries(), 2);
        assert_eq!(metrics.transport_failures, 1);
        assert_eq!(metrics.parse_failures, 1);
        assert_eq!(metrics.tokens_used, 100);
        assert_eq!(metrics.response_chars, 42);
    }

    #[test]
    fn test_timer() {
        let timer = MetricsTimer::start();
        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.stop();
        assert!(duration.as_millis() >= 10);
    }

    #[test]
    fn test_latency_setter() {
        let mut metrics = RequestMetrics::default();
        metrics.set_latency(Duration::from_millis(250));
        assert_eq!(metrics.latency_ms, 250);
    }
}
