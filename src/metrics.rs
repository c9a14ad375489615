//! Metrics collection for command dispatch.
//!
//! Thread-safe counters for request timing and success/failure counts.
//! One `DispatchMetrics` is shared by the whole server; each WebSocket
//! connection also keeps its own so it can report on close.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Tracks timing information for a single dispatched command.
#[derive(Debug)]
pub struct RequestMetrics {
    /// Unique identifier for the request, used as a tracing field.
    pub request_id: String,
    start_time: Instant,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            start_time: Instant::now(),
        }
    }

    /// Returns elapsed time since construction in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated dispatch counters.
#[derive(Clone, Debug, Default)]
pub struct DispatchMetrics {
    total_requests: Arc<AtomicU64>,
    failed_requests: Arc<AtomicU64>,
    unchanged_frames: Arc<AtomicU64>,
    total_response_time_ms: Arc<AtomicU64>,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, duration_ms: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn record_failure(&self, duration_ms: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    /// Counts a capture answered with "unchanged" instead of a frame.
    pub fn record_unchanged(&self) {
        self.unchanged_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn failed_requests(&self) -> u64 {
        self.failed_requests.load(Ordering::Relaxed)
    }

    pub fn unchanged_frames(&self) -> u64 {
        self.unchanged_frames.load(Ordering::Relaxed)
    }

    /// Returns the average response time (ms) over all requests.
    pub fn avg_response_time_ms(&self) -> f32 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_ms.load(Ordering::Relaxed);
        total_time as f32 / total as f32
    }

    /// Emit a one-line summary at info level.
    pub fn log_summary(&self, scope: &str) {
        info!(
            "{}: {} requests, {} failed, {} unchanged frames, avg {:.1}ms",
            scope,
            self.total_requests(),
            self.failed_requests(),
            self.unchanged_frames(),
            self.avg_response_time_ms()
        );
    }
}
