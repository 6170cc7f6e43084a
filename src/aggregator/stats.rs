//! Statistics over reported samples
//!
//! Uses HDR Histogram for accurate latency percentile calculation.

use std::collections::BTreeMap;
use std::time::Duration;

use hdrhistogram::Histogram;
use indexmap::IndexMap;

use crate::sample::Sample;

/// Latency statistics in milliseconds
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub stddev_ms: f64,
    pub p50_ms: f64,
    pub p75_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Statistics for one tag (or for the whole run)
#[derive(Debug, Clone, Default)]
pub struct TagStats {
    pub samples: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub samples_per_second: f64,
    pub request_bytes: u64,
    pub response_bytes: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub errors: BTreeMap<String, u64>,
    pub latency: LatencyStats,
}

/// Statistics for a finished run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub duration: Duration,
    pub total: TagStats,
    pub by_tag: IndexMap<String, TagStats>,
}

const MAX_LATENCY_US: u64 = 300_000_000; // 5 minutes

struct Collector {
    /// Latency in microseconds
    histogram: Histogram<u64>,
    status_codes: BTreeMap<u16, u64>,
    errors: BTreeMap<String, u64>,
    successful: u64,
    failed: u64,
    request_bytes: u64,
    response_bytes: u64,
}

impl Collector {
    fn new() -> Self {
        // Constant bounds, always valid
        let histogram = Histogram::new_with_bounds(1, MAX_LATENCY_US, 3)
            .expect("valid histogram bounds");

        Self {
            histogram,
            status_codes: BTreeMap::new(),
            errors: BTreeMap::new(),
            successful: 0,
            failed: 0,
            request_bytes: 0,
            response_bytes: 0,
        }
    }

    fn record(&mut self, sample: &Sample) {
        let latency_us = sample.latency.as_micros() as u64;
        let _ = self.histogram.record(latency_us.clamp(1, MAX_LATENCY_US));

        *self.status_codes.entry(sample.proto_code).or_insert(0) += 1;

        let ok = sample.error.is_none() && (200..400).contains(&sample.proto_code);
        if ok {
            self.successful += 1;
        } else {
            self.failed += 1;
        }

        if let Some(err) = &sample.error {
            *self.errors.entry(err.clone()).or_insert(0) += 1;
        }

        self.request_bytes += sample.request_bytes;
        self.response_bytes += sample.response_bytes;
    }

    fn finalize(self, duration: Duration) -> TagStats {
        let total = self.successful + self.failed;
        let duration_secs = duration.as_secs_f64();

        let latency = if self.histogram.len() > 0 {
            LatencyStats {
                min_ms: self.histogram.min() as f64 / 1000.0,
                max_ms: self.histogram.max() as f64 / 1000.0,
                mean_ms: self.histogram.mean() / 1000.0,
                stddev_ms: self.histogram.stdev() / 1000.0,
                p50_ms: self.histogram.value_at_percentile(50.0) as f64 / 1000.0,
                p75_ms: self.histogram.value_at_percentile(75.0) as f64 / 1000.0,
                p90_ms: self.histogram.value_at_percentile(90.0) as f64 / 1000.0,
                p95_ms: self.histogram.value_at_percentile(95.0) as f64 / 1000.0,
                p99_ms: self.histogram.value_at_percentile(99.0) as f64 / 1000.0,
            }
        } else {
            LatencyStats::default()
        };

        TagStats {
            samples: total,
            successful: self.successful,
            failed: self.failed,
            success_rate: if total > 0 { self.successful as f64 / total as f64 } else { 0.0 },
            samples_per_second: if duration_secs > 0.0 { total as f64 / duration_secs } else { 0.0 },
            request_bytes: self.request_bytes,
            response_bytes: self.response_bytes,
            status_codes: self.status_codes,
            errors: self.errors,
            latency,
        }
    }
}

/// Accumulates samples overall and per tag
pub struct StatsCollector {
    total: Collector,
    by_tag: IndexMap<String, Collector>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            total: Collector::new(),
            by_tag: IndexMap::new(),
        }
    }

    pub fn record(&mut self, sample: &Sample) {
        self.total.record(sample);
        self.by_tag
            .entry(sample.tag.clone())
            .or_insert_with(Collector::new)
            .record(sample);
    }

    pub fn finalize(self, duration: Duration) -> RunStats {
        RunStats {
            duration,
            total: self.total.finalize(duration),
            by_tag: self
                .by_tag
                .into_iter()
                .map(|(tag, c)| (tag, c.finalize(duration)))
                .collect(),
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
