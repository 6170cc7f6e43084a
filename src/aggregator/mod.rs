//! Sample sinks and run statistics

pub mod stats;

pub use stats::{LatencyStats, RunStats, StatsCollector, TagStats};

use std::time::Duration;

use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use humansize::{format_size, FormatSizeOptions, BINARY};
use tokio::sync::mpsc;

use crate::sample::Sample;

/// Receives exactly one sample per executed step; must not block
pub trait Aggregator: Send + Sync {
    fn report(&self, sample: Sample);
}

/// Forwards samples to an async consumer over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelAggregator {
    tx: mpsc::UnboundedSender<Sample>,
}

impl ChannelAggregator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Sample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Aggregator for ChannelAggregator {
    fn report(&self, sample: Sample) {
        // Receiver gone means the run is shutting down
        let _ = self.tx.send(sample);
    }
}

/// Drain `rx` until every sender is dropped
pub async fn collect(mut rx: mpsc::UnboundedReceiver<Sample>) -> StatsCollector {
    let mut collector = StatsCollector::new();
    while let Some(sample) = rx.recv().await {
        collector.record(&sample);
    }
    collector
}

pub fn format_bytes(bytes: u64, precision: usize) -> String {
    let options = FormatSizeOptions::from(BINARY)
        .decimal_places(precision)
        .decimal_zeroes(precision);
    format_size(bytes, options)
}

/// Render run statistics as a per-tag table followed by status and error
/// breakdowns
pub fn format_results(stats: &RunStats) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        [
            "Tag", "Samples", "OK", "Failed", "Rate/s", "Mean", "p50", "p95", "p99", "Max", "Sent",
            "Received",
        ]
        .into_iter()
        .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
    );

    for (tag, s) in &stats.by_tag {
        table.add_row(row(tag, s));
    }
    table.add_row(row("TOTAL", &stats.total));

    let mut output = String::new();
    output.push_str(&format!(
        "Duration: {}\n",
        humantime::format_duration(Duration::from_millis(stats.duration.as_millis() as u64))
    ));
    output.push_str(&table.to_string());
    output.push('\n');

    if !stats.total.status_codes.is_empty() {
        output.push_str("\nStatus codes:\n");
        for (code, count) in &stats.total.status_codes {
            let label = if *code == 0 { "error".to_string() } else { code.to_string() };
            output.push_str(&format!("  {}: {}\n", label, count));
        }
    }

    if !stats.total.errors.is_empty() {
        output.push_str("\nErrors:\n");
        for (error, count) in &stats.total.errors {
            output.push_str(&format!("  {}: {}\n", error, count));
        }
    }

    output
}

fn row(tag: &str, s: &TagStats) -> Vec<Cell> {
    vec![
        Cell::new(tag),
        Cell::new(s.samples),
        Cell::new(s.successful),
        Cell::new(s.failed),
        Cell::new(format!("{:.2}", s.samples_per_second)),
        Cell::new(format!("{:.2}ms", s.latency.mean_ms)),
        Cell::new(format!("{:.2}ms", s.latency.p50_ms)),
        Cell::new(format!("{:.2}ms", s.latency.p95_ms)),
        Cell::new(format!("{:.2}ms", s.latency.p99_ms)),
        Cell::new(format!("{:.2}ms", s.latency.max_ms)),
        Cell::new(format_bytes(s.request_bytes, 2)),
        Cell::new(format_bytes(s.response_bytes, 2)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ShootError;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500, 2), "500.00 B");
        assert_eq!(format_bytes(1536, 2), "1.50 KiB");
        assert_eq!(format_bytes(1572864, 2), "1.50 MiB");
    }

    #[tokio::test]
    async fn test_channel_collects_all_samples() {
        let (agg, rx) = ChannelAggregator::new();
        let collector = tokio::spawn(collect(rx));

        for tag in ["a", "b", "a"] {
            let mut s = Sample::start(tag);
            s.set_proto_code(200);
            agg.report(s);
        }
        drop(agg);

        let stats = collector.await.unwrap().finalize(Duration::from_secs(1));
        assert_eq!(stats.total.samples, 3);
        assert_eq!(stats.by_tag["a"].samples, 2);
    }

    #[test]
    fn test_format_results() {
        let mut collector = StatsCollector::new();
        let mut ok = Sample::start("auth");
        ok.set_proto_code(200);
        collector.record(&ok);
        let mut failed = Sample::start("list");
        failed.fail(&ShootError::Cancelled);
        collector.record(&failed);

        let output = format_results(&collector.finalize(Duration::from_secs(2)));
        assert!(output.contains("auth"));
        assert!(output.contains("TOTAL"));
        assert!(output.contains("Status codes:"));
        assert!(output.contains("error: 1"));
        assert!(output.contains("Shot cancelled: 1"));
    }
}
