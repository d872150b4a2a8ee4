pub mod analyzer;
pub mod logger;

use serde::{Deserialize, Serialize};
use std::time::Duration;

// Raw per-flow counters as the kernel reports them after a run. Read-only
// from here on out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub lost_packets: u64,
    pub delay_sum: Duration,
    pub first_tx: Duration,
    pub last_rx: Duration,
}

// Derived metrics for a single flow. Pure function of that flow's own
// record, so one dead flow can never contaminate its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowMetrics {
    pub duration_secs: f64,
    pub throughput_bps: f64,
    pub loss_ratio_percent: f64,
    pub mean_delay_ms: f64,
}

impl FlowMetrics {
    pub fn from_record(record: &FlowRecord, fallback_window: Duration) -> Self {
        // A flow that never delivered (or where last-rx races first-tx) has a
        // non-positive span. Substitute the observation window instead of
        // dividing by it.
        let mut duration = record.last_rx.as_secs_f64() - record.first_tx.as_secs_f64();
        if duration <= 0.0 {
            duration = fallback_window.as_secs_f64();
        }

        let throughput_bps = if duration > 0.0 {
            record.rx_bytes as f64 * 8.0 / duration
        } else {
            0.0
        };

        let loss_ratio_percent = if record.tx_packets > 0 {
            record.lost_packets as f64 * 100.0 / record.tx_packets as f64
        } else {
            0.0
        };

        let mean_delay_ms = if record.rx_packets > 0 {
            record.delay_sum.as_secs_f64() / record.rx_packets as f64 * 1000.0
        } else {
            0.0
        };

        Self {
            duration_secs: duration,
            throughput_bps,
            loss_ratio_percent,
            mean_delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(9);

    #[test]
    fn reference_flow_metrics() {
        let record = FlowRecord {
            tx_packets: 100,
            rx_packets: 90,
            tx_bytes: 102_400,
            rx_bytes: 92_160,
            lost_packets: 10,
            delay_sum: Duration::from_millis(450),
            first_tx: Duration::from_secs(2),
            last_rx: Duration::from_secs(11),
        };

        let metrics = FlowMetrics::from_record(&record, WINDOW);
        assert_eq!(metrics.duration_secs, 9.0);
        assert!((metrics.throughput_bps - 92_160.0 * 8.0 / 9.0).abs() < 1e-9);
        assert_eq!(metrics.loss_ratio_percent, 10.0);
        assert_eq!(metrics.mean_delay_ms, 5.0);
    }

    #[test]
    fn zero_tx_never_divides() {
        let metrics = FlowMetrics::from_record(&FlowRecord::default(), WINDOW);
        assert_eq!(metrics.loss_ratio_percent, 0.0);
        assert_eq!(metrics.mean_delay_ms, 0.0);
        assert_eq!(metrics.throughput_bps, 0.0);
        assert!(metrics.throughput_bps.is_finite());
    }

    #[test]
    fn non_positive_span_uses_fallback_window() {
        let record = FlowRecord {
            tx_packets: 5,
            rx_packets: 0,
            tx_bytes: 5_120,
            rx_bytes: 0,
            lost_packets: 5,
            delay_sum: Duration::ZERO,
            first_tx: Duration::from_secs(4),
            last_rx: Duration::ZERO,
        };

        let metrics = FlowMetrics::from_record(&record, WINDOW);
        assert_eq!(metrics.duration_secs, 9.0);
        assert_eq!(metrics.loss_ratio_percent, 100.0);
    }

    #[test]
    fn zero_fallback_window_still_finite() {
        let record = FlowRecord {
            rx_bytes: 1000,
            ..FlowRecord::default()
        };
        let metrics = FlowMetrics::from_record(&record, Duration::ZERO);
        assert_eq!(metrics.throughput_bps, 0.0);
    }
}
