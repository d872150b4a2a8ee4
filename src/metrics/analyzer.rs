// Post-run reduction: one pass over the kernel's flow records, folded into a
// single report. No shared accumulator objects, no mutation after the fold.

use super::{FlowMetrics, FlowRecord};
use crate::kernel::FlowId;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowBreakdown {
    pub flow: String,
    pub record: FlowRecord,
    pub metrics: FlowMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub name: String,
    pub profile: String,
    pub no_data: bool,
    pub flow_count: usize,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub lost_packets: u64,
    pub total_throughput_bps: f64,
    pub delivery_ratio_percent: f64,
    pub loss_ratio_percent: f64,
    pub mean_delay_ms: f64,
    pub window_start_secs: f64,
    pub window_end_secs: f64,
    pub flows: Vec<FlowBreakdown>,
}

pub fn aggregate(
    name: &str,
    profile: &str,
    records: &BTreeMap<FlowId, FlowRecord>,
    fallback_window: Duration,
) -> AggregateReport {
    let mut tx_packets = 0u64;
    let mut rx_packets = 0u64;
    let mut tx_bytes = 0u64;
    let mut rx_bytes = 0u64;
    let mut lost_packets = 0u64;
    let mut delay_sum = Duration::ZERO;

    // Window bounds are min/max over the flows, never a sum of timestamps.
    let mut first_tx: Option<Duration> = None;
    let mut last_rx: Option<Duration> = None;

    let mut flows = Vec::with_capacity(records.len());

    for (id, record) in records {
        tx_packets += record.tx_packets;
        rx_packets += record.rx_packets;
        tx_bytes += record.tx_bytes;
        rx_bytes += record.rx_bytes;
        lost_packets += record.lost_packets;
        delay_sum += record.delay_sum;

        if record.tx_packets > 0 {
            first_tx = Some(first_tx.map_or(record.first_tx, |t| t.min(record.first_tx)));
        }
        if record.rx_packets > 0 {
            last_rx = Some(last_rx.map_or(record.last_rx, |t| t.max(record.last_rx)));
        }

        flows.push(FlowBreakdown {
            flow: id.to_string(),
            record: record.clone(),
            metrics: FlowMetrics::from_record(record, fallback_window),
        });
    }

    let window_start = first_tx.unwrap_or_default();
    let window_end = last_rx.unwrap_or_default();

    let mut window = window_end.as_secs_f64() - window_start.as_secs_f64();
    if window <= 0.0 {
        window = fallback_window.as_secs_f64();
    }

    let total_throughput_bps = if window > 0.0 {
        rx_bytes as f64 * 8.0 / window
    } else {
        0.0
    };

    let delivery_ratio_percent = if tx_packets > 0 {
        tx_packets.saturating_sub(lost_packets) as f64 * 100.0 / tx_packets as f64
    } else {
        0.0
    };

    let loss_ratio_percent = if tx_packets > 0 {
        lost_packets as f64 * 100.0 / tx_packets as f64
    } else {
        0.0
    };

    let mean_delay_ms = if rx_packets > 0 {
        delay_sum.as_secs_f64() / rx_packets as f64 * 1000.0
    } else {
        0.0
    };

    AggregateReport {
        name: name.to_string(),
        profile: profile.to_string(),
        no_data: records.is_empty(),
        flow_count: records.len(),
        tx_packets,
        rx_packets,
        tx_bytes,
        rx_bytes,
        lost_packets,
        total_throughput_bps,
        delivery_ratio_percent,
        loss_ratio_percent,
        mean_delay_ms,
        window_start_secs: window_start.as_secs_f64(),
        window_end_secs: window_end.as_secs_f64(),
        flows,
    }
}

impl AggregateReport {
    // Field order is fixed so successive runs diff cleanly.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "============================================================");
        let _ = writeln!(out, "RESULTS - {} | profile = {}", self.name, self.profile);
        let _ = writeln!(out, "============================================================");

        if self.no_data {
            let _ = writeln!(out, "  (no flow data)");
        }

        let _ = writeln!(out, "  Flows:            {}", self.flow_count);
        let _ = writeln!(out, "  Tx Packets:       {}", self.tx_packets);
        let _ = writeln!(out, "  Rx Packets:       {}", self.rx_packets);
        let _ = writeln!(out, "  Lost Packets:     {}", self.lost_packets);
        let _ = writeln!(
            out,
            "  Throughput:       {:.2} Kbps",
            self.total_throughput_bps / 1024.0
        );
        let _ = writeln!(
            out,
            "  Delivery Ratio:   {:.2} %",
            self.delivery_ratio_percent
        );
        let _ = writeln!(out, "  Loss Ratio:       {:.2} %", self.loss_ratio_percent);
        let _ = writeln!(out, "  Mean Delay:       {:.2} ms", self.mean_delay_ms);
        let _ = writeln!(
            out,
            "  Window:           {:.2}s -> {:.2}s",
            self.window_start_secs, self.window_end_secs
        );

        for breakdown in &self.flows {
            let _ = writeln!(out, "  --------------------------------------------------");
            let _ = writeln!(out, "  Flow {}", breakdown.flow);
            let _ = writeln!(
                out,
                "    Tx/Rx/Lost:     {} / {} / {}",
                breakdown.record.tx_packets, breakdown.record.rx_packets, breakdown.record.lost_packets
            );
            let _ = writeln!(
                out,
                "    Throughput:     {:.2} Kbps",
                breakdown.metrics.throughput_bps / 1024.0
            );
            let _ = writeln!(
                out,
                "    Loss rate:      {:.2} %",
                breakdown.metrics.loss_ratio_percent
            );
            let _ = writeln!(
                out,
                "    Mean delay:     {:.2} ms",
                breakdown.metrics.mean_delay_ms
            );
        }

        out
    }
}

// Whitespace-separated per-flow rows, ready for gnuplot.
pub fn export_plot_data(report: &AggregateReport, path: impl AsRef<Path>) -> Result<()> {
    let mut out = String::from("# flow throughput_kbps loss_pct mean_delay_ms\n");
    for (i, breakdown) in report.flows.iter().enumerate() {
        let _ = writeln!(
            out,
            "{} {:.3} {:.3} {:.3}",
            i + 1,
            breakdown.metrics.throughput_bps / 1024.0,
            breakdown.metrics.loss_ratio_percent,
            breakdown.metrics.mean_delay_ms
        );
    }
    std::fs::write(path, out)?;
    Ok(())
}

// Companion gnuplot script for the .dat file above.
pub fn export_gnuplot_script(
    dat_path: &str,
    png_path: &str,
    path: impl AsRef<Path>,
) -> Result<()> {
    let mut out = String::new();
    let _ = writeln!(out, "set terminal png size 800,600");
    let _ = writeln!(out, "set output '{}'", png_path);
    let _ = writeln!(out, "set title 'Per-flow throughput'");
    let _ = writeln!(out, "set xlabel 'Flow'");
    let _ = writeln!(out, "set ylabel 'Throughput (Kbps)'");
    let _ = writeln!(out, "set grid");
    let _ = writeln!(out, "set style fill solid");
    let _ = writeln!(out, "set boxwidth 0.5");
    let _ = writeln!(
        out,
        "plot '{}' using 1:2 with boxes title 'Throughput' lc rgb 'blue'",
        dat_path
    );
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    const WINDOW: Duration = Duration::from_secs(9);

    fn flow_id(host: u8) -> FlowId {
        FlowId {
            source: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, host), 49152),
            destination: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 4000),
            protocol: 17,
        }
    }

    #[test]
    fn single_flow_reference_numbers() {
        let mut records = BTreeMap::new();
        records.insert(
            flow_id(15),
            FlowRecord {
                tx_packets: 100,
                rx_packets: 90,
                tx_bytes: 102_400,
                rx_bytes: 92_160,
                lost_packets: 10,
                delay_sum: Duration::from_millis(450),
                first_tx: Duration::from_secs(2),
                last_rx: Duration::from_secs(11),
            },
        );

        let report = aggregate("ref", "medium", &records, WINDOW);
        assert!(!report.no_data);
        assert_eq!(report.loss_ratio_percent, 10.0);
        assert_eq!(report.delivery_ratio_percent, 90.0);
        assert!((report.total_throughput_bps - 92_160.0 * 8.0 / 9.0).abs() < 1e-9);
        assert!((report.total_throughput_bps - 81_920.0).abs() < 1.0);
    }

    #[test]
    fn window_is_min_max_not_sum() {
        let mut records = BTreeMap::new();
        records.insert(
            flow_id(15),
            FlowRecord {
                tx_packets: 1,
                rx_packets: 1,
                tx_bytes: 1024,
                rx_bytes: 1024,
                first_tx: Duration::from_secs(2),
                last_rx: Duration::from_secs(5),
                ..FlowRecord::default()
            },
        );
        records.insert(
            flow_id(16),
            FlowRecord {
                tx_packets: 1,
                rx_packets: 1,
                tx_bytes: 1024,
                rx_bytes: 1024,
                first_tx: Duration::from_secs(3),
                last_rx: Duration::from_secs(10),
                ..FlowRecord::default()
            },
        );

        let report = aggregate("window", "medium", &records, WINDOW);
        assert_eq!(report.window_start_secs, 2.0);
        assert_eq!(report.window_end_secs, 10.0);
    }

    #[test]
    fn zero_tx_flow_yields_zero_ratios() {
        let mut records = BTreeMap::new();
        records.insert(flow_id(15), FlowRecord::default());

        let report = aggregate("zeros", "low", &records, WINDOW);
        assert_eq!(report.loss_ratio_percent, 0.0);
        assert_eq!(report.delivery_ratio_percent, 0.0);
        assert!(report.mean_delay_ms == 0.0);
        assert!(!report.no_data);
    }

    #[test]
    fn empty_input_is_flagged_no_data() {
        let report = aggregate("empty", "low", &BTreeMap::new(), WINDOW);
        assert!(report.no_data);
        assert_eq!(report.flow_count, 0);
        assert_eq!(report.tx_packets, 0);
        assert_eq!(report.total_throughput_bps, 0.0);
        assert_eq!(report.mean_delay_ms, 0.0);
    }

    #[test]
    fn complete_loss_flow_does_not_contaminate_others() {
        let mut records = BTreeMap::new();
        records.insert(
            flow_id(15),
            FlowRecord {
                tx_packets: 10,
                lost_packets: 10,
                tx_bytes: 10_240,
                first_tx: Duration::from_secs(2),
                ..FlowRecord::default()
            },
        );
        records.insert(
            flow_id(16),
            FlowRecord {
                tx_packets: 10,
                rx_packets: 10,
                tx_bytes: 10_240,
                rx_bytes: 10_240,
                delay_sum: Duration::from_millis(100),
                first_tx: Duration::from_secs(2),
                last_rx: Duration::from_secs(7),
                ..FlowRecord::default()
            },
        );

        let report = aggregate("mixed", "medium", &records, WINDOW);
        let healthy = report
            .flows
            .iter()
            .find(|b| b.record.rx_packets == 10)
            .unwrap();
        assert_eq!(healthy.metrics.loss_ratio_percent, 0.0);
        assert_eq!(healthy.metrics.mean_delay_ms, 10.0);
        assert_eq!(report.delivery_ratio_percent, 50.0);
    }

    #[test]
    fn render_is_stable() {
        let report = aggregate("stable", "low", &BTreeMap::new(), WINDOW);
        assert_eq!(report.render(), report.render());
        assert!(report.render().contains("(no flow data)"));
    }
}
