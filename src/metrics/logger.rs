use super::analyzer::AggregateReport;
use anyhow::Result;
use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

// csv rows must stay flat, so record + metrics are folded into one row here
#[derive(Serialize)]
struct FlowRow<'a> {
    flow: &'a str,
    tx_packets: u64,
    rx_packets: u64,
    tx_bytes: u64,
    rx_bytes: u64,
    lost_packets: u64,
    throughput_bps: f64,
    loss_ratio_percent: f64,
    mean_delay_ms: f64,
}

pub struct FlowCsvLogger {
    writer: Writer<File>,
}

impl FlowCsvLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let writer = Writer::from_path(path)?;
        Ok(Self { writer })
    }

    pub fn log_report(&mut self, report: &AggregateReport) -> Result<()> {
        for breakdown in &report.flows {
            self.writer.serialize(FlowRow {
                flow: &breakdown.flow,
                tx_packets: breakdown.record.tx_packets,
                rx_packets: breakdown.record.rx_packets,
                tx_bytes: breakdown.record.tx_bytes,
                rx_bytes: breakdown.record.rx_bytes,
                lost_packets: breakdown.record.lost_packets,
                throughput_bps: breakdown.metrics.throughput_bps,
                loss_ratio_percent: breakdown.metrics.loss_ratio_percent,
                mean_delay_ms: breakdown.metrics.mean_delay_ms,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
