pub mod config;
pub use config::ExperimentConfig;

use crate::kernel::{EventKernel, Kernel, LinkModel};
use crate::metrics::analyzer::{self, AggregateReport};
use crate::metrics::logger::FlowCsvLogger;
use crate::schedule::Schedule;
use crate::topology::{self, Position};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub struct Experiment {
    config: ExperimentConfig,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    // Generate -> simulate -> aggregate, in that order, no feedback loop.
    pub fn run(&self) -> Result<AggregateReport> {
        let config = &self.config;
        info!("Starting experiment: {}", config.name);
        info!("Profile: {}", config.profile.name());
        info!(
            "Population: {} receivers, {} senders",
            config.population.receivers, config.population.senders
        );
        info!("Seed: {}", config.seed);

        let positions = self.load_topology();

        let schedule = Schedule::generate(config.profile, &config.population, &config.params);
        if schedule.is_empty() {
            warn!("schedule is empty, nothing will be simulated");
        } else {
            info!(
                "Schedule: {} levels, {} flows, traffic ends at {:?}",
                schedule.levels.len(),
                schedule.flow_count(),
                schedule.stop_time()
            );
        }

        let mut kernel = EventKernel::new(positions, LinkModel::new(config.link, config.seed));
        for flow in schedule.flows() {
            kernel.install_receiver(flow.destination_node, flow.destination.port());
            kernel.install_sender(flow);
        }

        let until = schedule.stop_time() + config.drain;
        self.drive(&mut kernel, until)?;

        let records = kernel
            .flow_stats()
            .context("simulation kernel failed to produce flow records")?;
        if records.is_empty() {
            warn!("kernel recorded no flows, reporting zeros");
        }

        let report = analyzer::aggregate(
            &config.name,
            config.profile.name(),
            &records,
            config.params.window,
        );

        if config.progress {
            println!("{}", report.render());
        }

        if let Some(dir) = &config.output_dir {
            self.save_results(&report, dir)?;
        }

        Ok(report)
    }

    // Run the kernel in one-second slices so the bar tracks simulated time.
    fn drive(&self, kernel: &mut EventKernel, until: Duration) -> Result<()> {
        let pb = if self.config.progress {
            let pb = ProgressBar::new(until.as_secs());
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.orange/yellow} {pos}/{len}s {msg}")?
                    .progress_chars("█▓░"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut t = Duration::ZERO;
        while t < until {
            t = (t + Duration::from_secs(1)).min(until);
            kernel.run(t)?;
            pb.set_position(t.as_secs());
        }
        pb.finish_with_message("simulation complete");

        Ok(())
    }

    fn load_topology(&self) -> Vec<Position> {
        let config = &self.config;
        topology::positions_or_grid(
            config.topology.as_deref(),
            config.population.total(),
            config.grid_spacing,
            config.seed,
        )
    }

    fn save_results(&self, report: &AggregateReport, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let base = dir.join(format!("{}_{}", self.config.name, timestamp));

        let json_path = base.with_extension("report.json");
        std::fs::write(&json_path, serde_json::to_string_pretty(report)?)?;
        info!("Report saved to: {}", json_path.display());

        let csv_path = base.with_extension("flows.csv");
        let mut logger = FlowCsvLogger::new(&csv_path)?;
        logger.log_report(report)?;
        info!("Per-flow metrics saved to: {}", csv_path.display());

        let dat_path = base.with_extension("plot.dat");
        analyzer::export_plot_data(report, &dat_path)?;
        info!("Plot data saved to: {}", dat_path.display());

        let gnu_path = base.with_extension("plot.gnu");
        let png_path = base.with_extension("plot.png");
        analyzer::export_gnuplot_script(
            &dat_path.to_string_lossy(),
            &png_path.to_string_lossy(),
            &gnu_path,
        )?;
        info!("Gnuplot script saved to: {}", gnu_path.display());

        info!(
            "Throughput: {:.2} Kbps | Delivery: {:.2}% | Mean delay: {:.2} ms",
            report.total_throughput_bps / 1024.0,
            report.delivery_ratio_percent,
            report.mean_delay_ms
        );

        Ok(())
    }
}
