// ,--.   ,--. ,---. ,--.  ,--.,------.,--------.,--.    ,---.  ,-----.
// |   `.'   |/  O  \|  ,'.|  ||  .---''--.  .--'|  |   /  O  \ |  |) /_
// |  |'.'|  |  .-.  |  |' '  ||  `--,    |  |   |  |  |  .-.  ||  .-.  \
// |  |   |  |  | |  |  | `   ||  `---.   |  |   |  '--.  | |  ||  '--' /
// `--'   `--`--' `--`--'  `--'`------'   `--'   `-----'`--' `--'`------'

// Experiment driver for the wireless load scenarios. The schedule generator
// and the flow statistics analyzer are the parts with actual design in them;
// the rest is plumbing around the simulation kernel.

// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use manetlab::prelude::*;
use manetlab::metrics::analyzer::AggregateReport;
use manetlab::schedule::ScheduleParams;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, Level};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[arg(short, long, default_value = "low")]
        profile: String,
        #[arg(short = 'S', long, default_value_t = 14)]
        senders: usize,
        #[arg(short = 'R', long, default_value_t = 14)]
        receivers: usize,
        #[arg(short, long, default_value_t = 9)]
        window: u64,
        #[arg(long, default_value_t = 10)]
        level_duration: u64,
        #[arg(long)]
        max_levels: Option<usize>,
        #[arg(long, default_value_t = 1024)]
        packet_size: u32,
        #[arg(long)]
        interval_us: Option<u64>,
        #[arg(long, default_value_t = 12345)]
        seed: u64,
        #[arg(short, long)]
        topology: Option<PathBuf>,
        #[arg(long, default_value_t = 50.0)]
        txrange: f64,
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(long)]
        no_save: bool,
    },

    Compare {
        #[arg(short, long, default_value = "low,medium,high,ramp")]
        profiles: String,
        #[arg(short = 'S', long, default_value_t = 14)]
        senders: usize,
        #[arg(short = 'R', long, default_value_t = 14)]
        receivers: usize,
        #[arg(short, long, default_value_t = 3)]
        repetitions: u32,
        #[arg(long, default_value_t = 12345)]
        seed: u64,
        #[arg(short, long)]
        topology: Option<PathBuf>,
        #[arg(long, default_value_t = 50.0)]
        txrange: f64,
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
    },

    // Print the generated schedule without simulating anything
    Schedule {
        #[arg(short, long, default_value = "ramp")]
        profile: String,
        #[arg(short = 'S', long, default_value_t = 14)]
        senders: usize,
        #[arg(short = 'R', long, default_value_t = 14)]
        receivers: usize,
        #[arg(short, long, default_value_t = 9)]
        window: u64,
        #[arg(long, default_value_t = 10)]
        level_duration: u64,
        #[arg(long)]
        max_levels: Option<usize>,
        #[arg(long)]
        interval_us: Option<u64>,
    },

    Analyze {
        #[arg(default_value = "results")]
        path: String,
    },

    List,
}

fn main() -> Result<()> {
    let program_start = Instant::now();

    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            profile,
            senders,
            receivers,
            window,
            level_duration,
            max_levels,
            packet_size,
            interval_us,
            seed,
            topology,
            txrange,
            loss,
            name,
            no_save,
        } => {
            let profile = resolve_profile(&profile, interval_us);
            let name = name.unwrap_or_else(|| format!("{}_{}x{}", profile.name(), senders, receivers));

            let config = ExperimentConfig {
                name,
                profile,
                population: Population::new(receivers, senders),
                params: ScheduleParams {
                    packet_size,
                    window: Duration::from_secs(window),
                    level_duration: Duration::from_secs(level_duration),
                    max_levels,
                    ..ScheduleParams::default()
                },
                link: LinkConfig {
                    max_range: txrange,
                    loss_rate: loss,
                    ..LinkConfig::default()
                },
                topology,
                seed,
                output_dir: (!no_save).then(|| PathBuf::from("results")),
                ..ExperimentConfig::default()
            };

            info!("manetlab: Single Run");
            Experiment::new(config).run()?;
        }

        Commands::Compare {
            profiles,
            senders,
            receivers,
            repetitions,
            seed,
            topology,
            txrange,
            loss,
        } => {
            compare_profiles(
                profiles,
                senders,
                receivers,
                repetitions,
                seed,
                topology,
                txrange,
                loss,
            )?;
        }

        Commands::Schedule {
            profile,
            senders,
            receivers,
            window,
            level_duration,
            max_levels,
            interval_us,
        } => {
            let profile = resolve_profile(&profile, interval_us);
            let params = ScheduleParams {
                window: Duration::from_secs(window),
                level_duration: Duration::from_secs(level_duration),
                max_levels,
                ..ScheduleParams::default()
            };
            let schedule =
                Schedule::generate(profile, &Population::new(receivers, senders), &params);
            print_schedule(&schedule);
        }

        Commands::Analyze { path } => {
            analyze_results(&path)?;
        }

        Commands::List => {
            println!("\nKnown load profiles");

            for name in LoadProfile::known_names() {
                let profile = LoadProfile::parse(name);
                match profile {
                    LoadProfile::Ramp => {
                        println!("  - {:<8} increasing concurrency, one level per step", name)
                    }
                    _ => println!(
                        "  - {:<8} fixed inter-packet interval of {:?}",
                        name,
                        profile.interval()
                    ),
                }
            }

            println!("\nUsage: cargo run -- run --profile <name>");
            println!("Example: cargo run -- run --profile ramp --senders 28\n");
        }
    }

    let total_time = program_start.elapsed();
    info!("Total runtime: {:.2}s", total_time.as_secs_f64());

    Ok(())
}

// An explicit interval wins over the named profile; unknown names fall back
// to the default inside parse().
fn resolve_profile(name: &str, interval_us: Option<u64>) -> LoadProfile {
    match interval_us {
        Some(us) => LoadProfile::Custom {
            interval: Duration::from_micros(us),
        },
        None => LoadProfile::parse(name),
    }
}

#[allow(clippy::too_many_arguments)]
fn compare_profiles(
    profiles_str: String,
    senders: usize,
    receivers: usize,
    repetitions: u32,
    seed: u64,
    topology: Option<PathBuf>,
    txrange: f64,
    loss: f64,
) -> Result<()> {
    let profile_names: Vec<&str> = profiles_str.split(',').map(|s| s.trim()).collect();

    info!("manetlab: Comparison");
    info!("");
    info!("Profiles: {}", profile_names.join(", "));
    info!("Repetitions: {}", repetitions);
    info!("Population: {} receivers, {} senders", receivers, senders);
    info!("");

    let mut all_reports = Vec::new();

    for profile_name in profile_names {
        info!("Testing: {}", profile_name);

        let profile = LoadProfile::parse(profile_name);

        // repetitions are independent (own kernel, own seed), run them in
        // parallel
        let reports: Result<Vec<AggregateReport>> = (0..repetitions)
            .into_par_iter()
            .map(|rep| {
                let config = ExperimentConfig {
                    name: format!("{}_{}", profile_name, rep + 1),
                    profile,
                    population: Population::new(receivers, senders),
                    link: LinkConfig {
                        max_range: txrange,
                        loss_rate: loss,
                        ..LinkConfig::default()
                    },
                    topology: topology.clone(),
                    seed: seed + rep as u64,
                    output_dir: None,
                    progress: false,
                    ..ExperimentConfig::default()
                };
                Experiment::new(config).run()
            })
            .collect();
        let reports = reports?;

        if reports.is_empty() {
            info!("  (no repetitions requested, skipping)");
            continue;
        }

        for report in &reports {
            info!(
                "  {}: {:.2} Kbps, delivery {:.2}%",
                report.name,
                report.total_throughput_bps / 1024.0,
                report.delivery_ratio_percent
            );
        }

        all_reports.push(average_reports(&reports));
        info!("");
    }

    comparison_table(&all_reports);

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    std::fs::create_dir_all("results")?;
    let comparison_path = format!("results/comparison_{}.json", timestamp);
    std::fs::write(&comparison_path, serde_json::to_string_pretty(&all_reports)?)?;
    info!("Comparison saved to: {}", comparison_path);

    Ok(())
}

fn print_schedule(schedule: &Schedule) {
    println!(
        "\nSchedule: profile {}, {} levels, {} flows",
        schedule.profile.name(),
        schedule.levels.len(),
        schedule.flow_count()
    );

    for level in &schedule.levels {
        println!(
            "\nLevel {} ({}) [{:.2}s -> {:.2}s]",
            level.index,
            level.name,
            level.start.as_secs_f64(),
            level.stop.as_secs_f64()
        );
        for flow in &level.flows {
            let budget = if flow.max_packets == 0 {
                "unlimited".to_string()
            } else {
                format!("max {}", flow.max_packets)
            };
            println!(
                "  node {:>3} -> {}  {} B every {:?}, {}",
                flow.source, flow.destination, flow.packet_size, flow.interval, budget
            );
        }
    }

    println!();
}

fn analyze_results(path: &str) -> Result<()> {
    use std::fs;

    info!("Analyzing results in: {}", path);

    let entries = fs::read_dir(path)?;
    let mut reports = Vec::new();

    for entry in entries {
        let entry = entry?;
        let path = entry.path();

        if path.extension().and_then(|s| s.to_str()) == Some("json")
            && path.to_string_lossy().contains("report")
        {
            let content = fs::read_to_string(&path)?;
            let report: AggregateReport = serde_json::from_str(&content)?;
            reports.push(report);
        }
    }

    if reports.is_empty() {
        info!("No report files found.");
        return Ok(());
    }

    comparison_table(&reports);

    Ok(())
}

fn average_reports(reports: &[AggregateReport]) -> AggregateReport {
    let n = reports.len() as f64;
    let avg_u64 =
        |f: fn(&AggregateReport) -> u64| (reports.iter().map(f).sum::<u64>() as f64 / n) as u64;

    AggregateReport {
        name: reports[0].name.clone(),
        profile: reports[0].profile.clone(),
        no_data: reports.iter().all(|r| r.no_data),
        flow_count: reports[0].flow_count,
        tx_packets: avg_u64(|r| r.tx_packets),
        rx_packets: avg_u64(|r| r.rx_packets),
        tx_bytes: avg_u64(|r| r.tx_bytes),
        rx_bytes: avg_u64(|r| r.rx_bytes),
        lost_packets: avg_u64(|r| r.lost_packets),
        total_throughput_bps: reports.iter().map(|r| r.total_throughput_bps).sum::<f64>() / n,
        delivery_ratio_percent: reports.iter().map(|r| r.delivery_ratio_percent).sum::<f64>() / n,
        loss_ratio_percent: reports.iter().map(|r| r.loss_ratio_percent).sum::<f64>() / n,
        mean_delay_ms: reports.iter().map(|r| r.mean_delay_ms).sum::<f64>() / n,
        window_start_secs: reports.iter().map(|r| r.window_start_secs).fold(f64::MAX, f64::min),
        window_end_secs: reports.iter().map(|r| r.window_end_secs).fold(0.0, f64::max),
        // per-flow breakdowns don't average meaningfully, keep the table lean
        flows: Vec::new(),
    }
}

// TODO: column widths break past 999999 Kbps, nobody has hit it yet
fn comparison_table(reports: &[AggregateReport]) {
    println!("\n╔══════════════════════════════════════════════════════════════════════════════╗");
    println!("║                            PROFILE COMPARISON                                ║");
    println!("╠═══════════════╦════════════╦═══════════╦═══════════╦═══════════╦═════════════╣");
    println!("║ Profile       ║ Throughput ║ Delivery  ║ Loss      ║ Delay     ║ Flows       ║");
    println!("║               ║ (Kbps)     ║ (%)       ║ (%)       ║ (ms)      ║             ║");
    println!("╠═══════════════╬════════════╬═══════════╬═══════════╬═══════════╬═════════════╣");

    for report in reports {
        println!(
            "║ {:<13} ║ {:>10.2} ║ {:>8.2}% ║ {:>8.2}% ║ {:>9.2} ║ {:>11} ║",
            report.profile,
            report.total_throughput_bps / 1024.0,
            report.delivery_ratio_percent,
            report.loss_ratio_percent,
            report.mean_delay_ms,
            report.flow_count,
        );
    }

    println!("╚═══════════════╩════════════╩═══════════╩═══════════╩═══════════╩═════════════╝\n");

    if let Some(best_throughput) = reports.iter().max_by(|a, b| {
        a.total_throughput_bps
            .partial_cmp(&b.total_throughput_bps)
            .unwrap()
    }) {
        println!(
            "Top Throughput: {} ({:.2} Kbps)",
            best_throughput.profile,
            best_throughput.total_throughput_bps / 1024.0
        );
    }

    if let Some(best_delivery) = reports.iter().max_by(|a, b| {
        a.delivery_ratio_percent
            .partial_cmp(&b.delivery_ratio_percent)
            .unwrap()
    }) {
        println!(
            "Best Delivery: {} ({:.2}%)",
            best_delivery.profile, best_delivery.delivery_ratio_percent
        );
    }

    if let Some(best_delay) = reports.iter().min_by(|a, b| {
        a.mean_delay_ms.partial_cmp(&b.mean_delay_ms).unwrap()
    }) {
        println!(
            "Lowest Delay: {} ({:.2} ms)",
            best_delay.profile, best_delay.mean_delay_ms
        );
    }

    println!();
}
