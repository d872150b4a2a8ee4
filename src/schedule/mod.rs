// The whole point of the tool: turn a load profile + node population into a
// static, time-ordered set of flows BEFORE the simulated clock starts.
// Generation is pure, the kernel never feeds back into it.

use crate::kernel::node_address;
use serde::{Deserialize, Serialize};
use std::net::SocketAddrV4;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_PACKET_SIZE: u32 = 1024;

// Per-flow budget inside a ramp level. Kept constant on purpose: offered load
// grows with concurrency, not with per-flow rate.
pub const RAMP_PACKET_BUDGET: u64 = 3;
pub const RAMP_INTERVAL: Duration = Duration::from_millis(10);

// Receivers come up at t=1s, traffic starts at t=2s
const TRAFFIC_START: Duration = Duration::from_secs(2);
const LEVEL_GAP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadProfile {
    Low,
    Medium,
    High,
    Custom { interval: Duration },
    Ramp,
}

impl Default for LoadProfile {
    fn default() -> Self {
        Self::Low
    }
}

impl LoadProfile {
    // Unrecognized names fall back to the default profile. That is deliberate:
    // a typo'd profile must not kill a batch of experiment runs.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "ramp" => Self::Ramp,
            other => {
                warn!(
                    "unknown load profile '{}', using default '{}'",
                    other,
                    Self::default().name()
                );
                Self::default()
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Custom { .. } => "custom",
            Self::Ramp => "ramp",
        }
    }

    // Inter-packet gap per profile: low ~8 kbps, medium ~0.8 Mbps, high saturates
    pub fn interval(&self) -> Duration {
        match self {
            Self::Low => Duration::from_secs(1),
            Self::Medium => Duration::from_millis(10),
            Self::High => Duration::from_micros(200),
            Self::Custom { interval } => *interval,
            Self::Ramp => RAMP_INTERVAL,
        }
    }

    pub fn known_names() -> &'static [&'static str] {
        &["low", "medium", "high", "ramp"]
    }
}

// Node population split into two role pools. Receivers occupy the low indices,
// senders sit above the boundary, same layout the topology files use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Population {
    pub receivers: usize,
    pub senders: usize,
}

impl Population {
    pub fn new(receivers: usize, senders: usize) -> Self {
        Self { receivers, senders }
    }

    pub fn total(&self) -> usize {
        self.receivers + self.senders
    }

    pub fn receiver(&self, slot: usize) -> usize {
        slot
    }

    pub fn sender(&self, slot: usize) -> usize {
        self.receivers + slot
    }
}

// One scheduled unit of traffic. Immutable once handed to the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSpec {
    pub source: usize,
    pub destination_node: usize,
    pub destination: SocketAddrV4,
    pub packet_size: u32,
    pub interval: Duration,
    // 0 = unlimited within the window
    pub max_packets: u64,
    pub start: Duration,
    pub stop: Duration,
}

// One step of the progression. Owns its flows; windows of adjacent levels
// never overlap because the cursors only move forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadLevel {
    pub index: usize,
    pub name: String,
    pub start: Duration,
    pub stop: Duration,
    pub flows: Vec<FlowSpec>,
}

impl LoadLevel {
    pub fn concurrency(&self) -> usize {
        self.flows.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleParams {
    pub port: u16,
    pub packet_size: u32,
    // fixed-rate observation window length
    pub window: Duration,
    // ramp level duration D
    pub level_duration: Duration,
    // optional cap on ramp concurrency
    pub max_levels: Option<usize>,
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            packet_size: DEFAULT_PACKET_SIZE,
            window: Duration::from_secs(9),
            level_duration: Duration::from_secs(10),
            max_levels: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub profile: LoadProfile,
    pub levels: Vec<LoadLevel>,
}

impl Schedule {
    pub fn generate(profile: LoadProfile, population: &Population, params: &ScheduleParams) -> Self {
        match profile {
            LoadProfile::Ramp => Self::generate_ramp(population, params),
            _ => Self::generate_fixed(profile, population, params),
        }
    }

    // One flow per sender, all sharing a single window.
    fn generate_fixed(
        profile: LoadProfile,
        population: &Population,
        params: &ScheduleParams,
    ) -> Self {
        let mut levels = Vec::new();

        if population.senders == 0 || population.receivers == 0 {
            warn!(
                "fixed-rate schedule degenerates to empty ({} senders, {} receivers)",
                population.senders, population.receivers
            );
            return Self { profile, levels };
        }

        let window = non_zero_window(params.window, "window");
        let start = TRAFFIC_START;
        let stop = start + window;
        let interval = profile.interval();

        let flows = (0..population.senders)
            .map(|slot| {
                let destination_node = population.receiver(slot % population.receivers);
                FlowSpec {
                    source: population.sender(slot),
                    destination_node,
                    destination: SocketAddrV4::new(node_address(destination_node), params.port),
                    packet_size: params.packet_size,
                    interval,
                    max_packets: 0,
                    start,
                    stop,
                }
            })
            .collect::<Vec<_>>();

        levels.push(LoadLevel {
            index: 1,
            name: format!("{} steady flows", flows.len()),
            start,
            stop,
            flows,
        });

        Self { profile, levels }
    }

    // Increasing concurrency: level k activates exactly k flows, sender slot i
    // paired with receiver slot i. Back-to-back windows with a one-second gap.
    fn generate_ramp(population: &Population, params: &ScheduleParams) -> Self {
        let mut levels = Vec::new();

        let mut steps = (population.senders / 2).min(population.receivers);
        if let Some(cap) = params.max_levels {
            steps = steps.min(cap);
        }

        if steps == 0 {
            warn!(
                "ramp schedule degenerates to empty ({} senders, {} receivers)",
                population.senders, population.receivers
            );
            return Self {
                profile: LoadProfile::Ramp,
                levels,
            };
        }

        let level_duration = non_zero_window(params.level_duration, "level duration");
        let mut start = TRAFFIC_START;

        for k in 1..=steps {
            let stop = start + level_duration;

            let flows = (0..k)
                .map(|i| {
                    let destination_node = population.receiver(i);
                    FlowSpec {
                        source: population.sender(i),
                        destination_node,
                        destination: SocketAddrV4::new(node_address(destination_node), params.port),
                        packet_size: params.packet_size,
                        interval: RAMP_INTERVAL,
                        max_packets: RAMP_PACKET_BUDGET,
                        start,
                        stop,
                    }
                })
                .collect::<Vec<_>>();

            levels.push(LoadLevel {
                index: k,
                name: if k == 1 {
                    "1 concurrent flow".to_string()
                } else {
                    format!("{} concurrent flows", k)
                },
                start,
                stop,
                flows,
            });

            start = stop + LEVEL_GAP;
        }

        Self {
            profile: LoadProfile::Ramp,
            levels,
        }
    }

    pub fn flows(&self) -> impl Iterator<Item = &FlowSpec> {
        self.levels.iter().flat_map(|level| level.flows.iter())
    }

    pub fn flow_count(&self) -> usize {
        self.levels.iter().map(|level| level.flows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.flow_count() == 0
    }

    // When the last window closes. Empty schedules still report the traffic
    // start so callers get a valid run-until bound.
    pub fn stop_time(&self) -> Duration {
        self.levels
            .iter()
            .map(|level| level.stop)
            .max()
            .unwrap_or(TRAFFIC_START)
    }
}

fn non_zero_window(window: Duration, what: &str) -> Duration {
    if window.is_zero() {
        let fallback = ScheduleParams::default().window;
        warn!("{} of zero is invalid, using {:?}", what, fallback);
        fallback
    } else {
        window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params() -> ScheduleParams {
        ScheduleParams::default()
    }

    #[test]
    fn every_flow_window_is_positive() {
        for profile in [
            LoadProfile::Low,
            LoadProfile::Medium,
            LoadProfile::High,
            LoadProfile::Ramp,
            LoadProfile::Custom {
                interval: Duration::from_micros(500),
            },
        ] {
            let schedule = Schedule::generate(profile, &Population::new(14, 14), &params());
            assert!(!schedule.is_empty());
            for flow in schedule.flows() {
                assert!(flow.stop > flow.start, "profile {}", profile.name());
            }
        }
    }

    #[test]
    fn fixed_mode_emits_one_flow_per_sender() {
        let schedule = Schedule::generate(LoadProfile::Medium, &Population::new(4, 10), &params());
        assert_eq!(schedule.levels.len(), 1);
        assert_eq!(schedule.flow_count(), 10);

        let sources: Vec<usize> = schedule.flows().map(|f| f.source).collect();
        let mut deduped = sources.clone();
        deduped.dedup();
        assert_eq!(sources, deduped, "each sender appears exactly once");
        // receivers wrap around when outnumbered
        assert_eq!(schedule.levels[0].flows[4].destination_node, 0);
    }

    #[test]
    fn ramp_levels_grow_by_one_flow() {
        let schedule = Schedule::generate(LoadProfile::Ramp, &Population::new(14, 14), &params());
        assert_eq!(schedule.levels.len(), 7);
        for (i, level) in schedule.levels.iter().enumerate() {
            assert_eq!(level.index, i + 1);
            assert_eq!(level.concurrency(), i + 1);
        }
    }

    #[test]
    fn ramp_levels_never_overlap() {
        let schedule = Schedule::generate(LoadProfile::Ramp, &Population::new(14, 14), &params());
        for pair in schedule.levels.windows(2) {
            assert!(pair[0].stop <= pair[1].start);
        }
        // exactly a one-second separator between windows
        assert_eq!(
            schedule.levels[1].start,
            schedule.levels[0].stop + Duration::from_secs(1)
        );
    }

    #[test]
    fn ramp_respects_level_cap() {
        let capped = ScheduleParams {
            max_levels: Some(3),
            ..params()
        };
        let schedule = Schedule::generate(LoadProfile::Ramp, &Population::new(14, 14), &capped);
        assert_eq!(schedule.levels.len(), 3);
    }

    #[test]
    fn ramp_senders_are_distinct_and_budget_constant() {
        let schedule = Schedule::generate(LoadProfile::Ramp, &Population::new(14, 14), &params());
        let last = schedule.levels.last().unwrap();
        let mut sources: Vec<usize> = last.flows.iter().map(|f| f.source).collect();
        sources.sort_unstable();
        sources.dedup();
        assert_eq!(sources.len(), last.concurrency());
        for flow in schedule.flows() {
            assert_eq!(flow.max_packets, RAMP_PACKET_BUDGET);
        }
    }

    #[test]
    fn degenerate_populations_do_not_fail() {
        for senders in [0, 1] {
            let schedule =
                Schedule::generate(LoadProfile::Ramp, &Population::new(14, senders), &params());
            assert!(schedule.is_empty());
        }
        let schedule = Schedule::generate(LoadProfile::Low, &Population::new(0, 14), &params());
        assert!(schedule.is_empty());
    }

    #[test]
    fn unknown_profile_falls_back_to_default() {
        assert_eq!(LoadProfile::parse("warp-speed"), LoadProfile::Low);
        assert_eq!(LoadProfile::parse("HIGH"), LoadProfile::High);
    }

    #[test]
    fn zero_window_is_replaced() {
        let broken = ScheduleParams {
            window: Duration::ZERO,
            ..params()
        };
        let schedule = Schedule::generate(LoadProfile::Low, &Population::new(2, 2), &broken);
        for flow in schedule.flows() {
            assert!(flow.stop > flow.start);
        }
    }

    proptest! {
        #[test]
        fn generation_is_deterministic(senders in 0usize..40, receivers in 0usize..40, ramp in any::<bool>()) {
            let profile = if ramp { LoadProfile::Ramp } else { LoadProfile::Medium };
            let population = Population::new(receivers, senders);
            let a = Schedule::generate(profile, &population, &params());
            let b = Schedule::generate(profile, &population, &params());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn ramp_step_count_matches_population(senders in 0usize..40, receivers in 0usize..40) {
            let population = Population::new(receivers, senders);
            let schedule = Schedule::generate(LoadProfile::Ramp, &population, &params());
            prop_assert_eq!(schedule.levels.len(), (senders / 2).min(receivers));
            for (i, level) in schedule.levels.iter().enumerate() {
                prop_assert_eq!(level.concurrency(), i + 1);
            }
            for pair in schedule.levels.windows(2) {
                prop_assert!(pair[0].stop <= pair[1].start);
            }
        }
    }
}
