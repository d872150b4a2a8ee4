use crate::kernel::LinkConfig;
use crate::schedule::{LoadProfile, Population, ScheduleParams};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    pub profile: LoadProfile,
    pub population: Population,
    pub params: ScheduleParams,
    pub link: LinkConfig,
    pub topology: Option<PathBuf>,
    pub grid_spacing: f64,
    pub seed: u64,
    // extra simulated time after the last window closes, lets in-flight
    // packets land
    pub drain: Duration,
    pub output_dir: Option<PathBuf>,
    pub progress: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: "default_run".to_string(),
            profile: LoadProfile::default(),
            population: Population::new(14, 14),
            params: ScheduleParams::default(),
            link: LinkConfig::default(),
            topology: None,
            grid_spacing: 5.0,
            seed: 12345,
            drain: Duration::from_secs(2),
            output_dir: Some(PathBuf::from("results")),
            progress: true,
        }
    }
}

impl ExperimentConfig {
    pub fn with_profile(mut self, profile: LoadProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_population(mut self, receivers: usize, senders: usize) -> Self {
        self.population = Population::new(receivers, senders);
        self
    }
}
