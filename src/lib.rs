pub mod experiment;
pub mod kernel;
pub mod metrics;
pub mod schedule;
pub mod topology;

pub use experiment::{Experiment, ExperimentConfig};
pub use kernel::{EventKernel, Kernel};
pub use metrics::analyzer::AggregateReport;
pub use schedule::{LoadProfile, Schedule};

pub mod prelude {
    pub use crate::experiment::{Experiment, ExperimentConfig};
    pub use crate::kernel::{EventKernel, FlowId, Kernel, LinkConfig, LinkModel};
    pub use crate::metrics::analyzer::AggregateReport;
    pub use crate::metrics::{FlowMetrics, FlowRecord};
    pub use crate::schedule::{FlowSpec, LoadLevel, LoadProfile, Population, Schedule};
}
