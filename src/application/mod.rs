pub mod judge;
pub mod metrics;
pub mod prompts;
pub mod service;

pub use metrics::{MetricSettings, MetricSuite};
pub use service::EvaluationService;
