//! Item processing pipeline.
//!
//! - `transform`: field normalization
//! - `validate`: acceptance checks on raw items
//! - `queue`: producer/worker hand-off with drain tracking
//! - `workers`: the worker pool
//! - `run`: wiring for a complete scrape run

pub mod queue;
pub mod run;
pub mod transform;
pub mod validate;
pub mod workers;

pub use queue::{DoneGuard, QueueClosed, WorkQueue};
pub use run::{RunSummary, run_pipeline};
pub use transform::{
    TransformSettings, add_source, clean_text, normalize, transform_date, transform_job_link,
    transform_title,
};
pub use validate::ItemValidator;
pub use workers::{ItemOutcome, ItemProcessor, PipelineStats, RetryPolicy, StatsSnapshot, WorkerPool};
