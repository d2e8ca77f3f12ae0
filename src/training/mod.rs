pub mod backend;
pub mod plan;
pub mod pipeline;

pub use backend::{
    CallbackSpec, EpochRecord, EvalMetrics, ExportSpec, ModelSpec, StageKind, StageSpec,
    TrainingBackend, TrainingHistory,
};
pub use plan::{DatasetSummary, TrainingPlan};
pub use pipeline::{PackageOutcome, PreparedData, TrainingOutcome, TrainingPipeline};
