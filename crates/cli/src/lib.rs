//! `waybill-cli` library: pipeline configuration and the file-level steps
//! that read spreadsheets, run the reconciliation transforms, and write results.

pub mod pipeline;
pub mod steps;

pub use pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineReport, StepReport};
pub use steps::{align_files, AlignReport, AlignStatus, PipelineStep, StepConfig, StepContext, StepError, StepOutcome};
