//! The askgate request pipeline.
//!
//! [`RequestPipeline`] sequences validation, persistence, screening,
//! context assembly, authentication, and the completion call for each
//! question. [`bootstrap`] wires it from configuration.

pub mod assembler;
pub mod bootstrap;
pub mod pipeline;

#[cfg(test)]
mod test_helpers;

pub use assembler::{AssemblerConfig, ContextAssembler, truncate_question};
pub use bootstrap::{build_pipeline, build_pipeline_with_store, open_store};
pub use pipeline::{AskRequest, DependencyHealth, PipelineOutcome, RequestPipeline, Stage};
