// THEORY:
// This file is the main entry point for the `leaf_vision` library crate. It
// exposes the batch orchestrators (`BatchPipeline`, `ParallelPipeline`) and
// their data structures (`BatchConfig`, `BatchSummary`, etc.) as the
// high-level interface. The filter stages live in `core_modules` and are
// public too, so a single image can be pushed through `apply_leaf_filters` and
// `compose` without running a whole corpus.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::BatchConfig;
pub use core_modules::composite::{CompositeArtifact, CompositeLayout, PanelRole, compose};
pub use core_modules::corpus::{ImageJob, output_path_for};
pub use core_modules::leaf_filters::{FilterOutputs, FilterSettings, apply_leaf_filters};
pub use error::{LeafError, Result};
pub use parallel_pipeline::ParallelPipeline;
pub use pipeline::{BatchPipeline, BatchSummary, ClassOutcome, FailureKind, process_image};
