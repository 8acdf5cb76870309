// THEORY:
// The `pipeline` module is the top-level batch API. It walks a class-labeled
// corpus and pushes every image through the full per-file chain:
//
//     Pending -> Decoded -> Transformed -> Composited -> Written
//
// A file can also stop early in a failed state (decode or write). Failure is
// isolated to the file: it is logged with its path, recorded in the
// `BatchSummary` and the walk moves on. Only a missing corpus root stops a run,
// and it does so before anything is created on disk. There is no retry.
//
// This is the serial reference orchestrator. `parallel_pipeline` drives the
// same `process_image` over a worker pool and must produce the same summary.

use crate::config::BatchConfig;
use crate::core_modules::composite::{CompositeLayout, compose};
use crate::core_modules::corpus::{self, ImageJob};
use crate::core_modules::leaf_filters::{FilterSettings, apply_leaf_filters};
use crate::core_modules::utils::image_helper;
use crate::error::{LeafError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Which stage a failed file stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Decode,
    Write,
}

impl From<&LeafError> for FailureKind {
    fn from(error: &LeafError) -> Self {
        match error {
            LeafError::Decode { .. } => FailureKind::Decode,
            _ => FailureKind::Write,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassOutcome {
    Processed { attempted: usize, succeeded: usize },
    /// The class folder held no supported images (or could not be listed).
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSummary {
    pub label: String,
    pub outcome: ClassOutcome,
}

/// Aggregate result of one orchestrator invocation. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub classes: Vec<ClassSummary>,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<FileFailure>,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn class(&self, label: &str) -> Option<&ClassOutcome> {
        self.classes.iter().find(|c| c.label == label).map(|c| &c.outcome)
    }

    pub(crate) fn record_skipped(&mut self, label: &str) {
        self.classes.push(ClassSummary {
            label: label.to_string(),
            outcome: ClassOutcome::Skipped,
        });
    }

    /// Folds one class's per-file results into the summary. `results` is in job order.
    pub(crate) fn record_class(&mut self, label: &str, jobs: &[ImageJob], results: Vec<Result<PathBuf>>) {
        let attempted = jobs.len();
        let mut succeeded = 0;
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok(_) => succeeded += 1,
                Err(error) => self.failures.push(FileFailure {
                    path: job.source_path.clone(),
                    kind: FailureKind::from(&error),
                    message: error.to_string(),
                }),
            }
        }
        self.attempted += attempted;
        self.succeeded += succeeded;
        self.classes.push(ClassSummary {
            label: label.to_string(),
            outcome: ClassOutcome::Processed { attempted, succeeded },
        });
    }

    pub(crate) fn log(&self, output_root: &Path) {
        info!(
            "Done: {} of {} images processed ({} failed). Composites are under '{}'.",
            self.succeeded,
            self.attempted,
            self.failed(),
            output_root.display()
        );
    }
}

/// One class folder and the jobs found in it.
#[derive(Debug, Clone)]
pub(crate) struct ClassPlan {
    pub label: String,
    pub jobs: Vec<ImageJob>,
}

/// Enumerates the corpus and creates the output root. Fails with
/// `CorpusNotFound` before touching the filesystem if the input is missing.
/// Leftover temp files from an interrupted run are swept from existing class
/// output folders.
pub(crate) fn plan_corpus(config: &BatchConfig) -> Result<Vec<ClassPlan>> {
    let classes = corpus::list_corpus(&config.input_root)?;

    if !config.output_root.is_dir() {
        fs::create_dir_all(&config.output_root).map_err(|e| LeafError::io(&config.output_root, e))?;
        info!("Created output folder '{}'", config.output_root.display());
    }

    let mut plans = Vec::with_capacity(classes.len());
    for class in classes {
        sweep_class_output(&config.output_root.join(&class.label));
        let jobs: Vec<ImageJob> = class
            .images
            .into_iter()
            .map(|path| ImageJob::new(path, &class.label, &config.output_root))
            .collect();
        warn_on_shared_outputs(&jobs);
        plans.push(ClassPlan {
            label: class.label,
            jobs,
        });
    }
    Ok(plans)
}

fn sweep_class_output(dir: &Path) {
    if !dir.is_dir() {
        return;
    }
    match image_helper::sweep_partial_files(dir) {
        Ok(0) => {}
        Ok(n) => warn!("Removed {} stale partial file(s) from '{}'", n, dir.display()),
        Err(e) => warn!("Could not sweep '{}': {}", dir.display(), e),
    }
}

/// Sources sharing a stem map to one composite. The one later in job order wins.
fn warn_on_shared_outputs(jobs: &[ImageJob]) {
    let mut first_source: HashMap<&Path, &Path> = HashMap::new();
    for job in jobs {
        if let Some(earlier) = first_source.insert(&job.output_path, &job.source_path) {
            warn!(
                "'{}' and '{}' both map to '{}'; the later file overwrites the earlier one",
                earlier.display(),
                job.source_path.display(),
                job.output_path.display()
            );
        }
    }
}

/// Runs one file through decode, filters, composite and write. Returns the written path.
pub fn process_image(job: &ImageJob, filters: &FilterSettings, layout: &CompositeLayout) -> Result<PathBuf> {
    // Stage 1: Decode
    let decoded = image_helper::decode(&job.source_path)?;

    // Stage 2: Transform
    let outputs = apply_leaf_filters(&decoded, filters);
    drop(decoded);

    // Stage 3: Composite
    let artifact = compose(&outputs, &job.file_name(), &job.class_label, layout);

    // Stage 4: Write
    image_helper::save_png_atomic(&artifact.image, &job.output_path)?;
    Ok(job.output_path.clone())
}

/// A per-class bar on stderr. It stays hidden when stderr is not a terminal.
pub(crate) fn class_progress(plan: &ClassPlan) -> ProgressBar {
    let bar = ProgressBar::new(plan.jobs.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(plan.label.clone());
    bar
}

pub(crate) fn report_progress(job: &ImageJob, result: &Result<PathBuf>, bar: &ProgressBar) {
    bar.inc(1);
    let done = bar.position();
    let total = bar.length().unwrap_or(done);
    match result {
        Ok(_) => info!("[{}] {}/{} {}", job.class_label, done, total, job.file_name()),
        Err(e) => warn!("[{}] {}/{} failed: {}", job.class_label, done, total, e),
    }
}

pub(crate) fn announce_class(plan: &ClassPlan) -> bool {
    if plan.jobs.is_empty() {
        info!("No image files in '{}', skipping.", plan.label);
        false
    } else {
        info!("Class '{}': processing {} images...", plan.label, plan.jobs.len());
        true
    }
}

/// The serial batch orchestrator. One file is finished before the next starts.
pub struct BatchPipeline {
    config: BatchConfig,
}

impl BatchPipeline {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn run(&self) -> Result<BatchSummary> {
        let plans = plan_corpus(&self.config)?;
        let mut summary = BatchSummary::default();

        for plan in plans {
            if !announce_class(&plan) {
                summary.record_skipped(&plan.label);
                continue;
            }

            let bar = class_progress(&plan);
            let results: Vec<Result<PathBuf>> = plan
                .jobs
                .iter()
                .map(|job| {
                    let result = process_image(job, &self.config.filters, &self.config.layout);
                    report_progress(job, &result, &bar);
                    result
                })
                .collect();
            bar.finish_and_clear();

            summary.record_class(&plan.label, &plan.jobs, results);
        }

        summary.log(&self.config.output_root);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str) -> ImageJob {
        ImageJob::new(PathBuf::from(format!("in/A/{name}")), "A", Path::new("out"))
    }

    #[test]
    fn summary_counts_successes_and_classifies_failures() {
        let jobs = vec![job("1.jpg"), job("2.jpg"), job("3.jpg")];
        let results = vec![
            Ok(PathBuf::from("out/A/1_processed.png")),
            Err(LeafError::Decode {
                path: PathBuf::from("in/A/2.jpg"),
                source: image::ImageError::IoError(std::io::ErrorKind::NotFound.into()),
            }),
            Err(LeafError::Write {
                path: PathBuf::from("out/A/3_processed.png"),
                source: image::ImageError::IoError(std::io::ErrorKind::PermissionDenied.into()),
            }),
        ];

        let mut summary = BatchSummary::default();
        summary.record_class("A", &jobs, results);
        summary.record_skipped("B");

        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed(), 2);
        assert_eq!(summary.failures[0].kind, FailureKind::Decode);
        assert_eq!(summary.failures[0].path, PathBuf::from("in/A/2.jpg"));
        assert_eq!(summary.failures[1].kind, FailureKind::Write);
        assert_eq!(
            summary.class("A"),
            Some(&ClassOutcome::Processed { attempted: 3, succeeded: 1 })
        );
        assert_eq!(summary.class("B"), Some(&ClassOutcome::Skipped));
    }

    #[test]
    fn class_progress_counts_each_reported_file() {
        let plan = ClassPlan {
            label: "A".into(),
            jobs: vec![job("1.jpg"), job("2.jpg")],
        };
        let bar = class_progress(&plan);
        assert_eq!(bar.length(), Some(2));

        report_progress(&plan.jobs[0], &Ok(PathBuf::from("out/A/1_processed.png")), &bar);
        assert_eq!(bar.position(), 1);
    }

    #[test]
    fn run_sweeps_partial_files_left_by_an_interrupted_run() {
        let dir = tempfile::tempdir().unwrap();
        let class_dir = dir.path().join("leaves/A");
        fs::create_dir_all(&class_dir).unwrap();
        image::RgbImage::from_pixel(12, 10, image::Rgb([40, 150, 60]))
            .save(class_dir.join("leaf.png"))
            .unwrap();
        let out_class = dir.path().join("processed_images/A");
        fs::create_dir_all(&out_class).unwrap();
        let stale = out_class.join(".leaf_processed.png.k3j9x.part");
        fs::write(&stale, b"half a png").unwrap();

        let mut config = BatchConfig::new(dir.path().join("leaves"), dir.path().join("processed_images"));
        config.layout.panel_width = 32;
        config.layout.panel_height = 24;
        config.layout.text_scale = 1;
        let summary = BatchPipeline::new(config).run().unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(!stale.exists());
        assert!(out_class.join("leaf_processed.png").is_file());
    }

    #[test]
    fn missing_corpus_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig::new(dir.path().join("leaves"), dir.path().join("processed_images"));

        let result = BatchPipeline::new(config.clone()).run();

        assert!(matches!(result, Err(LeafError::CorpusNotFound(_))));
        assert!(!config.output_root.exists());
    }
}
