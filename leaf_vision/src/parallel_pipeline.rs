// THEORY:
// Files in a corpus share no state, so they can be processed concurrently.
// A single dispatcher task hands `ImageTask`s round-robin to a fixed set of
// worker tasks. Each worker runs the CPU-bound `process_image` on the blocking
// thread pool and answers on the task's oneshot channel.
//
// Guarantees kept from the serial orchestrator:
// - Output paths are fixed by `corpus::output_path_for` before dispatch, so
//   which worker handles a file never changes where it lands.
// - Jobs that share an output path (same stem, different extension) run one
//   after another in job order, so the same file wins as in a serial run.
// - Results are collected in job order, so the `BatchSummary` (counts, class
//   outcomes, failure list) equals the serial one.

use crate::config::BatchConfig;
use crate::core_modules::composite::CompositeLayout;
use crate::core_modules::corpus::ImageJob;
use crate::core_modules::leaf_filters::FilterSettings;
use crate::error::{LeafError, Result};
use crate::pipeline::{
    self, BatchSummary, announce_class, class_progress, plan_corpus, report_progress,
};
use futures::future::join_all;
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};

pub struct ImageTask {
    pub job: ImageJob,
    pub result_sender: oneshot::Sender<Result<PathBuf>>,
}

struct WorkerSettings {
    filters: FilterSettings,
    layout: CompositeLayout,
}

#[derive(Default)]
struct Progress {
    succeeded: AtomicUsize,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<ImageTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
    progress: Arc<Progress>,
}

impl WorkerPool {
    /// Spawns the dispatcher and `worker_count` workers on the current tokio runtime.
    pub fn new(worker_count: usize, filters: FilterSettings, layout: CompositeLayout) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<ImageTask>();
        let settings = Arc::new(WorkerSettings { filters, layout });
        let progress = Arc::new(Progress::default());

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<ImageTask>())
            .unzip();

        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let mut workers = Vec::with_capacity(worker_count);
        for (id, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let settings = Arc::clone(&settings);
            let progress = Arc::clone(&progress);

            workers.push(tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let ImageTask { job, result_sender } = task;
                    debug!("worker {} picked up {}", id, job.source_path.display());

                    let result = Self::process_blocking(&settings, &job).await;
                    if result.is_ok() {
                        progress.succeeded.fetch_add(1, Ordering::SeqCst);
                    }

                    let _ = result_sender.send(result);
                }
            }));
        }

        Self {
            task_sender,
            workers,
            progress,
        }
    }

    async fn process_blocking(settings: &Arc<WorkerSettings>, job: &ImageJob) -> Result<PathBuf> {
        let settings = Arc::clone(settings);
        let owned = job.clone();
        tokio::task::spawn_blocking(move || {
            pipeline::process_image(&owned, &settings.filters, &settings.layout)
        })
        .await
        .unwrap_or_else(|e| {
            Err(LeafError::Worker {
                path: job.source_path.clone(),
                message: e.to_string(),
            })
        })
    }

    /// Queues one job and waits for its result.
    pub async fn process(&self, job: ImageJob) -> Result<PathBuf> {
        let path = job.source_path.clone();
        let (result_sender, result_receiver) = oneshot::channel();

        self.task_sender
            .send(ImageTask { job, result_sender })
            .map_err(|_| LeafError::Worker {
                path: path.clone(),
                message: "failed to send task to worker pool".into(),
            })?;

        result_receiver.await.map_err(|_| LeafError::Worker {
            path,
            message: "failed to receive result from worker".into(),
        })?
    }

    /// Files written successfully so far, across all workers.
    pub fn succeeded(&self) -> usize {
        self.progress.succeeded.load(Ordering::SeqCst)
    }

    /// Closes the queue and waits for every worker to drain.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Concurrent counterpart of `pipeline::BatchPipeline`.
pub struct ParallelPipeline {
    config: BatchConfig,
}

impl ParallelPipeline {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<BatchSummary> {
        let plans = plan_corpus(&self.config)?;
        let pool = WorkerPool::new(
            self.config.worker_count(),
            self.config.filters.clone(),
            self.config.layout.clone(),
        );

        let mut summary = BatchSummary::default();
        for plan in &plans {
            if !announce_class(plan) {
                summary.record_skipped(&plan.label);
                continue;
            }

            let bar = class_progress(plan);
            let pool_ref = &pool;
            let bar_ref = &bar;
            let lanes = join_all(output_lanes(&plan.jobs).into_iter().map(|lane| async move {
                let mut finished = Vec::with_capacity(lane.len());
                for i in lane {
                    let job = &plan.jobs[i];
                    let result = pool_ref.process(job.clone()).await;
                    report_progress(job, &result, bar_ref);
                    finished.push((i, result));
                }
                finished
            }))
            .await;
            bar.finish_and_clear();

            let mut ordered: Vec<(usize, Result<PathBuf>)> = lanes.into_iter().flatten().collect();
            ordered.sort_by_key(|(i, _)| *i);
            let results = ordered.into_iter().map(|(_, result)| result).collect();
            summary.record_class(&plan.label, &plan.jobs, results);
        }

        debug_assert_eq!(pool.succeeded(), summary.succeeded);
        pool.shutdown().await;

        summary.log(&self.config.output_root);
        Ok(summary)
    }
}

/// Splits job indices into lanes: one lane per output path, in job order.
fn output_lanes(jobs: &[ImageJob]) -> Vec<Vec<usize>> {
    let mut lane_of: HashMap<&Path, usize> = HashMap::new();
    let mut lanes: Vec<Vec<usize>> = Vec::new();
    for (i, job) in jobs.iter().enumerate() {
        let lane = *lane_of.entry(job.output_path.as_path()).or_insert_with(|| {
            lanes.push(Vec::new());
            lanes.len() - 1
        });
        lanes[lane].push(i);
    }
    lanes
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;

    fn tiny_layout() -> CompositeLayout {
        CompositeLayout {
            panel_width: 32,
            panel_height: 24,
            margin: 2,
            caption_height: 9,
            title_height: 10,
            text_scale: 1,
        }
    }

    #[test]
    fn same_stem_jobs_share_a_lane_in_job_order() {
        let out = Path::new("out");
        let jobs: Vec<ImageJob> = ["s0.bmp", "s0.png", "s1.png", "s2.jpg", "s2.tiff"]
            .iter()
            .map(|name| ImageJob::new(PathBuf::from("in/A").join(name), "A", out))
            .collect();

        assert_eq!(output_lanes(&jobs), vec![vec![0, 1], vec![2], vec![3, 4]]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pool_processes_jobs_and_counts_successes() {
        let dir = tempfile::tempdir().unwrap();
        let class_dir = dir.path().join("in/A");
        fs::create_dir_all(&class_dir).unwrap();
        RgbImage::from_pixel(16, 12, Rgb([30, 150, 40]))
            .save(class_dir.join("good.png"))
            .unwrap();
        fs::write(class_dir.join("bad.jpg"), b"garbage").unwrap();

        let out = dir.path().join("out");
        let pool = WorkerPool::new(3, FilterSettings::default(), tiny_layout());
        let good = pool
            .process(ImageJob::new(class_dir.join("good.png"), "A", &out))
            .await;
        let bad = pool
            .process(ImageJob::new(class_dir.join("bad.jpg"), "A", &out))
            .await;

        assert_eq!(good.unwrap(), out.join("A/good_processed.png"));
        assert!(matches!(bad, Err(LeafError::Decode { .. })));
        assert_eq!(pool.succeeded(), 1);
        assert!(Path::new(&out.join("A/good_processed.png")).is_file());
        pool.shutdown().await;
    }
}
