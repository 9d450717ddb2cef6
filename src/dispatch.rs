//! Admission-controlled concurrent dispatcher.
//!
//! A fixed pool of workers drains a queue of [`WorkItem`]s. Each worker
//! blocks on the shared [`RateLimiter`] before calling the inference client,
//! salvages the response through the normalizer, merges usage and provenance
//! metadata, and writes exactly one artifact. Per-item failures are logged
//! and skipped; nothing is written for them, so they stay eligible for the
//! next run. Only configuration problems can stop a batch.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info};

use crate::artifact::{FileMetadata, UsageMetadata, write_artifact};
use crate::client::{CaptionClient, CaptionRequest};
use crate::error::ItemError;
use crate::normalize::normalize;
use crate::pricing::PricingTable;
use crate::rate::RateLimiter;
use crate::selector::WorkItem;

// ---------------------------------------------------------------------------
// Job description
// ---------------------------------------------------------------------------

/// Per-batch request parameters shared by all workers.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Full prompt text (system instruction with schema plus user prompt).
    pub prompt: String,
    pub model: String,
    pub frame_sampling_fps: f64,
}

/// Outcome counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Owns the worker pool and the shared admission controller.
pub struct Dispatcher {
    client: Arc<dyn CaptionClient>,
    limiter: Arc<RateLimiter>,
    job: JobSpec,
    concurrency: usize,
    pacing: Duration,
    pricing: PricingTable,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn CaptionClient>,
        limiter: Arc<RateLimiter>,
        job: JobSpec,
        concurrency: usize,
        pacing: Duration,
    ) -> Self {
        Self {
            client,
            limiter,
            job,
            concurrency,
            pacing,
            pricing: PricingTable::new(),
        }
    }

    /// Process every item exactly once and return the outcome counts.
    ///
    /// Spawns up to `concurrency` workers over a shared queue. Completion
    /// order is unordered; for any single item, admission strictly precedes
    /// the client call, which precedes normalization and the write.
    pub async fn run(&self, items: Vec<WorkItem>) -> BatchReport {
        let attempted = items.len();
        if attempted == 0 {
            return BatchReport::default();
        }

        let (tx, rx) = mpsc::channel(attempted);
        for item in items {
            // Capacity equals the batch size, so sends never block here.
            if tx.send(item).await.is_err() {
                break;
            }
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let workers = self.concurrency.min(attempted).max(1);

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let ctx = WorkerContext {
                client: Arc::clone(&self.client),
                limiter: Arc::clone(&self.limiter),
                job: self.job.clone(),
                pricing: self.pricing.clone(),
                pacing: self.pacing,
            };
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(worker_loop(worker_id, ctx, queue)));
        }

        let mut succeeded = 0;
        let mut failed = 0;
        for outcome in join_all(handles).await {
            match outcome {
                Ok((ok, bad)) => {
                    succeeded += ok;
                    failed += bad;
                }
                Err(e) => {
                    // A panicked worker loses whatever item it held; the item
                    // has no artifact and will be selected again next run.
                    error!(error = %e, "Worker task failed");
                }
            }
        }

        let report = BatchReport {
            attempted,
            succeeded,
            failed,
        };
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Batch complete"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

struct WorkerContext {
    client: Arc<dyn CaptionClient>,
    limiter: Arc<RateLimiter>,
    job: JobSpec,
    pricing: PricingTable,
    pacing: Duration,
}

/// Pull items until the queue closes. Returns (succeeded, failed).
async fn worker_loop(
    worker_id: usize,
    ctx: WorkerContext,
    queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
) -> (usize, usize) {
    let mut succeeded = 0;
    let mut failed = 0;

    loop {
        // Hold the queue lock only for the pull, never while processing.
        let item = { queue.lock().await.recv().await };
        let Some(item) = item else { break };

        let stem = item.stem();
        match process_item(&ctx, &item).await {
            Ok(()) => {
                info!(worker = worker_id, item = %stem, "Caption written");
                succeeded += 1;
            }
            Err(e) => {
                error!(worker = worker_id, item = %stem, error = %e, "Captioning failed");
                failed += 1;
            }
        }

        // Pace between items regardless of outcome, on top of what the
        // admission window already enforces.
        if !ctx.pacing.is_zero() {
            tokio::time::sleep(ctx.pacing).await;
        }
    }

    (succeeded, failed)
}

/// The per-item pipeline: admit, call, normalize, merge, write.
async fn process_item(ctx: &WorkerContext, item: &WorkItem) -> Result<(), ItemError> {
    let file_meta = FileMetadata::for_video(
        &item.video_path,
        &ctx.job.model,
        ctx.job.frame_sampling_fps,
    )?;

    ctx.limiter.admit().await;

    let request = CaptionRequest {
        video_path: item.video_path.clone(),
        prompt: ctx.job.prompt.clone(),
        model: ctx.job.model.clone(),
        fps: ctx.job.frame_sampling_fps,
    };
    let response = ctx.client.describe(&request).await?;

    let caption = normalize(&response.text);

    let usage = response.usage;
    let cost = ctx
        .pricing
        .estimate(&ctx.job.model, usage.input_tokens, usage.output_tokens);
    let usage_meta = UsageMetadata {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
        estimated_cost_usd: cost.total_cost_usd,
    };

    write_artifact(&item.artifact_path, caption, &usage_meta, &file_meta)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
