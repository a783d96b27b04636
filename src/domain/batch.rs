//! Batch runner for independent backtests.
//!
//! Each job owns its bars, strategy and config, so jobs can run on the rayon
//! pool without sharing state. Results come back in input order and a failed
//! job never aborts the rest.

use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

use crate::domain::backtest::{BacktestConfig, BacktestResult, run_backtest};
use crate::domain::error::FlowError;
use crate::domain::ohlcv::PriceBar;
use crate::domain::strategy::Strategy;

#[derive(Debug, Clone)]
pub struct BatchJob {
    /// Caller-chosen name, e.g. `symbol/strategy`.
    pub label: String,
    pub bars: Vec<PriceBar>,
    pub strategy: Strategy,
    pub config: BacktestConfig,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub label: String,
    pub result: Result<BacktestResult, FlowError>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

fn run_job(job: &BatchJob) -> BatchOutcome {
    let result = run_backtest(&job.bars, &job.strategy, &job.config);
    if let Err(e) = &result {
        warn!(label = %job.label, error = %e, "batch job failed");
    }
    BatchOutcome {
        label: job.label.clone(),
        result,
    }
}

pub fn run_batch(jobs: &[BatchJob], parallel: bool) -> Vec<BatchOutcome> {
    run_batch_with_progress(jobs, parallel, |_, _| {})
}

/// Like [`run_batch`], calling `progress(processed, total)` after each job.
/// In parallel mode calls arrive from worker threads, in completion order.
pub fn run_batch_with_progress<F>(
    jobs: &[BatchJob],
    parallel: bool,
    progress: F,
) -> Vec<BatchOutcome>
where
    F: Fn(usize, usize) + Sync,
{
    let total = jobs.len();
    let done = AtomicUsize::new(0);
    info!(jobs = total, parallel, "batch started");

    let step = |job: &BatchJob| {
        let outcome = run_job(job);
        let processed = done.fetch_add(1, Ordering::SeqCst) + 1;
        progress(processed, total);
        outcome
    };

    let outcomes: Vec<BatchOutcome> = if parallel {
        jobs.par_iter().map(step).collect()
    } else {
        jobs.iter().map(step).collect()
    };

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!(jobs = total, failed, "batch finished");
    outcomes
}
