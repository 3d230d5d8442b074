use std::{ops::RangeInclusive, sync::Arc};

use serde::Serialize;
use tokio::task::JoinSet;

use super::{
    error::*,
    executor::TestExecutor,
    result::{TestCaseResult, Verdict},
    stats::{AggregateRow, ResultAggregator},
    testcase::{Program, SeedPolicy, SeedSource},
};

/// A run of consecutive test indices executed concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    /// 1-based.
    pub number: u32,
    pub first: u32,
    pub last: u32,
}

impl Batch {
    pub fn indices(&self) -> RangeInclusive<u32> {
        self.first..=self.last
    }

    pub fn len(&self) -> usize {
        (self.last - self.first + 1) as usize
    }
}

/// Splits tests `1..=test_count` into batches of at most `worker_count` tests, lazily.
pub fn plan_batches(test_count: u32, worker_count: u32) -> impl Iterator<Item = Batch> {
    let worker_count = worker_count.max(1);
    (0..test_count)
        .step_by(worker_count as usize)
        .zip(1..)
        .map(move |(offset, number)| Batch {
            number,
            first: offset + 1,
            last: offset.saturating_add(worker_count).min(test_count),
        })
}

/// Candidates still under test. Only the scheduler loop mutates it, between batches.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    live: Vec<Program>,
}

impl CandidateSet {
    pub fn new(candidates: Vec<Program>) -> Self {
        Self { live: candidates }
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.live.iter().any(|p| p.name == name)
    }

    /// Returns `false` when `name` was already removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.live.len();
        self.live.retain(|p| p.name != name);
        self.live.len() != before
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.live.iter().map(|p| p.name.as_str())
    }

    fn snapshot(&self) -> Arc<[Program]> {
        self.live.clone().into()
    }
}

/// First failure of a candidate; it is excluded from every later batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFailure {
    pub candidate: String,
    pub verdict: Verdict,
    pub test_index: u32,
    pub seed: u32,
    pub comment: String,
}

/// Hooks for progress reporting. Called from the scheduler loop, in batch order.
pub trait StressObserver {
    fn on_batch_start(&mut self, _batch: &Batch, _live_candidates: usize) {}

    fn on_test_finished(&mut self, _result: &TestCaseResult) {}

    fn on_candidate_failed(&mut self, _failure: &CandidateFailure, _result: &TestCaseResult) {}

    fn on_early_stop(&mut self, _next_test: u32) {}
}

impl StressObserver for () {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StressSummary {
    pub tests_requested: u32,
    pub tests_run: u32,
    pub stopped_early: bool,
    pub rows: Vec<AggregateRow>,
    pub failures: Vec<CandidateFailure>,
}

impl StressSummary {
    pub fn all_accepted(&self) -> bool {
        self.failures.is_empty()
    }
}

/// State owned by one harness run.
#[derive(Debug)]
pub struct StressSession {
    executor: Arc<TestExecutor>,
    candidates: CandidateSet,
    seeds: SeedSource,
    stats: ResultAggregator,
    failures: Vec<CandidateFailure>,
    tests_run: u32,
}

impl StressSession {
    pub fn new(executor: TestExecutor, candidates: Vec<Program>, seed_policy: SeedPolicy) -> Self {
        let stats = ResultAggregator::new(candidates.iter().map(|p| p.name.as_str()), None);
        Self {
            executor: Arc::new(executor),
            candidates: CandidateSet::new(candidates),
            seeds: SeedSource::new(seed_policy),
            stats,
            failures: Vec::new(),
            tests_run: 0,
        }
    }

    /// Adds the reference program's own timings to the statistics table.
    pub fn include_reference_in_stats(mut self, include: bool) -> Self {
        let reference = include.then(|| self.executor.reference().name.clone());
        self.stats = ResultAggregator::new(self.candidates.names(), reference);
        self
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub fn failures(&self) -> &[CandidateFailure] {
        &self.failures
    }

    /// Runs tests `1..=test_count` in batches of `worker_count` concurrent tests.
    ///
    /// A candidate's first non-accepted verdict removes it from every later batch. The run
    /// stops before a batch once every candidate has failed. Any [`HarnessError`] aborts the
    /// tests still in flight and ends the run.
    pub async fn run_all<O>(
        &mut self,
        test_count: u32,
        worker_count: u32,
        observer: &mut O,
    ) -> Result<StressSummary>
    where
        O: StressObserver + ?Sized,
    {
        let had_candidates = !self.candidates.is_empty();
        let mut stopped_early = false;

        for batch in plan_batches(test_count, worker_count) {
            if had_candidates && self.candidates.is_empty() {
                log::info!(
                    "All candidates have failed, skipping tests {}..={}",
                    batch.first,
                    test_count
                );
                observer.on_early_stop(batch.first);
                stopped_early = true;
                break;
            }

            log::debug!(
                "Batch {} (tests {}..={}) with {} candidate(s)",
                batch.number,
                batch.first,
                batch.last,
                self.candidates.len()
            );
            observer.on_batch_start(&batch, self.candidates.len());

            let mut results = self.run_batch(&batch).await?;
            results.sort_by_key(|r| r.index);
            for result in results {
                self.fold(result, observer);
            }
        }

        Ok(StressSummary {
            tests_requested: test_count,
            tests_run: self.tests_run,
            stopped_early,
            rows: self.stats.rows(),
            failures: self.failures.clone(),
        })
    }

    async fn run_batch(&mut self, batch: &Batch) -> Result<Vec<TestCaseResult>> {
        let candidates = self.candidates.snapshot();
        let mut tasks = JoinSet::new();

        for index in batch.indices() {
            let seed = self.seeds.seed_for(index);
            let executor = Arc::clone(&self.executor);
            let candidates = Arc::clone(&candidates);
            tasks.spawn(async move { executor.execute(index, seed, &candidates).await });
        }

        let mut results = Vec::with_capacity(batch.len());
        while let Some(joined) = tasks.join_next().await {
            // Returning drops `tasks`, which aborts the rest of the batch.
            results.push(joined??);
        }
        Ok(results)
    }

    fn fold<O>(&mut self, mut result: TestCaseResult, observer: &mut O)
    where
        O: StressObserver + ?Sized,
    {
        // A candidate that failed earlier in this batch still ran the later tests of it.
        result
            .candidates
            .retain(|r| self.candidates.contains(&r.candidate));

        self.tests_run += 1;
        self.stats.record(&result);
        observer.on_test_finished(&result);

        let newly_failed: Vec<_> = result
            .failures()
            .map(|r| CandidateFailure {
                candidate: r.candidate.clone(),
                verdict: r.verdict,
                test_index: result.index,
                seed: result.seed,
                comment: r.comment.clone(),
            })
            .collect();

        for failure in newly_failed {
            if !self.candidates.remove(&failure.candidate) {
                continue;
            }
            log::info!(
                "Solution {} failed ({}, test {})",
                failure.candidate,
                failure.verdict,
                failure.test_index
            );
            observer.on_candidate_failed(&failure, &result);
            self.failures.push(failure);
        }
    }
}
