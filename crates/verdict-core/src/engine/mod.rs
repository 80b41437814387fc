//! Wavefront evaluation engine.
//!
//! The engine walks the requirement graph level by level: every requirement
//! in the current frontier is judged concurrently, the level settles behind
//! an explicit barrier, and only then are the judged scores resolved into
//! the next frontier. The barrier is load-bearing: membership of level n+1
//! is a pure function of level n's outcomes.

use crate::errors::EvalError;
use crate::graph::{BucketPolicy, RequirementGraph};
use crate::judge::JudgeRegistry;
use crate::model::{
    EvaluationResult, LevelResult, Requirement, RequirementOutcome, RunStatus, Scenario,
    SCORE_EPSILON,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// How scenario ground truth participates in branch resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundTruthMode {
    /// Answers only brief the judge; the judge's score picks the branch.
    #[default]
    Brief,
    /// The expected answer picks the branch, and only when the judge's
    /// score agrees with it; disagreement stops that path. Requirements
    /// without an answer are skipped from the level.
    Override,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent judge calls within one level.
    pub max_in_flight: usize,
    /// Per judge call; a timed-out call is a judge failure.
    pub judge_timeout: Duration,
    pub bucket_policy: BucketPolicy,
    pub ground_truth: GroundTruthMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            judge_timeout: Duration::from_secs(30),
            bucket_policy: BucketPolicy::default(),
            ground_truth: GroundTruthMode::default(),
        }
    }
}

/// Cooperative cancellation flag, checked between levels only; a mid-level
/// barrier is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Run-scoped traversal state. Explicit so runs stay independent and a
/// conversational driver can resume with `step` instead of restarting.
/// Callers may replace `frontier` before a step to override it.
#[derive(Debug)]
pub struct EvalState {
    pub result: EvaluationResult,
    pub frontier: BTreeSet<String>,
    pub visited: BTreeSet<String>,
}

impl EvalState {
    fn new(graph: &RequirementGraph) -> Self {
        Self {
            result: EvaluationResult::begin(graph.reachable(), graph.levels().len()),
            frontier: graph.roots().clone(),
            visited: BTreeSet::new(),
        }
    }

    pub fn done(&self) -> bool {
        self.frontier.iter().all(|n| self.visited.contains(n))
    }
}

/// Output of one `step` call.
#[derive(Debug)]
pub struct StepReport {
    /// The level just judged; empty when the frontier deduplicated away.
    pub level: LevelResult,
    /// Unvisited frontier for the next step.
    pub next_frontier: BTreeSet<String>,
    pub done: bool,
}

/// Drives evaluation runs over a shared, read-only graph and registry.
/// Safe to reuse across concurrent runs without synchronization.
pub struct Engine {
    graph: Arc<RequirementGraph>,
    judges: JudgeRegistry,
    config: EngineConfig,
}

impl Engine {
    pub fn new(graph: Arc<RequirementGraph>, judges: JudgeRegistry, config: EngineConfig) -> Self {
        Self {
            graph,
            judges,
            config,
        }
    }

    pub fn graph(&self) -> &RequirementGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fresh traversal state rooted at the graph's root set.
    pub fn begin(&self) -> EvalState {
        EvalState::new(&self.graph)
    }

    /// Run a scenario to completion.
    pub async fn evaluate(&self, scenario: &Scenario) -> Result<EvaluationResult, EvalError> {
        self.evaluate_with_cancel(scenario, &CancelToken::new())
            .await
    }

    /// Run to completion unless `cancel` fires; cancellation between levels
    /// yields a partial result tagged `Cancelled`.
    pub async fn evaluate_with_cancel(
        &self,
        scenario: &Scenario,
        cancel: &CancelToken,
    ) -> Result<EvaluationResult, EvalError> {
        let mut state = self.begin();
        loop {
            if cancel.is_cancelled() {
                debug!(run_id = %state.result.run_id, "evaluation cancelled between levels");
                state.result.finish(RunStatus::Cancelled);
                return Ok(state.result);
            }
            let report = self.step(scenario, &mut state).await?;
            if report.done {
                break;
            }
        }
        state.result.finish(RunStatus::Completed);
        Ok(state.result)
    }

    /// Judge one level and resolve the next frontier.
    ///
    /// Deduplicates the frontier against the visited set first, so a
    /// requirement reached along two paths (diamond) is judged once. Judge
    /// failures and timeouts are recorded with the modality's fallback
    /// score; only a dispatch miss aborts the run.
    pub async fn step(
        &self,
        scenario: &Scenario,
        state: &mut EvalState,
    ) -> Result<StepReport, EvalError> {
        let depth = state.result.levels.len();
        let frontier = self.effective_frontier(scenario, state);
        if frontier.is_empty() {
            state.frontier.clear();
            return Ok(StepReport {
                level: LevelResult::new(),
                next_frontier: BTreeSet::new(),
                done: true,
            });
        }
        debug!(depth, frontier = ?frontier, "judging level");

        // Resolve every judge before spawning anything: a dispatch miss is
        // fatal for the run and must not leave half a level judged.
        let mut work = Vec::with_capacity(frontier.len());
        for name in &frontier {
            // Frontier names come from validated graph edges; an unknown
            // name can only mean a caller overwrote the state by hand.
            let Some(req) = self.graph.get(name) else {
                warn!(requirement = %name, "frontier names unknown requirement; skipped");
                continue;
            };
            let judge = self.judges.resolve(req)?;
            work.push((req.clone(), judge));
        }

        let sem = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let scenario_shared = Arc::new(scenario.clone());
        let mut join_set = JoinSet::new();
        for (req, judge) in work {
            let sem = sem.clone();
            let scenario = scenario_shared.clone();
            let judge_timeout = self.config.judge_timeout;
            join_set.spawn(async move {
                // The semaphore is never closed; a failed acquire only
                // drops the bound, not the call.
                let _permit = sem.acquire_owned().await.ok();
                let verdict = timeout(judge_timeout, judge.score(&req, &scenario)).await;
                (req, verdict)
            });
        }

        // Barrier: the whole level settles before any branch is resolved.
        let mut level = LevelResult::new();
        while let Some(joined) = join_set.join_next().await {
            let (req, verdict) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "judge task failed to join; requirement dropped from level");
                    continue;
                }
            };
            let outcome = match verdict {
                Ok(Ok(v)) if req.scoring.admits(v.score) => {
                    RequirementOutcome::judged(v, req.weight)
                }
                Ok(Ok(v)) => {
                    warn!(requirement = %req.name, score = v.score, "judge returned out-of-modality score");
                    RequirementOutcome::failed(
                        req.scoring.fallback_score(),
                        req.weight,
                        format!("judge returned out-of-modality score {}", v.score),
                    )
                }
                Ok(Err(e)) => {
                    warn!(requirement = %req.name, error = %e, "judge call failed");
                    RequirementOutcome::failed(
                        req.scoring.fallback_score(),
                        req.weight,
                        format!("judge error: {e}"),
                    )
                }
                Err(_) => {
                    warn!(requirement = %req.name, "judge call timed out");
                    RequirementOutcome::failed(
                        req.scoring.fallback_score(),
                        req.weight,
                        "judge timeout".to_string(),
                    )
                }
            };
            level.insert(req.name, outcome);
        }

        for name in level.keys() {
            state.visited.insert(name.clone());
        }

        let mut next_frontier = BTreeSet::new();
        for (name, outcome) in &level {
            if let Some(branch_score) = self.branch_score(scenario, name, outcome) {
                for succ in
                    self.graph
                        .successors_for(name, branch_score, self.config.bucket_policy)
                {
                    if !state.visited.contains(succ) {
                        next_frontier.insert(succ.clone());
                    }
                }
            }
        }

        state.result.levels.push(level.clone());
        state.frontier = next_frontier.clone();
        let done = next_frontier.is_empty();
        Ok(StepReport {
            level,
            next_frontier,
            done,
        })
    }

    /// Whether a just-judged requirement's path continues, i.e. its resolved
    /// bucket maps to a non-empty successor set. Used for disclosure gating.
    pub fn continues(&self, scenario: &Scenario, name: &str, outcome: &RequirementOutcome) -> bool {
        self.branch_score(scenario, name, outcome)
            .map(|score| {
                !self
                    .graph
                    .successors_for(name, score, self.config.bucket_policy)
                    .is_empty()
            })
            .unwrap_or(false)
    }

    /// The score that selects the outcome bucket, per ground-truth mode.
    /// None means the path stops here.
    fn branch_score(
        &self,
        scenario: &Scenario,
        name: &str,
        outcome: &RequirementOutcome,
    ) -> Option<f64> {
        match self.config.ground_truth {
            GroundTruthMode::Brief => Some(outcome.score),
            GroundTruthMode::Override => {
                let truth = scenario.ground_truth(name)?;
                ((outcome.score - truth.answer).abs() <= SCORE_EPSILON).then_some(truth.answer)
            }
        }
    }

    /// Frontier minus visited names; under `Override`, also minus
    /// requirements the scenario carries no answer for.
    fn effective_frontier(&self, scenario: &Scenario, state: &EvalState) -> Vec<String> {
        state
            .frontier
            .iter()
            .filter(|n| !state.visited.contains(*n))
            .filter(|n| {
                self.config.ground_truth != GroundTruthMode::Override
                    || scenario.answers.contains_key(*n)
            })
            .cloned()
            .collect()
    }
}
