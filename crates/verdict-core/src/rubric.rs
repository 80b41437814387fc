//! Rubric: validated graph + judge registry + reward strategy, behind the
//! two public evaluation surfaces (one-shot and incremental).

use crate::engine::{CancelToken, Engine, EngineConfig, EvalState};
use crate::errors::{ConstructionError, EvalError};
use crate::graph::RequirementGraph;
use crate::judge::{Judge, JudgeRegistry};
use crate::model::{EvaluationResult, LevelResult, Requirement, Scenario};
use crate::reward::RewardStrategy;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A complete one-shot evaluation: the full trace plus its reduced reward.
#[derive(Debug)]
pub struct Evaluation {
    pub result: EvaluationResult,
    pub reward: f64,
    pub strategy: &'static str,
}

/// One incremental step: the judged level, the disclosures it unlocked and
/// the frontier the next step will judge.
#[derive(Debug)]
pub struct StepOutput {
    pub level: LevelResult,
    pub next_frontier: std::collections::BTreeSet<String>,
    pub disclosures: BTreeMap<String, String>,
    pub done: bool,
}

/// Immutable once constructed; shareable across concurrent evaluations.
pub struct Rubric {
    graph: Arc<RequirementGraph>,
    engine: Engine,
    strategy: RewardStrategy,
}

impl Rubric {
    /// Build a rubric with the default engine configuration.
    pub fn new(
        requirements: Vec<Requirement>,
        judges: Vec<Arc<dyn Judge>>,
        strategy: Option<RewardStrategy>,
    ) -> Result<Self, ConstructionError> {
        Self::with_config(requirements, judges, strategy, EngineConfig::default())
    }

    pub fn with_config(
        requirements: Vec<Requirement>,
        judges: Vec<Arc<dyn Judge>>,
        strategy: Option<RewardStrategy>,
        config: EngineConfig,
    ) -> Result<Self, ConstructionError> {
        let graph = Arc::new(RequirementGraph::build(requirements)?);
        let engine = Engine::new(graph.clone(), JudgeRegistry::new(judges), config);
        Ok(Self {
            graph,
            engine,
            strategy: strategy.unwrap_or_default(),
        })
    }

    pub fn graph(&self) -> &RequirementGraph {
        &self.graph
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn strategy(&self) -> &RewardStrategy {
        &self.strategy
    }

    /// Fresh resumable state for the incremental interface.
    pub fn begin(&self) -> EvalState {
        self.engine.begin()
    }

    /// Run the scenario to completion and reduce the trace to a reward.
    pub async fn evaluate(&self, scenario: &Scenario) -> Result<Evaluation, EvalError> {
        self.evaluate_with_cancel(scenario, &CancelToken::new())
            .await
    }

    /// As `evaluate`, but cancellable between levels; a cancelled run still
    /// reduces its partial trace.
    pub async fn evaluate_with_cancel(
        &self,
        scenario: &Scenario,
        cancel: &CancelToken,
    ) -> Result<Evaluation, EvalError> {
        let result = self.engine.evaluate_with_cancel(scenario, cancel).await?;
        let reward = self.strategy.reduce(&result);
        Ok(Evaluation {
            reward,
            strategy: self.strategy.name(),
            result,
        })
    }

    /// Judge one level and surface the disclosures it unlocked.
    ///
    /// A requirement unlocks its `revealed_info` entry when its resolved
    /// outcome continues to a non-empty successor set, or when it is an
    /// explicit disclosure point. Names are judged at most once per run, so
    /// no disclosure is ever emitted twice.
    pub async fn step(
        &self,
        scenario: &Scenario,
        state: &mut EvalState,
    ) -> Result<StepOutput, EvalError> {
        let report = self.engine.step(scenario, state).await?;
        let mut disclosures = BTreeMap::new();
        for (name, outcome) in &report.level {
            let flagged = self
                .graph
                .get(name)
                .is_some_and(|r| r.disclosure);
            if flagged || self.engine.continues(scenario, name, outcome) {
                if let Some(info) = scenario.revealed_info.get(name) {
                    disclosures.insert(name.clone(), info.clone());
                }
            }
        }
        Ok(StepOutput {
            level: report.level,
            next_frontier: report.next_frontier,
            disclosures,
            done: report.done,
        })
    }

    /// Reduce an externally held trace with this rubric's strategy.
    pub fn reduce(&self, result: &EvaluationResult) -> f64 {
        self.strategy.reduce(result)
    }

    /// Check a scenario against the graph before running it: every answer
    /// must name a known requirement and fit its modality, and every
    /// revealed_info entry must have backing ground truth.
    pub fn validate_scenario(&self, scenario: &Scenario) -> Result<(), ConstructionError> {
        for (name, truth) in &scenario.answers {
            let req = self
                .graph
                .get(name)
                .ok_or_else(|| ConstructionError::UnknownAnswer { name: name.clone() })?;
            if !req.scoring.admits(truth.answer) {
                return Err(ConstructionError::InvalidAnswer {
                    name: name.clone(),
                    answer: truth.answer,
                });
            }
        }
        for name in scenario.revealed_info.keys() {
            if !scenario.answers.contains_key(name) {
                return Err(ConstructionError::OrphanRevealedInfo { name: name.clone() });
            }
        }
        Ok(())
    }
}
