//! Judge capability trait and registry.
//!
//! A judge is an opaque asynchronous scorer; LLM-backed implementations live
//! outside this crate. The registry only matches a requirement's scoring
//! modality (or pinned judge name) to a compatible capability.

use crate::errors::EvalError;
use crate::model::{JudgeVerdict, Requirement, Scenario, ScoringKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Capability of scoring one requirement against one scenario.
///
/// Implementations may perform network calls, retries or caching internally;
/// the engine treats every call as opaque and side-effect free.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Stable name, used when a requirement pins a judge explicitly.
    fn name(&self) -> &str;

    /// Whether this judge can score the given modality.
    fn supports(&self, kind: &ScoringKind) -> bool;

    async fn score(
        &self,
        requirement: &Requirement,
        scenario: &Scenario,
    ) -> anyhow::Result<JudgeVerdict>;
}

/// Pure lookup/dispatch over the registered judges.
#[derive(Clone)]
pub struct JudgeRegistry {
    judges: Vec<Arc<dyn Judge>>,
}

impl JudgeRegistry {
    pub fn new(judges: Vec<Arc<dyn Judge>>) -> Self {
        Self { judges }
    }

    pub fn is_empty(&self) -> bool {
        self.judges.is_empty()
    }

    /// Resolve the judge for a requirement: pinned name first, otherwise the
    /// first registered judge supporting the modality.
    pub fn resolve(&self, req: &Requirement) -> Result<Arc<dyn Judge>, EvalError> {
        if let Some(pinned) = &req.judge {
            let judge = self
                .judges
                .iter()
                .find(|j| j.name() == pinned)
                .ok_or_else(|| EvalError::JudgeDispatch {
                    name: req.name.clone(),
                    detail: format!("pinned judge '{pinned}' is not registered"),
                })?;
            if !judge.supports(&req.scoring) {
                return Err(EvalError::JudgeDispatch {
                    name: req.name.clone(),
                    detail: format!(
                        "pinned judge '{pinned}' does not support the requirement's scoring modality"
                    ),
                });
            }
            return Ok(judge.clone());
        }

        self.judges
            .iter()
            .find(|j| j.supports(&req.scoring))
            .cloned()
            .ok_or_else(|| EvalError::JudgeDispatch {
                name: req.name.clone(),
                detail: "no registered judge supports the scoring modality".into(),
            })
    }
}

/// Deterministic judge that answers from the scenario's ground truth.
///
/// Useful for reference-guided runs and as a verifiable baseline; a missing
/// answer is a judge execution failure, which the engine records with the
/// modality's fallback score.
#[derive(Debug, Default, Clone)]
pub struct ReferenceJudge;

#[async_trait]
impl Judge for ReferenceJudge {
    fn name(&self) -> &str {
        "reference"
    }

    fn supports(&self, _kind: &ScoringKind) -> bool {
        true
    }

    async fn score(
        &self,
        requirement: &Requirement,
        scenario: &Scenario,
    ) -> anyhow::Result<JudgeVerdict> {
        let truth = scenario.ground_truth(&requirement.name).ok_or_else(|| {
            anyhow::anyhow!(
                "no ground truth answer for requirement '{}'",
                requirement.name
            )
        })?;
        let rationale = truth
            .reasoning
            .clone()
            .unwrap_or_else(|| "ground truth".to_string());
        Ok(JudgeVerdict::new(truth.answer, rationale))
    }
}
