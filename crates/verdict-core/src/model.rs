//! Core data model: scoring modalities, requirements, scenarios and the
//! structured result an evaluation run produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Tolerance for matching discrete branch keys against judged scores.
pub const SCORE_EPSILON: f64 = 1e-9;

/// The scoring modality a judge must support for a requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoringKind {
    /// Yes/no questions scored 1.0 or 0.0.
    Binary,
    /// A fixed set of allowed score values.
    Discrete { options: Vec<f64> },
    /// Any score within an inclusive range.
    Continuous { min: f64, max: f64 },
}

impl ScoringKind {
    /// The lowest/failing score for this modality. Recorded when a judge
    /// call errors or times out so traversal can continue deterministically.
    pub fn fallback_score(&self) -> f64 {
        match self {
            ScoringKind::Binary => 0.0,
            ScoringKind::Discrete { options } => {
                if options.is_empty() {
                    0.0
                } else {
                    options.iter().copied().fold(f64::INFINITY, f64::min)
                }
            }
            ScoringKind::Continuous { min, .. } => *min,
        }
    }

    /// Whether `score` is a legal value under this modality.
    pub fn admits(&self, score: f64) -> bool {
        match self {
            ScoringKind::Binary => {
                (score - 1.0).abs() <= SCORE_EPSILON || score.abs() <= SCORE_EPSILON
            }
            ScoringKind::Discrete { options } => {
                options.iter().any(|o| (o - score).abs() <= SCORE_EPSILON)
            }
            ScoringKind::Continuous { min, max } => score >= *min && score <= *max,
        }
    }
}

impl Default for ScoringKind {
    fn default() -> Self {
        ScoringKind::Binary
    }
}

/// One score-conditioned edge bundle: when the resolved score selects `on`,
/// the requirements in `next` join the following frontier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub on: f64,
    #[serde(default)]
    pub next: Vec<String>,
}

/// A single branching evaluation criterion.
///
/// Branches are an ordered list of (bucket key, successor set) pairs rather
/// than an adjacency map; which pair applies is only known once a judge has
/// scored the requirement. An empty branch list makes the requirement
/// terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub name: String,
    pub question: String,
    #[serde(default)]
    pub scoring: ScoringKind,
    #[serde(default)]
    pub branches: Vec<Branch>,
    /// Optional weight consumed by weight-aware reward strategies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Pin a specific registered judge by name instead of modality matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge: Option<String>,
    /// Treat this requirement as a disclosure point even when terminal.
    #[serde(default)]
    pub disclosure: bool,
}

impl Requirement {
    pub fn new(name: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            question: question.into(),
            scoring: ScoringKind::Binary,
            branches: Vec::new(),
            weight: None,
            judge: None,
            disclosure: false,
        }
    }

    pub fn with_scoring(mut self, scoring: ScoringKind) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_branch(mut self, on: f64, next: Vec<String>) -> Self {
        self.branches.push(Branch { on, next });
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_judge(mut self, judge: impl Into<String>) -> Self {
        self.judge = Some(judge.into());
        self
    }

    pub fn with_disclosure(mut self) -> Self {
        self.disclosure = true;
        self
    }

    /// Terminal requirements end their path regardless of score.
    pub fn terminal(&self) -> bool {
        self.branches.is_empty()
    }

    /// Every successor name referenced by any branch, in declaration order.
    pub fn all_successors(&self) -> impl Iterator<Item = &str> {
        self.branches
            .iter()
            .flat_map(|b| b.next.iter().map(String::as_str))
    }
}

/// Ground-truth judgment material for one requirement in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub answer: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl GroundTruth {
    pub fn new(answer: f64) -> Self {
        Self {
            answer,
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// One evaluation input: prompt, completion under evaluation, ground truth
/// and the progressive-disclosure text gated behind each requirement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub completion: String,
    #[serde(default)]
    pub answers: BTreeMap<String, GroundTruth>,
    #[serde(default)]
    pub revealed_info: BTreeMap<String, String>,
    /// Full-information seed text used by scenario authors; never consulted
    /// during evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_description: Option<String>,
}

impl Scenario {
    pub fn new(prompt: impl Into<String>, completion: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            completion: completion.into(),
            ..Default::default()
        }
    }

    pub fn with_answer(mut self, name: impl Into<String>, truth: GroundTruth) -> Self {
        self.answers.insert(name.into(), truth);
        self
    }

    pub fn with_revealed_info(
        mut self,
        name: impl Into<String>,
        info: impl Into<String>,
    ) -> Self {
        self.revealed_info.insert(name.into(), info.into());
        self
    }

    pub fn ground_truth(&self, name: &str) -> Option<&GroundTruth> {
        self.answers.get(name)
    }
}

/// What a judge returns for one (requirement, scenario) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub score: f64,
    pub rationale: String,
}

impl JudgeVerdict {
    pub fn new(score: f64, rationale: impl Into<String>) -> Self {
        Self {
            score,
            rationale: rationale.into(),
        }
    }
}

/// One judged requirement inside a level. `error` is set when the judge call
/// failed or timed out, in which case `score` is the modality fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementOutcome {
    pub score: f64,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequirementOutcome {
    pub fn judged(verdict: JudgeVerdict, weight: Option<f64>) -> Self {
        Self {
            score: verdict.score,
            rationale: verdict.rationale,
            weight,
            error: None,
        }
    }

    pub fn failed(fallback: f64, weight: Option<f64>, error: impl Into<String>) -> Self {
        Self {
            score: fallback,
            rationale: String::new(),
            weight,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One synchronized batch of judged requirements sharing a traversal depth.
/// BTreeMap keeps result iteration deterministic.
pub type LevelResult = BTreeMap<String, RequirementOutcome>;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// The complete, deduplicated trace of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub levels: Vec<LevelResult>,
    pub status: RunStatus,
    /// Requirements reachable in the graph; denominator for completion-ratio
    /// style reducers.
    pub reachable: usize,
    /// Static topological depth of the graph; denominator for level-based
    /// reducers.
    #[serde(default)]
    pub depth: usize,
}

impl EvaluationResult {
    pub fn begin(reachable: usize, depth: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            levels: Vec::new(),
            status: RunStatus::Completed,
            reachable,
            depth,
        }
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Number of requirements judged across all levels.
    pub fn evaluated(&self) -> usize {
        self.levels.iter().map(LevelResult::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(LevelResult::is_empty)
    }

    /// All scores in level order, then name order within a level.
    pub fn scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.levels
            .iter()
            .flat_map(|level| level.values().map(|o| o.score))
    }

    /// Outcomes that carry an error marker, with their requirement names.
    pub fn errors(&self) -> impl Iterator<Item = (&str, &RequirementOutcome)> {
        self.levels.iter().flat_map(|level| {
            level
                .iter()
                .filter(|(_, o)| o.is_error())
                .map(|(n, o)| (n.as_str(), o))
        })
    }
}
