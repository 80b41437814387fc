//! Dependency-driven rubric evaluation for LLM responses.
//!
//! A rubric is a validated DAG of judgeable requirements. Evaluation walks
//! the graph level by level: each frontier is judged concurrently, judged
//! scores select score-conditioned branches into the next frontier, and the
//! finished trace is reduced to a scalar reward by a pluggable strategy.
//! Progressive disclosure releases gated scenario context as requirements
//! are satisfied, which drives multi-turn evaluations.
//!
//! Entry points: [`rubric::Rubric`] for one-shot and incremental runs,
//! [`disclosure::DisclosureDriver`] for turn-based conversations, and
//! [`loader`] for the YAML authoring format.

pub mod disclosure;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod judge;
pub mod loader;
pub mod model;
pub mod reward;
pub mod rubric;

pub use disclosure::{DisclosureDriver, Turn};
pub use engine::{CancelToken, Engine, EngineConfig, EvalState, GroundTruthMode};
pub use errors::{ConstructionError, EvalError};
pub use graph::{BucketPolicy, RequirementGraph};
pub use judge::{Judge, JudgeRegistry, ReferenceJudge};
pub use model::{
    Branch, EvaluationResult, GroundTruth, JudgeVerdict, LevelResult, Requirement,
    RequirementOutcome, RunStatus, Scenario, ScoringKind,
};
pub use reward::RewardStrategy;
pub use rubric::{Evaluation, Rubric, StepOutput};
