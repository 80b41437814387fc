//! Typed error surface. Construction errors are fatal at build time and
//! never raised during evaluation; evaluation errors are scoped to one run.

use thiserror::Error;

/// Raised while building a rubric or validating a scenario against one.
#[derive(Debug, Error)]
pub enum ConstructionError {
    /// Two requirements share a name.
    #[error("duplicate requirement name: {name}")]
    DuplicateName { name: String },

    /// A branch references a requirement that does not exist.
    #[error("requirement '{from}' references unknown requirement '{to}'")]
    DanglingReference { from: String, to: String },

    /// The possible-successor relation contains a cycle.
    #[error("dependency cycle involving requirements: {}", names.join(", "))]
    Cycle { names: Vec<String> },

    /// A branch key is not a legal score under the requirement's modality.
    #[error("branch key {key} is outside the scoring modality of requirement '{name}'")]
    InvalidBranchKey { name: String, key: f64 },

    /// Two branches on one requirement share a key; resolution would
    /// silently shadow the later successor set.
    #[error("requirement '{name}' declares branch key {key} more than once")]
    DuplicateBranchKey { name: String, key: f64 },

    /// Scenario ground truth names a requirement the graph does not have.
    #[error("scenario answers reference unknown requirement '{name}'")]
    UnknownAnswer { name: String },

    /// Scenario ground truth value is not admitted by the modality.
    #[error("answer {answer} for requirement '{name}' is outside its scoring modality")]
    InvalidAnswer { name: String, answer: f64 },

    /// Disclosure text is gated behind a requirement with no ground truth.
    #[error("revealed_info entry '{name}' has no matching answer in the scenario")]
    OrphanRevealedInfo { name: String },

    /// Authoring-format parse or I/O problem.
    #[error("failed to load '{path}': {detail}")]
    Load { path: String, detail: String },
}

/// Raised during a single evaluation run.
#[derive(Debug, Error)]
pub enum EvalError {
    /// No registered judge is compatible with a requirement's modality, or a
    /// pinned judge is missing/incompatible. Fatal for the run.
    #[error("no compatible judge for requirement '{name}': {detail}")]
    JudgeDispatch { name: String, detail: String },
}
