//! Turn-based disclosure driver.
//!
//! Consumes the engine one level per conversational turn: after a level is
//! judged, the context gated behind each satisfied requirement is released
//! for the next turn. The caller supplies a (possibly updated) scenario
//! each turn, so the completion under judgment can track the conversation.

use crate::engine::EvalState;
use crate::errors::EvalError;
use crate::model::{EvaluationResult, LevelResult, Scenario};
use crate::rubric::Rubric;
use std::collections::BTreeMap;
use tracing::debug;

/// Output of one conversational turn.
#[derive(Debug)]
pub struct Turn {
    /// Requirements judged this turn (empty when nothing was eligible).
    pub level: LevelResult,
    /// Newly unlocked context, keyed by the requirement that gated it.
    pub disclosures: BTreeMap<String, String>,
    /// True when the workflow ended: frontier exhausted or turn budget hit.
    pub done: bool,
}

/// Drives a multi-turn exchange against one rubric, carrying the traversal
/// state between turns so each call resumes instead of restarting.
pub struct DisclosureDriver<'r> {
    rubric: &'r Rubric,
    state: EvalState,
    max_turns: Option<usize>,
    turns_taken: usize,
    finished: bool,
}

impl<'r> DisclosureDriver<'r> {
    pub fn new(rubric: &'r Rubric, max_turns: Option<usize>) -> Self {
        Self {
            state: rubric.begin(),
            rubric,
            max_turns,
            turns_taken: 0,
            finished: false,
        }
    }

    pub fn turns_taken(&self) -> usize {
        self.turns_taken
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Trace accumulated so far.
    pub fn result(&self) -> &EvaluationResult {
        &self.state.result
    }

    /// Judge the next level. A requirement's disclosure is never emitted
    /// before the level containing it has been judged.
    pub async fn next_turn(&mut self, scenario: &Scenario) -> Result<Turn, EvalError> {
        if self.finished {
            return Ok(Turn {
                level: LevelResult::new(),
                disclosures: BTreeMap::new(),
                done: true,
            });
        }

        let out = self.rubric.step(scenario, &mut self.state).await?;
        self.turns_taken += 1;
        let budget_exhausted = self
            .max_turns
            .is_some_and(|max| self.turns_taken >= max);
        self.finished = out.done || budget_exhausted;
        if self.finished {
            debug!(
                turns = self.turns_taken,
                budget_exhausted, "disclosure workflow finished"
            );
        }

        Ok(Turn {
            level: out.level,
            disclosures: out.disclosures,
            done: self.finished,
        })
    }

    /// Close the run and hand back the trace for reward reduction.
    pub fn into_result(mut self) -> EvaluationResult {
        let status = self.state.result.status;
        self.state.result.finish(status);
        self.state.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::ReferenceJudge;
    use crate::model::{GroundTruth, Requirement};
    use crate::reward::RewardStrategy;
    use std::sync::Arc;

    fn rubric() -> Rubric {
        Rubric::new(
            vec![
                Requirement::new("scene", "is the scene safe?")
                    .with_branch(1.0, vec!["assess".into()]),
                Requirement::new("assess", "was the patient assessed?")
                    .with_branch(1.0, vec!["treat".into()]),
                Requirement::new("treat", "was treatment started?"),
            ],
            vec![Arc::new(ReferenceJudge)],
            Some(RewardStrategy::Sum),
        )
        .unwrap()
    }

    fn scenario() -> Scenario {
        Scenario::new("you arrive at a scene", "responder transcript")
            .with_answer("scene", GroundTruth::new(1.0))
            .with_answer("assess", GroundTruth::new(1.0))
            .with_answer("treat", GroundTruth::new(1.0))
            .with_revealed_info("scene", "live wires are sparking nearby")
            .with_revealed_info("assess", "the patient is not breathing")
    }

    #[tokio::test]
    async fn disclosures_follow_judged_levels_in_order() {
        let rubric = rubric();
        let scenario = scenario();
        let mut driver = DisclosureDriver::new(&rubric, None);

        let t1 = driver.next_turn(&scenario).await.unwrap();
        assert!(t1.level.contains_key("scene"));
        assert_eq!(
            t1.disclosures.get("scene").map(String::as_str),
            Some("live wires are sparking nearby")
        );
        assert!(!t1.done);

        let t2 = driver.next_turn(&scenario).await.unwrap();
        assert!(t2.disclosures.contains_key("assess"));

        let t3 = driver.next_turn(&scenario).await.unwrap();
        assert!(t3.level.contains_key("treat"));
        assert!(t3.disclosures.is_empty());
        assert!(t3.done);

        let result = driver.into_result();
        assert_eq!(result.levels.len(), 3);
        assert_eq!(rubric.reduce(&result), 3.0);
    }

    #[tokio::test]
    async fn turn_budget_stops_the_workflow_early() {
        let rubric = rubric();
        let scenario = scenario();
        let mut driver = DisclosureDriver::new(&rubric, Some(2));

        let t1 = driver.next_turn(&scenario).await.unwrap();
        assert!(!t1.done);
        let t2 = driver.next_turn(&scenario).await.unwrap();
        assert!(t2.done);
        assert!(driver.is_finished());

        // Further turns are no-ops.
        let t3 = driver.next_turn(&scenario).await.unwrap();
        assert!(t3.done);
        assert!(t3.level.is_empty());
        assert_eq!(driver.result().levels.len(), 2);
    }

    #[tokio::test]
    async fn blocked_branch_ends_the_conversation() {
        let rubric = rubric();
        // Judge reproduces the 0.0 answer: no successor, no disclosure.
        let scenario = Scenario::new("p", "c")
            .with_answer("scene", GroundTruth::new(0.0))
            .with_revealed_info("scene", "never shown");
        let mut driver = DisclosureDriver::new(&rubric, None);

        let t1 = driver.next_turn(&scenario).await.unwrap();
        assert!(t1.done);
        assert!(t1.disclosures.is_empty());
        assert_eq!(driver.result().levels.len(), 1);
    }
}
