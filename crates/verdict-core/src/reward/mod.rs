//! Reward strategies: pure, stateless reducers from an evaluation trace to
//! one scalar. A closed set of variants selected at rubric construction
//! time; the engine never consults them.

use crate::model::{EvaluationResult, LevelResult};
use serde::{Deserialize, Serialize};

fn default_decay() -> f64 {
    1.0
}

fn default_base() -> f64 {
    2.0
}

fn default_max_level_bonus() -> f64 {
    1.0
}

fn default_completion_bonus() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RewardStrategy {
    /// Total of all scores.
    Sum,
    /// Average score across evaluated requirements; 0 when none.
    Mean,
    /// Sum over levels of weight(i) * mean(level i), with weight(i) =
    /// 1 / (1 + decay * i) strictly decreasing so early-dependency
    /// requirements dominate. Negative decay is treated as 0 (flat
    /// weights), keeping the denominator positive.
    LevelWeighted {
        #[serde(default = "default_decay")]
        decay: f64,
    },
    /// Evaluated / reachable requirement count, optionally scaled by the
    /// mean score. Rewards traversal depth and breadth, not just
    /// correctness.
    CompletionRatio {
        #[serde(default)]
        scale_by_mean: bool,
    },
    /// Sum over levels of base^i * mean(level i), base > 1: reaching deep
    /// levels pays super-linearly. A base below 1 is treated as 1.
    Progressive {
        #[serde(default = "default_base")]
        base: f64,
    },
    /// Depth fraction (deepest judged level over graph depth) times
    /// `max_level_bonus`, plus the completion ratio times
    /// `completion_bonus`. Pays for how far the traversal got rather than
    /// for the scores along the way.
    LevelBased {
        #[serde(default = "default_max_level_bonus")]
        max_level_bonus: f64,
        #[serde(default = "default_completion_bonus")]
        completion_bonus: f64,
    },
    /// Sum of score * per-requirement weight (1.0 when unset).
    WeightedSum,
}

impl Default for RewardStrategy {
    fn default() -> Self {
        RewardStrategy::LevelWeighted {
            decay: default_decay(),
        }
    }
}

impl RewardStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            RewardStrategy::Sum => "sum",
            RewardStrategy::Mean => "mean",
            RewardStrategy::LevelWeighted { .. } => "level_weighted",
            RewardStrategy::CompletionRatio { .. } => "completion_ratio",
            RewardStrategy::Progressive { .. } => "progressive",
            RewardStrategy::LevelBased { .. } => "level_based",
            RewardStrategy::WeightedSum => "weighted_sum",
        }
    }

    /// Reduce a completed (or partial) trace to a scalar. Empty traces
    /// reduce to 0.0; no variant divides by zero.
    pub fn reduce(&self, result: &EvaluationResult) -> f64 {
        match self {
            RewardStrategy::Sum => result.scores().sum(),
            RewardStrategy::Mean => {
                let count = result.evaluated();
                if count == 0 {
                    0.0
                } else {
                    result.scores().sum::<f64>() / count as f64
                }
            }
            RewardStrategy::LevelWeighted { decay } => {
                let decay = decay.max(0.0);
                result
                    .levels
                    .iter()
                    .enumerate()
                    .map(|(i, level)| level_mean(level) / (1.0 + decay * i as f64))
                    .sum()
            }
            RewardStrategy::CompletionRatio { scale_by_mean } => {
                if result.reachable == 0 {
                    return 0.0;
                }
                let ratio = result.evaluated() as f64 / result.reachable as f64;
                if *scale_by_mean {
                    ratio * RewardStrategy::Mean.reduce(result)
                } else {
                    ratio
                }
            }
            RewardStrategy::Progressive { base } => {
                let base = base.max(1.0);
                result
                    .levels
                    .iter()
                    .enumerate()
                    .map(|(i, level)| base.powi(i as i32) * level_mean(level))
                    .sum()
            }
            RewardStrategy::LevelBased {
                max_level_bonus,
                completion_bonus,
            } => {
                let deepest = result
                    .levels
                    .iter()
                    .rposition(|level| !level.is_empty())
                    .map_or(0, |i| i + 1);
                let depth_part = if result.depth == 0 {
                    0.0
                } else {
                    deepest as f64 / result.depth as f64 * max_level_bonus
                };
                let completion = if result.reachable == 0 {
                    0.0
                } else {
                    result.evaluated() as f64 / result.reachable as f64
                };
                depth_part + completion * completion_bonus
            }
            RewardStrategy::WeightedSum => result
                .levels
                .iter()
                .flat_map(|level| level.values())
                .map(|o| o.score * o.weight.unwrap_or(1.0))
                .sum(),
        }
    }
}

fn level_mean(level: &LevelResult) -> f64 {
    if level.is_empty() {
        0.0
    } else {
        level.values().map(|o| o.score).sum::<f64>() / level.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JudgeVerdict, RequirementOutcome};

    fn trace(levels: &[&[(&str, f64, Option<f64>)]]) -> EvaluationResult {
        let mut result = EvaluationResult::begin(3, 3);
        for entries in levels {
            let mut level = LevelResult::new();
            for (name, score, weight) in *entries {
                level.insert(
                    name.to_string(),
                    RequirementOutcome::judged(JudgeVerdict::new(*score, "t"), *weight),
                );
            }
            result.levels.push(level);
        }
        result
    }

    #[test]
    fn sum_and_mean_on_linear_chain() {
        let result = trace(&[
            &[("a", 1.0, None)],
            &[("b", 1.0, None)],
            &[("c", 1.0, None)],
        ]);
        assert_eq!(RewardStrategy::Sum.reduce(&result), 3.0);
        assert_eq!(RewardStrategy::Mean.reduce(&result), 1.0);
    }

    #[test]
    fn empty_trace_reduces_to_zero() {
        let result = EvaluationResult::begin(0, 0);
        for strategy in [
            RewardStrategy::Sum,
            RewardStrategy::Mean,
            RewardStrategy::LevelWeighted { decay: 1.0 },
            RewardStrategy::CompletionRatio {
                scale_by_mean: true,
            },
            RewardStrategy::Progressive { base: 2.0 },
            RewardStrategy::LevelBased {
                max_level_bonus: 1.0,
                completion_bonus: 0.5,
            },
            RewardStrategy::WeightedSum,
        ] {
            assert_eq!(strategy.reduce(&result), 0.0, "{}", strategy.name());
        }
    }

    #[test]
    fn level_weighted_decays_with_depth() {
        let result = trace(&[&[("a", 1.0, None)], &[("b", 1.0, None)]]);
        // 1/(1+0) + 1/(1+1)
        let reward = RewardStrategy::LevelWeighted { decay: 1.0 }.reduce(&result);
        assert!((reward - 1.5).abs() < 1e-12);
    }

    #[test]
    fn completion_ratio_counts_evaluated_over_reachable() {
        let result = trace(&[&[("a", 1.0, None)], &[("b", 1.0, None), ("c", 1.0, None)]]);
        assert_eq!(
            RewardStrategy::CompletionRatio {
                scale_by_mean: false
            }
            .reduce(&result),
            1.0
        );

        let partial = trace(&[&[("a", 0.5, None)]]);
        let reward = RewardStrategy::CompletionRatio {
            scale_by_mean: true,
        }
        .reduce(&partial);
        // 1/3 of the graph, mean score 0.5
        assert!((reward - (1.0 / 3.0) * 0.5).abs() < 1e-12);
    }

    #[test]
    fn progressive_pays_deep_levels_superlinearly() {
        let result = trace(&[&[("a", 1.0, None)], &[("b", 1.0, None)]]);
        let reward = RewardStrategy::Progressive { base: 2.0 }.reduce(&result);
        assert!((reward - 3.0).abs() < 1e-12);
    }

    #[test]
    fn level_based_pays_depth_and_completion() {
        // Full run: all 3 levels reached, 3 of 3 evaluated.
        let full = trace(&[
            &[("a", 1.0, None)],
            &[("b", 0.0, None)],
            &[("c", 1.0, None)],
        ]);
        let strategy = RewardStrategy::LevelBased {
            max_level_bonus: 1.0,
            completion_bonus: 0.5,
        };
        assert!((strategy.reduce(&full) - 1.5).abs() < 1e-12);

        // Stopped at the root: 1 of 3 levels, 1 of 3 requirements.
        let partial = trace(&[&[("a", 0.0, None)]]);
        assert!((strategy.reduce(&partial) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn degenerate_parameters_are_clamped() {
        let result = trace(&[&[("a", 1.0, None)], &[("b", 1.0, None)]]);

        // Negative decay flattens to equal weights instead of dividing by
        // zero at level 1.
        let reward = RewardStrategy::LevelWeighted { decay: -1.0 }.reduce(&result);
        assert!(reward.is_finite());
        assert!((reward - 2.0).abs() < 1e-12);

        // Sub-unit base degrades to a flat per-level sum.
        let reward = RewardStrategy::Progressive { base: 0.5 }.reduce(&result);
        assert!((reward - 2.0).abs() < 1e-12);
    }

    #[test]
    fn weighted_sum_uses_requirement_weights() {
        let result = trace(&[&[("a", 1.0, Some(2.0)), ("b", 0.5, None)]]);
        assert_eq!(RewardStrategy::WeightedSum.reduce(&result), 2.5);
    }

    #[test]
    fn reduce_is_deterministic() {
        let result = trace(&[&[("a", 0.7, Some(1.2))], &[("b", 0.3, None)]]);
        for strategy in [
            RewardStrategy::Sum,
            RewardStrategy::LevelWeighted { decay: 0.5 },
            RewardStrategy::Progressive { base: 1.5 },
        ] {
            assert_eq!(strategy.reduce(&result), strategy.reduce(&result));
        }
    }

    #[test]
    fn strategy_is_serde_selectable() {
        let s: RewardStrategy = serde_yaml::from_str("strategy: progressive\nbase: 3.0").unwrap();
        assert_eq!(s, RewardStrategy::Progressive { base: 3.0 });
        let s: RewardStrategy = serde_yaml::from_str("strategy: mean").unwrap();
        assert_eq!(s, RewardStrategy::Mean);
        let s: RewardStrategy = serde_yaml::from_str("strategy: level_based").unwrap();
        assert_eq!(
            s,
            RewardStrategy::LevelBased {
                max_level_bonus: 1.0,
                completion_bonus: 0.5,
            }
        );
    }
}
