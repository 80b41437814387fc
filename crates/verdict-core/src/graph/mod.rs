//! Immutable requirement graph: construction-time validation, root
//! derivation, topological layering and score-to-branch resolution.

use crate::errors::ConstructionError;
use crate::model::{Requirement, ScoringKind, SCORE_EPSILON};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How a continuous score selects a branch bucket.
///
/// Discrete and binary requirements always match exactly; the policy only
/// applies to continuous modalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketPolicy {
    /// Highest branch key that is <= the score. A score below every key
    /// selects nothing and the path terminates.
    #[default]
    HighestBelow,
    /// Branch key closest to the score; ties break toward the lower key.
    Nearest,
}

/// Validated DAG of requirements. Built once per rubric, read-only after.
#[derive(Debug, Clone)]
pub struct RequirementGraph {
    by_name: BTreeMap<String, Requirement>,
    roots: BTreeSet<String>,
    levels: Vec<Vec<String>>,
}

impl RequirementGraph {
    /// Validate and index a flat requirement list.
    ///
    /// Fails on duplicate names, successors that resolve to no requirement,
    /// branch keys outside the owning requirement's modality, and any cycle
    /// in the union-over-branches successor relation.
    pub fn build(requirements: Vec<Requirement>) -> Result<Self, ConstructionError> {
        let mut by_name: BTreeMap<String, Requirement> = BTreeMap::new();
        for req in requirements {
            if by_name.contains_key(&req.name) {
                return Err(ConstructionError::DuplicateName { name: req.name });
            }
            by_name.insert(req.name.clone(), req);
        }

        for req in by_name.values() {
            for (idx, branch) in req.branches.iter().enumerate() {
                if !req.scoring.admits(branch.on) {
                    return Err(ConstructionError::InvalidBranchKey {
                        name: req.name.clone(),
                        key: branch.on,
                    });
                }
                if req.branches[..idx]
                    .iter()
                    .any(|b| (b.on - branch.on).abs() <= SCORE_EPSILON)
                {
                    return Err(ConstructionError::DuplicateBranchKey {
                        name: req.name.clone(),
                        key: branch.on,
                    });
                }
                for succ in &branch.next {
                    if !by_name.contains_key(succ) {
                        return Err(ConstructionError::DanglingReference {
                            from: req.name.clone(),
                            to: succ.clone(),
                        });
                    }
                }
            }
        }

        let levels = layered_topo_sort(&by_name)?;
        let roots = levels.first().cloned().unwrap_or_default().into_iter().collect();

        Ok(Self {
            by_name,
            roots,
            levels,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Requirement> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Requirements never named as a successor by any branch.
    pub fn roots(&self) -> &BTreeSet<String> {
        &self.roots
    }

    /// Static topological layering over the union successor relation.
    /// Traversal does not follow these levels (branching is score-driven);
    /// they exist for validation and inspection.
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.by_name.values()
    }

    /// Every requirement reachable under some outcome. With the union
    /// relation validated acyclic, each non-root has a chain of referencing
    /// predecessors ending at a root, so this is the whole graph.
    pub fn reachable(&self) -> usize {
        self.by_name.len()
    }

    /// Successors selected by `score` for `name`, under `policy`.
    /// Empty when the requirement is terminal or no bucket matches.
    pub fn successors_for(&self, name: &str, score: f64, policy: BucketPolicy) -> &[String] {
        static EMPTY: Vec<String> = Vec::new();
        let Some(req) = self.by_name.get(name) else {
            return &EMPTY;
        };
        match resolve_branch(req, score, policy) {
            Some(idx) => &req.branches[idx].next,
            None => &EMPTY,
        }
    }
}

/// Index of the branch selected by `score`, or None when no bucket applies.
fn resolve_branch(req: &Requirement, score: f64, policy: BucketPolicy) -> Option<usize> {
    if req.branches.is_empty() {
        return None;
    }
    match req.scoring {
        ScoringKind::Binary | ScoringKind::Discrete { .. } => req
            .branches
            .iter()
            .position(|b| (b.on - score).abs() <= SCORE_EPSILON),
        ScoringKind::Continuous { .. } => match policy {
            BucketPolicy::HighestBelow => req
                .branches
                .iter()
                .enumerate()
                .filter(|(_, b)| b.on <= score + SCORE_EPSILON)
                .max_by(|(_, a), (_, b)| a.on.total_cmp(&b.on))
                .map(|(i, _)| i),
            BucketPolicy::Nearest => req
                .branches
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    (a.on - score)
                        .abs()
                        .total_cmp(&(b.on - score).abs())
                        .then(a.on.total_cmp(&b.on))
                })
                .map(|(i, _)| i),
        },
    }
}

/// Kahn's algorithm over the union of all branch edges. Returns the layers
/// in dependency order; any leftover in-degree means a cycle, reported with
/// the participating requirement names.
fn layered_topo_sort(
    by_name: &BTreeMap<String, Requirement>,
) -> Result<Vec<Vec<String>>, ConstructionError> {
    let mut in_degree: BTreeMap<&str, usize> =
        by_name.keys().map(|n| (n.as_str(), 0)).collect();
    for req in by_name.values() {
        for succ in req.all_successors() {
            if let Some(d) = in_degree.get_mut(succ) {
                *d += 1;
            }
        }
    }

    let mut layer: Vec<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut levels = Vec::new();
    let mut placed = 0usize;

    while !layer.is_empty() {
        layer.sort_unstable();
        placed += layer.len();
        let mut next_layer = Vec::new();
        for name in &layer {
            for succ in by_name[*name].all_successors() {
                if let Some(d) = in_degree.get_mut(succ) {
                    *d -= 1;
                    if *d == 0 {
                        next_layer.push(succ);
                    }
                }
            }
        }
        levels.push(layer.iter().map(|s| s.to_string()).collect());
        layer = next_layer;
    }

    if placed < by_name.len() {
        let mut names: Vec<String> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(n, _)| n.to_string())
            .collect();
        names.sort_unstable();
        return Err(ConstructionError::Cycle { names });
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Requirement;

    fn linear_chain() -> Vec<Requirement> {
        vec![
            Requirement::new("a", "first?").with_branch(1.0, vec!["b".into()]),
            Requirement::new("b", "second?").with_branch(1.0, vec!["c".into()]),
            Requirement::new("c", "third?"),
        ]
    }

    #[test]
    fn build_derives_roots_and_levels() {
        let graph = RequirementGraph::build(linear_chain()).unwrap();
        assert_eq!(graph.len(), 3);
        assert!(graph.roots().contains("a"));
        assert_eq!(graph.roots().len(), 1);
        assert_eq!(graph.levels().len(), 3);
    }

    #[test]
    fn duplicate_name_rejected() {
        let reqs = vec![Requirement::new("a", "q1"), Requirement::new("a", "q2")];
        assert!(matches!(
            RequirementGraph::build(reqs),
            Err(ConstructionError::DuplicateName { name }) if name == "a"
        ));
    }

    #[test]
    fn dangling_reference_rejected() {
        let reqs = vec![Requirement::new("a", "q").with_branch(1.0, vec!["ghost".into()])];
        assert!(matches!(
            RequirementGraph::build(reqs),
            Err(ConstructionError::DanglingReference { from, to }) if from == "a" && to == "ghost"
        ));
    }

    #[test]
    fn cycle_rejected_with_names() {
        let reqs = vec![
            Requirement::new("a", "q").with_branch(1.0, vec!["b".into()]),
            Requirement::new("b", "q").with_branch(1.0, vec!["a".into()]),
        ];
        match RequirementGraph::build(reqs) {
            Err(ConstructionError::Cycle { names }) => {
                assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn branch_key_outside_modality_rejected() {
        let reqs = vec![
            Requirement::new("a", "q").with_branch(0.5, vec!["b".into()]),
            Requirement::new("b", "q"),
        ];
        assert!(matches!(
            RequirementGraph::build(reqs),
            Err(ConstructionError::InvalidBranchKey { key, .. }) if key == 0.5
        ));
    }

    #[test]
    fn duplicate_branch_key_rejected() {
        let reqs = vec![
            Requirement::new("a", "q")
                .with_branch(1.0, vec!["left".into()])
                .with_branch(1.0, vec!["right".into()]),
            Requirement::new("left", "q"),
            Requirement::new("right", "q"),
        ];
        assert!(matches!(
            RequirementGraph::build(reqs),
            Err(ConstructionError::DuplicateBranchKey { name, key }) if name == "a" && key == 1.0
        ));
    }

    #[test]
    fn discrete_resolution_is_exact() {
        let graph = RequirementGraph::build(linear_chain()).unwrap();
        assert_eq!(
            graph.successors_for("a", 1.0, BucketPolicy::default()),
            &["b".to_string()]
        );
        assert!(graph
            .successors_for("a", 0.0, BucketPolicy::default())
            .is_empty());
    }

    #[test]
    fn continuous_highest_below_picks_floor_bucket() {
        let reqs = vec![
            Requirement::new("a", "q")
                .with_scoring(ScoringKind::Continuous { min: 0.0, max: 1.0 })
                .with_branch(0.0, vec!["low".into()])
                .with_branch(0.5, vec!["mid".into()])
                .with_branch(0.9, vec!["high".into()]),
            Requirement::new("low", "q"),
            Requirement::new("mid", "q"),
            Requirement::new("high", "q"),
        ];
        let graph = RequirementGraph::build(reqs).unwrap();
        assert_eq!(
            graph.successors_for("a", 0.7, BucketPolicy::HighestBelow),
            &["mid".to_string()]
        );
        assert_eq!(
            graph.successors_for("a", 0.95, BucketPolicy::HighestBelow),
            &["high".to_string()]
        );
    }

    #[test]
    fn continuous_nearest_breaks_ties_toward_lower_key() {
        let reqs = vec![
            Requirement::new("a", "q")
                .with_scoring(ScoringKind::Continuous { min: 0.0, max: 1.0 })
                .with_branch(0.0, vec!["low".into()])
                .with_branch(1.0, vec!["high".into()]),
            Requirement::new("low", "q"),
            Requirement::new("high", "q"),
        ];
        let graph = RequirementGraph::build(reqs).unwrap();
        assert_eq!(
            graph.successors_for("a", 0.8, BucketPolicy::Nearest),
            &["high".to_string()]
        );
        // Equidistant: lower key wins.
        assert_eq!(
            graph.successors_for("a", 0.5, BucketPolicy::Nearest),
            &["low".to_string()]
        );
    }

    #[test]
    fn diamond_is_acyclic() {
        let reqs = vec![
            Requirement::new("a", "q").with_branch(1.0, vec!["b".into(), "c".into()]),
            Requirement::new("b", "q").with_branch(1.0, vec!["d".into()]),
            Requirement::new("c", "q").with_branch(1.0, vec!["d".into()]),
            Requirement::new("d", "q"),
        ];
        let graph = RequirementGraph::build(reqs).unwrap();
        assert_eq!(graph.levels().len(), 3);
        assert_eq!(graph.roots().len(), 1);
    }
}
