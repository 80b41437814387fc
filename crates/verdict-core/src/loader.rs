//! YAML authoring format for requirement sets and scenarios.
//!
//! Files wrap their payload in a single top-level key (`requirements:`,
//! `scenario:` or `scenarios:`) so a misplaced file fails loudly instead of
//! deserializing as an empty document.

use crate::errors::ConstructionError;
use crate::model::{Requirement, Scenario};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct RequirementsDoc {
    requirements: Vec<Requirement>,
}

#[derive(Serialize, Deserialize)]
struct ScenarioDoc {
    scenario: Scenario,
}

#[derive(Serialize, Deserialize)]
struct ScenariosDoc {
    scenarios: Vec<Scenario>,
}

fn load_err(path: &Path, detail: impl ToString) -> ConstructionError {
    ConstructionError::Load {
        path: path.display().to_string(),
        detail: detail.to_string(),
    }
}

/// Load a requirement set from a `requirements:` document.
///
/// Only parses; graph validation (cycles, dangling references) happens when
/// the requirements are handed to a rubric.
pub fn load_requirements(path: impl AsRef<Path>) -> Result<Vec<Requirement>, ConstructionError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| load_err(path, e))?;
    let doc: RequirementsDoc = serde_yaml::from_str(&raw).map_err(|e| load_err(path, e))?;
    debug!(path = %path.display(), count = doc.requirements.len(), "loaded requirements");
    Ok(doc.requirements)
}

pub fn save_requirements(
    path: impl AsRef<Path>,
    requirements: &[Requirement],
) -> Result<(), ConstructionError> {
    let path = path.as_ref();
    let doc = RequirementsDoc {
        requirements: requirements.to_vec(),
    };
    let raw = serde_yaml::to_string(&doc).map_err(|e| load_err(path, e))?;
    fs::write(path, raw).map_err(|e| load_err(path, e))
}

/// Load a single scenario from a `scenario:` document.
pub fn load_scenario(path: impl AsRef<Path>) -> Result<Scenario, ConstructionError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| load_err(path, e))?;
    let doc: ScenarioDoc = serde_yaml::from_str(&raw).map_err(|e| load_err(path, e))?;
    Ok(doc.scenario)
}

/// Load a batch of scenarios from a `scenarios:` document.
pub fn load_scenarios(path: impl AsRef<Path>) -> Result<Vec<Scenario>, ConstructionError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| load_err(path, e))?;
    let doc: ScenariosDoc = serde_yaml::from_str(&raw).map_err(|e| load_err(path, e))?;
    debug!(path = %path.display(), count = doc.scenarios.len(), "loaded scenarios");
    Ok(doc.scenarios)
}

pub fn save_scenario(path: impl AsRef<Path>, scenario: &Scenario) -> Result<(), ConstructionError> {
    let path = path.as_ref();
    let doc = ScenarioDoc {
        scenario: scenario.clone(),
    };
    let raw = serde_yaml::to_string(&doc).map_err(|e| load_err(path, e))?;
    fs::write(path, raw).map_err(|e| load_err(path, e))
}
