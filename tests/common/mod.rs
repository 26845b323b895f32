//! Shared stub toolchain fixtures for integration tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use esm_sweep::cases::{Case, CaseId, DistributionSpec, VariableSpec};
use esm_sweep::model::{
    BuildError, ExtractionError, MetricSwitch, ModelArtifact, ModelBuilder, ModelInputs,
    ModelRunner, ResultExtractor, RunStatus,
};
use esm_sweep::results::ResultRow;

/// A fresh, empty project directory under the system temp dir, unique per
/// test so concurrent test binaries never collide.
pub fn temp_project(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("esm_sweep_{}_{name}", std::process::id()));
    if dir.exists() {
        let _ = fs::remove_dir_all(&dir);
    }
    fs::create_dir_all(&dir).expect("create temp project dir");
    dir
}

/// Shared model inputs pointing at nonexistent files; stubs never open them.
pub fn stub_inputs() -> ModelInputs {
    ModelInputs {
        data_db: PathBuf::from("data/data.db"),
        scenario_spec: PathBuf::from("data/scenarios.xlsx"),
    }
}

/// A cost variable with a uniform distribution spanning ±50% of baseline.
pub fn cost_var(tech: &str, variable: &str, baseline: f64) -> VariableSpec {
    VariableSpec {
        category: "cost".to_string(),
        tech: tech.to_string(),
        variable: variable.to_string(),
        baseline,
        distribution: Some(DistributionSpec::Uniform {
            low: baseline * 0.5,
            high: baseline * 1.5,
        }),
    }
}

/// Builder stub: always succeeds, naming artifacts the way the real
/// toolchain does but touching nothing on disk.
pub struct StubBuilder;

impl ModelBuilder for StubBuilder {
    fn build(
        &self,
        _inputs: &ModelInputs,
        _scenario: &str,
        unique_name: &str,
        _overrides: Option<&Case>,
        out_dir: &Path,
    ) -> Result<ModelArtifact, BuildError> {
        Ok(ModelArtifact {
            name: unique_name.to_string(),
            model_path: out_dir.join(format!("{unique_name}.dat")),
            output_db: out_dir.join(format!("{unique_name}.sqlite")),
        })
    }
}

/// Builder stub that rejects every case, as a malformed scenario would.
pub struct FailingBuilder;

impl ModelBuilder for FailingBuilder {
    fn build(
        &self,
        _inputs: &ModelInputs,
        _scenario: &str,
        unique_name: &str,
        _overrides: Option<&Case>,
        _out_dir: &Path,
    ) -> Result<ModelArtifact, BuildError> {
        Err(BuildError {
            model: unique_name.to_string(),
            message: "scenario sheet is missing".to_string(),
        })
    }
}

/// Runner stub: solves everything except the listed model names.
pub struct StubRunner {
    pub fail_models: Vec<String>,
}

impl StubRunner {
    pub fn solving_all() -> Self {
        Self {
            fail_models: Vec::new(),
        }
    }
}

impl ModelRunner for StubRunner {
    fn run(
        &self,
        artifact: &ModelArtifact,
        _solver: Option<&str>,
        _out_dir: &Path,
        _save_spreadsheet: bool,
    ) -> RunStatus {
        if self.fail_models.iter().any(|m| *m == artifact.name) {
            RunStatus::Failed("solver reported infeasible".to_string())
        } else {
            RunStatus::Solved
        }
    }
}

/// Extractor stub: emits a single LCOE row per case, with per-scenario
/// values where configured.
pub struct LcoeExtractor {
    pub by_scenario: HashMap<String, f64>,
    pub default_value: f64,
}

impl LcoeExtractor {
    pub fn constant(value: f64) -> Self {
        Self {
            by_scenario: HashMap::new(),
            default_value: value,
        }
    }
}

impl ResultExtractor for LcoeExtractor {
    fn analyze(
        &self,
        _out_dir: &Path,
        _artifact: &ModelArtifact,
        scenario: &str,
        case: &CaseId,
        _switch: MetricSwitch,
        _tod_breakdown: bool,
    ) -> Result<Vec<ResultRow>, ExtractionError> {
        let value = self
            .by_scenario
            .get(scenario)
            .copied()
            .unwrap_or(self.default_value);
        Ok(vec![ResultRow {
            case: case.clone(),
            scenario: scenario.to_string(),
            quantity: "LCOE".to_string(),
            tech: None,
            period: None,
            value,
        }])
    }
}
