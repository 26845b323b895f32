//! Interfaces to the external model toolchain: build, run, extract.
//!
//! The optimization engine itself is an external collaborator. These traits
//! describe the three calls the sweep orchestrator makes per case; the
//! production implementation lives in [`crate::toolchain`], and tests
//! substitute in-memory stubs.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::cases::{Case, CaseId};
use crate::results::ResultRow;

/// Shared model input data, already converted to the engine's database form.
#[derive(Debug, Clone)]
pub struct ModelInputs {
    /// The universal input database consumed by every build.
    pub data_db: PathBuf,
    /// Spreadsheet declaring which technologies each scenario activates.
    pub scenario_spec: PathBuf,
}

/// A runnable model produced by one build, named uniquely per case.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    /// Unique model name; doubles as the file stem of every per-case
    /// artifact, so concurrent tasks never collide on disk.
    pub name: String,
    /// The built model file under `databases/`.
    pub model_path: PathBuf,
    /// The output store the solver writes next to the model.
    pub output_db: PathBuf,
}

/// Whether extraction groups capacity/activity rows by technology or fuel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricSwitch {
    Tech,
    Fuel,
}

impl MetricSwitch {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricSwitch::Tech => "tech",
            MetricSwitch::Fuel => "fuel",
        }
    }
}

/// The unit of work for one case: everything needed to build, solve, and
/// extract one model variant. Constructed by the orchestrator immediately
/// before dispatch and discarded once its outcome is collected.
#[derive(Debug, Clone)]
pub struct RunDescriptor {
    pub scenario: String,
    pub case: Case,
    /// Unique model name for this run's file namespace.
    pub model_name: String,
}

/// Malformed scenario or case input; fatal to the whole sweep.
#[derive(Debug, Clone)]
pub struct BuildError {
    pub model: String,
    pub message: String,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "build error for `{}`: {}", self.model, self.message)
    }
}

impl std::error::Error for BuildError {}

/// Outcome of one solver invocation. Infeasibility, non-convergence, and
/// solver crashes are all reported as `Failed`, never as a panic or `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Solved,
    Failed(String),
}

impl RunStatus {
    pub fn is_solved(&self) -> bool {
        matches!(self, RunStatus::Solved)
    }
}

/// The output store is missing expected tables or cannot be read.
#[derive(Debug, Clone)]
pub struct ExtractionError {
    pub db: String,
    pub message: String,
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "extraction error for `{}`: {}", self.db, self.message)
    }
}

impl std::error::Error for ExtractionError {}

/// Builds a runnable model artifact for one (inputs, scenario, case) triple.
pub trait ModelBuilder: Sync {
    /// # Errors
    ///
    /// Returns a `BuildError` on malformed scenario or case input. Build
    /// errors abort the whole sweep.
    fn build(
        &self,
        inputs: &ModelInputs,
        scenario: &str,
        unique_name: &str,
        overrides: Option<&Case>,
        out_dir: &Path,
    ) -> Result<ModelArtifact, BuildError>;
}

/// Executes a built model, optionally selecting a solver.
pub trait ModelRunner: Sync {
    fn run(
        &self,
        artifact: &ModelArtifact,
        solver: Option<&str>,
        out_dir: &Path,
        save_spreadsheet: bool,
    ) -> RunStatus;
}

/// Reads a completed model's output store into structured result rows.
pub trait ResultExtractor: Sync {
    /// # Errors
    ///
    /// Returns an `ExtractionError` when the output store is missing
    /// expected tables. The orchestrator degrades this to a failed-case
    /// outcome rather than aborting the sweep.
    fn analyze(
        &self,
        out_dir: &Path,
        artifact: &ModelArtifact,
        scenario: &str,
        case: &CaseId,
        switch: MetricSwitch,
        tod_breakdown: bool,
    ) -> Result<Vec<ResultRow>, ExtractionError>;
}
