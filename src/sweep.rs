//! The sweep orchestrator: fan-out of build/run/extract units over a
//! fixed-size worker pool.
//!
//! Each case is an isolated unit of work. A failed solve or a broken output
//! store degrades to a tagged failure outcome and never aborts the sweep;
//! only build and configuration errors are fatal, because they indicate a
//! systemic input problem rather than a per-case one. The external solver
//! always executes in its own child process (see [`crate::toolchain`]), so
//! a crashing run cannot take sibling tasks or the orchestrator with it.

use std::env;
use std::fmt;
use std::io;
use std::thread;

use rayon::prelude::*;

use crate::cases::{CaseId, CaseTable};
use crate::model::{
    BuildError, MetricSwitch, ModelBuilder, ModelInputs, ModelRunner, ResultExtractor,
    RunDescriptor, RunStatus,
};
use crate::results::{AggregateTable, CaseOutcome, CaseStatus, ProjectPaths, SweepKind};

/// Environment variable carrying the worker-pool size for scheduled jobs.
pub const WORKERS_ENV: &str = "ESM_SWEEP_PROCS";

/// Errors fatal to a whole sweep.
#[derive(Debug)]
pub enum SweepError {
    Build(BuildError),
    Pool(String),
    Io(io::Error),
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepError::Build(e) => write!(f, "{e}"),
            SweepError::Pool(msg) => write!(f, "worker pool error: {msg}"),
            SweepError::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for SweepError {}

impl From<BuildError> for SweepError {
    fn from(e: BuildError) -> Self {
        SweepError::Build(e)
    }
}

impl From<io::Error> for SweepError {
    fn from(e: io::Error) -> Self {
        SweepError::Io(e)
    }
}

/// Per-sweep execution options.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Explicit worker-pool size; `None` consults [`WORKERS_ENV`] and falls
    /// back to all cores but one.
    pub workers: Option<usize>,
    /// Solver name handed to the runner; `None` lets the engine pick.
    pub solver: Option<String>,
    pub metric_switch: MetricSwitch,
    /// Include time-of-day activity breakdown in extraction.
    pub tod_breakdown: bool,
    /// Ask the runner to also save a spreadsheet rendering of the output.
    pub save_spreadsheet: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            workers: None,
            solver: None,
            metric_switch: MetricSwitch::Tech,
            tod_breakdown: true,
            save_spreadsheet: false,
        }
    }
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Resolves the worker-pool size from an explicit override, the
/// [`WORKERS_ENV`] variable, or the all-cores-but-one default, in that
/// order of precedence.
pub fn worker_count(explicit: Option<usize>) -> usize {
    worker_count_from(explicit, env::var(WORKERS_ENV).ok().as_deref())
}

// An unreadable or garbage environment value silently falls back to the
// default, preserving the long-standing behavior of scheduled runs.
fn worker_count_from(explicit: Option<usize>, env_value: Option<&str>) -> usize {
    if let Some(n) = explicit {
        return n.max(1);
    }
    env_value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(default_workers)
}

/// Label for a sweep's persisted table, and therefore its file name.
///
/// Monte Carlo labels prefix the sweep suffix (`<suffix>_<scenario>`) and
/// baseline labels append it (`<scenario>_<suffix>`), so two sweeps with
/// different suffixes over the same scenario never overwrite each other's
/// files and the combine manifest can stamp per-file provenance.
/// Sensitivity tables keep the bare scenario name.
pub fn table_label(kind: SweepKind, scenario: &str, suffix: &str) -> String {
    match kind {
        SweepKind::Sensitivity => scenario.to_string(),
        SweepKind::MonteCarlo => format!("{suffix}_{scenario}"),
        SweepKind::Baseline => format!("{scenario}_{suffix}"),
    }
}

/// Builds one run descriptor per case for a single-scenario sweep.
///
/// Model names follow the original conventions:
/// `<scenario>_Sens_<k>` for sensitivity, `<label>_<scenario>_<k>` for
/// Monte Carlo.
pub fn plan_runs(
    kind: SweepKind,
    scenario: &str,
    label: &str,
    cases: &CaseTable,
) -> Vec<RunDescriptor> {
    cases
        .cases
        .iter()
        .map(|case| {
            let model_name = match kind {
                SweepKind::Sensitivity => format!("{scenario}_{}_{}", kind.model_tag(), case.id),
                SweepKind::MonteCarlo => format!("{label}_{scenario}_{}", case.id),
                SweepKind::Baseline => format!("{}_{label}", case.id),
            };
            RunDescriptor {
                scenario: scenario.to_string(),
                case: case.clone(),
                model_name,
            }
        })
        .collect()
}

/// Builds one run descriptor per scenario for a baseline sweep, where each
/// case *is* a scenario and carries no perturbations.
pub fn plan_baseline_runs(scenarios: &[String], label: &str) -> Vec<RunDescriptor> {
    CaseTable::baseline(scenarios)
        .cases
        .into_iter()
        .map(|case| {
            let scenario = match &case.id {
                CaseId::Name(n) => n.clone(),
                CaseId::Index(n) => n.to_string(),
            };
            RunDescriptor {
                model_name: format!("{scenario}_{label}"),
                scenario,
                case,
            }
        })
        .collect()
}

/// Executes every dispatched run on a fixed-size worker pool and collects
/// one outcome per run into an aggregate table.
///
/// The call returns only once every dispatched task has returned; there is
/// no per-task timeout and no automatic retry. Outcomes are collected in an
/// order that must not be relied upon — every row is self-describing.
///
/// # Errors
///
/// Returns a `SweepError` if the pool cannot be built or any case fails to
/// build (a systemic input problem). Run and extraction failures are
/// recorded in the table instead.
pub fn run_sweep<B, R, E>(
    kind: SweepKind,
    label: &str,
    runs: Vec<RunDescriptor>,
    inputs: &ModelInputs,
    builder: &B,
    runner: &R,
    extractor: &E,
    paths: &ProjectPaths,
    opts: &SweepOptions,
) -> Result<AggregateTable, SweepError>
where
    B: ModelBuilder,
    R: ModelRunner,
    E: ResultExtractor,
{
    let workers = worker_count(opts.workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| SweepError::Pool(e.to_string()))?;

    let outcomes: Result<Vec<CaseOutcome>, BuildError> = pool.install(|| {
        runs.par_iter()
            .map(|run| evaluate_run(run, inputs, builder, runner, extractor, paths, opts))
            .collect()
    });

    Ok(AggregateTable {
        kind,
        label: label.to_string(),
        outcomes: outcomes?,
    })
}

/// One isolated unit of work: build, run, and (if the run succeeded)
/// extract. Run and extraction failures degrade to a failed outcome.
fn evaluate_run<B, R, E>(
    run: &RunDescriptor,
    inputs: &ModelInputs,
    builder: &B,
    runner: &R,
    extractor: &E,
    paths: &ProjectPaths,
    opts: &SweepOptions,
) -> Result<CaseOutcome, BuildError>
where
    B: ModelBuilder,
    R: ModelRunner,
    E: ResultExtractor,
{
    let out_dir = paths.databases();
    let overrides = if run.case.perturbations.is_empty() {
        None
    } else {
        Some(&run.case)
    };

    let artifact = builder.build(
        inputs,
        &run.scenario,
        &run.model_name,
        overrides,
        &out_dir,
    )?;

    let status = match runner.run(
        &artifact,
        opts.solver.as_deref(),
        &out_dir,
        opts.save_spreadsheet,
    ) {
        RunStatus::Solved => match extractor.analyze(
            &out_dir,
            &artifact,
            &run.scenario,
            &run.case.id,
            opts.metric_switch,
            opts.tod_breakdown,
        ) {
            Ok(rows) => CaseStatus::Completed(rows),
            Err(e) => CaseStatus::Failed(e.to_string()),
        },
        RunStatus::Failed(reason) => CaseStatus::Failed(reason),
    };

    Ok(outcome_for(run, status))
}

fn outcome_for(run: &RunDescriptor, status: CaseStatus) -> CaseOutcome {
    CaseOutcome {
        case: run.case.id.clone(),
        scenario: run.scenario.clone(),
        model_name: run.model_name.clone(),
        tag: run.case.tag.clone(),
        perturbations: run.case.perturbations.clone(),
        status,
    }
}
