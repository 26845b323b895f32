//! Subprocess-backed implementation of the model toolchain interfaces.
//!
//! Each build, solve, and extract step invokes a configured external
//! program in its own child process. The solver is assumed non-reentrant,
//! so the process boundary is the isolation boundary: a crashing solve is
//! an exit status captured by one task, never a crash of the sweep itself.
//! Every invocation works under the run's unique model name, so concurrent
//! children never collide on disk.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::cases::{Case, CaseId};
use crate::model::{
    BuildError, ExtractionError, MetricSwitch, ModelArtifact, ModelBuilder, ModelInputs,
    ModelRunner, ResultExtractor, RunStatus,
};
use crate::results::ResultRow;

/// External programs implementing the three toolchain steps.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    pub build_cmd: PathBuf,
    pub run_cmd: PathBuf,
    pub analyze_cmd: PathBuf,
}

impl CommandToolchain {
    pub fn new(
        build_cmd: impl Into<PathBuf>,
        run_cmd: impl Into<PathBuf>,
        analyze_cmd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            build_cmd: build_cmd.into(),
            run_cmd: run_cmd.into(),
            analyze_cmd: analyze_cmd.into(),
        }
    }
}

/// First informative stderr line, or the exit status if stderr was silent.
fn failure_summary(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("exited with {}", output.status))
}

impl ModelBuilder for CommandToolchain {
    fn build(
        &self,
        inputs: &ModelInputs,
        scenario: &str,
        unique_name: &str,
        overrides: Option<&Case>,
        out_dir: &Path,
    ) -> Result<ModelArtifact, BuildError> {
        let mut cmd = Command::new(&self.build_cmd);
        cmd.arg("--data")
            .arg(&inputs.data_db)
            .arg("--scenario-spec")
            .arg(&inputs.scenario_spec)
            .arg("--scenario")
            .arg(scenario)
            .arg("--name")
            .arg(unique_name)
            .arg("--out")
            .arg(out_dir);
        if let Some(case) = overrides {
            for p in &case.perturbations {
                cmd.arg("--set").arg(format!("{}={}", p.key(), p.value));
            }
        }

        let output = cmd.output().map_err(|e| BuildError {
            model: unique_name.to_string(),
            message: format!("failed to launch `{}`: {e}", self.build_cmd.display()),
        })?;
        if !output.status.success() {
            return Err(BuildError {
                model: unique_name.to_string(),
                message: failure_summary(&output),
            });
        }

        Ok(ModelArtifact {
            name: unique_name.to_string(),
            model_path: out_dir.join(format!("{unique_name}.dat")),
            output_db: out_dir.join(format!("{unique_name}.sqlite")),
        })
    }
}

impl ModelRunner for CommandToolchain {
    fn run(
        &self,
        artifact: &ModelArtifact,
        solver: Option<&str>,
        out_dir: &Path,
        save_spreadsheet: bool,
    ) -> RunStatus {
        let mut cmd = Command::new(&self.run_cmd);
        cmd.arg("--model")
            .arg(&artifact.model_path)
            .arg("--out")
            .arg(out_dir);
        if let Some(solver) = solver {
            cmd.arg("--solver").arg(solver);
        }
        if save_spreadsheet {
            cmd.arg("--save-excel");
        }

        match cmd.output() {
            Ok(output) if output.status.success() => RunStatus::Solved,
            Ok(output) => RunStatus::Failed(failure_summary(&output)),
            Err(e) => RunStatus::Failed(format!(
                "failed to launch `{}`: {e}",
                self.run_cmd.display()
            )),
        }
    }
}

impl ResultExtractor for CommandToolchain {
    fn analyze(
        &self,
        out_dir: &Path,
        artifact: &ModelArtifact,
        scenario: &str,
        case: &CaseId,
        switch: MetricSwitch,
        tod_breakdown: bool,
    ) -> Result<Vec<ResultRow>, ExtractionError> {
        let mut cmd = Command::new(&self.analyze_cmd);
        cmd.arg("--db")
            .arg(&artifact.output_db)
            .arg("--out")
            .arg(out_dir)
            .arg("--scenario")
            .arg(scenario)
            .arg("--case")
            .arg(case.to_string())
            .arg("--switch")
            .arg(switch.as_str());
        if tod_breakdown {
            cmd.arg("--tod");
        }

        let output = cmd.output().map_err(|e| ExtractionError {
            db: artifact.name.clone(),
            message: format!("failed to launch `{}`: {e}", self.analyze_cmd.display()),
        })?;
        if !output.status.success() {
            return Err(ExtractionError {
                db: artifact.name.clone(),
                message: failure_summary(&output),
            });
        }

        parse_result_rows(&output.stdout, scenario, case).map_err(|message| ExtractionError {
            db: artifact.name.clone(),
            message,
        })
    }
}

/// Parses the analyze command's stdout, expected as CSV with columns
/// `quantity,tech,period,value`. `tech` and `period` may be blank.
fn parse_result_rows(
    stdout: &[u8],
    scenario: &str,
    case: &CaseId,
) -> Result<Vec<ResultRow>, String> {
    let mut rdr = csv::ReaderBuilder::new().from_reader(stdout);
    let headers = rdr.headers().map_err(|e| e.to_string())?.clone();
    let col = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| format!("missing `{name}` column in analyze output"))
    };
    let q = col("quantity")?;
    let t = col("tech")?;
    let p = col("period")?;
    let v = col("value")?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| e.to_string())?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let tech = field(t);
        let period = field(p);
        let value: f64 = field(v)
            .parse()
            .map_err(|_| format!("bad value `{}` for quantity `{}`", field(v), field(q)))?;

        rows.push(ResultRow {
            case: case.clone(),
            scenario: scenario.to_string(),
            quantity: field(q).to_string(),
            tech: if tech.is_empty() {
                None
            } else {
                Some(tech.to_string())
            },
            period: if period.is_empty() {
                None
            } else {
                Some(period.parse().map_err(|_| {
                    format!("bad period `{period}` for quantity `{}`", field(q))
                })?)
            },
            value,
        });
    }
    if rows.is_empty() {
        return Err("analyze output contained no result rows".to_string());
    }
    Ok(rows)
}
