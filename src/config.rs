//! TOML-based sweep configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::aggregate::SourceSpec;
use crate::cases::VariableSpec;
use crate::model::{MetricSwitch, ModelInputs};
use crate::results::ProjectPaths;
use crate::sweep::SweepOptions;
use crate::toolchain::CommandToolchain;

/// Top-level sweep configuration parsed from TOML.
///
/// All fields have defaults matching the stock project layout. Load from
/// TOML with [`SweepConfig::from_toml_file`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// Sweep sizing, naming, and sampling parameters.
    pub sweep: SweepSection,
    /// Solver selection.
    pub solver: SolverSection,
    /// Project directory layout and shared model inputs.
    pub paths: PathsSection,
    /// External toolchain programs.
    pub toolchain: ToolchainSection,
    /// Perturbation variable declarations.
    pub variables: Vec<VariableSpec>,
    /// Result-combination manifest for the `combine` mode.
    pub combine: CombineSection,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            sweep: SweepSection::default(),
            solver: SolverSection::default(),
            paths: PathsSection::default(),
            toolchain: ToolchainSection::default(),
            variables: Vec::new(),
            combine: CombineSection::default(),
        }
    }
}

/// Sweep sizing, naming, and sampling parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepSection {
    /// Scenario names to sweep, as declared in the scenario spec.
    pub scenarios: Vec<String>,
    /// Suffix woven into model names and result file names, e.g. a
    /// decarbonization year.
    pub label: String,
    /// Number of Monte Carlo cases per scenario.
    pub iterations: usize,
    /// Sensitivity perturbation in percent.
    pub multiplier_pct: f64,
    /// Master random seed for Monte Carlo sampling.
    pub seed: u64,
    /// Worker-pool size; omit to use the environment override or the
    /// all-cores-but-one default.
    pub workers: Option<usize>,
    /// Extraction grouping: `"tech"` or `"fuel"`.
    pub metric_switch: String,
    /// Include time-of-day activity breakdown in extraction.
    pub tod_breakdown: bool,
    /// Ask the runner to save a spreadsheet rendering of each output.
    pub save_spreadsheet: bool,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            scenarios: Vec::new(),
            label: "combined".to_string(),
            iterations: 100,
            multiplier_pct: 10.0,
            seed: 42,
            workers: None,
            metric_switch: "tech".to_string(),
            tod_breakdown: true,
            save_spreadsheet: false,
        }
    }
}

/// Solver selection. An empty name lets the engine pick from what is
/// installed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverSection {
    pub name: String,
}

/// Project directory layout and shared model inputs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsSection {
    /// Root of the project tree; all other paths resolve against it.
    pub project_dir: String,
    /// Universal input database, relative to `project_dir`.
    pub data_db: String,
    /// Scenario spec spreadsheet, relative to `project_dir`.
    pub scenario_spec: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            project_dir: ".".to_string(),
            data_db: "data/data.db".to_string(),
            scenario_spec: "data/scenarios.xlsx".to_string(),
        }
    }
}

/// External toolchain programs invoked per run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainSection {
    pub build: String,
    pub run: String,
    pub analyze: String,
}

impl Default for ToolchainSection {
    fn default() -> Self {
        Self {
            build: "tt-build".to_string(),
            run: "tt-run".to_string(),
            analyze: "tt-analyze".to_string(),
        }
    }
}

/// Result-combination manifest: which saved tables to merge and the
/// provenance column constants to stamp onto each.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CombineSection {
    /// Directory the combined and per-quantity tables are written to,
    /// relative to `project_dir`.
    pub output_dir: String,
    pub sources: Vec<CombineSource>,
}

/// One source table for the `combine` mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombineSource {
    /// Table path, relative to `project_dir`.
    pub file: String,
    /// Constant provenance column values for every row of this source.
    #[serde(default)]
    pub provenance: BTreeMap<String, String>,
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"sweep.iterations"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl SweepConfig {
    /// Parses a sweep configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is
    /// invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a sweep configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown
    /// fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if the configuration is valid. Mode-specific
    /// requirements (non-empty scenarios for run modes, non-empty sources
    /// for combine) are the caller's to check.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.sweep;

        if s.iterations == 0 {
            errors.push(ConfigError {
                field: "sweep.iterations".into(),
                message: "must be > 0".into(),
            });
        }
        if !(s.multiplier_pct.is_finite() && s.multiplier_pct > 0.0) {
            errors.push(ConfigError {
                field: "sweep.multiplier_pct".into(),
                message: "must be a positive percent".into(),
            });
        }
        if s.metric_switch != "tech" && s.metric_switch != "fuel" {
            errors.push(ConfigError {
                field: "sweep.metric_switch".into(),
                message: format!(
                    "must be \"tech\" or \"fuel\", got \"{}\"",
                    s.metric_switch
                ),
            });
        }
        if s.label.is_empty() {
            errors.push(ConfigError {
                field: "sweep.label".into(),
                message: "must not be empty".into(),
            });
        }

        for (i, var) in self.variables.iter().enumerate() {
            if !var.baseline.is_finite() {
                errors.push(ConfigError {
                    field: format!("variables[{i}].baseline"),
                    message: "must be finite".into(),
                });
            }
            if let Some(dist) = &var.distribution {
                if let Err(message) = dist.check() {
                    errors.push(ConfigError {
                        field: format!("variables[{i}].distribution"),
                        message,
                    });
                }
            }
        }

        for (i, source) in self.combine.sources.iter().enumerate() {
            if source.file.is_empty() {
                errors.push(ConfigError {
                    field: format!("combine.sources[{i}].file"),
                    message: "must not be empty".into(),
                });
            }
        }

        errors
    }

    /// Resolved project paths.
    pub fn project_paths(&self) -> ProjectPaths {
        ProjectPaths::new(&self.paths.project_dir)
    }

    /// Shared model inputs, resolved against the project directory.
    pub fn model_inputs(&self) -> ModelInputs {
        let root = PathBuf::from(&self.paths.project_dir);
        ModelInputs {
            data_db: root.join(&self.paths.data_db),
            scenario_spec: root.join(&self.paths.scenario_spec),
        }
    }

    /// The configured external toolchain.
    pub fn command_toolchain(&self) -> CommandToolchain {
        CommandToolchain::new(
            &self.toolchain.build,
            &self.toolchain.run,
            &self.toolchain.analyze,
        )
    }

    /// Extraction grouping; only valid after a clean [`Self::validate`].
    pub fn metric_switch(&self) -> MetricSwitch {
        if self.sweep.metric_switch == "fuel" {
            MetricSwitch::Fuel
        } else {
            MetricSwitch::Tech
        }
    }

    /// Per-sweep execution options derived from this configuration.
    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions {
            workers: self.sweep.workers,
            solver: if self.solver.name.is_empty() {
                None
            } else {
                Some(self.solver.name.clone())
            },
            metric_switch: self.metric_switch(),
            tod_breakdown: self.sweep.tod_breakdown,
            save_spreadsheet: self.sweep.save_spreadsheet,
        }
    }

    /// Combine-mode sources with paths resolved against the project
    /// directory.
    pub fn combine_sources(&self) -> Vec<SourceSpec> {
        let root = PathBuf::from(&self.paths.project_dir);
        self.combine
            .sources
            .iter()
            .map(|s| SourceSpec {
                path: root.join(&s.file),
                provenance: s
                    .provenance
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            })
            .collect()
    }

    /// Combine-mode output directory, resolved against the project
    /// directory. Defaults to `monte_carlo/` when unset.
    pub fn combine_output_dir(&self) -> PathBuf {
        let dir = if self.combine.output_dir.is_empty() {
            "monte_carlo"
        } else {
            &self.combine.output_dir
        };
        PathBuf::from(&self.paths.project_dir).join(dir)
    }
}
