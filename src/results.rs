//! Result rows, per-case outcomes, and the aggregate sweep table.
//!
//! Results use a long format: one row per (case, quantity, tech, period)
//! with a single `value` column, matching the shape of the per-sweep CSV
//! files downstream plotting consumes. Every row is self-describing via its
//! case and scenario fields, so collection order carries no meaning.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::cases::{CaseId, Perturbation, SensitivityTag};

/// Discriminator values the extractor emits; the aggregator splits combined
/// tables on this column.
pub const QUANTITY_COLUMN: &str = "quantity";

/// One extracted metric value, tagged with full case identity.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub case: CaseId,
    pub scenario: String,
    /// Metric name, e.g. `"LCOE"`, `"costs_by_year"`, `"capacity_by_year"`.
    pub quantity: String,
    /// Output technology or fuel the value belongs to, where applicable.
    pub tech: Option<String>,
    /// Model period (year) the value belongs to, where applicable.
    pub period: Option<u32>,
    pub value: f64,
}

/// Per-case result: either the extracted rows or an explicit failure.
///
/// Failures are tagged here rather than silently NaN-filled; NaN appears
/// only at the CSV boundary, where a failed case renders as one row with
/// all identifying columns populated and NaN in the value column.
#[derive(Debug, Clone)]
pub enum CaseStatus {
    Completed(Vec<ResultRow>),
    Failed(String),
}

/// Everything collected for one dispatched case.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub case: CaseId,
    pub scenario: String,
    /// Model file stem this case ran under, kept as provenance.
    pub model_name: String,
    pub tag: Option<SensitivityTag>,
    pub perturbations: Vec<Perturbation>,
    pub status: CaseStatus,
}

impl CaseOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, CaseStatus::Failed(_))
    }
}

/// Which kind of sweep a table belongs to; decides the output directory,
/// file naming, and which identity columns the CSV carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    Baseline,
    Sensitivity,
    MonteCarlo,
}

impl SweepKind {
    /// Subdirectory the sweep's tables are written to.
    pub fn dir_name(self) -> &'static str {
        match self {
            SweepKind::Baseline => "results",
            SweepKind::Sensitivity => "sensitivity",
            SweepKind::MonteCarlo => "monte_carlo",
        }
    }

    pub fn file_prefix(self) -> &'static str {
        match self {
            SweepKind::Baseline => "BaselineResults",
            SweepKind::Sensitivity => "SensitivityResults",
            SweepKind::MonteCarlo => "MonteCarloResults",
        }
    }

    /// Short tag used inside unique model names.
    pub fn model_tag(self) -> &'static str {
        match self {
            SweepKind::Baseline => "Base",
            SweepKind::Sensitivity => "Sens",
            SweepKind::MonteCarlo => "MC",
        }
    }
}

/// Append-only sequence of case outcomes for one sweep: exactly one outcome
/// per dispatched case, in collection order.
#[derive(Debug, Clone)]
pub struct AggregateTable {
    pub kind: SweepKind,
    /// Label used in the output file name, e.g. the scenario name plus the
    /// sweep suffix.
    pub label: String,
    pub outcomes: Vec<CaseOutcome>,
}

impl AggregateTable {
    pub fn new(kind: SweepKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn completed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_failed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    /// Output file name by convention: `<Kind>Results_<label>.csv`.
    pub fn file_name(&self) -> String {
        format!("{}_{}.csv", self.kind.file_prefix(), self.label)
    }

    /// Sorted union of perturbation column keys across all outcomes.
    fn perturbation_columns(&self) -> Vec<String> {
        let mut keys = BTreeSet::new();
        for outcome in &self.outcomes {
            for p in &outcome.perturbations {
                keys.insert(p.key());
            }
        }
        keys.into_iter().collect()
    }

    /// Writes the table as CSV.
    ///
    /// All kinds share the identity columns
    /// `case,scenario,db,quantity,tech,period,value`. Sensitivity tables add
    /// the perturbed-variable identity (`category,var_tech,var_name,
    /// multiplier`); Monte Carlo tables add one column per perturbation
    /// variable carrying the value actually applied, for later regression
    /// analysis. Failed cases render as a single row with NaN in `value`.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if writing fails.
    pub fn write_csv<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut wtr = csv::WriterBuilder::new().from_writer(writer);

        let mut header = vec![
            "case".to_string(),
            "scenario".to_string(),
            "db".to_string(),
            QUANTITY_COLUMN.to_string(),
            "tech".to_string(),
            "period".to_string(),
            "value".to_string(),
        ];
        if self.kind == SweepKind::Sensitivity {
            for col in ["category", "var_tech", "var_name", "multiplier"] {
                header.push(col.to_string());
            }
        }
        let perturbation_cols = if self.kind == SweepKind::MonteCarlo {
            self.perturbation_columns()
        } else {
            Vec::new()
        };
        header.extend(perturbation_cols.iter().cloned());
        wtr.write_record(&header)?;

        for outcome in &self.outcomes {
            match &outcome.status {
                CaseStatus::Completed(rows) => {
                    for row in rows {
                        let record = self.record_for(
                            outcome,
                            &row.case,
                            &row.scenario,
                            &row.quantity,
                            row.tech.as_deref(),
                            row.period,
                            row.value,
                            &perturbation_cols,
                        );
                        wtr.write_record(&record)?;
                    }
                }
                CaseStatus::Failed(_) => {
                    // Sentinel row: full identity, NaN metric.
                    let record = self.record_for(
                        outcome,
                        &outcome.case,
                        &outcome.scenario,
                        "",
                        None,
                        None,
                        f64::NAN,
                        &perturbation_cols,
                    );
                    wtr.write_record(&record)?;
                }
            }
        }
        wtr.flush()
    }

    #[expect(clippy::too_many_arguments)]
    fn record_for(
        &self,
        outcome: &CaseOutcome,
        case: &CaseId,
        scenario: &str,
        quantity: &str,
        tech: Option<&str>,
        period: Option<u32>,
        value: f64,
        perturbation_cols: &[String],
    ) -> Vec<String> {
        let mut record = vec![
            case.to_string(),
            scenario.to_string(),
            outcome.model_name.clone(),
            quantity.to_string(),
            tech.unwrap_or_default().to_string(),
            period.map(|p| p.to_string()).unwrap_or_default(),
            value.to_string(),
        ];
        if self.kind == SweepKind::Sensitivity {
            let tag = outcome.tag.as_ref();
            record.push(tag.map(|t| t.category.clone()).unwrap_or_default());
            record.push(tag.map(|t| t.tech.clone()).unwrap_or_default());
            record.push(tag.map(|t| t.variable.clone()).unwrap_or_default());
            record.push(tag.map(|t| t.multiplier_pct.to_string()).unwrap_or_default());
        }
        for col in perturbation_cols {
            let value = outcome
                .perturbations
                .iter()
                .find(|p| p.key() == *col)
                .map(|p| p.value.to_string())
                .unwrap_or_default();
            record.push(value);
        }
        record
    }

    /// Writes the table to `<dir>/<Kind>Results_<label>.csv` and returns the
    /// path written.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if file creation or writing fails.
    pub fn write_to_dir(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(self.file_name());
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        self.write_csv(&mut writer)?;
        writer.flush()?;
        Ok(path)
    }
}

/// Project directory layout, threaded explicitly through every build, run,
/// and extract call instead of relying on the process working directory.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub project: PathBuf,
}

impl ProjectPaths {
    pub fn new(project: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
        }
    }

    /// Per-case model artifacts and solved output stores live here.
    pub fn databases(&self) -> PathBuf {
        self.project.join("databases")
    }

    /// Per-sweep result tables for the given kind.
    pub fn sweep_dir(&self, kind: SweepKind) -> PathBuf {
        self.project.join(kind.dir_name())
    }

    /// Creates the directories a sweep writes into. Done once, before
    /// dispatch, so concurrent tasks never race on directory creation.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if a directory cannot be created.
    pub fn ensure_layout(&self, kind: SweepKind) -> io::Result<()> {
        fs::create_dir_all(self.databases())?;
        fs::create_dir_all(self.sweep_dir(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::Perturbation;

    fn lcoe_row(case: usize, scenario: &str, value: f64) -> ResultRow {
        ResultRow {
            case: CaseId::Index(case),
            scenario: scenario.to_string(),
            quantity: "LCOE".to_string(),
            tech: None,
            period: None,
            value,
        }
    }

    fn completed_outcome(case: usize, scenario: &str, value: f64) -> CaseOutcome {
        CaseOutcome {
            case: CaseId::Index(case),
            scenario: scenario.to_string(),
            model_name: format!("{scenario}_MC_{case}"),
            tag: None,
            perturbations: vec![Perturbation {
                category: "cost".to_string(),
                tech: "EC_DAC".to_string(),
                variable: "CostInvest".to_string(),
                baseline: 2500.0,
                value: 2600.0,
            }],
            status: CaseStatus::Completed(vec![lcoe_row(case, scenario, value)]),
        }
    }

    #[test]
    fn monte_carlo_header_includes_perturbation_columns() {
        let mut table = AggregateTable::new(SweepKind::MonteCarlo, "default_all");
        table.outcomes.push(completed_outcome(0, "all", 42.0));

        let mut out = Vec::new();
        table.write_csv(&mut out).expect("csv export should succeed");
        let csv = String::from_utf8(out).expect("valid UTF-8");
        let header = csv.lines().next().unwrap_or("");
        assert_eq!(
            header,
            "case,scenario,db,quantity,tech,period,value,EC_DAC-CostInvest"
        );
    }

    #[test]
    fn failed_case_renders_single_nan_row_with_identity() {
        let mut table = AggregateTable::new(SweepKind::MonteCarlo, "default_all");
        table.outcomes.push(completed_outcome(0, "all", 42.0));
        let mut failed = completed_outcome(1, "all", 0.0);
        failed.status = CaseStatus::Failed("solver exited with status 1".to_string());
        table.outcomes.push(failed);

        assert_eq!(table.completed_count(), 1);
        assert_eq!(table.failed_count(), 1);

        let mut out = Vec::new();
        table.write_csv(&mut out).expect("csv export should succeed");
        let csv = String::from_utf8(out).expect("valid UTF-8");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);

        let failed_row = lines[2];
        let fields: Vec<&str> = failed_row.split(',').collect();
        assert_eq!(fields[0], "1");
        assert_eq!(fields[1], "all");
        assert_eq!(fields[6], "NaN");
        // Perturbed value still recorded for the failed case.
        assert_eq!(fields[7], "2600");
        let parsed: f64 = fields[6].parse().expect("NaN parses back");
        assert!(parsed.is_nan());
    }

    #[test]
    fn sensitivity_header_carries_perturbed_variable_identity() {
        let mut table = AggregateTable::new(SweepKind::Sensitivity, "wEmerg_wFossil");
        let mut outcome = completed_outcome(0, "wEmerg_wFossil", 55.0);
        outcome.tag = Some(SensitivityTag {
            category: "cost".to_string(),
            tech: "EC_DAC".to_string(),
            variable: "CostInvest".to_string(),
            multiplier_pct: -10.0,
        });
        table.outcomes.push(outcome);

        let mut out = Vec::new();
        table.write_csv(&mut out).expect("csv export should succeed");
        let csv = String::from_utf8(out).expect("valid UTF-8");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "case,scenario,db,quantity,tech,period,value,category,var_tech,var_name,multiplier"
        );
        let fields: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(fields[8], "EC_DAC");
        assert_eq!(fields[10], "-10");
    }

    #[test]
    fn file_name_follows_kind_convention() {
        let table = AggregateTable::new(SweepKind::Sensitivity, "wEmerg_wFossil");
        assert_eq!(table.file_name(), "SensitivityResults_wEmerg_wFossil.csv");
        let table = AggregateTable::new(SweepKind::Baseline, "combined_2050");
        assert_eq!(table.file_name(), "BaselineResults_combined_2050.csv");
    }

    #[test]
    fn project_paths_keep_kinds_separate() {
        let paths = ProjectPaths::new("/tmp/project");
        assert!(paths.databases().ends_with("databases"));
        assert!(paths.sweep_dir(SweepKind::MonteCarlo).ends_with("monte_carlo"));
        assert!(paths.sweep_dir(SweepKind::Baseline).ends_with("results"));
    }
}
