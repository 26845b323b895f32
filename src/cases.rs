//! Case generation for sensitivity and Monte Carlo sweeps.
//!
//! A *case* is one concrete assignment of perturbed parameter values,
//! evaluated as a single model run. Sensitivity mode perturbs one variable
//! at a time by a symmetric multiplier; Monte Carlo mode draws every
//! variable from its declared probability distribution. Generation is pure:
//! persisting the resulting table is the caller's responsibility.

use std::fmt;
use std::io::{self, Write};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Triangular, Uniform};
use serde::Deserialize;

/// Identifier for a single case within a sweep.
///
/// Generated sweeps use dense integer indices (matching the per-run
/// `caseNum` in result tables); baseline sweeps reuse the scenario name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CaseId {
    Index(usize),
    Name(String),
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseId::Index(n) => write!(f, "{n}"),
            CaseId::Name(s) => write!(f, "{s}"),
        }
    }
}

/// One perturbation variable declaration: which model quantity it targets,
/// its baseline value, and (for Monte Carlo mode) its distribution.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableSpec {
    /// Variable category, e.g. `"cost"` or `"performance"`.
    pub category: String,
    /// Technology the variable belongs to, e.g. `"EC_BECCS"`.
    pub tech: String,
    /// Variable name within the technology, e.g. `"CostInvest"`.
    pub variable: String,
    /// Baseline value used when the variable is not perturbed.
    pub baseline: f64,
    /// Probability distribution for Monte Carlo sampling.
    #[serde(default)]
    pub distribution: Option<DistributionSpec>,
}

impl VariableSpec {
    /// Column key used for this variable in case and result tables.
    pub fn key(&self) -> String {
        format!("{}-{}", self.tech, self.variable)
    }
}

/// Declared sampling distribution for one perturbation variable.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum DistributionSpec {
    Uniform { low: f64, high: f64 },
    Triangular { low: f64, mode: f64, high: f64 },
    Normal { mean: f64, std_dev: f64 },
}

impl DistributionSpec {
    /// Checks the declared parameters, returning a description of the first
    /// problem found.
    pub fn check(&self) -> Result<(), String> {
        match self {
            DistributionSpec::Uniform { low, high } => {
                if !(low.is_finite() && high.is_finite()) {
                    return Err("uniform bounds must be finite".to_string());
                }
                if low >= high {
                    return Err(format!("uniform low ({low}) must be < high ({high})"));
                }
            }
            DistributionSpec::Triangular { low, mode, high } => {
                if !(low.is_finite() && mode.is_finite() && high.is_finite()) {
                    return Err("triangular parameters must be finite".to_string());
                }
                if low >= high {
                    return Err(format!("triangular low ({low}) must be < high ({high})"));
                }
                if mode < low || mode > high {
                    return Err(format!(
                        "triangular mode ({mode}) must lie within [{low}, {high}]"
                    ));
                }
            }
            DistributionSpec::Normal { mean, std_dev } => {
                if !(mean.is_finite() && std_dev.is_finite()) {
                    return Err("normal parameters must be finite".to_string());
                }
                if *std_dev <= 0.0 {
                    return Err(format!("normal std_dev ({std_dev}) must be > 0"));
                }
            }
        }
        Ok(())
    }

    fn sample(&self, rng: &mut StdRng) -> Result<f64, String> {
        match self {
            DistributionSpec::Uniform { low, high } => Uniform::new(*low, *high)
                .map(|d| d.sample(rng))
                .map_err(|e| e.to_string()),
            DistributionSpec::Triangular { low, mode, high } => {
                Triangular::new(*low, *high, *mode)
                    .map(|d| d.sample(rng))
                    .map_err(|e| e.to_string())
            }
            DistributionSpec::Normal { mean, std_dev } => Normal::new(*mean, *std_dev)
                .map(|d| d.sample(rng))
                .map_err(|e| e.to_string()),
        }
    }
}

/// A bad or missing perturbation specification. Fatal to the whole sweep.
#[derive(Debug, Clone)]
pub struct ConfigurationError {
    /// The offending variable key (`"TECH-Variable"`), or a generator-level
    /// description when no single variable is at fault.
    pub variable: String,
    pub message: String,
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {} — {}", self.variable, self.message)
    }
}

impl std::error::Error for ConfigurationError {}

/// One concrete perturbed value for one variable of one case.
#[derive(Debug, Clone)]
pub struct Perturbation {
    pub category: String,
    pub tech: String,
    pub variable: String,
    pub baseline: f64,
    /// Value actually applied in this case.
    pub value: f64,
}

impl Perturbation {
    /// Column key used for this perturbation in result tables.
    pub fn key(&self) -> String {
        format!("{}-{}", self.tech, self.variable)
    }

    fn at_baseline(spec: &VariableSpec) -> Self {
        Self {
            category: spec.category.clone(),
            tech: spec.tech.clone(),
            variable: spec.variable.clone(),
            baseline: spec.baseline,
            value: spec.baseline,
        }
    }
}

/// Identifies the single variable a sensitivity case perturbs, and by how
/// much. The multiplier is the signed percent actually applied.
#[derive(Debug, Clone)]
pub struct SensitivityTag {
    pub category: String,
    pub tech: String,
    pub variable: String,
    pub multiplier_pct: f64,
}

/// One fully specified case. Immutable once generated; consumed by exactly
/// one run.
#[derive(Debug, Clone)]
pub struct Case {
    pub id: CaseId,
    /// Every declared variable with the value this case assigns it. The key
    /// set is identical across all cases of one sweep.
    pub perturbations: Vec<Perturbation>,
    /// Present in sensitivity mode only.
    pub tag: Option<SensitivityTag>,
}

/// Which generation mode produced a case table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    Baseline,
    Sensitivity,
    MonteCarlo,
}

/// The ordered set of cases for one sweep.
#[derive(Debug, Clone)]
pub struct CaseTable {
    pub mode: SweepMode,
    pub cases: Vec<Case>,
}

impl CaseTable {
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Builds a baseline table: one unperturbed case per name.
    pub fn baseline(names: &[String]) -> Self {
        let cases = names
            .iter()
            .map(|n| Case {
                id: CaseId::Name(n.clone()),
                perturbations: Vec::new(),
                tag: None,
            })
            .collect();
        Self {
            mode: SweepMode::Baseline,
            cases,
        }
    }

    /// Writes the generated inputs as CSV so a sweep's cases can be audited
    /// and re-analyzed later.
    ///
    /// Sensitivity tables are long format (one row per case); Monte Carlo
    /// tables are wide format (one row per variable, one column per case),
    /// so row `k` across all variables reads off case `k`.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if writing fails.
    pub fn write_inputs_csv<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut wtr = csv::WriterBuilder::new().from_writer(writer);
        match self.mode {
            SweepMode::Sensitivity | SweepMode::Baseline => {
                wtr.write_record(["case", "category", "tech", "variable", "multiplier", "value"])?;
                for case in &self.cases {
                    let tag = case.tag.as_ref();
                    let value = case
                        .perturbations
                        .iter()
                        .find(|p| {
                            tag.is_some_and(|t| p.tech == t.tech && p.variable == t.variable)
                        })
                        .map(|p| p.value);
                    wtr.write_record([
                        case.id.to_string(),
                        tag.map(|t| t.category.clone()).unwrap_or_default(),
                        tag.map(|t| t.tech.clone()).unwrap_or_default(),
                        tag.map(|t| t.variable.clone()).unwrap_or_default(),
                        tag.map(|t| t.multiplier_pct.to_string()).unwrap_or_default(),
                        value.map(|v| v.to_string()).unwrap_or_default(),
                    ])?;
                }
            }
            SweepMode::MonteCarlo => {
                let mut header = vec![
                    "category".to_string(),
                    "tech".to_string(),
                    "variable".to_string(),
                    "baseline".to_string(),
                ];
                for case in &self.cases {
                    header.push(case.id.to_string());
                }
                wtr.write_record(&header)?;

                let n_vars = self.cases.first().map_or(0, |c| c.perturbations.len());
                for v in 0..n_vars {
                    let first = &self.cases[0].perturbations[v];
                    let mut record = vec![
                        first.category.clone(),
                        first.tech.clone(),
                        first.variable.clone(),
                        first.baseline.to_string(),
                    ];
                    for case in &self.cases {
                        record.push(case.perturbations[v].value.to_string());
                    }
                    wtr.write_record(&record)?;
                }
            }
        }
        wtr.flush()
    }
}

fn require_finite_baseline(spec: &VariableSpec) -> Result<(), ConfigurationError> {
    if !spec.baseline.is_finite() {
        return Err(ConfigurationError {
            variable: spec.key(),
            message: format!("baseline value {} is not finite", spec.baseline),
        });
    }
    Ok(())
}

/// Generates sensitivity cases: two symmetric cases per variable, one with
/// the variable at `baseline * (1 + multiplier_pct/100)` and one at
/// `baseline * (1 - multiplier_pct/100)`, all other variables held at
/// baseline.
///
/// # Errors
///
/// Returns a `ConfigurationError` when the multiplier is not a positive
/// finite percentage or a variable's baseline is not finite.
pub fn sensitivity_cases(
    vars: &[VariableSpec],
    multiplier_pct: f64,
) -> Result<CaseTable, ConfigurationError> {
    if !(multiplier_pct.is_finite() && multiplier_pct > 0.0) {
        return Err(ConfigurationError {
            variable: "multiplier".to_string(),
            message: format!(
                "sensitivity multiplier must be a positive percent, got {multiplier_pct}"
            ),
        });
    }
    for spec in vars {
        require_finite_baseline(spec)?;
    }

    let mut cases = Vec::with_capacity(vars.len() * 2);
    for (v, spec) in vars.iter().enumerate() {
        for sign in [1.0_f64, -1.0] {
            let signed_pct = sign * multiplier_pct;
            let mut perturbations: Vec<Perturbation> =
                vars.iter().map(Perturbation::at_baseline).collect();
            perturbations[v].value = spec.baseline * (1.0 + signed_pct / 100.0);

            cases.push(Case {
                id: CaseId::Index(cases.len()),
                perturbations,
                tag: Some(SensitivityTag {
                    category: spec.category.clone(),
                    tech: spec.tech.clone(),
                    variable: spec.variable.clone(),
                    multiplier_pct: signed_pct,
                }),
            });
        }
    }

    Ok(CaseTable {
        mode: SweepMode::Sensitivity,
        cases,
    })
}

/// Generates `n` Monte Carlo cases, drawing every variable independently
/// from its declared distribution. Seeded for reproducibility: the same
/// `(vars, n, seed)` always yields the same table.
///
/// # Errors
///
/// Returns a `ConfigurationError` when a variable has no declared
/// distribution, degenerate distribution parameters, or a non-finite
/// baseline.
pub fn monte_carlo_cases(
    vars: &[VariableSpec],
    n: usize,
    seed: u64,
) -> Result<CaseTable, ConfigurationError> {
    for spec in vars {
        require_finite_baseline(spec)?;
        let dist = spec.distribution.as_ref().ok_or_else(|| ConfigurationError {
            variable: spec.key(),
            message: "no distribution declared for Monte Carlo sampling".to_string(),
        })?;
        dist.check().map_err(|message| ConfigurationError {
            variable: spec.key(),
            message,
        })?;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut cases = Vec::with_capacity(n);
    for k in 0..n {
        let mut perturbations = Vec::with_capacity(vars.len());
        for spec in vars {
            // Checked above, so sampling errors would indicate parameter
            // values rejected by rand_distr but not by check().
            let dist = spec.distribution.as_ref().ok_or_else(|| ConfigurationError {
                variable: spec.key(),
                message: "no distribution declared for Monte Carlo sampling".to_string(),
            })?;
            let value = dist.sample(&mut rng).map_err(|message| ConfigurationError {
                variable: spec.key(),
                message,
            })?;
            let mut p = Perturbation::at_baseline(spec);
            p.value = value;
            perturbations.push(p);
        }
        cases.push(Case {
            id: CaseId::Index(k),
            perturbations,
            tag: None,
        });
    }

    Ok(CaseTable {
        mode: SweepMode::MonteCarlo,
        cases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(tech: &str, variable: &str, baseline: f64) -> VariableSpec {
        VariableSpec {
            category: "cost".to_string(),
            tech: tech.to_string(),
            variable: variable.to_string(),
            baseline,
            distribution: None,
        }
    }

    fn var_with(
        tech: &str,
        variable: &str,
        baseline: f64,
        dist: DistributionSpec,
    ) -> VariableSpec {
        VariableSpec {
            distribution: Some(dist),
            ..var(tech, variable, baseline)
        }
    }

    fn test_vars() -> Vec<VariableSpec> {
        vec![
            var_with(
                "EC_BECCS",
                "CostInvest",
                6874.0,
                DistributionSpec::Triangular {
                    low: 4000.0,
                    mode: 6874.0,
                    high: 9000.0,
                },
            ),
            var_with(
                "EC_DAC",
                "CostInvest",
                2500.0,
                DistributionSpec::Uniform {
                    low: 1000.0,
                    high: 4000.0,
                },
            ),
            var_with(
                "E_OCAES",
                "CostInvest",
                1457.0,
                DistributionSpec::Normal {
                    mean: 1457.0,
                    std_dev: 200.0,
                },
            ),
        ]
    }

    #[test]
    fn sensitivity_produces_two_cases_per_variable() {
        let vars = test_vars();
        let table = sensitivity_cases(&vars, 10.0).expect("generation should succeed");
        assert_eq!(table.len(), 2 * vars.len());
        assert_eq!(table.mode, SweepMode::Sensitivity);
    }

    #[test]
    fn sensitivity_perturbs_exactly_one_variable_per_case() {
        let vars = test_vars();
        let table = sensitivity_cases(&vars, 10.0).expect("generation should succeed");
        for case in &table.cases {
            let off_baseline: Vec<&Perturbation> = case
                .perturbations
                .iter()
                .filter(|p| p.value != p.baseline)
                .collect();
            assert_eq!(off_baseline.len(), 1, "case {} perturbs one variable", case.id);

            let tag = case.tag.as_ref().expect("sensitivity case carries a tag");
            assert_eq!(off_baseline[0].tech, tag.tech);
            assert_eq!(off_baseline[0].variable, tag.variable);
            let expected = off_baseline[0].baseline * (1.0 + tag.multiplier_pct / 100.0);
            assert!((off_baseline[0].value - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn sensitivity_multipliers_are_symmetric() {
        let vars = test_vars();
        let table = sensitivity_cases(&vars, 10.0).expect("generation should succeed");
        let multipliers: Vec<f64> = table
            .cases
            .iter()
            .map(|c| c.tag.as_ref().map(|t| t.multiplier_pct).unwrap_or(0.0))
            .collect();
        // Cases alternate high/low per variable.
        for pair in multipliers.chunks(2) {
            assert_eq!(pair[0], 10.0);
            assert_eq!(pair[1], -10.0);
        }
    }

    #[test]
    fn sensitivity_rejects_non_positive_multiplier() {
        let vars = test_vars();
        assert!(sensitivity_cases(&vars, 0.0).is_err());
        assert!(sensitivity_cases(&vars, -5.0).is_err());
    }

    #[test]
    fn monte_carlo_produces_exactly_n_cases() {
        let vars = test_vars();
        let table = monte_carlo_cases(&vars, 25, 42).expect("generation should succeed");
        assert_eq!(table.len(), 25);
        for (k, case) in table.cases.iter().enumerate() {
            assert_eq!(case.id, CaseId::Index(k));
            assert_eq!(case.perturbations.len(), vars.len());
        }
    }

    #[test]
    fn monte_carlo_samples_stay_in_support() {
        let vars = test_vars();
        let table = monte_carlo_cases(&vars, 200, 7).expect("generation should succeed");
        for case in &table.cases {
            let beccs = &case.perturbations[0];
            assert!(beccs.value >= 4000.0 && beccs.value <= 9000.0);
            let dac = &case.perturbations[1];
            assert!(dac.value >= 1000.0 && dac.value < 4000.0);
            let ocaes = &case.perturbations[2];
            assert!(ocaes.value.is_finite());
        }
    }

    #[test]
    fn monte_carlo_is_deterministic_for_fixed_seed() {
        let vars = test_vars();
        let a = monte_carlo_cases(&vars, 10, 99).expect("first generation");
        let b = monte_carlo_cases(&vars, 10, 99).expect("second generation");
        for (ca, cb) in a.cases.iter().zip(b.cases.iter()) {
            for (pa, pb) in ca.perturbations.iter().zip(cb.perturbations.iter()) {
                assert_eq!(pa.value, pb.value);
            }
        }
    }

    #[test]
    fn monte_carlo_requires_a_distribution() {
        let vars = vec![var("EC_H2", "CostInvest", 5821.55)];
        let err = monte_carlo_cases(&vars, 5, 1).expect_err("must fail");
        assert_eq!(err.variable, "EC_H2-CostInvest");
        assert!(err.message.contains("no distribution"));
    }

    #[test]
    fn monte_carlo_rejects_degenerate_distribution() {
        let vars = vec![var_with(
            "EC_VFB",
            "CostInvest",
            4317.0,
            DistributionSpec::Uniform {
                low: 10.0,
                high: 5.0,
            },
        )];
        let err = monte_carlo_cases(&vars, 5, 1).expect_err("must fail");
        assert!(err.message.contains("low"));
    }

    #[test]
    fn non_finite_baseline_is_rejected() {
        let vars = vec![var("EC_H2", "CostInvest", f64::NAN)];
        assert!(sensitivity_cases(&vars, 10.0).is_err());
    }

    #[test]
    fn monte_carlo_inputs_csv_is_wide_by_case() {
        let vars = test_vars();
        let table = monte_carlo_cases(&vars, 4, 3).expect("generation should succeed");
        let mut out = Vec::new();
        table.write_inputs_csv(&mut out).expect("csv export should succeed");
        let csv = String::from_utf8(out).expect("valid UTF-8");
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("category,tech,variable,baseline,0,1,2,3")
        );
        // One row per declared variable.
        assert_eq!(lines.count(), vars.len());
    }

    #[test]
    fn sensitivity_inputs_csv_is_long_by_case() {
        let vars = test_vars();
        let table = sensitivity_cases(&vars, 10.0).expect("generation should succeed");
        let mut out = Vec::new();
        table.write_inputs_csv(&mut out).expect("csv export should succeed");
        let csv = String::from_utf8(out).expect("valid UTF-8");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "case,category,tech,variable,multiplier,value");
        assert_eq!(lines.len(), 1 + table.len());
    }

    #[test]
    fn baseline_table_names_cases_after_scenarios() {
        let table = CaseTable::baseline(&["wEmerg_wFossil".to_string(), "woEmerg".to_string()]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cases[0].id, CaseId::Name("wEmerg_wFossil".to_string()));
        assert!(table.cases[0].perturbations.is_empty());
    }
}
