//! Sweep harness entry point — CLI wiring and config-driven dispatch.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::process;

use esm_sweep::aggregate;
use esm_sweep::cases::{monte_carlo_cases, sensitivity_cases, CaseTable};
use esm_sweep::config::SweepConfig;
use esm_sweep::results::{AggregateTable, SweepKind};
use esm_sweep::sweep::{plan_baseline_runs, plan_runs, run_sweep, table_label};

/// Parsed CLI arguments.
struct CliArgs {
    config_path: String,
    mode: Option<String>,
    scenario_overrides: Vec<String>,
    workers_override: Option<usize>,
    solver_override: Option<String>,
    seed_override: Option<u64>,
    iterations_override: Option<usize>,
}

fn print_help() {
    eprintln!("esm-sweep — parameter-sweep harness for energy-system models");
    eprintln!();
    eprintln!("Usage: esm-sweep --mode <mode> [OPTIONS]");
    eprintln!();
    eprintln!("Modes:");
    eprintln!("  baseline       Run each configured scenario unperturbed");
    eprintln!("  sensitivity    Perturb each variable by ± the configured percent");
    eprintln!("  monte-carlo    Sample every variable's distribution per case");
    eprintln!("  combine        Merge saved result tables and split by quantity");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>      Sweep configuration TOML (default: sweep.toml)");
    eprintln!("  --scenario <name>    Sweep only this scenario (repeatable)");
    eprintln!("  --workers <n>        Override worker-pool size");
    eprintln!("  --solver <name>      Override solver selection");
    eprintln!("  --seed <u64>         Override Monte Carlo seed");
    eprintln!("  --iterations <n>     Override Monte Carlo case count");
    eprintln!("  --help               Show this help message");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: "sweep.toml".to_string(),
        mode: None,
        scenario_overrides: Vec::new(),
        workers_override: None,
        solver_override: None,
        seed_override: None,
        iterations_override: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --config requires a path argument");
                    process::exit(1);
                }
                cli.config_path = args[i].clone();
            }
            "--mode" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --mode requires a mode argument");
                    process::exit(1);
                }
                cli.mode = Some(args[i].clone());
            }
            "--scenario" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --scenario requires a name argument");
                    process::exit(1);
                }
                cli.scenario_overrides.push(args[i].clone());
            }
            "--workers" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --workers requires a usize argument");
                    process::exit(1);
                }
                if let Ok(n) = args[i].parse::<usize>() {
                    cli.workers_override = Some(n);
                } else {
                    eprintln!("error: --workers value \"{}\" is not a valid usize", args[i]);
                    process::exit(1);
                }
            }
            "--solver" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --solver requires a name argument");
                    process::exit(1);
                }
                cli.solver_override = Some(args[i].clone());
            }
            "--seed" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --seed requires a u64 argument");
                    process::exit(1);
                }
                if let Ok(s) = args[i].parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{}\" is not a valid u64", args[i]);
                    process::exit(1);
                }
            }
            "--iterations" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --iterations requires a usize argument");
                    process::exit(1);
                }
                if let Ok(n) = args[i].parse::<usize>() {
                    cli.iterations_override = Some(n);
                } else {
                    eprintln!(
                        "error: --iterations value \"{}\" is not a valid usize",
                        args[i]
                    );
                    process::exit(1);
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

/// Writes the generated case table next to where its results will land.
fn save_inputs(cfg: &SweepConfig, kind: SweepKind, name: &str, table: &CaseTable) {
    let dir = cfg.project_paths().sweep_dir(kind);
    let path = dir.join(format!("{name}.csv"));
    let result = File::create(&path)
        .and_then(|f| table.write_inputs_csv(BufWriter::new(f)));
    if let Err(e) = result {
        eprintln!("error: failed to write \"{}\": {e}", path.display());
        process::exit(1);
    }
}

/// Writes a finished aggregate table and prints the per-sweep summary.
fn report(cfg: &SweepConfig, table: &AggregateTable) {
    let dir = cfg.project_paths().sweep_dir(table.kind);
    match table.write_to_dir(&dir) {
        Ok(path) => {
            println!(
                "{}: {} cases, {} solved, {} failed -> {}",
                table.label,
                table.len(),
                table.completed_count(),
                table.failed_count(),
                path.display()
            );
        }
        Err(e) => {
            eprintln!("error: failed to write results: {e}");
            process::exit(1);
        }
    }
}

fn require_scenarios(cfg: &SweepConfig) {
    if cfg.sweep.scenarios.is_empty() {
        eprintln!("config error: sweep.scenarios — at least one scenario is required");
        process::exit(1);
    }
}

fn ensure_layout(cfg: &SweepConfig, kind: SweepKind) {
    if let Err(e) = cfg.project_paths().ensure_layout(kind) {
        eprintln!("error: failed to create project directories: {e}");
        process::exit(1);
    }
}

fn run_baseline(cfg: &SweepConfig) {
    require_scenarios(cfg);
    ensure_layout(cfg, SweepKind::Baseline);

    // One table per scenario, so the combine manifest can stamp constant
    // scenario-flag provenance onto each file.
    let toolchain = cfg.command_toolchain();
    for scenario in &cfg.sweep.scenarios {
        let runs = plan_baseline_runs(std::slice::from_ref(scenario), &cfg.sweep.label);
        let table = run_sweep(
            SweepKind::Baseline,
            &table_label(SweepKind::Baseline, scenario, &cfg.sweep.label),
            runs,
            &cfg.model_inputs(),
            &toolchain,
            &toolchain,
            &toolchain,
            &cfg.project_paths(),
            &cfg.sweep_options(),
        );
        match table {
            Ok(table) => report(cfg, &table),
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        }
    }
}

fn run_sensitivity(cfg: &SweepConfig) {
    require_scenarios(cfg);
    ensure_layout(cfg, SweepKind::Sensitivity);

    let cases = match sensitivity_cases(&cfg.variables, cfg.sweep.multiplier_pct) {
        Ok(cases) => cases,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    let toolchain = cfg.command_toolchain();
    for scenario in &cfg.sweep.scenarios {
        save_inputs(
            cfg,
            SweepKind::Sensitivity,
            &format!("SensitivityInputs_{scenario}"),
            &cases,
        );
        let runs = plan_runs(SweepKind::Sensitivity, scenario, &cfg.sweep.label, &cases);
        let table = run_sweep(
            SweepKind::Sensitivity,
            &table_label(SweepKind::Sensitivity, scenario, &cfg.sweep.label),
            runs,
            &cfg.model_inputs(),
            &toolchain,
            &toolchain,
            &toolchain,
            &cfg.project_paths(),
            &cfg.sweep_options(),
        );
        match table {
            Ok(table) => report(cfg, &table),
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        }
    }
}

fn run_monte_carlo(cfg: &SweepConfig) {
    require_scenarios(cfg);
    ensure_layout(cfg, SweepKind::MonteCarlo);

    let cases = match monte_carlo_cases(&cfg.variables, cfg.sweep.iterations, cfg.sweep.seed) {
        Ok(cases) => cases,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    let toolchain = cfg.command_toolchain();
    for scenario in &cfg.sweep.scenarios {
        save_inputs(
            cfg,
            SweepKind::MonteCarlo,
            &format!("MonteCarloInputs_{}_{scenario}", cfg.sweep.label),
            &cases,
        );
        let runs = plan_runs(SweepKind::MonteCarlo, scenario, &cfg.sweep.label, &cases);
        let table = run_sweep(
            SweepKind::MonteCarlo,
            &table_label(SweepKind::MonteCarlo, scenario, &cfg.sweep.label),
            runs,
            &cfg.model_inputs(),
            &toolchain,
            &toolchain,
            &toolchain,
            &cfg.project_paths(),
            &cfg.sweep_options(),
        );
        match table {
            Ok(table) => report(cfg, &table),
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        }
    }
}

fn run_combine(cfg: &SweepConfig) {
    let sources = cfg.combine_sources();
    if sources.is_empty() {
        eprintln!("config error: combine.sources — at least one source is required");
        process::exit(1);
    }

    let combined = match aggregate::combine(&sources) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let out_dir = cfg.combine_output_dir();
    if let Err(e) = fs::create_dir_all(&out_dir) {
        eprintln!(
            "error: failed to create \"{}\": {e}",
            out_dir.display()
        );
        process::exit(1);
    }
    match aggregate::write_split_outputs(&combined, &out_dir) {
        Ok(written) => {
            println!(
                "combined {} sources into {} rows -> {} files in {}",
                sources.len(),
                combined.rows.len(),
                written.len(),
                out_dir.display()
            );
        }
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}

fn main() {
    let cli = parse_args();

    let Some(mode) = cli.mode.as_deref() else {
        eprintln!("error: --mode is required");
        print_help();
        process::exit(1);
    };

    let mut cfg = match SweepConfig::from_toml_file(Path::new(&cli.config_path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    // Apply CLI overrides
    if !cli.scenario_overrides.is_empty() {
        cfg.sweep.scenarios = cli.scenario_overrides.clone();
    }
    if let Some(n) = cli.workers_override {
        cfg.sweep.workers = Some(n);
    }
    if let Some(name) = cli.solver_override {
        cfg.solver.name = name;
    }
    if let Some(seed) = cli.seed_override {
        cfg.sweep.seed = seed;
    }
    if let Some(n) = cli.iterations_override {
        cfg.sweep.iterations = n;
    }

    // Validate
    let errors = cfg.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    match mode {
        "baseline" => run_baseline(&cfg),
        "sensitivity" => run_sensitivity(&cfg),
        "monte-carlo" => run_monte_carlo(&cfg),
        "combine" => run_combine(&cfg),
        other => {
            eprintln!("error: unknown mode \"{other}\"");
            print_help();
            process::exit(1);
        }
    }
}
