//! Command-line front end: `clap::Parser` derive, `env_logger::init`, `anyhow::Result`
//! at the top level, with distinct process exit codes for the three outcomes the driver
//! distinguishes: an ordinary parse/IO failure, an allocation failure, and a sanity
//! violation.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use ralloc_core::linear_scan::SpillPolicy;
use ralloc_driver::{AllocResult, DriverError, Strategy};

const EXIT_INPUT_ERROR: u8 = 2;
const EXIT_ALLOCATION_FAILURE: u8 = 3;
const EXIT_SANITY_VIOLATION: u8 = 4;

#[derive(Parser)]
#[command(name = "ralloc")]
#[command(about = "Research driver for SSA register allocation")]
#[command(version)]
struct Cli {
    /// Module JSON file to allocate.
    #[arg(long = "file")]
    file: PathBuf,

    /// Allocate only this function; when omitted, every function in the module runs.
    #[arg(long = "function")]
    function: Option<String>,

    /// Physical register budget.
    #[arg(short = 'k', long = "registers", default_value_t = 8)]
    registers: u32,

    /// Allocator family to run.
    #[arg(long, value_enum, default_value_t = StrategyArg::GraphColoring)]
    strategy: StrategyArg,

    /// Spill-candidate eviction policy, used only by the linear-scan strategies.
    #[arg(long, value_enum, default_value_t = SpillPolicyArg::FurthestFirst)]
    spill_policy: SpillPolicyArg,

    /// Use hole-aware subintervals for linear scan instead of one contiguous range.
    #[arg(long)]
    extended: bool,

    /// Divide next-use distance by loop depth in the graph-coloring spiller.
    #[arg(long)]
    loop_bias: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    LinearScan,
    GraphColoring,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SpillPolicyArg {
    FurthestFirst,
    CurrentFirst,
    LessUsedFirst,
    FurthestNextUseFirst,
}

impl From<SpillPolicyArg> for SpillPolicy {
    fn from(value: SpillPolicyArg) -> Self {
        match value {
            SpillPolicyArg::FurthestFirst => SpillPolicy::FurthestFirst,
            SpillPolicyArg::CurrentFirst => SpillPolicy::CurrentFirst,
            SpillPolicyArg::LessUsedFirst => SpillPolicy::LessUsedFirst,
            SpillPolicyArg::FurthestNextUseFirst => SpillPolicy::FurthestNextUseFirst,
        }
    }
}

fn build_strategy(cli: &Cli) -> Strategy {
    let policy = SpillPolicy::from(cli.spill_policy);
    match cli.strategy {
        StrategyArg::LinearScan if cli.extended => Strategy::LinearScanExtended(policy),
        StrategyArg::LinearScan => Strategy::LinearScanBasic(policy),
        StrategyArg::GraphColoring => Strategy::GraphColoring { loop_biased: cli.loop_bias },
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default()).filter_level(level).init();
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:?}");
            ExitCode::from(EXIT_INPUT_ERROR)
        }
    }
}

/// Everything that can fail before the driver even gets a chance to return a
/// distinguishable `DriverError` (missing file, bad CLI args) goes through `anyhow`;
/// failures the driver itself distinguishes are matched explicitly below so each one
/// maps to its own exit code.
fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let contents = fs::read_to_string(&cli.file).with_context(|| format!("reading {}", cli.file.display()))?;

    let module = match ralloc_driver::parse_module(&contents, &cli.file.to_string_lossy()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{e}");
            return Ok(ExitCode::from(EXIT_INPUT_ERROR));
        }
    };

    let strategy = build_strategy(&cli);
    let k = cli.registers;

    match &cli.function {
        Some(name) => {
            let f = match module.function(name) {
                Some(f) => f,
                None => {
                    eprintln!("{}: no function named {name}", cli.file.display());
                    return Ok(ExitCode::from(EXIT_INPUT_ERROR));
                }
            };
            run_single(name, f, k, strategy)
        }
        None => run_batch(&module, k, strategy),
    }
}

/// A single requested function: print the transformed CFG, the output artifact this
/// tool actually exists to produce.
fn run_single(name: &str, f: &ralloc_ir::Function, k: u32, strategy: Strategy) -> anyhow::Result<ExitCode> {
    match ralloc_driver::allocate_function(f, k, strategy) {
        Ok(AllocResult::Allocated { function, .. }) => {
            let mut module = ralloc_ir::Module::new();
            module.insert(function);
            println!("{}", ralloc_driver::write_module(&module)?);
            Ok(ExitCode::SUCCESS)
        }
        Ok(AllocResult::Failed { reason }) => {
            eprintln!("{name}: allocation failed: {reason:?}");
            Ok(ExitCode::from(EXIT_ALLOCATION_FAILURE))
        }
        Err(DriverError::SanityViolation { function, block, detail }) => {
            eprintln!("sanity violation in {function}::{block}: {detail}");
            Ok(ExitCode::from(EXIT_SANITY_VIOLATION))
        }
        Err(e) => {
            eprintln!("{name}: {e}");
            Ok(ExitCode::from(EXIT_ALLOCATION_FAILURE))
        }
    }
}

/// Every function in the module: no per-function CFG dump, just the cost table the
/// interface contract promises for a whole-module run.
fn run_batch(module: &ralloc_ir::Module, k: u32, strategy: Strategy) -> anyhow::Result<ExitCode> {
    let results = ralloc_driver::allocate_module(module, k, strategy);

    let mut saw_sanity_violation = false;
    let mut saw_allocation_failure = false;

    println!("{:<24} {:<10} {:>6} {:>6}", "function", "status", "spills", "pressure");
    for (name, result) in &results {
        match result {
            Ok(AllocResult::Allocated { spill_count, max_pressure, .. }) => {
                println!("{name:<24} {:<10} {spill_count:>6} {max_pressure:>6}", "ok");
            }
            Ok(AllocResult::Failed { reason }) => {
                saw_allocation_failure = true;
                println!("{name:<24} {:<10} {:>6} {:>6}", format!("failed: {reason:?}"), "-", "-");
            }
            Err(DriverError::SanityViolation { function, block, detail }) => {
                saw_sanity_violation = true;
                eprintln!("sanity violation in {function}::{block}: {detail}");
            }
            Err(e) => {
                saw_allocation_failure = true;
                eprintln!("{name}: {e}");
            }
        }
    }

    Ok(if saw_sanity_violation {
        ExitCode::from(EXIT_SANITY_VIOLATION)
    } else if saw_allocation_failure {
        ExitCode::from(EXIT_ALLOCATION_FAILURE)
    } else {
        ExitCode::SUCCESS
    })
}
