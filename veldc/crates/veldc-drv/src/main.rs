//! veldc - middle-end driver binary.
//!
//! Consumes cached HIR modules (`.vhir`) and runs them through the
//! middle-end stages selected by the flags. Distinct input files compile
//! in separate workers, each with its own session state; there is no
//! parallelism inside one unit.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rayon::prelude::*;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use veldc_drv::{Config, Session};
use veldc_mir::pass::OptLevel;
use veldc_sem::TypeEnv;

/// Veld compiler middle-end driver.
#[derive(Parser, Debug)]
#[command(name = "veldc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Veld middle-end: HIR/THIR lowering and MIR optimization", long_about = None)]
struct Cli {
    /// Cached HIR modules to process (.vhir)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Optimization level (0-3)
    #[arg(short = 'O', value_parser = parse_opt_level, default_value = "0")]
    opt_level: OptLevel,

    /// Print HIR after construction and continue
    #[arg(long)]
    emit_hir: bool,

    /// Print THIR after lowering and continue
    #[arg(long)]
    emit_thir: bool,

    /// Print MIR before and after each optimization pass
    #[arg(long)]
    emit_mir: bool,

    /// Lower through THIR (default path goes straight from HIR)
    #[arg(long)]
    use_thir: bool,

    /// Print per-pass wall time on completion
    #[arg(long)]
    time: bool,
}

fn parse_opt_level(raw: &str) -> Result<OptLevel, String> {
    match raw {
        "0" => Ok(OptLevel::O0),
        "1" => Ok(OptLevel::O1),
        "2" => Ok(OptLevel::O2),
        "3" => Ok(OptLevel::O3),
        other => Err(format!("invalid optimization level `{other}` (expected 0-3)")),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config {
        opt_level: cli.opt_level,
        emit_hir: cli.emit_hir,
        emit_thir: cli.emit_thir,
        emit_mir: cli.emit_mir,
        use_thir: cli.use_thir,
        time: cli.time,
    };

    // Each worker owns its session and type environment; only the results
    // come back.
    let results: Vec<_> = cli
        .inputs
        .par_iter()
        .map(|path| {
            let session = Session::new(config.clone());
            let env = TypeEnv::new();
            session.run_unit(path, &env)
        })
        .collect();

    let mut failed = false;
    for result in results {
        match result {
            Ok(report) => {
                if !report.emitted.is_empty() {
                    print!("{}", report.emitted);
                }
                for diagnostic in &report.diagnostics {
                    eprintln!("{}: {diagnostic}", report.path.display());
                }
                if report.has_errors() {
                    failed = true;
                } else {
                    tracing::info!(
                        module = %report.module_name,
                        path = %report.path.display(),
                        "middle-end complete"
                    );
                }
            }
            Err(error) => {
                eprintln!("error: {error:#}");
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
