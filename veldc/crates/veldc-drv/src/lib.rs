//! veldc-drv - Middle-end driver.
//!
//! Orchestrates the middle-end over cached HIR modules:
//!
//! ```text
//! .vhir cache file -> HIR -> [hir passes] -> THIR -> (backend's MIR) -> PassManager
//! ```
//!
//! Each compilation unit is processed by its own worker with its own
//! builders and ID generators; parallelism lives between units, never
//! within one. The MIR half of the pipeline is exposed as
//! [`Session::optimize_mir`] for the backend driver that produces MIR
//! modules; the flags in [`Config`] map one-to-one onto the CLI surface.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use veldc_hir::{serialize, HirConstFold, HirModule, HirPass};
use veldc_mir::pass::{OptLevel, PassManager};
use veldc_sem::{EnvSolver, TypeEnv};
use veldc_thir::{ThirLower, ThirModule};
use veldc_util::Diagnostic;

/// Middle-end flags, mirroring the CLI surface.
#[derive(Debug, Clone)]
pub struct Config {
    pub opt_level: OptLevel,
    /// Print HIR after construction and continue.
    pub emit_hir: bool,
    /// Print a THIR summary after lowering and continue.
    pub emit_thir: bool,
    /// Print MIR around every optimization pass.
    pub emit_mir: bool,
    /// Route lowering through THIR; without it the backend consumes HIR.
    pub use_thir: bool,
    /// Print per-pass wall time on completion.
    pub time: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::O0,
            emit_hir: false,
            emit_thir: false,
            emit_mir: false,
            use_thir: false,
            time: false,
        }
    }
}

/// What one compilation unit produced.
pub struct UnitReport {
    pub path: PathBuf,
    pub module_name: String,
    pub hir: HirModule,
    pub thir: Option<ThirModule>,
    pub diagnostics: Vec<Diagnostic>,
    /// Text the unit wants printed (emitted IR dumps), gathered so
    /// parallel workers do not interleave output.
    pub emitted: String,
}

impl UnitReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level.is_error())
    }
}

/// One middle-end session over a shared configuration.
pub struct Session {
    config: Config,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process one cached HIR module through the HIR and THIR stages.
    pub fn run_unit(&self, path: &Path, env: &TypeEnv) -> Result<UnitReport> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading HIR cache file {}", path.display()))?;
        let mut hir = serialize::deserialize_module(&bytes)
            .with_context(|| format!("decoding HIR cache file {}", path.display()))?;

        let mut emitted = String::new();
        if self.config.emit_hir {
            emitted.push_str(&veldc_hir::printer::print_module(&hir));
        }

        // The HIR pass hook runs at O1 and above.
        if self.config.opt_level >= OptLevel::O1 {
            let mut fold = HirConstFold;
            while fold.run(&mut hir) {}
        }

        let mut thir = None;
        let mut diagnostics = Vec::new();
        if self.config.use_thir {
            let solver = EnvSolver::new(env);
            let (lowered, mut lower_diags) = ThirLower::new(&solver).lower_module(hir.clone());
            diagnostics.append(&mut lower_diags);
            if self.config.emit_thir {
                emitted.push_str(&summarize_thir(&lowered));
            }
            thir = Some(lowered);
        }

        Ok(UnitReport {
            path: path.to_path_buf(),
            module_name: hir.name.to_string(),
            hir,
            thir,
            diagnostics,
            emitted,
        })
    }

    /// Run the standard optimization pipeline over a MIR module handed in
    /// by the backend's lowering, honoring `-O`, `--emit-mir`, and
    /// `--time`.
    pub fn optimize_mir(&self, module: &mut veldc_mir::Module, env: Option<&TypeEnv>) -> String {
        let mut pm = PassManager::standard(self.config.opt_level, env);
        let mut emitted = String::new();
        if self.config.emit_mir {
            emitted.push_str(&veldc_mir::printer::pass_banner("pipeline", "before"));
            emitted.push_str(&veldc_mir::printer::print_module(module));

            let sink = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
            let observer_sink = sink.clone();
            pm.set_observer(Box::new(move |pass, module| {
                let mut out = observer_sink.lock().expect("observer sink");
                out.push_str(&veldc_mir::printer::pass_banner(pass, "after"));
                out.push_str(&veldc_mir::printer::print_module(module));
            }));
            pm.run(module);
            emitted.push_str(&sink.lock().expect("observer sink"));
        } else {
            pm.run(module);
        }
        if self.config.time {
            emitted.push_str(&pm.time_report());
        }
        emitted
    }
}

fn summarize_thir(module: &ThirModule) -> String {
    use std::fmt::Write as _;
    let mut out = String::new();
    let _ = writeln!(out, "; THIR Module: {}", module.name);
    let _ = writeln!(out, "; Source: {}", module.source_path);
    for func in &module.functions {
        let _ = writeln!(
            out,
            "; func {} ({} params) -> {}",
            func.mangled_name,
            func.params.len(),
            func.ret
        );
    }
    out
}
