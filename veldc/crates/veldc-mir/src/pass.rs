//! Optimization pass infrastructure.
//!
//! Passes implement [`MirPass`] and report whether they changed the IR. The
//! [`PassManager`] holds the named pipeline for the selected optimization
//! level, runs fixpoint groups up to an iteration cap, and records per-pass
//! statistics (modification counts and wall time) for `--time`.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use veldc_sem::TypeEnv;

use crate::mir::{Function, Module};
use crate::passes;

/// Optimization level, selecting the standard pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptLevel {
    O0,
    O1,
    O2,
    O3,
}

impl OptLevel {
    /// Inlining threshold multiplier at this level.
    pub fn inline_scale(self) -> u32 {
        match self {
            OptLevel::O0 => 0,
            OptLevel::O1 => 1,
            OptLevel::O2 => 2,
            OptLevel::O3 => 4,
        }
    }
}

/// A transformation or analysis over MIR.
///
/// Function passes get the default `run_on_module` loop over functions;
/// module passes override it.
pub trait MirPass {
    fn name(&self) -> &'static str;

    /// Whether this pass only computes information.
    fn is_analysis(&self) -> bool {
        false
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        let mut changed = false;
        for func in &mut module.functions {
            changed |= self.run_on_function(func);
        }
        changed
    }

    fn run_on_function(&mut self, _func: &mut Function) -> bool {
        false
    }
}

/// Per-pass counters.
#[derive(Debug, Clone, Default)]
pub struct PassStats {
    /// Times the pass ran.
    pub runs: usize,
    /// Runs that reported a change.
    pub modifications: usize,
    /// Accumulated wall time.
    pub time: Duration,
}

struct PipelineGroup {
    passes: Vec<Box<dyn MirPass>>,
    fixpoint: bool,
}

/// Runs a named pipeline of passes over modules.
pub struct PassManager {
    opt_level: OptLevel,
    groups: Vec<PipelineGroup>,
    stats: IndexMap<&'static str, PassStats>,
    /// Fixpoint groups repeat until quiet or this many iterations.
    iteration_cap: usize,
    /// Called with the pass name after each pass; drives `--emit-mir`.
    observer: Option<Box<dyn FnMut(&str, &Module)>>,
}

impl PassManager {
    pub fn new(opt_level: OptLevel) -> Self {
        Self {
            opt_level,
            groups: Vec::new(),
            stats: IndexMap::new(),
            iteration_cap: 10,
            observer: None,
        }
    }

    pub fn opt_level(&self) -> OptLevel {
        self.opt_level
    }

    /// Append a pass that runs once per `run` invocation.
    pub fn add_pass(&mut self, pass: Box<dyn MirPass>) {
        self.groups.push(PipelineGroup {
            passes: vec![pass],
            fixpoint: false,
        });
    }

    /// Append a group run to a local fixpoint.
    pub fn add_fixpoint_group(&mut self, passes: Vec<Box<dyn MirPass>>) {
        self.groups.push(PipelineGroup {
            passes,
            fixpoint: true,
        });
    }

    /// Install an observer called after every pass (used by `--emit-mir`).
    pub fn set_observer(&mut self, observer: Box<dyn FnMut(&str, &Module)>) {
        self.observer = Some(observer);
    }

    /// Build the standard pipeline for the configured level.
    ///
    /// The class hierarchy and destructor tables for the OOP passes come
    /// from `env`; without one, those passes are configured conservatively
    /// (empty hierarchy, every type assumed droppable).
    pub fn standard(opt_level: OptLevel, env: Option<&TypeEnv>) -> Self {
        let mut pm = Self::new(opt_level);
        if opt_level == OptLevel::O0 {
            return pm;
        }

        let drop_info = passes::remove_unneeded_drops::DropInfo::from_env(env);
        let hierarchy = passes::devirtualization::ClassHierarchy::from_env(env);
        let devirt_record = passes::devirtualization::DevirtRecord::shared();

        // O1: cleanup, promotion, and the scalar folding core.
        pm.add_pass(Box::new(passes::simplify_cfg::SimplifyCfg));
        pm.add_pass(Box::new(passes::mem2reg::Mem2Reg));
        pm.add_fixpoint_group(vec![
            Box::new(passes::constant_folding::ConstantFolding),
            Box::new(passes::constant_propagation::ConstantPropagation),
            Box::new(passes::inst_simplify::InstSimplify),
            Box::new(passes::remove_unneeded_drops::RemoveUnneededDrops::new(
                drop_info.clone(),
            )),
            Box::new(passes::normalize_array_len::NormalizeArrayLen),
            Box::new(passes::dce::Dce),
        ]);
        pm.add_pass(Box::new(passes::simplify_cfg::SimplifyCfg));

        if opt_level >= OptLevel::O2 {
            let scalar_group = || -> Vec<Box<dyn MirPass>> {
                vec![
                    Box::new(passes::early_cse::EarlyCse),
                    Box::new(passes::copy_propagation::CopyPropagation),
                    Box::new(passes::gvn::Gvn),
                    Box::new(passes::load_store_opt::LoadStoreOpt),
                    Box::new(passes::sroa::Sroa),
                    Box::new(passes::peephole::Peephole),
                    Box::new(passes::strength_reduction::StrengthReduction),
                    Box::new(passes::reassociate::Reassociate),
                    Box::new(passes::narrowing::Narrowing),
                    Box::new(passes::constant_folding::ConstantFolding),
                    Box::new(passes::simplify_select::SimplifySelect),
                    Box::new(passes::dce::Dce),
                ]
            };
            pm.add_fixpoint_group(scalar_group());
            pm.add_pass(Box::new(passes::jump_threading::JumpThreading));
            pm.add_pass(Box::new(passes::match_simplify::MatchSimplify));
            pm.add_pass(Box::new(
                passes::unreachable_elim::UnreachableCodeElimination,
            ));
            pm.add_pass(Box::new(passes::block_merge::BlockMerge));
            pm.add_pass(Box::new(passes::merge_returns::MergeReturns));
            pm.add_pass(Box::new(passes::inlining::Inlining::baseline(
                opt_level,
                devirt_record.clone(),
            )));

            if opt_level >= OptLevel::O3 {
                // Second scalar round after inlining exposed new bodies.
                pm.add_fixpoint_group(scalar_group());

                pm.add_pass(Box::new(passes::licm::Licm));
                pm.add_pass(Box::new(passes::loop_rotate::LoopRotate));
                pm.add_pass(Box::new(passes::const_hoist::ConstantHoist));
                pm.add_pass(Box::new(passes::loop_unroll::LoopUnroll::default()));
                pm.add_pass(Box::new(passes::sinking::Sinking));
                pm.add_pass(Box::new(passes::adce::Adce));
                pm.add_pass(Box::new(passes::inlining::Inlining::always_only(
                    devirt_record.clone(),
                )));
                pm.add_pass(Box::new(passes::devirtualization::Devirtualization::new(
                    hierarchy.clone(),
                    devirt_record.clone(),
                )));
                pm.add_pass(Box::new(passes::inlining::Inlining::devirt_aware(
                    opt_level,
                    devirt_record,
                )));
                pm.add_pass(Box::new(
                    passes::dead_method_elim::DeadMethodElimination::new(hierarchy),
                ));
                pm.add_pass(Box::new(passes::builder_opt::BuilderOpt::default()));
                pm.add_pass(Box::new(passes::constructor_fusion::ConstructorFusion));
                pm.add_pass(Box::new(passes::destructor_hoist::DestructorHoist));
                pm.add_pass(Box::new(passes::batch_destruction::BatchDestruction::new(
                    drop_info,
                )));
                pm.add_pass(Box::new(passes::dead_arg_elim::DeadArgElimination));
                pm.add_pass(Box::new(
                    passes::dead_function_elim::DeadFunctionElimination,
                ));
                pm.add_pass(Box::new(passes::tail_call::TailCall));
            }
        }

        pm
    }

    /// Run the pipeline. Returns true if anything changed.
    pub fn run(&mut self, module: &mut Module) -> bool {
        let mut changed_any = false;
        for group_index in 0..self.groups.len() {
            if self.groups[group_index].fixpoint {
                let mut iterations = 0;
                loop {
                    let changed = self.run_group_once(group_index, module);
                    changed_any |= changed;
                    iterations += 1;
                    if !changed {
                        break;
                    }
                    if iterations >= self.iteration_cap {
                        tracing::warn!(
                            iterations,
                            "fixpoint group hit its iteration cap; proceeding with current IR"
                        );
                        break;
                    }
                }
            } else {
                changed_any |= self.run_group_once(group_index, module);
            }
        }
        changed_any
    }

    fn run_group_once(&mut self, group_index: usize, module: &mut Module) -> bool {
        let mut changed = false;
        let pass_count = self.groups[group_index].passes.len();
        for pass_index in 0..pass_count {
            let pass = &mut self.groups[group_index].passes[pass_index];
            let name = pass.name();
            let start = Instant::now();
            let pass_changed = pass.run_on_module(module);
            let elapsed = start.elapsed();

            let stats = self.stats.entry(name).or_default();
            stats.runs += 1;
            if pass_changed {
                stats.modifications += 1;
            }
            stats.time += elapsed;

            tracing::debug!(pass = name, changed = pass_changed, ?elapsed, "ran pass");
            if let Some(observer) = &mut self.observer {
                observer(name, module);
            }
            changed |= pass_changed;
        }
        changed
    }

    /// Per-pass statistics, in first-run order.
    pub fn stats(&self) -> impl Iterator<Item = (&'static str, &PassStats)> {
        self.stats.iter().map(|(name, stats)| (*name, stats))
    }

    /// Render the `--time` report.
    pub fn time_report(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::from("pass times:\n");
        for (name, stats) in self.stats() {
            let _ = writeln!(
                out,
                "  {name:<32} {:>8.3}ms  runs={} changed={}",
                stats.time.as_secs_f64() * 1000.0,
                stats.runs,
                stats.modifications,
            );
        }
        out
    }
}
