//! Devirtualization.
//!
//! Builds a class hierarchy from the type environment (an arena of class
//! records with integer indices and precomputed transitive-subclass sets)
//! and rewrites virtual method calls to direct calls whenever the receiver
//! type is pinned down:
//!
//! - the receiver class is sealed, or has no subclasses
//! - the method is marked final
//! - an abstract receiver has exactly one concrete implementing subclass
//! - a preceding construction in the same function fixes the exact type
//!
//! Each rewrite is recorded with its reason, both for the statistics
//! counters and for the devirt-aware inlining bonuses. Whole-program mode
//! (off by default) additionally trusts the hierarchy to be complete for
//! every class it knows; dynamic loading must invalidate it.

use std::cell::RefCell;
use std::rc::Rc;

use veldc_sem::{Type, TypeEnv};
use veldc_util::{FxHashMap, FxHashSet, Symbol};

use crate::mir::{Function, InstKind, Module, ValueId};
use crate::pass::MirPass;

/// Why a call site could be devirtualized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DevirtReason {
    Sealed,
    FinalMethod,
    NoSubclasses,
    SingleImplementer,
    ExactType,
}

/// One class record in the hierarchy arena.
#[derive(Debug, Clone)]
struct ClassNode {
    name: Symbol,
    base: Option<usize>,
    interfaces: Vec<Symbol>,
    direct_subclasses: Vec<usize>,
    transitive_subclasses: FxHashSet<usize>,
    final_methods: FxHashSet<Symbol>,
    is_sealed: bool,
    is_abstract: bool,
}

/// Arena-backed class hierarchy with precomputed transitive-subclass sets.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    nodes: Vec<ClassNode>,
    index: FxHashMap<Symbol, usize>,
}

impl ClassHierarchy {
    pub fn from_env(env: Option<&TypeEnv>) -> Self {
        let Some(env) = env else {
            return Self::default();
        };
        let mut hierarchy = Self::default();
        for (name, info) in env.classes() {
            hierarchy.nodes.push(ClassNode {
                name,
                base: None,
                interfaces: info.interfaces.clone(),
                direct_subclasses: Vec::new(),
                transitive_subclasses: FxHashSet::default(),
                final_methods: info.final_methods.clone(),
                is_sealed: info.is_sealed,
                is_abstract: info.is_abstract,
            });
            hierarchy
                .index
                .insert(name, hierarchy.nodes.len() - 1);
        }
        // Second pass wires bases, now that every index exists.
        for (name, info) in env.classes() {
            let node = hierarchy.index[&name];
            if let Some(base) = info.base {
                if let Some(&base_index) = hierarchy.index.get(&base) {
                    hierarchy.nodes[node].base = Some(base_index);
                    hierarchy.nodes[base_index].direct_subclasses.push(node);
                }
            }
        }
        hierarchy.recompute_transitive();
        hierarchy
    }

    /// Recompute the transitive-subclass sets. Called at construction and
    /// whenever the hierarchy is invalidated (dynamic loading in
    /// whole-program mode).
    pub fn recompute_transitive(&mut self) {
        for index in 0..self.nodes.len() {
            let mut all = FxHashSet::default();
            let mut stack = self.nodes[index].direct_subclasses.clone();
            while let Some(sub) = stack.pop() {
                if all.insert(sub) {
                    stack.extend(self.nodes[sub].direct_subclasses.iter().copied());
                }
            }
            self.nodes[index].transitive_subclasses = all;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, class: Symbol) -> bool {
        self.index.contains_key(&class)
    }

    fn node(&self, class: Symbol) -> Option<&ClassNode> {
        self.index.get(&class).map(|&i| &self.nodes[i])
    }

    pub fn is_sealed(&self, class: Symbol) -> bool {
        self.node(class).is_some_and(|n| n.is_sealed)
    }

    pub fn is_final_method(&self, class: Symbol, method: Symbol) -> bool {
        self.node(class)
            .is_some_and(|n| n.final_methods.contains(&method))
    }

    pub fn subclass_count(&self, class: Symbol) -> usize {
        self.node(class)
            .map(|n| n.transitive_subclasses.len())
            .unwrap_or(0)
    }

    /// The names of a class and all its transitive subclasses.
    pub fn family_of(&self, class: Symbol) -> Vec<Symbol> {
        let Some(node) = self.node(class) else {
            return vec![class];
        };
        let mut family = vec![node.name];
        family.extend(
            node.transitive_subclasses
                .iter()
                .map(|&i| self.nodes[i].name),
        );
        family
    }

    /// The single concrete subclass of an abstract class, if exactly one
    /// exists.
    fn sole_implementer(&self, class: Symbol) -> Option<Symbol> {
        let node = self.node(class)?;
        if !node.is_abstract {
            return None;
        }
        let concrete: Vec<Symbol> = node
            .transitive_subclasses
            .iter()
            .filter(|&&i| !self.nodes[i].is_abstract)
            .map(|&i| self.nodes[i].name)
            .collect();
        match concrete.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn interfaces_of(&self, class: Symbol) -> &[Symbol] {
        self.node(class).map(|n| n.interfaces.as_slice()).unwrap_or(&[])
    }
}

/// Devirtualized call sites shared with the inliner: (caller, direct
/// callee) mapped to the reason.
#[derive(Debug, Clone, Default)]
pub struct DevirtRecord {
    sites: Rc<RefCell<FxHashMap<(Symbol, Symbol), DevirtReason>>>,
}

impl DevirtRecord {
    pub fn shared() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, caller: Symbol, callee: Symbol, reason: DevirtReason) {
        self.sites.borrow_mut().insert((caller, callee), reason);
    }

    pub fn reason_for(&self, caller: Symbol, callee: Symbol) -> Option<DevirtReason> {
        self.sites.borrow().get(&(caller, callee)).copied()
    }
}

/// Per-reason rewrite counters.
#[derive(Debug, Clone, Default)]
pub struct DevirtStats {
    pub devirtualized_sealed: usize,
    pub devirtualized_final: usize,
    pub devirtualized_no_subclasses: usize,
    pub devirtualized_single_implementer: usize,
    pub devirtualized_exact_type: usize,
}

impl DevirtStats {
    fn bump(&mut self, reason: DevirtReason) {
        match reason {
            DevirtReason::Sealed => self.devirtualized_sealed += 1,
            DevirtReason::FinalMethod => self.devirtualized_final += 1,
            DevirtReason::NoSubclasses => self.devirtualized_no_subclasses += 1,
            DevirtReason::SingleImplementer => self.devirtualized_single_implementer += 1,
            DevirtReason::ExactType => self.devirtualized_exact_type += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.devirtualized_sealed
            + self.devirtualized_final
            + self.devirtualized_no_subclasses
            + self.devirtualized_single_implementer
            + self.devirtualized_exact_type
    }
}

pub struct Devirtualization {
    hierarchy: ClassHierarchy,
    record: DevirtRecord,
    /// Treat the hierarchy as the whole program. Off by default.
    pub whole_program: bool,
    /// Speculative, frequency-based devirtualization. Off by default and
    /// inert without a profile.
    pub profile_guided: bool,
    stats: DevirtStats,
}

impl Devirtualization {
    pub fn new(hierarchy: ClassHierarchy, record: DevirtRecord) -> Self {
        Self {
            hierarchy,
            record,
            whole_program: false,
            profile_guided: false,
            stats: DevirtStats::default(),
        }
    }

    pub fn stats(&self) -> &DevirtStats {
        &self.stats
    }
}

impl MirPass for Devirtualization {
    fn name(&self) -> &'static str {
        "devirtualization"
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        if self.hierarchy.is_empty() {
            return false;
        }
        let mut changed = false;
        for func in &mut module.functions {
            changed |= self.run_in(func);
        }
        changed
    }
}

impl Devirtualization {
    fn run_in(&mut self, func: &mut Function) -> bool {
        // Exact construction sites: value -> constructed class.
        let mut constructed: FxHashMap<ValueId, Symbol> = FxHashMap::default();
        for block in &func.blocks {
            for inst in &block.instructions {
                match &inst.kind {
                    InstKind::Call { callee, .. } => {
                        if let Some(class) = callee.as_str().strip_suffix("_new") {
                            let class = Symbol::intern(class);
                            if self.hierarchy.contains(class) {
                                constructed.insert(inst.result, class);
                            }
                        }
                    }
                    InstKind::StructInit { name, .. } if self.hierarchy.contains(*name) => {
                        constructed.insert(inst.result, *name);
                    }
                    _ => {}
                }
            }
        }

        let caller = func.name;
        let mut changed = false;
        for block in &mut func.blocks {
            for inst in &mut block.instructions {
                let InstKind::MethodCall {
                    receiver,
                    receiver_ty,
                    method,
                    args,
                    tail_call,
                } = &inst.kind
                else {
                    continue;
                };
                let static_class = match receiver_class(receiver_ty) {
                    Some(class) if self.hierarchy.contains(class) => class,
                    _ => continue,
                };

                let resolved = if let Some(&exact) = constructed.get(receiver) {
                    Some((exact, DevirtReason::ExactType))
                } else if self.hierarchy.is_final_method(static_class, *method) {
                    Some((static_class, DevirtReason::FinalMethod))
                } else if self.hierarchy.is_sealed(static_class) {
                    Some((static_class, DevirtReason::Sealed))
                } else if self.hierarchy.subclass_count(static_class) == 0 {
                    Some((static_class, DevirtReason::NoSubclasses))
                } else if let Some(sole) = self.hierarchy.sole_implementer(static_class) {
                    Some((sole, DevirtReason::SingleImplementer))
                } else {
                    None
                };
                let Some((target_class, reason)) = resolved else {
                    continue;
                };

                let direct = Symbol::intern(&format!(
                    "{}_{}",
                    target_class.as_str(),
                    method.as_str()
                ));
                let mut call_args = Vec::with_capacity(args.len() + 1);
                call_args.push(*receiver);
                call_args.extend(args.iter().copied());
                inst.kind = InstKind::Call {
                    callee: direct,
                    args: call_args,
                    tail_call: *tail_call,
                };
                self.stats.bump(reason);
                self.record.record(caller, direct, reason);
                changed = true;
            }
        }
        changed
    }
}

/// The class a method receiver statically belongs to.
fn receiver_class(ty: &Type) -> Option<Symbol> {
    match ty {
        Type::Named { name, .. } => Some(*name),
        Type::Ref(inner, _) | Type::Ptr(inner) => receiver_class(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::Terminator;
    use veldc_sem::env::ClassInfo;
    use veldc_sem::Type;

    fn sym(s: &str) -> Symbol {
        Symbol::intern(s)
    }

    fn env_with_classes() -> TypeEnv {
        let mut env = TypeEnv::new();
        env.register_class(
            sym("Sealed"),
            ClassInfo {
                is_sealed: true,
                ..Default::default()
            },
        );
        env.register_class(sym("Open"), ClassInfo::default());
        env.register_class(
            sym("Child"),
            ClassInfo {
                base: Some(sym("Open")),
                ..Default::default()
            },
        );
        env.register_class(
            sym("WithFinal"),
            ClassInfo {
                final_methods: [sym("render")].into_iter().collect(),
                ..Default::default()
            },
        );
        env.register_class(
            sym("SubOfFinal"),
            ClassInfo {
                base: Some(sym("WithFinal")),
                ..Default::default()
            },
        );
        env
    }

    fn call_method(class: &str, method: &str) -> Module {
        let class_ty = Type::named(sym(class));
        let mut b = FunctionBuilder::new("caller", Type::I32);
        let receiver = b.param(class_ty.clone());
        b.block();
        let result = b.push(
            Type::I32,
            InstKind::MethodCall {
                receiver,
                receiver_ty: class_ty,
                method: sym(method),
                args: vec![],
                tail_call: false,
            },
        );
        b.terminate(Terminator::Return(Some(result)));
        let mut module = Module::new();
        module.functions.push(b.build());
        module
    }

    fn first_call_callee(module: &Module) -> Option<String> {
        module.functions[0]
            .blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .find_map(|i| match &i.kind {
                InstKind::Call { callee, .. } => Some(callee.as_str().to_string()),
                _ => None,
            })
    }

    #[test]
    fn sealed_class_call_becomes_direct() {
        let env = env_with_classes();
        let hierarchy = ClassHierarchy::from_env(Some(&env));
        let mut pass = Devirtualization::new(hierarchy, DevirtRecord::shared());

        let mut module = call_method("Sealed", "m");
        assert!(pass.run_on_module(&mut module));
        assert_eq!(first_call_callee(&module).as_deref(), Some("Sealed_m"));
        assert_eq!(pass.stats().devirtualized_sealed, 1);
    }

    #[test]
    fn final_method_devirtualizes_despite_subclasses() {
        let env = env_with_classes();
        let hierarchy = ClassHierarchy::from_env(Some(&env));
        let mut pass = Devirtualization::new(hierarchy, DevirtRecord::shared());

        let mut module = call_method("WithFinal", "render");
        assert!(pass.run_on_module(&mut module));
        assert_eq!(
            first_call_callee(&module).as_deref(),
            Some("WithFinal_render")
        );
        assert_eq!(pass.stats().devirtualized_final, 1);
    }

    #[test]
    fn leaf_class_devirtualizes_via_no_subclasses() {
        let env = env_with_classes();
        let hierarchy = ClassHierarchy::from_env(Some(&env));
        let mut pass = Devirtualization::new(hierarchy, DevirtRecord::shared());

        let mut module = call_method("Child", "m");
        assert!(pass.run_on_module(&mut module));
        assert_eq!(first_call_callee(&module).as_deref(), Some("Child_m"));
        assert_eq!(pass.stats().devirtualized_no_subclasses, 1);
    }

    #[test]
    fn open_class_with_subclasses_stays_virtual() {
        let env = env_with_classes();
        let hierarchy = ClassHierarchy::from_env(Some(&env));
        let mut pass = Devirtualization::new(hierarchy, DevirtRecord::shared());

        let mut module = call_method("Open", "m");
        assert!(!pass.run_on_module(&mut module));
        assert!(first_call_callee(&module).is_none());
    }

    #[test]
    fn construction_pins_the_exact_type() {
        let env = env_with_classes();
        let hierarchy = ClassHierarchy::from_env(Some(&env));
        let mut pass = Devirtualization::new(hierarchy, DevirtRecord::shared());

        // Receiver statically typed Open, but constructed as Open right
        // here, so the exact type is known.
        let open_ty = Type::named(sym("Open"));
        let mut b = FunctionBuilder::new("caller", Type::I32);
        b.block();
        let receiver = b.call(open_ty.clone(), "Open_new", vec![]);
        let result = b.push(
            Type::I32,
            InstKind::MethodCall {
                receiver,
                receiver_ty: open_ty,
                method: sym("m"),
                args: vec![],
                tail_call: false,
            },
        );
        b.terminate(Terminator::Return(Some(result)));
        let mut module = Module::new();
        module.functions.push(b.build());

        assert!(pass.run_on_module(&mut module));
        assert_eq!(pass.stats().devirtualized_exact_type, 1);
        // The receiver travels as the first argument of the direct call.
        let call = module.functions[0]
            .blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .find_map(|i| match &i.kind {
                InstKind::Call { callee, args, .. } if callee.as_str() == "Open_m" => {
                    Some(args.clone())
                }
                _ => None,
            })
            .expect("devirtualized call");
        assert_eq!(call, vec![receiver]);
    }

    #[test]
    fn record_is_shared_with_the_inliner() {
        let env = env_with_classes();
        let hierarchy = ClassHierarchy::from_env(Some(&env));
        let record = DevirtRecord::shared();
        let mut pass = Devirtualization::new(hierarchy, record.clone());

        let mut module = call_method("Sealed", "m");
        pass.run_on_module(&mut module);
        assert_eq!(
            record.reason_for(sym("caller"), sym("Sealed_m")),
            Some(DevirtReason::Sealed)
        );
    }
}
