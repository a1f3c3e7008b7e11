//! Behavior solver contract queried during THIR lowering.
//!
//! THIR lowering never resolves dispatch on its own; it asks a
//! [`TraitSolver`] and records the answer. The production solver lives with
//! the type checker. [`EnvSolver`] is the table-backed implementation used
//! by tests and by the driver when a populated [`TypeEnv`] is all there is.

use veldc_util::Symbol;

use crate::env::TypeEnv;
use crate::types::Type;

/// How a resolved method's receiver was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverKind {
    /// Plain `impl Type` method
    Inherent,
    /// Method from a behavior implementation
    Behavior,
    /// Method from a class interface
    Interface,
}

/// The outcome of successful method resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMethod {
    pub receiver_kind: ReceiverKind,
    pub implementing_type: Symbol,
    pub method_name: Symbol,
    pub is_static_dispatch: bool,
}

/// Result of a solver query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodResolution {
    Resolved(ResolvedMethod),
    /// More than one candidate applies; the implementing types are listed
    /// for the diagnostic.
    Ambiguous(Vec<Symbol>),
    NotFound,
}

/// The behavior-solver contract.
pub trait TraitSolver {
    /// Resolve `receiver.method(args)` to an implementation.
    fn resolve_method(
        &self,
        receiver: &Type,
        method: Symbol,
        arg_types: &[Type],
    ) -> MethodResolution;

    /// Normalize an associated-type projection to a concrete type.
    ///
    /// Returns the input unchanged when there is nothing to normalize.
    fn normalize_associated_type(&self, projection: &Type) -> Type {
        projection.clone()
    }
}

/// Solver backed by the [`TypeEnv`] method tables.
pub struct EnvSolver<'a> {
    env: &'a TypeEnv,
}

impl<'a> EnvSolver<'a> {
    pub fn new(env: &'a TypeEnv) -> Self {
        Self { env }
    }

    /// Strip references off the receiver for lookup purposes.
    fn receiver_name(receiver: &Type) -> Option<Symbol> {
        match receiver {
            Type::Ref(inner, _) => Self::receiver_name(inner),
            Type::Named { name, .. } => Some(*name),
            _ => None,
        }
    }
}

impl TraitSolver for EnvSolver<'_> {
    fn resolve_method(
        &self,
        receiver: &Type,
        method: Symbol,
        arg_types: &[Type],
    ) -> MethodResolution {
        let Some(name) = Self::receiver_name(receiver) else {
            return MethodResolution::NotFound;
        };

        let candidates = self.env.lookup_method(name, method);
        // Filter by arity first; the checker already proved the types line
        // up, so arity is the only discriminator left here.
        let applicable: Vec<_> = candidates
            .iter()
            .filter(|m| m.params.len() == arg_types.len())
            .collect();

        match applicable.as_slice() {
            [] => MethodResolution::NotFound,
            [only] => MethodResolution::Resolved(ResolvedMethod {
                receiver_kind: only.receiver_kind,
                implementing_type: only.implementing_type,
                method_name: method,
                is_static_dispatch: only.is_static_dispatch,
            }),
            many => {
                MethodResolution::Ambiguous(many.iter().map(|m| m.implementing_type).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MethodInfo;

    fn sym(s: &str) -> Symbol {
        Symbol::intern(s)
    }

    fn method(on: &str, is_static: bool) -> MethodInfo {
        MethodInfo {
            implementing_type: sym(on),
            behavior: None,
            receiver_kind: ReceiverKind::Inherent,
            is_static_dispatch: is_static,
            params: vec![Type::I32],
            ret: Type::I32,
        }
    }

    #[test]
    fn resolves_unique_candidate() {
        let mut env = TypeEnv::new();
        env.register_method(sym("Counter"), sym("bump"), method("Counter", true));
        let solver = EnvSolver::new(&env);

        let result =
            solver.resolve_method(&Type::named(sym("Counter")), sym("bump"), &[Type::I32]);
        match result {
            MethodResolution::Resolved(r) => {
                assert_eq!(r.implementing_type, sym("Counter"));
                assert!(r.is_static_dispatch);
            }
            other => panic!("expected resolution, got {other:?}"),
        }
    }

    #[test]
    fn reports_ambiguity() {
        let mut env = TypeEnv::new();
        env.register_method(sym("Counter"), sym("bump"), method("CounterImplA", true));
        env.register_method(sym("Counter"), sym("bump"), method("CounterImplB", true));
        let solver = EnvSolver::new(&env);

        let result =
            solver.resolve_method(&Type::named(sym("Counter")), sym("bump"), &[Type::I32]);
        assert!(matches!(result, MethodResolution::Ambiguous(ref v) if v.len() == 2));
    }

    #[test]
    fn looks_through_references() {
        let mut env = TypeEnv::new();
        env.register_method(sym("Counter"), sym("bump"), method("Counter", true));
        let solver = EnvSolver::new(&env);

        let receiver = Type::Ref(Box::new(Type::named(sym("Counter"))), true);
        let result = solver.resolve_method(&receiver, sym("bump"), &[Type::I32]);
        assert!(matches!(result, MethodResolution::Resolved(_)));
    }

    #[test]
    fn unknown_method_not_found() {
        let env = TypeEnv::new();
        let solver = EnvSolver::new(&env);
        let result = solver.resolve_method(&Type::named(sym("Counter")), sym("gone"), &[]);
        assert_eq!(result, MethodResolution::NotFound);
    }
}
