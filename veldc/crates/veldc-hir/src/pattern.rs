//! HIR patterns.
//!
//! Patterns appear in `let` bindings and `when` arms. Struct patterns carry
//! resolved field ordinals and enum patterns resolved variant ordinals; the
//! builder fills both in from the type environment.

use veldc_sem::ast::Lit;
use veldc_sem::Type;
use veldc_util::{Span, Symbol};

use crate::id::HirId;

/// An HIR pattern node.
#[derive(Debug, Clone, PartialEq)]
pub struct HirPattern {
    pub id: HirId,
    pub ty: Type,
    pub span: Span,
    pub kind: HirPatternKind,
}

/// Pattern kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum HirPatternKind {
    Wildcard,
    Binding {
        name: Symbol,
        mutable: bool,
    },
    Literal(Lit),
    Tuple(Vec<HirPattern>),
    /// Fields carry their resolved ordinal within the struct.
    Struct {
        name: Symbol,
        fields: Vec<(u32, HirPattern)>,
    },
    Enum {
        enum_name: Symbol,
        variant: u32,
        payload: Vec<HirPattern>,
    },
    Or(Vec<HirPattern>),
    Range {
        start: Lit,
        end: Lit,
        inclusive: bool,
    },
    Array {
        prefix: Vec<HirPattern>,
        has_rest: bool,
        suffix: Vec<HirPattern>,
    },
}

impl HirPattern {
    /// Names bound by this pattern, in source order.
    pub fn bound_names(&self) -> Vec<Symbol> {
        let mut names = Vec::new();
        self.collect_bound_names(&mut names);
        names
    }

    fn collect_bound_names(&self, out: &mut Vec<Symbol>) {
        match &self.kind {
            HirPatternKind::Binding { name, .. } => out.push(*name),
            HirPatternKind::Tuple(pats) | HirPatternKind::Or(pats) => {
                for p in pats {
                    p.collect_bound_names(out);
                }
            }
            HirPatternKind::Struct { fields, .. } => {
                for (_, p) in fields {
                    p.collect_bound_names(out);
                }
            }
            HirPatternKind::Enum { payload, .. } => {
                for p in payload {
                    p.collect_bound_names(out);
                }
            }
            HirPatternKind::Array {
                prefix, suffix, ..
            } => {
                for p in prefix.iter().chain(suffix) {
                    p.collect_bound_names(out);
                }
            }
            _ => {}
        }
    }

    /// Returns true for patterns that match any value of their type.
    pub fn is_irrefutable(&self) -> bool {
        match &self.kind {
            HirPatternKind::Wildcard | HirPatternKind::Binding { .. } => true,
            HirPatternKind::Tuple(pats) => pats.iter().all(HirPattern::is_irrefutable),
            HirPatternKind::Struct { fields, .. } => {
                fields.iter().all(|(_, p)| p.is_irrefutable())
            }
            HirPatternKind::Or(pats) => pats.iter().any(HirPattern::is_irrefutable),
            _ => false,
        }
    }

    /// Stable serialization tag.
    pub fn tag(&self) -> u8 {
        match &self.kind {
            HirPatternKind::Wildcard => 0,
            HirPatternKind::Binding { .. } => 1,
            HirPatternKind::Literal(_) => 2,
            HirPatternKind::Tuple(_) => 3,
            HirPatternKind::Struct { .. } => 4,
            HirPatternKind::Enum { .. } => 5,
            HirPatternKind::Or(_) => 6,
            HirPatternKind::Range { .. } => 7,
            HirPatternKind::Array { .. } => 8,
        }
    }
}
