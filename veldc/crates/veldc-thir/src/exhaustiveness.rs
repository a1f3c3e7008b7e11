//! Pattern exhaustiveness checking.
//!
//! Implements the usefulness construction over the pattern matrix of a
//! `when` expression: collect the arms' top-level patterns, compute the set
//! of constructors not covered by any row, and recurse into sub-patterns for
//! covered constructors. Each missing constructor is reported as a pattern
//! that would be useful if added.
//!
//! Guarded arms never count toward coverage; a guard can fail at runtime.

use rustc_hash::FxHashMap;
use veldc_hir::{HirEnum, HirPattern, HirPatternKind, HirStruct};
use veldc_sem::ast::Lit;
use veldc_sem::{IntWidth, Type};
use veldc_util::Symbol;

/// Variant shapes of one enum, indexed by variant ordinal.
#[derive(Debug, Clone)]
struct EnumShape {
    variant_names: Vec<Symbol>,
    payloads: Vec<Vec<Type>>,
}

/// Checks `when` expressions against the type declarations of one module.
pub struct ExhaustivenessChecker {
    enums: FxHashMap<Symbol, EnumShape>,
    structs: FxHashMap<Symbol, Vec<Type>>,
}

impl ExhaustivenessChecker {
    /// Build a checker over the module's (monomorphized) type declarations.
    pub fn new(structs: &[HirStruct], enums: &[HirEnum]) -> Self {
        let mut enum_map = FxHashMap::default();
        for e in enums {
            enum_map.insert(
                e.mangled_name,
                EnumShape {
                    variant_names: e.variants.iter().map(|(n, _)| *n).collect(),
                    payloads: e.variants.iter().map(|(_, p)| p.clone()).collect(),
                },
            );
        }
        let mut struct_map = FxHashMap::default();
        for s in structs {
            struct_map.insert(
                s.mangled_name,
                s.fields.iter().map(|(_, t)| t.clone()).collect(),
            );
        }
        Self {
            enums: enum_map,
            structs: struct_map,
        }
    }

    /// Missing patterns for a `when` over `ty`. Empty means exhaustive.
    ///
    /// `patterns` are the unguarded arms' top-level patterns.
    pub fn missing_patterns(&self, ty: &Type, patterns: &[&HirPattern]) -> Vec<String> {
        let rows: Vec<&HirPattern> = patterns.iter().flat_map(|p| flatten_or(p)).collect();

        if rows.iter().any(|p| is_catch_all(p)) {
            return vec![];
        }

        self.missing_for_type(ty, &rows)
    }

    fn missing_for_type(&self, ty: &Type, rows: &[&HirPattern]) -> Vec<String> {
        match ty {
            Type::Bool => self.missing_bools(rows),
            Type::Unit => vec![],
            Type::Int(w) => self.missing_ints(rows, int_domain_signed(*w)),
            Type::Uint(w) => self.missing_ints(rows, int_domain_unsigned(*w)),
            Type::Char => self.missing_ints(rows, (0, char::MAX as i128)),
            Type::Named { name, .. } => {
                if let Some(shape) = self.enums.get(name).cloned() {
                    self.missing_enum(*name, &shape, rows)
                } else if let Some(fields) = self.structs.get(name).cloned() {
                    self.missing_fields(&fields, rows, |inner| format!("{name} {{ {inner} }}"))
                } else {
                    // Unknown named type: only a catch-all covers it, and
                    // catch-alls were handled by the caller.
                    if rows.is_empty() {
                        vec!["_".to_string()]
                    } else {
                        vec![]
                    }
                }
            }
            Type::Tuple(elem_tys) => {
                self.missing_fields(elem_tys, rows, |inner| format!("({inner})"))
            }
            Type::Array(_, len) => self.missing_arrays(rows, Some(*len as usize)),
            Type::Slice(_) => self.missing_arrays(rows, None),
            // Strings, floats, references, functions: no finite constructor
            // set, so anything short of a catch-all leaves values uncovered.
            _ => vec!["_".to_string()],
        }
    }

    fn missing_bools(&self, rows: &[&HirPattern]) -> Vec<String> {
        let mut has_true = false;
        let mut has_false = false;
        for p in rows {
            if let HirPatternKind::Literal(Lit::Bool(b)) = &p.kind {
                if *b {
                    has_true = true;
                } else {
                    has_false = true;
                }
            }
        }
        let mut missing = vec![];
        if !has_true {
            missing.push("true".to_string());
        }
        if !has_false {
            missing.push("false".to_string());
        }
        missing
    }

    /// Integer and char coverage: merge literal and range rows into
    /// intervals and report the gaps over the type's domain.
    fn missing_ints(&self, rows: &[&HirPattern], (min, max): (i128, i128)) -> Vec<String> {
        let mut covered: Vec<(i128, i128)> = vec![];
        for p in rows {
            match &p.kind {
                HirPatternKind::Literal(lit) => {
                    if let Some(v) = lit_int_value(lit) {
                        covered.push((v, v));
                    }
                }
                HirPatternKind::Range {
                    start,
                    end,
                    inclusive,
                } => {
                    if let (Some(s), Some(e)) = (lit_int_value(start), lit_int_value(end)) {
                        let e = if *inclusive { e } else { e - 1 };
                        if s <= e {
                            covered.push((s, e));
                        }
                    }
                }
                _ => {}
            }
        }
        if covered.is_empty() {
            return vec!["_".to_string()];
        }

        covered.sort_by_key(|(s, _)| *s);
        let merged = merge_intervals(&covered);
        let gaps = interval_gaps(&merged, (min, max));

        let mut missing = vec![];
        for (i, (gap_start, gap_end)) in gaps.iter().enumerate() {
            if i >= 3 {
                missing.push("...".to_string());
                break;
            }
            if gap_start == gap_end {
                missing.push(gap_start.to_string());
            } else {
                missing.push(format!("{gap_start}..={gap_end}"));
            }
        }
        missing
    }

    fn missing_enum(
        &self,
        enum_name: Symbol,
        shape: &EnumShape,
        rows: &[&HirPattern],
    ) -> Vec<String> {
        // Group rows by variant ordinal.
        let mut by_variant: FxHashMap<u32, Vec<&HirPattern>> = FxHashMap::default();
        for p in rows {
            if let HirPatternKind::Enum { variant, .. } = &p.kind {
                by_variant.entry(*variant).or_default().push(p);
            }
        }

        let mut missing = vec![];
        for (idx, payload_tys) in shape.payloads.iter().enumerate() {
            let variant_name = shape.variant_names[idx];
            let Some(variant_rows) = by_variant.get(&(idx as u32)) else {
                if payload_tys.is_empty() {
                    missing.push(format!("{enum_name}::{variant_name}"));
                } else {
                    missing.push(format!("{enum_name}::{variant_name}(_)"));
                }
                continue;
            };

            // Variant appears; recurse into each payload position.
            for (pos, field_ty) in payload_tys.iter().enumerate() {
                let field_rows: Vec<&HirPattern> = variant_rows
                    .iter()
                    .filter_map(|p| match &p.kind {
                        HirPatternKind::Enum { payload, .. } => payload.get(pos),
                        _ => None,
                    })
                    .flat_map(flatten_or)
                    .collect();
                if field_rows.iter().any(|p| is_catch_all(p)) {
                    continue;
                }
                for m in self.missing_for_type(field_ty, &field_rows).into_iter().take(2) {
                    missing.push(format!("{enum_name}::{variant_name}({m})"));
                }
            }
        }
        missing
    }

    /// Single-constructor coverage for tuples and structs: every field
    /// position must be exhaustive.
    fn missing_fields(
        &self,
        field_tys: &[Type],
        rows: &[&HirPattern],
        wrap: impl Fn(String) -> String,
    ) -> Vec<String> {
        if rows.is_empty() {
            let placeholders = vec!["_"; field_tys.len()].join(", ");
            return vec![wrap(placeholders)];
        }

        for (pos, field_ty) in field_tys.iter().enumerate() {
            let field_rows: Vec<&HirPattern> = rows
                .iter()
                .filter_map(|p| match &p.kind {
                    HirPatternKind::Tuple(pats) => pats.get(pos),
                    HirPatternKind::Struct { fields, .. } => fields
                        .iter()
                        .find(|(idx, _)| *idx as usize == pos)
                        .map(|(_, pat)| pat),
                    _ => None,
                })
                .flat_map(flatten_or)
                .collect();
            // A field position omitted from a struct pattern matches
            // anything at that position.
            let position_omitted = rows.iter().any(|p| match &p.kind {
                HirPatternKind::Struct { fields, .. } => {
                    !fields.iter().any(|(idx, _)| *idx as usize == pos)
                }
                _ => false,
            });
            if position_omitted || field_rows.iter().any(|p| is_catch_all(p)) {
                continue;
            }
            let inner_missing = self.missing_for_type(field_ty, &field_rows);
            if !inner_missing.is_empty() {
                let mut parts = vec!["_".to_string(); field_tys.len()];
                parts[pos] = inner_missing[0].clone();
                return vec![wrap(parts.join(", "))];
            }
        }
        vec![]
    }

    /// Arrays cover by length; a rest pattern covers any length at or above
    /// its prefix + suffix count.
    fn missing_arrays(&self, rows: &[&HirPattern], fixed_len: Option<usize>) -> Vec<String> {
        let mut min_rest: Option<usize> = None;
        let mut exact_lens: Vec<usize> = vec![];
        for p in rows {
            if let HirPatternKind::Array {
                prefix,
                has_rest,
                suffix,
            } = &p.kind
            {
                let pinned = prefix.len() + suffix.len();
                let all_wild = prefix.iter().chain(suffix.iter()).all(is_catch_all);
                if *has_rest {
                    if all_wild {
                        min_rest = Some(min_rest.map_or(pinned, |m: usize| m.min(pinned)));
                    }
                } else if all_wild {
                    exact_lens.push(pinned);
                }
            }
        }

        match fixed_len {
            Some(len) => {
                let covered = exact_lens.contains(&len)
                    || min_rest.is_some_and(|m| m <= len);
                if covered {
                    vec![]
                } else {
                    vec![format!("[{}]", vec!["_"; len].join(", "))]
                }
            }
            None => {
                // A slice has unbounded lengths; only a rest pattern (or a
                // catch-all, handled earlier) can close them all.
                match min_rest {
                    Some(0) => vec![],
                    Some(m) => {
                        // Lengths below the rest's minimum must be listed.
                        let missing: Vec<String> = (0..m)
                            .filter(|l| !exact_lens.contains(l))
                            .take(3)
                            .map(|l| format!("[{}]", vec!["_"; l].join(", ")))
                            .collect();
                        missing
                    }
                    None => vec!["[..]".to_string()],
                }
            }
        }
    }
}

/// A pattern that matches every value of its type.
fn is_catch_all(p: &HirPattern) -> bool {
    match &p.kind {
        HirPatternKind::Wildcard | HirPatternKind::Binding { .. } => true,
        HirPatternKind::Or(alts) => alts.iter().any(is_catch_all),
        _ => false,
    }
}

/// Flatten or-patterns into their alternatives.
fn flatten_or(p: &HirPattern) -> Vec<&HirPattern> {
    match &p.kind {
        HirPatternKind::Or(alts) => alts.iter().flat_map(flatten_or).collect(),
        _ => vec![p],
    }
}

fn lit_int_value(lit: &Lit) -> Option<i128> {
    match lit {
        Lit::Int(v) => Some(*v as i128),
        Lit::Uint(v) => Some(*v as i128),
        Lit::Char(c) => Some(*c as i128),
        _ => None,
    }
}

fn int_domain_signed(w: IntWidth) -> (i128, i128) {
    match w {
        IntWidth::W8 => (i8::MIN as i128, i8::MAX as i128),
        IntWidth::W16 => (i16::MIN as i128, i16::MAX as i128),
        IntWidth::W32 => (i32::MIN as i128, i32::MAX as i128),
        IntWidth::W64 => (i64::MIN as i128, i64::MAX as i128),
        IntWidth::W128 => (i128::MIN, i128::MAX),
    }
}

fn int_domain_unsigned(w: IntWidth) -> (i128, i128) {
    match w {
        IntWidth::W8 => (0, u8::MAX as i128),
        IntWidth::W16 => (0, u16::MAX as i128),
        IntWidth::W32 => (0, u32::MAX as i128),
        IntWidth::W64 => (0, u64::MAX as i128),
        // The top of u128 does not fit i128; the clamp loses only the
        // all-ones corner, which no realistic source match enumerates.
        IntWidth::W128 => (0, i128::MAX),
    }
}

/// Merge sorted intervals, joining overlaps and adjacency.
fn merge_intervals(sorted: &[(i128, i128)]) -> Vec<(i128, i128)> {
    let mut merged: Vec<(i128, i128)> = vec![];
    for &(start, end) in sorted {
        match merged.last_mut() {
            Some(last) if start <= last.1.saturating_add(1) => {
                last.1 = last.1.max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Gaps of `domain` not covered by the merged intervals.
fn interval_gaps(merged: &[(i128, i128)], (min, max): (i128, i128)) -> Vec<(i128, i128)> {
    let mut gaps = vec![];
    let mut cursor = min;
    for &(start, end) in merged {
        if cursor < start {
            gaps.push((cursor, start - 1));
        }
        cursor = end.saturating_add(1);
        if cursor > max {
            return gaps;
        }
    }
    if cursor <= max {
        gaps.push((cursor, max));
    }
    gaps
}
