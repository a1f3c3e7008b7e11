//! Human-readable HIR dump for `--emit-hir`.
//!
//! The output resembles surface syntax with resolved types and indices
//! annotated. It is a debugging convenience only and is not parsed back;
//! the binary format in [`crate::serialize`] is the round-trippable one.

use std::fmt::Write as _;

use veldc_sem::ast::{BinOp, Lit, UnOp};

use crate::decl::HirFunction;
use crate::expr::{HirBlock, HirExpr, HirExprKind};
use crate::module::HirModule;
use crate::pattern::{HirPattern, HirPatternKind};
use crate::stmt::HirStmt;

/// Render a module to the `--emit-hir` text form.
pub fn print_module(module: &HirModule) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; HIR Module: {}", module.name);
    let _ = writeln!(out, "; Source: {}", module.source_path);
    let _ = writeln!(
        out,
        "; Decls: {} structs, {} enums, {} behaviors, {} impls, {} functions, {} constants",
        module.structs.len(),
        module.enums.len(),
        module.behaviors.len(),
        module.impls.len(),
        module.functions.len(),
        module.constants.len(),
    );
    out.push('\n');

    for import in &module.imports {
        let _ = writeln!(out, "import {import}");
    }
    if !module.imports.is_empty() {
        out.push('\n');
    }

    for s in &module.structs {
        let _ = writeln!(out, "type {} {{", s.mangled_name);
        for (name, ty) in &s.fields {
            let _ = writeln!(out, "    {name}: {ty}");
        }
        out.push_str("}\n\n");
    }

    for e in &module.enums {
        let _ = writeln!(out, "type {} {{", e.mangled_name);
        for (i, (name, payload)) in e.variants.iter().enumerate() {
            if payload.is_empty() {
                let _ = writeln!(out, "    {name}  ; variant {i}");
            } else {
                let tys: Vec<String> = payload.iter().map(|t| t.to_string()).collect();
                let _ = writeln!(out, "    {name}({})  ; variant {i}", tys.join(", "));
            }
        }
        out.push_str("}\n\n");
    }

    for b in &module.behaviors {
        let _ = writeln!(out, "behavior {} {{", b.name);
        for sig in &b.methods {
            let params: Vec<String> = sig.params.iter().map(|t| t.to_string()).collect();
            let _ = writeln!(out, "    func {}({}) -> {}", sig.name, params.join(", "), sig.ret);
        }
        out.push_str("}\n\n");
    }

    for c in &module.constants {
        let _ = writeln!(out, "const {}: {} = {}", c.name, c.ty, expr_inline(&c.value));
    }
    if !module.constants.is_empty() {
        out.push('\n');
    }

    for i in &module.impls {
        match i.behavior {
            Some(b) => {
                let _ = writeln!(out, "impl {b} for {} {{", i.self_ty);
            }
            None => {
                let _ = writeln!(out, "impl {} {{", i.self_ty);
            }
        }
        for m in &i.methods {
            print_function(&mut out, m, 1);
        }
        out.push_str("}\n\n");
    }

    for f in &module.functions {
        print_function(&mut out, f, 0);
        out.push('\n');
    }

    out
}

fn print_function(out: &mut String, f: &HirFunction, depth: usize) {
    let pad = indent(depth);
    for attr in &f.attrs {
        let _ = writeln!(out, "{pad}@{attr}");
    }
    let params: Vec<String> = f
        .params
        .iter()
        .map(|p| format!("{}: {}", p.name, p.ty))
        .collect();
    let _ = write!(
        out,
        "{pad}func {}({}) -> {}",
        f.mangled_name,
        params.join(", "),
        f.ret
    );
    match &f.body {
        Some(body) => {
            out.push(' ');
            print_expr(out, body, depth);
            out.push('\n');
        }
        None => out.push_str("  ; extern\n"),
    }
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn print_expr(out: &mut String, expr: &HirExpr, depth: usize) {
    match &expr.kind {
        HirExprKind::Block(block) => print_block(out, block, depth),
        _ => out.push_str(&expr_inline(expr)),
    }
}

fn print_block(out: &mut String, block: &HirBlock, depth: usize) {
    let pad = indent(depth + 1);
    out.push_str("{\n");
    for stmt in &block.stmts {
        match stmt {
            HirStmt::Let { pattern, init, .. } => {
                let _ = write!(out, "{pad}let {}: {}", pattern_inline(pattern), pattern.ty);
                if let Some(init) = init {
                    out.push_str(" = ");
                    print_expr(out, init, depth + 1);
                }
                out.push('\n');
            }
            HirStmt::Expr(e) => {
                out.push_str(&pad);
                print_expr(out, e, depth + 1);
                out.push('\n');
            }
        }
    }
    if let Some(tail) = &block.tail {
        out.push_str(&pad);
        print_expr(out, tail, depth + 1);
        out.push('\n');
    }
    let _ = write!(out, "{}}}", indent(depth));
}

fn expr_inline(expr: &HirExpr) -> String {
    match &expr.kind {
        HirExprKind::Literal(lit) => lit_inline(lit),
        HirExprKind::Var { name, .. } => name.to_string(),
        HirExprKind::Binary { op, left, right } => format!(
            "({} {} {})",
            expr_inline(left),
            binop_str(*op),
            expr_inline(right)
        ),
        HirExprKind::Unary { op, operand } => {
            format!("{}{}", unop_str(*op), expr_inline(operand))
        }
        HirExprKind::Call { callee, args } => {
            format!("{callee}({})", exprs_inline(args))
        }
        HirExprKind::MethodCall {
            receiver,
            method,
            args,
            ..
        } => format!("{}.{method}({})", expr_inline(receiver), exprs_inline(args)),
        HirExprKind::Field { object, field, index } => {
            format!("{}.{field}/*#{index}*/", expr_inline(object))
        }
        HirExprKind::Index { object, index } => {
            format!("{}[{}]", expr_inline(object), expr_inline(index))
        }
        HirExprKind::Tuple(elems) => format!("({})", exprs_inline(elems)),
        HirExprKind::Array(elems) => format!("[{}]", exprs_inline(elems)),
        HirExprKind::ArrayRepeat { elem, count } => {
            format!("[{}; {count}]", expr_inline(elem))
        }
        HirExprKind::StructInit { name, fields } => {
            format!("{name} {{ {} }}", exprs_inline(fields))
        }
        HirExprKind::EnumInit {
            name,
            variant,
            payload,
        } => format!("{name}#{variant}({})", exprs_inline(payload)),
        HirExprKind::Block(_) => "{ ... }".to_string(),
        HirExprKind::If {
            cond,
            then_expr,
            else_expr,
        } => {
            let mut s = format!("if {} {{ {} }}", expr_inline(cond), expr_inline(then_expr));
            if let Some(e) = else_expr {
                let _ = write!(s, " else {{ {} }}", expr_inline(e));
            }
            s
        }
        HirExprKind::When { scrutinee, arms } => {
            let arm_strs: Vec<String> = arms
                .iter()
                .map(|a| format!("{} => {}", pattern_inline(&a.pattern), expr_inline(&a.body)))
                .collect();
            format!("when {} {{ {} }}", expr_inline(scrutinee), arm_strs.join(", "))
        }
        HirExprKind::Loop { body } => format!("loop {}", expr_inline(body)),
        HirExprKind::While { cond, body } => {
            format!("while {} {}", expr_inline(cond), expr_inline(body))
        }
        HirExprKind::Return(Some(v)) => format!("return {}", expr_inline(v)),
        HirExprKind::Return(None) => "return".to_string(),
        HirExprKind::Break(Some(v)) => format!("break {}", expr_inline(v)),
        HirExprKind::Break(None) => "break".to_string(),
        HirExprKind::Continue => "continue".to_string(),
        HirExprKind::Closure {
            params, captures, ..
        } => {
            let params: Vec<String> = params.iter().map(|p| p.name.to_string()).collect();
            format!(
                "|{}| {{ ... }} /*captures {}*/",
                params.join(", "),
                captures.len()
            )
        }
        HirExprKind::Cast { operand, target } => {
            format!("({} as {target})", expr_inline(operand))
        }
        HirExprKind::Try { inner } => format!("{}?", expr_inline(inner)),
        HirExprKind::Await { inner } => format!("{}.await", expr_inline(inner)),
        HirExprKind::Assign { place, value } => {
            format!("{} = {}", expr_inline(place), expr_inline(value))
        }
        HirExprKind::CompoundAssign { op, place, value } => format!(
            "{} {}= {}",
            expr_inline(place),
            binop_str(*op),
            expr_inline(value)
        ),
        HirExprKind::Lowlevel { name, args } => {
            format!("@lowlevel.{name}({})", exprs_inline(args))
        }
    }
}

fn exprs_inline(exprs: &[HirExpr]) -> String {
    exprs
        .iter()
        .map(expr_inline)
        .collect::<Vec<_>>()
        .join(", ")
}

fn pattern_inline(pattern: &HirPattern) -> String {
    match &pattern.kind {
        HirPatternKind::Wildcard => "_".to_string(),
        HirPatternKind::Binding { name, mutable } => {
            if *mutable {
                format!("mut {name}")
            } else {
                name.to_string()
            }
        }
        HirPatternKind::Literal(lit) => lit_inline(lit),
        HirPatternKind::Tuple(pats) => {
            let inner: Vec<String> = pats.iter().map(pattern_inline).collect();
            format!("({})", inner.join(", "))
        }
        HirPatternKind::Struct { name, fields } => {
            let inner: Vec<String> = fields
                .iter()
                .map(|(i, p)| format!("#{i}: {}", pattern_inline(p)))
                .collect();
            format!("{name} {{ {} }}", inner.join(", "))
        }
        HirPatternKind::Enum {
            enum_name,
            variant,
            payload,
        } => {
            let inner: Vec<String> = payload.iter().map(pattern_inline).collect();
            format!("{enum_name}#{variant}({})", inner.join(", "))
        }
        HirPatternKind::Or(pats) => {
            let inner: Vec<String> = pats.iter().map(pattern_inline).collect();
            inner.join(" | ")
        }
        HirPatternKind::Range {
            start,
            end,
            inclusive,
        } => {
            let op = if *inclusive { "..=" } else { ".." };
            format!("{}{op}{}", lit_inline(start), lit_inline(end))
        }
        HirPatternKind::Array {
            prefix,
            has_rest,
            suffix,
        } => {
            let mut parts: Vec<String> = prefix.iter().map(pattern_inline).collect();
            if *has_rest {
                parts.push("..".to_string());
            }
            parts.extend(suffix.iter().map(pattern_inline));
            format!("[{}]", parts.join(", "))
        }
    }
}

fn lit_inline(lit: &Lit) -> String {
    match lit {
        Lit::Int(v) => v.to_string(),
        Lit::Uint(v) => v.to_string(),
        Lit::Float(v) => format!("{v}"),
        Lit::Bool(v) => v.to_string(),
        Lit::Char(c) => format!("'{c}'"),
        Lit::Str(s) => format!("{:?}", s.as_str()),
        Lit::Unit => "()".to_string(),
    }
}

fn binop_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
    }
}

fn unop_str(op: UnOp) -> &'static str {
    match op {
        UnOp::Neg => "-",
        UnOp::Not => "!",
        UnOp::BitNot => "~",
    }
}
