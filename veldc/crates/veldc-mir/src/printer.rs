//! Human-readable MIR dump for `--emit-mir`.
//!
//! A debugging convenience with no compatibility promise.

use std::fmt::Write as _;

use crate::mir::{
    BasicBlock, ConstValue, Function, GepIndex, InstKind, Instruction, Module, Terminator,
};

/// Render a whole module.
pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    for s in &module.structs {
        let fields: Vec<String> = s
            .fields
            .iter()
            .map(|(name, ty)| format!("{name}: {ty}"))
            .collect();
        let _ = writeln!(out, "struct {} {{ {} }}", s.name, fields.join(", "));
    }
    for e in &module.enums {
        let variants: Vec<String> = e
            .variants
            .iter()
            .map(|(name, payload)| {
                if payload.is_empty() {
                    name.to_string()
                } else {
                    let tys: Vec<String> = payload.iter().map(|t| t.to_string()).collect();
                    format!("{name}({})", tys.join(", "))
                }
            })
            .collect();
        let _ = writeln!(out, "enum {} {{ {} }}", e.name, variants.join(", "));
    }
    if !module.structs.is_empty() || !module.enums.is_empty() {
        out.push('\n');
    }
    for func in &module.functions {
        out.push_str(&print_function(func));
        out.push('\n');
    }
    out
}

/// Render the banner printed between passes by `--emit-mir`.
pub fn pass_banner(pass: &str, when: &str) -> String {
    format!(";; ===== {when} {pass} =====\n")
}

/// Render one function.
pub fn print_function(func: &Function) -> String {
    let mut out = String::new();
    let params: Vec<String> = func
        .params
        .iter()
        .map(|(id, ty)| format!("%{}: {ty}", id.0))
        .collect();
    let attrs = if func.attrs.is_empty() {
        String::new()
    } else {
        format!(" {:?}", func.attrs)
    };
    let _ = writeln!(
        out,
        "func {}({}) -> {}{attrs} {{",
        func.name,
        params.join(", "),
        func.ret
    );
    for block in &func.blocks {
        out.push_str(&print_block(block));
    }
    out.push_str("}\n");
    out
}

fn print_block(block: &BasicBlock) -> String {
    let mut out = String::new();
    let preds: Vec<String> = block.preds.iter().map(|p| format!("bb{}", p.0)).collect();
    if preds.is_empty() {
        let _ = writeln!(out, "bb{}:", block.id.0);
    } else {
        let _ = writeln!(out, "bb{}:  ; preds: {}", block.id.0, preds.join(", "));
    }
    for inst in &block.instructions {
        let _ = writeln!(out, "    {}", print_inst(inst));
    }
    match &block.terminator {
        Some(term) => {
            let _ = writeln!(out, "    {}", print_terminator(term));
        }
        None => out.push_str("    <no terminator>\n"),
    }
    out
}

fn print_inst(inst: &Instruction) -> String {
    let lhs = if inst.result.is_valid() {
        format!("%{} = ", inst.result.0)
    } else {
        String::new()
    };
    let body = match &inst.kind {
        InstKind::Constant(c) => format!("const {}", print_const(c)),
        InstKind::Binary { op, left, right } => {
            format!("{op:?} %{}, %{}", left.0, right.0).to_lowercase()
        }
        InstKind::Unary { op, operand } => format!("{op:?} %{}", operand.0).to_lowercase(),
        InstKind::Cast {
            kind,
            target_ty,
            operand,
            ..
        } => format!("cast.{kind:?} %{} to {target_ty}", operand.0),
        InstKind::Alloca { allocated_ty, .. } => format!("alloca {allocated_ty}"),
        InstKind::Load { ptr, volatile } => {
            if *volatile {
                format!("load volatile %{}", ptr.0)
            } else {
                format!("load %{}", ptr.0)
            }
        }
        InstKind::Store {
            ptr,
            value,
            volatile,
        } => {
            if *volatile {
                format!("store volatile %{} -> %{}", value.0, ptr.0)
            } else {
                format!("store %{} -> %{}", value.0, ptr.0)
            }
        }
        InstKind::Gep { base, indices } => {
            let parts: Vec<String> = indices
                .iter()
                .map(|i| match i {
                    GepIndex::Const(c) => c.to_string(),
                    GepIndex::Value(v) => format!("%{}", v.0),
                })
                .collect();
            format!("gep %{}, [{}]", base.0, parts.join(", "))
        }
        InstKind::ExtractValue { aggregate, indices } => {
            format!("extractvalue %{}, {indices:?}", aggregate.0)
        }
        InstKind::InsertValue {
            aggregate,
            value,
            indices,
        } => format!("insertvalue %{}, %{}, {indices:?}", aggregate.0, value.0),
        InstKind::Call {
            callee,
            args,
            tail_call,
        } => {
            let args: Vec<String> = args.iter().map(|a| format!("%{}", a.0)).collect();
            let tail = if *tail_call { "tail " } else { "" };
            format!("{tail}call {callee}({})", args.join(", "))
        }
        InstKind::MethodCall {
            receiver,
            method,
            args,
            tail_call,
            ..
        } => {
            let args: Vec<String> = args.iter().map(|a| format!("%{}", a.0)).collect();
            let tail = if *tail_call { "tail " } else { "" };
            format!("{tail}methodcall %{}.{method}({})", receiver.0, args.join(", "))
        }
        InstKind::Phi { incomings } => {
            let parts: Vec<String> = incomings
                .iter()
                .map(|(v, b)| format!("[%{}, bb{}]", v.0, b.0))
                .collect();
            format!("phi {}", parts.join(", "))
        }
        InstKind::Select {
            cond,
            true_val,
            false_val,
        } => format!("select %{}, %{}, %{}", cond.0, true_val.0, false_val.0),
        InstKind::StructInit { name, fields } => {
            let parts: Vec<String> = fields.iter().map(|v| format!("%{}", v.0)).collect();
            format!("structinit {name} {{ {} }}", parts.join(", "))
        }
        InstKind::EnumInit {
            name,
            variant,
            payload,
        } => {
            let parts: Vec<String> = payload.iter().map(|v| format!("%{}", v.0)).collect();
            format!("enuminit {name}#{variant}({})", parts.join(", "))
        }
        InstKind::TupleInit { elems } => {
            let parts: Vec<String> = elems.iter().map(|v| format!("%{}", v.0)).collect();
            format!("tupleinit ({})", parts.join(", "))
        }
        InstKind::ArrayInit { elems } => {
            let parts: Vec<String> = elems.iter().map(|v| format!("%{}", v.0)).collect();
            format!("arrayinit [{}]", parts.join(", "))
        }
        InstKind::Await { operand } => format!("await %{}", operand.0),
        InstKind::ClosureInit { function, captures } => {
            let parts: Vec<String> = captures.iter().map(|v| format!("%{}", v.0)).collect();
            format!("closureinit {function} [{}]", parts.join(", "))
        }
    };
    format!("{lhs}{body}")
}

fn print_const(c: &ConstValue) -> String {
    match c {
        ConstValue::Int { value, width } => format!("{value}i{}", width.bits()),
        ConstValue::Uint { value, width } => format!("{value}u{}", width.bits()),
        ConstValue::Float { value, is_f64 } => {
            format!("{value}f{}", if *is_f64 { 64 } else { 32 })
        }
        ConstValue::Bool(b) => b.to_string(),
        ConstValue::Char(c) => format!("'{c}'"),
        ConstValue::Str(s) => format!("{:?}", s.as_str()),
        ConstValue::Unit => "()".to_string(),
    }
}

fn print_terminator(term: &Terminator) -> String {
    match term {
        Terminator::Return(Some(v)) => format!("ret %{}", v.0),
        Terminator::Return(None) => "ret".to_string(),
        Terminator::Branch { target } => format!("br bb{}", target.0),
        Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        } => format!("condbr %{}, bb{}, bb{}", cond.0, then_block.0, else_block.0),
        Terminator::Switch {
            discr,
            cases,
            default,
        } => {
            let parts: Vec<String> = cases
                .iter()
                .map(|(v, b)| format!("{v} -> bb{}", b.0))
                .collect();
            format!(
                "switch %{} [{}], default bb{}",
                discr.0,
                parts.join(", "),
                default.0
            )
        }
        Terminator::Unreachable => "unreachable".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::mir::{BinaryOp, Terminator};
    use veldc_sem::Type;

    #[test]
    fn function_dump_mentions_blocks_and_values() {
        let mut b = FunctionBuilder::new("sum", Type::I32);
        b.block();
        let x = b.const_i32(1);
        let y = b.const_i32(2);
        let s = b.binary(Type::I32, BinaryOp::Add, x, y);
        b.terminate(Terminator::Return(Some(s)));
        let func = b.build();

        let text = print_function(&func);
        assert!(text.contains("func sum() -> I32 {"));
        assert!(text.contains("bb0:"));
        assert!(text.contains("const 1i32"));
        assert!(text.contains("add %1, %2"));
        assert!(text.contains("ret %3"));
    }

    #[test]
    fn banner_has_pass_name() {
        let banner = pass_banner("constant-folding", "after");
        assert!(banner.contains("after constant-folding"));
    }
}
