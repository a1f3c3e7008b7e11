//! Module-level HIR passes.
//!
//! A small hook that runs before MIR lowering. The only stock pass folds
//! constant integer arithmetic inside function bodies, which keeps trivial
//! constants from surviving all the way into MIR at O1 and above.

use veldc_sem::ast::{BinOp, Lit};

use crate::expr::{HirArm, HirBlock, HirExpr, HirExprKind};
use crate::module::HirModule;
use crate::stmt::HirStmt;

/// A transformation over a whole HIR module.
pub trait HirPass {
    fn name(&self) -> &'static str;

    /// Run the pass; returns true if the module changed.
    fn run(&mut self, module: &mut HirModule) -> bool;
}

/// Folds integer and boolean literal arithmetic in HIR.
#[derive(Default)]
pub struct HirConstFold;

impl HirPass for HirConstFold {
    fn name(&self) -> &'static str {
        "hir-const-fold"
    }

    fn run(&mut self, module: &mut HirModule) -> bool {
        let mut changed = false;
        for func in &mut module.functions {
            if let Some(body) = &mut func.body {
                changed |= fold_expr(body);
            }
        }
        for imp in &mut module.impls {
            for method in &mut imp.methods {
                if let Some(body) = &mut method.body {
                    changed |= fold_expr(body);
                }
            }
        }
        changed
    }
}

fn fold_expr(expr: &mut HirExpr) -> bool {
    let mut changed = fold_children(expr);

    if let HirExprKind::Binary { op, left, right } = &expr.kind {
        if let (HirExprKind::Literal(Lit::Int(l)), HirExprKind::Literal(Lit::Int(r))) =
            (&left.kind, &right.kind)
        {
            if let Some(folded) = fold_int(*op, *l, *r) {
                expr.kind = HirExprKind::Literal(folded);
                return true;
            }
        }
    }

    changed
}

/// Fold `l op r` for integer literals. Division and modulo by zero are
/// never folded.
fn fold_int(op: BinOp, l: i64, r: i64) -> Option<Lit> {
    Some(match op {
        BinOp::Add => Lit::Int(l.wrapping_add(r)),
        BinOp::Sub => Lit::Int(l.wrapping_sub(r)),
        BinOp::Mul => Lit::Int(l.wrapping_mul(r)),
        BinOp::Div if r != 0 => Lit::Int(l.wrapping_div(r)),
        BinOp::Mod if r != 0 => Lit::Int(l.wrapping_rem(r)),
        BinOp::Eq => Lit::Bool(l == r),
        BinOp::Ne => Lit::Bool(l != r),
        BinOp::Lt => Lit::Bool(l < r),
        BinOp::Le => Lit::Bool(l <= r),
        BinOp::Gt => Lit::Bool(l > r),
        BinOp::Ge => Lit::Bool(l >= r),
        BinOp::BitAnd => Lit::Int(l & r),
        BinOp::BitOr => Lit::Int(l | r),
        BinOp::BitXor => Lit::Int(l ^ r),
        _ => return None,
    })
}

fn fold_children(expr: &mut HirExpr) -> bool {
    let mut changed = false;
    match &mut expr.kind {
        HirExprKind::Binary { left, right, .. } => {
            changed |= fold_expr(left);
            changed |= fold_expr(right);
        }
        HirExprKind::Unary { operand, .. } => changed |= fold_expr(operand),
        HirExprKind::Call { args, .. } | HirExprKind::Lowlevel { args, .. } => {
            for arg in args {
                changed |= fold_expr(arg);
            }
        }
        HirExprKind::MethodCall { receiver, args, .. } => {
            changed |= fold_expr(receiver);
            for arg in args {
                changed |= fold_expr(arg);
            }
        }
        HirExprKind::Field { object, .. } => changed |= fold_expr(object),
        HirExprKind::Index { object, index } => {
            changed |= fold_expr(object);
            changed |= fold_expr(index);
        }
        HirExprKind::Tuple(elems)
        | HirExprKind::Array(elems)
        | HirExprKind::StructInit { fields: elems, .. }
        | HirExprKind::EnumInit { payload: elems, .. } => {
            for elem in elems {
                changed |= fold_expr(elem);
            }
        }
        HirExprKind::ArrayRepeat { elem, .. } => changed |= fold_expr(elem),
        HirExprKind::Block(block) => changed |= fold_block(block),
        HirExprKind::If {
            cond,
            then_expr,
            else_expr,
        } => {
            changed |= fold_expr(cond);
            changed |= fold_expr(then_expr);
            if let Some(e) = else_expr {
                changed |= fold_expr(e);
            }
        }
        HirExprKind::When { scrutinee, arms } => {
            changed |= fold_expr(scrutinee);
            for HirArm { guard, body, .. } in arms {
                if let Some(g) = guard {
                    changed |= fold_expr(g);
                }
                changed |= fold_expr(body);
            }
        }
        HirExprKind::Loop { body } => changed |= fold_expr(body),
        HirExprKind::While { cond, body } => {
            changed |= fold_expr(cond);
            changed |= fold_expr(body);
        }
        HirExprKind::Return(Some(v)) | HirExprKind::Break(Some(v)) => changed |= fold_expr(v),
        HirExprKind::Closure { body, .. } => changed |= fold_expr(body),
        HirExprKind::Cast { operand, .. } => changed |= fold_expr(operand),
        HirExprKind::Try { inner } | HirExprKind::Await { inner } => {
            changed |= fold_expr(inner)
        }
        HirExprKind::Assign { place, value }
        | HirExprKind::CompoundAssign { place, value, .. } => {
            changed |= fold_expr(place);
            changed |= fold_expr(value);
        }
        _ => {}
    }
    changed
}

fn fold_block(block: &mut HirBlock) -> bool {
    let mut changed = false;
    for stmt in &mut block.stmts {
        match stmt {
            HirStmt::Let { init: Some(init), .. } => changed |= fold_expr(init),
            HirStmt::Expr(e) => changed |= fold_expr(e),
            _ => {}
        }
    }
    if let Some(tail) = &mut block.tail {
        changed |= fold_expr(tail);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::HirFunction;
    use crate::id::HirId;
    use veldc_sem::Type;
    use veldc_util::{Span, Symbol};

    fn lit(v: i64) -> HirExpr {
        HirExpr::new(
            HirId(1),
            Type::I32,
            Span::DUMMY,
            HirExprKind::Literal(Lit::Int(v)),
        )
    }

    fn binary(op: BinOp, l: HirExpr, r: HirExpr) -> HirExpr {
        HirExpr::new(
            HirId(2),
            Type::I32,
            Span::DUMMY,
            HirExprKind::Binary {
                op,
                left: Box::new(l),
                right: Box::new(r),
            },
        )
    }

    fn module_with_body(body: HirExpr) -> HirModule {
        let mut module = HirModule::new(Symbol::intern("m"), "m.veld");
        module.functions.push(HirFunction {
            id: HirId(10),
            name: Symbol::intern("f"),
            mangled_name: Symbol::intern("f"),
            params: vec![],
            ret: Type::I32,
            body: Some(body),
            attrs: vec![],
            span: Span::DUMMY,
        });
        module
    }

    #[test]
    fn folds_nested_constant_arithmetic() {
        // (2 + 3) * 4
        let body = binary(BinOp::Mul, binary(BinOp::Add, lit(2), lit(3)), lit(4));
        let mut module = module_with_body(body);
        let mut pass = HirConstFold;
        assert!(pass.run(&mut module));
        // One more run reaches the fixpoint.
        pass.run(&mut module);
        let folded = module.functions[0].body.as_ref().unwrap();
        assert!(matches!(
            folded.kind,
            HirExprKind::Literal(Lit::Int(20))
        ));
    }

    #[test]
    fn never_folds_division_by_zero() {
        let body = binary(BinOp::Div, lit(1), lit(0));
        let mut module = module_with_body(body);
        assert!(!HirConstFold.run(&mut module));
        let kept = module.functions[0].body.as_ref().unwrap();
        assert!(matches!(kept.kind, HirExprKind::Binary { .. }));
    }
}
