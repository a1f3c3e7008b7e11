//! Array length normalization.
//!
//! `.len()` on a value whose type is a fixed-size array is a compile-time
//! constant; the method call is replaced by that constant.

use veldc_sem::{IntWidth, Type};
use veldc_util::Symbol;

use crate::mir::{ConstValue, Function, InstKind};
use crate::pass::MirPass;

pub struct NormalizeArrayLen;

impl MirPass for NormalizeArrayLen {
    fn name(&self) -> &'static str {
        "normalize-array-len"
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool {
        let len_name = Symbol::intern("len");
        let mut changed = false;

        for block in &mut func.blocks {
            for inst in &mut block.instructions {
                let InstKind::MethodCall {
                    receiver_ty,
                    method,
                    args,
                    ..
                } = &inst.kind
                else {
                    continue;
                };
                if *method != len_name || !args.is_empty() {
                    continue;
                }
                let length = match receiver_ty {
                    Type::Array(_, n) => *n,
                    Type::Ref(inner, _) | Type::Ptr(inner) => match inner.as_ref() {
                        Type::Array(_, n) => *n,
                        _ => continue,
                    },
                    _ => continue,
                };
                inst.kind = InstKind::Constant(ConstValue::Uint {
                    value: length,
                    width: IntWidth::W64,
                });
                changed = true;
            }
        }

        changed
    }
}
