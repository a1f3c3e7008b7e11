//! Function construction surface.
//!
//! The external MIR lowering drives this builder to produce SSA functions;
//! the in-crate tests use it the same way. It hands out fresh value and
//! block ids, keeps a current-block cursor, and recomputes the materialized
//! predecessor and successor lists on `build`.

use veldc_sem::{IntWidth, Type};
use veldc_util::Symbol;

use crate::mir::{
    BasicBlock, BinaryOp, BlockId, ConstValue, FnAttr, Function, InstKind, Instruction,
    Terminator, ValueId,
};

/// Incremental SSA function builder.
pub struct FunctionBuilder {
    func: Function,
    current: Option<BlockId>,
}

impl FunctionBuilder {
    pub fn new(name: &str, ret: Type) -> Self {
        Self {
            func: Function::new(Symbol::intern(name), ret),
            current: None,
        }
    }

    /// Add a function attribute.
    pub fn attr(&mut self, attr: FnAttr) -> &mut Self {
        self.func.attrs.push(attr);
        self
    }

    /// Declare a parameter, returning its SSA value.
    pub fn param(&mut self, ty: Type) -> ValueId {
        let id = self.func.new_value_id();
        self.func.params.push((id, ty));
        id
    }

    /// Create a new block. The first block becomes the entry and the
    /// cursor moves there automatically.
    pub fn block(&mut self) -> BlockId {
        let id = self.func.new_block();
        if self.current.is_none() {
            self.current = Some(id);
        }
        id
    }

    /// Move the cursor.
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    pub fn current_block(&self) -> BlockId {
        self.current.expect("no block created yet")
    }

    fn current_mut(&mut self) -> &mut BasicBlock {
        let id = self.current.expect("no block created yet");
        self.func.block_mut(id).expect("current block exists")
    }

    /// Append a value-producing instruction and return its result.
    pub fn push(&mut self, ty: Type, kind: InstKind) -> ValueId {
        debug_assert!(
            !matches!(kind, InstKind::Store { .. }),
            "stores have no result; use push_store"
        );
        let result = self.func.new_value_id();
        self.current_mut()
            .instructions
            .push(Instruction::new(result, ty, kind));
        result
    }

    /// Append a store.
    pub fn push_store(&mut self, ptr: ValueId, value: ValueId) {
        self.current_mut().instructions.push(Instruction::new(
            ValueId::INVALID,
            Type::Unit,
            InstKind::Store {
                ptr,
                value,
                volatile: false,
            },
        ));
    }

    /// Seal the current block with a terminator.
    pub fn terminate(&mut self, terminator: Terminator) {
        let block = self.current_mut();
        debug_assert!(block.terminator.is_none(), "block already terminated");
        block.terminator = Some(terminator);
    }

    // ------------------------------------------------------------------
    // Convenience constructors
    // ------------------------------------------------------------------

    pub fn const_i32(&mut self, value: i64) -> ValueId {
        self.push(
            Type::I32,
            InstKind::Constant(ConstValue::Int {
                value,
                width: IntWidth::W32,
            }),
        )
    }

    pub fn const_i64(&mut self, value: i64) -> ValueId {
        self.push(
            Type::I64,
            InstKind::Constant(ConstValue::Int {
                value,
                width: IntWidth::W64,
            }),
        )
    }

    pub fn const_u32(&mut self, value: u64) -> ValueId {
        self.push(
            Type::Uint(IntWidth::W32),
            InstKind::Constant(ConstValue::Uint {
                value,
                width: IntWidth::W32,
            }),
        )
    }

    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.push(Type::Bool, InstKind::Constant(ConstValue::Bool(value)))
    }

    pub fn binary(&mut self, ty: Type, op: BinaryOp, left: ValueId, right: ValueId) -> ValueId {
        self.push(ty, InstKind::Binary { op, left, right })
    }

    pub fn alloca(&mut self, allocated_ty: Type) -> ValueId {
        self.push(
            Type::Ptr(Box::new(allocated_ty.clone())),
            InstKind::Alloca {
                name: None,
                allocated_ty,
                volatile: false,
            },
        )
    }

    pub fn load(&mut self, ty: Type, ptr: ValueId) -> ValueId {
        self.push(
            ty,
            InstKind::Load {
                ptr,
                volatile: false,
            },
        )
    }

    pub fn call(&mut self, ty: Type, callee: &str, args: Vec<ValueId>) -> ValueId {
        self.push(
            ty,
            InstKind::Call {
                callee: Symbol::intern(callee),
                args,
                tail_call: false,
            },
        )
    }

    /// Finish, recomputing the pred/succ lists.
    pub fn build(mut self) -> Function {
        self.func.recompute_cfg();
        self.func
    }
}
