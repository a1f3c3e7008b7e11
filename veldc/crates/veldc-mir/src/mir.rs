//! MIR data model: SSA functions, basic blocks, typed instructions.

use veldc_sem::{IntWidth, Type};
use veldc_util::{FxHashMap, Symbol};

/// SSA value identifier, scoped to one function. 0 is reserved as invalid;
/// instructions without a result (stores) carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u32);

impl ValueId {
    pub const INVALID: ValueId = ValueId(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// Basic block identifier, scoped to one function. The entry block has the
/// smallest id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

/// Function attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FnAttr {
    Inline,
    AlwaysInline,
    NoInline,
    Export,
    Test,
    Bench,
    Fuzz,
    Extern,
}

/// A compile-time constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int {
        value: i64,
        width: IntWidth,
    },
    Uint {
        value: u64,
        width: IntWidth,
    },
    Float {
        value: f64,
        is_f64: bool,
    },
    Bool(bool),
    Char(char),
    Str(Symbol),
    Unit,
}

impl ConstValue {
    /// Integer view covering signed, unsigned, char, and bool constants.
    pub fn as_int(&self) -> Option<i128> {
        match self {
            ConstValue::Int { value, .. } => Some(*value as i128),
            ConstValue::Uint { value, .. } => Some(*value as i128),
            ConstValue::Char(c) => Some(*c as i128),
            ConstValue::Bool(b) => Some(*b as i128),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            ConstValue::Int { value, .. } => *value == 0,
            ConstValue::Uint { value, .. } => *value == 0,
            ConstValue::Float { value, .. } => *value == 0.0,
            _ => false,
        }
    }

    pub fn is_one(&self) -> bool {
        match self {
            ConstValue::Int { value, .. } => *value == 1,
            ConstValue::Uint { value, .. } => *value == 1,
            ConstValue::Float { value, .. } => *value == 1.0,
            _ => false,
        }
    }

    pub fn is_all_ones(&self) -> bool {
        match self {
            ConstValue::Int { value, .. } => *value == -1,
            ConstValue::Uint { value, width } => {
                let bits = width.bits();
                if bits >= 64 {
                    *value == u64::MAX
                } else {
                    *value == (1u64 << bits) - 1
                }
            }
            _ => false,
        }
    }
}

/// Binary instruction operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Mul
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Unary instruction operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

/// Cast kinds. The kind must match the source and target widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    ZExt,
    SExt,
    Trunc,
    FpToSi,
    SiToFp,
    FpExt,
    FpTrunc,
    Bitcast,
    PtrToInt,
    IntToPtr,
}

/// One index step of a GEP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GepIndex {
    Const(u64),
    Value(ValueId),
}

/// Instruction payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Constant(ConstValue),
    Binary {
        op: BinaryOp,
        left: ValueId,
        right: ValueId,
    },
    Unary {
        op: UnaryOp,
        operand: ValueId,
    },
    Cast {
        kind: CastKind,
        source_ty: Type,
        target_ty: Type,
        operand: ValueId,
    },
    Alloca {
        name: Option<Symbol>,
        allocated_ty: Type,
        volatile: bool,
    },
    Load {
        ptr: ValueId,
        volatile: bool,
    },
    /// No result.
    Store {
        ptr: ValueId,
        value: ValueId,
        volatile: bool,
    },
    Gep {
        base: ValueId,
        indices: Vec<GepIndex>,
    },
    ExtractValue {
        aggregate: ValueId,
        indices: Vec<u32>,
    },
    InsertValue {
        aggregate: ValueId,
        value: ValueId,
        indices: Vec<u32>,
    },
    Call {
        callee: Symbol,
        args: Vec<ValueId>,
        /// Set by the tail-call pass; a hint for the backend.
        tail_call: bool,
    },
    MethodCall {
        receiver: ValueId,
        receiver_ty: Type,
        method: Symbol,
        args: Vec<ValueId>,
        tail_call: bool,
    },
    Phi {
        incomings: Vec<(ValueId, BlockId)>,
    },
    Select {
        cond: ValueId,
        true_val: ValueId,
        false_val: ValueId,
    },
    StructInit {
        name: Symbol,
        fields: Vec<ValueId>,
    },
    EnumInit {
        name: Symbol,
        variant: u32,
        payload: Vec<ValueId>,
    },
    TupleInit {
        elems: Vec<ValueId>,
    },
    ArrayInit {
        elems: Vec<ValueId>,
    },
    /// Opaque suspension point: has side effects, never hoisted, CSE'd, or
    /// reordered across.
    Await {
        operand: ValueId,
    },
    ClosureInit {
        function: Symbol,
        captures: Vec<ValueId>,
    },
}

impl InstKind {
    /// Visit every value operand.
    pub fn for_each_operand(&self, mut f: impl FnMut(ValueId)) {
        match self {
            InstKind::Constant(_) | InstKind::Alloca { .. } => {}
            InstKind::Binary { left, right, .. } => {
                f(*left);
                f(*right);
            }
            InstKind::Unary { operand, .. }
            | InstKind::Cast { operand, .. }
            | InstKind::Load { ptr: operand, .. }
            | InstKind::Await { operand } => f(*operand),
            InstKind::Store { ptr, value, .. } => {
                f(*ptr);
                f(*value);
            }
            InstKind::Gep { base, indices } => {
                f(*base);
                for index in indices {
                    if let GepIndex::Value(v) = index {
                        f(*v);
                    }
                }
            }
            InstKind::ExtractValue { aggregate, .. } => f(*aggregate),
            InstKind::InsertValue {
                aggregate, value, ..
            } => {
                f(*aggregate);
                f(*value);
            }
            InstKind::Call { args, .. } => {
                for arg in args {
                    f(*arg);
                }
            }
            InstKind::MethodCall { receiver, args, .. } => {
                f(*receiver);
                for arg in args {
                    f(*arg);
                }
            }
            InstKind::Phi { incomings } => {
                for (value, _) in incomings {
                    f(*value);
                }
            }
            InstKind::Select {
                cond,
                true_val,
                false_val,
            } => {
                f(*cond);
                f(*true_val);
                f(*false_val);
            }
            InstKind::StructInit { fields: vals, .. }
            | InstKind::EnumInit { payload: vals, .. }
            | InstKind::TupleInit { elems: vals }
            | InstKind::ArrayInit { elems: vals }
            | InstKind::ClosureInit { captures: vals, .. } => {
                for v in vals {
                    f(*v);
                }
            }
        }
    }

    /// Rewrite every value operand in place.
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match self {
            InstKind::Constant(_) | InstKind::Alloca { .. } => {}
            InstKind::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            InstKind::Unary { operand, .. }
            | InstKind::Cast { operand, .. }
            | InstKind::Load { ptr: operand, .. }
            | InstKind::Await { operand } => f(operand),
            InstKind::Store { ptr, value, .. } => {
                f(ptr);
                f(value);
            }
            InstKind::Gep { base, indices } => {
                f(base);
                for index in indices {
                    if let GepIndex::Value(v) = index {
                        f(v);
                    }
                }
            }
            InstKind::ExtractValue { aggregate, .. } => f(aggregate),
            InstKind::InsertValue {
                aggregate, value, ..
            } => {
                f(aggregate);
                f(value);
            }
            InstKind::Call { args, .. } => {
                for arg in args {
                    f(arg);
                }
            }
            InstKind::MethodCall { receiver, args, .. } => {
                f(receiver);
                for arg in args {
                    f(arg);
                }
            }
            InstKind::Phi { incomings } => {
                for (value, _) in incomings {
                    f(value);
                }
            }
            InstKind::Select {
                cond,
                true_val,
                false_val,
            } => {
                f(cond);
                f(true_val);
                f(false_val);
            }
            InstKind::StructInit { fields: vals, .. }
            | InstKind::EnumInit { payload: vals, .. }
            | InstKind::TupleInit { elems: vals }
            | InstKind::ArrayInit { elems: vals }
            | InstKind::ClosureInit { captures: vals, .. } => {
                for v in vals {
                    f(v);
                }
            }
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi { .. })
    }
}

/// One SSA instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Defined value; `ValueId::INVALID` for result-less instructions.
    pub result: ValueId,
    pub ty: Type,
    pub kind: InstKind,
}

impl Instruction {
    pub fn new(result: ValueId, ty: Type, kind: InstKind) -> Self {
        Self { result, ty, kind }
    }
}

/// Block terminator. Every block has exactly one.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Return(Option<ValueId>),
    Branch {
        target: BlockId,
    },
    CondBranch {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Switch {
        discr: ValueId,
        cases: Vec<(i64, BlockId)>,
        default: BlockId,
    },
    Unreachable,
}

impl Terminator {
    /// Successor blocks in edge order.
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Terminator::Return(_) | Terminator::Unreachable => vec![],
            Terminator::Branch { target } => vec![*target],
            Terminator::CondBranch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Switch { cases, default, .. } => {
                let mut targets: Vec<BlockId> = cases.iter().map(|(_, b)| *b).collect();
                targets.push(*default);
                targets
            }
        }
    }

    /// Rewrite successor block ids in place.
    pub fn retarget(&mut self, mut f: impl FnMut(&mut BlockId)) {
        match self {
            Terminator::Return(_) | Terminator::Unreachable => {}
            Terminator::Branch { target } => f(target),
            Terminator::CondBranch {
                then_block,
                else_block,
                ..
            } => {
                f(then_block);
                f(else_block);
            }
            Terminator::Switch { cases, default, .. } => {
                for (_, target) in cases {
                    f(target);
                }
                f(default);
            }
        }
    }

    /// Visit value operands referenced by the terminator.
    pub fn for_each_operand(&self, mut f: impl FnMut(ValueId)) {
        match self {
            Terminator::Return(Some(v)) => f(*v),
            Terminator::CondBranch { cond, .. } => f(*cond),
            Terminator::Switch { discr, .. } => f(*discr),
            _ => {}
        }
    }

    /// Rewrite value operands referenced by the terminator.
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match self {
            Terminator::Return(Some(v)) => f(v),
            Terminator::CondBranch { cond, .. } => f(cond),
            Terminator::Switch { discr, .. } => f(discr),
            _ => {}
        }
    }
}

/// A basic block.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub name: Option<Symbol>,
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
    /// Materialized from terminators by [`Function::recompute_cfg`].
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            name: None,
            instructions: Vec::new(),
            terminator: None,
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    /// Index of the first non-phi instruction.
    pub fn first_non_phi(&self) -> usize {
        self.instructions
            .iter()
            .position(|i| !i.kind.is_phi())
            .unwrap_or(self.instructions.len())
    }
}

/// An SSA function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Symbol,
    pub params: Vec<(ValueId, Type)>,
    pub ret: Type,
    pub attrs: Vec<FnAttr>,
    pub next_value_id: u32,
    pub next_block_id: u32,
    /// Ordered blocks; index 0 is the entry.
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn new(name: Symbol, ret: Type) -> Self {
        Self {
            name,
            params: Vec::new(),
            ret,
            attrs: Vec::new(),
            next_value_id: 1,
            next_block_id: 0,
            blocks: Vec::new(),
        }
    }

    pub fn has_attr(&self, attr: FnAttr) -> bool {
        self.attrs.contains(&attr)
    }

    /// Allocate a fresh SSA value id.
    pub fn new_value_id(&mut self) -> ValueId {
        let id = ValueId(self.next_value_id);
        self.next_value_id += 1;
        id
    }

    /// Allocate and append a fresh block.
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.push(BasicBlock::new(id));
        id
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.first().map(|b| b.id)
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    pub fn block_index(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    /// Total instruction count across all blocks.
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }

    /// Recompute every block's predecessor and successor lists from the
    /// terminators. Structural passes call this after editing the CFG.
    pub fn recompute_cfg(&mut self) {
        let mut preds: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        let mut succs: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for block in &self.blocks {
            let targets = block
                .terminator
                .as_ref()
                .map(|t| t.targets())
                .unwrap_or_default();
            succs.insert(block.id, targets.clone());
            for target in targets {
                preds.entry(target).or_default().push(block.id);
            }
        }
        for block in &mut self.blocks {
            block.preds = preds.remove(&block.id).unwrap_or_default();
            block.succs = succs.remove(&block.id).unwrap_or_default();
        }
    }

    /// The instruction defining `value`, if any.
    pub fn def_of(&self, value: ValueId) -> Option<&Instruction> {
        self.blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .find(|i| i.result == value)
    }

    /// Replace every use of `from` with `to`, in instructions, phis, and
    /// terminators.
    pub fn replace_uses(&mut self, from: ValueId, to: ValueId) {
        for block in &mut self.blocks {
            for inst in &mut block.instructions {
                inst.kind.for_each_operand_mut(|operand| {
                    if *operand == from {
                        *operand = to;
                    }
                });
            }
            if let Some(term) = &mut block.terminator {
                term.for_each_operand_mut(|operand| {
                    if *operand == from {
                        *operand = to;
                    }
                });
            }
        }
    }

    /// Number of uses of `value` across the function.
    pub fn count_uses(&self, value: ValueId) -> usize {
        let mut count = 0;
        for block in &self.blocks {
            for inst in &block.instructions {
                inst.kind.for_each_operand(|operand| {
                    if operand == value {
                        count += 1;
                    }
                });
            }
            if let Some(term) = &block.terminator {
                term.for_each_operand(|operand| {
                    if operand == value {
                        count += 1;
                    }
                });
            }
        }
        count
    }
}

/// Struct layout table entry: field name to ordinal and payload type.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: Symbol,
    pub fields: Vec<(Symbol, Type)>,
}

impl StructDef {
    pub fn field_index(&self, field: Symbol) -> Option<u32> {
        self.fields
            .iter()
            .position(|(n, _)| *n == field)
            .map(|i| i as u32)
    }
}

/// Enum layout table entry: variant name to ordinal and payload types.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: Symbol,
    pub variants: Vec<(Symbol, Vec<Type>)>,
}

/// A MIR module: functions plus layout tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub functions: Vec<Function>,
    pub structs: Vec<StructDef>,
    pub enums: Vec<EnumDef>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(&self, name: Symbol) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: Symbol) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn struct_def(&self, name: Symbol) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn enum_def(&self, name: Symbol) -> Option<&EnumDef> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// Total instruction count across all functions.
    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(Function::instruction_count).sum()
    }
}
