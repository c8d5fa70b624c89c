//! IR type definitions.
//!
//! Entities are arena-allocated inside their owning [`Func`] and referred
//! to by integer handles ([`VarId`], [`BlockId`], [`InsnId`]). The arenas
//! are insertion-ordered maps, so creation order is iteration order and
//! serialisation order. Operands hold variable handles, never references;
//! blocks refer to peer blocks through handle sets.
//!
//! The use/def and predecessor/successor indexes stored here are part of
//! the IR, not a cache: the mutator API in `edit` keeps them exact under
//! every edit, and read-only passes may rely on them without recomputing.

use std::fmt;

use indexmap::{IndexMap, IndexSet};

use lattice_foundation::{BinaryOp, Const, Prim, UnaryOp};

use crate::bug;

/// Handle of a variable within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Handle of a code block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Handle of an instruction within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(pub u32);

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// An expression operand: a constant or a variable of the same function.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Const(Const),
    Var(VarId),
}

impl Operand {
    /// The referenced variable, if this operand is one.
    pub fn as_var(&self) -> Option<VarId> {
        match self {
            Operand::Var(v) => Some(*v),
            Operand::Const(_) => None,
        }
    }

    /// True for constant operands.
    pub fn is_const(&self) -> bool {
        matches!(self, Operand::Const(_))
    }
}

impl From<Const> for Operand {
    fn from(c: Const) -> Self {
        Operand::Const(c)
    }
}

impl From<VarId> for Operand {
    fn from(v: VarId) -> Self {
        Operand::Var(v)
    }
}

/// One φ arm: the value the φ takes when control arrives from `pred`.
#[derive(Debug, Clone, PartialEq)]
pub struct PhiEntry {
    pub pred: BlockId,
    pub value: Operand,
}

/// Expression payload: computes a value and assigns the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub dest: VarId,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Combinator: selects a value by the predecessor edge taken.
    /// Legal only at the head of a block.
    Phi(Vec<PhiEntry>),
    Unary { op: UnaryOp, value: Operand },
    Binary { op: BinaryOp, lhs: Operand, rhs: Operand },
    /// Marks the destination as holding an unspecified value.
    Undefined,
}

/// Control-flow payload.
///
/// Jump, branch, and return terminate a block; the calls do not (values
/// flow per the calling convention, outside this IR's scope).
#[derive(Debug, Clone, PartialEq)]
pub enum FlowKind {
    Jump { target: BlockId },
    /// Transfers to `target` when `cond` is true, otherwise falls through.
    Branch { cond: Operand, target: BlockId },
    CallDirect { label: String, args: Vec<Operand> },
    CallPtr { addr: Operand, args: Vec<Operand> },
    Return { value: Option<Operand> },
}

/// An instruction: an expression or a control-flow operation, owned by a
/// code block.
#[derive(Debug, Clone, PartialEq)]
pub struct Insn {
    pub(crate) block: BlockId,
    pub(crate) kind: InsnKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsnKind {
    Expr(Expr),
    Flow(FlowKind),
}

impl Insn {
    /// The block holding this instruction.
    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn kind(&self) -> &InsnKind {
        &self.kind
    }

    pub fn is_expr(&self) -> bool {
        matches!(self.kind, InsnKind::Expr(_))
    }

    pub fn as_expr(&self) -> Option<&Expr> {
        match &self.kind {
            InsnKind::Expr(e) => Some(e),
            InsnKind::Flow(_) => None,
        }
    }

    /// Every variable referenced by an operand slot, in slot order.
    ///
    /// A variable appears once per referencing slot; the destination of an
    /// expression is not a use.
    pub fn uses(&self) -> Vec<VarId> {
        let mut out = Vec::new();
        let mut push = |op: &Operand| {
            if let Operand::Var(v) = op {
                out.push(*v);
            }
        };
        match &self.kind {
            InsnKind::Expr(e) => match &e.kind {
                ExprKind::Phi(entries) => {
                    for entry in entries {
                        push(&entry.value);
                    }
                }
                ExprKind::Unary { value, .. } => push(value),
                ExprKind::Binary { lhs, rhs, .. } => {
                    push(lhs);
                    push(rhs);
                }
                ExprKind::Undefined => {}
            },
            InsnKind::Flow(flow) => match flow {
                FlowKind::Jump { .. } => {}
                FlowKind::Branch { cond, .. } => push(cond),
                FlowKind::CallDirect { args, .. } => {
                    for arg in args {
                        push(arg);
                    }
                }
                FlowKind::CallPtr { addr, args } => {
                    push(addr);
                    for arg in args {
                        push(arg);
                    }
                }
                FlowKind::Return { value } => {
                    if let Some(op) = value {
                        push(op);
                    }
                }
            },
        }
        out
    }

    /// The jump or branch target, if this instruction transfers control.
    pub fn target(&self) -> Option<BlockId> {
        match &self.kind {
            InsnKind::Flow(FlowKind::Jump { target })
            | InsnKind::Flow(FlowKind::Branch { target, .. }) => Some(*target),
            _ => None,
        }
    }
}

/// A variable, owned by a function.
#[derive(Debug, Clone)]
pub struct Var {
    pub(crate) name: String,
    pub(crate) prim: Prim,
    /// Instructions referencing this variable in an operand slot.
    pub(crate) uses: IndexSet<InsnId>,
    /// Expressions assigning this variable, in creation order.
    pub(crate) defs: Vec<InsnId>,
}

impl Var {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prim(&self) -> Prim {
        self.prim
    }

    pub fn uses(&self) -> &IndexSet<InsnId> {
        &self.uses
    }

    pub fn defs(&self) -> &[InsnId] {
        &self.defs
    }
}

/// A code block: named, with instructions in program order and the
/// mutual predecessor/successor sets of the CFG.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) name: String,
    pub(crate) insns: Vec<InsnId>,
    pub(crate) preds: IndexSet<BlockId>,
    pub(crate) succs: IndexSet<BlockId>,
}

impl Block {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insns(&self) -> &[InsnId] {
        &self.insns
    }

    pub fn preds(&self) -> &IndexSet<BlockId> {
        &self.preds
    }

    pub fn succs(&self) -> &IndexSet<BlockId> {
        &self.succs
    }
}

/// An IR function: the owning arena for its variables, blocks, and
/// instructions, plus the argument list and the SSA-enforcement flag.
#[derive(Debug, Clone)]
pub struct Func {
    pub(crate) name: String,
    pub(crate) vars: IndexMap<VarId, Var>,
    pub(crate) blocks: IndexMap<BlockId, Block>,
    pub(crate) insns: IndexMap<InsnId, Insn>,
    pub(crate) args: Vec<VarId>,
    pub(crate) ssa: bool,
    pub(crate) next_var: u32,
    pub(crate) next_block: u32,
    pub(crate) next_insn: u32,
}

impl Func {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether single assignment is being enforced.
    pub fn is_ssa(&self) -> bool {
        self.ssa
    }

    pub fn args(&self) -> &[VarId] {
        &self.args
    }

    /// The entry block: the first block in creation order.
    pub fn entry(&self) -> BlockId {
        match self.blocks.keys().next() {
            Some(&b) => b,
            None => bug!("function %{} has no code blocks", self.name),
        }
    }

    pub fn var(&self, id: VarId) -> &Var {
        match self.vars.get(&id) {
            Some(v) => v,
            None => bug!("unknown variable {id} in function %{}", self.name),
        }
    }

    pub fn block(&self, id: BlockId) -> &Block {
        match self.blocks.get(&id) {
            Some(b) => b,
            None => bug!("unknown code block {id} in function %{}", self.name),
        }
    }

    pub fn insn(&self, id: InsnId) -> &Insn {
        match self.insns.get(&id) {
            Some(i) => i,
            None => bug!("unknown instruction {id} in function %{}", self.name),
        }
    }

    /// Variables in creation order.
    pub fn vars(&self) -> impl Iterator<Item = (VarId, &Var)> {
        self.vars.iter().map(|(id, v)| (*id, v))
    }

    /// Blocks in creation order; the first is the entry.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks.iter().map(|(id, b)| (*id, b))
    }

    /// Snapshot of variable handles, safe to hold across deletions.
    pub fn var_ids(&self) -> Vec<VarId> {
        self.vars.keys().copied().collect()
    }

    /// Snapshot of block handles, safe to hold across deletions.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.keys().copied().collect()
    }

    /// The primitive type an operand carries.
    pub fn operand_prim(&self, op: &Operand) -> Prim {
        match op {
            Operand::Const(c) => c.prim(),
            Operand::Var(v) => self.var(*v).prim(),
        }
    }

    pub(crate) fn var_mut(&mut self, id: VarId) -> &mut Var {
        match self.vars.get_mut(&id) {
            Some(v) => v,
            None => bug!("unknown variable {id} in function %{}", self.name),
        }
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut Block {
        match self.blocks.get_mut(&id) {
            Some(b) => b,
            None => bug!("unknown code block {id} in function %{}", self.name),
        }
    }

    pub(crate) fn insn_mut(&mut self, id: InsnId) -> &mut Insn {
        match self.insns.get_mut(&id) {
            Some(i) => i,
            None => bug!("unknown instruction {id} in function %{}", self.name),
        }
    }
}
