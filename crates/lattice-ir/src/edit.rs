//! The mutator API.
//!
//! Every edit to a function goes through the methods here; each one
//! leaves the bidirectional indexes exact: a variable's use-set names
//! precisely the instructions referencing it, its def-list precisely the
//! expressions assigning it, and jump/branch targets are mirrored in the
//! predecessor/successor sets.
//!
//! Appending expressions, calls, or returns past a jump or branch is a
//! fatal error; appending further jumps or branches is not, so a block
//! may legitimately end `branch ...; jump ...`.

use indexmap::{IndexMap, IndexSet};

use lattice_foundation::{BinaryOp, Prim, UnaryOp};

use crate::bug;
use crate::types::{
    Block, BlockId, Expr, ExprKind, FlowKind, Func, Insn, InsnId, InsnKind, Operand, PhiEntry,
    Var, VarId,
};

impl Func {
    /// Create a function with its argument variables and entry block.
    ///
    /// Arguments default to `S32` and, like all variables, to their
    /// ordinal as a name. Avoid explicit names that are plain decimal
    /// numbers; they can collide with ordinals.
    pub fn new(name: &str, entry_name: &str, arg_names: &[Option<&str>]) -> Func {
        let mut func = Func {
            name: name.to_string(),
            vars: IndexMap::new(),
            blocks: IndexMap::new(),
            insns: IndexMap::new(),
            args: Vec::new(),
            ssa: false,
            next_var: 0,
            next_block: 0,
            next_insn: 0,
        };
        for arg_name in arg_names {
            let v = func.var_create(Prim::S32, *arg_name);
            func.args.push(v);
        }
        func.block_create(Some(entry_name));
        func
    }

    /// Create a variable. `None` names it by its ordinal.
    pub fn var_create(&mut self, prim: Prim, name: Option<&str>) -> VarId {
        let id = VarId(self.next_var);
        self.next_var += 1;
        let name = match name {
            Some(n) => n.to_string(),
            None => self.vars.len().to_string(),
        };
        self.vars.insert(
            id,
            Var {
                name,
                prim,
                uses: IndexSet::new(),
                defs: Vec::new(),
            },
        );
        id
    }

    /// Create a code block. `None` names it by its ordinal.
    pub fn block_create(&mut self, name: Option<&str>) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        let name = match name {
            Some(n) => n.to_string(),
            None => self.blocks.len().to_string(),
        };
        self.blocks.insert(
            id,
            Block {
                name,
                insns: Vec::new(),
                preds: IndexSet::new(),
                succs: IndexSet::new(),
            },
        );
        id
    }

    /// Insert a φ-node at the head of the block.
    ///
    /// The entries must cover the block's current predecessors exactly,
    /// one each, and every entry's type must equal the destination type.
    /// Head insertion cannot land past a terminator, so unlike the other
    /// appends this works on a block that already ends in a jump.
    pub fn add_phi(&mut self, block: BlockId, dest: VarId, entries: Vec<PhiEntry>) -> InsnId {
        let preds = self.block(block).preds().clone();
        if entries.len() != preds.len() {
            bug!(
                "phi for %{} carries {} entries for {} predecessors of <{}>",
                self.var(dest).name(),
                entries.len(),
                preds.len(),
                self.block(block).name()
            );
        }
        let mut seen: IndexSet<BlockId> = IndexSet::new();
        for entry in &entries {
            if !preds.contains(&entry.pred) || !seen.insert(entry.pred) {
                bug!(
                    "phi entry names <{}>, not a distinct predecessor of <{}>",
                    self.block(entry.pred).name(),
                    self.block(block).name()
                );
            }
            if self.operand_prim(&entry.value) != self.var(dest).prim() {
                bug!("phi has conflicting bind and destination types");
            }
        }
        self.check_assignable(dest);
        let id = self.insn_push(
            block,
            InsnKind::Expr(Expr {
                dest,
                kind: ExprKind::Phi(entries),
            }),
            true,
        );
        self.var_mut(dest).defs.push(id);
        id
    }

    /// Append a unary expression.
    ///
    /// `Mov` permits any operand type (implicit cast); `Seqz`/`Snez`
    /// require a Bool destination; the rest require operand type equal to
    /// destination type.
    pub fn add_unary(&mut self, block: BlockId, dest: VarId, op: UnaryOp, value: Operand) -> InsnId {
        self.check_open(block, "expr");
        match op {
            UnaryOp::Mov => {}
            UnaryOp::Seqz | UnaryOp::Snez => {
                if self.var(dest).prim() != Prim::Bool {
                    bug!("{op} must assign a boolean destination");
                }
            }
            _ => {
                if self.operand_prim(&value) != self.var(dest).prim() {
                    bug!("unary {op} has conflicting operand and destination types");
                }
            }
        }
        self.check_assignable(dest);
        let id = self.insn_push(
            block,
            InsnKind::Expr(Expr {
                dest,
                kind: ExprKind::Unary { op, value },
            }),
            false,
        );
        self.var_mut(dest).defs.push(id);
        id
    }

    /// Append a binary expression. Both operand types must equal the
    /// destination type.
    pub fn add_binary(
        &mut self,
        block: BlockId,
        dest: VarId,
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    ) -> InsnId {
        self.check_open(block, "expr");
        if self.operand_prim(&lhs) != self.var(dest).prim()
            || self.operand_prim(&rhs) != self.var(dest).prim()
        {
            bug!("binary {op} has conflicting operand and destination types");
        }
        self.check_assignable(dest);
        let id = self.insn_push(
            block,
            InsnKind::Expr(Expr {
                dest,
                kind: ExprKind::Binary { op, lhs, rhs },
            }),
            false,
        );
        self.var_mut(dest).defs.push(id);
        id
    }

    /// Append an expression marking the destination as undefined.
    pub fn add_undefined(&mut self, block: BlockId, dest: VarId) -> InsnId {
        self.check_open(block, "expr");
        self.check_assignable(dest);
        let id = self.insn_push(
            block,
            InsnKind::Expr(Expr {
                dest,
                kind: ExprKind::Undefined,
            }),
            false,
        );
        self.var_mut(dest).defs.push(id);
        id
    }

    /// Append an unconditional jump and record the CFG edge.
    pub fn add_jump(&mut self, from: BlockId, to: BlockId) -> InsnId {
        let id = self.insn_push(from, InsnKind::Flow(FlowKind::Jump { target: to }), false);
        self.block_mut(from).succs.insert(to);
        self.block_mut(to).preds.insert(from);
        id
    }

    /// Append a conditional branch and record the CFG edge.
    /// The condition must be Bool.
    pub fn add_branch(&mut self, from: BlockId, cond: Operand, to: BlockId) -> InsnId {
        if self.operand_prim(&cond) != Prim::Bool {
            bug!("branch requires a boolean condition");
        }
        let id = self.insn_push(
            from,
            InsnKind::Flow(FlowKind::Branch { cond, target: to }),
            false,
        );
        self.block_mut(from).succs.insert(to);
        self.block_mut(to).preds.insert(from);
        id
    }

    /// Append a direct call by symbolic label.
    pub fn add_call_direct(&mut self, block: BlockId, label: &str, args: Vec<Operand>) -> InsnId {
        self.check_open(block, "call");
        self.insn_push(
            block,
            InsnKind::Flow(FlowKind::CallDirect {
                label: label.to_string(),
                args,
            }),
            false,
        )
    }

    /// Append an indirect call through a function-pointer operand.
    pub fn add_call_ptr(&mut self, block: BlockId, addr: Operand, args: Vec<Operand>) -> InsnId {
        self.check_open(block, "call");
        self.insn_push(block, InsnKind::Flow(FlowKind::CallPtr { addr, args }), false)
    }

    /// Append a return, optionally carrying a value.
    pub fn add_return(&mut self, block: BlockId, value: Option<Operand>) -> InsnId {
        self.check_open(block, "return");
        self.insn_push(block, InsnKind::Flow(FlowKind::Return { value }), false)
    }

    /// Delete one instruction, detaching it from its block's list, from
    /// the use-set of every operand variable, and from its destination's
    /// def-list. No cascade.
    pub fn insn_delete(&mut self, id: InsnId) {
        let insn = match self.insns.shift_remove(&id) {
            Some(i) => i,
            None => bug!("deleting unknown instruction {id} in function %{}", self.name),
        };
        self.block_mut(insn.block).insns.retain(|&i| i != id);
        if let InsnKind::Expr(e) = &insn.kind {
            self.var_mut(e.dest).defs.retain(|&d| d != id);
        }
        for v in insn.uses() {
            self.var_mut(v).uses.shift_remove(&id);
        }
    }

    /// Substitute `value` for every operand slot referencing `v`.
    ///
    /// Assignments to `v` are untouched and `v` itself is not deleted;
    /// its use-set is empty on return. Replacing a variable with itself
    /// would never terminate in the passes built on this and is fatal.
    pub fn var_replace(&mut self, v: VarId, value: &Operand) {
        if value.as_var() == Some(v) {
            bug!(
                "variable %{} asked to be replaced with itself",
                self.var(v).name()
            );
        }
        let users: Vec<InsnId> = self.var(v).uses().iter().copied().collect();
        for id in users {
            self.rewrite_operands(id, v, value, true);
        }
        self.var_mut(v).uses.clear();
    }

    /// Delete a variable, every instruction assigning or referencing it,
    /// and its argument slot if it is an argument.
    pub fn var_delete(&mut self, v: VarId) {
        let var = self.var(v);
        let mut doomed: IndexSet<InsnId> = var.uses().clone();
        doomed.extend(var.defs().iter().copied());
        for id in doomed {
            self.insn_delete(id);
        }
        self.vars.shift_remove(&v);
        self.args.retain(|&a| a != v);
    }

    /// Delete a code block.
    ///
    /// Jumps and branches into the block are deleted from its
    /// predecessors; φ-nodes in its successors drop the entry for the
    /// vanished edge, and a φ left with a single entry is collapsed
    /// through [`Func::var_replace`] and removed.
    pub fn block_delete(&mut self, b: BlockId) {
        let preds: Vec<BlockId> = self.block(b).preds().iter().copied().collect();
        for p in preds {
            self.block_mut(p).succs.shift_remove(&b);
            for id in self.block(p).insns().to_vec() {
                if self.insn(id).target() == Some(b) {
                    self.insn_delete(id);
                }
            }
        }
        let succs: Vec<BlockId> = self.block(b).succs().iter().copied().collect();
        for s in succs {
            self.block_mut(s).preds.shift_remove(&b);
            for id in self.block(s).insns().to_vec() {
                // a collapse below can delete a φ out from under the walk
                if !self.insns.contains_key(&id) {
                    continue;
                }
                if matches!(
                    self.insn(id).kind(),
                    InsnKind::Expr(Expr {
                        kind: ExprKind::Phi(_),
                        ..
                    })
                ) {
                    self.remove_phi_path(id, b);
                }
            }
        }
        for id in self.block(b).insns().to_vec() {
            self.insn_delete(id);
        }
        self.blocks.shift_remove(&b);
    }

    /// Drop the φ entry arriving from `from`; collapse the φ if a single
    /// entry remains.
    fn remove_phi_path(&mut self, id: InsnId, from: BlockId) {
        let mut removed: Option<VarId> = None;
        let mut collapse: Option<(VarId, Operand)> = None;
        if let InsnKind::Expr(e) = &mut self.insn_mut(id).kind {
            if let ExprKind::Phi(entries) = &mut e.kind {
                if let Some(i) = entries.iter().position(|entry| entry.pred == from) {
                    removed = entries[i].value.as_var();
                    entries.remove(i);
                }
                if entries.len() == 1 {
                    collapse = Some((e.dest, entries[0].value.clone()));
                }
            }
        }
        if let Some(w) = removed {
            self.sync_use(id, w);
        }
        if let Some((dest, bind)) = collapse {
            self.var_replace(dest, &bind);
            self.insn_delete(id);
        }
    }

    /// Allocate an instruction, register the uses of its operands, and
    /// splice it into the block (at the head for φ-nodes).
    fn insn_push(&mut self, block: BlockId, kind: InsnKind, at_head: bool) -> InsnId {
        let id = InsnId(self.next_insn);
        self.next_insn += 1;
        let insn = Insn { block, kind };
        for v in insn.uses() {
            self.var_mut(v).uses.insert(id);
        }
        self.insns.insert(id, insn);
        let b = self.block_mut(block);
        if at_head {
            b.insns.insert(0, id);
        } else {
            b.insns.push(id);
        }
        id
    }

    /// Fatal if the block's last instruction is a jump or branch.
    fn check_open(&self, block: BlockId, what: &str) {
        if let Some(&last) = self.block(block).insns().last() {
            if self.insn(last).target().is_some() {
                bug!(
                    "cannot add {what} after jump or branch in block <{}>",
                    self.block(block).name()
                );
            }
        }
    }

    /// Fatal on a second assignment under SSA enforcement.
    fn check_assignable(&self, dest: VarId) {
        if self.ssa && !self.var(dest).defs().is_empty() {
            bug!("SSA variable %{} assigned twice", self.var(dest).name());
        }
    }

    /// Rewrite the operand slots of one instruction that reference `from`
    /// to hold `to`, registering the use of `to`'s variable if it is one.
    /// φ entries are only touched when `include_phi` is set; `from`'s own
    /// use entry is left to the caller.
    pub(crate) fn rewrite_operands(
        &mut self,
        id: InsnId,
        from: VarId,
        to: &Operand,
        include_phi: bool,
    ) -> bool {
        let mut changed = false;
        {
            let insn = self.insn_mut(id);
            let mut visit = |op: &mut Operand| {
                if op.as_var() == Some(from) {
                    *op = to.clone();
                    changed = true;
                }
            };
            match &mut insn.kind {
                InsnKind::Expr(e) => match &mut e.kind {
                    ExprKind::Phi(entries) => {
                        if include_phi {
                            for entry in entries {
                                visit(&mut entry.value);
                            }
                        }
                    }
                    ExprKind::Unary { value, .. } => visit(value),
                    ExprKind::Binary { lhs, rhs, .. } => {
                        visit(lhs);
                        visit(rhs);
                    }
                    ExprKind::Undefined => {}
                },
                InsnKind::Flow(flow) => match flow {
                    FlowKind::Jump { .. } => {}
                    FlowKind::Branch { cond, .. } => visit(cond),
                    FlowKind::CallDirect { args, .. } => {
                        for arg in args {
                            visit(arg);
                        }
                    }
                    FlowKind::CallPtr { addr, args } => {
                        visit(addr);
                        for arg in args {
                            visit(arg);
                        }
                    }
                    FlowKind::Return { value } => {
                        if let Some(op) = value {
                            visit(op);
                        }
                    }
                },
            }
        }
        if changed {
            if let Operand::Var(w) = to {
                self.var_mut(*w).uses.insert(id);
            }
        }
        changed
    }

    /// Drop `v`'s use entry for `id` unless the instruction still
    /// references it in some slot.
    pub(crate) fn sync_use(&mut self, id: InsnId, v: VarId) {
        if !self.insn(id).uses().contains(&v) {
            self.var_mut(v).uses.shift_remove(&id);
        }
    }

    /// Swing an expression's destination to another variable, moving the
    /// def-list entry with it.
    pub(crate) fn set_expr_dest(&mut self, id: InsnId, dest: VarId) {
        match &mut self.insn_mut(id).kind {
            InsnKind::Expr(e) => e.dest = dest,
            InsnKind::Flow(_) => bug!("destination swing on flow instruction {id}"),
        }
        self.var_mut(dest).defs.push(id);
    }
}
