//! Optimisation passes.
//!
//! [`optimize`] reruns four passes until none of them changes the
//! function:
//!
//! 1. [`opt_unused_vars`] - variables whose value is never read are
//!    deleted along with their assignments.
//! 2. [`opt_const_prop`] - single-assignment variables whose defining
//!    expression folds to a constant are replaced by it.
//! 3. [`opt_dead_code`] - instructions past a definitive terminator,
//!    constant-false branches, and unreachable blocks are deleted.
//! 4. [`opt_branches`] - straight-line chains of 1:1-linked blocks are
//!    merged into one.
//!
//! Every pass reports whether it mutated the function, so the driver's
//! fixed point is also an idempotence point: a second [`optimize`] run
//! finds nothing to do.

use indexmap::IndexSet;
use tracing::{debug, trace};

use lattice_foundation::{calc1, calc2, cast, Const, UnaryOp};

use crate::bug;
use crate::types::{BlockId, ExprKind, FlowKind, Func, InsnKind, Operand};


/// Run the pass pipeline to fixed point. Returns whether anything changed.
pub fn optimize(func: &mut Func) -> bool {
    let mut changed = false;
    let mut rounds = 0u32;
    loop {
        let mut round = false;
        round |= opt_unused_vars(func);
        round |= opt_const_prop(func);
        round |= opt_dead_code(func);
        round |= opt_branches(func);
        rounds += 1;
        changed |= round;
        if !round {
            break;
        }
    }
    debug!(func = %func.name(), rounds, changed, "optimizer reached fixed point");
    changed
}

/// Delete every non-argument variable whose use-set is empty, together
/// with its defining expressions, until a full sweep deletes nothing.
pub fn opt_unused_vars(func: &mut Func) -> bool {
    let mut deleted = false;
    loop {
        let mut round = false;
        for v in func.var_ids() {
            if func.args().contains(&v) {
                continue;
            }
            if func.var(v).uses().is_empty() {
                trace!(var = %func.var(v).name(), "deleting unused variable");
                func.var_delete(v);
                round = true;
            }
        }
        deleted |= round;
        if !round {
            break;
        }
    }
    deleted
}

/// Fold single-assignment variables whose defining expression has only
/// constant operands, replacing every use with the folded constant.
pub fn opt_const_prop(func: &mut Func) -> bool {
    let mut propagated = false;
    loop {
        let mut round = false;
        for v in func.var_ids() {
            if func.args().contains(&v) {
                continue;
            }
            if func.var(v).defs().len() != 1 {
                continue;
            }
            let def = func.var(v).defs()[0];
            let folded: Option<Const> = match func.insn(def).kind() {
                InsnKind::Expr(e) => match &e.kind {
                    ExprKind::Unary {
                        op,
                        value: Operand::Const(c),
                    } => Some(match op {
                        UnaryOp::Mov => cast(func.var(v).prim(), *c),
                        _ => calc1(*op, *c),
                    }),
                    ExprKind::Binary {
                        op,
                        lhs: Operand::Const(a),
                        rhs: Operand::Const(b),
                    } => Some(calc2(*op, *a, *b)),
                    _ => None,
                },
                InsnKind::Flow(_) => None,
            };
            if let Some(c) = folded {
                trace!(var = %func.var(v).name(), value = %c, "propagating constant");
                func.var_replace(v, &Operand::Const(c));
                func.var_delete(v);
                round = true;
            }
        }
        propagated |= round;
        if !round {
            break;
        }
    }
    propagated
}

/// Delete instructions past a definitive terminator, constant-false
/// branches, and blocks unreachable from the entry; then settle the CFG
/// with [`Func::recalc_flow`]. Repeats until stable.
pub fn opt_dead_code(func: &mut Func) -> bool {
    let mut changed = false;
    loop {
        let mut visited: IndexSet<BlockId> = IndexSet::new();
        let mut round = dead_code_dfs(func, func.entry(), &mut visited);
        for b in func.block_ids() {
            if !visited.contains(&b) {
                trace!(block = %func.block(b).name(), "deleting unreachable block");
                func.block_delete(b);
                round = true;
            }
        }
        func.recalc_flow();
        changed |= round;
        if !round {
            break;
        }
    }
    changed
}

fn dead_code_dfs(func: &mut Func, block: BlockId, visited: &mut IndexSet<BlockId>) -> bool {
    if !visited.insert(block) {
        return false;
    }
    let mut changed = false;
    let mut dead = false;
    for id in func.block(block).insns().to_vec() {
        if dead {
            func.insn_delete(id);
            changed = true;
            continue;
        }
        let flow = match func.insn(id).kind() {
            InsnKind::Flow(f) => f.clone(),
            InsnKind::Expr(_) => continue,
        };
        match flow {
            FlowKind::Jump { target } => {
                dead = true;
                changed |= dead_code_dfs(func, target, visited);
            }
            FlowKind::Return { .. } => {
                dead = true;
            }
            FlowKind::Branch {
                cond: Operand::Const(c),
                target,
            } => {
                if c.truthy() {
                    dead = true;
                    changed |= dead_code_dfs(func, target, visited);
                } else {
                    // Never taken: the branch itself is dead.
                    func.insn_delete(id);
                    changed = true;
                }
            }
            FlowKind::Branch { target, .. } => {
                changed |= dead_code_dfs(func, target, visited);
            }
            FlowKind::CallDirect { .. } | FlowKind::CallPtr { .. } => {}
        }
    }
    changed
}

/// Merge 1:1-linked blocks along a DFS from the entry.
pub fn opt_branches(func: &mut Func) -> bool {
    let mut visited: IndexSet<BlockId> = IndexSet::new();
    branch_opt_dfs(func, func.entry(), &mut visited)
}

fn branch_opt_dfs(func: &mut Func, block: BlockId, visited: &mut IndexSet<BlockId>) -> bool {
    if !visited.insert(block) {
        return false;
    }
    let mut changed = false;
    loop {
        if func.block(block).succs().len() != 1 {
            break;
        }
        let Some(&succ) = func.block(block).succs().get_index(0) else {
            break;
        };
        if succ == block || func.block(succ).preds().len() != 1 {
            break;
        }
        merge_blocks(func, block, succ);
        changed = true;
    }
    let succs: Vec<BlockId> = func.block(block).succs().iter().copied().collect();
    for s in succs {
        changed |= branch_opt_dfs(func, s, visited);
    }
    changed
}

/// Splice `second` onto the end of `first`.
///
/// `first`'s trailing jump is deleted, `second`'s instructions are
/// reparented, `second`'s successors become `first`'s (their φ-entries
/// and predecessor sets updated), and the emptied block is removed.
fn merge_blocks(func: &mut Func, first: BlockId, second: BlockId) {
    trace!(
        first = %func.block(first).name(),
        second = %func.block(second).name(),
        "merging blocks"
    );
    let Some(&last) = func.block(first).insns().last() else {
        bug!(
            "block <{}> has a successor but no terminator",
            func.block(first).name()
        );
    };
    func.insn_delete(last);

    let moved = std::mem::take(&mut func.block_mut(second).insns);
    for &id in &moved {
        func.insn_mut(id).block = first;
    }
    func.block_mut(first).insns.extend(moved);

    let succs = std::mem::take(&mut func.block_mut(second).succs);
    for &s in &succs {
        func.block_mut(s).preds.shift_remove(&second);
        func.block_mut(s).preds.insert(first);
        rewrite_phi_preds(func, s, second, first);
    }
    func.block_mut(first).succs = succs;
    func.block_mut(second).preds.clear();
    func.block_delete(second);
}

/// Rename the φ-entry predecessors in `block` from `from` to `to`.
fn rewrite_phi_preds(func: &mut Func, block: BlockId, from: BlockId, to: BlockId) {
    for id in func.block(block).insns().to_vec() {
        let Some(e) = func.insn(id).as_expr() else {
            break;
        };
        if !matches!(e.kind, ExprKind::Phi(_)) {
            break;
        }
        if let InsnKind::Expr(e) = &mut func.insn_mut(id).kind {
            if let ExprKind::Phi(entries) = &mut e.kind {
                for entry in entries.iter_mut().filter(|entry| entry.pred == from) {
                    entry.pred = to;
                }
            }
        }
    }
}
