//! SSA construction.
//!
//! Converts a function to static single assignment form. For each
//! variable that existed before the conversion:
//!
//! 1. φ-nodes are inserted over the iterated dominance frontier of its
//!    defining blocks, pruned to blocks whose DFS subtree actually reads
//!    the variable (minimal SSA - no φ where the value is dead).
//! 2. Definitions are renamed along a depth-first walk from the entry:
//!    each assignment gets a fresh variable, uses are rewritten to the
//!    reaching name, and φ-entries in successors take the name that was
//!    live on the traversed edge.
//!
//! The conversion is idempotent; it finishes by setting the function's
//! SSA-enforcement flag, after which the mutator rejects second
//! assignments.

use indexmap::IndexSet;
use tracing::debug;

use lattice_foundation::Const;

use crate::dom::{compute_dominance, DomTree};
use crate::types::{BlockId, ExprKind, Func, InsnKind, Operand, PhiEntry, VarId};

#[cfg(test)]
mod tests;

/// Convert `func` to SSA form. No-op if already converted.
pub fn to_ssa(func: &mut Func) {
    if func.is_ssa() {
        return;
    }
    let dom = compute_dominance(func);
    let vars: Vec<VarId> = func.vars().map(|(id, _)| id).collect();
    for &v in &vars {
        insert_phis(func, v, &dom);
        rename(func, v);
    }
    func.ssa = true;
    debug!(func = %func.name(), vars = vars.len(), "converted to ssa form");
}

/// Place φ-nodes for `v` over the iterated dominance frontier of its
/// defining blocks, skipping blocks where `v` is dead.
fn insert_phis(func: &mut Func, v: VarId, dom: &DomTree) {
    let n = dom.len();

    // A block "uses v" if it or any successor in its DFS subtree reads it.
    let mut uses_var = vec![false; n];
    for &id in func.var(v).uses() {
        if let Some(idx) = dom.index_of(func.insn(id).block()) {
            uses_var[idx] = true;
        }
    }
    let def_blocks: Vec<usize> = func
        .var(v)
        .defs()
        .iter()
        .filter_map(|&d| dom.index_of(func.insn(d).block()))
        .collect();
    let mut memo = vec![false; n];
    for &d in &def_blocks {
        // The walk starts at each definition so blocks before it are not
        // marked as using the variable.
        uses_var[d] = true;
        usage_dfs(func, dom, d, &mut memo, &mut uses_var);
    }

    // Worklist over the iterated frontier; newly discovered frontier
    // nodes are appended and visited in the same sweep.
    let mut has_phi = vec![false; n];
    let mut worklist: IndexSet<usize> = IndexSet::new();
    for &d in &def_blocks {
        worklist.extend(dom.frontier(d).iter().copied());
    }
    let mut i = 0;
    while let Some(&idx) = worklist.get_index(i) {
        i += 1;
        if has_phi[idx] || !uses_var[idx] {
            continue;
        }
        has_phi[idx] = true;
        create_phi(func, dom.block_at(idx), v);
        let extra: Vec<usize> = dom.frontier(idx).iter().copied().collect();
        worklist.extend(extra);
    }
}

fn usage_dfs(
    func: &Func,
    dom: &DomTree,
    idx: usize,
    memo: &mut [bool],
    uses_var: &mut [bool],
) -> bool {
    if memo[idx] {
        return uses_var[idx];
    }
    memo[idx] = true;
    let mut used = uses_var[idx];
    let succs: Vec<BlockId> = func
        .block(dom.block_at(idx))
        .succs()
        .iter()
        .copied()
        .collect();
    for succ in succs {
        if let Some(s) = dom.index_of(succ) {
            used |= usage_dfs(func, dom, s, memo, uses_var);
        }
    }
    uses_var[idx] = used;
    used
}

/// Insert a φ for `dest` at the head of `block`, one entry per
/// predecessor, each defaulting to the zero constant of `dest`'s type (a
/// stand-in for "undefined" until renaming rewrites the live edges).
fn create_phi(func: &mut Func, block: BlockId, dest: VarId) {
    let prim = func.var(dest).prim();
    let entries: Vec<PhiEntry> = func
        .block(block)
        .preds()
        .iter()
        .map(|&pred| PhiEntry {
            pred,
            value: Operand::Const(Const::zero(prim)),
        })
        .collect();
    func.add_phi(block, dest, entries);
}

/// Rename every assignment of `v` to a fresh variable along a DFS from
/// the entry, rewriting uses to the reaching name.
fn rename(func: &mut Func, v: VarId) {
    // φ destinations of this variable's lineage; only their entries may
    // be overwritten on an edge.
    let mut lineage: IndexSet<VarId> = IndexSet::new();
    lineage.insert(v);
    let mut visited: IndexSet<BlockId> = IndexSet::new();
    rename_walk(func, func.entry(), v, None, &mut lineage, &mut visited);
}

fn rename_walk(
    func: &mut Func,
    block: BlockId,
    from: VarId,
    mut to: Option<VarId>,
    lineage: &mut IndexSet<VarId>,
    visited: &mut IndexSet<BlockId>,
) {
    if !visited.insert(block) {
        return;
    }
    for id in func.block(block).insns().to_vec() {
        // Uses first: an instruction may read the old name and assign it.
        if let Some(t) = to {
            if func.rewrite_operands(id, from, &Operand::Var(t), false) {
                func.sync_use(id, from);
            }
        }
        let redef = match func.insn(id).kind() {
            InsnKind::Expr(e) if e.dest == from => Some(matches!(e.kind, ExprKind::Phi(_))),
            _ => None,
        };
        if let Some(is_phi) = redef {
            let prim = func.var(from).prim();
            func.var_mut(from).defs.retain(|&d| d != id);
            let fresh = func.var_create(prim, None);
            func.set_expr_dest(id, fresh);
            if is_phi {
                lineage.insert(fresh);
            }
            to = Some(fresh);
        }
    }
    let succs: Vec<BlockId> = func.block(block).succs().iter().copied().collect();
    if let Some(t) = to {
        for &succ in &succs {
            rewrite_phi_edge(func, block, succ, lineage, t);
        }
    }
    for succ in succs {
        rename_walk(func, succ, from, to, lineage, visited);
    }
}

/// Point the φ-entry for the edge `pred -> block` at `to`, for the one
/// φ in `block` whose destination belongs to the lineage.
fn rewrite_phi_edge(
    func: &mut Func,
    pred: BlockId,
    block: BlockId,
    lineage: &IndexSet<VarId>,
    to: VarId,
) {
    for id in func.block(block).insns().to_vec() {
        let Some(e) = func.insn(id).as_expr() else { break };
        if !matches!(e.kind, ExprKind::Phi(_)) {
            break;
        }
        if !lineage.contains(&e.dest) {
            continue;
        }
        let mut old: Vec<VarId> = Vec::new();
        if let InsnKind::Expr(e) = &mut func.insn_mut(id).kind {
            if let ExprKind::Phi(entries) = &mut e.kind {
                for entry in entries.iter_mut().filter(|entry| entry.pred == pred) {
                    if let Some(w) = entry.value.as_var() {
                        old.push(w);
                    }
                    entry.value = Operand::Var(to);
                }
            }
        }
        func.var_mut(to).uses.insert(id);
        for w in old {
            func.sync_use(id, w);
        }
        return;
    }
}
