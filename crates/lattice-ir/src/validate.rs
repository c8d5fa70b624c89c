//! Structural validation.
//!
//! Checks the IR's quantified invariants:
//! - use-sets and def-lists agree with the instructions, both ways
//! - single assignment for non-argument variables under the SSA flag
//! - successor sets equal the jump/branch targets, with mutual edges
//! - nothing but jumps and branches after a jump or branch
//! - φ-nodes sit at the head of their block, cover the predecessors
//!   exactly, and their entry types match the destination
//!
//! The mutator maintains all of this; the validator exists for tests and
//! for embedders that want a cheap oracle after a pass of their own.
//! Errors are collected rather than short-circuited.

use indexmap::IndexSet;
use thiserror::Error;

use crate::types::{BlockId, ExprKind, Func, InsnId, InsnKind, Operand, VarId};

/// A violated structural invariant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidateError {
    /// An instruction references a variable missing from its use-set.
    #[error("instruction {insn} references {var} but is not in its use-set")]
    MissingUse { var: VarId, insn: InsnId },

    /// A use-set entry points at an instruction that does not reference
    /// the variable (or no longer exists).
    #[error("use-set of {var} names {insn}, which does not reference it")]
    StaleUse { var: VarId, insn: InsnId },

    /// An expression assigns a variable missing from its def-list.
    #[error("instruction {insn} assigns {var} but is not in its def-list")]
    MissingDef { var: VarId, insn: InsnId },

    /// A def-list entry points at an instruction that does not assign
    /// the variable (or no longer exists).
    #[error("def-list of {var} names {insn}, which does not assign it")]
    StaleDef { var: VarId, insn: InsnId },

    /// An operand names a variable the function does not own.
    #[error("instruction {insn} references unknown variable {var}")]
    DanglingVar { var: VarId, insn: InsnId },

    /// A non-argument variable has several assignments under SSA.
    #[error("ssa variable {var} has {defs} assignments")]
    MultipleAssignment { var: VarId, defs: usize },

    /// A successor set disagrees with the block's jump/branch targets.
    #[error("successor set of {block} does not match its terminator targets")]
    SuccessorMismatch { block: BlockId },

    /// A predecessor/successor edge is not mirrored on the other side.
    #[error("edge between {block} and {other} is not mutual")]
    EdgeNotMutual { block: BlockId, other: BlockId },

    /// An expression, call, or return appears after a jump or branch.
    #[error("instruction {insn} in {block} appears after a jump or branch")]
    InsnAfterTerminator { block: BlockId, insn: InsnId },

    /// A φ-node appears after a non-φ instruction.
    #[error("phi {insn} in {block} appears after a non-phi instruction")]
    PhiNotAtHead { block: BlockId, insn: InsnId },

    /// A φ's entries do not cover the block's predecessors exactly.
    #[error("phi {insn} in {block} does not cover its predecessors")]
    PhiPredMismatch { block: BlockId, insn: InsnId },

    /// A φ entry's operand type differs from the destination type.
    #[error("phi {insn} has an entry whose type differs from its destination")]
    PhiTypeMismatch { insn: InsnId },
}

/// Validate a function's structural invariants.
pub fn validate(func: &Func) -> Result<(), Vec<ValidateError>> {
    let mut errors = Vec::new();

    for (bid, block) in func.blocks() {
        // Successor set versus actual jump/branch targets.
        let mut targets: IndexSet<BlockId> = IndexSet::new();
        for &id in block.insns() {
            if let Some(t) = func.insn(id).target() {
                targets.insert(t);
            }
        }
        if &targets != block.succs() {
            errors.push(ValidateError::SuccessorMismatch { block: bid });
        }
        for &s in block.succs() {
            if !func.blocks.contains_key(&s) || !func.block(s).preds().contains(&bid) {
                errors.push(ValidateError::EdgeNotMutual { block: bid, other: s });
            }
        }
        for &p in block.preds() {
            if !func.blocks.contains_key(&p) || !func.block(p).succs().contains(&bid) {
                errors.push(ValidateError::EdgeNotMutual { block: bid, other: p });
            }
        }

        // Instruction ordering and φ placement.
        let mut sealed = false;
        let mut past_phis = false;
        for &id in block.insns() {
            match func.insn(id).kind() {
                InsnKind::Expr(e) => {
                    if matches!(e.kind, ExprKind::Phi(_)) {
                        if past_phis {
                            errors.push(ValidateError::PhiNotAtHead { block: bid, insn: id });
                        }
                        check_phi(func, bid, id, &mut errors);
                    } else {
                        past_phis = true;
                    }
                    if sealed {
                        errors.push(ValidateError::InsnAfterTerminator { block: bid, insn: id });
                    }
                }
                InsnKind::Flow(_) => {
                    past_phis = true;
                    if func.insn(id).target().is_some() {
                        sealed = true;
                    } else if sealed {
                        errors.push(ValidateError::InsnAfterTerminator { block: bid, insn: id });
                    }
                }
            }
        }
    }

    // Use-sets and def-lists, instruction side.
    for (iid, insn) in func.insns.iter() {
        for v in insn.uses() {
            match func.vars.get(&v) {
                None => errors.push(ValidateError::DanglingVar { var: v, insn: *iid }),
                Some(var) => {
                    if !var.uses().contains(iid) {
                        errors.push(ValidateError::MissingUse { var: v, insn: *iid });
                    }
                }
            }
        }
        if let InsnKind::Expr(e) = insn.kind() {
            match func.vars.get(&e.dest) {
                None => errors.push(ValidateError::DanglingVar { var: e.dest, insn: *iid }),
                Some(var) => {
                    if !var.defs().contains(iid) {
                        errors.push(ValidateError::MissingDef { var: e.dest, insn: *iid });
                    }
                }
            }
        }
    }

    // Use-sets and def-lists, variable side; SSA single assignment.
    for (vid, var) in func.vars() {
        for &id in var.uses() {
            if !func.insns.contains_key(&id) || !func.insn(id).uses().contains(&vid) {
                errors.push(ValidateError::StaleUse { var: vid, insn: id });
            }
        }
        for &id in var.defs() {
            let assigns = func
                .insns
                .get(&id)
                .and_then(|i| i.as_expr())
                .is_some_and(|e| e.dest == vid);
            if !assigns {
                errors.push(ValidateError::StaleDef { var: vid, insn: id });
            }
        }
        if func.is_ssa() && !func.args().contains(&vid) && var.defs().len() > 1 {
            errors.push(ValidateError::MultipleAssignment {
                var: vid,
                defs: var.defs().len(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_phi(func: &Func, block: BlockId, id: InsnId, errors: &mut Vec<ValidateError>) {
    let Some(e) = func.insn(id).as_expr() else {
        return;
    };
    let ExprKind::Phi(entries) = &e.kind else {
        return;
    };
    // A dangling destination is reported by the use/def walk.
    let Some(dest) = func.vars.get(&e.dest) else {
        return;
    };
    let mut covered: IndexSet<BlockId> = IndexSet::new();
    for entry in entries {
        if !covered.insert(entry.pred) {
            errors.push(ValidateError::PhiPredMismatch { block, insn: id });
        }
        if let Operand::Var(v) = &entry.value {
            if !func.vars.contains_key(v) {
                errors.push(ValidateError::DanglingVar { var: *v, insn: id });
                continue;
            }
        }
        if func.operand_prim(&entry.value) != dest.prim() {
            errors.push(ValidateError::PhiTypeMismatch { insn: id });
        }
    }
    if &covered != func.block(block).preds() {
        errors.push(ValidateError::PhiPredMismatch { block, insn: id });
    }
}
