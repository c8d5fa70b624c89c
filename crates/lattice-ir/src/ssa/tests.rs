//! Tests for SSA conversion.

use lattice_foundation::{BinaryOp, Const, Prim, UnaryOp};

use crate::types::{BlockId, Expr, ExprKind, FlowKind, InsnKind, Operand, VarId};
use crate::validate::validate;
use crate::Func;

use super::to_ssa;

fn s32(v: i128) -> Operand {
    Operand::Const(Const::from_i128(Prim::S32, v))
}

/// entry branches to l and r, both jump to m; `x` is assigned in both
/// arms and read either at the join or only inside l.
fn diamond(read_in_m: bool) -> (Func, VarId) {
    let mut func = Func::new("f", "entry", &[]);
    let entry = func.entry();
    let l = func.block_create(Some("l"));
    let r = func.block_create(Some("r"));
    let m = func.block_create(Some("m"));
    let cond = func.var_create(Prim::Bool, Some("c"));
    let x = func.var_create(Prim::S32, Some("x"));
    func.add_undefined(entry, cond);
    func.add_branch(entry, Operand::Var(cond), l);
    func.add_jump(entry, r);
    func.add_unary(l, x, UnaryOp::Mov, s32(1));
    if !read_in_m {
        func.add_call_direct(l, "sink", vec![Operand::Var(x)]);
    }
    func.add_jump(l, m);
    func.add_unary(r, x, UnaryOp::Mov, s32(2));
    func.add_jump(r, m);
    if read_in_m {
        func.add_return(m, Some(Operand::Var(x)));
    } else {
        func.add_return(m, None);
    }
    (func, x)
}

fn block_named(func: &Func, name: &str) -> BlockId {
    func.blocks()
        .find(|(_, b)| b.name() == name)
        .map(|(id, _)| id)
        .unwrap()
}

/// Destination of the first expression in `block`.
fn def_in(func: &Func, block: BlockId) -> VarId {
    func.block(block)
        .insns()
        .iter()
        .find_map(|&id| func.insn(id).as_expr().map(|e| e.dest))
        .unwrap()
}

#[test]
fn diamond_gets_a_phi_at_the_join() {
    let (mut func, x) = diamond(true);
    to_ssa(&mut func);
    assert!(func.is_ssa());

    // The original variable lost every definition and every use.
    assert!(func.var(x).defs().is_empty());
    assert!(func.var(x).uses().is_empty());

    let l = block_named(&func, "l");
    let r = block_named(&func, "r");
    let m = block_named(&func, "m");
    let insns = func.block(m).insns().to_vec();
    assert_eq!(insns.len(), 2);

    // The join block starts with a φ over both renamed definitions.
    let (phi_dest, entries) = match func.insn(insns[0]).kind() {
        InsnKind::Expr(e) => match &e.kind {
            ExprKind::Phi(entries) => (e.dest, entries.clone()),
            other => panic!("expected phi, found {other:?}"),
        },
        other => panic!("expected phi, found {other:?}"),
    };
    assert_eq!(entries.len(), 2);
    let def_l = def_in(&func, l);
    let def_r = def_in(&func, r);
    let for_l = entries.iter().find(|e| e.pred == l).unwrap();
    let for_r = entries.iter().find(|e| e.pred == r).unwrap();
    assert_eq!(for_l.value, Operand::Var(def_l));
    assert_eq!(for_r.value, Operand::Var(def_r));

    // The return reads the φ destination.
    match func.insn(insns[1]).kind() {
        InsnKind::Flow(FlowKind::Return { value }) => {
            assert_eq!(*value, Some(Operand::Var(phi_dest)));
        }
        other => panic!("expected return, found {other:?}"),
    }

    assert!(validate(&func).is_ok());
}

#[test]
fn phi_is_pruned_where_the_variable_is_dead() {
    let (mut func, _) = diamond(false);
    to_ssa(&mut func);

    // `x` is never read at or below the join, so no φ lands there.
    let m = block_named(&func, "m");
    let insns = func.block(m).insns().to_vec();
    assert_eq!(insns.len(), 1);
    assert!(matches!(
        func.insn(insns[0]).kind(),
        InsnKind::Flow(FlowKind::Return { value: None })
    ));

    // The read inside l was still renamed to l's fresh definition.
    let l = block_named(&func, "l");
    let def_l = def_in(&func, l);
    let call = func.block(l).insns().to_vec();
    match func.insn(call[1]).kind() {
        InsnKind::Flow(FlowKind::CallDirect { args, .. }) => {
            assert_eq!(args.as_slice(), &[Operand::Var(def_l)]);
        }
        other => panic!("expected call, found {other:?}"),
    }

    assert!(validate(&func).is_ok());
}

#[test]
fn straight_line_reassignments_are_split() {
    let mut func = Func::new("f", "entry", &[]);
    let entry = func.entry();
    let x = func.var_create(Prim::S32, Some("x"));
    func.add_unary(entry, x, UnaryOp::Mov, s32(1));
    func.add_binary(entry, x, BinaryOp::Add, Operand::Var(x), s32(1));
    func.add_return(entry, Some(Operand::Var(x)));

    to_ssa(&mut func);

    // Two fresh names, the add reading the first and the return the second.
    assert!(func.var(x).defs().is_empty());
    let insns = func.block(entry).insns().to_vec();
    let first = match func.insn(insns[0]).kind() {
        InsnKind::Expr(e) => e.dest,
        other => panic!("expected expr, found {other:?}"),
    };
    let second = match func.insn(insns[1]).kind() {
        InsnKind::Expr(e) => match &e.kind {
            ExprKind::Binary { lhs, .. } => {
                assert_eq!(*lhs, Operand::Var(first));
                e.dest
            }
            other => panic!("expected add, found {other:?}"),
        },
        other => panic!("expected expr, found {other:?}"),
    };
    assert_ne!(first, second);
    match func.insn(insns[2]).kind() {
        InsnKind::Flow(FlowKind::Return { value }) => {
            assert_eq!(*value, Some(Operand::Var(second)));
        }
        other => panic!("expected return, found {other:?}"),
    }

    assert!(validate(&func).is_ok());
}

#[test]
fn arguments_keep_their_identity() {
    let mut func = Func::new("f", "entry", &[Some("a")]);
    let entry = func.entry();
    let a = func.args()[0];
    let y = func.var_create(Prim::S32, Some("y"));
    func.add_binary(entry, y, BinaryOp::Add, Operand::Var(a), s32(1));
    func.add_return(entry, Some(Operand::Var(y)));

    to_ssa(&mut func);

    // The parameter has no definition, so renaming leaves its uses alone.
    assert_eq!(func.args(), &[a]);
    assert_eq!(func.var(a).uses().len(), 1);
    assert!(validate(&func).is_ok());
}

#[test]
fn to_ssa_is_idempotent() {
    let (mut func, _) = diamond(true);
    to_ssa(&mut func);
    let once = func.to_string();
    to_ssa(&mut func);
    assert_eq!(func.to_string(), once);
}

#[test]
fn loop_carried_variable_gets_a_header_phi() {
    // entry -> head; head -> body -> head; head -> exit; i updated in body.
    let mut func = Func::new("f", "entry", &[]);
    let entry = func.entry();
    let head = func.block_create(Some("head"));
    let body = func.block_create(Some("body"));
    let exit = func.block_create(Some("exit"));
    let i = func.var_create(Prim::S32, Some("i"));
    let t = func.var_create(Prim::S32, Some("t"));
    let c = func.var_create(Prim::Bool, Some("c"));
    func.add_unary(entry, i, UnaryOp::Mov, s32(0));
    func.add_jump(entry, head);
    func.add_binary(head, t, BinaryOp::Slt, Operand::Var(i), s32(10));
    func.add_unary(head, c, UnaryOp::Snez, Operand::Var(t));
    func.add_branch(head, Operand::Var(c), body);
    func.add_jump(head, exit);
    func.add_binary(body, i, BinaryOp::Add, Operand::Var(i), s32(1));
    func.add_jump(body, head);
    func.add_return(exit, Some(Operand::Var(i)));

    to_ssa(&mut func);

    // The header is in its own dominance frontier, so every variable
    // defined there (i through its body update, plus t and c) merges at
    // the top of the loop.
    let phi_dests: Vec<VarId> = func
        .block(head)
        .insns()
        .iter()
        .filter_map(|&id| match func.insn(id).kind() {
            InsnKind::Expr(Expr {
                dest,
                kind: ExprKind::Phi(_),
            }) => Some(*dest),
            _ => None,
        })
        .collect();
    assert_eq!(phi_dests.len(), 3);

    // The return after the loop reads the φ carrying i.
    let ret = func.block(exit).insns().to_vec();
    match func.insn(ret[0]).kind() {
        InsnKind::Flow(FlowKind::Return { value: Some(Operand::Var(rv)) }) => {
            assert!(phi_dests.contains(rv));
        }
        other => panic!("expected return of a φ value, found {other:?}"),
    }
    assert!(validate(&func).is_ok());
}
