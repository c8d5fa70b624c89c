//! End-to-end pipeline scenarios: front-end-shaped construction through
//! SSA conversion and optimisation to golden serialised output, validated
//! at every stage.

use lattice_foundation::{BinaryOp, Const, Prim, UnaryOp};
use lattice_ir::{opt, to_ssa, validate, Func, Operand};

fn s32(v: i128) -> Operand {
    Operand::Const(Const::from_i128(Prim::S32, v))
}

/// max-style diamond: compare the arguments, keep one per arm, merge.
#[test]
fn diamond_converts_and_stays_stable() {
    let mut func = Func::new("max", "entry", &[Some("a"), Some("b")]);
    let entry = func.entry();
    let a = func.args()[0];
    let b = func.args()[1];
    let l = func.block_create(Some("l"));
    let r = func.block_create(Some("r"));
    let m = func.block_create(Some("m"));
    let t = func.var_create(Prim::S32, Some("t"));
    let c = func.var_create(Prim::Bool, Some("c"));
    let x = func.var_create(Prim::S32, Some("x"));
    func.add_binary(entry, t, BinaryOp::Sgt, Operand::Var(a), Operand::Var(b));
    func.add_unary(entry, c, UnaryOp::Snez, Operand::Var(t));
    func.add_branch(entry, Operand::Var(c), l);
    func.add_jump(entry, r);
    func.add_unary(l, x, UnaryOp::Mov, Operand::Var(a));
    func.add_jump(l, m);
    func.add_unary(r, x, UnaryOp::Mov, Operand::Var(b));
    func.add_jump(r, m);
    func.add_return(m, Some(Operand::Var(x)));
    assert!(validate(&func).is_ok());

    to_ssa(&mut func);
    assert!(validate(&func).is_ok());

    // Renaming split x across the arms; the optimiser only sweeps the
    // now-unreferenced original variables.
    assert!(opt::optimize(&mut func));
    assert!(validate(&func).is_ok());

    assert_eq!(
        func.to_string(),
        "ssa function %max\n\
         \x20   var s32 %a\n\
         \x20   var s32 %b\n\
         \x20   var s32 %5\n\
         \x20   var bool %6\n\
         \x20   var s32 %7\n\
         \x20   var s32 %8\n\
         \x20   var s32 %9\n\
         \x20   arg %a\n\
         \x20   arg %b\n\
         code <entry>\n\
         \x20   sgt %5, %a, %b\n\
         \x20   snez %6, %5\n\
         \x20   branch %6, <l>\n\
         \x20   jump <r>\n\
         code <l>\n\
         \x20   mov %7, %a\n\
         \x20   jump <m>\n\
         code <r>\n\
         \x20   mov %9, %b\n\
         \x20   jump <m>\n\
         code <m>\n\
         \x20   phi %8, <l> %7, <r> %9\n\
         \x20   return %8\n"
    );

    // Serialisation is stable across a no-op recalculation.
    let before = func.to_string();
    func.recalc_flow();
    assert_eq!(func.to_string(), before);

    // Both pipeline stages are idempotent.
    to_ssa(&mut func);
    assert!(!opt::optimize(&mut func));
    assert_eq!(func.to_string(), before);
}

/// A diamond whose condition is constant collapses to a single return.
#[test]
fn constant_condition_collapses_the_cfg() {
    let mut func = Func::new("g", "entry", &[]);
    let entry = func.entry();
    let l = func.block_create(Some("l"));
    let r = func.block_create(Some("r"));
    let m = func.block_create(Some("m"));
    let c = func.var_create(Prim::Bool, Some("c"));
    let x = func.var_create(Prim::S32, Some("x"));
    func.add_unary(entry, c, UnaryOp::Mov, Operand::Const(Const::from_bool(true)));
    func.add_branch(entry, Operand::Var(c), l);
    func.add_jump(entry, r);
    func.add_unary(l, x, UnaryOp::Mov, s32(1));
    func.add_jump(l, m);
    func.add_unary(r, x, UnaryOp::Mov, s32(2));
    func.add_jump(r, m);
    func.add_return(m, Some(Operand::Var(x)));

    to_ssa(&mut func);
    assert!(validate(&func).is_ok());
    assert!(opt::optimize(&mut func));
    assert!(validate(&func).is_ok());

    // The φ collapsed along the taken edge: only the left arm's constant
    // reaches the return, and every block merged into the entry.
    assert_eq!(
        func.to_string(),
        "ssa function %g\ncode <entry>\n    return s32'0x00000001\n"
    );

    assert!(!opt::optimize(&mut func));
}

/// Calls pin their operands: a value flowing into a call argument is
/// renamed but never folded away.
#[test]
fn call_arguments_survive_ssa_and_optimisation() {
    let mut func = Func::new("h", "entry", &[Some("n")]);
    let entry = func.entry();
    let n = func.args()[0];
    let x = func.var_create(Prim::S32, Some("x"));
    func.add_binary(entry, x, BinaryOp::Add, Operand::Var(n), s32(1));
    func.add_call_direct(entry, "observe", vec![Operand::Var(x), s32(0)]);
    let p = func.var_create(Prim::S64, Some("p"));
    func.add_undefined(entry, p);
    func.add_call_ptr(entry, Operand::Var(p), vec![Operand::Var(x)]);
    func.add_return(entry, None);

    to_ssa(&mut func);
    assert!(validate(&func).is_ok());
    opt::optimize(&mut func);
    assert!(validate(&func).is_ok());

    assert_eq!(
        func.to_string(),
        "ssa function %h\n\
         \x20   var s32 %n\n\
         \x20   var s32 %3\n\
         \x20   var s64 %4\n\
         \x20   arg %n\n\
         code <entry>\n\
         \x20   add %3, %n, s32'0x00000001\n\
         \x20   call_direct <observe>, %3, s32'0x00000000\n\
         \x20   undef %4\n\
         \x20   call_ptr %4, %3\n\
         \x20   return\n"
    );
}
