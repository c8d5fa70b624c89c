//! Textual serialisation.
//!
//! One-way, human-readable dump of a function for debugging and golden
//! tests; there is no parser for it. The output is deterministic:
//! variables and blocks print in creation order, operands through their
//! canonical constant rendering or `%name`.

use std::fmt;

use crate::types::{ExprKind, FlowKind, Func, InsnId, InsnKind, Operand};

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ssa() {
            f.write_str("ssa ")?;
        }
        writeln!(f, "function %{}", self.name())?;
        for (_, var) in self.vars() {
            writeln!(f, "    var {} %{}", var.prim(), var.name())?;
        }
        for &arg in self.args() {
            writeln!(f, "    arg %{}", self.var(arg).name())?;
        }
        for (_, block) in self.blocks() {
            writeln!(f, "code <{}>", block.name())?;
            for &id in block.insns() {
                f.write_str("    ")?;
                self.fmt_insn(f, id)?;
            }
        }
        Ok(())
    }
}

impl Func {
    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, op: &Operand) -> fmt::Result {
        match op {
            Operand::Const(c) => write!(f, "{c}"),
            Operand::Var(v) => write!(f, "%{}", self.var(*v).name()),
        }
    }

    fn fmt_insn(&self, f: &mut fmt::Formatter<'_>, id: InsnId) -> fmt::Result {
        match self.insn(id).kind() {
            InsnKind::Expr(e) => {
                let dest = self.var(e.dest).name();
                match &e.kind {
                    ExprKind::Phi(entries) => {
                        write!(f, "phi %{dest}")?;
                        for entry in entries {
                            write!(f, ", <{}> ", self.block(entry.pred).name())?;
                            self.fmt_operand(f, &entry.value)?;
                        }
                        writeln!(f)
                    }
                    ExprKind::Unary { op, value } => {
                        write!(f, "{op} %{dest}, ")?;
                        self.fmt_operand(f, value)?;
                        writeln!(f)
                    }
                    ExprKind::Binary { op, lhs, rhs } => {
                        write!(f, "{op} %{dest}, ")?;
                        self.fmt_operand(f, lhs)?;
                        f.write_str(", ")?;
                        self.fmt_operand(f, rhs)?;
                        writeln!(f)
                    }
                    ExprKind::Undefined => writeln!(f, "undef %{dest}"),
                }
            }
            InsnKind::Flow(flow) => match flow {
                FlowKind::Jump { target } => {
                    writeln!(f, "jump <{}>", self.block(*target).name())
                }
                FlowKind::Branch { cond, target } => {
                    f.write_str("branch ")?;
                    self.fmt_operand(f, cond)?;
                    writeln!(f, ", <{}>", self.block(*target).name())
                }
                FlowKind::CallDirect { label, args } => {
                    write!(f, "call_direct <{label}>")?;
                    for arg in args {
                        f.write_str(", ")?;
                        self.fmt_operand(f, arg)?;
                    }
                    writeln!(f)
                }
                FlowKind::CallPtr { addr, args } => {
                    f.write_str("call_ptr ")?;
                    self.fmt_operand(f, addr)?;
                    for arg in args {
                        f.write_str(", ")?;
                        self.fmt_operand(f, arg)?;
                    }
                    writeln!(f)
                }
                FlowKind::Return { value } => {
                    f.write_str("return")?;
                    if let Some(op) = value {
                        f.write_str(" ")?;
                        self.fmt_operand(f, op)?;
                    }
                    writeln!(f)
                }
            },
        }
    }
}
