//! Lattice IR - typed control-flow-graph intermediate representation
//!
//! An in-memory IR for compiler middle ends: functions own variables,
//! code blocks, and instructions; bidirectional use/def and
//! predecessor/successor indexes are maintained by every mutation.
//!
//! Pipeline: front-end construction -> [`to_ssa`] -> [`opt::optimize`] ->
//! serialisation via [`std::fmt::Display`].
//!
//! The mutator API is the only sanctioned way to edit a function.
//! Invariant violations (double assignment under SSA, type mismatches,
//! instructions appended past a jump or branch) indicate front-end bugs
//! and abort the process with a `[BUG]` diagnostic on stderr.

/// Report an unrecoverable invariant violation and abort.
///
/// The IR has no recoverable error surface: a violated invariant means
/// the caller is broken, and continuing would corrupt the indexes.
macro_rules! bug {
    ($($arg:tt)*) => {{
        eprintln!("[BUG] {}", format_args!($($arg)*));
        std::process::abort()
    }};
}
pub(crate) use bug;

mod dom;
mod edit;
mod flow;
mod print;
mod types;
mod validate;

pub mod opt;
pub mod ssa;

pub use dom::{compute_dominance, DomTree};
pub use opt::optimize;
pub use ssa::to_ssa;
pub use types::{
    Block, BlockId, Expr, ExprKind, FlowKind, Func, Insn, InsnId, InsnKind, Operand, PhiEntry,
    Var, VarId,
};
pub use validate::{validate, ValidateError};
