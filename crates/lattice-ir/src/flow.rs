//! CFG edge recomputation.

use crate::types::{BlockId, Func};

impl Func {
    /// Rebuild every predecessor/successor set from the jump and branch
    /// instructions currently in the function.
    ///
    /// The mutator keeps the sets exact, so this is a no-op on a
    /// well-formed function; passes that delete terminators wholesale
    /// call it to settle the graph afterwards.
    pub fn recalc_flow(&mut self) {
        let ids: Vec<BlockId> = self.block_ids();
        for &b in &ids {
            let block = self.block_mut(b);
            block.preds.clear();
            block.succs.clear();
        }
        for b in ids {
            for id in self.block(b).insns().to_vec() {
                if let Some(target) = self.insn(id).target() {
                    self.block_mut(b).succs.insert(target);
                    self.block_mut(target).preds.insert(b);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use lattice_foundation::Const;

    use crate::types::Operand;
    use crate::Func;

    #[test]
    fn recalc_is_a_no_op_on_maintained_edges() {
        let mut func = Func::new("f", "entry", &[]);
        let entry = func.entry();
        let a = func.block_create(Some("a"));
        let b = func.block_create(Some("b"));
        func.add_branch(entry, Operand::Const(Const::from_bool(true)), a);
        func.add_jump(entry, b);
        func.add_jump(a, b);
        func.add_return(b, None);

        let before: Vec<_> = func
            .blocks()
            .map(|(id, blk)| (id, blk.preds().clone(), blk.succs().clone()))
            .collect();
        func.recalc_flow();
        let after: Vec<_> = func
            .blocks()
            .map(|(id, blk)| (id, blk.preds().clone(), blk.succs().clone()))
            .collect();
        assert_eq!(before, after);
    }
}
