//! Dominance analysis.
//!
//! Computes immediate dominators with the simple (non-sophisticated) form
//! of the Lengauer–Tarjan algorithm, then dominance frontiers by walking
//! join-point predecessors up the dominator tree. Results live in a
//! pass-local [`DomTree`] side table keyed by DFS preorder index; the IR
//! itself is never marked during analysis.

use std::collections::HashMap;

use indexmap::IndexSet;
use tracing::trace;

use crate::types::{BlockId, Func};

/// Dominator tree and dominance frontiers over one function's CFG.
///
/// Indices are DFS preorder numbers; blocks unreachable from the entry do
/// not appear. The entry block is index 0 and has no immediate dominator.
pub struct DomTree {
    order: Vec<BlockId>,
    index: HashMap<BlockId, usize>,
    idom: Vec<Option<usize>>,
    frontier: Vec<IndexSet<usize>>,
}

impl DomTree {
    /// Number of reachable blocks.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The block numbered `idx` in DFS preorder.
    pub fn block_at(&self, idx: usize) -> BlockId {
        self.order[idx]
    }

    /// DFS number of a block; `None` if unreachable from the entry.
    pub fn index_of(&self, block: BlockId) -> Option<usize> {
        self.index.get(&block).copied()
    }

    /// Immediate dominator by DFS number; `None` for the entry.
    pub fn idom(&self, idx: usize) -> Option<usize> {
        self.idom[idx]
    }

    /// Dominance frontier of a node, as DFS numbers.
    pub fn frontier(&self, idx: usize) -> &IndexSet<usize> {
        &self.frontier[idx]
    }
}

/// Compute the dominator tree and dominance frontiers of `func`.
pub fn compute_dominance(func: &Func) -> DomTree {
    let mut order = Vec::new();
    let mut index = HashMap::new();
    let mut parent = Vec::new();
    dfs(func, func.entry(), None, &mut order, &mut index, &mut parent);
    let n = order.len();

    let mut semi: Vec<usize> = (0..n).collect();
    let mut best: Vec<usize> = (0..n).collect();
    let mut ancestor: Vec<Option<usize>> = vec![None; n];
    let mut bucket: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut idom: Vec<Option<usize>> = vec![None; n];

    // Semidominators in reverse preorder, draining the parent's bucket
    // at each step.
    for w in (1..n).rev() {
        let Some(p) = parent[w] else { continue };
        for pred in func.block(order[w]).preds() {
            let Some(&v) = index.get(pred) else { continue };
            let u = eval(v, &mut ancestor, &mut best, &semi);
            if semi[u] < semi[w] {
                semi[w] = semi[u];
            }
        }
        bucket[semi[w]].push(w);
        ancestor[w] = Some(p);
        for v in std::mem::take(&mut bucket[p]) {
            let u = eval(v, &mut ancestor, &mut best, &semi);
            idom[v] = Some(if semi[u] < semi[v] { u } else { p });
        }
    }
    // Resolve in forward order.
    for w in 1..n {
        if let Some(d) = idom[w] {
            if d != semi[w] {
                idom[w] = idom[d];
            }
        }
    }
    if n > 0 {
        idom[0] = None;
    }

    // A join point is in the frontier of every predecessor-side node up
    // to, but not including, its immediate dominator.
    let mut frontier: Vec<IndexSet<usize>> = vec![IndexSet::new(); n];
    for i in 1..n {
        let block = order[i];
        if func.block(block).preds().len() < 2 {
            continue;
        }
        for pred in func.block(block).preds() {
            let Some(&start) = index.get(pred) else { continue };
            let mut runner = start;
            while Some(runner) != idom[i] {
                frontier[runner].insert(i);
                match idom[runner] {
                    Some(next) => runner = next,
                    None => break,
                }
            }
        }
    }

    trace!(func = %func.name(), blocks = n, "computed dominator tree");
    DomTree {
        order,
        index,
        idom,
        frontier,
    }
}

fn dfs(
    func: &Func,
    block: BlockId,
    parent: Option<usize>,
    order: &mut Vec<BlockId>,
    index: &mut HashMap<BlockId, usize>,
    parents: &mut Vec<Option<usize>>,
) {
    if index.contains_key(&block) {
        return;
    }
    let idx = order.len();
    index.insert(block, idx);
    order.push(block);
    parents.push(parent);
    let succs: Vec<BlockId> = func.block(block).succs().iter().copied().collect();
    for s in succs {
        dfs(func, s, Some(idx), order, index, parents);
    }
}

fn eval(v: usize, ancestor: &mut [Option<usize>], best: &mut [usize], semi: &[usize]) -> usize {
    if ancestor[v].is_none() {
        v
    } else {
        compress(v, ancestor, best, semi);
        best[v]
    }
}

fn compress(v: usize, ancestor: &mut [Option<usize>], best: &mut [usize], semi: &[usize]) {
    let Some(a) = ancestor[v] else { return };
    if ancestor[a].is_some() {
        compress(a, ancestor, best, semi);
        if semi[best[a]] < semi[best[v]] {
            best[v] = best[a];
        }
        ancestor[v] = ancestor[a];
    }
}
