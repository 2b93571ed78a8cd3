//! Dominance analysis
//!
//! Immediate dominators are computed with the iterative Cooper-Harvey-Kennedy
//! algorithm over the forward edges of the CFG (loop-back edges dropped).
//! Dominance frontiers are computed over *all* predecessor edges, so a loop
//! header is in the frontier of the blocks of its body and of itself.

use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use crate::block::BlockId;
use crate::error::{IrError, IrResult};
use crate::scope::Scope;

#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: BlockId,
    /// Immediate dominator of every block except the entry
    idom: IndexMap<BlockId, BlockId>,
    /// Dominator-tree children, sorted by block id
    children: IndexMap<BlockId, Vec<BlockId>>,
    /// Reverse post-order over forward edges
    rpo: Vec<BlockId>,
}

impl DominatorTree {
    /// Build the dominator tree of `scope`
    ///
    /// Fails if the entry block has incoming edges or a block cannot be
    /// reached from the entry.
    pub fn build(scope: &Scope) -> IrResult<Self> {
        let entry = scope.entry.ok_or_else(|| IrError::MissingEntryBlock {
            scope: scope.name.clone(),
        })?;
        if !scope.block(entry).preds.is_empty() {
            return Err(IrError::EntryHasPredecessors {
                scope: scope.name.clone(),
                block: scope.block(entry).name(),
            });
        }

        let rpo = reverse_post_order(scope, entry);
        if rpo.len() != scope.blocks.len() {
            let unreachable = scope
                .blocks
                .iter()
                .find(|b| !rpo.contains(&b.id))
                .map(|b| b.name())
                .unwrap_or_default();
            return Err(IrError::UnreachableBlock {
                scope: scope.name.clone(),
                block: unreachable,
            });
        }

        let mut order = vec![usize::MAX; scope.blocks.len()];
        for (i, b) in rpo.iter().enumerate() {
            order[b.0 as usize] = i;
        }

        // doms[b] = idom(b); the entry dominates itself
        let mut doms: Vec<Option<BlockId>> = vec![None; scope.blocks.len()];
        doms[entry.0 as usize] = Some(entry);
        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for p in scope.block(b).forward_preds() {
                    if doms[p.0 as usize].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&doms, &order, cur, p),
                    });
                }
                if new_idom.is_some() && doms[b.0 as usize] != new_idom {
                    doms[b.0 as usize] = new_idom;
                    changed = true;
                }
            }
        }

        let mut idom = IndexMap::new();
        let mut children: IndexMap<BlockId, Vec<BlockId>> =
            scope.block_ids().map(|b| (b, Vec::new())).collect();
        for &b in &rpo {
            if b == entry {
                continue;
            }
            if let Some(d) = doms[b.0 as usize] {
                idom.insert(b, d);
                children.entry(d).or_default().push(b);
            }
        }
        for kids in children.values_mut() {
            kids.sort();
        }

        let tree = DominatorTree {
            entry,
            idom,
            children,
            rpo,
        };
        trace!("dominator tree of {}:\n{}", scope.name, tree.dump(scope));
        Ok(tree)
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied()
    }

    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children
            .get(&block)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    pub fn reverse_post_order(&self) -> &[BlockId] {
        &self.rpo
    }

    /// True if `a` dominates `b` (reflexive)
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom(current) {
                Some(d) => current = d,
                None => return false,
            }
        }
    }

    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    pub fn dump(&self, scope: &Scope) -> String {
        let mut lines = Vec::new();
        for (b, kids) in &self.children {
            if kids.is_empty() {
                continue;
            }
            let names: Vec<String> = kids.iter().map(|k| scope.block(*k).name()).collect();
            lines.push(format!("  {} -> {}", scope.block(*b).name(), names.join(", ")));
        }
        lines.join("\n")
    }
}

fn reverse_post_order(scope: &Scope, entry: BlockId) -> Vec<BlockId> {
    let mut visited = vec![false; scope.blocks.len()];
    let mut post = Vec::with_capacity(scope.blocks.len());
    // (block, next successor index)
    let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
    visited[entry.0 as usize] = true;
    while let Some((b, i)) = stack.pop() {
        let succs: Vec<BlockId> = scope.block(b).forward_succs().collect();
        if i < succs.len() {
            stack.push((b, i + 1));
            let s = succs[i];
            if !visited[s.0 as usize] {
                visited[s.0 as usize] = true;
                stack.push((s, 0));
            }
        } else {
            post.push(b);
        }
    }
    post.reverse();
    post
}

fn intersect(doms: &[Option<BlockId>], order: &[usize], a: BlockId, b: BlockId) -> BlockId {
    let (mut f1, mut f2) = (a, b);
    while f1 != f2 {
        while order[f1.0 as usize] > order[f2.0 as usize] {
            f1 = doms[f1.0 as usize].unwrap_or(f1);
        }
        while order[f2.0 as usize] > order[f1.0 as usize] {
            f2 = doms[f2.0 as usize].unwrap_or(f2);
        }
    }
    f1
}

/// Dominance frontier of every block
#[derive(Debug, Clone, Default)]
pub struct DominanceFrontier {
    frontier: IndexMap<BlockId, IndexSet<BlockId>>,
}

impl DominanceFrontier {
    pub fn build(scope: &Scope, tree: &DominatorTree) -> Self {
        let mut frontier: IndexMap<BlockId, IndexSet<BlockId>> = IndexMap::new();
        for block in &scope.blocks {
            if block.preds.len() < 2 {
                continue;
            }
            let Some(stop) = tree.idom(block.id) else {
                continue;
            };
            for &p in &block.preds {
                let mut runner = p;
                while runner != stop {
                    frontier.entry(runner).or_default().insert(block.id);
                    match tree.idom(runner) {
                        Some(d) => runner = d,
                        None => break,
                    }
                }
            }
        }
        let df = DominanceFrontier { frontier };
        trace!("dominance frontier of {}:\n{}", scope.name, df.dump(scope));
        df
    }

    pub fn get(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.frontier
            .get(&block)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    pub fn contains(&self, block: BlockId, member: BlockId) -> bool {
        self.frontier
            .get(&block)
            .is_some_and(|s| s.contains(&member))
    }

    pub fn dump(&self, scope: &Scope) -> String {
        self.frontier
            .iter()
            .map(|(b, df)| {
                let names: Vec<String> = df.iter().map(|d| scope.block(*d).name()).collect();
                format!("  {}: {}", scope.block(*b).name(), names.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
