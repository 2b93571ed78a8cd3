//! SSA construction for a scope's CFG
//!
//! Runs in four fixed steps, mutating the blocks in place:
//!
//! 1. Phi placement over iterated dominance frontiers
//! 2. Versioned renaming along the dominator tree
//! 3. Pruning of useless phis to a fixed point
//! 4. Removal of phi arguments naming the phi itself
//!
//! Before:
//! ```text
//! b1: cjump c ? b2, b3
//! b2: x = 1
//! b3: x = 2
//! b4: return x
//! ```
//!
//! After:
//! ```text
//! b2: x#1 = 1
//! b3: x#2 = 2
//! b4: x#3 = phi(x#1:b2, x#2:b3)
//!     return x#3
//! ```
//!
//! Temporaries, parameters, conditions and function names are assigned once
//! by construction and are left alone. Only symbols owned by the scope being
//! converted are versioned.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace};

use crate::block::BlockId;
use crate::design::Design;
use crate::dominance::{DominanceFrontier, DominatorTree};
use crate::error::IrResult;
use crate::ir::{Ctx, Expr, Phi, StmId, StmKind};
use crate::scope::ScopeId;
use crate::symbol::SymbolId;
use crate::usedef::UseDefTable;

/// Convert `scope` to SSA form
pub fn apply_ssa_conversion(design: &mut Design, scope: ScopeId) -> IrResult<()> {
    if design.scope(scope).blocks.is_empty() {
        return Ok(());
    }
    SsaTransformer::new(design, scope)?.run();
    Ok(())
}

pub struct SsaTransformer<'a> {
    design: &'a mut Design,
    scope: ScopeId,
    tree: DominatorTree,
    /// Last version number handed out per original symbol
    counts: HashMap<SymbolId, u32>,
    /// Live versions per original symbol; 0 means "not defined yet"
    stacks: HashMap<SymbolId, Vec<u32>>,
    /// Versioned symbol -> original symbol
    origins: HashMap<SymbolId, SymbolId>,
}

impl<'a> SsaTransformer<'a> {
    pub fn new(design: &'a mut Design, scope: ScopeId) -> IrResult<Self> {
        let tree = DominatorTree::build(design.scope(scope))?;
        Ok(Self {
            design,
            scope,
            tree,
            counts: HashMap::new(),
            stacks: HashMap::new(),
            origins: HashMap::new(),
        })
    }

    pub fn run(&mut self) {
        debug!("SSA conversion of {}", self.design.scope(self.scope).name);
        self.insert_phis();
        let entry = self.tree.entry();
        self.rename(entry);
        self.prune();
        trace!("{}", self.design.dump_scope(self.scope));
    }

    /// Steps 3 and 4; running them again on converted IR changes nothing
    pub fn prune(&mut self) {
        self.remove_useless_phis();
        self.cleanup_self_args();
    }

    fn is_target(&self, sym: SymbolId) -> bool {
        let s = self.design.symbol(sym);
        s.scope == self.scope && !s.is_ssa_exempt()
    }

    /// Step 1: place one phi per symbol at each block of its iterated
    /// dominance frontier
    fn insert_phis(&mut self) {
        let scope = self.design.scope(self.scope);
        let frontier = DominanceFrontier::build(scope, &self.tree);
        let usedef = UseDefTable::build(scope);

        let mut inserts: Vec<(BlockId, SymbolId)> = Vec::new();
        for sym in usedef.defined_symbols() {
            if !self.is_target(sym) {
                continue;
            }
            let def_blocks = usedef.def_blocks(sym);
            let mut defined: HashSet<BlockId> = def_blocks.iter().copied().collect();
            let mut has_phi: HashSet<BlockId> = HashSet::new();
            let mut worklist: VecDeque<BlockId> = def_blocks.into_iter().collect();
            while let Some(b) = worklist.pop_front() {
                for d in frontier.get(b) {
                    if !has_phi.insert(d) {
                        continue;
                    }
                    inserts.push((d, sym));
                    if defined.insert(d) {
                        worklist.push_back(d);
                    }
                }
            }
        }

        for (block, sym) in inserts {
            debug!(
                "insert phi for {} at {}",
                self.design.symbol(sym).name,
                self.design.scope(self.scope).block(block).name()
            );
            let scope = self.design.scope_mut(self.scope);
            let lineno = scope.block(block).stms.first().map_or(0, |s| s.lineno);
            scope.insert_stm(block, 0, StmKind::Phi(Phi::new(Expr::store(sym))), lineno);
        }
    }

    fn original(&self, sym: SymbolId) -> SymbolId {
        self.origins.get(&sym).copied().unwrap_or(sym)
    }

    fn top(&mut self, orig: SymbolId) -> u32 {
        let stack = self.stacks.entry(orig).or_insert_with(|| vec![0]);
        *stack.last().unwrap_or(&0)
    }

    fn new_version(&mut self, orig: SymbolId) -> u32 {
        let count = self.counts.entry(orig).or_insert(0);
        *count += 1;
        let version = *count;
        self.stacks
            .entry(orig)
            .or_insert_with(|| vec![0])
            .push(version);
        version
    }

    fn versioned(&mut self, orig: SymbolId, version: u32) -> SymbolId {
        let name = format!("{}#{}", self.design.symbol(orig).name, version);
        let sym = self.design.inherit_sym(orig, &name);
        self.origins.insert(sym, orig);
        sym
    }

    /// Step 2: rename along the dominator tree and fill phi arguments
    fn rename(&mut self, block: BlockId) {
        let mut pushed: Vec<SymbolId> = Vec::new();
        let len = self.design.scope(self.scope).block(block).stms.len();
        for i in 0..len {
            let mut stm = self.design.scope(self.scope).block(block).stms[i].clone();
            if let StmKind::Phi(phi) = &mut stm.kind {
                if let Expr::Temp { sym, .. } = &mut phi.var {
                    let orig = self.original(*sym);
                    let version = self.new_version(orig);
                    *sym = self.versioned(orig, version);
                    pushed.push(orig);
                }
            } else {
                let mut loads: Vec<SymbolId> = Vec::new();
                let mut stores: Vec<SymbolId> = Vec::new();
                for exp in stm.exprs() {
                    exp.visit_temps(&mut |sym, ctx| match ctx {
                        Ctx::Load => loads.push(sym),
                        Ctx::Store => stores.push(sym),
                    });
                }
                let mut load_map: HashMap<SymbolId, SymbolId> = HashMap::new();
                for sym in loads {
                    if !self.is_target(sym) || load_map.contains_key(&sym) {
                        continue;
                    }
                    let orig = self.original(sym);
                    let version = self.top(orig);
                    load_map.insert(sym, self.versioned(orig, version));
                }
                let mut store_map: HashMap<SymbolId, SymbolId> = HashMap::new();
                for sym in stores {
                    if !self.is_target(sym) {
                        continue;
                    }
                    let orig = self.original(sym);
                    let version = self.new_version(orig);
                    store_map.insert(sym, self.versioned(orig, version));
                    pushed.push(orig);
                }
                for exp in stm.exprs_mut() {
                    exp.visit_temps_mut(&mut |sym, ctx| {
                        let map = match ctx {
                            Ctx::Load => &load_map,
                            Ctx::Store => &store_map,
                        };
                        if let Some(new) = map.get(sym) {
                            *sym = *new;
                        }
                    });
                }
            }
            self.design.scope_mut(self.scope).block_mut(block).stms[i] = stm;
        }

        let mut succs = self.design.scope(self.scope).block(block).succs.clone();
        succs.dedup();
        for succ in succs {
            self.fill_phi_args(succ, block);
        }

        let children = self.tree.children(block).to_vec();
        for child in children {
            self.rename(child);
        }

        for orig in pushed {
            if let Some(stack) = self.stacks.get_mut(&orig) {
                stack.pop();
            }
        }
    }

    fn fill_phi_args(&mut self, succ: BlockId, pred: BlockId) {
        let len = self.design.scope(self.scope).block(succ).stms.len();
        for i in 0..len {
            let dst = match self.design.scope(self.scope).block(succ).stms[i].as_phi() {
                Some(phi) => phi.dst(),
                None => continue,
            };
            let Some(dst) = dst else { continue };
            let orig = self.original(dst);
            let version = self.top(orig);
            if version == 0 {
                continue;
            }
            let arg = self.versioned(orig, version);
            if let Some(phi) = self
                .design
                .scope_mut(self.scope)
                .block_mut(succ)
                .stms[i]
                .as_phi_mut()
            {
                phi.args.push((Expr::load(arg), pred));
            }
        }
    }

    /// Step 3: remove phis without arguments and phis whose non-self
    /// arguments all name the same symbol, until nothing changes
    fn remove_useless_phis(&mut self) {
        let mut worklist: VecDeque<(BlockId, StmId)> = self
            .design
            .scope(self.scope)
            .all_stms()
            .filter(|(_, s)| s.is_phi())
            .map(|(b, s)| (b, s.id))
            .collect();

        while let Some((block, id)) = worklist.pop_front() {
            let Some(phi) = self
                .design
                .scope(self.scope)
                .find_stm(block, id)
                .and_then(|s| s.as_phi())
                .cloned()
            else {
                continue;
            };
            let Some(dst) = phi.dst() else { continue };
            let mut args = phi.non_self_arg_symbols();
            args.dedup();
            let distinct: HashSet<SymbolId> = args.iter().copied().collect();
            if distinct.len() > 1 {
                continue;
            }

            let scope = self.design.scope_mut(self.scope);
            let b = scope.block_mut(block);
            if let Some(idx) = b.stm_index(id) {
                b.stms.remove(idx);
            }
            let Some(replacement) = args.first().copied() else {
                debug!("remove phi of {} without arguments", self.design.symbol(dst).name);
                continue;
            };
            debug!(
                "remove phi of {}, replaced by {}",
                self.design.symbol(dst).name,
                self.design.symbol(replacement).name
            );
            let scope = self.design.scope_mut(self.scope);
            for b in &mut scope.blocks {
                for stm in &mut b.stms {
                    if stm.replace_uses(dst, replacement) && stm.is_phi() {
                        worklist.push_back((b.id, stm.id));
                    }
                }
            }
        }
    }

    /// Step 4
    fn cleanup_self_args(&mut self) {
        let scope = self.design.scope_mut(self.scope);
        for block in &mut scope.blocks {
            for stm in &mut block.stms {
                if let Some(phi) = stm.as_phi_mut() {
                    let dst = phi.dst();
                    phi.args.retain(|(arg, _)| arg.symbol() != dst);
                }
            }
        }
    }
}
