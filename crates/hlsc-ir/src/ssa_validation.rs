//! SSA invariant validation
//!
//! Checks, for one scope after [`apply_ssa_conversion`](crate::apply_ssa_conversion):
//! 1. every versioned symbol has at most one definition
//! 2. every use is dominated by its definition (phi arguments: the
//!    definition dominates the incoming predecessor). A use left behind by
//!    a collapsed phi is not dominated, and is accepted as long as no other
//!    version of the same variable can reach it
//! 3. every phi has at least two distinct arguments and none of them is the
//!    phi itself

use std::collections::{HashMap, HashSet, VecDeque};

use crate::block::BlockId;
use crate::design::Design;
use crate::dominance::DominatorTree;
use crate::error::{IrError, IrResult, SourceLoc};
use crate::scope::{Scope, ScopeId};
use crate::symbol::SymbolId;
use crate::usedef::{StmRef, UseDefTable};

pub fn validate_ssa(design: &Design, scope_id: ScopeId) -> IrResult<()> {
    let scope = design.scope(scope_id);
    if scope.blocks.is_empty() {
        return Ok(());
    }
    let tree = DominatorTree::build(scope)?;
    let usedef = UseDefTable::build(scope);

    let is_version = |sym: SymbolId| {
        let s = design.symbol(sym);
        s.ancestor.is_some() && !s.is_ssa_exempt()
    };

    let mut def_of: HashMap<SymbolId, StmRef> = HashMap::new();
    for sym in usedef.defined_symbols() {
        if !is_version(sym) {
            continue;
        }
        let defs = usedef.defs_of(sym);
        if defs.len() > 1 {
            return Err(IrError::MultipleDefinitions {
                scope: scope.name.clone(),
                symbol: design.symbol(sym).name.clone(),
                count: defs.len(),
            });
        }
        def_of.insert(sym, defs[0]);
    }
    let mut versions: HashMap<SymbolId, Vec<SymbolId>> = HashMap::new();
    for &sym in def_of.keys() {
        versions.entry(design.symbol(sym).root()).or_default().push(sym);
    }

    let position = |at: StmRef| scope.block(at.block).stm_index(at.stm).unwrap_or(usize::MAX);
    // no other version of the same variable flows into (block, pos)
    let only_live = |sym: SymbolId, block: BlockId, pos: usize| {
        let def = def_of[&sym];
        let kill = (def.block, position(def));
        versions[&design.symbol(sym).root()].iter().all(|other| {
            let at = def_of[other];
            *other == sym || !reaches_without(scope, (at.block, position(at)), (block, pos), kill)
        })
    };

    for (block, stm) in scope.all_stms() {
        let loc = || SourceLoc::new(scope.name.clone(), stm.lineno);
        if let Some(phi) = stm.as_phi() {
            let dst = phi.dst();
            let mut distinct = HashSet::new();
            for (arg, pred) in &phi.args {
                let Some(sym) = arg.symbol() else { continue };
                if Some(sym) == dst {
                    return Err(IrError::SelfReferencingPhi {
                        symbol: dst
                            .map(|d| design.symbol(d).name.clone())
                            .unwrap_or_default(),
                        block: scope.block(block).name(),
                    });
                }
                distinct.insert(sym);
                if let Some(def) = def_of.get(&sym) {
                    if !tree.dominates(def.block, *pred) && !only_live(sym, *pred, usize::MAX) {
                        return Err(IrError::UseNotDominated {
                            symbol: design.symbol(sym).name.clone(),
                            loc: loc(),
                        });
                    }
                }
            }
            if distinct.len() < 2 {
                return Err(IrError::DegeneratePhi {
                    symbol: dst
                        .map(|d| design.symbol(d).name.clone())
                        .unwrap_or_default(),
                    block: scope.block(block).name(),
                    distinct: distinct.len(),
                });
            }
            continue;
        }

        let here = position(StmRef {
            block,
            stm: stm.id,
        });
        for sym in stm.uses() {
            let Some(def) = def_of.get(&sym) else { continue };
            let dominated = if def.block == block {
                position(*def) < here
            } else {
                tree.dominates(def.block, block)
            };
            if !dominated && !only_live(sym, block, here) {
                return Err(IrError::UseNotDominated {
                    symbol: design.symbol(sym).name.clone(),
                    loc: loc(),
                });
            }
        }
    }
    Ok(())
}

/// Whether a value defined at `from` can flow to `to` without being
/// overwritten at `kill` (positions are statement indices within a block)
fn reaches_without(
    scope: &Scope,
    from: (BlockId, usize),
    to: (BlockId, usize),
    kill: (BlockId, usize),
) -> bool {
    if from.0 == to.0 && from.1 < to.1 {
        return !(kill.0 == to.0 && from.1 < kill.1 && kill.1 < to.1);
    }
    if kill.0 == from.0 && from.1 < kill.1 {
        return false;
    }
    let mut seen = HashSet::new();
    let mut queue: VecDeque<BlockId> = scope.block(from.0).succs.iter().copied().collect();
    while let Some(b) = queue.pop_front() {
        if b == to.0 && !(kill.0 == b && kill.1 < to.1) {
            return true;
        }
        if b == kill.0 || !seen.insert(b) {
            continue;
        }
        queue.extend(scope.block(b).succs.iter().copied());
    }
    false
}
