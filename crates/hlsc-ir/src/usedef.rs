//! Use-def tables over a scope's `Temp` variables

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::block::BlockId;
use crate::ir::StmId;
use crate::scope::Scope;
use crate::symbol::SymbolId;

/// Location of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StmRef {
    pub block: BlockId,
    pub stm: StmId,
}

#[derive(Debug, Default, Clone)]
pub struct UseDefTable {
    def_stms: IndexMap<SymbolId, IndexSet<StmRef>>,
    use_stms: IndexMap<SymbolId, IndexSet<StmRef>>,
    def_blocks: IndexMap<SymbolId, IndexSet<BlockId>>,
    block_defs: IndexMap<BlockId, IndexSet<SymbolId>>,
}

impl UseDefTable {
    pub fn build(scope: &Scope) -> Self {
        let mut table = UseDefTable::default();
        for block in &scope.blocks {
            for stm in &block.stms {
                let at = StmRef {
                    block: block.id,
                    stm: stm.id,
                };
                for sym in stm.defs() {
                    table.def_stms.entry(sym).or_default().insert(at);
                    table.def_blocks.entry(sym).or_default().insert(block.id);
                    table.block_defs.entry(block.id).or_default().insert(sym);
                }
                for sym in stm.uses() {
                    table.use_stms.entry(sym).or_default().insert(at);
                }
            }
        }
        table
    }

    /// Symbols with at least one definition, in first-definition order
    pub fn defined_symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.def_stms.keys().copied()
    }

    pub fn used_symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.use_stms.keys().copied()
    }

    pub fn defs_of(&self, sym: SymbolId) -> Vec<StmRef> {
        self.def_stms
            .get(&sym)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn uses_of(&self, sym: SymbolId) -> Vec<StmRef> {
        self.use_stms
            .get(&sym)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn def_blocks(&self, sym: SymbolId) -> Vec<BlockId> {
        self.def_blocks
            .get(&sym)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn block_defines(&self, block: BlockId, sym: SymbolId) -> bool {
        self.block_defs
            .get(&block)
            .is_some_and(|defs| defs.contains(&sym))
    }
}
