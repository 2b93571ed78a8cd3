//! Basic blocks of a scope's control-flow graph

use serde::{Deserialize, Serialize};

use crate::ir::{Phi, Stm, StmId};

/// Index of a block in its scope's block arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// Name prefix, e.g. `b`, `whilebody`
    pub nametag: String,
    /// Creation number inside the scope
    pub num: u32,
    pub stms: Vec<Stm>,
    /// All predecessors, loop-back edges included
    pub preds: Vec<BlockId>,
    /// All successors, loop-back edges included
    pub succs: Vec<BlockId>,
    /// Predecessors reached through a loop-back edge
    pub preds_loop: Vec<BlockId>,
    /// Successors reached through a loop-back edge
    pub succs_loop: Vec<BlockId>,
}

impl Block {
    pub fn new(id: BlockId, nametag: impl Into<String>, num: u32) -> Self {
        Self {
            id,
            nametag: nametag.into(),
            num,
            stms: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            preds_loop: Vec::new(),
            succs_loop: Vec::new(),
        }
    }

    pub fn name(&self) -> String {
        format!("{}{}", self.nametag, self.num)
    }

    /// Successors without loop-back edges
    pub fn forward_succs(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.succs
            .iter()
            .copied()
            .filter(move |s| !self.succs_loop.contains(s))
    }

    /// Predecessors without loop-back edges
    pub fn forward_preds(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.preds
            .iter()
            .copied()
            .filter(move |p| !self.preds_loop.contains(p))
    }

    pub fn stm(&self, id: StmId) -> Option<&Stm> {
        self.stms.iter().find(|s| s.id == id)
    }

    pub fn stm_index(&self, id: StmId) -> Option<usize> {
        self.stms.iter().position(|s| s.id == id)
    }

    pub fn phis(&self) -> impl Iterator<Item = &Phi> {
        self.stms.iter().filter_map(|s| s.as_phi())
    }

    pub fn last_stm(&self) -> Option<&Stm> {
        self.stms.last()
    }
}
