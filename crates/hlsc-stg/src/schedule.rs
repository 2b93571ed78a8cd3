//! Scheduler output consumed by the STG builder
//!
//! The scheduler itself lives outside this crate. It hands over, per scope,
//! a list of regions; each region lists its blocks, how it is to be executed
//! and the cycle every statement starts in.

use hlsc_ir::{BlockId, Expr, StmId, SymbolId};
use serde::{Deserialize, Serialize};

/// One scheduled IR statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledNode {
    pub block: BlockId,
    pub stm: StmId,
    /// Start cycle, relative to the block (relative to the region when
    /// pipelined); `None` if the statement was dropped
    pub begin: Option<u32>,
    /// Cycles the operation occupies, at least 1
    pub latency: u32,
    /// Distinguishes several calls of the same callee
    pub instance_num: u32,
}

impl ScheduledNode {
    pub fn new(block: BlockId, stm: StmId, begin: u32) -> Self {
        Self {
            block,
            stm,
            begin: Some(begin),
            latency: 1,
            instance_num: 0,
        }
    }

    pub fn with_latency(mut self, latency: u32) -> Self {
        self.latency = latency.max(1);
        self
    }

    pub fn with_instance(mut self, instance_num: u32) -> Self {
        self.instance_num = instance_num;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulingMode {
    StateMachine,
    PipelinedLoop,
    PipelinedWorker,
}

impl SchedulingMode {
    pub fn is_pipelined(&self) -> bool {
        !matches!(self, SchedulingMode::StateMachine)
    }
}

/// Shape of a loop region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopInfo {
    pub head: BlockId,
    pub bodies: Vec<BlockId>,
    /// Symbol holding the continue condition
    pub cond: SymbolId,
    /// Induction variable
    pub counter: SymbolId,
    /// Initial value of the induction variable
    pub init: Expr,
    pub exits: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Enclosing region; `None` for the main region
    pub parent: Option<usize>,
    /// Blocks of this region, excluding those of nested regions
    pub blocks: Vec<BlockId>,
    pub mode: SchedulingMode,
    pub nodes: Vec<ScheduledNode>,
    pub loop_info: Option<LoopInfo>,
}

impl Region {
    pub fn new(mode: SchedulingMode, blocks: Vec<BlockId>, nodes: Vec<ScheduledNode>) -> Self {
        Self {
            parent: None,
            blocks,
            mode,
            nodes,
            loop_info: None,
        }
    }

    pub fn nested_in(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_loop(mut self, info: LoopInfo) -> Self {
        self.loop_info = Some(info);
        self
    }

    /// Scheduled nodes of `block`, in input order
    pub fn block_nodes(&self, block: BlockId) -> impl Iterator<Item = &ScheduledNode> + '_ {
        self.nodes
            .iter()
            .filter(move |n| n.block == block && n.begin.is_some())
    }
}

/// All regions of a scope; region 0 is the main region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeSchedule {
    pub regions: Vec<Region>,
}

impl ScopeSchedule {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    /// Nesting depth of every region
    pub fn depths(&self) -> Vec<usize> {
        self.regions
            .iter()
            .map(|r| {
                let mut depth = 0;
                let mut parent = r.parent;
                while let Some(p) = parent {
                    depth += 1;
                    parent = self.regions.get(p).and_then(|r| r.parent);
                    if depth > self.regions.len() {
                        break;
                    }
                }
                depth
            })
            .collect()
    }
}
