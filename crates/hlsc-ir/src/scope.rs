//! Scopes: functions, methods, classes, modules and namespaces
//!
//! A scope owns:
//! - a block arena forming its CFG (one entry, one exit)
//! - a name table for its symbols
//! - the signals generated for it
//! - its place in the scope tree and the call graph

use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockId};
use crate::ir::{Expr, Stm, StmId, StmKind};
use crate::signal::SignalId;
use crate::symbol::SymbolId;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScopeTag {
    Global,
    Function,
    Class,
    Method,
    Ctor,
    Callable,
    Returnable,
    Testbench,
    Module,
    Worker,
    Port,
    Lib,
    Namespace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionParam {
    pub sym: SymbolId,
    pub default: Option<Expr>,
}

/// A worker thread started by a module constructor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub scope: ScopeId,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    /// Dotted name including enclosing scopes
    pub name: String,
    /// Name as written in the source
    pub orig_name: String,
    pub parent: Option<ScopeId>,
    pub tags: BTreeSet<ScopeTag>,
    pub lineno: u32,
    pub symbols: IndexMap<String, SymbolId>,
    pub params: Vec<FunctionParam>,
    pub return_type: Option<Type>,
    pub blocks: Vec<Block>,
    pub entry: Option<BlockId>,
    pub exit: Option<BlockId>,
    pub children: Vec<ScopeId>,
    pub callee_scopes: IndexSet<ScopeId>,
    pub caller_scopes: IndexSet<ScopeId>,
    /// Instance names used for each callee
    pub callee_instances: IndexMap<ScopeId, IndexSet<String>>,
    pub signals: IndexMap<String, SignalId>,
    pub workers: Vec<Worker>,
    /// Depth in the scope/call graph, set by `Design::ordered_scopes`
    pub order: i32,
    pub(crate) next_stm_id: u32,
}

impl Scope {
    pub fn new(
        id: ScopeId,
        name: String,
        orig_name: String,
        parent: Option<ScopeId>,
        tags: BTreeSet<ScopeTag>,
        lineno: u32,
    ) -> Self {
        Self {
            id,
            name,
            orig_name,
            parent,
            tags,
            lineno,
            symbols: IndexMap::new(),
            params: Vec::new(),
            return_type: None,
            blocks: Vec::new(),
            entry: None,
            exit: None,
            children: Vec::new(),
            callee_scopes: IndexSet::new(),
            caller_scopes: IndexSet::new(),
            callee_instances: IndexMap::new(),
            signals: IndexMap::new(),
            workers: Vec::new(),
            order: -1,
            next_stm_id: 0,
        }
    }

    pub fn has_tag(&self, tag: ScopeTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn is_global(&self) -> bool {
        self.has_tag(ScopeTag::Global)
    }

    pub fn is_function(&self) -> bool {
        self.has_tag(ScopeTag::Function)
    }

    pub fn is_class(&self) -> bool {
        self.has_tag(ScopeTag::Class)
    }

    pub fn is_method(&self) -> bool {
        self.has_tag(ScopeTag::Method)
    }

    pub fn is_ctor(&self) -> bool {
        self.has_tag(ScopeTag::Ctor)
    }

    pub fn is_callable(&self) -> bool {
        self.has_tag(ScopeTag::Callable)
    }

    pub fn is_testbench(&self) -> bool {
        self.has_tag(ScopeTag::Testbench)
    }

    pub fn is_module(&self) -> bool {
        self.has_tag(ScopeTag::Module)
    }

    pub fn is_worker(&self) -> bool {
        self.has_tag(ScopeTag::Worker)
    }

    pub fn is_port(&self) -> bool {
        self.has_tag(ScopeTag::Port)
    }

    pub fn is_lib(&self) -> bool {
        self.has_tag(ScopeTag::Lib)
    }

    pub fn is_namespace(&self) -> bool {
        self.has_tag(ScopeTag::Namespace)
    }

    /// Create an empty block; the first block created becomes the entry
    pub fn add_block(&mut self, nametag: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let num = self.blocks.len() as u32 + 1;
        self.blocks.push(Block::new(id, nametag, num));
        if self.entry.is_none() {
            self.entry = Some(id);
        }
        self.exit = Some(id);
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().map(|b| b.id)
    }

    /// Add a forward edge `from -> to`
    pub fn connect(&mut self, from: BlockId, to: BlockId) {
        self.block_mut(from).succs.push(to);
        self.block_mut(to).preds.push(from);
    }

    /// Add a loop-back edge `from -> to`
    pub fn connect_loop(&mut self, from: BlockId, to: BlockId) {
        self.connect(from, to);
        self.block_mut(from).succs_loop.push(to);
        self.block_mut(to).preds_loop.push(from);
    }

    pub fn next_stm_id(&mut self) -> StmId {
        let id = StmId(self.next_stm_id);
        self.next_stm_id += 1;
        id
    }

    pub fn append_stm(&mut self, block: BlockId, kind: StmKind, lineno: u32) -> StmId {
        let id = self.next_stm_id();
        self.block_mut(block).stms.push(Stm { id, lineno, kind });
        id
    }

    pub fn insert_stm(&mut self, block: BlockId, index: usize, kind: StmKind, lineno: u32) -> StmId {
        let id = self.next_stm_id();
        self.block_mut(block).stms.insert(index, Stm { id, lineno, kind });
        id
    }

    pub fn find_stm(&self, block: BlockId, stm: StmId) -> Option<&Stm> {
        self.blocks.get(block.0 as usize)?.stm(stm)
    }

    /// Every statement of the scope with its block
    pub fn all_stms(&self) -> impl Iterator<Item = (BlockId, &Stm)> + '_ {
        self.blocks
            .iter()
            .flat_map(|b| b.stms.iter().map(move |s| (b.id, s)))
    }

    pub fn add_callee_instance(&mut self, callee: ScopeId, instance: String) {
        self.callee_instances
            .entry(callee)
            .or_default()
            .insert(instance);
    }
}
