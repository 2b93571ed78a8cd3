//! Hardware signals owned by scopes
//!
//! A signal is created in exactly one scope and is keyed by its name there.
//! Everything else refers to it through its [`SignalId`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::scope::ScopeId;
use crate::symbol::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalTag {
    Reg,
    Net,
    /// Signed integer
    Int,
    Input,
    Output,
    Condition,
    Induction,
    /// valid/ready/hold/enable/last/exit of a pipeline stage
    PipelineCtrl,
    Field,
    /// Memory interface (register array, RAM port, ROM table)
    MemIf,
    SinglePort,
    FifoPort,
    SeqPort,
    /// Port of an external instance reached through this scope
    ExtPort,
    Initializable,
    ValidProtocol,
    ReadyValidProtocol,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub name: String,
    /// Bit width; 0 when unknown
    pub width: u32,
    pub tags: BTreeSet<SignalTag>,
    /// Scope the signal belongs to
    pub owner: ScopeId,
    /// Symbol the signal was derived from
    pub sym: Option<SymbolId>,
    pub init_value: Option<i64>,
    pub maxsize: Option<u32>,
}

impl Signal {
    pub fn has_tag(&self, tag: SignalTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn is_reg(&self) -> bool {
        self.has_tag(SignalTag::Reg)
    }

    pub fn is_net(&self) -> bool {
        self.has_tag(SignalTag::Net)
    }

    pub fn is_input(&self) -> bool {
        self.has_tag(SignalTag::Input)
    }

    pub fn is_output(&self) -> bool {
        self.has_tag(SignalTag::Output)
    }

    pub fn is_induction(&self) -> bool {
        self.has_tag(SignalTag::Induction)
    }

    pub fn is_pipeline_ctrl(&self) -> bool {
        self.has_tag(SignalTag::PipelineCtrl)
    }

    pub fn is_memif(&self) -> bool {
        self.has_tag(SignalTag::MemIf)
    }

    /// Mask a value to the signal's width
    pub fn truncate(&self, value: i64) -> i64 {
        if self.width == 0 || self.width >= 64 {
            value
        } else {
            value & ((1i64 << self.width) - 1)
        }
    }
}
