//! Error types for STG construction and pipeline synthesis

use hlsc_ir::{IrError, SourceLoc};
use thiserror::Error;

pub type StgResult<T> = std::result::Result<T, StgError>;

#[derive(Debug, Error)]
pub enum StgError {
    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("state '{state}' does not end with a transition or a wait")]
    MissingTerminal { state: String },

    #[error("state '{state}' jumps to block '{block}' which has no state")]
    UnresolvedTarget { state: String, block: String },

    #[error("{loc}: {what}")]
    Unsupported { what: String, loc: SourceLoc },

    #[error("scheduled node refers to statement #{stm} missing from block '{block}' of '{scope}'")]
    UnknownStatement {
        scope: String,
        block: String,
        stm: u32,
    },

    #[error("pipelined loop region {region} of '{scope}' has no loop info")]
    MissingLoopInfo { scope: String, region: usize },

    #[error("loop condition '{cond}' of '{scope}' is defined {count} times")]
    LoopCondDefinitions {
        scope: String,
        cond: String,
        count: usize,
    },

    #[error("pipelined loop of '{scope}' has {count} exits, expected exactly one")]
    MultipleLoopExits { scope: String, count: usize },

    #[error("stage {stage} of pipeline '{pipeline}' has no guard")]
    MissingPipelineGuard { pipeline: String, stage: usize },

    #[error("signal '{signal}' is defined in more than one stage of pipeline '{pipeline}'")]
    MultipleDefinitionStages { pipeline: String, signal: String },

    #[error("{loc}: phi for '{symbol}' needs predicates and at least two arguments")]
    InvalidPhi { symbol: String, loc: SourceLoc },
}

impl StgError {
    pub fn unsupported(what: impl Into<String>, loc: SourceLoc) -> Self {
        StgError::Unsupported {
            what: what.into(),
            loc,
        }
    }
}
