//! Error types for the IR layer
//!
//! Every error is fatal for the scope being processed. Variants carry the
//! identity of the offending scope/block/symbol and, where the IR has one,
//! the source line.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type IrResult<T> = std::result::Result<T, IrError>;

/// Source location of an IR statement: the qualified scope name plus line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLoc {
    pub scope: String,
    pub lineno: u32,
}

impl SourceLoc {
    pub fn new(scope: impl Into<String>, lineno: u32) -> Self {
        Self {
            scope: scope.into(),
            lineno,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.lineno)
    }
}

#[derive(Debug, Error)]
pub enum IrError {
    #[error("scope '{scope}' has no entry block")]
    MissingEntryBlock { scope: String },

    #[error("entry block '{block}' of scope '{scope}' has incoming edges")]
    EntryHasPredecessors { scope: String, block: String },

    #[error("block '{block}' of scope '{scope}' is unreachable from the entry block")]
    UnreachableBlock { scope: String, block: String },

    #[error("symbol '{name}' is already registered in scope '{scope}'")]
    SymbolAlreadyRegistered { scope: String, name: String },

    #[error("unknown scope #{0}")]
    UnknownScope(u32),

    #[error("'{symbol}' is defined {count} times in scope '{scope}'")]
    MultipleDefinitions {
        scope: String,
        symbol: String,
        count: usize,
    },

    #[error("use of '{symbol}' at {loc} is not dominated by its definition")]
    UseNotDominated { symbol: String, loc: SourceLoc },

    #[error("phi for '{symbol}' in block '{block}' has {distinct} distinct argument(s)")]
    DegeneratePhi {
        symbol: String,
        block: String,
        distinct: usize,
    },

    #[error("phi for '{symbol}' in block '{block}' references itself")]
    SelfReferencingPhi { symbol: String, block: String },

    #[error("{loc}: port direction is conflicted for '{port}'")]
    PortDirectionConflict { port: String, loc: SourceLoc },

    #[error("{loc}: cannot wait for a change of the output port '{port}'")]
    WaitOnOutputPort { port: String, loc: SourceLoc },

    #[error("port '{port}' of module '{module}' is not used at all")]
    UnusedPort { port: String, module: String },
}
