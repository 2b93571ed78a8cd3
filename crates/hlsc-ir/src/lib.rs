//! hlsc IR - scopes, symbols and SSA construction
//!
//! This crate handles:
//! - The design arena (scopes, symbols, signals) and the sequential IR
//! - Use-def tables and dominance analysis
//! - SSA construction with phi pruning, plus its validation
//! - Port direction inference for module ports

pub mod block;
pub mod design;
pub mod dominance;
pub mod dump;
pub mod error;
pub mod ir;
pub mod port_direction;
pub mod scope;
pub mod signal;
pub mod ssa_conversion;
pub mod ssa_validation;
pub mod symbol;
pub mod types;
pub mod usedef;

// Re-export main types
pub use block::{Block, BlockId};
pub use design::Design;
pub use dominance::{DominanceFrontier, DominatorTree};
pub use error::{IrError, IrResult, SourceLoc};
pub use ir::{
    BinOp, ConstValue, Ctx, Expr, JumpKind, Phi, PhiKind, RelOp, Stm, StmId, StmKind, UnOp,
};
pub use port_direction::infer_port_directions;
pub use scope::{FunctionParam, Scope, ScopeId, ScopeTag, Worker};
pub use signal::{Signal, SignalId, SignalTag};
pub use ssa_conversion::{apply_ssa_conversion, SsaTransformer};
pub use ssa_validation::validate_ssa;
pub use symbol::{Symbol, SymbolId, SymbolTag};
pub use types::{MemKind, PortClass, PortDirection, PortKind, PortType, Protocol, Type};
pub use usedef::{StmRef, UseDefTable};
