//! hlsc STG - state-transition graphs and pipeline control
//!
//! This crate handles:
//! - Translation of scheduled IR statements into AHDL
//! - Grouping AHDL into states and stitching states into STGs
//! - Pipeline stage construction with valid/ready/hold handshakes,
//!   register slices and finite-loop exit detection
//! - Validation and cycle-level simulation of the generated control

pub mod ahdl;
pub mod ahdl_usedef;
pub mod control_sim;
pub mod dump;
pub mod error;
pub mod pipeline;
pub mod schedule;
pub mod state;
pub mod stg;
pub mod stg_validation;
pub mod translator;

// Re-export main types
pub use ahdl::{AhdlExpr, AhdlOp, AhdlStm, SeqFactor, StateRef, Target, WaitKind};
pub use ahdl_usedef::AhdlUseDef;
pub use control_sim::ControlSim;
pub use dump::AhdlFormatter;
pub use error::{StgError, StgResult};
pub use schedule::{LoopInfo, Region, ScheduledNode, SchedulingMode, ScopeSchedule};
pub use state::{CtrlKind, PipelineStage, PipelineState, PlainState, State, Stg};
pub use stg::{ScheduledItemQueue, StgBuilder, StgConfig};
pub use stg_validation::validate_stgs;
pub use translator::AhdlTranslator;
