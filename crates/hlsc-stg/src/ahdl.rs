//! AHDL: the low-level hardware operations held by states
//!
//! Expressions read and write signals; statements are register transfers,
//! guarded blocks, multi-cycle sequences and state transitions. A state's
//! code list always ends in a terminal (`Transition`, `TransitionIf` or
//! `MetaWait`).

use hlsc_ir::{BlockId, Ctx, ScopeId, SignalId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AhdlOp {
    Add,
    Sub,
    Mult,
    FloorDiv,
    Mod,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Not,
    Invert,
    USub,
    UAdd,
}

impl AhdlOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            AhdlOp::Add | AhdlOp::UAdd => "+",
            AhdlOp::Sub | AhdlOp::USub => "-",
            AhdlOp::Mult => "*",
            AhdlOp::FloorDiv => "/",
            AhdlOp::Mod => "%",
            AhdlOp::LShift => "<<",
            AhdlOp::RShift => ">>",
            AhdlOp::BitAnd => "&",
            AhdlOp::BitOr => "|",
            AhdlOp::BitXor => "^",
            AhdlOp::And => "&&",
            AhdlOp::Or => "||",
            AhdlOp::Eq => "==",
            AhdlOp::NotEq => "!=",
            AhdlOp::Lt => "<",
            AhdlOp::LtE => "<=",
            AhdlOp::Gt => ">",
            AhdlOp::GtE => ">=",
            AhdlOp::Not => "!",
            AhdlOp::Invert => "~",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AhdlExpr {
    Const(i64),
    Var { sig: SignalId, ctx: Ctx },
    /// A whole memory (register array, RAM or ROM interface)
    MemVar { sig: SignalId, ctx: Ctx },
    /// Raw HDL text such as `'bz` or `{mem}_len`
    Symbol(String),
    Op { op: AhdlOp, args: Vec<AhdlExpr> },
    IfExp {
        cond: Box<AhdlExpr>,
        then: Box<AhdlExpr>,
        els: Box<AhdlExpr>,
    },
    Subscript {
        mem: Box<AhdlExpr>,
        offset: Box<AhdlExpr>,
    },
    /// Function-style lookup, used for ROM tables
    FunCall { name: String, args: Vec<AhdlExpr> },
}

impl AhdlExpr {
    pub fn load(sig: SignalId) -> Self {
        AhdlExpr::Var {
            sig,
            ctx: Ctx::Load,
        }
    }

    pub fn store(sig: SignalId) -> Self {
        AhdlExpr::Var {
            sig,
            ctx: Ctx::Store,
        }
    }

    pub fn unary(op: AhdlOp, exp: AhdlExpr) -> Self {
        AhdlExpr::Op {
            op,
            args: vec![exp],
        }
    }

    pub fn binary(op: AhdlOp, left: AhdlExpr, right: AhdlExpr) -> Self {
        AhdlExpr::Op {
            op,
            args: vec![left, right],
        }
    }

    pub fn if_exp(cond: AhdlExpr, then: AhdlExpr, els: AhdlExpr) -> Self {
        AhdlExpr::IfExp {
            cond: Box::new(cond),
            then: Box::new(then),
            els: Box::new(els),
        }
    }

    pub fn high_z() -> Self {
        AhdlExpr::Symbol("'bz".to_string())
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            AhdlExpr::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// Signal of a `Var` or `MemVar`
    pub fn sig(&self) -> Option<SignalId> {
        match self {
            AhdlExpr::Var { sig, .. } | AhdlExpr::MemVar { sig, .. } => Some(*sig),
            _ => None,
        }
    }

    pub fn kids(&self) -> Vec<&AhdlExpr> {
        match self {
            AhdlExpr::Const(_)
            | AhdlExpr::Var { .. }
            | AhdlExpr::MemVar { .. }
            | AhdlExpr::Symbol(_) => Vec::new(),
            AhdlExpr::Op { args, .. } | AhdlExpr::FunCall { args, .. } => args.iter().collect(),
            AhdlExpr::IfExp { cond, then, els } => vec![&**cond, &**then, &**els],
            AhdlExpr::Subscript { mem, offset } => vec![&**mem, &**offset],
        }
    }

    pub fn kids_mut(&mut self) -> Vec<&mut AhdlExpr> {
        match self {
            AhdlExpr::Const(_)
            | AhdlExpr::Var { .. }
            | AhdlExpr::MemVar { .. }
            | AhdlExpr::Symbol(_) => Vec::new(),
            AhdlExpr::Op { args, .. } | AhdlExpr::FunCall { args, .. } => {
                args.iter_mut().collect()
            }
            AhdlExpr::IfExp { cond, then, els } => vec![&mut **cond, &mut **then, &mut **els],
            AhdlExpr::Subscript { mem, offset } => vec![&mut **mem, &mut **offset],
        }
    }

    /// Every signal read by this expression
    pub fn loads(&self, out: &mut Vec<SignalId>) {
        match self {
            AhdlExpr::Var { sig, ctx } | AhdlExpr::MemVar { sig, ctx } => {
                if *ctx == Ctx::Load {
                    out.push(*sig);
                }
            }
            _ => {}
        }
        for kid in self.kids() {
            kid.loads(out);
        }
    }

    /// Rename reads of `old` to `new`; returns true if anything changed
    pub fn replace_loads(&mut self, old: SignalId, new: SignalId) -> bool {
        let mut changed = false;
        match self {
            AhdlExpr::Var { sig, ctx } | AhdlExpr::MemVar { sig, ctx } => {
                if *sig == old && *ctx == Ctx::Load {
                    *sig = new;
                    changed = true;
                }
            }
            _ => {}
        }
        for kid in self.kids_mut() {
            changed |= kid.replace_loads(old, new);
        }
        changed
    }

    /// Replace every read of `sig` by a copy of `with`
    pub fn substitute(&mut self, sig: SignalId, with: &AhdlExpr) {
        if matches!(self, AhdlExpr::Var { sig: s, ctx: Ctx::Load } if *s == sig) {
            *self = with.clone();
            return;
        }
        for kid in self.kids_mut() {
            kid.substitute(sig, with);
        }
    }
}

/// Handle of a state: STG index within the scope, state index within the STG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateRef {
    pub stg: usize,
    pub state: usize,
}

/// Target of a transition
///
/// `Next` and `Block` are pending forms that only exist between building
/// and resolving an STG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Next,
    Block(BlockId),
    State(StateRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WaitKind {
    /// Wait until every port moves from `old` to `new`
    Edge {
        old: AhdlExpr,
        new: AhdlExpr,
        ports: Vec<AhdlExpr>,
    },
    /// Wait until every (value, port) pair matches
    Value { expects: Vec<(AhdlExpr, AhdlExpr)> },
}

/// The operation a multi-cycle `Seq` steps through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SeqFactor {
    ModuleCall {
        scope: ScopeId,
        args: Vec<AhdlExpr>,
        instance_name: String,
        prefix: String,
        returns: Vec<AhdlExpr>,
    },
    IoRead {
        port: AhdlExpr,
        dst: Option<AhdlExpr>,
        is_self: bool,
    },
    IoWrite {
        port: AhdlExpr,
        src: AhdlExpr,
        is_self: bool,
    },
    Load {
        mem: AhdlExpr,
        dst: AhdlExpr,
        offset: AhdlExpr,
    },
    Store {
        mem: AhdlExpr,
        src: AhdlExpr,
        offset: AhdlExpr,
    },
    CalleeProlog(String),
    CalleeEpilog(String),
}

impl SeqFactor {
    pub fn name(&self) -> &'static str {
        match self {
            SeqFactor::ModuleCall { .. } => "call",
            SeqFactor::IoRead { .. } => "io_read",
            SeqFactor::IoWrite { .. } => "io_write",
            SeqFactor::Load { .. } => "load",
            SeqFactor::Store { .. } => "store",
            SeqFactor::CalleeProlog(_) => "prolog",
            SeqFactor::CalleeEpilog(_) => "epilog",
        }
    }

    pub fn is_io(&self) -> bool {
        matches!(self, SeqFactor::IoRead { .. } | SeqFactor::IoWrite { .. })
    }

    /// Expressions read when the sequence starts
    pub fn operands(&self) -> Vec<&AhdlExpr> {
        match self {
            SeqFactor::ModuleCall { args, .. } => args.iter().collect(),
            SeqFactor::IoRead { port, .. } => vec![port],
            SeqFactor::IoWrite { src, .. } => vec![src],
            SeqFactor::Load { mem, offset, .. } => vec![mem, offset],
            SeqFactor::Store { src, offset, .. } => vec![src, offset],
            SeqFactor::CalleeProlog(_) | SeqFactor::CalleeEpilog(_) => Vec::new(),
        }
    }

    /// Signals written when the sequence completes
    pub fn results(&self) -> Vec<SignalId> {
        match self {
            SeqFactor::ModuleCall { returns, .. } => returns.iter().filter_map(|r| r.sig()).collect(),
            SeqFactor::IoRead { dst, .. } => dst.iter().filter_map(|d| d.sig()).collect(),
            SeqFactor::IoWrite { port, .. } => port.sig().into_iter().collect(),
            SeqFactor::Load { dst, .. } => dst.sig().into_iter().collect(),
            SeqFactor::Store { mem, .. } => mem.sig().into_iter().collect(),
            SeqFactor::CalleeProlog(_) | SeqFactor::CalleeEpilog(_) => Vec::new(),
        }
    }

    fn exprs_mut(&mut self) -> Vec<&mut AhdlExpr> {
        match self {
            SeqFactor::ModuleCall { args, returns, .. } => {
                args.iter_mut().chain(returns.iter_mut()).collect()
            }
            SeqFactor::IoRead { port, dst, .. } => {
                let mut v = vec![port];
                v.extend(dst.iter_mut());
                v
            }
            SeqFactor::IoWrite { port, src, .. } => vec![port, src],
            SeqFactor::Load { mem, dst, offset } => vec![mem, dst, offset],
            SeqFactor::Store { mem, src, offset } => vec![mem, src, offset],
            SeqFactor::CalleeProlog(_) | SeqFactor::CalleeEpilog(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AhdlStm {
    Move {
        dst: AhdlExpr,
        src: AhdlExpr,
    },
    /// `if / elif` chain; `blocks[i]` runs when `conds[i]` is the first true one
    If {
        conds: Vec<AhdlExpr>,
        blocks: Vec<Vec<AhdlStm>>,
    },
    /// Operations of a pipeline stage that must only fire for a valid token
    PipelineGuard {
        cond: AhdlExpr,
        codes: Vec<AhdlStm>,
    },
    Transition(Target),
    /// Conditional transition; every block ends in a `Transition`
    TransitionIf {
        conds: Vec<AhdlExpr>,
        blocks: Vec<Vec<AhdlStm>>,
    },
    MetaWait {
        kind: WaitKind,
        /// Filled when the owning state is resolved
        transition: Option<Box<AhdlStm>>,
    },
    /// Step `step` of an `step_n`-cycle operation
    Seq {
        factor: SeqFactor,
        step: u32,
        step_n: u32,
    },
    ProcCall {
        name: String,
        args: Vec<AhdlExpr>,
    },
    Inline(String),
    Nop(String),
}

impl AhdlStm {
    pub fn mv(dst: AhdlExpr, src: AhdlExpr) -> Self {
        AhdlStm::Move { dst, src }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AhdlStm::Transition(_) | AhdlStm::TransitionIf { .. } | AhdlStm::MetaWait { .. }
        )
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, AhdlStm::Transition(_) | AhdlStm::TransitionIf { .. })
    }

    /// Expressions held directly by this statement (nested statements excluded)
    pub fn exprs(&self) -> Vec<&AhdlExpr> {
        match self {
            AhdlStm::Move { dst, src } => vec![dst, src],
            AhdlStm::If { conds, .. } | AhdlStm::TransitionIf { conds, .. } => {
                conds.iter().collect()
            }
            AhdlStm::PipelineGuard { cond, .. } => vec![cond],
            AhdlStm::MetaWait { kind, .. } => match kind {
                WaitKind::Edge { old, new, ports } => {
                    let mut v = vec![old, new];
                    v.extend(ports.iter());
                    v
                }
                WaitKind::Value { expects } => {
                    expects.iter().flat_map(|(v, p)| [v, p]).collect()
                }
            },
            AhdlStm::Seq { factor, .. } => factor.operands(),
            AhdlStm::ProcCall { args, .. } => args.iter().collect(),
            AhdlStm::Transition(_) | AhdlStm::Inline(_) | AhdlStm::Nop(_) => Vec::new(),
        }
    }

    fn exprs_mut(&mut self) -> Vec<&mut AhdlExpr> {
        match self {
            AhdlStm::Move { dst, src } => vec![dst, src],
            AhdlStm::If { conds, .. } | AhdlStm::TransitionIf { conds, .. } => {
                conds.iter_mut().collect()
            }
            AhdlStm::PipelineGuard { cond, .. } => vec![cond],
            AhdlStm::MetaWait { kind, .. } => match kind {
                WaitKind::Edge { old, new, ports } => {
                    let mut v = vec![old, new];
                    v.extend(ports.iter_mut());
                    v
                }
                WaitKind::Value { expects } => expects
                    .iter_mut()
                    .flat_map(|(v, p)| [v, p])
                    .collect(),
            },
            AhdlStm::Seq { factor, .. } => factor.exprs_mut(),
            AhdlStm::ProcCall { args, .. } => args.iter_mut().collect(),
            AhdlStm::Transition(_) | AhdlStm::Inline(_) | AhdlStm::Nop(_) => Vec::new(),
        }
    }

    /// Nested statement lists
    pub fn blocks(&self) -> Vec<&Vec<AhdlStm>> {
        match self {
            AhdlStm::If { blocks, .. } | AhdlStm::TransitionIf { blocks, .. } => {
                blocks.iter().collect()
            }
            AhdlStm::PipelineGuard { codes, .. } => vec![codes],
            _ => Vec::new(),
        }
    }

    pub fn blocks_mut(&mut self) -> Vec<&mut Vec<AhdlStm>> {
        match self {
            AhdlStm::If { blocks, .. } | AhdlStm::TransitionIf { blocks, .. } => {
                blocks.iter_mut().collect()
            }
            AhdlStm::PipelineGuard { codes, .. } => vec![codes],
            _ => Vec::new(),
        }
    }

    /// Signals written by this statement itself
    pub fn defs(&self) -> Vec<SignalId> {
        match self {
            AhdlStm::Move { dst, .. } => match dst {
                AhdlExpr::Var { sig, .. } | AhdlExpr::MemVar { sig, .. } => vec![*sig],
                AhdlExpr::Subscript { mem, .. } => mem.sig().into_iter().collect(),
                _ => Vec::new(),
            },
            AhdlStm::Seq {
                factor,
                step,
                step_n,
            } if *step + 1 == *step_n => factor.results(),
            _ => Vec::new(),
        }
    }

    /// Signals read by this statement itself
    pub fn uses(&self) -> Vec<SignalId> {
        let mut out = Vec::new();
        match self {
            AhdlStm::Move { dst, src } => {
                src.loads(&mut out);
                if let AhdlExpr::Subscript { offset, .. } = dst {
                    offset.loads(&mut out);
                }
            }
            AhdlStm::Seq { factor, step, .. } => {
                if *step == 0 {
                    for exp in factor.operands() {
                        exp.loads(&mut out);
                    }
                }
            }
            _ => {
                for exp in self.exprs() {
                    exp.loads(&mut out);
                }
            }
        }
        out
    }

    /// Rename reads of `old` to `new` here and in nested statements
    pub fn replace_loads(&mut self, old: SignalId, new: SignalId) -> bool {
        let mut changed = false;
        for exp in self.exprs_mut() {
            changed |= exp.replace_loads(old, new);
        }
        for block in self.blocks_mut() {
            for stm in block.iter_mut() {
                changed |= stm.replace_loads(old, new);
            }
        }
        if let AhdlStm::MetaWait {
            transition: Some(t),
            ..
        } = self
        {
            changed |= t.replace_loads(old, new);
        }
        changed
    }
}

/// Pre-order walk over `codes` and every nested statement
pub fn walk<'a>(codes: &'a [AhdlStm], f: &mut impl FnMut(&'a AhdlStm)) {
    for code in codes {
        f(code);
        for block in code.blocks() {
            walk(block, f);
        }
        if let AhdlStm::MetaWait {
            transition: Some(t),
            ..
        } = code
        {
            walk(std::slice::from_ref(&**t), f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_defines_on_last_step_and_uses_on_first() {
        let (port, dst, src) = (SignalId(0), SignalId(1), SignalId(2));
        let read = SeqFactor::IoRead {
            port: AhdlExpr::load(port),
            dst: Some(AhdlExpr::store(dst)),
            is_self: true,
        };
        let first = AhdlStm::Seq {
            factor: read.clone(),
            step: 0,
            step_n: 2,
        };
        let last = AhdlStm::Seq {
            factor: read,
            step: 1,
            step_n: 2,
        };
        assert_eq!(first.uses(), vec![port]);
        assert!(first.defs().is_empty());
        assert!(last.uses().is_empty());
        assert_eq!(last.defs(), vec![dst]);

        let write = AhdlStm::Seq {
            factor: SeqFactor::IoWrite {
                port: AhdlExpr::store(port),
                src: AhdlExpr::load(src),
                is_self: true,
            },
            step: 0,
            step_n: 1,
        };
        assert_eq!(write.uses(), vec![src]);
        assert_eq!(write.defs(), vec![port]);
    }

    #[test]
    fn replace_loads_leaves_stores_alone() {
        let (a, b) = (SignalId(0), SignalId(1));
        let mut stm = AhdlStm::If {
            conds: vec![AhdlExpr::load(a)],
            blocks: vec![vec![AhdlStm::mv(
                AhdlExpr::store(a),
                AhdlExpr::binary(AhdlOp::Add, AhdlExpr::load(a), AhdlExpr::Const(1)),
            )]],
        };
        assert!(stm.replace_loads(a, b));
        let mut seen = Vec::new();
        walk(std::slice::from_ref(&stm), &mut |s| seen.extend(s.uses()));
        assert_eq!(seen, vec![b, b]);
        let mut defs = Vec::new();
        walk(std::slice::from_ref(&stm), &mut |s| defs.extend(s.defs()));
        assert_eq!(defs, vec![a]);
    }

    #[test]
    fn substitute_replaces_whole_reads() {
        let (i, n) = (SignalId(0), SignalId(1));
        let mut cond = AhdlExpr::binary(AhdlOp::Lt, AhdlExpr::load(i), AhdlExpr::load(n));
        cond.substitute(i, &AhdlExpr::Const(0));
        assert_eq!(
            cond,
            AhdlExpr::binary(AhdlOp::Lt, AhdlExpr::Const(0), AhdlExpr::load(n))
        );
    }
}
