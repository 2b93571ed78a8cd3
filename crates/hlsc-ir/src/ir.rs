//! Sequential IR: expressions and statements
//!
//! Both are closed sum types. A statement defines at most one symbol (the
//! `Temp` in store context of its destination) and uses any number of symbols
//! (every `Temp` in load context).

use serde::{Deserialize, Serialize};

use crate::block::BlockId;
use crate::scope::ScopeId;
use crate::symbol::SymbolId;

/// Whether an expression is read or written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ctx {
    Load,
    Store,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Int(i64),
    Bool(bool),
    Str(String),
    None,
}

impl ConstValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConstValue::Int(v) => Some(*v),
            ConstValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    USub,
    UAdd,
    Not,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(ConstValue),
    Temp {
        sym: SymbolId,
        ctx: Ctx,
    },
    /// `exp.attr`
    Attr {
        exp: Box<Expr>,
        attr: SymbolId,
        /// Scope the attribute symbol lives in
        attr_scope: ScopeId,
        ctx: Ctx,
    },
    UnOp {
        op: UnOp,
        exp: Box<Expr>,
    },
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    RelOp {
        op: RelOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    CondOp {
        cond: Box<Expr>,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Call of another scope
    Call {
        func: Box<Expr>,
        func_scope: ScopeId,
        args: Vec<(String, Expr)>,
    },
    /// Builtin call (`print`, `clksleep`, `wait_rising`, ...)
    SysCall {
        name: String,
        args: Vec<(String, Expr)>,
    },
    /// Instantiation of a class scope
    New {
        func_scope: ScopeId,
        args: Vec<(String, Expr)>,
    },
    /// Memory read `mem[offset]`
    MRef {
        mem: Box<Expr>,
        offset: Box<Expr>,
        ctx: Ctx,
    },
    /// Memory write, the value of `mem` after `mem[offset] = exp`
    MStore {
        mem: Box<Expr>,
        offset: Box<Expr>,
        exp: Box<Expr>,
    },
    /// `[items...] * repeat`
    Array {
        items: Vec<Expr>,
        repeat: Box<Expr>,
        mutable: bool,
    },
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Const(ConstValue::Int(value))
    }

    pub fn load(sym: SymbolId) -> Self {
        Expr::Temp {
            sym,
            ctx: Ctx::Load,
        }
    }

    pub fn store(sym: SymbolId) -> Self {
        Expr::Temp {
            sym,
            ctx: Ctx::Store,
        }
    }

    pub fn binop(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn relop(op: RelOp, left: Expr, right: Expr) -> Self {
        Expr::RelOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn syscall(name: &str, args: Vec<Expr>) -> Self {
        Expr::SysCall {
            name: name.to_string(),
            args: args.into_iter().map(|a| (String::new(), a)).collect(),
        }
    }

    pub fn as_const(&self) -> Option<&ConstValue> {
        match self {
            Expr::Const(c) => Some(c),
            _ => None,
        }
    }

    /// Symbol named by a variable expression
    pub fn symbol(&self) -> Option<SymbolId> {
        match self {
            Expr::Temp { sym, .. } => Some(*sym),
            Expr::Attr { attr, .. } => Some(*attr),
            _ => None,
        }
    }

    /// `a.b.c` as `[a, b, c]`
    pub fn qualified_symbols(&self) -> Vec<SymbolId> {
        match self {
            Expr::Temp { sym, .. } => vec![*sym],
            Expr::Attr { exp, attr, .. } => {
                let mut qsym = exp.qualified_symbols();
                qsym.push(*attr);
                qsym
            }
            _ => Vec::new(),
        }
    }

    pub fn ctx(&self) -> Option<Ctx> {
        match self {
            Expr::Temp { ctx, .. } | Expr::Attr { ctx, .. } | Expr::MRef { ctx, .. } => {
                Some(*ctx)
            }
            _ => None,
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Expr::Temp { .. } | Expr::Attr { .. })
    }

    /// Direct sub-expressions
    pub fn kids(&self) -> Vec<&Expr> {
        match self {
            Expr::Const(_) | Expr::Temp { .. } => Vec::new(),
            Expr::Attr { exp, .. } | Expr::UnOp { exp, .. } => vec![&**exp],
            Expr::BinOp { left, right, .. } | Expr::RelOp { left, right, .. } => {
                vec![&**left, &**right]
            }
            Expr::CondOp { cond, left, right } => vec![&**cond, &**left, &**right],
            Expr::Call { func, args, .. } => {
                let mut kids = vec![&**func];
                kids.extend(args.iter().map(|(_, a)| a));
                kids
            }
            Expr::SysCall { args, .. } | Expr::New { args, .. } => {
                args.iter().map(|(_, a)| a).collect()
            }
            Expr::MRef { mem, offset, .. } => vec![&**mem, &**offset],
            Expr::MStore { mem, offset, exp } => vec![&**mem, &**offset, &**exp],
            Expr::Array { items, repeat, .. } => {
                let mut kids: Vec<&Expr> = items.iter().collect();
                kids.push(&**repeat);
                kids
            }
        }
    }

    pub fn kids_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Const(_) | Expr::Temp { .. } => Vec::new(),
            Expr::Attr { exp, .. } | Expr::UnOp { exp, .. } => vec![&mut **exp],
            Expr::BinOp { left, right, .. } | Expr::RelOp { left, right, .. } => {
                vec![&mut **left, &mut **right]
            }
            Expr::CondOp { cond, left, right } => {
                vec![&mut **cond, &mut **left, &mut **right]
            }
            Expr::Call { func, args, .. } => {
                let mut kids = vec![&mut **func];
                kids.extend(args.iter_mut().map(|(_, a)| a));
                kids
            }
            Expr::SysCall { args, .. } | Expr::New { args, .. } => {
                args.iter_mut().map(|(_, a)| a).collect()
            }
            Expr::MRef { mem, offset, .. } => vec![&mut **mem, &mut **offset],
            Expr::MStore { mem, offset, exp } => vec![&mut **mem, &mut **offset, &mut **exp],
            Expr::Array { items, repeat, .. } => {
                let mut kids: Vec<&mut Expr> = items.iter_mut().collect();
                kids.push(&mut **repeat);
                kids
            }
        }
    }

    /// Visit every `Temp` in this expression tree
    pub fn visit_temps(&self, f: &mut impl FnMut(SymbolId, Ctx)) {
        if let Expr::Temp { sym, ctx } = self {
            f(*sym, *ctx);
        }
        for kid in self.kids() {
            kid.visit_temps(f);
        }
    }

    pub fn visit_temps_mut(&mut self, f: &mut impl FnMut(&mut SymbolId, Ctx)) {
        if let Expr::Temp { sym, ctx } = self {
            f(sym, *ctx);
        }
        for kid in self.kids_mut() {
            kid.visit_temps_mut(f);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StmId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JumpKind {
    Normal,
    /// Loop-back jump
    Loop,
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhiKind {
    Phi,
    /// Phi of an if-converted region
    UPhi,
    /// Phi at a loop header
    LPhi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phi {
    /// Destination, a `Temp` in store context
    pub var: Expr,
    /// (source, predecessor block) pairs
    pub args: Vec<(Expr, BlockId)>,
    /// Per-argument predicates, filled by if-conversion
    pub ps: Vec<Expr>,
    pub kind: PhiKind,
}

impl Phi {
    pub fn new(var: Expr) -> Self {
        Self {
            var,
            args: Vec::new(),
            ps: Vec::new(),
            kind: PhiKind::Phi,
        }
    }

    pub fn dst(&self) -> Option<SymbolId> {
        self.var.symbol()
    }

    /// Argument symbols that are not the destination itself
    pub fn non_self_arg_symbols(&self) -> Vec<SymbolId> {
        let dst = self.dst();
        self.args
            .iter()
            .filter_map(|(arg, _)| arg.symbol())
            .filter(|s| Some(*s) != dst)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmKind {
    Move {
        dst: Expr,
        src: Expr,
    },
    Expr(Expr),
    /// Conditional move, produced by if-conversion
    CMove {
        cond: Expr,
        dst: Expr,
        src: Expr,
    },
    CExpr {
        cond: Expr,
        exp: Expr,
    },
    Jump {
        target: BlockId,
        kind: JumpKind,
    },
    CJump {
        exp: Expr,
        true_target: BlockId,
        false_target: BlockId,
    },
    /// Multi-way conditional jump; the last condition is the default
    MCJump {
        conds: Vec<Expr>,
        targets: Vec<BlockId>,
    },
    Ret(Expr),
    Phi(Phi),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stm {
    pub id: StmId,
    pub lineno: u32,
    pub kind: StmKind,
}

impl Stm {
    pub fn is_phi(&self) -> bool {
        matches!(self.kind, StmKind::Phi(_))
    }

    pub fn as_phi(&self) -> Option<&Phi> {
        match &self.kind {
            StmKind::Phi(phi) => Some(phi),
            _ => None,
        }
    }

    pub fn as_phi_mut(&mut self) -> Option<&mut Phi> {
        match &mut self.kind {
            StmKind::Phi(phi) => Some(phi),
            _ => None,
        }
    }

    pub fn is_jump(&self) -> bool {
        matches!(
            self.kind,
            StmKind::Jump { .. } | StmKind::CJump { .. } | StmKind::MCJump { .. }
        )
    }

    pub fn exprs(&self) -> Vec<&Expr> {
        match &self.kind {
            StmKind::Move { dst, src } => vec![dst, src],
            StmKind::Expr(exp) | StmKind::Ret(exp) => vec![exp],
            StmKind::CMove { cond, dst, src } => vec![cond, dst, src],
            StmKind::CExpr { cond, exp } => vec![cond, exp],
            StmKind::Jump { .. } => Vec::new(),
            StmKind::CJump { exp, .. } => vec![exp],
            StmKind::MCJump { conds, .. } => conds.iter().collect(),
            StmKind::Phi(phi) => {
                let mut exprs = vec![&phi.var];
                exprs.extend(phi.args.iter().map(|(a, _)| a));
                exprs.extend(phi.ps.iter());
                exprs
            }
        }
    }

    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            StmKind::Move { dst, src } => vec![dst, src],
            StmKind::Expr(exp) | StmKind::Ret(exp) => vec![exp],
            StmKind::CMove { cond, dst, src } => vec![cond, dst, src],
            StmKind::CExpr { cond, exp } => vec![cond, exp],
            StmKind::Jump { .. } => Vec::new(),
            StmKind::CJump { exp, .. } => vec![exp],
            StmKind::MCJump { conds, .. } => conds.iter_mut().collect(),
            StmKind::Phi(phi) => {
                let mut exprs = vec![&mut phi.var];
                exprs.extend(phi.args.iter_mut().map(|(a, _)| a));
                exprs.extend(phi.ps.iter_mut());
                exprs
            }
        }
    }

    /// Symbols defined by this statement
    pub fn defs(&self) -> Vec<SymbolId> {
        let mut defs = Vec::new();
        for exp in self.exprs() {
            exp.visit_temps(&mut |sym, ctx| {
                if ctx == Ctx::Store {
                    defs.push(sym);
                }
            });
        }
        defs
    }

    /// Symbols read by this statement, in visiting order
    pub fn uses(&self) -> Vec<SymbolId> {
        let mut uses = Vec::new();
        for exp in self.exprs() {
            exp.visit_temps(&mut |sym, ctx| {
                if ctx == Ctx::Load {
                    uses.push(sym);
                }
            });
        }
        uses
    }

    /// Rewrite every read of `old` into a read of `new`; true if anything changed
    pub fn replace_uses(&mut self, old: SymbolId, new: SymbolId) -> bool {
        let mut changed = false;
        for exp in self.exprs_mut() {
            exp.visit_temps_mut(&mut |sym, ctx| {
                if ctx == Ctx::Load && *sym == old {
                    *sym = new;
                    changed = true;
                }
            });
        }
        changed
    }

    /// Blocks this statement can jump to
    pub fn jump_targets(&self) -> Vec<BlockId> {
        match &self.kind {
            StmKind::Jump { target, .. } => vec![*target],
            StmKind::CJump {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
            StmKind::MCJump { targets, .. } => targets.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defs_and_uses_follow_context() {
        let (x, y, z) = (SymbolId(0), SymbolId(1), SymbolId(2));
        let stm = Stm {
            id: StmId(0),
            lineno: 1,
            kind: StmKind::Move {
                dst: Expr::store(x),
                src: Expr::binop(BinOp::Add, Expr::load(y), Expr::load(z)),
            },
        };
        assert_eq!(stm.defs(), vec![x]);
        assert_eq!(stm.uses(), vec![y, z]);
    }

    #[test]
    fn replace_uses_leaves_definitions_alone() {
        let (x, y) = (SymbolId(0), SymbolId(1));
        let mut stm = Stm {
            id: StmId(0),
            lineno: 1,
            kind: StmKind::Move {
                dst: Expr::store(x),
                src: Expr::binop(BinOp::Add, Expr::load(x), Expr::int(1)),
            },
        };
        assert!(stm.replace_uses(x, y));
        assert_eq!(stm.defs(), vec![x]);
        assert_eq!(stm.uses(), vec![y]);
        assert!(!stm.replace_uses(x, y));
    }
}
