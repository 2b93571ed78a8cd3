//! Text rendering of IR for debug logs

use std::fmt::Write;

use crate::design::Design;
use crate::ir::{BinOp, ConstValue, Expr, RelOp, Stm, StmKind, UnOp};
use crate::scope::ScopeId;

fn binop_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mult => "*",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::LShift => "<<",
        BinOp::RShift => ">>",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
    }
}

fn relop_str(op: RelOp) -> &'static str {
    match op {
        RelOp::And => "and",
        RelOp::Or => "or",
        RelOp::Eq => "==",
        RelOp::NotEq => "!=",
        RelOp::Lt => "<",
        RelOp::LtE => "<=",
        RelOp::Gt => ">",
        RelOp::GtE => ">=",
        RelOp::Is => "is",
        RelOp::IsNot => "is not",
    }
}

fn unop_str(op: UnOp) -> &'static str {
    match op {
        UnOp::USub => "-",
        UnOp::UAdd => "+",
        UnOp::Not => "not ",
        UnOp::Invert => "~",
    }
}

impl Design {
    pub fn expr_str(&self, exp: &Expr) -> String {
        let args_str = |args: &[(String, Expr)]| {
            args.iter()
                .map(|(_, a)| self.expr_str(a))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match exp {
            Expr::Const(ConstValue::Int(v)) => v.to_string(),
            Expr::Const(ConstValue::Bool(b)) => b.to_string(),
            Expr::Const(ConstValue::Str(s)) => format!("'{}'", s),
            Expr::Const(ConstValue::None) => "None".to_string(),
            Expr::Temp { sym, .. } => self.symbol(*sym).name.clone(),
            Expr::Attr { exp, attr, .. } => {
                format!("{}.{}", self.expr_str(exp), self.symbol(*attr).name)
            }
            Expr::UnOp { op, exp } => format!("{}{}", unop_str(*op), self.expr_str(exp)),
            Expr::BinOp { op, left, right } => format!(
                "({} {} {})",
                self.expr_str(left),
                binop_str(*op),
                self.expr_str(right)
            ),
            Expr::RelOp { op, left, right } => format!(
                "({} {} {})",
                self.expr_str(left),
                relop_str(*op),
                self.expr_str(right)
            ),
            Expr::CondOp { cond, left, right } => format!(
                "({} ? {} : {})",
                self.expr_str(cond),
                self.expr_str(left),
                self.expr_str(right)
            ),
            Expr::Call { func, args, .. } => {
                format!("{}({})", self.expr_str(func), args_str(args))
            }
            Expr::SysCall { name, args } => format!("!{}({})", name, args_str(args)),
            Expr::New { func_scope, args } => {
                format!("${}({})", self.scope(*func_scope).orig_name, args_str(args))
            }
            Expr::MRef { mem, offset, .. } => {
                format!("{}[{}]", self.expr_str(mem), self.expr_str(offset))
            }
            Expr::MStore { mem, offset, exp } => format!(
                "mstore({}[{}], {})",
                self.expr_str(mem),
                self.expr_str(offset),
                self.expr_str(exp)
            ),
            Expr::Array { items, repeat, .. } => format!(
                "[{}] * {}",
                items
                    .iter()
                    .map(|i| self.expr_str(i))
                    .collect::<Vec<_>>()
                    .join(", "),
                self.expr_str(repeat)
            ),
        }
    }

    pub fn stm_str(&self, scope: ScopeId, stm: &Stm) -> String {
        let block_name = |b| self.scope(scope).block(b).name();
        match &stm.kind {
            StmKind::Move { dst, src } => {
                format!("{} = {}", self.expr_str(dst), self.expr_str(src))
            }
            StmKind::Expr(exp) => self.expr_str(exp),
            StmKind::CMove { cond, dst, src } => format!(
                "{} ? {} = {}",
                self.expr_str(cond),
                self.expr_str(dst),
                self.expr_str(src)
            ),
            StmKind::CExpr { cond, exp } => {
                format!("{} ? {}", self.expr_str(cond), self.expr_str(exp))
            }
            StmKind::Jump { target, .. } => format!("jump {}", block_name(*target)),
            StmKind::CJump {
                exp,
                true_target,
                false_target,
            } => format!(
                "cjump {} ? {}, {}",
                self.expr_str(exp),
                block_name(*true_target),
                block_name(*false_target)
            ),
            StmKind::MCJump { conds, targets } => {
                let arms: Vec<String> = conds
                    .iter()
                    .zip(targets)
                    .map(|(c, t)| format!("{} ? {}", self.expr_str(c), block_name(*t)))
                    .collect();
                format!("mcjump({})", arms.join(", "))
            }
            StmKind::Ret(exp) => format!("return {}", self.expr_str(exp)),
            StmKind::Phi(phi) => {
                let args: Vec<String> = phi
                    .args
                    .iter()
                    .map(|(a, b)| format!("{}:{}", self.expr_str(a), block_name(*b)))
                    .collect();
                format!("{} = phi({})", self.expr_str(&phi.var), args.join(", "))
            }
        }
    }

    /// Multi-line listing of a scope's blocks
    pub fn dump_scope(&self, scope: ScopeId) -> String {
        let s = self.scope(scope);
        let mut out = String::new();
        let _ = writeln!(out, "scope {}", s.name);
        for block in &s.blocks {
            let names = |ids: &[crate::block::BlockId]| {
                ids.iter()
                    .map(|b| s.block(*b).name())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let _ = writeln!(
                out,
                "  {}: preds [{}] succs [{}]",
                block.name(),
                names(&block.preds),
                names(&block.succs)
            );
            for stm in &block.stms {
                let _ = writeln!(out, "    {}", self.stm_str(scope, stm));
            }
        }
        out
    }
}
