//! IR to AHDL translation
//!
//! The translator turns one scheduled IR statement at a time into AHDL and
//! pushes the result into a [`ScheduledItemQueue`] at the statement's start
//! cycle. Multi-cycle operations (calls, RAM accesses, port accesses) are
//! spread over consecutive cycles as `Seq` steps.
//!
//! Symbols become signals of the scope being translated, except ports, which
//! belong to the module that declares them.

use std::collections::BTreeSet;

use hlsc_ir::{
    BinOp, Ctx, Design, Expr, MemKind, Phi, PortClass, PortDirection, PortKind, Protocol, RelOp,
    ScopeId, SignalId, SignalTag, SourceLoc, Stm, StmKind, SymbolId, Type, UnOp,
};
use tracing::debug;

use crate::ahdl::{AhdlExpr, AhdlOp, AhdlStm, SeqFactor, Target, WaitKind};
use crate::error::{StgError, StgResult};
use crate::schedule::ScheduledNode;
use crate::stg::{ScheduledItemQueue, StgConfig};

const SELF_NAME: &str = "self";
const CTOR_NAME: &str = "__init__";

pub struct AhdlTranslator<'a> {
    design: &'a mut Design,
    scope: ScopeId,
    config: &'a StgConfig,
    queue: ScheduledItemQueue,
    sched_time: u32,
    /// Collects emitted items instead of queueing them (conditional statements)
    hooked: Option<Vec<(AhdlStm, u32)>>,
}

impl<'a> AhdlTranslator<'a> {
    pub fn new(design: &'a mut Design, scope: ScopeId, config: &'a StgConfig) -> Self {
        Self {
            design,
            scope,
            config,
            queue: ScheduledItemQueue::default(),
            sched_time: 0,
            hooked: None,
        }
    }

    pub fn into_queue(self) -> ScheduledItemQueue {
        self.queue
    }

    pub fn design(&mut self) -> &mut Design {
        self.design
    }

    /// Look up the node's statement and translate it at its begin cycle
    pub fn translate(&mut self, node: &ScheduledNode) -> StgResult<()> {
        let Some(begin) = node.begin else {
            return Ok(());
        };
        let stm = self.statement(node)?;
        self.sched_time = begin;
        self.visit_stm(&stm, node)
    }

    pub fn statement(&self, node: &ScheduledNode) -> StgResult<Stm> {
        let scope = self.design.scope(self.scope);
        scope
            .blocks
            .get(node.block.0 as usize)
            .and_then(|b| b.stm(node.stm))
            .cloned()
            .ok_or_else(|| StgError::UnknownStatement {
                scope: scope.name.clone(),
                block: scope
                    .blocks
                    .get(node.block.0 as usize)
                    .map(|b| b.name())
                    .unwrap_or_default(),
                stm: node.stm.0,
            })
    }

    pub fn loc(&self, lineno: u32) -> SourceLoc {
        SourceLoc::new(self.design.scope(self.scope).name.clone(), lineno)
    }

    fn emit(&mut self, item: AhdlStm, sched_time: u32) {
        match &mut self.hooked {
            Some(hooked) => hooked.push((item, sched_time)),
            None => {
                debug!("emit {:?} at {}", item, sched_time);
                self.queue.push(sched_time, item);
            }
        }
    }

    fn emit_seq(&mut self, factor: SeqFactor, step_n: u32) {
        for i in 0..step_n {
            self.emit(
                AhdlStm::Seq {
                    factor: factor.clone(),
                    step: i,
                    step_n,
                },
                self.sched_time + i,
            );
        }
    }

    fn visit_stm(&mut self, stm: &Stm, node: &ScheduledNode) -> StgResult<()> {
        let loc = self.loc(stm.lineno);
        match &stm.kind {
            StmKind::Move { dst, src } => self.visit_move(dst, src, node, &loc),
            StmKind::Expr(exp) => self.visit_expr_stm(exp, node, &loc),
            StmKind::CMove { cond, dst, src } => {
                let cond = self.required(cond, &loc)?;
                self.hooked = Some(Vec::new());
                let result = self.visit_move(dst, src, node, &loc);
                let hooked = self.hooked.take().unwrap_or_default();
                result?;
                self.emit_conditional(cond, hooked);
                Ok(())
            }
            StmKind::CExpr { cond, exp } => {
                let cond = self.required(cond, &loc)?;
                self.hooked = Some(Vec::new());
                let result = self.visit_expr_stm(exp, node, &loc);
                let hooked = self.hooked.take().unwrap_or_default();
                result?;
                self.emit_conditional(cond, hooked);
                Ok(())
            }
            StmKind::CJump {
                exp,
                true_target,
                false_target,
            } => {
                let cond = self.required(exp, &loc)?;
                let item = if cond.as_const() == Some(1) {
                    AhdlStm::Transition(Target::Block(*true_target))
                } else {
                    AhdlStm::TransitionIf {
                        conds: vec![cond, AhdlExpr::Const(1)],
                        blocks: vec![
                            vec![AhdlStm::Transition(Target::Block(*true_target))],
                            vec![AhdlStm::Transition(Target::Block(*false_target))],
                        ],
                    }
                };
                self.emit(item, self.sched_time);
                Ok(())
            }
            StmKind::MCJump { conds, targets } => {
                let n = conds.len().min(targets.len());
                for (c, target) in conds.iter().zip(targets).take(n.saturating_sub(1)) {
                    if c.as_const().and_then(|c| c.as_int()) == Some(1) {
                        self.emit(AhdlStm::Transition(Target::Block(*target)), self.sched_time);
                        return Ok(());
                    }
                }
                let mut ahdl_conds = Vec::with_capacity(n);
                let mut blocks = Vec::with_capacity(n);
                for (c, target) in conds.iter().zip(targets) {
                    ahdl_conds.push(self.required(c, &loc)?);
                    blocks.push(vec![AhdlStm::Transition(Target::Block(*target))]);
                }
                self.emit(
                    AhdlStm::TransitionIf {
                        conds: ahdl_conds,
                        blocks,
                    },
                    self.sched_time,
                );
                Ok(())
            }
            // Block-level jumps are turned into transitions by the state builder
            StmKind::Jump { .. } | StmKind::Ret(_) => Ok(()),
            StmKind::Phi(phi) => self.visit_phi(phi, &loc),
        }
    }

    fn emit_conditional(&mut self, cond: AhdlExpr, hooked: Vec<(AhdlStm, u32)>) {
        for (ahdl, sched_time) in hooked {
            self.emit(
                AhdlStm::If {
                    conds: vec![cond.clone()],
                    blocks: vec![vec![ahdl]],
                },
                sched_time,
            );
        }
    }

    fn visit_move(
        &mut self,
        dst: &Expr,
        src: &Expr,
        node: &ScheduledNode,
        loc: &SourceLoc,
    ) -> StgResult<()> {
        match src {
            Expr::Call { func_scope, .. } => {
                if self.is_port_method(*func_scope) {
                    return self.port_access(src, Some(dst), node, loc);
                }
                if self.is_module_method(*func_scope) {
                    return Ok(());
                }
                return self.call_sequence(src, Some(dst), node, loc);
            }
            Expr::New { .. } => return self.instantiate(src, dst, node, loc),
            Expr::Temp { sym, .. } => {
                let s = self.design.symbol(*sym);
                if s.is_param() {
                    let is_module_obj = match s.typ {
                        Type::Object(obj) => self.design.scope(obj).is_module(),
                        _ => false,
                    };
                    if s.name == SELF_NAME || is_module_obj || s.typ.is_port() {
                        return Ok(());
                    }
                }
            }
            Expr::MRef { mem, offset, .. } if self.mem_kind(mem) == Some(MemKind::Ram) => {
                let mem = self.required(mem, loc)?;
                let offset = self.required(offset, loc)?;
                let dst = self.required(dst, loc)?;
                let step_n = self.config.mem_load_latency;
                self.emit_seq(SeqFactor::Load { mem, dst, offset }, step_n);
                return Ok(());
            }
            Expr::MStore { mem, offset, exp } => return self.mem_store(mem, offset, exp, loc),
            Expr::Array {
                items,
                repeat,
                mutable,
            } => return self.array_init(dst, items, repeat, *mutable, loc),
            Expr::SysCall { name, args } if name != "len" => {
                return self.syscall(name, args, loc)
            }
            _ => {}
        }

        let Some(src) = self.visit_expr(src, loc)? else {
            return Ok(());
        };
        let dst = self.required(dst, loc)?;
        if let (AhdlExpr::Var { sig: s, .. }, AhdlExpr::Var { sig: d, .. }) = (&src, &dst) {
            if s == d {
                return Ok(());
            }
        }
        self.emit(AhdlStm::mv(dst, src), self.sched_time);
        Ok(())
    }

    fn visit_expr_stm(&mut self, exp: &Expr, node: &ScheduledNode, loc: &SourceLoc) -> StgResult<()> {
        match exp {
            Expr::Call { func_scope, .. } => {
                if self.is_port_method(*func_scope) {
                    self.port_access(exp, None, node, loc)
                } else if self.is_module_method(*func_scope) {
                    Ok(())
                } else {
                    self.call_sequence(exp, None, node, loc)
                }
            }
            Expr::SysCall { name, args } => self.syscall(name, args, loc),
            _ => Ok(()),
        }
    }

    fn is_port_method(&self, callee: ScopeId) -> bool {
        self.design.scope(callee).is_method()
            && self.design.parent_of(callee).is_some_and(|p| p.is_port())
    }

    fn is_module_method(&self, callee: ScopeId) -> bool {
        self.design.scope(callee).is_method()
            && self.design.parent_of(callee).is_some_and(|p| p.is_module())
    }

    fn mem_kind(&self, mem: &Expr) -> Option<MemKind> {
        mem.symbol()
            .and_then(|s| self.design.symbol(s).typ.mem_kind())
    }

    /// Translate an expression; `None` for the `None` constant
    pub fn visit_expr(&mut self, exp: &Expr, loc: &SourceLoc) -> StgResult<Option<AhdlExpr>> {
        let ahdl = match exp {
            Expr::Const(c) => match c {
                hlsc_ir::ConstValue::Int(v) => AhdlExpr::Const(*v),
                hlsc_ir::ConstValue::Bool(b) => AhdlExpr::Const(*b as i64),
                hlsc_ir::ConstValue::Str(s) => AhdlExpr::Symbol(format!("\"{}\"", s)),
                hlsc_ir::ConstValue::None => return Ok(None),
            },
            Expr::Temp { sym, ctx } => {
                let sig = self.sym_2_sig(*sym, *ctx);
                if self.design.symbol(*sym).typ.is_list() {
                    AhdlExpr::MemVar { sig, ctx: *ctx }
                } else {
                    AhdlExpr::Var { sig, ctx: *ctx }
                }
            }
            Expr::Attr {
                attr,
                attr_scope,
                ctx,
                ..
            } => self.visit_attr(exp, *attr, *attr_scope, *ctx, loc)?,
            Expr::UnOp { op, exp } => {
                let op = match op {
                    UnOp::USub => AhdlOp::USub,
                    UnOp::UAdd => AhdlOp::UAdd,
                    UnOp::Not => AhdlOp::Not,
                    UnOp::Invert => AhdlOp::Invert,
                };
                AhdlExpr::unary(op, self.required(exp, loc)?)
            }
            Expr::BinOp { op, left, right } => {
                let op = match op {
                    BinOp::Add => AhdlOp::Add,
                    BinOp::Sub => AhdlOp::Sub,
                    BinOp::Mult => AhdlOp::Mult,
                    BinOp::FloorDiv => AhdlOp::FloorDiv,
                    BinOp::Mod => AhdlOp::Mod,
                    BinOp::LShift => AhdlOp::LShift,
                    BinOp::RShift => AhdlOp::RShift,
                    BinOp::BitAnd => AhdlOp::BitAnd,
                    BinOp::BitOr => AhdlOp::BitOr,
                    BinOp::BitXor => AhdlOp::BitXor,
                };
                AhdlExpr::binary(op, self.required(left, loc)?, self.required(right, loc)?)
            }
            Expr::RelOp { op, left, right } => {
                let op = match op {
                    RelOp::And => AhdlOp::And,
                    RelOp::Or => AhdlOp::Or,
                    RelOp::Eq | RelOp::Is => AhdlOp::Eq,
                    RelOp::NotEq | RelOp::IsNot => AhdlOp::NotEq,
                    RelOp::Lt => AhdlOp::Lt,
                    RelOp::LtE => AhdlOp::LtE,
                    RelOp::Gt => AhdlOp::Gt,
                    RelOp::GtE => AhdlOp::GtE,
                };
                AhdlExpr::binary(op, self.required(left, loc)?, self.required(right, loc)?)
            }
            Expr::CondOp { cond, left, right } => AhdlExpr::if_exp(
                self.required(cond, loc)?,
                self.required(left, loc)?,
                self.required(right, loc)?,
            ),
            Expr::MRef { mem, offset, .. } => {
                let kind = self.mem_kind(mem);
                let memvar = self.required(mem, loc)?;
                let offset = self.required(offset, loc)?;
                match kind {
                    Some(MemKind::Rom) => {
                        let name = memvar
                            .sig()
                            .map(|s| self.design.sig(s).name.clone())
                            .unwrap_or_default();
                        AhdlExpr::FunCall {
                            name,
                            args: vec![offset],
                        }
                    }
                    Some(MemKind::Register) => AhdlExpr::Subscript {
                        mem: Box::new(memvar),
                        offset: Box::new(offset),
                    },
                    _ => {
                        return Err(StgError::unsupported(
                            "memory read must be the source of an assignment",
                            loc.clone(),
                        ))
                    }
                }
            }
            Expr::SysCall { name, args } if name == "len" => self.builtin_len(args, loc)?,
            Expr::Call { .. }
            | Expr::SysCall { .. }
            | Expr::New { .. }
            | Expr::MStore { .. }
            | Expr::Array { .. } => {
                return Err(StgError::unsupported(
                    "call, store or array literal nested in an expression",
                    loc.clone(),
                ))
            }
        };
        Ok(Some(ahdl))
    }

    fn required(&mut self, exp: &Expr, loc: &SourceLoc) -> StgResult<AhdlExpr> {
        self.visit_expr(exp, loc)?
            .ok_or_else(|| StgError::unsupported("a value is required here", loc.clone()))
    }

    fn signal_width(&self, sym: SymbolId) -> u32 {
        let s = self.design.symbol(sym);
        match s.typ.width() {
            Some(w) => w,
            None if s.is_condition() => 1,
            None => 0,
        }
    }

    /// Signal standing for `sym` in the current scope
    pub fn sym_2_sig(&mut self, sym: SymbolId, ctx: Ctx) -> SignalId {
        let s = self.design.symbol(sym).clone();
        let mut tags = BTreeSet::new();
        match &s.typ {
            Type::List { .. } => {
                tags.insert(SignalTag::MemIf);
            }
            Type::Int { signed, .. } => {
                if *signed {
                    tags.insert(SignalTag::Int);
                }
                if ctx == Ctx::Store {
                    tags.insert(SignalTag::Reg);
                }
            }
            Type::Bool => {
                if ctx == Ctx::Store {
                    tags.insert(SignalTag::Reg);
                }
            }
            Type::Port(pt) => match pt.direction {
                PortDirection::Input => {
                    tags.insert(SignalTag::Input);
                }
                PortDirection::Output => {
                    tags.insert(SignalTag::Output);
                }
                PortDirection::Inout | PortDirection::Unresolved => {}
            },
            _ => {}
        }
        if s.is_param() {
            tags.insert(SignalTag::Input);
        } else if s.is_return() {
            tags.insert(SignalTag::Output);
        } else if s.is_condition() {
            tags.insert(SignalTag::Condition);
        }
        if s.is_alias() {
            tags.remove(&SignalTag::Reg);
            tags.insert(SignalTag::Net);
        }
        if s.is_induction() {
            tags.insert(SignalTag::Induction);
        }

        // every version of a memory shares one interface
        let base = if s.typ.is_list() {
            self.design.symbol(s.root()).hdl_name()
        } else {
            s.hdl_name()
        };
        let scope = self.design.scope(self.scope);
        let name = if scope.is_worker() || scope.is_method() || tags.contains(&SignalTag::Input) {
            format!("{}_{}", scope.orig_name, base)
        } else if tags.contains(&SignalTag::Output) {
            format!("{}_out_0", scope.orig_name)
        } else {
            base
        };
        let width = self.signal_width(sym);
        let tags: Vec<SignalTag> = tags.into_iter().collect();
        self.design.gen_sig(self.scope, &name, width, &tags, Some(sym))
    }

    fn visit_attr(
        &mut self,
        exp: &Expr,
        attr: SymbolId,
        attr_scope: ScopeId,
        ctx: Ctx,
        loc: &SourceLoc,
    ) -> StgResult<AhdlExpr> {
        let attr_sym = self.design.symbol(attr).clone();
        let is_seq = attr_sym.typ.is_list();
        let tags = if is_seq {
            [SignalTag::Field, SignalTag::MemIf]
        } else {
            [SignalTag::Field, SignalTag::Int]
        };
        let width = self.signal_width(attr);
        let scope = self.design.scope(self.scope);
        let in_module = self
            .design
            .parent_of(self.scope)
            .is_some_and(|p| p.is_module());
        let name = if in_module {
            attr_sym.hdl_name()
        } else if scope.is_method() && scope.parent == Some(attr_scope) {
            // field of our own object
            format!(
                "{}_field_{}",
                self.design.scope(attr_scope).orig_name,
                attr_sym.hdl_name()
            )
        } else {
            let io = if ctx == Ctx::Load { "" } else { "_in" };
            let instance = self.instance_name(exp, loc)?;
            format!("{}_field_{}{}", instance, attr_sym.hdl_name(), io)
        };
        let sig = self
            .design
            .gen_sig(self.scope, &name, width, &tags, Some(attr));
        Ok(if is_seq {
            AhdlExpr::MemVar { sig, ctx }
        } else {
            AhdlExpr::Var { sig, ctx }
        })
    }

    /// Name of the object an attribute chain reaches, e.g. `self.sub.x` -> `{scope}_sub`
    fn instance_name(&self, exp: &Expr, loc: &SourceLoc) -> StgResult<String> {
        let Expr::Attr { exp: inner, .. } = exp else {
            return Err(StgError::unsupported(
                "instance access needs an attribute",
                loc.clone(),
            ));
        };
        match inner.as_ref() {
            Expr::Temp { sym, .. } => {
                let s = self.design.symbol(*sym);
                let scope = self.design.scope(self.scope);
                Ok(if s.name == SELF_NAME {
                    if scope.is_ctor() {
                        self.design
                            .parent_of(self.scope)
                            .map(|p| p.orig_name.clone())
                            .unwrap_or_else(|| scope.orig_name.clone())
                    } else {
                        scope.orig_name.clone()
                    }
                } else if let Type::Class(class) = s.typ {
                    self.design.scope(class).orig_name.clone()
                } else {
                    s.hdl_name()
                })
            }
            Expr::Attr { attr, .. } => Ok(format!(
                "{}_{}",
                self.instance_name(inner, loc)?,
                self.design.symbol(*attr).hdl_name()
            )),
            _ => Err(StgError::unsupported(
                "instance access needs an attribute",
                loc.clone(),
            )),
        }
    }

    fn visit_args(&mut self, args: &[(String, Expr)], loc: &SourceLoc) -> StgResult<Vec<AhdlExpr>> {
        args.iter().map(|(_, a)| self.required(a, loc)).collect()
    }

    fn call_sequence(
        &mut self,
        call: &Expr,
        dst: Option<&Expr>,
        node: &ScheduledNode,
        loc: &SourceLoc,
    ) -> StgResult<()> {
        let Expr::Call {
            func,
            func_scope,
            args,
        } = call
        else {
            return Ok(());
        };
        let callee = self.design.scope(*func_scope).clone();
        let instance_name = if callee.is_method() {
            self.instance_name(func, loc)?
        } else {
            format!("{}_{}", callee.name, node.instance_num)
        };
        let prefix = if callee.is_class() {
            let dst_name = dst
                .and_then(|d| d.symbol())
                .map(|s| self.design.symbol(s).name.clone())
                .unwrap_or_default();
            format!("{}_{}", dst_name, CTOR_NAME)
        } else if callee.is_method() {
            let method = match func.as_ref() {
                Expr::Attr { attr, .. } => self.design.symbol(*attr).name.clone(),
                _ => callee.orig_name.clone(),
            };
            format!("{}_{}", instance_name, method)
        } else {
            format!("{}_{}", callee.orig_name, node.instance_num)
        };

        let args = self.visit_args(args, loc)?;
        if !callee.is_method() {
            self.design
                .scope_mut(self.scope)
                .add_callee_instance(*func_scope, instance_name.clone());
        }
        if dst.is_some() && callee.is_module() {
            return Ok(());
        }

        let mut returns: Vec<AhdlExpr> = args
            .iter()
            .filter(|a| match a {
                AhdlExpr::MemVar { sig, .. } => self
                    .design
                    .sig(*sig)
                    .sym
                    .and_then(|s| self.design.symbol(s).typ.mem_kind())
                    == Some(MemKind::Register),
                _ => false,
            })
            .cloned()
            .collect();
        if let Some(dst) = dst {
            returns.push(self.required(dst, loc)?);
        }
        let factor = SeqFactor::ModuleCall {
            scope: *func_scope,
            args,
            instance_name,
            prefix,
            returns,
        };
        self.emit_seq(factor, node.latency.max(1));
        Ok(())
    }

    fn instantiate(
        &mut self,
        new: &Expr,
        dst: &Expr,
        node: &ScheduledNode,
        loc: &SourceLoc,
    ) -> StgResult<()> {
        let Expr::New { func_scope, args } = new else {
            return Ok(());
        };
        let callee = self.design.scope(*func_scope).clone();
        if callee.is_port() {
            self.port_sig(&dst.qualified_symbols(), loc)?;
            return Ok(());
        }
        let instance_name = match dst.symbol() {
            Some(sym) => self.design.symbol(sym).hdl_name(),
            None => {
                return Err(StgError::unsupported(
                    "instantiation result must be stored in a variable",
                    loc.clone(),
                ))
            }
        };
        let prefix = format!("{}_{}", instance_name, CTOR_NAME);
        let args = self.visit_args(args, loc)?;
        self.design
            .scope_mut(self.scope)
            .add_callee_instance(*func_scope, instance_name.clone());
        if callee.is_module() {
            return Ok(());
        }
        let factor = SeqFactor::ModuleCall {
            scope: *func_scope,
            args,
            instance_name,
            prefix,
            returns: Vec::new(),
        };
        self.emit_seq(factor, node.latency.max(1));
        Ok(())
    }

    fn mem_store(&mut self, mem: &Expr, offset: &Expr, exp: &Expr, loc: &SourceLoc) -> StgResult<()> {
        let kind = self.mem_kind(mem);
        let offset = self.required(offset, loc)?;
        let src = self.required(exp, loc)?;
        let memvar = match self.required(mem, loc)? {
            AhdlExpr::MemVar { sig, .. } => AhdlExpr::MemVar {
                sig,
                ctx: Ctx::Store,
            },
            other => other,
        };
        match kind {
            Some(MemKind::Register) => {
                let dst = AhdlExpr::Subscript {
                    mem: Box::new(memvar),
                    offset: Box::new(offset),
                };
                self.emit(AhdlStm::mv(dst, src), self.sched_time);
            }
            Some(MemKind::Ram) => {
                let step_n = self.config.mem_store_latency;
                self.emit_seq(
                    SeqFactor::Store {
                        mem: memvar,
                        src,
                        offset,
                    },
                    step_n,
                );
            }
            _ => {
                return Err(StgError::unsupported(
                    "write to a read-only memory",
                    loc.clone(),
                ))
            }
        }
        Ok(())
    }

    fn array_init(
        &mut self,
        dst: &Expr,
        items: &[Expr],
        repeat: &Expr,
        mutable: bool,
        loc: &SourceLoc,
    ) -> StgResult<()> {
        let Some(times) = repeat.as_const().and_then(|c| c.as_int()) else {
            return Err(StgError::unsupported(
                "multiplier for the sequence must be a constant",
                loc.clone(),
            ));
        };
        let items: Vec<&Expr> = (0..times.max(0))
            .flat_map(|_| items.iter())
            .collect();
        let Some(dst_sym) = dst.symbol() else {
            return Ok(());
        };
        let typ = self.design.symbol(dst_sym).typ.clone();
        if let Some(length) = typ.list_length() {
            if length as usize != items.len() {
                return Err(StgError::unsupported("memory length mismatch", loc.clone()));
            }
        }
        let kind = typ.mem_kind();
        if kind == Some(MemKind::Rom) {
            return Ok(());
        }
        let memvar = match self.required(dst, loc)? {
            AhdlExpr::MemVar { sig, .. } => AhdlExpr::MemVar {
                sig,
                ctx: Ctx::Store,
            },
            other => other,
        };
        let base_time = self.sched_time;
        let mut offset_time = 0;
        for (i, item) in items.into_iter().enumerate() {
            let Some(value) = self.visit_expr(item, loc)? else {
                continue;
            };
            let idx = AhdlExpr::Const(i as i64);
            if mutable && kind == Some(MemKind::Ram) {
                self.sched_time = base_time + offset_time;
                self.emit_seq(
                    SeqFactor::Store {
                        mem: memvar.clone(),
                        src: value,
                        offset: idx,
                    },
                    self.config.mem_store_latency,
                );
                offset_time += 1;
            } else {
                let dst = AhdlExpr::Subscript {
                    mem: Box::new(memvar.clone()),
                    offset: Box::new(idx),
                };
                self.emit(AhdlStm::mv(dst, value), base_time);
            }
        }
        self.sched_time = base_time;
        Ok(())
    }

    fn builtin_len(&mut self, args: &[(String, Expr)], loc: &SourceLoc) -> StgResult<AhdlExpr> {
        let Some(mem) = args.first().and_then(|(_, a)| a.symbol()) else {
            return Err(StgError::unsupported("len() needs a sequence", loc.clone()));
        };
        let s = self.design.symbol(mem).clone();
        if let Some(length) = s.typ.list_length() {
            return Ok(AhdlExpr::Const(length as i64));
        }
        let name = format!("{}_len", self.design.symbol(s.root()).hdl_name());
        let sig = self
            .design
            .gen_sig(self.scope, &name, 0, &[SignalTag::MemIf], Some(mem));
        Ok(AhdlExpr::load(sig))
    }

    fn syscall(&mut self, name: &str, args: &[(String, Expr)], loc: &SourceLoc) -> StgResult<()> {
        let proc_name = match name {
            "print" => "!hdl_print",
            "assert" => "!hdl_assert",
            "display" => "!hdl_verilog_display",
            "write" => "!hdl_verilog_write",
            "clksleep" => {
                let cycles = args
                    .first()
                    .and_then(|(_, a)| a.as_const())
                    .and_then(|c| c.as_int())
                    .ok_or_else(|| {
                        StgError::unsupported("clksleep() needs a constant cycle count", loc.clone())
                    })?;
                for i in 0..cycles.max(0) as u32 {
                    self.emit(AhdlStm::Nop("wait a cycle".to_string()), self.sched_time + i);
                }
                return Ok(());
            }
            "wait_rising" | "wait_falling" => {
                let ports = self.port_args(args, loc)?;
                let (old, new) = if name == "wait_rising" { (0, 1) } else { (1, 0) };
                self.emit_wait(WaitKind::Edge {
                    old: AhdlExpr::Const(old),
                    new: AhdlExpr::Const(new),
                    ports,
                });
                return Ok(());
            }
            "wait_edge" => {
                if args.len() < 2 {
                    return Err(StgError::unsupported(
                        "wait_edge() needs old and new values",
                        loc.clone(),
                    ));
                }
                let old = self.required(&args[0].1, loc)?;
                let new = self.required(&args[1].1, loc)?;
                let ports = self.port_args(&args[2..], loc)?;
                self.emit_wait(WaitKind::Edge { old, new, ports });
                return Ok(());
            }
            "wait_value" => {
                let Some((_, value)) = args.first() else {
                    return Err(StgError::unsupported("wait_value() needs a value", loc.clone()));
                };
                let value = self.required(value, loc)?;
                let expects = self
                    .port_args(&args[1..], loc)?
                    .into_iter()
                    .map(|p| (value.clone(), p))
                    .collect();
                self.emit_wait(WaitKind::Value { expects });
                return Ok(());
            }
            _ => {
                debug!("no hardware for builtin {}", name);
                return Ok(());
            }
        };
        let args = self.visit_args(args, loc)?;
        self.emit(
            AhdlStm::ProcCall {
                name: proc_name.to_string(),
                args,
            },
            self.sched_time,
        );
        Ok(())
    }

    fn emit_wait(&mut self, kind: WaitKind) {
        self.emit(
            AhdlStm::MetaWait {
                kind,
                transition: None,
            },
            self.sched_time,
        );
    }

    fn port_args(&mut self, args: &[(String, Expr)], loc: &SourceLoc) -> StgResult<Vec<AhdlExpr>> {
        args.iter()
            .map(|(_, a)| {
                let qsym = a.qualified_symbols();
                if qsym.is_empty() {
                    return Err(StgError::unsupported("a port is required here", loc.clone()));
                }
                Ok(AhdlExpr::load(self.port_sig(&qsym, loc)?))
            })
            .collect()
    }

    /// Signal of the port reached through `qsym`, created in the owning module
    pub fn port_sig(&mut self, qsym: &[SymbolId], loc: &SourceLoc) -> StgResult<SignalId> {
        let Some(&port_sym) = qsym.last() else {
            return Err(StgError::unsupported("a port is required here", loc.clone()));
        };
        let port = self.design.symbol(port_sym).clone();
        let Some(pt) = port.typ.as_port().cloned() else {
            return Err(StgError::unsupported(
                format!("'{}' is not a port", port.name),
                loc.clone(),
            ));
        };
        let root_sym = pt.root_sym.unwrap_or(port_sym);
        let mut prefixes: Vec<SymbolId> = qsym[..qsym.len() - 1].to_vec();
        prefixes.push(root_sym);
        if prefixes.len() > 1 && self.design.symbol(prefixes[0]).name == SELF_NAME {
            prefixes.remove(0);
        }
        let port_name = prefixes
            .iter()
            .map(|s| self.design.symbol(*s).hdl_name())
            .collect::<Vec<_>>()
            .join("_");

        if let Some(sig) = self.design.signal(port.scope, &port_name) {
            return Ok(sig);
        }

        let width = pt.dtype.width().unwrap_or(0);
        let mut tags = BTreeSet::new();
        match pt.class {
            PortClass::Single => {
                tags.insert(SignalTag::SinglePort);
                if pt.dtype.is_signed() {
                    tags.insert(SignalTag::Int);
                }
            }
            PortClass::Queue => {
                tags.insert(SignalTag::FifoPort);
                tags.insert(SignalTag::SeqPort);
            }
        }
        let direction_tag = match pt.direction {
            PortDirection::Input => Some(SignalTag::Input),
            PortDirection::Output => Some(SignalTag::Output),
            PortDirection::Inout => None,
            PortDirection::Unresolved => {
                return Err(StgError::unsupported(
                    format!("direction of port '{}' is unresolved", port.name),
                    loc.clone(),
                ))
            }
        };
        let module = self.design.enclosing_module(self.scope);
        let declared_here = self.design.scope(port.scope).is_module() && module == Some(port.scope);
        let is_ext = if pt.kind == PortKind::Internal {
            if !tags.contains(&SignalTag::SeqPort) {
                tags.insert(SignalTag::Reg);
            }
            false
        } else if declared_here || self.design.scope(self.scope).is_worker() {
            tags.extend(direction_tag);
            false
        } else {
            tags.insert(SignalTag::ExtPort);
            match pt.direction {
                PortDirection::Input => tags.insert(SignalTag::Reg),
                PortDirection::Output => tags.insert(SignalTag::Net),
                _ => {
                    return Err(StgError::unsupported(
                        format!("external port '{}' must have a direction", port.name),
                        loc.clone(),
                    ))
                }
            };
            true
        };
        match pt.protocol {
            Protocol::None => {}
            Protocol::Valid => {
                tags.insert(SignalTag::ValidProtocol);
            }
            Protocol::ReadyValid => {
                tags.insert(SignalTag::ReadyValidProtocol);
            }
        }
        if pt.init.is_some() {
            tags.insert(SignalTag::Initializable);
        }

        let owner = if is_ext {
            self.scope
        } else {
            let root_scope = self.design.symbol(root_sym).scope;
            if self.design.scope(root_scope).is_module() {
                root_scope
            } else if self.design.scope(root_scope).is_ctor()
                && self.design.parent_of(root_scope).is_some_and(|p| p.is_module())
            {
                self.design.scope(root_scope).parent.unwrap_or(root_scope)
            } else {
                return Err(StgError::unsupported(
                    format!("port '{}' is not owned by a module", port.name),
                    loc.clone(),
                ));
            }
        };
        let tags: Vec<SignalTag> = tags.into_iter().collect();
        let sig = self
            .design
            .gen_sig(owner, &port_name, width, &tags, Some(root_sym));
        let s = self.design.sig_mut(sig);
        s.init_value = pt.init;
        s.maxsize = pt.maxsize;
        debug!("port signal {} in {:?}", port_name, owner);
        Ok(sig)
    }

    fn port_access(
        &mut self,
        call: &Expr,
        target: Option<&Expr>,
        node: &ScheduledNode,
        loc: &SourceLoc,
    ) -> StgResult<()> {
        let Expr::Call {
            func,
            func_scope,
            args,
        } = call
        else {
            return Ok(());
        };
        let mut qsym = func.qualified_symbols();
        qsym.pop();
        let port_sig = self.port_sig(&qsym, loc)?;
        let method = self.design.scope(*func_scope).orig_name.clone();
        match method.as_str() {
            "wr" => {
                let Some((_, value)) = args.first() else {
                    return Err(StgError::unsupported("wr() needs a value", loc.clone()));
                };
                let src = self.required(value, loc)?;
                let is_self = self.design.sig(port_sig).is_output();
                let factor = SeqFactor::IoWrite {
                    port: AhdlExpr::store(port_sig),
                    src,
                    is_self,
                };
                self.emit_seq(factor, node.latency.max(1));
            }
            "rd" => {
                let mut step_n = node.latency.max(1);
                let dst = match target {
                    Some(t) => Some(self.required(t, loc)?),
                    None => {
                        step_n -= 1;
                        None
                    }
                };
                let is_self = self.design.sig(port_sig).is_input();
                let factor = SeqFactor::IoRead {
                    port: AhdlExpr::load(port_sig),
                    dst,
                    is_self,
                };
                self.emit_seq(factor, step_n);
            }
            other => {
                return Err(StgError::unsupported(
                    format!("unknown port method '{}'", other),
                    loc.clone(),
                ))
            }
        }
        Ok(())
    }

    fn visit_phi(&mut self, phi: &Phi, loc: &SourceLoc) -> StgResult<()> {
        let dst_sym = phi.dst();
        if phi.args.len() < 2 || phi.ps.len() != phi.args.len() {
            return Err(StgError::InvalidPhi {
                symbol: dst_sym
                    .map(|s| self.design.symbol(s).name.clone())
                    .unwrap_or_default(),
                loc: loc.clone(),
            });
        }
        let typ = dst_sym.map(|s| self.design.symbol(s).typ.clone());
        match typ.as_ref().and_then(|t| t.mem_kind()) {
            None => self.scalar_mux(phi, loc),
            Some(MemKind::Register) => self.reg_array_mux(phi, loc),
            Some(_) => Err(StgError::unsupported(
                "phi over a RAM or ROM",
                loc.clone(),
            )),
        }
    }

    fn scalar_mux(&mut self, phi: &Phi, loc: &SourceLoc) -> StgResult<()> {
        let dst = self.required(&phi.var, loc)?;
        let n = phi.args.len();
        let last_cond = self.required(&phi.ps[n - 1], loc)?;
        let last = self.required(&phi.args[n - 1].0, loc)?;
        let mut rexp = if last_cond.as_const().is_some_and(|c| c != 0) {
            last
        } else {
            AhdlExpr::if_exp(last_cond, last, AhdlExpr::high_z())
        };
        for i in (0..n - 1).rev() {
            let cond = self.required(&phi.ps[i], loc)?;
            let arg = self.required(&phi.args[i].0, loc)?;
            rexp = AhdlExpr::if_exp(cond, arg, rexp);
        }
        self.emit(AhdlStm::mv(dst, rexp), self.sched_time);
        Ok(())
    }

    fn reg_array_mux(&mut self, phi: &Phi, loc: &SourceLoc) -> StgResult<()> {
        let Some(dst_sym) = phi.dst() else {
            return Ok(());
        };
        let Some(length) = self.design.symbol(dst_sym).typ.list_length() else {
            return Err(StgError::unsupported(
                "phi over a register array of unknown length",
                loc.clone(),
            ));
        };
        let dst_var = match self.required(&phi.var, loc)? {
            AhdlExpr::MemVar { sig, .. } => AhdlExpr::MemVar {
                sig,
                ctx: Ctx::Store,
            },
            other => other,
        };
        let n = phi.args.len();
        let mut args = Vec::with_capacity(n);
        for (i, (arg, _)) in phi.args.iter().enumerate() {
            let var = self.required(arg, loc)?;
            let arg_len = arg
                .symbol()
                .and_then(|s| self.design.symbol(s).typ.list_length())
                .unwrap_or(length);
            let cond = self.required(&phi.ps[i], loc)?;
            args.push((var, arg_len, cond));
        }
        let subscript = |var: &AhdlExpr, i: u32| AhdlExpr::Subscript {
            mem: Box::new(var.clone()),
            offset: Box::new(AhdlExpr::Const(i as i64)),
        };

        for i in 0..length {
            let (last_var, last_len, last_cond) = &args[n - 1];
            let mut rexp = if i >= *last_len {
                AhdlExpr::high_z()
            } else if last_cond.as_const().is_some_and(|c| c != 0) {
                subscript(last_var, i)
            } else {
                AhdlExpr::if_exp(last_cond.clone(), subscript(last_var, i), AhdlExpr::high_z())
            };
            for (var, len, cond) in args[..n - 1].iter().rev() {
                if i < *len {
                    rexp = AhdlExpr::if_exp(cond.clone(), subscript(var, i), rexp);
                }
            }
            self.emit(AhdlStm::mv(subscript(&dst_var, i), rexp), self.sched_time);
        }

        let len_name = |this: &Self, var: &AhdlExpr| {
            let name = var
                .sig()
                .map(|s| this.design.sig(s).name.clone())
                .unwrap_or_default();
            AhdlExpr::Symbol(format!("{}_len", name))
        };
        let (last_var, _, last_cond) = &args[n - 1];
        let mut rexp = if last_cond.as_const().is_some_and(|c| c != 0) {
            len_name(self, last_var)
        } else {
            AhdlExpr::if_exp(last_cond.clone(), len_name(self, last_var), AhdlExpr::high_z())
        };
        for (var, _, cond) in args[..n - 1].iter().rev() {
            rexp = AhdlExpr::if_exp(cond.clone(), len_name(self, var), rexp);
        }
        let dst_len = len_name(self, &dst_var);
        self.emit(AhdlStm::mv(dst_len, rexp), self.sched_time);
        Ok(())
    }
}
