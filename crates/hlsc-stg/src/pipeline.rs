//! Pipeline control synthesis
//!
//! A pipelined region becomes one [`PipelineState`] whose stages are the
//! cycles of the region's schedule. Every stage carries the handshake that
//! lets tokens advance or stall:
//!
//! ```text
//! ready[i] = ready[i+1]                      (1 for the last stage)
//!          = ready[i+1] & enable[i]          (stage with an external enable)
//!          = ~hold[i+1] & enable[i]          (source stage)
//! hold[i]  = hold[i] ? ~ready[i] : ~ready[i] & valid[i-1]
//! valid[i] = hold[i] ? ready[i]  :  ready[i] & valid[i-1]
//! ```
//!
//! State-changing operations of a stage run under a `PipelineGuard` so they
//! only take effect when a valid token is in the stage. Values read more than
//! one stage after their definition are carried forward through register
//! slices.

use std::collections::BTreeMap;

use hlsc_ir::{Ctx, Design, Expr, ScopeId, SignalId, SignalTag, SourceLoc, StmKind, UseDefTable};
use tracing::debug;

use crate::ahdl::{AhdlExpr, AhdlOp, AhdlStm, SeqFactor, StateRef, Target};
use crate::ahdl_usedef::AhdlUseDef;
use crate::error::{StgError, StgResult};
use crate::schedule::{LoopInfo, Region, SchedulingMode};
use crate::state::{CtrlKind, PipelineState};
use crate::stg::{sorted_nodes, ScheduledItemQueue, StgConfig};
use crate::translator::AhdlTranslator;

pub struct PipelineBuilder<'a> {
    design: &'a mut Design,
    scope: ScopeId,
    config: &'a StgConfig,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(design: &'a mut Design, scope: ScopeId, config: &'a StgConfig) -> Self {
        Self {
            design,
            scope,
            config,
        }
    }

    /// Build the pipeline state of `region`; `self_ref` is where it will live
    pub fn build(
        mut self,
        stg_name: &str,
        region_idx: usize,
        region: &Region,
        self_ref: StateRef,
    ) -> StgResult<PipelineState> {
        let finite = region.mode == SchedulingMode::PipelinedLoop;
        let info = if finite {
            Some(region.loop_info.as_ref().ok_or_else(|| StgError::MissingLoopInfo {
                scope: self.design.scope(self.scope).name.clone(),
                region: region_idx,
            })?)
        } else {
            None
        };
        let head = info.map(|i| i.head).or_else(|| region.blocks.first().copied());
        let name = match head.and_then(|h| self.design.scope(self.scope).blocks.get(h.0 as usize)) {
            Some(block) => format!("{}_{}_P", stg_name, block.name()),
            None => format!("{}_P", stg_name),
        };
        debug!("pipeline {} ({} nodes)", name, region.nodes.len());

        let mut pstate = PipelineState::new(name, self.scope, finite);
        let queue = self.schedule_items(region, info)?;
        self.build_stages(&mut pstate, queue)?;
        if let Some(info) = info {
            self.post_build_loop(&mut pstate, info)?;
        }

        if let Some(stage) = pstate.stages.last_mut() {
            if !stage.codes.last().is_some_and(|c| c.is_transition()) {
                stage
                    .codes
                    .push(AhdlStm::Transition(Target::State(self_ref)));
            }
        }
        Ok(pstate)
    }

    fn loc(&self, lineno: u32) -> SourceLoc {
        SourceLoc::new(self.design.scope(self.scope).name.clone(), lineno)
    }

    fn schedule_items(
        &mut self,
        region: &Region,
        info: Option<&LoopInfo>,
    ) -> StgResult<ScheduledItemQueue> {
        let scope_name = self.design.scope(self.scope).name.clone();
        let mut translator = AhdlTranslator::new(&mut *self.design, self.scope, self.config);
        for node in sorted_nodes(region.nodes.iter()) {
            let stm = translator.statement(node)?;
            let loc = SourceLoc::new(scope_name.clone(), stm.lineno);
            match &stm.kind {
                StmKind::CJump { exp, .. } => {
                    let is_loop_cond = info.is_some_and(|i| exp.symbol() == Some(i.cond));
                    let always = exp.as_const().and_then(|c| c.as_int()) == Some(1);
                    if is_loop_cond || always {
                        continue;
                    }
                    return Err(StgError::unsupported(
                        "conditional jump inside a pipelined region",
                        loc,
                    ));
                }
                StmKind::MCJump { .. } => {
                    return Err(StgError::unsupported(
                        "multi-way jump inside a pipelined region",
                        loc,
                    ))
                }
                StmKind::Expr(Expr::SysCall { name, .. }) if name.starts_with("wait_") => {
                    return Err(StgError::unsupported("wait inside a pipelined region", loc))
                }
                _ => {}
            }
            translator.translate(node)?;
        }
        Ok(translator.into_queue())
    }

    fn needs_guard(&self, stm: &AhdlStm) -> bool {
        match stm {
            AhdlStm::ProcCall { .. } | AhdlStm::If { .. } => true,
            AhdlStm::Move { dst, .. } => match dst {
                AhdlExpr::Var { sig, .. } => self.design.sig(*sig).is_reg(),
                AhdlExpr::Subscript { .. } => true,
                _ => false,
            },
            _ => false,
        }
    }

    fn ctrl(&mut self, pstate: &mut PipelineState, kind: CtrlKind, idx: usize) -> SignalId {
        pstate.ctrl_signal(self.design, kind, idx)
    }

    fn build_stages(&mut self, pstate: &mut PipelineState, mut queue: ScheduledItemQueue) -> StgResult<()> {
        let last = queue.last_time().unwrap_or(0);
        for step in 0..=last {
            let codes = queue.take(step);
            self.make_stage(pstate, step as usize, codes);
        }
        for i in 0..pstate.stages.len() {
            self.add_control_chain(pstate, i);
        }
        self.insert_register_slices(pstate)
    }

    fn make_stage(&mut self, pstate: &mut PipelineState, step: usize, codes: Vec<AhdlStm>) {
        let mut has_enable = pstate.is_finite_loop && step == 0;
        let mut is_source = false;
        let mut guarded = Vec::new();
        let mut rest = Vec::new();
        for code in codes {
            if let AhdlStm::Seq {
                factor, step: 0, ..
            } = &code
            {
                match factor {
                    SeqFactor::IoRead { .. } => has_enable = true,
                    SeqFactor::IoWrite { .. } => {
                        has_enable = true;
                        is_source = true;
                    }
                    _ => {}
                }
            }
            if self.needs_guard(&code) {
                guarded.push(code);
            } else {
                rest.push(code);
            }
        }

        let cond = if step > 0 {
            AhdlExpr::load(self.ctrl(pstate, CtrlKind::Valid, step - 1))
        } else if has_enable {
            AhdlExpr::load(self.ctrl(pstate, CtrlKind::Ready, 0))
        } else {
            AhdlExpr::Const(1)
        };
        rest.insert(
            0,
            AhdlStm::PipelineGuard {
                cond,
                codes: guarded,
            },
        );
        let stage = pstate.new_stage(step, rest);
        stage.has_enable = has_enable;
        stage.is_source = is_source;
        stage.has_hold = step > 0;
    }

    fn add_control_chain(&mut self, pstate: &mut PipelineState, i: usize) {
        let n = pstate.stages.len();
        let is_last = i + 1 == n;
        let (has_enable, has_hold, is_source) = {
            let s = &pstate.stages[i];
            (s.has_enable, s.has_hold, s.is_source)
        };
        let mut codes = Vec::new();

        let r_now = self.ctrl(pstate, CtrlKind::Ready, i);
        let r_next = if is_last {
            AhdlExpr::Const(1)
        } else {
            AhdlExpr::load(self.ctrl(pstate, CtrlKind::Ready, i + 1))
        };
        let ready_rhs = if has_enable {
            let en = AhdlExpr::load(self.ctrl(pstate, CtrlKind::Enable, i));
            if is_last {
                en
            } else if is_source {
                let next_hold = AhdlExpr::load(self.ctrl(pstate, CtrlKind::Hold, i + 1));
                AhdlExpr::binary(
                    AhdlOp::BitAnd,
                    AhdlExpr::unary(AhdlOp::Invert, next_hold),
                    en,
                )
            } else {
                AhdlExpr::binary(AhdlOp::BitAnd, r_next, en)
            }
        } else {
            r_next
        };
        codes.push(AhdlStm::mv(AhdlExpr::store(r_now), ready_rhs));

        if has_hold {
            let hold = self.ctrl(pstate, CtrlKind::Hold, i);
            let v_prev = self.ctrl(pstate, CtrlKind::Valid, i - 1);
            let not_ready = AhdlExpr::unary(AhdlOp::Invert, AhdlExpr::load(r_now));
            let rhs = AhdlExpr::if_exp(
                AhdlExpr::load(hold),
                not_ready.clone(),
                AhdlExpr::binary(AhdlOp::BitAnd, not_ready, AhdlExpr::load(v_prev)),
            );
            codes.push(AhdlStm::mv(AhdlExpr::store(hold), rhs));
        }

        let valid = self.ctrl(pstate, CtrlKind::Valid, i);
        let valid_rhs = pstate.valid_exp(self.design, i);
        codes.push(AhdlStm::mv(AhdlExpr::store(valid), valid_rhs));

        pstate.stages[i].codes.extend(codes);
    }

    fn insert_register_slices(&mut self, pstate: &mut PipelineState) -> StgResult<()> {
        let table = AhdlUseDef::build(&pstate.stages);
        let sigs: Vec<SignalId> = table.def_sigs().collect();
        for sig in sigs {
            let s = self.design.sig(sig);
            if s.is_pipeline_ctrl() || s.is_memif() {
                continue;
            }
            let Some(def_stages) = table.def_stages(sig) else {
                continue;
            };
            let Some(&d) = def_stages.iter().next() else {
                continue;
            };
            let k = table.max_use_distance(sig, d);
            let needs_slices = k > 1 || ((s.is_induction() || s.is_net()) && k > 0);
            if !needs_slices {
                continue;
            }
            if def_stages.len() > 1 {
                return Err(StgError::MultipleDefinitionStages {
                    pipeline: pstate.name.clone(),
                    signal: s.name.clone(),
                });
            }
            let uses: Vec<usize> = table
                .use_stages(sig)
                .map(|u| u.iter().copied().collect())
                .unwrap_or_default();
            self.slice_signal(pstate, sig, d, d + k, &uses)?;
        }
        Ok(())
    }

    fn slice_signal(
        &mut self,
        pstate: &mut PipelineState,
        sig: SignalId,
        d: usize,
        end: usize,
        uses: &[usize],
    ) -> StgResult<()> {
        let s = self.design.sig(sig).clone();
        let normal_reg = s.is_reg() && !s.is_induction();
        let start = if normal_reg { d + 1 } else { d };
        let skip = |num: usize| num == d || (normal_reg && num == d + 1);
        let mut tags: Vec<SignalTag> = s
            .tags
            .iter()
            .copied()
            .filter(|t| *t != SignalTag::Net)
            .collect();
        if s.is_net() {
            tags.push(SignalTag::Reg);
        }
        debug!("register slices for {} over stages {}..={}", s.name, d, end);

        let mut slices = BTreeMap::new();
        for num in start..=end {
            if skip(num) {
                continue;
            }
            let name = format!("{}_{}", s.name, num);
            let slice = self.design.gen_sig(pstate.scope, &name, s.width, &tags, s.sym);
            slices.insert(num, slice);
        }

        for &u in uses {
            if skip(u) {
                continue;
            }
            if let Some(&slice) = slices.get(&u) {
                for code in pstate.stages[u].codes.iter_mut() {
                    code.replace_loads(sig, slice);
                }
            }
        }

        for num in start..end {
            let prev = if num == start {
                sig
            } else {
                slices[&num]
            };
            let cur = slices[&(num + 1)];
            let slice_move = AhdlStm::mv(AhdlExpr::store(cur), AhdlExpr::load(prev));
            match pstate.stages[num].codes.first_mut() {
                Some(AhdlStm::PipelineGuard { codes, .. }) => codes.push(slice_move),
                _ => {
                    return Err(StgError::MissingPipelineGuard {
                        pipeline: pstate.name.clone(),
                        stage: num,
                    })
                }
            }
        }
        Ok(())
    }

    fn post_build_loop(&mut self, pstate: &mut PipelineState, info: &LoopInfo) -> StgResult<()> {
        let scope = self.design.scope(self.scope);
        let scope_name = scope.name.clone();
        let usedef = UseDefTable::build(scope);
        let defs = usedef.defs_of(info.cond);
        if defs.len() != 1 {
            return Err(StgError::LoopCondDefinitions {
                scope: scope_name,
                cond: self.design.symbol(info.cond).name.clone(),
                count: defs.len(),
            });
        }
        if info.exits.len() != 1 {
            return Err(StgError::MultipleLoopExits {
                scope: scope_name,
                count: info.exits.len(),
            });
        }
        let Some(cond_stm) = scope.find_stm(defs[0].block, defs[0].stm).cloned() else {
            return Err(StgError::UnknownStatement {
                scope: scope_name,
                block: scope.block(defs[0].block).name(),
                stm: defs[0].stm.0,
            });
        };
        let loc = self.loc(cond_stm.lineno);
        let StmKind::Move { src, .. } = &cond_stm.kind else {
            return Err(StgError::unsupported(
                "loop condition must be a plain assignment",
                loc,
            ));
        };

        let mut translator = AhdlTranslator::new(&mut *self.design, self.scope, self.config);
        let missing = || StgError::unsupported("loop condition has no value", loc.clone());
        let cond = translator.visit_expr(src, &loc)?.ok_or_else(missing)?;
        let init = translator.visit_expr(&info.init, &loc)?.ok_or_else(missing)?;
        let counter = translator.sym_2_sig(info.counter, Ctx::Load);
        let mut cond_init = cond.clone();
        cond_init.substitute(counter, &init);

        let n = pstate.stages.len();
        for i in 0..n.saturating_sub(1).max(1) {
            let last = self.ctrl(pstate, CtrlKind::Last, i);
            let rhs = if i == 0 {
                AhdlExpr::unary(AhdlOp::Not, cond.clone())
            } else {
                let prev = self.ctrl(pstate, CtrlKind::Last, i - 1);
                let ready = self.ctrl(pstate, CtrlKind::Ready, i);
                AhdlExpr::binary(AhdlOp::BitAnd, AhdlExpr::load(prev), AhdlExpr::load(ready))
            };
            pstate.stages[i]
                .codes
                .push(AhdlStm::mv(AhdlExpr::store(last), rhs));
        }

        let enable0 = self.ctrl(pstate, CtrlKind::Enable, 0);
        pstate.stages[0].enable = Some(AhdlStm::mv(AhdlExpr::store(enable0), cond));

        let end = if n > 1 {
            let last = self.ctrl(pstate, CtrlKind::Last, n - 2);
            let ready = self.ctrl(pstate, CtrlKind::Ready, n - 1);
            AhdlExpr::binary(AhdlOp::BitAnd, AhdlExpr::load(last), AhdlExpr::load(ready))
        } else {
            AhdlExpr::load(self.ctrl(pstate, CtrlKind::Last, 0))
        };
        let exit_cond = AhdlExpr::binary(
            AhdlOp::Or,
            end,
            AhdlExpr::unary(AhdlOp::Not, cond_init),
        );
        let exit = self.ctrl(pstate, CtrlKind::Exit, n - 1);

        let mut leave = Vec::new();
        for i in 0..n {
            if i + 1 == n && n > 1 {
                break;
            }
            let last = self.ctrl(pstate, CtrlKind::Last, i);
            leave.push(AhdlStm::mv(AhdlExpr::store(last), AhdlExpr::Const(0)));
        }
        leave.push(AhdlStm::mv(AhdlExpr::store(exit), AhdlExpr::Const(0)));
        leave.push(AhdlStm::Transition(Target::Block(info.exits[0])));

        let final_stage = &mut pstate.stages[n - 1].codes;
        final_stage.push(AhdlStm::If {
            conds: vec![exit_cond],
            blocks: vec![vec![AhdlStm::mv(AhdlExpr::store(exit), AhdlExpr::Const(1))]],
        });
        final_stage.push(AhdlStm::TransitionIf {
            conds: vec![AhdlExpr::load(exit)],
            blocks: vec![leave],
        });
        Ok(())
    }
}
