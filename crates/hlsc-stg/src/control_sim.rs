//! Cycle-level evaluation of pipeline control logic
//!
//! Nets are settled to a fixed point from the current register values and
//! external inputs, then every register whose assignment is enabled updates
//! at once. Data-path operations (sequences, memories, procedure calls) are
//! not modelled.

use std::collections::HashMap;

use hlsc_ir::{Design, SignalId};

use crate::ahdl::{AhdlExpr, AhdlOp, AhdlStm, Target};
use crate::state::PipelineState;

#[derive(Debug, Clone)]
struct Guard {
    cond: AhdlExpr,
    expect: bool,
}

#[derive(Debug, Clone)]
struct Assign {
    guards: Vec<Guard>,
    dst: SignalId,
    src: AhdlExpr,
}

pub struct ControlSim<'d> {
    design: &'d Design,
    nets: Vec<Assign>,
    regs: Vec<Assign>,
    transitions: Vec<(Vec<Guard>, Target)>,
    values: HashMap<SignalId, i64>,
    cycle: u64,
    last_transition: Option<Target>,
}

impl<'d> ControlSim<'d> {
    pub fn new(design: &'d Design, pstate: &PipelineState) -> Self {
        let mut sim = ControlSim {
            design,
            nets: Vec::new(),
            regs: Vec::new(),
            transitions: Vec::new(),
            values: HashMap::new(),
            cycle: 0,
            last_transition: None,
        };
        for stage in &pstate.stages {
            if let Some(enable) = &stage.enable {
                sim.collect(std::slice::from_ref(enable), &[]);
            }
            sim.collect(&stage.codes, &[]);
        }
        sim
    }

    fn collect(&mut self, codes: &[AhdlStm], guards: &[Guard]) {
        for code in codes {
            match code {
                AhdlStm::Move {
                    dst: AhdlExpr::Var { sig, .. },
                    src,
                } => {
                    let assign = Assign {
                        guards: guards.to_vec(),
                        dst: *sig,
                        src: src.clone(),
                    };
                    if self.design.sig(*sig).is_net() {
                        self.nets.push(assign);
                    } else {
                        self.regs.push(assign);
                    }
                }
                AhdlStm::If { conds, blocks } | AhdlStm::TransitionIf { conds, blocks } => {
                    let mut branch_guards = guards.to_vec();
                    for (cond, block) in conds.iter().zip(blocks) {
                        let mut taken = branch_guards.clone();
                        taken.push(Guard {
                            cond: cond.clone(),
                            expect: true,
                        });
                        self.collect(block, &taken);
                        branch_guards.push(Guard {
                            cond: cond.clone(),
                            expect: false,
                        });
                    }
                }
                AhdlStm::PipelineGuard { cond, codes } => {
                    let mut inner = guards.to_vec();
                    inner.push(Guard {
                        cond: cond.clone(),
                        expect: true,
                    });
                    self.collect(codes, &inner);
                }
                AhdlStm::Transition(target) => {
                    self.transitions.push((guards.to_vec(), *target));
                }
                _ => {}
            }
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Drive an undriven signal, such as a stage enable
    pub fn set_input(&mut self, sig: SignalId, value: i64) {
        let value = self.design.sig(sig).truncate(value);
        self.values.insert(sig, value);
    }

    pub fn value(&self, sig: SignalId) -> i64 {
        self.values.get(&sig).copied().unwrap_or(0)
    }

    /// Transition taken on the last clock edge, if any
    pub fn last_transition(&self) -> Option<Target> {
        self.last_transition
    }

    fn enabled(&self, guards: &[Guard]) -> bool {
        guards
            .iter()
            .all(|g| (self.eval(&g.cond) != 0) == g.expect)
    }

    /// Propagate nets until nothing changes
    pub fn settle(&mut self) {
        for _ in 0..self.nets.len() + 2 {
            let mut changed = false;
            for i in 0..self.nets.len() {
                let assign = &self.nets[i];
                if !self.enabled(&assign.guards) {
                    continue;
                }
                let value = self.design.sig(assign.dst).truncate(self.eval(&assign.src));
                let dst = assign.dst;
                if self.value(dst) != value {
                    self.values.insert(dst, value);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Settle, then update all enabled registers simultaneously
    pub fn clock(&mut self) {
        self.settle();
        let mut pending = Vec::new();
        for assign in &self.regs {
            if self.enabled(&assign.guards) {
                let value = self.design.sig(assign.dst).truncate(self.eval(&assign.src));
                pending.push((assign.dst, value));
            }
        }
        self.last_transition = self
            .transitions
            .iter()
            .find(|(guards, _)| self.enabled(guards))
            .map(|(_, target)| *target);
        for (sig, value) in pending {
            self.values.insert(sig, value);
        }
        self.cycle += 1;
        self.settle();
    }

    pub fn eval(&self, exp: &AhdlExpr) -> i64 {
        match exp {
            AhdlExpr::Const(v) => *v,
            AhdlExpr::Var { sig, .. } | AhdlExpr::MemVar { sig, .. } => self.value(*sig),
            AhdlExpr::IfExp { cond, then, els } => {
                if self.eval(cond) != 0 {
                    self.eval(then)
                } else {
                    self.eval(els)
                }
            }
            AhdlExpr::Op { op, args } => match args.as_slice() {
                [a] => {
                    let a = self.eval(a);
                    match op {
                        AhdlOp::Not => (a == 0) as i64,
                        AhdlOp::Invert => !a,
                        AhdlOp::USub => a.wrapping_neg(),
                        _ => a,
                    }
                }
                [l, r] => binary(*op, self.eval(l), self.eval(r)),
                _ => 0,
            },
            AhdlExpr::Symbol(_) | AhdlExpr::Subscript { .. } | AhdlExpr::FunCall { .. } => 0,
        }
    }
}

fn binary(op: AhdlOp, l: i64, r: i64) -> i64 {
    match op {
        AhdlOp::Add => l.wrapping_add(r),
        AhdlOp::Sub => l.wrapping_sub(r),
        AhdlOp::Mult => l.wrapping_mul(r),
        AhdlOp::FloorDiv => l.checked_div_euclid(r).unwrap_or(0),
        AhdlOp::Mod => l.checked_rem_euclid(r).unwrap_or(0),
        AhdlOp::LShift => l.wrapping_shl(r.clamp(0, 63) as u32),
        AhdlOp::RShift => l.wrapping_shr(r.clamp(0, 63) as u32),
        AhdlOp::BitAnd => l & r,
        AhdlOp::BitOr => l | r,
        AhdlOp::BitXor => l ^ r,
        AhdlOp::And => (l != 0 && r != 0) as i64,
        AhdlOp::Or => (l != 0 || r != 0) as i64,
        AhdlOp::Eq => (l == r) as i64,
        AhdlOp::NotEq => (l != r) as i64,
        AhdlOp::Lt => (l < r) as i64,
        AhdlOp::LtE => (l <= r) as i64,
        AhdlOp::Gt => (l > r) as i64,
        AhdlOp::GtE => (l >= r) as i64,
        AhdlOp::Not | AhdlOp::Invert | AhdlOp::USub | AhdlOp::UAdd => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlsc_ir::{ScopeTag, SignalTag};

    #[test]
    fn registers_update_together_after_nets_settle() {
        let mut design = Design::new();
        let w = design.new_scope("w", design.global(), &[ScopeTag::Worker], 1);
        let a = design.gen_sig(w, "a", 1, &[SignalTag::Reg], None);
        let b = design.gen_sig(w, "b", 1, &[SignalTag::Reg], None);
        let n = design.gen_sig(w, "n", 1, &[SignalTag::Net], None);
        let mut pstate = PipelineState::new("p", w, false);
        pstate.new_stage(
            0,
            vec![
                // swap through a net
                AhdlStm::mv(AhdlExpr::store(n), AhdlExpr::load(a)),
                AhdlStm::mv(AhdlExpr::store(a), AhdlExpr::load(b)),
                AhdlStm::mv(AhdlExpr::store(b), AhdlExpr::load(n)),
            ],
        );
        let mut sim = ControlSim::new(&design, &pstate);
        sim.set_input(a, 1);
        sim.clock();
        assert_eq!((sim.value(a), sim.value(b), sim.value(n)), (0, 1, 0));
        sim.clock();
        assert_eq!((sim.value(a), sim.value(b)), (1, 0));
        assert_eq!(sim.cycle(), 2);
    }

    #[test]
    fn stores_are_masked_and_guards_respected() {
        let mut design = Design::new();
        let w = design.new_scope("w", design.global(), &[ScopeTag::Worker], 1);
        let en = design.gen_sig(w, "en", 1, &[SignalTag::Net], None);
        let r = design.gen_sig(w, "r", 1, &[SignalTag::Reg], None);
        let mut pstate = PipelineState::new("p", w, false);
        pstate.new_stage(
            0,
            vec![AhdlStm::PipelineGuard {
                cond: AhdlExpr::load(en),
                codes: vec![AhdlStm::mv(
                    AhdlExpr::store(r),
                    AhdlExpr::unary(AhdlOp::Invert, AhdlExpr::load(r)),
                )],
            }],
        );
        let mut sim = ControlSim::new(&design, &pstate);
        sim.clock();
        assert_eq!(sim.value(r), 0);
        sim.set_input(en, 1);
        sim.clock();
        assert_eq!(sim.value(r), 1);
        sim.clock();
        assert_eq!(sim.value(r), 0);
    }
}
