//! States and state-transition graphs

use std::collections::BTreeMap;

use hlsc_ir::{Design, ScopeId, SignalId, SignalTag};
use serde::{Deserialize, Serialize};

use crate::ahdl::{AhdlExpr, AhdlOp, AhdlStm};
use crate::schedule::SchedulingMode;

/// An ordinary control state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainState {
    pub name: String,
    pub step: u32,
    pub codes: Vec<AhdlStm>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub name: String,
    pub step: usize,
    pub codes: Vec<AhdlStm>,
    /// Stage has an external enable (port access, or first stage of a loop)
    pub has_enable: bool,
    pub has_hold: bool,
    /// Stage produces tokens through a port write
    pub is_source: bool,
    /// Assignment driving this stage's enable, when the builder owns it
    pub enable: Option<AhdlStm>,
}

/// Per-stage control signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CtrlKind {
    Valid,
    Ready,
    Hold,
    Enable,
    Last,
    Exit,
}

impl CtrlKind {
    pub fn name(&self) -> &'static str {
        match self {
            CtrlKind::Valid => "valid",
            CtrlKind::Ready => "ready",
            CtrlKind::Hold => "hold",
            CtrlKind::Enable => "enable",
            CtrlKind::Last => "last",
            CtrlKind::Exit => "exit",
        }
    }

    pub fn is_reg(&self) -> bool {
        !matches!(self, CtrlKind::Ready | CtrlKind::Enable)
    }
}

/// A whole pipelined region folded into one state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub name: String,
    /// Scope owning the control signals
    pub scope: ScopeId,
    /// Dense, `stages[i].step == i`
    pub stages: Vec<PipelineStage>,
    pub valid: BTreeMap<usize, SignalId>,
    pub ready: BTreeMap<usize, SignalId>,
    pub hold: BTreeMap<usize, SignalId>,
    pub enable: BTreeMap<usize, SignalId>,
    pub last: BTreeMap<usize, SignalId>,
    pub exit: BTreeMap<usize, SignalId>,
    pub is_finite_loop: bool,
}

impl PipelineState {
    pub fn new(name: impl Into<String>, scope: ScopeId, is_finite_loop: bool) -> Self {
        Self {
            name: name.into(),
            scope,
            stages: Vec::new(),
            valid: BTreeMap::new(),
            ready: BTreeMap::new(),
            hold: BTreeMap::new(),
            enable: BTreeMap::new(),
            last: BTreeMap::new(),
            exit: BTreeMap::new(),
            is_finite_loop,
        }
    }

    fn table(&self, kind: CtrlKind) -> &BTreeMap<usize, SignalId> {
        match kind {
            CtrlKind::Valid => &self.valid,
            CtrlKind::Ready => &self.ready,
            CtrlKind::Hold => &self.hold,
            CtrlKind::Enable => &self.enable,
            CtrlKind::Last => &self.last,
            CtrlKind::Exit => &self.exit,
        }
    }

    fn table_mut(&mut self, kind: CtrlKind) -> &mut BTreeMap<usize, SignalId> {
        match kind {
            CtrlKind::Valid => &mut self.valid,
            CtrlKind::Ready => &mut self.ready,
            CtrlKind::Hold => &mut self.hold,
            CtrlKind::Enable => &mut self.enable,
            CtrlKind::Last => &mut self.last,
            CtrlKind::Exit => &mut self.exit,
        }
    }

    /// Already created control signal
    pub fn signal(&self, kind: CtrlKind, idx: usize) -> Option<SignalId> {
        self.table(kind).get(&idx).copied()
    }

    /// `{name}_{idx}_{kind}`, created on first request
    pub fn ctrl_signal(&mut self, design: &mut Design, kind: CtrlKind, idx: usize) -> SignalId {
        if let Some(sig) = self.signal(kind, idx) {
            return sig;
        }
        let name = format!("{}_{}_{}", self.name, idx, kind.name());
        let storage = if kind.is_reg() {
            SignalTag::Reg
        } else {
            SignalTag::Net
        };
        let sig = design.gen_sig(self.scope, &name, 1, &[storage, SignalTag::PipelineCtrl], None);
        self.table_mut(kind).insert(idx, sig);
        sig
    }

    /// `hold ? ready : ready & valid_prev`, or just `ready` for stage 0
    pub fn valid_exp(&mut self, design: &mut Design, idx: usize) -> AhdlExpr {
        let ready = AhdlExpr::load(self.ctrl_signal(design, CtrlKind::Ready, idx));
        if idx == 0 {
            return ready;
        }
        let hold = self.ctrl_signal(design, CtrlKind::Hold, idx);
        let valid_prev = self.ctrl_signal(design, CtrlKind::Valid, idx - 1);
        AhdlExpr::if_exp(
            AhdlExpr::load(hold),
            ready.clone(),
            AhdlExpr::binary(AhdlOp::BitAnd, ready, AhdlExpr::load(valid_prev)),
        )
    }

    pub fn new_stage(&mut self, step: usize, codes: Vec<AhdlStm>) -> &mut PipelineStage {
        debug_assert_eq!(self.stages.len(), step);
        self.stages.push(PipelineStage {
            name: format!("{}_{}", self.name, step),
            step,
            codes,
            has_enable: false,
            has_hold: false,
            is_source: false,
            enable: None,
        });
        let last = self.stages.len() - 1;
        &mut self.stages[last]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum State {
    Plain(PlainState),
    Pipeline(PipelineState),
}

impl State {
    pub fn plain(name: impl Into<String>, step: u32, codes: Vec<AhdlStm>) -> Self {
        State::Plain(PlainState {
            name: name.into(),
            step,
            codes,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            State::Plain(s) => &s.name,
            State::Pipeline(p) => &p.name,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        match self {
            State::Plain(s) => s.name = name.into(),
            State::Pipeline(p) => p.name = name.into(),
        }
    }

    pub fn as_pipeline(&self) -> Option<&PipelineState> {
        match self {
            State::Pipeline(p) => Some(p),
            State::Plain(_) => None,
        }
    }

    /// Top-level code lists: one for a plain state, one per stage otherwise
    pub fn code_lists(&self) -> Vec<&Vec<AhdlStm>> {
        match self {
            State::Plain(s) => vec![&s.codes],
            State::Pipeline(p) => p.stages.iter().map(|s| &s.codes).collect(),
        }
    }

    /// Code list holding the state's terminal
    pub fn terminal_codes(&self) -> Option<&Vec<AhdlStm>> {
        match self {
            State::Plain(s) => Some(&s.codes),
            State::Pipeline(p) => p.stages.last().map(|s| &s.codes),
        }
    }

    pub fn terminal_codes_mut(&mut self) -> Option<&mut Vec<AhdlStm>> {
        match self {
            State::Plain(s) => Some(&mut s.codes),
            State::Pipeline(p) => p.stages.last_mut().map(|s| &mut s.codes),
        }
    }
}

/// State-transition graph of one scheduling region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stg {
    pub name: String,
    /// Index of the enclosing region's STG
    pub parent: Option<usize>,
    pub states: Vec<State>,
    pub init: usize,
    pub finish: usize,
    pub scheduling: SchedulingMode,
    pub scope: ScopeId,
}

impl Stg {
    pub fn new(name: impl Into<String>, parent: Option<usize>, scope: ScopeId, scheduling: SchedulingMode) -> Self {
        Self {
            name: name.into(),
            parent,
            states: Vec::new(),
            init: 0,
            finish: 0,
            scheduling,
            scope,
        }
    }

    pub fn is_main(&self) -> bool {
        self.parent.is_none()
    }

    pub fn init_state(&self) -> Option<&State> {
        self.states.get(self.init)
    }

    pub fn finish_state(&self) -> Option<&State> {
        self.states.get(self.finish)
    }

    pub fn state_by_name(&self, name: &str) -> Option<(usize, &State)> {
        self.states.iter().enumerate().find(|(_, s)| s.name() == name)
    }
}
