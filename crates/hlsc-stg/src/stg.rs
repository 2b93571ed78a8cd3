//! State-transition graph construction
//!
//! One STG is built per scheduling region. State-machine regions get one
//! state per occupied cycle of every block; pipelined regions are folded into
//! a single [`PipelineState`](crate::state::PipelineState) by
//! [`crate::pipeline`]. All transitions are left symbolic (`Next`, `Block`)
//! while building and rewritten into state references once every region of
//! the scope exists.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use hlsc_ir::{BlockId, Design, ScopeId, StmKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::ahdl::{AhdlStm, SeqFactor, StateRef, Target};
use crate::dump::AhdlFormatter;
use crate::error::{StgError, StgResult};
use crate::pipeline::PipelineBuilder;
use crate::schedule::{Region, ScheduledNode, ScopeSchedule, SchedulingMode};
use crate::state::{State, Stg};
use crate::stg_validation::check_terminals;
use crate::translator::AhdlTranslator;

/// Latencies of multi-cycle memory operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StgConfig {
    pub mem_load_latency: u32,
    pub mem_store_latency: u32,
}

impl Default for StgConfig {
    fn default() -> Self {
        Self {
            mem_load_latency: 3,
            mem_store_latency: 2,
        }
    }
}

/// Translated items keyed by the cycle they execute in
#[derive(Debug, Clone, Default)]
pub struct ScheduledItemQueue {
    queue: BTreeMap<u32, Vec<AhdlStm>>,
}

impl ScheduledItemQueue {
    pub fn push(&mut self, sched_time: u32, item: AhdlStm) {
        self.queue.entry(sched_time).or_default().push(item);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Last occupied cycle
    pub fn last_time(&self) -> Option<u32> {
        self.queue.keys().next_back().copied()
    }

    pub fn items(&self) -> impl Iterator<Item = (u32, &Vec<AhdlStm>)> {
        self.queue.iter().map(|(t, items)| (*t, items))
    }

    pub fn take(&mut self, sched_time: u32) -> Vec<AhdlStm> {
        self.queue.remove(&sched_time).unwrap_or_default()
    }
}

impl IntoIterator for ScheduledItemQueue {
    type Item = (u32, Vec<AhdlStm>);
    type IntoIter = std::collections::btree_map::IntoIter<u32, Vec<AhdlStm>>;

    fn into_iter(self) -> Self::IntoIter {
        self.queue.into_iter()
    }
}

/// Nodes in start-cycle order; ties keep their input order
pub(crate) fn sorted_nodes<'r>(nodes: impl Iterator<Item = &'r ScheduledNode>) -> Vec<&'r ScheduledNode> {
    let mut nodes: Vec<&ScheduledNode> = nodes.filter(|n| n.begin.is_some()).collect();
    nodes.sort_by_key(|n| n.begin);
    nodes
}

pub struct StgBuilder<'a> {
    design: &'a mut Design,
    scope: ScopeId,
    config: &'a StgConfig,
    /// First state of every block built so far
    blk2states: HashMap<BlockId, StateRef>,
}

impl<'a> StgBuilder<'a> {
    /// Build and resolve the STGs of `scope`, main region first
    pub fn build(
        design: &'a mut Design,
        scope: ScopeId,
        schedule: &ScopeSchedule,
        config: &'a StgConfig,
    ) -> StgResult<Vec<Stg>> {
        let s = design.scope(scope);
        if s.is_namespace() || s.is_class() || s.is_lib() || schedule.regions.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = StgBuilder {
            design,
            scope,
            config,
            blk2states: HashMap::new(),
        };

        let depths = schedule.depths();
        let mut order: Vec<usize> = (0..schedule.regions.len()).collect();
        order.sort_by_key(|&i| Reverse(depths[i]));

        let mut built: Vec<Option<Stg>> = vec![None; schedule.regions.len()];
        for idx in order {
            let stg = builder.build_region(idx, &schedule.regions[idx])?;
            built[idx] = Some(stg);
        }
        let mut stgs: Vec<Stg> = built.into_iter().flatten().collect();
        builder.resolve(&mut stgs)?;
        check_terminals(&stgs)?;

        if tracing::enabled!(tracing::Level::TRACE) {
            trace!("{}", AhdlFormatter::new(&*builder.design, &stgs));
        }
        Ok(stgs)
    }

    fn stg_name(&self, index: usize) -> String {
        let scope = self.design.scope(self.scope);
        let parent = self.design.parent_of(self.scope);
        let base = match parent {
            Some(p) if p.is_module() && scope.is_callable() => p.orig_name.clone(),
            Some(p) if scope.is_method() => format!("{}_{}", p.orig_name, scope.orig_name),
            _ => scope.orig_name.clone(),
        };
        if index == 0 {
            base
        } else {
            format!("{}_L{}", base, index)
        }
    }

    fn block_name(&self, block: BlockId) -> String {
        self.design
            .scope(self.scope)
            .blocks
            .get(block.0 as usize)
            .map(|b| b.name())
            .unwrap_or_else(|| format!("b?{}", block.0))
    }

    fn build_region(&mut self, idx: usize, region: &Region) -> StgResult<Stg> {
        let name = self.stg_name(idx);
        debug!("#### stg {} ({:?})", name, region.mode);
        let mut stg = Stg::new(name, region.parent, self.scope, region.mode);
        match region.mode {
            SchedulingMode::StateMachine => self.build_states(&mut stg, idx, region)?,
            SchedulingMode::PipelinedLoop | SchedulingMode::PipelinedWorker => {
                let self_ref = StateRef {
                    stg: idx,
                    state: 0,
                };
                let pstate = PipelineBuilder::new(&mut *self.design, self.scope, self.config)
                    .build(&stg.name, idx, region, self_ref)?;
                for blk in &region.blocks {
                    self.blk2states.insert(*blk, self_ref);
                }
                if let Some(info) = &region.loop_info {
                    self.blk2states.insert(info.head, self_ref);
                    for blk in &info.bodies {
                        self.blk2states.insert(*blk, self_ref);
                    }
                }
                stg.states.push(State::Pipeline(pstate));
                stg.init = 0;
                stg.finish = 0;
            }
        }
        Ok(stg)
    }

    fn build_states(&mut self, stg: &mut Stg, idx: usize, region: &Region) -> StgResult<()> {
        let is_main = region.parent.is_none();
        let n = region.blocks.len();
        for (i, &blk) in region.blocks.iter().enumerate() {
            let mut translator = AhdlTranslator::new(&mut *self.design, self.scope, self.config);
            for node in sorted_nodes(region.block_nodes(blk)) {
                translator.translate(node)?;
            }
            let queue = translator.into_queue();

            let prefix = format!("{}_{}", stg.name, self.block_name(blk));
            debug!("# BLOCK {} #", prefix);
            let base = stg.states.len();
            let mut states = self.states_for_block(&prefix, blk, queue);
            let (init, finish) =
                self.mark_entry_exit(stg, &prefix, &mut states, is_main, i == 0, i + 1 == n);
            if let Some(k) = init {
                stg.init = base + k;
            }
            if let Some(k) = finish {
                stg.finish = base + k;
            }
            stg.states.extend(states);
            self.blk2states.insert(
                blk,
                StateRef {
                    stg: idx,
                    state: base,
                },
            );
        }
        Ok(())
    }

    fn states_for_block(
        &self,
        prefix: &str,
        blk: BlockId,
        queue: ScheduledItemQueue,
    ) -> Vec<State> {
        let mut states = Vec::new();
        for (step, mut codes) in queue {
            if !codes.last().is_some_and(|c| c.is_terminal()) {
                codes.push(AhdlStm::Transition(Target::Next));
            }
            let name = format!("{}_S{}", prefix, step);
            debug!("state {}", name);
            states.push(State::plain(name, step + 1, codes));
        }
        if states.is_empty() {
            states.push(State::plain(
                format!("{}_S0", prefix),
                1,
                vec![AhdlStm::Transition(Target::Next)],
            ));
        }

        let jump_target = self
            .design
            .scope(self.scope)
            .blocks
            .get(blk.0 as usize)
            .and_then(|b| b.last_stm())
            .and_then(|stm| match &stm.kind {
                StmKind::Jump { target, .. } => Some(*target),
                _ => None,
            });
        if let Some(target) = jump_target {
            if let Some(codes) = states.last_mut().and_then(|s| s.terminal_codes_mut()) {
                match codes.last_mut() {
                    Some(AhdlStm::Transition(t @ Target::Next)) => *t = Target::Block(target),
                    Some(AhdlStm::MetaWait { .. }) => {
                        codes.push(AhdlStm::Transition(Target::Block(target)))
                    }
                    _ => {}
                }
            }
        }
        states
    }

    /// Rename, add or extend states at the region's entry and exit
    ///
    /// Returns the block-relative indices of the init and finish states.
    fn mark_entry_exit(
        &self,
        stg: &Stg,
        prefix: &str,
        states: &mut Vec<State>,
        is_main: bool,
        is_first: bool,
        is_last: bool,
    ) -> (Option<usize>, Option<usize>) {
        let mut init = None;
        let mut finish = None;
        let scope = self.design.scope(self.scope);
        if !is_main {
            if is_first {
                init = Some(0);
            }
            if is_last {
                finish = Some(states.len() - 1);
            }
        } else if scope.is_worker() || scope.is_testbench() {
            if is_first {
                states[0].set_name(format!("{}_INIT", prefix));
                init = Some(0);
            }
            if is_last {
                let step = match states.last() {
                    Some(State::Plain(s)) => s.step + 1,
                    _ => 1,
                };
                let mut codes = Vec::new();
                if scope.is_testbench() {
                    codes.push(AhdlStm::Inline(
                        "$display(\"%5t:finish\", $time)".to_string(),
                    ));
                    codes.push(AhdlStm::Inline("$finish()".to_string()));
                }
                codes.push(AhdlStm::Transition(Target::Next));
                states.push(State::plain(format!("{}_FINISH", prefix), step, codes));
                finish = Some(states.len() - 1);
            }
        } else {
            if is_first {
                if !(states.len() <= 1 && is_last) {
                    let prolog = AhdlStm::Seq {
                        factor: SeqFactor::CalleeProlog(stg.name.clone()),
                        step: 0,
                        step_n: 1,
                    };
                    states.insert(
                        0,
                        State::plain(
                            format!("{}_INIT", prefix),
                            0,
                            vec![prolog, AhdlStm::Transition(Target::Next)],
                        ),
                    );
                }
                init = Some(0);
            }
            if is_last {
                let last = states.len() - 1;
                states[last].set_name(format!("{}_FINISH", prefix));
                if let Some(codes) = states[last].terminal_codes_mut() {
                    let epilog = AhdlStm::Seq {
                        factor: SeqFactor::CalleeEpilog(stg.name.clone()),
                        step: 0,
                        step_n: 1,
                    };
                    let at = codes.len().saturating_sub(1);
                    codes.insert(at, epilog);
                }
                finish = Some(last);
            }
        }
        (init, finish)
    }

    fn resolve(&self, stgs: &mut [Stg]) -> StgResult<()> {
        let scope = self.design.scope(self.scope);
        let loops_on_finish = scope.is_worker() || scope.is_testbench();
        for (si, stg) in stgs.iter_mut().enumerate() {
            let n = stg.states.len();
            if n == 0 {
                continue;
            }
            let last_next = if stg.is_main() && loops_on_finish {
                n - 1
            } else {
                0
            };
            for k in 0..n {
                let next = StateRef {
                    stg: si,
                    state: if k + 1 < n { k + 1 } else { last_next },
                };
                self.resolve_state(&mut stg.states[k], next)?;
            }
        }
        Ok(())
    }

    fn resolve_target(&self, state: &str, target: &mut Target, next: StateRef) -> StgResult<()> {
        match *target {
            Target::Next => *target = Target::State(next),
            Target::Block(b) => {
                let Some(r) = self.blk2states.get(&b) else {
                    return Err(StgError::UnresolvedTarget {
                        state: state.to_string(),
                        block: self.block_name(b),
                    });
                };
                *target = Target::State(*r);
            }
            Target::State(_) => {}
        }
        Ok(())
    }

    fn resolve_transition(&self, state: &str, stm: &mut AhdlStm, next: StateRef) -> StgResult<()> {
        match stm {
            AhdlStm::Transition(target) => self.resolve_target(state, target, next)?,
            AhdlStm::TransitionIf { blocks, .. } => {
                for block in blocks.iter_mut() {
                    for code in block.iter_mut() {
                        self.resolve_transition(state, code, next)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn resolve_state(&self, state: &mut State, next: StateRef) -> StgResult<()> {
        let name = state.name().to_string();
        let code_lists: Vec<&mut Vec<AhdlStm>> = match state {
            State::Plain(s) => vec![&mut s.codes],
            State::Pipeline(p) => p.stages.iter_mut().map(|s| &mut s.codes).collect(),
        };
        let n_lists = code_lists.len();
        let mut transition = None;
        for (i, codes) in code_lists.into_iter().enumerate() {
            if i + 1 == n_lists {
                if let Some(last) = codes.last_mut() {
                    if last.is_transition() {
                        self.resolve_transition(&name, last, next)?;
                        transition = Some(last.clone());
                    }
                }
            }
            let mut moved = false;
            for code in codes.iter_mut() {
                if let AhdlStm::MetaWait { transition: t, .. } = code {
                    match &transition {
                        Some(tr) => {
                            *t = Some(Box::new(tr.clone()));
                            moved = true;
                        }
                        None => *t = Some(Box::new(AhdlStm::Transition(Target::State(next)))),
                    }
                }
            }
            if moved {
                codes.pop();
            }
        }
        Ok(())
    }
}
