//! Stage-level use-def information for pipeline states

use std::collections::BTreeSet;

use hlsc_ir::SignalId;
use indexmap::IndexMap;

use crate::ahdl::{walk, AhdlStm};
use crate::state::PipelineStage;

/// Stages defining and reading every signal of a pipeline
#[derive(Debug, Default, Clone)]
pub struct AhdlUseDef {
    defs: IndexMap<SignalId, BTreeSet<usize>>,
    uses: IndexMap<SignalId, BTreeSet<usize>>,
}

impl AhdlUseDef {
    pub fn build(stages: &[PipelineStage]) -> Self {
        let mut table = AhdlUseDef::default();
        for stage in stages {
            table.add_codes(stage.step, &stage.codes);
        }
        table
    }

    pub fn add_codes(&mut self, stage: usize, codes: &[AhdlStm]) {
        walk(codes, &mut |stm| {
            for sig in stm.defs() {
                self.defs.entry(sig).or_default().insert(stage);
            }
            for sig in stm.uses() {
                self.uses.entry(sig).or_default().insert(stage);
            }
        });
    }

    /// Defined signals in first-definition order
    pub fn def_sigs(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.defs.keys().copied()
    }

    pub fn def_stages(&self, sig: SignalId) -> Option<&BTreeSet<usize>> {
        self.defs.get(&sig)
    }

    pub fn use_stages(&self, sig: SignalId) -> Option<&BTreeSet<usize>> {
        self.uses.get(&sig)
    }

    /// Largest forward distance from the defining stage to a use
    pub fn max_use_distance(&self, sig: SignalId, def_stage: usize) -> usize {
        self.use_stages(sig)
            .into_iter()
            .flatten()
            .filter(|&&u| u > def_stage)
            .map(|&u| u - def_stage)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ahdl::AhdlExpr;

    fn stage(step: usize, codes: Vec<AhdlStm>) -> PipelineStage {
        PipelineStage {
            name: format!("p_{}", step),
            step,
            codes,
            has_enable: false,
            has_hold: false,
            is_source: false,
            enable: None,
        }
    }

    #[test]
    fn nested_guards_count_for_their_stage() {
        let (x, y, z) = (SignalId(0), SignalId(1), SignalId(2));
        let stages = vec![
            stage(
                0,
                vec![AhdlStm::PipelineGuard {
                    cond: AhdlExpr::Const(1),
                    codes: vec![AhdlStm::mv(AhdlExpr::store(x), AhdlExpr::load(z))],
                }],
            ),
            stage(1, vec![AhdlStm::mv(AhdlExpr::store(y), AhdlExpr::load(x))]),
            stage(3, vec![AhdlStm::mv(AhdlExpr::store(z), AhdlExpr::load(x))]),
        ];
        let table = AhdlUseDef::build(&stages);
        assert_eq!(table.def_sigs().collect::<Vec<_>>(), vec![x, y, z]);
        assert_eq!(table.def_stages(x), Some(&BTreeSet::from([0])));
        assert_eq!(table.max_use_distance(x, 0), 3);
        // the read of z in stage 0 precedes its definition and is ignored
        assert_eq!(table.max_use_distance(z, 3), 0);
        assert_eq!(table.max_use_distance(y, 1), 0);
    }
}
