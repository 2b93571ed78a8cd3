//! Structural checks over built STGs

use hlsc_ir::Design;

use crate::ahdl::{walk, AhdlStm, Target};
use crate::error::{StgError, StgResult};
use crate::state::{State, Stg};

/// Check that every state ends in a terminal, every transition points at an
/// existing state and every pipeline stage opens with its guard
pub fn validate_stgs(design: &Design, stgs: &[Stg]) -> StgResult<()> {
    check_terminals(stgs)?;
    for stg in stgs {
        for state in &stg.states {
            for codes in state.code_lists() {
                let mut bad = None;
                walk(codes, &mut |stm| {
                    if bad.is_some() {
                        return;
                    }
                    if let AhdlStm::Transition(target) = stm {
                        bad = dangling(stgs, target);
                    }
                });
                if let Some(what) = bad {
                    let block = match what {
                        Target::Block(b) => design
                            .scope(stg.scope)
                            .blocks
                            .get(b.0 as usize)
                            .map(|b| b.name())
                            .unwrap_or_else(|| format!("#{}", b.0)),
                        Target::Next => "<next>".to_string(),
                        Target::State(r) => format!("S{}.{}", r.stg, r.state),
                    };
                    return Err(StgError::UnresolvedTarget {
                        state: state.name().to_string(),
                        block,
                    });
                }
            }
            if let State::Pipeline(p) = state {
                for stage in &p.stages {
                    if !matches!(stage.codes.first(), Some(AhdlStm::PipelineGuard { .. })) {
                        return Err(StgError::MissingPipelineGuard {
                            pipeline: p.name.clone(),
                            stage: stage.step,
                        });
                    }
                }
            }
        }
        if stg.states.get(stg.init).is_none() || stg.states.get(stg.finish).is_none() {
            return Err(StgError::MissingTerminal {
                state: format!("{} (init/finish)", stg.name),
            });
        }
    }
    Ok(())
}

/// Every state of every STG ends in a transition, a transition-if or a wait
pub(crate) fn check_terminals(stgs: &[Stg]) -> StgResult<()> {
    stgs.iter()
        .flat_map(|stg| stg.states.iter())
        .try_for_each(check_terminal)
}

fn check_terminal(state: &State) -> StgResult<()> {
    let ok = match state {
        // a wait that absorbed the fall-through transition may precede
        // same-cycle codes
        State::Plain(s) => {
            s.codes.last().is_some_and(|c| c.is_terminal())
                || s.codes.iter().any(|c| {
                    matches!(c, AhdlStm::MetaWait { transition: Some(_), .. })
                })
        }
        State::Pipeline(p) => p
            .stages
            .last()
            .and_then(|s| s.codes.last())
            .is_some_and(|c| c.is_transition()),
    };
    if ok {
        Ok(())
    } else {
        Err(StgError::MissingTerminal {
            state: state.name().to_string(),
        })
    }
}

fn dangling(stgs: &[Stg], target: &Target) -> Option<Target> {
    match target {
        Target::State(r) => {
            let exists = stgs
                .get(r.stg)
                .is_some_and(|stg| r.state < stg.states.len());
            (!exists).then_some(*target)
        }
        other => Some(*other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ahdl::StateRef;
    use crate::schedule::SchedulingMode;
    use hlsc_ir::ScopeTag;

    fn one_state_stg(design: &mut Design, codes: Vec<AhdlStm>) -> Stg {
        let f = design.new_scope("f", design.global(), &[ScopeTag::Function], 1);
        let mut stg = Stg::new("f", None, f, SchedulingMode::StateMachine);
        stg.states.push(State::plain("f_b1_S0", 1, codes));
        stg
    }

    #[test]
    fn pending_targets_are_rejected() {
        let mut design = Design::new();
        let stg = one_state_stg(&mut design, vec![AhdlStm::Transition(Target::Next)]);
        let err = validate_stgs(&design, &[stg]).unwrap_err();
        assert!(matches!(err, StgError::UnresolvedTarget { ref state, .. } if state == "f_b1_S0"));
    }

    #[test]
    fn state_without_terminal_is_rejected() {
        let mut design = Design::new();
        let stg = one_state_stg(&mut design, vec![AhdlStm::Nop("x".into())]);
        assert!(matches!(
            validate_stgs(&design, &[stg]),
            Err(StgError::MissingTerminal { .. })
        ));
    }

    #[test]
    fn terminal_check_names_the_offending_state() {
        let mut design = Design::new();
        let good = one_state_stg(
            &mut design,
            vec![AhdlStm::Transition(Target::State(StateRef { stg: 0, state: 0 }))],
        );
        let mut bad = good.clone();
        bad.states.push(State::plain("f_b2_S0", 2, vec![AhdlStm::Nop("x".into())]));

        check_terminals(std::slice::from_ref(&good)).unwrap();
        let err = check_terminals(&[good, bad]).unwrap_err();
        assert!(matches!(err, StgError::MissingTerminal { ref state } if state == "f_b2_S0"));
    }

    #[test]
    fn self_loop_is_valid() {
        let mut design = Design::new();
        let stg = one_state_stg(
            &mut design,
            vec![AhdlStm::Transition(Target::State(StateRef { stg: 0, state: 0 }))],
        );
        validate_stgs(&design, &[stg]).unwrap();
    }
}
