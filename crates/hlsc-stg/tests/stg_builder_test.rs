//! State construction, entry/exit states and transition resolution

mod common;

use common::*;
use hlsc_ir::*;
use hlsc_stg::*;

fn prolog(name: &str) -> AhdlStm {
    AhdlStm::Seq {
        factor: SeqFactor::CalleeProlog(name.to_string()),
        step: 0,
        step_n: 1,
    }
}

fn epilog(name: &str) -> AhdlStm {
    AhdlStm::Seq {
        factor: SeqFactor::CalleeEpilog(name.to_string()),
        step: 0,
        step_n: 1,
    }
}

#[test]
fn function_gets_prolog_and_epilog_states() {
    let mut f = Fixture::function("f");
    let x = f.var("x");
    let y = f.var("y");
    let (b1, b2) = (f.block(), f.block());
    let s1 = f.assign(b1, x, Expr::int(1));
    let s2 = f.assign(b1, y, add(Expr::load(x), Expr::int(1)));
    let j = f.jump(b1, b2);
    let r = f.ret(b2);
    let schedule = ScopeSchedule::new(vec![Region::new(
        SchedulingMode::StateMachine,
        vec![b1, b2],
        vec![node(b1, s1, 0), node(b1, s2, 1), node(b1, j, 1), node(b2, r, 0)],
    )]);

    let stgs = f.build(&schedule).unwrap();

    assert_eq!(stgs.len(), 1);
    let stg = &stgs[0];
    assert_eq!(stg.name, "f");
    assert!(stg.is_main());
    assert_eq!(
        state_names(stg),
        vec!["f_b1_INIT", "f_b1_S0", "f_b1_S1", "f_b2_FINISH"]
    );
    assert_eq!((stg.init, stg.finish), (0, 3));

    let (sx, sy) = (f.sig("x"), f.sig("y"));
    assert!(f.design.sig(sx).is_reg());
    assert_eq!(plain(stg, 0).step, 0);
    assert_eq!(plain(stg, 0).codes, vec![prolog("f"), goto(0, 1)]);
    assert_eq!(
        plain(stg, 1).codes,
        vec![
            AhdlStm::mv(AhdlExpr::store(sx), AhdlExpr::Const(1)),
            goto(0, 2)
        ]
    );
    assert_eq!(
        plain(stg, 2).codes,
        vec![
            AhdlStm::mv(
                AhdlExpr::store(sy),
                AhdlExpr::binary(AhdlOp::Add, AhdlExpr::load(sx), AhdlExpr::Const(1))
            ),
            goto(0, 3)
        ]
    );
    // the last state returns to the idle entry state
    assert_eq!(plain(stg, 3).codes, vec![epilog("f"), goto(0, 0)]);
    validate_stgs(&f.design, &stgs).unwrap();
}

#[test]
fn single_state_function_has_no_prolog() {
    let mut f = Fixture::function("one");
    let x = f.var("x");
    let b1 = f.block();
    let s1 = f.assign(b1, x, Expr::int(5));
    let r = f.ret(b1);
    let schedule = ScopeSchedule::new(vec![Region::new(
        SchedulingMode::StateMachine,
        vec![b1],
        vec![node(b1, s1, 0), node(b1, r, 0)],
    )]);

    let stgs = f.build(&schedule).unwrap();

    let stg = &stgs[0];
    assert_eq!(state_names(stg), vec!["one_b1_FINISH"]);
    assert_eq!((stg.init, stg.finish), (0, 0));
    assert_eq!(
        plain(stg, 0).codes,
        vec![
            AhdlStm::mv(AhdlExpr::store(f.sig("x")), AhdlExpr::Const(5)),
            epilog("one"),
            goto(0, 0)
        ]
    );
}

#[test]
fn worker_finish_state_loops_on_itself() {
    let mut w = Fixture::worker("w");
    let a = w.var("a");
    let b = w.var("b");
    let b1 = w.block();
    let s1 = w.assign(b1, a, Expr::int(1));
    let s2 = w.assign(b1, b, Expr::int(2));
    let schedule = ScopeSchedule::new(vec![Region::new(
        SchedulingMode::StateMachine,
        vec![b1],
        vec![node(b1, s1, 0), node(b1, s2, 1)],
    )]);

    let stgs = w.build(&schedule).unwrap();

    let stg = &stgs[0];
    assert_eq!(stg.name, "w");
    assert_eq!(
        state_names(stg),
        vec!["w_b1_INIT", "w_b1_S1", "w_b1_FINISH"]
    );
    assert_eq!((stg.init, stg.finish), (0, 2));
    assert_eq!(plain(stg, 2).step, 3);
    assert_eq!(plain(stg, 2).codes, vec![goto(0, 2)]);
    // worker signals carry the worker's name
    assert!(w.design.signal(w.scope, "w_a").is_some());
    validate_stgs(&w.design, &stgs).unwrap();
}

#[test]
fn testbench_finish_state_ends_the_simulation() {
    let mut t = Fixture::testbench("tb");
    let x = t.var("x");
    let b1 = t.block();
    let s1 = t.assign(b1, x, Expr::int(3));
    let schedule = ScopeSchedule::new(vec![Region::new(
        SchedulingMode::StateMachine,
        vec![b1],
        vec![node(b1, s1, 0)],
    )]);

    let stgs = t.build(&schedule).unwrap();

    let stg = &stgs[0];
    assert_eq!(state_names(stg), vec!["tb_b1_INIT", "tb_b1_FINISH"]);
    assert_eq!(
        plain(stg, 1).codes,
        vec![
            AhdlStm::Inline("$display(\"%5t:finish\", $time)".to_string()),
            AhdlStm::Inline("$finish()".to_string()),
            goto(0, 1)
        ]
    );
}

#[test]
fn nested_region_is_its_own_stg() {
    let mut f = Fixture::function("f");
    let x = f.var("x");
    let y = f.var("y");
    let (b1, b2, b3) = (f.block(), f.block(), f.block());
    let s1 = f.assign(b1, x, Expr::int(0));
    let j1 = f.jump(b1, b2);
    let s2 = f.assign(b2, y, add(Expr::load(x), Expr::int(1)));
    let j2 = f.jump(b2, b3);
    let r = f.ret(b3);
    let schedule = ScopeSchedule::new(vec![
        Region::new(
            SchedulingMode::StateMachine,
            vec![b1, b3],
            vec![node(b1, s1, 0), node(b1, j1, 0), node(b3, r, 0)],
        ),
        Region::new(
            SchedulingMode::StateMachine,
            vec![b2],
            vec![node(b2, s2, 0), node(b2, j2, 0)],
        )
        .nested_in(0),
    ]);

    let stgs = f.build(&schedule).unwrap();

    assert_eq!(stgs.len(), 2);
    let (main, inner) = (&stgs[0], &stgs[1]);
    assert_eq!(
        state_names(main),
        vec!["f_b1_INIT", "f_b1_S0", "f_b3_FINISH"]
    );
    assert_eq!(inner.name, "f_L1");
    assert_eq!(inner.parent, Some(0));
    assert!(!inner.is_main());
    assert_eq!(state_names(inner), vec!["f_L1_b2_S0"]);
    assert_eq!((inner.init, inner.finish), (0, 0));

    // the jump into the nested region lands on its first state and back
    assert_eq!(plain(main, 1).codes.last(), Some(&goto(1, 0)));
    assert_eq!(plain(inner, 0).codes.last(), Some(&goto(0, 2)));
    validate_stgs(&f.design, &stgs).unwrap();
}

#[test]
fn conditional_jump_becomes_transition_if() {
    let mut f = Fixture::function("f");
    let x = f.tagged("x", SymbolTag::Param);
    let y = f.var("y");
    let c = f.cond("c");
    let (b1, b2, b3, b4) = (f.block(), f.block(), f.block(), f.block());
    let sc = f.assign(b1, c, lt(Expr::load(x), Expr::int(3)));
    let cj = f.branch(b1, c, b2, b3);
    let s2 = f.assign(b2, y, Expr::int(1));
    let j2 = f.jump(b2, b4);
    let s3 = f.assign(b3, y, Expr::int(2));
    let j3 = f.jump(b3, b4);
    let r = f.ret(b4);
    let schedule = ScopeSchedule::new(vec![Region::new(
        SchedulingMode::StateMachine,
        vec![b1, b2, b3, b4],
        vec![
            node(b1, sc, 0),
            node(b1, cj, 1),
            node(b2, s2, 0),
            node(b2, j2, 0),
            node(b3, s3, 0),
            node(b3, j3, 0),
            node(b4, r, 0),
        ],
    )]);

    let stgs = f.build(&schedule).unwrap();

    let stg = &stgs[0];
    assert_eq!(
        state_names(stg),
        vec![
            "f_b1_INIT",
            "f_b1_S0",
            "f_b1_S1",
            "f_b2_S0",
            "f_b3_S0",
            "f_b4_FINISH"
        ]
    );
    let sc = f.sig("c");
    assert!(f.design.sig(sc).has_tag(SignalTag::Condition));
    // parameters are inputs named after their scope
    assert!(f.design.sig(f.sig("f_x")).is_input());
    assert_eq!(
        plain(stg, 2).codes,
        vec![AhdlStm::TransitionIf {
            conds: vec![AhdlExpr::load(sc), AhdlExpr::Const(1)],
            blocks: vec![vec![goto(0, 3)], vec![goto(0, 4)]],
        }]
    );
    assert_eq!(plain(stg, 3).codes.last(), Some(&goto(0, 5)));
    assert_eq!(plain(stg, 4).codes.last(), Some(&goto(0, 5)));
    validate_stgs(&f.design, &stgs).unwrap();
}

#[test]
fn wait_takes_over_the_fall_through_transition() {
    let mut w = Fixture::worker("w");
    let clk = w.input_port("clk");
    let a = w.var("a");
    let b = w.var("b");
    let b1 = w.block();
    let wait = w.stm(
        b1,
        StmKind::Expr(Expr::syscall("wait_rising", vec![Expr::load(clk)])),
    );
    let s1 = w.assign(b1, a, Expr::int(1));
    let s2 = w.assign(b1, b, Expr::int(2));
    let wait2 = w.stm(
        b1,
        StmKind::Expr(Expr::syscall("wait_falling", vec![Expr::load(clk)])),
    );
    let schedule = ScopeSchedule::new(vec![Region::new(
        SchedulingMode::StateMachine,
        vec![b1],
        vec![
            node(b1, wait, 0),
            node(b1, s1, 0),
            node(b1, s2, 1),
            node(b1, wait2, 1),
        ],
    )]);

    let stgs = w.build(&schedule).unwrap();

    let stg = &stgs[0];
    let module = w.module.unwrap();
    let clk_sig = w.design.signal(module, "clk").unwrap();
    assert!(w.design.sig(clk_sig).is_input());
    assert_eq!(
        plain(stg, 0).codes,
        vec![
            AhdlStm::MetaWait {
                kind: WaitKind::Edge {
                    old: AhdlExpr::Const(0),
                    new: AhdlExpr::Const(1),
                    ports: vec![AhdlExpr::load(clk_sig)],
                },
                transition: Some(Box::new(goto(0, 1))),
            },
            AhdlStm::mv(AhdlExpr::store(w.sig("w_a")), AhdlExpr::Const(1)),
        ]
    );
    // a wait closing its cycle falls through to the next state
    match plain(stg, 1).codes.last() {
        Some(AhdlStm::MetaWait { kind, transition }) => {
            assert!(matches!(kind, WaitKind::Edge { old: AhdlExpr::Const(1), .. }));
            assert_eq!(transition.as_deref(), Some(&goto(0, 2)));
        }
        other => panic!("expected a wait, got {:?}", other),
    }
    validate_stgs(&w.design, &stgs).unwrap();
}

#[test]
fn jump_to_unscheduled_block_is_reported() {
    let mut f = Fixture::function("f");
    let (b1, b2) = (f.block(), f.block());
    let j = f.jump(b1, b2);
    f.ret(b2);
    let schedule = ScopeSchedule::new(vec![Region::new(
        SchedulingMode::StateMachine,
        vec![b1],
        vec![node(b1, j, 0)],
    )]);

    let err = f.build(&schedule).unwrap_err();
    assert!(matches!(
        err,
        StgError::UnresolvedTarget { ref state, ref block } if state == "f_b1_FINISH" && block == "b2"
    ));
}

#[test]
fn node_for_missing_statement_is_reported() {
    let mut f = Fixture::function("f");
    let b1 = f.block();
    f.ret(b1);
    let schedule = ScopeSchedule::new(vec![Region::new(
        SchedulingMode::StateMachine,
        vec![b1],
        vec![node(b1, StmId(999), 0)],
    )]);

    let err = f.build(&schedule).unwrap_err();
    assert!(matches!(err, StgError::UnknownStatement { stm: 999, .. }));
}

#[test]
fn dropped_nodes_and_class_scopes_produce_nothing() {
    let mut f = Fixture::function("f");
    let x = f.var("x");
    let b1 = f.block();
    let s1 = f.assign(b1, x, Expr::int(1));
    let mut dropped = node(b1, s1, 0);
    dropped.begin = None;
    let schedule = ScopeSchedule::new(vec![Region::new(
        SchedulingMode::StateMachine,
        vec![b1],
        vec![dropped],
    )]);

    let stgs = f.build(&schedule).unwrap();
    assert_eq!(state_names(&stgs[0]), vec!["f_b1_FINISH"]);
    assert!(f.design.signal(f.scope, "x").is_none());

    let class = f
        .design
        .new_scope("C", f.design.global(), &[ScopeTag::Class], 50);
    let config = StgConfig::default();
    let stgs = StgBuilder::build(&mut f.design, class, &schedule, &config).unwrap();
    assert!(stgs.is_empty());
}

#[test]
fn listing_names_every_state() {
    let mut f = Fixture::function("f");
    let x = f.var("x");
    let (b1, b2) = (f.block(), f.block());
    let s1 = f.assign(b1, x, Expr::int(1));
    let j = f.jump(b1, b2);
    let r = f.ret(b2);
    let schedule = ScopeSchedule::new(vec![Region::new(
        SchedulingMode::StateMachine,
        vec![b1, b2],
        vec![node(b1, s1, 0), node(b1, j, 0), node(b2, r, 0)],
    )]);
    let stgs = f.build(&schedule).unwrap();

    let text = stgs[0].display(&f.design, 0);
    assert!(text.starts_with("stg f (StateMachine)"));
    assert!(text.contains("f_b1_INIT:0"));
    assert!(text.contains("x <= 1"));
    assert!(text.contains("goto f_b2_FINISH"));

    let json = serde_json::to_string(&stgs).unwrap();
    let back: Vec<Stg> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, stgs);
}
