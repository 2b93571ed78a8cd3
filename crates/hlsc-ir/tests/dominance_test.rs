//! Dominator tree and frontier checks against petgraph and the textbook
//! definitions, over fixed and generated CFGs

use std::collections::BTreeSet;

use hlsc_ir::*;
use petgraph::algo::dominators::simple_fast;
use petgraph::graph::{DiGraph, NodeIndex};

/// Small deterministic generator so failures reproduce
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

struct Cfg {
    design: Design,
    scope: ScopeId,
    blocks: Vec<BlockId>,
    forward: Vec<(usize, usize)>,
}

impl Cfg {
    fn new(n: usize) -> Self {
        let mut design = Design::new();
        let scope = design.new_scope("cfg", design.global(), &[ScopeTag::Function], 1);
        let blocks = (0..n)
            .map(|_| design.scope_mut(scope).add_block("b"))
            .collect();
        Self {
            design,
            scope,
            blocks,
            forward: Vec::new(),
        }
    }

    fn edge(&mut self, from: usize, to: usize) {
        self.forward.push((from, to));
        self.design
            .scope_mut(self.scope)
            .connect(self.blocks[from], self.blocks[to]);
    }

    fn back_edge(&mut self, from: usize, to: usize) {
        self.design
            .scope_mut(self.scope)
            .connect_loop(self.blocks[from], self.blocks[to]);
    }

    fn petgraph(&self) -> DiGraph<(), ()> {
        let mut g = DiGraph::new();
        let nodes: Vec<NodeIndex> = self.blocks.iter().map(|_| g.add_node(())).collect();
        for &(a, b) in &self.forward {
            g.add_edge(nodes[a], nodes[b], ());
        }
        g
    }

    fn scope(&self) -> &Scope {
        self.design.scope(self.scope)
    }
}

/// Forward-acyclic CFG where every block is reachable, plus natural-loop
/// back edges into dominators of their source
fn generate(seed: u64) -> Cfg {
    let mut rng = Lcg(seed);
    let n = 3 + rng.below(10);
    let mut cfg = Cfg::new(n);
    let mut seen = BTreeSet::new();
    for i in 1..n {
        let p = rng.below(i);
        seen.insert((p, i));
        cfg.edge(p, i);
        for _ in 0..rng.below(3) {
            let extra = rng.below(i);
            if seen.insert((extra, i)) {
                cfg.edge(extra, i);
            }
        }
    }

    let g = cfg.petgraph();
    let doms = simple_fast(&g, NodeIndex::new(0));
    for i in 1..n {
        if rng.below(4) != 0 {
            continue;
        }
        let chain: Vec<usize> = doms
            .dominators(NodeIndex::new(i))
            .into_iter()
            .flatten()
            .map(|d| d.index())
            .filter(|d| *d != 0)
            .collect();
        if chain.is_empty() {
            continue;
        }
        let target = chain[rng.below(chain.len())];
        cfg.back_edge(i, target);
    }
    cfg
}

fn check_against_petgraph(cfg: &Cfg) {
    let tree = DominatorTree::build(cfg.scope()).unwrap();
    let g = cfg.petgraph();
    let doms = simple_fast(&g, NodeIndex::new(0));
    for (i, b) in cfg.blocks.iter().enumerate() {
        let expected = doms
            .immediate_dominator(NodeIndex::new(i))
            .map(|d| cfg.blocks[d.index()]);
        assert_eq!(tree.idom(*b), expected, "idom of block {}", i);
    }
}

/// y is in DF(x) iff x dominates a predecessor of y but does not strictly
/// dominate y
fn check_frontier_definition(cfg: &Cfg) {
    let scope = cfg.scope();
    let tree = DominatorTree::build(scope).unwrap();
    let df = DominanceFrontier::build(scope, &tree);
    for &x in &cfg.blocks {
        for &y in &cfg.blocks {
            let expected = scope
                .block(y)
                .preds
                .iter()
                .any(|p| tree.dominates(x, *p))
                && !tree.strictly_dominates(x, y);
            assert_eq!(
                df.contains(x, y),
                expected,
                "{} in DF({})",
                scope.block(y).name(),
                scope.block(x).name()
            );
        }
    }
}

/// x dominates y iff y cannot be reached from the entry once x is removed
fn check_dominates_by_reachability(cfg: &Cfg) {
    let tree = DominatorTree::build(cfg.scope()).unwrap();
    let n = cfg.blocks.len();
    for x in 0..n {
        let mut reach = vec![false; n];
        if x != 0 {
            reach[0] = true;
            let mut stack = vec![0];
            while let Some(a) = stack.pop() {
                for &(from, to) in &cfg.forward {
                    if from == a && to != x && !reach[to] {
                        reach[to] = true;
                        stack.push(to);
                    }
                }
            }
        }
        for y in 0..n {
            let expected = y == x || !reach[y];
            assert_eq!(
                tree.dominates(cfg.blocks[x], cfg.blocks[y]),
                expected,
                "b{} dom b{}",
                x + 1,
                y + 1
            );
        }
    }
}

#[test]
fn if_else_chain() {
    // b1 -> b2 | b3; b2 -> b4 | b5; b3, b4, b5 -> b6
    let mut cfg = Cfg::new(6);
    for (a, b) in [(0, 1), (0, 2), (1, 3), (1, 4), (2, 5), (3, 5), (4, 5)] {
        cfg.edge(a, b);
    }
    check_against_petgraph(&cfg);
    check_frontier_definition(&cfg);
    let tree = DominatorTree::build(cfg.scope()).unwrap();
    assert_eq!(tree.idom(cfg.blocks[5]), Some(cfg.blocks[0]));
    assert_eq!(tree.idom(cfg.blocks[3]), Some(cfg.blocks[1]));
    assert_eq!(tree.reverse_post_order()[0], cfg.blocks[0]);
}

#[test]
fn loop_back_edges_do_not_change_idoms() {
    // b1 -> b2 -> b3 -> b4, b3 => b2 (loop), b2 -> b4
    let mut cfg = Cfg::new(4);
    cfg.edge(0, 1);
    cfg.edge(1, 2);
    cfg.edge(2, 3);
    cfg.edge(1, 3);
    cfg.back_edge(2, 1);
    check_against_petgraph(&cfg);
    check_frontier_definition(&cfg);
    let tree = DominatorTree::build(cfg.scope()).unwrap();
    let df = DominanceFrontier::build(cfg.scope(), &tree);
    assert!(df.contains(cfg.blocks[2], cfg.blocks[1]));
    assert!(df.contains(cfg.blocks[1], cfg.blocks[1]));
}

#[test]
fn generated_cfgs_match_oracles() {
    for seed in 1..=200 {
        let cfg = generate(seed);
        check_against_petgraph(&cfg);
        check_dominates_by_reachability(&cfg);
        check_frontier_definition(&cfg);
    }
}

#[test]
fn unreachable_block_is_reported() {
    let mut cfg = Cfg::new(3);
    cfg.edge(0, 1);
    assert!(matches!(
        DominatorTree::build(cfg.scope()),
        Err(IrError::UnreachableBlock { block, .. }) if block == "b3"
    ));
}

#[test]
fn scope_without_blocks_has_no_entry() {
    let mut design = Design::new();
    let scope = design.new_scope("empty", design.global(), &[ScopeTag::Function], 1);
    assert!(matches!(
        DominatorTree::build(design.scope(scope)),
        Err(IrError::MissingEntryBlock { .. })
    ));
}
