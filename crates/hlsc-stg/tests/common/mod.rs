#![allow(dead_code)]

use hlsc_ir::*;
use hlsc_stg::*;

/// One scope under construction plus the schedule handed to the STG builder
pub struct Fixture {
    pub design: Design,
    pub scope: ScopeId,
    pub module: Option<ScopeId>,
    /// `rd` method of the port class
    pub rd: Option<(ScopeId, SymbolId)>,
    line: u32,
}

impl Fixture {
    fn with_scope(design: Design, scope: ScopeId, module: Option<ScopeId>) -> Self {
        Self {
            design,
            scope,
            module,
            rd: None,
            line: 1,
        }
    }

    /// Plain function `name` in the global scope
    pub fn function(name: &str) -> Self {
        let mut design = Design::new();
        let scope = design.new_scope(
            name,
            design.global(),
            &[ScopeTag::Function, ScopeTag::Returnable],
            1,
        );
        Self::with_scope(design, scope, None)
    }

    pub fn testbench(name: &str) -> Self {
        let mut design = Design::new();
        let scope = design.new_scope(
            name,
            design.global(),
            &[ScopeTag::Function, ScopeTag::Testbench],
            1,
        );
        Self::with_scope(design, scope, None)
    }

    /// Worker `name` of module `M`, with a port class offering `rd`
    pub fn worker(name: &str) -> Self {
        let mut design = Design::new();
        let global = design.global();
        let port = design.new_scope("Port", global, &[ScopeTag::Class, ScopeTag::Port], 1);
        let rd = design.new_scope("rd", port, &[ScopeTag::Method], 2);
        let rd_sym = design
            .add_sym(port, "rd", &[], Type::Function(rd))
            .unwrap();
        let module = design.new_scope("M", global, &[ScopeTag::Class, ScopeTag::Module], 10);
        let worker = design.new_scope(name, module, &[], 20);
        design.append_worker(module, worker, Vec::new());
        let mut fx = Self::with_scope(design, worker, Some(module));
        fx.rd = Some((rd, rd_sym));
        fx
    }

    pub fn var(&mut self, name: &str) -> SymbolId {
        self.design
            .add_sym(self.scope, name, &[], Type::int(32))
            .unwrap()
    }

    pub fn tagged(&mut self, name: &str, tag: SymbolTag) -> SymbolId {
        self.design
            .add_sym(self.scope, name, &[tag], Type::int(32))
            .unwrap()
    }

    pub fn cond(&mut self, name: &str) -> SymbolId {
        self.design
            .add_sym(self.scope, name, &[SymbolTag::Condition], Type::Bool)
            .unwrap()
    }

    /// Input port `name` of the worker's module
    pub fn input_port(&mut self, name: &str) -> SymbolId {
        let module = self.module.expect("worker fixture");
        let pt = PortType::new(PortClass::Single, Type::int(8), PortDirection::Input);
        self.design
            .add_sym(module, name, &[SymbolTag::Field], Type::Port(pt))
            .unwrap()
    }

    pub fn block(&mut self) -> BlockId {
        self.design.scope_mut(self.scope).add_block("b")
    }

    pub fn stm(&mut self, block: BlockId, kind: StmKind) -> StmId {
        self.line += 1;
        let line = self.line;
        self.design.scope_mut(self.scope).append_stm(block, kind, line)
    }

    pub fn assign(&mut self, block: BlockId, dst: SymbolId, src: Expr) -> StmId {
        self.stm(
            block,
            StmKind::Move {
                dst: Expr::store(dst),
                src,
            },
        )
    }

    pub fn jump(&mut self, from: BlockId, to: BlockId) -> StmId {
        let id = self.stm(
            from,
            StmKind::Jump {
                target: to,
                kind: JumpKind::Normal,
            },
        );
        self.design.scope_mut(self.scope).connect(from, to);
        id
    }

    pub fn loop_back(&mut self, from: BlockId, to: BlockId) -> StmId {
        let id = self.stm(
            from,
            StmKind::Jump {
                target: to,
                kind: JumpKind::Loop,
            },
        );
        self.design.scope_mut(self.scope).connect_loop(from, to);
        id
    }

    pub fn branch(&mut self, from: BlockId, cond: SymbolId, t: BlockId, f: BlockId) -> StmId {
        let id = self.stm(
            from,
            StmKind::CJump {
                exp: Expr::load(cond),
                true_target: t,
                false_target: f,
            },
        );
        let scope = self.design.scope_mut(self.scope);
        scope.connect(from, t);
        scope.connect(from, f);
        id
    }

    pub fn ret(&mut self, block: BlockId) -> StmId {
        self.stm(block, StmKind::Ret(Expr::Const(ConstValue::None)))
    }

    /// `dst = port.rd()`
    pub fn read_port(&mut self, block: BlockId, dst: SymbolId, port: SymbolId) -> StmId {
        let (rd, rd_sym) = self.rd.expect("worker fixture");
        let call = Expr::Call {
            func: Box::new(Expr::Attr {
                exp: Box::new(Expr::load(port)),
                attr: rd_sym,
                attr_scope: self.design.scope(rd).parent.unwrap(),
                ctx: Ctx::Load,
            }),
            func_scope: rd,
            args: Vec::new(),
        };
        self.assign(block, dst, call)
    }

    pub fn build(&mut self, schedule: &ScopeSchedule) -> StgResult<Vec<Stg>> {
        StgBuilder::build(
            &mut self.design,
            self.scope,
            schedule,
            &StgConfig::default(),
        )
    }

    pub fn sig(&self, name: &str) -> SignalId {
        self.design
            .signal(self.scope, name)
            .unwrap_or_else(|| panic!("no signal {}", name))
    }
}

pub fn add(a: Expr, b: Expr) -> Expr {
    Expr::binop(BinOp::Add, a, b)
}

pub fn lt(a: Expr, b: Expr) -> Expr {
    Expr::relop(RelOp::Lt, a, b)
}

pub fn node(block: BlockId, stm: StmId, begin: u32) -> ScheduledNode {
    ScheduledNode::new(block, stm, begin)
}

pub fn state_names(stg: &Stg) -> Vec<&str> {
    stg.states.iter().map(|s| s.name()).collect()
}

pub fn plain(stg: &Stg, index: usize) -> &PlainState {
    match &stg.states[index] {
        State::Plain(s) => s,
        State::Pipeline(p) => panic!("{} is a pipeline", p.name),
    }
}

pub fn pipeline(stg: &Stg) -> &PipelineState {
    stg.states[0].as_pipeline().expect("pipeline state")
}

pub fn goto(stg: usize, state: usize) -> AhdlStm {
    AhdlStm::Transition(Target::State(StateRef { stg, state }))
}
