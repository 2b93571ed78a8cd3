use hlsc_ir::*;

struct ModuleFixture {
    design: Design,
    module: ScopeId,
    worker: ScopeId,
    rd: (ScopeId, SymbolId),
    wr: (ScopeId, SymbolId),
}

impl ModuleFixture {
    fn new() -> Self {
        let mut design = Design::new();
        let global = design.global();
        let port = design.new_scope("Port", global, &[ScopeTag::Class, ScopeTag::Port], 1);
        let rd = design.new_scope("rd", port, &[ScopeTag::Method], 2);
        let wr = design.new_scope("wr", port, &[ScopeTag::Method], 3);
        let rd_sym = design
            .add_sym(port, "rd", &[], Type::Function(rd))
            .unwrap();
        let wr_sym = design
            .add_sym(port, "wr", &[], Type::Function(wr))
            .unwrap();

        let module = design.new_scope("M", global, &[ScopeTag::Class, ScopeTag::Module], 10);
        design.new_scope("__init__", module, &[ScopeTag::Method, ScopeTag::Ctor], 11);
        let worker = design.new_scope("main", module, &[ScopeTag::Method], 20);
        design.append_worker(module, worker, Vec::new());
        design.scope_mut(worker).add_block("b");

        Self {
            design,
            module,
            worker,
            rd: (rd, rd_sym),
            wr: (wr, wr_sym),
        }
    }

    fn port(&mut self, name: &str, kind: PortKind) -> SymbolId {
        let mut pt = PortType::new(PortClass::Single, Type::int(8), PortDirection::Unresolved);
        pt.kind = kind;
        self.design
            .add_sym(self.module, name, &[SymbolTag::Field], Type::Port(pt))
            .unwrap()
    }

    fn call(&mut self, port: SymbolId, (scope, sym): (ScopeId, SymbolId), line: u32) {
        let exp = Expr::Call {
            func: Box::new(Expr::Attr {
                exp: Box::new(Expr::load(port)),
                attr: sym,
                attr_scope: self.design.scope(scope).parent.unwrap(),
                ctx: Ctx::Load,
            }),
            func_scope: scope,
            args: Vec::new(),
        };
        let worker = self.worker;
        let entry = self.design.scope(worker).entry.unwrap();
        self.design
            .scope_mut(worker)
            .append_stm(entry, StmKind::Expr(exp), line);
    }

    fn wait(&mut self, port: SymbolId, line: u32) {
        let worker = self.worker;
        let entry = self.design.scope(worker).entry.unwrap();
        self.design.scope_mut(worker).append_stm(
            entry,
            StmKind::Expr(Expr::syscall("wait_rising", vec![Expr::load(port)])),
            line,
        );
    }

    fn direction(&self, port: SymbolId) -> PortDirection {
        self.design.symbol(port).typ.as_port().unwrap().direction
    }
}

#[test]
fn rd_and_wr_resolve_input_and_output() {
    let mut m = ModuleFixture::new();
    let din = m.port("din", PortKind::External);
    let dout = m.port("dout", PortKind::External);
    m.call(din, m.rd, 21);
    m.call(dout, m.wr, 22);

    infer_port_directions(&mut m.design).unwrap();

    assert_eq!(m.direction(din), PortDirection::Input);
    assert_eq!(m.direction(dout), PortDirection::Output);
}

#[test]
fn direction_reaches_the_declared_port() {
    let mut m = ModuleFixture::new();
    let din = m.port("din", PortKind::External);
    let alias = m.design.inherit_sym(din, "din_alias");
    if let Some(pt) = m.design.symbol_mut(alias).typ.as_port_mut() {
        pt.root_sym = Some(din);
    }
    m.call(alias, m.rd, 21);

    infer_port_directions(&mut m.design).unwrap();

    assert_eq!(m.direction(alias), PortDirection::Input);
    assert_eq!(m.direction(din), PortDirection::Input);
}

#[test]
fn waiting_makes_an_input() {
    let mut m = ModuleFixture::new();
    let clk = m.port("clk", PortKind::External);
    m.wait(clk, 21);

    infer_port_directions(&mut m.design).unwrap();

    assert_eq!(m.direction(clk), PortDirection::Input);
}

#[test]
fn waiting_on_an_output_fails() {
    let mut m = ModuleFixture::new();
    let dout = m.port("dout", PortKind::External);
    m.call(dout, m.wr, 21);
    m.wait(dout, 22);

    let err = infer_port_directions(&mut m.design).unwrap_err();
    assert!(matches!(err, IrError::WaitOnOutputPort { ref port, .. } if port == "dout"));
    assert!(err.to_string().contains("M.main:22"));
}

#[test]
fn reading_and_writing_one_port_conflicts() {
    let mut m = ModuleFixture::new();
    let p = m.port("p", PortKind::External);
    m.call(p, m.rd, 21);
    m.call(p, m.wr, 22);

    assert!(matches!(
        infer_port_directions(&mut m.design),
        Err(IrError::PortDirectionConflict { .. })
    ));
}

#[test]
fn internal_ports_are_inout() {
    let mut m = ModuleFixture::new();
    let q = m.port("q", PortKind::Internal);
    m.call(q, m.wr, 21);
    m.call(q, m.rd, 22);

    infer_port_directions(&mut m.design).unwrap();

    assert_eq!(m.direction(q), PortDirection::Inout);
}

#[test]
fn unused_external_port_is_reported() {
    let mut m = ModuleFixture::new();
    let din = m.port("din", PortKind::External);
    m.port("spare", PortKind::External);
    m.call(din, m.rd, 21);

    assert!(matches!(
        infer_port_directions(&mut m.design),
        Err(IrError::UnusedPort { ref port, ref module }) if port == "spare" && module == "M"
    ));
}
