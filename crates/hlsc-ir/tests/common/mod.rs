#![allow(dead_code)]

use hlsc_ir::*;

/// Builds one function scope block by block
pub struct FnBuilder {
    pub design: Design,
    pub scope: ScopeId,
    line: u32,
}

impl FnBuilder {
    pub fn new(name: &str) -> Self {
        let mut design = Design::new();
        let scope = design.new_scope(
            name,
            design.global(),
            &[ScopeTag::Function, ScopeTag::Returnable],
            1,
        );
        Self {
            design,
            scope,
            line: 1,
        }
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

    pub fn jump(&mut self, from: BlockId, to: BlockId) {
        self.stm(
            from,
            StmKind::Jump {
                target: to,
                kind: JumpKind::Normal,
            },
        );
        self.design.scope_mut(self.scope).connect(from, to);
    }

    pub fn loop_back(&mut self, from: BlockId, to: BlockId) {
        self.stm(
            from,
            StmKind::Jump {
                target: to,
                kind: JumpKind::Loop,
            },
        );
        self.design.scope_mut(self.scope).connect_loop(from, to);
    }

    pub fn branch(&mut self, from: BlockId, cond: SymbolId, t: BlockId, f: BlockId) {
        self.stm(
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
    }

    pub fn ret(&mut self, block: BlockId, exp: Expr) {
        self.stm(block, StmKind::Ret(exp));
    }

    pub fn phis(&self, block: BlockId) -> Vec<Phi> {
        self.design
            .scope(self.scope)
            .block(block)
            .phis()
            .cloned()
            .collect()
    }

    pub fn name(&self, sym: SymbolId) -> String {
        self.design.symbol(sym).name.clone()
    }

    /// Names of the symbols read by the block's last statement
    pub fn last_uses(&self, block: BlockId) -> Vec<String> {
        self.design
            .scope(self.scope)
            .block(block)
            .last_stm()
            .map(|s| s.uses().into_iter().map(|u| self.name(u)).collect())
            .unwrap_or_default()
    }
}
