//! Port direction inference
//!
//! Ports declared without a direction get one from how the module's
//! constructor and workers use them: `wr` makes an output, `rd` an input,
//! and waiting on a port makes it an input. Internal ports connect workers
//! of the same module and become `Inout`.

use tracing::debug;

use crate::design::Design;
use crate::error::{IrError, IrResult, SourceLoc};
use crate::ir::Expr;
use crate::scope::ScopeId;
use crate::symbol::SymbolId;
use crate::types::{PortDirection, PortKind};

const WAIT_SYSCALLS: [&str; 4] = ["wait_rising", "wait_falling", "wait_edge", "wait_value"];

/// Infer directions of every module's ports
pub fn infer_port_directions(design: &mut Design) -> IrResult<()> {
    let modules: Vec<ScopeId> = design
        .scopes
        .iter()
        .filter(|s| s.is_module())
        .map(|s| s.id)
        .collect();
    for module in modules {
        PortDirectionInference {
            design: &mut *design,
            module,
        }
        .run()?;
    }
    Ok(())
}

struct PortDirectionInference<'a> {
    design: &'a mut Design,
    module: ScopeId,
}

enum PortUse {
    Method(SymbolId, String),
    Wait(SymbolId),
}

impl PortDirectionInference<'_> {
    fn run(&mut self) -> IrResult<()> {
        let mut scopes: Vec<ScopeId> = self
            .design
            .scope(self.module)
            .children
            .iter()
            .copied()
            .filter(|c| self.design.scope(*c).is_ctor())
            .collect();
        scopes.extend(self.design.scope(self.module).workers.iter().map(|w| w.scope));

        for scope in scopes {
            let mut uses = Vec::new();
            for (_, stm) in self.design.scope(scope).all_stms() {
                for exp in stm.exprs() {
                    self.collect_port_uses(exp, stm.lineno, &mut uses);
                }
            }
            for (port_use, lineno) in uses {
                let loc = SourceLoc::new(self.design.scope(scope).name.clone(), lineno);
                match port_use {
                    PortUse::Method(port, method) => {
                        let dir = match method.as_str() {
                            "wr" => PortDirection::Output,
                            "rd" => PortDirection::Input,
                            _ => continue,
                        };
                        self.set_direction(port, dir, loc)?;
                    }
                    PortUse::Wait(port) => self.wait_on(port, loc)?,
                }
            }
        }
        self.check_unused()
    }

    fn collect_port_uses(&self, exp: &Expr, lineno: u32, out: &mut Vec<(PortUse, u32)>) {
        match exp {
            Expr::Call {
                func, func_scope, ..
            } => {
                let callee = self.design.scope(*func_scope);
                let is_port_method = callee.is_method()
                    && self
                        .design
                        .parent_of(*func_scope)
                        .is_some_and(|p| p.is_port());
                if is_port_method {
                    if let Expr::Attr { exp: receiver, .. } = func.as_ref() {
                        if let Some(port) = receiver.symbol() {
                            out.push((PortUse::Method(port, callee.orig_name.clone()), lineno));
                        }
                    }
                }
            }
            Expr::SysCall { name, args } if WAIT_SYSCALLS.contains(&name.as_str()) => {
                for (_, arg) in args {
                    if let Some(sym) = arg.symbol() {
                        if self.design.symbol(sym).typ.is_port() {
                            out.push((PortUse::Wait(sym), lineno));
                        }
                    }
                }
            }
            _ => {}
        }
        for kid in exp.kids() {
            self.collect_port_uses(kid, lineno, out);
        }
    }

    /// Port symbols that carry the direction: the symbol itself and its root
    fn port_symbols(&self, port: SymbolId) -> Vec<SymbolId> {
        let mut syms = vec![port];
        if let Some(root) = self
            .design
            .symbol(port)
            .typ
            .as_port()
            .and_then(|p| p.root_sym)
        {
            if root != port {
                syms.push(root);
            }
        }
        syms
    }

    fn set_direction(&mut self, port: SymbolId, dir: PortDirection, loc: SourceLoc) -> IrResult<()> {
        for sym in self.port_symbols(port) {
            let name = self.design.symbol(sym).name.clone();
            let Some(pt) = self.design.symbol_mut(sym).typ.as_port_mut() else {
                continue;
            };
            if pt.kind == PortKind::Internal {
                pt.direction = PortDirection::Inout;
                continue;
            }
            match pt.direction {
                PortDirection::Unresolved => {
                    debug!("port {} inferred as {:?}", name, dir);
                    pt.direction = dir;
                }
                current if current == dir || current == PortDirection::Inout => {}
                _ => {
                    return Err(IrError::PortDirectionConflict {
                        port: name,
                        loc: loc.clone(),
                    })
                }
            }
        }
        Ok(())
    }

    fn wait_on(&mut self, port: SymbolId, loc: SourceLoc) -> IrResult<()> {
        for sym in self.port_symbols(port) {
            let name = self.design.symbol(sym).name.clone();
            let Some(pt) = self.design.symbol_mut(sym).typ.as_port_mut() else {
                continue;
            };
            match pt.direction {
                PortDirection::Output if pt.kind == PortKind::External => {
                    return Err(IrError::WaitOnOutputPort {
                        port: name,
                        loc: loc.clone(),
                    })
                }
                PortDirection::Unresolved => pt.direction = PortDirection::Input,
                _ => {}
            }
        }
        Ok(())
    }

    fn check_unused(&self) -> IrResult<()> {
        let module = self.design.scope(self.module);
        for sym in module.symbols.values() {
            let s = self.design.symbol(*sym);
            if let Some(pt) = s.typ.as_port() {
                if pt.kind == PortKind::External && pt.direction == PortDirection::Unresolved {
                    return Err(IrError::UnusedPort {
                        port: s.name.clone(),
                        module: module.orig_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
