//! The design: arenas for scopes, symbols and signals
//!
//! Scopes, symbols and signals are referenced by index handles everywhere
//! else. Symbols and signals record their owning scope; each scope keeps a
//! name table for the ones it owns, so cross-scope lookups go through an
//! explicit (scope, name) pair.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IrError, IrResult};
use crate::ir::Expr;
use crate::scope::{FunctionParam, Scope, ScopeId, ScopeTag, Worker};
use crate::signal::{Signal, SignalId, SignalTag};
use crate::symbol::{Symbol, SymbolId, SymbolTag};
use crate::types::Type;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Design {
    pub scopes: Vec<Scope>,
    pub symbols: Vec<Symbol>,
    pub signals: Vec<Signal>,
}

impl Default for Design {
    fn default() -> Self {
        Self::new()
    }
}

impl Design {
    /// Create a design holding only the global namespace scope
    pub fn new() -> Self {
        let global = Scope::new(
            ScopeId(0),
            "@top".to_string(),
            "@top".to_string(),
            None,
            [ScopeTag::Global, ScopeTag::Namespace].into_iter().collect(),
            0,
        );
        Self {
            scopes: vec![global],
            symbols: Vec::new(),
            signals: Vec::new(),
        }
    }

    pub fn global(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Create a scope under `parent`
    pub fn new_scope(
        &mut self,
        name: &str,
        parent: ScopeId,
        tags: &[ScopeTag],
        lineno: u32,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        let qualified = if self.scope(parent).is_global() {
            name.to_string()
        } else {
            format!("{}.{}", self.scope(parent).name, name)
        };
        let scope = Scope::new(
            id,
            qualified,
            name.to_string(),
            Some(parent),
            tags.iter().copied().collect(),
            lineno,
        );
        self.scopes.push(scope);
        self.scope_mut(parent).children.push(id);
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn try_scope(&self, id: ScopeId) -> IrResult<&Scope> {
        self.scopes
            .get(id.0 as usize)
            .ok_or(IrError::UnknownScope(id.0))
    }

    pub fn scope_by_name(&self, name: &str) -> Option<ScopeId> {
        self.scopes.iter().find(|s| s.name == name).map(|s| s.id)
    }

    pub fn parent_of(&self, id: ScopeId) -> Option<&Scope> {
        self.scope(id).parent.map(|p| self.scope(p))
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    /// Register a new symbol; fails if the name is taken in `scope`
    pub fn add_sym(
        &mut self,
        scope: ScopeId,
        name: &str,
        tags: &[SymbolTag],
        typ: Type,
    ) -> IrResult<SymbolId> {
        if self.scope(scope).symbols.contains_key(name) {
            return Err(IrError::SymbolAlreadyRegistered {
                scope: self.scope(scope).name.clone(),
                name: name.to_string(),
            });
        }
        Ok(self.push_symbol(scope, name, tags.iter().copied().collect(), typ, None))
    }

    /// Find `name` in `scope` or register it
    pub fn gen_sym(&mut self, scope: ScopeId, name: &str, tags: &[SymbolTag], typ: Type) -> SymbolId {
        match self.scope(scope).symbols.get(name) {
            Some(id) => *id,
            None => self.push_symbol(scope, name, tags.iter().copied().collect(), typ, None),
        }
    }

    fn push_symbol(
        &mut self,
        scope: ScopeId,
        name: &str,
        tags: BTreeSet<SymbolTag>,
        typ: Type,
        ancestor: Option<SymbolId>,
    ) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            id,
            name: name.to_string(),
            scope,
            typ,
            tags,
            ancestor,
        });
        self.scope_mut(scope).symbols.insert(name.to_string(), id);
        id
    }

    /// Look `name` up in `scope` and then its enclosing scopes
    pub fn find_sym(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id);
            if let Some(sym) = s.symbols.get(name) {
                return Some(*sym);
            }
            current = s.parent;
        }
        None
    }

    /// A symbol derived from `orig` in the same scope, named `new_name`
    ///
    /// The new symbol copies type and tags and points back to the root of
    /// `orig`'s ancestor chain.
    pub fn inherit_sym(&mut self, orig: SymbolId, new_name: &str) -> SymbolId {
        let (scope, typ, tags, root) = {
            let o = self.symbol(orig);
            (o.scope, o.typ.clone(), o.tags.clone(), o.root())
        };
        if let Some(existing) = self.scope(scope).symbols.get(new_name) {
            return *existing;
        }
        self.push_symbol(scope, new_name, tags, typ, Some(root))
    }

    /// Create a signal in `scope`, or widen and retag the existing one
    pub fn gen_sig(
        &mut self,
        scope: ScopeId,
        name: &str,
        width: u32,
        tags: &[SignalTag],
        sym: Option<SymbolId>,
    ) -> SignalId {
        if let Some(id) = self.scope(scope).signals.get(name).copied() {
            let sig = self.sig_mut(id);
            if width > 0 {
                sig.width = width;
            }
            sig.tags.extend(tags.iter().copied());
            return id;
        }
        let id = SignalId(self.signals.len() as u32);
        self.signals.push(Signal {
            id,
            name: name.to_string(),
            width,
            tags: tags.iter().copied().collect(),
            owner: scope,
            sym,
            init_value: None,
            maxsize: None,
        });
        self.scope_mut(scope).signals.insert(name.to_string(), id);
        id
    }

    pub fn signal(&self, scope: ScopeId, name: &str) -> Option<SignalId> {
        self.scope(scope).signals.get(name).copied()
    }

    pub fn sig(&self, id: SignalId) -> &Signal {
        &self.signals[id.0 as usize]
    }

    pub fn sig_mut(&mut self, id: SignalId) -> &mut Signal {
        &mut self.signals[id.0 as usize]
    }

    pub fn scope_signals(&self, scope: ScopeId) -> impl Iterator<Item = &Signal> {
        self.scope(scope).signals.values().map(move |id| self.sig(*id))
    }

    pub fn rename_sig(&mut self, scope: ScopeId, old: &str, new: &str) -> Option<SignalId> {
        let id = self.scope_mut(scope).signals.shift_remove(old)?;
        self.sig_mut(id).name = new.to_string();
        self.scope_mut(scope).signals.insert(new.to_string(), id);
        Some(id)
    }

    /// Record a call edge
    pub fn add_callee(&mut self, caller: ScopeId, callee: ScopeId) {
        self.scope_mut(caller).callee_scopes.insert(callee);
        self.scope_mut(callee).caller_scopes.insert(caller);
    }

    /// Register `worker` as a thread of `module`
    pub fn append_worker(&mut self, module: ScopeId, worker: ScopeId, args: Vec<Expr>) {
        self.scope_mut(worker).tags.insert(ScopeTag::Worker);
        self.scope_mut(module).workers.push(Worker {
            scope: worker,
            args,
        });
    }

    /// Module scope owning `scope`, if any
    pub fn enclosing_module(&self, scope: ScopeId) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if self.scope(id).is_module() {
                return Some(id);
            }
            current = self.scope(id).parent;
        }
        None
    }

    /// Scopes ordered by depth in the scope tree and call graph
    ///
    /// With `bottom_up` callees come before their callers.
    pub fn ordered_scopes(&mut self, bottom_up: bool) -> Vec<ScopeId> {
        for scope in &mut self.scopes {
            scope.order = -1;
        }
        let mut on_path = HashSet::new();
        self.set_order(self.global(), 0, &mut on_path);

        let mut ids: Vec<ScopeId> = self.scopes.iter().map(|s| s.id).collect();
        ids.sort_by_key(|id| (self.scope(*id).order, id.0));
        if bottom_up {
            ids.reverse();
        }
        ids
    }

    fn set_order(&mut self, id: ScopeId, order: i32, on_path: &mut HashSet<ScopeId>) {
        if !on_path.insert(id) {
            return;
        }
        if order > self.scope(id).order {
            self.scope_mut(id).order = order;
        }
        let next: Vec<ScopeId> = {
            let s = self.scope(id);
            s.callee_scopes
                .iter()
                .chain(s.children.iter())
                .copied()
                .collect()
        };
        for s in next {
            self.set_order(s, order + 1, on_path);
        }
        on_path.remove(&id);
    }

    /// Copy `src` into a sibling scope named `{prefix}_{name}_{postfix}`
    ///
    /// Symbols get fresh handles through an old→new map and every statement
    /// is rewritten through it. Blocks keep their indices. Signals are not
    /// copied.
    pub fn clone_scope(&mut self, src: ScopeId, prefix: &str, postfix: &str) -> ScopeId {
        let orig = self.scope(src).clone();
        let orig_name = [prefix, orig.orig_name.as_str(), postfix]
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("_");
        let parent = orig.parent.unwrap_or(self.global());
        let tags: Vec<ScopeTag> = orig.tags.iter().copied().collect();
        let id = self.new_scope(&orig_name, parent, &tags, orig.lineno);

        let mut symbol_map: HashMap<SymbolId, SymbolId> = HashMap::new();
        for (name, old) in &orig.symbols {
            let s = self.symbol(*old).clone();
            let new = self.push_symbol(id, name, s.tags, s.typ, s.ancestor);
            symbol_map.insert(*old, new);
        }
        for new in symbol_map.values().copied().collect::<Vec<_>>() {
            if let Some(anc) = self.symbol(new).ancestor {
                if let Some(mapped) = symbol_map.get(&anc) {
                    self.symbol_mut(new).ancestor = Some(*mapped);
                }
            }
        }

        let mut blocks = orig.blocks.clone();
        for block in &mut blocks {
            for stm in &mut block.stms {
                for exp in stm.exprs_mut() {
                    remap_symbols(exp, &symbol_map);
                }
            }
        }
        let params = orig
            .params
            .iter()
            .map(|p| FunctionParam {
                sym: symbol_map.get(&p.sym).copied().unwrap_or(p.sym),
                default: p.default.clone(),
            })
            .collect();

        let clone = self.scope_mut(id);
        let name = clone.name.clone();
        *clone = Scope {
            id,
            name,
            orig_name,
            parent: Some(parent),
            symbols: clone.symbols.clone(),
            signals: Default::default(),
            blocks,
            params,
            order: -1,
            ..orig.clone()
        };
        for callee in orig.callee_scopes.iter().copied() {
            self.add_callee(id, callee);
        }
        debug!("cloned scope {} as {}", orig.name, self.scope(id).name);
        id
    }
}

fn remap_symbols(exp: &mut Expr, map: &HashMap<SymbolId, SymbolId>) {
    match exp {
        Expr::Temp { sym, .. } => {
            if let Some(new) = map.get(sym) {
                *sym = *new;
            }
        }
        Expr::Attr { attr, .. } => {
            if let Some(new) = map.get(attr) {
                *attr = *new;
            }
        }
        _ => {}
    }
    for kid in exp.kids_mut() {
        remap_symbols(kid, map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::StmKind;

    #[test]
    fn add_sym_rejects_duplicates() {
        let mut design = Design::new();
        let f = design.new_scope("f", design.global(), &[ScopeTag::Function], 1);
        design.add_sym(f, "x", &[], Type::int(32)).unwrap();
        assert!(matches!(
            design.add_sym(f, "x", &[], Type::int(32)),
            Err(IrError::SymbolAlreadyRegistered { .. })
        ));
    }

    #[test]
    fn inherit_sym_points_to_root() {
        let mut design = Design::new();
        let f = design.new_scope("f", design.global(), &[ScopeTag::Function], 1);
        let x = design.add_sym(f, "x", &[SymbolTag::Induction], Type::int(8)).unwrap();
        let x1 = design.inherit_sym(x, "x#1");
        let x2 = design.inherit_sym(x1, "x#2");
        assert_eq!(design.symbol(x2).ancestor, Some(x));
        assert!(design.symbol(x2).is_induction());
        assert_eq!(design.inherit_sym(x, "x#1"), x1);
    }

    #[test]
    fn gen_sig_merges_tags() {
        let mut design = Design::new();
        let f = design.new_scope("f", design.global(), &[ScopeTag::Function], 1);
        let a = design.gen_sig(f, "a", 0, &[SignalTag::Net], None);
        let b = design.gen_sig(f, "a", 8, &[SignalTag::Int], None);
        assert_eq!(a, b);
        assert_eq!(design.sig(a).width, 8);
        assert!(design.sig(a).is_net());
        assert!(design.sig(a).has_tag(SignalTag::Int));
        assert_eq!(design.signal(f, "a"), Some(a));
    }

    #[test]
    fn callees_are_ordered_before_callers() {
        let mut design = Design::new();
        let top = design.global();
        let main = design.new_scope("main", top, &[ScopeTag::Function], 1);
        let helper = design.new_scope("helper", top, &[ScopeTag::Function], 2);
        design.add_callee(main, helper);
        let order = design.ordered_scopes(true);
        let pos = |s| order.iter().position(|x| *x == s).unwrap();
        assert!(pos(helper) < pos(main));
        assert_eq!(*order.last().unwrap(), top);
    }

    #[test]
    fn clone_scope_remaps_symbols() {
        let mut design = Design::new();
        let f = design.new_scope("f", design.global(), &[ScopeTag::Function], 1);
        let x = design.add_sym(f, "x", &[], Type::int(32)).unwrap();
        let b = design.scope_mut(f).add_block("b");
        design.scope_mut(f).append_stm(
            b,
            StmKind::Move {
                dst: Expr::store(x),
                src: Expr::int(1),
            },
            3,
        );
        let g = design.clone_scope(f, "", "copy");
        assert_eq!(design.scope(g).orig_name, "f_copy");
        let gx = design.scope(g).symbols["x"];
        assert_ne!(gx, x);
        assert_eq!(design.scope(g).blocks[0].stms[0].defs(), vec![gx]);
        assert_eq!(design.scope(f).blocks[0].stms[0].defs(), vec![x]);
    }
}
