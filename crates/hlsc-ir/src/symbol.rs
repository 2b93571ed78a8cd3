//! Symbols: named storage locations owned by a scope

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::scope::ScopeId;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

/// Role of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SymbolTag {
    /// Compiler-generated temporary, assigned once by construction
    Temp,
    Param,
    Return,
    /// Branch condition, assigned once by construction
    Condition,
    /// Loop induction variable
    Induction,
    /// Stands for another value, realized as a net
    Alias,
    /// Names a function
    Function,
    /// Field of a class or module
    Field,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    /// Source name; SSA versions are named `{name}#{n}`
    pub name: String,
    /// Owning scope
    pub scope: ScopeId,
    pub typ: Type,
    pub tags: BTreeSet<SymbolTag>,
    /// Pre-SSA symbol this one was versioned from
    pub ancestor: Option<SymbolId>,
}

impl Symbol {
    pub fn has_tag(&self, tag: SymbolTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn is_temp(&self) -> bool {
        self.has_tag(SymbolTag::Temp)
    }

    pub fn is_param(&self) -> bool {
        self.has_tag(SymbolTag::Param)
    }

    pub fn is_return(&self) -> bool {
        self.has_tag(SymbolTag::Return)
    }

    pub fn is_condition(&self) -> bool {
        self.has_tag(SymbolTag::Condition)
    }

    pub fn is_induction(&self) -> bool {
        self.has_tag(SymbolTag::Induction)
    }

    pub fn is_alias(&self) -> bool {
        self.has_tag(SymbolTag::Alias)
    }

    pub fn is_field(&self) -> bool {
        self.has_tag(SymbolTag::Field)
    }

    /// Symbols that are single-assigned by construction never get phis or versions
    pub fn is_ssa_exempt(&self) -> bool {
        self.is_temp()
            || self.is_param()
            || self.is_condition()
            || self.has_tag(SymbolTag::Function)
            || matches!(self.typ, crate::types::Type::Function(_))
    }

    /// Name usable as an HDL identifier
    pub fn hdl_name(&self) -> String {
        self.name.replace(['#', '.', '@'], "_")
    }

    /// The original symbol this one descends from (itself if unversioned)
    pub fn root(&self) -> SymbolId {
        self.ancestor.unwrap_or(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str, tags: &[SymbolTag]) -> Symbol {
        Symbol {
            id: SymbolId(0),
            name: name.to_string(),
            scope: ScopeId(0),
            typ: Type::int(32),
            tags: tags.iter().copied().collect(),
            ancestor: None,
        }
    }

    #[test]
    fn exempt_roles() {
        assert!(sym("@t1", &[SymbolTag::Temp]).is_ssa_exempt());
        assert!(sym("a", &[SymbolTag::Param]).is_ssa_exempt());
        assert!(sym("@c", &[SymbolTag::Condition]).is_ssa_exempt());
        assert!(!sym("x", &[]).is_ssa_exempt());
        assert!(!sym("i", &[SymbolTag::Induction]).is_ssa_exempt());
    }

    #[test]
    fn hdl_name_strips_version_marker() {
        assert_eq!(sym("x#3", &[]).hdl_name(), "x_3");
        assert_eq!(sym("@t1", &[]).hdl_name(), "_t1");
    }
}
