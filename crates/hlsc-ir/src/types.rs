//! Semantic types attached to symbols
//!
//! Only the parts of the source type system that the back-end needs survive
//! here: bit widths, signedness, memory kinds and port attributes.

use serde::{Deserialize, Serialize};

use crate::scope::ScopeId;
use crate::symbol::SymbolId;

/// How a sequence (list) symbol is realized in hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemKind {
    /// Small array kept in a register file, accessed by subscript
    Register,
    /// Block RAM, accessed through multi-cycle load/store sequences
    Ram,
    /// Read-only table, accessed through a lookup function
    Rom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
    Inout,
    /// Not yet inferred from the port's use
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    None,
    Valid,
    ReadyValid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    /// Visible at the module boundary
    External,
    /// Connects workers inside one module
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortClass {
    Single,
    Queue,
}

/// Port attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortType {
    /// Single value port or FIFO
    pub class: PortClass,
    /// Type of the carried data
    pub dtype: Box<Type>,
    /// Data direction seen from the owning module
    pub direction: PortDirection,
    /// Handshake protocol
    pub protocol: Protocol,
    /// Boundary or internal port
    pub kind: PortKind,
    /// Reset value
    pub init: Option<i64>,
    /// Depth of a queue port
    pub maxsize: Option<u32>,
    /// Field symbol the port was declared as, when referenced through an alias
    pub root_sym: Option<SymbolId>,
}

impl PortType {
    pub fn new(class: PortClass, dtype: Type, direction: PortDirection) -> Self {
        Self {
            class,
            dtype: Box::new(dtype),
            direction,
            protocol: Protocol::None,
            kind: PortKind::External,
            init: None,
            maxsize: None,
            root_sym: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    None,
    Bool,
    Int {
        width: u32,
        signed: bool,
    },
    List {
        elem: Box<Type>,
        length: Option<u32>,
        mem: MemKind,
    },
    Port(PortType),
    /// Instance of a class scope
    Object(ScopeId),
    /// The class itself
    Class(ScopeId),
    Function(ScopeId),
    Namespace(ScopeId),
}

impl Type {
    pub fn int(width: u32) -> Self {
        Type::Int {
            width,
            signed: true,
        }
    }

    pub fn uint(width: u32) -> Self {
        Type::Int {
            width,
            signed: false,
        }
    }

    pub fn list(elem: Type, length: Option<u32>, mem: MemKind) -> Self {
        Type::List {
            elem: Box::new(elem),
            length,
            mem,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Int { .. } | Type::Bool)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Type::List { .. })
    }

    pub fn is_port(&self) -> bool {
        matches!(self, Type::Port(_))
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::Int { signed: true, .. })
    }

    /// Bit width of the value (element width for lists and ports)
    pub fn width(&self) -> Option<u32> {
        match self {
            Type::Bool => Some(1),
            Type::Int { width, .. } => Some(*width),
            Type::List { elem, .. } => elem.width(),
            Type::Port(p) => p.dtype.width(),
            _ => None,
        }
    }

    pub fn mem_kind(&self) -> Option<MemKind> {
        match self {
            Type::List { mem, .. } => Some(*mem),
            _ => None,
        }
    }

    pub fn list_length(&self) -> Option<u32> {
        match self {
            Type::List { length, .. } => *length,
            _ => None,
        }
    }

    pub fn as_port(&self) -> Option<&PortType> {
        match self {
            Type::Port(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_port_mut(&mut self) -> Option<&mut PortType> {
        match self {
            Type::Port(p) => Some(p),
            _ => None,
        }
    }

    /// Scope carried by object, class, function and namespace types
    pub fn scope(&self) -> Option<ScopeId> {
        match self {
            Type::Object(s) | Type::Class(s) | Type::Function(s) | Type::Namespace(s) => Some(*s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_follow_element_types() {
        assert_eq!(Type::Bool.width(), Some(1));
        assert_eq!(Type::int(12).width(), Some(12));
        let mem = Type::list(Type::uint(8), Some(4), MemKind::Ram);
        assert_eq!(mem.width(), Some(8));
        assert_eq!(mem.list_length(), Some(4));
        let port = Type::Port(PortType::new(
            PortClass::Single,
            Type::int(16),
            PortDirection::Input,
        ));
        assert_eq!(port.width(), Some(16));
        assert_eq!(Type::None.width(), None);
    }
}
