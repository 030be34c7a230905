//! Register declarations: physical registers and register files, virtual
//! concatenations, and name aliases.

use smallvec::SmallVec;

use super::field::BitField;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    Gpr,
    Sfr,
    Vector,
}

impl RegisterKind {
    pub fn keyword(self) -> &'static str {
        match self {
            RegisterKind::Gpr => "gpr",
            RegisterKind::Sfr => "sfr",
            RegisterKind::Vector => "vec",
        }
    }
}

/// A physical register or register file. Registers with `fields` behave as
/// bit-addressable unions: the canonical storage is one integer per slot
/// and field access is a mask view over it, never shadow state.
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub kind: RegisterKind,
    pub name: String,
    pub width: u32,
    /// Register-file size; `None` means one scalar register.
    pub count: Option<u32>,
    pub element_width: Option<u32>,
    pub lanes: Option<u32>,
    pub fields: SmallVec<[BitField; 4]>,
}

impl Register {
    pub fn scalar(kind: RegisterKind, name: impl Into<String>, width: u32) -> Self {
        Self {
            kind,
            name: name.into(),
            width,
            count: None,
            element_width: None,
            lanes: None,
            fields: SmallVec::new(),
        }
    }

    pub fn file(kind: RegisterKind, name: impl Into<String>, width: u32, count: u32) -> Self {
        Self {
            count: Some(count),
            ..Self::scalar(kind, name, width)
        }
    }

    pub fn is_register_file(&self) -> bool {
        self.count.is_some()
    }

    pub fn is_vector(&self) -> bool {
        self.kind == RegisterKind::Vector
    }

    pub fn field(&self, name: &str) -> Option<&BitField> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// One component of a virtual register: a scalar register or one slot of a
/// register file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualComponent {
    pub reg_name: String,
    pub index: Option<u32>,
}

impl VirtualComponent {
    pub fn scalar(reg_name: impl Into<String>) -> Self {
        Self {
            reg_name: reg_name.into(),
            index: None,
        }
    }

    pub fn indexed(reg_name: impl Into<String>, index: u32) -> Self {
        Self {
            reg_name: reg_name.into(),
            index: Some(index),
        }
    }
}

/// A register formed purely by concatenating components; component 0 holds
/// the least-significant bits and contributes its declared width.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualRegister {
    pub name: String,
    pub width: u32,
    pub components: SmallVec<[VirtualComponent; 2]>,
}

/// Pure name/index redirection, resolved transitively at every access.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterAlias {
    pub alias_name: String,
    pub target_reg_name: String,
    pub target_index: Option<u32>,
}

impl RegisterAlias {
    pub fn new(alias: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            alias_name: alias.into(),
            target_reg_name: target.into(),
            target_index: None,
        }
    }

    pub fn indexed(alias: impl Into<String>, target: impl Into<String>, index: u32) -> Self {
        Self {
            target_index: Some(index),
            ..Self::new(alias, target)
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.target_index.is_some()
    }
}
