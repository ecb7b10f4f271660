use std::fmt::{Debug, Display, Formatter};

use crate::error::{Error, Result};
use crate::raw::database::Database;
use crate::raw::schema::TableKind;

/// A (table, 1-based row index) pair. Index 0 is the null sentinel used by
/// coded indices and owner-list terminators.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RowReference {
    table: TableKind,
    index: u32,
}

impl RowReference {
    pub fn new(table: TableKind, index: u32) -> Self {
        Self { table, index }
    }

    pub fn null(table: TableKind) -> Self {
        Self { table, index: 0 }
    }

    #[inline]
    pub fn table(&self) -> TableKind {
        self.table
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.index == 0
    }
}

impl Debug for RowReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.table, self.index)
    }
}

impl Display for RowReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.table, self.index)
    }
}

/// A row identified across assemblies: a database plus a row reference.
/// Equality is database identity first, then row reference.
#[derive(Copy, Clone)]
pub struct FullReference<'l> {
    database: &'l Database,
    row: RowReference,
}

impl<'l> FullReference<'l> {
    pub fn new(database: &'l Database, row: RowReference) -> Self {
        Self { database, row }
    }

    #[inline]
    pub fn database(&self) -> &'l Database {
        self.database
    }

    #[inline]
    pub fn row(&self) -> RowReference {
        self.row
    }
}

impl PartialEq for FullReference<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.database, other.database) && self.row == other.row
    }
}

impl Eq for FullReference<'_> {}

impl Debug for FullReference<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} in {:p}",
            self.row, self.database as *const Database
        )
    }
}

macro_rules! coded_target {
    (Reserved) => {
        None
    };
    ($table:ident) => {
        Some(TableKind::$table)
    };
}

macro_rules! define_coded_index {
    ($($id:ident = $bits:literal: [$($target:ident),* $(,)?]),* $(,)?) => {
        /// The coded-index schemes of ECMA-335 II.24.2.6. Each packs a tag
        /// selecting a target table with a row index:
        /// `value = (index << tag_bits) | tag`.
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
        pub enum CodedKind {
            $($id),*
        }

        impl CodedKind {
            pub(crate) const fn tag_bits(self) -> u32 {
                match self {
                    $(Self::$id => $bits),*
                }
            }

            pub(crate) const fn targets(self) -> &'static [Option<TableKind>] {
                match self {
                    $(Self::$id => &[$(coded_target!($target)),*]),*
                }
            }
        }

        $(
            #[doc = concat!("Decoded `", stringify!($id), "` coded index.")]
            #[repr(transparent)]
            #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
            pub struct $id(pub RowReference);

            impl $id {
                pub(crate) fn decode(value: u32) -> Result<Self> {
                    CodedKind::$id.decode(value).map(Self)
                }

                #[inline]
                pub fn row(self) -> RowReference {
                    self.0
                }
            }

            impl From<$id> for RowReference {
                #[inline]
                fn from(value: $id) -> RowReference {
                    value.0
                }
            }
        )*
    };
}

define_coded_index! {
    TypeDefOrRef = 2: [TypeDef, TypeRef, TypeSpec],
    HasConstant = 2: [Field, Param, Property],
    HasCustomAttribute = 5: [
        MethodDef, Field, TypeRef, TypeDef, Param, InterfaceImpl, MemberRef,
        Module, DeclSecurity, Property, Event, StandAloneSig, ModuleRef,
        TypeSpec, Assembly, AssemblyRef, File, ExportedType,
        ManifestResource, GenericParam, GenericParamConstraint, MethodSpec,
    ],
    HasFieldMarshal = 1: [Field, Param],
    HasDeclSecurity = 2: [TypeDef, MethodDef, Assembly],
    MemberRefParent = 3: [TypeDef, TypeRef, ModuleRef, MethodDef, TypeSpec],
    HasSemantics = 1: [Event, Property],
    MethodDefOrRef = 1: [MethodDef, MemberRef],
    MemberForwarded = 1: [Field, MethodDef],
    Implementation = 2: [File, AssemblyRef, ExportedType],
    CustomAttributeType = 3: [Reserved, Reserved, MethodDef, MemberRef],
    ResolutionScope = 2: [Module, ModuleRef, AssemblyRef, TypeRef],
    TypeOrMethodDef = 1: [TypeDef, MethodDef],
}

impl CodedKind {
    /// Column width: two bytes unless some target table's row count does
    /// not fit in `16 - tag_bits` bits.
    pub(crate) fn width(self, row_counts: &[u32; TableKind::COUNT]) -> u8 {
        let mut max = 0;
        for target in self.targets() {
            if let Some(table) = target {
                max = max.max(row_counts[*table as usize]);
            }
        }
        if max < 1u32 << (16 - self.tag_bits()) {
            2
        } else {
            4
        }
    }

    pub(crate) fn decode(self, value: u32) -> Result<RowReference> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let index = value >> bits;
        match self.targets().get(tag).copied().flatten() {
            Some(table) => Ok(RowReference::new(table, index)),
            None => Err(Error::corrupt(format!(
                "invalid {self:?} coded index: tag {tag} (value {value:#x})"
            ))),
        }
    }

    pub(crate) fn encode(self, row: RowReference) -> Result<u32> {
        let target = Some(row.table());
        match self.targets().iter().position(|t| *t == target) {
            Some(tag) => Ok((row.index() << self.tag_bits()) | tag as u32),
            None => Err(Error::invalid_argument(format!(
                "{:?} is not a valid {self:?} target",
                row.table()
            ))),
        }
    }
}
