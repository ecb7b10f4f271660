//! Static description of the 45 metadata tables: per-table column lists,
//! column kinds and declared sort keys. Widths are computed per image by
//! the database from heap-size flags and row counts.

use crate::raw::indices::CodedKind;

/// The metadata tables of ECMA-335 II.22, in table-id order.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TableKind {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0a,
    Constant = 0x0b,
    CustomAttribute = 0x0c,
    FieldMarshal = 0x0d,
    DeclSecurity = 0x0e,
    ClassLayout = 0x0f,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1a,
    TypeSpec = 0x1b,
    ImplMap = 0x1c,
    FieldRVA = 0x1d,
    EncLog = 0x1e,
    EncMap = 0x1f,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOS = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOS = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2a,
    MethodSpec = 0x2b,
    GenericParamConstraint = 0x2c,
}

impl TableKind {
    pub const COUNT: usize = 45;

    pub const fn from_id(id: usize) -> Option<TableKind> {
        use TableKind::*;
        Some(match id {
            0x00 => Module,
            0x01 => TypeRef,
            0x02 => TypeDef,
            0x03 => FieldPtr,
            0x04 => Field,
            0x05 => MethodPtr,
            0x06 => MethodDef,
            0x07 => ParamPtr,
            0x08 => Param,
            0x09 => InterfaceImpl,
            0x0a => MemberRef,
            0x0b => Constant,
            0x0c => CustomAttribute,
            0x0d => FieldMarshal,
            0x0e => DeclSecurity,
            0x0f => ClassLayout,
            0x10 => FieldLayout,
            0x11 => StandAloneSig,
            0x12 => EventMap,
            0x13 => EventPtr,
            0x14 => Event,
            0x15 => PropertyMap,
            0x16 => PropertyPtr,
            0x17 => Property,
            0x18 => MethodSemantics,
            0x19 => MethodImpl,
            0x1a => ModuleRef,
            0x1b => TypeSpec,
            0x1c => ImplMap,
            0x1d => FieldRVA,
            0x1e => EncLog,
            0x1f => EncMap,
            0x20 => Assembly,
            0x21 => AssemblyProcessor,
            0x22 => AssemblyOS,
            0x23 => AssemblyRef,
            0x24 => AssemblyRefProcessor,
            0x25 => AssemblyRefOS,
            0x26 => File,
            0x27 => ExportedType,
            0x28 => ManifestResource,
            0x29 => NestedClass,
            0x2a => GenericParam,
            0x2b => MethodSpec,
            0x2c => GenericParamConstraint,
            _ => return None,
        })
    }

    pub(crate) fn all() -> impl Iterator<Item = TableKind> {
        (0..Self::COUNT).map(|id| Self::from_id(id).unwrap())
    }
}

/// One column of a metadata table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Column {
    /// Fixed-width integer of 1, 2 or 4 bytes.
    Fixed(u8),
    /// `#Strings` heap index.
    Str,
    /// `#GUID` heap index.
    Guid,
    /// `#Blob` heap index.
    Blob,
    /// 1-based index into a single target table.
    Index(TableKind),
    /// Tagged index into one of several target tables.
    Coded(CodedKind),
}

pub(crate) struct TableSchema {
    pub columns: &'static [Column],
    /// Column the table is sorted on, for tables with a mandated order.
    pub key: Option<u8>,
}

const fn schema(columns: &'static [Column]) -> TableSchema {
    TableSchema { columns, key: None }
}

const fn sorted_schema(columns: &'static [Column], key: u8) -> TableSchema {
    TableSchema {
        columns,
        key: Some(key),
    }
}

pub(crate) const fn table_schema(kind: TableKind) -> TableSchema {
    use Column::*;
    match kind {
        TableKind::Module => schema(&[Fixed(2), Str, Guid, Guid, Guid]),
        TableKind::TypeRef => schema(&[Coded(CodedKind::ResolutionScope), Str, Str]),
        TableKind::TypeDef => schema(&[
            Fixed(4),
            Str,
            Str,
            Coded(CodedKind::TypeDefOrRef),
            Index(TableKind::Field),
            Index(TableKind::MethodDef),
        ]),
        TableKind::FieldPtr => schema(&[Index(TableKind::Field)]),
        TableKind::Field => schema(&[Fixed(2), Str, Blob]),
        TableKind::MethodPtr => schema(&[Index(TableKind::MethodDef)]),
        TableKind::MethodDef => schema(&[
            Fixed(4),
            Fixed(2),
            Fixed(2),
            Str,
            Blob,
            Index(TableKind::Param),
        ]),
        TableKind::ParamPtr => schema(&[Index(TableKind::Param)]),
        TableKind::Param => schema(&[Fixed(2), Fixed(2), Str]),
        TableKind::InterfaceImpl => {
            sorted_schema(&[Index(TableKind::TypeDef), Coded(CodedKind::TypeDefOrRef)], 0)
        }
        TableKind::MemberRef => schema(&[Coded(CodedKind::MemberRefParent), Str, Blob]),
        TableKind::Constant => {
            schema(&[Fixed(1), Fixed(1), Coded(CodedKind::HasConstant), Blob])
        }
        TableKind::CustomAttribute => sorted_schema(
            &[
                Coded(CodedKind::HasCustomAttribute),
                Coded(CodedKind::CustomAttributeType),
                Blob,
            ],
            0,
        ),
        TableKind::FieldMarshal => schema(&[Coded(CodedKind::HasFieldMarshal), Blob]),
        TableKind::DeclSecurity => {
            schema(&[Fixed(2), Coded(CodedKind::HasDeclSecurity), Blob])
        }
        TableKind::ClassLayout => {
            sorted_schema(&[Fixed(2), Fixed(4), Index(TableKind::TypeDef)], 2)
        }
        TableKind::FieldLayout => sorted_schema(&[Fixed(4), Index(TableKind::Field)], 1),
        TableKind::StandAloneSig => schema(&[Blob]),
        TableKind::EventMap => schema(&[Index(TableKind::TypeDef), Index(TableKind::Event)]),
        TableKind::EventPtr => schema(&[Index(TableKind::Event)]),
        TableKind::Event => schema(&[Fixed(2), Str, Coded(CodedKind::TypeDefOrRef)]),
        TableKind::PropertyMap => {
            schema(&[Index(TableKind::TypeDef), Index(TableKind::Property)])
        }
        TableKind::PropertyPtr => schema(&[Index(TableKind::Property)]),
        TableKind::Property => schema(&[Fixed(2), Str, Blob]),
        TableKind::MethodSemantics => sorted_schema(
            &[
                Fixed(2),
                Index(TableKind::MethodDef),
                Coded(CodedKind::HasSemantics),
            ],
            2,
        ),
        TableKind::MethodImpl => sorted_schema(
            &[
                Index(TableKind::TypeDef),
                Coded(CodedKind::MethodDefOrRef),
                Coded(CodedKind::MethodDefOrRef),
            ],
            0,
        ),
        TableKind::ModuleRef => schema(&[Str]),
        TableKind::TypeSpec => schema(&[Blob]),
        TableKind::ImplMap => schema(&[
            Fixed(2),
            Coded(CodedKind::MemberForwarded),
            Str,
            Index(TableKind::ModuleRef),
        ]),
        TableKind::FieldRVA => schema(&[Fixed(4), Index(TableKind::Field)]),
        TableKind::EncLog => schema(&[Fixed(4), Fixed(4)]),
        TableKind::EncMap => schema(&[Fixed(4)]),
        TableKind::Assembly => schema(&[
            Fixed(4),
            Fixed(2),
            Fixed(2),
            Fixed(2),
            Fixed(2),
            Fixed(4),
            Blob,
            Str,
            Str,
        ]),
        TableKind::AssemblyProcessor => schema(&[Fixed(4)]),
        TableKind::AssemblyOS => schema(&[Fixed(4), Fixed(4), Fixed(4)]),
        TableKind::AssemblyRef => schema(&[
            Fixed(2),
            Fixed(2),
            Fixed(2),
            Fixed(2),
            Fixed(4),
            Blob,
            Str,
            Str,
            Blob,
        ]),
        TableKind::AssemblyRefProcessor => {
            schema(&[Fixed(4), Index(TableKind::AssemblyRef)])
        }
        TableKind::AssemblyRefOS => schema(&[
            Fixed(4),
            Fixed(4),
            Fixed(4),
            Index(TableKind::AssemblyRef),
        ]),
        TableKind::File => schema(&[Fixed(4), Str, Blob]),
        TableKind::ExportedType => schema(&[
            Fixed(4),
            Fixed(4),
            Str,
            Str,
            Coded(CodedKind::Implementation),
        ]),
        TableKind::ManifestResource => schema(&[
            Fixed(4),
            Fixed(4),
            Str,
            Coded(CodedKind::Implementation),
        ]),
        TableKind::NestedClass => {
            sorted_schema(&[Index(TableKind::TypeDef), Index(TableKind::TypeDef)], 0)
        }
        TableKind::GenericParam => sorted_schema(
            &[
                Fixed(2),
                Fixed(2),
                Coded(CodedKind::TypeOrMethodDef),
                Str,
            ],
            2,
        ),
        TableKind::MethodSpec => schema(&[Coded(CodedKind::MethodDefOrRef), Blob]),
        TableKind::GenericParamConstraint => sorted_schema(
            &[
                Index(TableKind::GenericParam),
                Coded(CodedKind::TypeDefOrRef),
            ],
            0,
        ),
    }
}

/// Largest column count across all tables (Assembly and AssemblyRef).
pub(crate) const MAX_COLUMNS: usize = 9;
