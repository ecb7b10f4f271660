//! Typed row views over the metadata tables. Each view is a thin
//! `(database, index)` pair whose column accessors decode on access using
//! the layout the database computed at parse time.

use bitflags::bitflags;
use paste::paste;

use crate::error::Result;
use crate::raw::database::{Database, TableRow};
use crate::raw::heaps::{BlobIndex, GuidIndex, StringIndex};
use crate::raw::indices::{
    CustomAttributeType, HasConstant, HasCustomAttribute, HasDeclSecurity, HasFieldMarshal,
    HasSemantics, Implementation, MemberForwarded, MemberRefParent, MethodDefOrRef, ResolutionScope,
    RowReference, TypeDefOrRef, TypeOrMethodDef,
};
use crate::raw::schema::TableKind;

bitflags! {
    /// TypeDef/ExportedType flags (ECMA-335 II.23.1.15).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct TypeAttributes: u32 {
        /// Use this mask to retrieve visibility information.
        const VISIBILITY_MASK = 0x00000007;
        const NOT_PUBLIC = 0x00000000;
        const PUBLIC = 0x00000001;
        const NESTED_PUBLIC = 0x00000002;
        const NESTED_PRIVATE = 0x00000003;
        const NESTED_FAMILY = 0x00000004;
        const NESTED_ASSEMBLY = 0x00000005;
        const NESTED_FAMILY_AND_ASSEMBLY = 0x00000006;
        const NESTED_FAMILY_OR_ASSEMBLY = 0x00000007;

        /// Use this mask to retrieve class layout information.
        const LAYOUT_MASK = 0x00000018;
        const AUTO_LAYOUT = 0x00000000;
        const SEQUENTIAL_LAYOUT = 0x00000008;
        const EXPLICIT_LAYOUT = 0x00000010;

        /// Use this mask to retrieve class semantics information.
        const CLASS_SEMANTICS_MASK = 0x00000020;
        const CLASS = 0x00000000;
        const INTERFACE = 0x00000020;

        const ABSTRACT = 0x00000080;
        const SEALED = 0x00000100;
        const SPECIAL_NAME = 0x00000400;

        const IMPORTED = 0x00001000;
        const SERIALIZABLE = 0x00002000;

        /// Use this mask to retrieve string information for native interop.
        const STRING_FORMAT_MASK = 0x00030000;
        const ANSI_CLASS = 0x00000000;
        const UNICODE_CLASS = 0x00010000;
        const AUTO_CLASS = 0x00020000;
        const CUSTOM_FORMAT_CLASS = 0x00030000;

        /// Initialize the class before first static field access.
        const BEFORE_FIELD_INIT = 0x00100000;

        /// CLI provides special behavior, depending upon the type name.
        const RT_SPECIAL_NAME = 0x00000800;
        const HAS_SECURITY = 0x00040000;
        /// This ExportedType entry is a type forwarder.
        const IS_TYPE_FORWARDER = 0x00200000;
    }
}

bitflags! {
    /// Field flags (ECMA-335 II.23.1.5).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct FieldAttributes: u16 {
        /// Use this mask to retrieve accessibility information.
        const FIELD_ACCESS_MASK = 0x0007;
        const COMPILER_CONTROLLED = 0x0000;
        const PRIVATE = 0x0001;
        const FAMILY_AND_ASSEMBLY = 0x0002;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const FAMILY_OR_ASSEMBLY = 0x0005;
        const PUBLIC = 0x0006;

        /// Defined on type, else per instance.
        const STATIC = 0x0010;
        /// Field may only be initialized, not written to after init.
        const INIT_ONLY = 0x0020;
        /// Value is a compile-time constant.
        const LITERAL = 0x0040;
        const NOT_SERIALIZED = 0x0080;
        const SPECIAL_NAME = 0x0200;

        const PINVOKE_IMPL = 0x2000;

        const RT_SPECIAL_NAME = 0x0400;
        const HAS_FIELD_MARSHAL = 0x1000;
        const HAS_DEFAULT = 0x8000;
        const HAS_FIELD_RVA = 0x0100;
    }
}

bitflags! {
    /// Method flags (ECMA-335 II.23.1.10).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct MethodAttributes: u16 {
        /// Use this mask to retrieve accessibility information.
        const MEMBER_ACCESS_MASK = 0x0007;
        const COMPILER_CONTROLLED = 0x0000;
        const PRIVATE = 0x0001;
        const FAMILY_AND_ASSEMBLY = 0x0002;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const FAMILY_OR_ASSEMBLY = 0x0005;
        const PUBLIC = 0x0006;

        /// Defined on type, else per instance.
        const STATIC = 0x0010;
        /// Method may not be overridden.
        const FINAL = 0x0020;
        const VIRTUAL = 0x0040;
        /// Method hides by name and signature, else just by name.
        const HIDE_BY_SIG = 0x0080;

        /// Use this mask to retrieve vtable layout information.
        const VTABLE_LAYOUT_MASK = 0x0100;
        const REUSE_SLOT = 0x0000;
        const NEW_SLOT = 0x0100;

        /// Method can only be overridden if also accessible.
        const STRICT = 0x0200;
        const ABSTRACT = 0x0400;
        const SPECIAL_NAME = 0x0800;

        const PINVOKE_IMPL = 0x2000;
        const UNMANAGED_EXPORT = 0x0008;

        const RT_SPECIAL_NAME = 0x1000;
        const HAS_SECURITY = 0x4000;
        const REQUIRE_SEC_OBJECT = 0x8000;
    }
}

bitflags! {
    /// Method implementation flags (ECMA-335 II.23.1.11).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct MethodImplAttributes: u16 {
        const CODE_TYPE_MASK = 0x0003;
        const IL = 0x0000;
        const NATIVE = 0x0001;
        const OPTIL = 0x0002;
        const RUNTIME = 0x0003;

        const MANAGED_MASK = 0x0004;
        const UNMANAGED = 0x0004;
        const MANAGED = 0x0000;

        const FORWARD_REF = 0x0010;
        const PRESERVE_SIG = 0x0080;
        const INTERNAL_CALL = 0x1000;
        const SYNCHRONIZED = 0x0020;
        const NO_INLINING = 0x0008;
        const NO_OPTIMIZATION = 0x0040;
    }
}

bitflags! {
    /// Param flags (ECMA-335 II.23.1.13).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct ParamAttributes: u16 {
        const IN = 0x0001;
        const OUT = 0x0002;
        const OPTIONAL = 0x0010;
        const HAS_DEFAULT = 0x1000;
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    /// Event flags (ECMA-335 II.23.1.4).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct EventAttributes: u16 {
        const SPECIAL_NAME = 0x0200;
        const RT_SPECIAL_NAME = 0x0400;
    }
}

bitflags! {
    /// Property flags (ECMA-335 II.23.1.14).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct PropertyAttributes: u16 {
        const SPECIAL_NAME = 0x0200;
        const RT_SPECIAL_NAME = 0x0400;
        const HAS_DEFAULT = 0x1000;
    }
}

bitflags! {
    /// MethodSemantics flags (ECMA-335 II.23.1.12).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct MethodSemanticsAttributes: u16 {
        const SETTER = 0x0001;
        const GETTER = 0x0002;
        const OTHER = 0x0004;
        const ADD_ON = 0x0008;
        const REMOVE_ON = 0x0010;
        const FIRE = 0x0020;
    }
}

bitflags! {
    /// PInvoke mapping flags (ECMA-335 II.23.1.8).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct PInvokeAttributes: u16 {
        const NO_MANGLE = 0x0001;

        const CHAR_SET_MASK = 0x0006;
        const CHAR_SET_NOT_SPEC = 0x0000;
        const CHAR_SET_ANSI = 0x0002;
        const CHAR_SET_UNICODE = 0x0004;
        const CHAR_SET_AUTO = 0x0006;

        const SUPPORTS_LAST_ERROR = 0x0040;

        const CALL_CONV_MASK = 0x0700;
        const CALL_CONV_PLATFORMAPI = 0x0100;
        const CALL_CONV_CDECL = 0x0200;
        const CALL_CONV_STDCALL = 0x0300;
        const CALL_CONV_THISCALL = 0x0400;
        const CALL_CONV_FASTCALL = 0x0500;
    }
}

bitflags! {
    /// Assembly flags (ECMA-335 II.23.1.2).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct AssemblyFlags: u32 {
        /// The blob holds the full (unhashed) public key.
        const PUBLIC_KEY = 0x0001;
        /// The runtime implementation need not match the compile-time
        /// version.
        const RETARGETABLE = 0x0100;

        const CONTENT_TYPE_MASK = 0x0E00;
        /// Windows Runtime metadata.
        const WINDOWS_RUNTIME = 0x0200;

        const DISABLE_JIT_COMPILE_OPTIMIZER = 0x4000;
        const ENABLE_JIT_COMPILE_TRACKING = 0x8000;
    }
}

bitflags! {
    /// File flags (ECMA-335 II.23.1.6).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct FileAttributes: u32 {
        const CONTAINS_NO_METADATA = 0x0001;
    }
}

bitflags! {
    /// ManifestResource flags (ECMA-335 II.23.1.9).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct ManifestResourceAttributes: u32 {
        const VISIBILITY_MASK = 0x0007;
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
    }
}

bitflags! {
    /// Generic parameter flags (ECMA-335 II.23.1.7).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct GenericParamAttributes: u16 {
        const VARIANCE_MASK = 0x0003;
        const NONE = 0x0000;
        const COVARIANT = 0x0001;
        const CONTRAVARIANT = 0x0002;

        const SPECIAL_CONSTRAINT_MASK = 0x001C;
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
    }
}

macro_rules! define_rows {
    (@accessor $table:ident, $field:ident, $col:expr, value) => {
        pub fn $field(&self) -> Result<u32> {
            self.db.column_value(TableKind::$table, self.index, $col)
        }
    };
    (@accessor $table:ident, $field:ident, $col:expr, string) => {
        pub fn $field(&self) -> Result<StringIndex> {
            self.db.col_string(TableKind::$table, self.index, $col)
        }
    };
    (@accessor $table:ident, $field:ident, $col:expr, blob) => {
        pub fn $field(&self) -> Result<BlobIndex> {
            self.db.col_blob(TableKind::$table, self.index, $col)
        }
    };
    (@accessor $table:ident, $field:ident, $col:expr, guid) => {
        pub fn $field(&self) -> Result<GuidIndex> {
            self.db.col_guid(TableKind::$table, self.index, $col)
        }
    };
    (@accessor $table:ident, $field:ident, $col:expr, index) => {
        pub fn $field(&self) -> Result<RowReference> {
            self.db.col_index(TableKind::$table, self.index, $col)
        }
    };
    (@accessor $table:ident, $field:ident, $col:expr, flags($ty:ty)) => {
        pub fn $field(&self) -> Result<$ty> {
            let value = self.db.column_value(TableKind::$table, self.index, $col)?;
            Ok(<$ty>::from_bits_retain(value as _))
        }
    };
    (@accessor $table:ident, $field:ident, $col:expr, coded($ty:ty)) => {
        pub fn $field(&self) -> Result<$ty> {
            <$ty>::decode(self.db.col_coded(TableKind::$table, self.index, $col)?)
        }
    };
    ($(
        $table:ident {
            $( $field:ident[$col:literal]: $kind:ident $(($ty:ty))? ),* $(,)?
        }
    )*) => { paste! {
        $(
            #[doc = concat!("Typed view over a `", stringify!($table), "` table row.")]
            #[derive(Copy, Clone)]
            pub struct [<$table Row>]<'db> {
                db: &'db Database,
                index: u32,
            }

            impl<'db> [<$table Row>]<'db> {
                pub fn reference(&self) -> RowReference {
                    RowReference::new(TableKind::$table, self.index)
                }

                $( define_rows!(@accessor $table, $field, $col, $kind $(($ty))?); )*
            }

            impl<'db> TableRow<'db> for [<$table Row>]<'db> {
                const KIND: TableKind = TableKind::$table;

                fn new(db: &'db Database, index: u32) -> Self {
                    Self { db, index }
                }

                fn database(&self) -> &'db Database {
                    self.db
                }

                fn index(&self) -> u32 {
                    self.index
                }
            }
        )*
    } };
}

define_rows! {
    Module {
        generation[0]: value,
        name[1]: string,
        mvid[2]: guid,
        enc_id[3]: guid,
        enc_base_id[4]: guid,
    }
    TypeRef {
        resolution_scope[0]: coded(ResolutionScope),
        name[1]: string,
        namespace[2]: string,
    }
    TypeDef {
        flags[0]: flags(TypeAttributes),
        name[1]: string,
        namespace[2]: string,
        extends[3]: coded(TypeDefOrRef),
        field_list[4]: index,
        method_list[5]: index,
    }
    FieldPtr {
        field[0]: index,
    }
    Field {
        flags[0]: flags(FieldAttributes),
        name[1]: string,
        signature[2]: blob,
    }
    MethodPtr {
        method[0]: index,
    }
    MethodDef {
        rva[0]: value,
        impl_flags[1]: flags(MethodImplAttributes),
        flags[2]: flags(MethodAttributes),
        name[3]: string,
        signature[4]: blob,
        param_list[5]: index,
    }
    ParamPtr {
        param[0]: index,
    }
    Param {
        flags[0]: flags(ParamAttributes),
        sequence[1]: value,
        name[2]: string,
    }
    InterfaceImpl {
        class[0]: index,
        interface[1]: coded(TypeDefOrRef),
    }
    MemberRef {
        class[0]: coded(MemberRefParent),
        name[1]: string,
        signature[2]: blob,
    }
    Constant {
        ty[0]: value,
        parent[2]: coded(HasConstant),
        value[3]: blob,
    }
    CustomAttribute {
        parent[0]: coded(HasCustomAttribute),
        ty[1]: coded(CustomAttributeType),
        value[2]: blob,
    }
    FieldMarshal {
        parent[0]: coded(HasFieldMarshal),
        native_type[1]: blob,
    }
    DeclSecurity {
        action[0]: value,
        parent[1]: coded(HasDeclSecurity),
        permission_set[2]: blob,
    }
    ClassLayout {
        packing_size[0]: value,
        class_size[1]: value,
        parent[2]: index,
    }
    FieldLayout {
        offset[0]: value,
        field[1]: index,
    }
    StandAloneSig {
        signature[0]: blob,
    }
    EventMap {
        parent[0]: index,
        event_list[1]: index,
    }
    EventPtr {
        event[0]: index,
    }
    Event {
        flags[0]: flags(EventAttributes),
        name[1]: string,
        event_type[2]: coded(TypeDefOrRef),
    }
    PropertyMap {
        parent[0]: index,
        property_list[1]: index,
    }
    PropertyPtr {
        property[0]: index,
    }
    Property {
        flags[0]: flags(PropertyAttributes),
        name[1]: string,
        signature[2]: blob,
    }
    MethodSemantics {
        flags[0]: flags(MethodSemanticsAttributes),
        method[1]: index,
        association[2]: coded(HasSemantics),
    }
    MethodImpl {
        class[0]: index,
        body[1]: coded(MethodDefOrRef),
        declaration[2]: coded(MethodDefOrRef),
    }
    ModuleRef {
        name[0]: string,
    }
    TypeSpec {
        signature[0]: blob,
    }
    ImplMap {
        flags[0]: flags(PInvokeAttributes),
        member_forwarded[1]: coded(MemberForwarded),
        import_name[2]: string,
        import_scope[3]: index,
    }
    FieldRVA {
        rva[0]: value,
        field[1]: index,
    }
    EncLog {
        token[0]: value,
        func_code[1]: value,
    }
    EncMap {
        token[0]: value,
    }
    Assembly {
        hash_algorithm[0]: value,
        major_version[1]: value,
        minor_version[2]: value,
        build_number[3]: value,
        revision_number[4]: value,
        flags[5]: flags(AssemblyFlags),
        public_key[6]: blob,
        name[7]: string,
        culture[8]: string,
    }
    AssemblyProcessor {
        processor[0]: value,
    }
    AssemblyOS {
        platform_id[0]: value,
        major_version[1]: value,
        minor_version[2]: value,
    }
    AssemblyRef {
        major_version[0]: value,
        minor_version[1]: value,
        build_number[2]: value,
        revision_number[3]: value,
        flags[4]: flags(AssemblyFlags),
        public_key_or_token[5]: blob,
        name[6]: string,
        culture[7]: string,
        hash_value[8]: blob,
    }
    AssemblyRefProcessor {
        processor[0]: value,
        assembly_ref[1]: index,
    }
    AssemblyRefOS {
        platform_id[0]: value,
        major_version[1]: value,
        minor_version[2]: value,
        assembly_ref[3]: index,
    }
    File {
        flags[0]: flags(FileAttributes),
        name[1]: string,
        hash_value[2]: blob,
    }
    ExportedType {
        flags[0]: flags(TypeAttributes),
        type_def_id[1]: value,
        name[2]: string,
        namespace[3]: string,
        implementation[4]: coded(Implementation),
    }
    ManifestResource {
        offset[0]: value,
        flags[1]: flags(ManifestResourceAttributes),
        name[2]: string,
        implementation[3]: coded(Implementation),
    }
    NestedClass {
        nested_class[0]: index,
        enclosing_class[1]: index,
    }
    GenericParam {
        number[0]: value,
        flags[1]: flags(GenericParamAttributes),
        owner[2]: coded(TypeOrMethodDef),
        name[3]: string,
    }
    MethodSpec {
        method[0]: coded(MethodDefOrRef),
        instantiation[1]: blob,
    }
    GenericParamConstraint {
        owner[0]: index,
        constraint[1]: coded(TypeDefOrRef),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::indices::CodedKind;
    use crate::testing::ImageBuilder;

    #[test]
    fn decodes_typed_columns() {
        let mut builder = ImageBuilder::new();
        let module = builder.string("mod");
        builder.row(TableKind::Module, &[0, module, 0, 0, 0]);

        let ns = builder.string("Some.Namespace");
        let name = builder.string("Widget");
        let extends = builder.coded(CodedKind::TypeDefOrRef, TableKind::TypeRef, 3);
        builder.row(
            TableKind::TypeDef,
            &[
                TypeAttributes::PUBLIC.bits() | TypeAttributes::SEALED.bits(),
                name,
                ns,
                extends,
                1,
                1,
            ],
        );
        let database = builder.build_database();

        let row: TypeDefRow = database.row(1).unwrap();
        let flags = row.flags().unwrap();
        assert!(flags.contains(TypeAttributes::SEALED));
        assert_eq!(
            flags.intersection(TypeAttributes::VISIBILITY_MASK),
            TypeAttributes::PUBLIC
        );
        assert_eq!(database.string(row.name().unwrap()).unwrap(), "Widget");
        assert_eq!(
            database.string(row.namespace().unwrap()).unwrap(),
            "Some.Namespace"
        );

        let extends = row.extends().unwrap().row();
        assert_eq!(extends.table(), TableKind::TypeRef);
        assert_eq!(extends.index(), 3);

        let fields = row.field_list().unwrap();
        assert_eq!(fields.table(), TableKind::Field);
        assert_eq!(fields.index(), 1);
    }

    #[test]
    fn null_coded_column_decodes_as_null() {
        let mut builder = ImageBuilder::new();
        let module = builder.string("mod");
        builder.row(TableKind::Module, &[0, module, 0, 0, 0]);
        let name = builder.string("T");
        builder.row(TableKind::TypeDef, &[0, name, 0, 0, 1, 1]);
        let database = builder.build_database();

        let row: TypeDefRow = database.row(1).unwrap();
        assert!(row.extends().unwrap().row().is_null());
    }
}
