//! The logical `Type` handle: attributes, inheritance, member
//! enumeration with binding filters, interfaces and generic parameters.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::raw::database::Database;
use crate::raw::indices::{CodedKind, FullReference, RowReference};
use crate::raw::rows::{TypeAttributes, TypeDefRow, TypeSpecRow};
use crate::raw::schema::TableKind;
use crate::raw::signatures::{TypeNode, TypeSignature};
use crate::structured::assembly::Assembly;
use crate::structured::attributes::{attributes_for, CustomAttributes};
use crate::structured::context::Loader;
use crate::structured::iter::FromRowHandle;
use crate::structured::members::{
    member_table, Events, Fields, GenericParams, MemberKind, Methods, Properties,
};
use crate::utilities::last_at_most_by;

bitflags! {
    /// Member selection filters for [`Type::methods`] and
    /// [`Type::fields`].
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct BindingFlags: u32 {
        /// Only members declared on the type itself.
        const DECLARED_ONLY = 0x02;
        const INSTANCE = 0x04;
        const STATIC = 0x08;
        const PUBLIC = 0x10;
        const NON_PUBLIC = 0x20;
        /// Include inherited static members.
        const FLATTEN_HIERARCHY = 0x40;
    }
}

impl BindingFlags {
    /// The filter used to locate attribute constructors.
    pub(crate) const ANY_INSTANCE: BindingFlags = BindingFlags::PUBLIC
        .union(BindingFlags::NON_PUBLIC)
        .union(BindingFlags::INSTANCE);
}

/// A type defined in a loaded assembly (a TypeDef row).
#[derive(Copy, Clone)]
pub struct Type<'l> {
    assembly: Assembly<'l>,
    row: u32,
}

impl<'l> Type<'l> {
    pub(crate) fn new(assembly: Assembly<'l>, row: u32) -> Self {
        Self { assembly, row }
    }

    pub fn assembly(&self) -> Assembly<'l> {
        self.assembly
    }

    pub fn metadata_row(&self) -> RowReference {
        RowReference::new(TableKind::TypeDef, self.row)
    }

    pub(crate) fn row_index(&self) -> u32 {
        self.row
    }

    fn type_def(&self) -> Result<TypeDefRow<'l>> {
        self.assembly.database().row(self.row)
    }

    pub fn name(&self) -> Result<&'l str> {
        let row = self.type_def()?;
        self.assembly.database().string(row.name()?)
    }

    pub fn namespace(&self) -> Result<&'l str> {
        let row = self.type_def()?;
        self.assembly.database().string(row.namespace()?)
    }

    pub fn full_name(&self) -> Result<String> {
        let namespace = self.namespace()?;
        let name = self.name()?;
        Ok(if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}.{name}")
        })
    }

    pub fn attributes(&self) -> Result<TypeAttributes> {
        self.type_def()?.flags()
    }

    pub fn is_interface(&self) -> Result<bool> {
        Ok(self
            .attributes()?
            .intersection(TypeAttributes::CLASS_SEMANTICS_MASK)
            == TypeAttributes::INTERFACE)
    }

    pub fn is_public(&self) -> Result<bool> {
        Ok(self.attributes()?.intersection(TypeAttributes::VISIBILITY_MASK)
            == TypeAttributes::PUBLIC)
    }

    pub fn is_sealed(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(TypeAttributes::SEALED))
    }

    pub fn is_abstract(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(TypeAttributes::ABSTRACT))
    }

    pub fn is_special_name(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(TypeAttributes::SPECIAL_NAME))
    }

    /// The base type, resolved across assemblies. `None` for interfaces
    /// and the root of the hierarchy. A generic-instantiation base
    /// resolves to its open definition.
    pub fn base_type(&self) -> Result<Option<Type<'l>>> {
        let extends = self.type_def()?.extends()?.row();
        if extends.is_null() {
            return Ok(None);
        }
        let loader = self.assembly.loader();
        let resolved =
            loader.resolve_type(FullReference::new(self.assembly.database(), extends))?;
        Ok(Some(type_from_reference(loader, resolved)?))
    }

    /// Methods visible through this type under `binding`. Constructors
    /// are excluded; use [`Type::constructors`].
    pub fn methods(&self, binding: BindingFlags) -> Result<Methods<'l>> {
        Ok(Methods::new(
            *self,
            member_table(*self, MemberKind::Method)?,
            binding,
            false,
        ))
    }

    pub fn constructors(&self, binding: BindingFlags) -> Result<Methods<'l>> {
        Ok(Methods::new(
            *self,
            member_table(*self, MemberKind::Method)?,
            binding,
            true,
        ))
    }

    pub fn fields(&self, binding: BindingFlags) -> Result<Fields<'l>> {
        Ok(Fields::new(
            *self,
            member_table(*self, MemberKind::Field)?,
            binding,
        ))
    }

    /// The interfaces this type directly implements, as unresolved
    /// TypeDefOrRef references paired with this assembly's database.
    pub fn interfaces(&self) -> Result<Interfaces<'l>> {
        let table = interface_table(self)?;
        Ok(Interfaces {
            database: self.assembly.database(),
            table,
            position: 0,
        })
    }

    pub fn properties(&self) -> Result<Properties<'l>> {
        Properties::for_type(*self)
    }

    pub fn events(&self) -> Result<Events<'l>> {
        Events::for_type(*self)
    }

    pub fn generic_params(&self) -> Result<GenericParams<'l>> {
        GenericParams::for_owner(self.assembly, self.metadata_row())
    }

    pub fn custom_attributes(&self) -> Result<CustomAttributes<'l>> {
        attributes_for(self.assembly, self.metadata_row())
    }
}

impl<'l> FromRowHandle<'l> for Type<'l> {
    fn from_row(assembly: Assembly<'l>, row: u32) -> Self {
        Self::new(assembly, row)
    }
}

impl PartialEq for Type<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.assembly == other.assembly && self.row == other.row
    }
}

impl Eq for Type<'_> {}

impl Debug for Type<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.full_name() {
            Ok(name) => write!(f, "Type({name})"),
            Err(_) => write!(f, "Type(TypeDef[{}])", self.row),
        }
    }
}

/// Turns a resolved reference into a `Type`. TypeSpec references are
/// followed one level into the generic definition they instantiate.
pub(crate) fn type_from_reference<'l>(
    loader: &'l Loader,
    reference: FullReference<'l>,
) -> Result<Type<'l>> {
    match reference.row().table() {
        TableKind::TypeDef => {
            let assembly = loader.assembly_for_database(reference.database())?;
            Ok(Type::new(assembly, reference.row().index()))
        }
        TableKind::TypeSpec => {
            let database = reference.database();
            let spec: TypeSpecRow = database.row_at(reference.row())?;
            let signature = TypeSignature::from_blob(database.blob(spec.signature()?)?)?;
            let definition = match signature.node()? {
                TypeNode::GenericInst { definition, .. } => definition,
                TypeNode::Class(definition) | TypeNode::ValueType(definition) => definition,
                _ => {
                    return Err(Error::unsupported(
                        "type specification does not name a class or interface".to_string(),
                    ))
                }
            };
            let resolved = loader.resolve_type(FullReference::new(database, definition))?;
            if resolved.row().table() != TableKind::TypeDef {
                return Err(Error::unsupported(
                    "type specification nests another type specification".to_string(),
                ));
            }
            let assembly = loader.assembly_for_database(resolved.database())?;
            Ok(Type::new(assembly, resolved.row().index()))
        }
        other => Err(Error::invalid_argument(format!(
            "cannot construct a type from a {other:?} reference"
        ))),
    }
}

/// The member rows a TypeDef owns: `[this.list, next.list)`, capped by
/// the member table's row count for the final TypeDef row.
pub(crate) fn member_range(
    database: &Database,
    type_row: u32,
    kind: MemberKind,
) -> Result<(u32, u32)> {
    let list = |row: TypeDefRow<'_>| match kind {
        MemberKind::Method => row.method_list(),
        MemberKind::Field => row.field_list(),
    };
    let member_count = database.row_count(match kind {
        MemberKind::Method => TableKind::MethodDef,
        MemberKind::Field => TableKind::Field,
    });

    let first = list(database.row(type_row)?)?.index();
    let last = if type_row < database.row_count(TableKind::TypeDef) {
        list(database.row(type_row + 1)?)?.index()
    } else {
        member_count + 1
    };

    if first == 0 || first > last || last > member_count + 1 {
        return Err(Error::corrupt(format!(
            "invalid member range [{first}, {last}) for TypeDef[{type_row}]"
        )));
    }
    Ok((first, last))
}

/// The TypeDef owning a MethodDef row, by binary search over the
/// method-list column.
pub(crate) fn method_owner(database: &Database, method_row: u32) -> Result<u32> {
    let owner = last_at_most_by(
        database.row_count(TableKind::TypeDef),
        method_row,
        |row| Ok(database.row::<TypeDefRow>(row)?.method_list()?.index()),
    )?
    .ok_or_else(|| {
        Error::corrupt(format!("MethodDef[{method_row}] precedes every method list"))
    })?;

    let (first, last) = member_range(database, owner, MemberKind::Method)?;
    if method_row < first || method_row >= last {
        return Err(Error::corrupt(format!(
            "MethodDef[{method_row}] belongs to no type's method range"
        )));
    }
    Ok(owner)
}

fn interface_table(ty: &Type<'_>) -> Result<Arc<[RowReference]>> {
    let context = ty.assembly().context();
    if let Some(cached) =
        context.with_caches(|caches| caches.interfaces.get(&ty.row_index()).cloned())
    {
        return Ok(cached);
    }

    let database = ty.assembly().database();
    let (first, last) = database.equal_range(TableKind::InterfaceImpl, ty.row_index())?;
    let mut interfaces = Vec::with_capacity((last - first) as usize);
    for row in first..last {
        let value = database.col_coded(TableKind::InterfaceImpl, row, 1)?;
        interfaces.push(CodedKind::TypeDefOrRef.decode(value)?);
    }

    let table: Arc<[RowReference]> = interfaces.into();
    context.with_caches(|caches| {
        caches
            .interfaces
            .entry(ty.row_index())
            .or_insert_with(|| table.clone())
            .clone()
    });
    Ok(table)
}

/// Direct interface implementations of one type.
#[derive(Clone)]
pub struct Interfaces<'l> {
    database: &'l Database,
    table: Arc<[RowReference]>,
    position: usize,
}

impl<'l> Iterator for Interfaces<'l> {
    type Item = FullReference<'l>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = *self.table.get(self.position)?;
        self.position += 1;
        Some(FullReference::new(self.database, row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.table.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Interfaces<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::context::Loader;
    use crate::testing::{assembly_image, MapResolver, TempDir};

    fn sample_image() -> Vec<u8> {
        let mut builder = assembly_image("Lib");
        let namespace = builder.string("A.B");
        let name = builder.string("C");
        builder.row(TableKind::TypeDef, &[0x1, name, namespace, 0, 1, 1]);
        let other = builder.string("D");
        builder.row(TableKind::TypeDef, &[0x1, other, namespace, 0, 1, 1]);
        builder.build()
    }

    #[test]
    fn qualified_and_split_lookups_agree() {
        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &sample_image());
        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();

        let qualified = assembly.get_type("A.B.C", false).unwrap().unwrap();
        let split = assembly.get_type_in("A.B", "C", false).unwrap().unwrap();
        assert_eq!(qualified, split);
        assert_eq!(qualified.full_name().unwrap(), "A.B.C");

        // Case-insensitive lookup also matches.
        let folded = assembly.get_type("a.b.c", true).unwrap().unwrap();
        assert_eq!(folded, qualified);
        assert!(assembly.get_type("a.b.c", false).unwrap().is_none());
        assert!(assembly.get_type("A.B.Missing", false).unwrap().is_none());
    }

    #[test]
    fn type_enumeration_skips_the_module_pseudo_type() {
        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &sample_image());
        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();

        let names: Vec<_> = assembly
            .types()
            .map(|ty| ty.name().unwrap().to_string())
            .collect();
        assert_eq!(names, ["C", "D"]);
        assert_eq!(assembly.types().len(), 2);
    }

    #[test]
    fn attribute_predicates_follow_the_flags() {
        let dir = TempDir::new();
        let mut builder = assembly_image("Lib");
        let name = builder.string("I");
        let flags = TypeAttributes::PUBLIC
            .union(TypeAttributes::INTERFACE)
            .union(TypeAttributes::ABSTRACT);
        builder.row(TableKind::TypeDef, &[flags.bits(), name, 0, 0, 1, 1]);
        let path = dir.write("Lib.dll", &builder.build());

        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();
        let ty = assembly.get_type("I", false).unwrap().unwrap();
        assert!(ty.is_interface().unwrap());
        assert!(ty.is_public().unwrap());
        assert!(ty.is_abstract().unwrap());
        assert!(!ty.is_sealed().unwrap());
        assert!(ty.base_type().unwrap().is_none());
    }

    #[test]
    fn member_ranges_partition_the_method_table() {
        // Three types with methods 1..3, 3..3 and 3..5 respectively.
        let mut builder = assembly_image("Lib");
        let signature = builder.blob(&[0x20, 0x00, 0x01]);
        let type_names: Vec<u32> = ["T0", "T1", "T2"]
            .iter()
            .map(|name| builder.string(name))
            .collect();
        let method_name = builder.string("M");
        for _ in 0..4 {
            builder.row(
                TableKind::MethodDef,
                &[0, 0, 0x0086, method_name, signature, 1],
            );
        }
        builder.row(TableKind::TypeDef, &[0x1, type_names[0], 0, 0, 1, 1]);
        builder.row(TableKind::TypeDef, &[0x1, type_names[1], 0, 0, 1, 3]);
        builder.row(TableKind::TypeDef, &[0x1, type_names[2], 0, 0, 1, 3]);
        let database = builder.build_database();

        // <Module> owns nothing; the ranges must partition [1, 5).
        let mut covered = Vec::new();
        let mut total = 0;
        for type_row in 1..=database.row_count(TableKind::TypeDef) {
            let (first, last) = member_range(&database, type_row, MemberKind::Method).unwrap();
            total += last - first;
            covered.extend(first..last);
        }
        covered.sort_unstable();
        assert_eq!(total, database.row_count(TableKind::MethodDef));
        assert_eq!(covered, [1, 2, 3, 4]);
    }

    #[test]
    fn method_owner_inverts_member_ranges() {
        let mut builder = assembly_image("Lib");
        let signature = builder.blob(&[0x20, 0x00, 0x01]);
        let name = builder.string("M");
        for _ in 0..3 {
            builder.row(TableKind::MethodDef, &[0, 0, 0x0086, name, signature, 1]);
        }
        let a = builder.string("A");
        let b = builder.string("B");
        builder.row(TableKind::TypeDef, &[0x1, a, 0, 0, 1, 1]);
        builder.row(TableKind::TypeDef, &[0x1, b, 0, 0, 1, 3]);
        let database = builder.build_database();

        assert_eq!(method_owner(&database, 1).unwrap(), 2);
        assert_eq!(method_owner(&database, 2).unwrap(), 2);
        assert_eq!(method_owner(&database, 3).unwrap(), 3);
    }

    #[test]
    fn interfaces_come_from_the_sorted_interface_impl_table() {
        let mut builder = assembly_image("Lib");
        let iface = builder.string("IOne");
        builder.row(TableKind::TypeDef, &[0x1, iface, 0, 0, 1, 1]);
        let itwo = builder.string("ITwo");
        builder.row(TableKind::TypeDef, &[0x1, itwo, 0, 0, 1, 1]);
        let class = builder.string("Impl");
        builder.row(TableKind::TypeDef, &[0x1, class, 0, 0, 1, 1]);
        // Sorted by class: rows for TypeDef 4 only.
        let one = builder.coded(CodedKind::TypeDefOrRef, TableKind::TypeDef, 2);
        let two = builder.coded(CodedKind::TypeDefOrRef, TableKind::TypeDef, 3);
        builder.row(TableKind::InterfaceImpl, &[4, one]);
        builder.row(TableKind::InterfaceImpl, &[4, two]);

        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &builder.build());
        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();

        let ty = assembly.get_type("Impl", false).unwrap().unwrap();
        let interfaces: Vec<_> = ty.interfaces().unwrap().map(|i| i.row()).collect();
        assert_eq!(
            interfaces,
            [
                RowReference::new(TableKind::TypeDef, 2),
                RowReference::new(TableKind::TypeDef, 3),
            ]
        );
        let none = assembly.get_type("IOne", false).unwrap().unwrap();
        assert_eq!(none.interfaces().unwrap().len(), 0);
    }
}
