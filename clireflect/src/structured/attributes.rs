//! Custom attributes: range lookup by owner over the sorted
//! `CustomAttribute` table, constructor resolution and the shallow
//! argument accessors.

use std::fmt::{Debug, Formatter};

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::raw::indices::{CodedKind, FullReference, RowReference};
use crate::raw::rows::{CustomAttributeRow, MemberRefRow};
use crate::raw::schema::TableKind;
use crate::structured::assembly::Assembly;
use crate::structured::members::Method;
use crate::structured::types::{method_owner, type_from_reference, BindingFlags, Type};
use crate::utilities::ByteReader;

/// All attributes attached to `parent`, found by binary search over the
/// `CustomAttribute` table. The comparison key is the packed
/// HasCustomAttribute integer, which orders by row index first and
/// parent table second. Ranges are cached on the assembly context.
pub(crate) fn attributes_for<'l>(
    assembly: Assembly<'l>,
    parent: RowReference,
) -> Result<CustomAttributes<'l>> {
    let context = assembly.context();
    let cached = context.with_caches(|caches| caches.attribute_ranges.get(&parent).copied());
    let (first, last) = match cached {
        Some(range) => range,
        None => {
            let probe = CodedKind::HasCustomAttribute.encode(parent)?;
            let range = assembly
                .database()
                .equal_range(TableKind::CustomAttribute, probe)?;
            context.with_caches(|caches| {
                *caches.attribute_ranges.entry(parent).or_insert(range)
            });
            range
        }
    };
    Ok(CustomAttributes {
        assembly,
        next: first,
        end: last,
    })
}

/// Attributes of one owner row; materializes [`CustomAttribute`] handles
/// (resolving each constructor) on demand.
#[derive(Clone)]
pub struct CustomAttributes<'l> {
    assembly: Assembly<'l>,
    next: u32,
    end: u32,
}

impl<'l> CustomAttributes<'l> {
    pub(crate) fn empty(assembly: Assembly<'l>) -> Self {
        Self {
            assembly,
            next: 1,
            end: 1,
        }
    }
}

impl<'l> Iterator for CustomAttributes<'l> {
    type Item = Result<CustomAttribute<'l>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let attribute = CustomAttribute::new(self.assembly, self.next);
        self.next += 1;
        Some(attribute)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next) as usize;
        (remaining, Some(remaining))
    }
}

/// One custom attribute. The constructor is resolved eagerly at
/// construction; argument access stays shallow (a single string or GUID
/// argument).
#[derive(Copy, Clone)]
pub struct CustomAttribute<'l> {
    assembly: Assembly<'l>,
    row: u32,
    constructor: Method<'l>,
}

impl<'l> CustomAttribute<'l> {
    pub(crate) fn new(assembly: Assembly<'l>, row: u32) -> Result<Self> {
        let database = assembly.database();
        let attribute: CustomAttributeRow = database.row(row)?;
        let ty = attribute.ty()?.row();

        let constructor = match ty.table() {
            // A MethodDef names the constructor directly; attribute it to
            // the TypeDef owning that method row.
            TableKind::MethodDef => {
                let owner = method_owner(database, ty.index())?;
                let declaring = Type::new(assembly, owner);
                Method::new(declaring, assembly, owner, ty.index())
            }
            // A MemberRef reaches the constructor through a TypeRef on
            // another scope; resolve the type, then find its constructor.
            TableKind::MemberRef => {
                let member: MemberRefRow = database.row_at(ty)?;
                let parent = member.class()?.row();
                if parent.table() != TableKind::TypeRef {
                    return Err(Error::unsupported(format!(
                        "custom attribute constructor through a {:?} member",
                        parent.table()
                    )));
                }
                let loader = assembly.loader();
                let resolved = loader.resolve_type(FullReference::new(database, parent))?;
                let target = type_from_reference(loader, resolved)?;
                let name = database.string(member.name()?)?;
                let mut constructors = target.constructors(BindingFlags::ANY_INSTANCE)?;
                constructors
                    .find_map(|constructor| match constructor {
                        Ok(constructor) => match constructor.name() {
                            Ok(ctor_name) if ctor_name == name => Some(Ok(constructor)),
                            Ok(_) => None,
                            Err(error) => Some(Err(error)),
                        },
                        Err(error) => Some(Err(error)),
                    })
                    .ok_or_else(|| {
                        Error::not_found(format!(
                            "no '{name}' constructor on the attribute type"
                        ))
                    })??
            }
            other => {
                return Err(Error::corrupt(format!(
                    "invalid custom attribute constructor table {other:?}"
                )))
            }
        };

        Ok(Self {
            assembly,
            row,
            constructor,
        })
    }

    /// The resolved attribute constructor.
    pub fn constructor(&self) -> Method<'l> {
        self.constructor
    }

    /// The row this attribute decorates.
    pub fn parent(&self) -> Result<RowReference> {
        let row: CustomAttributeRow = self.assembly.database().row(self.row)?;
        Ok(row.parent()?.row())
    }

    pub fn metadata_row(&self) -> RowReference {
        RowReference::new(TableKind::CustomAttribute, self.row)
    }

    fn value_reader(&self) -> Result<ByteReader<'l>> {
        let database = self.assembly.database();
        let row: CustomAttributeRow = database.row(self.row)?;
        let blob = database.blob(row.value()?)?;
        let mut reader = ByteReader::new(blob);
        reader.skip(2)?; // prolog
        Ok(reader)
    }

    /// Reads the value blob as a single string argument: prolog,
    /// compressed length, UTF-8 bytes.
    pub fn single_string_argument(&self) -> Result<String> {
        let mut reader = self.value_reader()?;
        let length = reader.compressed_u32()? as usize;
        let bytes = reader.bytes(length)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            Error::corrupt("invalid UTF-8 in custom attribute string argument".to_string())
        })
    }

    /// Reads the value blob as a single GUID argument in its native
    /// layout: little-endian u32, u16, u16, then 8 raw bytes.
    pub fn guid_argument(&self) -> Result<Uuid> {
        let mut reader = self.value_reader()?;
        let a = reader.u32()?;
        let b = reader.u16()?;
        let c = reader.u16()?;
        let mut d = [0u8; 8];
        d.copy_from_slice(reader.bytes(8)?);
        Ok(Uuid::from_fields(a, b, c, &d))
    }
}

impl Debug for CustomAttribute<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CustomAttribute(CustomAttribute[{}])", self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::context::Loader;
    use crate::testing::{assembly_image, MapResolver, TempDir};

    const CTOR_FLAGS: u32 = 0x0006 | 0x0080 | 0x0800 | 0x1000;
    const INSTANCE_SIG: &[u8] = &[0x20, 0x00, 0x01];

    /// `Attrs.FooAttribute` with a `.ctor`, a `Target` type, and three
    /// attribute rows: one on the Assembly row, two on `Target`.
    fn attributed_image() -> Vec<u8> {
        let mut builder = assembly_image("Lib");
        let instance = builder.blob(INSTANCE_SIG);
        let ctor = builder.string(".ctor");
        builder.row(TableKind::MethodDef, &[0, 0, CTOR_FLAGS, ctor, instance, 1]);

        let attrs = builder.string("Attrs");
        let foo = builder.string("FooAttribute");
        builder.row(TableKind::TypeDef, &[0x1, foo, attrs, 0, 1, 1]);
        let target = builder.string("Target");
        builder.row(TableKind::TypeDef, &[0x1, target, 0, 0, 1, 2]);

        let string_value = builder.blob(&[0x01, 0x00, 0x03, b'f', b'o', b'o', 0x00, 0x00]);
        let mut guid_value = vec![0x01, 0x00];
        guid_value.extend_from_slice(&0xA1B2C3D4u32.to_le_bytes());
        guid_value.extend_from_slice(&0xE5F6u16.to_le_bytes());
        guid_value.extend_from_slice(&0x0718u16.to_le_bytes());
        guid_value.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        guid_value.extend_from_slice(&[0x00, 0x00]);
        let guid_value = builder.blob(&guid_value);

        let constructor = builder.coded(CodedKind::CustomAttributeType, TableKind::MethodDef, 1);
        let on_assembly = builder.coded(CodedKind::HasCustomAttribute, TableKind::Assembly, 1);
        let on_target = builder.coded(CodedKind::HasCustomAttribute, TableKind::TypeDef, 3);
        assert!(on_assembly < on_target);
        builder.row(
            TableKind::CustomAttribute,
            &[on_assembly, constructor, string_value],
        );
        builder.row(
            TableKind::CustomAttribute,
            &[on_target, constructor, string_value],
        );
        builder.row(
            TableKind::CustomAttribute,
            &[on_target, constructor, guid_value],
        );
        builder.build()
    }

    #[test]
    fn range_lookup_finds_exactly_the_owner_rows() {
        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &attributed_image());
        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();

        let target = assembly.get_type("Target", false).unwrap().unwrap();
        let attributes: Vec<_> = target
            .custom_attributes()
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(attributes.len(), 2);
        for attribute in &attributes {
            assert_eq!(
                attribute.parent().unwrap(),
                RowReference::new(TableKind::TypeDef, 3)
            );
        }

        let on_assembly: Vec<_> = assembly
            .custom_attributes()
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(on_assembly.len(), 1);

        // A row with no attributes yields an empty range.
        let foo = assembly.get_type("Attrs.FooAttribute", false).unwrap().unwrap();
        assert_eq!(foo.custom_attributes().unwrap().count(), 0);
    }

    #[test]
    fn method_def_constructors_resolve_to_their_owner_type() {
        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &attributed_image());
        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();

        let target = assembly.get_type("Target", false).unwrap().unwrap();
        let attribute = target.custom_attributes().unwrap().next().unwrap().unwrap();
        let constructor = attribute.constructor();
        assert!(constructor.is_constructor().unwrap());
        assert_eq!(
            constructor.declaring_type().full_name().unwrap(),
            "Attrs.FooAttribute"
        );
    }

    #[test]
    fn shallow_string_argument() {
        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &attributed_image());
        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();

        let target = assembly.get_type("Target", false).unwrap().unwrap();
        let attribute = target.custom_attributes().unwrap().next().unwrap().unwrap();
        assert_eq!(attribute.single_string_argument().unwrap(), "foo");
    }

    #[test]
    fn shallow_guid_argument() {
        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &attributed_image());
        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();

        let target = assembly.get_type("Target", false).unwrap().unwrap();
        let attribute = target
            .custom_attributes()
            .unwrap()
            .nth(1)
            .unwrap()
            .unwrap();
        assert_eq!(
            attribute.guid_argument().unwrap(),
            Uuid::from_fields(0xA1B2C3D4, 0xE5F6, 0x0718, &[1, 2, 3, 4, 5, 6, 7, 8])
        );
    }

    #[test]
    fn truncated_value_blobs_are_corrupt() {
        let mut builder = assembly_image("Lib");
        let instance = builder.blob(INSTANCE_SIG);
        let ctor = builder.string(".ctor");
        builder.row(TableKind::MethodDef, &[0, 0, CTOR_FLAGS, ctor, instance, 1]);
        let foo = builder.string("Foo");
        builder.row(TableKind::TypeDef, &[0x1, foo, 0, 0, 1, 1]);
        let short = builder.blob(&[0x01]);
        let constructor = builder.coded(CodedKind::CustomAttributeType, TableKind::MethodDef, 1);
        let parent = builder.coded(CodedKind::HasCustomAttribute, TableKind::TypeDef, 2);
        builder.row(TableKind::CustomAttribute, &[parent, constructor, short]);

        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &builder.build());
        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();
        let foo = assembly.get_type("Foo", false).unwrap().unwrap();
        let attribute = foo.custom_attributes().unwrap().next().unwrap().unwrap();
        assert!(matches!(
            attribute.single_string_argument(),
            Err(Error::Corrupt(_))
        ));
        assert!(matches!(attribute.guid_argument(), Err(Error::Corrupt(_))));
    }

    #[test]
    fn member_ref_constructors_resolve_across_assemblies() {
        // The attribute type lives in AttrLib; the consumer references
        // its constructor through a MemberRef over a TypeRef.
        let mut dep = assembly_image("AttrLib");
        let instance = dep.blob(INSTANCE_SIG);
        let ctor = dep.string(".ctor");
        dep.row(TableKind::MethodDef, &[0, 0, CTOR_FLAGS, ctor, instance, 1]);
        let attrs = dep.string("Attrs");
        let foo = dep.string("FooAttribute");
        dep.row(TableKind::TypeDef, &[0x1, foo, attrs, 0, 1, 1]);

        let mut app = assembly_image("Consumer");
        let dep_name = app.string("AttrLib");
        app.row(TableKind::AssemblyRef, &[1, 2, 3, 4, 0, 0, dep_name, 0, 0]);
        let scope = app.coded(CodedKind::ResolutionScope, TableKind::AssemblyRef, 1);
        let attrs = app.string("Attrs");
        let foo = app.string("FooAttribute");
        app.row(TableKind::TypeRef, &[scope, foo, attrs]);
        let instance = app.blob(INSTANCE_SIG);
        let ctor = app.string(".ctor");
        let class = app.coded(CodedKind::MemberRefParent, TableKind::TypeRef, 1);
        app.row(TableKind::MemberRef, &[class, ctor, instance]);

        let target = app.string("Target");
        app.row(TableKind::TypeDef, &[0x1, target, 0, 0, 1, 1]);
        let value = app.blob(&[0x01, 0x00, 0x03, b'b', b'a', b'r', 0x00, 0x00]);
        let constructor = app.coded(CodedKind::CustomAttributeType, TableKind::MemberRef, 1);
        let parent = app.coded(CodedKind::HasCustomAttribute, TableKind::TypeDef, 2);
        app.row(TableKind::CustomAttribute, &[parent, constructor, value]);

        let dir = TempDir::new();
        let app_path = dir.write("Consumer.dll", &app.build());
        let dep_path = dir.write("AttrLib.dll", &dep.build());
        let mut resolver = MapResolver::default();
        resolver.insert("AttrLib", dep_path.clone());
        let loader = Loader::new(resolver);
        let assembly = loader.load_assembly_path(&app_path).unwrap();

        let target = assembly.get_type("Target", false).unwrap().unwrap();
        let attribute = target.custom_attributes().unwrap().next().unwrap().unwrap();
        assert_eq!(attribute.single_string_argument().unwrap(), "bar");

        let constructor = attribute.constructor();
        assert!(constructor.is_constructor().unwrap());
        assert_eq!(
            constructor.declaring_type().full_name().unwrap(),
            "Attrs.FooAttribute"
        );
        assert_eq!(
            constructor.declaring_type().assembly().path(),
            dep_path.as_path()
        );
    }
}
