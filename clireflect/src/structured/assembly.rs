//! Assembly-level handles and names.

use std::fmt::{Debug, Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use uuid::Uuid;

use crate::crypto;
use crate::error::{Error, Result};
use crate::raw::database::{Database, TableRow as _};
use crate::raw::indices::RowReference;
use crate::raw::rows::{
    AssemblyFlags, AssemblyRefRow, AssemblyRow, FileAttributes, FileRow, ModuleRow,
};
use crate::raw::schema::TableKind;
use crate::structured::attributes::{attributes_for, CustomAttributes};
use crate::structured::context::{AssemblyContext, Loader};
use crate::structured::iter::{FromRowHandle, TableIter};
use crate::structured::types::Type;

/// A four-part assembly version.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

impl Version {
    pub const ZERO: Version = Version::new(0, 0, 0, 0);

    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Whether this version satisfies a requested one. A zero request
    /// (also used for retargetable references) accepts anything.
    pub fn is_compatible_with(&self, requested: &Version) -> bool {
        *requested == Self::ZERO || self >= requested
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for Version {
    type Err = Error;

    /// Accepts one to four dot-separated components; the rest default to
    /// zero.
    fn from_str(value: &str) -> Result<Self> {
        let mut components = [0u16; 4];
        let mut count = 0;
        for part in value.split('.') {
            if count == 4 {
                return Err(Error::invalid_argument(format!(
                    "version '{value}' has more than four components"
                )));
            }
            components[count] = part.trim().parse().map_err(|_| {
                Error::invalid_argument(format!("invalid version component '{part}'"))
            })?;
            count += 1;
        }
        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

/// An assembly identity: simple name, version, culture, public key token
/// and flags. Equality ignores the flags (they are not part of the
/// printed identity); names and cultures compare case-insensitively.
#[derive(Debug, Clone)]
pub struct AssemblyName {
    name: String,
    version: Version,
    culture: String,
    public_key_token: [u8; 8],
    flags: AssemblyFlags,
}

impl AssemblyName {
    pub fn new(
        name: impl Into<String>,
        version: Version,
        culture: impl Into<String>,
        public_key_token: [u8; 8],
    ) -> Self {
        Self {
            name: name.into(),
            version,
            culture: culture.into(),
            public_key_token,
            flags: AssemblyFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: AssemblyFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The identity stored in the image's `Assembly` row.
    pub fn from_assembly(database: &Database) -> Result<Self> {
        if database.row_count(TableKind::Assembly) == 0 {
            return Err(Error::not_found(
                "image has no Assembly row (module-only image)".to_string(),
            ));
        }
        let row: AssemblyRow = database.row(1)?;
        let flags = row.flags()?;
        Ok(Self {
            name: database.string(row.name()?)?.to_string(),
            version: Version::new(
                row.major_version()? as u16,
                row.minor_version()? as u16,
                row.build_number()? as u16,
                row.revision_number()? as u16,
            ),
            culture: database.string(row.culture()?)?.to_string(),
            public_key_token: public_key_token(database.blob(row.public_key()?)?, flags)?,
            flags,
        })
    }

    /// The identity a dependency edge names, from an `AssemblyRef` row.
    pub fn from_assembly_ref(row: &AssemblyRefRow<'_>) -> Result<Self> {
        let database = row.database();
        let flags = row.flags()?;
        Ok(Self {
            name: database.string(row.name()?)?.to_string(),
            version: Version::new(
                row.major_version()? as u16,
                row.minor_version()? as u16,
                row.build_number()? as u16,
                row.revision_number()? as u16,
            ),
            culture: database.string(row.culture()?)?.to_string(),
            public_key_token: public_key_token(
                database.blob(row.public_key_or_token()?)?,
                flags,
            )?,
            flags,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The culture string; empty means neutral.
    pub fn culture(&self) -> &str {
        &self.culture
    }

    pub fn public_key_token(&self) -> [u8; 8] {
        self.public_key_token
    }

    pub fn flags(&self) -> AssemblyFlags {
        self.flags
    }

    /// `"{name}, Version={v}, Culture={culture|neutral},
    /// PublicKeyToken={hex|null}"`.
    pub fn full_name(&self) -> String {
        use std::fmt::Write;

        let mut buffer = String::with_capacity(64);
        write!(buffer, "{}, Version={}", self.name, self.version).unwrap();

        buffer.push_str(", Culture=");
        if self.culture.is_empty() {
            buffer.push_str("neutral");
        } else {
            buffer.push_str(&self.culture);
        }

        buffer.push_str(", PublicKeyToken=");
        if self.public_key_token == [0; 8] {
            buffer.push_str("null");
        } else {
            for byte in self.public_key_token {
                write!(buffer, "{byte:02x}").unwrap();
            }
        }
        buffer
    }

    /// Parses a full name. Whitespace around tokens is tolerated and the
    /// `Key=Value` components may come in any order after the simple
    /// name; unknown or repeated keys are rejected.
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split(',');
        let name = parts.next().unwrap_or("").trim();
        if name.is_empty() {
            return Err(Error::invalid_argument(format!(
                "assembly name '{value}' has no simple name"
            )));
        }

        let mut version = None;
        let mut culture = None;
        let mut token = None;
        for part in parts {
            let Some((key, item)) = part.split_once('=') else {
                return Err(Error::invalid_argument(format!(
                    "expected Key=Value in assembly name component '{}'",
                    part.trim()
                )));
            };
            let (key, item) = (key.trim(), item.trim());
            let duplicate = match key {
                "Version" => version.replace(Version::from_str(item)?).is_some(),
                "Culture" => culture
                    .replace(if item.eq_ignore_ascii_case("neutral") {
                        String::new()
                    } else {
                        item.to_string()
                    })
                    .is_some(),
                "PublicKeyToken" => token.replace(parse_token(item)?).is_some(),
                _ => {
                    return Err(Error::invalid_argument(format!(
                        "unknown assembly name component '{key}'"
                    )))
                }
            };
            if duplicate {
                return Err(Error::invalid_argument(format!(
                    "repeated assembly name component '{key}'"
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            version: version.unwrap_or_default(),
            culture: culture.unwrap_or_default(),
            public_key_token: token.unwrap_or_default(),
            flags: AssemblyFlags::empty(),
        })
    }
}

impl PartialEq for AssemblyName {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.version == other.version
            && self.culture.eq_ignore_ascii_case(&other.culture)
            && self.public_key_token == other.public_key_token
    }
}

impl Eq for AssemblyName {}

impl Display for AssemblyName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_name())
    }
}

impl FromStr for AssemblyName {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

fn parse_token(value: &str) -> Result<[u8; 8]> {
    if value.eq_ignore_ascii_case("null") {
        return Ok([0; 8]);
    }
    if value.len() != 16 || !value.is_ascii() {
        return Err(Error::invalid_argument(format!(
            "public key token '{value}' is not 16 hex digits"
        )));
    }
    let mut token = [0u8; 8];
    for (position, byte) in token.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&value[position * 2..position * 2 + 2], 16).map_err(|_| {
            Error::invalid_argument(format!("public key token '{value}' is not hex"))
        })?;
    }
    Ok(token)
}

/// Derives the 8-byte token. With the `PublicKey` flag the blob is the
/// full key and the token is the last eight SHA-1 bytes in reverse
/// order; otherwise the blob is the token itself (or empty for none).
fn public_key_token(blob: &[u8], flags: AssemblyFlags) -> Result<[u8; 8]> {
    let mut token = [0u8; 8];
    if flags.contains(AssemblyFlags::PUBLIC_KEY) {
        let hash = crypto::sha1(blob);
        for (position, byte) in token.iter_mut().enumerate() {
            *byte = hash[19 - position];
        }
    } else if !blob.is_empty() {
        if blob.len() != 8 {
            return Err(Error::corrupt(format!(
                "public key token blob must hold 8 bytes, found {}",
                blob.len()
            )));
        }
        token.copy_from_slice(blob);
    }
    Ok(token)
}

/// A loaded assembly. A thin handle over the loader-owned context;
/// identity is the context, so handles from repeated loads of one path
/// compare equal.
#[derive(Copy, Clone)]
pub struct Assembly<'l> {
    loader: &'l Loader,
    context: &'l AssemblyContext,
}

impl<'l> Assembly<'l> {
    pub(crate) fn new(loader: &'l Loader, context: &'l AssemblyContext) -> Self {
        Self { loader, context }
    }

    pub fn loader(&self) -> &'l Loader {
        self.loader
    }

    pub fn context(&self) -> &'l AssemblyContext {
        self.context
    }

    pub fn database(&self) -> &'l Database {
        self.context.database()
    }

    pub fn path(&self) -> &'l Path {
        self.context.path()
    }

    pub fn name(&self) -> Result<&'l AssemblyName> {
        self.context.assembly_name()
    }

    /// The types defined in this assembly, skipping the `<Module>`
    /// pseudo-type in TypeDef row 1.
    pub fn types(&self) -> TableIter<'l, Type<'l>> {
        let end = self.database().row_count(TableKind::TypeDef) + 1;
        TableIter::new(*self, 2.min(end), end)
    }

    /// Looks up a type by namespace-qualified name (split at the last
    /// dot).
    pub fn get_type(&self, full_name: &str, ignore_case: bool) -> Result<Option<Type<'l>>> {
        let (namespace, name) = match full_name.rfind('.') {
            Some(split) => (&full_name[..split], &full_name[split + 1..]),
            None => ("", full_name),
        };
        self.get_type_in(namespace, name, ignore_case)
    }

    pub fn get_type_in(
        &self,
        namespace: &str,
        name: &str,
        ignore_case: bool,
    ) -> Result<Option<Type<'l>>> {
        let equals = |a: &str, b: &str| {
            if ignore_case {
                a.eq_ignore_ascii_case(b)
            } else {
                a == b
            }
        };
        for ty in self.types() {
            if equals(ty.name()?, name) && equals(ty.namespace()?, namespace) {
                return Ok(Some(ty));
            }
        }
        Ok(None)
    }

    /// The identities of the assemblies this one references.
    pub fn referenced_assembly_names(&self) -> ReferencedNames<'l> {
        ReferencedNames {
            database: self.database(),
            next: 1,
            end: self.database().row_count(TableKind::AssemblyRef) + 1,
        }
    }

    pub fn files(&self) -> TableIter<'l, File<'l>> {
        TableIter::new(*self, 1, self.database().row_count(TableKind::File) + 1)
    }

    pub fn get_file(&self, name: &str) -> Result<Option<File<'l>>> {
        for file in self.files() {
            if file.name()? == name {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }

    /// The manifest module.
    pub fn module(&self) -> Result<Module<'l>> {
        Ok(Module {
            assembly: *self,
            row: 1,
        })
    }

    pub fn custom_attributes(&self) -> Result<CustomAttributes<'l>> {
        if self.database().row_count(TableKind::Assembly) == 0 {
            return Ok(CustomAttributes::empty(*self));
        }
        attributes_for(*self, RowReference::new(TableKind::Assembly, 1))
    }
}

impl PartialEq for Assembly<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.context, other.context)
    }
}

impl Eq for Assembly<'_> {}

impl Debug for Assembly<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Assembly({})", self.path().display())
    }
}

/// Iterates `AssemblyRef` rows as [`AssemblyName`]s.
#[derive(Clone)]
pub struct ReferencedNames<'l> {
    database: &'l Database,
    next: u32,
    end: u32,
}

impl Iterator for ReferencedNames<'_> {
    type Item = Result<AssemblyName>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let result = self
            .database
            .row::<AssemblyRefRow>(self.next)
            .and_then(|row| AssemblyName::from_assembly_ref(&row));
        self.next += 1;
        Some(result)
    }
}

/// A row of the `File` table: a non-module file in the assembly manifest.
#[derive(Copy, Clone)]
pub struct File<'l> {
    assembly: Assembly<'l>,
    row: u32,
}

impl<'l> File<'l> {
    pub fn assembly(&self) -> Assembly<'l> {
        self.assembly
    }

    fn file(&self) -> Result<FileRow<'l>> {
        self.assembly.database().row(self.row)
    }

    pub fn name(&self) -> Result<&'l str> {
        let row = self.file()?;
        self.assembly.database().string(row.name()?)
    }

    pub fn attributes(&self) -> Result<FileAttributes> {
        self.file()?.flags()
    }

    pub fn contains_metadata(&self) -> Result<bool> {
        Ok(!self
            .attributes()?
            .contains(FileAttributes::CONTAINS_NO_METADATA))
    }

    pub fn hash_value(&self) -> Result<&'l [u8]> {
        let row = self.file()?;
        self.assembly.database().blob(row.hash_value()?)
    }

    pub fn metadata_row(&self) -> RowReference {
        RowReference::new(TableKind::File, self.row)
    }
}

impl<'l> FromRowHandle<'l> for File<'l> {
    fn from_row(assembly: Assembly<'l>, row: u32) -> Self {
        Self { assembly, row }
    }
}

/// The manifest module (`Module` table row 1).
#[derive(Copy, Clone)]
pub struct Module<'l> {
    assembly: Assembly<'l>,
    row: u32,
}

impl<'l> Module<'l> {
    pub fn assembly(&self) -> Assembly<'l> {
        self.assembly
    }

    pub fn name(&self) -> Result<&'l str> {
        let row: ModuleRow = self.assembly.database().row(self.row)?;
        self.assembly.database().string(row.name()?)
    }

    /// The module version id.
    pub fn mvid(&self) -> Result<Option<Uuid>> {
        let row: ModuleRow = self.assembly.database().row(self.row)?;
        self.assembly.database().guid(row.mvid()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::indices::CodedKind;
    use crate::testing::{assembly_image, ImageBuilder};

    #[test]
    fn assembly_row_name_formats_with_neutral_culture_and_null_token() {
        let database = assembly_image("Lib").build_database();
        let name = AssemblyName::from_assembly(&database).unwrap();
        assert_eq!(
            name.full_name(),
            "Lib, Version=1.2.3.4, Culture=neutral, PublicKeyToken=null"
        );
    }

    #[test]
    fn module_only_image_has_no_assembly_name() {
        let mut builder = ImageBuilder::new();
        let name = builder.string("m");
        builder.row(TableKind::Module, &[0, name, 0, 0, 0]);
        let database = builder.build_database();
        assert!(matches!(
            AssemblyName::from_assembly(&database),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn full_key_token_is_reversed_sha1_tail() {
        let key = b"example public key material";
        let hash = crate::crypto::sha1(key);

        let mut builder = ImageBuilder::new();
        let module = builder.string("m");
        builder.row(TableKind::Module, &[0, module, 0, 0, 0]);
        let blob = builder.blob(key);
        let name = builder.string("Signed");
        builder.row(
            TableKind::Assembly,
            &[
                0x8004,
                1,
                0,
                0,
                0,
                AssemblyFlags::PUBLIC_KEY.bits(),
                blob,
                name,
                0,
            ],
        );
        let database = builder.build_database();

        let token = AssemblyName::from_assembly(&database)
            .unwrap()
            .public_key_token();
        for position in 0..8 {
            assert_eq!(token[position], hash[19 - position]);
        }
    }

    #[test]
    fn eight_byte_blob_is_copied_verbatim() {
        let mut builder = ImageBuilder::new();
        let module = builder.string("m");
        builder.row(TableKind::Module, &[0, module, 0, 0, 0]);
        let blob = builder.blob(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let name = builder.string("Tokened");
        builder.row(TableKind::Assembly, &[0x8004, 1, 0, 0, 0, 0, blob, name, 0]);
        let database = builder.build_database();

        let name = AssemblyName::from_assembly(&database).unwrap();
        assert_eq!(name.public_key_token(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(name.full_name().ends_with("PublicKeyToken=0102030405060708"));
    }

    #[test]
    fn odd_sized_token_blob_is_corrupt() {
        let mut builder = ImageBuilder::new();
        let module = builder.string("m");
        builder.row(TableKind::Module, &[0, module, 0, 0, 0]);
        let blob = builder.blob(&[1, 2, 3]);
        let name = builder.string("Broken");
        builder.row(TableKind::Assembly, &[0x8004, 1, 0, 0, 0, 0, blob, name, 0]);
        let database = builder.build_database();
        assert!(matches!(
            AssemblyName::from_assembly(&database),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn parse_inverts_format_for_non_default_components() {
        let name = AssemblyName::new(
            "Widgets",
            Version::new(2, 5, 0, 1),
            "en-us",
            [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef],
        );
        let printed = name.full_name();
        assert_eq!(
            printed,
            "Widgets, Version=2.5.0.1, Culture=en-us, PublicKeyToken=0123456789abcdef"
        );
        assert_eq!(AssemblyName::parse(&printed).unwrap(), name);
    }

    #[test]
    fn parse_accepts_any_key_order_and_whitespace() {
        let name =
            AssemblyName::parse(" Lib ,  PublicKeyToken = null , Version = 1.2.3.4 ").unwrap();
        assert_eq!(name.name(), "Lib");
        assert_eq!(name.version(), Version::new(1, 2, 3, 4));
        assert_eq!(name.culture(), "");
        assert_eq!(name.public_key_token(), [0; 8]);

        let neutral = AssemblyName::parse("Lib, Culture=NEUTRAL").unwrap();
        assert_eq!(neutral.culture(), "");
    }

    #[test]
    fn parse_rejects_malformed_components() {
        for input in [
            "",
            " , Version=1.0.0.0",
            "Lib, Version",
            "Lib, Flavor=Chocolate",
            "Lib, Version=1.0.0.0, Version=2.0.0.0",
            "Lib, PublicKeyToken=01234",
            "Lib, Version=1.2.3.4.5",
        ] {
            assert!(
                matches!(
                    AssemblyName::parse(input),
                    Err(Error::InvalidArgument(_))
                ),
                "{input:?}"
            );
        }
    }

    #[test]
    fn version_parse_defaults_missing_components() {
        assert_eq!("1.2".parse::<Version>().unwrap(), Version::new(1, 2, 0, 0));
        assert_eq!(
            "10.20.30.40".parse::<Version>().unwrap(),
            Version::new(10, 20, 30, 40)
        );
        assert!("1.2.x".parse::<Version>().is_err());
    }

    #[test]
    fn version_compatibility_treats_zero_as_wildcard() {
        let installed = Version::new(4, 0, 1, 0);
        assert!(installed.is_compatible_with(&Version::ZERO));
        assert!(installed.is_compatible_with(&Version::new(4, 0, 0, 0)));
        assert!(!installed.is_compatible_with(&Version::new(4, 1, 0, 0)));
    }

    #[test]
    fn referenced_names_come_from_assembly_ref_rows() {
        let mut builder = assembly_image("App");
        let dep = builder.string("Dep");
        builder.row(
            TableKind::AssemblyRef,
            &[3, 1, 4, 1, 0, 0, dep, 0, 0],
        );
        let database = builder.build_database();

        let row: AssemblyRefRow = database.row(1).unwrap();
        let name = AssemblyName::from_assembly_ref(&row).unwrap();
        assert_eq!(name.name(), "Dep");
        assert_eq!(name.version(), Version::new(3, 1, 4, 1));
    }

    #[test]
    fn names_compare_case_insensitively_without_flags() {
        let a = AssemblyName::new("Lib", Version::new(1, 0, 0, 0), "", [0; 8])
            .with_flags(AssemblyFlags::RETARGETABLE);
        let b = AssemblyName::new("lib", Version::new(1, 0, 0, 0), "", [0; 8]);
        assert_eq!(a, b);

        let c = AssemblyName::new("lib", Version::new(1, 0, 0, 1), "", [0; 8]);
        assert_ne!(a, c);
    }

    #[test]
    fn module_handle_reads_name_and_mvid() {
        let dir = crate::testing::TempDir::new();
        let path = dir.write("WithGuid.dll", &assembly_image("WithGuid").build());
        let loader = crate::structured::context::Loader::new(crate::testing::MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();

        let module = assembly.module().unwrap();
        assert_eq!(module.name().unwrap(), "WithGuid");
        // assembly_image seeds the mvid with 0x11 bytes.
        let mvid = module.mvid().unwrap().unwrap();
        assert_eq!(
            mvid,
            Uuid::from_fields(0x11111111, 0x1111, 0x1111, &[0x11; 8])
        );
    }

    #[test]
    fn has_custom_attribute_probe_packs_index_above_tag() {
        let builder = assembly_image("X");
        let probe = builder.coded(CodedKind::HasCustomAttribute, TableKind::TypeDef, 2);
        assert_eq!(probe, (2 << 5) | 3);
    }
}
