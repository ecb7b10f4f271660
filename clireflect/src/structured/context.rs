//! The loader: owner of every loaded assembly, identity anchor for all
//! logical handles, and the engine behind cross-assembly type resolution.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use derivative::Derivative;
use fxhash::FxHashMap;

use crate::error::{Error, Result};
use crate::raw::database::Database;
use crate::raw::indices::{FullReference, RowReference};
use crate::raw::rows::{AssemblyRefRow, NestedClassRow, TypeDefRow, TypeRefRow};
use crate::raw::schema::TableKind;
use crate::structured::assembly::{Assembly, AssemblyName};
use crate::structured::resolver::{AssemblyResolver, DirectoryResolver};

/// Loads assemblies by path or name and owns them until dropped. All
/// logical handles borrow from the loader; loading the same path twice
/// yields handles to the same context.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Loader {
    #[derivative(Debug = "ignore")]
    resolver: Box<dyn AssemblyResolver>,
    #[derivative(Debug(format_with = "fmt_loaded_paths"))]
    state: Mutex<LoaderState>,
}

#[derive(Default)]
struct LoaderState {
    by_path: FxHashMap<PathBuf, usize>,
    contexts: Vec<Box<AssemblyContext>>,
}

fn fmt_loaded_paths(
    state: &Mutex<LoaderState>,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    let mut list = f.debug_list();
    if let Ok(state) = state.try_lock() {
        for context in &state.contexts {
            list.entry(&context.path().display());
        }
    }
    list.finish()
}

impl Loader {
    pub fn new(resolver: impl AssemblyResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            state: Mutex::new(LoaderState::default()),
        }
    }

    /// A loader with the default directory-probing resolver.
    pub fn with_search_directories<T: AsRef<Path>>(
        directories: impl IntoIterator<Item = T>,
    ) -> Self {
        Self::new(DirectoryResolver::new(directories))
    }

    pub fn resolver(&self) -> &dyn AssemblyResolver {
        &*self.resolver
    }

    fn state(&self) -> MutexGuard<'_, LoaderState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn context_at_slot(&self, slot: usize) -> &AssemblyContext {
        let state = self.state();
        let context: &AssemblyContext = &state.contexts[slot];
        // Contexts are boxed and the vector is append-only while the
        // loader is alive, so the pointee outlives the lock guard.
        unsafe { &*(context as *const AssemblyContext) }
    }

    pub(crate) fn assembly_at(&self, slot: usize) -> Assembly<'_> {
        Assembly::new(self, self.context_at_slot(slot))
    }

    /// Loads the assembly at `path`, or returns the existing handle when
    /// that path was already loaded.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn load_assembly_path(&self, path: impl AsRef<Path>) -> Result<Assembly<'_>> {
        let path = path.as_ref();
        let existing = self.state().by_path.get(path).copied();
        if let Some(slot) = existing {
            return Ok(self.assembly_at(slot));
        }

        // Parse outside the lock; a racing load of the same path keeps
        // the first inserted context.
        let database = Database::from_path(path)?;
        let slot = {
            let mut state = self.state();
            match state.by_path.get(path) {
                Some(&slot) => slot,
                None => {
                    let slot = state.contexts.len();
                    state
                        .contexts
                        .push(Box::new(AssemblyContext::new(path.to_path_buf(), database)));
                    state.by_path.insert(path.to_path_buf(), slot);
                    slot
                }
            }
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), "loaded assembly");
        Ok(self.assembly_at(slot))
    }

    /// Resolves `name` through the configured resolver, then loads the
    /// resulting path. A resolver miss is `NotFound`.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn load_assembly_name(&self, name: &AssemblyName) -> Result<Assembly<'_>> {
        let Some(path) = self.resolver.resolve(name) else {
            return Err(Error::not_found(format!(
                "no assembly found for '{}'",
                name.full_name()
            )));
        };
        self.load_assembly_path(path)
    }

    pub(crate) fn slot_for_database(&self, database: &Database) -> Result<usize> {
        self.state()
            .contexts
            .iter()
            .position(|context| std::ptr::eq(context.database(), database))
            .ok_or_else(|| {
                Error::invalid_argument("the database is not owned by this loader".to_string())
            })
    }

    /// The context owning `database`; fails when the database belongs to
    /// another loader.
    pub fn context_for_database(&self, database: &Database) -> Result<&AssemblyContext> {
        Ok(self.context_at_slot(self.slot_for_database(database)?))
    }

    pub(crate) fn assembly_for_database<'l>(
        &'l self,
        database: &Database,
    ) -> Result<Assembly<'l>> {
        Ok(self.assembly_at(self.slot_for_database(database)?))
    }

    /// Resolves a TypeRef to the TypeDef it names, loading further
    /// assemblies as needed. TypeDef and TypeSpec inputs come back
    /// unchanged.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn resolve_type<'l>(&'l self, reference: FullReference<'l>) -> Result<FullReference<'l>> {
        match reference.row().table() {
            TableKind::TypeDef | TableKind::TypeSpec => return Ok(reference),
            TableKind::TypeRef => {}
            other => {
                return Err(Error::invalid_argument(format!(
                    "resolve_type expects a TypeDef, TypeRef or TypeSpec, got {other:?}"
                )))
            }
        }

        let database = reference.database();
        let type_ref: TypeRefRow = database.row_at(reference.row())?;
        let namespace = database.string(type_ref.namespace()?)?;
        let name = database.string(type_ref.name()?)?;
        let scope = type_ref.resolution_scope()?.row();

        if scope.is_null() {
            return Err(Error::unsupported(format!(
                "resolution of '{}' through the ExportedType table",
                qualify(namespace, name)
            )));
        }

        match scope.table() {
            // The target type is defined in this very module.
            TableKind::Module => {
                let assembly = self.assembly_for_database(database)?;
                let found = assembly
                    .get_type_in(namespace, name, false)?
                    .ok_or_else(|| {
                        Error::not_found(format!(
                            "type '{}' not found in its own module",
                            qualify(namespace, name)
                        ))
                    })?;
                Ok(FullReference::new(
                    assembly.database(),
                    found.metadata_row(),
                ))
            }
            TableKind::ModuleRef => Err(Error::unsupported(format!(
                "resolution of '{}' through a secondary module",
                qualify(namespace, name)
            ))),
            TableKind::AssemblyRef => {
                let row: AssemblyRefRow = database.row_at(scope)?;
                let target_name = AssemblyName::from_assembly_ref(&row)?;
                let target = self.load_assembly_name(&target_name)?;
                let found = target.get_type_in(namespace, name, false)?.ok_or_else(|| {
                    Error::not_found(format!(
                        "type '{}' not found in assembly '{}'",
                        qualify(namespace, name),
                        target_name.full_name()
                    ))
                })?;
                Ok(FullReference::new(target.database(), found.metadata_row()))
            }
            // The scope names the enclosing type; resolve it first, then
            // search its nested types.
            TableKind::TypeRef => {
                let enclosing = self.resolve_type(FullReference::new(database, scope))?;
                if enclosing.row().table() != TableKind::TypeDef {
                    return Err(Error::unsupported(format!(
                        "nested type '{}' inside a constructed type",
                        qualify(namespace, name)
                    )));
                }
                let target = enclosing.database();
                for nested in target.rows::<NestedClassRow>() {
                    if nested.enclosing_class()?.index() != enclosing.row().index() {
                        continue;
                    }
                    let candidate = nested.nested_class()?;
                    let row: TypeDefRow = target.row_at(candidate)?;
                    if target.string(row.name()?)? == name
                        && target.string(row.namespace()?)? == namespace
                    {
                        return Ok(FullReference::new(target, candidate));
                    }
                }
                Err(Error::not_found(format!(
                    "nested type '{}' not found in its enclosing type",
                    qualify(namespace, name)
                )))
            }
            _ => Err(Error::corrupt(format!(
                "invalid resolution scope {scope}"
            ))),
        }
    }
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

/// Per-assembly state owned by the loader: the path, the parsed database
/// and the computed-once caches of the logical layer.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct AssemblyContext {
    path: PathBuf,
    database: Database,
    #[derivative(Debug = "ignore")]
    name: OnceLock<AssemblyName>,
    #[derivative(Debug = "ignore")]
    caches: Mutex<ContextCaches>,
}

impl AssemblyContext {
    pub(crate) fn new(path: PathBuf, database: Database) -> Self {
        Self {
            path,
            database,
            name: OnceLock::new(),
            caches: Mutex::new(ContextCaches::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// The assembly's name, computed from its `Assembly` row on first use.
    pub fn assembly_name(&self) -> Result<&AssemblyName> {
        if let Some(name) = self.name.get() {
            return Ok(name);
        }
        let computed = AssemblyName::from_assembly(&self.database)?;
        Ok(self.name.get_or_init(|| computed))
    }

    pub(crate) fn with_caches<R>(&self, f: impl FnOnce(&mut ContextCaches) -> R) -> R {
        let mut caches = self
            .caches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut caches)
    }
}

/// Computed-once, written-once lazy caches; a coarse per-context lock
/// guards all of them.
#[derive(Default)]
pub(crate) struct ContextCaches {
    pub methods: FxHashMap<u32, Arc<[MemberEntry]>>,
    pub fields: FxHashMap<u32, Arc<[MemberEntry]>>,
    pub interfaces: FxHashMap<u32, Arc<[RowReference]>>,
    pub attribute_ranges: FxHashMap<RowReference, (u32, u32)>,
}

/// One row of a flattened member table: a method or field attributed to
/// the TypeDef that declared it, reachable from some reflecting type.
#[derive(Debug, Copy, Clone)]
pub(crate) struct MemberEntry {
    /// Loader slot of the declaring assembly.
    pub context: u32,
    /// Declaring TypeDef row in that assembly.
    pub type_row: u32,
    /// MethodDef or Field row in that assembly.
    pub row: u32,
    /// Declared on the reflecting type itself, not inherited.
    pub declared: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::indices::CodedKind;
    use crate::testing::{assembly_image, MapResolver, TempDir};

    fn lib_image() -> Vec<u8> {
        let mut builder = assembly_image("Lib");
        let namespace = builder.string("A.B");
        let name = builder.string("C");
        builder.row(TableKind::TypeDef, &[0x1, name, namespace, 0, 1, 1]);
        builder.build()
    }

    #[test]
    fn loading_one_path_twice_yields_the_same_context() {
        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &lib_image());

        let loader = Loader::new(MapResolver::default());
        let first = loader.load_assembly_path(&path).unwrap();
        let second = loader.load_assembly_path(&path).unwrap();
        assert_eq!(first, second);
        assert!(std::ptr::eq(first.context(), second.context()));
        assert!(std::ptr::eq(first.database(), second.database()));
    }

    #[test]
    fn load_by_name_resolves_through_the_resolver() {
        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &lib_image());

        let mut resolver = MapResolver::default();
        resolver.insert("Lib", path.clone());
        let loader = Loader::new(resolver);

        let name = AssemblyName::parse("Lib, Version=1.2.3.4").unwrap();
        let assembly = loader.load_assembly_name(&name).unwrap();
        assert_eq!(assembly.path(), path);

        // By-name and by-path loads share the context.
        let by_path = loader.load_assembly_path(&path).unwrap();
        assert_eq!(assembly, by_path);
    }

    #[test]
    fn resolver_misses_surface_as_not_found() {
        let loader = Loader::new(MapResolver::default());
        let name = AssemblyName::parse("Absent, Version=1.0.0.0").unwrap();
        assert!(matches!(
            loader.load_assembly_name(&name),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn foreign_databases_are_rejected() {
        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &lib_image());
        let loader = Loader::new(MapResolver::default());
        loader.load_assembly_path(&path).unwrap();

        let foreign = Database::from_bytes(lib_image()).unwrap();
        assert!(matches!(
            loader.context_for_database(&foreign),
            Err(Error::InvalidArgument(_))
        ));
        let owned = loader.load_assembly_path(&path).unwrap();
        assert!(loader.context_for_database(owned.database()).is_ok());
    }

    #[test]
    fn resolving_type_defs_and_specs_is_identity() {
        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &lib_image());
        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();

        let type_def = FullReference::new(
            assembly.database(),
            RowReference::new(TableKind::TypeDef, 2),
        );
        assert_eq!(loader.resolve_type(type_def).unwrap(), type_def);

        let type_spec = FullReference::new(
            assembly.database(),
            RowReference::new(TableKind::TypeSpec, 7),
        );
        assert_eq!(loader.resolve_type(type_spec).unwrap(), type_spec);

        let field = FullReference::new(
            assembly.database(),
            RowReference::new(TableKind::Field, 1),
        );
        assert!(matches!(
            loader.resolve_type(field),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn module_scope_references_resolve_locally() {
        let mut builder = assembly_image("Lib");
        let namespace = builder.string("A.B");
        let name = builder.string("C");
        builder.row(TableKind::TypeDef, &[0x1, name, namespace, 0, 1, 1]);
        let scope = builder.coded(CodedKind::ResolutionScope, TableKind::Module, 1);
        builder.row(TableKind::TypeRef, &[scope, name, namespace]);

        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &builder.build());
        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();

        let reference = FullReference::new(
            assembly.database(),
            RowReference::new(TableKind::TypeRef, 1),
        );
        let resolved = loader.resolve_type(reference).unwrap();
        assert!(std::ptr::eq(resolved.database(), assembly.database()));
        assert_eq!(resolved.row().table(), TableKind::TypeDef);
        assert_eq!(resolved.row().index(), 2);
    }

    #[test]
    fn null_scope_resolution_is_unsupported() {
        let mut builder = assembly_image("Lib");
        let name = builder.string("Exported");
        builder.row(TableKind::TypeRef, &[0, name, 0]);

        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &builder.build());
        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();

        let reference = FullReference::new(
            assembly.database(),
            RowReference::new(TableKind::TypeRef, 1),
        );
        assert!(matches!(
            loader.resolve_type(reference),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn module_ref_scope_resolution_is_unsupported() {
        let mut builder = assembly_image("Lib");
        let other = builder.string("other.netmodule");
        builder.row(TableKind::ModuleRef, &[other]);
        let scope = builder.coded(CodedKind::ResolutionScope, TableKind::ModuleRef, 1);
        let name = builder.string("Elsewhere");
        builder.row(TableKind::TypeRef, &[scope, name, 0]);

        let dir = TempDir::new();
        let path = dir.write("Lib.dll", &builder.build());
        let loader = Loader::new(MapResolver::default());
        let assembly = loader.load_assembly_path(&path).unwrap();

        let reference = FullReference::new(
            assembly.database(),
            RowReference::new(TableKind::TypeRef, 1),
        );
        assert!(matches!(
            loader.resolve_type(reference),
            Err(Error::Unsupported(_))
        ));
    }

    fn dependency_image() -> Vec<u8> {
        let mut builder = assembly_image("Dep");
        let namespace = builder.string("N");
        let name = builder.string("T");
        builder.row(TableKind::TypeDef, &[0x1, name, namespace, 0, 1, 1]);
        let inner = builder.string("Inner");
        builder.row(TableKind::TypeDef, &[0x2, inner, 0, 0, 1, 1]);
        builder.row(TableKind::NestedClass, &[3, 2]);
        builder.build()
    }

    fn referencing_image(builder_name: &str) -> Vec<u8> {
        let mut builder = assembly_image(builder_name);
        let dep = builder.string("Dep");
        builder.row(TableKind::AssemblyRef, &[1, 2, 3, 4, 0, 0, dep, 0, 0]);
        let scope = builder.coded(CodedKind::ResolutionScope, TableKind::AssemblyRef, 1);
        let namespace = builder.string("N");
        let name = builder.string("T");
        builder.row(TableKind::TypeRef, &[scope, name, namespace]);
        let nested_scope = builder.coded(CodedKind::ResolutionScope, TableKind::TypeRef, 1);
        let inner = builder.string("Inner");
        builder.row(TableKind::TypeRef, &[nested_scope, inner, 0]);
        let missing = builder.string("Missing");
        builder.row(TableKind::TypeRef, &[scope, missing, namespace]);
        builder.build()
    }

    #[test]
    fn assembly_ref_scopes_load_and_search_the_target_assembly() {
        let dir = TempDir::new();
        let app = dir.write("App.dll", &referencing_image("App"));
        let dep = dir.write("Dep.dll", &dependency_image());

        let mut resolver = MapResolver::default();
        resolver.insert("Dep", dep.clone());
        let loader = Loader::new(resolver);
        let assembly = loader.load_assembly_path(&app).unwrap();

        let reference = FullReference::new(
            assembly.database(),
            RowReference::new(TableKind::TypeRef, 1),
        );
        let resolved = loader.resolve_type(reference).unwrap();
        assert_eq!(resolved.row(), RowReference::new(TableKind::TypeDef, 2));

        // The dependency was loaded lazily and owns the resolved row.
        let dep_assembly = loader.load_assembly_path(&dep).unwrap();
        assert!(std::ptr::eq(resolved.database(), dep_assembly.database()));
    }

    #[test]
    fn nested_type_scopes_search_the_enclosing_type() {
        let dir = TempDir::new();
        let app = dir.write("App.dll", &referencing_image("App"));
        let dep = dir.write("Dep.dll", &dependency_image());

        let mut resolver = MapResolver::default();
        resolver.insert("Dep", dep);
        let loader = Loader::new(resolver);
        let assembly = loader.load_assembly_path(&app).unwrap();

        let reference = FullReference::new(
            assembly.database(),
            RowReference::new(TableKind::TypeRef, 2),
        );
        let resolved = loader.resolve_type(reference).unwrap();
        assert_eq!(resolved.row(), RowReference::new(TableKind::TypeDef, 3));
    }

    #[test]
    fn failed_lookups_in_the_target_assembly_are_not_found() {
        let dir = TempDir::new();
        let app = dir.write("App.dll", &referencing_image("App"));
        let dep = dir.write("Dep.dll", &dependency_image());

        let mut resolver = MapResolver::default();
        resolver.insert("Dep", dep);
        let loader = Loader::new(resolver);
        let assembly = loader.load_assembly_path(&app).unwrap();

        let reference = FullReference::new(
            assembly.database(),
            RowReference::new(TableKind::TypeRef, 3),
        );
        assert!(matches!(
            loader.resolve_type(reference),
            Err(Error::NotFound(_))
        ));
    }
}
