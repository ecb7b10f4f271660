//! Assembly-name resolution. The loader asks its resolver for a path; the
//! shipped implementation probes a set of directories for `.winmd`,
//! `.dll` and `.exe` candidates and picks the best version-compatible
//! match.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use fxhash::FxHashMap;
use rust_search::SearchBuilder;

use crate::raw::database::Database;
use crate::raw::rows::AssemblyFlags;
use crate::structured::assembly::{AssemblyName, Version};

/// Maps assembly names to on-disk paths. Implementations may hit the
/// filesystem; calls are synchronous and may be issued while the loader
/// resolves type references.
pub trait AssemblyResolver: Debug {
    fn resolve(&self, name: &AssemblyName) -> Option<PathBuf>;
}

/// Directory-based resolver: indexes candidate files per simple name up
/// front, then picks the highest compatible version on demand.
#[derive(Debug)]
pub struct DirectoryResolver {
    candidates: FxHashMap<String, Vec<PathBuf>>,
}

impl DirectoryResolver {
    pub fn new<T: AsRef<Path>>(directories: impl IntoIterator<Item = T>) -> Self {
        let mut candidates: FxHashMap<String, Vec<PathBuf>> = FxHashMap::default();
        for directory in directories {
            for extension in ["winmd", "dll", "exe"] {
                for entry in SearchBuilder::default()
                    .location(directory.as_ref())
                    .depth(usize::MAX)
                    .ext(extension)
                    .build()
                {
                    let path = PathBuf::from(&entry);
                    let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                        continue;
                    };
                    candidates
                        .entry(stem.to_ascii_lowercase())
                        .or_default()
                        .push(path);
                }
            }
        }
        Self { candidates }
    }
}

impl AssemblyResolver for DirectoryResolver {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn resolve(&self, name: &AssemblyName) -> Option<PathBuf> {
        let candidates = self.candidates.get(&name.name().to_ascii_lowercase())?;

        // A retargetable reference accepts any version.
        let requested = if name.flags().contains(AssemblyFlags::RETARGETABLE) {
            Version::ZERO
        } else {
            name.version()
        };

        let mut best: Option<(Version, &PathBuf)> = None;
        for path in candidates {
            let candidate = match Database::from_path(path)
                .and_then(|database| AssemblyName::from_assembly(&database))
            {
                Ok(candidate) => candidate,
                Err(_error) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(path = %path.display(), error = %_error, "skipping unreadable candidate");
                    continue;
                }
            };
            if !candidate.name().eq_ignore_ascii_case(name.name()) {
                continue;
            }
            if !candidate.version().is_compatible_with(&requested) {
                continue;
            }
            match best {
                Some((version, _)) if version >= candidate.version() => {}
                _ => best = Some((candidate.version(), path)),
            }
        }
        best.map(|(_, path)| path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::schema::TableKind;
    use crate::testing::{ImageBuilder, TempDir};

    fn versioned_image(name: &str, version: [u32; 4]) -> Vec<u8> {
        let mut builder = ImageBuilder::new();
        let module_name = builder.string(name);
        builder.row(TableKind::Module, &[0, module_name, 0, 0, 0]);
        let module_type = builder.string("<Module>");
        builder.row(TableKind::TypeDef, &[0, module_type, 0, 0, 1, 1]);
        let assembly_name = builder.string(name);
        builder.row(
            TableKind::Assembly,
            &[
                0x8004,
                version[0],
                version[1],
                version[2],
                version[3],
                0,
                0,
                assembly_name,
                0,
            ],
        );
        builder.build()
    }

    fn request(name: &str, version: Version) -> AssemblyName {
        AssemblyName::new(name, version, "", [0; 8])
    }

    #[test]
    fn picks_the_highest_compatible_version() {
        let dir = TempDir::new();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        let old = dir.write("a/Dep.dll", &versioned_image("Dep", [1, 0, 0, 0]));
        let new = dir.write("b/Dep.dll", &versioned_image("Dep", [2, 0, 0, 0]));

        let resolver = DirectoryResolver::new([dir.path()]);
        let resolved = resolver
            .resolve(&request("Dep", Version::new(1, 0, 0, 0)))
            .unwrap();
        assert_eq!(resolved, new);

        let exact = resolver
            .resolve(&request("Dep", Version::new(2, 0, 0, 0)))
            .unwrap();
        assert_eq!(exact, new);
        let _ = old;
    }

    #[test]
    fn rejects_incompatible_or_unknown_requests() {
        let dir = TempDir::new();
        dir.write("Dep.dll", &versioned_image("Dep", [1, 5, 0, 0]));

        let resolver = DirectoryResolver::new([dir.path()]);
        assert!(resolver
            .resolve(&request("Dep", Version::new(3, 0, 0, 0)))
            .is_none());
        assert!(resolver
            .resolve(&request("Other", Version::new(1, 0, 0, 0)))
            .is_none());
    }

    #[test]
    fn retargetable_references_accept_any_version() {
        let dir = TempDir::new();
        let path = dir.write("Dep.dll", &versioned_image("Dep", [1, 0, 0, 0]));

        let resolver = DirectoryResolver::new([dir.path()]);
        let name = request("Dep", Version::new(9, 0, 0, 0))
            .with_flags(AssemblyFlags::RETARGETABLE);
        assert_eq!(resolver.resolve(&name).unwrap(), path);
    }

    #[test]
    fn lookup_is_case_insensitive_on_the_simple_name() {
        let dir = TempDir::new();
        let path = dir.write("Dep.dll", &versioned_image("Dep", [1, 0, 0, 0]));

        let resolver = DirectoryResolver::new([dir.path()]);
        assert_eq!(
            resolver
                .resolve(&request("dep", Version::new(1, 0, 0, 0)))
                .unwrap(),
            path
        );
    }
}
