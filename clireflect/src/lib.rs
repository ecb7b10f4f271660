//! A read-only reflection library for CLI (.NET / Windows Runtime)
//! assemblies.
//!
//! Two layers mirror the metadata format itself. The [`raw`] layer
//! parses the physical side of an image: metadata root, heaps, the `#~`
//! table stream with its computed column widths, coded indices and
//! signature blobs, all as lazy views that decode on access. The
//! [`structured`] layer is the logical object model on top: a
//! [`Loader`] owns any number of assemblies, resolves references
//! between them through a pluggable [`AssemblyResolver`], and hands out
//! thin handles ([`Assembly`], [`Type`], [`Method`], ...) that compute
//! everything on demand.
//!
//! ```no_run
//! use clireflect::{BindingFlags, Loader};
//!
//! # fn main() -> clireflect::Result<()> {
//! let loader = Loader::with_search_directories(["."]);
//! let assembly = loader.load_assembly_path("Example.dll")?;
//! println!("{}", assembly.name()?.full_name());
//! for ty in assembly.types() {
//!     println!("{}", ty.full_name()?);
//!     for method in ty.methods(BindingFlags::PUBLIC | BindingFlags::INSTANCE)? {
//!         println!("  {}", method?.name()?);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod raw;
pub mod structured;

mod crypto;
mod utilities;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use raw::{Database, FullReference, RowReference, TableKind};
pub use structured::{
    Assembly, AssemblyContext, AssemblyName, AssemblyResolver, BindingFlags, CustomAttribute,
    DirectoryResolver, Event, Field, File, GenericParam, Loader, Method, Module, Parameter,
    Property, Type, Version,
};
