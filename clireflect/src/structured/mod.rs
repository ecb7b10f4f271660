//! The logical layer: loader-owned assemblies and the thin value handles
//! (types, members, attributes) computed on demand from the raw
//! databases.

pub mod assembly;
pub mod attributes;
pub mod context;
pub mod iter;
pub mod members;
pub mod resolver;
pub mod types;

pub use assembly::{Assembly, AssemblyName, File, Module, ReferencedNames, Version};
pub use attributes::{CustomAttribute, CustomAttributes};
pub use context::{AssemblyContext, Loader};
pub use iter::TableIter;
pub use members::{
    Event, Events, Field, Fields, GenericParam, GenericParams, Method, Methods, Parameter,
    Parameters, Properties, Property,
};
pub use resolver::{AssemblyResolver, DirectoryResolver};
pub use types::{BindingFlags, Interfaces, Type};
