//! Member handles and the flattened member tables behind them.
//!
//! A member table attributes every reachable method/field row to the
//! TypeDef that declared it, walking the inheritance chain of the
//! reflecting type. Derived members hide base members by name, or by
//! name and signature when marked hide-by-sig; inherited constructors
//! are never surfaced. Tables are computed once per reflecting type and
//! cached on its assembly context.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::raw::database::Database;
use crate::raw::indices::{FullReference, RowReference};
use crate::raw::rows::{
    EventAttributes, EventRow, FieldAttributes, FieldRow, GenericParamAttributes, GenericParamRow,
    MethodAttributes, MethodDefRow, MethodImplAttributes, ParamAttributes, ParamRow,
    PropertyAttributes, PropertyRow,
};
use crate::raw::schema::TableKind;
use crate::raw::signatures::{
    CallingConvention, FieldSignature, MethodSignature, PropertySignature, TypeNode, TypeSignature,
};
use crate::structured::assembly::Assembly;
use crate::structured::attributes::{attributes_for, CustomAttributes};
use crate::structured::context::MemberEntry;
use crate::structured::types::{member_range, BindingFlags, Type};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum MemberKind {
    Method,
    Field,
}

fn is_constructor_name(flags: MethodAttributes, name: &str) -> bool {
    flags.contains(MethodAttributes::SPECIAL_NAME) && matches!(name, ".ctor" | ".cctor")
}

/// Builds (or fetches) the flattened member table of a reflecting type.
pub(crate) fn member_table(reflecting: Type<'_>, kind: MemberKind) -> Result<Arc<[MemberEntry]>> {
    let context = reflecting.assembly().context();
    let cached = context.with_caches(|caches| {
        let map = match kind {
            MemberKind::Method => &caches.methods,
            MemberKind::Field => &caches.fields,
        };
        map.get(&reflecting.row_index()).cloned()
    });
    if let Some(table) = cached {
        return Ok(table);
    }

    let loader = reflecting.assembly().loader();
    let mut entries: Vec<MemberEntry> = Vec::new();
    let mut visited: Vec<(usize, u32)> = Vec::new();
    let mut current = reflecting;
    let mut declared = true;

    loop {
        let database = current.assembly().database();
        let identity = (database as *const Database as usize, current.row_index());
        if visited.contains(&identity) {
            return Err(Error::corrupt(format!(
                "cyclic inheritance chain through TypeDef[{}]",
                current.row_index()
            )));
        }
        visited.push(identity);

        let slot = loader.slot_for_database(database)? as u32;
        let (first, last) = member_range(database, current.row_index(), kind)?;
        for row in first..last {
            if !declared && hidden_by_earlier(loader, &entries, kind, database, row)? {
                continue;
            }
            entries.push(MemberEntry {
                context: slot,
                type_row: current.row_index(),
                row,
                declared,
            });
        }

        match current.base_type()? {
            Some(base) => {
                current = base;
                declared = false;
            }
            None => break,
        }
    }

    let table: Arc<[MemberEntry]> = entries.into();
    Ok(context.with_caches(|caches| {
        let map = match kind {
            MemberKind::Method => &mut caches.methods,
            MemberKind::Field => &mut caches.fields,
        };
        map.entry(reflecting.row_index())
            .or_insert_with(|| table.clone())
            .clone()
    }))
}

/// Whether a base member is hidden by an already-collected (more
/// derived) member. Inherited constructors never reach this point.
fn hidden_by_earlier(
    loader: &crate::structured::context::Loader,
    entries: &[MemberEntry],
    kind: MemberKind,
    database: &Database,
    row: u32,
) -> Result<bool> {
    match kind {
        MemberKind::Field => {
            let field: FieldRow = database.row(row)?;
            let name = database.string(field.name()?)?;
            for entry in entries {
                let entry_db = loader.assembly_at(entry.context as usize).database();
                let earlier: FieldRow = entry_db.row(entry.row)?;
                if entry_db.string(earlier.name()?)? == name {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        MemberKind::Method => {
            let method: MethodDefRow = database.row(row)?;
            let name = database.string(method.name()?)?;
            if is_constructor_name(method.flags()?, name) {
                return Ok(true);
            }
            for entry in entries {
                let entry_db = loader.assembly_at(entry.context as usize).database();
                let earlier: MethodDefRow = entry_db.row(entry.row)?;
                if entry_db.string(earlier.name()?)? != name {
                    continue;
                }
                if !earlier.flags()?.contains(MethodAttributes::HIDE_BY_SIG) {
                    // Hide-by-name: the derived method hides every base
                    // member with this name.
                    return Ok(true);
                }
                let earlier_blob = entry_db.blob(earlier.signature()?)?;
                let blob = database.blob(method.signature()?)?;
                if method_signatures_match(entry_db, earlier_blob, database, blob)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn binding_admits(binding: BindingFlags, declared: bool, is_static: bool, is_public: bool) -> bool {
    let visibility = if is_public {
        BindingFlags::PUBLIC
    } else {
        BindingFlags::NON_PUBLIC
    };
    if !binding.contains(visibility) {
        return false;
    }
    let lifetime = if is_static {
        BindingFlags::STATIC
    } else {
        BindingFlags::INSTANCE
    };
    if !binding.contains(lifetime) {
        return false;
    }
    if !declared {
        if binding.contains(BindingFlags::DECLARED_ONLY) {
            return false;
        }
        if is_static && !binding.contains(BindingFlags::FLATTEN_HIERARCHY) {
            return false;
        }
    }
    true
}

// -- cross-database signature comparison ----------------------------------
//
// Hide-by-sig must compare signatures whose type references live in
// different databases; references compare by the (namespace, name) they
// ultimately spell rather than by row identity.

pub(crate) fn method_signatures_match(
    a_db: &Database,
    a_blob: &[u8],
    b_db: &Database,
    b_blob: &[u8],
) -> Result<bool> {
    let a = MethodSignature::from_blob(a_blob)?;
    let b = MethodSignature::from_blob(b_blob)?;
    if std::ptr::eq(a_db, b_db) {
        return a.structurally_equals(&b);
    }

    let a = a.parse()?;
    let b = b.parse()?;
    if a.convention != b.convention
        || a.generic_param_count != b.generic_param_count
        || a.param_count != b.param_count
        || !type_signatures_match(a_db, &a.return_type, b_db, &b.return_type)?
    {
        return Ok(false);
    }
    for (left, right) in a.parameters.zip(b.parameters) {
        if !type_signatures_match(a_db, &left?, b_db, &right?)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn type_signatures_match(
    a_db: &Database,
    a: &TypeSignature<'_>,
    b_db: &Database,
    b: &TypeSignature<'_>,
) -> Result<bool> {
    Ok(match (a.node()?, b.node()?) {
        (TypeNode::Primitive(left), TypeNode::Primitive(right)) => left == right,
        (TypeNode::Class(left), TypeNode::Class(right))
        | (TypeNode::ValueType(left), TypeNode::ValueType(right)) => {
            references_match(a_db, left, b_db, right)?
        }
        (TypeNode::Pointer(left), TypeNode::Pointer(right))
        | (TypeNode::ByRef(left), TypeNode::ByRef(right))
        | (TypeNode::SzArray(left), TypeNode::SzArray(right))
        | (TypeNode::Pinned(left), TypeNode::Pinned(right)) => {
            type_signatures_match(a_db, &left, b_db, &right)?
        }
        (TypeNode::Array(left, shape_left), TypeNode::Array(right, shape_right)) => {
            shape_left == shape_right && type_signatures_match(a_db, &left, b_db, &right)?
        }
        (
            TypeNode::GenericInst {
                value_type: vt_left,
                definition: def_left,
                arguments: args_left,
            },
            TypeNode::GenericInst {
                value_type: vt_right,
                definition: def_right,
                arguments: args_right,
            },
        ) => {
            if vt_left != vt_right
                || args_left.len() != args_right.len()
                || !references_match(a_db, def_left, b_db, def_right)?
            {
                return Ok(false);
            }
            for (left, right) in args_left.zip(args_right) {
                if !type_signatures_match(a_db, &left?, b_db, &right?)? {
                    return Ok(false);
                }
            }
            true
        }
        (TypeNode::Var(left), TypeNode::Var(right))
        | (TypeNode::MVar(left), TypeNode::MVar(right)) => left == right,
        (TypeNode::FnPtr(left), TypeNode::FnPtr(right)) => {
            method_signatures_match(a_db, left.bytes(), b_db, right.bytes())?
        }
        _ => false,
    })
}

fn references_match(
    a_db: &Database,
    a: RowReference,
    b_db: &Database,
    b: RowReference,
) -> Result<bool> {
    match (reference_names(a_db, a)?, reference_names(b_db, b)?) {
        (Some(left), Some(right)) => Ok(left == right),
        (None, None) => {
            let left = spec_signature(a_db, a)?;
            let right = spec_signature(b_db, b)?;
            type_signatures_match(a_db, &left, b_db, &right)
        }
        _ => Ok(false),
    }
}

/// The (namespace, name) a TypeDefOrRef spells; `None` for TypeSpec.
fn reference_names<'db>(
    database: &'db Database,
    row: RowReference,
) -> Result<Option<(&'db str, &'db str)>> {
    if row.is_null() {
        return Err(Error::corrupt("null type reference in signature"));
    }
    match row.table() {
        TableKind::TypeDef => {
            let row: crate::raw::rows::TypeDefRow = database.row_at(row)?;
            Ok(Some((
                database.string(row.namespace()?)?,
                database.string(row.name()?)?,
            )))
        }
        TableKind::TypeRef => {
            let row: crate::raw::rows::TypeRefRow = database.row_at(row)?;
            Ok(Some((
                database.string(row.namespace()?)?,
                database.string(row.name()?)?,
            )))
        }
        TableKind::TypeSpec => Ok(None),
        other => Err(Error::corrupt(format!(
            "{other:?} is not a type reference"
        ))),
    }
}

fn spec_signature<'db>(
    database: &'db Database,
    row: RowReference,
) -> Result<TypeSignature<'db>> {
    let spec: crate::raw::rows::TypeSpecRow = database.row_at(row)?;
    TypeSignature::from_blob(database.blob(spec.signature()?)?)
}

// -- method -----------------------------------------------------------------

/// A method reached through a reflecting type. The declaring type may be
/// a base type in another assembly.
#[derive(Copy, Clone)]
pub struct Method<'l> {
    reflecting: Type<'l>,
    declaring: Assembly<'l>,
    type_row: u32,
    row: u32,
}

impl<'l> Method<'l> {
    pub(crate) fn new(
        reflecting: Type<'l>,
        declaring: Assembly<'l>,
        type_row: u32,
        row: u32,
    ) -> Self {
        Self {
            reflecting,
            declaring,
            type_row,
            row,
        }
    }

    fn method_def(&self) -> Result<MethodDefRow<'l>> {
        self.declaring.database().row(self.row)
    }

    /// The type through which this method was obtained.
    pub fn reflected_type(&self) -> Type<'l> {
        self.reflecting
    }

    /// The type that declared this method.
    pub fn declaring_type(&self) -> Type<'l> {
        Type::new(self.declaring, self.type_row)
    }

    pub fn metadata_row(&self) -> RowReference {
        RowReference::new(TableKind::MethodDef, self.row)
    }

    pub fn name(&self) -> Result<&'l str> {
        let row = self.method_def()?;
        self.declaring.database().string(row.name()?)
    }

    pub fn attributes(&self) -> Result<MethodAttributes> {
        self.method_def()?.flags()
    }

    pub fn impl_attributes(&self) -> Result<MethodImplAttributes> {
        self.method_def()?.impl_flags()
    }

    pub fn signature(&self) -> Result<MethodSignature<'l>> {
        let row = self.method_def()?;
        MethodSignature::from_blob(self.declaring.database().blob(row.signature()?)?)
    }

    pub fn calling_convention(&self) -> Result<CallingConvention> {
        self.signature()?.calling_convention()
    }

    /// The declared parameters; a `Sequence == 0` row describes the
    /// return value and is excluded.
    pub fn parameters(&self) -> Result<Parameters<'l>> {
        let database = self.declaring.database();
        let (mut first, last) = param_range(database, self.row)?;
        if first < last {
            let head: ParamRow = database.row(first)?;
            if head.sequence()? == 0 {
                first += 1;
            }
        }
        Ok(Parameters {
            method: *self,
            next: first,
            end: last,
        })
    }

    pub fn custom_attributes(&self) -> Result<CustomAttributes<'l>> {
        attributes_for(self.declaring, self.metadata_row())
    }

    pub fn is_constructor(&self) -> Result<bool> {
        Ok(is_constructor_name(self.attributes()?, self.name()?))
    }

    pub fn is_public(&self) -> Result<bool> {
        Ok(self.access()? == MethodAttributes::PUBLIC)
    }

    pub fn is_private(&self) -> Result<bool> {
        Ok(self.access()? == MethodAttributes::PRIVATE)
    }

    pub fn is_assembly(&self) -> Result<bool> {
        Ok(self.access()? == MethodAttributes::ASSEMBLY)
    }

    pub fn is_family(&self) -> Result<bool> {
        Ok(self.access()? == MethodAttributes::FAMILY)
    }

    pub fn is_family_and_assembly(&self) -> Result<bool> {
        Ok(self.access()? == MethodAttributes::FAMILY_AND_ASSEMBLY)
    }

    pub fn is_family_or_assembly(&self) -> Result<bool> {
        Ok(self.access()? == MethodAttributes::FAMILY_OR_ASSEMBLY)
    }

    pub fn is_static(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(MethodAttributes::STATIC))
    }

    pub fn is_virtual(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(MethodAttributes::VIRTUAL))
    }

    pub fn is_abstract(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(MethodAttributes::ABSTRACT))
    }

    pub fn is_final(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(MethodAttributes::FINAL))
    }

    pub fn is_special_name(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(MethodAttributes::SPECIAL_NAME))
    }

    pub fn is_hide_by_sig(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(MethodAttributes::HIDE_BY_SIG))
    }

    // TODO support generic method instantiation via MethodSpec.
    pub fn is_generic_method(&self) -> bool {
        false
    }

    fn access(&self) -> Result<MethodAttributes> {
        Ok(self
            .attributes()?
            .intersection(MethodAttributes::MEMBER_ACCESS_MASK))
    }
}

impl PartialEq for Method<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.declaring == other.declaring && self.row == other.row
    }
}

impl Eq for Method<'_> {}

impl Debug for Method<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Ok(name) => write!(f, "Method({name})"),
            Err(_) => write!(f, "Method(MethodDef[{}])", self.row),
        }
    }
}

/// The parameter rows a MethodDef owns.
fn param_range(database: &Database, method_row: u32) -> Result<(u32, u32)> {
    let param_count = database.row_count(TableKind::Param);
    let first = database
        .row::<MethodDefRow>(method_row)?
        .param_list()?
        .index();
    let last = if method_row < database.row_count(TableKind::MethodDef) {
        database
            .row::<MethodDefRow>(method_row + 1)?
            .param_list()?
            .index()
    } else {
        param_count + 1
    };
    if first == 0 || first > last || last > param_count + 1 {
        return Err(Error::corrupt(format!(
            "invalid parameter range [{first}, {last}) for MethodDef[{method_row}]"
        )));
    }
    Ok((first, last))
}

// -- field ------------------------------------------------------------------

/// A field reached through a reflecting type.
#[derive(Copy, Clone)]
pub struct Field<'l> {
    reflecting: Type<'l>,
    declaring: Assembly<'l>,
    type_row: u32,
    row: u32,
}

impl<'l> Field<'l> {
    fn field(&self) -> Result<FieldRow<'l>> {
        self.declaring.database().row(self.row)
    }

    pub fn reflected_type(&self) -> Type<'l> {
        self.reflecting
    }

    pub fn declaring_type(&self) -> Type<'l> {
        Type::new(self.declaring, self.type_row)
    }

    pub fn metadata_row(&self) -> RowReference {
        RowReference::new(TableKind::Field, self.row)
    }

    pub fn name(&self) -> Result<&'l str> {
        let row = self.field()?;
        self.declaring.database().string(row.name()?)
    }

    pub fn attributes(&self) -> Result<FieldAttributes> {
        self.field()?.flags()
    }

    pub fn signature(&self) -> Result<FieldSignature<'l>> {
        let row = self.field()?;
        FieldSignature::from_blob(self.declaring.database().blob(row.signature()?)?)
    }

    pub fn custom_attributes(&self) -> Result<CustomAttributes<'l>> {
        attributes_for(self.declaring, self.metadata_row())
    }

    pub fn is_public(&self) -> Result<bool> {
        Ok(self.access()? == FieldAttributes::PUBLIC)
    }

    pub fn is_private(&self) -> Result<bool> {
        Ok(self.access()? == FieldAttributes::PRIVATE)
    }

    pub fn is_static(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(FieldAttributes::STATIC))
    }

    pub fn is_literal(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(FieldAttributes::LITERAL))
    }

    pub fn is_init_only(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(FieldAttributes::INIT_ONLY))
    }

    pub fn is_special_name(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(FieldAttributes::SPECIAL_NAME))
    }

    fn access(&self) -> Result<FieldAttributes> {
        Ok(self
            .attributes()?
            .intersection(FieldAttributes::FIELD_ACCESS_MASK))
    }
}

impl PartialEq for Field<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.declaring == other.declaring && self.row == other.row
    }
}

impl Eq for Field<'_> {}

impl Debug for Field<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Ok(name) => write!(f, "Field({name})"),
            Err(_) => write!(f, "Field(Field[{}])", self.row),
        }
    }
}

// -- iterators --------------------------------------------------------------

/// Methods (or constructors) of a reflecting type under a binding
/// filter.
#[derive(Clone)]
pub struct Methods<'l> {
    reflecting: Type<'l>,
    table: Arc<[MemberEntry]>,
    position: usize,
    binding: BindingFlags,
    constructors: bool,
}

impl<'l> Methods<'l> {
    pub(crate) fn new(
        reflecting: Type<'l>,
        table: Arc<[MemberEntry]>,
        binding: BindingFlags,
        constructors: bool,
    ) -> Self {
        Self {
            reflecting,
            table,
            position: 0,
            binding,
            constructors,
        }
    }

    fn realize(&self, entry: MemberEntry) -> Result<Option<Method<'l>>> {
        let loader = self.reflecting.assembly().loader();
        let declaring = loader.assembly_at(entry.context as usize);
        let database = declaring.database();
        let row: MethodDefRow = database.row(entry.row)?;
        let flags = row.flags()?;
        let name = database.string(row.name()?)?;

        if is_constructor_name(flags, name) != self.constructors {
            return Ok(None);
        }
        let is_public =
            flags.intersection(MethodAttributes::MEMBER_ACCESS_MASK) == MethodAttributes::PUBLIC;
        if !binding_admits(
            self.binding,
            entry.declared,
            flags.contains(MethodAttributes::STATIC),
            is_public,
        ) {
            return Ok(None);
        }
        Ok(Some(Method::new(
            self.reflecting,
            declaring,
            entry.type_row,
            entry.row,
        )))
    }
}

impl<'l> Iterator for Methods<'l> {
    type Item = Result<Method<'l>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.position < self.table.len() {
            let entry = self.table[self.position];
            self.position += 1;
            match self.realize(entry) {
                Ok(None) => continue,
                Ok(Some(method)) => return Some(Ok(method)),
                Err(error) => return Some(Err(error)),
            }
        }
        None
    }
}

/// Fields of a reflecting type under a binding filter.
#[derive(Clone)]
pub struct Fields<'l> {
    reflecting: Type<'l>,
    table: Arc<[MemberEntry]>,
    position: usize,
    binding: BindingFlags,
}

impl<'l> Fields<'l> {
    pub(crate) fn new(
        reflecting: Type<'l>,
        table: Arc<[MemberEntry]>,
        binding: BindingFlags,
    ) -> Self {
        Self {
            reflecting,
            table,
            position: 0,
            binding,
        }
    }

    fn realize(&self, entry: MemberEntry) -> Result<Option<Field<'l>>> {
        let loader = self.reflecting.assembly().loader();
        let declaring = loader.assembly_at(entry.context as usize);
        let row: FieldRow = declaring.database().row(entry.row)?;
        let flags = row.flags()?;
        let is_public =
            flags.intersection(FieldAttributes::FIELD_ACCESS_MASK) == FieldAttributes::PUBLIC;
        if !binding_admits(
            self.binding,
            entry.declared,
            flags.contains(FieldAttributes::STATIC),
            is_public,
        ) {
            return Ok(None);
        }
        Ok(Some(Field {
            reflecting: self.reflecting,
            declaring,
            type_row: entry.type_row,
            row: entry.row,
        }))
    }
}

impl<'l> Iterator for Fields<'l> {
    type Item = Result<Field<'l>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.position < self.table.len() {
            let entry = self.table[self.position];
            self.position += 1;
            match self.realize(entry) {
                Ok(None) => continue,
                Ok(Some(field)) => return Some(Ok(field)),
                Err(error) => return Some(Err(error)),
            }
        }
        None
    }
}

/// A parameter row of a method.
#[derive(Copy, Clone)]
pub struct Parameter<'l> {
    method: Method<'l>,
    row: u32,
}

impl<'l> Parameter<'l> {
    pub fn method(&self) -> Method<'l> {
        self.method
    }

    fn param(&self) -> Result<ParamRow<'l>> {
        self.method.declaring.database().row(self.row)
    }

    pub fn name(&self) -> Result<&'l str> {
        let row = self.param()?;
        self.method.declaring.database().string(row.name()?)
    }

    pub fn attributes(&self) -> Result<ParamAttributes> {
        self.param()?.flags()
    }

    /// 1-based position; 0 would describe the return value and never
    /// appears here.
    pub fn sequence(&self) -> Result<u32> {
        self.param()?.sequence()
    }

    pub fn metadata_row(&self) -> RowReference {
        RowReference::new(TableKind::Param, self.row)
    }

    pub fn custom_attributes(&self) -> Result<CustomAttributes<'l>> {
        attributes_for(self.method.declaring, self.metadata_row())
    }
}

/// Parameters of one method, in sequence order.
#[derive(Clone)]
pub struct Parameters<'l> {
    method: Method<'l>,
    next: u32,
    end: u32,
}

impl<'l> Iterator for Parameters<'l> {
    type Item = Parameter<'l>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let parameter = Parameter {
            method: self.method,
            row: self.next,
        };
        self.next += 1;
        Some(parameter)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Parameters<'_> {}

// -- properties and events --------------------------------------------------

/// A property row, reached through its declaring type.
#[derive(Copy, Clone)]
pub struct Property<'l> {
    declaring: Type<'l>,
    row: u32,
}

impl<'l> Property<'l> {
    pub fn declaring_type(&self) -> Type<'l> {
        self.declaring
    }

    fn property(&self) -> Result<PropertyRow<'l>> {
        self.declaring.assembly().database().row(self.row)
    }

    pub fn name(&self) -> Result<&'l str> {
        let row = self.property()?;
        self.declaring.assembly().database().string(row.name()?)
    }

    pub fn attributes(&self) -> Result<PropertyAttributes> {
        self.property()?.flags()
    }

    pub fn signature(&self) -> Result<PropertySignature<'l>> {
        let row = self.property()?;
        PropertySignature::from_blob(self.declaring.assembly().database().blob(row.signature()?)?)
    }

    pub fn metadata_row(&self) -> RowReference {
        RowReference::new(TableKind::Property, self.row)
    }

    pub fn custom_attributes(&self) -> Result<CustomAttributes<'l>> {
        attributes_for(self.declaring.assembly(), self.metadata_row())
    }
}

/// An event row, reached through its declaring type.
#[derive(Copy, Clone)]
pub struct Event<'l> {
    declaring: Type<'l>,
    row: u32,
}

impl<'l> Event<'l> {
    pub fn declaring_type(&self) -> Type<'l> {
        self.declaring
    }

    fn event(&self) -> Result<EventRow<'l>> {
        self.declaring.assembly().database().row(self.row)
    }

    pub fn name(&self) -> Result<&'l str> {
        let row = self.event()?;
        self.declaring.assembly().database().string(row.name()?)
    }

    pub fn attributes(&self) -> Result<EventAttributes> {
        self.event()?.flags()
    }

    /// The delegate type, as an unresolved TypeDefOrRef reference.
    pub fn event_type(&self) -> Result<FullReference<'l>> {
        let row = self.event()?;
        Ok(FullReference::new(
            self.declaring.assembly().database(),
            row.event_type()?.row(),
        ))
    }

    pub fn metadata_row(&self) -> RowReference {
        RowReference::new(TableKind::Event, self.row)
    }

    pub fn custom_attributes(&self) -> Result<CustomAttributes<'l>> {
        attributes_for(self.declaring.assembly(), self.metadata_row())
    }
}

/// Properties of one type, via its `PropertyMap` range.
#[derive(Clone)]
pub struct Properties<'l> {
    declaring: Type<'l>,
    next: u32,
    end: u32,
}

impl<'l> Properties<'l> {
    pub(crate) fn for_type(declaring: Type<'l>) -> Result<Self> {
        let database = declaring.assembly().database();
        let (next, end) = owner_map_range(
            database,
            declaring.row_index(),
            TableKind::PropertyMap,
            TableKind::Property,
        )?;
        Ok(Self {
            declaring,
            next,
            end,
        })
    }
}

impl<'l> Iterator for Properties<'l> {
    type Item = Property<'l>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let property = Property {
            declaring: self.declaring,
            row: self.next,
        };
        self.next += 1;
        Some(property)
    }
}

/// Events of one type, via its `EventMap` range.
#[derive(Clone)]
pub struct Events<'l> {
    declaring: Type<'l>,
    next: u32,
    end: u32,
}

impl<'l> Events<'l> {
    pub(crate) fn for_type(declaring: Type<'l>) -> Result<Self> {
        let database = declaring.assembly().database();
        let (next, end) = owner_map_range(
            database,
            declaring.row_index(),
            TableKind::EventMap,
            TableKind::Event,
        )?;
        Ok(Self {
            declaring,
            next,
            end,
        })
    }
}

impl<'l> Iterator for Events<'l> {
    type Item = Event<'l>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let event = Event {
            declaring: self.declaring,
            row: self.next,
        };
        self.next += 1;
        Some(event)
    }
}

/// Finds the `PropertyMap`/`EventMap` row for a type and returns its
/// member range. Map tables are not required to be sorted, so this is a
/// linear scan.
fn owner_map_range(
    database: &Database,
    type_row: u32,
    map_table: TableKind,
    member_table: TableKind,
) -> Result<(u32, u32)> {
    let map_count = database.row_count(map_table);
    let member_count = database.row_count(member_table);
    for map_row in 1..=map_count {
        let parent = database.col_index(map_table, map_row, 0)?;
        if parent.index() != type_row {
            continue;
        }
        let first = database.col_index(map_table, map_row, 1)?.index();
        let last = if map_row < map_count {
            database.col_index(map_table, map_row + 1, 1)?.index()
        } else {
            member_count + 1
        };
        if first == 0 || first > last || last > member_count + 1 {
            return Err(Error::corrupt(format!(
                "invalid {map_table:?} range [{first}, {last}) for TypeDef[{type_row}]"
            )));
        }
        return Ok((first, last));
    }
    Ok((1, 1))
}

// -- generic parameters -----------------------------------------------------

/// A generic parameter row of a type or method.
#[derive(Copy, Clone)]
pub struct GenericParam<'l> {
    assembly: Assembly<'l>,
    row: u32,
}

impl<'l> GenericParam<'l> {
    fn generic_param(&self) -> Result<GenericParamRow<'l>> {
        self.assembly.database().row(self.row)
    }

    pub fn name(&self) -> Result<&'l str> {
        let row = self.generic_param()?;
        self.assembly.database().string(row.name()?)
    }

    /// Zero-based position in the owner's parameter list.
    pub fn number(&self) -> Result<u32> {
        self.generic_param()?.number()
    }

    pub fn attributes(&self) -> Result<GenericParamAttributes> {
        self.generic_param()?.flags()
    }

    /// The owning TypeDef or MethodDef.
    pub fn owner(&self) -> Result<RowReference> {
        Ok(self.generic_param()?.owner()?.row())
    }

    pub fn metadata_row(&self) -> RowReference {
        RowReference::new(TableKind::GenericParam, self.row)
    }

    pub fn custom_attributes(&self) -> Result<CustomAttributes<'l>> {
        attributes_for(self.assembly, self.metadata_row())
    }
}

/// Generic parameters of one owner, in `Number` order (the table is
/// sorted by owner, then number).
#[derive(Clone)]
pub struct GenericParams<'l> {
    assembly: Assembly<'l>,
    next: u32,
    end: u32,
}

impl<'l> GenericParams<'l> {
    pub(crate) fn for_owner(assembly: Assembly<'l>, owner: RowReference) -> Result<Self> {
        let database = assembly.database();
        let probe = crate::raw::indices::CodedKind::TypeOrMethodDef.encode(owner)?;
        let (next, end) = database.equal_range(TableKind::GenericParam, probe)?;
        Ok(Self {
            assembly,
            next,
            end,
        })
    }
}

impl<'l> Iterator for GenericParams<'l> {
    type Item = GenericParam<'l>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let param = GenericParam {
            assembly: self.assembly,
            row: self.next,
        };
        self.next += 1;
        Some(param)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GenericParams<'_> {}
