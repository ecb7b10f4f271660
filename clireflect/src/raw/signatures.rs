//! Recursive-descent decoding of signature blobs (ECMA-335 II.23.2).
//!
//! Signatures are lazy trees: every node borrows its byte range from the
//! blob heap and re-parses on demand, so re-parsing is idempotent and
//! nothing is materialized until asked for. Construction (`from_blob` /
//! `read`) walks the full grammar once to validate, which lets the
//! accessors below stay infallible about framing.

use std::fmt::{Display, Formatter};

use crate::error::{Error, Result};
use crate::raw::indices::{CodedKind, RowReference};
use crate::utilities::ByteReader;

/// Element type codes (ECMA-335 II.23.1.16).
pub(crate) mod element {
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const PTR: u8 = 0x0F;
    pub const BYREF: u8 = 0x10;
    pub const VALUETYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    pub const ARRAY: u8 = 0x14;
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    pub const FNPTR: u8 = 0x1B;
    pub const OBJECT: u8 = 0x1C;
    pub const SZARRAY: u8 = 0x1D;
    pub const MVAR: u8 = 0x1E;
    pub const CMOD_REQD: u8 = 0x1F;
    pub const CMOD_OPT: u8 = 0x20;
    pub const SENTINEL: u8 = 0x41;
    pub const PINNED: u8 = 0x45;
}

/// Built-in element types that carry no operands.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PrimitiveKind {
    Void,
    Boolean,
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    IntPtr,
    UIntPtr,
    Object,
    TypedByRef,
}

impl PrimitiveKind {
    fn from_element(value: u8) -> Option<Self> {
        Some(match value {
            element::VOID => Self::Void,
            element::BOOLEAN => Self::Boolean,
            element::CHAR => Self::Char,
            element::I1 => Self::Int8,
            element::U1 => Self::UInt8,
            element::I2 => Self::Int16,
            element::U2 => Self::UInt16,
            element::I4 => Self::Int32,
            element::U4 => Self::UInt32,
            element::I8 => Self::Int64,
            element::U8 => Self::UInt64,
            element::R4 => Self::Float32,
            element::R8 => Self::Float64,
            element::STRING => Self::String,
            element::I => Self::IntPtr,
            element::U => Self::UIntPtr,
            element::OBJECT => Self::Object,
            element::TYPEDBYREF => Self::TypedByRef,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Boolean => "bool",
            Self::Char => "char",
            Self::Int8 => "sbyte",
            Self::UInt8 => "byte",
            Self::Int16 => "short",
            Self::UInt16 => "ushort",
            Self::Int32 => "int",
            Self::UInt32 => "uint",
            Self::Int64 => "long",
            Self::UInt64 => "ulong",
            Self::Float32 => "float",
            Self::Float64 => "double",
            Self::String => "string",
            Self::IntPtr => "nint",
            Self::UIntPtr => "nuint",
            Self::Object => "object",
            Self::TypedByRef => "typedref",
        }
    }
}

/// First byte of method, field, property and local signatures
/// (ECMA-335 II.23.2.1/.2.3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct CallingConvention(pub u8);

impl CallingConvention {
    pub const DEFAULT: u8 = 0x00;
    pub const VARARG: u8 = 0x05;
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const GENERIC: u8 = 0x10;
    pub const HAS_THIS: u8 = 0x20;
    pub const EXPLICIT_THIS: u8 = 0x40;

    #[inline]
    pub fn kind(self) -> u8 {
        self.0 & 0x0F
    }

    pub fn is_method(self) -> bool {
        matches!(self.kind(), Self::DEFAULT | Self::VARARG)
    }

    pub fn is_vararg(self) -> bool {
        self.kind() == Self::VARARG
    }

    pub fn is_field(self) -> bool {
        self.kind() == Self::FIELD
    }

    pub fn is_property(self) -> bool {
        self.kind() == Self::PROPERTY
    }

    pub fn has_this(self) -> bool {
        self.0 & Self::HAS_THIS != 0
    }

    pub fn has_explicit_this(self) -> bool {
        self.0 & Self::EXPLICIT_THIS != 0
    }

    pub fn is_generic(self) -> bool {
        self.0 & Self::GENERIC != 0
    }
}

fn read_type_def_or_ref(reader: &mut ByteReader<'_>) -> Result<RowReference> {
    let value = reader.compressed_u32()?;
    CodedKind::TypeDefOrRef.decode(value)
}

fn skip_custom_modifiers(reader: &mut ByteReader<'_>) -> Result<()> {
    while matches!(
        reader.peek(),
        Some(element::CMOD_REQD) | Some(element::CMOD_OPT)
    ) {
        reader.skip(1)?;
        read_type_def_or_ref(reader)?;
    }
    Ok(())
}

/// One type encoding inside a signature blob. Holds the node's full byte
/// range (leading custom modifiers included); [`TypeSignature::node`]
/// parses one level on demand.
#[derive(Copy, Clone)]
pub struct TypeSignature<'l>(&'l [u8]);

impl<'l> TypeSignature<'l> {
    /// Parses a standalone type blob (e.g. a TypeSpec signature).
    pub fn from_blob(data: &'l [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        Self::read(&mut reader)
    }

    /// Validates one type encoding and captures its byte range.
    pub(crate) fn read(reader: &mut ByteReader<'l>) -> Result<Self> {
        let start = reader.position();
        parse_node(reader)?;
        Ok(Self(reader.consumed_since(start)))
    }

    pub fn bytes(&self) -> &'l [u8] {
        self.0
    }

    /// Parses the top level of this node. Children come back as further
    /// [`TypeSignature`] ranges.
    pub fn node(&self) -> Result<TypeNode<'l>> {
        parse_node(&mut ByteReader::new(self.0))
    }

    /// The custom modifiers preceding the type proper.
    pub fn modifiers(&self) -> CustomModifiers<'l> {
        CustomModifiers {
            reader: ByteReader::new(self.0),
        }
    }

    /// Structural comparison; two nodes are equal when their trees decode
    /// identically (row references compare nominally).
    pub fn structurally_equals(&self, other: &TypeSignature<'_>) -> Result<bool> {
        Ok(match (self.node()?, other.node()?) {
            (TypeNode::Primitive(a), TypeNode::Primitive(b)) => a == b,
            (TypeNode::Class(a), TypeNode::Class(b)) => a == b,
            (TypeNode::ValueType(a), TypeNode::ValueType(b)) => a == b,
            (TypeNode::Pointer(a), TypeNode::Pointer(b))
            | (TypeNode::ByRef(a), TypeNode::ByRef(b))
            | (TypeNode::SzArray(a), TypeNode::SzArray(b))
            | (TypeNode::Pinned(a), TypeNode::Pinned(b)) => a.structurally_equals(&b)?,
            (TypeNode::Array(a, shape_a), TypeNode::Array(b, shape_b)) => {
                shape_a == shape_b && a.structurally_equals(&b)?
            }
            (
                TypeNode::GenericInst {
                    value_type: vt_a,
                    definition: def_a,
                    arguments: args_a,
                },
                TypeNode::GenericInst {
                    value_type: vt_b,
                    definition: def_b,
                    arguments: args_b,
                },
            ) => {
                if vt_a != vt_b || def_a != def_b || args_a.len() != args_b.len() {
                    return Ok(false);
                }
                for (a, b) in args_a.zip(args_b) {
                    if !a?.structurally_equals(&b?)? {
                        return Ok(false);
                    }
                }
                true
            }
            (TypeNode::Var(a), TypeNode::Var(b)) | (TypeNode::MVar(a), TypeNode::MVar(b)) => {
                a == b
            }
            (TypeNode::FnPtr(a), TypeNode::FnPtr(b)) => a.structurally_equals(&b)?,
            _ => false,
        })
    }
}

/// One parsed level of a type encoding.
#[derive(Clone)]
pub enum TypeNode<'l> {
    Primitive(PrimitiveKind),
    /// `CLASS TypeDefOrRef`.
    Class(RowReference),
    /// `VALUETYPE TypeDefOrRef`.
    ValueType(RowReference),
    Pointer(TypeSignature<'l>),
    ByRef(TypeSignature<'l>),
    SzArray(TypeSignature<'l>),
    Array(TypeSignature<'l>, ArrayShape),
    GenericInst {
        value_type: bool,
        definition: RowReference,
        arguments: GenericArguments<'l>,
    },
    /// Generic parameter of the enclosing type.
    Var(u32),
    /// Generic parameter of the enclosing method.
    MVar(u32),
    FnPtr(MethodSignature<'l>),
    /// Local-variable pinning constraint.
    Pinned(TypeSignature<'l>),
}

fn parse_node<'l>(reader: &mut ByteReader<'l>) -> Result<TypeNode<'l>> {
    skip_custom_modifiers(reader)?;
    let offset = reader.position();
    let value = reader.u8()?;
    if let Some(primitive) = PrimitiveKind::from_element(value) {
        return Ok(TypeNode::Primitive(primitive));
    }
    match value {
        element::VALUETYPE => Ok(TypeNode::ValueType(read_type_def_or_ref(reader)?)),
        element::CLASS => Ok(TypeNode::Class(read_type_def_or_ref(reader)?)),
        element::PTR => Ok(TypeNode::Pointer(TypeSignature::read(reader)?)),
        element::BYREF => Ok(TypeNode::ByRef(TypeSignature::read(reader)?)),
        element::SZARRAY => Ok(TypeNode::SzArray(TypeSignature::read(reader)?)),
        element::ARRAY => {
            let element_type = TypeSignature::read(reader)?;
            let shape = ArrayShape::read(reader)?;
            Ok(TypeNode::Array(element_type, shape))
        }
        element::GENERICINST => {
            let head = reader.u8()?;
            let value_type = match head {
                element::VALUETYPE => true,
                element::CLASS => false,
                _ => {
                    return Err(Error::corrupt(format!(
                        "generic instantiation must be a class or value type, got {head:#04x}"
                    )))
                }
            };
            let definition = read_type_def_or_ref(reader)?;
            let count = reader.compressed_u32()?;
            if count as usize > reader.remaining() {
                return Err(Error::corrupt(format!(
                    "generic argument count {count} exceeds the blob"
                )));
            }
            let start = reader.position();
            for _ in 0..count {
                TypeSignature::read(reader)?;
            }
            Ok(TypeNode::GenericInst {
                value_type,
                definition,
                arguments: GenericArguments {
                    data: reader.consumed_since(start),
                    count,
                },
            })
        }
        element::VAR => Ok(TypeNode::Var(reader.compressed_u32()?)),
        element::MVAR => Ok(TypeNode::MVar(reader.compressed_u32()?)),
        element::FNPTR => Ok(TypeNode::FnPtr(MethodSignature::read(reader)?)),
        element::PINNED => Ok(TypeNode::Pinned(TypeSignature::read(reader)?)),
        _ => Err(Error::corrupt(format!(
            "unknown element type {value:#04x} at offset {offset}"
        ))),
    }
}

/// Lazy list of `CMOD_OPT`/`CMOD_REQD` modifiers at the head of a node.
#[derive(Clone)]
pub struct CustomModifiers<'l> {
    reader: ByteReader<'l>,
}

impl Iterator for CustomModifiers<'_> {
    /// `(required, modifier type)` pairs.
    type Item = Result<(bool, RowReference)>;

    fn next(&mut self) -> Option<Self::Item> {
        let required = match self.reader.peek() {
            Some(element::CMOD_REQD) => true,
            Some(element::CMOD_OPT) => false,
            _ => return None,
        };
        if let Err(error) = self.reader.skip(1) {
            return Some(Err(error));
        }
        Some(read_type_def_or_ref(&mut self.reader).map(|row| (required, row)))
    }
}

/// General array shape: rank plus optional per-dimension sizes and lower
/// bounds.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ArrayShape {
    pub rank: u32,
    pub sizes: Vec<u32>,
    pub lo_bounds: Vec<i32>,
}

impl ArrayShape {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let rank = reader.compressed_u32()?;
        let size_count = reader.compressed_u32()?;
        if size_count as usize > reader.remaining() {
            return Err(Error::corrupt("array shape sizes exceed the blob"));
        }
        let mut sizes = Vec::with_capacity(size_count as usize);
        for _ in 0..size_count {
            sizes.push(reader.compressed_u32()?);
        }
        let bound_count = reader.compressed_u32()?;
        if bound_count as usize > reader.remaining() {
            return Err(Error::corrupt("array shape bounds exceed the blob"));
        }
        let mut lo_bounds = Vec::with_capacity(bound_count as usize);
        for _ in 0..bound_count {
            lo_bounds.push(reader.compressed_i32()?);
        }
        Ok(Self {
            rank,
            sizes,
            lo_bounds,
        })
    }
}

/// Lazy generic-argument list of a `GENERICINST` node.
#[derive(Clone)]
pub struct GenericArguments<'l> {
    data: &'l [u8],
    count: u32,
}

impl<'l> GenericArguments<'l> {
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u32 {
        self.count
    }
}

impl<'l> Iterator for GenericArguments<'l> {
    type Item = Result<TypeSignature<'l>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.count == 0 {
            return None;
        }
        let mut reader = ByteReader::new(self.data);
        match TypeSignature::read(&mut reader) {
            Ok(signature) => {
                self.data = reader.rest();
                self.count -= 1;
                Some(Ok(signature))
            }
            Err(error) => {
                self.count = 0;
                Some(Err(error))
            }
        }
    }
}

/// A MethodDefSig/MethodRefSig (also the payload of `FNPTR`).
#[derive(Copy, Clone)]
pub struct MethodSignature<'l>(&'l [u8]);

fn read_method_header(reader: &mut ByteReader<'_>) -> Result<(CallingConvention, u32, u32)> {
    let convention = CallingConvention(reader.u8()?);
    if !convention.is_method() {
        return Err(Error::corrupt(format!(
            "not a method signature: calling convention {:#04x}",
            convention.0
        )));
    }
    let generic_param_count = if convention.is_generic() {
        reader.compressed_u32()?
    } else {
        0
    };
    let param_count = reader.compressed_u32()?;
    if param_count as usize > reader.remaining() {
        return Err(Error::corrupt(format!(
            "parameter count {param_count} exceeds the blob"
        )));
    }
    Ok((convention, generic_param_count, param_count))
}

impl<'l> MethodSignature<'l> {
    pub fn from_blob(data: &'l [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        Self::read(&mut reader)
    }

    /// Validates a full method signature and captures its byte range.
    pub(crate) fn read(reader: &mut ByteReader<'l>) -> Result<Self> {
        let start = reader.position();
        let (_, _, param_count) = read_method_header(reader)?;
        TypeSignature::read(reader)?;
        let mut remaining = param_count;
        while remaining > 0 {
            if reader.peek() == Some(element::SENTINEL) {
                reader.skip(1)?;
                continue;
            }
            TypeSignature::read(reader)?;
            remaining -= 1;
        }
        Ok(Self(reader.consumed_since(start)))
    }

    pub fn bytes(&self) -> &'l [u8] {
        self.0
    }

    pub fn calling_convention(&self) -> Result<CallingConvention> {
        let mut reader = ByteReader::new(self.0);
        Ok(CallingConvention(reader.u8()?))
    }

    pub fn parse(&self) -> Result<ParsedMethod<'l>> {
        let mut reader = ByteReader::new(self.0);
        let (convention, generic_param_count, param_count) = read_method_header(&mut reader)?;
        let return_type = TypeSignature::read(&mut reader)?;
        Ok(ParsedMethod {
            convention,
            generic_param_count,
            param_count,
            return_type,
            parameters: ParameterSignatures {
                data: reader.rest(),
                remaining: param_count,
            },
        })
    }

    pub fn structurally_equals(&self, other: &MethodSignature<'_>) -> Result<bool> {
        let a = self.parse()?;
        let b = other.parse()?;
        if a.convention != b.convention
            || a.generic_param_count != b.generic_param_count
            || a.param_count != b.param_count
            || !a.return_type.structurally_equals(&b.return_type)?
        {
            return Ok(false);
        }
        for (left, right) in a.parameters.zip(b.parameters) {
            if !left?.structurally_equals(&right?)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub struct ParsedMethod<'l> {
    pub convention: CallingConvention,
    pub generic_param_count: u32,
    pub param_count: u32,
    pub return_type: TypeSignature<'l>,
    pub parameters: ParameterSignatures<'l>,
}

/// Lazy parameter-type list; vararg sentinels are skipped transparently.
#[derive(Clone)]
pub struct ParameterSignatures<'l> {
    data: &'l [u8],
    remaining: u32,
}

impl<'l> Iterator for ParameterSignatures<'l> {
    type Item = Result<TypeSignature<'l>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let mut reader = ByteReader::new(self.data);
        while reader.peek() == Some(element::SENTINEL) {
            if let Err(error) = reader.skip(1) {
                self.remaining = 0;
                return Some(Err(error));
            }
        }
        match TypeSignature::read(&mut reader) {
            Ok(signature) => {
                self.data = reader.rest();
                self.remaining -= 1;
                Some(Ok(signature))
            }
            Err(error) => {
                self.remaining = 0;
                Some(Err(error))
            }
        }
    }
}

/// A FieldSig: `0x06 CustomMod* Type`.
#[derive(Copy, Clone)]
pub struct FieldSignature<'l>(&'l [u8]);

impl<'l> FieldSignature<'l> {
    pub fn from_blob(data: &'l [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let convention = CallingConvention(reader.u8()?);
        if !convention.is_field() {
            return Err(Error::corrupt(format!(
                "not a field signature: calling convention {:#04x}",
                convention.0
            )));
        }
        TypeSignature::read(&mut reader)?;
        Ok(Self(data))
    }

    pub fn bytes(&self) -> &'l [u8] {
        self.0
    }

    pub fn field_type(&self) -> Result<TypeSignature<'l>> {
        let mut reader = ByteReader::new(self.0);
        reader.skip(1)?;
        TypeSignature::read(&mut reader)
    }
}

/// A PropertySig: `0x08 [HASTHIS] ParamCount CustomMod* Type Param*`.
#[derive(Copy, Clone)]
pub struct PropertySignature<'l>(&'l [u8]);

impl<'l> PropertySignature<'l> {
    pub fn from_blob(data: &'l [u8]) -> Result<Self> {
        let signature = Self(data);
        let parsed = signature.parse()?;
        let mut parameters = parsed.parameters;
        parameters.try_for_each(|parameter| parameter.map(|_| ()))?;
        Ok(signature)
    }

    pub fn bytes(&self) -> &'l [u8] {
        self.0
    }

    pub fn parse(&self) -> Result<ParsedProperty<'l>> {
        let mut reader = ByteReader::new(self.0);
        let convention = CallingConvention(reader.u8()?);
        if !convention.is_property() {
            return Err(Error::corrupt(format!(
                "not a property signature: calling convention {:#04x}",
                convention.0
            )));
        }
        let param_count = reader.compressed_u32()?;
        if param_count as usize > reader.remaining() {
            return Err(Error::corrupt(format!(
                "parameter count {param_count} exceeds the blob"
            )));
        }
        let property_type = TypeSignature::read(&mut reader)?;
        Ok(ParsedProperty {
            has_this: convention.has_this(),
            param_count,
            property_type,
            parameters: ParameterSignatures {
                data: reader.rest(),
                remaining: param_count,
            },
        })
    }
}

pub struct ParsedProperty<'l> {
    pub has_this: bool,
    pub param_count: u32,
    pub property_type: TypeSignature<'l>,
    pub parameters: ParameterSignatures<'l>,
}

/// A LocalVarSig: `0x07 Count Local*`.
#[derive(Copy, Clone)]
pub struct LocalVariableSignature<'l>(&'l [u8]);

impl<'l> LocalVariableSignature<'l> {
    pub fn from_blob(data: &'l [u8]) -> Result<Self> {
        let signature = Self(data);
        let mut locals = signature.locals()?;
        locals.try_for_each(|local| local.map(|_| ()))?;
        Ok(signature)
    }

    pub fn bytes(&self) -> &'l [u8] {
        self.0
    }

    pub fn locals(&self) -> Result<ParameterSignatures<'l>> {
        let mut reader = ByteReader::new(self.0);
        let convention = CallingConvention(reader.u8()?);
        if convention.kind() != CallingConvention::LOCAL_SIG {
            return Err(Error::corrupt(format!(
                "not a local variable signature: calling convention {:#04x}",
                convention.0
            )));
        }
        let count = reader.compressed_u32()?;
        if count as usize > reader.remaining() {
            return Err(Error::corrupt(format!(
                "local count {count} exceeds the blob"
            )));
        }
        Ok(ParameterSignatures {
            data: reader.rest(),
            remaining: count,
        })
    }
}

// -- pretty printing ------------------------------------------------------
//
// The rendering is deterministic over the decoded tree, with row
// references printed nominally; it exists for diagnostics and for
// comparing decoded signatures in tests.

impl Display for TypeSignature<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.node() {
            Ok(node) => Display::fmt(&node, f),
            Err(_) => f.write_str("<invalid>"),
        }
    }
}

impl Display for TypeNode<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeNode::Primitive(primitive) => f.write_str(primitive.name()),
            TypeNode::Class(row) => write!(f, "class {row}"),
            TypeNode::ValueType(row) => write!(f, "valuetype {row}"),
            TypeNode::Pointer(inner) => write!(f, "{inner}*"),
            TypeNode::ByRef(inner) => write!(f, "ref {inner}"),
            TypeNode::SzArray(inner) => write!(f, "{inner}[]"),
            TypeNode::Array(inner, shape) => {
                write!(f, "{inner}[rank {}", shape.rank)?;
                if !shape.sizes.is_empty() {
                    write!(f, "; sizes {:?}", shape.sizes)?;
                }
                if !shape.lo_bounds.is_empty() {
                    write!(f, "; bounds {:?}", shape.lo_bounds)?;
                }
                f.write_str("]")
            }
            TypeNode::GenericInst {
                value_type,
                definition,
                arguments,
            } => {
                let prefix = if *value_type { "valuetype" } else { "class" };
                write!(f, "{prefix} {definition}<")?;
                for (position, argument) in arguments.clone().enumerate() {
                    if position > 0 {
                        f.write_str(", ")?;
                    }
                    match argument {
                        Ok(argument) => Display::fmt(&argument, f)?,
                        Err(_) => f.write_str("<invalid>")?,
                    }
                }
                f.write_str(">")
            }
            TypeNode::Var(number) => write!(f, "!{number}"),
            TypeNode::MVar(number) => write!(f, "!!{number}"),
            TypeNode::FnPtr(method) => write!(f, "fnptr {method}"),
            TypeNode::Pinned(inner) => write!(f, "pinned {inner}"),
        }
    }
}

impl Display for MethodSignature<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let Ok(parsed) = self.parse() else {
            return f.write_str("<invalid>");
        };
        if parsed.convention.has_this() {
            f.write_str("instance ")?;
        }
        if parsed.convention.is_vararg() {
            f.write_str("vararg ")?;
        }
        if parsed.generic_param_count > 0 {
            write!(f, "generic<{}> ", parsed.generic_param_count)?;
        }
        write!(f, "{} (", parsed.return_type)?;
        for (position, parameter) in parsed.parameters.enumerate() {
            if position > 0 {
                f.write_str(", ")?;
            }
            match parameter {
                Ok(parameter) => Display::fmt(&parameter, f)?,
                Err(_) => f.write_str("<invalid>")?,
            }
        }
        f.write_str(")")
    }
}
