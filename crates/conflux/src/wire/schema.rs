//! Field schemas: the static metadata driving both directions of conversion.
//!
//! A schema is derived once per type by `#[derive(WireObject)]` and treated
//! as immutable thereafter, so it can be freely shared across workers. Each
//! field descriptor records the wire name (or dotted wire path), whether the
//! field is body- or header-bound, the member kind, and a pair of
//! type-erased accessor functions generated by the derive.

use std::any::Any;
use std::fmt;

use super::value::FieldValue;
use super::ConvertError;

/// Where a field's value lives on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldOrigin {
    /// The field maps into the wire document.
    Body,
    /// The field maps onto the header map.
    Header,
}

/// Primitive scalar kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    /// `i16`
    Short,
    /// `i32`
    Int,
    /// `i64`
    Long,
    /// `f32`
    Float,
    /// `f64`
    Double,
    /// `bool`
    Bool,
    /// `Option<String>`
    Str,
}

impl ScalarKind {
    /// The declared Rust type name, used in conversion diagnostics.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Short => "i16",
            Self::Int => "i32",
            Self::Long => "i64",
            Self::Float => "f32",
            Self::Double => "f64",
            Self::Bool => "bool",
            Self::Str => "string",
        }
    }
}

/// Function returning the static schema of a nested object type.
pub type SchemaRef = fn() -> &'static Schema;

/// Element kind of a sequence field.
#[derive(Clone, Copy)]
pub enum ElemKind {
    /// Sequence of primitive scalars.
    Scalar(ScalarKind),
    /// Sequence of nested objects with the given schema.
    Object(SchemaRef),
}

/// The kind of one object member.
#[derive(Clone, Copy)]
pub enum FieldKind {
    /// A primitive scalar.
    Scalar(ScalarKind),
    /// A sequence. Nested sequences are rejected at derive time.
    List(ElemKind),
    /// A nested object with the given schema.
    Object(SchemaRef),
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => write!(f, "Scalar({})", kind.type_name()),
            Self::List(ElemKind::Scalar(kind)) => write!(f, "List({})", kind.type_name()),
            Self::List(ElemKind::Object(schema)) => write!(f, "List({})", schema().type_name),
            Self::Object(schema) => write!(f, "Object({})", schema().type_name),
        }
    }
}

/// Metadata describing how one object member maps to the wire.
pub struct FieldDescriptor {
    /// The Rust field name, for diagnostics.
    pub field_name: &'static str,
    /// Wire name, dotted wire path, or header name.
    pub wire_name: &'static str,
    /// Body- or header-bound.
    pub origin: FieldOrigin,
    /// Member kind.
    pub kind: FieldKind,
    /// Type-erased getter (generated).
    pub get: fn(&dyn WireObject) -> FieldValue,
    /// Type-erased setter (generated).
    pub set: fn(&mut dyn WireObject, FieldValue) -> Result<(), ConvertError>,
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("field_name", &self.field_name)
            .field("wire_name", &self.wire_name)
            .field("origin", &self.origin)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The derived schema of one type: its field descriptors in declaration
/// order plus a factory for creating empty instances during unmarshalling.
pub struct Schema {
    /// The type's name, for diagnostics.
    pub type_name: &'static str,
    /// Field descriptors in declaration order.
    pub fields: &'static [FieldDescriptor],
    /// Create a default instance of the type.
    pub create: fn() -> Box<dyn WireObject>,
}

impl Schema {
    /// Look up a descriptor by its Rust field name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.field_name == name)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .finish()
    }
}

/// A type with a derived wire schema.
///
/// Implemented by `#[derive(WireObject)]`; not intended for manual
/// implementation.
pub trait WireObject: Send {
    /// The static schema of this type.
    fn schema(&self) -> &'static Schema;

    /// Upcast for the generated getters.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for the generated setters.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Consume the box for downcasting nested objects.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl fmt::Debug for dyn WireObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireObject({})", self.schema().type_name)
    }
}
