//! Type-erased field values passed between generated accessors and the
//! marshalling walkers.

use std::fmt;

use super::schema::WireObject;

/// An owned, type-erased value of one object member.
///
/// Scalars carry their value directly; strings, sequences, and nested
/// objects are nullable (`None` corresponds to an absent wire value).
pub enum FieldValue {
    /// `i16`
    Short(i16),
    /// `i32`
    Int(i32),
    /// `i64`
    Long(i64),
    /// `f32`
    Float(f32),
    /// `f64`
    Double(f64),
    /// `bool`
    Bool(bool),
    /// Nullable string.
    Str(Option<String>),
    /// Nullable sequence.
    List(Option<Vec<FieldValue>>),
    /// Nullable nested object.
    Object(Option<Box<dyn WireObject>>),
}

impl FieldValue {
    /// A short kind name for conversion diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Short(_) => "i16",
            Self::Int(_) => "i32",
            Self::Long(_) => "i64",
            Self::Float(_) => "f32",
            Self::Double(_) => "f64",
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
        }
    }

    /// Whether this value is an absent string/list/object.
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Str(None) | Self::List(None) | Self::Object(None)
        )
    }

    /// Stringify a scalar value per the fixed primitive-to-string rule:
    /// numeric and boolean types use their canonical decimal form.
    ///
    /// Returns `None` for absent strings and for non-scalar values.
    pub fn to_header_string(&self) -> Option<String> {
        match self {
            Self::Short(v) => Some(v.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::Long(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::Double(v) => Some(v.to_string()),
            Self::Bool(v) => Some(v.to_string()),
            Self::Str(v) => v.clone(),
            Self::List(_) | Self::Object(_) => None,
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short(v) => write!(f, "Short({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Long(v) => write!(f, "Long({v})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::Double(v) => write!(f, "Double({v})"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Str(v) => write!(f, "Str({v:?})"),
            Self::List(Some(v)) => write!(f, "List(len={})", v.len()),
            Self::List(None) => write!(f, "List(None)"),
            Self::Object(Some(v)) => write!(f, "Object({})", v.schema().type_name),
            Self::Object(None) => write!(f, "Object(None)"),
        }
    }
}
