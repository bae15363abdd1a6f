//! Wire document → object conversion.

use serde_json::Value;

use super::schema::{ElemKind, FieldDescriptor, FieldKind, FieldOrigin, ScalarKind, WireObject};
use super::value::FieldValue;
use super::{document_kind, ConvertError};
use crate::headers::Headers;

/// Populate a fresh `T` from a wire document and a response header map.
///
/// A missing leaf anywhere along a field's wire path yields the zero value
/// for numerics/booleans and `None` for strings/objects/sequences, never
/// an error. An unexpected value type at a present leaf is a
/// [`ConvertError`].
pub fn unmarshal<T>(doc: &Value, headers: &Headers) -> Result<T, ConvertError>
where
    T: WireObject + Default + 'static,
{
    let mut obj = T::default();
    unmarshal_into(&mut obj, doc, headers)?;
    Ok(obj)
}

/// Populate an existing object from a wire document and header map.
pub fn unmarshal_into(
    obj: &mut dyn WireObject,
    doc: &Value,
    headers: &Headers,
) -> Result<(), ConvertError> {
    let schema = obj.schema();
    for field in schema.fields {
        // Diagnostics carry the qualified `Type.field` name.
        let qualified = format!("{}.{}", schema.type_name, field.field_name);
        let value = match field.origin {
            FieldOrigin::Header => {
                from_header(field, &qualified, headers.get_ignore_case(field.wire_name))?
            }
            FieldOrigin::Body => {
                from_document(field, &qualified, resolve(doc, field.wire_name), headers)?
            }
        };
        (field.set)(obj, value)?;
    }
    Ok(())
}

/// Resolve a (possibly dotted) wire path against the document.
fn resolve<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Parse a stored header string back into the declared primitive type.
fn from_header(
    field: &FieldDescriptor,
    qualified: &str,
    text: Option<&str>,
) -> Result<FieldValue, ConvertError> {
    let kind = match field.kind {
        FieldKind::Scalar(kind) => kind,
        // The derive rejects non-scalar header fields.
        _ => return Err(ConvertError::mismatch(qualified, "scalar", "header")),
    };

    let text = match text {
        Some(text) => text,
        None => return Ok(zero_value(kind)),
    };

    let parse_err = |e: &dyn std::fmt::Display| {
        ConvertError::parse(qualified, format!("invalid header value: {e}"))
    };

    let value = match kind {
        ScalarKind::Short => FieldValue::Short(text.parse().map_err(|e| parse_err(&e))?),
        ScalarKind::Int => FieldValue::Int(text.parse().map_err(|e| parse_err(&e))?),
        ScalarKind::Long => FieldValue::Long(text.parse().map_err(|e| parse_err(&e))?),
        ScalarKind::Float => FieldValue::Float(text.parse().map_err(|e| parse_err(&e))?),
        ScalarKind::Double => FieldValue::Double(text.parse().map_err(|e| parse_err(&e))?),
        ScalarKind::Bool => match text {
            "true" | "1" => FieldValue::Bool(true),
            "false" | "0" => FieldValue::Bool(false),
            other => {
                return Err(ConvertError::parse(
                    qualified,
                    format!("invalid boolean header value: {other:?}"),
                ))
            }
        },
        ScalarKind::Str => FieldValue::Str(Some(text.to_string())),
    };
    Ok(value)
}

/// Convert a resolved document node into the declared field kind.
fn from_document(
    field: &FieldDescriptor,
    qualified: &str,
    node: Option<&Value>,
    headers: &Headers,
) -> Result<FieldValue, ConvertError> {
    let node = match node {
        Some(Value::Null) | None => return Ok(absent_value(&field.kind)),
        Some(node) => node,
    };

    match &field.kind {
        FieldKind::Scalar(kind) => scalar_from(*kind, node, qualified),
        FieldKind::List(elem) => {
            let items = node
                .as_array()
                .ok_or_else(|| ConvertError::mismatch(qualified, "list", document_kind(node)))?;
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                let value = match elem {
                    ElemKind::Scalar(kind) => scalar_from(*kind, item, qualified)?,
                    ElemKind::Object(schema) => object_from(schema(), item, headers, qualified)?,
                };
                values.push(value);
            }
            Ok(FieldValue::List(Some(values)))
        }
        FieldKind::Object(schema) => object_from(schema(), node, headers, qualified),
    }
}

/// Unmarshal a nested object with a fresh sub-unmarshaller scoped to the
/// node's document.
fn object_from(
    schema: &'static super::Schema,
    node: &Value,
    headers: &Headers,
    qualified: &str,
) -> Result<FieldValue, ConvertError> {
    if !node.is_object() {
        return Err(ConvertError::mismatch(
            qualified,
            schema.type_name,
            document_kind(node),
        ));
    }
    let mut nested = (schema.create)();
    unmarshal_into(&mut *nested, node, headers)?;
    Ok(FieldValue::Object(Some(nested)))
}

/// Convert a scalar document node with numeric widening: an integral
/// literal may populate any numeric field or a boolean (`1 == true`); a
/// floating literal may populate either float width.
fn scalar_from(kind: ScalarKind, node: &Value, field: &str) -> Result<FieldValue, ConvertError> {
    let mismatch = || ConvertError::mismatch(field, kind.type_name(), document_kind(node));

    let value = match kind {
        ScalarKind::Short => FieldValue::Short(node.as_i64().ok_or_else(mismatch)? as i16),
        ScalarKind::Int => FieldValue::Int(node.as_i64().ok_or_else(mismatch)? as i32),
        ScalarKind::Long => FieldValue::Long(node.as_i64().ok_or_else(mismatch)?),
        ScalarKind::Float => FieldValue::Float(node.as_f64().ok_or_else(mismatch)? as f32),
        ScalarKind::Double => FieldValue::Double(node.as_f64().ok_or_else(mismatch)?),
        ScalarKind::Bool => match node {
            Value::Bool(v) => FieldValue::Bool(*v),
            Value::Number(n) => FieldValue::Bool(n.as_i64() == Some(1)),
            _ => return Err(mismatch()),
        },
        ScalarKind::Str => match node {
            Value::String(s) => FieldValue::Str(Some(s.clone())),
            _ => return Err(mismatch()),
        },
    };
    Ok(value)
}

fn zero_value(kind: ScalarKind) -> FieldValue {
    match kind {
        ScalarKind::Short => FieldValue::Short(0),
        ScalarKind::Int => FieldValue::Int(0),
        ScalarKind::Long => FieldValue::Long(0),
        ScalarKind::Float => FieldValue::Float(0.0),
        ScalarKind::Double => FieldValue::Double(0.0),
        ScalarKind::Bool => FieldValue::Bool(false),
        ScalarKind::Str => FieldValue::Str(None),
    }
}

fn absent_value(kind: &FieldKind) -> FieldValue {
    match kind {
        FieldKind::Scalar(kind) => zero_value(*kind),
        FieldKind::List(_) => FieldValue::List(None),
        FieldKind::Object(_) => FieldValue::Object(None),
    }
}
