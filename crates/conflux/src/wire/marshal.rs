//! Object → wire document conversion.

use serde_json::{Map, Value};

use super::schema::{FieldDescriptor, FieldOrigin, WireObject};
use super::value::FieldValue;
use super::ConvertError;
use crate::headers::Headers;

/// Convert an object graph to a wire document.
///
/// Fields are walked in declaration order. Header-bound fields are
/// stringified onto `headers` as a side effect and do not appear in the
/// returned document. Body-bound fields with a dotted wire name
/// materialize the nested document nodes along the path.
pub fn marshal(obj: &dyn WireObject, headers: &mut Headers) -> Result<Value, ConvertError> {
    let mut doc = Map::new();
    marshal_into(obj, &mut doc, headers)?;
    Ok(Value::Object(doc))
}

fn marshal_into(
    obj: &dyn WireObject,
    doc: &mut Map<String, Value>,
    headers: &mut Headers,
) -> Result<(), ConvertError> {
    for field in obj.schema().fields {
        let value = (field.get)(obj);
        match field.origin {
            FieldOrigin::Header => {
                if let Some(text) = value.to_header_string() {
                    headers.insert(field.wire_name, text);
                }
            }
            FieldOrigin::Body => {
                let node = to_document(field, value, headers)?;
                attach(doc, field.wire_name, node);
            }
        }
    }
    Ok(())
}

/// Convert one field value to a document node. Nested objects may write
/// their own header-bound fields onto the shared outgoing header map.
fn to_document(
    field: &FieldDescriptor,
    value: FieldValue,
    headers: &mut Headers,
) -> Result<Value, ConvertError> {
    let node = match value {
        FieldValue::Short(v) => Value::from(v),
        FieldValue::Int(v) => Value::from(v),
        FieldValue::Long(v) => Value::from(v),
        FieldValue::Float(v) => float_node(f64::from(v)),
        FieldValue::Double(v) => float_node(v),
        FieldValue::Bool(v) => Value::Bool(v),
        FieldValue::Str(v) => v.map(Value::String).unwrap_or(Value::Null),
        FieldValue::List(items) => match items {
            Some(items) => {
                let mut nodes = Vec::with_capacity(items.len());
                for item in items {
                    nodes.push(to_document(field, item, headers)?);
                }
                Value::Array(nodes)
            }
            None => Value::Null,
        },
        FieldValue::Object(nested) => match nested {
            Some(nested) => {
                let mut child = Map::new();
                marshal_into(&*nested, &mut child, headers)?;
                Value::Object(child)
            }
            None => Value::Null,
        },
    };
    Ok(node)
}

fn float_node(v: f64) -> Value {
    // Non-finite floats have no JSON representation.
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Attach a node at a (possibly dotted) wire path, creating intermediate
/// object nodes as needed. A non-object intermediate is replaced.
fn attach(doc: &mut Map<String, Value>, path: &str, node: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for segment in &segments[..segments.len() - 1] {
        let entry = current
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry
            .as_object_mut()
            .expect("intermediate node was just made an object");
    }
    current.insert(segments[segments.len() - 1].to_string(), node);
}
