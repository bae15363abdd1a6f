//! Procedural macros for the conflux wire-schema system.
//!
//! This crate provides the `#[derive(WireObject)]` macro that derives a
//! static field schema for a type, used by the marshalling layer to walk
//! object graphs without per-type hand-written code.
//!
//! # Attributes
//!
//! ## `#[wire(name = "...")]`
//!
//! Overrides the wire name of a body-bound field. A name containing `.`
//! separators addresses a nested location in the wire document:
//!
//! ```ignore
//! #[derive(WireObject, Clone, Default)]
//! struct Echo {
//!     #[wire(name = "args.name")]
//!     name: Option<String>,
//! }
//! ```
//!
//! ## `#[wire(header)]` / `#[wire(header = "X-Name")]`
//!
//! Binds a field to the header map instead of the body. The header name
//! defaults to the field's own name. Header-bound fields must be scalar.
//!
//! ## `#[wire(skip)]`
//!
//! Excludes the field from the schema entirely.
//!
//! # Supported field types
//!
//! Scalars are plain (`i16`, `i32`, `i64`, `f32`, `f64`, `bool`; an absent
//! document value unmarshals to zero/false). Strings, nested objects, and
//! sequences are nullable and must be declared as `Option<String>`,
//! `Option<T>`, and `Option<Vec<T>>` respectively. Nested sequences
//! (`Vec<Vec<T>>`) are rejected. The deriving type must also implement
//! `Clone` and `Default`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, Data, DeriveInput, Expr, ExprLit, Field, Fields, GenericArgument, Ident,
    Lit, PathArguments, Type,
};

/// Derive a static wire schema and the `WireObject` trait.
///
/// This macro generates:
/// - A static `Schema` holding one `FieldDescriptor` per field, in
///   declaration order
/// - Type-erased getter/setter functions for every field
/// - An implementation of the `WireObject` trait and an inherent
///   `wire_schema()` accessor
///
/// # Example
///
/// ```ignore
/// use conflux::prelude::*;
///
/// #[derive(WireObject, Clone, Default)]
/// struct User {
///     id: i64,
///     #[wire(name = "user.name")]
///     name: Option<String>,
///     #[wire(header = "X-Request-Id")]
///     request_id: Option<String>,
/// }
/// ```
#[proc_macro_derive(WireObject, attributes(wire))]
pub fn derive_wire_object(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_derive_wire_object(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Primitive scalar kinds understood by the wire document.
#[derive(Clone, Copy, PartialEq)]
enum Scalar {
    Short,
    Int,
    Long,
    Float,
    Double,
    Bool,
}

/// Element kind of a sequence field.
enum Elem {
    Scalar(Scalar),
    Str,
    Object(Type),
}

/// Shape of one schema field.
enum Shape {
    Scalar(Scalar),
    Str,
    List(Elem),
    Object(Type),
}

/// Parsed information for one schema field.
struct WireField {
    ident: Ident,
    wire_name: String,
    header: bool,
    shape: Shape,
}

fn impl_derive_wire_object(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let schema_name = format_ident!("{}_WIRE_SCHEMA", struct_name.to_string().to_uppercase());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "WireObject derive only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "WireObject derive only supports structs",
            ))
        }
    };

    let mut wire_fields = Vec::new();
    for field in fields.iter() {
        if let Some(parsed) = parse_wire_field(field)? {
            wire_fields.push(parsed);
        }
    }

    let accessor_fns = generate_accessor_fns(struct_name, &wire_fields);
    let descriptors = generate_descriptors(struct_name, &wire_fields);
    let create_name = format_ident!("__{}_create", struct_name.to_string().to_lowercase());

    let expanded = quote! {
        #accessor_fns

        #[allow(non_snake_case)]
        fn #create_name() -> Box<dyn conflux::wire::WireObject> {
            Box::new(<#struct_name as ::std::default::Default>::default())
        }

        /// Static wire schema for this type (generated by #[derive(WireObject)]).
        #[allow(non_upper_case_globals)]
        static #schema_name: conflux::wire::Schema = conflux::wire::Schema {
            type_name: stringify!(#struct_name),
            fields: &#descriptors,
            create: #create_name,
        };

        impl #struct_name {
            /// Reference to the static schema for this type.
            pub fn wire_schema() -> &'static conflux::wire::Schema {
                &#schema_name
            }
        }

        impl conflux::wire::WireObject for #struct_name {
            fn schema(&self) -> &'static conflux::wire::Schema {
                &#schema_name
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn into_any(self: Box<Self>) -> Box<dyn ::std::any::Any> {
                self
            }
        }
    };

    Ok(expanded)
}

/// Parse one struct field into its schema entry, or `None` for skipped fields.
fn parse_wire_field(field: &Field) -> syn::Result<Option<WireField>> {
    let ident = match &field.ident {
        Some(ident) => ident.clone(),
        None => return Ok(None),
    };

    let mut wire_name: Option<String> = None;
    let mut header = false;
    let mut skip = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("wire") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: Expr = meta.value()?.parse()?;
                if let Expr::Lit(ExprLit {
                    lit: Lit::Str(lit_str),
                    ..
                }) = value
                {
                    wire_name = Some(lit_str.value());
                }
                Ok(())
            } else if meta.path.is_ident("header") {
                header = true;
                // Accept both #[wire(header)] and #[wire(header = "X-Name")]
                if let Ok(value) = meta.value() {
                    let value: Expr = value.parse()?;
                    if let Expr::Lit(ExprLit {
                        lit: Lit::Str(lit_str),
                        ..
                    }) = value
                    {
                        wire_name = Some(lit_str.value());
                    }
                }
                Ok(())
            } else if meta.path.is_ident("skip") {
                skip = true;
                Ok(())
            } else {
                Err(meta.error("unrecognized wire attribute"))
            }
        })?;
    }

    if skip {
        return Ok(None);
    }

    let shape = parse_shape(field)?;

    if header && !matches!(shape, Shape::Scalar(_) | Shape::Str) {
        return Err(syn::Error::new_spanned(
            field,
            "header-bound fields must be scalar or Option<String>",
        ));
    }

    Ok(Some(WireField {
        wire_name: wire_name.unwrap_or_else(|| ident.to_string()),
        ident,
        header,
        shape,
    }))
}

/// Classify a field type into its wire shape.
fn parse_shape(field: &Field) -> syn::Result<Shape> {
    if let Some(scalar) = scalar_kind(&field.ty) {
        return Ok(Shape::Scalar(scalar));
    }

    if is_string(&field.ty) {
        return Err(syn::Error::new_spanned(
            field,
            "string fields must be declared as Option<String> (absent values unmarshal to None)",
        ));
    }

    if is_vec(&field.ty).is_some() {
        return Err(syn::Error::new_spanned(
            field,
            "sequence fields must be declared as Option<Vec<T>>",
        ));
    }

    let inner = option_inner(&field.ty).ok_or_else(|| {
        syn::Error::new_spanned(
            field,
            "unsupported field type: expected a scalar, Option<String>, Option<Vec<T>>, \
             or Option<T> where T derives WireObject",
        )
    })?;

    if is_string(inner) {
        return Ok(Shape::Str);
    }

    if let Some(elem_ty) = is_vec(inner) {
        if is_vec(elem_ty).is_some() || option_inner(elem_ty).is_some() {
            return Err(syn::Error::new_spanned(
                field,
                "nested sequences are not supported",
            ));
        }
        let elem = if let Some(scalar) = scalar_kind(elem_ty) {
            Elem::Scalar(scalar)
        } else if is_string(elem_ty) {
            Elem::Str
        } else {
            Elem::Object(elem_ty.clone())
        };
        return Ok(Shape::List(elem));
    }

    if scalar_kind(inner).is_some() {
        return Err(syn::Error::new_spanned(
            field,
            "numeric and boolean fields are not nullable: declare them without Option \
             (absent values unmarshal to zero/false)",
        ));
    }

    Ok(Shape::Object(inner.clone()))
}

/// Match a primitive scalar type by its final path segment.
fn scalar_kind(ty: &Type) -> Option<Scalar> {
    let ident = last_segment_ident(ty)?;
    match ident.as_str() {
        "i16" => Some(Scalar::Short),
        "i32" => Some(Scalar::Int),
        "i64" => Some(Scalar::Long),
        "f32" => Some(Scalar::Float),
        "f64" => Some(Scalar::Double),
        "bool" => Some(Scalar::Bool),
        _ => None,
    }
}

fn is_string(ty: &Type) -> bool {
    last_segment_ident(ty).as_deref() == Some("String")
}

/// Return the `T` of `Option<T>`, if this type is an `Option`.
fn option_inner(ty: &Type) -> Option<&Type> {
    generic_inner(ty, "Option")
}

/// Return the `T` of `Vec<T>`, if this type is a `Vec`.
fn is_vec(ty: &Type) -> Option<&Type> {
    generic_inner(ty, "Vec")
}

fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    if let Type::Path(type_path) = ty {
        let segment = type_path.path.segments.last()?;
        if segment.ident == wrapper {
            if let PathArguments::AngleBracketed(args) = &segment.arguments {
                if let Some(GenericArgument::Type(inner)) = args.args.first() {
                    return Some(inner);
                }
            }
        }
    }
    None
}

fn last_segment_ident(ty: &Type) -> Option<String> {
    if let Type::Path(type_path) = ty {
        type_path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
    } else {
        None
    }
}

fn scalar_tokens(scalar: Scalar) -> TokenStream2 {
    match scalar {
        Scalar::Short => quote! { conflux::wire::ScalarKind::Short },
        Scalar::Int => quote! { conflux::wire::ScalarKind::Int },
        Scalar::Long => quote! { conflux::wire::ScalarKind::Long },
        Scalar::Float => quote! { conflux::wire::ScalarKind::Float },
        Scalar::Double => quote! { conflux::wire::ScalarKind::Double },
        Scalar::Bool => quote! { conflux::wire::ScalarKind::Bool },
    }
}

fn scalar_variant(scalar: Scalar) -> TokenStream2 {
    match scalar {
        Scalar::Short => quote! { Short },
        Scalar::Int => quote! { Int },
        Scalar::Long => quote! { Long },
        Scalar::Float => quote! { Float },
        Scalar::Double => quote! { Double },
        Scalar::Bool => quote! { Bool },
    }
}

fn scalar_type_name(scalar: Scalar) -> &'static str {
    match scalar {
        Scalar::Short => "i16",
        Scalar::Int => "i32",
        Scalar::Long => "i64",
        Scalar::Float => "f32",
        Scalar::Double => "f64",
        Scalar::Bool => "bool",
    }
}

/// Generate the type-erased getter and setter functions for all fields.
fn generate_accessor_fns(struct_name: &Ident, fields: &[WireField]) -> TokenStream2 {
    let fns: Vec<TokenStream2> = fields
        .iter()
        .map(|field| {
            let field_name = &field.ident;
            let getter_name = accessor_ident(struct_name, field_name, "getter");
            let setter_name = accessor_ident(struct_name, field_name, "setter");
            let qualified = format!("{}.{}", struct_name, field_name);

            let (get_body, set_arm, expected) = match &field.shape {
                Shape::Scalar(scalar) => {
                    let variant = scalar_variant(*scalar);
                    (
                        quote! { conflux::wire::FieldValue::#variant(typed.#field_name) },
                        quote! {
                            conflux::wire::FieldValue::#variant(v) => {
                                typed.#field_name = v;
                                Ok(())
                            }
                        },
                        scalar_type_name(*scalar),
                    )
                }
                Shape::Str => (
                    quote! { conflux::wire::FieldValue::Str(typed.#field_name.clone()) },
                    quote! {
                        conflux::wire::FieldValue::Str(v) => {
                            typed.#field_name = v;
                            Ok(())
                        }
                    },
                    "string",
                ),
                Shape::List(elem) => {
                    let (elem_get, elem_set) = elem_conversions(elem, &qualified);
                    (
                        quote! {
                            conflux::wire::FieldValue::List(
                                typed.#field_name.as_ref().map(|items| {
                                    items.iter().map(|item| #elem_get).collect()
                                }),
                            )
                        },
                        quote! {
                            conflux::wire::FieldValue::List(items) => {
                                typed.#field_name = match items {
                                    Some(items) => Some(
                                        items
                                            .into_iter()
                                            .map(|item| #elem_set)
                                            .collect::<::std::result::Result<
                                                Vec<_>,
                                                conflux::wire::ConvertError,
                                            >>()?,
                                    ),
                                    None => None,
                                };
                                Ok(())
                            }
                        },
                        "list",
                    )
                }
                Shape::Object(object_ty) => (
                    quote! {
                        conflux::wire::FieldValue::Object(
                            typed.#field_name.clone().map(|v| {
                                Box::new(v) as Box<dyn conflux::wire::WireObject>
                            }),
                        )
                    },
                    quote! {
                        conflux::wire::FieldValue::Object(v) => {
                            typed.#field_name = match v {
                                Some(boxed) => Some(
                                    *boxed.into_any().downcast::<#object_ty>().map_err(|_| {
                                        conflux::wire::ConvertError::mismatch(
                                            #qualified,
                                            stringify!(#object_ty),
                                            "object",
                                        )
                                    })?,
                                ),
                                None => None,
                            };
                            Ok(())
                        }
                    },
                    "object",
                ),
            };

            quote! {
                #[allow(non_snake_case)]
                fn #getter_name(
                    obj: &dyn conflux::wire::WireObject,
                ) -> conflux::wire::FieldValue {
                    let typed = obj
                        .as_any()
                        .downcast_ref::<#struct_name>()
                        .expect("schema getter invoked on a mismatched type");
                    #get_body
                }

                #[allow(non_snake_case)]
                fn #setter_name(
                    obj: &mut dyn conflux::wire::WireObject,
                    value: conflux::wire::FieldValue,
                ) -> ::std::result::Result<(), conflux::wire::ConvertError> {
                    let typed = obj
                        .as_any_mut()
                        .downcast_mut::<#struct_name>()
                        .expect("schema setter invoked on a mismatched type");
                    match value {
                        #set_arm
                        other => Err(conflux::wire::ConvertError::mismatch(
                            #qualified,
                            #expected,
                            other.kind_name(),
                        )),
                    }
                }
            }
        })
        .collect();

    quote! { #(#fns)* }
}

/// Per-element get/set conversions for sequence fields.
fn elem_conversions(elem: &Elem, qualified: &str) -> (TokenStream2, TokenStream2) {
    match elem {
        Elem::Scalar(scalar) => {
            let variant = scalar_variant(*scalar);
            let expected = scalar_type_name(*scalar);
            (
                quote! { conflux::wire::FieldValue::#variant(*item) },
                quote! {
                    match item {
                        conflux::wire::FieldValue::#variant(v) => Ok(v),
                        other => Err(conflux::wire::ConvertError::mismatch(
                            #qualified,
                            #expected,
                            other.kind_name(),
                        )),
                    }
                },
            )
        }
        Elem::Str => (
            quote! { conflux::wire::FieldValue::Str(Some(item.clone())) },
            quote! {
                match item {
                    conflux::wire::FieldValue::Str(Some(v)) => Ok(v),
                    other => Err(conflux::wire::ConvertError::mismatch(
                        #qualified,
                        "string",
                        other.kind_name(),
                    )),
                }
            },
        ),
        Elem::Object(object_ty) => (
            quote! {
                conflux::wire::FieldValue::Object(Some(
                    Box::new(item.clone()) as Box<dyn conflux::wire::WireObject>
                ))
            },
            quote! {
                match item {
                    conflux::wire::FieldValue::Object(Some(boxed)) => {
                        boxed.into_any().downcast::<#object_ty>().map(|v| *v).map_err(|_| {
                            conflux::wire::ConvertError::mismatch(
                                #qualified,
                                stringify!(#object_ty),
                                "object",
                            )
                        })
                    }
                    other => Err(conflux::wire::ConvertError::mismatch(
                        #qualified,
                        stringify!(#object_ty),
                        other.kind_name(),
                    )),
                }
            },
        ),
    }
}

/// Generate the static `FieldDescriptor` array.
fn generate_descriptors(struct_name: &Ident, fields: &[WireField]) -> TokenStream2 {
    let entries: Vec<TokenStream2> = fields
        .iter()
        .map(|field| {
            let field_name = &field.ident;
            let field_name_str = field_name.to_string();
            let wire_name = &field.wire_name;
            let getter_name = accessor_ident(struct_name, field_name, "getter");
            let setter_name = accessor_ident(struct_name, field_name, "setter");

            let origin = if field.header {
                quote! { conflux::wire::FieldOrigin::Header }
            } else {
                quote! { conflux::wire::FieldOrigin::Body }
            };

            let kind = match &field.shape {
                Shape::Scalar(scalar) => {
                    let scalar = scalar_tokens(*scalar);
                    quote! { conflux::wire::FieldKind::Scalar(#scalar) }
                }
                Shape::Str => {
                    quote! { conflux::wire::FieldKind::Scalar(conflux::wire::ScalarKind::Str) }
                }
                Shape::List(elem) => {
                    let elem = match elem {
                        Elem::Scalar(scalar) => {
                            let scalar = scalar_tokens(*scalar);
                            quote! { conflux::wire::ElemKind::Scalar(#scalar) }
                        }
                        Elem::Str => quote! {
                            conflux::wire::ElemKind::Scalar(conflux::wire::ScalarKind::Str)
                        },
                        Elem::Object(object_ty) => quote! {
                            conflux::wire::ElemKind::Object(<#object_ty>::wire_schema)
                        },
                    };
                    quote! { conflux::wire::FieldKind::List(#elem) }
                }
                Shape::Object(object_ty) => quote! {
                    conflux::wire::FieldKind::Object(<#object_ty>::wire_schema)
                },
            };

            quote! {
                conflux::wire::FieldDescriptor {
                    field_name: #field_name_str,
                    wire_name: #wire_name,
                    origin: #origin,
                    kind: #kind,
                    get: #getter_name,
                    set: #setter_name,
                }
            }
        })
        .collect();

    quote! { [#(#entries),*] }
}

fn accessor_ident(struct_name: &Ident, field_name: &Ident, suffix: &str) -> Ident {
    format_ident!(
        "__{}_{}_{}",
        struct_name.to_string().to_lowercase(),
        field_name,
        suffix
    )
}
