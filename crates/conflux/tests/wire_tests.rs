//! End-to-end tests for the derived schema and the marshalling walkers.

use conflux::prelude::*;
use serde_json::json;

#[derive(WireObject, Clone, Default, Debug, PartialEq)]
struct Address {
    city: Option<String>,
    zip: Option<String>,
}

#[derive(WireObject, Clone, Default, Debug, PartialEq)]
struct Order {
    id: i64,
    total: f64,
}

#[derive(WireObject, Clone, Default, Debug)]
struct User {
    id: i64,
    age: i32,
    rank: i16,
    ratio: f32,
    score: f64,
    active: bool,
    name: Option<String>,
    #[wire(name = "contact.email")]
    email: Option<String>,
    address: Option<Address>,
    tags: Option<Vec<String>>,
    points: Option<Vec<i32>>,
    orders: Option<Vec<Order>>,
    #[wire(header = "X-Request-Id")]
    request_id: Option<String>,
    #[wire(header)]
    etag: Option<String>,
    #[wire(skip)]
    local_note: Option<String>,
}

fn sample_user() -> User {
    User {
        id: 7,
        age: 30,
        rank: 2,
        ratio: 0.5,
        score: 99.5,
        active: true,
        name: Some("Aidan".to_string()),
        email: Some("aidan@example.com".to_string()),
        address: Some(Address {
            city: Some("Boston".to_string()),
            zip: Some("02134".to_string()),
        }),
        tags: Some(vec!["admin".to_string(), "beta".to_string()]),
        points: Some(vec![1, 2, 3]),
        orders: Some(vec![
            Order { id: 1, total: 9.5 },
            Order { id: 2, total: 0.0 },
        ]),
        request_id: Some("req-1".to_string()),
        etag: Some("v1".to_string()),
        local_note: Some("never sent".to_string()),
    }
}

#[test]
fn marshal_writes_body_paths_and_header_fields() {
    let mut headers = Headers::new();
    let doc = wire::marshal(&sample_user(), &mut headers).unwrap();

    assert_eq!(doc["id"], json!(7));
    assert_eq!(doc["active"], json!(true));
    assert_eq!(doc["name"], json!("Aidan"));
    assert_eq!(doc["contact"]["email"], json!("aidan@example.com"));
    assert_eq!(doc["address"]["city"], json!("Boston"));
    assert_eq!(doc["address"]["zip"], json!("02134"));
    assert_eq!(doc["tags"], json!(["admin", "beta"]));
    assert_eq!(doc["points"], json!([1, 2, 3]));
    assert_eq!(doc["orders"][0]["total"], json!(9.5));
    assert_eq!(doc["orders"][1]["id"], json!(2));

    // Header-bound and skipped fields never reach the body.
    assert_eq!(doc.get("request_id"), None);
    assert_eq!(doc.get("etag"), None);
    assert_eq!(doc.get("local_note"), None);
    assert_eq!(headers.get("X-Request-Id"), Some("req-1"));
    assert_eq!(headers.get("etag"), Some("v1"));
}

#[test]
fn unmarshal_reads_paths_headers_and_absent_fields() {
    let doc = json!({
        "id": 7,
        "age": 30,
        "score": 3,
        "active": 1,
        "name": "Aidan",
        "contact": {"email": "aidan@example.com"},
        "address": {"city": "Boston"},
        "tags": ["x"],
        "orders": [{"id": 1, "total": 2.5}],
    });
    let mut headers = Headers::new();
    headers.insert("X-Request-Id", "req-9");

    let user: User = wire::unmarshal(&doc, &headers).unwrap();
    assert_eq!(user.id, 7);
    assert_eq!(user.age, 30);
    // An integral document value widens into a float field.
    assert_eq!(user.score, 3.0);
    // Integral 1 populates a boolean as true.
    assert!(user.active);
    // Absent scalars become zero, absent sequences become None.
    assert_eq!(user.rank, 0);
    assert_eq!(user.ratio, 0.0);
    assert_eq!(user.points, None);
    assert_eq!(user.name.as_deref(), Some("Aidan"));
    assert_eq!(user.email.as_deref(), Some("aidan@example.com"));

    let address = user.address.expect("nested object populated");
    assert_eq!(address.city.as_deref(), Some("Boston"));
    assert_eq!(address.zip, None);

    assert_eq!(user.orders, Some(vec![Order { id: 1, total: 2.5 }]));
    assert_eq!(user.request_id.as_deref(), Some("req-9"));
    assert_eq!(user.etag, None);
    assert_eq!(user.local_note, None);
}

#[test]
fn marshal_then_unmarshal_preserves_the_graph() {
    let user = sample_user();
    let mut headers = Headers::new();
    let doc = wire::marshal(&user, &mut headers).unwrap();
    let back: User = wire::unmarshal(&doc, &headers).unwrap();

    assert_eq!(back.id, user.id);
    assert_eq!(back.ratio, user.ratio);
    assert_eq!(back.name, user.name);
    assert_eq!(back.email, user.email);
    assert_eq!(back.address, user.address);
    assert_eq!(back.tags, user.tags);
    assert_eq!(back.orders, user.orders);
    assert_eq!(back.request_id, user.request_id);
    // Skipped fields are untouched by conversion.
    assert_eq!(back.local_note, None);
}

#[test]
fn mismatched_document_type_names_the_field() {
    let doc = json!({"id": "seven"});
    let err = wire::unmarshal::<User>(&doc, &Headers::new()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("User.id"), "unexpected message: {message}");
    assert!(message.contains("i64"), "unexpected message: {message}");
}

#[test]
fn unparseable_header_value_names_the_field() {
    #[derive(WireObject, Clone, Default, Debug)]
    struct Paged {
        #[wire(header = "X-Total-Count")]
        total: i32,
    }

    let mut headers = Headers::new();
    headers.insert("X-Total-Count", "not-a-number");
    let err = wire::unmarshal::<Paged>(&json!({}), &headers).unwrap_err();
    assert!(err.to_string().contains("Paged.total"));

    // Missing headers fall back to the zero value instead of erroring.
    let paged: Paged = wire::unmarshal(&json!({}), &Headers::new()).unwrap();
    assert_eq!(paged.total, 0);
}

#[test]
fn derive_expands_under_a_shadowing_result_alias() {
    // The prelude's single-argument `Result` stays shadowed here; the
    // generated accessors must not pick it up.
    #[allow(dead_code)]
    type Result<T> = std::result::Result<T, String>;

    #[derive(WireObject, Clone, Default)]
    struct Batch {
        id: i64,
        labels: Option<Vec<String>>,
        sizes: Option<Vec<i32>>,
    }

    let batch: Batch = wire::unmarshal(
        &json!({"id": 4, "labels": ["a", "b"], "sizes": [1, 2]}),
        &Headers::new(),
    )
    .unwrap();
    assert_eq!(batch.id, 4);
    assert_eq!(batch.labels, Some(vec!["a".to_string(), "b".to_string()]));
    assert_eq!(batch.sizes, Some(vec![1, 2]));
}

#[test]
fn schema_reports_declaration_order() {
    let schema = User::wire_schema();
    let names: Vec<&str> = schema.fields.iter().map(|f| f.field_name).collect();
    assert_eq!(names.first(), Some(&"id"));
    assert!(names.contains(&"email"));
    // Skipped fields are absent from the schema.
    assert!(!names.contains(&"local_note"));
}
