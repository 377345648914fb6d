//! Validation of payment payloads against the derived Transaction schema.

use schemagate_schema::{
    derive_schema, validate, validate_value, DeclaredType, Schema, SchemaError, ShapeDescriptor,
    Transaction, ValidationOutcome,
};
use serde_json::{json, Value};

fn schema() -> Schema {
    Schema::for_shape::<Transaction>().unwrap()
}

fn conforming() -> Value {
    json!({
        "transactionId": "TXN-3F2A9C1B7D4E",
        "accountId": "ACC-1001",
        "amount": 250.75,
        "currency": "SAR",
        "merchant": "Jarir Bookstore",
        "country": "SA",
        "timestamp": 1_700_000_000_000i64
    })
}

#[test]
fn test_conforming_payload() {
    let payload = serde_json::to_vec(&conforming()).unwrap();
    assert_eq!(validate(&payload, &schema()), ValidationOutcome::Conforming);
}

#[test]
fn test_missing_fields_scenario() {
    let outcome = validate(br#"{"transactionId":"TXN-1","accountId":"ACC-1"}"#, &schema());
    assert_eq!(
        outcome,
        ValidationOutcome::MissingField {
            field: "amount".into()
        }
    );
}

#[test]
fn test_garbage_scenario() {
    assert_eq!(
        validate(b"this is not even JSON", &schema()),
        ValidationOutcome::UnparsableEnvelope
    );
}

#[test]
fn test_wrong_type_scenario() {
    let mut value = conforming();
    value["amount"] = json!("not-a-number");

    assert_eq!(
        validate_value(&value, &schema()),
        ValidationOutcome::TypeMismatch {
            field: "amount".into(),
            expected: "number".into(),
            actual: "string".into(),
        }
    );
}

#[test]
fn test_first_missing_field_in_declared_order() {
    let declared = [
        "transactionId",
        "accountId",
        "amount",
        "currency",
        "merchant",
        "country",
        "timestamp",
    ];

    // Removing any suffix of the declared fields reports the first removed one
    for cut in 0..declared.len() {
        let mut value = conforming();
        let object = value.as_object_mut().unwrap();
        for name in &declared[cut..] {
            object.remove(*name);
        }
        assert_eq!(
            validate_value(&value, &schema()),
            ValidationOutcome::MissingField {
                field: declared[cut].to_string()
            },
            "cut at {}",
            cut
        );
    }
}

#[test]
fn test_missing_field_wins_over_earlier_type_mismatch() {
    let mut value = conforming();
    value["transactionId"] = json!(42);
    value.as_object_mut().unwrap().remove("timestamp");

    assert_eq!(
        validate_value(&value, &schema()),
        ValidationOutcome::MissingField {
            field: "timestamp".into()
        }
    );
}

#[test]
fn test_non_numeric_values_in_numeric_fields() {
    for bad in [json!("12"), json!(true), json!([1]), json!({"v": 1})] {
        let mut value = conforming();
        value["timestamp"] = bad.clone();
        match validate_value(&value, &schema()) {
            ValidationOutcome::TypeMismatch { field, .. } => assert_eq!(field, "timestamp"),
            other => panic!("{} gave {:?}", bad, other),
        }
    }
}

#[test]
fn test_fractional_timestamp_is_mismatch() {
    let mut value = conforming();
    value["timestamp"] = json!(1.5);
    assert_eq!(
        validate_value(&value, &schema()),
        ValidationOutcome::TypeMismatch {
            field: "timestamp".into(),
            expected: "integer".into(),
            actual: "number".into(),
        }
    );

    value["timestamp"] = json!(1.0);
    assert!(validate_value(&value, &schema()).is_conforming());

    let payload = br#"{"transactionId":"TXN-1","accountId":"ACC-1001","amount":10.0,"currency":"SAR","merchant":"Noon","country":"SA","timestamp":1700000000000.0}"#;
    assert!(validate(payload, &schema()).is_conforming());
}

#[test]
fn test_whole_amount_is_a_number() {
    let mut value = conforming();
    value["amount"] = json!(100);
    assert!(validate_value(&value, &schema()).is_conforming());
}

#[test]
fn test_enum_outside_declared_set() {
    let mut value = conforming();
    value["currency"] = json!("JPY");
    assert_eq!(
        validate_value(&value, &schema()),
        ValidationOutcome::TypeMismatch {
            field: "currency".into(),
            expected: "enum".into(),
            actual: "JPY".into(),
        }
    );
}

#[test]
fn test_null_required_field_is_mismatch() {
    let mut value = conforming();
    value["merchant"] = Value::Null;
    assert!(matches!(
        validate_value(&value, &schema()),
        ValidationOutcome::TypeMismatch { field, .. } if field == "merchant"
    ));
}

#[test]
fn test_extra_fields_are_allowed() {
    let mut value = conforming();
    value["channel"] = json!("mobile");
    assert!(validate_value(&value, &schema()).is_conforming());
}

#[test]
fn test_non_object_json_is_unparsable() {
    let payloads: [&[u8]; 4] = [b"[]", b"42", b"\"text\"", b"null"];
    for payload in payloads {
        assert_eq!(
            validate(payload, &schema()),
            ValidationOutcome::UnparsableEnvelope
        );
    }
}

#[test]
fn test_optional_field_may_be_absent_or_null() {
    let schema = derive_schema(
        &ShapeDescriptor::new("Refund")
            .field("transactionId", DeclaredType::Text)
            .optional_field("note", DeclaredType::Text),
    )
    .unwrap();

    assert!(validate(br#"{"transactionId":"TXN-1"}"#, &schema).is_conforming());
    assert!(validate(br#"{"transactionId":"TXN-1","note":null}"#, &schema).is_conforming());
    assert!(!validate(br#"{"transactionId":"TXN-1","note":5}"#, &schema).is_conforming());
}

#[test]
fn test_unsupported_field_type_fails_derivation() {
    let err = derive_schema(
        &ShapeDescriptor::new("Attachment")
            .field("name", DeclaredType::Text)
            .field("content", DeclaredType::Binary),
    )
    .unwrap_err();

    assert!(matches!(err, SchemaError::UnsupportedType { field, .. } if field == "content"));
}

#[test]
fn test_derivation_is_deterministic() {
    assert_eq!(schema(), schema());
    assert_eq!(schema().canonical(), schema().canonical());
    assert_eq!(schema().fingerprint(), schema().fingerprint());
}

#[test]
fn test_json_schema_document_round_trips() {
    let document = schema().to_json_schema();
    assert_eq!(document["type"], "object");
    assert_eq!(document["properties"]["amount"]["type"], "number");
    assert_eq!(document["properties"]["timestamp"]["type"], "integer");

    let parsed = Schema::from_json_schema(&document).unwrap();
    assert_eq!(parsed, schema());
}
