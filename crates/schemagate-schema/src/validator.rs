//! Record Validation
//!
//! Classifies a candidate payload against a [`Schema`] before it is sent.
//! Validation is pure: the same payload and schema always produce the same
//! [`ValidationOutcome`].
//!
//! ## Check Order
//!
//! 1. The payload must parse as a JSON object, else `UnparsableEnvelope`.
//! 2. Every required field must be present. The first absent field in
//!    schema declaration order is reported as `MissingField`.
//! 3. Every present field must carry its declared type. The first offender
//!    in declaration order is reported as `TypeMismatch`. Enum values
//!    outside the allowed set are reported with expected type `"enum"`.
//!    Integer fields accept whole-valued floats such as `4.0`, as JSON
//!    Schema does.
//!
//! Fields the schema does not declare are ignored.

use crate::types::{FieldType, Schema};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Result of checking one payload against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Conforming,
    MissingField {
        field: String,
    },
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },
    UnparsableEnvelope,
}

impl ValidationOutcome {
    pub fn is_conforming(&self) -> bool {
        matches!(self, ValidationOutcome::Conforming)
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationOutcome::Conforming => f.write_str("conforming"),
            ValidationOutcome::MissingField { field } => {
                write!(f, "missing required field '{}'", field)
            }
            ValidationOutcome::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "field '{}' expected {} but found {}",
                field, expected, actual
            ),
            ValidationOutcome::UnparsableEnvelope => f.write_str("payload is not a JSON object"),
        }
    }
}

/// Validate a raw payload.
pub fn validate(payload: &[u8], schema: &Schema) -> ValidationOutcome {
    match serde_json::from_slice::<Value>(payload) {
        Ok(value) => validate_value(&value, schema),
        Err(_) => ValidationOutcome::UnparsableEnvelope,
    }
}

/// Validate a typed record through its JSON form.
pub fn validate_record<T: Serialize>(record: &T, schema: &Schema) -> ValidationOutcome {
    match serde_json::to_value(record) {
        Ok(value) => validate_value(&value, schema),
        Err(_) => ValidationOutcome::UnparsableEnvelope,
    }
}

/// Validate an already parsed JSON value.
pub fn validate_value(value: &Value, schema: &Schema) -> ValidationOutcome {
    let Some(object) = value.as_object() else {
        return ValidationOutcome::UnparsableEnvelope;
    };

    if let Some(missing) = first_missing(object, schema) {
        return ValidationOutcome::MissingField {
            field: missing.to_string(),
        };
    }

    for field in &schema.fields {
        let Some(value) = object.get(&field.name) else {
            continue;
        };

        if value.is_null() {
            if field.required {
                return mismatch(&field.name, field.field_type.name(), "null");
            }
            continue;
        }

        let matches = match &field.field_type {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            FieldType::Boolean => value.is_boolean(),
            FieldType::Enum(allowed) => match value.as_str() {
                Some(s) if allowed.iter().any(|a| a == s) => true,
                Some(s) => return mismatch(&field.name, "enum", s),
                None => false,
            },
        };

        if !matches {
            return mismatch(&field.name, field.field_type.name(), json_type_name(value));
        }
    }

    ValidationOutcome::Conforming
}

fn first_missing<'a>(object: &Map<String, Value>, schema: &'a Schema) -> Option<&'a str> {
    schema
        .fields
        .iter()
        .find(|f| f.required && !object.contains_key(&f.name))
        .map(|f| f.name.as_str())
}

fn mismatch(field: &str, expected: &str, actual: &str) -> ValidationOutcome {
    ValidationOutcome::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

/// JSON type name of a value. Whole numbers report as "integer".
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{derive_schema, DeclaredType, ShapeDescriptor};

    fn schema() -> Schema {
        derive_schema(
            &ShapeDescriptor::new("Reading")
                .field("sensor", DeclaredType::Text)
                .field("value", DeclaredType::Float)
                .field("seq", DeclaredType::Integer)
                .field("unit", DeclaredType::Enumeration(vec!["C".into(), "F".into()]))
                .optional_field("label", DeclaredType::Text),
        )
        .unwrap()
    }

    #[test]
    fn test_conforming() {
        let payload = br#"{"sensor":"s1","value":21.5,"seq":4,"unit":"C"}"#;
        assert_eq!(validate(payload, &schema()), ValidationOutcome::Conforming);
    }

    #[test]
    fn test_integer_accepted_for_number_field() {
        let payload = br#"{"sensor":"s1","value":21,"seq":4,"unit":"C"}"#;
        assert!(validate(payload, &schema()).is_conforming());
    }

    #[test]
    fn test_fraction_rejected_for_integer_field() {
        let payload = br#"{"sensor":"s1","value":21.0,"seq":4.5,"unit":"C"}"#;
        assert_eq!(
            validate(payload, &schema()),
            mismatch("seq", "integer", "number")
        );
    }

    #[test]
    fn test_whole_float_accepted_for_integer_field() {
        let payload = br#"{"sensor":"s1","value":21.0,"seq":4.0,"unit":"C"}"#;
        assert!(validate(payload, &schema()).is_conforming());
    }

    #[test]
    fn test_non_object_json_is_unparsable() {
        assert_eq!(validate(b"[1,2,3]", &schema()), ValidationOutcome::UnparsableEnvelope);
        assert_eq!(validate(b"42", &schema()), ValidationOutcome::UnparsableEnvelope);
        assert_eq!(validate(&[0xff, 0xfe], &schema()), ValidationOutcome::UnparsableEnvelope);
    }

    #[test]
    fn test_missing_reported_before_type_errors() {
        // "sensor" has the wrong type but "unit" is missing; missing wins.
        let payload = br#"{"sensor":1,"value":1.0,"seq":1}"#;
        assert_eq!(
            validate(payload, &schema()),
            ValidationOutcome::MissingField {
                field: "unit".into()
            }
        );
    }

    #[test]
    fn test_first_type_error_in_declaration_order() {
        let payload = br#"{"unit":"K","seq":"x","value":"y","sensor":"s"}"#;
        assert_eq!(validate(payload, &schema()), mismatch("value", "number", "string"));
    }

    #[test]
    fn test_enum_outside_set_reports_value() {
        let payload = br#"{"sensor":"s","value":1.0,"seq":1,"unit":"K"}"#;
        assert_eq!(validate(payload, &schema()), mismatch("unit", "enum", "K"));
    }

    #[test]
    fn test_enum_non_string_reports_type() {
        let payload = br#"{"sensor":"s","value":1.0,"seq":1,"unit":3}"#;
        assert_eq!(validate(payload, &schema()), mismatch("unit", "enum", "integer"));
    }

    #[test]
    fn test_null_handling() {
        let required_null = br#"{"sensor":null,"value":1.0,"seq":1,"unit":"C"}"#;
        assert_eq!(
            validate(required_null, &schema()),
            mismatch("sensor", "string", "null")
        );

        let optional_null = br#"{"sensor":"s","value":1.0,"seq":1,"unit":"C","label":null}"#;
        assert!(validate(optional_null, &schema()).is_conforming());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let payload = br#"{"sensor":"s","value":1.0,"seq":1,"unit":"F","extra":[1]}"#;
        assert!(validate(payload, &schema()).is_conforming());
    }

    #[test]
    fn test_outcome_display() {
        let outcome = mismatch("amount", "number", "string");
        assert_eq!(
            outcome.to_string(),
            "field 'amount' expected number but found string"
        );
    }
}
