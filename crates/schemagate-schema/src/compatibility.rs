//! Schema Compatibility Checking
//!
//! Validates that schema evolution follows compatibility rules.

use crate::types::{CompatibilityMode, FieldType, Schema};

/// Check if a new schema is compatible with an existing schema
pub fn check_compatibility(existing: &Schema, new_schema: &Schema, mode: CompatibilityMode) -> bool {
    match mode {
        CompatibilityMode::Backward | CompatibilityMode::BackwardTransitive => {
            // New schema can validate data that old schema validated
            can_read(new_schema, existing)
        }
        CompatibilityMode::Forward | CompatibilityMode::ForwardTransitive => {
            // Old schema can validate data that new schema validates
            can_read(existing, new_schema)
        }
        CompatibilityMode::Full | CompatibilityMode::FullTransitive => {
            can_read(new_schema, existing) && can_read(existing, new_schema)
        }
        CompatibilityMode::None => true,
    }
}

/// Whether every record conforming to `writer` also conforms to `reader`.
fn can_read(reader: &Schema, writer: &Schema) -> bool {
    for reader_field in &reader.fields {
        match writer.field(&reader_field.name) {
            Some(writer_field) => {
                // Writer may omit an optional field the reader requires
                if reader_field.required && !writer_field.required {
                    return false;
                }
                if !types_compatible(&reader_field.field_type, &writer_field.field_type) {
                    return false;
                }
            }
            None => {
                // Field only in reader - must not be required
                if reader_field.required {
                    return false;
                }
            }
        }
    }
    true
}

fn types_compatible(reader: &FieldType, writer: &FieldType) -> bool {
    match (reader, writer) {
        (FieldType::Enum(read), FieldType::Enum(written)) => {
            written.iter().all(|v| read.contains(v))
        }

        // Promotion rules
        (FieldType::String, FieldType::Enum(_)) => true,
        (FieldType::Number, FieldType::Integer) => true,

        (r, w) => r == w,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{derive_schema, DeclaredType, ShapeDescriptor};

    fn base() -> ShapeDescriptor {
        ShapeDescriptor::new("User")
            .field("name", DeclaredType::Text)
            .field("age", DeclaredType::Integer)
    }

    #[test]
    fn test_same_schema_compatible_in_every_mode() {
        let schema = derive_schema(&base()).unwrap();
        for mode in [
            CompatibilityMode::Backward,
            CompatibilityMode::Forward,
            CompatibilityMode::Full,
            CompatibilityMode::FullTransitive,
            CompatibilityMode::None,
        ] {
            assert!(check_compatibility(&schema, &schema, mode), "{:?}", mode);
        }
    }

    #[test]
    fn test_backward_new_optional_field() {
        let old = derive_schema(&base()).unwrap();
        let new =
            derive_schema(&base().optional_field("email", DeclaredType::Text)).unwrap();
        assert!(check_compatibility(&old, &new, CompatibilityMode::Backward));
    }

    #[test]
    fn test_backward_new_required_field_incompatible() {
        let old = derive_schema(&base()).unwrap();
        let new = derive_schema(&base().field("email", DeclaredType::Text)).unwrap();
        assert!(!check_compatibility(&old, &new, CompatibilityMode::Backward));
        // Old readers simply ignore the extra field
        assert!(check_compatibility(&old, &new, CompatibilityMode::Forward));
        assert!(!check_compatibility(&old, &new, CompatibilityMode::Full));
    }

    #[test]
    fn test_type_change_incompatible() {
        let old = derive_schema(&base()).unwrap();
        let new = derive_schema(
            &ShapeDescriptor::new("User")
                .field("name", DeclaredType::Text)
                .field("age", DeclaredType::Text),
        )
        .unwrap();
        assert!(!check_compatibility(&old, &new, CompatibilityMode::Backward));
        assert!(check_compatibility(&old, &new, CompatibilityMode::None));
    }

    #[test]
    fn test_integer_widens_to_number() {
        let old = derive_schema(&base()).unwrap();
        let new = derive_schema(
            &ShapeDescriptor::new("User")
                .field("name", DeclaredType::Text)
                .field("age", DeclaredType::Float),
        )
        .unwrap();
        assert!(check_compatibility(&old, &new, CompatibilityMode::Backward));
        assert!(!check_compatibility(&old, &new, CompatibilityMode::Forward));
    }

    #[test]
    fn test_enum_growth() {
        let with = |values: &[&str]| {
            derive_schema(&ShapeDescriptor::new("Tx").field(
                "currency",
                DeclaredType::Enumeration(values.iter().map(|v| v.to_string()).collect()),
            ))
            .unwrap()
        };
        let old = with(&["SAR", "USD"]);
        let new = with(&["SAR", "USD", "EUR"]);
        assert!(check_compatibility(&old, &new, CompatibilityMode::Backward));
        assert!(!check_compatibility(&old, &new, CompatibilityMode::Forward));
    }
}
