//! Record Shapes and Schema Derivation
//!
//! A [`ShapeDescriptor`] is an explicit description of a record type: its
//! field names, declared types, nullability and enum constraints. Deriving a
//! [`Schema`] from it is a pure function, so the schema a producer registers
//! can be computed and tested without a registry or a broker.
//!
//! ```ignore
//! use schemagate_schema::{derive_schema, DeclaredType, ShapeDescriptor};
//!
//! let shape = ShapeDescriptor::new("Order")
//!     .field("orderId", DeclaredType::Text)
//!     .field("total", DeclaredType::Float)
//!     .optional_field("coupon", DeclaredType::Text);
//!
//! let schema = derive_schema(&shape)?;
//! assert!(schema.field("orderId").unwrap().required);
//! ```

use crate::error::{Result, SchemaError};
use crate::types::{FieldSchema, FieldType, Schema};
use std::collections::HashSet;

/// Type of a field as declared by the record, before schema mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    Text,
    Float,
    Integer,
    Boolean,
    /// Closed set of string values.
    Enumeration(Vec<String>),
    /// Nested record type, named.
    Nested(String),
    /// Raw bytes.
    Binary,
}

impl DeclaredType {
    fn type_name(&self) -> String {
        match self {
            DeclaredType::Text => "text".to_string(),
            DeclaredType::Float => "float".to_string(),
            DeclaredType::Integer => "integer".to_string(),
            DeclaredType::Boolean => "boolean".to_string(),
            DeclaredType::Enumeration(_) => "enumeration".to_string(),
            DeclaredType::Nested(name) => format!("nested object '{}'", name),
            DeclaredType::Binary => "binary".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub declared: DeclaredType,
    pub optional: bool,
}

/// Explicit description of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl ShapeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a required field.
    pub fn field(mut self, name: impl Into<String>, declared: DeclaredType) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            declared,
            optional: false,
        });
        self
    }

    /// Add a nullable field.
    pub fn optional_field(mut self, name: impl Into<String>, declared: DeclaredType) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            declared,
            optional: true,
        });
        self
    }
}

/// Implemented by record types that can describe their own shape.
pub trait RecordShape {
    fn shape() -> ShapeDescriptor;
}

/// Derive a [`Schema`] from a shape.
///
/// Every field is required unless declared optional. Fails with
/// `UnsupportedType` for nested or binary fields, and with `InvalidSchema`
/// for an empty shape, duplicate field names, or an empty enumeration.
pub fn derive_schema(shape: &ShapeDescriptor) -> Result<Schema> {
    if shape.fields.is_empty() {
        return Err(SchemaError::InvalidSchema(format!(
            "shape '{}' declares no fields",
            shape.name
        )));
    }

    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(shape.fields.len());

    for descriptor in &shape.fields {
        if !seen.insert(descriptor.name.as_str()) {
            return Err(SchemaError::InvalidSchema(format!(
                "duplicate field '{}' in shape '{}'",
                descriptor.name, shape.name
            )));
        }

        let field_type = match &descriptor.declared {
            DeclaredType::Text => FieldType::String,
            DeclaredType::Float => FieldType::Number,
            DeclaredType::Integer => FieldType::Integer,
            DeclaredType::Boolean => FieldType::Boolean,
            DeclaredType::Enumeration(values) if values.is_empty() => {
                return Err(SchemaError::InvalidSchema(format!(
                    "enumeration field '{}' has no values",
                    descriptor.name
                )));
            }
            DeclaredType::Enumeration(values) => FieldType::Enum(values.clone()),
            unsupported @ (DeclaredType::Nested(_) | DeclaredType::Binary) => {
                return Err(SchemaError::UnsupportedType {
                    field: descriptor.name.clone(),
                    type_name: unsupported.type_name(),
                });
            }
        };

        fields.push(FieldSchema {
            name: descriptor.name.clone(),
            field_type,
            required: !descriptor.optional,
        });
    }

    tracing::debug!(shape = %shape.name, fields = fields.len(), "Derived schema");

    Ok(Schema {
        name: shape.name.clone(),
        fields,
    })
}

impl Schema {
    /// Derive the schema of a [`RecordShape`] type.
    pub fn for_shape<T: RecordShape>() -> Result<Schema> {
        derive_schema(&T::shape())
    }
}
