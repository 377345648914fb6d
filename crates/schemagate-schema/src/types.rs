//! Core Schema Types

use crate::error::{Result, SchemaError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// JSON Schema dialect written into every rendered document.
pub const JSON_SCHEMA_DRAFT: &str = "http://json-schema.org/draft-07/schema#";

/// Schema format (Avro, Protobuf, JSON Schema)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaFormat {
    Avro,
    Protobuf,
    #[default]
    Json,
}

impl SchemaFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaFormat::Avro => "AVRO",
            SchemaFormat::Protobuf => "PROTOBUF",
            SchemaFormat::Json => "JSON",
        }
    }
}

/// Compatibility mode for schema evolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityMode {
    /// New schema can read data written with old schema
    #[default]
    Backward,

    /// Old schema can read data written with new schema
    Forward,

    /// Both backward and forward compatible
    Full,

    /// Backward compatible with all previous versions
    BackwardTransitive,

    /// Forward compatible with all previous versions
    ForwardTransitive,

    /// Full compatibility with all previous versions
    FullTransitive,

    /// No compatibility checking
    None,
}

impl CompatibilityMode {
    /// Whether every registered version must be checked, not just the latest.
    pub fn is_transitive(&self) -> bool {
        matches!(
            self,
            CompatibilityMode::BackwardTransitive
                | CompatibilityMode::ForwardTransitive
                | CompatibilityMode::FullTransitive
        )
    }
}

/// Registry-assigned schema identity. Travels with every framed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(pub i32);

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version selector for registry lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    Latest,
    Number(i32),
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVersion::Latest => f.write_str("latest"),
            SchemaVersion::Number(v) => write!(f, "{}", v),
        }
    }
}

/// Schema-representable field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    /// String drawn from a closed set of values.
    Enum(Vec<String>),
}

impl FieldType {
    /// Name used in `TypeMismatch` outcomes and JSON Schema `type` keywords.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Enum(_) => "enum",
        }
    }

    /// JSON Schema property. Optional fields also admit `null`.
    fn to_json(&self, nullable: bool) -> Value {
        let json_type = match self {
            FieldType::Enum(_) => "string",
            other => other.name(),
        };
        let mut property = if nullable {
            json!({ "type": [json_type, "null"] })
        } else {
            json!({ "type": json_type })
        };
        if let FieldType::Enum(values) = self {
            let mut allowed: Vec<Value> = values.iter().cloned().map(Value::String).collect();
            if nullable {
                allowed.push(Value::Null);
            }
            property["enum"] = Value::Array(allowed);
        }
        property
    }

    fn from_json(field: &str, property: &Value) -> Result<Self> {
        if let Some(values) = property.get("enum") {
            let values = values
                .as_array()
                .ok_or_else(|| {
                    SchemaError::InvalidSchema(format!("'enum' of field '{}' is not an array", field))
                })?
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        SchemaError::InvalidSchema(format!(
                            "enum values of field '{}' must be strings",
                            field
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(FieldType::Enum(values));
        }

        // `["string", "null"]` is the nullable form of `"string"`
        let json_type = match property.get("type") {
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null"),
            Some(other) => other.as_str(),
            None => None,
        };

        match json_type {
            Some("string") => Ok(FieldType::String),
            Some("number") => Ok(FieldType::Number),
            Some("integer") => Ok(FieldType::Integer),
            Some("boolean") => Ok(FieldType::Boolean),
            Some(other) => Err(SchemaError::UnsupportedType {
                field: field.to_string(),
                type_name: other.to_string(),
            }),
            None => Err(SchemaError::InvalidSchema(format!(
                "field '{}' has no type",
                field
            ))),
        }
    }
}

/// A single field of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

/// Structural contract a record must satisfy.
///
/// Field order is the declaration order of the record shape and drives the
/// order in which the validator reports defects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render as a JSON Schema document.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            properties.insert(field.name.clone(), field.field_type.to_json(!field.required));
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "$schema": JSON_SCHEMA_DRAFT,
            "title": self.name,
            "type": "object",
            "additionalProperties": true,
            "properties": properties,
            "required": required,
        })
    }

    /// Canonical text of the JSON Schema document. Equal schemas render equal text.
    pub fn canonical(&self) -> String {
        self.to_json_schema().to_string()
    }

    /// SHA-256 fingerprint of the canonical document, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Parse a JSON Schema document as produced by [`Schema::to_json_schema`].
    pub fn from_json_schema(document: &Value) -> Result<Self> {
        if document.get("type").and_then(Value::as_str) != Some("object") {
            return Err(SchemaError::InvalidSchema(
                "top-level type must be 'object'".to_string(),
            ));
        }

        let name = document
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("record")
            .to_string();

        let required: Vec<&str> = match document.get("required") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(_) => {
                return Err(SchemaError::InvalidSchema(
                    "'required' must be an array".to_string(),
                ))
            }
            None => Vec::new(),
        };

        let properties = document
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| SchemaError::InvalidSchema("missing 'properties'".to_string()))?;

        let fields = properties
            .iter()
            .map(|(field, property)| {
                Ok(FieldSchema {
                    name: field.clone(),
                    field_type: FieldType::from_json(field, property)?,
                    required: required.contains(&field.as_str()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Schema { name, fields })
    }

    pub fn parse_str(document: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(document)
            .map_err(|e| SchemaError::InvalidSchema(format!("Invalid JSON schema: {}", e)))?;
        Self::from_json_schema(&value)
    }
}

/// A schema together with the identity the registry assigned to it.
///
/// Cheap to clone; the schema body is shared read-only.
#[derive(Debug, Clone)]
pub struct RegisteredSchema {
    pub id: SchemaId,
    pub subject: String,
    pub version: i32,
    pub schema: Arc<Schema>,
}

/// Subject name for record values published to `topic` (topic-name strategy).
pub fn value_subject(topic: &str) -> String {
    format!("{}-value", topic)
}

/// Schema registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSchemaRequest {
    pub schema: String,

    #[serde(rename = "schemaType")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaFormat>,
}

/// Schema registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSchemaResponse {
    pub id: i32,
}

/// Schema lookup response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub subject: String,
    pub version: i32,
    pub id: i32,
    pub schema: String,

    #[serde(rename = "schemaType", default)]
    pub schema_type: SchemaFormat,
}

/// Lookup-by-id response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaByIdResponse {
    pub schema: String,

    #[serde(rename = "schemaType", default)]
    pub schema_type: SchemaFormat,
}

/// One subject/version pair a schema id is registered under
/// (`GET /schemas/ids/{id}/versions`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectVersion {
    pub subject: String,
    pub version: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema {
            name: "Payment".to_string(),
            fields: vec![
                FieldSchema {
                    name: "id".to_string(),
                    field_type: FieldType::String,
                    required: true,
                },
                FieldSchema {
                    name: "amount".to_string(),
                    field_type: FieldType::Number,
                    required: true,
                },
                FieldSchema {
                    name: "currency".to_string(),
                    field_type: FieldType::Enum(vec!["SAR".to_string(), "USD".to_string()]),
                    required: true,
                },
                FieldSchema {
                    name: "note".to_string(),
                    field_type: FieldType::String,
                    required: false,
                },
            ],
        }
    }

    #[test]
    fn test_schema_format_serialize_json() {
        let json = serde_json::to_string(&SchemaFormat::Json).unwrap();
        assert_eq!(json, r#""JSON""#);
    }

    #[test]
    fn test_compatibility_mode_default_and_serde() {
        assert_eq!(CompatibilityMode::default(), CompatibilityMode::Backward);
        let json = serde_json::to_string(&CompatibilityMode::FullTransitive).unwrap();
        assert_eq!(json, r#""FULL_TRANSITIVE""#);
        assert!(CompatibilityMode::FullTransitive.is_transitive());
        assert!(!CompatibilityMode::Full.is_transitive());
    }

    #[test]
    fn test_json_schema_document_shape() {
        let doc = sample().to_json_schema();
        assert_eq!(doc["type"], "object");
        assert_eq!(doc["title"], "Payment");
        assert_eq!(doc["properties"]["amount"]["type"], "number");
        assert_eq!(doc["properties"]["currency"]["enum"][1], "USD");
        assert_eq!(doc["required"], json!(["id", "amount", "currency"]));
        assert_eq!(doc["properties"]["note"]["type"], json!(["string", "null"]));
    }

    #[test]
    fn test_optional_enum_admits_null() {
        let mut schema = sample();
        schema.fields[2].required = false;
        let doc = schema.to_json_schema();
        assert_eq!(doc["properties"]["currency"]["enum"], json!(["SAR", "USD", null]));

        let parsed = Schema::parse_str(&schema.canonical()).unwrap();
        assert_eq!(parsed, schema);
    }

    #[test]
    fn test_json_schema_preserves_field_order_and_required() {
        let schema = sample();
        let parsed = Schema::parse_str(&schema.canonical()).unwrap();
        assert_eq!(parsed, schema);
        let names: Vec<_> = parsed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "amount", "currency", "note"]);
    }

    #[test]
    fn test_fingerprint_stable_and_content_sensitive() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        b.fields[1].field_type = FieldType::Integer;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_parse_rejects_non_object_schema() {
        let result = Schema::parse_str(r#"{"type": "string"}"#);
        assert!(matches!(result, Err(SchemaError::InvalidSchema(_))));
    }

    #[test]
    fn test_parse_rejects_unknown_property_type() {
        let doc = r#"{"type": "object", "properties": {"tags": {"type": "array"}}}"#;
        let result = Schema::parse_str(doc);
        assert!(matches!(result, Err(SchemaError::UnsupportedType { .. })));
    }

    #[test]
    fn test_value_subject() {
        assert_eq!(value_subject("payments"), "payments-value");
    }

    #[test]
    fn test_schema_response_schema_type_rename() {
        let json = r#"{"subject":"s","version":2,"id":7,"schema":"{}","schemaType":"JSON"}"#;
        let resp: SchemaResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.id, 7);
        assert_eq!(resp.schema_type, SchemaFormat::Json);

        // schemaType may be omitted
        let json = r#"{"subject":"s","version":1,"id":3,"schema":"{}"}"#;
        let resp: SchemaResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.schema_type, SchemaFormat::Json);
    }
}
