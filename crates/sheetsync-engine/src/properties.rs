//! Page property values built from spreadsheet cells.

use serde_json::{Map, Value, json};

use crate::error::{Result, SyncError};
use crate::models::{Annotations, Row, Scalar};
use crate::parsing::parse_inline;
use crate::store::PropertySchema;

/// A destination property fed from a spreadsheet column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyBinding {
    pub property: String,
    pub column: String,
    pub schema: PropertySchema,
}

/// Renders a cell as the store value of a property.
///
/// Select, status and multi-select values must be registered options of the
/// destination property. Blank cells clear the property.
pub fn build_property(name: &str, schema: &PropertySchema, value: &Scalar) -> Result<Value> {
    let text = value.to_string();
    let ty = schema.ty.as_str();
    let rendered = match ty {
        "title" | "rich_text" => json!({ (ty): parse_inline(&text, Annotations::PLAIN) }),
        "select" | "status" => {
            let option = text.trim();
            if option.is_empty() {
                json!({ (ty): null })
            } else {
                ensure_registered(name, schema, option)?;
                json!({ (ty): { "name": option } })
            }
        }
        "multi_select" => {
            let options = split_list(&text)
                .map(|option| {
                    ensure_registered(name, schema, option)?;
                    Ok(json!({ "name": option }))
                })
                .collect::<Result<Vec<_>>>()?;
            json!({ "multi_select": options })
        }
        "files" => {
            let files: Vec<Value> = split_list(&text)
                .map(|url| json!({ "name": url, "type": "external", "external": { "url": url } }))
                .collect();
            json!({ "files": files })
        }
        "number" => json!({ "number": number(value) }),
        "checkbox" => json!({ "checkbox": checkbox(value) }),
        "url" | "email" | "phone_number" => {
            let text = text.trim();
            if text.is_empty() {
                json!({ (ty): null })
            } else {
                json!({ (ty): text })
            }
        }
        other => {
            return Err(SyncError::UnsupportedPropertyType {
                property: name.to_string(),
                property_type: other.to_string(),
            });
        }
    };
    Ok(rendered)
}

/// Builds every bound property for one row.
pub fn build_properties(bindings: &[PropertyBinding], row: &Row) -> Result<Map<String, Value>> {
    let mut properties = Map::new();
    for binding in bindings {
        let value = row
            .get(&binding.column)
            .ok_or_else(|| SyncError::MissingColumn(binding.column.clone()))?;
        properties.insert(
            binding.property.clone(),
            build_property(&binding.property, &binding.schema, value)?,
        );
    }
    Ok(properties)
}

fn ensure_registered(name: &str, schema: &PropertySchema, option: &str) -> Result<()> {
    if schema.has_option(option) {
        Ok(())
    } else {
        Err(SyncError::PropertyValueNotRegistered {
            property: name.to_string(),
            value: option.to_string(),
        })
    }
}

fn split_list(text: &str) -> impl Iterator<Item = &str> {
    text.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn number(value: &Scalar) -> Value {
    match value {
        Scalar::Int(i) => json!(i),
        Scalar::Float(f) => json!(f),
        Scalar::Text(s) => match Scalar::parse_literal(s.trim()) {
            Scalar::Int(i) => json!(i),
            Scalar::Float(f) => json!(f),
            Scalar::Text(_) => Value::Null,
        },
    }
}

fn checkbox(value: &Scalar) -> bool {
    match value {
        Scalar::Int(i) => *i != 0,
        Scalar::Float(f) => *f != 0.0,
        Scalar::Text(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1" | "on" | "x"
        ),
    }
}
