use chrono::NaiveDate;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::naming::{to_domain_case, to_wire_case};
use super::schema::{FieldShape, RecordSchema, WireRecord};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{record}: expected a JSON object")]
    NotAnObject { record: &'static str },
    #[error("{record}: missing required field `{field}`")]
    MissingField { record: &'static str, field: String },
    #[error("{record}.{field}: `{value}` is not a valid identifier")]
    InvalidIdentifier { record: &'static str, field: String, value: String },
    #[error("{record}.{field}: `{value}` is not a valid YYYY-MM-DD date")]
    InvalidDate { record: &'static str, field: String, value: String },
    #[error("{record}.{field}: expected {expected}")]
    UnexpectedType { record: &'static str, field: String, expected: &'static str },
    #[error("{record}: {reason}")]
    Malformed { record: &'static str, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{record}: record did not serialize to an object")]
    NotAnObject { record: &'static str },
    #[error("{record}: field `{field}` is not declared in the schema")]
    UndeclaredField { record: &'static str, field: String },
    #[error("{record}: required field `{field}` has no value")]
    MissingRequired { record: &'static str, field: String },
    #[error("{record}: {reason}")]
    Serialize { record: &'static str, reason: String },
}

/// Encodes a domain record into its wire object. Absent optionals are omitted;
/// a required field that serializes to null (a non-finite float, say) is an error.
pub fn encode<T: WireRecord>(record: &T) -> Result<Value, EncodeError> {
    let schema = T::SCHEMA;
    let value = serde_json::to_value(record)
        .map_err(|error| EncodeError::Serialize { record: schema.name, reason: error.to_string() })?;
    encode_value(value, schema)
}

/// Decodes a wire object into a domain record using the record's schema.
pub fn decode<T: WireRecord>(wire: &Value) -> Result<T, DecodeError> {
    let schema = T::SCHEMA;
    let normalized = normalize_object(wire, schema)?;
    serde_json::from_value(Value::Object(normalized))
        .map_err(|error| DecodeError::Malformed { record: schema.name, reason: error.to_string() })
}

/// Decodes every element of a wire array.
pub fn decode_list<T: WireRecord>(wire: &Value) -> Result<Vec<T>, DecodeError> {
    let Value::Array(items) = wire else {
        return Err(DecodeError::Malformed {
            record: T::SCHEMA.name,
            reason: "expected a JSON array".to_string(),
        });
    };
    items.iter().map(decode::<T>).collect()
}

/// Parses a calendar date, rejecting anything that is not canonical `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let date = NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()?;
    (date.format(DATE_FORMAT).to_string() == raw).then_some(date)
}

fn encode_value(value: Value, schema: &'static RecordSchema) -> Result<Value, EncodeError> {
    let Value::Object(domain) = value else {
        return Err(EncodeError::NotAnObject { record: schema.name });
    };

    let mut wire = Map::new();
    for (name, field_value) in domain {
        let spec = schema
            .field(&name)
            .ok_or_else(|| EncodeError::UndeclaredField { record: schema.name, field: name.clone() })?;
        if field_value.is_null() {
            if spec.required {
                return Err(EncodeError::MissingRequired {
                    record: schema.name,
                    field: to_wire_case(spec.name),
                });
            }
            continue;
        }

        let encoded = match spec.shape {
            FieldShape::Record(nested) => encode_value(field_value, nested)?,
            FieldShape::Records(nested) => match field_value {
                Value::Array(items) => Value::Array(
                    items
                        .into_iter()
                        .map(|item| encode_value(item, nested))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                other => {
                    return Err(EncodeError::Serialize {
                        record: schema.name,
                        reason: format!("field `{name}` should be a list, got {other}"),
                    })
                }
            },
            _ => field_value,
        };
        wire.insert(to_wire_case(spec.name), encoded);
    }

    if let Some(missing) =
        schema.fields.iter().find(|spec| spec.required && !wire.contains_key(&to_wire_case(spec.name)))
    {
        return Err(EncodeError::MissingRequired {
            record: schema.name,
            field: to_wire_case(missing.name),
        });
    }

    Ok(Value::Object(wire))
}

fn normalize_object(
    wire: &Value,
    schema: &'static RecordSchema,
) -> Result<Map<String, Value>, DecodeError> {
    let Value::Object(fields) = wire else {
        return Err(DecodeError::NotAnObject { record: schema.name });
    };

    let mut normalized = Map::new();
    for (wire_name, value) in fields {
        let domain_name = to_domain_case(wire_name);
        // Unknown fields, and known ones in a non-canonical casing, are dropped.
        let Some(spec) = schema.field(&domain_name) else {
            continue;
        };
        if value.is_null() || to_wire_case(spec.name) != *wire_name {
            continue;
        }

        let field_value = normalize_field(value, spec.shape, schema.name, wire_name)?;
        normalized.insert(domain_name, field_value);
    }

    if let Some(missing) =
        schema.fields.iter().find(|spec| spec.required && !normalized.contains_key(spec.name))
    {
        return Err(DecodeError::MissingField {
            record: schema.name,
            field: to_wire_case(missing.name),
        });
    }

    Ok(normalized)
}

fn normalize_field(
    value: &Value,
    shape: FieldShape,
    record: &'static str,
    field: &str,
) -> Result<Value, DecodeError> {
    let mismatch = |expected| DecodeError::UnexpectedType {
        record,
        field: field.to_string(),
        expected,
    };

    match shape {
        FieldShape::Text => value.as_str().map(|_| value.clone()).ok_or_else(|| mismatch("a string")),
        FieldShape::Integer => {
            value.as_i64().map(|_| value.clone()).ok_or_else(|| mismatch("an integer"))
        }
        FieldShape::Number => value.is_number().then(|| value.clone()).ok_or_else(|| mismatch("a number")),
        FieldShape::Identifier => {
            let raw = value.as_str().ok_or_else(|| mismatch("an identifier string"))?;
            let id = Uuid::parse_str(raw).map_err(|_| DecodeError::InvalidIdentifier {
                record,
                field: field.to_string(),
                value: raw.to_string(),
            })?;
            Ok(Value::String(id.to_string()))
        }
        FieldShape::Date => {
            let raw = value.as_str().ok_or_else(|| mismatch("a date string"))?;
            let date = parse_date(raw).ok_or_else(|| DecodeError::InvalidDate {
                record,
                field: field.to_string(),
                value: raw.to_string(),
            })?;
            Ok(Value::String(date.format(DATE_FORMAT).to_string()))
        }
        FieldShape::Record(nested) => normalize_object(value, nested).map(Value::Object),
        FieldShape::Records(nested) => {
            let items = value.as_array().ok_or_else(|| mismatch("a list"))?;
            items
                .iter()
                .map(|item| normalize_object(item, nested).map(Value::Object))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
    }
}
