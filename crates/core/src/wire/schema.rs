use serde::de::DeserializeOwned;
use serde::Serialize;

/// Declared shape of a single field, used to validate and normalize values
/// crossing the wire boundary.
#[derive(Clone, Copy, Debug)]
pub enum FieldShape {
    Text,
    Integer,
    Number,
    /// Structured unique id, canonical UUID string on the wire.
    Identifier,
    /// Calendar date, `YYYY-MM-DD` on the wire.
    Date,
    Record(&'static RecordSchema),
    Records(&'static RecordSchema),
}

#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    /// Domain (`snake_case`) name; the wire name is derived from it.
    pub name: &'static str,
    pub shape: FieldShape,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, shape: FieldShape) -> Self {
        Self { name, shape, required: true }
    }

    pub const fn optional(name: &'static str, shape: FieldShape) -> Self {
        Self { name, shape, required: false }
    }
}

#[derive(Debug)]
pub struct RecordSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl RecordSchema {
    pub fn field(&self, domain_name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == domain_name)
    }
}

/// A typed record with a schema declared at definition time.
pub trait WireRecord: Serialize + DeserializeOwned {
    const SCHEMA: &'static RecordSchema;
}
