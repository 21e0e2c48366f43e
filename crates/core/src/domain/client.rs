use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::project::{Project, PROJECT_SCHEMA};
use crate::wire::{FieldShape, FieldSpec, RecordSchema, WireRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub Uuid);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A billable customer. Owns the projects booked against it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    #[serde(default)]
    pub projects: Vec<Project>,
}

pub const CLIENT_SCHEMA: RecordSchema = RecordSchema {
    name: "Client",
    fields: &[
        FieldSpec::required("id", FieldShape::Identifier),
        FieldSpec::required("name", FieldShape::Text),
        FieldSpec::optional("projects", FieldShape::Records(&PROJECT_SCHEMA)),
    ],
};

impl WireRecord for Client {
    const SCHEMA: &'static RecordSchema = &CLIENT_SCHEMA;
}
