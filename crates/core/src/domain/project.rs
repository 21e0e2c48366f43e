use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::client::ClientId;
use crate::wire::{FieldShape, FieldSpec, RecordSchema, WireRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub client_id: ClientId,
}

/// Flattened project read model as served by `GET /projects`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_id: ProjectId,
    pub project_name: String,
    pub client_name: String,
}

pub const PROJECT_SCHEMA: RecordSchema = RecordSchema {
    name: "Project",
    fields: &[
        FieldSpec::required("id", FieldShape::Identifier),
        FieldSpec::required("name", FieldShape::Text),
        FieldSpec::required("client_id", FieldShape::Identifier),
    ],
};

pub const PROJECT_SUMMARY_SCHEMA: RecordSchema = RecordSchema {
    name: "ProjectSummary",
    fields: &[
        FieldSpec::required("project_id", FieldShape::Identifier),
        FieldSpec::required("project_name", FieldShape::Text),
        FieldSpec::required("client_name", FieldShape::Text),
    ],
};

impl WireRecord for Project {
    const SCHEMA: &'static RecordSchema = &PROJECT_SCHEMA;
}

impl WireRecord for ProjectSummary {
    const SCHEMA: &'static RecordSchema = &PROJECT_SUMMARY_SCHEMA;
}
