//! Wrapper objects the time-tracking API returns around its lists and lookups.

use serde::{Deserialize, Serialize};

use crate::domain::client::{Client, CLIENT_SCHEMA};
use crate::domain::project::{ProjectSummary, PROJECT_SUMMARY_SCHEMA};
use crate::domain::time_entry::{TimeEntry, TIME_ENTRY_SCHEMA};
use crate::wire::{FieldShape, FieldSpec, RecordSchema, WireRecord};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectList {
    pub projects: Vec<ProjectSummary>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientList {
    pub clients: Vec<Client>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeEntryList {
    pub time_entries: Vec<TimeEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeEntryLookup {
    #[serde(default)]
    pub time_entry: Option<TimeEntry>,
}

impl WireRecord for ProjectList {
    const SCHEMA: &'static RecordSchema = &RecordSchema {
        name: "ProjectList",
        fields: &[FieldSpec::required("projects", FieldShape::Records(&PROJECT_SUMMARY_SCHEMA))],
    };
}

impl WireRecord for ClientList {
    const SCHEMA: &'static RecordSchema = &RecordSchema {
        name: "ClientList",
        fields: &[FieldSpec::required("clients", FieldShape::Records(&CLIENT_SCHEMA))],
    };
}

impl WireRecord for TimeEntryList {
    const SCHEMA: &'static RecordSchema = &RecordSchema {
        name: "TimeEntryList",
        fields: &[FieldSpec::required("time_entries", FieldShape::Records(&TIME_ENTRY_SCHEMA))],
    };
}

impl WireRecord for TimeEntryLookup {
    const SCHEMA: &'static RecordSchema = &RecordSchema {
        name: "TimeEntryLookup",
        fields: &[FieldSpec::optional("time_entry", FieldShape::Record(&TIME_ENTRY_SCHEMA))],
    };
}
