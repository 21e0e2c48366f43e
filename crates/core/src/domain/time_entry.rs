use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::project::ProjectId;
use crate::wire::{FieldShape, FieldSpec, RecordSchema, WireRecord};

/// Opaque user identifier assigned by the time-tracking service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A time entry as read from the service. Every field is optional so partial
/// entries can be assembled; persisted entries always carry `id`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateTimeEntryCommand {
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub hours: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateTimeEntryCommand {
    pub id: i64,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub hours: f64,
}

/// Filters for `GET /time-entries`. Absent bounds mean "unbounded".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeEntryFilter {
    pub user_id: UserId,
    pub project_id: Option<ProjectId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl TimeEntryFilter {
    pub fn for_user(user_id: UserId) -> Self {
        Self { user_id, project_id: None, start_date: None, end_date: None }
    }

    /// Query parameters in wire casing, omitting every absent filter.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("userId", self.user_id.0.clone())];
        if let Some(project_id) = self.project_id {
            pairs.push(("projectId", project_id.to_string()));
        }
        if let Some(start_date) = self.start_date {
            pairs.push(("startDate", start_date.format("%Y-%m-%d").to_string()));
        }
        if let Some(end_date) = self.end_date {
            pairs.push(("endDate", end_date.format("%Y-%m-%d").to_string()));
        }
        pairs
    }
}

pub const TIME_ENTRY_SCHEMA: RecordSchema = RecordSchema {
    name: "TimeEntry",
    fields: &[
        FieldSpec::optional("id", FieldShape::Integer),
        FieldSpec::optional("project_id", FieldShape::Identifier),
        FieldSpec::optional("user_id", FieldShape::Text),
        FieldSpec::optional("date", FieldShape::Date),
        FieldSpec::optional("hours", FieldShape::Number),
    ],
};

pub const CREATE_TIME_ENTRY_SCHEMA: RecordSchema = RecordSchema {
    name: "CreateTimeEntryCommand",
    fields: &[
        FieldSpec::required("project_id", FieldShape::Identifier),
        FieldSpec::required("user_id", FieldShape::Text),
        FieldSpec::required("date", FieldShape::Date),
        FieldSpec::required("hours", FieldShape::Number),
    ],
};

pub const UPDATE_TIME_ENTRY_SCHEMA: RecordSchema = RecordSchema {
    name: "UpdateTimeEntryCommand",
    fields: &[
        FieldSpec::required("id", FieldShape::Integer),
        FieldSpec::required("project_id", FieldShape::Identifier),
        FieldSpec::required("user_id", FieldShape::Text),
        FieldSpec::required("date", FieldShape::Date),
        FieldSpec::required("hours", FieldShape::Number),
    ],
};

impl WireRecord for TimeEntry {
    const SCHEMA: &'static RecordSchema = &TIME_ENTRY_SCHEMA;
}

impl WireRecord for CreateTimeEntryCommand {
    const SCHEMA: &'static RecordSchema = &CREATE_TIME_ENTRY_SCHEMA;
}

impl WireRecord for UpdateTimeEntryCommand {
    const SCHEMA: &'static RecordSchema = &UPDATE_TIME_ENTRY_SCHEMA;
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::{TimeEntryFilter, UserId};
    use crate::domain::project::ProjectId;

    #[test]
    fn filter_for_user_only_carries_user_id() {
        let filter = TimeEntryFilter::for_user(UserId("u1".to_string()));
        assert_eq!(filter.query_pairs(), vec![("userId", "u1".to_string())]);
    }

    #[test]
    fn filter_encodes_present_bounds_in_wire_casing() {
        let project_id = ProjectId(Uuid::nil());
        let filter = TimeEntryFilter {
            user_id: UserId("u1".to_string()),
            project_id: Some(project_id),
            start_date: NaiveDate::from_ymd_opt(2025, 4, 1),
            end_date: None,
        };

        let pairs = filter.query_pairs();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[1], ("projectId", "00000000-0000-0000-0000-000000000000".to_string()));
        assert_eq!(pairs[2], ("startDate", "2025-04-01".to_string()));
    }
}
