use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tally_client::DeleteOutcome;
use tally_core::domain::time_entry::{
    CreateTimeEntryCommand, TimeEntryFilter, UpdateTimeEntryCommand,
};
use tally_core::wire::parse_date;
use tally_core::ProjectId;

use super::{parse_arguments, wire_list, wire_value, Tool, ToolAccess, ToolContext, ToolError};

const MAX_HOURS_PER_ENTRY: f64 = 24.0;

/// Rounds to the nearest quarter hour and checks `0 < hours <= 24`.
pub fn normalize_hours(hours: f64) -> Result<f64, ToolError> {
    if !hours.is_finite() {
        return Err(ToolError::InvalidArguments("hours must be a finite number".to_string()));
    }
    let rounded = (hours * 4.0).round() / 4.0;
    if rounded <= 0.0 || rounded > MAX_HOURS_PER_ENTRY {
        return Err(ToolError::InvalidArguments(format!(
            "hours must be greater than 0 and at most {MAX_HOURS_PER_ENTRY}, got {hours}"
        )));
    }
    Ok(rounded)
}

fn project_id(raw: &str) -> Result<ProjectId, ToolError> {
    raw.trim()
        .parse::<ProjectId>()
        .map_err(|_| ToolError::InvalidArguments(format!("`{raw}` is not a valid project id")))
}

fn iso_date(field: &str, raw: &str) -> Result<NaiveDate, ToolError> {
    parse_date(raw.trim()).ok_or_else(|| {
        ToolError::InvalidArguments(format!("{field} `{raw}` is not an ISO date (YYYY-MM-DD)"))
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTimeEntryArgs {
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    project_name: Option<String>,
    project_id: String,
    date: String,
    hours: f64,
}

pub struct BookTimeEntryTool;

#[async_trait]
impl Tool for BookTimeEntryTool {
    fn name(&self) -> &'static str {
        "bookTimeEntry"
    }

    fn description(&self) -> &'static str {
        "Books a time entry on a project for the current user. Hours are rounded to the \
         nearest quarter hour. Requires human approval before it runs."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "clientName": {"type": "string", "description": "Name of the client."},
                "projectName": {"type": "string", "description": "Name of the project."},
                "projectId": {"type": "string", "description": "Project id from getProjects."},
                "date": {"type": "string", "description": "Date of the work, YYYY-MM-DD."},
                "hours": {"type": "number", "description": "Hours worked, in quarter hours."}
            },
            "required": ["projectId", "date", "hours"]
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::Mutating
    }

    async fn invoke(
        &self,
        arguments: &Map<String, Value>,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let args: BookTimeEntryArgs = parse_arguments(arguments)?;
        let command = CreateTimeEntryCommand {
            project_id: project_id(&args.project_id)?,
            user_id: context.user_id.clone(),
            date: iso_date("date", &args.date)?,
            hours: normalize_hours(args.hours)?,
        };
        tracing::debug!(
            event_name = "tools.book_time_entry.prepared",
            client_name = args.client_name.as_deref().unwrap_or_default(),
            project_name = args.project_name.as_deref().unwrap_or_default(),
            hours = command.hours,
            "booking time entry"
        );

        let created = context.client.create_time_entry(&command).await?;
        wire_value(&created)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetTimeEntriesArgs {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

pub struct GetTimeEntriesTool;

#[async_trait]
impl Tool for GetTimeEntriesTool {
    fn name(&self) -> &'static str {
        "getTimeEntries"
    }

    fn description(&self) -> &'static str {
        "Lists the current user's time entries, optionally filtered by project and by an \
         inclusive date range."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "projectId": {"type": "string"},
                "startDate": {"type": "string", "description": "YYYY-MM-DD"},
                "endDate": {"type": "string", "description": "YYYY-MM-DD"}
            }
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::ReadOnly
    }

    async fn invoke(
        &self,
        arguments: &Map<String, Value>,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let args: GetTimeEntriesArgs = parse_arguments(arguments)?;
        let mut filter = TimeEntryFilter::for_user(context.user_id.clone());
        filter.project_id = args.project_id.as_deref().map(project_id).transpose()?;
        filter.start_date =
            args.start_date.as_deref().map(|raw| iso_date("startDate", raw)).transpose()?;
        filter.end_date = args.end_date.as_deref().map(|raw| iso_date("endDate", raw)).transpose()?;
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(ToolError::InvalidArguments(
                    "startDate must not be after endDate".to_string(),
                ));
            }
        }

        let entries = context.client.list_time_entries(&filter).await?;
        Ok(json!({"timeEntries": wire_list(&entries)?}))
    }
}

#[derive(Debug, Deserialize)]
struct EntryIdArgs {
    id: i64,
}

pub struct GetTimeEntryTool;

#[async_trait]
impl Tool for GetTimeEntryTool {
    fn name(&self) -> &'static str {
        "getTimeEntry"
    }

    fn description(&self) -> &'static str {
        "Looks up a single time entry by its numeric id."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"id": {"type": "integer"}},
            "required": ["id"]
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::ReadOnly
    }

    async fn invoke(
        &self,
        arguments: &Map<String, Value>,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let args: EntryIdArgs = parse_arguments(arguments)?;
        match context.client.get_time_entry(args.id).await? {
            Some(entry) => Ok(json!({"timeEntry": wire_value(&entry)?})),
            None => Ok(json!({"timeEntry": null})),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTimeEntryArgs {
    id: i64,
    project_id: String,
    date: String,
    hours: f64,
}

pub struct UpdateTimeEntryTool;

#[async_trait]
impl Tool for UpdateTimeEntryTool {
    fn name(&self) -> &'static str {
        "updateTimeEntry"
    }

    fn description(&self) -> &'static str {
        "Replaces the project, date and hours of an existing time entry. Requires human \
         approval before it runs."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer"},
                "projectId": {"type": "string"},
                "date": {"type": "string", "description": "YYYY-MM-DD"},
                "hours": {"type": "number"}
            },
            "required": ["id", "projectId", "date", "hours"]
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::Mutating
    }

    async fn invoke(
        &self,
        arguments: &Map<String, Value>,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let args: UpdateTimeEntryArgs = parse_arguments(arguments)?;
        let command = UpdateTimeEntryCommand {
            id: args.id,
            project_id: project_id(&args.project_id)?,
            user_id: context.user_id.clone(),
            date: iso_date("date", &args.date)?,
            hours: normalize_hours(args.hours)?,
        };

        let updated = context.client.update_time_entry(&command).await?;
        wire_value(&updated)
    }
}

pub struct DeleteTimeEntryTool;

#[async_trait]
impl Tool for DeleteTimeEntryTool {
    fn name(&self) -> &'static str {
        "deleteTimeEntry"
    }

    fn description(&self) -> &'static str {
        "Deletes a time entry by id. Requires human approval before it runs."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"id": {"type": "integer"}},
            "required": ["id"]
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::Mutating
    }

    async fn invoke(
        &self,
        arguments: &Map<String, Value>,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let args: EntryIdArgs = parse_arguments(arguments)?;
        let outcome = context.client.delete_time_entry(args.id).await?;
        Ok(json!({"id": args.id, "deleted": outcome == DeleteOutcome::Deleted}))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map, Value};
    use tally_client::{HttpMethod, ScriptedTransport, TimeTrackingClient};
    use tally_core::domain::time_entry::UserId;

    use super::{
        normalize_hours, BookTimeEntryTool, DeleteTimeEntryTool, GetTimeEntriesTool,
        GetTimeEntryTool, UpdateTimeEntryTool,
    };
    use crate::tools::{Tool, ToolContext, ToolError};

    const PROJECT_UUID: &str = "3f2504e0-4f89-11d3-9a0c-0305e82c3301";

    fn context(transport: &ScriptedTransport) -> ToolContext {
        ToolContext::new(
            TimeTrackingClient::new(Arc::new(transport.clone())),
            UserId("user123".to_string()),
        )
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn hours_round_to_nearest_quarter() {
        assert_eq!(normalize_hours(4.0).expect("valid"), 4.0);
        assert_eq!(normalize_hours(1.1).expect("valid"), 1.0);
        assert_eq!(normalize_hours(1.13).expect("valid"), 1.25);
        assert_eq!(normalize_hours(7.8).expect("valid"), 7.75);
        assert_eq!(normalize_hours(24.0).expect("valid"), 24.0);
    }

    #[test]
    fn hours_outside_range_are_rejected() {
        for hours in [0.0, 0.1, -2.0, 24.5, f64::NAN] {
            assert!(
                matches!(normalize_hours(hours), Err(ToolError::InvalidArguments(_))),
                "{hours} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn booking_posts_with_context_user_and_returns_created_entry() {
        let transport = ScriptedTransport::new();
        transport.respond_json(
            201,
            &json!({"id": 42, "projectId": PROJECT_UUID, "userId": "user123",
                    "date": "2025-04-16", "hours": 4}),
        );

        let output = BookTimeEntryTool
            .invoke(
                &args(json!({
                    "clientName": "Acme",
                    "projectName": "Website",
                    "projectId": PROJECT_UUID,
                    "date": "2025-04-16",
                    "hours": 4
                })),
                &context(&transport),
            )
            .await
            .expect("booking should succeed");

        assert_eq!(output["id"], json!(42));
        let request = &transport.requests()[0];
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.path, "/time-entries");
        assert_eq!(
            request.body,
            Some(json!({
                "projectId": PROJECT_UUID,
                "userId": "user123",
                "date": "2025-04-16",
                "hours": 4.0
            }))
        );
    }

    #[tokio::test]
    async fn booking_validates_before_calling_the_service() {
        let transport = ScriptedTransport::new();
        let bad_date = BookTimeEntryTool
            .invoke(
                &args(json!({"projectId": PROJECT_UUID, "date": "16/04/2025", "hours": 4})),
                &context(&transport),
            )
            .await;
        let bad_project = BookTimeEntryTool
            .invoke(
                &args(json!({"projectId": "P", "date": "2025-04-16", "hours": 4})),
                &context(&transport),
            )
            .await;
        let missing_hours = BookTimeEntryTool
            .invoke(&args(json!({"projectId": PROJECT_UUID, "date": "2025-04-16"})), &context(&transport))
            .await;

        assert!(matches!(bad_date, Err(ToolError::InvalidArguments(_))));
        assert!(matches!(bad_project, Err(ToolError::InvalidArguments(_))));
        assert!(matches!(missing_hours, Err(ToolError::InvalidArguments(_))));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn listing_sends_only_supplied_filters() {
        let transport = ScriptedTransport::new();
        transport
            .respond_json(200, &json!({"timeEntries": [{"id": 1, "hours": 2}]}))
            .respond_json(200, &json!({"timeEntries": []}));

        let all = GetTimeEntriesTool
            .invoke(&Map::new(), &context(&transport))
            .await
            .expect("unfiltered listing");
        let _ = GetTimeEntriesTool
            .invoke(
                &args(json!({"startDate": "2025-04-01", "endDate": "2025-04-30"})),
                &context(&transport),
            )
            .await
            .expect("ranged listing");

        assert_eq!(all["timeEntries"][0]["id"], json!(1));
        let requests = transport.requests();
        assert_eq!(requests[0].query, vec![("userId".to_string(), "user123".to_string())]);
        assert_eq!(requests[1].query.len(), 3);
        assert_eq!(requests[1].query[1], ("startDate".to_string(), "2025-04-01".to_string()));
    }

    #[tokio::test]
    async fn listing_rejects_inverted_range() {
        let transport = ScriptedTransport::new();

        let result = GetTimeEntriesTool
            .invoke(
                &args(json!({"startDate": "2025-05-01", "endDate": "2025-04-01"})),
                &context(&transport),
            )
            .await;

        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn missing_entry_is_reported_as_null() {
        let transport = ScriptedTransport::new();
        transport.respond(404, "");

        let output = GetTimeEntryTool
            .invoke(&args(json!({"id": 999})), &context(&transport))
            .await
            .expect("missing entry is not an error");

        assert_eq!(output, json!({"timeEntry": null}));
    }

    #[tokio::test]
    async fn update_and_delete_target_the_entry_path() {
        let transport = ScriptedTransport::new();
        transport.respond(204, "").respond(404, "");

        let updated = UpdateTimeEntryTool
            .invoke(
                &args(json!({"id": 9, "projectId": PROJECT_UUID, "date": "2025-04-17", "hours": 2.5})),
                &context(&transport),
            )
            .await
            .expect("update");
        let deleted = DeleteTimeEntryTool
            .invoke(&args(json!({"id": 9})), &context(&transport))
            .await
            .expect("delete");

        assert_eq!(updated["hours"], json!(2.5));
        assert_eq!(deleted, json!({"id": 9, "deleted": false}));
        let requests = transport.requests();
        assert_eq!(requests[0].path, "/time-entries/9");
        assert_eq!(requests[1].method, HttpMethod::Delete);
    }
}
