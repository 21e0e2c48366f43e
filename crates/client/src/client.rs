//! Typed client for the remote time-tracking service.
//!
//! Every operation goes through one status mapping: 2xx bodies are decoded
//! with the record schemas from `tally_core::wire`, 400 and 404 become their
//! own variants, and everything else is reported with its status and body.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tally_core::domain::time_entry::{
    CreateTimeEntryCommand, TimeEntry, TimeEntryFilter, UpdateTimeEntryCommand,
};
use tally_core::wire::envelope::{ClientList, ProjectList, TimeEntryList, TimeEntryLookup};
use tally_core::wire::{self, DecodeError};
use tally_core::{Client, ProjectSummary};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::transport::{HttpMethod, HttpRequest, HttpTransport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Clone)]
pub struct TimeTrackingClient {
    transport: Arc<dyn HttpTransport>,
    entry_locks: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl TimeTrackingClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport, entry_locks: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>, ApiError> {
        let body = self.call("list_projects", HttpRequest::new(HttpMethod::Get, "/projects")).await?;
        match body {
            Some(value) => Ok(wire::decode::<ProjectList>(&value)?.projects),
            None => Ok(Vec::new()),
        }
    }

    pub async fn list_clients(&self) -> Result<Vec<Client>, ApiError> {
        let body = self.call("list_clients", HttpRequest::new(HttpMethod::Get, "/clients")).await?;
        match body {
            Some(value) => Ok(wire::decode::<ClientList>(&value)?.clients),
            None => Ok(Vec::new()),
        }
    }

    /// Lists entries matching `filter`. Only the filters that are present are
    /// sent; the service decides any default window.
    pub async fn list_time_entries(
        &self,
        filter: &TimeEntryFilter,
    ) -> Result<Vec<TimeEntry>, ApiError> {
        let request =
            HttpRequest::new(HttpMethod::Get, "/time-entries").with_query(filter.query_pairs());
        let body = self.call("list_time_entries", request).await?;
        match body {
            Some(value) => Ok(wire::decode::<TimeEntryList>(&value)?.time_entries),
            None => Ok(Vec::new()),
        }
    }

    pub async fn get_time_entry(&self, id: i64) -> Result<Option<TimeEntry>, ApiError> {
        let request = HttpRequest::new(HttpMethod::Get, format!("/time-entries/{id}"));
        match self.call("get_time_entry", request).await {
            Ok(Some(value)) => Ok(wire::decode::<TimeEntryLookup>(&value)?.time_entry),
            Ok(None) | Err(ApiError::NotFound) => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub async fn create_time_entry(
        &self,
        command: &CreateTimeEntryCommand,
    ) -> Result<TimeEntry, ApiError> {
        let body = encode_body(command)?;
        let request = HttpRequest::new(HttpMethod::Post, "/time-entries").with_body(body);
        match self.call("create_time_entry", request).await? {
            Some(value) => Ok(wire::decode::<TimeEntry>(&value)?),
            None => Ok(TimeEntry::default()),
        }
    }

    pub async fn update_time_entry(
        &self,
        command: &UpdateTimeEntryCommand,
    ) -> Result<TimeEntry, ApiError> {
        let _guard = self.lock_entry(command.id).await;
        let body = encode_body(command)?;
        let request =
            HttpRequest::new(HttpMethod::Put, format!("/time-entries/{}", command.id)).with_body(body);
        match self.call("update_time_entry", request).await? {
            Some(value) => Ok(wire::decode::<TimeEntry>(&value)?),
            None => Ok(TimeEntry {
                id: Some(command.id),
                project_id: Some(command.project_id),
                user_id: Some(command.user_id.clone()),
                date: Some(command.date),
                hours: Some(command.hours),
            }),
        }
    }

    pub async fn delete_time_entry(&self, id: i64) -> Result<DeleteOutcome, ApiError> {
        let _guard = self.lock_entry(id).await;
        let request = HttpRequest::new(HttpMethod::Delete, format!("/time-entries/{id}"));
        match self.call("delete_time_entry", request).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(ApiError::NotFound) => Ok(DeleteOutcome::NotFound),
            Err(error) => Err(error),
        }
    }

    async fn call(
        &self,
        operation: &'static str,
        request: HttpRequest,
    ) -> Result<Option<Value>, ApiError> {
        let method = request.method;
        let path = request.path.clone();
        debug!(event_name = "client.request.sent", operation, %method, path = %path, "sending request");

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    event_name = "client.request.connection_failed",
                    operation,
                    error = %error,
                    "time-tracking service unreachable"
                );
                return Err(error.into());
            }
        };

        debug!(
            event_name = "client.response.received",
            operation,
            status = response.status,
            "response received"
        );

        match response.status {
            200..=299 => parse_body(operation, &response.body),
            400 => Err(ApiError::BadRequest { message: response.body }),
            404 => Err(ApiError::NotFound),
            status_code => {
                warn!(
                    event_name = "client.response.unexpected_status",
                    operation,
                    status = status_code,
                    "unexpected response status"
                );
                Err(ApiError::UnexpectedResponse { status_code, body: response.body })
            }
        }
    }

    async fn lock_entry(&self, id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.entry_locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        lock.lock_owned().await
    }
}

fn parse_body(operation: &'static str, body: &str) -> Result<Option<Value>, ApiError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(body).map_err(|error| {
        ApiError::Decode(DecodeError::Malformed { record: operation, reason: error.to_string() })
    })?;
    if value.as_object().is_some_and(|object| object.is_empty()) {
        return Ok(None);
    }
    Ok(Some(value))
}

fn encode_body<T: wire::WireRecord>(record: &T) -> Result<Value, ApiError> {
    wire::encode(record).map_err(|error| ApiError::BadRequest { message: error.to_string() })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;
    use tally_core::domain::time_entry::{
        CreateTimeEntryCommand, TimeEntryFilter, UpdateTimeEntryCommand, UserId,
    };
    use tally_core::wire::DecodeError;
    use tally_core::ProjectId;
    use uuid::Uuid;

    use super::{DeleteOutcome, TimeTrackingClient};
    use crate::error::ApiError;
    use crate::transport::{
        HttpMethod, HttpRequest, HttpResponse, HttpTransport, ScriptedTransport, TransportError,
    };

    const PROJECT_UUID: &str = "3f2504e0-4f89-11d3-9a0c-0305e82c3301";

    fn client_with(transport: &ScriptedTransport) -> TimeTrackingClient {
        TimeTrackingClient::new(Arc::new(transport.clone()))
    }

    fn project_id() -> ProjectId {
        ProjectId(Uuid::parse_str(PROJECT_UUID).expect("valid uuid"))
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
    }

    #[tokio::test]
    async fn list_time_entries_sends_only_present_filters() {
        let transport = ScriptedTransport::new();
        transport.respond_json(200, &json!({"timeEntries": []}));
        let client = client_with(&transport);

        let entries = client
            .list_time_entries(&TimeEntryFilter::for_user(UserId("u1".to_string())))
            .await
            .expect("list should succeed");

        assert!(entries.is_empty());
        let requests = transport.requests();
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert_eq!(requests[0].path, "/time-entries");
        assert_eq!(requests[0].query, vec![("userId".to_string(), "u1".to_string())]);
    }

    #[tokio::test]
    async fn list_projects_decodes_envelope() {
        let transport = ScriptedTransport::new();
        transport.respond_json(
            200,
            &json!({"projects": [{
                "projectId": PROJECT_UUID,
                "projectName": "Website",
                "clientName": "Acme"
            }]}),
        );
        let client = client_with(&transport);

        let projects = client.list_projects().await.expect("list should succeed");

        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].project_id, project_id());
        assert_eq!(projects[0].client_name, "Acme");
    }

    #[tokio::test]
    async fn create_posts_camel_case_body_and_decodes_created_entry() {
        let transport = ScriptedTransport::new();
        transport.respond_json(
            201,
            &json!({
                "id": 42,
                "projectId": PROJECT_UUID,
                "userId": "user123",
                "date": "2025-04-16",
                "hours": 4
            }),
        );
        let client = client_with(&transport);

        let created = client
            .create_time_entry(&CreateTimeEntryCommand {
                project_id: project_id(),
                user_id: UserId("user123".to_string()),
                date: date("2025-04-16"),
                hours: 4.0,
            })
            .await
            .expect("create should succeed");

        assert_eq!(created.id, Some(42));
        let requests = transport.requests();
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(
            requests[0].body,
            Some(json!({
                "projectId": PROJECT_UUID,
                "userId": "user123",
                "date": "2025-04-16",
                "hours": 4.0
            }))
        );
    }

    #[tokio::test]
    async fn get_time_entry_maps_not_found_and_empty_body_to_none() {
        let transport = ScriptedTransport::new();
        transport.respond(404, "").respond(204, "").respond(200, "{}");
        let client = client_with(&transport);

        for _ in 0..3 {
            let entry = client.get_time_entry(999).await.expect("lookup should not fail");
            assert!(entry.is_none());
        }
    }

    #[tokio::test]
    async fn get_time_entry_unwraps_lookup_envelope() {
        let transport = ScriptedTransport::new();
        transport.respond_json(200, &json!({"timeEntry": {"id": 7, "hours": 2.5}}));
        let client = client_with(&transport);

        let entry = client.get_time_entry(7).await.expect("lookup").expect("entry present");

        assert_eq!(entry.id, Some(7));
        assert_eq!(entry.hours, Some(2.5));
        assert_eq!(transport.requests()[0].path, "/time-entries/7");
    }

    #[tokio::test]
    async fn status_codes_map_to_error_taxonomy() {
        let transport = ScriptedTransport::new();
        transport
            .respond(400, "hours must be positive")
            .respond(404, "")
            .respond(500, "boom")
            .fail("connection refused");
        let client = client_with(&transport);

        let bad_request = client.list_projects().await;
        let not_found = client.list_clients().await;
        let unexpected = client.list_projects().await;
        let connection = client.list_projects().await;

        assert_eq!(
            bad_request,
            Err(ApiError::BadRequest { message: "hours must be positive".to_string() })
        );
        assert_eq!(not_found, Err(ApiError::NotFound));
        assert_eq!(
            unexpected,
            Err(ApiError::UnexpectedResponse { status_code: 500, body: "boom".to_string() })
        );
        assert!(matches!(connection, Err(ApiError::Connection { .. })));
    }

    #[tokio::test]
    async fn strict_decoding_surfaces_as_decode_error() {
        let transport = ScriptedTransport::new();
        transport.respond_json(
            200,
            &json!({"projects": [{"projectId": "not-a-uuid", "projectName": "X", "clientName": "Y"}]}),
        );
        let client = client_with(&transport);

        let result = client.list_projects().await;

        assert!(matches!(result, Err(ApiError::Decode(DecodeError::InvalidIdentifier { .. }))));
    }

    #[tokio::test]
    async fn delete_reports_not_found_as_outcome() {
        let transport = ScriptedTransport::new();
        transport.respond(204, "").respond(404, "");
        let client = client_with(&transport);

        assert_eq!(client.delete_time_entry(5).await, Ok(DeleteOutcome::Deleted));
        assert_eq!(client.delete_time_entry(5).await, Ok(DeleteOutcome::NotFound));
        assert_eq!(transport.requests()[0].method, HttpMethod::Delete);
    }

    #[tokio::test]
    async fn update_puts_to_entry_path_and_echoes_command_on_empty_body() {
        let transport = ScriptedTransport::new();
        transport.respond(204, "").respond(404, "");
        let client = client_with(&transport);
        let command = UpdateTimeEntryCommand {
            id: 12,
            project_id: project_id(),
            user_id: UserId("user123".to_string()),
            date: date("2025-04-17"),
            hours: 3.0,
        };

        let updated = client.update_time_entry(&command).await.expect("update should succeed");
        let missing = client.update_time_entry(&command).await;

        assert_eq!(updated.id, Some(12));
        assert_eq!(updated.hours, Some(3.0));
        assert_eq!(missing, Err(ApiError::NotFound));
        let requests = transport.requests();
        assert_eq!(requests[0].method, HttpMethod::Put);
        assert_eq!(requests[0].path, "/time-entries/12");
        assert_eq!(requests[0].body.as_ref().and_then(|body| body.get("id")), Some(&json!(12)));
    }

    /// Holds every request open for a moment and tracks how many overlap.
    #[derive(Default)]
    struct OverlapTransport {
        counts: StdMutex<OverlapCounts>,
    }

    #[derive(Default)]
    struct OverlapCounts {
        in_flight: HashMap<String, usize>,
        max_per_path: HashMap<String, usize>,
        total: usize,
        max_total: usize,
    }

    impl OverlapTransport {
        fn max_for(&self, path: &str) -> usize {
            self.counts.lock().expect("counts").max_per_path.get(path).copied().unwrap_or(0)
        }

        fn max_total(&self) -> usize {
            self.counts.lock().expect("counts").max_total
        }
    }

    #[async_trait]
    impl HttpTransport for OverlapTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            {
                let mut counts = self.counts.lock().expect("counts");
                let current = counts.in_flight.entry(request.path.clone()).or_insert(0);
                *current += 1;
                let current = *current;
                let max = counts.max_per_path.entry(request.path.clone()).or_insert(0);
                *max = (*max).max(current);
                counts.total += 1;
                counts.max_total = counts.max_total.max(counts.total);
            }

            tokio::time::sleep(Duration::from_millis(20)).await;

            let mut counts = self.counts.lock().expect("counts");
            if let Some(current) = counts.in_flight.get_mut(&request.path) {
                *current -= 1;
            }
            counts.total -= 1;
            Ok(HttpResponse::new(204, ""))
        }
    }

    fn update(id: i64) -> UpdateTimeEntryCommand {
        UpdateTimeEntryCommand {
            id,
            project_id: project_id(),
            user_id: UserId("user123".to_string()),
            date: date("2025-04-17"),
            hours: 2.0,
        }
    }

    #[tokio::test]
    async fn mutations_on_one_entry_never_overlap() {
        let transport = Arc::new(OverlapTransport::default());
        let client = TimeTrackingClient::new(transport.clone());
        let command = update(3);

        let (updated, deleted, again) = tokio::join!(
            client.update_time_entry(&command),
            client.delete_time_entry(3),
            client.update_time_entry(&command),
        );

        assert!(updated.is_ok() && again.is_ok());
        assert_eq!(deleted, Ok(DeleteOutcome::Deleted));
        assert_eq!(transport.max_for("/time-entries/3"), 1);
    }

    #[tokio::test]
    async fn mutations_on_different_entries_run_side_by_side() {
        let transport = Arc::new(OverlapTransport::default());
        let client = TimeTrackingClient::new(transport.clone());

        let (first, second) =
            tokio::join!(client.delete_time_entry(3), client.delete_time_entry(4));

        assert_eq!(first, Ok(DeleteOutcome::Deleted));
        assert_eq!(second, Ok(DeleteOutcome::Deleted));
        assert_eq!(transport.max_for("/time-entries/3"), 1);
        assert_eq!(transport.max_total(), 2);
    }

    #[tokio::test]
    async fn concurrent_mutations_on_one_entry_both_complete() {
        let transport = ScriptedTransport::new();
        transport.respond(204, "").respond(404, "");
        let client = client_with(&transport);

        let (first, second) =
            tokio::join!(client.delete_time_entry(3), client.delete_time_entry(3));

        let mut outcomes = vec![first.expect("first delete"), second.expect("second delete")];
        outcomes.sort_by_key(|outcome| matches!(outcome, DeleteOutcome::NotFound));
        assert_eq!(outcomes, vec![DeleteOutcome::Deleted, DeleteOutcome::NotFound]);
    }
}
