//! In-memory `PortalApi` replaying scripted gate behaviour.
//!
//! Submits hand out request ids (scripted, else random uuids) with status
//! `PENDING` unless another acknowledgement status is queued. Polls pop the next scripted response for the request id; the
//! last scripted response repeats, and an unscripted id answers `PENDING`.
//! Every call is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use portal_types::{
    IdentifiersResponse, IdentifiersSearchRequest, NoteRequest, RequestIdResponse,
    UilResponse, UilSearchRequest,
};

use super::PortalApi;
use crate::error::{PortalError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    PostIdentifiers(IdentifiersSearchRequest),
    GetIdentifiers(String),
    PostUil(UilSearchRequest),
    GetUil(String),
    PostNote(NoteRequest),
    FetchAsset(String),
}

#[derive(Debug, Clone)]
enum Scripted<T> {
    Reply(T),
    Fail(String),
}

type Script<T> = HashMap<String, VecDeque<Scripted<T>>>;

#[derive(Debug, Default)]
struct State {
    request_ids: VecDeque<String>,
    submit_failures: VecDeque<String>,
    ack_statuses: VecDeque<String>,
    identifiers: Script<IdentifiersResponse>,
    uil: Script<UilResponse>,
    assets: HashMap<String, String>,
    calls: Vec<ApiCall>,
}

#[derive(Debug, Default)]
pub struct ScriptedApi {
    state: Mutex<State>,
    latency: Option<Duration>,
}

/// Next response for an id: failures are consumed, the last reply sticks.
fn next_reply<T: Clone>(script: &mut Script<T>, request_id: &str) -> Option<Scripted<T>> {
    let queue = script.get_mut(request_id)?;
    let sticky = queue.len() == 1 && matches!(queue.front(), Some(Scripted::Reply(_)));
    if sticky {
        queue.front().cloned()
    } else {
        queue.pop_front()
    }
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids handed out by successive submits, in order.
    pub fn with_request_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().request_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_asset(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.lock().assets.insert(path.into(), content.into());
        self
    }

    /// Delay every poll answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn script_identifiers(&self, request_id: &str, responses: impl IntoIterator<Item = IdentifiersResponse>) {
        self.lock()
            .identifiers
            .entry(request_id.to_string())
            .or_default()
            .extend(responses.into_iter().map(Scripted::Reply));
    }

    pub fn script_uil(&self, request_id: &str, responses: impl IntoIterator<Item = UilResponse>) {
        self.lock()
            .uil
            .entry(request_id.to_string())
            .or_default()
            .extend(responses.into_iter().map(Scripted::Reply));
    }

    /// Make the next poll of `request_id` fail at the transport level.
    pub fn fail_next_poll(&self, request_id: &str, message: impl Into<String>) {
        let mut state = self.lock();
        let message = message.into();
        state
            .identifiers
            .entry(request_id.to_string())
            .or_default()
            .push_front(Scripted::Fail(message.clone()));
        state
            .uil
            .entry(request_id.to_string())
            .or_default()
            .push_front(Scripted::Fail(message));
    }

    pub fn fail_next_submit(&self, message: impl Into<String>) {
        self.lock().submit_failures.push_back(message.into());
    }

    /// Acknowledge the next successful submit with `status` instead of `PENDING`.
    pub fn ack_next_submit(&self, status: impl Into<String>) {
        self.lock().ack_statuses.push_back(status.into());
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Polls issued for `request_id` on either flow.
    pub fn poll_count(&self, request_id: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| match call {
                ApiCall::GetIdentifiers(id) | ApiCall::GetUil(id) => id == request_id,
                _ => false,
            })
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, call: ApiCall, operation: &str) -> Result<RequestIdResponse> {
        let mut state = self.lock();
        state.calls.push(call);
        if let Some(message) = state.submit_failures.pop_front() {
            return Err(PortalError::transport(operation, message));
        }
        let request_id = state
            .request_ids
            .pop_front()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let status = state
            .ack_statuses
            .pop_front()
            .unwrap_or_else(|| "PENDING".to_string());
        Ok(RequestIdResponse::new(request_id, status))
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl PortalApi for ScriptedApi {
    async fn post_identifiers(&self, request: &IdentifiersSearchRequest) -> Result<RequestIdResponse> {
        self.submit(ApiCall::PostIdentifiers(request.clone()), "submit identifiers")
    }

    async fn get_identifiers(&self, request_id: &str) -> Result<IdentifiersResponse> {
        let reply = {
            let mut state = self.lock();
            state.calls.push(ApiCall::GetIdentifiers(request_id.to_string()));
            next_reply(&mut state.identifiers, request_id)
        };
        self.delay().await;
        match reply {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(PortalError::transport("poll identifiers", message)),
            None => Ok(IdentifiersResponse::new(request_id, "PENDING")),
        }
    }

    async fn post_uil(&self, request: &UilSearchRequest) -> Result<RequestIdResponse> {
        self.submit(ApiCall::PostUil(request.clone()), "submit uil")
    }

    async fn get_uil(&self, request_id: &str) -> Result<UilResponse> {
        let reply = {
            let mut state = self.lock();
            state.calls.push(ApiCall::GetUil(request_id.to_string()));
            next_reply(&mut state.uil, request_id)
        };
        self.delay().await;
        match reply {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(PortalError::transport("poll uil", message)),
            None => Ok(UilResponse::new(request_id, "PENDING")),
        }
    }

    async fn post_note(&self, note: &NoteRequest) -> Result<serde_json::Value> {
        self.lock().calls.push(ApiCall::PostNote(note.clone()));
        Ok(serde_json::Value::Null)
    }

    async fn fetch_asset(&self, path: &str) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(ApiCall::FetchAsset(path.to_string()));
        state
            .assets
            .get(path)
            .cloned()
            .ok_or_else(|| PortalError::HttpStatus {
                operation: "fetch asset".into(),
                status: 404,
                body: path.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submits_use_scripted_then_random_ids() {
        let api = ScriptedApi::new().with_request_ids(["R1"]);
        let first = api.post_uil(&UilSearchRequest::new("D1", "ttf", "FR")).await.unwrap();
        let second = api.post_uil(&UilSearchRequest::new("D2", "ttf", "FR")).await.unwrap();

        assert_eq!(first.request_id, "R1");
        assert_eq!(first.status, "PENDING");
        assert!(uuid::Uuid::parse_str(&second.request_id).is_ok());
    }

    #[tokio::test]
    async fn queued_ack_status_applies_to_one_submit() {
        let api = ScriptedApi::new().with_request_ids(["R1", "R2"]);
        api.ack_next_submit("ERROR");
        let request = IdentifiersSearchRequest::new("AB-123");
        assert_eq!(api.post_identifiers(&request).await.unwrap().status, "ERROR");
        assert_eq!(api.post_identifiers(&request).await.unwrap().status, "PENDING");
    }

    #[tokio::test]
    async fn last_scripted_reply_repeats() {
        let api = ScriptedApi::new();
        api.script_uil(
            "R1",
            [UilResponse::new("R1", "PENDING"), UilResponse::new("R1", "COMPLETE")],
        );

        let statuses: Vec<String> = futures::future::join_all((0..3).map(|_| api.get_uil("R1")))
            .await
            .into_iter()
            .map(|r| r.unwrap().status)
            .collect();
        assert_eq!(statuses, vec!["PENDING", "COMPLETE", "COMPLETE"]);
        assert_eq!(api.poll_count("R1"), 3);
    }

    #[tokio::test]
    async fn scripted_failure_is_consumed_once() {
        let api = ScriptedApi::new();
        api.script_identifiers("R1", [IdentifiersResponse::new("R1", "COMPLETE")]);
        api.fail_next_poll("R1", "connection reset");

        assert!(api.get_identifiers("R1").await.unwrap_err().is_transport());
        assert_eq!(api.get_identifiers("R1").await.unwrap().status, "COMPLETE");
    }

    #[tokio::test]
    async fn unknown_asset_is_404() {
        let api = ScriptedApi::new().with_asset("/assets/xslt/eCMR.xslt", "<x/>");
        assert_eq!(api.fetch_asset("/assets/xslt/eCMR.xslt").await.unwrap(), "<x/>");
        assert!(matches!(
            api.fetch_asset("/missing").await,
            Err(PortalError::HttpStatus { status: 404, .. })
        ));
    }
}
