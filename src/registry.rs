//! RequestRegistry - ordered, in-memory collection of submitted requests.
//!
//! Entries are created from a successful submit response, mutated only by
//! poll responses, and removed only by `clear()`. Once an entry leaves
//! `PENDING` it is never mutated again: late responses (after a clear, after
//! a terminal status, or after the scheduler stopped) are reported as
//! ignored instead of applied.

use chrono::{DateTime, Utc};
use portal_types::{IdentifiersResponse, RequestIdResponse, RequestStatus, UilResponse};
use serde::{Deserialize, Serialize};

use crate::status::{classify, PresentationClass};

// ---------------------------------------------------------------------------
// PollResponse
// ---------------------------------------------------------------------------

/// Status fields common to every response that can update an entry.
pub trait PollResponse {
    fn request_id(&self) -> &str;
    fn raw_status(&self) -> &str;
    fn error_code(&self) -> Option<&str>;
    fn error_description(&self) -> Option<&str>;
}

impl PollResponse for RequestIdResponse {
    fn request_id(&self) -> &str {
        &self.request_id
    }
    fn raw_status(&self) -> &str {
        &self.status
    }
    fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }
    fn error_description(&self) -> Option<&str> {
        self.error_description.as_deref()
    }
}

impl PollResponse for IdentifiersResponse {
    fn request_id(&self) -> &str {
        &self.request_id
    }
    fn raw_status(&self) -> &str {
        &self.status
    }
    fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }
    fn error_description(&self) -> Option<&str> {
        self.error_description.as_deref()
    }
}

impl PollResponse for UilResponse {
    fn request_id(&self) -> &str {
        &self.request_id
    }
    fn raw_status(&self) -> &str {
        &self.status
    }
    fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }
    fn error_description(&self) -> Option<&str> {
        self.error_description.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// What to do with a response whose poll was issued before the last
/// applied one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleResponsePolicy {
    /// Apply whatever arrives; the last applied response wins.
    #[default]
    LastWriteWins,
    /// Discard responses carrying an older poll ticket.
    RejectStale,
}

#[derive(Debug, Clone)]
pub struct SearchRequest<P, R> {
    pub request_id: String,
    pub params: P,
    pub status: RequestStatus,
    pub class: PresentationClass,
    /// Status string exactly as the gate sent it.
    pub raw_status: String,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
    /// Last applied poll response.
    pub result: Option<R>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    issued_tickets: u64,
    applied_ticket: u64,
}

impl<P, R> SearchRequest<P, R> {
    pub fn is_pending(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Issued when a poll starts; hand it back with the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTicket {
    pub request_id: String,
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Applied; carries the status before and after.
    Applied {
        previous: RequestStatus,
        current: RequestStatus,
    },
    Ignored(IgnoreReason),
}

impl ApplyOutcome {
    /// True when this application moved the entry out of `PENDING`.
    pub fn became_terminal(&self) -> bool {
        matches!(
            self,
            Self::Applied { previous, current } if !previous.is_terminal() && current.is_terminal()
        )
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No entry with this id (cleared, or never submitted).
    UnknownRequest,
    /// Entry already left `PENDING`.
    AlreadyTerminal,
    /// Older than an applied response, under `RejectStale`.
    Stale,
}

/// What one poll round did, across all the requests it touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Polls sent.
    pub polled: usize,
    /// Responses applied to an entry.
    pub applied: usize,
    /// Ids that left `PENDING` in this round.
    pub completed: Vec<String>,
    /// Responses dropped: entry gone, already terminal, stale, or the
    /// scheduler stopped while the poll was out.
    pub ignored: usize,
    /// Transport failures; entries untouched.
    pub failed: usize,
}

impl PollReport {
    pub fn merge(&mut self, other: PollReport) {
        self.polled += other.polled;
        self.applied += other.applied;
        self.completed.extend(other.completed);
        self.ignored += other.ignored;
        self.failed += other.failed;
    }
}

// ---------------------------------------------------------------------------
// RequestRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RequestRegistry<P, R> {
    entries: Vec<SearchRequest<P, R>>,
    policy: StaleResponsePolicy,
}

impl<P, R> Default for RequestRegistry<P, R> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            policy: StaleResponsePolicy::default(),
        }
    }
}

impl<P, R: PollResponse> RequestRegistry<P, R> {
    pub fn new(policy: StaleResponsePolicy) -> Self {
        Self {
            entries: Vec::new(),
            policy,
        }
    }

    /// Record a successful submission. A request id already present is
    /// replaced in place.
    pub fn submit(&mut self, params: P, ack: &RequestIdResponse) -> &SearchRequest<P, R> {
        let classified = classify(&ack.status);
        let entry = SearchRequest {
            request_id: ack.request_id.clone(),
            params,
            status: classified.status,
            class: classified.class,
            raw_status: ack.status.clone(),
            error_code: ack.error_code.clone(),
            error_description: ack.error_description.clone(),
            result: None,
            created_at: Utc::now(),
            updated_at: None,
            issued_tickets: 0,
            applied_ticket: 0,
        };

        let index = match self.position(&ack.request_id) {
            Some(index) => {
                tracing::warn!(request_id = %ack.request_id, "Duplicate request id, replacing entry");
                self.entries[index] = entry;
                index
            }
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };
        &self.entries[index]
    }

    pub fn get(&self, request_id: &str) -> Option<&SearchRequest<P, R>> {
        self.entries.iter().find(|e| e.request_id == request_id)
    }

    /// Entries in submission order.
    pub fn entries(&self) -> &[SearchRequest<P, R>] {
        &self.entries
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.is_pending())
            .map(|e| e.request_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start a poll for a pending entry. `None` when there is nothing to poll.
    pub fn begin_poll(&mut self, request_id: &str) -> Option<PollTicket> {
        let entry = self.entry_mut(request_id)?;
        if !entry.is_pending() {
            return None;
        }
        entry.issued_tickets += 1;
        Some(PollTicket {
            request_id: entry.request_id.clone(),
            seq: entry.issued_tickets,
        })
    }

    /// Apply a poll response for `request_id`, last write wins.
    pub fn apply_poll_result(&mut self, request_id: &str, response: R) -> ApplyOutcome {
        self.apply(request_id, None, response)
    }

    /// Apply a response obtained with `ticket`, honouring the stale policy.
    pub fn apply_ticketed(&mut self, ticket: &PollTicket, response: R) -> ApplyOutcome {
        self.apply(&ticket.request_id, Some(ticket.seq), response)
    }

    fn apply(&mut self, request_id: &str, seq: Option<u64>, response: R) -> ApplyOutcome {
        let policy = self.policy;
        let Some(entry) = self.entry_mut(request_id) else {
            tracing::debug!(request_id, "Poll response for unknown request ignored");
            return ApplyOutcome::Ignored(IgnoreReason::UnknownRequest);
        };
        if !entry.is_pending() {
            tracing::debug!(request_id, status = %entry.status, "Poll response for terminal request ignored");
            return ApplyOutcome::Ignored(IgnoreReason::AlreadyTerminal);
        }
        if let Some(seq) = seq {
            if policy == StaleResponsePolicy::RejectStale && seq <= entry.applied_ticket {
                tracing::debug!(request_id, seq, applied = entry.applied_ticket, "Stale poll response discarded");
                return ApplyOutcome::Ignored(IgnoreReason::Stale);
            }
            entry.applied_ticket = entry.applied_ticket.max(seq);
        }

        let previous = entry.status;
        let classified = classify(response.raw_status());
        entry.status = classified.status;
        entry.class = classified.class;
        entry.raw_status = response.raw_status().to_string();
        entry.error_code = response.error_code().map(str::to_string);
        entry.error_description = response.error_description().map(str::to_string);
        entry.result = Some(response);
        entry.updated_at = Some(Utc::now());

        ApplyOutcome::Applied {
            previous,
            current: entry.status,
        }
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, request_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.request_id == request_id)
    }

    fn entry_mut(&mut self, request_id: &str) -> Option<&mut SearchRequest<P, R>> {
        self.entries.iter_mut().find(|e| e.request_id == request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Registry = RequestRegistry<&'static str, UilResponse>;

    fn pending_ack(id: &str) -> RequestIdResponse {
        RequestIdResponse::new(id, "PENDING")
    }

    #[test]
    fn submit_creates_pending_entry() {
        let mut registry = Registry::default();
        let entry = registry.submit("params", &pending_ack("R1"));
        assert_eq!(entry.status, RequestStatus::Pending);
        assert!(entry.result.is_none());
        assert_eq!(registry.pending_ids(), vec!["R1".to_string()]);
    }

    #[test]
    fn apply_updates_status_and_fields() {
        let mut registry = Registry::default();
        registry.submit("params", &pending_ack("R1"));

        let outcome = registry.apply_poll_result(
            "R1",
            UilResponse::new("R1", "ERROR").with_error("E01", "gate unreachable"),
        );
        assert!(outcome.became_terminal());

        let entry = registry.get("R1").unwrap();
        assert_eq!(entry.status, RequestStatus::Error);
        assert_eq!(entry.class, PresentationClass::Error);
        assert_eq!(entry.error_code.as_deref(), Some("E01"));
        assert!(registry.pending_ids().is_empty());
    }

    #[test]
    fn unknown_status_keeps_entry_pending() {
        let mut registry = Registry::default();
        registry.submit("params", &pending_ack("R1"));
        registry.apply_poll_result("R1", UilResponse::new("R1", "IN_FLIGHT"));

        let entry = registry.get("R1").unwrap();
        assert_eq!(entry.status, RequestStatus::Pending);
        assert_eq!(entry.raw_status, "IN_FLIGHT");
    }

    #[test]
    fn terminal_entry_is_never_mutated_again() {
        let mut registry = Registry::default();
        registry.submit("params", &pending_ack("R1"));
        registry.apply_poll_result("R1", UilResponse::new("R1", "COMPLETE").with_data("PGEvPg=="));

        let late = registry.apply_poll_result("R1", UilResponse::new("R1", "PENDING"));
        assert_eq!(late, ApplyOutcome::Ignored(IgnoreReason::AlreadyTerminal));
        assert!(registry.begin_poll("R1").is_none());

        let entry = registry.get("R1").unwrap();
        assert_eq!(entry.status, RequestStatus::Complete);
        assert_eq!(entry.result.as_ref().unwrap().data.as_deref(), Some("PGEvPg=="));
    }

    #[test]
    fn response_after_clear_is_ignored() {
        let mut registry = Registry::default();
        registry.submit("params", &pending_ack("R1"));
        let ticket = registry.begin_poll("R1").unwrap();
        registry.clear();

        let outcome = registry.apply_ticketed(&ticket, UilResponse::new("R1", "COMPLETE"));
        assert_eq!(outcome, ApplyOutcome::Ignored(IgnoreReason::UnknownRequest));
        assert!(registry.is_empty());
    }

    #[test]
    fn last_write_wins_applies_out_of_order_responses() {
        let mut registry = Registry::default();
        registry.submit("params", &pending_ack("R1"));
        let first = registry.begin_poll("R1").unwrap();
        let second = registry.begin_poll("R1").unwrap();

        registry.apply_ticketed(&second, UilResponse::new("R1", "PENDING").with_error("B", "newer"));
        let outcome =
            registry.apply_ticketed(&first, UilResponse::new("R1", "PENDING").with_error("A", "older"));

        assert!(outcome.is_applied());
        assert_eq!(registry.get("R1").unwrap().error_code.as_deref(), Some("A"));
    }

    #[test]
    fn reject_stale_discards_older_ticket() {
        let mut registry: Registry = RequestRegistry::new(StaleResponsePolicy::RejectStale);
        registry.submit("params", &pending_ack("R1"));
        let first = registry.begin_poll("R1").unwrap();
        let second = registry.begin_poll("R1").unwrap();
        assert!(second.seq > first.seq);

        registry.apply_ticketed(&second, UilResponse::new("R1", "PENDING").with_error("B", "newer"));
        let outcome =
            registry.apply_ticketed(&first, UilResponse::new("R1", "PENDING").with_error("A", "older"));

        assert_eq!(outcome, ApplyOutcome::Ignored(IgnoreReason::Stale));
        assert_eq!(registry.get("R1").unwrap().error_code.as_deref(), Some("B"));
    }

    #[test]
    fn entries_keep_submission_order() {
        let mut registry = Registry::default();
        for id in ["R3", "R1", "R2"] {
            registry.submit("params", &pending_ack(id));
        }
        let ids: Vec<_> = registry.entries().iter().map(|e| e.request_id.as_str()).collect();
        assert_eq!(ids, vec!["R3", "R1", "R2"]);
    }
}
