//! One poll round trip against a registry entry, shared by both flows.
//!
//! Order of checks: in-flight permit, entry still pending (ticket), network
//! call without any lock held, scheduler still live, then apply.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::notify::{Flow, Notification, Notifier};
use crate::registry::{ApplyOutcome, IgnoreReason, PollReport, PollResponse, RequestRegistry};
use crate::scheduler::{InFlight, Liveness};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct PollSite<'a, P, R> {
    pub flow: Flow,
    pub registry: &'a Mutex<RequestRegistry<P, R>>,
    pub in_flight: &'a InFlight,
    pub notifier: &'a dyn Notifier,
}

impl<P, R: PollResponse> PollSite<'_, P, R> {
    pub async fn poll<F, Fut>(&self, request_id: &str, liveness: &Liveness, fetch: F) -> PollReport
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let mut report = PollReport::default();
        let Some(_permit) = self.in_flight.try_acquire(request_id) else {
            tracing::debug!(flow = %self.flow, request_id, "Poll already outstanding, skipped");
            return report;
        };
        let Some(ticket) = lock(self.registry).begin_poll(request_id) else {
            return report;
        };

        report.polled += 1;
        let response = fetch().await;

        if !liveness.is_active() {
            tracing::debug!(flow = %self.flow, request_id, "Scheduler stopped, poll response discarded");
            report.ignored += 1;
            return report;
        }

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(flow = %self.flow, request_id, error = %e, "Poll failed");
                self.notifier
                    .notify(Notification::error(format!("poll {}", self.flow), &e));
                report.failed += 1;
                return report;
            }
        };

        let outcome = lock(self.registry).apply_ticketed(&ticket, response);
        match outcome {
            ApplyOutcome::Applied { current, .. } => {
                report.applied += 1;
                if outcome.became_terminal() {
                    tracing::info!(flow = %self.flow, request_id, status = %current, "Request finished");
                    report.completed.push(request_id.to_string());
                    self.notifier.notify(Notification::RequestUpdated {
                        flow: self.flow,
                        request_id: request_id.to_string(),
                        status: current,
                    });
                }
            }
            ApplyOutcome::Ignored(reason) => {
                if reason == IgnoreReason::Stale {
                    tracing::debug!(flow = %self.flow, request_id, "Older poll response dropped");
                }
                report.ignored += 1;
            }
        }
        report
    }
}
