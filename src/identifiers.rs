//! Identifiers search flow: one federated search at a time.
//!
//! A submit replaces the current search. Polls run until the request leaves
//! `PENDING`; the result is exposed as a flat consignment list, per-gate
//! results and a per-gate summary. Pinning a consignment caches it under its
//! `datasetId` for the pinned-record view.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use portal_types::{
    Consignment, GateResult, IdentifiersResponse, IdentifiersSearchRequest, RequestStatus,
};

use crate::aggregate::{aggregate, sort_by, summarize, GateSummary, SortDirection, SortState};
use crate::api::PortalApi;
use crate::cache::ResultCache;
use crate::config::{PortalConfig, AUTO_POLL_FLAG};
use crate::error::{PortalError, Result};
use crate::notify::{Flow, Notification, Notifier};
use crate::poll::{lock, PollSite};
use crate::registry::{PollReport, RequestRegistry, SearchRequest};
use crate::scheduler::{InFlight, Liveness, PollHandle, PollTarget, PollingScheduler};

pub type IdentifiersEntry = SearchRequest<IdentifiersSearchRequest, IdentifiersResponse>;

pub struct IdentifiersSearch {
    api: Arc<dyn PortalApi>,
    cache: ResultCache,
    notifier: Arc<dyn Notifier>,
    known_gates: Vec<String>,
    auto_poll_default: bool,
    registry: Mutex<RequestRegistry<IdentifiersSearchRequest, IdentifiersResponse>>,
    gate_sort: Mutex<SortState>,
    in_flight: InFlight,
}

impl IdentifiersSearch {
    pub fn new(
        api: Arc<dyn PortalApi>,
        cache: ResultCache,
        notifier: Arc<dyn Notifier>,
        config: &PortalConfig,
    ) -> Self {
        Self {
            api,
            cache,
            notifier,
            known_gates: config.known_gates.clone(),
            auto_poll_default: config.auto_poll_default,
            registry: Mutex::new(RequestRegistry::new(config.stale_responses)),
            gate_sort: Mutex::new(SortState::default()),
            in_flight: InFlight::new(),
        }
    }

    // -- lifecycle ---------------------------------------------------------

    /// Submit a search, replacing the current one. On failure the current
    /// search is left as it was.
    pub async fn submit(&self, params: IdentifiersSearchRequest) -> Result<String> {
        let ack = match self.api.post_identifiers(&params).await {
            Ok(ack) => ack,
            Err(e) => {
                self.notifier.notify(Notification::error("submit identifiers", &e));
                return Err(e);
            }
        };

        let request_id = {
            let mut registry = lock(&self.registry);
            registry.clear();
            registry.submit(params, &ack).request_id.clone()
        };
        lock(&self.gate_sort).reset();

        tracing::info!(%request_id, status = %ack.status, "Identifiers search submitted");
        self.notifier.notify(Notification::RequestSaved {
            flow: Flow::Identifiers,
            request_id: request_id.clone(),
        });
        Ok(request_id)
    }

    /// Poll the current search if it is still pending.
    pub async fn poll_pending(&self, liveness: &Liveness) -> PollReport {
        let pending = lock(&self.registry).pending_ids();
        let site = PollSite {
            flow: Flow::Identifiers,
            registry: &self.registry,
            in_flight: &self.in_flight,
            notifier: self.notifier.as_ref(),
        };

        let mut report = PollReport::default();
        for request_id in pending {
            let polled = site
                .poll(&request_id, liveness, || self.api.get_identifiers(&request_id))
                .await;
            report.merge(polled);
        }
        report
    }

    /// Start auto-polling on `scheduler`, gated by the persisted auto-poll
    /// preference.
    pub fn spawn_auto_poll(self: &Arc<Self>, scheduler: &PollingScheduler) -> PollHandle {
        let enabled = self.cache.flag_reader(AUTO_POLL_FLAG, self.auto_poll_default);
        scheduler.start_polling(self.clone(), enabled)
    }

    pub fn auto_poll_enabled(&self) -> bool {
        self.cache.get_flag(AUTO_POLL_FLAG, self.auto_poll_default)
    }

    pub fn set_auto_poll(&self, enabled: bool) -> Result<()> {
        self.cache.set_flag(AUTO_POLL_FLAG, enabled)
    }

    /// Drop the current search.
    pub fn reset(&self) {
        lock(&self.registry).clear();
        lock(&self.gate_sort).reset();
    }

    // -- views -------------------------------------------------------------

    pub fn current(&self) -> Option<IdentifiersEntry> {
        lock(&self.registry).entries().first().cloned()
    }

    pub fn status(&self) -> Option<RequestStatus> {
        lock(&self.registry).entries().first().map(|e| e.status)
    }

    fn current_gate_results(&self) -> Vec<GateResult> {
        lock(&self.registry)
            .entries()
            .first()
            .and_then(|e| e.result.as_ref())
            .map(|r| r.identifiers.clone())
            .unwrap_or_default()
    }

    /// Per-gate results, in the current click-to-toggle order.
    pub fn gate_results(&self) -> Vec<GateResult> {
        let mut results = self.current_gate_results();
        if let Some((key, direction)) = lock(&self.gate_sort).current() {
            sort_by(&mut results, key, direction);
        }
        results
    }

    /// Toggle the per-gate result sort on `key`.
    pub fn sort_gate_results(&self, key: &str) -> SortDirection {
        lock(&self.gate_sort).toggle(key)
    }

    /// All consignments of the current result, gate by gate.
    pub fn records(&self) -> Vec<Consignment> {
        aggregate(&self.current_gate_results())
    }

    /// Per-gate buckets over the configured gates.
    pub fn summary(&self) -> GateSummary {
        let registry = lock(&self.registry);
        let results = registry
            .entries()
            .first()
            .and_then(|e| e.result.as_ref())
            .map(|r| r.identifiers.as_slice());
        summarize(results, &self.known_gates)
    }

    /// Cache the consignment with `dataset_id` for the pinned-record view.
    pub fn pin_record(&self, dataset_id: &str) -> Result<Consignment> {
        let record = self
            .records()
            .into_iter()
            .find(|c| c.dataset_id == dataset_id)
            .ok_or_else(|| PortalError::not_found(dataset_id))?;
        self.cache.put(dataset_id, &record)?;
        tracing::info!(dataset_id, gate_id = %record.gate_id, "Record pinned");
        Ok(record)
    }
}

#[async_trait]
impl PollTarget for IdentifiersSearch {
    async fn poll_tick(&self, liveness: &Liveness) {
        let report = self.poll_pending(liveness).await;
        if report.polled > 0 {
            tracing::debug!(?report, "Identifiers poll tick");
        }
    }
}
