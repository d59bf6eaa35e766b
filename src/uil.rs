//! UIL flow: dataset lookups by Unique Identifier Link.
//!
//! Any number of requests may be pending at once; each tick polls every
//! pending entry once, concurrently. Completed entries carry the dataset
//! document, which is decoded afresh for every open or download.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::join_all;
use portal_types::{NoteRequest, UilResponse, UilSearchRequest};

use crate::api::PortalApi;
use crate::cache::ResultCache;
use crate::config::{PortalConfig, AUTO_POLL_FLAG};
use crate::document::{self, parse_markup, AssetStylesheet, ExportedFile, StylesheetCache};
use crate::error::{PortalError, Result};
use crate::notify::{Flow, Notification, Notifier};
use crate::poll::{lock, PollSite};
use crate::registry::{PollReport, RequestRegistry, SearchRequest};
use crate::scheduler::{InFlight, Liveness, PollHandle, PollTarget, PollingScheduler};

pub type UilEntry = SearchRequest<UilSearchRequest, UilResponse>;

pub struct UilSearch {
    api: Arc<dyn PortalApi>,
    cache: ResultCache,
    notifier: Arc<dyn Notifier>,
    stylesheet: StylesheetCache,
    auto_poll_default: bool,
    registry: Mutex<RequestRegistry<UilSearchRequest, UilResponse>>,
    in_flight: InFlight,
}

impl UilSearch {
    /// The stylesheet is fetched from `config.stylesheet_path` through `api`
    /// on first open.
    pub fn new(
        api: Arc<dyn PortalApi>,
        cache: ResultCache,
        notifier: Arc<dyn Notifier>,
        config: &PortalConfig,
    ) -> Self {
        let stylesheet = StylesheetCache::new(AssetStylesheet::new(
            api.clone(),
            config.stylesheet_path.clone(),
        ));
        Self::with_stylesheet(api, cache, notifier, stylesheet, config)
    }

    pub fn with_stylesheet(
        api: Arc<dyn PortalApi>,
        cache: ResultCache,
        notifier: Arc<dyn Notifier>,
        stylesheet: StylesheetCache,
        config: &PortalConfig,
    ) -> Self {
        Self {
            api,
            cache,
            notifier,
            stylesheet,
            auto_poll_default: config.auto_poll_default,
            registry: Mutex::new(RequestRegistry::new(config.stale_responses)),
            in_flight: InFlight::new(),
        }
    }

    /// Submit a UIL request; the new entry is appended.
    pub async fn submit(&self, request: UilSearchRequest) -> Result<String> {
        let ack = match self.api.post_uil(&request).await {
            Ok(ack) => ack,
            Err(e) => {
                self.notifier.notify(Notification::error("submit uil", &e));
                return Err(e);
            }
        };

        let request_id = lock(&self.registry)
            .submit(request, &ack)
            .request_id
            .clone();
        tracing::info!(%request_id, status = %ack.status, "UIL request submitted");
        self.notifier.notify(Notification::RequestSaved {
            flow: Flow::Uil,
            request_id: request_id.clone(),
        });
        Ok(request_id)
    }

    /// Poll every pending entry once.
    pub async fn poll_pending(&self, liveness: &Liveness) -> PollReport {
        let pending = lock(&self.registry).pending_ids();
        let site = PollSite {
            flow: Flow::Uil,
            registry: &self.registry,
            in_flight: &self.in_flight,
            notifier: self.notifier.as_ref(),
        };

        let polls = pending
            .iter()
            .map(|id| site.poll(id, liveness, || self.api.get_uil(id)));
        let mut report = PollReport::default();
        for polled in join_all(polls).await {
            report.merge(polled);
        }
        report
    }

    pub fn spawn_auto_poll(self: &Arc<Self>, scheduler: &PollingScheduler) -> PollHandle {
        let enabled = self.cache.flag_reader(AUTO_POLL_FLAG, self.auto_poll_default);
        scheduler.start_polling(self.clone(), enabled)
    }

    pub fn entries(&self) -> Vec<UilEntry> {
        lock(&self.registry).entries().to_vec()
    }

    pub fn get(&self, request_id: &str) -> Option<UilEntry> {
        lock(&self.registry).get(request_id).cloned()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        lock(&self.registry).clear();
    }

    fn document_data(&self, request_id: &str) -> Result<(String, UilSearchRequest)> {
        let registry = lock(&self.registry);
        let entry = registry
            .get(request_id)
            .ok_or_else(|| PortalError::UnknownRequest {
                request_id: request_id.to_string(),
            })?;
        let data = entry
            .result
            .as_ref()
            .and_then(|r| r.data.clone())
            .ok_or_else(|| PortalError::NoDocument {
                request_id: request_id.to_string(),
            })?;
        Ok((data, entry.params.clone()))
    }

    /// Render the entry's document with the portal stylesheet. Returns the
    /// inner HTML of the first result element, `None` when the transform
    /// yields no element.
    pub async fn open(&self, request_id: &str) -> Result<Option<String>> {
        let (data, _) = self.document_data(request_id)?;
        let rendered = async {
            let raw = document::decode(&data)?;
            let tree = parse_markup(raw.text()?)?;
            let sheet = self.stylesheet.get().await?;
            Ok::<_, PortalError>(document::render(&tree, &sheet)?)
        }
        .await
        .map_err(|e| {
            tracing::warn!(request_id, error = %e, "Document could not be rendered");
            e
        })?;
        Ok(rendered.first_element_inner_html())
    }

    /// Package the entry's document as `<datasetId>.xml`.
    pub fn download(&self, request_id: &str) -> Result<ExportedFile> {
        let (data, params) = self.document_data(request_id)?;
        let raw = document::decode(&data).map_err(|e| {
            tracing::warn!(request_id, error = %e, "Document could not be decoded");
            PortalError::from(e)
        })?;
        Ok(document::export_as_file(&raw, &format!("{}.xml", params.dataset_id)))
    }

    /// Attach a note to a submitted request.
    pub async fn add_note(&self, request_id: &str, message: &str) -> Result<()> {
        if lock(&self.registry).get(request_id).is_none() {
            return Err(PortalError::UnknownRequest {
                request_id: request_id.to_string(),
            });
        }
        let note = NoteRequest::new(request_id, message);
        match self.api.post_note(&note).await {
            Ok(_) => {
                tracing::info!(request_id, "Note sent");
                self.notifier.notify(Notification::NoteSaved {
                    request_id: request_id.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                self.notifier.notify(Notification::error("post note", &e));
                Err(e)
            }
        }
    }
}

#[async_trait]
impl PollTarget for UilSearch {
    async fn poll_tick(&self, liveness: &Liveness) {
        let report = self.poll_pending(liveness).await;
        if report.polled > 0 {
            tracing::debug!(?report, "UIL poll tick");
        }
    }
}
