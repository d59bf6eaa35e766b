//! Shared fixtures for the lifecycle tests.

#![allow(dead_code)]

use std::sync::Arc;

use efti_portal::{
    ChannelNotifier, IdentifiersSearch, Notification, PortalConfig, ResultCache, ScriptedApi,
    UilSearch,
};
use portal_types::{Consignment, GateResult, IdentifiersResponse};
use tokio::sync::mpsc::UnboundedReceiver;

pub const STYLESHEET_PATH: &str = "/assets/xslt/eCMR.xslt";

/// Trimmed-down dataset stylesheet in the shape the portal serves.
pub const STYLESHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:output method="html"/>
  <xsl:template match="/">
    <div class="ecmr">
      <h2><xsl:value-of select="//DatasetId"/></h2>
      <table>
        <xsl:for-each select="//UsedTransportEquipment">
          <tr><td><xsl:value-of select="ID"/></td><td><xsl:value-of select="CategoryCode"/></td></tr>
        </xsl:for-each>
      </table>
    </div>
  </xsl:template>
</xsl:stylesheet>"#;

pub const DATASET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Consignment>
  <DatasetId>D1</DatasetId>
  <UsedTransportEquipment><ID>AB-123</ID><CategoryCode>CN</CategoryCode></UsedTransportEquipment>
  <UsedTransportEquipment><ID>TR-9</ID><CategoryCode>TE</CategoryCode></UsedTransportEquipment>
</Consignment>"#;

pub struct Harness<S> {
    pub api: Arc<ScriptedApi>,
    pub cache: ResultCache,
    pub search: Arc<S>,
    pub notifications: UnboundedReceiver<Notification>,
}

impl<S> Harness<S> {
    /// Everything notified so far.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut seen = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            seen.push(n);
        }
        seen
    }
}

pub fn config() -> PortalConfig {
    PortalConfig::default()
}

pub fn scripted_api() -> Arc<ScriptedApi> {
    Arc::new(
        ScriptedApi::new()
            .with_request_ids(["R1", "R2", "R3"])
            .with_asset(STYLESHEET_PATH, STYLESHEET),
    )
}

pub fn identifiers_harness(api: Arc<ScriptedApi>, config: &PortalConfig) -> Harness<IdentifiersSearch> {
    let cache = ResultCache::in_memory();
    let (notifier, notifications) = ChannelNotifier::channel();
    let search = Arc::new(IdentifiersSearch::new(
        api.clone(),
        cache.clone(),
        Arc::new(notifier),
        config,
    ));
    Harness {
        api,
        cache,
        search,
        notifications,
    }
}

pub fn uil_harness(api: Arc<ScriptedApi>, config: &PortalConfig) -> Harness<UilSearch> {
    let cache = ResultCache::in_memory();
    let (notifier, notifications) = ChannelNotifier::channel();
    let search = Arc::new(UilSearch::new(
        api.clone(),
        cache.clone(),
        Arc::new(notifier),
        config,
    ));
    Harness {
        api,
        cache,
        search,
        notifications,
    }
}

pub fn pending(request_id: &str) -> IdentifiersResponse {
    IdentifiersResponse::new(request_id, "PENDING")
}

/// COMPLETE response with one FR consignment `D1`.
pub fn complete_with_d1(request_id: &str) -> IdentifiersResponse {
    IdentifiersResponse::new(request_id, "COMPLETE").with_gate_result(
        GateResult::new("FR", "COMPLETE").with_consignment(Consignment::new("D1", "FR", "ttf")),
    )
}
