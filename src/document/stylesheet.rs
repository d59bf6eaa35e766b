//! Stylesheet loading: fetched once from its static location, compiled,
//! then shared by every render.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::xslt::Stylesheet;
use crate::api::PortalApi;
use crate::error::Result;

/// Where stylesheet markup comes from.
#[async_trait]
pub trait StylesheetSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;

    /// Human-readable location for logs.
    fn location(&self) -> String;
}

/// A static asset served by the portal API.
pub struct AssetStylesheet {
    api: Arc<dyn PortalApi>,
    path: String,
}

impl AssetStylesheet {
    pub fn new(api: Arc<dyn PortalApi>, path: impl Into<String>) -> Self {
        Self {
            api,
            path: path.into(),
        }
    }
}

#[async_trait]
impl StylesheetSource for AssetStylesheet {
    async fn fetch(&self) -> Result<String> {
        self.api.fetch_asset(&self.path).await
    }

    fn location(&self) -> String {
        self.path.clone()
    }
}

/// Lazily fetched, compiled stylesheet. A failed fetch or compile is not
/// cached; the next call tries again.
pub struct StylesheetCache {
    source: Box<dyn StylesheetSource>,
    compiled: OnceCell<Arc<Stylesheet>>,
}

impl StylesheetCache {
    pub fn new(source: impl StylesheetSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            compiled: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<Stylesheet>> {
        let sheet = self
            .compiled
            .get_or_try_init(|| async {
                let location = self.source.location();
                let markup = self.source.fetch().await?;
                let sheet = Stylesheet::compile(&markup)?;
                tracing::info!(
                    location = %location,
                    templates = sheet.template_count(),
                    "Stylesheet loaded"
                );
                Ok::<_, crate::error::PortalError>(Arc::new(sheet))
            })
            .await?;
        Ok(sheet.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.compiled.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortalError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        markup: &'static str,
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StylesheetSource for Counting {
        async fn fetch(&self) -> Result<String> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            if n == 0 && self.markup.is_empty() {
                return Err(PortalError::transport("fetch stylesheet", "connection reset"));
            }
            Ok(self.markup.to_string())
        }

        fn location(&self) -> String {
            "memory".into()
        }
    }

    const SHEET: &str = r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><xsl:template match="/">ok</xsl:template></xsl:stylesheet>"#;

    #[tokio::test]
    async fn fetches_once() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let cache = StylesheetCache::new(Counting {
            markup: SHEET,
            fetches: fetches.clone(),
        });

        assert!(!cache.is_loaded());
        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert!(cache.is_loaded());
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_retried() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let cache = StylesheetCache::new(Counting {
            markup: "",
            fetches: fetches.clone(),
        });

        assert!(cache.get().await.unwrap_err().is_transport());
        assert!(!cache.is_loaded());
        // second fetch returns empty markup, which does not compile
        assert!(matches!(
            cache.get().await,
            Err(PortalError::Document(crate::document::DocumentError::Stylesheet(_)))
        ));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }
}
