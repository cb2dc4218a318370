//! Cached read views
//!
//! Aggregated views (dashboard counters, the kompendium index, seizure
//! statistics) are rendered once and kept until a mutation touching their
//! data invalidates them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;

/// Views that can be cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Dashboard,
    Kompendium,
    ConfiscationSummary,
}

#[derive(Debug, Clone)]
pub struct ViewCache {
    inner: Cache<View, Arc<Value>>,
}

impl ViewCache {
    /// Entries also expire after `ttl` as a backstop
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().max_capacity(16).time_to_live(ttl).build(),
        }
    }

    /// Return the cached view or render and store it
    pub async fn get_or_render<E, F, Fut>(&self, view: View, render: F) -> Result<Arc<Value>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(cached) = self.inner.get(&view).await {
            tracing::debug!(?view, "view cache hit");
            return Ok(cached);
        }

        let rendered = Arc::new(render().await?);
        self.inner.insert(view, rendered.clone()).await;
        Ok(rendered)
    }

    pub async fn invalidate(&self, views: &[View]) {
        for view in views {
            self.inner.invalidate(view).await;
        }
    }

    pub async fn is_cached(&self, view: View) -> bool {
        self.inner.get(&view).await.is_some()
    }
}

impl Default for ViewCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
