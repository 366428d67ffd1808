//! Search federation: the local cache first, the naming service only on a local miss.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::context::Context;
use crate::response::SearchResponse;

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, token: &str, ext: &str, ctx: &Context) -> SearchResponse;
}

/// A non-empty local answer is trusted as-is and never cross-checked remotely.
pub struct SearchFederation {
    local: Arc<dyn SearchBackend>,
    remote: Arc<dyn SearchBackend>,
}

impl SearchFederation {
    pub fn new(local: Arc<dyn SearchBackend>, remote: Arc<dyn SearchBackend>) -> Self {
        Self { local, remote }
    }

    pub async fn search(&self, token: &str, ext: &str, ctx: &Context) -> SearchResponse {
        let local = self.local.search(token, ext, ctx).await;
        if local.has_results() {
            debug!(token, backend = self.local.name(), "search answered locally");
            return local;
        }
        debug!(token, status = ?local.status(), "local search empty, asking {}", self.remote.name());
        self.remote.search(token, ext, ctx).await
    }
}
