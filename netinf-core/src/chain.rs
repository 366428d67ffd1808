//! Resolution chain: reads are federated across backends in priority order,
//! writes go to exactly one backend picked by the caller's intent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::context::Context;
use crate::identity::ContentIdentifier;
use crate::request::PublishRequest;
use crate::response::{PublishResponse, RetrieveResponse, Retrieved, Status};

/// Where a backend keeps its answers. Chooses the target of `put`/`delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// This device only.
    Local,
    /// Shared with peers through a naming service.
    Network,
}

#[async_trait]
pub trait ResolutionBackend: Send + Sync {
    fn name(&self) -> &str;
    fn scope(&self) -> Scope;
    async fn get(&self, id: &ContentIdentifier, ctx: &Context) -> RetrieveResponse;
    async fn put(&self, request: &PublishRequest, ctx: &Context) -> PublishResponse;
    async fn delete(&self, id: &ContentIdentifier, ctx: &Context) -> Status;
}

struct Ranked {
    priority: u32,
    backend: Arc<dyn ResolutionBackend>,
}

/// A successful chain read: which backend answered, and what it said.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub backend: String,
    pub retrieved: Retrieved,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("{id} not found after {attempts} backend(s)")]
    NotFound {
        id: ContentIdentifier,
        attempts: usize,
    },
    #[error("no {0:?} backend registered")]
    NoBackend(Scope),
}

/// Backends ordered by priority, highest first. Equal priorities keep insertion order.
#[derive(Default)]
pub struct ResolutionChain {
    backends: Vec<Ranked>,
}

impl ResolutionChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, priority: u32, backend: Arc<dyn ResolutionBackend>) -> Self {
        self.add(priority, backend);
        self
    }

    pub fn add(&mut self, priority: u32, backend: Arc<dyn ResolutionBackend>) {
        let at = self
            .backends
            .iter()
            .position(|r| r.priority < priority)
            .unwrap_or(self.backends.len());
        self.backends.insert(at, Ranked { priority, backend });
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Backend names in query order.
    pub fn order(&self) -> Vec<&str> {
        self.backends.iter().map(|r| r.backend.name()).collect()
    }

    /// Query backends in priority order; first Ok answer wins.
    pub async fn get(&self, id: &ContentIdentifier, ctx: &Context) -> Result<Resolved, ChainError> {
        let mut attempts = 0;
        for ranked in &self.backends {
            if ctx.is_cancelled() {
                break;
            }
            attempts += 1;
            let name = ranked.backend.name();
            let response = ranked.backend.get(id, ctx).await;
            match response.into_retrieved() {
                Ok(retrieved) => {
                    info!(%id, backend = name, "resolved");
                    return Ok(Resolved {
                        backend: name.to_string(),
                        retrieved,
                    });
                }
                Err(e) => debug!(%id, backend = name, status = ?e.0, "backend miss"),
            }
        }
        Err(ChainError::NotFound {
            id: id.clone(),
            attempts,
        })
    }

    fn target(&self, scope: Scope) -> Result<&Arc<dyn ResolutionBackend>, ChainError> {
        self.backends
            .iter()
            .find(|r| r.backend.scope() == scope)
            .map(|r| &r.backend)
            .ok_or(ChainError::NoBackend(scope))
    }

    /// Publish to the highest-priority backend of `scope` only. Never broadcast.
    pub async fn put(
        &self,
        scope: Scope,
        request: &PublishRequest,
        ctx: &Context,
    ) -> Result<PublishResponse, ChainError> {
        let backend = self.target(scope)?;
        debug!(id = %request.id, backend = backend.name(), "put");
        Ok(backend.put(request, ctx).await)
    }

    pub async fn delete(
        &self,
        scope: Scope,
        id: &ContentIdentifier,
        ctx: &Context,
    ) -> Result<Status, ChainError> {
        let backend = self.target(scope)?;
        debug!(%id, backend = backend.name(), "delete");
        Ok(backend.delete(id, ctx).await)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::catalog::CatalogEntry;

    /// Records every call into a shared journal.
    pub(crate) struct Recording {
        pub name: &'static str,
        pub scope: Scope,
        pub answer: Option<CatalogEntry>,
        pub journal: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ResolutionBackend for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn scope(&self) -> Scope {
            self.scope
        }

        async fn get(&self, id: &ContentIdentifier, _ctx: &Context) -> RetrieveResponse {
            self.journal.lock().unwrap().push(format!("get:{}", self.name));
            match &self.answer {
                Some(entry) => RetrieveResponse::ok(id.clone(), Retrieved::Locators(entry.clone())),
                None => RetrieveResponse::failed(id.clone(), Status::NoContent),
            }
        }

        async fn put(&self, request: &PublishRequest, _ctx: &Context) -> PublishResponse {
            self.journal.lock().unwrap().push(format!("put:{}", self.name));
            PublishResponse::ok(request.id.clone())
        }

        async fn delete(&self, _id: &ContentIdentifier, _ctx: &Context) -> Status {
            self.journal.lock().unwrap().push(format!("delete:{}", self.name));
            Status::Ok
        }
    }

    fn backend(
        name: &'static str,
        scope: Scope,
        answer: Option<CatalogEntry>,
        journal: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn ResolutionBackend> {
        Arc::new(Recording {
            name,
            scope,
            answer,
            journal: journal.clone(),
        })
    }

    fn entry() -> CatalogEntry {
        CatalogEntry::new(ContentIdentifier::from_content(b"x"), "text/plain")
    }

    #[tokio::test]
    async fn low_priority_answers_after_high_fails() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let chain = ResolutionChain::new()
            .with_backend(1, backend("low", Scope::Network, Some(entry()), &journal))
            .with_backend(10, backend("high", Scope::Local, None, &journal));
        assert_eq!(chain.order(), vec!["high", "low"]);

        let resolved = chain.get(&entry().id, &Context::default()).await.unwrap();
        assert_eq!(resolved.backend, "low");
        assert_eq!(*journal.lock().unwrap(), vec!["get:high", "get:low"]);
    }

    #[tokio::test]
    async fn first_success_stops_the_walk() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let chain = ResolutionChain::new()
            .with_backend(10, backend("high", Scope::Local, Some(entry()), &journal))
            .with_backend(1, backend("low", Scope::Network, Some(entry()), &journal));
        let resolved = chain.get(&entry().id, &Context::default()).await.unwrap();
        assert_eq!(resolved.backend, "high");
        assert_eq!(*journal.lock().unwrap(), vec!["get:high"]);
    }

    #[tokio::test]
    async fn all_fail_is_not_found() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let chain = ResolutionChain::new()
            .with_backend(5, backend("a", Scope::Local, None, &journal))
            .with_backend(5, backend("b", Scope::Network, None, &journal));
        let err = chain.get(&entry().id, &Context::default()).await.unwrap_err();
        assert_eq!(
            err,
            ChainError::NotFound {
                id: entry().id,
                attempts: 2
            }
        );
        assert_eq!(*journal.lock().unwrap(), vec!["get:a", "get:b"]);
    }

    #[tokio::test]
    async fn writes_are_targeted_not_broadcast() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let chain = ResolutionChain::new()
            .with_backend(10, backend("cache", Scope::Local, None, &journal))
            .with_backend(1, backend("nrs", Scope::Network, None, &journal));
        let req = PublishRequest::from_entry(&entry());
        let ctx = Context::default();

        chain.put(Scope::Network, &req, &ctx).await.unwrap();
        chain.delete(Scope::Local, &req.id, &ctx).await.unwrap();
        assert_eq!(*journal.lock().unwrap(), vec!["put:nrs", "delete:cache"]);
    }

    #[tokio::test]
    async fn missing_scope_is_an_error() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let chain =
            ResolutionChain::new().with_backend(1, backend("cache", Scope::Local, None, &journal));
        let req = PublishRequest::from_entry(&entry());
        let err = chain
            .put(Scope::Network, &req, &Context::default())
            .await
            .unwrap_err();
        assert_eq!(err, ChainError::NoBackend(Scope::Network));
    }

    #[tokio::test]
    async fn cancelled_context_stops_before_querying() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let chain =
            ResolutionChain::new().with_backend(1, backend("a", Scope::Local, Some(entry()), &journal));
        let ctx = Context::default();
        ctx.cancel();
        assert!(chain.get(&entry().id, &ctx).await.is_err());
        assert!(journal.lock().unwrap().is_empty());
    }
}
