//! Fetch pipeline: turn a URL into displayable bytes.
//!
//! ```text
//! Search ──hit──▶ Retrieve ──bytes──────────────▶ Display ──▶ Publish?
//!   │               ├─locators──▶ Transfer ─────▶    ▲
//!   │               └─any failure─┐                  │
//!   └─miss/failure──────────────▶ Download ──bytes───┘
//!                                   └─failure──▶ FetchError
//! ```
//!
//! Search and Retrieve failures are never fatal; only a failed Download is.
//! Publish failures are logged and swallowed since the content is already
//! displayed by then. The context's token is checked between stages.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::CatalogEntry;
use crate::chain::{ResolutionChain, Scope};
use crate::context::{Context, Interrupted};
use crate::download::{DownloadError, Downloader};
use crate::events::{self, Event, EventSink};
use crate::identity::ContentIdentifier;
use crate::integrity::{verify_content, Verification};
use crate::locator::{Locator, Transport};
use crate::metadata::{keys, Metadata};
use crate::request::PublishRequest;
use crate::response::Retrieved;
use crate::search::SearchFederation;
use crate::store::ContentStore;
use crate::transfer::TransferDispatcher;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0} cannot be downloaded")]
    NotFetchable(String),
    #[error("download failed: {0}")]
    Download(DownloadError),
    #[error("fetch cancelled")]
    Cancelled,
}

impl From<DownloadError> for FetchError {
    fn from(e: DownloadError) -> Self {
        match e {
            DownloadError::NotFetchable(url) => FetchError::NotFetchable(url),
            DownloadError::Interrupted(Interrupted::Cancelled) => FetchError::Cancelled,
            other => FetchError::Download(other),
        }
    }
}

/// Where the displayed bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Transport(Transport),
    /// Inline in the naming service's answer.
    NamingService,
    Internet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Publishing is turned off.
    Skipped,
    NoLocalLocator,
    Published,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Search,
    Retrieve,
    Download,
    Display,
    Publish,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub id: ContentIdentifier,
    pub content_type: String,
    pub bytes: Bytes,
    pub source: Source,
    pub publish: PublishOutcome,
    /// Stages visited, in order.
    pub trail: Vec<Stage>,
}

/// This device's own address for peers, e.g. its Bluetooth MAC.
pub trait LocalLocatorSource: Send + Sync {
    fn local_locator(&self) -> Option<Locator>;
}

impl LocalLocatorSource for Option<Locator> {
    fn local_locator(&self) -> Option<Locator> {
        self.clone()
    }
}

struct Fetched {
    id: ContentIdentifier,
    content_type: String,
    bytes: Bytes,
    source: Source,
    /// On-device copy, once there is one.
    path: Option<PathBuf>,
}

enum State {
    Search,
    Retrieve(ContentIdentifier),
    Download,
    Display(Fetched),
}

pub struct FetchPipeline {
    search: SearchFederation,
    chain: ResolutionChain,
    dispatcher: TransferDispatcher,
    downloader: Arc<dyn Downloader>,
    store: ContentStore,
    local_locator: Arc<dyn LocalLocatorSource>,
    publish: bool,
    verify: bool,
    search_ext: String,
    events: Arc<dyn EventSink>,
}

impl FetchPipeline {
    pub fn new(
        search: SearchFederation,
        chain: ResolutionChain,
        dispatcher: TransferDispatcher,
        downloader: Arc<dyn Downloader>,
        store: ContentStore,
    ) -> Self {
        Self {
            search,
            chain,
            dispatcher,
            downloader,
            store,
            local_locator: Arc::new(None::<Locator>),
            publish: false,
            verify: false,
            search_ext: String::new(),
            events: events::noop(),
        }
    }

    pub fn with_publishing(mut self, publish: bool) -> Self {
        self.publish = publish;
        self
    }

    /// Re-hash content the naming service returns inline. A mismatch falls
    /// through to download. Locator transfers are verified by the dispatcher.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_local_locator(mut self, source: Arc<dyn LocalLocatorSource>) -> Self {
        self.local_locator = source;
        self
    }

    pub fn with_search_ext(mut self, ext: impl Into<String>) -> Self {
        self.search_ext = ext.into();
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Run the pipeline on its own task.
    pub fn spawn(
        self: Arc<Self>,
        url: String,
        ctx: Context,
    ) -> JoinHandle<Result<FetchOutcome, FetchError>> {
        tokio::spawn(async move { self.fetch(&url, &ctx).await })
    }

    pub async fn fetch(&self, url: &str, ctx: &Context) -> Result<FetchOutcome, FetchError> {
        let mut trail = Vec::new();
        let mut state = State::Search;
        let mut fetched = loop {
            if ctx.is_cancelled() {
                debug!(url, ?trail, "fetch cancelled");
                return Err(FetchError::Cancelled);
            }
            state = match state {
                State::Search => {
                    trail.push(Stage::Search);
                    self.search_step(url, ctx).await
                }
                State::Retrieve(id) => {
                    trail.push(Stage::Retrieve);
                    match self.retrieve_step(&id, ctx).await {
                        Some(fetched) => State::Display(fetched),
                        None => State::Download,
                    }
                }
                State::Download => {
                    trail.push(Stage::Download);
                    let downloaded = self.downloader.download(url, ctx).await?;
                    State::Display(Fetched {
                        id: ContentIdentifier::from_content(&downloaded.bytes),
                        content_type: downloaded.content_type,
                        bytes: downloaded.bytes,
                        source: Source::Internet,
                        path: None,
                    })
                }
                State::Display(fetched) => break fetched,
            };
        };

        trail.push(Stage::Display);
        info!(id = %fetched.id, url, source = ?fetched.source, "content ready");
        self.events.emit(Event::ContentReady {
            id: fetched.id.clone(),
            url: url.to_string(),
        });

        let metadata = self.keep(&mut fetched, url, ctx).await;
        let publish = if self.publish {
            trail.push(Stage::Publish);
            self.publish_step(&fetched, metadata, ctx).await
        } else {
            PublishOutcome::Skipped
        };

        Ok(FetchOutcome {
            id: fetched.id,
            content_type: fetched.content_type,
            bytes: fetched.bytes,
            source: fetched.source,
            publish,
            trail,
        })
    }

    /// Result 0 of the first answering backend, if any.
    async fn search_step(&self, url: &str, ctx: &Context) -> State {
        let response = self.search.search(url, &self.search_ext, ctx).await;
        match response.first() {
            Ok(Some(result)) => {
                debug!(url, id = %result.id, "search hit");
                State::Retrieve(result.id.clone())
            }
            Ok(None) => {
                debug!(url, "search found nothing");
                State::Download
            }
            Err(e) => {
                debug!(url, status = ?e.0, "search failed");
                State::Download
            }
        }
    }

    async fn retrieve_step(&self, id: &ContentIdentifier, ctx: &Context) -> Option<Fetched> {
        let resolved = match self.chain.get(id, ctx).await {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!(%id, error = %e, "retrieve failed");
                return None;
            }
        };
        match resolved.retrieved {
            Retrieved::Content { entry, bytes } => {
                if self.verify && verify_content(&bytes, &entry.id) == Verification::Mismatch {
                    warn!(%id, "inline content does not match its hash");
                    return None;
                }
                Some(Fetched {
                    id: entry.id,
                    content_type: entry.content_type,
                    bytes,
                    source: Source::NamingService,
                    path: None,
                })
            }
            Retrieved::Locators(entry) => match self.dispatcher.dispatch(&entry, ctx).await {
                Ok(t) => {
                    let transport = t.locator.transport();
                    let path = (transport == Transport::FilePath)
                        .then(|| PathBuf::from(t.locator.value()));
                    Some(Fetched {
                        id: entry.id,
                        content_type: entry.content_type,
                        bytes: t.bytes,
                        source: Source::Transport(transport),
                        path,
                    })
                }
                Err(e) => {
                    debug!(%id, backend = %resolved.backend, error = %e, "transfer failed");
                    None
                }
            },
        }
    }

    /// Save content that is not yet on this device and record it in the
    /// local cache. Returns the metadata a publish would carry.
    async fn keep(&self, fetched: &mut Fetched, url: &str, ctx: &Context) -> Metadata {
        if fetched.path.is_none() {
            match self.store.save(&fetched.id, &fetched.bytes).await {
                Ok(path) => fetched.path = Some(path),
                Err(e) => warn!(id = %fetched.id, error = %e, "could not save content"),
            }
        }

        let mut metadata = Metadata::new()
            .with(keys::FILE_SIZE, fetched.bytes.len().to_string())
            .with(keys::TIME, now_millis().to_string());
        metadata.add_url(url);
        let Some(path) = &fetched.path else {
            return metadata;
        };
        let path = path.to_string_lossy().into_owned();
        metadata.insert(keys::FILE_PATH, path.clone());

        if fetched.source != Source::Transport(Transport::FilePath) {
            let entry = CatalogEntry::new(fetched.id.clone(), fetched.content_type.clone())
                .with_locator(Locator::file_path(path))
                .with_metadata(metadata.clone());
            match self
                .chain
                .put(Scope::Local, &PublishRequest::from_entry(&entry), ctx)
                .await
            {
                Ok(resp) if resp.status().is_ok() => debug!(id = %fetched.id, "kept locally"),
                Ok(resp) => warn!(id = %fetched.id, status = ?resp.status(), "local cache put failed"),
                Err(e) => warn!(id = %fetched.id, error = %e, "local cache put failed"),
            }
        }
        metadata
    }

    async fn publish_step(
        &self,
        fetched: &Fetched,
        metadata: Metadata,
        ctx: &Context,
    ) -> PublishOutcome {
        let Some(local) = self.local_locator.local_locator() else {
            warn!(id = %fetched.id, "no local locator, not publishing");
            return PublishOutcome::NoLocalLocator;
        };
        let mut request = PublishRequest::new(fetched.id.clone());
        request.locators.insert(local);
        request.content_type = Some(fetched.content_type.clone());
        request.metadata = metadata;

        match self.chain.put(Scope::Network, &request, ctx).await {
            Ok(resp) if resp.status().is_ok() => {
                info!(id = %fetched.id, "published");
                self.events.emit(Event::Published {
                    id: fetched.id.clone(),
                });
                PublishOutcome::Published
            }
            Ok(resp) => {
                warn!(id = %fetched.id, status = ?resp.status(), "publish failed");
                PublishOutcome::Failed
            }
            Err(e) => {
                warn!(id = %fetched.id, error = %e, "publish failed");
                PublishOutcome::Failed
            }
        }
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::cache::LocalCache;
    use crate::chain::ResolutionBackend;
    use crate::download::{is_fetchable, Downloaded};
    use crate::integrity::hash_content;
    use crate::response::{PublishResponse, RetrieveResponse, SearchResponse, SearchResult, Status};
    use crate::search::SearchBackend;
    use crate::transfer::{FileProvider, TransferError, TransportProvider};

    const URL: &str = "http://example.com/page";

    /// Naming service double: fixed answers, every call journaled.
    struct FakeNaming {
        search: SearchResponse,
        get: Option<Retrieved>,
        put_status: Status,
        journal: Mutex<Vec<&'static str>>,
        puts: Mutex<Vec<PublishRequest>>,
    }

    impl FakeNaming {
        fn new(search: SearchResponse) -> Self {
            Self {
                search,
                get: None,
                put_status: Status::Ok,
                journal: Mutex::new(Vec::new()),
                puts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.journal.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResolutionBackend for FakeNaming {
        fn name(&self) -> &str {
            "fake-nrs"
        }

        fn scope(&self) -> Scope {
            Scope::Network
        }

        async fn get(&self, id: &ContentIdentifier, _ctx: &Context) -> RetrieveResponse {
            self.journal.lock().unwrap().push("get");
            match &self.get {
                Some(r) => RetrieveResponse::ok(id.clone(), r.clone()),
                None => RetrieveResponse::failed(id.clone(), Status::NoContent),
            }
        }

        async fn put(&self, request: &PublishRequest, _ctx: &Context) -> PublishResponse {
            self.journal.lock().unwrap().push("put");
            self.puts.lock().unwrap().push(request.clone());
            if self.put_status.is_ok() {
                PublishResponse::ok(request.id.clone())
            } else {
                PublishResponse::failed(request.id.clone(), self.put_status)
            }
        }

        async fn delete(&self, _id: &ContentIdentifier, _ctx: &Context) -> Status {
            Status::Failed
        }
    }

    #[async_trait]
    impl SearchBackend for FakeNaming {
        fn name(&self) -> &str {
            "fake-nrs"
        }

        async fn search(&self, _token: &str, _ext: &str, _ctx: &Context) -> SearchResponse {
            self.journal.lock().unwrap().push("search");
            self.search.clone()
        }
    }

    struct FakeDownloader {
        answer: Option<&'static [u8]>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Downloader for FakeDownloader {
        async fn download(&self, url: &str, _ctx: &Context) -> Result<Downloaded, DownloadError> {
            if !is_fetchable(url) {
                return Err(DownloadError::NotFetchable(url.to_string()));
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Some(b) => Ok(Downloaded {
                    bytes: Bytes::from_static(b),
                    content_type: "text/html".into(),
                }),
                None => Err(DownloadError::Status {
                    url: url.to_string(),
                    status: 502,
                }),
            }
        }
    }

    /// Serves every `Tcp` locator with fixed bytes.
    struct FakePeer(&'static [u8]);

    #[async_trait]
    impl TransportProvider for FakePeer {
        fn name(&self) -> &str {
            "fake-peer"
        }

        fn can_handle(&self, locator: &Locator) -> bool {
            locator.transport() == Transport::Tcp
        }

        async fn fetch(
            &self,
            _locator: &Locator,
            _id: &ContentIdentifier,
            _ctx: &Context,
        ) -> Result<Option<Bytes>, TransferError> {
            Ok(Some(Bytes::from_static(self.0)))
        }
    }

    struct Rig {
        pipeline: FetchPipeline,
        cache: LocalCache,
        nrs: Arc<FakeNaming>,
        downloader: Arc<FakeDownloader>,
        events: mpsc::UnboundedReceiver<Event>,
        dir: tempfile::TempDir,
    }

    impl Rig {
        fn new(nrs: FakeNaming, download: Option<&'static [u8]>, local: Option<Locator>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let (tx, events) = mpsc::unbounded_channel();
            let sink: Arc<dyn EventSink> = Arc::new(tx);
            let cache = LocalCache::open_in_memory().unwrap().with_events(sink.clone());
            let nrs = Arc::new(nrs);
            let downloader = Arc::new(FakeDownloader {
                answer: download,
                calls: AtomicUsize::new(0),
            });
            let local_cache = Arc::new(cache.clone());

            let pipeline = FetchPipeline::new(
                SearchFederation::new(local_cache.clone(), nrs.clone()),
                ResolutionChain::new()
                    .with_backend(10, local_cache)
                    .with_backend(1, nrs.clone()),
                TransferDispatcher::new()
                    .with_provider(Arc::new(FileProvider))
                    .with_provider(Arc::new(FakePeer(b"from a peer")))
                    .with_events(sink.clone()),
                downloader.clone(),
                ContentStore::new(dir.path().join("content")),
            )
            .with_publishing(true)
            .with_local_locator(Arc::new(local))
            .with_events(sink);

            Self {
                pipeline,
                cache,
                nrs,
                downloader,
                events,
                dir,
            }
        }

        fn verifying(self) -> Self {
            Self {
                pipeline: self.pipeline.with_verification(true),
                ..self
            }
        }

        fn downloads(&self) -> usize {
            self.downloader.calls.load(Ordering::SeqCst)
        }

        fn drain_events(&mut self) -> Vec<Event> {
            let mut out = Vec::new();
            while let Ok(e) = self.events.try_recv() {
                out.push(e);
            }
            out
        }
    }

    fn bt() -> Option<Locator> {
        Some(Locator::bluetooth("AA:BB:CC:DD:EE:FF"))
    }

    fn hit(id: &ContentIdentifier) -> SearchResponse {
        SearchResponse::ok(
            URL,
            vec![SearchResult {
                id: id.clone(),
                metadata: Metadata::new(),
            }],
        )
    }

    #[tokio::test]
    async fn failed_search_downloads_and_publishes_content_hash() {
        let mut rig = Rig::new(
            FakeNaming::new(SearchResponse::failed(URL, Status::Failed)),
            Some(b"<p>downloaded</p>"),
            bt(),
        );
        let out = rig.pipeline.fetch(URL, &Context::default()).await.unwrap();

        assert_eq!(out.source, Source::Internet);
        assert_eq!(
            out.trail,
            vec![Stage::Search, Stage::Download, Stage::Display, Stage::Publish]
        );
        assert_eq!(out.id.hash(), hash_content(b"<p>downloaded</p>"));
        assert_ne!(out.id.hash(), hash_content(URL.as_bytes()));
        assert_eq!(out.publish, PublishOutcome::Published);
        assert_eq!(rig.nrs.calls(), vec!["search", "put"]);

        let puts = rig.nrs.puts.lock().unwrap().clone();
        assert_eq!(puts[0].id, out.id);
        assert!(puts[0].locators.contains(&Locator::bluetooth("AA:BB:CC:DD:EE:FF")));
        assert_eq!(puts[0].metadata.urls(), vec![URL]);
        assert_eq!(puts[0].metadata.get(keys::FILE_SIZE), Some("17"));
        assert!(puts[0].metadata.get(keys::TIME).is_some());
        let saved = rig.dir.path().join("content").join(out.id.hash());
        assert_eq!(
            puts[0].metadata.get(keys::FILE_PATH),
            Some(&*saved.to_string_lossy())
        );

        assert!(rig.cache.contains(&out.id).unwrap());
        let events = rig.drain_events();
        let ready = events
            .iter()
            .position(|e| matches!(e, Event::ContentReady { .. }))
            .unwrap();
        let published = events
            .iter()
            .position(|e| matches!(e, Event::Published { .. }))
            .unwrap();
        assert!(ready < published);
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let mut rig = Rig::new(
            FakeNaming::new(SearchResponse::ok(URL, vec![])),
            Some(b"<p>once</p>"),
            bt(),
        );
        let ctx = Context::default();
        let first = rig.pipeline.fetch(URL, &ctx).await.unwrap();
        rig.drain_events();

        let second = rig.pipeline.fetch(URL, &ctx).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.bytes, first.bytes);
        assert_eq!(second.source, Source::Transport(Transport::FilePath));
        assert_eq!(
            second.trail,
            vec![Stage::Search, Stage::Retrieve, Stage::Display, Stage::Publish]
        );
        assert_eq!(rig.downloads(), 1);
        // Local search hit: the naming service saw no second search.
        assert_eq!(rig.nrs.calls(), vec!["search", "put", "put"]);
        assert!(rig
            .drain_events()
            .contains(&Event::ServedFromCache { id: first.id }));
    }

    #[tokio::test]
    async fn failed_retrieve_falls_back_to_download() {
        let ghost = ContentIdentifier::new("sha-256", "bacon");
        let rig = Rig::new(FakeNaming::new(hit(&ghost)), Some(b"fresh"), bt());
        let out = rig.pipeline.fetch(URL, &Context::default()).await.unwrap();
        assert_eq!(
            out.trail,
            vec![
                Stage::Search,
                Stage::Retrieve,
                Stage::Download,
                Stage::Display,
                Stage::Publish
            ]
        );
        assert_eq!(out.id, ContentIdentifier::from_content(b"fresh"));
        assert_eq!(rig.nrs.calls(), vec!["search", "get", "put"]);
    }

    #[tokio::test]
    async fn inline_bytes_skip_transfer_and_are_kept() {
        let id = ContentIdentifier::from_content(b"inline");
        let mut nrs = FakeNaming::new(hit(&id));
        nrs.get = Some(Retrieved::Content {
            entry: CatalogEntry::new(id.clone(), "text/plain"),
            bytes: Bytes::from_static(b"inline"),
        });
        let rig = Rig::new(nrs, None, bt());
        let out = rig.pipeline.fetch(URL, &Context::default()).await.unwrap();
        assert_eq!(out.source, Source::NamingService);
        assert_eq!(out.content_type, "text/plain");
        assert_eq!(rig.downloads(), 0);

        let kept = rig.cache.search_by_token(URL).unwrap();
        assert_eq!(kept.id, id);
        let path = kept.file_path().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"inline");
    }

    #[tokio::test]
    async fn path_like_hash_is_never_written_outside_content_dir() {
        let id = ContentIdentifier::new("sha-256", "./../escaped");
        let mut nrs = FakeNaming::new(hit(&id));
        nrs.get = Some(Retrieved::Content {
            entry: CatalogEntry::new(id.clone(), "text/html"),
            bytes: Bytes::from_static(b"attacker"),
        });
        let rig = Rig::new(nrs, None, bt());
        let out = rig.pipeline.fetch(URL, &Context::default()).await.unwrap();
        assert_eq!(out.source, Source::NamingService);

        assert!(!rig.dir.path().join("escaped").exists());
        assert!(!rig.cache.contains(&id).unwrap());
        let content = rig.dir.path().join("content");
        let stored = std::fs::read_dir(&content).map(|d| d.count()).unwrap_or(0);
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn mismatched_inline_bytes_fall_back_to_download_when_verifying() {
        let id = ContentIdentifier::from_content(b"genuine");
        let mut nrs = FakeNaming::new(hit(&id));
        nrs.get = Some(Retrieved::Content {
            entry: CatalogEntry::new(id.clone(), "text/plain"),
            bytes: Bytes::from_static(b"forged"),
        });
        let rig = Rig::new(nrs, Some(b"genuine"), bt()).verifying();
        let out = rig.pipeline.fetch(URL, &Context::default()).await.unwrap();
        assert_eq!(out.source, Source::Internet);
        assert_eq!(out.id, id);
        assert_eq!(out.bytes.as_ref(), b"genuine");
        assert_eq!(rig.downloads(), 1);
    }

    #[tokio::test]
    async fn locators_are_dispatched_to_a_provider() {
        let id = ContentIdentifier::from_content(b"from a peer");
        let mut nrs = FakeNaming::new(hit(&id));
        nrs.get = Some(Retrieved::Locators(
            CatalogEntry::new(id.clone(), "text/html")
                .with_locator(Locator::bluetooth("11:22"))
                .with_locator(Locator::tcp("10.0.0.7:4000")),
        ));
        let mut rig = Rig::new(nrs, None, bt());
        let out = rig.pipeline.fetch(URL, &Context::default()).await.unwrap();
        assert_eq!(out.source, Source::Transport(Transport::Tcp));
        assert_eq!(out.bytes.as_ref(), b"from a peer");
        assert!(rig.drain_events().contains(&Event::UsingTransport {
            id,
            transport: Transport::Tcp
        }));
    }

    #[tokio::test]
    async fn missing_local_locator_still_displays() {
        let rig = Rig::new(
            FakeNaming::new(SearchResponse::ok(URL, vec![])),
            Some(b"x"),
            None,
        );
        let out = rig.pipeline.fetch(URL, &Context::default()).await.unwrap();
        assert_eq!(out.publish, PublishOutcome::NoLocalLocator);
        assert_eq!(rig.nrs.calls(), vec!["search"]);
    }

    #[tokio::test]
    async fn publish_failure_is_swallowed() {
        let mut nrs = FakeNaming::new(SearchResponse::ok(URL, vec![]));
        nrs.put_status = Status::Failed;
        let rig = Rig::new(nrs, Some(b"x"), bt());
        let out = rig.pipeline.fetch(URL, &Context::default()).await.unwrap();
        assert_eq!(out.publish, PublishOutcome::Failed);
        assert_eq!(out.bytes.as_ref(), b"x");
    }

    #[tokio::test]
    async fn publishing_off_never_contacts_the_network() {
        let mut rig = Rig::new(
            FakeNaming::new(SearchResponse::ok(URL, vec![])),
            Some(b"x"),
            bt(),
        );
        rig.pipeline = rig.pipeline.with_publishing(false);
        let out = rig.pipeline.fetch(URL, &Context::default()).await.unwrap();
        assert_eq!(out.publish, PublishOutcome::Skipped);
        assert_eq!(out.trail.last(), Some(&Stage::Display));
        assert_eq!(rig.nrs.calls(), vec!["search"]);
    }

    #[tokio::test]
    async fn every_fallback_failing_is_an_error() {
        let rig = Rig::new(FakeNaming::new(SearchResponse::ok(URL, vec![])), None, bt());
        let err = rig.pipeline.fetch(URL, &Context::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::Download(_)));

        let err = rig
            .pipeline
            .fetch("ftp://example.com/file", &Context::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFetchable(_)));
    }

    #[tokio::test]
    async fn cancelled_before_start_does_nothing() {
        let rig = Rig::new(FakeNaming::new(SearchResponse::ok(URL, vec![])), Some(b"x"), bt());
        let ctx = Context::default();
        ctx.cancel();
        let err = rig.pipeline.fetch(URL, &ctx).await.unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
        assert!(rig.nrs.calls().is_empty());
        assert_eq!(rig.downloads(), 0);
    }

    #[tokio::test]
    async fn spawned_fetch_completes() {
        let rig = Rig::new(FakeNaming::new(SearchResponse::ok(URL, vec![])), Some(b"x"), None);
        let pipeline = Arc::new(rig.pipeline);
        let out = pipeline
            .clone()
            .spawn(URL.to_string(), Context::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.source, Source::Internet);
    }
}
