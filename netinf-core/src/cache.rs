//! Local cache backend: a SQLite catalog mapping content hashes to locators,
//! content type and metadata.
//!
//! Schema:
//! - content: (hash TEXT PRIMARY KEY, hash_alg, content_type, file_path, file_size, metadata)
//! - content_url: (hash, url) PRIMARY KEY, cascades from content
//! - content_locator: (hash, transport, value) PRIMARY KEY, cascades from content
//!
//! Every write runs in one IMMEDIATE transaction and the union tables use
//! `INSERT OR IGNORE`, so concurrent puts of the same hash never drop a URL.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, warn};

use crate::catalog::CatalogEntry;
use crate::chain::{ResolutionBackend, Scope};
use crate::context::Context;
use crate::events::{self, Event, EventSink};
use crate::identity::ContentIdentifier;
use crate::locator::{Locator, Transport};
use crate::metadata::{keys, Metadata, MetadataError};
use crate::request::PublishRequest;
use crate::response::{
    PublishResponse, RetrieveResponse, Retrieved, SearchResponse, SearchResult, Status,
};
use crate::search::SearchBackend;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS content (
    hash TEXT PRIMARY KEY,
    hash_alg TEXT NOT NULL,
    content_type TEXT NOT NULL,
    file_path TEXT,
    file_size INTEGER,
    metadata TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS content_url (
    hash TEXT NOT NULL REFERENCES content(hash) ON DELETE CASCADE,
    url TEXT NOT NULL,
    PRIMARY KEY (hash, url)
);
CREATE TABLE IF NOT EXISTS content_locator (
    hash TEXT NOT NULL REFERENCES content(hash) ON DELETE CASCADE,
    transport TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (hash, transport, value)
);
CREATE INDEX IF NOT EXISTS content_url_by_url ON content_url(url);
";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("no catalog entry for {0}")]
    NotFound(String),
    #[error("hash {hash} is stored under {stored}, not {requested}")]
    AlgorithmConflict {
        hash: String,
        stored: String,
        requested: String,
    },
    #[error("failed to open cache database at {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored metadata: {0}")]
    Metadata(#[from] MetadataError),
    #[error("cache connection poisoned")]
    Poisoned,
    #[error("cache worker failed: {0}")]
    Worker(String),
}

/// Whether a put created the entry or folded into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Merged,
}

#[derive(Clone)]
pub struct LocalCache {
    conn: Arc<Mutex<Connection>>,
    events: Arc<dyn EventSink>,
}

impl LocalCache {
    /// Open or create the catalog at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| CacheError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|source| CacheError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            events: events::noop(),
        })
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Insert a new entry, or union locators and URLs into an existing one.
    pub fn put(&self, entry: &CatalogEntry) -> Result<PutOutcome, CacheError> {
        let hash = entry.id.hash();
        let alg = entry.id.hash_algorithm();
        let mut scalars = entry.metadata.clone();
        scalars.remove(keys::URL);
        let file_path = entry
            .file_path()
            .or_else(|| entry.metadata.get(keys::FILE_PATH))
            .map(str::to_string);
        let file_size: Option<i64> = entry
            .metadata
            .get(keys::FILE_SIZE)
            .and_then(|s| s.parse().ok());

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT hash_alg, metadata FROM content WHERE hash = ?1",
                params![hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let outcome = match existing {
            None => {
                tx.execute(
                    "INSERT INTO content (hash, hash_alg, content_type, file_path, file_size, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![hash, alg, entry.content_type, file_path, file_size, scalars.encode()],
                )?;
                PutOutcome::Inserted
            }
            Some((stored_alg, _)) if stored_alg != alg => {
                return Err(CacheError::AlgorithmConflict {
                    hash: hash.to_string(),
                    stored: stored_alg,
                    requested: alg.to_string(),
                });
            }
            Some((_, stored_meta)) => {
                let mut merged = Metadata::decode(&stored_meta)?;
                merged.merge(&scalars);
                tx.execute(
                    "UPDATE content SET
                        content_type = COALESCE(NULLIF(?2, ''), content_type),
                        file_path = COALESCE(?3, file_path),
                        file_size = COALESCE(?4, file_size),
                        metadata = ?5
                     WHERE hash = ?1",
                    params![hash, entry.content_type, file_path, file_size, merged.encode()],
                )?;
                PutOutcome::Merged
            }
        };

        for url in entry.urls() {
            tx.execute(
                "INSERT OR IGNORE INTO content_url (hash, url) VALUES (?1, ?2)",
                params![hash, url],
            )?;
        }
        for locator in &entry.locators {
            tx.execute(
                "INSERT OR IGNORE INTO content_locator (hash, transport, value) VALUES (?1, ?2, ?3)",
                params![hash, locator.transport().key(), locator.value()],
            )?;
        }
        tx.commit()?;
        debug!(id = %entry.id, ?outcome, "cache put");
        Ok(outcome)
    }

    /// Point lookup. Emits [`Event::ServedFromCache`] on a hit.
    pub fn get(&self, id: &ContentIdentifier) -> Result<CatalogEntry, CacheError> {
        let entry = {
            let conn = self.lock()?;
            load(&conn, id)?
        };
        match entry {
            Some(entry) => {
                self.events.emit(Event::ServedFromCache { id: id.clone() });
                Ok(entry)
            }
            None => Err(CacheError::NotFound(id.to_string())),
        }
    }

    /// Entry whose source-URL list contains `token`.
    pub fn search_by_token(&self, token: &str) -> Result<CatalogEntry, CacheError> {
        let conn = self.lock()?;
        let found: Option<(String, String)> = conn
            .query_row(
                "SELECT c.hash_alg, c.hash FROM content_url u
                 JOIN content c ON c.hash = u.hash
                 WHERE u.url = ?1 LIMIT 1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((alg, hash)) = found else {
            return Err(CacheError::NotFound(token.to_string()));
        };
        load(&conn, &ContentIdentifier::new(alg, hash))?
            .ok_or_else(|| CacheError::NotFound(token.to_string()))
    }

    /// Remove the entry; URL and locator rows go with it.
    pub fn delete(&self, id: &ContentIdentifier) -> Result<(), CacheError> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM content WHERE hash = ?1 AND hash_alg = ?2",
            params![id.hash(), id.hash_algorithm()],
        )?;
        if n == 0 {
            return Err(CacheError::NotFound(id.to_string()));
        }
        debug!(%id, "cache delete");
        Ok(())
    }

    pub fn contains(&self, id: &ContentIdentifier) -> Result<bool, CacheError> {
        let conn = self.lock()?;
        Ok(load(&conn, id)?.is_some())
    }

    /// Run a cache operation off the async executor.
    pub(crate) async fn blocking<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&LocalCache) -> Result<T, CacheError> + Send + 'static,
    {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || f(&cache))
            .await
            .map_err(|e| CacheError::Worker(e.to_string()))?
    }
}

fn load(conn: &Connection, id: &ContentIdentifier) -> Result<Option<CatalogEntry>, CacheError> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT content_type, metadata FROM content WHERE hash = ?1 AND hash_alg = ?2",
            params![id.hash(), id.hash_algorithm()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((content_type, metadata)) = row else {
        return Ok(None);
    };
    let mut entry =
        CatalogEntry::new(id.clone(), content_type).with_metadata(Metadata::decode(&metadata)?);

    let mut urls = conn.prepare("SELECT url FROM content_url WHERE hash = ?1 ORDER BY rowid")?;
    for url in urls.query_map(params![id.hash()], |row| row.get::<_, String>(0))? {
        entry.metadata.add_url(url?);
    }

    let mut locators =
        conn.prepare("SELECT transport, value FROM content_locator WHERE hash = ?1")?;
    let rows = locators.query_map(params![id.hash()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (transport, value) = row?;
        match Transport::from_key(&transport) {
            Some(t) => {
                entry.locators.insert(Locator::new(t, value));
            }
            None => warn!(%id, transport, "skipping locator with unknown transport"),
        }
    }
    Ok(Some(entry))
}

#[async_trait]
impl ResolutionBackend for LocalCache {
    fn name(&self) -> &str {
        "local-cache"
    }

    fn scope(&self) -> Scope {
        Scope::Local
    }

    async fn get(&self, id: &ContentIdentifier, _ctx: &Context) -> RetrieveResponse {
        let key = id.clone();
        match self.blocking(move |c| c.get(&key)).await {
            Ok(entry) => RetrieveResponse::ok(id.clone(), Retrieved::Locators(entry)),
            Err(CacheError::NotFound(_)) => RetrieveResponse::failed(id.clone(), Status::NoContent),
            Err(e) => {
                warn!(%id, error = %e, "cache get failed");
                RetrieveResponse::failed(id.clone(), Status::Failed)
            }
        }
    }

    async fn put(&self, request: &PublishRequest, _ctx: &Context) -> PublishResponse {
        let entry = request.to_entry();
        match self.blocking(move |c| c.put(&entry)).await {
            Ok(_) => PublishResponse::ok(request.id.clone()),
            Err(e) => {
                warn!(id = %request.id, error = %e, "cache put failed");
                PublishResponse::failed(request.id.clone(), Status::Failed)
            }
        }
    }

    async fn delete(&self, id: &ContentIdentifier, _ctx: &Context) -> Status {
        let key = id.clone();
        match self.blocking(move |c| c.delete(&key)).await {
            Ok(()) => Status::Ok,
            Err(CacheError::NotFound(_)) => Status::NoContent,
            Err(e) => {
                warn!(%id, error = %e, "cache delete failed");
                Status::Failed
            }
        }
    }
}

#[async_trait]
impl SearchBackend for LocalCache {
    fn name(&self) -> &str {
        "local-cache"
    }

    async fn search(&self, token: &str, _ext: &str, _ctx: &Context) -> SearchResponse {
        let key = token.to_string();
        match self.blocking(move |c| c.search_by_token(&key)).await {
            Ok(entry) => SearchResponse::ok(
                token,
                vec![SearchResult {
                    id: entry.id,
                    metadata: entry.metadata,
                }],
            ),
            Err(CacheError::NotFound(_)) => SearchResponse::failed(token, Status::NoSearchResults),
            Err(e) => {
                warn!(token, error = %e, "cache search failed");
                SearchResponse::failed(token, Status::Failed)
            }
        }
    }
}
