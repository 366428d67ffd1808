//! On-device content files, one per identifier: `<root>/<hash>`.

use std::io;
use std::path::{Path, PathBuf};

use crate::identity::{is_safe_hash, ContentIdentifier};

#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<hash>`. Refuses a hash that could name anything outside `root`.
    pub fn path_for(&self, id: &ContentIdentifier) -> io::Result<PathBuf> {
        if !is_safe_hash(id.hash()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsafe content file name {:?}", id.hash()),
            ));
        }
        Ok(self.root.join(id.hash()))
    }

    /// Write `bytes` under the identifier's hash. Rewriting the same content is harmless.
    pub async fn save(&self, id: &ContentIdentifier, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(id)?;
        tokio::fs::create_dir_all(&self.root).await?;
        let tmp = self.root.join(format!(".{}.part", id.hash()));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(path)
    }
}
