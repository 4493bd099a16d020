use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::foundation::error::{HeadlessError, HeadlessResult};
use crate::server::bundle::normalize_rel_path;

/// Loads `<file>.map` source maps from a local bundle root, caching them per file.
#[derive(Debug, Default)]
pub struct SourceMapProvider {
    root: Option<PathBuf>,
    cache: RwLock<HashMap<String, Option<Arc<String>>>>,
}

impl SourceMapProvider {
    /// Provider for a bundle on disk.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Provider for a remote bundle; it never has maps.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Source map for bundle file `file` (e.g. `bundle.js`), or `None` when absent.
    pub fn load(&self, file: &str) -> HeadlessResult<Option<Arc<String>>> {
        let Some(root) = &self.root else {
            return Ok(None);
        };
        let rel = normalize_rel_path(file)?;
        if let Some(hit) = self.cache.read().get(&rel) {
            return Ok(hit.clone());
        }

        let path = root.join(format!("{rel}.map"));
        let loaded = match std::fs::read_to_string(&path) {
            Ok(text) => Some(Arc::new(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(HeadlessError::Other(anyhow::anyhow!(
                    "read source map '{}': {e}",
                    path.display()
                )));
            }
        };
        self.cache.write().insert(rel, loaded.clone());
        Ok(loaded)
    }

    /// Number of cached lookups, hits and misses alike.
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/server/source_map.rs"]
mod tests;
