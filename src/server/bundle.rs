use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempDir;
use url::Url;

use crate::foundation::error::{HeadlessError, HeadlessResult};

/// Where the bundled composition code comes from.
#[derive(Clone, Debug)]
pub enum BundleSource {
    /// Already served elsewhere; pages navigate to it directly.
    Url(Url),
    /// A bundle directory on disk, served as-is.
    Directory(PathBuf),
    /// Bundle files held in memory, written to a temporary directory while served.
    Inline(Vec<BundleFile>),
}

/// One file of an in-memory bundle.
#[derive(Clone, Debug)]
pub struct BundleFile {
    /// Bundle-relative path using `/` separators.
    pub path: String,
    /// File contents.
    pub contents: Bytes,
}

impl BundleSource {
    /// Classify a serve URL or a bundle path by its scheme.
    pub fn parse(s: &str) -> Self {
        match Url::parse(s) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Url(url),
            _ => Self::Directory(PathBuf::from(s)),
        }
    }

    /// Build an in-memory bundle from `(path, contents)` pairs.
    pub fn inline<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: Into<Bytes>,
    {
        Self::Inline(
            files
                .into_iter()
                .map(|(path, contents)| BundleFile {
                    path: path.into(),
                    contents: contents.into(),
                })
                .collect(),
        )
    }
}

impl From<&str> for BundleSource {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<PathBuf> for BundleSource {
    fn from(p: PathBuf) -> Self {
        Self::Directory(p)
    }
}

impl From<Url> for BundleSource {
    fn from(u: Url) -> Self {
        Self::Url(u)
    }
}

/// A bundle ready to be served: either remote, or a local root that may own a temp dir.
#[derive(Debug)]
pub(crate) enum PreparedBundle {
    Remote(Url),
    Local {
        root: PathBuf,
        temp: Option<TempDir>,
    },
}

impl PreparedBundle {
    pub(crate) fn prepare(source: &BundleSource) -> HeadlessResult<Self> {
        match source {
            BundleSource::Url(url) => Ok(Self::Remote(url.clone())),
            BundleSource::Directory(root) => {
                std::fs::read_dir(root).map_err(|e| {
                    HeadlessError::server_start(format!(
                        "bundle directory '{}' is not readable: {e}",
                        root.display()
                    ))
                })?;
                Ok(Self::Local {
                    root: root.clone(),
                    temp: None,
                })
            }
            BundleSource::Inline(files) => {
                let temp = tempfile::Builder::new()
                    .prefix("wavyte-bundle-")
                    .tempdir()
                    .map_err(|e| {
                        HeadlessError::server_start(format!("create bundle temp dir: {e}"))
                    })?;
                for file in files {
                    write_bundle_file(temp.path(), file)?;
                }
                Ok(Self::Local {
                    root: temp.path().to_path_buf(),
                    temp: Some(temp),
                })
            }
        }
    }

    pub(crate) fn local_root(&self) -> Option<&Path> {
        match self {
            Self::Remote(_) => None,
            Self::Local { root, .. } => Some(root),
        }
    }

    /// Remove any temporary directory created for the bundle.
    pub(crate) fn release(self) -> HeadlessResult<()> {
        if let Self::Local {
            temp: Some(temp), ..
        } = self
        {
            let path = temp.path().to_path_buf();
            temp.close().map_err(|e| {
                HeadlessError::Other(anyhow::anyhow!(
                    "remove bundle temp dir '{}': {e}",
                    path.display()
                ))
            })?;
        }
        Ok(())
    }
}

fn write_bundle_file(root: &Path, file: &BundleFile) -> HeadlessResult<()> {
    let rel = normalize_rel_path(&file.path)
        .map_err(|e| HeadlessError::server_start(format!("bundle file '{}': {e}", file.path)))?;
    let dest = root.join(&rel);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            HeadlessError::server_start(format!("create '{}': {e}", parent.display()))
        })?;
    }
    std::fs::write(&dest, &file.contents)
        .map_err(|e| HeadlessError::server_start(format!("write '{}': {e}", dest.display())))
}

/// Normalize a bundle-relative path: `\` becomes `/`, `.` segments are dropped, and
/// absolute paths or `..` segments are rejected.
pub fn normalize_rel_path(source: &str) -> HeadlessResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(HeadlessError::config("bundle paths must be relative"));
    }
    if s.is_empty() {
        return Err(HeadlessError::config("bundle path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(HeadlessError::config("bundle paths must not contain '..'"));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(HeadlessError::config("bundle path must contain a file name"));
    }

    Ok(out.join("/"))
}

#[cfg(test)]
#[path = "../../tests/unit/server/bundle.rs"]
mod tests;
