//! Content items and the pure path derivations behind them.

use std::path::{Path, PathBuf};

use crate::classify::{CONTENT_ROOT, METADATA_FILE, to_slash};
use crate::escape::NameEscaping;

/// Role of an entry inside a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// A changed node reported by the watcher.
    Content,
    /// The existing `.content.xml` of an ancestor directory.
    Metadata,
    /// A synthetic `nt:folder` `.content.xml` for a directory without one.
    Placeholder,
}

impl ItemKind {
    /// Structural entries are additive: they never collapse into an
    /// ancestor already in the package.
    pub fn is_structural(self) -> bool {
        matches!(self, ItemKind::Metadata | ItemKind::Placeholder)
    }
}

/// One unit of work in a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub local_path: PathBuf,
    /// Path inside the archive, always starting with `jcr_root/`.
    pub zip_path: String,
    /// Repository path used in workspace filters.
    pub filter_path: String,
    pub exists: bool,
    pub is_folder: bool,
    pub kind: ItemKind,
}

impl ContentItem {
    /// Probe the filesystem for a changed node under `root`.
    pub fn content(local_path: &Path, root: &Path, escaping: &dyn NameEscaping) -> Self {
        let (exists, is_folder) = match std::fs::metadata(local_path) {
            Ok(meta) => (true, meta.is_dir()),
            Err(_) => (false, false),
        };
        Self::with_kind(local_path, root, escaping, exists, is_folder, ItemKind::Content)
    }

    /// Metadata entry for directory `dir`: its own `.content.xml` if present,
    /// otherwise a placeholder at the same archive path.
    pub fn metadata(dir: &Path, root: &Path, escaping: &dyn NameEscaping) -> Self {
        let sidecar = dir.join(METADATA_FILE);
        let kind = if sidecar.is_file() {
            ItemKind::Metadata
        } else {
            ItemKind::Placeholder
        };
        Self::with_kind(&sidecar, root, escaping, true, false, kind)
    }

    fn with_kind(
        local_path: &Path,
        root: &Path,
        escaping: &dyn NameEscaping,
        exists: bool,
        is_folder: bool,
        kind: ItemKind,
    ) -> Self {
        let zip_path = zip_path(local_path, root);
        let filter_path = filter_path(&zip_path, escaping);
        Self {
            local_path: local_path.to_path_buf(),
            zip_path,
            filter_path,
            exists,
            is_folder,
            kind,
        }
    }
}

/// Archive path of `local_path`, relative to the parent of `root`.
pub fn zip_path(local_path: &Path, root: &Path) -> String {
    let anchor = root.parent().unwrap_or(root);
    match local_path.strip_prefix(anchor) {
        Ok(relative) => to_slash(relative),
        Err(_) => to_slash(local_path),
    }
}

/// Repository path for an archive path.
///
/// The `jcr_root` prefix goes away, a trailing `.xml` is dropped (so
/// `.content.xml` maps to `.content`), `.dir` folder suffixes are removed and
/// each segment is unescaped.
pub fn filter_path(zip_path: &str, escaping: &dyn NameEscaping) -> String {
    let mut segments: Vec<&str> = zip_path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.first() == Some(&CONTENT_ROOT) {
        segments.remove(0);
    }

    let last = segments.len().saturating_sub(1);
    let mut out = String::new();
    for (i, segment) in segments.into_iter().enumerate() {
        let mut name = segment;
        if i == last {
            name = name.strip_suffix(".xml").unwrap_or(name);
        }
        if name.len() > ".dir".len() {
            name = name.strip_suffix(".dir").unwrap_or(name);
        }
        out.push('/');
        out.push_str(&escaping.unescape(name));
    }

    if out.is_empty() { "/".to_string() } else { out }
}

/// Whether `ancestor` is a strict ancestor of `path` (segment aware).
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}
