//! Classification of raw change hints into canonical content paths
//!
//! A watcher reports whatever the filesystem did. Only a subset of those
//! paths are meaningful to push: they must lie inside a `jcr_root` tree, at
//! least two levels deep, and outside anything the exclusion globs name.
//! Sidecar files (`.content.xml`, docview `*.xml`) and nodes nested under
//! `_jcr_content` or `*.dir` folders are pushed at the granularity of the node
//! that owns them.

use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::error::ConfigError;

/// Name of the directory that marks the top of the repository tree.
pub const CONTENT_ROOT: &str = "jcr_root";

/// Per-directory metadata file.
pub const METADATA_FILE: &str = ".content.xml";

/// Compiled exclusion globs.
///
/// `*` never crosses a `/`; `**` does. A `.content.xml` is judged by the
/// directory it describes so dot-file patterns never drop metadata.
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ExclusionRules {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            builder.add(glob);
        }

        let set = builder.build().map_err(|source| ConfigError::InvalidPattern {
            pattern: patterns
                .iter()
                .map(|p| p.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
            source,
        })?;

        Ok(Self {
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            set,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        if path.file_name().is_some_and(|name| name == METADATA_FILE) {
            return path.parent().is_some_and(|owner| self.set.is_match(owner));
        }
        self.set.is_match(path)
    }
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }
}

/// Maps raw paths to canonical content paths.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    base: PathBuf,
    rules: ExclusionRules,
}

impl PathClassifier {
    /// `base` is the working directory: relative hints are resolved against
    /// it and exclusion globs are matched relative to it.
    pub fn new(base: impl AsRef<Path>, rules: ExclusionRules) -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self {
            base: normalize(base.as_ref(), &cwd),
            rules,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn rules(&self) -> &ExclusionRules {
        &self.rules
    }

    /// Canonical content path for `raw`, or `None` if it must not be pushed.
    pub fn classify(&self, raw: impl AsRef<Path>) -> Option<PathBuf> {
        let mut path = normalize(raw.as_ref(), &self.base);

        loop {
            if self.is_excluded(&path) {
                debug!("Excluded: {}", path.display());
                return None;
            }

            let Some(root) = content_root(&path) else {
                debug!("Outside of {CONTENT_ROOT}: {}", path.display());
                return None;
            };

            let depth = path.strip_prefix(&root).map_or(0, |rel| rel.components().count());
            if depth < 2 {
                debug!("Too close to {CONTENT_ROOT}: {}", path.display());
                return None;
            }

            if is_special(&path, &root) {
                path = path.parent()?.to_path_buf();
                continue;
            }

            return Some(path);
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.base).unwrap_or(path);
        self.rules.is_excluded(relative)
    }
}

/// Absolute, lexically normalised form of `raw`.
///
/// Backslashes are treated as separators and `.`/`..` are folded without
/// touching the filesystem, since the path may already be gone.
pub fn normalize(raw: &Path, base: &Path) -> PathBuf {
    let raw = PathBuf::from(raw.to_string_lossy().replace('\\', "/"));
    let joined = if raw.is_absolute() {
        raw
    } else {
        base.join(raw)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The deepest `jcr_root` ancestor of `path` (inclusive).
pub fn content_root(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|ancestor| ancestor.file_name().is_some_and(|name| name == CONTENT_ROOT))
        .map(Path::to_path_buf)
}

/// Slash-separated form of `path`, independent of the host separator.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_special(path: &Path, root: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };

    let nested = relative.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        name == "_jcr_content" || (name.len() > ".dir".len() && name.ends_with(".dir"))
    });

    nested
        || path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(".xml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_excludes;

    fn classifier() -> PathClassifier {
        PathClassifier::new(
            "/work",
            ExclusionRules::new(&default_excludes()).expect("defaults compile"),
        )
    }

    #[test]
    fn normalize_folds_dots_and_backslashes() {
        let base = Path::new("/work");
        assert_eq!(
            normalize(Path::new("a/./b/../c/"), base),
            PathBuf::from("/work/a/c")
        );
        assert_eq!(
            normalize(Path::new("/x\\jcr_root\\apps"), base),
            PathBuf::from("/x/jcr_root/apps")
        );
    }

    #[test]
    fn content_root_uses_deepest_marker() {
        assert_eq!(
            content_root(Path::new("/a/jcr_root/b/jcr_root/c")),
            Some(PathBuf::from("/a/jcr_root/b/jcr_root"))
        );
        assert_eq!(content_root(Path::new("/a/b")), None);
    }

    #[test]
    fn accepts_regular_content() {
        assert_eq!(
            classifier().classify("/work/jcr_root/apps/myapp/file.txt"),
            Some(PathBuf::from("/work/jcr_root/apps/myapp/file.txt"))
        );
        assert_eq!(
            classifier().classify("jcr_root/apps/myapp"),
            Some(PathBuf::from("/work/jcr_root/apps/myapp"))
        );
    }

    #[test]
    fn rejects_root_and_its_children() {
        let c = classifier();
        assert_eq!(c.classify("/work/jcr_root"), None);
        assert_eq!(c.classify("/work/jcr_root/apps"), None);
        assert_eq!(c.classify("/work/jcr_root/bar.txt"), None);
        assert_eq!(c.classify("/work/foo/jcr_root/bar"), None);
        assert_eq!(c.classify("/work"), None);
    }

    #[test]
    fn rejects_excluded_paths() {
        let c = classifier();
        for raw in [
            ".git",
            "foo/.svn/bar",
            "jcr_root/apps/myapp/.DS_Store",
            "jcr_root/apps/myapp/.vlt",
            "jcr_root/apps/myapp/Thumbs.db",
            "jcr_root/apps/myapp/file.txt.swp",
            "jcr_root/apps/myapp/file.txt~",
            "target/classes/jcr_root/apps/myapp/file.txt",
            "jcr_root/apps/myapp/.git/config",
        ] {
            assert_eq!(c.classify(raw), None, "{raw} should be excluded");
        }
    }

    #[test]
    fn metadata_redirects_to_owner() {
        let c = classifier();
        assert_eq!(
            c.classify("jcr_root/apps/myapp/component/.content.xml"),
            Some(PathBuf::from("/work/jcr_root/apps/myapp/component"))
        );
        assert_eq!(
            c.classify("jcr_root/apps/myapp/component/dialog.xml"),
            Some(PathBuf::from("/work/jcr_root/apps/myapp/component"))
        );
    }

    #[test]
    fn nested_special_nodes_redirect_to_owner() {
        let c = classifier();
        assert_eq!(
            c.classify("jcr_root/apps/myapp/component/_jcr_content/par/file-node.xml"),
            Some(PathBuf::from("/work/jcr_root/apps/myapp/component"))
        );
        assert_eq!(
            c.classify("jcr_root/apps/myapp/image.png.dir/.content.xml"),
            Some(PathBuf::from("/work/jcr_root/apps/myapp"))
        );
    }

    #[test]
    fn metadata_of_top_level_node_is_rejected() {
        assert_eq!(classifier().classify("jcr_root/apps/.content.xml"), None);
    }

    #[test]
    fn exclusion_is_idempotent() {
        let c = classifier();
        for _ in 0..3 {
            assert_eq!(c.classify("foo/target/bar"), None);
            assert_eq!(c.classify("jcr_root/apps"), None);
        }
    }

    #[test]
    fn sidecar_inherits_owner_exclusion() {
        let rules = ExclusionRules::new(&default_excludes()).unwrap();
        assert!(!rules.is_excluded(Path::new("jcr_root/apps/x/.content.xml")));
        assert!(rules.is_excluded(Path::new("jcr_root/apps/.git/.content.xml")));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = ExclusionRules::new(&["**/[oops"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }
}
