//! Package assembly
//!
//! A package is the minimal set of entries covering one batch of changes.
//! Entries collapse into their ancestors, and every directory between a
//! changed node and `jcr_root` gets exactly one metadata entry so the remote
//! tree stays typed even when only a leaf changed.

pub mod filter;
pub mod item;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::classify::content_root;
use crate::escape::{NameEscaping, NamespacePrefix};

pub use filter::{FILTER_ZIP_PATH, FilterRule, render_document};
pub use item::{ContentItem, ItemKind};

/// Ordered, deduplicated entries for one push cycle.
#[derive(Debug, Clone)]
pub struct Package {
    items: Vec<ContentItem>,
    escaping: Arc<dyn NameEscaping>,
}

impl Default for Package {
    fn default() -> Self {
        Self::new(Arc::new(NamespacePrefix))
    }
}

impl Package {
    pub fn new(escaping: Arc<dyn NameEscaping>) -> Self {
        Self {
            items: Vec::new(),
            escaping,
        }
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Add a canonical content path.
    ///
    /// Returns the accepted entry, or `None` when an entry already in the
    /// package covers it.
    pub fn add(&mut self, canonical: &Path) -> Option<ContentItem> {
        let Some(root) = content_root(canonical) else {
            debug!("Not under a content root: {}", canonical.display());
            return None;
        };

        let item = ContentItem::content(canonical, &root, self.escaping.as_ref());
        let index = self.insert(item, None)?;
        let accepted = self.items[index].clone();

        // A folder carries its own metadata so removing an inner
        // .content.xml still leaves the node typed. It goes right after the
        // folder to keep rules leaf-first.
        if accepted.exists && accepted.is_folder {
            self.add_metadata(canonical, &root, Some(index + 1));
        }

        let mut dir = canonical.parent();
        while let Some(current) = dir {
            if current == root || !current.starts_with(&root) {
                break;
            }
            self.add_metadata(current, &root, None);
            dir = current.parent();
        }

        Some(accepted)
    }

    /// Filter rules in entry order.
    pub fn filter_rules(&self) -> Vec<FilterRule> {
        self.items.iter().map(FilterRule::for_item).collect()
    }

    /// The complete `filter.xml` document.
    pub fn filter_document(&self) -> String {
        render_document(&self.filter_rules())
    }

    fn add_metadata(&mut self, dir: &Path, root: &Path, at: Option<usize>) {
        if !dir.is_dir() {
            return;
        }
        let item = ContentItem::metadata(dir, root, self.escaping.as_ref());
        self.insert(item, at);
    }

    /// Insert `item` unless it is covered, returning its index.
    ///
    /// An item that replaces narrower entries takes the slot of the first
    /// one it removed. Otherwise it goes to `at`, or to the end.
    fn insert(&mut self, item: ContentItem, at: Option<usize>) -> Option<usize> {
        let structural = item.kind.is_structural();
        let mut slot = None;

        for i in (0..self.items.len()).rev() {
            let existing = &self.items[i].zip_path;

            if *existing == item.zip_path {
                debug!("Already added to package, skipping: {}", item.zip_path);
                return None;
            }

            if !structural && item::is_ancestor(existing, &item.zip_path) {
                debug!("Parent already added to package, skipping: {}", item.zip_path);
                return None;
            }

            if item::is_ancestor(&item.zip_path, existing) {
                debug!("Removing child: {}", existing);
                self.items.remove(i);
                slot = Some(i);
            }
        }

        let index = slot.or(at).unwrap_or(self.items.len()).min(self.items.len());
        self.items.insert(index, item);
        Some(index)
    }
}
