//! Workspace filter rules.
//!
//! The package manager only touches repository paths covered by the filter
//! document, and applies the rules in document order.

use super::item::ContentItem;

pub const FILTER_ZIP_PATH: &str = "META-INF/vault/filter.xml";

const HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<workspaceFilter version=\"1.0\">";
const FOOTER: &str = "</workspaceFilter>";

/// One `<filter>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRule {
    /// Replace `path` and its subtree, leaving siblings under `root` alone.
    Scoped { root: String, path: String },
    /// Remove `path` and everything beneath it.
    Remove { path: String },
}

impl FilterRule {
    pub fn for_item(item: &ContentItem) -> Self {
        if !item.exists {
            return FilterRule::Remove {
                path: item.filter_path.clone(),
            };
        }

        let root = match item.filter_path.rsplit_once('/') {
            Some(("", _)) | None => "/".to_string(),
            Some((parent, _)) => parent.to_string(),
        };
        FilterRule::Scoped {
            root,
            path: item.filter_path.clone(),
        }
    }

    pub fn render(&self) -> String {
        match self {
            FilterRule::Scoped { root, path } => {
                let root = escape_attr(root);
                let path = escape_attr(path);
                let base = root.trim_end_matches('/');
                format!(
                    "  <filter root=\"{root}\">\n    <exclude pattern=\"{base}/.*\" />\n    <include pattern=\"{path}\" />\n    <include pattern=\"{path}/.*\" />\n  </filter>"
                )
            }
            FilterRule::Remove { path } => {
                format!("  <filter root=\"{}\" />", escape_attr(path))
            }
        }
    }
}

/// Full `filter.xml` content for `rules`.
pub fn render_document(rules: &[FilterRule]) -> String {
    let mut doc = String::from(HEADER);
    doc.push('\n');
    for rule in rules {
        doc.push_str(&rule.render());
        doc.push('\n');
    }
    doc.push_str(FOOTER);
    doc.push('\n');
    doc
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
