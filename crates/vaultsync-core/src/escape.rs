//! Mapping from on-disk segment names to repository node names.
//!
//! Filesystems cannot hold `:` reliably, so FileVault checkouts store
//! namespaced nodes such as `jcr:content` as `_jcr_content`. Remote systems
//! differ in how strictly they follow that convention, so the mapping is a
//! trait and the pipeline is configured with one implementation.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Turns one on-disk path segment into the matching repository node name.
pub trait NameEscaping: Send + Sync + std::fmt::Debug {
    fn unescape<'a>(&self, segment: &'a str) -> Cow<'a, str>;
}

/// `_ns_name` becomes `ns:name`, `__name` becomes `_name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamespacePrefix;

impl NameEscaping for NamespacePrefix {
    fn unescape<'a>(&self, segment: &'a str) -> Cow<'a, str> {
        if let Some(literal) = segment.strip_prefix("__") {
            return Cow::Owned(format!("_{literal}"));
        }

        let Some(rest) = segment.strip_prefix('_') else {
            return Cow::Borrowed(segment);
        };

        match rest.split_once('_') {
            Some((prefix, name)) if !prefix.is_empty() && !name.is_empty() => {
                Cow::Owned(format!("{prefix}:{name}"))
            }
            _ => Cow::Borrowed(segment),
        }
    }
}

/// Leaves segment names untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl NameEscaping for Verbatim {
    fn unescape<'a>(&self, segment: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(segment)
    }
}

/// Config-level selector for the escaping implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscapingMode {
    #[default]
    Prefix,
    Verbatim,
}

impl EscapingMode {
    pub fn build(self) -> Box<dyn NameEscaping> {
        match self {
            EscapingMode::Prefix => Box::new(NamespacePrefix),
            EscapingMode::Verbatim => Box::new(Verbatim),
        }
    }
}
