//! vaultsync Core Library
//!
//! Turns filesystem changes inside a FileVault `jcr_root` checkout into small
//! content packages and installs them on remote package managers.

pub mod archive;
pub mod classify;
pub mod collector;
pub mod config;
pub mod error;
pub mod escape;
pub mod package;
pub mod pipeline;
pub mod sender;
pub mod watch;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{RetryConfig, SyncConfig, load_config};

    // Classification and packaging
    pub use crate::classify::{ExclusionRules, PathClassifier};
    pub use crate::escape::{EscapingMode, NameEscaping, NamespacePrefix, Verbatim};
    pub use crate::package::{ContentItem, FilterRule, ItemKind, Package};

    // Archives
    pub use crate::archive::{Archive, ArchiveBuilder, ArchiveContents, BuildOutcome, inspect};

    // Delivery
    pub use crate::sender::{Deliver, PushResult, Sender, Target};

    // Pipeline
    pub use crate::collector::ChangeCollector;
    pub use crate::pipeline::{CycleOutcome, CycleReport, Pipeline, PipelineEvent, PipelineState};
    pub use crate::watch::watch_tree;

    // Errors
    pub use crate::error::{AssemblyError, ConfigError, PushError, PushErrorKind};
}
