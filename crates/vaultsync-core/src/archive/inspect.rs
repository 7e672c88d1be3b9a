//! Read back a built archive for debugging output and tests.

use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::classify::METADATA_FILE;
use crate::package::FILTER_ZIP_PATH;

static PRIMARY_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"jcr:primaryType\s*=\s*"([^"]+)""#).expect("primary type pattern is valid")
});

/// Summary of an archive's contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveContents {
    /// Sorted entry names; metadata entries carry `@<jcr:primaryType>`.
    pub entries: Vec<String>,
    /// Trimmed lines of the filter document.
    pub filter: Vec<String>,
}

pub fn inspect(path: &Path) -> Result<ArchiveContents> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open archive: {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read archive: {}", path.display()))?;

    let mut entries = Vec::with_capacity(archive.len());
    let mut filter = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read zip entry {}", i))?;
        let name = entry.name().to_string();

        if name == FILTER_ZIP_PATH || name.ends_with(METADATA_FILE) {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .with_context(|| format!("Failed to read zip entry: {}", name))?;

            if name == FILTER_ZIP_PATH {
                filter = content.split('\n').map(|line| line.trim().to_string()).collect();
            }
            if name.ends_with(METADATA_FILE) {
                let primary_type = PRIMARY_TYPE
                    .captures(&content)
                    .and_then(|c| c.get(1))
                    .map_or("undefined", |m| m.as_str());
                entries.push(format!("{name}@{primary_type}"));
                continue;
            }
        }

        entries.push(name);
    }

    entries.sort();
    Ok(ArchiveContents { entries, filter })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveBuilder, BuildOutcome};
    use crate::classify::ExclusionRules;
    use crate::package::Package;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn metadata_entries_carry_their_type() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("jcr_root/apps/myapp");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("file.txt"), "x").unwrap();

        let mut package = Package::default();
        package.add(&dir.join("file.txt")).unwrap();

        let builder = ArchiveBuilder::new(temp.path().join("a.zip"), ExclusionRules::default());
        let BuildOutcome::Built(archive) = builder.build(&package).unwrap() else {
            panic!("expected an archive");
        };

        let contents = inspect(&archive.path).unwrap();
        assert!(contents.entries.contains(&"jcr_root/apps/myapp/.content.xml@nt:folder".to_string()));
        assert!(
            contents
                .entries
                .contains(&"META-INF/vault/definition/.content.xml@vlt:PackageDefinition".to_string())
        );
        assert_eq!(contents.filter.first().map(String::as_str), Some(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert_eq!(contents.filter.last().map(String::as_str), Some(""));
    }

    #[test]
    fn missing_archive_is_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(inspect(&temp.path().join("nope.zip")).is_err());
    }
}
