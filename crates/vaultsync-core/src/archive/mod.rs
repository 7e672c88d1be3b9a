//! Zip archive construction
//!
//! An archive is planned first (every entry name and where its bytes come
//! from) and written second, so folder contents are fully listed before any
//! of them is read.

pub mod inspect;
pub mod skeleton;

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::classify::{ExclusionRules, to_slash};
use crate::error::AssemblyError;
use crate::package::{FILTER_ZIP_PATH, ItemKind, Package};

pub use inspect::{ArchiveContents, inspect};
pub use skeleton::{NT_FOLDER, SKELETON};

/// Result of a build.
#[derive(Debug)]
pub enum BuildOutcome {
    Built(Archive),
    /// Nothing to push; no file was written.
    Empty,
}

/// A written archive.
#[derive(Debug, Clone)]
pub struct Archive {
    pub path: PathBuf,
    /// Entry names in write order.
    pub entries: Vec<String>,
}

#[derive(Debug)]
enum Source {
    Directory,
    Bytes(Vec<u8>),
    File(PathBuf),
}

#[derive(Debug)]
struct Entry {
    name: String,
    source: Source,
}

#[derive(Debug, Default)]
struct Plan {
    entries: Vec<Entry>,
    seen: HashSet<String>,
}

impl Plan {
    fn push(&mut self, name: String, source: Source) {
        if self.seen.insert(name.clone()) {
            self.entries.push(Entry { name, source });
        }
    }
}

/// Writes packages to a fixed output path.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    output: PathBuf,
    rules: ExclusionRules,
}

impl ArchiveBuilder {
    /// `rules` filter files found while copying folders.
    pub fn new(output: impl Into<PathBuf>, rules: ExclusionRules) -> Self {
        Self {
            output: output.into(),
            rules,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn build(&self, package: &Package) -> Result<BuildOutcome, AssemblyError> {
        if package.is_empty() {
            return Ok(BuildOutcome::Empty);
        }

        let plan = self.plan(package)?;
        self.write(&plan)?;

        Ok(BuildOutcome::Built(Archive {
            path: self.output.clone(),
            entries: plan.entries.into_iter().map(|e| e.name).collect(),
        }))
    }

    fn plan(&self, package: &Package) -> Result<Plan, AssemblyError> {
        let mut plan = Plan::default();

        for (name, content) in SKELETON {
            let source = match content {
                Some(bytes) => Source::Bytes(bytes.to_vec()),
                None => Source::Directory,
            };
            plan.push(name.to_string(), source);
        }

        for item in package.items() {
            if !item.exists {
                continue;
            }

            match item.kind {
                ItemKind::Placeholder => {
                    plan.push(item.zip_path.clone(), Source::Bytes(NT_FOLDER.to_vec()));
                }
                _ if item.is_folder => self.plan_folder(&mut plan, &item.local_path, &item.zip_path)?,
                _ => plan.push(item.zip_path.clone(), Source::File(item.local_path.clone())),
            }
        }

        plan.push(
            FILTER_ZIP_PATH.to_string(),
            Source::Bytes(package.filter_document().into_bytes()),
        );

        Ok(plan)
    }

    fn plan_folder(&self, plan: &mut Plan, local: &Path, zip_path: &str) -> Result<(), AssemblyError> {
        plan.push(format!("{zip_path}/"), Source::Directory);

        let walker = WalkDir::new(local)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let relative = entry.path().strip_prefix(local).unwrap_or(entry.path());
                let name = format!("{zip_path}/{}", to_slash(relative));
                !self.rules.is_excluded(Path::new(&name))
            });

        for entry in walker {
            let entry = entry.map_err(|source| AssemblyError::Walk {
                path: local.to_path_buf(),
                source,
            })?;
            let relative = entry.path().strip_prefix(local).unwrap_or(entry.path());
            let name = format!("{zip_path}/{}", to_slash(relative));

            if entry.file_type().is_dir() {
                plan.push(format!("{name}/"), Source::Directory);
            } else {
                plan.push(name, Source::File(entry.path().to_path_buf()));
            }
        }

        Ok(())
    }

    fn write(&self, plan: &Plan) -> Result<(), AssemblyError> {
        let write_err = |source: std::io::Error| AssemblyError::Write {
            path: self.output.clone(),
            source,
        };

        if let Some(parent) = self.output.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let file = File::create(&self.output).map_err(write_err)?;

        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in &plan.entries {
            match &entry.source {
                Source::Directory => {
                    zip.add_directory(entry.name.as_str(), options)?;
                }
                Source::Bytes(bytes) => {
                    zip.start_file(entry.name.as_str(), options)?;
                    zip.write_all(bytes).map_err(write_err)?;
                }
                Source::File(path) => {
                    let bytes = std::fs::read(path).map_err(|source| AssemblyError::Read {
                        path: path.clone(),
                        source,
                    })?;
                    zip.start_file(entry.name.as_str(), options)?;
                    zip.write_all(&bytes).map_err(write_err)?;
                }
            }
        }

        zip.finish()?;
        debug!("Archive written: {} ({} entries)", self.output.display(), plan.entries.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_excludes;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn builder(temp: &TempDir) -> ArchiveBuilder {
        ArchiveBuilder::new(
            temp.path().join("out/package.zip"),
            ExclusionRules::new(&default_excludes()).unwrap(),
        )
    }

    #[test]
    fn empty_package_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let builder = builder(&temp);

        let outcome = builder.build(&Package::default()).unwrap();
        assert!(matches!(outcome, BuildOutcome::Empty));
        assert!(!builder.output().exists());
    }

    #[test]
    fn folder_is_copied_without_excluded_files() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("jcr_root/apps/myapp/component");
        fs::create_dir_all(folder.join("nested")).unwrap();
        fs::write(folder.join("a.txt"), "a").unwrap();
        fs::write(folder.join("nested/b.txt"), "b").unwrap();
        fs::write(folder.join(".DS_Store"), "junk").unwrap();
        fs::write(folder.join("c.txt.swp"), "swap").unwrap();

        let mut package = Package::default();
        package.add(&folder).unwrap();

        let BuildOutcome::Built(archive) = builder(&temp).build(&package).unwrap() else {
            panic!("expected an archive");
        };

        let items: Vec<&str> = archive
            .entries
            .iter()
            .map(String::as_str)
            .filter(|name| name.starts_with("jcr_root/apps"))
            .collect();
        assert_eq!(
            items,
            vec![
                "jcr_root/apps/myapp/component/",
                "jcr_root/apps/myapp/component/a.txt",
                "jcr_root/apps/myapp/component/nested/",
                "jcr_root/apps/myapp/component/nested/b.txt",
                "jcr_root/apps/myapp/component/.content.xml",
                "jcr_root/apps/myapp/.content.xml",
                "jcr_root/apps/.content.xml",
            ]
        );
        assert_eq!(archive.entries.last().map(String::as_str), Some(FILTER_ZIP_PATH));
    }

    #[test]
    fn vanished_file_is_an_assembly_error() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("jcr_root/apps/myapp");
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("file.txt");
        fs::write(&file, "x").unwrap();

        let mut package = Package::default();
        package.add(&file).unwrap();
        fs::remove_file(&file).unwrap();

        let err = builder(&temp).build(&package).unwrap_err();
        assert!(matches!(err, AssemblyError::Read { .. }));
    }
}
