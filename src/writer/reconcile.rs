//! Source reconciliation
//!
//! Pairs every source with its mapping entries and manifest, merges their
//! configuration and validates the result. Runs entirely before any backend
//! call, so configuration problems never leave half-created tables behind.

use crate::error::{Error, Result};
use crate::mapping::{
    manifest_source_name, merge, normalize_key_array, read_table_manifest, resolve,
    ManifestFormat, OutputConfig, TableConfig, TableManifest, MANIFEST_SUFFIX,
};
use crate::staging::SourceObject;
use crate::types::TableId;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A source paired with its validated table configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTable {
    pub source_name: String,
    pub source: SourceObject,
    pub manifest: TableManifest,
}

/// Reconciles one output directory against the configuration
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    config: &'a OutputConfig,
    format: ManifestFormat,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a OutputConfig, format: ManifestFormat) -> Self {
        Self { config, format }
    }

    /// Local staging: data files and manifests on disk
    ///
    /// Every depth-0 entry of `data_dir` that is not a manifest is a source;
    /// directories are sliced tables.
    pub fn reconcile_local(&self, data_dir: &Path, metadata_dir: &Path) -> Result<Vec<PlannedTable>> {
        let files = list_data_entries(data_dir)?;
        let mut manifests = list_manifests(metadata_dir)?;
        let file_names: BTreeSet<&str> = files.iter().map(|(name, _)| name.as_str()).collect();

        for entry in self.config.entries() {
            if !file_names.contains(entry.source.as_str()) {
                return Err(Error::invalid_output_with_code(
                    format!("Table source '{}' not found.", entry.source),
                    404,
                ));
            }
        }

        if let Some(orphan) = manifests.keys().find(|s| !file_names.contains(s.as_str())) {
            return Err(Error::invalid_output(format!(
                "Found orphaned table manifest: '{orphan}{MANIFEST_SUFFIX}'"
            )));
        }

        let mut planned = Vec::new();
        let mut processed = BTreeSet::new();

        for (name, path) in &files {
            let manifest = manifests
                .remove(name)
                .map(|path| self.read_manifest(&path, name, true))
                .transpose()?;
            let entries: Vec<&TableConfig> = self
                .config
                .entries_for(name)
                .map(|e| &e.config)
                .collect();
            if !entries.is_empty() {
                processed.insert(name.as_str());
            }

            let configs = match (manifest, entries.is_empty()) {
                (Some(manifest), true) => vec![manifest],
                (None, true) => vec![TableConfig::default().with_destination(self.default_destination(name))],
                (Some(manifest), false) => entries.iter().map(|m| merge(&manifest, m)).collect(),
                (None, false) => entries
                    .iter()
                    .map(|&m| {
                        let mut config = m.clone();
                        if !config.has_destination() || self.config.bucket.is_some() {
                            config.destination = Some(self.default_destination(name));
                        }
                        config
                    })
                    .collect(),
            };

            let source = if path.is_dir() {
                SourceObject::Sliced {
                    name: name.clone(),
                    path: path.clone(),
                }
            } else {
                SourceObject::File {
                    name: name.clone(),
                    path: path.clone(),
                }
            };

            for config in configs {
                let manifest = validate(name, config)?;
                if source.is_sliced() && manifest.columns.is_empty() {
                    return Err(Error::invalid_output(format!(
                        "Sliced file \"{name}\" columns specification missing."
                    )));
                }
                debug!(source = %name, destination = %manifest.destination, "Source reconciled");
                planned.push(PlannedTable {
                    source_name: name.clone(),
                    source: source.clone(),
                    manifest,
                });
            }
        }

        let unprocessed: Vec<&str> = self
            .config
            .entries()
            .iter()
            .map(|e| e.source.as_str())
            .filter(|s| !processed.contains(s))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !unprocessed.is_empty() {
            return Err(Error::invalid_output(format!(
                "Can not process output mapping for file(s): {}.",
                unprocessed.join("\", \"")
            )));
        }

        Ok(planned)
    }

    /// Workspace staging: data lives remotely, only manifests are on disk
    ///
    /// Sources are the mapping sources in declaration order followed by
    /// manifest-only sources sorted by name.
    pub fn reconcile_workspace(&self, metadata_dir: &Path) -> Result<Vec<PlannedTable>> {
        let manifests = list_manifests(metadata_dir)?;

        let mut sources: Vec<&str> = Vec::new();
        for entry in self.config.entries() {
            if !sources.contains(&entry.source.as_str()) {
                sources.push(&entry.source);
            }
        }
        for name in manifests.keys() {
            if !sources.contains(&name.as_str()) {
                sources.push(name);
            }
        }

        let mut planned = Vec::new();
        for name in sources {
            let manifest = manifests
                .get(name)
                .map(|path| self.read_manifest(path, name, false))
                .transpose()?;
            let entries: Vec<&TableConfig> = self
                .config
                .entries_for(name)
                .map(|e| &e.config)
                .collect();

            let configs: Vec<TableConfig> = if entries.is_empty() {
                manifest.into_iter().collect()
            } else {
                let base = manifest.unwrap_or_default();
                entries
                    .iter()
                    .map(|m| {
                        let mut config = merge(&base, m);
                        if !config.has_destination() && self.config.bucket.is_some() {
                            config.destination = Some(self.default_destination(name));
                        }
                        config
                    })
                    .collect()
            };

            for config in configs {
                let manifest = validate(name, config)?;
                debug!(source = %name, destination = %manifest.destination, "Source reconciled");
                planned.push(PlannedTable {
                    source_name: name.to_string(),
                    source: SourceObject::Workspace {
                        name: name.to_string(),
                    },
                    manifest,
                });
            }
        }
        Ok(planned)
    }

    /// Read a manifest and default its destination from the bucket
    ///
    /// Local staging overrides the destination whenever a bucket is declared;
    /// workspace staging only fills a missing one.
    fn read_manifest(&self, path: &Path, source: &str, bucket_overrides: bool) -> Result<TableConfig> {
        let mut config = read_table_manifest(path, self.format)?;
        let bucket_set = self.config.bucket.is_some();
        let default = if bucket_overrides {
            !config.has_destination() || bucket_set
        } else {
            !config.has_destination() && bucket_set
        };
        if default {
            config.destination = Some(self.default_destination(source));
        }
        Ok(config)
    }

    fn default_destination(&self, source: &str) -> String {
        resolve(self.config.bucket.as_deref(), source)
    }
}

/// Validate a merged configuration for one source
fn validate(source: &str, config: TableConfig) -> Result<TableManifest> {
    if !config.has_destination() {
        return Err(Error::invalid_output(format!(
            "Failed to resolve destination for output table \"{source}\"."
        )));
    }

    let mut manifest = TableManifest::from_config(config).map_err(|e| {
        Error::invalid_output(format!("Failed to write manifest for table {source}. {e}"))
    })?;

    if TableId::parse(&manifest.destination).is_err() {
        return Err(Error::invalid_output(format!(
            "CSV file \"{}\" file name is not a valid table identifier, either set output mapping for \
             \"{source}\" or make sure that the file name is a valid Storage table identifier.",
            manifest.destination
        )));
    }

    manifest.primary_key = normalize_key_array(&manifest.primary_key);
    Ok(manifest)
}

/// Depth-0 entries of a data directory that are not manifests, sorted by name
fn list_data_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let fail = |e: std::io::Error| {
        Error::invalid_output(format!("Failed to list output directory {}: {e}", dir.display()))
    };
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(fail)? {
        let entry = entry.map_err(fail)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if manifest_source_name(&name).is_none() {
            entries.push((name, entry.path()));
        }
    }
    entries.sort();
    Ok(entries)
}

/// Manifest files of a metadata directory keyed by the source they describe
///
/// A missing directory has no manifests.
fn list_manifests(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut manifests = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(manifests);
    }
    let fail = |e: std::io::Error| {
        Error::invalid_output(format!("Failed to list manifests in {}: {e}", dir.display()))
    };
    for entry in std::fs::read_dir(dir).map_err(fail)? {
        let entry = entry.map_err(fail)?;
        if !entry.file_type().map_err(fail)?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(source) = manifest_source_name(&name) {
            manifests.insert(source.to_string(), entry.path());
        }
    }
    Ok(manifests)
}
