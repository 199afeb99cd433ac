//! Servers document store
//!
//! The servers document is a JSON file listing every tracked server and
//! its versions. Fields this tool does not own are preserved untouched.
//! Writes go to a temporary file in the target directory and are renamed
//! into place, so a failed run never leaves a partial document.

use crate::models::{AssessmentRecord, SecurityStatus};
use crate::source::ScanTarget;
use crate::validate::{validate_record, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown server slug '{0}'")]
    UnknownServer(String),

    #[error("unknown version {slug}@{version}")]
    UnknownVersion { slug: String, version: String },

    #[error("failed to encode record for {target}: {source}")]
    Encode {
        target: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_status: Option<SecurityStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_recommended: Option<bool>,
    /// Kept as raw JSON so malformed historic records do not block loading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_scan: Option<JsonValue>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServersDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ServersDocument {
    pub fn server(&self, slug: &str) -> Option<&ServerEntry> {
        self.servers.iter().find(|s| s.slug == slug)
    }

    /// Every (server, version) pair to scan, optionally restricted to one slug.
    pub fn targets(&self, only_slug: Option<&str>) -> Result<Vec<ScanTarget>, StoreError> {
        let servers: Vec<&ServerEntry> = match only_slug {
            Some(slug) => vec![self
                .server(slug)
                .ok_or_else(|| StoreError::UnknownServer(slug.to_string()))?],
            None => self.servers.iter().collect(),
        };
        Ok(servers
            .into_iter()
            .flat_map(|server| {
                server.versions.iter().map(move |v| ScanTarget {
                    server_name: server.name.clone(),
                    slug: server.slug.clone(),
                    repository: server.repository.clone(),
                    version: v.version.clone(),
                })
            })
            .collect())
    }

    /// Replace the whole assessment of one version. Nothing from the prior record survives.
    pub fn replace_record(
        &mut self,
        slug: &str,
        version: &str,
        record: &AssessmentRecord,
    ) -> Result<(), StoreError> {
        let target = format!("{}@{}", slug, version);
        validate_record(&target, record)?;

        let entry = self
            .servers
            .iter_mut()
            .find(|s| s.slug == slug)
            .and_then(|s| s.versions.iter_mut().find(|v| v.version == version))
            .ok_or_else(|| StoreError::UnknownVersion {
                slug: slug.to_string(),
                version: version.to_string(),
            })?;

        let status = record.security_status();
        entry.security_scan = Some(
            serde_json::to_value(record).map_err(|source| StoreError::Encode {
                target: target.clone(),
                source,
            })?,
        );
        entry.security_status = Some(status);
        entry.is_recommended = Some(status.is_recommended());
        debug!("Replaced record for {} ({})", target, status);
        Ok(())
    }

    /// Parsed record of one version, if present and well-formed
    pub fn record(&self, slug: &str, version: &str) -> Option<AssessmentRecord> {
        self.server(slug)?
            .versions
            .iter()
            .find(|v| v.version == version)?
            .security_scan
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(crate::record::format_timestamp(now));
    }
}

/// JSON file backing a [`ServersDocument`]
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<ServersDocument, StoreError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Atomically replace the file with `doc`.
    pub fn save(&self, doc: &ServersDocument) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        let mut body = serde_json::to_string_pretty(doc).map_err(|source| StoreError::Encode {
            target: self.path.display().to_string(),
            source,
        })?;
        body.push('\n');

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(body.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        debug!("Wrote {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Category, CategoryResult, CategoryResults, RecordState};
    use crate::record::RecordBuilder;
    use chrono::TimeZone;

    pub(crate) const SAMPLE: &str = r#"{
  "last_updated": "2025-01-01T00:00:00Z",
  "schema": 2,
  "servers": [
    {
      "name": "Alpha",
      "slug": "alpha",
      "repository": "https://example.invalid/alpha",
      "category": "files",
      "versions": [
        {"version": "1.0.0", "release_date": "2025-01-01",
         "security_status": "under-review", "is_recommended": false,
         "security_scan": {"overall_score": 10, "legacy_field": true}},
        {"version": "1.1.0"}
      ]
    },
    {"name": "Beta", "slug": "beta", "repository": "", "versions": [{"version": "0.1.0"}]}
  ]
}"#;

    fn doc() -> ServersDocument {
        serde_json::from_str(SAMPLE).unwrap()
    }

    fn scored_record(score: u32) -> AssessmentRecord {
        let results: CategoryResults = Category::ALL
            .into_iter()
            .map(|c| (c, CategoryResult::pass(score, "ok")))
            .collect();
        RecordBuilder::new(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap())
            .build(results)
            .unwrap()
    }

    #[test]
    fn test_targets() {
        let d = doc();
        assert_eq!(d.targets(None).unwrap().len(), 3);
        let alpha = d.targets(Some("alpha")).unwrap();
        assert_eq!(alpha.len(), 2);
        assert_eq!(alpha[1].label(), "alpha@1.1.0");
        assert!(matches!(
            d.targets(Some("gamma")),
            Err(StoreError::UnknownServer(_))
        ));
    }

    #[test]
    fn test_replace_drops_prior_fields_but_keeps_unknown_entry_fields() {
        let mut d = doc();
        d.replace_record("alpha", "1.0.0", &scored_record(90)).unwrap();
        let entry = &d.servers[0].versions[0];
        assert_eq!(entry.security_status, Some(SecurityStatus::VerifiedSecure));
        assert_eq!(entry.is_recommended, Some(true));
        let scan = entry.security_scan.as_ref().unwrap();
        assert!(scan.get("legacy_field").is_none());
        assert_eq!(scan["overall_score"], 90);
        assert_eq!(entry.extra["release_date"], "2025-01-01");
        assert_eq!(d.servers[0].extra["category"], "files");
        assert_eq!(d.extra["schema"], 2);
    }

    #[test]
    fn test_replace_unknown_version() {
        let mut d = doc();
        let err = d.replace_record("alpha", "9.9.9", &scored_record(90));
        assert!(matches!(err, Err(StoreError::UnknownVersion { .. })));
    }

    #[test]
    fn test_replace_rejects_invalid_record() {
        let mut d = doc();
        let mut record = scored_record(90);
        record.overall_score = 12;
        let err = d.replace_record("alpha", "1.0.0", &record).unwrap_err();
        assert!(err.to_string().contains("alpha@1.0.0"));
        assert_eq!(d, doc());
    }

    #[test]
    fn test_placeholder_record_round_trips() {
        let mut d = doc();
        let placeholder = RecordBuilder::new(Utc::now()).awaiting_scan();
        d.replace_record("alpha", "1.1.0", &placeholder).unwrap();
        let back = d.record("alpha", "1.1.0").unwrap();
        assert_eq!(back.record_state, RecordState::AwaitingScan);
        assert_eq!(
            d.servers[0].versions[1].security_status,
            Some(SecurityStatus::UnderReview)
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("out/servers.json"));
        let mut d = doc();
        d.replace_record("beta", "0.1.0", &scored_record(40)).unwrap();
        store.save(&d).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, d);
        assert_eq!(
            loaded.servers[1].versions[0].security_status,
            Some(SecurityStatus::NotRecommended)
        );
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = JsonFileStore::new(dir.path().join("nope.json"));
        assert!(matches!(missing.load(), Err(StoreError::Read { .. })));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(matches!(
            JsonFileStore::new(&bad).load(),
            Err(StoreError::Parse { .. })
        ));
    }
}
