use crate::fetch::{FetchRecord, FetchReport};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchManifest {
    pub fetched_at: DateTime<Utc>,
    pub base_url: String,
    pub downloaded: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted_at: Option<String>,
    pub records: Vec<FetchRecord>,
}

impl FetchManifest {
    pub fn from_report(base_url: &str, report: &FetchReport) -> Self {
        Self {
            fetched_at: Utc::now(),
            base_url: base_url.to_string(),
            downloaded: report.downloaded(),
            failed: report.failed(),
            aborted_at: report.aborted_at.clone(),
            records: report.records.clone(),
        }
    }
}

pub fn load_manifest(path: &Path) -> Result<FetchManifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;
    Ok(manifest)
}

pub fn save_manifest(path: &Path, manifest: &FetchManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create manifest directory {}", parent.display()))?;
    }

    let serialized = serde_json::to_string_pretty(manifest)?;
    std::fs::write(path, serialized)
        .with_context(|| format!("failed to write manifest {}", path.display()))?;
    Ok(())
}
