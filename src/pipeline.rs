use crate::config::HarvestConfig;
use crate::fetch::{FetchReport, Fetcher};
use crate::manifest::{FetchManifest, save_manifest};
use crate::merge::{MergeOptions, MergeReport, merge_directory};
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub dest_dir: PathBuf,
    pub manifest_path: Option<PathBuf>,
    pub resources: Vec<String>,
}

impl FetchOptions {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            dest_dir: config.paths.originals_path(),
            manifest_path: Some(config.paths.manifest_path()),
            resources: config.fetch.resources.names(),
        }
    }
}

pub fn merge_options(config: &HarvestConfig) -> MergeOptions {
    MergeOptions {
        source_dir: config.paths.originals_path(),
        output_path: config.paths.merged_path(),
        pattern: config.merge.pattern.clone(),
        encodings: config.merge.encodings.clone(),
        on_bad_file: config.merge.on_bad_file,
        missing_value: config.merge.missing_value.clone(),
    }
}

pub fn fetch_resources(config: &HarvestConfig, options: &FetchOptions) -> Result<FetchReport> {
    info!(
        base_url = %config.fetch.base_url,
        resources = options.resources.len(),
        dest = %options.dest_dir.display(),
        "fetch start"
    );

    let fetcher = Fetcher::new(&config.fetch)?;
    let report = fetcher.fetch_all(&options.resources, &options.dest_dir)?;

    if let Some(path) = &options.manifest_path {
        save_manifest(path, &FetchManifest::from_report(&config.fetch.base_url, &report))?;
        info!(manifest = %path.display(), "manifest written");
    }

    if let Some(name) = &report.aborted_at {
        bail!(
            "fetch aborted at {name} after {} of {} resources",
            report.attempted(),
            options.resources.len()
        );
    }

    info!(
        attempted = report.attempted(),
        downloaded = report.downloaded(),
        failed = report.failed(),
        "fetch complete"
    );
    Ok(report)
}

pub fn merge_originals(config: &HarvestConfig) -> Result<MergeReport> {
    let options = merge_options(config);
    merge_directory(&options).with_context(|| {
        format!(
            "merge of {} into {} failed",
            options.source_dir.display(),
            options.output_path.display()
        )
    })
}

pub fn validate_config(config: &HarvestConfig, label: &str) -> Result<Vec<String>> {
    config.validate()?;
    let names = config.fetch.resources.names();

    let mut messages = vec![format!("OK: config ({label})")];
    messages.push(format!(
        "OK: {} resources from {}",
        names.len(),
        config.fetch.base_url
    ));
    if let (Some(first), Some(last)) = (names.first(), names.last()) {
        messages.push(format!("OK: resources {first} .. {last}"));
    }
    messages.push(format!(
        "OK: downloads into {}",
        config.paths.originals_path().display()
    ));
    messages.push(format!(
        "OK: merges into {}",
        config.paths.merged_path().display()
    ));
    Ok(messages)
}
