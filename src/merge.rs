use crate::config::BadFilePolicy;
use crate::decode::{TextEncoding, decode_first_match};
use crate::table::{MergedTable, RecordSet};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub source_dir: PathBuf,
    pub output_path: PathBuf,
    pub pattern: String,
    pub encodings: Vec<TextEncoding>,
    pub on_bad_file: BadFilePolicy,
    pub missing_value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergedInput {
    pub file: String,
    pub encoding: TextEncoding,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedInput {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub output_path: PathBuf,
    pub inputs: Vec<MergedInput>,
    pub skipped: Vec<SkippedInput>,
    pub rows: usize,
    pub columns: usize,
}

impl MergeReport {
    pub fn files_merged(&self) -> usize {
        self.inputs.len()
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Merged {} files into {} with single header.",
            self.files_merged(),
            self.output_path.display()
        )
    }
}

pub fn discover_csv_files(
    dir: &Path,
    pattern: &str,
    exclude: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("source dir does not exist: {}", dir.display());
    }
    let matcher =
        glob::Pattern::new(pattern).with_context(|| format!("invalid file pattern {pattern}"))?;

    let mut found: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            warn!(file = %entry.path().display(), "skipping file with non-UTF-8 name");
            continue;
        };
        if !matcher.matches(name) {
            continue;
        }
        if exclude.is_some_and(|out| same_file(out, entry.path())) {
            debug!(file = %name, "skipping merge output found in source dir");
            continue;
        }
        found.push((name.to_string(), entry.path().to_path_buf()));
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

pub fn load_record_set(
    path: &Path,
    encodings: &[TextEncoding],
) -> Result<(RecordSet, TextEncoding)> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let decoded = decode_first_match(&bytes, encodings)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    if encodings.first() != Some(&decoded.encoding) {
        info!(
            file = %path.display(),
            encoding = %decoded.encoding,
            "fell back to alternate encoding"
        );
    }

    let set = RecordSet::parse(&decoded.text)
        .with_context(|| format!("failed to parse CSV {}", path.display()))?;
    Ok((set, decoded.encoding))
}

// Output is written only once every input has been read.
pub fn merge_directory(options: &MergeOptions) -> Result<MergeReport> {
    let files = discover_csv_files(
        &options.source_dir,
        &options.pattern,
        Some(options.output_path.as_path()),
    )?;
    info!(dir = %options.source_dir.display(), files = files.len(), "merge start");

    let mut table = MergedTable::new();
    let mut inputs = Vec::new();
    let mut skipped = Vec::new();

    for path in files {
        let file = display_name(&path);
        match load_record_set(&path, &options.encodings) {
            Ok((set, encoding)) => {
                debug!(%file, %encoding, rows = set.len(), columns = set.headers.len(), "loaded");
                inputs.push(MergedInput {
                    file,
                    encoding,
                    rows: set.len(),
                });
                table.append(set);
            }
            Err(err) => match options.on_bad_file {
                BadFilePolicy::Abort => return Err(err),
                BadFilePolicy::Skip => {
                    let reason = format!("{err:#}");
                    warn!(%file, %reason, "skipping unreadable file");
                    skipped.push(SkippedInput { file, reason });
                }
            },
        }
    }

    let mut buffer = Vec::new();
    table.write_csv(&mut buffer, &options.missing_value)?;

    if let Some(parent) = options.output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output dir {}", parent.display()))?;
    }
    std::fs::write(&options.output_path, &buffer)
        .with_context(|| format!("failed to write {}", options.output_path.display()))?;

    info!(
        output = %options.output_path.display(),
        files = inputs.len(),
        skipped = skipped.len(),
        rows = table.row_count(),
        columns = table.column_count(),
        "merge complete"
    );

    Ok(MergeReport {
        output_path: options.output_path.clone(),
        inputs,
        skipped,
        rows: table.row_count(),
        columns: table.column_count(),
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
