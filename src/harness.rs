use crate::config::HarvestConfig;
use crate::pipeline::merge_originals;
use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub files_merged: usize,
    pub rows: usize,
    pub columns: usize,
    pub first_sha256: String,
    pub second_sha256: String,
    pub identical: bool,
}

pub fn run_verify(config: &HarvestConfig) -> Result<VerifyReport> {
    let first = merge_originals(config)?;
    let first_sha256 = file_sha256(&first.output_path)?;

    let second = merge_originals(config)?;
    let second_sha256 = file_sha256(&second.output_path)?;

    Ok(VerifyReport {
        files_merged: second.files_merged(),
        rows: second.rows,
        columns: second.columns,
        identical: first_sha256 == second_sha256,
        first_sha256,
        second_sha256,
    })
}

fn file_sha256(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
