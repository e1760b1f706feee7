use crate::decode::TextEncoding;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HarvestConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub merge: MergeConfig,
}

impl HarvestConfig {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("paths.originals_dir", &self.paths.originals_dir),
            ("paths.merged_file", &self.paths.merged_file),
            ("paths.manifest_file", &self.paths.manifest_file),
        ] {
            if value.trim().is_empty() {
                bail!("{field} must not be empty");
            }
        }

        let url = Url::parse(&self.fetch.base_url)
            .with_context(|| format!("invalid fetch.base_url {}", self.fetch.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("fetch.base_url must use http or https, got {}", url.scheme());
        }

        let resources = &self.fetch.resources;
        if resources.start_year > resources.end_year {
            bail!(
                "fetch.resources.start_year ({}) is after end_year ({})",
                resources.start_year,
                resources.end_year
            );
        }
        if resources.extension.trim().is_empty() {
            bail!("fetch.resources.extension must not be empty");
        }
        for name in resources.names() {
            validate_resource_name(&name)?;
        }

        if self.merge.encodings.is_empty() {
            bail!("merge.encodings must list at least one encoding");
        }
        glob::Pattern::new(&self.merge.pattern)
            .with_context(|| format!("invalid merge.pattern {}", self.merge.pattern))?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_originals_dir")]
    pub originals_dir: String,
    #[serde(default = "default_merged_file")]
    pub merged_file: String,
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
}

impl PathsConfig {
    pub fn originals_path(&self) -> PathBuf {
        self.data_dir.join(&self.originals_dir)
    }

    pub fn merged_path(&self) -> PathBuf {
        self.data_dir.join(&self.merged_file)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join(&self.manifest_file)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            originals_dir: default_originals_dir(),
            merged_file: default_merged_file(),
            manifest_file: default_manifest_file(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorPolicy {
    #[default]
    Skip,
    Abort,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub on_transport_error: TransportErrorPolicy,
    #[serde(default = "default_true")]
    pub use_system_proxy: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            resources: ResourceConfig::default(),
            timeout_secs: default_timeout_secs(),
            user_agent: None,
            headers: BTreeMap::new(),
            on_transport_error: TransportErrorPolicy::Skip,
            use_system_proxy: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    #[serde(default = "default_end_year")]
    pub end_year: i32,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub extra: Vec<String>,
}

impl ResourceConfig {
    // extras first, then one file per year of the inclusive range
    pub fn names(&self) -> Vec<String> {
        let extension = self.extension.trim_start_matches('.');
        self.extra
            .iter()
            .cloned()
            .chain((self.start_year..=self.end_year).map(|year| format!("{year}.{extension}")))
            .collect()
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            start_year: default_start_year(),
            end_year: default_end_year(),
            extension: default_extension(),
            extra: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BadFilePolicy {
    #[default]
    Abort,
    Skip,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_encodings")]
    pub encodings: Vec<TextEncoding>,
    #[serde(default)]
    pub on_bad_file: BadFilePolicy,
    #[serde(default)]
    pub missing_value: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            encodings: default_encodings(),
            on_bad_file: BadFilePolicy::Abort,
            missing_value: String::new(),
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<HarvestConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<HarvestConfig>(&text)
                .with_context(|| format!("failed to parse toml in {}", path.display()))?
        }
        None => HarvestConfig::default(),
    };

    config.validate().with_context(|| match path {
        Some(path) => format!("invalid config {}", path.display()),
        None => "invalid default config".to_string(),
    })?;
    Ok(config)
}

pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("resource name must not be empty");
    }
    if name == "." || name == ".." {
        bail!("resource name {name} is not a file name");
    }
    if name.contains(['/', '\\']) {
        bail!("resource name {name} must not contain path separators");
    }
    Ok(())
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("Data")
}

fn default_originals_dir() -> String {
    "OriginalCSVs".to_string()
}

fn default_merged_file() -> String {
    "merged.csv".to_string()
}

fn default_manifest_file() -> String {
    "fetch-manifest.json".to_string()
}

fn default_base_url() -> String {
    "https://raw.githubusercontent.com/Tennismylife/TML-Database/master".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_start_year() -> i32 {
    1968
}

fn default_end_year() -> i32 {
    2025
}

fn default_extension() -> String {
    "csv".to_string()
}

fn default_pattern() -> String {
    "*.csv".to_string()
}

fn default_encodings() -> Vec<TextEncoding> {
    vec![TextEncoding::Utf8, TextEncoding::Latin1]
}
