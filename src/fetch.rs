use crate::config::{FetchConfig, TransportErrorPolicy, validate_resource_name};
use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    Downloaded { bytes: usize, sha256: String },
    HttpFailure { status: u16 },
    TransportFailure { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRecord {
    pub name: String,
    pub url: String,
    #[serde(flatten)]
    pub outcome: FetchOutcome,
}

impl FetchRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Downloaded { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchReport {
    pub records: Vec<FetchRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted_at: Option<String>,
}

impl FetchReport {
    pub fn attempted(&self) -> usize {
        self.records.len()
    }

    pub fn downloaded(&self) -> usize {
        self.records.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.downloaded()
    }
}

pub struct Fetcher {
    client: Client,
    base_url: String,
    on_transport_error: TransportErrorPolicy,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (k, v) in &config.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .with_context(|| format!("invalid header name {k}"))?;
            let value =
                HeaderValue::from_str(v).with_context(|| format!("invalid header value for {k}"))?;
            headers.insert(name, value);
        }

        if let Some(user_agent) = &config.user_agent {
            headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        }

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers);
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().context("failed to build reqwest client")?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            on_transport_error: config.on_transport_error,
        })
    }

    /// Non-200 responses never stop the batch. Under
    /// [`TransportErrorPolicy::Abort`] the first transport error is recorded,
    /// `aborted_at` is set and the remaining names are not attempted.
    pub fn fetch_all(&self, names: &[String], dest_dir: &Path) -> Result<FetchReport> {
        std::fs::create_dir_all(dest_dir)
            .with_context(|| format!("failed to create download dir {}", dest_dir.display()))?;

        let mut report = FetchReport::default();
        for name in names {
            let url = resource_url(&self.base_url, name)?;
            let outcome = match self.request(&url) {
                Ok(Ok(body)) => {
                    let path = dest_dir.join(name);
                    std::fs::write(&path, &body)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(file = %name, bytes = body.len(), "downloaded");
                    FetchOutcome::Downloaded {
                        bytes: body.len(),
                        sha256: hex::encode(Sha256::digest(&body)),
                    }
                }
                Ok(Err(status)) => {
                    warn!(file = %name, %url, status = status.as_u16(), "download failed");
                    FetchOutcome::HttpFailure {
                        status: status.as_u16(),
                    }
                }
                Err(err) => {
                    let error = format!("{err:#}");
                    if self.on_transport_error == TransportErrorPolicy::Abort {
                        warn!(file = %name, %url, %error, "download errored; aborting");
                        report.aborted_at = Some(name.clone());
                    } else {
                        warn!(file = %name, %url, %error, "download errored; skipping");
                    }
                    FetchOutcome::TransportFailure { error }
                }
            };

            report.records.push(FetchRecord {
                name: name.clone(),
                url,
                outcome,
            });
            if report.aborted_at.is_some() {
                break;
            }
        }

        Ok(report)
    }

    /// Outer `Err` is a transport failure; inner `Err` is any status other
    /// than 200.
    fn request(&self, url: &str) -> Result<std::result::Result<Vec<u8>, StatusCode>> {
        let resp = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request to {url} failed"))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Ok(Err(status));
        }

        let body = resp
            .bytes()
            .with_context(|| format!("failed to read body from {url}"))?;
        Ok(Ok(body.to_vec()))
    }
}

pub fn resource_url(base_url: &str, name: &str) -> Result<String> {
    validate_resource_name(name)?;
    let mut url = Url::parse(base_url).with_context(|| format!("invalid base_url {base_url}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("base_url cannot carry a path: {base_url}"))?
        .pop_if_empty()
        .push(name);
    Ok(url.to_string())
}
