//! Fetching sample source text from allowlisted hosts.

use anyhow::{anyhow, bail, Context, Result};
use futures::future::BoxFuture;
use std::time::Duration;
use url::Url;

pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["github.com", "raw.githubusercontent.com"];
const FETCH_TIMEOUT_SECS: u64 = 30;

pub trait CodeFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Rewrite `github.com/<owner>/<repo>/blob/<ref>/<path>` to the raw content URL.
/// Other URLs are returned unchanged.
pub fn to_raw_url(url: &Url) -> Url {
    if url.host_str() != Some("github.com") {
        return url.clone();
    }
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    match segments.as_slice() {
        [owner, repo, "blob", git_ref, rest @ ..] if !rest.is_empty() => {
            let raw = format!(
                "https://raw.githubusercontent.com/{}/{}/{}/{}",
                owner,
                repo,
                git_ref,
                rest.join("/")
            );
            Url::parse(&raw).unwrap_or_else(|_| url.clone())
        }
        _ => url.clone(),
    }
}

pub struct GithubFetcher {
    http: reqwest::Client,
    allowed_hosts: Vec<String>,
}

impl GithubFetcher {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
        })
    }

    pub fn with_allowed_hosts(
        mut self,
        hosts: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.allowed_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Parse and check scheme and host; returns the URL to download.
    pub fn validate(&self, raw: &str) -> Result<Url> {
        let url = Url::parse(raw.trim()).with_context(|| format!("Invalid URL '{}'", raw))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Unsupported URL scheme '{}'", url.scheme());
        }
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("URL '{}' has no host", raw))?;
        if !self.allowed_hosts.iter().any(|allowed| allowed == host) {
            bail!("Host '{}' is not allowed (allowed: {})", host, self.allowed_hosts.join(", "));
        }
        Ok(to_raw_url(&url))
    }

    async fn download(&self, raw: &str) -> Result<String> {
        let url = self.validate(raw)?;
        tracing::debug!(%url, "fetching sample");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to fetch '{}'", url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("Fetching '{}' failed with status {}", url, status);
        }
        response
            .text()
            .await
            .with_context(|| format!("Failed to read body of '{}'", url))
    }
}

impl CodeFetcher for GithubFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.download(url))
    }
}
