//! Filesystem archive + HTTP fetch utilities for the bulletin archive.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aba_core::{ArchiveFileName, Bulletin, BulletinDocument, VersionSuffix, WeatherStation};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "aba-storage";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Single-attempt HTTP client. A failed fetch is reported, never retried.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    /// The whole body is buffered before returning, so a timeout mid-transfer
    /// never leaves a partial payload behind.
    pub async fn fetch_bytes(
        &self,
        run_id: Uuid,
        source_id: &str,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", %run_id, source_id, url);
        async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }

            let body = resp.bytes().await?.to_vec();
            debug!(status = status.as_u16(), bytes = body.len(), "fetched");
            Ok(FetchedResponse {
                final_url,
                body,
            })
        }
        .instrument(span)
        .await
    }

    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        run_id: Uuid,
        source_id: &str,
        url: &str,
    ) -> Result<T, FetchError> {
        let resp = self.fetch_bytes(run_id, source_id, url).await?;
        serde_json::from_slice(&resp.body).map_err(|source| FetchError::Decode {
            url: resp.final_url,
            source,
        })
    }
}

/// What happened to a downloaded PDF when it met the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No file existed for the date; stored as the base file.
    Created(PathBuf),
    /// Matches the base file (equal size, or equal bytes).
    Unchanged,
    /// A variant with the same suffix already holds these bytes.
    DuplicateVariant(PathBuf),
    /// Stored as a new same-day variant.
    Archived(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub slug: String,
    pub name: ArchiveFileName,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub deleted: usize,
    pub kept: usize,
}

/// The `pdfs/{slug}/{date}[_suffix].pdf` tree.
#[derive(Debug, Clone)]
pub struct PdfArchive {
    root: PathBuf,
}

impl PdfArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn region_dir(&self, slug: &str) -> PathBuf {
        self.root.join(slug)
    }

    pub fn path_for(&self, slug: &str, name: &ArchiveFileName) -> PathBuf {
        self.region_dir(slug).join(name.to_string())
    }

    /// Region directories present on disk, sorted. A missing root yields nothing.
    pub async fn list_region_slugs(&self) -> anyhow::Result<Vec<String>> {
        if !fs::try_exists(&self.root)
            .await
            .with_context(|| format!("checking {}", self.root.display()))?
        {
            return Ok(Vec::new());
        }

        let mut slugs = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("reading {}", self.root.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                slugs.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        slugs.sort();
        Ok(slugs)
    }

    /// Parsed PDFs of one region, sorted by file stem. Names that do not follow the
    /// archive scheme are logged and skipped.
    pub async fn list_entries(&self, slug: &str) -> anyhow::Result<Vec<ArchiveEntry>> {
        let dir = self.region_dir(slug);
        let mut out = Vec::new();
        for (file_name, path) in pdf_files(&dir).await? {
            match ArchiveFileName::parse(&file_name) {
                Some(name) => out.push(ArchiveEntry {
                    slug: slug.to_string(),
                    name,
                    path,
                }),
                None => warn!(slug, file_name, "ignoring pdf with unrecognized name"),
            }
        }
        out.sort_by_key(|e| e.name.stem());
        Ok(out)
    }

    /// Store `bytes` as the PDF for `date`, deciding between a new base file, a
    /// no-op, and a timestamped variant.
    ///
    /// Equal sizes count as identical content without a byte comparison. Freshly
    /// rendered PDFs differ in embedded IDs, so byte equality alone would archive
    /// a duplicate on every run.
    pub async fn reconcile(
        &self,
        slug: &str,
        date: NaiveDate,
        bytes: &[u8],
        published_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<ReconcileOutcome> {
        let dir = self.region_dir(slug);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;

        let base = ArchiveFileName::base(date);
        let temp_path = dir.join(format!(".{}.{}.tmp", base.stem(), Uuid::new_v4()));

        let result = match write_file(&temp_path, bytes).await {
            Ok(()) => self.settle(slug, &base, &temp_path, published_at).await,
            Err(err) => Err(err),
        };

        if fs::try_exists(&temp_path).await.unwrap_or(false) {
            if let Err(err) = fs::remove_file(&temp_path).await {
                warn!(path = %temp_path.display(), error = %err, "failed to remove temp pdf");
            }
        }
        result
    }

    async fn settle(
        &self,
        slug: &str,
        base: &ArchiveFileName,
        temp_path: &Path,
        published_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<ReconcileOutcome> {
        let base_path = self.path_for(slug, base);
        if !fs::try_exists(&base_path)
            .await
            .with_context(|| format!("checking {}", base_path.display()))?
        {
            rename(temp_path, &base_path).await?;
            return Ok(ReconcileOutcome::Created(base_path));
        }

        if file_len(&base_path).await? == file_len(temp_path).await? {
            return Ok(ReconcileOutcome::Unchanged);
        }
        if files_identical(&base_path, temp_path).await? {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let mut suffix = VersionSuffix::for_publication(published_at);
        loop {
            let name = ArchiveFileName::versioned(base.date, suffix.clone());
            let version_path = self.path_for(slug, &name);
            if !fs::try_exists(&version_path)
                .await
                .with_context(|| format!("checking {}", version_path.display()))?
            {
                rename(temp_path, &version_path).await?;
                return Ok(ReconcileOutcome::Archived(version_path));
            }
            if files_identical(&version_path, temp_path).await? {
                return Ok(ReconcileOutcome::DuplicateVariant(version_path));
            }
            suffix = suffix.disambiguated();
        }
    }

    /// Delete every region PDF whose file stem sorts before `cutoff` (ISO dates
    /// compare correctly as strings).
    pub async fn remove_before(&self, cutoff: NaiveDate) -> anyhow::Result<CleanupSummary> {
        let cutoff = cutoff.format("%Y-%m-%d").to_string();
        let mut summary = CleanupSummary::default();

        for slug in self.list_region_slugs().await? {
            for (file_name, path) in pdf_files(&self.region_dir(&slug)).await? {
                let stem = file_name.trim_end_matches(".pdf");
                if stem < cutoff.as_str() {
                    fs::remove_file(&path)
                        .await
                        .with_context(|| format!("deleting {}", path.display()))?;
                    debug!(slug, file_name, "deleted");
                    summary.deleted += 1;
                } else {
                    summary.kept += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Rename within a region. Returns `false` without touching anything when the
    /// target already exists.
    pub async fn rename(
        &self,
        slug: &str,
        from: &ArchiveFileName,
        to: &ArchiveFileName,
    ) -> anyhow::Result<bool> {
        let target = self.path_for(slug, to);
        if fs::try_exists(&target)
            .await
            .with_context(|| format!("checking {}", target.display()))?
        {
            return Ok(false);
        }
        rename(&self.path_for(slug, from), &target).await?;
        Ok(true)
    }
}

async fn pdf_files(dir: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    if !fs::try_exists(dir)
        .await
        .with_context(|| format!("checking {}", dir.display()))?
    {
        return Ok(out);
    }
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("reading {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().to_string();
        if file_name.ends_with(".pdf") && entry.file_type().await?.is_file() {
            out.push((file_name, entry.path()));
        }
    }
    out.sort();
    Ok(out)
}

async fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

async fn rename(from: &Path, to: &Path) -> anyhow::Result<()> {
    fs::rename(from, to)
        .await
        .with_context(|| format!("renaming {} -> {}", from.display(), to.display()))
}

async fn file_len(path: &Path) -> anyhow::Result<u64> {
    Ok(fs::metadata(path)
        .await
        .with_context(|| format!("stat {}", path.display()))?
        .len())
}

async fn files_identical(a: &Path, b: &Path) -> anyhow::Result<bool> {
    let left = fs::read(a)
        .await
        .with_context(|| format!("reading {}", a.display()))?;
    let right = fs::read(b)
        .await
        .with_context(|| format!("reading {}", b.display()))?;
    Ok(left == right)
}

/// `weather_stations.json`: one pretty-printed array of station records.
#[derive(Debug, Clone)]
pub struct WeatherStore {
    path: PathBuf,
}

impl WeatherStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files start the series fresh.
    pub async fn load(&self) -> Vec<WeatherStation> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "could not read existing weather data, starting fresh");
                return Vec::new();
            }
        };
        match serde_json::from_str(&text) {
            Ok(stations) => stations,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "could not parse existing weather data, starting fresh");
                Vec::new()
            }
        }
    }

    pub async fn save(&self, stations: &[WeatherStation]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(stations).context("serializing weather stations")?;
        let temp_path = self
            .path
            .with_file_name(format!(".weather.{}.tmp", Uuid::new_v4()));
        if let Err(err) = write_file(&temp_path, &bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err);
        }
        if let Err(err) = rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err);
        }
        Ok(())
    }
}

/// `bulletin_cache/{prefix}_{date}.json` files written by the upstream bulletin fetch.
#[derive(Debug, Clone)]
pub struct BulletinCache {
    dir: PathBuf,
}

impl BulletinCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, prefix: &str, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", prefix, date.format("%Y-%m-%d")))
    }

    /// `Ok(None)` when no cache file exists for the prefix/date pair.
    pub async fn load(&self, prefix: &str, date: NaiveDate) -> anyhow::Result<Option<Vec<Bulletin>>> {
        let path = self.path_for(prefix, date);
        if !fs::try_exists(&path)
            .await
            .with_context(|| format!("checking {}", path.display()))?
        {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let doc: BulletinDocument =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(doc.into_bulletins()))
    }
}
