//! Run orchestration: weather merge, PDF ingestion, cleanup and legacy-name migration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aba_core::{
    ArchiveConfig, ArchiveFileName, Bulletin, BulletinSource, StationConfig, VersionSuffix,
    WeatherSample, WeatherStation,
};
use aba_sources::{adapter_for_source, fetch_station_samples, match_bulletin, FetchContext, MatchedBulletin};
use aba_storage::{
    BulletinCache, CleanupSummary, HttpClientConfig, HttpFetcher, PdfArchive, ReconcileOutcome,
    WeatherStore,
};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "aba-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub archive_config_path: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub scheduler_enabled: bool,
    pub weather_cron: String,
    pub pdf_cron: String,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("ABA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            output_dir: std::env::var("ABA_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            archive_config_path: std::env::var("ABA_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./archive.yaml")),
            user_agent: std::env::var("ABA_USER_AGENT").unwrap_or_else(|_| "aba-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("ABA_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            scheduler_enabled: std::env::var("ABA_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            weather_cron: std::env::var("ABA_WEATHER_CRON")
                .unwrap_or_else(|_| "0 */30 * * * *".to_string()),
            pdf_cron: std::env::var("ABA_PDF_CRON").unwrap_or_else(|_| "0 0 * * * *".to_string()),
        }
    }

    /// Paths rooted at `data_dir`, everything else at defaults.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::from_env()
        }
    }

    pub fn pdfs_dir(&self) -> PathBuf {
        self.data_dir.join("pdfs")
    }

    pub fn weather_path(&self) -> PathBuf {
        self.data_dir.join("weather_stations.json")
    }

    pub fn incidents_path(&self) -> PathBuf {
        self.data_dir.join("incidents.json")
    }

    pub fn bulletin_cache_dir(&self) -> PathBuf {
        self.data_dir.join("bulletin_cache")
    }

    fn http_fetcher(&self) -> Result<HttpFetcher> {
        HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
        })
    }
}

pub fn parse_archive_config(yaml: &str) -> Result<ArchiveConfig> {
    serde_yaml::from_str(yaml).context("parsing archive config")
}

/// Reads `archive.yaml`; without one the built-in Allgäu setup applies.
pub async fn load_archive_config(path: &Path) -> Result<ArchiveConfig> {
    if !fs::try_exists(path)
        .await
        .with_context(|| format!("checking {}", path.display()))?
    {
        info!(path = %path.display(), "no archive config, using built-in regions and stations");
        return Ok(ArchiveConfig::default());
    }
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    parse_archive_config(&text).with_context(|| format!("loading {}", path.display()))
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

/// Merge `fresh` into `existing` keyed by `TS` (fresh wins), sort ascending by
/// timestamp and keep the newest `retention` samples. Unparsable timestamps
/// sort first and are the first to be dropped.
pub fn merge_samples(
    existing: &[WeatherSample],
    fresh: Vec<WeatherSample>,
    retention: usize,
) -> Vec<WeatherSample> {
    let mut merged: Vec<WeatherSample> = Vec::with_capacity(existing.len() + fresh.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for sample in existing.iter().cloned().chain(fresh) {
        match index.get(&sample.ts) {
            Some(&i) => merged[i] = sample,
            None => {
                index.insert(sample.ts.clone(), merged.len());
                merged.push(sample);
            }
        }
    }

    merged.sort_by_cached_key(|s| s.timestamp());
    let excess = merged.len().saturating_sub(retention);
    merged.drain(..excess);
    merged
}

/// New record for one station after a fetch attempt. A failed fetch keeps the
/// previous record untouched, or records the error if there is none.
pub fn merge_station(
    station: &StationConfig,
    previous: Option<&WeatherStation>,
    fetched: std::result::Result<Vec<WeatherSample>, String>,
    retention: usize,
    now: DateTime<Utc>,
) -> WeatherStation {
    match fetched {
        Ok(samples) => {
            let existing = previous.map(|p| p.data.as_slice()).unwrap_or_default();
            WeatherStation {
                last_updated: Some(now.to_rfc3339()),
                data: merge_samples(existing, samples, retention),
                ..WeatherStation::from_config(station)
            }
        }
        Err(message) => match previous {
            Some(previous) => previous.clone(),
            None => WeatherStation {
                error: Some(message),
                ..WeatherStation::from_config(station)
            },
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stations: usize,
    pub refreshed: usize,
    pub stale: usize,
    pub output: String,
}

pub struct WeatherPipeline {
    stations: Vec<StationConfig>,
    retention: usize,
    http: Arc<HttpFetcher>,
    store: WeatherStore,
}

impl WeatherPipeline {
    pub fn new(config: &SyncConfig, archive: &ArchiveConfig) -> Result<Self> {
        Ok(Self {
            stations: archive.stations.clone(),
            retention: archive.weather_retention,
            http: Arc::new(config.http_fetcher()?),
            store: WeatherStore::new(config.weather_path()),
        })
    }

    /// Fetch every station concurrently and persist the merged series. Only a
    /// failure to write the output is fatal.
    pub async fn run_once(&self) -> Result<WeatherRunSummary> {
        let ctx = FetchContext::new(Uuid::new_v4());
        let run_id = ctx.run_id;
        let started_at = ctx.fetched_at;
        let span = info_span!("weather_run", %run_id);

        async {
            info!(stations = self.stations.len(), "fetching weather station data");
            let existing = self.store.load().await;

            let mut tasks = JoinSet::new();
            for (idx, station) in self.stations.iter().cloned().enumerate() {
                let http = Arc::clone(&self.http);
                let ctx = ctx.clone();
                tasks.spawn(async move {
                    info!(station = %station.name, "fetching");
                    let result = fetch_station_samples(&http, &ctx, &station)
                        .await
                        .map_err(|err| err.to_string());
                    (idx, result)
                });
            }

            let mut fetched: Vec<Option<std::result::Result<Vec<WeatherSample>, String>>> =
                (0..self.stations.len()).map(|_| None).collect();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((idx, result)) => fetched[idx] = Some(result),
                    Err(err) => error!(error = %err, "station fetch task aborted"),
                }
            }

            let now = Utc::now();
            let mut refreshed = 0usize;
            let mut results = Vec::with_capacity(self.stations.len());
            for (station, result) in self.stations.iter().zip(fetched) {
                let result = result.unwrap_or_else(|| Err("fetch task did not complete".to_string()));
                match &result {
                    Ok(samples) => {
                        refreshed += 1;
                        info!(station = %station.name, samples = samples.len(), "fetched");
                    }
                    Err(message) => {
                        error!(station = %station.name, error = %message, "failed to fetch station, keeping previous data");
                    }
                }
                let previous = existing.iter().find(|s| s.id == station.id);
                results.push(merge_station(station, previous, result, self.retention, now));
            }

            self.store
                .save(&results)
                .await
                .with_context(|| format!("writing {}", self.store.path().display()))?;
            info!(path = %self.store.path().display(), "wrote weather data");

            Ok(WeatherRunSummary {
                run_id,
                started_at,
                finished_at: Utc::now(),
                stations: self.stations.len(),
                refreshed,
                stale: self.stations.len() - refreshed,
                output: self.store.path().display().to_string(),
            })
        }
        .instrument(span)
        .await
    }
}

// ---------------------------------------------------------------------------
// PDFs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PdfRunSummary {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub bulletins_seen: usize,
    pub bulletins_matched: usize,
    pub created: usize,
    pub archived: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl PdfRunSummary {
    fn new(run_id: Uuid, date: NaiveDate) -> Self {
        Self {
            run_id,
            date,
            bulletins_seen: 0,
            bulletins_matched: 0,
            created: 0,
            archived: 0,
            unchanged: 0,
            failed: 0,
        }
    }

    fn record(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Created(_) => self.created += 1,
            ReconcileOutcome::Archived(_) => self.archived += 1,
            ReconcileOutcome::Unchanged | ReconcileOutcome::DuplicateVariant(_) => {
                self.unchanged += 1
            }
        }
    }
}

pub struct PdfPipeline {
    archive: ArchiveConfig,
    http: HttpFetcher,
    pdfs: PdfArchive,
    cache: BulletinCache,
}

impl PdfPipeline {
    pub fn new(config: &SyncConfig, archive: ArchiveConfig) -> Result<Self> {
        Ok(Self {
            archive,
            http: config.http_fetcher()?,
            pdfs: PdfArchive::new(config.pdfs_dir()),
            cache: BulletinCache::new(config.bulletin_cache_dir()),
        })
    }

    /// Process every cached bulletin document for `date`, one per region family.
    pub async fn run_for_date(&self, date: NaiveDate) -> Result<PdfRunSummary> {
        let ctx = FetchContext::new(Uuid::new_v4());
        let mut summary = PdfRunSummary::new(ctx.run_id, date);

        for (prefix, source) in self.archive.cache_prefixes() {
            let bulletins = match self.cache.load(&prefix, date).await {
                Ok(Some(bulletins)) => bulletins,
                Ok(None) => {
                    info!(prefix = %prefix, %date, "no cached bulletins");
                    continue;
                }
                Err(err) => {
                    error!(prefix = %prefix, %date, error = %format!("{err:#}"), "failed to read bulletin cache");
                    continue;
                }
            };
            for bulletin in &bulletins {
                self.process_bulletin(&ctx, bulletin, date, source, &mut summary)
                    .await;
            }
        }
        Ok(summary)
    }

    /// Process an explicit list of bulletins, all rendered by `source`.
    pub async fn run_bulletins(
        &self,
        date: NaiveDate,
        bulletins: &[Bulletin],
        source: BulletinSource,
    ) -> PdfRunSummary {
        let ctx = FetchContext::new(Uuid::new_v4());
        let mut summary = PdfRunSummary::new(ctx.run_id, date);
        for bulletin in bulletins {
            self.process_bulletin(&ctx, bulletin, date, source, &mut summary)
                .await;
        }
        summary
    }

    /// Download the bulletin's PDF and reconcile it into every matched region.
    /// Failures are logged and counted, never propagated.
    pub async fn process_bulletin(
        &self,
        ctx: &FetchContext,
        bulletin: &Bulletin,
        date: NaiveDate,
        source: BulletinSource,
        summary: &mut PdfRunSummary,
    ) {
        summary.bulletins_seen += 1;
        let Some(matched) = match_bulletin(bulletin, &self.archive.regions) else {
            return;
        };
        summary.bulletins_matched += 1;

        let adapter = adapter_for_source(source);
        info!(
            bulletin = matched.uuid,
            regions = %matched.slugs().join(", "),
            url = %adapter.pdf_url(matched.uuid, &bulletin.regions),
            "found relevant bulletin"
        );

        match adapter.fetch_pdf(&self.http, ctx, bulletin).await {
            Ok(pdf) => {
                info!(bulletin = matched.uuid, url = %pdf.url, bytes = pdf.bytes.len(), "downloaded pdf");
                self.store_for_regions(&matched, date, &pdf.bytes, summary).await
            }
            Err(err) => {
                error!(bulletin = matched.uuid, error = %err, "failed to download pdf");
                summary.failed += matched.regions.len();
            }
        }
    }

    async fn store_for_regions(
        &self,
        matched: &MatchedBulletin<'_>,
        date: NaiveDate,
        bytes: &[u8],
        summary: &mut PdfRunSummary,
    ) {
        let published_at = matched.bulletin.published_at();
        for region in &matched.regions {
            match self.pdfs.reconcile(&region.slug, date, bytes, published_at).await {
                Ok(outcome) => {
                    match &outcome {
                        ReconcileOutcome::Created(path) => {
                            info!(slug = %region.slug, path = %path.display(), "downloaded")
                        }
                        ReconcileOutcome::Archived(path) => {
                            info!(slug = %region.slug, path = %path.display(), "update detected, archived")
                        }
                        ReconcileOutcome::DuplicateVariant(path) => {
                            info!(slug = %region.slug, path = %path.display(), "update matches existing variant, skipping")
                        }
                        ReconcileOutcome::Unchanged => {}
                    }
                    summary.record(&outcome);
                }
                Err(err) => {
                    error!(slug = %region.slug, %date, error = %format!("{err:#}"), "failed to store pdf");
                    summary.failed += 1;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Cleanup + migration
// ---------------------------------------------------------------------------

pub async fn run_cleanup(pdfs: &PdfArchive, cutoff: NaiveDate) -> Result<CleanupSummary> {
    if !fs::try_exists(pdfs.root()).await.unwrap_or(false) {
        info!(path = %pdfs.root().display(), "pdf directory not found");
        return Ok(CleanupSummary::default());
    }
    info!(%cutoff, path = %pdfs.root().display(), "cleaning up pdfs older than cutoff");
    let summary = pdfs.remove_before(cutoff).await?;
    info!(deleted = summary.deleted, kept = summary.kept, "cleanup complete");
    Ok(summary)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub renamed: usize,
    pub skipped: usize,
}

/// Publication time of the first cached bulletin covering `region_id` on `date`.
async fn cached_publication_time(
    cache: &BulletinCache,
    prefix: &str,
    region_id: &str,
    date: NaiveDate,
) -> Option<DateTime<Utc>> {
    let bulletins = match cache.load(prefix, date).await {
        Ok(Some(bulletins)) => bulletins,
        Ok(None) => return None,
        Err(err) => {
            error!(prefix, %date, error = %format!("{err:#}"), "error reading bulletin cache");
            return None;
        }
    };
    bulletins
        .iter()
        .find(|b| b.covers(region_id))
        .and_then(Bulletin::published_at)
}

/// Rename legacy `{date}_v2.pdf` files to `{date}_{YYYYMMDD-HHMM}.pdf` using the
/// publication time recorded in the bulletin cache.
pub async fn run_migration(
    pdfs: &PdfArchive,
    cache: &BulletinCache,
    archive: &ArchiveConfig,
) -> Result<MigrationSummary> {
    let mut summary = MigrationSummary::default();

    for slug in pdfs.list_region_slugs().await? {
        let Some(region) = archive.region_by_slug(&slug) else {
            continue;
        };

        for entry in pdfs.list_entries(&slug).await? {
            let is_legacy = entry.name.suffix.as_ref().is_some_and(VersionSuffix::is_legacy);
            if !is_legacy {
                continue;
            }

            let from = entry.name.to_string();
            let Some(published_at) = cached_publication_time(
                cache,
                &region.cache_prefix,
                &region.region_id,
                entry.name.date,
            )
            .await
            else {
                warn!(slug = %slug, file = %from, "no cached publication time");
                summary.skipped += 1;
                continue;
            };

            let target = ArchiveFileName::versioned(
                entry.name.date,
                VersionSuffix::for_publication(Some(published_at)),
            );
            if pdfs.rename(&slug, &entry.name, &target).await? {
                info!(slug = %slug, from = %from, to = %target, "renamed");
                summary.renamed += 1;
            } else {
                warn!(slug = %slug, from = %from, to = %target, "target already exists, leaving file in place");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub async fn run_weather_from_env() -> Result<WeatherRunSummary> {
    let config = SyncConfig::from_env();
    let archive = load_archive_config(&config.archive_config_path).await?;
    WeatherPipeline::new(&config, &archive)?.run_once().await
}

pub async fn run_pdfs_from_env(date: Option<NaiveDate>) -> Result<PdfRunSummary> {
    let config = SyncConfig::from_env();
    let archive = load_archive_config(&config.archive_config_path).await?;
    PdfPipeline::new(&config, archive)?
        .run_for_date(date.unwrap_or_else(today_utc))
        .await
}

pub async fn run_pdfs_for_document_from_env(
    date: NaiveDate,
    bulletins: &[Bulletin],
    source: BulletinSource,
) -> Result<PdfRunSummary> {
    let config = SyncConfig::from_env();
    let archive = load_archive_config(&config.archive_config_path).await?;
    Ok(PdfPipeline::new(&config, archive)?
        .run_bulletins(date, bulletins, source)
        .await)
}

pub async fn run_cleanup_from_env(cutoff: Option<NaiveDate>) -> Result<CleanupSummary> {
    let config = SyncConfig::from_env();
    let archive = load_archive_config(&config.archive_config_path).await?;
    run_cleanup(
        &PdfArchive::new(config.pdfs_dir()),
        cutoff.unwrap_or(archive.cleanup_cutoff),
    )
    .await
}

pub async fn run_migration_from_env() -> Result<MigrationSummary> {
    let config = SyncConfig::from_env();
    let archive = load_archive_config(&config.archive_config_path).await?;
    run_migration(
        &PdfArchive::new(config.pdfs_dir()),
        &BulletinCache::new(config.bulletin_cache_dir()),
        &archive,
    )
    .await
}

/// Cron-driven weather and PDF runs, if enabled in the config.
pub async fn maybe_build_scheduler(
    config: &SyncConfig,
    archive: &ArchiveConfig,
) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;

    let weather_config = config.clone();
    let weather_archive = archive.clone();
    let weather_job = Job::new_async(config.weather_cron.as_str(), move |_uuid, _l| {
        let config = weather_config.clone();
        let archive = weather_archive.clone();
        Box::pin(async move {
            let result = match WeatherPipeline::new(&config, &archive) {
                Ok(pipeline) => pipeline.run_once().await.map(|_| ()),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                error!(error = %format!("{err:#}"), "scheduled weather run failed");
            }
        })
    })
    .with_context(|| format!("creating weather job for cron {}", config.weather_cron))?;
    sched.add(weather_job).await.context("adding weather job")?;

    let pdf_config = config.clone();
    let pdf_archive = archive.clone();
    let pdf_job = Job::new_async(config.pdf_cron.as_str(), move |_uuid, _l| {
        let config = pdf_config.clone();
        let archive = pdf_archive.clone();
        Box::pin(async move {
            let result = match PdfPipeline::new(&config, archive) {
                Ok(pipeline) => pipeline.run_for_date(today_utc()).await.map(|_| ()),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                error!(error = %format!("{err:#}"), "scheduled pdf run failed");
            }
        })
    })
    .with_context(|| format!("creating pdf job for cron {}", config.pdf_cron))?;
    sched.add(pdf_job).await.context("adding pdf job")?;

    Ok(Some(sched))
}

/// Run the scheduler until Ctrl-C.
pub async fn run_scheduler_from_env() -> Result<()> {
    let config = SyncConfig::from_env();
    let archive = load_archive_config(&config.archive_config_path).await?;
    let Some(mut sched) = maybe_build_scheduler(&config, &archive).await? else {
        warn!("scheduler disabled; set ABA_SCHEDULER_ENABLED=true");
        return Ok(());
    };
    sched.start().await.context("starting scheduler")?;
    info!(weather = %config.weather_cron, pdfs = %config.pdf_cron, "scheduler running");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aba_core::RegionConfig;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample(ts: &str, hs: i64) -> WeatherSample {
        serde_json::from_value(json!({ "TS": ts, "HS": hs })).unwrap()
    }

    fn ten_minute_series(start: usize, count: usize) -> Vec<WeatherSample> {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap();
        (start..start + count)
            .map(|i| {
                let ts = base + chrono::Duration::minutes(10 * i as i64);
                sample(&ts.format("%Y-%m-%dT%H:%M:%S").to_string(), i as i64)
            })
            .collect()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn merge_dedups_by_timestamp_and_prefers_new_data() {
        let existing = vec![sample("2025-01-15T10:10:00", 1), sample("2025-01-15T10:00:00", 1)];
        let fresh = vec![sample("2025-01-15T10:10:00", 2), sample("2025-01-15T10:20:00", 2)];

        let merged = merge_samples(&existing, fresh, 1100);

        let ts = merged.iter().map(|s| s.ts.as_str()).collect::<Vec<_>>();
        assert_eq!(ts, vec!["2025-01-15T10:00:00", "2025-01-15T10:10:00", "2025-01-15T10:20:00"]);
        assert_eq!(merged[1].metrics["HS"], 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let fresh = ten_minute_series(0, 50);
        let once = merge_samples(&[], fresh.clone(), 1100);
        let twice = merge_samples(&once, fresh, 1100);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_keeps_only_most_recent_samples() {
        let existing = ten_minute_series(0, 1000);
        let merged = merge_samples(&existing, ten_minute_series(900, 300), 1100);
        assert_eq!(merged.len(), 1100);
        assert_eq!(merged.first().unwrap().metrics["HS"], 100);
        assert_eq!(merged.last().unwrap().metrics["HS"], 1199);
    }

    #[test]
    fn failed_fetch_keeps_previous_record() {
        let station = ArchiveConfig::default().stations[0].clone();
        let now = Utc::now();
        let previous = WeatherStation {
            last_updated: Some("2025-01-15T10:00:00+00:00".into()),
            data: vec![sample("2025-01-15T10:00:00", 1)],
            ..WeatherStation::from_config(&station)
        };

        let kept = merge_station(&station, Some(&previous), Err("timeout".into()), 1100, now);
        assert_eq!(kept, previous);

        let fresh = merge_station(&station, None, Err("timeout".into()), 1100, now);
        assert_eq!(fresh.error.as_deref(), Some("timeout"));
        assert!(fresh.data.is_empty());

        let refreshed = merge_station(
            &station,
            Some(&previous),
            Ok(vec![sample("2025-01-15T10:10:00", 2)]),
            1100,
            now,
        );
        assert_eq!(refreshed.data.len(), 2);
        assert_eq!(refreshed.last_updated, Some(now.to_rfc3339()));
        assert_eq!(refreshed.api_url, station.api_url);
    }

    #[tokio::test]
    async fn weather_run_isolates_station_failures() {
        let dir = tempdir().expect("tempdir");
        let config = SyncConfig::with_data_dir(dir.path());
        let mut archive = ArchiveConfig::default();
        for station in &mut archive.stations {
            station.api_url = format!("http://127.0.0.1:1/{}", station.id);
        }

        let previous = WeatherStation {
            last_updated: Some("2025-01-15T10:00:00+00:00".into()),
            data: vec![sample("2025-01-15T10:00:00", 120)],
            ..WeatherStation::from_config(&archive.stations[1])
        };
        WeatherStore::new(config.weather_path())
            .save(&[previous.clone()])
            .await
            .unwrap();

        let summary = WeatherPipeline::new(&config, &archive)
            .unwrap()
            .run_once()
            .await
            .unwrap();
        assert_eq!(summary.stations, 4);
        assert_eq!(summary.refreshed, 0);
        assert_eq!(summary.stale, 4);

        let saved = WeatherStore::new(config.weather_path()).load().await;
        let ids = saved.iter().map(|s| s.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["7", "8", "4", "19"]);
        let errors = saved.iter().map(|s| s.error.is_some()).collect::<Vec<_>>();
        assert_eq!(errors, vec![true, false, true, true]);
        assert_eq!(saved[1], previous);
        assert!(saved[0].data.is_empty());
    }

    #[test]
    fn archive_config_yaml_overrides_defaults() {
        let config = parse_archive_config(
            r#"
regions:
  - region_id: DE-BY-11
    slug: allgau-prealps
    label: Allgäu Prealps
    source: lawinen-warnung
    cache_prefix: DE-BY
cleanup_cutoff: 2025-10-01
"#,
        )
        .unwrap();
        assert_eq!(config.regions.len(), 1);
        assert_eq!(config.regions[0].source, BulletinSource::LawinenWarnung);
        assert_eq!(config.stations.len(), 4);
        assert_eq!(config.cleanup_cutoff, day(2025, 10, 1));
        assert_eq!(config.weather_retention, 1100);
    }

    #[tokio::test]
    async fn missing_archive_config_uses_defaults() {
        let dir = tempdir().expect("tempdir");
        let config = load_archive_config(&dir.path().join("archive.yaml")).await.unwrap();
        assert_eq!(config, ArchiveConfig::default());
    }

    #[tokio::test]
    async fn shipped_archive_config_matches_builtin_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../archive.yaml");
        let config = load_archive_config(&path).await.unwrap();
        assert_eq!(config, ArchiveConfig::default());
    }

    #[tokio::test]
    async fn store_for_regions_writes_each_matched_slug() {
        let dir = tempdir().expect("tempdir");
        let config = SyncConfig::with_data_dir(dir.path());
        let pipeline = PdfPipeline::new(&config, ArchiveConfig::default()).unwrap();
        let bulletin = Bulletin {
            id: Some("b1".into()),
            regions: vec!["DE-BY-11".into(), "DE-BY-12".into()],
            publication_time: Some("2025-01-15T16:00:00Z".into()),
            ..Default::default()
        };
        let regions = ArchiveConfig::default().regions;
        let matched = match_bulletin(&bulletin, &regions).unwrap();
        let mut summary = PdfRunSummary::new(Uuid::new_v4(), day(2025, 1, 15));

        pipeline
            .store_for_regions(&matched, day(2025, 1, 15), b"first", &mut summary)
            .await;
        pipeline
            .store_for_regions(&matched, day(2025, 1, 15), b"revised bulletin", &mut summary)
            .await;

        assert_eq!(summary.created, 2);
        assert_eq!(summary.archived, 2);
        let pdfs = config.pdfs_dir();
        assert!(pdfs.join("allgau-prealps/2025-01-15.pdf").exists());
        assert!(pdfs.join("allgau-alps-central/2025-01-15_20250115-1600.pdf").exists());
    }

    #[tokio::test]
    async fn pdf_run_without_cache_processes_nothing() {
        let dir = tempdir().expect("tempdir");
        let config = SyncConfig::with_data_dir(dir.path());
        let pipeline = PdfPipeline::new(&config, ArchiveConfig::default()).unwrap();
        let summary = pipeline.run_for_date(day(2025, 1, 15)).await.unwrap();
        assert_eq!(summary.bulletins_seen, 0);
    }

    #[tokio::test]
    async fn unmatched_bulletins_are_counted_but_not_fetched() {
        let dir = tempdir().expect("tempdir");
        let config = SyncConfig::with_data_dir(dir.path());
        let pipeline = PdfPipeline::new(&config, ArchiveConfig::default()).unwrap();
        let bulletins = vec![Bulletin {
            id: Some("elsewhere".into()),
            regions: vec!["DE-BY-31".into()],
            ..Default::default()
        }];
        let summary = pipeline
            .run_bulletins(day(2025, 1, 15), &bulletins, BulletinSource::LawinenWarnung)
            .await;
        assert_eq!(summary.bulletins_seen, 1);
        assert_eq!(summary.bulletins_matched, 0);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn migration_renames_legacy_files_from_cache() {
        let dir = tempdir().expect("tempdir");
        let pdfs = PdfArchive::new(dir.path().join("pdfs"));
        let cache_dir = dir.path().join("bulletin_cache");
        let cache = BulletinCache::new(&cache_dir);
        let archive = ArchiveConfig {
            regions: vec![RegionConfig {
                region_id: "AT-08-01".into(),
                slug: "allgau-alps-west".into(),
                label: "Kleinwalsertal".into(),
                source: BulletinSource::LawinenWarnung,
                cache_prefix: "AT-08".into(),
            }],
            ..ArchiveConfig::default()
        };

        let region = pdfs.region_dir("allgau-alps-west");
        std::fs::create_dir_all(&region).unwrap();
        std::fs::create_dir_all(&cache_dir).unwrap();
        for name in ["2025-01-15.pdf", "2025-01-15_v2.pdf", "2025-01-16_v2.pdf"] {
            std::fs::write(region.join(name), name).unwrap();
        }
        std::fs::write(
            cache.path_for("AT-08", day(2025, 1, 15)),
            r#"{"bulletins": [{"id": "x", "regions": ["AT-08-01"], "publicationTime": "2025-01-15T06:30:00+01:00"}]}"#,
        )
        .unwrap();

        let summary = run_migration(&pdfs, &cache, &archive).await.unwrap();

        assert_eq!(summary, MigrationSummary { renamed: 1, skipped: 1 });
        assert!(region.join("2025-01-15_20250115-0530.pdf").exists());
        assert!(!region.join("2025-01-15_v2.pdf").exists());
        assert!(region.join("2025-01-16_v2.pdf").exists());
        assert!(region.join("2025-01-15.pdf").exists());
    }

    #[tokio::test]
    async fn cleanup_on_missing_tree_reports_nothing() {
        let dir = tempdir().expect("tempdir");
        let summary = run_cleanup(&PdfArchive::new(dir.path().join("pdfs")), day(2026, 1, 1))
            .await
            .unwrap();
        assert_eq!(summary, CleanupSummary::default());
    }
}
