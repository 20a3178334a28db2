//! Upstream adapters: bulletin PDF endpoints and weather-station telemetry.

use std::fs;
use std::path::Path;

use aba_core::{Bulletin, BulletinDocument, BulletinSource, RegionConfig, StationConfig, WeatherSample};
use aba_storage::{FetchError, HttpFetcher};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "aba-sources";

const LAWINEN_WARNUNG_API: &str = "https://admin.lawinen-warnung.eu/albina/api";
const AVALANCHE_REPORT_API: &str = "https://api.avalanche.report/albina/api";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
}

impl FetchContext {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            fetched_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("bulletin has no id")]
    MissingId,
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Clone)]
pub struct FetchedPdf {
    pub url: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait BulletinPdfAdapter: Send + Sync {
    fn source(&self) -> BulletinSource;

    fn pdf_url(&self, bulletin_id: &str, region_ids: &[String]) -> String;

    async fn fetch_pdf(
        &self,
        http: &HttpFetcher,
        ctx: &FetchContext,
        bulletin: &Bulletin,
    ) -> Result<FetchedPdf, SourceError> {
        let uuid = bulletin.uuid().ok_or(SourceError::MissingId)?;
        let url = self.pdf_url(uuid, &bulletin.regions);
        let resp = http
            .fetch_bytes(ctx.run_id, self.source().as_str(), &url)
            .await?;
        Ok(FetchedPdf {
            url: resp.final_url,
            bytes: resp.body,
        })
    }
}

/// Bavaria and Vorarlberg share one albina instance; the `region` parameter
/// selects whose rendering is returned.
#[derive(Debug, Clone)]
pub struct LawinenWarnungAdapter {
    base_url: String,
}

#[derive(Debug, Clone)]
pub struct AvalancheReportAdapter {
    base_url: String,
}

#[async_trait]
impl BulletinPdfAdapter for LawinenWarnungAdapter {
    fn source(&self) -> BulletinSource {
        BulletinSource::LawinenWarnung
    }

    fn pdf_url(&self, bulletin_id: &str, region_ids: &[String]) -> String {
        let region = if region_ids.iter().any(|r| r.starts_with("AT-08")) {
            "AT-08"
        } else {
            "DE-BY"
        };
        format!(
            "{}/bulletins/{bulletin_id}/pdf?region={region}&lang=en&grayscale=false",
            self.base_url
        )
    }
}

#[async_trait]
impl BulletinPdfAdapter for AvalancheReportAdapter {
    fn source(&self) -> BulletinSource {
        BulletinSource::AvalancheReport
    }

    fn pdf_url(&self, bulletin_id: &str, _region_ids: &[String]) -> String {
        format!(
            "{}/bulletins/{bulletin_id}/pdf?region=EUREGIO&lang=en&grayscale=false",
            self.base_url
        )
    }
}

pub fn lawinen_warnung_adapter() -> LawinenWarnungAdapter {
    LawinenWarnungAdapter {
        base_url: LAWINEN_WARNUNG_API.to_string(),
    }
}

pub fn avalanche_report_adapter() -> AvalancheReportAdapter {
    AvalancheReportAdapter {
        base_url: AVALANCHE_REPORT_API.to_string(),
    }
}

pub fn adapter_for_source(source: BulletinSource) -> Box<dyn BulletinPdfAdapter> {
    match source {
        BulletinSource::LawinenWarnung => Box::new(lawinen_warnung_adapter()),
        BulletinSource::AvalancheReport => Box::new(avalanche_report_adapter()),
    }
}

/// A bulletin with an id that covers at least one configured region.
#[derive(Debug, Clone)]
pub struct MatchedBulletin<'a> {
    pub bulletin: &'a Bulletin,
    pub uuid: &'a str,
    pub regions: Vec<&'a RegionConfig>,
}

impl MatchedBulletin<'_> {
    pub fn slugs(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.slug.as_str()).collect()
    }
}

/// Configured regions covered by `bulletin`, in the bulletin's region order.
pub fn match_bulletin<'a>(
    bulletin: &'a Bulletin,
    regions: &'a [RegionConfig],
) -> Option<MatchedBulletin<'a>> {
    let uuid = bulletin.uuid()?;
    let mut matched: Vec<&RegionConfig> = Vec::new();
    for region_id in &bulletin.regions {
        if let Some(region) = regions.iter().find(|r| &r.region_id == region_id) {
            if !matched.iter().any(|m| m.slug == region.slug) {
                matched.push(region);
            }
        }
    }
    if matched.is_empty() {
        return None;
    }
    Some(MatchedBulletin {
        bulletin,
        uuid,
        regions: matched,
    })
}

/// Reads a bulletin document (bare array or `{ "bulletins": [...] }`) from disk.
pub fn load_bulletin_document(path: impl AsRef<Path>) -> Result<Vec<Bulletin>> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let doc: BulletinDocument =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(doc.into_bulletins())
}

/// Station endpoints answer with a bare array of `{TS, ...}` samples.
pub async fn fetch_station_samples(
    http: &HttpFetcher,
    ctx: &FetchContext,
    station: &StationConfig,
) -> Result<Vec<WeatherSample>, SourceError> {
    let source_id = format!("weather-{}", station.id);
    Ok(http
        .fetch_json::<Vec<WeatherSample>>(ctx.run_id, &source_id, &station.api_url)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aba_core::ArchiveConfig;
    use std::path::PathBuf;

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    fn cache_fixture(name: &str) -> PathBuf {
        workspace_root().join("fixtures").join("bulletin_cache").join(name)
    }

    #[test]
    fn lawinen_warnung_url_uses_bavarian_rendering_by_default() {
        let adapter = lawinen_warnung_adapter();
        let url = adapter.pdf_url("abc", &["DE-BY-11".to_string()]);
        assert_eq!(
            url,
            "https://admin.lawinen-warnung.eu/albina/api/bulletins/abc/pdf?region=DE-BY&lang=en&grayscale=false"
        );
    }

    #[test]
    fn lawinen_warnung_url_switches_to_vorarlberg() {
        let adapter = adapter_for_source(BulletinSource::LawinenWarnung);
        let url = adapter.pdf_url("abc", &["DE-BY-11".to_string(), "AT-08-01".to_string()]);
        assert!(url.contains("region=AT-08&"), "{url}");
    }

    #[test]
    fn avalanche_report_url_is_euregio() {
        let adapter = adapter_for_source(BulletinSource::AvalancheReport);
        assert_eq!(adapter.source(), BulletinSource::AvalancheReport);
        assert_eq!(
            adapter.pdf_url("xyz", &["AT-07-01".to_string()]),
            "https://api.avalanche.report/albina/api/bulletins/xyz/pdf?region=EUREGIO&lang=en&grayscale=false"
        );
    }

    #[test]
    fn fixture_bulletins_match_configured_regions() {
        let config = ArchiveConfig::default();
        let bulletins = load_bulletin_document(cache_fixture("DE-BY_2025-01-15.json")).unwrap();
        assert_eq!(bulletins.len(), 2);

        let matched = match_bulletin(&bulletins[0], &config.regions).expect("allgau bulletin");
        assert_eq!(matched.uuid, "9a6f3c2e-51c4-4a0e-9d62-0d1b1f4c7a11");
        assert_eq!(matched.slugs(), vec!["allgau-prealps", "allgau-alps-central"]);

        assert!(match_bulletin(&bulletins[1], &config.regions).is_none());
    }

    #[test]
    fn wrapped_fixture_matches_kleinwalsertal() {
        let config = ArchiveConfig::default();
        let bulletins = load_bulletin_document(cache_fixture("AT-08_2025-01-15.json")).unwrap();
        let matched = match_bulletin(&bulletins[0], &config.regions).unwrap();
        assert_eq!(matched.slugs(), vec!["allgau-alps-west"]);
    }

    #[test]
    fn bulletin_without_id_never_matches() {
        let config = ArchiveConfig::default();
        let bulletin = Bulletin {
            regions: vec!["DE-BY-11".to_string()],
            ..Default::default()
        };
        assert!(match_bulletin(&bulletin, &config.regions).is_none());
    }

    #[tokio::test]
    async fn fetch_pdf_requires_bulletin_id() {
        let http = HttpFetcher::new(Default::default()).unwrap();
        let ctx = FetchContext::new(Uuid::new_v4());
        let err = lawinen_warnung_adapter()
            .fetch_pdf(&http, &ctx, &Bulletin::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::MissingId));
    }

    #[test]
    fn station_fixture_parses() {
        let body = fs::read(workspace_root().join("fixtures/weather/station_7.json")).unwrap();
        let samples: Vec<WeatherSample> = serde_json::from_slice(&body).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2].ts, "2025-01-15T10:20:00");
        assert!(samples[2].metrics["RH"].is_null());
    }
}
