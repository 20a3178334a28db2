//! Core domain model for the avalanche bulletin archive.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

pub const CRATE_NAME: &str = "aba-core";

/// ~7 days of 10-minute samples, with some slack.
pub const DEFAULT_WEATHER_RETENTION: usize = 1100;

/// Marker used for same-day re-issues that carry no usable publication time.
pub const VERSION_MARKER: &str = "v2";

/// Upstream API that renders bulletin PDFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulletinSource {
    /// Bavaria (DE-BY) and Vorarlberg (AT-08).
    LawinenWarnung,
    /// Tyrol (AT-07) / Euregio.
    AvalancheReport,
}

impl BulletinSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulletinSource::LawinenWarnung => "lawinen-warnung",
            BulletinSource::AvalancheReport => "avalanche-report",
        }
    }
}

impl fmt::Display for BulletinSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegionRef {
    Id(String),
    Object {
        #[serde(rename = "regionID")]
        region_id: String,
    },
}

fn deserialize_region_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let refs = Option::<Vec<RegionRef>>::deserialize(deserializer)?;
    Ok(refs
        .unwrap_or_default()
        .into_iter()
        .map(|r| match r {
            RegionRef::Id(id) => id,
            RegionRef::Object { region_id } => region_id,
        })
        .collect())
}

/// Bulletin record as published upstream, with `regions` flattened to plain region IDs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bulletin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "bulletinID", skip_serializing_if = "Option::is_none")]
    pub bulletin_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_region_ids")]
    pub regions: Vec<String>,
    #[serde(default, rename = "publicationTime", skip_serializing_if = "Option::is_none")]
    pub publication_time: Option<String>,
}

impl Bulletin {
    pub fn uuid(&self) -> Option<&str> {
        non_empty(self.id.as_deref()).or_else(|| non_empty(self.bulletin_id.as_deref()))
    }

    pub fn covers(&self, region_id: &str) -> bool {
        self.regions.iter().any(|r| r == region_id)
    }

    /// `None` when the timestamp is missing or cannot be parsed.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.publication_time.as_deref().and_then(parse_timestamp)
    }
}

/// On-disk bulletin payload: either a bare array or `{ "bulletins": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BulletinDocument {
    List(Vec<Bulletin>),
    Wrapped { bulletins: Vec<Bulletin> },
}

impl BulletinDocument {
    pub fn into_bulletins(self) -> Vec<Bulletin> {
        match self {
            BulletinDocument::List(bulletins) => bulletins,
            BulletinDocument::Wrapped { bulletins } => bulletins,
        }
    }
}

/// Parses the timestamp shapes seen in bulletin, weather and incident payloads.
/// Values without an offset are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `YYYYMMDD-HHMM` in UTC.
pub fn publication_stamp(published_at: DateTime<Utc>) -> String {
    published_at.format("%Y%m%d-%H%M").to_string()
}

fn is_publication_stamp(part: &str) -> bool {
    let bytes = part.as_bytes();
    bytes.len() == 13
        && bytes[8] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || b.is_ascii_digit())
}

/// Suffix distinguishing a same-day re-issue from the base file:
/// an optional publication stamp followed by zero or more `_v2` markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSuffix {
    pub stamp: Option<String>,
    pub markers: u8,
}

impl VersionSuffix {
    /// Stamp from the publication time, or the bare `_v2` marker without one.
    pub fn for_publication(published_at: Option<DateTime<Utc>>) -> Self {
        match published_at {
            Some(ts) => Self {
                stamp: Some(publication_stamp(ts)),
                markers: 0,
            },
            None => Self {
                stamp: None,
                markers: 1,
            },
        }
    }

    pub fn disambiguated(&self) -> Self {
        Self {
            stamp: self.stamp.clone(),
            markers: self.markers.saturating_add(1),
        }
    }

    /// The pre-timestamp naming scheme: `{date}_v2.pdf`.
    pub fn is_legacy(&self) -> bool {
        self.stamp.is_none() && self.markers == 1
    }
}

impl fmt::Display for VersionSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(stamp) = &self.stamp {
            write!(f, "_{stamp}")?;
        }
        for _ in 0..self.markers {
            write!(f, "_{VERSION_MARKER}")?;
        }
        Ok(())
    }
}

/// Name of a PDF inside `pdfs/{slug}/`: `{date}.pdf` or `{date}{suffix}.pdf`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveFileName {
    pub date: NaiveDate,
    pub suffix: Option<VersionSuffix>,
}

impl ArchiveFileName {
    pub fn base(date: NaiveDate) -> Self {
        Self { date, suffix: None }
    }

    pub fn versioned(date: NaiveDate, suffix: VersionSuffix) -> Self {
        Self {
            date,
            suffix: Some(suffix),
        }
    }

    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".pdf")?;
        let date_part = stem.get(..10)?;
        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
        let rest = &stem[10..];
        if rest.is_empty() {
            return Some(Self::base(date));
        }

        let mut parts = rest.strip_prefix('_')?.split('_').peekable();
        let stamp = match parts.peek() {
            Some(first) if is_publication_stamp(first) => parts.next().map(str::to_string),
            _ => None,
        };
        let mut markers = 0u8;
        for part in parts {
            if part != VERSION_MARKER {
                return None;
            }
            markers = markers.saturating_add(1);
        }
        if stamp.is_none() && markers == 0 {
            return None;
        }
        Some(Self::versioned(date, VersionSuffix { stamp, markers }))
    }

    pub fn is_base(&self) -> bool {
        self.suffix.is_none()
    }

    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn month_key(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }

    pub fn stem(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}{}", self.date_key(), suffix),
            None => self.date_key(),
        }
    }
}

impl fmt::Display for ArchiveFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.pdf", self.stem())
    }
}

/// One telemetry sample. Everything except `TS` is kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    #[serde(rename = "TS")]
    pub ts: String,
    #[serde(flatten)]
    pub metrics: Map<String, JsonValue>,
}

impl WeatherSample {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.ts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    pub id: String,
    pub name: String,
    pub api_url: String,
    pub original_url: String,
}

/// Persisted station record in `weather_stations.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherStation {
    #[serde(default)]
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub original_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Vec<WeatherSample>,
}

impl WeatherStation {
    pub fn from_config(config: &StationConfig) -> Self {
        Self {
            name: config.name.clone(),
            id: config.id.clone(),
            api_url: config.api_url.clone(),
            original_url: config.original_url.clone(),
            last_updated: None,
            error: None,
            data: Vec::new(),
        }
    }
}

/// JSON value that upstream sometimes sends as a number and sometimes as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Scalar::Float(_) => None,
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Empty text and numeric zero carry no information in incident details.
    fn is_blank(&self) -> bool {
        match self {
            Scalar::Int(v) => *v == 0,
            Scalar::Float(v) => *v == 0.0,
            Scalar::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

const ASPECTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Compass label for aspect ids 1..=8; anything else is echoed back.
pub fn aspect_label(aspect: &Scalar) -> String {
    match aspect.as_i64() {
        Some(id @ 1..=8) => ASPECTS[(id - 1) as usize].to_string(),
        _ => aspect.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentImage {
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IncidentDetails {
    #[serde(default)]
    pub elevation: Option<Scalar>,
    #[serde(default)]
    pub incline: Option<Scalar>,
    #[serde(default)]
    pub aspect_id: Option<Scalar>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub comments_en: Option<String>,
    #[serde(default)]
    pub images: Vec<IncidentImage>,
}

impl IncidentDetails {
    pub fn elevation_label(&self) -> Option<String> {
        present(&self.elevation).map(|v| format!("{v} m"))
    }

    pub fn incline_label(&self) -> Option<String> {
        present(&self.incline).map(|v| format!("{v}°"))
    }

    pub fn aspect_label(&self) -> Option<String> {
        present(&self.aspect_id).map(aspect_label)
    }

    pub fn original_text(&self) -> Option<&str> {
        non_empty(self.comments.as_deref())
    }

    pub fn translated_text(&self) -> Option<&str> {
        non_empty(self.comments_en.as_deref())
    }
}

fn present(value: &Option<Scalar>) -> Option<&Scalar> {
    value.as_ref().filter(|v| !v.is_blank())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Avalanche incident report, read-only input to the site build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Scalar,
    pub date: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub details: IncidentDetails,
}

impl Incident {
    /// Date part of `date`, which may carry a trailing time.
    pub fn day(&self) -> &str {
        self.date.split(' ').next().unwrap_or_default()
    }

    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.date)
    }

    pub fn detail_file_name(&self) -> String {
        format!("{}_{}.html", self.day(), self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub region_id: String,
    pub slug: String,
    pub label: String,
    pub source: BulletinSource,
    /// Region family used to name bulletin cache files, e.g. `DE-BY`.
    pub cache_prefix: String,
}

/// Everything that used to be hard-coded: regions, stations, retention policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionConfig>,
    #[serde(default = "default_stations")]
    pub stations: Vec<StationConfig>,
    #[serde(default = "default_cleanup_cutoff")]
    pub cleanup_cutoff: NaiveDate,
    #[serde(default = "default_weather_retention")]
    pub weather_retention: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            stations: default_stations(),
            cleanup_cutoff: default_cleanup_cutoff(),
            weather_retention: default_weather_retention(),
        }
    }
}

impl ArchiveConfig {
    pub fn region_by_id(&self, region_id: &str) -> Option<&RegionConfig> {
        self.regions.iter().find(|r| r.region_id == region_id)
    }

    pub fn region_by_slug(&self, slug: &str) -> Option<&RegionConfig> {
        self.regions.iter().find(|r| r.slug == slug)
    }

    /// Distinct cache prefixes in configuration order, each with the source that serves it.
    pub fn cache_prefixes(&self) -> Vec<(String, BulletinSource)> {
        let mut out: Vec<(String, BulletinSource)> = Vec::new();
        for region in &self.regions {
            if !out.iter().any(|(p, _)| p == &region.cache_prefix) {
                out.push((region.cache_prefix.clone(), region.source));
            }
        }
        out
    }
}

fn region(
    region_id: &str,
    slug: &str,
    label: &str,
    source: BulletinSource,
    cache_prefix: &str,
) -> RegionConfig {
    RegionConfig {
        region_id: region_id.to_string(),
        slug: slug.to_string(),
        label: label.to_string(),
        source,
        cache_prefix: cache_prefix.to_string(),
    }
}

fn default_regions() -> Vec<RegionConfig> {
    vec![
        region(
            "DE-BY-11",
            "allgau-prealps",
            "Allgäu Prealps (Sonthofen)",
            BulletinSource::LawinenWarnung,
            "DE-BY",
        ),
        region(
            "DE-BY-12",
            "allgau-alps-central",
            "Allgäu Alps Central (Oberstdorf)",
            BulletinSource::LawinenWarnung,
            "DE-BY",
        ),
        region(
            "AT-08-01",
            "allgau-alps-west",
            "Allgäu Alps West (Kleinwalsertal)",
            BulletinSource::LawinenWarnung,
            "AT-08",
        ),
        region(
            "AT-07-01",
            "allgau-alps-east",
            "Allgäu Alps East (Tannheimer Tal)",
            BulletinSource::AvalancheReport,
            "AT-07",
        ),
    ]
}

fn bavarian_station(id: &str, name: &str) -> StationConfig {
    StationConfig {
        id: id.to_string(),
        name: name.to_string(),
        api_url: format!("https://api-la-dok.bayern.de/public/weatherWeb/{id}"),
        original_url: format!(
            "https://lawinenwarndienst.bayern.de/schnee-wetter-bayern/automatische-wetter-schnee-messstation/?weatherid={id}"
        ),
    }
}

fn default_stations() -> Vec<StationConfig> {
    vec![
        bavarian_station("7", "Hochgrat (1715m) / Hörmoos (1300m)"),
        bavarian_station("8", "Fellhorn (1967m)"),
        bavarian_station("4", "Nebelhorn (2075m)"),
        bavarian_station("19", "Schwarzenberg (1172m)"),
    ]
}

fn default_cleanup_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap_or_default()
}

fn default_weather_retention() -> usize {
    DEFAULT_WEATHER_RETENTION
}
