//! Static archive site (askama) and a local preview server (axum).

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use aba_core::{ArchiveConfig, Incident, RegionConfig};
use aba_storage::{ArchiveEntry, PdfArchive};
use aba_sync::{load_archive_config, SyncConfig};
use anyhow::{Context, Result};
use askama::Template;
use axum::{
    extract::{Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::fs;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub const CRATE_NAME: &str = "aba-site";

const TRANSLATE_URL: &str = "https://translate.google.com/";
const NO_DESCRIPTION: &str = "No description available.";

#[derive(Debug, Clone)]
struct ListItem {
    text: String,
    detail: Option<String>,
    href: String,
    class_name: String,
}

impl ListItem {
    fn link(text: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            detail: None,
            href: href.into(),
            class_name: String::new(),
        }
    }

    fn with_class(mut self, class_name: &str) -> Self {
        self.class_name = class_name.to_string();
        self
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexPageTemplate {
    title: String,
    relative_root: String,
    items: Vec<ListItem>,
    is_main: bool,
    back_link: Option<String>,
}

#[derive(Debug, Clone)]
struct GalleryImage {
    url: String,
    alt: String,
    comment: Option<String>,
}

#[derive(Template)]
#[template(path = "incident.html")]
struct IncidentTemplate {
    date: String,
    location: String,
    elevation: String,
    incline: String,
    aspect: String,
    coordinates: String,
    translation: Option<String>,
    original: String,
    translate_url: String,
    images: Vec<GalleryImage>,
}

impl IncidentTemplate {
    fn from_incident(incident: &Incident) -> Self {
        let details = &incident.details;
        let original = details.original_text().unwrap_or(NO_DESCRIPTION).to_string();
        let coordinates = match (incident.lat, incident.lon) {
            (Some(lat), Some(lon)) => format!("{lat}, {lon}"),
            _ => "N/A".to_string(),
        };
        Self {
            date: incident.date.clone(),
            location: incident.location.clone(),
            elevation: details.elevation_label().unwrap_or_else(|| "N/A".into()),
            incline: details.incline_label().unwrap_or_else(|| "N/A".into()),
            aspect: details.aspect_label().unwrap_or_else(|| "N/A".into()),
            coordinates,
            translation: details.translated_text().map(str::to_string),
            translate_url: translate_url(&original),
            original,
            images: details
                .images
                .iter()
                .map(|img| GalleryImage {
                    url: img.url.clone(),
                    alt: img
                        .caption
                        .clone()
                        .filter(|c| !c.is_empty())
                        .unwrap_or_else(|| "Incident Image".to_string()),
                    comment: img.comment.clone().filter(|c| !c.is_empty()),
                })
                .collect(),
        }
    }
}

fn translate_url(text: &str) -> String {
    match url::Url::parse_with_params(
        TRANSLATE_URL,
        &[("sl", "auto"), ("tl", "en"), ("text", text)],
    ) {
        Ok(url) => url.to_string(),
        Err(_) => TRANSLATE_URL.to_string(),
    }
}

/// "January 2025" for a `YYYY-MM` group.
fn month_label(entry: &ArchiveEntry) -> String {
    entry.name.date.format("%B %Y").to_string()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteBuildSummary {
    pub regions: usize,
    pub months: usize,
    pub pdfs: usize,
    pub incidents: usize,
    pub output: String,
}

pub struct SiteBuilder {
    archive: ArchiveConfig,
    pdfs: PdfArchive,
    incidents_path: PathBuf,
    output_dir: PathBuf,
}

impl SiteBuilder {
    pub fn new(
        archive: ArchiveConfig,
        pdfs_dir: impl Into<PathBuf>,
        incidents_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            archive,
            pdfs: PdfArchive::new(pdfs_dir),
            incidents_path: incidents_path.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.output_dir.join("archive")
    }

    /// Regenerate `archive/` and the landing page from scratch.
    pub async fn build(&self) -> Result<SiteBuildSummary> {
        let archive_dir = self.archive_dir();
        if fs::try_exists(&archive_dir).await.unwrap_or(false) {
            fs::remove_dir_all(&archive_dir)
                .await
                .with_context(|| format!("removing {}", archive_dir.display()))?;
        }
        fs::create_dir_all(&archive_dir)
            .await
            .with_context(|| format!("creating {}", archive_dir.display()))?;

        let mut summary = SiteBuildSummary {
            output: self.output_dir.display().to_string(),
            ..Default::default()
        };

        for region in &self.archive.regions {
            self.build_region(region, &mut summary).await?;
            summary.regions += 1;
        }

        let mut incidents = load_incidents(&self.incidents_path).await;
        incidents.sort_by(|a, b| b.occurred_at().cmp(&a.occurred_at()));
        if !incidents.is_empty() {
            self.build_incidents(&incidents).await?;
        }
        summary.incidents = incidents.len();

        self.build_landing(!incidents.is_empty()).await?;
        info!(
            regions = summary.regions,
            months = summary.months,
            pdfs = summary.pdfs,
            incidents = summary.incidents,
            "site build complete"
        );
        Ok(summary)
    }

    async fn build_region(&self, region: &RegionConfig, summary: &mut SiteBuildSummary) -> Result<()> {
        let region_dir = self.archive_dir().join(&region.slug);
        fs::create_dir_all(&region_dir)
            .await
            .with_context(|| format!("creating {}", region_dir.display()))?;

        let mut months: BTreeMap<String, Vec<ArchiveEntry>> = BTreeMap::new();
        for entry in self.pdfs.list_entries(&region.slug).await? {
            months.entry(entry.name.month_key()).or_default().push(entry);
        }

        let month_items = months
            .iter()
            .rev()
            .filter_map(|(key, entries)| {
                entries
                    .first()
                    .map(|first| ListItem::link(month_label(first), format!("{key}/index.html")))
            })
            .collect();
        write_page(
            &region_dir.join("index.html"),
            IndexPageTemplate {
                title: format!("{} - Select Month", region.label),
                relative_root: "../../".into(),
                items: month_items,
                is_main: false,
                back_link: Some("../../index.html".into()),
            },
        )
        .await?;

        for (key, mut entries) in months {
            let month_dir = region_dir.join(&key);
            fs::create_dir_all(&month_dir)
                .await
                .with_context(|| format!("creating {}", month_dir.display()))?;

            entries.sort_by_key(|e| std::cmp::Reverse(e.name.stem()));
            let label = entries.first().map(month_label).unwrap_or_else(|| key.clone());
            let day_items = entries
                .iter()
                .map(|e| ListItem::link(e.name.stem(), e.name.to_string()))
                .collect();
            write_page(
                &month_dir.join("index.html"),
                IndexPageTemplate {
                    title: format!("{} - {}", region.label, label),
                    relative_root: "../../../".into(),
                    items: day_items,
                    is_main: false,
                    back_link: Some("../index.html".into()),
                },
            )
            .await?;

            for entry in &entries {
                let target = month_dir.join(entry.name.to_string());
                fs::copy(&entry.path, &target).await.with_context(|| {
                    format!("copying {} -> {}", entry.path.display(), target.display())
                })?;
                summary.pdfs += 1;
            }
            summary.months += 1;
        }
        Ok(())
    }

    async fn build_incidents(&self, incidents: &[Incident]) -> Result<()> {
        let incidents_dir = self.archive_dir().join("incidents");
        fs::create_dir_all(&incidents_dir)
            .await
            .with_context(|| format!("creating {}", incidents_dir.display()))?;

        let mut items = Vec::with_capacity(incidents.len());
        for incident in incidents {
            let file_name = incident.detail_file_name();
            write_page(
                &incidents_dir.join(&file_name),
                IncidentTemplate::from_incident(incident),
            )
            .await?;
            items.push(ListItem {
                text: incident.day().to_string(),
                detail: Some(incident.location.clone()),
                href: file_name,
                class_name: "incident-card".into(),
            });
        }

        write_page(
            &incidents_dir.join("index.html"),
            IndexPageTemplate {
                title: "Avalanche Incidents (Allgäu)".into(),
                relative_root: "../../".into(),
                items,
                is_main: false,
                back_link: Some("../../index.html".into()),
            },
        )
        .await
    }

    async fn build_landing(&self, has_incidents: bool) -> Result<()> {
        let mut items: Vec<ListItem> = self
            .archive
            .regions
            .iter()
            .map(|r| ListItem::link(r.label.clone(), format!("archive/{}/index.html", r.slug)))
            .collect();
        if has_incidents {
            items.push(
                ListItem::link("⚠️ Avalanche Incidents", "archive/incidents/index.html")
                    .with_class("landing-incident-item"),
            );
        }
        items.push(ListItem::link("🌨️ Weather (Snow Depth)", "snow-depth/index.html"));

        write_page(
            &self.output_dir.join("index.html"),
            IndexPageTemplate {
                title: "Avalanche Bulletin Archive".into(),
                relative_root: String::new(),
                items,
                is_main: true,
                back_link: None,
            },
        )
        .await
    }
}

async fn write_page<T: Template>(path: &Path, tpl: T) -> Result<()> {
    let html = tpl
        .render()
        .with_context(|| format!("rendering {}", path.display()))?;
    fs::write(path, html)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

/// Missing file: no incidents. Unreadable or malformed: logged, no incidents.
pub async fn load_incidents(path: &Path) -> Vec<Incident> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            error!(path = %path.display(), error = %err, "failed to read incidents");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<Incident>>(&text) {
        Ok(incidents) => {
            info!(count = incidents.len(), "loaded incidents");
            incidents
        }
        Err(err) => {
            error!(path = %path.display(), error = %err, "failed to parse incidents");
            Vec::new()
        }
    }
}

pub async fn run_build_from_env() -> Result<SiteBuildSummary> {
    let config = SyncConfig::from_env();
    let archive = load_archive_config(&config.archive_config_path).await?;
    SiteBuilder::new(
        archive,
        config.pdfs_dir(),
        config.incidents_path(),
        config.output_dir.clone(),
    )
    .build()
    .await
}

// ---------------------------------------------------------------------------
// Preview server
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SiteState {
    pub root: PathBuf,
}

impl SiteState {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

pub fn app(state: SiteState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/{*path}", get(file_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(root: impl Into<PathBuf>, port: u16) -> Result<()> {
    let state = SiteState::new(root);
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, root = %state.root.display(), "serving site preview");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env(port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or_else(|| {
        std::env::var("ABA_WEB_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000)
    });
    serve(SyncConfig::from_env().output_dir, port).await
}

async fn index_handler(State(state): State<Arc<SiteState>>) -> Response {
    serve_file(&state.root, "").await
}

async fn file_handler(
    State(state): State<Arc<SiteState>>,
    AxumPath(path): AxumPath<String>,
) -> Response {
    serve_file(&state.root, &path).await
}

async fn serve_file(root: &Path, rel: &str) -> Response {
    let rel = Path::new(rel);
    if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return not_found();
    }

    let mut path = root.join(rel);
    if fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
        path = path.join("index.html");
    }

    match fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => not_found(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read file");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use scraper::{Html, Selector};
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .unwrap()
    }

    fn incidents_fixture() -> PathBuf {
        workspace_root().join("fixtures/incidents/incidents.json")
    }

    fn seed_pdfs(root: &Path, files: &[(&str, &str)]) {
        for (slug, name) in files {
            let dir = root.join(slug);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(name), format!("%PDF {slug} {name}")).unwrap();
        }
    }

    fn read_html(path: &Path) -> Html {
        Html::parse_document(&std::fs::read_to_string(path).unwrap())
    }

    fn links(doc: &Html, selector: &str) -> Vec<(String, String)> {
        let sel = Selector::parse(selector).unwrap();
        doc.select(&sel)
            .map(|a| {
                (
                    a.text()
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .collect::<Vec<_>>()
                        .join(" "),
                    a.value().attr("href").unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    fn title(doc: &Html) -> String {
        let sel = Selector::parse("title").unwrap();
        doc.select(&sel).next().unwrap().text().collect()
    }

    #[tokio::test]
    async fn region_months_and_days_are_listed_newest_first() {
        let data = tempdir().expect("tempdir");
        let out = tempdir().expect("tempdir");
        let pdfs = data.path().join("pdfs");
        seed_pdfs(
            &pdfs,
            &[
                ("allgau-prealps", "2025-01-01.pdf"),
                ("allgau-prealps", "2025-01-02.pdf"),
                ("allgau-prealps", "2024-12-31.pdf"),
                ("unconfigured", "2025-01-01.pdf"),
            ],
        );

        let summary = SiteBuilder::new(
            ArchiveConfig::default(),
            &pdfs,
            data.path().join("incidents.json"),
            out.path(),
        )
        .build()
        .await
        .unwrap();
        assert_eq!(summary.regions, 4);
        assert_eq!(summary.months, 2);
        assert_eq!(summary.pdfs, 3);

        let region = out.path().join("archive/allgau-prealps");
        let index = read_html(&region.join("index.html"));
        assert_eq!(title(&index), "Allgäu Prealps (Sonthofen) - Select Month");
        assert_eq!(
            links(&index, "a.archive-item"),
            vec![
                ("January 2025".to_string(), "2025-01/index.html".to_string()),
                ("December 2024".to_string(), "2024-12/index.html".to_string()),
            ]
        );
        assert_eq!(links(&index, ".back-link a")[0].1, "../../index.html");

        let month = read_html(&region.join("2025-01/index.html"));
        assert_eq!(title(&month), "Allgäu Prealps (Sonthofen) - January 2025");
        assert_eq!(
            links(&month, "a.archive-item"),
            vec![
                ("2025-01-02".to_string(), "2025-01-02.pdf".to_string()),
                ("2025-01-01".to_string(), "2025-01-01.pdf".to_string()),
            ]
        );
        assert_eq!(links(&month, "a.logo")[0].1, "../../../index.html");
        assert_eq!(
            std::fs::read_to_string(region.join("2025-01/2025-01-02.pdf")).unwrap(),
            "%PDF allgau-prealps 2025-01-02.pdf"
        );

        assert!(out.path().join("archive/allgau-alps-east/index.html").exists());
        assert!(!out.path().join("archive/unconfigured").exists());
    }

    #[tokio::test]
    async fn same_day_variants_get_their_own_entries() {
        let data = tempdir().expect("tempdir");
        let out = tempdir().expect("tempdir");
        seed_pdfs(
            data.path(),
            &[
                ("allgau-alps-west", "2025-02-10.pdf"),
                ("allgau-alps-west", "2025-02-10_20250210-1600.pdf"),
            ],
        );
        SiteBuilder::new(ArchiveConfig::default(), data.path(), data.path().join("none.json"), out.path())
            .build()
            .await
            .unwrap();

        let month = read_html(&out.path().join("archive/allgau-alps-west/2025-02/index.html"));
        let hrefs = links(&month, "a.archive-item")
            .into_iter()
            .map(|(_, href)| href)
            .collect::<Vec<_>>();
        assert_eq!(hrefs, vec!["2025-02-10_20250210-1600.pdf", "2025-02-10.pdf"]);
    }

    #[tokio::test]
    async fn landing_page_without_incidents_links_regions_and_weather() {
        let data = tempdir().expect("tempdir");
        let out = tempdir().expect("tempdir");
        std::fs::create_dir_all(out.path().join("archive/stale")).unwrap();
        std::fs::write(out.path().join("archive/stale/index.html"), "old").unwrap();

        SiteBuilder::new(ArchiveConfig::default(), data.path().join("pdfs"), data.path().join("incidents.json"), out.path())
            .build()
            .await
            .unwrap();

        assert!(!out.path().join("archive/stale").exists());
        assert!(!out.path().join("archive/incidents").exists());

        let landing = read_html(&out.path().join("index.html"));
        let hrefs = links(&landing, "a.archive-item")
            .into_iter()
            .map(|(_, href)| href)
            .collect::<Vec<_>>();
        assert_eq!(
            hrefs,
            vec![
                "archive/allgau-prealps/index.html",
                "archive/allgau-alps-central/index.html",
                "archive/allgau-alps-west/index.html",
                "archive/allgau-alps-east/index.html",
                "snow-depth/index.html",
            ]
        );
        assert_eq!(links(&landing, "a.logo")[0].1, "#");
        assert!(links(&landing, ".back-link a").is_empty());

        let css = Selector::parse("link[rel=stylesheet]").unwrap();
        assert_eq!(landing.select(&css).next().unwrap().value().attr("href"), Some("styles.css"));
    }

    #[tokio::test]
    async fn incidents_get_index_and_detail_pages() {
        let data = tempdir().expect("tempdir");
        let out = tempdir().expect("tempdir");
        let summary = SiteBuilder::new(ArchiveConfig::default(), data.path(), incidents_fixture(), out.path())
            .build()
            .await
            .unwrap();
        assert_eq!(summary.incidents, 2);

        let landing = read_html(&out.path().join("index.html"));
        assert_eq!(
            links(&landing, "a.landing-incident-item"),
            vec![("⚠️ Avalanche Incidents".to_string(), "archive/incidents/index.html".to_string())]
        );

        let dir = out.path().join("archive/incidents");
        let index = read_html(&dir.join("index.html"));
        assert_eq!(
            links(&index, "a.incident-card"),
            vec![
                ("2025-02-03 Gottesackerplateau".to_string(), "2025-02-03_4711.html".to_string()),
                ("2024-12-28 Fellhorn Nordhang".to_string(), "2024-12-28_4650.html".to_string()),
            ]
        );

        let translated = read_html(&dir.join("2025-02-03_4711.html"));
        let meta = Selector::parse(".meta-item").unwrap();
        let meta_text = translated
            .select(&meta)
            .map(|m| m.text().collect::<String>())
            .collect::<Vec<_>>();
        assert!(meta_text.contains(&"Elevation: 1850 m".to_string()), "{meta_text:?}");
        assert!(meta_text.contains(&"Incline: 38°".to_string()));
        assert!(meta_text.contains(&"Aspect: NE".to_string()));
        assert!(meta_text.contains(&"Coordinates: 47.3, 10.1".to_string()));
        let details = Selector::parse("details.original-text p").unwrap();
        assert_eq!(
            translated.select(&details).next().unwrap().text().collect::<String>(),
            "Schneebrett an der Kante, eine Person teilverschüttet."
        );
        let img = Selector::parse(".gallery-item img").unwrap();
        let img = translated.select(&img).next().unwrap();
        assert_eq!(img.value().attr("alt"), Some("Incident Image"));
        assert!(links(&translated, ".translate-link").is_empty());

        let untranslated = read_html(&dir.join("2024-12-28_4650.html"));
        let translate = links(&untranslated, ".translate-link");
        assert_eq!(translate.len(), 1);
        assert!(translate[0]
            .1
            .starts_with("https://translate.google.com/?sl=auto&tl=en&text="));
        let meta_text = untranslated
            .select(&meta)
            .map(|m| m.text().collect::<String>())
            .collect::<Vec<_>>();
        assert!(meta_text.contains(&"Elevation: N/A".to_string()), "{meta_text:?}");
        assert!(meta_text.contains(&"Aspect: N/A".to_string()));
        assert!(untranslated.select(&Selector::parse(".incident-gallery").unwrap()).next().is_none());
    }

    #[tokio::test]
    async fn malformed_incidents_are_treated_as_empty() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("incidents.json");
        assert!(load_incidents(&path).await.is_empty());
        std::fs::write(&path, "{\"not\": \"a list\"}").unwrap();
        assert!(load_incidents(&path).await.is_empty());
    }

    async fn get(root: &Path, uri: &str) -> (StatusCode, String, Vec<u8>) {
        let resp = app(SiteState::new(root))
            .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, body.to_vec())
    }

    #[tokio::test]
    async fn preview_serves_files_and_directory_indexes() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("archive/allgau-prealps")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>landing</h1>").unwrap();
        std::fs::write(dir.path().join("styles.css"), "body {}").unwrap();
        std::fs::write(dir.path().join("archive/allgau-prealps/index.html"), "region").unwrap();

        let (status, ct, body) = get(dir.path(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ct, "text/html; charset=utf-8");
        assert_eq!(body, b"<h1>landing</h1>");

        let (status, ct, _) = get(dir.path(), "/styles.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ct, "text/css; charset=utf-8");

        let (status, _, body) = get(dir.path(), "/archive/allgau-prealps/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"region");
    }

    #[tokio::test]
    async fn preview_rejects_traversal_and_missing_files() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("index.html"), "landing").unwrap();

        let (status, _, _) = get(dir.path(), "/archive/../index.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = get(dir.path(), "/nope.pdf").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
