//! One documentation build: servers, capture pool and cache for a single run.
//!
//! A [`BuildContext`] is created per invocation and consumed by
//! [`BuildContext::run`]. Nothing outlives it: auxiliary servers and capture
//! workers are torn down when the run ends, whether it succeeded or not.

use crate::handler::{Diagnostic, DirectiveHandler};
use crate::{
    ArtifactCache, Capturer, ChromeCapturer, Config, Document, Metrics, Registry, ScreenshotError,
    ServerSet, SourceKind, WorkerPool, CONFIG_FILE_NAME,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Stylesheet that hides the screenshot not matching the reader's color scheme.
pub const THEME_CSS: &str = include_str!("../assets/screenshot-theme.css");
pub const THEME_CSS_NAME: &str = "screenshot-theme.css";

#[derive(Debug, Default)]
pub struct BuildReport {
    pub documents: usize,
    pub directives: usize,
    pub captures: usize,
    pub cache_hits: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub duration: Duration,
}

impl BuildReport {
    fn absorb(&mut self, other: BuildReport) {
        self.documents += other.documents;
        self.directives += other.directives;
        self.captures += other.captures;
        self.cache_hits += other.cache_hits;
        self.diagnostics.extend(other.diagnostics);
    }
}

pub struct BuildContext {
    config: Arc<Config>,
    source_dir: PathBuf,
    output_dir: PathBuf,
    substitutions: BTreeMap<String, String>,
    servers: ServerSet,
    pool: WorkerPool,
    cache: ArtifactCache,
    handler: DirectiveHandler,
    metrics: Metrics,
}

impl BuildContext {
    /// Build context that captures with a local Chromium.
    pub async fn new(
        config: Config,
        registry: Registry,
        source_dir: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<Self, ScreenshotError> {
        let config = Arc::new(config);
        let registry = Arc::new(registry);
        let capturer = Arc::new(ChromeCapturer::new(config.clone(), registry.clone()));
        Self::with_capturer(config, registry, source_dir, output_dir, capturer).await
    }

    /// Validate configuration, start auxiliary servers and the capture pool.
    pub async fn with_capturer(
        config: Arc<Config>,
        registry: Arc<Registry>,
        source_dir: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        capturer: Arc<dyn Capturer>,
    ) -> Result<Self, ScreenshotError> {
        config.validate()?;
        registry.validate(&config)?;

        let source_dir = tokio::fs::canonicalize(source_dir.as_ref())
            .await
            .map_err(|e| {
                ScreenshotError::ConfigurationError(format!(
                    "source directory {}: {}",
                    source_dir.as_ref().display(),
                    e
                ))
            })?;
        tokio::fs::create_dir_all(output_dir.as_ref()).await?;
        let output_dir = tokio::fs::canonicalize(output_dir.as_ref()).await?;

        let servers = ServerSet::start(&config, &registry, &source_dir)?;
        let mut substitutions = config.substitutions.clone();
        substitutions.extend(servers.substitutions());

        let cache = ArtifactCache::new(config.screenshots_dir(&output_dir));
        cache.ensure_dir().await?;

        let handler = DirectiveHandler::new(config.clone(), cache.clone(), source_dir.clone());
        let pool = WorkerPool::new(config.pool_size, capturer);

        Ok(Self {
            config,
            source_dir,
            output_dir,
            substitutions,
            servers,
            pool,
            cache,
            handler,
            metrics: Metrics::new(),
        })
    }

    /// Substitutions every document sees, including auxiliary server URLs.
    pub fn substitutions(&self) -> &BTreeMap<String, String> {
        &self.substitutions
    }

    pub fn servers(&self) -> &ServerSet {
        &self.servers
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Process the whole source tree, then tear everything down.
    pub async fn run(mut self) -> Result<BuildReport, ScreenshotError> {
        let started = Instant::now();
        let result = self.process_tree().await;
        self.teardown().await;

        let mut report = result?;
        report.duration = started.elapsed();
        info!(
            documents = report.documents,
            directives = report.directives,
            captures = report.captures,
            cache_hits = report.cache_hits,
            warnings = report.diagnostics.len(),
            "Build finished in {}",
            crate::utils::format_duration(report.duration)
        );
        Ok(report)
    }

    async fn process_tree(&self) -> Result<BuildReport, ScreenshotError> {
        let mut report = BuildReport::default();
        let output_inside_source = self.output_dir.starts_with(&self.source_dir);

        let walker = WalkDir::new(&self.source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let hidden = entry.depth() > 0
                    && entry.file_name().to_string_lossy().starts_with('.');
                let is_output = output_inside_source && entry.path() == self.output_dir;
                !hidden && !is_output
            });

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.source_dir)
                .map_err(|e| ScreenshotError::IoError(e.to_string()))?
                .to_path_buf();
            if relative == Path::new(CONFIG_FILE_NAME) {
                continue;
            }

            let destination = self.output_dir.join(&relative);
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            match SourceKind::from_path(&relative) {
                Some(kind) => {
                    let content = tokio::fs::read_to_string(entry.path()).await?;
                    let (rendered, doc_report) =
                        self.process_document(&relative, kind, &content).await?;
                    tokio::fs::write(&destination, rendered).await?;
                    report.absorb(doc_report);
                }
                None => {
                    tokio::fs::copy(entry.path(), &destination).await?;
                }
            }
        }

        self.copy_theme_css().await?;
        Ok(report)
    }

    /// Render one document, capturing its screenshots in document order.
    pub async fn process_document(
        &self,
        relative: &Path,
        kind: SourceKind,
        content: &str,
    ) -> Result<(String, BuildReport), ScreenshotError> {
        let document = Document::parse(relative, kind, content)?;
        let mut substitutions = self.substitutions.clone();
        substitutions.extend(document.substitutions.clone());

        let mut report = BuildReport {
            documents: 1,
            ..Default::default()
        };
        let mut figures = Vec::new();

        for directive in document.directives() {
            let outcome = self
                .handler
                .handle(directive, &substitutions, &self.pool)
                .await?;
            report.directives += 1;
            report.captures += outcome.captures;
            report.cache_hits += outcome.cache_hits;
            report.diagnostics.extend(outcome.diagnostics);
            figures.push(outcome.figures);
        }

        self.metrics.record_document();
        debug!(
            document = %relative.display(),
            directives = report.directives,
            "Processed document"
        );
        Ok((document.render(&figures), report))
    }

    async fn copy_theme_css(&self) -> Result<(), ScreenshotError> {
        let dir = self
            .output_dir
            .join(&self.config.static_dir)
            .join("docshot");
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(THEME_CSS_NAME), THEME_CSS).await?;
        Ok(())
    }

    async fn teardown(&mut self) {
        self.pool.shutdown().await;
        self.servers.shutdown();
        debug!("Build context torn down");
    }
}
