//! Turns one parsed directive into output figures.
//!
//! Resolution order for every capture field: directive option, then the
//! matching `default_*` configuration value. The resulting
//! [`CaptureRequest`] is fingerprinted; an existing artifact is reused,
//! otherwise the request goes to the worker pool and the handler waits for it.

use crate::utils::{relative_artifact_uri, resolve_target, substitute};
use crate::{
    ArtifactCache, CaptureRequest, ColorScheme, ColorSchemeOption, Config, Directive, Figure,
    Metrics, ScreenshotError, StatusPolicy, Viewport, WorkerPool,
};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A non-fatal problem found while processing a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub document: PathBuf,
    pub line: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: WARNING: {}", self.document.display(), self.line, self.message)
    }
}

/// Result of handling one directive.
#[derive(Debug, Default)]
pub struct HandlerOutcome {
    /// One figure, or two (light then dark) in dual-theme mode.
    pub figures: Vec<Figure>,
    pub captures: usize,
    pub cache_hits: usize,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct DirectiveHandler {
    config: Arc<Config>,
    cache: ArtifactCache,
    source_dir: PathBuf,
    metrics: Metrics,
}

impl DirectiveHandler {
    pub fn new(config: Arc<Config>, cache: ArtifactCache, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            cache,
            source_dir: source_dir.into(),
            metrics: Metrics::new(),
        }
    }

    /// Build the capture requests of a directive, one per color scheme.
    ///
    /// `substitutions` holds every `|name|` token visible to the document.
    pub fn requests(
        &self,
        directive: &Directive,
        substitutions: &BTreeMap<String, String>,
    ) -> Result<Vec<CaptureRequest>, ScreenshotError> {
        let config = &self.config;
        let options = &directive.options;

        let target = substitute(&directive.target, substitutions);
        let document_dir = directive.document.parent().unwrap_or(Path::new(""));
        let url = resolve_target(&target, &self.source_dir, document_dir)?;

        let browser = options
            .browser
            .clone()
            .unwrap_or_else(|| config.default_browser.clone());
        config.browser_profile(&browser)?;

        let context = options.context.clone().unwrap_or_default();
        if !context.is_empty() && !config.contexts.contains_key(&context) {
            return Err(ScreenshotError::UnknownContext(context));
        }

        let status_policy = StatusPolicy::parse(
            options
                .status_code
                .as_deref()
                .unwrap_or(&config.default_status_codes),
        )?;

        let mut headers = config.default_headers.clone();
        headers.extend(options.headers.iter().cloned());

        let scheme_option = match options.color_scheme {
            Some(option) => option,
            None => ColorSchemeOption::parse(&config.default_color_scheme)?,
        };

        let base = CaptureRequest {
            url,
            raw_target: directive.target.clone(),
            browser,
            viewport: Viewport {
                width: options.viewport_width.unwrap_or(config.default_viewport_width),
                height: options.viewport_height.unwrap_or(config.default_viewport_height),
            },
            device_scale_factor: options
                .device_scale_factor
                .unwrap_or(config.default_device_scale_factor),
            color_scheme: ColorScheme::Null,
            locale: options.locale.clone().or_else(|| config.default_locale.clone()),
            timezone: options
                .timezone
                .clone()
                .or_else(|| config.default_timezone.clone()),
            headers,
            interactions: options.interactions.clone().unwrap_or_default(),
            context,
            full_page: options.full_page || config.default_full_page,
            pdf: options.pdf,
            status_codes: options.status_code.clone(),
            status_policy,
            format: config.output_format,
        };

        Ok(scheme_option
            .schemes()
            .into_iter()
            .map(|scheme| CaptureRequest {
                color_scheme: scheme,
                ..base.clone()
            })
            .collect())
    }

    /// Process one directive: capture what is missing and build its figures.
    pub async fn handle(
        &self,
        directive: &Directive,
        substitutions: &BTreeMap<String, String>,
        pool: &WorkerPool,
    ) -> Result<HandlerOutcome, ScreenshotError> {
        let located = |e: ScreenshotError| match e {
            e @ ScreenshotError::Directive { .. } => e,
            e if e.is_configuration() || matches!(e, ScreenshotError::InvalidTarget(_)) => {
                ScreenshotError::directive(&directive.document, directive.line, e.to_string())
            }
            e => e,
        };

        let requests = self.requests(directive, substitutions).map_err(located)?;
        let dual_theme = requests.len() > 1;
        let mut outcome = HandlerOutcome::default();

        for request in requests {
            let paths = self.cache.paths(&request);

            if self.cache.is_complete(&request, &paths).await {
                debug!(file = %paths.file_name(), "reusing {}", request.describe());
                self.metrics.record_cache_hit();
                outcome.cache_hits += 1;
            } else {
                let report = pool.submit(request.clone(), paths.clone()).await?;
                outcome.captures += 1;
                for message in report.warnings {
                    self.metrics.record_status_warning();
                    warn!(
                        document = %directive.document.display(),
                        line = directive.line,
                        "{}",
                        message
                    );
                    outcome.diagnostics.push(Diagnostic {
                        document: directive.document.clone(),
                        line: directive.line,
                        message,
                    });
                }
            }

            let uri = relative_artifact_uri(
                &directive.document,
                &self.config.static_dir,
                &paths.file_name(),
            );
            let mut figure = Figure::new(
                uri,
                &directive.options.figure,
                directive.caption.as_deref(),
            );
            if dual_theme {
                if let Some(class) = request.color_scheme.only_class() {
                    figure.add_class(class);
                }
            }
            outcome.figures.push(figure);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCapturer;
    use crate::{CaptureReport, DirectiveOptions};

    fn directive(target: &str, options: DirectiveOptions) -> Directive {
        Directive {
            document: PathBuf::from("guide/page.rst"),
            line: 12,
            target: target.to_string(),
            options,
            caption: Some("Caption".to_string()),
        }
    }

    fn handler(dir: &Path, config: Config) -> DirectiveHandler {
        DirectiveHandler::new(
            Arc::new(config),
            ArtifactCache::new(dir.join("_static/screenshots")),
            "/docs",
        )
    }

    /// A mock that writes a placeholder artifact for every capture.
    fn writing_mock(times: usize) -> MockCapturer {
        let mut mock = MockCapturer::new();
        mock.expect_capture().times(times).returning(|_, paths| {
            std::fs::write(&paths.image, b"png").unwrap();
            Ok(CaptureReport::default())
        });
        mock
    }

    #[test]
    fn test_requests_resolve_defaults_and_options() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config
            .default_headers
            .insert("Authorization".to_string(), "Bearer default".to_string());
        config.default_locale = Some("en-US".to_string());

        let options = DirectiveOptions {
            viewport_width: Some(480),
            headers: vec![("Authorization".to_string(), "Bearer mine".to_string())],
            pdf: true,
            ..Default::default()
        };
        let mut subs = BTreeMap::new();
        subs.insert("app".to_string(), "http://localhost:4000".to_string());

        let requests = handler(dir.path(), config)
            .requests(&directive("|app|/login", options), &subs)
            .unwrap();

        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.url, "http://localhost:4000/login");
        assert_eq!(req.raw_target, "|app|/login");
        assert_eq!(req.viewport, Viewport { width: 480, height: 960 });
        assert_eq!(req.headers["Authorization"], "Bearer mine");
        assert_eq!(req.locale.as_deref(), Some("en-US"));
        assert_eq!(req.color_scheme, ColorScheme::Null);
        assert_eq!(req.status_policy.raw(), "200,302");
        assert!(req.status_codes.is_none());
        assert!(req.pdf);
    }

    #[test]
    fn test_local_target_is_document_relative() {
        let dir = tempfile::tempdir().unwrap();
        let requests = handler(dir.path(), Config::default())
            .requests(&directive("./demo.html", Default::default()), &BTreeMap::new())
            .unwrap();
        assert_eq!(requests[0].url, "file:///docs/guide/demo.html");
    }

    #[tokio::test]
    async fn test_invalid_scheme_is_fatal_and_names_target() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WorkerPool::new(1, Arc::new(writing_mock(0)));

        let err = handler(dir.path(), Config::default())
            .handle(
                &directive("ftp://example.com/file", Default::default()),
                &BTreeMap::new(),
                &pool,
            )
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("guide/page.rst:12:"));
        assert!(message.contains("ftp://example.com/file"));
    }

    #[tokio::test]
    async fn test_unknown_browser_and_context_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WorkerPool::new(1, Arc::new(writing_mock(0)));
        let h = handler(dir.path(), Config::default());

        let browser = DirectiveOptions {
            browser: Some("netscape".to_string()),
            ..Default::default()
        };
        let err = h
            .handle(&directive("http://example.com", browser), &BTreeMap::new(), &pool)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("netscape"));

        let context = DirectiveOptions {
            context: Some("login".to_string()),
            ..Default::default()
        };
        let err = h
            .handle(&directive("http://example.com", context), &BTreeMap::new(), &pool)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("login"));
    }

    #[tokio::test]
    async fn test_same_directive_twice_captures_once() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(dir.path(), Config::default());
        h.cache.ensure_dir().await.unwrap();
        let pool = WorkerPool::new(1, Arc::new(writing_mock(1)));
        let d = directive("http://example.com", Default::default());

        let first = h.handle(&d, &BTreeMap::new(), &pool).await.unwrap();
        let second = h.handle(&d, &BTreeMap::new(), &pool).await.unwrap();

        assert_eq!(first.captures, 1);
        assert_eq!(second.captures, 0);
        assert_eq!(second.cache_hits, 1);
        assert_eq!(first.figures[0].image.uri, second.figures[0].image.uri);
        assert!(first.figures[0]
            .image
            .uri
            .starts_with("../_static/screenshots/"));
    }

    #[tokio::test]
    async fn test_auto_scheme_yields_light_then_dark() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(dir.path(), Config::default());
        h.cache.ensure_dir().await.unwrap();
        let pool = WorkerPool::new(1, Arc::new(writing_mock(2)));

        let options = DirectiveOptions {
            color_scheme: Some(ColorSchemeOption::Auto),
            ..Default::default()
        };
        let outcome = h
            .handle(&directive("http://example.com", options), &BTreeMap::new(), &pool)
            .await
            .unwrap();

        assert_eq!(outcome.figures.len(), 2);
        let (light, dark) = (&outcome.figures[0], &outcome.figures[1]);
        assert!(light.classes.contains(&"only-light".to_string()));
        assert!(light.image.classes.contains(&"only-light".to_string()));
        assert!(dark.classes.contains(&"only-dark".to_string()));
        assert!(dark.image.classes.contains(&"only-dark".to_string()));
        assert_ne!(light.image.uri, dark.image.uri);
    }

    #[tokio::test]
    async fn test_status_warning_becomes_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(dir.path(), Config::default());
        h.cache.ensure_dir().await.unwrap();

        let mut mock = MockCapturer::new();
        mock.expect_capture().times(1).returning(|req, paths| {
            std::fs::write(&paths.image, b"png").unwrap();
            Ok(CaptureReport {
                status: Some(404),
                warnings: req.status_policy.check(&req.url, 404).into_iter().collect(),
                ..Default::default()
            })
        });
        let pool = WorkerPool::new(1, Arc::new(mock));

        let outcome = h
            .handle(
                &directive("http://example.com/missing", Default::default()),
                &BTreeMap::new(),
                &pool,
            )
            .await
            .unwrap();

        assert_eq!(outcome.figures.len(), 1);
        assert_eq!(outcome.diagnostics.len(), 1);
        let warning = outcome.diagnostics[0].to_string();
        assert!(warning.contains("404"));
        assert!(warning.contains("200,302"));
        assert!(warning.starts_with("guide/page.rst:12: WARNING:"));
    }
}
