//! Chromium capture session: one browser process per capture request
//!
//! [`ChromeCapturer`] launches a fresh browser for every request, configures
//! an isolated browsing context, navigates, runs the interaction script and
//! writes the screenshot (and optional PDF) to the fingerprinted paths.
//!
//! # Examples
//!
//! ```rust,no_run
//! use docshot::{ArtifactCache, Capturer, ChromeCapturer, Config, Registry};
//! use std::sync::Arc;
//!
//! # async fn run(request: docshot::CaptureRequest) -> Result<(), docshot::ScreenshotError> {
//! let capturer = ChromeCapturer::new(Arc::new(Config::default()), Arc::new(Registry::default()));
//! let cache = ArtifactCache::new("_build/_static/screenshots");
//! cache.ensure_dir().await?;
//!
//! let paths = cache.paths(&request);
//! let report = capturer.capture(&request, &paths).await?;
//! println!("status: {:?}", report.status);
//! # Ok(())
//! # }
//! ```

use crate::{
    create_browser_config, ArtifactPaths, CaptureRequest, ColorScheme, Config, NetworkIdleWatcher,
    OutputFormat, Registry, ScreenshotError,
};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{
    MediaFeature, SetDeviceMetricsOverrideParams, SetEmulatedMediaParams,
    SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, PrintToPdfParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// CSS pixels per inch, used to size PDF pages after the viewport.
const CSS_PX_PER_INCH: f64 = 96.0;

/// How long to wait after navigation for the main document response event.
const STATUS_GRACE: Duration = Duration::from_millis(500);

/// Outcome of one successful capture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureReport {
    /// Status of the main document response, if one was seen.
    pub status: Option<u16>,
    /// Non-fatal problems, such as an unexpected status code.
    pub warnings: Vec<String>,
    pub duration: Duration,
}

/// Produces the artifacts of one capture request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Capturer: Send + Sync {
    async fn capture(
        &self,
        request: &CaptureRequest,
        paths: &ArtifactPaths,
    ) -> Result<CaptureReport, ScreenshotError>;
}

pub struct ChromeCapturer {
    config: Arc<Config>,
    registry: Arc<Registry>,
}

impl ChromeCapturer {
    pub fn new(config: Arc<Config>, registry: Arc<Registry>) -> Self {
        Self { config, registry }
    }

    async fn launch(&self, request: &CaptureRequest) -> Result<BrowserSession, ScreenshotError> {
        let profile = self.config.browser_profile(&request.browser)?;
        let user_data_dir =
            std::env::temp_dir().join(format!("docshot-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&user_data_dir).await.map_err(|e| {
            ScreenshotError::BrowserLaunchFailed(format!("Failed to create user data dir: {e}"))
        })?;

        let browser_config = create_browser_config(
            profile,
            request.viewport,
            request.device_scale_factor,
            &user_data_dir,
        )?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScreenshotError::BrowserLaunchFailed(e.to_string()))?;

        // The handler drives all DevTools traffic and must be polled for the session lifetime.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Handler error: {}", e);
                }
            }
        });

        Ok(BrowserSession {
            browser,
            handler_task,
            user_data_dir,
        })
    }

    async fn open_page(
        &self,
        browser: &mut Browser,
        request: &CaptureRequest,
    ) -> Result<(Page, bool), ScreenshotError> {
        let (context_id, custom) = if request.context.is_empty() {
            let id = browser
                .create_browser_context(CreateBrowserContextParams::default())
                .await?;
            (id, false)
        } else {
            (self.build_custom_context(browser, request).await?, true)
        };

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id)
            .build()
            .map_err(ScreenshotError::PageError)?;
        let page = browser.new_page(target).await?;

        Ok((page, custom))
    }

    async fn build_custom_context(
        &self,
        browser: &mut Browser,
        request: &CaptureRequest,
    ) -> Result<BrowserContextId, ScreenshotError> {
        let reference = self
            .config
            .contexts
            .get(&request.context)
            .ok_or_else(|| ScreenshotError::UnknownContext(request.context.clone()))?;
        let builder = self.registry.context_builder(reference)?;

        debug!(context = %request.context, builder = %reference, "building custom context");
        timeout(
            self.config.page_timeout(),
            builder.build(browser, &request.url, request.color_scheme),
        )
        .await
        .map_err(|_| ScreenshotError::Timeout {
            url: request.url.clone(),
            script: reference.clone(),
        })?
    }

    async fn drive_page(
        &self,
        page: &Page,
        request: &CaptureRequest,
        paths: &ArtifactPaths,
        custom_context: bool,
    ) -> Result<CaptureReport, ScreenshotError> {
        let page_timeout = self.config.page_timeout();
        let timed_out = || ScreenshotError::Timeout {
            url: request.url.clone(),
            script: request.interactions.clone(),
        };

        let device_metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(request.viewport.width))
            .height(i64::from(request.viewport.height))
            .device_scale_factor(f64::from(request.device_scale_factor))
            .mobile(false)
            .build()
            .map_err(ScreenshotError::PageError)?;
        page.execute(device_metrics).await?;

        // A custom context builder owns the context-level emulation.
        if !custom_context {
            emulate_media(page, request.color_scheme, None).await?;
            if let Some(locale) = &request.locale {
                page.execute(SetLocaleOverrideParams::builder().locale(locale.clone()).build())
                    .await?;
            }
            if let Some(timezone) = &request.timezone {
                page.execute(SetTimezoneOverrideParams::new(timezone.clone()))
                    .await?;
            }
        }

        if !self.config.init_script.is_empty() {
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
                self.config.init_script.clone(),
            ))
            .await?;
        }

        let headers = effective_headers(request, custom_context);
        if !headers.is_empty() {
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(
                serde_json::to_value(&headers)?,
            )))
            .await?;
        }

        let watcher = NetworkIdleWatcher::attach(page).await?;

        debug!(url = %request.url, "navigating");
        timeout(page_timeout, page.goto(request.url.as_str()))
            .await
            .map_err(|_| timed_out())??;

        let status = if request.url.starts_with("file:") {
            None
        } else {
            watcher.wait_for_document_status(STATUS_GRACE).await
        };
        let mut warnings = Vec::new();
        if let Some(warning) = status_warning(request, status) {
            warn!("{}", warning);
            warnings.push(warning);
        }

        if !watcher.wait_for_idle(page_timeout).await {
            return Err(timed_out());
        }

        if !request.interactions.trim().is_empty() {
            let script = EvaluateParams::builder()
                .expression(request.interactions.clone())
                .await_promise(true)
                .build()
                .map_err(ScreenshotError::PageError)?;
            timeout(page_timeout, page.evaluate(script))
                .await
                .map_err(|_| timed_out())??;
            if !watcher.wait_for_idle(page_timeout).await {
                return Err(timed_out());
            }
        }

        let png = page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(request.full_page)
                    .build(),
            )
            .await
            .map_err(|e| ScreenshotError::CaptureFailed(e.to_string()))?;
        let data = convert_image_format(png, request.format)?;
        tokio::fs::write(&paths.image, &data).await?;

        if request.pdf {
            emulate_media(page, emulated_scheme(request, custom_context), Some("screen")).await?;
            let pdf = page
                .pdf(
                    PrintToPdfParams::builder()
                        .paper_width(f64::from(request.viewport.width) / CSS_PX_PER_INCH)
                        .paper_height(f64::from(request.viewport.height) / CSS_PX_PER_INCH)
                        .print_background(true)
                        .build(),
                )
                .await
                .map_err(|e| ScreenshotError::PdfFailed(e.to_string()))?;
            tokio::fs::write(&paths.pdf, &pdf).await?;
        }

        Ok(CaptureReport {
            status: status.or_else(|| watcher.document_status()),
            warnings,
            duration: Duration::ZERO,
        })
    }
}

#[async_trait]
impl Capturer for ChromeCapturer {
    async fn capture(
        &self,
        request: &CaptureRequest,
        paths: &ArtifactPaths,
    ) -> Result<CaptureReport, ScreenshotError> {
        let started = Instant::now();
        let mut session = self.launch(request).await?;

        let outcome = match self.open_page(&mut session.browser, request).await {
            Ok((page, custom)) => {
                let result = self.drive_page(&page, request, paths, custom).await;
                if let Err(e) = page.close().await {
                    debug!("Failed to close page: {}", e);
                }
                result
            }
            Err(e) => Err(e),
        };

        session.close().await;

        let report = outcome.map(|mut report| {
            report.duration = started.elapsed();
            report
        })?;

        info!(
            file = %paths.file_name(),
            duration_ms = report.duration.as_millis() as u64,
            "captured {}",
            request.describe()
        );
        Ok(report)
    }
}

struct BrowserSession {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    user_data_dir: std::path::PathBuf,
}

impl BrowserSession {
    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Failed to wait for browser exit: {}", e);
        }
        self.handler_task.abort();
        if let Err(e) = tokio::fs::remove_dir_all(&self.user_data_dir).await {
            debug!(dir = %self.user_data_dir.display(), "Failed to remove user data dir: {}", e);
        }
    }
}

async fn emulate_media(
    page: &Page,
    scheme: ColorScheme,
    media: Option<&str>,
) -> Result<(), ScreenshotError> {
    let features = match scheme {
        ColorScheme::Null => Vec::new(),
        other => vec![MediaFeature::new("prefers-color-scheme", other.as_str())],
    };
    if features.is_empty() && media.is_none() {
        return Ok(());
    }

    let mut params = SetEmulatedMediaParams::builder().features(features);
    if let Some(media) = media {
        params = params.media(media);
    }
    page.execute(params.build()).await?;
    Ok(())
}

/// Color scheme the capturer emulates itself. Custom contexts bring their own.
pub fn emulated_scheme(request: &CaptureRequest, custom_context: bool) -> ColorScheme {
    if custom_context {
        ColorScheme::Null
    } else {
        request.color_scheme
    }
}

/// Warning for an unexpected main document status. Local files have none.
pub fn status_warning(request: &CaptureRequest, status: Option<u16>) -> Option<String> {
    if request.url.starts_with("file:") {
        return None;
    }
    status.and_then(|status| request.status_policy.check(&request.url, status))
}

/// Request headers plus an `Accept-Language` derived from the locale,
/// unless a header already sets it or a custom context owns the locale.
pub fn effective_headers(request: &CaptureRequest, custom_context: bool) -> BTreeMap<String, String> {
    let mut headers = request.headers.clone();
    if let Some(locale) = request.locale.as_ref().filter(|_| !custom_context) {
        let overridden = headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("accept-language"));
        if !overridden {
            headers.insert("Accept-Language".to_string(), locale.clone());
        }
    }
    headers
}

/// Re-encode a PNG capture in the requested output format.
pub fn convert_image_format(png_data: Vec<u8>, format: OutputFormat) -> Result<Vec<u8>, ScreenshotError> {
    let target = match format {
        OutputFormat::Png => return Ok(png_data),
        OutputFormat::Jpeg => image::ImageFormat::Jpeg,
        OutputFormat::Webp => image::ImageFormat::WebP,
    };

    let img = image::load_from_memory(&png_data)
        .map_err(|e| ScreenshotError::CaptureFailed(e.to_string()))?;
    // JPEG has no alpha channel.
    let img = match format {
        OutputFormat::Jpeg => image::DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => img,
    };

    let mut data = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut data), target)
        .map_err(|e| ScreenshotError::CaptureFailed(e.to_string()))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StatusPolicy, Viewport};

    fn request() -> CaptureRequest {
        CaptureRequest {
            url: "http://localhost:8000/".to_string(),
            raw_target: "http://localhost:8000/".to_string(),
            browser: "chromium".to_string(),
            viewport: Viewport {
                width: 4,
                height: 4,
            },
            device_scale_factor: 1,
            color_scheme: ColorScheme::Null,
            locale: None,
            timezone: None,
            headers: BTreeMap::new(),
            interactions: String::new(),
            context: String::new(),
            full_page: false,
            pdf: false,
            status_codes: None,
            status_policy: StatusPolicy::default(),
            format: OutputFormat::Png,
        }
    }

    fn png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
        let mut data = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();
        data
    }

    #[test]
    fn test_locale_sets_accept_language() {
        let mut req = request();
        req.locale = Some("fr-FR".to_string());
        assert_eq!(effective_headers(&req, false)["Accept-Language"], "fr-FR");

        req.headers
            .insert("accept-language".to_string(), "de-DE".to_string());
        let headers = effective_headers(&req, false);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["accept-language"], "de-DE");
    }

    #[test]
    fn test_no_locale_keeps_headers() {
        assert!(effective_headers(&request(), false).is_empty());
    }

    #[test]
    fn test_custom_context_owns_emulation() {
        let mut req = request();
        req.locale = Some("fr-FR".to_string());
        req.color_scheme = ColorScheme::Dark;
        req.headers
            .insert("Authorization".to_string(), "Bearer x".to_string());

        let headers = effective_headers(&req, true);
        assert!(!headers.contains_key("Accept-Language"));
        assert_eq!(headers["Authorization"], "Bearer x");

        assert_eq!(emulated_scheme(&req, true), ColorScheme::Null);
        assert_eq!(emulated_scheme(&req, false), ColorScheme::Dark);
    }

    #[test]
    fn test_status_warning() {
        let mut req = request();
        req.status_policy = StatusPolicy::parse("200").unwrap();

        assert_eq!(status_warning(&req, Some(200)), None);
        assert_eq!(status_warning(&req, None), None);
        let warning = status_warning(&req, Some(404)).unwrap();
        assert!(warning.contains("404"));
        assert!(warning.contains("expected one of: 200"));

        req.url = "file:///docs/page.html".to_string();
        assert_eq!(status_warning(&req, Some(404)), None);
    }

    #[test]
    fn test_convert_image_format() {
        let data = png();
        assert_eq!(convert_image_format(data.clone(), OutputFormat::Png).unwrap(), data);

        let jpeg = convert_image_format(data, OutputFormat::Jpeg).unwrap();
        assert_eq!(
            image::guess_format(&jpeg).unwrap(),
            image::ImageFormat::Jpeg
        );

        assert!(convert_image_format(b"not a png".to_vec(), OutputFormat::Webp).is_err());
    }

    #[tokio::test]
    async fn test_mock_capturer() {
        let mut mock = MockCapturer::new();
        mock.expect_capture().times(1).returning(|_, _| {
            Ok(CaptureReport {
                status: Some(200),
                ..Default::default()
            })
        });

        let cache = crate::ArtifactCache::new("out");
        let req = request();
        let report = mock.capture(&req, &cache.paths(&req)).await.unwrap();
        assert_eq!(report.status, Some(200));
    }
}
