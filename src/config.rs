//! Configuration management with serde serialization/deserialization
//!
//! This module holds the build-wide defaults that every `screenshot` directive
//! falls back to, together with browser profiles, pool sizing and output
//! settings. Configuration is read from a JSON file (by default `docshot.json`
//! at the root of the documentation source tree).

use crate::{ColorSchemeOption, ScreenshotError, StatusPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up in the source root.
pub const CONFIG_FILE_NAME: &str = "docshot.json";

/// Main configuration structure for a documentation build
///
/// Every `default_*` field is the value a directive gets when it does not set
/// the matching option itself.
///
/// # Examples
///
/// ```rust
/// use docshot::Config;
///
/// // Use default configuration
/// let config = Config::default();
/// assert_eq!(config.default_viewport_width, 1280);
///
/// // Capture two pages at a time on a larger default viewport
/// let config = Config {
///     pool_size: 2,
///     default_viewport_width: 1920,
///     default_viewport_height: 1200,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// JavaScript evaluated in every page before any of its own scripts run
    pub init_script: String,

    /// Viewport width in CSS pixels (default: 1280)
    pub default_viewport_width: u32,

    /// Viewport height in CSS pixels (default: 960)
    pub default_viewport_height: u32,

    /// Browser profile used when a directive names none (default: "chromium")
    pub default_browser: String,

    /// Capture the whole scrollable page instead of the viewport (default: false)
    pub default_full_page: bool,

    /// Preferred color scheme (default: "null", meaning no emulation)
    ///
    /// Use "auto" to capture a light and a dark variant of every screenshot.
    pub default_color_scheme: String,

    /// Device pixel ratio (default: 1)
    pub default_device_scale_factor: u32,

    /// Extra request headers sent with every navigation
    pub default_headers: BTreeMap<String, String>,

    /// Locale emulated in the page, e.g. "fr-FR"
    pub default_locale: Option<String>,

    /// Time zone emulated in the page, e.g. "Europe/Paris"
    pub default_timezone: Option<String>,

    /// Expected HTTP status codes of the navigated document (default: "200,302")
    ///
    /// Other codes produce a build warning, never a failure.
    pub default_status_codes: String,

    /// Directive-facing context names mapped to registered context builders
    pub contexts: BTreeMap<String, String>,

    /// Substitution names mapped to registered auxiliary server factories
    ///
    /// Each started server publishes `|name|` as its `http://localhost:<port>`
    /// base URL.
    pub apps: BTreeMap<String, String>,

    /// Additional `|name|` substitutions available to every document
    pub substitutions: BTreeMap<String, String>,

    /// Browser profiles by name
    pub browsers: BTreeMap<String, BrowserProfile>,

    /// Maximum number of captures running at the same time (default: 1)
    ///
    /// One keeps captures deterministic; raise it for large documentation
    /// sets on machines that can host several browsers.
    pub pool_size: usize,

    /// Timeout in seconds for navigation, interactions and context builders (default: 10)
    pub page_timeout_secs: u64,

    /// Image format of the captured artifacts (default: PNG)
    pub output_format: OutputFormat,

    /// Output subdirectory for static assets (default: "_static")
    pub static_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        let mut browsers = BTreeMap::new();
        browsers.insert("chromium".to_string(), BrowserProfile::default());

        Self {
            init_script: String::new(),
            default_viewport_width: 1280,
            default_viewport_height: 960,
            default_browser: "chromium".to_string(),
            default_full_page: false,
            default_color_scheme: "null".to_string(),
            default_device_scale_factor: 1,
            default_headers: BTreeMap::new(),
            default_locale: None,
            default_timezone: None,
            default_status_codes: "200,302".to_string(),
            contexts: BTreeMap::new(),
            apps: BTreeMap::new(),
            substitutions: BTreeMap::new(),
            browsers,
            pool_size: 1,
            page_timeout_secs: 10,
            output_format: OutputFormat::Png,
            static_dir: "_static".to_string(),
        }
    }
}

impl Config {
    /// Load a configuration file, rejecting invalid values.
    pub async fn load(path: &Path) -> Result<Self, ScreenshotError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ScreenshotError::ConfigurationError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `docshot.json` from `source_dir` when present, defaults otherwise.
    pub async fn discover(source_dir: &Path) -> Result<Self, ScreenshotError> {
        let candidate = source_dir.join(CONFIG_FILE_NAME);
        if tokio::fs::try_exists(&candidate).await? {
            Self::load(&candidate).await
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ScreenshotError> {
        let invalid = |msg: &str| Err(ScreenshotError::ConfigurationError(msg.to_string()));

        if self.pool_size == 0 {
            return invalid("pool_size must be greater than 0");
        }
        if self.page_timeout_secs == 0 {
            return invalid("page_timeout_secs must be greater than 0");
        }
        if self.default_viewport_width == 0 || self.default_viewport_height == 0 {
            return invalid("Viewport dimensions must be greater than 0");
        }
        if self.default_device_scale_factor == 0 {
            return invalid("default_device_scale_factor must be greater than 0");
        }
        if self.static_dir.is_empty() || Path::new(&self.static_dir).is_absolute() {
            return invalid("static_dir must be a relative directory name");
        }

        StatusPolicy::parse(&self.default_status_codes)?;
        ColorSchemeOption::parse(&self.default_color_scheme)?;

        if !self.browsers.contains_key(&self.default_browser) {
            return Err(ScreenshotError::UnknownBrowser(self.default_browser.clone()));
        }

        Ok(())
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn browser_profile(&self, name: &str) -> Result<&BrowserProfile, ScreenshotError> {
        self.browsers
            .get(name)
            .ok_or_else(|| ScreenshotError::UnknownBrowser(name.to_string()))
    }

    /// Directory under the output root that receives the captured artifacts.
    pub fn screenshots_dir(&self, outdir: &Path) -> PathBuf {
        outdir.join(&self.static_dir).join("screenshots")
    }
}

/// A named Chromium-family browser installation
///
/// Directives select a profile with the `browser` option. Every profile is
/// driven over the DevTools protocol, so it must point at Chromium, Chrome,
/// Edge or another Chromium derivative.
///
/// # Examples
///
/// ```rust
/// use docshot::BrowserProfile;
///
/// let chrome = BrowserProfile {
///     executable: Some("/usr/bin/google-chrome".into()),
///     args: vec!["--lang=en-US".to_string()],
/// };
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserProfile {
    /// Path to the browser executable (default: auto-detect)
    pub executable: Option<PathBuf>,

    /// Extra command-line arguments appended to the defaults
    pub args: Vec<String>,
}

/// Page viewport in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Supported output image formats for screenshots
///
/// Each format has different characteristics:
/// - PNG: Lossless compression, larger files, best quality
/// - JPEG: Lossy compression, smaller files, good for photos
/// - WebP: Modern format with excellent compression and quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG format - lossless compression, best quality
    Png,
    /// JPEG format - lossy compression, smaller files
    Jpeg,
    /// WebP format - modern compression, good balance of size and quality
    Webp,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ScreenshotError> {
        match value.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "webp" => Ok(OutputFormat::Webp),
            other => Err(ScreenshotError::ConfigurationError(format!(
                "unsupported output format: {other}"
            ))),
        }
    }
}

/// Generate Chrome command-line arguments for one capture session
///
/// The defaults favour reproducible pixels: no scrollbars, no GPU, no font
/// hinting. Profile arguments are appended last so they can override them.
///
/// # Examples
///
/// ```rust
/// use docshot::{get_chrome_args, BrowserProfile, Viewport};
///
/// let args = get_chrome_args(&BrowserProfile::default(), Viewport { width: 480, height: 320 });
/// assert!(args.contains(&"--window-size=480,320".to_string()));
/// ```
pub fn get_chrome_args(profile: &BrowserProfile, viewport: Viewport) -> Vec<String> {
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--hide-scrollbars".to_string(),
        "--mute-audio".to_string(),
        "--font-render-hinting=none".to_string(),
        format!("--window-size={},{}", viewport.width, viewport.height),
    ];

    args.extend(profile.args.iter().cloned());
    args
}

/// Build the chromiumoxide launch configuration for one capture session
///
/// Each session gets its own user data directory so concurrent captures never
/// share a browser profile.
pub fn create_browser_config(
    profile: &BrowserProfile,
    viewport: Viewport,
    device_scale_factor: u32,
    user_data_dir: &Path,
) -> Result<chromiumoxide::browser::BrowserConfig, ScreenshotError> {
    use chromiumoxide::browser::BrowserConfig;
    use chromiumoxide::handler::viewport::Viewport as ChromeViewport;

    let mut builder = BrowserConfig::builder()
        .window_size(viewport.width, viewport.height)
        .viewport(ChromeViewport {
            width: viewport.width,
            height: viewport.height,
            device_scale_factor: Some(device_scale_factor as f64),
            emulating_mobile: false,
            is_landscape: viewport.width > viewport.height,
            has_touch: false,
        })
        .user_data_dir(user_data_dir)
        .args(get_chrome_args(profile, viewport));

    if let Some(executable) = &profile.executable {
        builder = builder.chrome_executable(executable);
    }

    builder
        .build()
        .map_err(ScreenshotError::BrowserLaunchFailed)
}
