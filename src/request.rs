//! Capture requests: the full, immutable parameter set of one screenshot.

use crate::{OutputFormat, ScreenshotError, Viewport};
use std::collections::BTreeMap;
use std::fmt;

/// Color scheme emulated in the page for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorScheme {
    Light,
    Dark,
    NoPreference,
    /// Leave `prefers-color-scheme` untouched.
    Null,
}

impl ColorScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorScheme::Light => "light",
            ColorScheme::Dark => "dark",
            ColorScheme::NoPreference => "no-preference",
            ColorScheme::Null => "null",
        }
    }

    /// CSS class that shows an artifact only under this scheme, for dual-theme output.
    pub fn only_class(&self) -> Option<&'static str> {
        match self {
            ColorScheme::Light => Some("only-light"),
            ColorScheme::Dark => Some("only-dark"),
            _ => None,
        }
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Color scheme as written in a directive or in the configuration.
///
/// `Auto` is the dual-theme sentinel: it expands into one light and one dark
/// capture and never reaches the capture worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSchemeOption {
    Fixed(ColorScheme),
    Auto,
}

impl ColorSchemeOption {
    pub fn parse(value: &str) -> Result<Self, ScreenshotError> {
        match value.trim() {
            "light" => Ok(Self::Fixed(ColorScheme::Light)),
            "dark" => Ok(Self::Fixed(ColorScheme::Dark)),
            "no-preference" => Ok(Self::Fixed(ColorScheme::NoPreference)),
            "null" | "" => Ok(Self::Fixed(ColorScheme::Null)),
            "auto" => Ok(Self::Auto),
            other => Err(ScreenshotError::ConfigurationError(format!(
                "invalid color scheme '{other}': expected light, dark, no-preference, null or auto"
            ))),
        }
    }

    /// The concrete schemes to capture, in output order.
    pub fn schemes(&self) -> Vec<ColorScheme> {
        match self {
            ColorSchemeOption::Fixed(scheme) => vec![*scheme],
            ColorSchemeOption::Auto => vec![ColorScheme::Light, ColorScheme::Dark],
        }
    }
}

/// Whitelist of HTTP status codes expected from the navigated document.
///
/// Keeps the list exactly as written so warnings can quote it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusPolicy {
    raw: String,
    codes: Vec<u16>,
}

impl StatusPolicy {
    pub const DEFAULT: &'static str = "200,302";

    pub fn parse(raw: &str) -> Result<Self, ScreenshotError> {
        let codes = raw
            .split(',')
            .map(|code| {
                code.trim().parse::<u16>().map_err(|_| {
                    ScreenshotError::ConfigurationError(format!(
                        "invalid status code list '{raw}': '{}' is not an HTTP status code",
                        code.trim()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            codes,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn codes(&self) -> &[u16] {
        &self.codes
    }

    pub fn allows(&self, status: u16) -> bool {
        self.codes.contains(&status)
    }

    /// Warning text for an unexpected status, `None` when the status is allowed.
    pub fn check(&self, url: &str, status: u16) -> Option<String> {
        if self.allows(status) {
            None
        } else {
            Some(format!(
                "Page {url} returned status code {status}, expected one of: {}",
                self.raw
            ))
        }
    }
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            raw: Self::DEFAULT.to_string(),
            codes: vec![200, 302],
        }
    }
}

/// Everything that controls one capture.
///
/// Built once by the directive handler and never mutated afterwards; two
/// requests with equal fields always map to the same cached artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Resolved http, https or file URL that the browser navigates to.
    pub url: String,
    /// Target as written in the directive, before substitution and path resolution.
    pub raw_target: String,
    pub browser: String,
    pub viewport: Viewport,
    pub device_scale_factor: u32,
    pub color_scheme: ColorScheme,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// JavaScript evaluated after the page settles, before capturing.
    pub interactions: String,
    /// Directive-facing name of the context builder, empty when none.
    pub context: String,
    pub full_page: bool,
    pub pdf: bool,
    /// Status codes as written in the directive; `None` falls back to the config default.
    pub status_codes: Option<String>,
    pub status_policy: StatusPolicy,
    pub format: OutputFormat,
}

impl CaptureRequest {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        format!(
            "{} [{} {}x{}@{}x {}]",
            self.url,
            self.browser,
            self.viewport.width,
            self.viewport.height,
            self.device_scale_factor,
            self.color_scheme
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_policy_parse() {
        let policy = StatusPolicy::parse("200, 201 ,302").unwrap();
        assert_eq!(policy.codes(), &[200, 201, 302]);
        assert_eq!(policy.raw(), "200, 201 ,302");
        assert!(policy.allows(201));
        assert!(!policy.allows(404));

        assert!(StatusPolicy::parse("200,ok").is_err());
        assert!(StatusPolicy::parse("").is_err());
    }

    #[test]
    fn test_status_warning_quotes_status_and_list() {
        let policy = StatusPolicy::default();
        assert!(policy.check("http://localhost:8000", 200).is_none());
        assert!(policy.check("http://localhost:8000", 302).is_none());

        let warning = policy.check("http://localhost:8000/missing", 404).unwrap();
        assert!(warning.contains("404"));
        assert!(warning.contains("200,302"));
        assert!(warning.contains("http://localhost:8000/missing"));
    }

    #[test]
    fn test_color_scheme_option() {
        assert_eq!(
            ColorSchemeOption::parse("dark").unwrap(),
            ColorSchemeOption::Fixed(ColorScheme::Dark)
        );
        assert_eq!(
            ColorSchemeOption::parse("null").unwrap().schemes(),
            vec![ColorScheme::Null]
        );
        assert_eq!(
            ColorSchemeOption::parse("auto").unwrap().schemes(),
            vec![ColorScheme::Light, ColorScheme::Dark]
        );
        assert!(ColorSchemeOption::parse("sepia").is_err());
    }

    #[test]
    fn test_only_class() {
        assert_eq!(ColorScheme::Light.only_class(), Some("only-light"));
        assert_eq!(ColorScheme::Dark.only_class(), Some("only-dark"));
        assert_eq!(ColorScheme::Null.only_class(), None);
    }
}
