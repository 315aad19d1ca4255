use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::AcquireError;

#[derive(Debug, Clone, Error)]
pub enum ScreenshotError {
    #[error("Invalid URL: {0}. Only HTTP/HTTPS/FILE URLs or root/document-relative file paths are supported.")]
    InvalidTarget(String),

    #[error("Timeout error occurred at {url} in executing\n{script}")]
    Timeout { url: String, script: String },

    #[error("Page at {url} did not settle within {timeout:?}")]
    NetworkIdleTimeout { url: String, timeout: Duration },

    #[error("{}:{line}: {message}", document.display())]
    Directive {
        document: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Unknown browser profile: {0}")]
    UnknownBrowser(String),

    #[error("Unknown context builder: {0}")]
    UnknownContext(String),

    #[error("Unknown server factory: {0}")]
    UnknownApp(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Page error: {0}")]
    PageError(String),

    #[error("Screenshot capture failed: {0}")]
    CaptureFailed(String),

    #[error("PDF generation failed: {0}")]
    PdfFailed(String),

    #[error("Auxiliary server error: {0}")]
    ServerError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Capture pool is closed")]
    PoolClosed,

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Semaphore acquire error: {0}")]
    SemaphoreError(String),
}

impl ScreenshotError {
    pub fn directive(document: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        ScreenshotError::Directive {
            document: document.into(),
            line,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ScreenshotError::Directive { .. } => ErrorSeverity::Low,
            ScreenshotError::InvalidTarget(_) => ErrorSeverity::Low,
            ScreenshotError::ConfigurationError(_)
            | ScreenshotError::UnknownBrowser(_)
            | ScreenshotError::UnknownContext(_)
            | ScreenshotError::UnknownApp(_) => ErrorSeverity::High,
            ScreenshotError::BrowserLaunchFailed(_) => ErrorSeverity::High,
            ScreenshotError::PoolClosed => ErrorSeverity::Critical,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Whether the failure stems from configuration rather than a page.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScreenshotError::ConfigurationError(_)
                | ScreenshotError::UnknownBrowser(_)
                | ScreenshotError::UnknownContext(_)
                | ScreenshotError::UnknownApp(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<AcquireError> for ScreenshotError {
    fn from(err: AcquireError) -> Self {
        ScreenshotError::SemaphoreError(err.to_string())
    }
}

impl From<std::io::Error> for ScreenshotError {
    fn from(err: std::io::Error) -> Self {
        ScreenshotError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ScreenshotError {
    fn from(err: serde_json::Error) -> Self {
        ScreenshotError::SerializationError(err.to_string())
    }
}

impl From<walkdir::Error> for ScreenshotError {
    fn from(err: walkdir::Error) -> Self {
        ScreenshotError::IoError(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for ScreenshotError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScreenshotError::PageError(err.to_string())
    }
}
