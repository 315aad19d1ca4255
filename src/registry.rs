//! Named context builders and auxiliary server factories.
//!
//! Configuration refers to both by name (`contexts` and `apps`); the registry
//! resolves those names when a build is constructed, so a typo fails before
//! any document is processed.

use crate::{ColorScheme, Config, ScreenshotError};
use async_trait::async_trait;
use axum::Router;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::debug;

/// Prefix of the built-in server factory that serves a source directory.
pub const STATIC_APP_PREFIX: &str = "static:";

/// Builds the browsing context a capture runs in.
///
/// Replaces the built-in context: the capture page is opened in the returned
/// context and no color scheme, locale or timezone emulation is applied on
/// top of it. Bounded by the page timeout.
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    async fn build(
        &self,
        browser: &mut Browser,
        url: &str,
        color_scheme: ColorScheme,
    ) -> Result<BrowserContextId, ScreenshotError>;
}

/// Builds the router of an auxiliary server.
pub trait AppFactory: Send + Sync {
    fn router(&self, source_dir: &Path) -> Result<Router, ScreenshotError>;
}

impl<F> AppFactory for F
where
    F: Fn(&Path) -> Result<Router, ScreenshotError> + Send + Sync,
{
    fn router(&self, source_dir: &Path) -> Result<Router, ScreenshotError> {
        self(source_dir)
    }
}

/// Opens the target once in a fresh isolated context before handing it over,
/// so the capture sees warm caches and any cookies the first visit set.
pub struct WarmupContext;

#[async_trait]
impl ContextBuilder for WarmupContext {
    async fn build(
        &self,
        browser: &mut Browser,
        url: &str,
        _color_scheme: ColorScheme,
    ) -> Result<BrowserContextId, ScreenshotError> {
        let context_id = browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await?;

        let target = CreateTargetParams::builder()
            .url(url)
            .browser_context_id(context_id.clone())
            .build()
            .map_err(ScreenshotError::PageError)?;
        let page = browser.new_page(target).await?;
        page.wait_for_navigation().await?;
        page.close().await?;

        debug!(url, "warmed up context");
        Ok(context_id)
    }
}

/// Serves a directory, relative to the source root, as a static site.
pub struct StaticDirApp {
    dir: PathBuf,
}

impl StaticDirApp {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl AppFactory for StaticDirApp {
    fn router(&self, source_dir: &Path) -> Result<Router, ScreenshotError> {
        let root = source_dir.join(&self.dir);
        if !root.is_dir() {
            return Err(ScreenshotError::ConfigurationError(format!(
                "static app directory does not exist: {}",
                root.display()
            )));
        }
        Ok(Router::new().fallback_service(ServeDir::new(root)))
    }
}

#[derive(Clone)]
pub struct Registry {
    contexts: HashMap<String, Arc<dyn ContextBuilder>>,
    apps: HashMap<String, Arc<dyn AppFactory>>,
}

impl Registry {
    /// A registry without any entry, not even the built-ins.
    pub fn empty() -> Self {
        Self {
            contexts: HashMap::new(),
            apps: HashMap::new(),
        }
    }

    pub fn register_context(
        &mut self,
        name: impl Into<String>,
        builder: impl ContextBuilder + 'static,
    ) -> &mut Self {
        self.contexts.insert(name.into(), Arc::new(builder));
        self
    }

    pub fn register_app(
        &mut self,
        name: impl Into<String>,
        factory: impl AppFactory + 'static,
    ) -> &mut Self {
        self.apps.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn context_builder(&self, reference: &str) -> Result<Arc<dyn ContextBuilder>, ScreenshotError> {
        self.contexts
            .get(reference)
            .cloned()
            .ok_or_else(|| ScreenshotError::UnknownContext(reference.to_string()))
    }

    /// Resolve a server factory reference; `static:<dir>` needs no registration.
    pub fn app_factory(&self, reference: &str) -> Result<Arc<dyn AppFactory>, ScreenshotError> {
        if let Some(factory) = self.apps.get(reference) {
            return Ok(factory.clone());
        }
        match reference.strip_prefix(STATIC_APP_PREFIX) {
            Some(dir) if !dir.is_empty() => Ok(Arc::new(StaticDirApp::new(dir))),
            _ => Err(ScreenshotError::UnknownApp(reference.to_string())),
        }
    }

    /// Check every reference in `config` against the registry.
    pub fn validate(&self, config: &Config) -> Result<(), ScreenshotError> {
        for reference in config.contexts.values() {
            self.context_builder(reference)?;
        }
        for reference in config.apps.values() {
            self.app_factory(reference)?;
        }
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_context("warmup", WarmupContext);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello(_: &Path) -> Result<Router, ScreenshotError> {
        Ok(Router::new().route("/", axum::routing::get(|| async { "hello" })))
    }

    #[test]
    fn test_builtins() {
        let registry = Registry::default();
        assert!(registry.context_builder("warmup").is_ok());
        assert!(registry.app_factory("static:site").is_ok());
        assert!(matches!(
            registry.app_factory("static:"),
            Err(ScreenshotError::UnknownApp(_))
        ));
    }

    #[test]
    fn test_validate_reports_unknown_names() {
        let mut registry = Registry::default();
        registry.register_app("hello", hello);

        let mut config = Config::default();
        config.apps.insert("app".to_string(), "hello".to_string());
        config.contexts.insert("warm".to_string(), "warmup".to_string());
        assert!(registry.validate(&config).is_ok());

        config.contexts.insert("login".to_string(), "myapp.login".to_string());
        assert!(matches!(
            registry.validate(&config),
            Err(ScreenshotError::UnknownContext(name)) if name == "myapp.login"
        ));

        config.contexts.remove("login");
        config.apps.insert("other".to_string(), "nope".to_string());
        assert!(matches!(
            registry.validate(&config),
            Err(ScreenshotError::UnknownApp(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_static_dir_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("site")).unwrap();

        assert!(StaticDirApp::new("site").router(dir.path()).is_ok());
        assert!(StaticDirApp::new("missing").router(dir.path()).is_err());
    }
}
