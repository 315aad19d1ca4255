//! # docshot
//!
//! Embed live webpage screenshots into documentation at build time.
//!
//! docshot reads a tree of reStructuredText and Markdown (MyST) sources, finds
//! `screenshot` directives, captures each target page with a headless
//! Chromium driven over the DevTools protocol and writes the tree back out
//! with every directive replaced by a figure pointing at the captured image.
//!
//! ## Directives
//!
//! ```rst
//! .. screenshot:: |docs_app|/settings
//!    :viewport-width: 1024
//!    :color-scheme: auto
//!    :interactions:
//!       document.querySelector('#advanced').click();
//!
//!    The settings page with advanced options expanded.
//! ```
//!
//! ````markdown
//! ```{screenshot} ./demo/index.html
//! :full-page:
//! :status-code: 200,404
//! ```
//! ````
//!
//! ## Pipeline
//!
//! | Stage | Module | Notes |
//! |-------|--------|-------|
//! | Parse | [`document`], [`directive`] | rst and MyST blocks, `\|name\|` substitutions |
//! | Resolve | [`handler`] | directive options over config defaults, `auto` expands to light + dark |
//! | Cache | [`cache`] | SHA-256 fingerprint of every capture-affecting field |
//! | Capture | [`worker`], [`capture`] | bounded pool, one isolated browser context per capture |
//! | Render | [`nodes`] | rst `.. figure::` or HTML `<figure>` |
//!
//! Artifacts are written to `<out>/<static_dir>/screenshots/` and reused on
//! later builds as long as the fingerprint matches. Nothing is ever evicted.
//!
//! ## Auxiliary servers
//!
//! Registered apps are served on ephemeral localhost ports for the duration
//! of a build. Each becomes a substitution token holding its base URL, so a
//! directive can target `|app_name|/path` without knowing the port.
//!
//! ## Library use
//!
//! ```rust,no_run
//! use docshot::{BuildContext, Config, Registry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::discover("docs".as_ref()).await?;
//!     let context = BuildContext::new(config, Registry::default(), "docs", "_build").await?;
//!     let report = context.run().await?;
//!     println!("{} captures, {} cache hits", report.captures, report.cache_hits);
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! docshot build docs/ _build/
//! docshot capture https://example.com --output example.png --color-scheme dark
//! docshot validate docs/docshot.json
//! ```

/// Build-wide configuration and Chromium launch settings
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Directive parsing
pub mod directive;

/// Source documents split into text and directive segments
pub mod document;

/// Figure and image output nodes
pub mod nodes;

/// Capture requests and status code policies
pub mod request;

/// Fingerprints and the artifact directory
pub mod cache;

/// Directive handling: requests, cache lookups and figures
pub mod handler;

/// Chromium capture of one request
pub mod capture;

/// Network quiescence tracking for loaded pages
pub mod network_idle;

/// Bounded capture worker pool
pub mod worker;

/// Named context builders and auxiliary app factories
pub mod registry;

/// Auxiliary localhost servers
pub mod servers;

/// One build invocation
pub mod build;

/// Command-line interface implementation
pub mod cli;

/// Build metrics
pub mod metrics;

/// Utility functions and helpers
pub mod utils;


pub use crate::metrics::*;
pub use build::*;
pub use cache::*;
pub use capture::*;
pub use cli::*;
pub use config::*;
pub use directive::*;
pub use document::*;
pub use error::*;
pub use handler::*;
pub use network_idle::*;
pub use nodes::*;
pub use registry::*;
pub use request::*;
pub use servers::*;
pub use utils::*;
pub use worker::*;
