use crate::{
    ArtifactPaths, BuildContext, BuildReport, CaptureRequest, Capturer, ChromeCapturer,
    ColorSchemeOption, Config, Fingerprint, OutputFormat, Registry, StatusPolicy, Viewport,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "docshot")]
#[command(about = "Embed live webpage screenshots into documentation at build time")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Configuration file path (default: <source>/docshot.json)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Number of concurrent capture workers")]
    pub pool_size: Option<usize>,

    #[arg(long, global = true, help = "Per-phase page timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Chrome executable path for the default browser")]
    pub chrome_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a documentation tree, replacing screenshot directives with figures
    Build {
        #[arg(help = "Source directory")]
        source: PathBuf,

        #[arg(help = "Output directory")]
        output: PathBuf,
    },

    /// Capture a single page outside of any document
    Capture {
        #[arg(help = "URL or local file to capture")]
        target: String,

        #[arg(short, long, help = "Output image path")]
        output: PathBuf,

        #[arg(long, help = "Viewport width")]
        width: Option<u32>,

        #[arg(long, help = "Viewport height")]
        height: Option<u32>,

        #[arg(long, help = "Capture the full scrollable page")]
        full_page: bool,

        #[arg(long, help = "Color scheme (light, dark, no-preference, null)")]
        color_scheme: Option<String>,

        #[arg(long, help = "Also write a PDF next to the image")]
        pdf: bool,

        #[arg(long, help = "Output format (png, jpeg, webp)")]
        format: Option<String>,
    },

    /// Check a configuration file and the names it references
    Validate {
        #[arg(help = "Configuration file or source directory", default_value = ".")]
        path: PathBuf,
    },
}

pub struct CliRunner {
    config_path: Option<PathBuf>,
    pool_size: Option<usize>,
    timeout: Option<u64>,
    chrome_path: Option<PathBuf>,
}

impl CliRunner {
    pub fn new(cli: &Cli) -> Self {
        Self {
            config_path: cli.config.clone(),
            pool_size: cli.pool_size,
            timeout: cli.timeout,
            chrome_path: cli.chrome_path.clone(),
        }
    }

    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Build { source, output } => {
                let report = self.run_build(&source, &output).await?;
                println!("Build completed:");
                println!("  Documents: {}", report.documents);
                println!("  Directives: {}", report.directives);
                println!("  Captures: {}", report.captures);
                println!("  Cache hits: {}", report.cache_hits);
                println!("  Warnings: {}", report.diagnostics.len());
                println!(
                    "  Duration: {}",
                    crate::utils::format_duration(report.duration)
                );
                Ok(())
            }
            Commands::Capture {
                target,
                output,
                width,
                height,
                full_page,
                color_scheme,
                pdf,
                format,
            } => {
                let options = CaptureOptions {
                    width,
                    height,
                    full_page,
                    color_scheme,
                    pdf,
                    format,
                };
                self.run_capture(&target, &output, options).await
            }
            Commands::Validate { path } => self.validate_config(&path).await,
        }
    }

    /// Configuration for a source tree, with command line overrides applied.
    pub async fn load_config(&self, source_dir: &Path) -> Result<Config> {
        let mut config = match &self.config_path {
            Some(path) => Config::load(path).await?,
            None => Config::discover(source_dir).await?,
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(pool_size) = self.pool_size {
            config.pool_size = pool_size;
        }
        if let Some(timeout) = self.timeout {
            config.page_timeout_secs = timeout;
        }
        if let Some(chrome_path) = &self.chrome_path {
            config
                .browsers
                .entry(config.default_browser.clone())
                .or_default()
                .executable = Some(chrome_path.clone());
        }
    }

    pub async fn run_build(&self, source: &Path, output: &Path) -> Result<BuildReport> {
        info!(
            "Building {} into {}",
            source.display(),
            output.display()
        );
        let config = self.load_config(source).await?;
        info!(
            pool_size = config.pool_size,
            timeout_secs = config.page_timeout_secs,
            "Configuration loaded"
        );

        let context = BuildContext::new(config, Registry::default(), source, output).await?;
        let report = context.run().await?;

        for diagnostic in &report.diagnostics {
            warn!("{}", diagnostic);
        }
        Ok(report)
    }

    pub async fn run_capture(
        &self,
        target: &str,
        output: &Path,
        options: CaptureOptions,
    ) -> Result<()> {
        let cwd = std::env::current_dir()?;
        let config = self.load_config(&cwd).await?;
        let request = self.create_capture_request(&config, target, &cwd, &options)?;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        let paths = ArtifactPaths {
            fingerprint: Fingerprint::of(&request),
            image: output.to_path_buf(),
            pdf: output.with_extension("pdf"),
        };

        info!("Capturing {}", request.describe());
        let capturer = ChromeCapturer::new(Arc::new(config), Arc::new(Registry::default()));
        let report = capturer
            .capture(&request, &paths)
            .await
            .with_context(|| format!("capturing {target}"))?;

        for warning in &report.warnings {
            warn!("{}", warning);
        }

        println!("Screenshot captured successfully:");
        println!("  URL: {}", request.url);
        println!("  Output: {}", paths.image.display());
        if request.pdf {
            println!("  PDF: {}", paths.pdf.display());
        }
        if let Some(status) = report.status {
            println!("  Status: {status}");
        }
        println!(
            "  Duration: {}",
            crate::utils::format_duration(report.duration)
        );
        Ok(())
    }

    pub fn create_capture_request(
        &self,
        config: &Config,
        target: &str,
        cwd: &Path,
        options: &CaptureOptions,
    ) -> Result<CaptureRequest> {
        let url = crate::utils::resolve_target(target, cwd, cwd)?;

        let scheme = options
            .color_scheme
            .as_deref()
            .unwrap_or(&config.default_color_scheme);
        let color_scheme = match ColorSchemeOption::parse(scheme)? {
            ColorSchemeOption::Fixed(scheme) => scheme,
            ColorSchemeOption::Auto => {
                bail!("color scheme 'auto' needs a document; capture light and dark separately")
            }
        };

        let format = match options.format.as_deref() {
            Some(format) => OutputFormat::parse(format)?,
            None => config.output_format,
        };

        Ok(CaptureRequest {
            url,
            raw_target: target.to_string(),
            browser: config.default_browser.clone(),
            viewport: Viewport {
                width: options.width.unwrap_or(config.default_viewport_width),
                height: options.height.unwrap_or(config.default_viewport_height),
            },
            device_scale_factor: config.default_device_scale_factor,
            color_scheme,
            locale: config.default_locale.clone(),
            timezone: config.default_timezone.clone(),
            headers: config.default_headers.clone(),
            interactions: String::new(),
            context: String::new(),
            full_page: options.full_page || config.default_full_page,
            pdf: options.pdf,
            status_codes: None,
            status_policy: StatusPolicy::parse(&config.default_status_codes)?,
            format,
        })
    }

    pub async fn validate_config(&self, path: &Path) -> Result<()> {
        let config = match &self.config_path {
            Some(config_path) => Config::load(config_path).await?,
            None if path.is_dir() => Config::discover(path).await?,
            None => Config::load(path).await?,
        };
        config.validate()?;
        Registry::default().validate(&config)?;

        println!("Configuration is valid:");
        println!("  Pool size: {}", config.pool_size);
        println!("  Page timeout: {}s", config.page_timeout_secs);
        println!("  Output format: {:?}", config.output_format);
        println!(
            "  Viewport: {}x{}@{}x",
            config.default_viewport_width,
            config.default_viewport_height,
            config.default_device_scale_factor
        );
        println!(
            "  Browsers: {}",
            config.browsers.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        if !config.contexts.is_empty() {
            println!(
                "  Contexts: {}",
                config.contexts.keys().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        if !config.apps.is_empty() {
            println!(
                "  Apps: {}",
                config.apps.keys().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub full_page: bool,
    pub color_scheme: Option<String>,
    pub pdf: bool,
    pub format: Option<String>,
}

pub fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}
