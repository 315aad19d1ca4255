//! Content-addressed artifact store.
//!
//! Artifacts are named after a fingerprint of every capture-affecting field of
//! a [`CaptureRequest`]. They are never evicted: a file stays in the output
//! directory until someone deletes it, so a clean output directory is the only
//! way to force fresh captures.

use crate::{CaptureRequest, ScreenshotError};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Deterministic hash of a capture request, used as artifact file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Field order and formatting are part of the cache format. Changing either
    /// silently invalidates every existing artifact.
    pub fn of(request: &CaptureRequest) -> Self {
        let headers = request
            .headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}"))
            .collect::<Vec<_>>()
            .join("\n");

        let input = [
            target_key(request).to_string(),
            request.browser.clone(),
            request.viewport.height.to_string(),
            request.viewport.width.to_string(),
            request.color_scheme.as_str().to_string(),
            request.context.clone(),
            request.interactions.clone(),
            request.full_page.to_string(),
            request.device_scale_factor.to_string(),
            request.status_codes.clone().unwrap_or_default(),
            request.locale.clone().unwrap_or_default(),
            request.timezone.clone().unwrap_or_default(),
            headers,
            request.format.extension().to_string(),
        ]
        .join("_");

        Self(hex::encode(Sha256::digest(input.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Target part of the fingerprint.
///
/// Local files are keyed by their resolved URL, since the same relative path
/// names different files in different documents. Network targets keep the
/// target as written, so a new auxiliary server port reuses existing artifacts.
fn target_key(request: &CaptureRequest) -> &str {
    if request.url.starts_with("file:") {
        &request.url
    } else {
        &request.raw_target
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Files belonging to one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub fingerprint: Fingerprint,
    pub image: PathBuf,
    pub pdf: PathBuf,
}

impl ArtifactPaths {
    /// Image file name, e.g. `3f2a...e1.png`.
    pub fn file_name(&self) -> String {
        self.image
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Artifact directory of one output tree.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<(), ScreenshotError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn paths(&self, request: &CaptureRequest) -> ArtifactPaths {
        let fingerprint = Fingerprint::of(request);
        let image = self
            .dir
            .join(format!("{}.{}", fingerprint, request.format.extension()));
        let pdf = self.dir.join(format!("{fingerprint}.pdf"));

        ArtifactPaths {
            fingerprint,
            image,
            pdf,
        }
    }

    /// Cache hit test: the image exists and, when a PDF is wanted, so does the PDF.
    pub async fn is_complete(&self, request: &CaptureRequest, paths: &ArtifactPaths) -> bool {
        let image = tokio::fs::try_exists(&paths.image).await.unwrap_or(false);
        if !image || !request.pdf {
            return image;
        }
        tokio::fs::try_exists(&paths.pdf).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColorScheme, OutputFormat, StatusPolicy, Viewport};
    use std::collections::BTreeMap;

    fn request() -> CaptureRequest {
        CaptureRequest {
            url: "http://localhost:8000/".to_string(),
            raw_target: "|example|".to_string(),
            browser: "chromium".to_string(),
            viewport: Viewport {
                width: 480,
                height: 320,
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

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = Fingerprint::of(&request());
        let b = Fingerprint::of(&request());
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_each_field() {
        let base = Fingerprint::of(&request());

        let variants: Vec<Box<dyn Fn(&mut CaptureRequest)>> = vec![
            Box::new(|r: &mut CaptureRequest| r.viewport.width = 1920),
            Box::new(|r: &mut CaptureRequest| r.viewport.height = 1200),
            Box::new(|r: &mut CaptureRequest| r.raw_target = "http://example.com".to_string()),
            Box::new(|r: &mut CaptureRequest| r.browser = "chrome".to_string()),
            Box::new(|r: &mut CaptureRequest| r.color_scheme = ColorScheme::Dark),
            Box::new(|r: &mut CaptureRequest| r.context = "warm".to_string()),
            Box::new(|r: &mut CaptureRequest| r.interactions = "document.body.remove()".to_string()),
            Box::new(|r: &mut CaptureRequest| r.full_page = true),
            Box::new(|r: &mut CaptureRequest| r.device_scale_factor = 2),
            Box::new(|r: &mut CaptureRequest| r.status_codes = Some("404".to_string())),
            Box::new(|r: &mut CaptureRequest| r.locale = Some("fr-FR".to_string())),
            Box::new(|r: &mut CaptureRequest| r.timezone = Some("Asia/Tokyo".to_string())),
            Box::new(|r: &mut CaptureRequest| {
                r.headers
                    .insert("Authorization".to_string(), "Bearer x".to_string());
            }),
            Box::new(|r: &mut CaptureRequest| r.format = OutputFormat::Jpeg),
        ];

        for mutate in variants {
            let mut changed = request();
            mutate(&mut changed);
            assert_ne!(Fingerprint::of(&changed), base);
        }
    }

    #[test]
    fn test_fingerprint_target_key() {
        // Server port changes keep the artifact.
        let mut moved = request();
        moved.url = "http://localhost:9999/".to_string();
        assert_eq!(Fingerprint::of(&moved), Fingerprint::of(&request()));

        // One relative path, two documents, two files.
        let mut in_a = request();
        in_a.raw_target = "./demo.html".to_string();
        in_a.url = "file:///docs/a/demo.html".to_string();
        let mut in_b = in_a.clone();
        in_b.url = "file:///docs/b/demo.html".to_string();
        assert_ne!(Fingerprint::of(&in_a), Fingerprint::of(&in_b));

        let mut same_file = in_a.clone();
        same_file.raw_target = "/a/demo.html".to_string();
        assert_eq!(Fingerprint::of(&same_file), Fingerprint::of(&in_a));
    }

    #[tokio::test]
    async fn test_cache_completeness_accounts_for_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let mut req = request();
        let paths = cache.paths(&req);

        assert!(paths.image.starts_with(dir.path()));
        assert_eq!(paths.file_name(), format!("{}.png", paths.fingerprint));
        assert!(!cache.is_complete(&req, &paths).await);

        tokio::fs::write(&paths.image, b"png").await.unwrap();
        assert!(cache.is_complete(&req, &paths).await);

        req.pdf = true;
        let pdf_paths = cache.paths(&req);
        assert_eq!(pdf_paths, paths);
        assert!(!cache.is_complete(&req, &pdf_paths).await);

        tokio::fs::write(&pdf_paths.pdf, b"pdf").await.unwrap();
        assert!(cache.is_complete(&req, &pdf_paths).await);
    }
}
