use crate::ScreenshotError;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use url::Url;

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "file"];

/// Replace every `|name|` token with its value. Unknown tokens are left as written.
pub fn substitute(text: &str, substitutions: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('|') {
        let after = &rest[start + 1..];
        match after.find('|') {
            Some(end) if substitutions.contains_key(&after[..end]) => {
                out.push_str(&rest[..start]);
                out.push_str(&substitutions[&after[..end]]);
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str(&rest[..=start]);
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Turn a directive target into the URL the browser navigates to.
///
/// Targets without a scheme are local paths: a leading `/` is relative to
/// `source_dir`, anything else to `document_dir` (which is itself relative to
/// `source_dir`).
pub fn resolve_target(
    target: &str,
    source_dir: &Path,
    document_dir: &Path,
) -> Result<String, ScreenshotError> {
    let url = match Url::parse(target) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let path = match target.strip_prefix('/') {
                Some(root_relative) => source_dir.join(root_relative),
                None => source_dir.join(document_dir).join(target),
            };
            let path = normalize_path(&absolute(&path)?);
            Url::from_file_path(&path)
                .map_err(|_| ScreenshotError::InvalidTarget(path.display().to_string()))?
        }
        Err(_) => return Err(ScreenshotError::InvalidTarget(target.to_string())),
    };

    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(ScreenshotError::InvalidTarget(target.to_string()));
    }

    Ok(url.to_string())
}

fn absolute(path: &Path) -> Result<PathBuf, ScreenshotError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// URI of an artifact as seen from a document's output location.
///
/// `document` is the document path relative to the source root; the output
/// tree mirrors the source tree, so every parent directory adds one `../`.
pub fn relative_artifact_uri(document: &Path, static_dir: &str, file_name: &str) -> String {
    let depth = document
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .count()
        })
        .unwrap_or(0);

    let static_dir = static_dir.replace('\\', "/");
    format!(
        "{}{}/screenshots/{}",
        "../".repeat(depth),
        static_dir.trim_matches('/'),
        file_name
    )
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
