//! The `screenshot` directive: target argument, option block and caption.
//!
//! The same option syntax is used by reStructuredText
//! (`.. screenshot:: <target>`) and by Markdown fenced directives
//! (```` ```{screenshot} <target> ````):
//!
//! ```text
//! :viewport-width: 480
//! :interactions:
//!   document.querySelector('button').click();
//! :pdf:
//!
//! Caption text.
//! ```
//!
//! Option values may continue on following lines indented deeper than the
//! option marker. The first blank line not followed by such a continuation
//! ends the option block; whatever follows is the figure caption.

use crate::{ColorSchemeOption, ScreenshotError, StatusPolicy};
use std::path::{Path, PathBuf};

/// One parsed `screenshot` directive, not yet resolved against configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub document: PathBuf,
    /// 1-based line of the directive marker.
    pub line: usize,
    pub target: String,
    pub options: DirectiveOptions,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectiveOptions {
    pub browser: Option<String>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
    pub device_scale_factor: Option<u32>,
    pub color_scheme: Option<ColorSchemeOption>,
    pub full_page: bool,
    pub pdf: bool,
    /// Header pairs in the order written.
    pub headers: Vec<(String, String)>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub context: Option<String>,
    pub status_code: Option<String>,
    pub interactions: Option<String>,
    pub figure: FigureOptions,
}

/// Presentation options forwarded to the emitted figure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FigureOptions {
    pub alt: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub scale: Option<String>,
    pub align: Option<String>,
    pub target: Option<String>,
    pub classes: Vec<String>,
    pub name: Option<String>,
    pub figwidth: Option<String>,
    pub figclasses: Vec<String>,
}

const ALIGN_VALUES: &[&str] = &["left", "center", "right", "top", "middle", "bottom"];

impl Directive {
    /// Parse a directive from its argument and its body.
    ///
    /// `body` holds the lines below the marker with the block indentation
    /// already removed.
    pub fn parse(
        document: &Path,
        line: usize,
        argument: &str,
        body: &[&str],
    ) -> Result<Self, ScreenshotError> {
        let fail = |message: String| ScreenshotError::directive(document, line, message);

        let target = argument.trim();
        if target.is_empty() {
            return Err(fail(
                "screenshot directive requires a URL or file path argument".to_string(),
            ));
        }

        let (fields, rest) = split_option_block(body);
        let mut options = DirectiveOptions::default();
        for (name, value) in fields {
            apply_option(&mut options, &name, &value).map_err(fail)?;
        }

        let caption = dedent(&rest).join("\n").trim().to_string();

        Ok(Self {
            document: document.to_path_buf(),
            line,
            target: target.to_string(),
            options,
            caption: (!caption.is_empty()).then_some(caption),
        })
    }
}

/// Split a directive body into `(name, value)` option fields and the remaining lines.
fn split_option_block<'a>(body: &[&'a str]) -> (Vec<(String, String)>, Vec<&'a str>) {
    let mut fields: Vec<(String, Vec<&str>)> = Vec::new();
    let mut index = 0;

    while index < body.len() {
        let line = body[index];

        if let Some((name, first)) = option_marker(line) {
            fields.push((name, vec![first]));
            index += 1;
            continue;
        }

        let continues_field = !fields.is_empty() && indent_of(line) > 0;
        if continues_field {
            if let Some((_, value)) = fields.last_mut() {
                value.push(line);
            }
            index += 1;
            continue;
        }

        // A blank run inside a field value is kept when the value goes on afterwards.
        if line.trim().is_empty() && !fields.is_empty() {
            let next = body[index..].iter().position(|l| !l.trim().is_empty());
            if let Some(offset) = next {
                if indent_of(body[index + offset]) > 0 {
                    if let Some((_, value)) = fields.last_mut() {
                        value.extend(body[index..index + offset].iter().copied());
                    }
                    index += offset;
                    continue;
                }
            }
        }

        break;
    }

    let fields = fields
        .into_iter()
        .map(|(name, lines)| {
            let first = lines[0].trim().to_string();
            let continuation = dedent(&lines[1..]).join("\n");
            let value = match (first.is_empty(), continuation.trim().is_empty()) {
                (_, true) => first,
                (true, false) => continuation.trim_end().to_string(),
                (false, false) => format!("{}\n{}", first, continuation.trim_end()),
            };
            (name, value)
        })
        .collect();

    (fields, body[index..].to_vec())
}

/// `:name: value` → `(name, value)`.
fn option_marker(line: &str) -> Option<(String, &str)> {
    let rest = line.strip_prefix(':')?;
    let end = rest.find(':')?;
    let name = &rest[..end];
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name.to_string(), &rest[end + 1..]))
}

/// Width in bytes of the leading run of spaces and tabs.
///
/// Other whitespace, such as a non-breaking space, counts as content.
pub(crate) fn indent_of(line: &str) -> usize {
    if line.trim().is_empty() {
        return 0;
    }
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

/// Remove the common leading whitespace of all non-blank lines.
pub(crate) fn dedent<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    let common = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| indent_of(line))
        .min()
        .unwrap_or(0);

    // Every non-blank line starts with at least `common` ASCII bytes.
    lines
        .iter()
        .map(|line| if line.trim().is_empty() { "" } else { &line[common..] })
        .collect()
}

fn apply_option(options: &mut DirectiveOptions, name: &str, value: &str) -> Result<(), String> {
    let text = || Some(value.trim().to_string());

    match name {
        "browser" => options.browser = text(),
        "viewport-width" => options.viewport_width = Some(positive_int(name, value)?),
        "viewport-height" => options.viewport_height = Some(positive_int(name, value)?),
        "device-scale-factor" => options.device_scale_factor = Some(positive_int(name, value)?),
        "color-scheme" => {
            options.color_scheme =
                Some(ColorSchemeOption::parse(value).map_err(|e| e.to_string())?)
        }
        "full-page" => options.full_page = flag(name, value)?,
        "pdf" => options.pdf = flag(name, value)?,
        "headers" => options.headers = parse_headers(value)?,
        "locale" => options.locale = text(),
        "timezone" => options.timezone = text(),
        "context" => options.context = text(),
        "status-code" => {
            StatusPolicy::parse(value.trim()).map_err(|e| e.to_string())?;
            options.status_code = text();
        }
        "interactions" => options.interactions = Some(value.to_string()),
        "alt" => options.figure.alt = text(),
        "width" => options.figure.width = text(),
        "height" => options.figure.height = text(),
        "scale" => options.figure.scale = text(),
        "align" => {
            let align = value.trim();
            if !ALIGN_VALUES.contains(&align) {
                return Err(format!("invalid option value for \"align\": {align}"));
            }
            options.figure.align = Some(align.to_string());
        }
        "target" => options.figure.target = text(),
        "class" => options.figure.classes = class_list(value),
        "name" => options.figure.name = text(),
        "figwidth" => options.figure.figwidth = text(),
        "figclass" => options.figure.figclasses = class_list(value),
        other => return Err(format!("unknown option: \"{other}\"")),
    }

    Ok(())
}

fn positive_int(name: &str, value: &str) -> Result<u32, String> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!(
            "invalid option value for \"{name}\": {} (positive integer expected)",
            value.trim()
        )),
    }
}

fn flag(name: &str, value: &str) -> Result<bool, String> {
    if value.trim().is_empty() {
        Ok(true)
    } else {
        Err(format!("option \"{name}\" is a flag and takes no value"))
    }
}

fn class_list(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// Newline-separated `Name Value` pairs.
pub fn parse_headers(value: &str) -> Result<Vec<(String, String)>, String> {
    value
        .trim()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let line = line.trim();
            line.split_once(char::is_whitespace)
                .map(|(name, value)| (name.to_string(), value.trim().to_string()))
                .ok_or_else(|| format!("malformed header line \"{line}\": expected \"Name Value\""))
        })
        .collect()
}
