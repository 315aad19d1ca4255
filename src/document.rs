//! Source documents split into plain text and `screenshot` directives.

use crate::directive::{dedent, indent_of};
use crate::{Directive, Figure, ScreenshotError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const RST_MARKER: &str = ".. screenshot::";
const MYST_NAME: &str = "{screenshot}";

/// rst directives whose body is literal text.
const LITERAL_DIRECTIVES: &[&str] = &["code-block", "code", "sourcecode", "parsed-literal"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Rst,
    Markdown,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "rst" => Some(SourceKind::Rst),
            "md" => Some(SourceKind::Markdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Lines copied through unchanged, newlines included.
    Text(String),
    Directive {
        directive: Directive,
        /// Leading whitespace of the directive marker.
        indent: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Path relative to the source root.
    pub path: PathBuf,
    pub kind: SourceKind,
    pub segments: Vec<Segment>,
    /// `.. |name| replace:: value` definitions found in the document.
    pub substitutions: BTreeMap<String, String>,
}

impl Document {
    pub fn parse(path: &Path, kind: SourceKind, content: &str) -> Result<Self, ScreenshotError> {
        let lines: Vec<&str> = content.lines().collect();
        let segments = match kind {
            SourceKind::Rst => split_rst(path, &lines)?,
            SourceKind::Markdown => split_markdown(path, &lines)?,
        };
        let substitutions = match kind {
            SourceKind::Rst => substitution_definitions(&lines),
            SourceKind::Markdown => BTreeMap::new(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            segments,
            substitutions,
        })
    }

    pub fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Directive { directive, .. } => Some(directive),
            Segment::Text(_) => None,
        })
    }

    /// Render the document with the figures of the n-th directive in place of it.
    ///
    /// `figures` must hold one entry per directive, in document order.
    pub fn render(&self, figures: &[Vec<Figure>]) -> String {
        let mut out = String::new();
        let mut next = figures.iter();

        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Directive { indent, .. } => {
                    let rendered: Vec<String> = next
                        .next()
                        .map(|group| {
                            group
                                .iter()
                                .map(|figure| match self.kind {
                                    SourceKind::Rst => figure.to_rst(indent),
                                    SourceKind::Markdown => figure.to_html(),
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    out.push_str(&rendered.join("\n"));
                    out.push('\n');
                }
            }
        }

        out
    }
}

fn push_text(segments: &mut Vec<Segment>, line: &str) {
    if let Some(Segment::Text(text)) = segments.last_mut() {
        text.push_str(line);
        text.push('\n');
    } else {
        segments.push(Segment::Text(format!("{line}\n")));
    }
}

fn leading_ws(line: &str) -> &str {
    &line[..line.len() - line.trim_start_matches([' ', '\t']).len()]
}

/// A paragraph ending in `::` or a code directive: the indented block below
/// it is literal text.
fn opens_literal_block(line: &str) -> bool {
    let trimmed = line.trim();
    match trimmed.strip_prefix(".. ") {
        Some(rest) => rest
            .split_once("::")
            .is_some_and(|(name, _)| LITERAL_DIRECTIVES.contains(&name.trim())),
        None => trimmed.ends_with("::"),
    }
}

fn split_rst(path: &Path, lines: &[&str]) -> Result<Vec<Segment>, ScreenshotError> {
    let mut segments = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        let indent = leading_ws(line);
        let Some(argument) = line[indent.len()..].strip_prefix(RST_MARKER) else {
            push_text(&mut segments, line);
            index += 1;
            if opens_literal_block(line) {
                // Copied through, never scanned for directives.
                while index < lines.len()
                    && (lines[index].trim().is_empty() || indent_of(lines[index]) > indent.len())
                {
                    push_text(&mut segments, lines[index]);
                    index += 1;
                }
            }
            continue;
        };

        let start = index + 1;
        let mut end = start;
        let mut last_content = start;
        while end < lines.len() {
            let candidate = lines[end];
            if candidate.trim().is_empty() {
                end += 1;
                continue;
            }
            if indent_of(candidate) <= indent.len() {
                break;
            }
            end += 1;
            last_content = end;
        }

        let body = dedent(&lines[start..last_content]);
        let directive = Directive::parse(path, index + 1, argument, &body)?;
        segments.push(Segment::Directive {
            directive,
            indent: indent.to_string(),
        });
        index = last_content;
    }

    Ok(segments)
}

/// Opening fence of a fenced block: the fence run and what follows it.
fn fence_of(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = trimmed.len() - trimmed.trim_start_matches(marker).len();
    (run >= 3).then(|| trimmed.split_at(run))
}

fn closes(line: &str, fence: &str) -> bool {
    match fence_of(line) {
        Some((run, rest)) => {
            run.starts_with(fence) && run.chars().all(|c| fence.starts_with(c)) && rest.trim().is_empty()
        }
        None => false,
    }
}

fn split_markdown(path: &Path, lines: &[&str]) -> Result<Vec<Segment>, ScreenshotError> {
    let mut segments = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        let Some((fence, info)) = fence_of(line) else {
            push_text(&mut segments, line);
            index += 1;
            continue;
        };

        let close = lines[index + 1..]
            .iter()
            .position(|candidate| closes(candidate, fence))
            .map(|offset| index + 1 + offset);

        let Some(argument) = info.trim_start().strip_prefix(MYST_NAME) else {
            // Ordinary code block: copied through, never scanned for directives.
            let last = close.unwrap_or(lines.len() - 1);
            for text in &lines[index..=last] {
                push_text(&mut segments, text);
            }
            index = last + 1;
            continue;
        };

        let Some(close) = close else {
            return Err(ScreenshotError::directive(
                path,
                index + 1,
                "unterminated screenshot block",
            ));
        };

        let body = dedent(&lines[index + 1..close]);
        let directive = Directive::parse(path, index + 1, argument, &body)?;
        segments.push(Segment::Directive {
            directive,
            indent: leading_ws(line).to_string(),
        });
        index = close + 1;
    }

    Ok(segments)
}

fn substitution_definitions(lines: &[&str]) -> BTreeMap<String, String> {
    lines
        .iter()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix(".. |")?;
            let (name, rest) = rest.split_once('|')?;
            let value = rest.trim_start().strip_prefix("replace::")?;
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
