//! Output nodes spliced into documents in place of `screenshot` directives.

use crate::FigureOptions;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    /// Artifact path relative to the document's output location.
    pub uri: String,
    pub alt: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub scale: Option<String>,
    pub target: Option<String>,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Figure {
    pub image: Image,
    pub caption: Option<String>,
    pub name: Option<String>,
    pub align: Option<String>,
    pub figwidth: Option<String>,
    pub classes: Vec<String>,
}

impl Figure {
    pub fn new(uri: impl Into<String>, options: &FigureOptions, caption: Option<&str>) -> Self {
        Self {
            image: Image {
                uri: uri.into(),
                alt: options.alt.clone(),
                width: options.width.clone(),
                height: options.height.clone(),
                scale: options.scale.clone(),
                target: options.target.clone(),
                classes: options.classes.clone(),
            },
            caption: caption.map(str::to_string),
            name: options.name.clone(),
            align: options.align.clone(),
            figwidth: options.figwidth.clone(),
            classes: options.figclasses.clone(),
        }
    }

    /// Append a class to both the figure and its image.
    pub fn add_class(&mut self, class: &str) {
        self.classes.push(class.to_string());
        self.image.classes.push(class.to_string());
    }

    /// reStructuredText `figure` directive, every line prefixed with `indent`.
    pub fn to_rst(&self, indent: &str) -> String {
        let mut lines = vec![format!("{indent}.. figure:: {}", self.image.uri)];
        let mut option = |name: &str, value: &Option<String>| {
            if let Some(value) = value {
                lines.push(format!("{indent}   :{name}: {value}"));
            }
        };

        option("alt", &self.image.alt);
        option("width", &self.image.width);
        option("height", &self.image.height);
        option("scale", &self.image.scale);
        option("target", &self.image.target);
        option("name", &self.name);
        option("align", &self.align);
        option("figwidth", &self.figwidth);
        if !self.image.classes.is_empty() {
            lines.push(format!("{indent}   :class: {}", self.image.classes.join(" ")));
        }
        if !self.classes.is_empty() {
            lines.push(format!("{indent}   :figclass: {}", self.classes.join(" ")));
        }

        if let Some(caption) = &self.caption {
            lines.push(String::new());
            lines.extend(caption.lines().map(|line| {
                if line.is_empty() {
                    String::new()
                } else {
                    format!("{indent}   {line}")
                }
            }));
        }

        lines.join("\n") + "\n"
    }

    /// HTML `<figure>` block, used for Markdown sources.
    pub fn to_html(&self) -> String {
        let mut figure_attrs = String::new();
        if let Some(name) = &self.name {
            figure_attrs.push_str(&format!(" id=\"{}\"", escape_html(name)));
        }
        let mut figure_classes = self.classes.clone();
        if let Some(align) = &self.align {
            figure_classes.push(format!("align-{align}"));
        }
        push_class_attr(&mut figure_attrs, &figure_classes);
        if let Some(figwidth) = &self.figwidth {
            figure_attrs.push_str(&format!(" style=\"width: {}\"", escape_html(figwidth)));
        }

        let mut img_attrs = format!(" src=\"{}\"", escape_html(&self.image.uri));
        img_attrs.push_str(&format!(
            " alt=\"{}\"",
            escape_html(self.image.alt.as_deref().unwrap_or(""))
        ));
        push_class_attr(&mut img_attrs, &self.image.classes);
        let mut style = Vec::new();
        if let Some(width) = &self.image.width {
            style.push(format!("width: {width}"));
        }
        if let Some(height) = &self.image.height {
            style.push(format!("height: {height}"));
        }
        if !style.is_empty() {
            img_attrs.push_str(&format!(" style=\"{}\"", escape_html(&style.join("; "))));
        }

        let img = format!("<img{img_attrs} />");
        let img = match &self.image.target {
            Some(target) => format!("<a href=\"{}\">{img}</a>", escape_html(target)),
            None => img,
        };

        let mut out = format!("<figure{figure_attrs}>\n  {img}\n");
        if let Some(caption) = &self.caption {
            out.push_str(&format!(
                "  <figcaption>{}</figcaption>\n",
                escape_html(caption)
            ));
        }
        out.push_str("</figure>\n");
        out
    }
}

fn push_class_attr(attrs: &mut String, classes: &[String]) {
    if !classes.is_empty() {
        attrs.push_str(&format!(" class=\"{}\"", escape_html(&classes.join(" "))));
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
