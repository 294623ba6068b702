use std::fs;
use std::path::Path;

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{info, warn};

use crate::error::ValueError;

const ARTIFACT: &str = "EDA report";

const SKIPPED_TAGS: [&str; 5] = ["script", "style", "head", "noscript", "template"];

const BLOCK_TAGS: [&str; 14] = [
    "p", "div", "br", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6", "table", "section", "pre",
];

/// The rendered exploratory-analysis report, flattened to text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdaReport {
    pub title: Option<String>,
    pub lines: Vec<String>,
}

impl EdaReport {
    pub fn load(path: &Path) -> Result<Self, ValueError> {
        let html = fs::read_to_string(path).map_err(|err| {
            warn!("EDA report at {} unavailable: {err}", path.display());
            ValueError::ArtifactUnavailable {
                artifact: ARTIFACT,
                reason: format!("{} ({err})", path.display()),
            }
        })?;
        let report = Self::from_html(&html);
        info!(lines = report.lines.len(), "loaded EDA report from {}", path.display());
        Ok(report)
    }

    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        Self {
            title: extract_title(&document),
            lines: render_text(&document).lines().map(str::to_string).collect(),
        }
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let title = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

/// Plain-text rendering good enough for a scrolling terminal panel.
pub fn html_to_text(html: &str) -> String {
    render_text(&Html::parse_document(html))
}

fn render_text(document: &Html) -> String {
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    let mut out = String::new();
    collect_text(body, &mut out);

    let mut lines = Vec::new();
    let mut blank_run = 0usize;
    for line in out.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 || lines.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l: &String| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.replace(char::is_whitespace, " ")),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = child.value().name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                collect_text(child, out);
                if block {
                    out.push('\n');
                } else if name == "td" || name == "th" {
                    out.push_str("  ");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_and_styles() {
        let html = "<html><head><title>EDA</title><style>p{}</style></head>\
                    <body><script>var x = '<p>';</script><h1>Summary</h1><p>Rows: 100</p></body></html>";
        assert_eq!(html_to_text(html), "Summary\n\nRows: 100");
    }

    #[test]
    fn table_cells_are_spaced() {
        let html = "<table><tr><th>col</th><th>mean</th></tr><tr><td>age</td><td>25.1</td></tr></table>";
        let text = html_to_text(html);
        assert!(text.contains("col mean"));
        assert!(text.contains("age 25.1"));
    }

    #[test]
    fn comments_and_quoted_attributes_are_not_text() {
        let html = "<!-- <p>draft</p> --><div title=\"a > b\">Mean wage &#8364;12,000</div>";
        assert_eq!(html_to_text(html), "Mean wage €12,000");
    }

    #[test]
    fn decodes_entities_and_title() {
        let report = EdaReport::from_html("<title>Wage &amp; Value</title><p>a &lt; b</p>");
        assert_eq!(report.title.as_deref(), Some("Wage & Value"));
        assert_eq!(report.lines, vec!["a < b".to_string()]);
    }
}
