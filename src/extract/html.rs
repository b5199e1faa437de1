//! HTML helpers: visible text, titles, selector text and tables.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());
static HEADER_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").unwrap());

/// Elements whose text is never shown to a reader.
const HIDDEN: &[&str] = &["script", "style", "noscript", "head", "template"];

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text a reader would see, whitespace-collapsed.
pub fn visible_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    element_text(document.root_element())
}

/// Visible text of one element and its descendants.
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in element.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN.contains(&e.name()))
        });
        if !hidden {
            parts.push(&**text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

/// Contents of the `<title>` element, if any.
pub fn title(markup: &str) -> Option<String> {
    let document = Html::parse_document(markup);
    document
        .select(&TITLE)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Visible text of every element matching `selector`, skipping empty matches.
pub fn select_text(document: &Html, selector: &Selector) -> Vec<String> {
    document
        .select(selector)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect()
}

/// A table flattened to cell text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Tables matching `selector`. A leading row of `<th>` cells becomes the header.
pub fn extract_tables(document: &Html, selector: &Selector) -> Vec<Table> {
    let mut tables = Vec::new();
    for table_el in document.select(selector) {
        let mut table = Table::default();
        for (i, row) in table_el.select(&ROW).enumerate() {
            let cells: Vec<String> = row.select(&CELL).map(element_text).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            let is_header = row.select(&HEADER_CELL).count() == cells.len();
            if i == 0 && is_header {
                table.headers = cells;
            } else {
                table.rows.push(cells);
            }
        }
        if !table.rows.is_empty() {
            tables.push(table);
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_text_skips_scripts() {
        let html = r#"<html><head><title>T</title><style>p { color: red }</style></head>
            <body><h1>Youth   Justice</h1><script>var rate = 999;</script>
            <p>Supervision rate: <b>175</b> per 10,000</p><noscript>enable js</noscript></body></html>"#;
        let text = visible_text(html);
        assert_eq!(text, "Youth Justice Supervision rate: 175 per 10,000");
    }

    #[test]
    fn test_title() {
        assert_eq!(
            title("<html><head><title>\n  Pocket  Stats </title></head></html>").as_deref(),
            Some("Pocket Stats")
        );
        assert_eq!(title("<p>no title</p>"), None);
    }

    #[test]
    fn test_select_text() {
        let doc = Html::parse_document(
            r#"<div class="stat"><span>20</span> times</div><div class="stat"> </div>"#,
        );
        let sel = Selector::parse("div.stat").unwrap();
        assert_eq!(select_text(&doc, &sel), vec!["20 times".to_string()]);
    }

    #[test]
    fn test_extract_tables() {
        let doc = Html::parse_document(
            r#"<table>
                <tr><th>Program</th><th>2024-25 $'000</th></tr>
                <tr><td>Youth detention operations</td><td>245,100</td></tr>
                <tr><td></td><td></td></tr>
                <tr><td>Bail support services</td><td>12,400</td></tr>
            </table>"#,
        );
        let sel = Selector::parse("table").unwrap();
        let tables = extract_tables(&doc, &sel);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].headers, vec!["Program", "2024-25 $'000"]);
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[0].rows[1][0], "Bail support services");
    }
}
