/// Convert HTML to readable plain text.
///
/// Used as the fallback for pages that carry no `<p>` text (plain listings, app shells
/// that render into `<div>`s). A document html2text cannot render comes back unchanged.
pub fn html_to_text(html: &str, width: usize) -> String {
    match html2text::from_read(html.as_bytes(), width) {
        Ok(text) => text,
        Err(_) => html.to_owned(),
    }
}

/// Collapse every whitespace run to one space; `None` when nothing but whitespace is left.
fn collapse_ws(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    (!out.is_empty()).then_some(out)
}

/// Text of every `<p>` element in document order, one paragraph per block.
///
/// Inline markup inside a paragraph (links, emphasis) is flattened into its text.
/// Paragraphs that are empty after whitespace normalization are dropped.
pub fn paragraph_text(html: &str) -> String {
    let doc = html_scraper::Html::parse_document(html);
    let Ok(sel) = html_scraper::Selector::parse("p") else {
        return String::new();
    };
    doc.select(&sel)
        .filter_map(|p| collapse_ws(&p.text().collect::<Vec<_>>().join(" ")))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// `text/plain` from `Text/Plain; charset=utf-8`.
fn mime_essence(content_type: Option<&str>) -> String {
    let raw = content_type.unwrap_or_default();
    let essence = raw.split_once(';').map_or(raw, |(head, _)| head);
    essence.trim().to_ascii_lowercase()
}

/// Readable text for a fetched body.
///
/// - `text/plain`: the body itself, trimmed
/// - anything else is treated as HTML: paragraph text, else a full html2text rendering
pub fn page_text(bytes: &[u8], content_type: Option<&str>) -> String {
    let body = String::from_utf8_lossy(bytes);
    if mime_essence(content_type) == "text/plain" {
        return body.trim().to_string();
    }
    let paragraphs = paragraph_text(&body);
    if !paragraphs.is_empty() {
        return paragraphs;
    }
    html_to_text(&body, 100).trim().to_string()
}
