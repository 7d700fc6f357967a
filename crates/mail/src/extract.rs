use scraper::{Html, Selector};

/// First `<a href>` across the HTML parts whose target starts with
/// `prefix`, in document order.
pub fn first_link_with_prefix(html_parts: &[String], prefix: &str) -> Option<String> {
    let anchors = Selector::parse("a").expect("static selector");

    for part in html_parts {
        let document = Html::parse_document(part);
        for a in document.select(&anchors) {
            if let Some(href) = a.value().attr("href") {
                if href.starts_with(prefix) {
                    return Some(href.to_string());
                }
            }
        }
    }

    None
}
