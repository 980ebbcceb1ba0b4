//! PDF link discovery on publisher landing pages.

use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};

static CITATION_PDF_URL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="citation_pdf_url"]"#).unwrap());

/// Guesses the PDF URL for a landing page at `page_url`.
///
/// Publisher-specific rewrites take precedence over the page's
/// `citation_pdf_url` meta tag, which takes precedence over `<url>.pdf`.
pub fn derive_pdf_url(page_url: &Url, html: &str) -> Option<Url> {
    let host = page_url.host_str().unwrap_or_default();
    let url = page_url.as_str();

    if host.ends_with("annualreviews.org") && url.contains("/doi/") && !url.contains("/doi/pdf/") {
        let rewritten = url
            .replacen("/doi/abs/", "/doi/", 1)
            .replacen("/doi/full/", "/doi/", 1)
            .replacen("/doi/", "/doi/pdf/", 1);
        return Url::parse(&rewritten).ok();
    }

    if host.ends_with("link.springer.com") {
        let rewritten = url
            .replacen("/article/", "/content/pdf/", 1)
            .replacen("/book/", "/content/pdf/", 1);
        if rewritten != url {
            return Url::parse(&format!("{rewritten}.pdf")).ok();
        }
    }

    let document = Html::parse_document(html);
    let meta = document
        .select(&CITATION_PDF_URL)
        .find_map(|el| el.value().attr("content"))
        .map(str::trim)
        .filter(|c| !c.is_empty());
    if let Some(content) = meta {
        return page_url.join(content).ok();
    }

    if url.ends_with(".pdf") {
        return None;
    }
    Url::parse(&format!("{}.pdf", url.trim_end_matches('/'))).ok()
}
