//! Tab metadata read from a loaded document

use scraper::{Html, Selector};
use url::Url;

/// Title and favicon of a loaded page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub title: Option<String>,
    pub favicon: Option<String>,
}

/// Reads the title and favicon of an HTML document
///
/// The favicon falls back to `/favicon.ico` on the page's origin when the
/// document declares none, the same way a browser resolves it.
pub fn parse_page_meta(html: &str, base_url: &str) -> PageMeta {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    PageMeta {
        title: extract_title(&document),
        favicon: extract_favicon(&document, base.as_ref()),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_favicon(document: &Html, base: Option<&Url>) -> Option<String> {
    let base = base?;

    let declared = Selector::parse("link[rel~='icon'][href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .find_map(|element| element.value().attr("href"))
                .map(str::trim)
                .filter(|href| !href.is_empty())
                .and_then(|href| base.join(href).ok())
        });

    declared
        .or_else(|| base.join("/favicon.ico").ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_and_declared_icon() {
        let html = r#"<html><head>
            <title>  Wholesale list </title>
            <link rel="shortcut icon" href="/static/fav.png">
        </head><body></body></html>"#;

        let meta = parse_page_meta(html, "https://site.example/list?pagenum=0");
        assert_eq!(meta.title.as_deref(), Some("Wholesale list"));
        assert_eq!(
            meta.favicon.as_deref(),
            Some("https://site.example/static/fav.png")
        );
    }

    #[test]
    fn test_favicon_falls_back_to_origin() {
        let meta = parse_page_meta("<html><body></body></html>", "https://site.example/a/b");
        assert_eq!(meta.title, None);
        assert_eq!(
            meta.favicon.as_deref(),
            Some("https://site.example/favicon.ico")
        );
    }

    #[test]
    fn test_unparsable_base_has_no_favicon() {
        let meta = parse_page_meta("<title>x</title>", "not a url");
        assert_eq!(meta.title.as_deref(), Some("x"));
        assert_eq!(meta.favicon, None);
    }
}
