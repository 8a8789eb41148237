use crate::config::ScraperConfig;
use url::Url;

/// Checks if a host matches a wildcard domain pattern
///
/// This function supports two types of patterns:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches the bare domain and any subdomain
///
/// # Examples
///
/// ```
/// use listing_harvester::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(!matches_wildcard("example.com", "other.com"));
///
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "m.land.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let candidate = candidate.to_ascii_lowercase();

    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Returns every scraper whose domain pattern matches the URL's host
///
/// Unparsable URLs match nothing.
pub fn find_scrapers_for_url<'a>(
    scrapers: &'a [ScraperConfig],
    url: &str,
) -> Vec<&'a ScraperConfig> {
    let host = match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
        Some(host) => host,
        None => return Vec::new(),
    };

    scrapers
        .iter()
        .filter(|scraper| matches_wildcard(&scraper.domain, &host))
        .collect()
}

/// Looks up a scraper by id
pub fn scraper_by_id<'a>(scrapers: &'a [ScraperConfig], id: &str) -> Option<&'a ScraperConfig> {
    scrapers.iter().find(|scraper| scraper.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraper(id: &str, domain: &str) -> ScraperConfig {
        ScraperConfig {
            id: id.to_string(),
            name: id.to_string(),
            domain: domain.to_string(),
            page_param: "page".to_string(),
            first_page: 0,
            item_selector: "li".to_string(),
            id_field: "id".to_string(),
            next_page_selector: None,
            total_pages_selector: None,
            fields: vec![],
        }
    }

    #[test]
    fn test_exact_match() {
        assert!(matches_wildcard("example.com", "example.com"));
        assert!(matches_wildcard("example.com", "EXAMPLE.com"));
        assert!(!matches_wildcard("example.com", "blog.example.com"));
    }

    #[test]
    fn test_wildcard_does_not_match_suffix_lookalike() {
        assert!(!matches_wildcard("*.example.com", "notexample.com"));
    }

    #[test]
    fn test_find_scrapers_for_url() {
        let scrapers = vec![
            scraper("products", "*.domeggook.com"),
            scraper("land", "m.land.naver.com"),
        ];

        let found =
            find_scrapers_for_url(&scrapers, "https://domemedb.domeggook.com/list?pagenum=1");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "products");

        assert!(find_scrapers_for_url(&scrapers, "https://example.org/").is_empty());
        assert!(find_scrapers_for_url(&scrapers, "not a url").is_empty());
    }

    #[test]
    fn test_scraper_by_id() {
        let scrapers = vec![scraper("products", "example.com")];
        assert!(scraper_by_id(&scrapers, "products").is_some());
        assert!(scraper_by_id(&scrapers, "missing").is_none());
    }
}
