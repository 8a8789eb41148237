use url::Url;

/// Page-number query parameter of a listing site
///
/// Page indices handed out by the orchestrator are zero-based; `first_page`
/// maps index 0 onto the value the site uses for its first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub param: String,
    pub first_page: u32,
}

impl Pagination {
    pub fn new(param: impl Into<String>, first_page: u32) -> Self {
        Self {
            param: param.into(),
            first_page,
        }
    }

    /// Rewrites the page parameter to the first page
    ///
    /// Unparsable input is returned unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use listing_harvester::url::Pagination;
    ///
    /// let pagination = Pagination::new("pagenum", 0);
    /// assert_eq!(
    ///     pagination.normalize_start_url("https://site.example/list?pagenum=5"),
    ///     "https://site.example/list?pagenum=0"
    /// );
    /// ```
    pub fn normalize_start_url(&self, url: &str) -> String {
        self.build_next_page_url(url, 0)
    }

    /// Sets the page parameter for the given zero-based page index
    ///
    /// Other query parameters keep their order; the page parameter is
    /// replaced in place or appended when missing.
    pub fn build_next_page_url(&self, url: &str, page_index: u32) -> String {
        match self.rewrite(url, self.first_page.saturating_add(page_index)) {
            Some(rewritten) => rewritten,
            None => {
                tracing::warn!("Failed to rewrite page parameter of {}", url);
                url.to_string()
            }
        }
    }

    /// Reads the zero-based page index back from a URL
    pub fn page_index(&self, url: &str) -> Option<u32> {
        let parsed = Url::parse(url).ok()?;
        let value = parsed
            .query_pairs()
            .find(|(key, _)| key == self.param.as_str())
            .map(|(_, value)| value.into_owned())?;
        value.parse::<u32>().ok()?.checked_sub(self.first_page)
    }

    fn rewrite(&self, url: &str, page_value: u32) -> Option<String> {
        let mut parsed = Url::parse(url).ok()?;

        let mut replaced = false;
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .filter_map(|(key, value)| {
                if key == self.param.as_str() {
                    if replaced {
                        return None;
                    }
                    replaced = true;
                    Some((key.into_owned(), page_value.to_string()))
                } else {
                    Some((key.into_owned(), value.into_owned()))
                }
            })
            .collect();

        {
            let mut query = parsed.query_pairs_mut();
            query.clear();
            for (key, value) in &pairs {
                query.append_pair(key, value);
            }
            if !replaced {
                query.append_pair(&self.param, &page_value.to_string());
            }
        }

        Some(parsed.to_string())
    }
}
