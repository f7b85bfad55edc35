//! Utility functions and helpers.

pub mod http;
pub mod shutdown;

use url::Url;

/// Return `page_url` with `param` set to `page`, replacing any existing value.
pub fn with_query_param(page_url: &Url, param: &str, page: usize) -> Url {
    let mut url = page_url.clone();
    let kept: Vec<(String, String)> = page_url
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(param, &page.to_string());
    }
    url
}

/// Extract the domain from a URL string.
pub fn get_domain(url_str: &str) -> Option<String> {
    Url::parse(url_str)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_string()))
}
