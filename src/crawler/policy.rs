//! URL canonicalization and crawl scope policy.
//!
//! Both functions are pure and total: malformed input is out of scope (or
//! `None`), never an error.

use url::Url;

/// File extensions the crawler never follows: documents, images, archives,
/// executables, and media.
const DENIED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "jpg", "jpeg", "png", "gif", "svg", "zip", "tar", "gz", "exe", "mp4",
    "mp3",
];

/// Parses `raw` and strips its fragment, yielding the canonical form used as
/// the crawl dedup key (scheme + host + path + query).
pub fn canonicalize(raw: &str) -> Option<Url> {
    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);
    Some(url)
}

/// Returns `true` iff `candidate` should be crawled from a page on
/// `origin_host`: same host (a relative reference resolves to the origin and
/// is in scope), http/s scheme, extension not on the deny list, and not a
/// pure-fragment reference.
pub fn is_in_scope(candidate: &str, origin_host: &str) -> bool {
    if candidate.starts_with('#') {
        return false;
    }
    let Some(url) = canonicalize(candidate) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => {
            if !host.eq_ignore_ascii_case(origin_host) {
                return false;
            }
        }
        // Host-less absolute URLs never occur for http(s); treat as in-host.
        _ => {}
    }
    !has_denied_extension(url.path())
}

fn has_denied_extension(path: &str) -> bool {
    let Some((_, ext)) = path.rsplit_once('.') else {
        return false;
    };
    if ext.contains('/') {
        return false;
    }
    DENIED_EXTENSIONS
        .iter()
        .any(|denied| ext.eq_ignore_ascii_case(denied))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_strips_fragments() {
        let url = canonicalize("https://example.com/docs?page=2#section-3").unwrap();
        assert_eq!(url.as_str(), "https://example.com/docs?page=2");
    }

    #[test]
    fn canonicalize_rejects_garbage() {
        assert!(canonicalize("not a url").is_none());
        assert!(canonicalize("").is_none());
    }

    #[test]
    fn same_host_http_pages_are_in_scope() {
        assert!(is_in_scope("https://example.com/about", "example.com"));
        assert!(is_in_scope("http://example.com/", "example.com"));
        assert!(is_in_scope("https://EXAMPLE.com/contact", "example.com"));
    }

    #[test]
    fn foreign_hosts_are_out_of_scope() {
        assert!(!is_in_scope("https://other.com/about", "example.com"));
        assert!(!is_in_scope("https://sub.example.com/x", "example.com"));
    }

    #[test]
    fn non_http_schemes_are_out_of_scope() {
        assert!(!is_in_scope("mailto:info@example.com", "example.com"));
        assert!(!is_in_scope("ftp://example.com/file", "example.com"));
        assert!(!is_in_scope("javascript:void(0)", "example.com"));
    }

    #[test]
    fn denied_extensions_are_out_of_scope() {
        assert!(!is_in_scope("https://example.com/report.pdf", "example.com"));
        assert!(!is_in_scope("https://example.com/logo.PNG", "example.com"));
        assert!(!is_in_scope("https://example.com/setup.exe", "example.com"));
        assert!(is_in_scope("https://example.com/page.html", "example.com"));
    }

    #[test]
    fn pure_fragment_references_are_out_of_scope() {
        assert!(!is_in_scope("#top", "example.com"));
    }

    #[test]
    fn malformed_urls_never_panic() {
        assert!(!is_in_scope("://///", "example.com"));
        assert!(!is_in_scope("http://", "example.com"));
        assert!(!is_in_scope("", "example.com"));
    }

    #[test]
    fn dots_in_directories_do_not_trip_the_deny_list() {
        assert!(is_in_scope("https://example.com/v1.2/guide", "example.com"));
    }
}
