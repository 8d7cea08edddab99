use url::Url;

/// Hostnames the crawler is allowed to fetch from.
#[derive(Debug, Clone, Default)]
pub struct DomainScope {
    hosts: Vec<String>,
}

impl DomainScope {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { hosts }
    }

    pub fn allows(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        match url.host_str() {
            Some(host) => {
                self.hosts.is_empty()
                    || self
                        .hosts
                        .iter()
                        .any(|allowed| allowed.eq_ignore_ascii_case(host))
            }
            None => false,
        }
    }
}

/// The throttling window a host belongs to, `www.` and bare forms share one.
pub fn window_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(bare) => bare.to_string(),
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn allows_listed_hosts_only() {
        let scope = DomainScope::new(["cvs.com", "www.cvs.com"]);
        assert!(scope.allows(&url("https://www.cvs.com/store-locator/ny")));
        assert!(scope.allows(&url("http://cvs.com/")));
        assert!(scope.allows(&url("https://WWW.CVS.COM/x")));
        assert!(!scope.allows(&url("https://shop.cvs.com/")));
        assert!(!scope.allows(&url("https://www.walgreens.com/")));
        assert!(!scope.allows(&url("https://cvs.com.evil.net/")));
    }

    #[test]
    fn rejects_non_http_schemes() {
        let scope = DomainScope::new(["cvs.com"]);
        assert!(!scope.allows(&url("ftp://cvs.com/file")));
        assert!(!scope.allows(&url("mailto:help@cvs.com")));
    }

    #[test]
    fn empty_scope_allows_any_web_host() {
        let scope = DomainScope::default();
        assert!(scope.allows(&url("https://example.org/")));
        assert!(!scope.allows(&url("file:///etc/hosts")));
    }

    #[test]
    fn www_shares_window() {
        assert_eq!(window_key(&url("https://www.cvs.com/a")), "cvs.com");
        assert_eq!(window_key(&url("https://cvs.com/b")), "cvs.com");
        assert_eq!(window_key(&url("https://shop.cvs.com/")), "shop.cvs.com");
    }
}
