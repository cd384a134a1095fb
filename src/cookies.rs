//! Serializable cookie jars and the pooled lookup used by share groups.
use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub key: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
    #[serde(default)]
    pub host_only: bool,
    #[serde(default)]
    pub secure: bool,
}

fn root_path() -> String {
    "/".into()
}

impl Cookie {
    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if self.secure && url.scheme() != "https" {
            return false;
        }
        let domain_ok = if self.host_only {
            host.eq_ignore_ascii_case(&self.domain)
        } else {
            domain_match(host, &self.domain)
        };
        domain_ok && path_match(url.path(), &self.path)
    }
}

fn domain_match(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{}", domain))
}

fn path_match(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".into(),
        Some(i) => path[..i].to_string(),
    }
}

/// A user's cookie state, stored as the `cookies` attribute of their config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieJar {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn cookies_for(&self, url: &Url) -> Vec<&Cookie> {
        self.cookies.iter().filter(|c| c.matches(url)).collect()
    }

    /// `Cookie` header value for `url`, `None` when nothing matches.
    pub fn cookie_string(&self, url: &Url) -> Option<String> {
        let matched = self.cookies_for(url);
        if matched.is_empty() {
            return None;
        }
        Some(
            matched
                .iter()
                .map(|c| format!("{}={}", c.key, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Stores a `Set-Cookie` style string. Returns false when it is
    /// malformed or its domain does not cover `url`.
    pub fn set_cookie(&mut self, raw: &str, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let mut parts = raw.split(';');
        let Some((key, value)) = parts.next().and_then(|kv| kv.split_once('=')) else {
            return false;
        };
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        let mut cookie = Cookie {
            key: key.to_string(),
            value: value.trim().to_string(),
            domain: host.to_ascii_lowercase(),
            path: default_path(url),
            host_only: true,
            secure: false,
        };
        for attr in parts {
            let (name, val) = match attr.split_once('=') {
                Some((n, v)) => (n.trim(), v.trim()),
                None => (attr.trim(), ""),
            };
            match name.to_ascii_lowercase().as_str() {
                "domain" if !val.is_empty() => {
                    let domain = val.trim_start_matches('.').to_ascii_lowercase();
                    if !domain_match(host, &domain) {
                        return false;
                    }
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "secure" => cookie.secure = true,
                _ => {}
            }
        }
        self.cookies.retain(|c| {
            !(c.key == cookie.key && c.domain == cookie.domain && c.path == cookie.path)
        });
        self.cookies.push(cookie);
        true
    }
}

/// Member jars in probe order.
#[derive(Debug, Clone, Default)]
pub struct CookiePool {
    jars: Vec<CookieJar>,
}

impl CookiePool {
    pub fn new(jars: Vec<CookieJar>) -> Self {
        Self { jars }
    }

    pub fn jars(&self) -> &[CookieJar] {
        &self.jars
    }

    /// First jar yielding a cookie string for `url` wins.
    pub fn get_cookie(&self, url: &Url) -> Option<String> {
        self.jars.iter().find_map(|jar| jar.cookie_string(url))
    }

    /// Writes into the first jar that already holds a cookie for `url`;
    /// dropped when none does.
    pub fn set_cookie(&mut self, url: &Url, cookie: &str) -> bool {
        match self
            .jars
            .iter_mut()
            .find(|jar| !jar.cookies_for(url).is_empty())
        {
            Some(jar) => jar.set_cookie(cookie, url),
            None => false,
        }
    }
}
