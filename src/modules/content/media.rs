//! Image URL helpers shared by templates and the proxy endpoint.

use reqwest::Url;

use crate::config::ProxyConfig;

pub const PROXY_PATH: &str = "/api/proxy-image";

/// Where the browser should load an image from.
///
/// Remote images go through the proxy; local paths are left alone.
pub fn image_src(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return format!("{}?url={}", PROXY_PATH, urlencoding::encode(url));
    }
    url.to_string()
}

/// Why a proxy target was refused
#[derive(Debug, PartialEq, Eq)]
pub enum ProxyRejection {
    Malformed,
    Scheme,
    Host(String),
}

impl std::fmt::Display for ProxyRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyRejection::Malformed => write!(f, "无效的图片地址"),
            ProxyRejection::Scheme => write!(f, "只支持 http/https 图片地址"),
            ProxyRejection::Host(host) => write!(f, "不允许代理该域名: {}", host),
        }
    }
}

/// Parse and vet a proxy target against the allowlist; an empty list allows any host
pub fn proxy_target(raw: &str, settings: &ProxyConfig) -> Result<Url, ProxyRejection> {
    let url = Url::parse(raw.trim()).map_err(|_| ProxyRejection::Malformed)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ProxyRejection::Scheme);
    }
    let host = url
        .host_str()
        .ok_or(ProxyRejection::Malformed)?
        .to_ascii_lowercase();
    if !settings.allowed_hosts.is_empty()
        && !settings
            .allowed_hosts
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&host))
    {
        return Err(ProxyRejection::Host(host));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_src() {
        assert_eq!(image_src(""), "");
        assert_eq!(image_src("/uploads/a.png"), "/uploads/a.png");
        assert_eq!(
            image_src("https://cdn.jsdelivr.net/a b.png"),
            "/api/proxy-image?url=https%3A%2F%2Fcdn.jsdelivr.net%2Fa%20b.png"
        );
    }

    #[test]
    fn test_proxy_target_allowlist() {
        let settings = ProxyConfig {
            allowed_hosts: vec!["cdn.jsdelivr.net".into()],
            ..Default::default()
        };
        assert!(proxy_target("https://CDN.jsdelivr.net/x.png", &settings).is_ok());
        assert_eq!(
            proxy_target("https://evil.example/x.png", &settings),
            Err(ProxyRejection::Host("evil.example".into()))
        );
        assert_eq!(
            proxy_target("file:///etc/passwd", &settings),
            Err(ProxyRejection::Scheme)
        );
        assert_eq!(proxy_target("not a url", &settings), Err(ProxyRejection::Malformed));

        let open = ProxyConfig {
            allowed_hosts: Vec::new(),
            ..Default::default()
        };
        assert!(proxy_target("http://anything.example/x.png", &open).is_ok());
    }
}
