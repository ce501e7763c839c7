use crate::error::AppResult;
use url::Url;

/// Strip exactly one leading `www.` label.
pub fn normalize(hostname: &str) -> &str {
    hostname.strip_prefix("www.").unwrap_or(hostname)
}

/// True if `hostname` is an entry of `sites` or a subdomain of one.
///
/// Suffix matches only count at a label boundary, so `notreddit.com` is not
/// covered by `reddit.com`. No normalization happens here.
pub fn is_blocked<S: AsRef<str>>(hostname: &str, sites: &[S]) -> bool {
    sites.iter().any(|site| {
        let site = site.as_ref();
        hostname == site
            || hostname
                .strip_suffix(site)
                .is_some_and(|rest| rest.ends_with('.'))
    })
}

/// Parse `url` and return its normalized hostname, if it has one.
pub fn from_url(url: &str) -> AppResult<Option<String>> {
    let parsed = Url::parse(url)?;
    Ok(parsed.host_str().map(|host| normalize(host).to_string()))
}
