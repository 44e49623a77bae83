//! Pure helpers over `(name, value)` header lists.

use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

/// Headers that must not follow a redirect to another origin.
const CREDENTIAL_HEADERS: [&str; 3] = ["authorization", "proxy-authorization", "cookie"];

/// First value of `name`, compared case-insensitively.
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// All values of `name`, in order.
pub fn header_values<'a>(
    headers: &'a [(String, String)],
    name: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .iter()
        .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Find a `Link: <url>; rel="immutable"` target among the response headers,
/// resolved against `base`.
pub fn immutable_link(headers: &[(String, String)], base: &Url) -> Option<Url> {
    header_values(headers, "link").find_map(|value| parse_immutable_link(value, base))
}

/// Parse one `Link` header value and return the first target whose `rel`
/// includes `immutable`.
pub fn parse_immutable_link(value: &str, base: &Url) -> Option<Url> {
    value.split(',').find_map(|link| {
        let link = link.trim();
        let rest = link.strip_prefix('<')?;
        let (target, params) = rest.split_once('>')?;
        let immutable = params.split(';').any(|param| {
            let Some((key, value)) = param.split_once('=') else {
                return false;
            };
            key.trim().eq_ignore_ascii_case("rel")
                && value
                    .trim()
                    .trim_matches('"')
                    .split_ascii_whitespace()
                    .any(|rel| rel.eq_ignore_ascii_case("immutable"))
        });
        if immutable {
            base.join(target.trim()).ok()
        } else {
            None
        }
    })
}

/// `Retry-After` in its delay-seconds form. HTTP-date values are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    httpdate::parse_http_date(value.trim()).ok().map(DateTime::<Utc>::from)
}

/// Headers to send after a redirect from `from` to `to`. Credentials are
/// dropped when the origin changes.
pub fn redirect_headers(
    headers: &[(String, String)],
    from: &Url,
    to: &Url,
) -> Vec<(String, String)> {
    if from.origin() == to.origin() {
        return headers.to_vec();
    }
    headers
        .iter()
        .filter(|(name, _)| {
            !CREDENTIAL_HEADERS
                .iter()
                .any(|credential| name.eq_ignore_ascii_case(credential))
        })
        .cloned()
        .collect()
}
