// @zen-component: AUTH-SessionCookies
//
//! Session and CSRF cookie builders.
//!
//! Both cookies go into a `PrivateCookieJar`, so their values are encrypted
//! and authenticated with the server's cookie key.

use std::time::Duration as StdDuration;

use axum_extra::extract::cookie::{Cookie, SameSite};
use edb_core::auth::session::{SameSitePolicy, SessionConfig};
use time::{Duration, OffsetDateTime};

fn same_site(policy: SameSitePolicy) -> SameSite {
    match policy {
        SameSitePolicy::Strict => SameSite::Strict,
        SameSitePolicy::Lax => SameSite::Lax,
        SameSitePolicy::None => SameSite::None,
    }
}

fn base(config: &SessionConfig, name: &str, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::build((name.to_string(), value))
        .http_only(true)
        .secure(config.secure)
        .same_site(same_site(config.same_site))
        .path("/")
        .build();
    if let Some(domain) = &config.domain {
        cookie.set_domain(domain.clone());
    }
    cookie
}

fn max_age(ttl: StdDuration) -> Duration {
    Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

/// Session cookie. `max_age` of `None` makes it a browser-session cookie.
pub fn session_cookie(
    config: &SessionConfig,
    value: String,
    max_age_ttl: Option<StdDuration>,
) -> Cookie<'static> {
    let mut cookie = base(config, &config.cookie_name, value);
    if let Some(ttl) = max_age_ttl {
        cookie.set_max_age(max_age(ttl));
    }
    cookie
}

/// CSRF cookie, living as long as the longest possible session.
pub fn csrf_cookie(config: &SessionConfig, value: String) -> Cookie<'static> {
    let mut cookie = base(config, &config.csrf_cookie_name, value);
    cookie.set_max_age(max_age(config.ttl));
    cookie
}

/// An immediately expiring cookie that overwrites `name` in the browser.
pub fn removal_cookie(config: &SessionConfig, name: &str) -> Cookie<'static> {
    let mut cookie = base(config, name, String::new());
    cookie.set_max_age(Duration::ZERO);
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durable_and_volatile_session_cookies() {
        let config = SessionConfig::default();
        let durable = session_cookie(&config, "v".into(), Some(config.ttl));
        assert_eq!(durable.max_age(), Some(Duration::days(7)));
        assert_eq!(durable.http_only(), Some(true));
        assert_eq!(durable.secure(), Some(true));
        assert_eq!(durable.same_site(), Some(SameSite::None));
        assert_eq!(durable.path(), Some("/"));

        let volatile = session_cookie(&config, "v".into(), None);
        assert_eq!(volatile.max_age(), None);
    }

    #[test]
    fn removal_cookie_expires_now() {
        let config = SessionConfig {
            domain: Some("example.com".into()),
            ..SessionConfig::default()
        };
        let cookie = removal_cookie(&config, &config.cookie_name);
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.value(), "");
        let header = cookie.to_string();
        assert!(header.contains("Max-Age=0"), "{header}");
        assert!(header.contains("Expires=Thu, 01 Jan 1970"), "{header}");
    }
}
