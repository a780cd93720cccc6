//! Credential carriers: the `access_token` / `refresh_token` cookies and the
//! `Authorization: Bearer` header.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar};

use crate::config::CookieConfig;
use crate::tokens::{TokenCodec, TokenKind, TokenPair};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

pub fn cookie_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Access => ACCESS_COOKIE,
        TokenKind::Refresh => REFRESH_COOKIE,
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The token of `kind` from its cookie, falling back to a Bearer header
pub fn extract_token(kind: TokenKind, jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    jar.get(cookie_name(kind))
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| bearer_token(headers).map(str::to_string))
}

fn credential_cookie(
    kind: TokenKind,
    value: String,
    max_age_seconds: i64,
    config: &CookieConfig,
) -> Cookie<'static> {
    Cookie::build((cookie_name(kind), value))
        .http_only(true)
        .secure(config.secure)
        .same_site(config.same_site)
        .path("/")
        .max_age(cookie::time::Duration::seconds(max_age_seconds))
        .build()
}

/// Set both cookies, each living as long as its token
pub fn set_credentials(
    jar: CookieJar,
    pair: &TokenPair,
    codec: &TokenCodec,
    config: &CookieConfig,
) -> CookieJar {
    let access_ttl = codec.key(TokenKind::Access).ttl().num_seconds();
    let refresh_ttl = codec.key(TokenKind::Refresh).ttl().num_seconds();
    jar.add(credential_cookie(
        TokenKind::Access,
        pair.access.clone(),
        access_ttl,
        config,
    ))
    .add(credential_cookie(
        TokenKind::Refresh,
        pair.refresh.clone(),
        refresh_ttl,
        config,
    ))
}

/// Expire both cookies on the client, whichever carrier it authenticated with
pub fn clear_credentials(jar: CookieJar, config: &CookieConfig) -> CookieJar {
    jar.add(removal_cookie(TokenKind::Access, config))
        .add(removal_cookie(TokenKind::Refresh, config))
}

fn removal_cookie(kind: TokenKind, config: &CookieConfig) -> Cookie<'static> {
    let mut cookie = credential_cookie(kind, String::new(), 0, config);
    cookie.make_removal();
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::response::IntoResponse;
    use axum_extra::extract::cookie::SameSite;
    use chrono::Duration;

    use crate::tokens::TokenKey;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            TokenKey::new("a", Duration::minutes(5)),
            TokenKey::new("r", Duration::days(3)),
        )
    }

    fn set_cookie_headers(jar: CookieJar) -> Vec<String> {
        let response = jar.into_response();
        response
            .headers()
            .get_all(axum::http::header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_cookie_takes_precedence_over_header() {
        let jar = CookieJar::new().add(Cookie::new(ACCESS_COOKIE, "from-cookie"));
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));

        assert_eq!(
            extract_token(TokenKind::Access, &jar, &headers).as_deref(),
            Some("from-cookie")
        );
        assert_eq!(
            extract_token(TokenKind::Refresh, &jar, &headers).as_deref(),
            Some("from-header")
        );
        assert_eq!(
            extract_token(TokenKind::Refresh, &jar, &HeaderMap::new()),
            None
        );
    }

    #[test]
    fn test_cookie_attributes() {
        let codec = codec();
        let pair = codec.issue_pair("u1", "sid");
        let config = CookieConfig {
            same_site: SameSite::Strict,
            secure: true,
        };
        let headers = set_cookie_headers(set_credentials(CookieJar::new(), &pair, &codec, &config));
        assert_eq!(headers.len(), 2);

        let access = headers
            .iter()
            .find(|h| h.starts_with("access_token="))
            .unwrap();
        assert!(access.contains("HttpOnly"));
        assert!(access.contains("Secure"));
        assert!(access.contains("SameSite=Strict"));
        assert!(access.contains("Path=/"));
        assert!(access.contains("Max-Age=300"));

        let refresh = headers
            .iter()
            .find(|h| h.starts_with("refresh_token="))
            .unwrap();
        assert!(refresh.contains("Max-Age=259200"));
    }

    #[test]
    fn test_insecure_outside_production() {
        let codec = codec();
        let pair = codec.issue_pair("u1", "sid");
        let headers = set_cookie_headers(set_credentials(
            CookieJar::new(),
            &pair,
            &codec,
            &CookieConfig::default(),
        ));
        assert!(headers.iter().all(|h| !h.contains("Secure")));
        assert!(headers.iter().all(|h| h.contains("SameSite=Lax")));
    }

    #[test]
    fn test_clear_credentials_expires_both() {
        let headers = set_cookie_headers(clear_credentials(
            CookieJar::new(),
            &CookieConfig::default(),
        ));
        assert_eq!(headers.len(), 2);
        assert!(headers.iter().any(|h| h.starts_with("access_token=;")));
        assert!(headers.iter().any(|h| h.starts_with("refresh_token=;")));
        assert!(headers.iter().all(|h| h.contains("Max-Age=0")));
    }
}
