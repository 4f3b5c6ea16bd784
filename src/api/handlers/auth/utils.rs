//! Small helpers for request validation, client metadata and cookie handling.

use axum::http::{
    header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, USER_AGENT},
    HeaderMap, HeaderValue,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::net::{IpAddr, SocketAddr};

pub(crate) const REFRESH_COOKIE_NAME: &str = "refresh_token";
/// The browser only sends the refresh cookie to the endpoints that consume it.
pub(crate) const REFRESH_COOKIE_PATH: &str = "/auth/refresh";

/// Usernames are 1-64 characters of letters, digits and `._@-`.
pub(super) fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9._@-]{1,64}$").is_ok_and(|regex| regex.is_match(username))
}

/// Device descriptor recorded on the ledger: the `User-Agent`, or empty.
pub(super) fn device_info(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// Client address for audit fields.
///
/// First `X-Forwarded-For` entry, then `X-Real-IP`, then the transport peer.
/// A header value that does not parse as an address yields `None`.
pub(super) fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(forwarded) = forwarded {
        return parse_ip(forwarded);
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(real_ip) = real_ip {
        return parse_ip(real_ip);
    }

    peer.map(|addr| addr.ip())
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

pub(super) fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == REFRESH_COOKIE_NAME && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

/// `HttpOnly`, `SameSite=Strict` cookie carrying the raw refresh token, with
/// an expiry matching the ledger record.
pub(super) fn refresh_cookie(
    token: &str,
    expires_at: DateTime<Utc>,
    max_age_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let expires = expires_at.format("%a, %d %b %Y %H:%M:%S GMT");
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Strict; Expires={expires}; Max-Age={max_age_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_refresh_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}=; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Strict; Max-Age=0"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}
