//! The `admin_session` cookie: a signed memo of a past successful admin role lookup.
//!
//! A `true` flag lets the access gate skip the role query. It is cleared on sign-out and whenever
//! a new session replaces the one that earned it, so a user whose role is revoked keeps admin
//! access until the cookie expires or they sign in or out again.

use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use sha2::{Digest, Sha512};
use std::time::Duration;

pub const ADMIN_SESSION_COOKIE: &str = "admin_session";
const FLAG_VALUE: &str = "true";

/// Derives the 64-byte cookie signing key from the configured secret.
pub fn cookie_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

/// readFlag: true only for a correctly signed cookie holding `"true"`.
pub fn read_flag(jar: &SignedCookieJar) -> bool {
    jar.get(ADMIN_SESSION_COOKIE)
        .is_some_and(|cookie| cookie.value() == FLAG_VALUE)
}

/// writeFlag: only called after a real role lookup confirmed admin.
pub fn write_flag(jar: SignedCookieJar, ttl: Duration, secure: bool) -> SignedCookieJar {
    let max_age = time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));

    jar.add(
        Cookie::build((ADMIN_SESSION_COOKIE, FLAG_VALUE))
            .path("/")
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .max_age(max_age),
    )
}

/// clearFlag: called on sign-out and on every sign-in that does not earn the flag. Emits an expired cookie whether or not one was sent.
pub fn clear_flag(jar: SignedCookieJar) -> SignedCookieJar {
    jar.add(
        Cookie::build((ADMIN_SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .max_age(time::Duration::ZERO),
    )
}
