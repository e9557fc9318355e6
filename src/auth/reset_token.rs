//! Stateless password-reset tokens.
//!
//! A token is `{timestamp base36}-{truncated hmac hex}`. The MAC covers the
//! user id, current password hash and last login, so it stops verifying as
//! soon as the password changes or the user logs in again.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config;
use crate::database::models::User;

type HmacSha256 = Hmac<Sha256>;

const KEY_SALT: &str = "tienda.password-reset";
const MAC_HEX_LEN: usize = 32;

fn mac_for(user: &User, timestamp: i64) -> Option<HmacSha256> {
    let secret = &config::config().security.jwt_secret;
    let key = format!("{}{}", KEY_SALT, secret);
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).ok()?;
    let last_login = user.last_login.map(|t| t.timestamp().to_string()).unwrap_or_default();
    mac.update(format!("{}{}{}{}", user.id, user.password, last_login, timestamp).as_bytes());
    Some(mac)
}

pub fn make_token(user: &User, now: DateTime<Utc>) -> Option<String> {
    let timestamp = now.timestamp();
    let digest = hex::encode(mac_for(user, timestamp)?.finalize().into_bytes());
    Some(format!("{}-{}", to_base36(timestamp as u64), &digest[..MAC_HEX_LEN]))
}

pub fn check_token(user: &User, token: &str, now: DateTime<Utc>) -> bool {
    let Some((ts_part, mac_part)) = token.split_once('-') else {
        return false;
    };
    let Some(timestamp) = from_base36(ts_part) else {
        return false;
    };
    let Ok(tag) = hex::decode(mac_part) else {
        return false;
    };
    if mac_part.len() != MAC_HEX_LEN {
        return false;
    }
    let timestamp = timestamp as i64;
    match mac_for(user, timestamp) {
        Some(mac) if mac.clone().verify_truncated_left(&tag).is_ok() => {}
        _ => return false,
    }
    let age = now.timestamp() - timestamp;
    (0..=config::config().security.password_reset_timeout_secs).contains(&age)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn from_base36(s: &str) -> Option<u64> {
    if s.is_empty() || s.len() > 13 {
        return None;
    }
    u64::from_str_radix(s, 36).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::sample_user;
    use chrono::Duration;

    #[test]
    fn fresh_token_verifies() {
        let user = sample_user();
        let now = Utc::now();
        let token = make_token(&user, now).unwrap();
        assert!(check_token(&user, &token, now + Duration::hours(1)));
    }

    #[test]
    fn token_expires_after_timeout() {
        let user = sample_user();
        let now = Utc::now();
        let token = make_token(&user, now).unwrap();
        assert!(!check_token(&user, &token, now + Duration::days(4)));
    }

    #[test]
    fn password_change_invalidates_token() {
        let mut user = sample_user();
        let now = Utc::now();
        let token = make_token(&user, now).unwrap();
        user.password = "$2b$04$otrohash".into();
        assert!(!check_token(&user, &token, now));
    }

    #[test]
    fn garbage_is_rejected() {
        let user = sample_user();
        let now = Utc::now();
        assert!(!check_token(&user, "", now));
        assert!(!check_token(&user, "zz-nothex", now));
        assert!(!check_token(&user, "abc", now));
    }

    #[test]
    fn base36_round_trips() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(from_base36(&to_base36(1_700_000_000)), Some(1_700_000_000));
    }
}
