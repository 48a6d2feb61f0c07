//! Session cookie negotiation and the response cookie.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::Serialize;
use session_state_core::is_valid_session_id;

use crate::config::ConfigStore;

/// Who owns the session cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) enum CookieMode {
    /// The host environment reads and writes the cookie.
    #[default]
    External,
    /// Request cookies were supplied and start has not consulted them yet.
    Pending(HashMap<String, String>),
    /// The id came from the request; nothing to send back.
    Adopted,
    /// A new id must be sent back in a response cookie.
    Emit,
}

impl CookieMode {
    /// Consult pending request cookies at start.
    ///
    /// Returns the id to adopt, if the caller has none and the request
    /// carried a valid one under `cookie_name`.
    pub(crate) fn settle(&mut self, current_id: &str, cookie_name: &str) -> Option<String> {
        let Self::Pending(values) = self else {
            return None;
        };
        let adopted = if current_id.is_empty() {
            values
                .get(cookie_name)
                .filter(|id| is_valid_session_id(id))
                .cloned()
        } else {
            None
        };
        *self = if adopted.is_some() {
            Self::Adopted
        } else {
            Self::Emit
        };
        adopted
    }

    /// A self-managed session changed id and the client must learn it.
    pub(crate) fn renew(&mut self) {
        if matches!(self, Self::Adopted) {
            *self = Self::Emit;
        }
    }

    pub(crate) const fn should_emit(&self) -> bool {
        matches!(self, Self::Emit)
    }
}

/// Latest expiry written to a cookie, `Fri, 31 Dec 9999 23:59:59 GMT`.
pub const MAX_EXPIRES: i64 = 253_402_300_799;

/// Format a unix timestamp as an HTTP date.
#[must_use]
pub fn http_date(timestamp: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

/// A cookie the caller must send back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    /// Unix timestamp; `0` for a browser-session cookie.
    pub expires: i64,
    pub path: String,
    pub domain: String,
    pub same_site: String,
    pub priority: String,
    pub secure: bool,
    pub http_only: bool,
}

impl ResponseCookie {
    /// Build from the cookie settings. `None` when the cookie name is empty.
    #[must_use]
    pub fn from_config(config: &ConfigStore, value: impl Into<String>, now: i64) -> Option<Self> {
        let name = config.get_or("name", "");
        if name.is_empty() {
            return None;
        }
        let lifetime = config.get_int("cookie_lifetime").unwrap_or(0);
        Some(Self {
            name: name.to_string(),
            value: value.into(),
            expires: if lifetime == 0 {
                0
            } else {
                now.saturating_add(lifetime).clamp(1, MAX_EXPIRES)
            },
            path: config.get_or("cookie_path", "").to_string(),
            domain: config.get_or("cookie_domain", "").to_string(),
            same_site: config.get_or("cookie_samesite", "").to_string(),
            priority: "High".to_string(),
            secure: config.is_truthy("cookie_secure"),
            http_only: config.is_truthy("cookie_httponly"),
        })
    }
}

impl fmt::Display for ResponseCookie {
    /// `Set-Cookie` value form; empty attributes are left out.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if self.expires != 0 {
            match http_date(self.expires) {
                Some(date) => write!(f, "; Expires={date}")?,
                None => {
                    tracing::warn!(expires = self.expires, "Dropping unrepresentable cookie expiry");
                }
            }
        }
        for (attr, value) in [
            ("Path", &self.path),
            ("Domain", &self.domain),
            ("SameSite", &self.same_site),
            ("Priority", &self.priority),
        ] {
            if !value.is_empty() {
                write!(f, "; {attr}={value}")?;
            }
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IniDefaults;

    fn pending(pairs: &[(&str, &str)]) -> CookieMode {
        CookieMode::Pending(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_adopts_valid_cookie() {
        let mut mode = pending(&[("PHPSESSID", "abc123")]);
        assert_eq!(mode.settle("", "PHPSESSID"), Some("abc123".to_string()));
        assert_eq!(mode, CookieMode::Adopted);
        assert!(!mode.should_emit());
    }

    #[test]
    fn test_missing_or_invalid_cookie_emits() {
        let mut mode = pending(&[("other", "abc")]);
        assert_eq!(mode.settle("", "PHPSESSID"), None);
        assert!(mode.should_emit());

        let mut mode = pending(&[("PHPSESSID", "../../etc/passwd")]);
        assert_eq!(mode.settle("", "PHPSESSID"), None);
        assert!(mode.should_emit());
    }

    #[test]
    fn test_explicit_id_wins() {
        let mut mode = pending(&[("PHPSESSID", "abc")]);
        assert_eq!(mode.settle("mine", "PHPSESSID"), None);
        assert!(mode.should_emit());
    }

    #[test]
    fn test_external_mode_is_inert() {
        let mut mode = CookieMode::External;
        assert_eq!(mode.settle("", "PHPSESSID"), None);
        assert_eq!(mode, CookieMode::External);
        mode.renew();
        assert!(!mode.should_emit());
    }

    #[test]
    fn test_renew_after_adoption() {
        let mut mode = CookieMode::Adopted;
        mode.renew();
        assert!(mode.should_emit());
    }

    #[test]
    fn test_http_date() {
        assert_eq!(
            http_date(1_700_000_000).unwrap(),
            "Tue, 14 Nov 2023 22:13:20 GMT"
        );
    }

    #[test]
    fn test_cookie_from_config() {
        let config = ConfigStore::new(
            IniDefaults::default()
                .with("cookie_lifetime", 60)
                .with("cookie_domain", "example.com")
                .with("cookie_samesite", "Lax")
                .with("cookie_secure", true)
                .with("cookie_httponly", true),
        );
        let cookie = ResponseCookie::from_config(&config, "abc", 1_700_000_000).unwrap();
        assert_eq!(cookie.expires, 1_700_000_060);
        assert_eq!(
            cookie.to_string(),
            "PHPSESSID=abc; Expires=Tue, 14 Nov 2023 22:14:20 GMT; Path=/; \
             Domain=example.com; SameSite=Lax; Priority=High; Secure; HttpOnly"
        );
    }

    #[test]
    fn test_extreme_lifetime_is_clamped() {
        let config = ConfigStore::new(IniDefaults::default().with("cookie_lifetime", i64::MAX));
        let cookie = ResponseCookie::from_config(&config, "abc", 1_700_000_000).unwrap();
        assert_eq!(cookie.expires, MAX_EXPIRES);
        assert!(
            cookie
                .to_string()
                .contains("; Expires=Fri, 31 Dec 9999 23:59:59 GMT;")
        );

        let config = ConfigStore::new(IniDefaults::default().with("cookie_lifetime", i64::MIN));
        let cookie = ResponseCookie::from_config(&config, "abc", 1_700_000_000).unwrap();
        assert_eq!(cookie.expires, 1);
        assert!(
            cookie
                .to_string()
                .contains("; Expires=Thu, 01 Jan 1970 00:00:01 GMT;")
        );
    }

    #[test]
    fn test_unrepresentable_expiry_is_left_out() {
        let config = ConfigStore::new(IniDefaults::default());
        let mut cookie = ResponseCookie::from_config(&config, "abc", 0).unwrap();
        cookie.expires = i64::MAX;
        assert_eq!(cookie.to_string(), "PHPSESSID=abc; Path=/; Priority=High");
    }

    #[test]
    fn test_session_cookie_omits_falsy_attributes() {
        let config = ConfigStore::new(IniDefaults::default());
        let cookie = ResponseCookie::from_config(&config, "abc", 1_700_000_000).unwrap();
        assert_eq!(cookie.expires, 0);
        assert_eq!(cookie.to_string(), "PHPSESSID=abc; Path=/; Priority=High");
    }

    #[test]
    fn test_empty_name_yields_nothing() {
        let config = ConfigStore::new(IniDefaults::default().with("name", ""));
        assert!(ResponseCookie::from_config(&config, "abc", 0).is_none());
    }
}
