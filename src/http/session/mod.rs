//! Persistent session: a cookie jar shared by every call of one transport.

pub mod jar;

#[cfg(test)]
mod jar_test;

use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::Result;
pub use jar::{CookieJar, StoredCookie};

/// Session bound to a cookie-jar file and a named authentication cookie.
#[derive(Debug)]
pub struct Session {
    cookie_name: String,
    jar: Mutex<CookieJar>,
}

impl Session {
    /// Opens the session, loading any cookies persisted by earlier runs.
    pub fn open(path: impl Into<PathBuf>, cookie_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            cookie_name: cookie_name.into(),
            jar: Mutex::new(CookieJar::load(path)?),
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// True when a valid authentication cookie exists for the target.
    pub fn has_auth_cookie(&self, host: &str, path: &str, secure: bool) -> bool {
        self.jar
            .lock()
            .lookup(host, path, &self.cookie_name, secure)
            .is_some()
    }

    /// `Cookie` header value for the target, if any cookie applies.
    pub fn cookie_header(&self, host: &str, path: &str, secure: bool) -> Option<String> {
        self.jar.lock().header_for(host, path, secure)
    }

    /// Stores `Set-Cookie` values from a response and flushes the jar.
    ///
    /// Cookies received over plain `http://` are kept as non-secure so they
    /// are sent back on the same insecure connection.
    pub fn store_response_cookies<'a>(
        &self,
        host: &str,
        request_path: &str,
        secure_connection: bool,
        set_cookies: impl Iterator<Item = &'a str>,
    ) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut stored = 0;
        let mut jar = self.jar.lock();
        for raw in set_cookies {
            let parsed = match cookie::Cookie::parse(raw.to_string()) {
                Ok(c) => c,
                Err(e) => {
                    warn!(component = "session", event = "bad_set_cookie", error = %e, "ignoring unparsable Set-Cookie");
                    continue;
                }
            };

            let (domain, include_subdomains) = match parsed.domain() {
                Some(d) if !d.is_empty() => (d.trim_start_matches('.').to_ascii_lowercase(), true),
                _ => (host.to_ascii_lowercase(), false),
            };
            let path = match parsed.path() {
                Some(p) if p.starts_with('/') => p.to_string(),
                _ => jar::default_path(request_path),
            };
            let expires = if let Some(max_age) = parsed.max_age() {
                let secs = max_age.whole_seconds();
                if secs <= 0 {
                    -1
                } else {
                    now + secs
                }
            } else {
                parsed
                    .expires_datetime()
                    .map(|dt| dt.unix_timestamp())
                    .unwrap_or(0)
            };
            let secure = secure_connection && parsed.secure().unwrap_or(false);

            let cookie = StoredCookie {
                domain,
                include_subdomains,
                path,
                secure,
                expires,
                name: parsed.name().to_string(),
                value: parsed.value().to_string(),
            };
            if cookie.expires == -1 {
                jar.remove_exact(&cookie.domain, &cookie.path, &cookie.name);
            } else {
                jar.insert(cookie);
            }
            stored += 1;
        }

        if stored > 0 {
            jar.save()?;
            debug!(component = "session", event = "jar_saved", path = ?jar.path(), cookies = jar.len(), "cookie jar flushed");
        }
        Ok(stored)
    }

    /// Forgets the authentication cookie for the target and flushes the jar.
    pub fn delete_cookie(&self, host: &str, path: &str) -> Result<()> {
        let mut jar = self.jar.lock();
        jar.remove(host, path, &self.cookie_name);
        jar.save()
    }
}
