//! File-backed cookie jar in the Netscape `cookies.txt` layout.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

const HEADER: &str = "# Netscape HTTP Cookie File";

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub domain: String,
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    /// Unix seconds; 0 marks a session cookie.
    pub expires: i64,
    pub name: String,
    pub value: String,
}

impl StoredCookie {
    fn is_expired(&self, now: i64) -> bool {
        self.expires != 0 && self.expires <= now
    }

    fn matches_domain(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if host == self.domain {
            return true;
        }
        self.include_subdomains && host.ends_with(&format!(".{}", self.domain))
    }

    fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.domain,
            bool_field(self.include_subdomains),
            self.path,
            bool_field(self.secure),
            self.expires,
            self.name,
            self.value
        )
    }

    fn from_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 7 {
            return None;
        }
        Some(Self {
            domain: fields[0].trim_start_matches('.').to_ascii_lowercase(),
            include_subdomains: fields[1] == "TRUE",
            path: fields[2].to_string(),
            secure: fields[3] == "TRUE",
            expires: fields[4].parse().ok()?,
            name: fields[5].to_string(),
            value: fields[6].to_string(),
        })
    }
}

fn bool_field(v: bool) -> &'static str {
    if v {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// Cookie store bound to a file path.
#[derive(Debug)]
pub struct CookieJar {
    path: PathBuf,
    cookies: Vec<StoredCookie>,
}

impl CookieJar {
    /// Loads the jar from `path`, starting empty when the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut cookies = Vec::new();
        match fs::read_to_string(&path) {
            Ok(data) => {
                let now = chrono::Utc::now().timestamp();
                for line in data.lines() {
                    if line.trim().is_empty() || line.starts_with('#') {
                        continue;
                    }
                    match StoredCookie::from_line(line) {
                        Some(c) if !c.is_expired(now) => cookies.push(c),
                        Some(_) => {}
                        None => warn!(
                            component = "session",
                            event = "bad_cookie_line",
                            path = ?path,
                            "skipping malformed cookie jar line"
                        ),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(component = "session", event = "jar_loaded", path = ?path, cookies = cookies.len(), "cookie jar loaded");
        Ok(Self { path, cookies })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Inserts or replaces a cookie with the same domain, path and name.
    pub fn insert(&mut self, cookie: StoredCookie) {
        self.cookies.retain(|c| {
            !(c.domain == cookie.domain && c.path == cookie.path && c.name == cookie.name)
        });
        if !cookie.is_expired(chrono::Utc::now().timestamp()) {
            self.cookies.push(cookie);
        }
    }

    /// Removes the named cookie for the host at every path prefix of `path`.
    pub fn remove(&mut self, host: &str, path: &str, name: &str) {
        let prefixes = path_prefixes(path);
        self.cookies.retain(|c| {
            !(c.name == name && c.matches_domain(host) && prefixes.iter().any(|p| *p == c.path))
        });
    }

    /// Removes exactly the cookie stored under `domain`, `path` and `name`.
    pub fn remove_exact(&mut self, domain: &str, path: &str, name: &str) {
        self.cookies
            .retain(|c| !(c.domain == domain && c.path == path && c.name == name));
    }

    /// Finds the named cookie for a request to `host` + `path`.
    ///
    /// The full path is tried first, then each shorter prefix down to `/`;
    /// the first prefix owning the cookie wins.
    pub fn lookup(&self, host: &str, path: &str, name: &str, secure: bool) -> Option<&StoredCookie> {
        let now = chrono::Utc::now().timestamp();
        for prefix in path_prefixes(path) {
            let found = self.cookies.iter().find(|c| {
                c.name == name
                    && c.path == prefix
                    && c.matches_domain(host)
                    && (secure || !c.secure)
                    && !c.is_expired(now)
            });
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// `Cookie` header value for every cookie visible to the request.
    pub fn header_for(&self, host: &str, path: &str, secure: bool) -> Option<String> {
        let now = chrono::Utc::now().timestamp();
        let prefixes = path_prefixes(path);
        let mut visible: Vec<&StoredCookie> = self
            .cookies
            .iter()
            .filter(|c| {
                c.matches_domain(host)
                    && (secure || !c.secure)
                    && !c.is_expired(now)
                    && prefixes.iter().any(|p| *p == c.path)
            })
            .collect();
        if visible.is_empty() {
            return None;
        }
        // longest path first, as browsers do
        visible.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Some(
            visible
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Writes the jar to disk with owner-only permissions.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                let mut dirs = fs::DirBuilder::new();
                dirs.recursive(true);
                #[cfg(unix)]
                {
                    use std::os::unix::fs::DirBuilderExt;
                    dirs.mode(0o700);
                }
                dirs.create(parent)?;
            }
        }

        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(&self.path)?;
        // mode only applies on create; tighten a pre-existing file too
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        let mut data = String::with_capacity(64 + self.cookies.len() * 96);
        data.push_str(HEADER);
        data.push('\n');
        for cookie in &self.cookies {
            data.push_str(&cookie.to_line());
            data.push('\n');
        }
        file.write_all(data.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }
}

/// `/a/b/c` -> [`/a/b/c`, `/a/b`, `/a`, `/`].
pub fn path_prefixes(path: &str) -> Vec<String> {
    let path = if path.is_empty() { "/" } else { path };
    let parts: Vec<&str> = path.split('/').collect();
    let mut prefixes = Vec::with_capacity(parts.len());
    for n in (1..=parts.len()).rev() {
        let prefix = parts[..n].join("/");
        let prefix = if prefix.is_empty() { "/".to_string() } else { prefix };
        if !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }
    prefixes
}

/// Default cookie path for a request path: its directory part.
pub fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => request_path[..i].to_string(),
    }
}
