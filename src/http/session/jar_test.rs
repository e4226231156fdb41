#[cfg(test)]
mod tests {
    use crate::http::session::jar::{default_path, path_prefixes, CookieJar, StoredCookie};
    use crate::http::session::Session;

    const NAME: &str = "com.sixsq.slipstream.cookie";

    fn cookie(path: &str, value: &str) -> StoredCookie {
        StoredCookie {
            domain: "orchestrator.local".to_string(),
            include_subdomains: false,
            path: path.to_string(),
            secure: false,
            expires: 0,
            name: NAME.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_path_prefixes() {
        assert_eq!(path_prefixes("/a/b/c"), vec!["/a/b/c", "/a/b", "/a", "/"]);
        assert_eq!(path_prefixes("/"), vec!["/"]);
        assert_eq!(path_prefixes(""), vec!["/"]);
    }

    #[test]
    fn test_default_path() {
        assert_eq!(default_path("/run/123/ss:state"), "/run/123");
        assert_eq!(default_path("/login"), "/");
        assert_eq!(default_path(""), "/");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut jar = CookieJar::load(dir.path().join("cookies.txt")).unwrap();
        jar.insert(cookie("/", "root"));
        jar.insert(cookie("/a/b", "deep"));

        let hit = jar.lookup("orchestrator.local", "/a/b/c", NAME, false).unwrap();
        assert_eq!(hit.value, "deep");

        let hit = jar.lookup("orchestrator.local", "/x", NAME, false).unwrap();
        assert_eq!(hit.value, "root");

        assert!(jar.lookup("other.local", "/a/b/c", NAME, false).is_none());
        assert!(jar.lookup("orchestrator.local", "/a/b/c", "other", false).is_none());
    }

    #[test]
    fn test_secure_cookie_not_sent_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let mut jar = CookieJar::load(dir.path().join("cookies.txt")).unwrap();
        let mut c = cookie("/", "v");
        c.secure = true;
        jar.insert(c);
        assert!(jar.lookup("orchestrator.local", "/run", NAME, false).is_none());
        assert!(jar.lookup("orchestrator.local", "/run", NAME, true).is_some());
    }

    #[test]
    fn test_expired_cookies_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut jar = CookieJar::load(dir.path().join("cookies.txt")).unwrap();
        let mut c = cookie("/", "old");
        c.expires = 1;
        jar.insert(c);
        assert!(jar.is_empty());
    }

    #[test]
    fn test_save_and_reload_with_owner_only_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cookies.txt");

        let mut jar = CookieJar::load(&path).unwrap();
        jar.insert(cookie("/", "root"));
        let mut sub = cookie("/run", "run");
        sub.include_subdomains = true;
        sub.expires = chrono::Utc::now().timestamp() + 3600;
        jar.insert(sub.clone());
        jar.save().unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let reloaded = CookieJar::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        let hit = reloaded.lookup("api.orchestrator.local", "/run/1", NAME, false).unwrap();
        assert_eq!(hit, &sub);
    }

    #[test]
    fn test_insert_replaces_same_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let mut jar = CookieJar::load(dir.path().join("cookies.txt")).unwrap();
        jar.insert(cookie("/", "first"));
        jar.insert(cookie("/", "second"));
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.lookup("orchestrator.local", "/", NAME, false).unwrap().value, "second");
    }

    #[test]
    fn test_session_stores_insecure_cookies_as_non_secure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        let session = Session::open(&path, NAME).unwrap();

        let stored = session
            .store_response_cookies(
                "orchestrator.local",
                "/auth/login",
                false,
                [format!("{NAME}=token; Path=/; Secure; HttpOnly").as_str()].into_iter(),
            )
            .unwrap();
        assert_eq!(stored, 1);
        assert!(session.has_auth_cookie("orchestrator.local", "/run/1", false));
        assert_eq!(
            session.cookie_header("orchestrator.local", "/run/1", false).as_deref(),
            Some(format!("{NAME}=token").as_str())
        );

        // flushed synchronously and visible to a new session
        let reopened = Session::open(&path, NAME).unwrap();
        assert!(reopened.has_auth_cookie("orchestrator.local", "/", false));

        reopened.delete_cookie("orchestrator.local", "/run/1").unwrap();
        let again = Session::open(&path, NAME).unwrap();
        assert!(!again.has_auth_cookie("orchestrator.local", "/", false));
    }

    #[test]
    fn test_session_default_path_from_request() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path().join("cookies.txt"), NAME).unwrap();
        session
            .store_response_cookies(
                "orchestrator.local",
                "/run/42/ss:state",
                true,
                [format!("{NAME}=scoped").as_str()].into_iter(),
            )
            .unwrap();
        assert!(session.has_auth_cookie("orchestrator.local", "/run/42/x", true));
        assert!(!session.has_auth_cookie("orchestrator.local", "/user", true));
    }

    #[test]
    fn test_max_age_zero_removes_only_that_path() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path().join("cookies.txt"), "sid").unwrap();
        let set = |raw: &str| {
            session
                .store_response_cookies("h", "/", false, [raw].into_iter())
                .unwrap()
        };
        set("sid=root; Path=/");
        set("sid=deep; Path=/a/b");
        set("sid=; Path=/a/b; Max-Age=0");

        assert!(session.has_auth_cookie("h", "/x", false));
        assert_eq!(session.cookie_header("h", "/a/b/c", false).as_deref(), Some("sid=root"));
    }

    #[cfg(unix)]
    #[test]
    fn test_save_tightens_existing_file_and_creates_private_dir() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("cookies.txt");
        std::fs::write(&existing, "# Netscape HTTP Cookie File\n").unwrap();
        std::fs::set_permissions(&existing, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut jar = CookieJar::load(&existing).unwrap();
        jar.insert(cookie("/", "root"));
        jar.save().unwrap();
        let mode = std::fs::metadata(&existing).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let fresh = dir.path().join(".runagent").join("cookies.txt");
        CookieJar::load(&fresh).unwrap().save().unwrap();
        let mode = std::fs::metadata(dir.path().join(".runagent")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
