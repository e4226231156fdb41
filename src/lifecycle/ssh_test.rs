#[cfg(test)]
mod tests {
    use crate::lifecycle::ssh::{append_authorized_key, authorized_keys_path};

    const KEY: &str = "ssh-rsa AAAAB3Nza user@host";

    #[test]
    fn test_append_is_idempotent() {
        let home = tempfile::tempdir().unwrap();

        assert!(append_authorized_key(home.path(), KEY).unwrap());
        assert!(!append_authorized_key(home.path(), &format!("{KEY}\n")).unwrap());
        assert!(append_authorized_key(home.path(), "ssh-ed25519 BBBB other@host").unwrap());

        let content = std::fs::read_to_string(authorized_keys_path(home.path())).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(content.lines().next(), Some(KEY));
    }

    #[test]
    fn test_empty_key_is_ignored() {
        let home = tempfile::tempdir().unwrap();
        assert!(!append_authorized_key(home.path(), "  ").unwrap());
        assert!(!authorized_keys_path(home.path()).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let home = tempfile::tempdir().unwrap();
        append_authorized_key(home.path(), KEY).unwrap();

        let dir_mode = std::fs::metadata(home.path().join(".ssh")).unwrap().permissions().mode();
        let file_mode = std::fs::metadata(authorized_keys_path(home.path()))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
        assert_eq!(file_mode & 0o777, 0o600);
    }
}
