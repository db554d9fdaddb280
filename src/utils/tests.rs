use super::*;

#[test]
fn expand_home_tilde_slash() {
    let result = expand_home("~/data/relay.db");
    let home = dirs::home_dir().unwrap();
    assert_eq!(result, home.join("data/relay.db"));
}

#[test]
fn expand_home_tilde_only() {
    let home = dirs::home_dir().unwrap();
    assert_eq!(expand_home("~"), home);
}

#[test]
fn expand_home_absolute_untouched() {
    assert_eq!(expand_home("/srv/relay.db"), PathBuf::from("/srv/relay.db"));
    assert_eq!(expand_home("relative.db"), PathBuf::from("relative.db"));
}

#[test]
fn ensure_dir_creates_and_returns() {
    let tmp = tempfile::tempdir().unwrap();
    let new_dir = tmp.path().join("subdir");
    let result = ensure_dir(&new_dir).unwrap();
    assert_eq!(result, new_dir);
    assert!(new_dir.exists());
}

#[test]
fn atomic_write_creates_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.json");
    atomic_write(&path, "{}").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
}

#[test]
fn atomic_write_overwrites() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.json");
    atomic_write(&path, "first").unwrap();
    atomic_write(&path, "second").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
}
