use std::fs;

use machscope::canonicalize_or_current;
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let cwd = std::env::current_dir().expect("cwd");
    assert_eq!(canonicalize_or_current(".").expect("canonicalize"), cwd);
}

#[test]
fn canonicalize_or_current_resolves_existing_path() {
    let tmp = tempdir().expect("tempdir");
    let nested = tmp.path().join("Demo.app");
    fs::create_dir_all(&nested).expect("create nested");

    let result = canonicalize_or_current(&nested.to_string_lossy()).expect("canonicalize nested");
    assert_eq!(result, nested.canonicalize().expect("canonicalize nested dir"));
}

#[test]
fn canonicalize_or_current_joins_missing_relative_path_with_cwd() {
    let cwd = std::env::current_dir().expect("cwd");
    let result = canonicalize_or_current("does-not-exist/Demo").expect("fallback");
    assert_eq!(result, cwd.join("does-not-exist/Demo"));
}
