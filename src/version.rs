//! Toolchain version handling.
//!
//! The installed Glint distribution records its version in
//! `<lib-root>/VERSION`; archives compiled against one language version are
//! not loadable by a code generator built for another, so the session
//! refuses to start on a mismatch.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Release build tags understood by the source classifier: `glint1.1`
/// through `glint1.<minor>`.
#[must_use]
pub fn release_tags(minor: u32) -> Vec<String> {
    (1..=minor).map(|n| format!("glint1.{n}")).collect()
}

/// Verifies that the library root belongs to the language version the code
/// generator supports.
pub fn check_toolchain_version(lib_root: &Path, expected_minor: u32) -> Result<()> {
    let path = lib_root.join("VERSION");
    let raw = fs::read_to_string(&path).map_err(|err| {
        Error::version(format!(
            "cannot determine toolchain version from {}: {err}",
            path.display()
        ))
    })?;
    let installed = raw.lines().next().unwrap_or("").trim();
    let expected = format!("glint1.{expected_minor}");
    if installed == expected || installed.starts_with(&format!("{expected}.")) {
        return Ok(());
    }
    Err(Error::version(format!(
        "installed toolchain reports \"{installed}\", but this code generator requires {expected}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn release_tags_enumerate_minors() {
        assert_eq!(release_tags(3), vec!["glint1.1", "glint1.2", "glint1.3"]);
        assert!(release_tags(0).is_empty());
    }

    #[test]
    fn version_check_accepts_exact_and_patch_releases() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("VERSION"), "glint1.12\n").expect("write VERSION");
        check_toolchain_version(dir.path(), 12).expect("exact match accepted");

        fs::write(dir.path().join("VERSION"), "glint1.12.4\n").expect("write VERSION");
        check_toolchain_version(dir.path(), 12).expect("patch release accepted");
    }

    #[test]
    fn version_check_rejects_mismatch_and_missing_file() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("VERSION"), "glint1.11\n").expect("write VERSION");
        let err = check_toolchain_version(dir.path(), 12).expect_err("mismatch rejected");
        assert!(err.to_string().contains("glint1.12"), "got: {err}");

        let empty = tempdir().expect("tempdir");
        check_toolchain_version(empty.path(), 12).expect_err("missing VERSION rejected");
    }
}
