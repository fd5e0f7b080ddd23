use std::env;
use std::path::{Path, PathBuf};

/// Import-path prefix under which the toolchain's own packages live.
pub const TOOLCHAIN_PATH: &str = "glintjs";

/// Directory of the embedded toolchain packages inside the library tree.
#[must_use]
pub fn toolchain_tree(lib_root: &Path) -> PathBuf {
    lib_root.join("src").join(TOOLCHAIN_PATH)
}

/// If `path` lies under the embedded toolchain tree, returns the
/// slash-separated remainder used to address the virtual filesystem.
/// Both sides are compared component-wise, so host separators do not leak
/// into the virtual keys.
#[must_use]
pub fn under_toolchain_tree(path: &Path, lib_root: &Path) -> Option<String> {
    let rel = path.strip_prefix(toolchain_tree(lib_root)).ok()?;
    let mut key = String::from("/");
    for (index, component) in rel.components().enumerate() {
        if index > 0 {
            key.push('/');
        }
        key.push_str(&component.as_os_str().to_string_lossy());
    }
    Some(key)
}

/// Returns `files` without the listed names.
#[must_use]
pub fn exclude(files: &[String], drop: &[&str]) -> Vec<String> {
    files
        .iter()
        .filter(|file| !drop.contains(&file.as_str()))
        .cloned()
        .collect()
}

/// Returns `files` with the listed names appended, de-duplicating first.
#[must_use]
pub fn include(files: &[String], add: &[&str]) -> Vec<String> {
    let mut out = exclude(files, add);
    out.extend(add.iter().map(|name| (*name).to_string()));
    out
}

/// Returns `files` without entries whose name starts with `prefix`.
#[must_use]
pub fn exclude_prefixed(files: &[String], prefix: &str) -> Vec<String> {
    files
        .iter()
        .filter(|file| !file.starts_with(prefix))
        .cloned()
        .collect()
}

/// Splits a platform path-list value (the workspace list) into paths.
#[must_use]
pub fn split_path_list(value: &str) -> Vec<PathBuf> {
    if value.is_empty() {
        return Vec::new();
    }
    env::split_paths(value).collect()
}

/// Returns the first workspace that is a prefix of `file`, if any.
#[must_use]
pub fn workspace_prefix<'a>(file: &Path, workspaces: &'a [PathBuf]) -> Option<&'a Path> {
    workspaces
        .iter()
        .map(PathBuf::as_path)
        .find(|workspace| file.starts_with(workspace))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| (*name).to_string()).collect()
    }

    #[test]
    fn exclude_drops_only_listed_names() {
        let files = names(&["rand.g", "util.g", "rand_linux.g"]);
        assert_eq!(
            exclude(&files, &["rand_linux.g"]),
            names(&["rand.g", "util.g"])
        );
        assert_eq!(exclude(&files, &["missing.g"]), files);
    }

    #[test]
    fn include_never_duplicates() {
        let files = names(&["root.g", "root_unix.g"]);
        let out = include(&files, &["root_unix.g", "root_js.g"]);
        assert_eq!(out, names(&["root.g", "root_unix.g", "root_js.g"]));
    }

    #[test]
    fn exclude_prefixed_matches_on_prefix() {
        let files = names(&["executable_linux.g", "executable_windows.g", "file.g"]);
        assert_eq!(exclude_prefixed(&files, "executable_"), names(&["file.g"]));
    }

    #[test]
    fn toolchain_tree_prefix_is_component_wise() {
        let root = Path::new("/opt/glint");
        let inside = Path::new("/opt/glint/src/glintjs/nosync/map.g");
        assert_eq!(
            under_toolchain_tree(inside, root),
            Some("/nosync/map.g".to_string())
        );

        let outside = Path::new("/opt/glint/src/glintjsx/map.g");
        assert_eq!(under_toolchain_tree(outside, root), None);

        let exact = Path::new("/opt/glint/src/glintjs");
        assert_eq!(under_toolchain_tree(exact, root), Some("/".to_string()));
    }

    #[test]
    fn workspace_prefix_prefers_listed_order() {
        let workspaces = vec![PathBuf::from("/home/dev/glint"), PathBuf::from("/srv/glint")];
        let file = Path::new("/srv/glint/src/foo/bar.g");
        assert_eq!(
            workspace_prefix(file, &workspaces),
            Some(Path::new("/srv/glint"))
        );
        assert_eq!(workspace_prefix(Path::new("/tmp/x.g"), &workspaces), None);
    }

    #[test]
    fn split_path_list_handles_empty_value() {
        assert!(split_path_list("").is_empty());
        let joined = env::join_paths(["/a", "/b"]).expect("join test paths");
        let listed = split_path_list(joined.to_str().expect("utf8 path list"));
        assert_eq!(listed, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }
}
