use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;

/// Metadata for one filesystem entry, virtual or real.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub name: String,
    pub is_dir: bool,
    pub modified: SystemTime,
}

/// A read-only tree of files compiled into (or registered with) the
/// toolchain. Two such trees exist in a full toolchain: the toolchain
/// packages mounted under the library root, and the natives overlay used by
/// the augmentor. Entries report the UNIX epoch as their modification time,
/// so embedded sources never invalidate on-disk caches by themselves.
#[derive(Debug, Default)]
pub struct VirtualFs {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl VirtualFs {
    #[must_use]
    pub fn builder() -> VirtualFsBuilder {
        VirtualFsBuilder {
            fs: VirtualFs::default(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[must_use]
    pub fn is_dir(&self, path: &str) -> bool {
        self.dirs.contains(normalize(path).as_str())
    }

    #[must_use]
    pub fn open(&self, path: &str) -> Option<&[u8]> {
        self.files.get(normalize(path).as_str()).map(Vec::as_slice)
    }

    #[must_use]
    pub fn stat(&self, path: &str) -> Option<FileMeta> {
        let key = normalize(path);
        if self.dirs.contains(&key) {
            return Some(FileMeta {
                name: base_name(&key),
                is_dir: true,
                modified: SystemTime::UNIX_EPOCH,
            });
        }
        self.files.get(&key).map(|_| FileMeta {
            name: base_name(&key),
            is_dir: false,
            modified: SystemTime::UNIX_EPOCH,
        })
    }

    /// Lists the direct children of a directory, sorted by name.
    /// Returns `None` when `path` is not a directory of this tree.
    #[must_use]
    pub fn read_dir(&self, path: &str) -> Option<Vec<FileMeta>> {
        let key = normalize(path);
        if !self.dirs.contains(&key) {
            return None;
        }
        let prefix = if key == "/" { String::from("/") } else { format!("{key}/") };
        let mut entries = Vec::new();
        for dir in self.dirs.range(prefix.clone()..) {
            if !dir.starts_with(&prefix) {
                break;
            }
            let rest = &dir[prefix.len()..];
            if !rest.is_empty() && !rest.contains('/') {
                entries.push(FileMeta {
                    name: rest.to_string(),
                    is_dir: true,
                    modified: SystemTime::UNIX_EPOCH,
                });
            }
        }
        for file in self.files.range(prefix.clone()..) {
            let (path, _) = file;
            if !path.starts_with(&prefix) {
                break;
            }
            let rest = &path[prefix.len()..];
            if !rest.contains('/') {
                entries.push(FileMeta {
                    name: rest.to_string(),
                    is_dir: false,
                    modified: SystemTime::UNIX_EPOCH,
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Some(entries)
    }
}

/// Builder for a [`VirtualFs`]; ancestor directories are registered
/// automatically.
#[derive(Debug)]
pub struct VirtualFsBuilder {
    fs: VirtualFs,
}

impl VirtualFsBuilder {
    #[must_use]
    pub fn file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        let key = normalize(path);
        let mut dir = parent(&key);
        loop {
            let inserted = self.fs.dirs.insert(dir.clone());
            if !inserted || dir == "/" {
                break;
            }
            dir = parent(&dir);
        }
        self.fs.files.insert(key, contents.into());
        self
    }

    #[must_use]
    pub fn build(self) -> VirtualFs {
        self.fs
    }
}

fn normalize(path: &str) -> String {
    let mut key = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    while key.len() > 1 && key.ends_with('/') {
        key.pop();
    }
    key
}

fn parent(key: &str) -> String {
    match key.rfind('/') {
        Some(0) | None => String::from("/"),
        Some(index) => key[..index].to_string(),
    }
}

fn base_name(key: &str) -> String {
    key.rsplit('/').next().unwrap_or("").to_string()
}
